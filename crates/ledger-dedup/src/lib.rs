//! Content-addressable deduplication (spec §4.5): raw/canonical SHA-256 and
//! perceptual hashing of rendered pages, gating document ingestion via a
//! near-duplicate lookup against a KV-backed index.
//!
//! Unlike the original's optional `Pillow`/`imagehash` imports, perceptual
//! hashing here is a compiled-in dependency (`image`), so there is no
//! "missing dependency" state to detect at runtime — the equivalent failure
//! mode is an absent `qpdf` binary for canonicalization, which
//! `hashing::normalize_pdf` already reports by returning `None` rather than
//! silently producing a wrong hash.

pub mod hashing;
pub mod index;
pub mod phash;

pub use hashing::{compute_pdf_hashes, sha256_hex, CasHashes};
pub use index::find_duplicate;
pub use phash::{phash_distance, phash_page, phashes_for_pages};
