pub mod azure;
pub mod tesseract;
pub mod textract;

pub use azure::AzureLayoutProvider;
pub use tesseract::TesseractLocalProvider;
pub use textract::TextractProvider;
