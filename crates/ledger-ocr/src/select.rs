use std::collections::HashMap;

use ledger_core::config::Settings;

pub const ALLOWED_PROVIDERS: [&str; 3] = ["azure", "textract", "tesseract"];
const FALLBACK_CHAIN: [&str; 3] = ["azure", "textract", "tesseract"];

/// Normalized traits derived from job metadata (spec §4.8).
#[derive(Debug, Clone, Default)]
pub struct DocumentTraits {
    pub page_count: i64,
    pub raster_ratio: f64,
    pub table_merges: i64,
    pub has_form_like_layout: bool,
    pub cost_sensitive: bool,
    pub offline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionReason {
    PreferredProvider,
    CostSensitive,
    LongDocumentLowRaster,
    HighRasterRatio,
    StructuredForm,
    ModerateRaster,
    DefaultStructured,
}

#[derive(Debug, Clone)]
pub struct ProviderDecision {
    pub provider: &'static str,
    pub reason: SelectionReason,
    pub traits: DocumentTraits,
}

fn safe_float(value: Option<&serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return 0.0;
            }
            if let Some(stripped) = trimmed.strip_suffix('%') {
                return stripped.trim().parse::<f64>().unwrap_or(0.0) / 100.0;
            }
            trimmed.parse::<f64>().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

fn safe_int(value: Option<&serde_json::Value>) -> i64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .unwrap_or(0),
        _ => 0,
    }
}

fn safe_bool(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0) != 0.0,
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

pub fn traits_from_metadata(metadata: &serde_json::Value) -> DocumentTraits {
    let get = |key: &str| metadata.get(key);
    DocumentTraits {
        raster_ratio: if metadata.get("raster_ratio").is_some() {
            safe_float(get("raster_ratio"))
        } else {
            safe_float(get("raster_to_text_ratio"))
        },
        table_merges: if metadata.get("table_merge_count").is_some() {
            safe_int(get("table_merge_count"))
        } else {
            safe_int(get("table_merge_ops"))
        },
        page_count: if metadata.get("page_count").is_some() {
            safe_int(get("page_count"))
        } else {
            safe_int(get("pages"))
        },
        cost_sensitive: safe_bool(get("cost_sensitive")) || safe_bool(get("budget_fallback")),
        offline: safe_bool(get("offline")),
        has_form_like_layout: safe_bool(get("has_form_like_layout")),
    }
}

/// `estimate_job_spend(pages, per_page) -> cents` (spec §4.8 budget gate).
pub fn estimate_job_spend(page_count: i64, cost_per_page_cents: i64) -> i64 {
    page_count.max(0) * cost_per_page_cents.max(0)
}

/// `budget_allows(pages, max_cents, per_page_cents) -> (allowed, estimate)`.
/// `max_spend_cents <= 0` disables the gate.
pub fn budget_allows(page_count: i64, max_spend_cents: i64, cost_per_page_cents: i64) -> (bool, i64) {
    if page_count <= 0 {
        return (true, 0);
    }
    let estimated = estimate_job_spend(page_count, cost_per_page_cents);
    if max_spend_cents <= 0 {
        return (true, estimated);
    }
    (estimated <= max_spend_cents, estimated)
}

/// First-match-wins provider decision (spec §4.8).
pub fn select_provider(traits: &DocumentTraits, metadata: &serde_json::Value) -> ProviderDecision {
    let preferred = metadata
        .get("preferred_provider")
        .and_then(|v| v.as_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if let Some(p) = ALLOWED_PROVIDERS.iter().find(|p| **p == preferred) {
        return ProviderDecision {
            provider: p,
            reason: SelectionReason::PreferredProvider,
            traits: traits.clone(),
        };
    }

    if traits.cost_sensitive || traits.offline {
        return ProviderDecision {
            provider: "tesseract",
            reason: SelectionReason::CostSensitive,
            traits: traits.clone(),
        };
    }
    if traits.page_count >= 40 && traits.raster_ratio < 0.45 {
        return ProviderDecision {
            provider: "tesseract",
            reason: SelectionReason::LongDocumentLowRaster,
            traits: traits.clone(),
        };
    }
    if traits.raster_ratio >= 0.6 {
        return ProviderDecision {
            provider: "textract",
            reason: SelectionReason::HighRasterRatio,
            traits: traits.clone(),
        };
    }
    if traits.table_merges >= 2 || traits.has_form_like_layout {
        return ProviderDecision {
            provider: "azure",
            reason: SelectionReason::StructuredForm,
            traits: traits.clone(),
        };
    }
    if traits.raster_ratio >= 0.4 {
        return ProviderDecision {
            provider: "textract",
            reason: SelectionReason::ModerateRaster,
            traits: traits.clone(),
        };
    }
    ProviderDecision {
        provider: "azure",
        reason: SelectionReason::DefaultStructured,
        traits: traits.clone(),
    }
}

fn candidate_available(candidate: &str, settings: &Settings) -> bool {
    match candidate {
        "azure" => settings.azure_di_endpoint.is_some() && settings.azure_di_key.is_some(),
        "textract" => settings.aws_textract_region.is_some(),
        "tesseract" => true,
        _ => false,
    }
}

fn prefer_available_provider(candidate: &'static str, settings: &Settings) -> &'static str {
    if candidate_available(candidate, settings) {
        candidate
    } else {
        "tesseract"
    }
}

/// Resolve the provider name honoring `OCR_PROVIDER_MODE` (explicit vs auto)
/// and, in auto mode, falling back down `azure -> textract -> tesseract`
/// when the selected candidate lacks credentials.
pub fn resolve_provider_name(
    settings: &Settings,
    metadata: &serde_json::Value,
) -> ledger_core::Result<(String, Option<ProviderDecision>)> {
    let mode = settings.ocr_provider_mode.to_lowercase();
    match mode.as_str() {
        "explicit" => {
            let explicit = settings.ocr_provider.clone().unwrap_or_default().to_lowercase();
            if !ALLOWED_PROVIDERS.contains(&explicit.as_str()) {
                return Err(ledger_core::Error::InvalidInput(
                    "OCR_PROVIDER must be set when mode=explicit".into(),
                ));
            }
            Ok((explicit, None))
        }
        "auto" => {
            let traits = traits_from_metadata(metadata);
            let decision = select_provider(&traits, metadata);

            let mut ordered: Vec<&'static str> = vec![decision.provider];
            for fallback in FALLBACK_CHAIN {
                if !ordered.contains(&fallback) {
                    ordered.push(fallback);
                }
            }

            for candidate in ordered {
                let resolved = prefer_available_provider(candidate, settings);
                if ALLOWED_PROVIDERS.contains(&resolved) && candidate_available(resolved, settings) {
                    return Ok((resolved.to_string(), Some(decision)));
                }
            }
            Ok(("tesseract".to_string(), Some(decision)))
        }
        other => Err(ledger_core::Error::InvalidInput(format!(
            "unsupported OCR provider mode: {other}"
        ))),
    }
}

/// Convenience helper building the metadata object from a plain map, for
/// call sites that assemble traits without a full `serde_json::Value` job
/// payload in hand.
pub fn metadata_from_pairs(pairs: HashMap<&str, serde_json::Value>) -> serde_json::Value {
    serde_json::Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preferred_provider_wins_outright() {
        let traits = DocumentTraits::default();
        let metadata = json!({"preferred_provider": "textract"});
        let decision = select_provider(&traits, &metadata);
        assert_eq!(decision.provider, "textract");
        assert_eq!(decision.reason, SelectionReason::PreferredProvider);
    }

    #[test]
    fn cost_sensitive_forces_tesseract() {
        let traits = DocumentTraits {
            cost_sensitive: true,
            ..Default::default()
        };
        let decision = select_provider(&traits, &json!({}));
        assert_eq!(decision.provider, "tesseract");
    }

    #[test]
    fn long_low_raster_document_prefers_tesseract() {
        let traits = DocumentTraits {
            page_count: 41,
            raster_ratio: 0.2,
            ..Default::default()
        };
        assert_eq!(select_provider(&traits, &json!({})).provider, "tesseract");
    }

    #[test]
    fn high_raster_prefers_textract() {
        let traits = DocumentTraits {
            raster_ratio: 0.7,
            ..Default::default()
        };
        assert_eq!(select_provider(&traits, &json!({})).provider, "textract");
    }

    #[test]
    fn structured_form_prefers_azure() {
        let traits = DocumentTraits {
            table_merges: 3,
            ..Default::default()
        };
        assert_eq!(select_provider(&traits, &json!({})).provider, "azure");
    }

    #[test]
    fn default_falls_through_to_azure() {
        let traits = DocumentTraits::default();
        assert_eq!(select_provider(&traits, &json!({})).provider, "azure");
    }

    #[test]
    fn budget_gate_disabled_at_zero_ceiling() {
        let (allowed, estimate) = budget_allows(100, 0, 5);
        assert!(allowed);
        assert_eq!(estimate, 500);
    }

    #[test]
    fn budget_gate_rejects_over_ceiling() {
        let (allowed, estimate) = budget_allows(100, 400, 5);
        assert!(!allowed);
        assert_eq!(estimate, 500);
    }
}
