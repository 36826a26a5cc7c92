use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::{Block, Document, FeatureType};
use aws_sdk_textract::Client as TextractClient;
use ledger_core::model::OcrCell;
use ledger_core::Error;

use crate::provider::{parse_numeric_hint, OcrProvider, ProviderError, ProviderResult};

/// AWS Textract `AnalyzeDocument` (TABLES feature), grounded on the
/// original's boto3 client with a two-attempt retry config baked into the
/// SDK client itself; the runtime layer above adds the shared circuit
/// breaker + token bucket on top.
pub struct TextractProvider {
    client: TextractClient,
}

impl TextractProvider {
    pub async fn new(
        region: impl Into<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
    ) -> ledger_core::Result<Self> {
        let region = region.into();
        if region.is_empty() {
            return Err(Error::InvalidInput("AWS_TEXTRACT_REGION is required".into()));
        }
        let mut loader = aws_config::from_env().region(aws_config::Region::new(region));
        if let (Some(access_key), Some(secret_key)) = (access_key, secret_key) {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "ledger-ocr",
            ));
        }
        let config = loader.load().await;
        Ok(Self {
            client: TextractClient::new(&config),
        })
    }
}

#[async_trait]
impl OcrProvider for TextractProvider {
    fn name(&self) -> &'static str {
        "textract"
    }

    async fn extract_cells(
        &self,
        document_path: &Path,
        _max_pages: Option<i32>,
        _timeout_ms: Option<u64>,
    ) -> ProviderResult<Vec<OcrCell>> {
        let payload = tokio::fs::read(document_path)
            .await
            .map_err(|e| ProviderError::Other(Error::InvalidInput(format!("read document failed: {e}"))))?;

        let document = Document::builder().bytes(Blob::new(payload)).build();
        let result = self
            .client
            .analyze_document()
            .document(document)
            .feature_types(FeatureType::Tables)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(err) => {
                let code = err
                    .as_service_error()
                    .and_then(|e| e.meta().code())
                    .unwrap_or_default();
                if code == "ProvisionedThroughputExceededException" || code == "ThrottlingException" {
                    return Err(ProviderError::RateLimited { retry_after: None });
                }
                return Err(ProviderError::Other(Error::Transient(format!(
                    "textract invocation failed: {err}"
                ))));
            }
        };

        let blocks = response.blocks();
        let block_map: HashMap<&str, &Block> = blocks
            .iter()
            .filter_map(|b| b.id().map(|id| (id, b)))
            .collect();

        let mut cells = Vec::new();
        for block in blocks {
            if block.block_type() != Some(&aws_sdk_textract::types::BlockType::Cell) {
                continue;
            }
            let text = resolve_cell_text(block, &block_map);
            let (is_numeric, numeric_value) = parse_numeric_hint(&text);
            cells.push(OcrCell {
                page: block.page().unwrap_or(1),
                row: block.row_index().unwrap_or(0),
                column: block.column_index().unwrap_or(0),
                text,
                is_numeric,
                numeric_value,
            });
        }
        Ok(cells)
    }
}

fn resolve_cell_text(cell_block: &Block, block_map: &HashMap<&str, &Block>) -> String {
    let mut texts = Vec::new();
    for relation in cell_block.relationships() {
        if relation.r#type() != Some(&aws_sdk_textract::types::RelationshipType::Child) {
            continue;
        }
        for child_id in relation.ids() {
            let Some(child) = block_map.get(child_id.as_str()) else {
                continue;
            };
            match child.block_type() {
                Some(aws_sdk_textract::types::BlockType::Word) => {
                    if let Some(text) = child.text() {
                        texts.push(text.to_string());
                    }
                }
                Some(aws_sdk_textract::types::BlockType::SelectionElement) => {
                    if child.selection_status() == Some(&aws_sdk_textract::types::SelectionStatus::Selected) {
                        texts.push("X".to_string());
                    }
                }
                _ => {}
            }
        }
    }
    texts.join(" ").trim().to_string()
}
