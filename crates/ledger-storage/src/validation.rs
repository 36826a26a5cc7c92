use ledger_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct ObjectValidation {
    pub min_size_bytes: i64,
    pub max_size_bytes: i64,
    pub allowed_content_types: Vec<String>,
}

impl Default for ObjectValidation {
    fn default() -> Self {
        Self {
            min_size_bytes: 1,
            max_size_bytes: 200 * 1024 * 1024,
            allowed_content_types: vec!["application/pdf".to_string()],
        }
    }
}

impl ObjectValidation {
    pub fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidInput("object key must not be empty".into()));
        }
        Ok(())
    }

    pub fn validate_put(&self, key: &str, content_type: &str, size: i64) -> Result<()> {
        self.validate_key(key)?;
        if size < self.min_size_bytes || size > self.max_size_bytes {
            return Err(Error::InvalidInput(format!(
                "size {size} outside allowed range [{}, {}]",
                self.min_size_bytes, self.max_size_bytes
            )));
        }
        if !self.allowed_content_types.iter().any(|t| t == content_type) {
            return Err(Error::InvalidInput(format!(
                "content type {content_type} not in allowlist"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_sizes_accepted() {
        let v = ObjectValidation {
            min_size_bytes: 10,
            max_size_bytes: 20,
            allowed_content_types: vec!["application/pdf".into()],
        };
        assert!(v.validate_put("k", "application/pdf", 10).is_ok());
        assert!(v.validate_put("k", "application/pdf", 20).is_ok());
        assert!(v.validate_put("k", "application/pdf", 9).is_err());
        assert!(v.validate_put("k", "application/pdf", 21).is_err());
    }
}
