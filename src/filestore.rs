use async_trait::async_trait;
use std::path::PathBuf;

use crate::errors::ConnectorError;
use crate::models::Bill;

/// Binary document storage, deduplicating by file name.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, file_name: &str) -> bool;

    /// Stores `bytes` under `file_name` and returns the stored path.
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String, ConnectorError>;
}

/// Filesystem-backed store rooted at the configured bills directory.
pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, file_name: &str) -> bool {
        tokio::fs::try_exists(self.path_for(file_name))
            .await
            .unwrap_or(false)
    }

    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String, ConnectorError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ConnectorError::File(format!("Failed to create bills dir: {}", e)))?;

        let path = self.path_for(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ConnectorError::File(format!("Failed to write {}: {}", file_name, e)))?;

        Ok(path.to_string_lossy().into_owned())
    }
}

/// File name for a bill document: vendor, emission month and invoice
/// number make it stable across runs (dedup key).
pub fn bill_file_name(bill: &Bill) -> String {
    format!("EDF_{}_{}.pdf", bill.date.format("%m%Y"), bill.number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VENDOR;
    use chrono::NaiveDate;

    fn sample_bill() -> Bill {
        Bill {
            vendor: VENDOR.to_string(),
            client_id: "C1".to_string(),
            number: "F042".to_string(),
            date: NaiveDate::from_ymd_opt(2016, 3, 1).unwrap(),
            title: None,
            payment_due_date: None,
            scheduled_payment_date: None,
            total_payment_due: None,
            value: None,
            balance_before_invoice: None,
            pdfurl: None,
        }
    }

    #[test]
    fn bill_file_name_is_stable() {
        assert_eq!(bill_file_name(&sample_bill()), "EDF_032016_F042.pdf");
    }

    #[tokio::test]
    async fn save_then_exists_roundtrip() {
        let dir = std::env::temp_dir().join(format!(
            "edf-connector-test-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let files = LocalFileStore::new(&dir);

        assert!(!files.exists("EDF_032016_F042.pdf").await);
        let path = files.save("EDF_032016_F042.pdf", b"%PDF-1.4").await.unwrap();
        assert!(files.exists("EDF_032016_F042.pdf").await);
        assert!(path.ends_with("EDF_032016_F042.pdf"));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
