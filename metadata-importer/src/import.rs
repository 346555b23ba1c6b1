use crate::blob::{BlobError, BlobSource, blob_name};
use crate::dataset::{self, DatasetError};
use crate::metrics_defs::{IMPORT_FAILURE, IMPORT_ROWS_SKIPPED, IMPORT_ROWS_UPSERTED};
use metadata_store::{MetadataStore, StoreError};
use serde::Serialize;
use shared::counter;
use shared::notify::Notifier;
use std::sync::Arc;

const NOTIFY_SUBJECT: &str = "Unsuccessful CosmosDB CSV Update";

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("could not download dataset: {0}")]
    Blob(#[from] BlobError),
    #[error("could not upsert record {id}: {source}")]
    Store {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl ImportError {
    fn kind(&self) -> &'static str {
        match self {
            ImportError::Encoding(_) => "encoding",
            ImportError::Dataset(_) => "dataset",
            ImportError::Blob(_) => "blob",
            ImportError::Store { .. } => "store",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub upserted: usize,
    pub skipped: usize,
}

/// Loads AppId metadata datasets into the metadata store.
#[derive(Clone)]
pub struct Importer {
    store: Arc<dyn MetadataStore>,
    notifier: Arc<dyn Notifier>,
}

impl Importer {
    pub fn new(store: Arc<dyn MetadataStore>, notifier: Arc<dyn Notifier>) -> Self {
        Importer { store, notifier }
    }

    /// Imports a dataset and reports the outcome under `name`.
    ///
    /// Stops at the first record the store rejects. Records written before
    /// that stay written.
    pub async fn import_text(&self, name: &str, text: &str) -> Result<ImportSummary, ImportError> {
        let result = self.upsert_all(text).await;
        self.finish(name, result).await
    }

    pub async fn import_bytes(&self, name: &str, body: &[u8]) -> Result<ImportSummary, ImportError> {
        match std::str::from_utf8(body) {
            Ok(text) => self.import_text(name, text).await,
            Err(e) => self.finish(name, Err(e.into())).await,
        }
    }

    /// Downloads `path` (`<container>/<name>` or a bare blob name) and imports it.
    pub async fn import_blob(
        &self,
        source: &dyn BlobSource,
        path: &str,
    ) -> Result<ImportSummary, ImportError> {
        match source.download_text(blob_name(path)).await {
            Ok(text) => self.import_text(path, &text).await,
            Err(e) => self.finish(path, Err(e.into())).await,
        }
    }

    async fn upsert_all(&self, text: &str) -> Result<ImportSummary, ImportError> {
        let dataset = dataset::parse(text)?;
        let mut summary = ImportSummary {
            upserted: 0,
            skipped: dataset.skipped,
        };
        counter!(IMPORT_ROWS_SKIPPED).increment(dataset.skipped as u64);

        for record in &dataset.records {
            self.store
                .upsert(record)
                .await
                .map_err(|source| ImportError::Store {
                    id: record.id.clone(),
                    source,
                })?;
            summary.upserted += 1;
            counter!(IMPORT_ROWS_UPSERTED).increment(1);
        }

        Ok(summary)
    }

    async fn finish(
        &self,
        name: &str,
        result: Result<ImportSummary, ImportError>,
    ) -> Result<ImportSummary, ImportError> {
        match &result {
            Ok(summary) => {
                tracing::info!(
                    name,
                    upserted = summary.upserted,
                    skipped = summary.skipped,
                    "Imported dataset"
                );
            }
            Err(e) => {
                counter!(IMPORT_FAILURE, "reason" => e.kind()).increment(1);
                tracing::error!(name, error = %e, "Dataset import failed");

                let message = format!("CSV tag data update was unsuccessful for Filename: {name}");
                if let Err(e) = self.notifier.notify(NOTIFY_SUBJECT, &message).await {
                    tracing::warn!(name, error = %e, "Could not send failure notification");
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use metadata_store::AppMetadataRecord;
    use metadata_store::memory::InMemoryMetadataStore;
    use shared::testutils::RecordingNotifier;

    const DATASET: &str = "\u{feff}id,appName,owner,ctime\r\n\
                           APP-1,Payments,jdoe,2023-04-01\r\n\
                           APP-2,Ledger,asmith,\r\n\
                           APP-3,Search\r\n";

    struct StaticBlob(Result<String, ()>);

    #[async_trait]
    impl BlobSource for StaticBlob {
        async fn download_text(&self, name: &str) -> Result<String, BlobError> {
            assert_eq!(name, "apps.csv");
            self.0.clone().map_err(|_| BlobError::InvalidUrl("unreachable".into()))
        }
    }

    fn importer() -> (Arc<InMemoryMetadataStore>, Arc<RecordingNotifier>, Importer) {
        let store = Arc::new(InMemoryMetadataStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let importer = Importer::new(store.clone(), notifier.clone());
        (store, notifier, importer)
    }

    #[tokio::test]
    async fn test_import() {
        let (store, notifier, importer) = importer();

        let summary = importer.import_text("apps.csv", DATASET).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                upserted: 2,
                skipped: 1
            }
        );

        let contents = store.snapshot();
        assert_eq!(
            contents.get("APP-1"),
            Some(&AppMetadataRecord::new(
                "APP-1",
                "Payments",
                "jdoe",
                Some("2023-04-01".into())
            ))
        );
        assert_eq!(contents.get("APP-2").unwrap().ctime, None);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_import_twice_is_idempotent() {
        let (store, _, importer) = importer();

        importer.import_text("apps.csv", DATASET).await.unwrap();
        let once = store.snapshot();
        importer.import_text("apps.csv", DATASET).await.unwrap();
        assert_eq!(store.snapshot(), once);
    }

    #[tokio::test]
    async fn test_import_overwrites_existing_records() {
        let store = Arc::new(InMemoryMetadataStore::with_records([
            AppMetadataRecord::new("APP-1", "Old name", "someone", Some("2020-01-01".into())),
        ]));
        let importer = Importer::new(store.clone(), Arc::new(RecordingNotifier::new()));

        importer.import_text("apps.csv", DATASET).await.unwrap();
        assert_eq!(store.snapshot()["APP-1"].app_name, "Payments");
    }

    #[tokio::test]
    async fn test_upsert_failure_stops_import() {
        let (store, notifier, importer) = importer();
        store.fail_for("APP-2");

        let err = importer.import_text("apps.csv", DATASET).await.unwrap_err();
        assert!(matches!(err, ImportError::Store { ref id, .. } if id == "APP-2"));

        // Rows before the failure stay written
        assert!(store.snapshot().contains_key("APP-1"));

        assert_eq!(
            notifier.sent(),
            vec![(
                "Unsuccessful CosmosDB CSV Update".to_string(),
                "CSV tag data update was unsuccessful for Filename: apps.csv".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_body() {
        let (store, notifier, importer) = importer();

        let err = importer
            .import_bytes("upload", &[0xff, 0xfe, b'a'])
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Encoding(_)));
        assert!(store.snapshot().is_empty());
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_import_blob() {
        let (store, notifier, importer) = importer();

        let source = StaticBlob(Ok(DATASET.to_string()));
        let summary = importer
            .import_blob(&source, "tagdata/apps.csv")
            .await
            .unwrap();
        assert_eq!(summary.upserted, 2);
        assert_eq!(store.snapshot().len(), 2);

        let failing = StaticBlob(Err(()));
        let err = importer
            .import_blob(&failing, "tagdata/apps.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Blob(_)));
        assert_eq!(
            notifier.sent()[0].1,
            "CSV tag data update was unsuccessful for Filename: tagdata/apps.csv"
        );
    }
}
