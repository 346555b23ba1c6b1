use crate::config::BlobConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

const STORAGE_API_VERSION: &str = "2021-08-06";

#[derive(thiserror::Error, Debug)]
pub enum BlobError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("blob storage returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid container URL: {0}")]
    InvalidUrl(String),
    #[error("blob is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[async_trait]
pub trait BlobSource: Send + Sync {
    async fn download_text(&self, name: &str) -> Result<String, BlobError>;
}

/// Blob name from a trigger path of the form `<container>/<name>`.
///
/// Paths without a container prefix are returned unchanged.
pub fn blob_name(path: &str) -> &str {
    path.split_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Reads blobs from one container, authorised by a SAS token.
pub struct BlobClient {
    client: reqwest::Client,
    container_url: Url,
    sas_token: String,
}

impl BlobClient {
    pub fn new(config: &BlobConfig) -> Self {
        BlobClient {
            client: reqwest::Client::new(),
            container_url: config.container_url.clone(),
            sas_token: config.sas_token.trim_start_matches('?').to_string(),
        }
    }

    fn blob_url(&self, name: &str) -> Result<Url, BlobError> {
        let mut url = self.container_url.clone();
        url.path_segments_mut()
            .map_err(|_| BlobError::InvalidUrl(self.container_url.to_string()))?
            .pop_if_empty()
            .extend(name.split('/'));
        if !self.sas_token.is_empty() {
            url.set_query(Some(&self.sas_token));
        }
        Ok(url)
    }
}

#[async_trait]
impl BlobSource for BlobClient {
    async fn download_text(&self, name: &str) -> Result<String, BlobError> {
        let url = self.blob_url(name)?;
        tracing::debug!(blob = name, "Downloading blob");

        let response = self
            .client
            .get(url)
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlobError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}
