use serde::Deserialize;
use url::Url;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("blob container URL must name a container: {0}")]
    MissingContainer(Url),
}

/// Container the dataset blobs are uploaded to
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BlobConfig {
    /// e.g. `https://<account>.blob.core.windows.net/tagdata`
    pub container_url: Url,
    /// Shared access signature with read permission, with or without the leading `?`
    #[serde(default)]
    pub sas_token: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub blob: Option<BlobConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(blob) = &self.blob {
            let has_container = blob
                .container_url
                .path_segments()
                .is_some_and(|mut segments| segments.any(|s| !s.is_empty()));
            if !has_container {
                return Err(ValidationError::MissingContainer(
                    blob.container_url.clone(),
                ));
            }
        }
        Ok(())
    }
}
