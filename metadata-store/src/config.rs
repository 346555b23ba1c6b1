use serde::Deserialize;
use url::Url;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("metadata store field {0} cannot be empty")]
    EmptyField(&'static str),
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CosmosConfig {
    /// Account endpoint, e.g. `https://<account>.documents.azure.com`
    pub url: Url,
    /// Base64 encoded master key
    pub key: String,
    pub database: String,
    pub container: String,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum MetadataStoreConfig {
    Cosmos(CosmosConfig),
    /// Process-local store. Contents are lost on restart.
    Memory,
}

impl MetadataStoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            MetadataStoreConfig::Cosmos(cosmos) => {
                for (name, value) in [
                    ("key", &cosmos.key),
                    ("database", &cosmos.database),
                    ("container", &cosmos.container),
                ] {
                    if value.trim().is_empty() {
                        return Err(ValidationError::EmptyField(name));
                    }
                }
                Ok(())
            }
            MetadataStoreConfig::Memory => Ok(()),
        }
    }
}
