use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("credential field {0} cannot be empty")]
    EmptyCredentialField(&'static str),

    #[error("tag prefix cannot contain whitespace")]
    InvalidTagPrefix,
}

fn default_arm_url() -> Url {
    Url::parse("https://management.azure.com").expect("static URL is valid")
}

fn default_authority() -> Url {
    Url::parse("https://login.microsoftonline.com").expect("static URL is valid")
}

fn default_tag_prefix() -> String {
    "bax-".into()
}

/// How the reconciler authenticates against the resource manager
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum CredentialsConfig {
    /// OAuth2 client-credentials flow against the identity platform
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
        #[serde(default = "default_authority")]
        authority: Url,
    },
    /// Pre-acquired bearer token, mostly useful for local runs
    StaticToken { token: String },
}

/// Tag reconciler configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Base URL of the resource manager API
    #[serde(default = "default_arm_url")]
    pub arm_url: Url,
    /// Prefix of every tag key written by the reconciler (`<prefix>appname`, ...)
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
    /// Send a notification for every resource that could not be tagged
    #[serde(default)]
    pub notify_on_failure: bool,
    pub credentials: CredentialsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tag_prefix.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidTagPrefix);
        }

        match &self.credentials {
            CredentialsConfig::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
                ..
            } => {
                for (name, value) in [
                    ("tenant_id", tenant_id),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                ] {
                    if value.is_empty() {
                        return Err(ValidationError::EmptyCredentialField(name));
                    }
                }
            }
            CredentialsConfig::StaticToken { token } => {
                if token.is_empty() {
                    return Err(ValidationError::EmptyCredentialField("token"));
                }
            }
        }

        Ok(())
    }
}
