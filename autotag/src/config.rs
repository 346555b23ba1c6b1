use metadata_store::config::MetadataStoreConfig;
use serde::Deserialize;
use shared::notify::SmtpConfig;
use std::fs::File;
use tag_reconciler::config::Config as ReconcilerConfig;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

fn default_listener() -> Listener {
    Listener {
        host: "0.0.0.0".into(),
        port: 8080,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 8081,
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub logging: Option<LoggingConfig>,
    pub metrics: Option<MetricsConfig>,
    #[serde(default = "default_listener")]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    pub reconciler: ReconcilerConfig,
    pub metadata_store: MetadataStoreConfig,
    #[serde(default)]
    pub importer: metadata_importer::config::Config,
    /// Absent means failures are only logged
    pub notifications: Option<SmtpConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, listener) in [
            ("listener", &self.listener),
            ("admin_listener", &self.admin_listener),
        ] {
            if listener.port == 0 {
                return Err(ConfigError::Invalid(format!("{name} port cannot be 0")));
            }
        }
        if let Some(metrics) = &self.metrics
            && metrics.statsd_port == 0
        {
            return Err(ConfigError::Invalid("statsd port cannot be 0".into()));
        }

        self.reconciler
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.metadata_store
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.importer
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tag_reconciler::config::CredentialsConfig;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            logging:
                sentry_dsn: https://key@sentry.example.com/1
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            listener:
                host: 0.0.0.0
                port: 7071
            admin_listener:
                host: 127.0.0.1
                port: 7072
            reconciler:
                tag_prefix: bax-
                notify_on_failure: true
                credentials:
                    type: client_secret
                    tenant_id: tenant
                    client_id: client
                    client_secret: secret
            metadata_store:
                type: cosmos
                url: https://autotag.documents.azure.com
                key: c2VjcmV0
                database: tags
                container: apps
            importer:
                blob:
                    container_url: https://autotag.blob.core.windows.net/tagdata
                    sas_token: sv=2022-11-02&sig=abc
            notifications:
                smtp_host: smtp.example.com
                from: autotag@example.com
                to: ops@example.com
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.listener.port, 7071);
        assert_eq!(config.admin_listener.port, 7072);
        assert_eq!(
            config.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125
            })
        );
        assert!(config.reconciler.notify_on_failure);
        assert!(matches!(
            config.reconciler.credentials,
            CredentialsConfig::ClientSecret { .. }
        ));
        assert!(matches!(
            config.metadata_store,
            MetadataStoreConfig::Cosmos(_)
        ));
        assert!(config.importer.blob.is_some());
        assert_eq!(config.notifications.expect("notifications").smtp_port, 587);
    }

    #[test]
    fn minimal_config() {
        let yaml = r#"
            reconciler:
                credentials:
                    type: static_token
                    token: abc
            metadata_store:
                type: memory
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.listener, default_listener());
        assert_eq!(config.admin_listener, default_admin_listener());
        assert!(config.logging.is_none());
        assert!(config.notifications.is_none());
        assert!(config.importer.blob.is_none());
    }

    #[test]
    fn invalid_config() {
        let yaml = r#"
            listener:
                host: 0.0.0.0
                port: 0
            reconciler:
                credentials:
                    type: static_token
                    token: abc
            metadata_store:
                type: memory
            "#;
        let tmp = write_tmp_file(yaml);
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));

        let yaml = r#"
            reconciler:
                credentials:
                    type: static_token
                    token: abc
            metadata_store:
                type: cosmos
                url: https://autotag.documents.azure.com
                key: ""
                database: tags
                container: apps
            "#;
        let tmp = write_tmp_file(yaml);
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/autotag.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
