use serde::{Deserialize, Serialize};

/// Business metadata for one application, keyed by its AppId.
///
/// Field names follow the stored document layout (`id`, `appName`, `owner`,
/// `ctime`). Extra system fields returned by the store are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadataRecord {
    pub id: String,
    #[serde(rename = "appName", default)]
    pub app_name: String,
    #[serde(default)]
    pub owner: String,
    /// Creation time as supplied by the dataset. `None` when unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<String>,
}

impl AppMetadataRecord {
    pub fn new<I, N, O>(id: I, app_name: N, owner: O, ctime: Option<String>) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        O: Into<String>,
    {
        AppMetadataRecord {
            id: id.into(),
            app_name: app_name.into(),
            owner: owner.into(),
            ctime,
        }
    }
}
