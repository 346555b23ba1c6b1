//! Cosmos DB (SQL API) backend, spoken over the REST interface.
//!
//! Requests are signed with the account master key as described in
//! "Access control in the Azure Cosmos DB SQL API": an HMAC-SHA256 over the
//! lowercased verb, resource type, resource link and date.

use crate::config::CosmosConfig;
use crate::metrics_defs::{STORE_REQUEST_DURATION, STORE_REQUEST_FAILURE};
use crate::{AppMetadataRecord, MetadataStore, StoreError};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shared::{counter, histogram};
use std::time::Instant;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2018-12-31";
const CONTINUATION_HEADER: &str = "x-ms-continuation";
const FIND_BY_ID_QUERY: &str = "SELECT * FROM c WHERE c.id = @id";

#[derive(Serialize)]
struct QueryParameter<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    parameters: Vec<QueryParameter<'a>>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(rename = "Documents")]
    documents: Vec<AppMetadataRecord>,
}

pub struct CosmosMetadataStore {
    client: reqwest::Client,
    docs_url: Url,
    // `dbs/{db}/colls/{coll}`, the resource link signed for document requests
    collection_link: String,
    key: Vec<u8>,
}

impl CosmosMetadataStore {
    pub fn new(config: &CosmosConfig) -> Result<Self, StoreError> {
        let key = STANDARD.decode(config.key.trim())?;
        let collection_link = format!("dbs/{}/colls/{}", config.database, config.container);
        let docs_url = config
            .url
            .join(&format!("{collection_link}/docs"))
            .map_err(|e| StoreError::InvalidUrl(e.to_string()))?;

        Ok(CosmosMetadataStore {
            client: reqwest::Client::new(),
            docs_url,
            collection_link,
            key,
        })
    }

    /// Builds the url-encoded `Authorization` header value for a request.
    fn authorization(&self, verb: &str, resource_type: &str, date: &str) -> String {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type.to_lowercase(),
            self.collection_link,
            date.to_lowercase()
        );

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let token = format!("type=master&ver=1.0&sig={signature}");
        url::form_urlencoded::byte_serialize(token.as_bytes()).collect()
    }

    fn signed_headers(&self, verb: &str) -> Result<HeaderMap, StoreError> {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let authorization = self.authorization(verb, "docs", &date);

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-date", header_value(&date)?);
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert("authorization", header_value(&authorization)?);
        Ok(headers)
    }

    async fn query_by_id(&self, id: &str) -> Result<Option<AppMetadataRecord>, StoreError> {
        let body = serde_json::to_vec(&QueryBody {
            query: FIND_BY_ID_QUERY,
            parameters: vec![QueryParameter { name: "@id", value: id }],
        })?;

        let mut found = None;
        let mut continuation: Option<String> = None;

        loop {
            let mut headers = self.signed_headers("POST")?;
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/query+json"),
            );
            headers.insert("x-ms-documentdb-isquery", HeaderValue::from_static("True"));
            headers.insert(
                "x-ms-documentdb-query-enablecrosspartition",
                HeaderValue::from_static("True"),
            );
            if let Some(token) = &continuation {
                headers.insert(CONTINUATION_HEADER, header_value(token)?);
            }

            let response = self
                .client
                .post(self.docs_url.clone())
                .headers(headers)
                .body(body.clone())
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Status { status, body });
            }

            continuation = response
                .headers()
                .get(CONTINUATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);

            let page: QueryResponse = serde_json::from_slice(&response.bytes().await?)?;
            // Ids are unique, but if several documents match the last one wins
            if let Some(record) = page.documents.into_iter().last() {
                found = Some(record);
            }

            if continuation.is_none() {
                break;
            }
        }

        Ok(found)
    }

    async fn upsert_document(&self, record: &AppMetadataRecord) -> Result<(), StoreError> {
        let partition_key = serde_json::to_string(&[&record.id])?;

        let mut headers = self.signed_headers("POST")?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-ms-documentdb-is-upsert", HeaderValue::from_static("True"));
        headers.insert(
            "x-ms-documentdb-partitionkey",
            header_value(&partition_key)?,
        );

        let response = self
            .client
            .post(self.docs_url.clone())
            .headers(headers)
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, StoreError> {
    HeaderValue::from_str(value).map_err(|e| StoreError::InvalidUrl(e.to_string()))
}

fn record_outcome<T>(op: &'static str, started: Instant, result: &Result<T, StoreError>) {
    histogram!(STORE_REQUEST_DURATION, "op" => op).record(started.elapsed().as_secs_f64());
    if let Err(e) = result {
        counter!(STORE_REQUEST_FAILURE, "op" => op).increment(1);
        tracing::warn!(op, error = %e, "Metadata store request failed");
    }
}

#[async_trait]
impl MetadataStore for CosmosMetadataStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<AppMetadataRecord>, StoreError> {
        let started = Instant::now();
        let result = self.query_by_id(id).await;
        record_outcome("find_by_id", started, &result);
        result
    }

    async fn upsert(&self, record: &AppMetadataRecord) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = self.upsert_document(record).await;
        record_outcome("upsert", started, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(uri: &str) -> CosmosMetadataStore {
        CosmosMetadataStore::new(&CosmosConfig {
            url: Url::parse(uri).unwrap(),
            // base64("autotag-test-master-key")
            key: "YXV0b3RhZy10ZXN0LW1hc3Rlci1rZXk=".into(),
            database: "tags".into(),
            container: "apps".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_authorization_signature() {
        let store = store_for("https://autotag.documents.azure.com");
        let auth = store.authorization("POST", "docs", "Tue, 01 Sep 2026 10:00:00 GMT");
        assert_eq!(
            auth,
            "type%3Dmaster%26ver%3D1.0%26sig%3DWFSZ22p1o1lEiPO0MU1EUIjKQ5V1Hvqb%2F1NnLZptaBE%3D"
        );
    }

    #[test]
    fn test_invalid_key() {
        let result = CosmosMetadataStore::new(&CosmosConfig {
            url: Url::parse("https://autotag.documents.azure.com").unwrap(),
            key: "not base64!".into(),
            database: "tags".into(),
            container: "apps".into(),
        });
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dbs/tags/colls/apps/docs"))
            .and(header("x-ms-documentdb-isquery", "True"))
            .and(header("content-type", "application/query+json"))
            .and(header_exists("authorization"))
            .and(header_exists("x-ms-date"))
            .and(body_json(serde_json::json!({
                "query": "SELECT * FROM c WHERE c.id = @id",
                "parameters": [{"name": "@id", "value": "APP-42"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"_rid": "x", "Documents": [
                    {"id": "APP-42", "appName": "Payments", "owner": "jdoe", "ctime": "", "_ts": 1}
                ], "_count": 1}"#,
            ))
            .mount(&mock_server)
            .await;

        let store = store_for(&mock_server.uri());
        let record = store.find_by_id("APP-42").await.unwrap().unwrap();
        assert_eq!(record.app_name, "Payments");
        assert_eq!(record.owner, "jdoe");
    }

    #[tokio::test]
    async fn test_find_by_id_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dbs/tags/colls/apps/docs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"Documents": [], "_count": 0}"#),
            )
            .mount(&mock_server)
            .await;

        let store = store_for(&mock_server.uri());
        assert_eq!(store.find_by_id("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_by_id_follows_continuation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dbs/tags/colls/apps/docs"))
            .and(header("x-ms-continuation", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Documents": [{"id": "A", "appName": "Second", "owner": "o"}]}"#,
            ))
            .with_priority(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/dbs/tags/colls/apps/docs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-continuation", "page-2")
                    .set_body_string(r#"{"Documents": []}"#),
            )
            .with_priority(2)
            .mount(&mock_server)
            .await;

        let store = store_for(&mock_server.uri());
        let record = store.find_by_id("A").await.unwrap().unwrap();
        assert_eq!(record.app_name, "Second");
    }

    #[tokio::test]
    async fn test_query_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dbs/tags/colls/apps/docs"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&mock_server)
            .await;

        let store = store_for(&mock_server.uri());
        match store.find_by_id("A").await {
            Err(StoreError::Status { status, body }) => {
                assert_eq!(status, http::StatusCode::UNAUTHORIZED);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upsert() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dbs/tags/colls/apps/docs"))
            .and(header("x-ms-documentdb-is-upsert", "True"))
            .and(header("x-ms-documentdb-partitionkey", r#"["APP-1"]"#))
            .and(body_json(serde_json::json!({
                "id": "APP-1", "appName": "Billing", "owner": "alice", "ctime": "2023-05-01"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = store_for(&mock_server.uri());
        store
            .upsert(&AppMetadataRecord::new(
                "APP-1",
                "Billing",
                "alice",
                Some("2023-05-01".into()),
            ))
            .await
            .unwrap();
    }
}
