//! Persistence of scraped bill text.
//!
//! [`CosmosStore`] talks to the Azure Cosmos DB SQL REST API directly with master-key
//! authorization. [`MemoryStore`] keeps documents in process.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde_json::json;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreSettings;
use crate::error::{AppError, Result};
use crate::models::ScrapedDocument;

const API_VERSION: &str = "2018-12-31";

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upsert a document keyed by its id
    async fn create_document(&self, document: &ScrapedDocument) -> Result<()>;

    /// Read a document back by id
    async fn read_document(&self, id: Uuid) -> Result<Option<ScrapedDocument>>;
}

pub struct CosmosStore {
    client: Client,
    settings: StoreSettings,
    key: Vec<u8>,
}

impl CosmosStore {
    pub fn new(settings: StoreSettings) -> Result<Self> {
        let key = BASE64
            .decode(settings.account_key.trim())
            .map_err(|e| AppError::ConfigError(format!("ACCOUNT_KEY is not valid base64: {}", e)))?;
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build store client: {}", e)))?;

        Ok(Self { client, settings, key })
    }

    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.settings.database, self.settings.container)
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.settings.endpoint.trim_end_matches('/'), path)
    }

    /// Creates the database and the `/id`-partitioned container when missing.
    pub async fn ensure_container(&self) -> Result<()> {
        let db_body = json!({ "id": self.settings.database });
        let response = self
            .request(Method::POST, "dbs", "dbs", "")?
            .json(&db_body)
            .send()
            .await
            .map_err(store_error)?;
        accept_existing(response, "database").await?;

        let db_link = format!("dbs/{}", self.settings.database);
        let coll_body = json!({
            "id": self.settings.container,
            "partitionKey": { "paths": ["/id"], "kind": "Hash" },
        });
        let response = self
            .request(Method::POST, &format!("{}/colls", db_link), "colls", &db_link)?
            .json(&coll_body)
            .send()
            .await
            .map_err(store_error)?;
        accept_existing(response, "container").await?;

        info!(
            database = %self.settings.database,
            container = %self.settings.container,
            "Document container ready"
        );
        Ok(())
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        resource_type: &str,
        resource_link: &str,
    ) -> Result<reqwest::RequestBuilder> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let token = auth_token(&self.key, method.as_str(), resource_type, resource_link, &date)?;

        Ok(self
            .client
            .request(method, self.url_for(path))
            .header("authorization", token)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION))
    }
}

#[async_trait]
impl DocumentStore for CosmosStore {
    async fn create_document(&self, document: &ScrapedDocument) -> Result<()> {
        let link = self.collection_link();
        let partition_key = json!([document.id.to_string()]).to_string();

        let response = self
            .request(Method::POST, &format!("{}/docs", link), "docs", &link)?
            .header("x-ms-documentdb-partitionkey", partition_key)
            .header("x-ms-documentdb-is-upsert", "True")
            .json(document)
            .send()
            .await
            .map_err(store_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::StoreWriteError(format!("{}: {}", status, body)));
        }

        info!(id = %document.id, url = %document.url, "Scraped text stored successfully");
        Ok(())
    }

    async fn read_document(&self, id: Uuid) -> Result<Option<ScrapedDocument>> {
        let link = format!("{}/docs/{}", self.collection_link(), id);
        let partition_key = json!([id.to_string()]).to_string();

        let response = self
            .request(Method::GET, &link, "docs", &link)?
            .header("x-ms-documentdb-partitionkey", partition_key)
            .send()
            .await
            .map_err(store_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let document = response.json::<ScrapedDocument>().await.map_err(store_error)?;
                Ok(Some(document))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::StoreWriteError(format!("{}: {}", status, body)))
            }
        }
    }
}

/// Master-key authorization header value for a single Cosmos DB request.
pub(crate) fn auth_token(
    key: &[u8],
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::ConfigError(format!("Invalid store key: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let token = format!("type=master&ver=1.0&sig={}", signature);
    Ok(url::form_urlencoded::byte_serialize(token.as_bytes()).collect())
}

async fn accept_existing(response: reqwest::Response, what: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        debug!("Created {}", what);
        return Ok(());
    }
    if status == StatusCode::CONFLICT {
        debug!("{} already exists", what);
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::StoreWriteError(format!(
        "Failed to create {}: {}: {}",
        what, status, body
    )))
}

fn store_error(err: reqwest::Error) -> AppError {
    AppError::StoreWriteError(err.to_string())
}

/// Documents held in process, keyed by id.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, ScrapedDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn documents(&self) -> Vec<ScrapedDocument> {
        self.documents.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(&self, document: &ScrapedDocument) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn read_document(&self, id: Uuid) -> Result<Option<ScrapedDocument>> {
        let documents = self.documents.read().await;
        Ok(documents.get(&id).cloned())
    }
}
