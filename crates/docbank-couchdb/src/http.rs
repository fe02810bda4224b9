//! CouchDB over HTTP.

use crate::client::{AllDocsRow, Connector, CouchDatabase, DatabaseInfo, Document, ViewRow};
use crate::config::CouchConfig;
use crate::error::{CouchError, CouchResult};
use crate::view::ViewQuery;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Opens [`HttpCouchDatabase`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn open(&self, config: &CouchConfig) -> CouchResult<Arc<dyn CouchDatabase>> {
        Ok(Arc::new(HttpCouchDatabase::new(config)?))
    }
}

/// A database on a CouchDB server reached through `reqwest`.
pub struct HttpCouchDatabase {
    client: Client,
    base: Url,
    database: String,
    auth: Option<(String, Option<String>)>,
}

#[derive(Deserialize)]
struct Ack {}

#[derive(Deserialize)]
struct SaveResponse {
    rev: String,
}

#[derive(Deserialize)]
struct Rows<T> {
    rows: Vec<T>,
}

impl HttpCouchDatabase {
    /// Create a handle from configuration. Does not touch the network.
    pub fn new(config: &CouchConfig) -> CouchResult<Self> {
        let database = config
            .database
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CouchError::invalid_config("no database configured"))?;

        let base = Url::parse(&config.location).map_err(|e| {
            CouchError::invalid_config(format!("invalid location {}: {e}", config.location))
        })?;
        if base.cannot_be_a_base() {
            return Err(CouchError::invalid_config(format!(
                "invalid location {}",
                config.location
            )));
        }

        let mut builder = Client::builder().user_agent(concat!("docbank/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(CouchError::transport)?;

        let auth = config.has_auth().then(|| {
            (
                config.username.clone().unwrap_or_default(),
                config.password.clone(),
            )
        });

        Ok(Self {
            client,
            base,
            database,
            auth,
        })
    }

    /// URL of the database, extended by `segments` (each percent-encoded).
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.database).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.auth {
            Some((username, password)) => builder.basic_auth(username, password.as_ref()),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> CouchResult<T> {
        let response = request.send().await.map_err(CouchError::transport)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = CouchError::from_response(status.as_u16(), &body);
            debug!(
                database = %self.database,
                status = status.as_u16(),
                error = %err.error,
                "CouchDB request failed"
            );
            return Err(err);
        }

        response.json::<T>().await.map_err(CouchError::invalid_response)
    }
}

#[async_trait]
impl CouchDatabase for HttpCouchDatabase {
    fn name(&self) -> &str {
        &self.database
    }

    async fn info(&self) -> CouchResult<DatabaseInfo> {
        debug!(database = %self.database, "Fetching database info");
        self.send(self.request(Method::GET, self.url(&[]))).await
    }

    async fn create_database(&self) -> CouchResult<()> {
        debug!(database = %self.database, "Creating database");
        let _: Ack = self.send(self.request(Method::PUT, self.url(&[]))).await?;
        Ok(())
    }

    async fn drop_database(&self) -> CouchResult<()> {
        debug!(database = %self.database, "Dropping database");
        let _: Ack = self
            .send(self.request(Method::DELETE, self.url(&[])))
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> CouchResult<Document> {
        debug!(database = %self.database, id, "Getting document");
        self.send(self.request(Method::GET, self.url(&[id]))).await
    }

    async fn save(&self, doc: &Document) -> CouchResult<String> {
        debug!(database = %self.database, id = %doc.id, rev = ?doc.rev, "Saving document");
        let response: SaveResponse = self
            .send(self.request(Method::PUT, self.url(&[&doc.id])).json(doc))
            .await?;
        Ok(response.rev)
    }

    async fn delete(&self, id: &str, rev: &str) -> CouchResult<()> {
        debug!(database = %self.database, id, rev, "Deleting document");
        let mut url = self.url(&[id]);
        url.query_pairs_mut().append_pair("rev", rev);
        let _: Ack = self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn temp_view(&self, query: &ViewQuery, key: &Value) -> CouchResult<Vec<ViewRow>> {
        debug!(database = %self.database, prefix = query.prefix(), %key, "Running temporary view");
        let mut url = self.url(&["_temp_view"]);
        url.query_pairs_mut().append_pair("key", &key.to_string());

        let body = json!({
            "language": "javascript",
            "map": query.map_source(),
        });
        let rows: Rows<ViewRow> = self
            .send(self.request(Method::POST, url).json(&body))
            .await?;
        Ok(rows.rows)
    }

    async fn all_docs(&self, keys: &[String]) -> CouchResult<Vec<AllDocsRow>> {
        debug!(database = %self.database, count = keys.len(), "Fetching documents by id");
        let mut url = self.url(&["_all_docs"]);
        url.query_pairs_mut().append_pair("include_docs", "true");

        let rows: Rows<AllDocsRow> = self
            .send(self.request(Method::POST, url).json(&json!({ "keys": keys })))
            .await?;
        Ok(rows.rows)
    }
}
