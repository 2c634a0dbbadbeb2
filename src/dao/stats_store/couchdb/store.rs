use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::dao::{
    stats_store::{GameStatsUpdate, SongSeenRecord, StatsStore},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        BulkDocResult, BulkDocsRequest, CouchGameStatsDocument, CouchPlayerDocument,
        CouchSeenDocument, player_doc_id,
    },
};

/// Stats store persisting write-once game documents and per-account totals in CouchDB.
#[derive(Clone)]
pub struct CouchStatsStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    max_update_attempts: usize,
}

impl CouchStatsStore {
    /// Build a client for the configured database.
    ///
    /// No request is sent; the database is created on the first health check.
    pub fn new(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        Ok(Self {
            client,
            base_url,
            database,
            auth,
            max_update_attempts: config.max_update_attempts.max(1),
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorized(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::Database {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorized(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::Database {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document; a revision conflict is reported as [`CouchDaoError::Conflict`].
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            status if status.is_success() => Ok(()),
            status => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status,
            }),
        }
    }

    async fn bump_totals(&self, update: &GameStatsUpdate) -> CouchResult<()> {
        let doc_id = player_doc_id(&update.account_id);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut doc = self
                .get_document::<CouchPlayerDocument>(&doc_id)
                .await?
                .unwrap_or_else(|| CouchPlayerDocument::empty(&update.account_id));
            doc.totals.apply(update);

            match self.put_document(&doc_id, &doc).await {
                Err(CouchDaoError::Conflict { .. }) if attempt < self.max_update_attempts => {
                    debug!(doc_id = %doc_id, attempt, "totals document conflict; retrying");
                }
                other => return other,
            }
        }
    }

    async fn bulk_insert<T>(&self, docs: Vec<T>) -> CouchResult<Vec<BulkDocResult>>
    where
        T: Serialize,
    {
        const BULK_DOCS: &str = "_bulk_docs";
        let response = self
            .request(Method::POST, BULK_DOCS)
            .json(&BulkDocsRequest { docs })
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: BULK_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: BULK_DOCS.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<Vec<BulkDocResult>>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: BULK_DOCS.to_string(),
                source,
            })
    }
}

impl StatsStore for CouchStatsStore {
    fn record_game(&self, update: GameStatsUpdate) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchGameStatsDocument::from(update.clone());
            match store.put_document(&doc.id, &doc).await {
                Ok(()) => {}
                Err(CouchDaoError::Conflict { .. }) => return Ok(false),
                Err(err) => return Err(err.into()),
            }
            store.bump_totals(&update).await?;
            Ok(true)
        })
    }

    fn record_songs_seen(
        &self,
        records: Vec<SongSeenRecord>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }
            let docs: Vec<CouchSeenDocument> = records.into_iter().map(Into::into).collect();
            let results = store.bulk_insert(docs).await?;
            // A conflict means the record already exists for this game.
            let rejected: Vec<String> = results
                .into_iter()
                .filter_map(|result| match result.error.as_deref() {
                    None | Some("conflict") => None,
                    Some(error) => Some(format!("{}: {error}", result.id)),
                })
                .collect();
            if rejected.is_empty() {
                Ok(())
            } else {
                Err(StorageError::Rejected(rejected.join(", ")))
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.ensure_database().await?) })
    }
}
