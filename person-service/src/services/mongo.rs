use super::repository::{PersonRepository, PersonStream};
use crate::config::{MongoConfig, StorageConfig};
use crate::models::Person;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::{CreateCollectionOptions, CursorType, FindOptions},
    Client as MongoClient, Collection, Database,
};
use service_core::error::AppError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Upper bound on how long the server holds a tailable getMore open.
const TAIL_MAX_AWAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct MongoPersonRepository {
    client: MongoClient,
    db: Database,
    collection_name: String,
    max_documents: u64,
    size_bytes: u64,
    tail_retry: Duration,
}

impl MongoPersonRepository {
    pub async fn connect(mongo: &MongoConfig, storage: &StorageConfig) -> Result<Self, AppError> {
        tracing::info!(uri = %mongo.uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(&mongo.uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", mongo.uri, e);
            AppError::from(e)
        })?;
        let db = client.database(&mongo.database);
        tracing::info!(database = %mongo.database, "Successfully connected to MongoDB database");

        Ok(Self {
            client,
            db,
            collection_name: storage.collection.clone(),
            max_documents: storage.max_documents,
            size_bytes: storage.size_bytes,
            tail_retry: storage.tail_retry(),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn persons(&self) -> Collection<Person> {
        self.db.collection(&self.collection_name)
    }

    /// Make sure the person collection exists and is capped.
    ///
    /// Tailable cursors only work on capped collections, so an existing
    /// uncapped collection is converted in place.
    pub async fn ensure_capped_collection(&self) -> Result<(), AppError> {
        let mut specs = self
            .db
            .list_collections(doc! { "name": self.collection_name.as_str() }, None)
            .await?;

        match specs.try_next().await? {
            None => {
                let options = CreateCollectionOptions::builder()
                    .capped(true)
                    .max(self.max_documents)
                    .size(self.size_bytes)
                    .build();

                self.db
                    .create_collection(&self.collection_name, options)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to create capped collection: {}", e);
                        AppError::from(e)
                    })?;

                tracing::info!(
                    collection = %self.collection_name,
                    max_documents = self.max_documents,
                    size_bytes = self.size_bytes,
                    "Created capped collection"
                );
            }
            Some(spec) if spec.options.capped == Some(true) => {
                tracing::info!(
                    collection = %self.collection_name,
                    "Capped collection already exists"
                );
            }
            Some(_) => {
                tracing::warn!(
                    collection = %self.collection_name,
                    "Collection exists but is not capped, converting"
                );
                self.db
                    .run_command(
                        doc! {
                            "convertToCapped": self.collection_name.as_str(),
                            "size": self.size_bytes as i64,
                        },
                        None,
                    )
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to convert collection to capped: {}", e);
                        AppError::from(e)
                    })?;
            }
        }

        Ok(())
    }

    /// Open a tailable cursor over records inserted after `after`.
    ///
    /// Resuming with `_id > after` assumes ObjectIds grow in insertion order,
    /// which only holds for a single writer (the generator). ObjectIds are
    /// minted by each client, so a record inserted by another process within
    /// the same second can sort below `after` and be skipped on re-open.
    pub async fn open_tail_cursor(
        &self,
        after: Option<ObjectId>,
    ) -> Result<mongodb::Cursor<Person>, AppError> {
        let filter: Document = match after {
            Some(id) => doc! { "_id": { "$gt": id } },
            None => doc! {},
        };

        let options = FindOptions::builder()
            .cursor_type(CursorType::TailableAwait)
            .max_await_time(TAIL_MAX_AWAIT)
            .build();

        Ok(self.persons().find(filter, options).await?)
    }
}

#[async_trait]
impl PersonRepository for MongoPersonRepository {
    async fn save(&self, person: Person) -> Result<Person, AppError> {
        let result = self.persons().insert_one(&person, None).await.map_err(|e| {
            tracing::error!("Failed to insert person: {}", e);
            AppError::from(e)
        })?;

        let id = result.inserted_id.as_object_id().ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "insert returned non-ObjectId id: {}",
                result.inserted_id
            ))
        })?;

        Ok(person.with_id(id))
    }

    async fn find_all_by_name(&self, name: &str) -> Result<PersonStream, AppError> {
        let options = FindOptions::builder().sort(doc! { "$natural": 1 }).build();

        let cursor = self
            .persons()
            .find(doc! { "name": name }, options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to query persons by name: {}", e);
                AppError::from(e)
            })?;

        Ok(cursor.map_err(AppError::from).boxed())
    }

    async fn tail(&self) -> Result<PersonStream, AppError> {
        // Fail fast if the collection is unreachable before handing out a stream.
        let first = self.open_tail_cursor(None).await?;

        let (tx, rx) = mpsc::channel(super::repository::ADAPTER_BUFFER);
        let repo = self.clone();

        tokio::spawn(async move {
            let mut cursor = Some(first);
            let mut last_id: Option<ObjectId> = None;

            loop {
                let mut current = match cursor.take() {
                    Some(c) => c,
                    None => match repo.open_tail_cursor(last_id).await {
                        Ok(c) => c,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    },
                };

                loop {
                    let next = tokio::select! {
                        _ = tx.closed() => return,
                        next = current.next() => next,
                    };

                    match next {
                        Some(Ok(person)) => {
                            last_id = person.id.or(last_id);
                            if tx.send(Ok(person)).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!("Tailable cursor failed: {}", e);
                            let _ = tx.send(Err(AppError::from(e))).await;
                            return;
                        }
                        None => break,
                    }
                }

                // A dead cursor (e.g. the collection was empty) is re-opened after a pause.
                tracing::debug!(
                    retry_ms = repo.tail_retry.as_millis() as u64,
                    "Tailable cursor closed, re-opening"
                );
                tokio::select! {
                    _ = tx.closed() => return,
                    _ = tokio::time::sleep(repo.tail_retry) => {}
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }
}
