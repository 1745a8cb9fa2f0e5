//! In-process capped store used when no MongoDB is configured, and by tests.

use super::repository::{PersonRepository, PersonStream};
use crate::models::Person;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mongodb::bson::oid::ObjectId;
use service_core::error::AppError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

const TAIL_CHANNEL_CAPACITY: usize = 1024;

struct Entry {
    person: Person,
    size: u64,
}

struct Inner {
    entries: VecDeque<Entry>,
    total_bytes: u64,
}

#[derive(Clone)]
pub struct InMemoryPersonRepository {
    inner: Arc<Mutex<Inner>>,
    inserts: broadcast::Sender<Person>,
    max_documents: u64,
    size_bytes: u64,
}

impl InMemoryPersonRepository {
    pub fn new(max_documents: u64, size_bytes: u64) -> Self {
        let (inserts, _) = broadcast::channel(TAIL_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: VecDeque::new(),
                total_bytes: 0,
            })),
            inserts,
            max_documents: max_documents.max(1),
            size_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.lock().map(|inner| inner.total_bytes).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("person store lock poisoned")))
    }

    fn snapshot<F>(&self, mut keep: F) -> Result<Vec<Person>, AppError>
    where
        F: FnMut(&Person) -> bool,
    {
        Ok(self
            .lock()?
            .entries
            .iter()
            .filter(|e| keep(&e.person))
            .map(|e| e.person.clone())
            .collect())
    }
}

#[async_trait]
impl PersonRepository for InMemoryPersonRepository {
    async fn save(&self, person: Person) -> Result<Person, AppError> {
        let person = person.with_id(ObjectId::new());
        let size = mongodb::bson::to_vec(&person)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?
            .len() as u64;

        let mut inner = self.lock()?;
        inner.entries.push_back(Entry {
            person: person.clone(),
            size,
        });
        inner.total_bytes += size;

        // Evict oldest first; the newest document always survives.
        while inner.entries.len() > 1
            && (inner.entries.len() as u64 > self.max_documents
                || inner.total_bytes > self.size_bytes)
        {
            if let Some(evicted) = inner.entries.pop_front() {
                inner.total_bytes -= evicted.size;
            }
        }

        // Sent under the lock so tail snapshots never miss or repeat a record.
        let _ = self.inserts.send(person.clone());
        drop(inner);

        Ok(person)
    }

    async fn find_all_by_name(&self, name: &str) -> Result<PersonStream, AppError> {
        let matches = self.snapshot(|p| p.name == name)?;
        Ok(stream::iter(matches.into_iter().map(Ok)).boxed())
    }

    async fn tail(&self) -> Result<PersonStream, AppError> {
        let (existing, receiver) = {
            let inner = self.lock()?;
            let existing: Vec<Person> = inner.entries.iter().map(|e| e.person.clone()).collect();
            (existing, self.inserts.subscribe())
        };

        let live = BroadcastStream::new(receiver).filter_map(|item| async move {
            match item {
                Ok(person) => Some(Ok(person)),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Tail subscriber lagged, skipping records");
                    None
                }
            }
        });

        Ok(stream::iter(existing.into_iter().map(Ok)).chain(live).boxed())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }
}
