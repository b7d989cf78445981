use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

use super::backing::ObjectStore;
use super::memory::CacheEntry;
use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Durable side of the cache: JSON values with per-key expiry in an
/// [`ObjectStore`].
///
/// Reading an object past its expiry is a miss, even when the store still
/// holds it.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn ObjectStore>,
    page_size: usize,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_page_size(store, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(store: Arc<dyn ObjectStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub async fn put(&self, key: &str, value: &Value, expiration: DateTime<Utc>) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.store.put_object(key, body, expiration).await?;

        tracing::debug!("Persisted {} (expires {})", key, expiration);
        Ok(())
    }

    pub async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        let Some(object) = self.store.get_object(key).await? else {
            return Ok(None);
        };
        if object.expires < now {
            return Ok(None);
        }

        let value: Value = serde_json::from_slice(&object.body)?;
        Ok(Some(CacheEntry::new(value, object.expires)))
    }

    /// Every key in the backing store, fetched one page at a time as the
    /// stream is polled. Each call starts over from the first key.
    pub fn list_all_keys(&self) -> BoxStream<'_, Result<String>> {
        struct Cursor {
            buffered: VecDeque<String>,
            next_token: Option<String>,
            exhausted: bool,
        }

        let start = Cursor {
            buffered: VecDeque::new(),
            next_token: None,
            exhausted: false,
        };

        stream::try_unfold(start, move |mut cursor| async move {
            loop {
                if let Some(key) = cursor.buffered.pop_front() {
                    return Ok::<_, Error>(Some((key, cursor)));
                }
                if cursor.exhausted {
                    return Ok(None);
                }

                let page = self
                    .store
                    .list_objects(cursor.next_token.as_deref(), self.page_size)
                    .await?;
                cursor.exhausted = page.next_token.is_none();
                cursor.next_token = page.next_token;
                cursor.buffered.extend(page.keys);
            }
        })
        .boxed()
    }
}
