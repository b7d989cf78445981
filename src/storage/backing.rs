//! Backing object store backends.
//!
//! Object-store-like contract: key-addressed blobs with an expiry timestamp
//! attached at write time, and a paginated, sorted enumeration of keys. The
//! store itself never hides expired objects; that is the gateway's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};

const OBJECT_EXTENSION: &str = "obj";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub expires: DateTime<Utc>,
}

/// One page of a key listing. `next_token` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, body: Vec<u8>, expires: DateTime<Utc>) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>>;

    /// Keys in ascending order, starting after `continuation_token`.
    async fn list_objects(
        &self,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage>;
}

fn page_from_sorted(mut keys: Vec<String>, max_keys: usize) -> ObjectPage {
    let truncated = keys.len() > max_keys;
    keys.truncate(max_keys);
    let next_token = if truncated { keys.last().cloned() } else { None };
    ObjectPage { keys, next_token }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>, expires: DateTime<Utc>) -> Result<()> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), StoredObject { body, expires });
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn list_objects(
        &self,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage> {
        let objects = self.objects.read().await;
        let start = match continuation_token {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };
        let keys = objects
            .range((start, Bound::Unbounded))
            .take(max_keys + 1)
            .map(|(key, _)| key.clone())
            .collect();
        Ok(page_from_sorted(keys, max_keys))
    }
}

/// One file per object under `root`.
///
/// File names are the hex SHA-256 of the key, so every key maps to a short,
/// valid file name. A file holds the RFC 3339 expiry on its first line, the
/// hex-encoded key on its second, then the body.
pub struct FsObjectStore {
    root: PathBuf,
}

/// Header and body of one object file.
struct ObjectFile {
    key: String,
    object: StoredObject,
}

impl FsObjectStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        tracing::info!("Backing store at {}", root.display());
        Ok(Self { root })
    }

    pub(crate) fn object_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(format!("{}.{}", digest, OBJECT_EXTENSION))
    }

    async fn read_object_file(path: &Path) -> Result<Option<ObjectFile>> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_object_file(&contents)
            .map(Some)
            .map_err(|reason| Error::Persistence(format!("{}: {}", path.display(), reason)))
    }
}

fn parse_object_file(contents: &[u8]) -> std::result::Result<ObjectFile, String> {
    let mut parts = contents.splitn(3, |byte| *byte == b'\n');
    let (Some(expiry), Some(key), Some(body)) = (parts.next(), parts.next(), parts.next()) else {
        return Err("missing object header".to_string());
    };

    let expiry = std::str::from_utf8(expiry).map_err(|e| e.to_string())?;
    let expires = DateTime::parse_from_rfc3339(expiry)
        .map_err(|e| format!("bad expiry: {}", e))?
        .with_timezone(&Utc);
    let key = hex::decode(key)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| "bad key header".to_string())?;

    Ok(ObjectFile {
        key,
        object: StoredObject {
            body: body.to_vec(),
            expires,
        },
    })
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>, expires: DateTime<Utc>) -> Result<()> {
        let header = format!("{}\n{}\n", expires.to_rfc3339(), hex::encode(key));
        let mut contents = header.into_bytes();
        contents.extend_from_slice(&body);

        // Write-then-rename so readers never see a half-written object
        let path = self.object_path(key);
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        let Some(file) = Self::read_object_file(&self.object_path(key)).await? else {
            return Ok(None);
        };
        if file.key != key {
            return Err(Error::Persistence(format!(
                "object for {} holds key {}",
                key, file.key
            )));
        }
        Ok(Some(file.object))
    }

    async fn list_objects(
        &self,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(OBJECT_EXTENSION) {
                continue;
            }
            let key = match Self::read_object_file(&path).await {
                Ok(Some(file)) => file.key,
                // Replaced or removed since the directory was read
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Skipping unreadable object: {}", e);
                    continue;
                }
            };
            if continuation_token.is_none_or(|token| key.as_str() > token) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(page_from_sorted(keys, max_keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_file_keeps_key_and_body_newlines() {
        let contents = format!(
            "2030-01-01T00:00:00+00:00\n{}\nline 1\nline 2",
            hex::encode("a\nb")
        );

        let file = parse_object_file(contents.as_bytes()).unwrap();
        assert_eq!(file.key, "a\nb");
        assert_eq!(file.object.body, b"line 1\nline 2".to_vec());
    }

    #[test]
    fn test_object_file_rejects_bad_headers() {
        assert!(parse_object_file(b"no header").is_err());
        assert!(parse_object_file(b"yesterday\n6b\nbody").is_err());
        assert!(parse_object_file(b"2030-01-01T00:00:00Z\nnot hex\nbody").is_err());
    }
}
