//! Persistence of blog records behind the [`DocumentStore`] trait.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    str::FromStr,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::{error::ProtocolErrorType, ProtocolError};

use super::BlogItem;

/// Store-generated identifier of a blog record: a big-endian seconds
/// timestamp followed by a sequence number, rendered as 24 lowercase hex
/// characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId([u8; 12]);

impl RecordId {
    pub fn new(timestamp_secs: u32, sequence: u64) -> Self {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&timestamp_secs.to_be_bytes());
        bytes[4..].copy_from_slice(&sequence.to_be_bytes());
        Self(bytes)
    }

    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for RecordId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::invalid_argument("Cannot parse ID");
        if s.len() != 24 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no blog record with id {0}")]
    NotFound(RecordId),
    #[error("the document store is disconnected")]
    Disconnected,
}

impl From<StoreError> for ProtocolError {
    fn from(value: StoreError) -> Self {
        let error_type = match &value {
            StoreError::NotFound(_) => ProtocolErrorType::NotFound,
            StoreError::Disconnected => ProtocolErrorType::Internal,
        };
        ProtocolError::new(error_type, Box::new(value))
    }
}

pub type RecordStream = BoxStream<'static, Result<(RecordId, BlogItem), StoreError>>;

/// A collection of blog records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores `item` under a freshly generated id.
    async fn insert(&self, item: BlogItem) -> Result<RecordId, StoreError>;

    async fn find_by_id(&self, id: RecordId) -> Result<BlogItem, StoreError>;

    /// Overwrites the record stored under `id`, which must exist.
    async fn replace(&self, id: RecordId, item: BlogItem) -> Result<(), StoreError>;

    async fn delete(&self, id: RecordId) -> Result<(), StoreError>;

    /// Streams every record. The stream is built from a snapshot, so records
    /// written after the call returns are not observed.
    async fn list_all(&self) -> Result<RecordStream, StoreError>;

    /// Releases the store. Every later operation fails with
    /// [`StoreError::Disconnected`].
    async fn disconnect(&self) -> Result<(), StoreError>;
}

/// In-memory [`DocumentStore`], ordered by record id.
#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordId, BlogItem>>,
    sequence: AtomicU64,
    connected: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            connected: AtomicBool::new(true),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        match self.connected.load(Ordering::Acquire) {
            true => Ok(()),
            false => Err(StoreError::Disconnected),
        }
    }

    fn next_id(&self) -> RecordId {
        RecordId::new(
            timestamp_secs(SystemTime::now()),
            self.sequence.fetch_add(1, Ordering::Relaxed),
        )
    }
}

/// Seconds since the epoch as stored in an id, saturating past 2106.
fn timestamp_secs(now: SystemTime) -> u32 {
    now.duration_since(UNIX_EPOCH)
        .map(|elapsed| u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or_default()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, item: BlogItem) -> Result<RecordId, StoreError> {
        self.ensure_connected()?;
        let id = self.next_id();
        self.records.write().await.insert(id, item);
        Ok(id)
    }

    async fn find_by_id(&self, id: RecordId) -> Result<BlogItem, StoreError> {
        self.ensure_connected()?;
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn replace(&self, id: RecordId, item: BlogItem) -> Result<(), StoreError> {
        self.ensure_connected()?;
        match self.records.write().await.get_mut(&id) {
            Some(record) => {
                *record = item;
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_all(&self) -> Result<RecordStream, StoreError> {
        self.ensure_connected()?;
        let snapshot: Vec<_> = self
            .records
            .read()
            .await
            .iter()
            .map(|(id, item)| Ok((*id, item.clone())))
            .collect();
        Ok(stream::iter(snapshot).boxed())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.connected.store(false, Ordering::Release);
        info!("document store disconnected");
        Ok(())
    }
}
