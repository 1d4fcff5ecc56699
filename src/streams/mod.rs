//! Stream catalog
//!
//! Each logical entity type is one [`SourceStream`]: a descriptor plus a
//! read that composes request construction, pagination, shaping and
//! watermark filtering over every partition known to the run. The engine
//! owns the shared [`SyncContext`] and drives reads; streams never talk
//! to each other.

pub mod commerce;
pub mod social;

use crate::client::{Account, GovernedClient};
use crate::config::ConnectorConfig;
use crate::error::Result;
use crate::state::WatermarkStore;
use crate::types::{JsonObject, ShapedRecord, SyncMode};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Static description of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Stream name, unique within a catalog
    pub name: &'static str,
    /// Primary key fields of the emitted records
    pub primary_key: &'static [&'static str],
    /// Whether the stream supports incremental reads
    pub sync_mode: SyncMode,
    /// Cursor field for incremental streams
    pub cursor_field: Option<&'static str>,
}

impl StreamDescriptor {
    /// A full-refresh descriptor
    pub const fn full_refresh(name: &'static str, primary_key: &'static [&'static str]) -> Self {
        Self {
            name,
            primary_key,
            sync_mode: SyncMode::FullRefresh,
            cursor_field: None,
        }
    }

    /// An incremental descriptor with the given cursor field
    pub const fn incremental(
        name: &'static str,
        primary_key: &'static [&'static str],
        cursor_field: &'static str,
    ) -> Self {
        Self {
            name,
            primary_key,
            sync_mode: SyncMode::Incremental,
            cursor_field: Some(cursor_field),
        }
    }
}

/// One record-producing stream unit
#[async_trait]
pub trait SourceStream: Send + Sync {
    /// The stream's static description
    fn descriptor(&self) -> StreamDescriptor;

    /// Surface fatal setup problems before any read starts
    ///
    /// Streams that depend on discovered partitions trigger discovery
    /// here, so a bad credential fails the run up front instead of
    /// midway through.
    async fn prepare(&self, _ctx: &mut SyncContext) -> Result<()> {
        Ok(())
    }

    /// Read all records due in this run, advancing watermarks as they
    /// are observed
    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>>;
}

/// Shared per-run context handed to every stream read
///
/// Partition discovery is performed once and cached here, so a run of
/// many streams does not rediscover accounts or locations per stream.
pub struct SyncContext {
    /// The governed client every call goes through
    pub client: Arc<GovernedClient>,
    /// The run's configuration
    pub config: ConnectorConfig,
    /// Watermark state shared across incremental streams
    pub state: WatermarkStore,
    accounts: Option<Vec<Account>>,
    locations: Option<Vec<String>>,
}

impl SyncContext {
    /// Create a context for one run
    pub fn new(client: Arc<GovernedClient>, config: ConnectorConfig) -> Result<Self> {
        config.validate()?;
        let state = WatermarkStore::new(&config)?;
        Ok(Self {
            client,
            config,
            state,
            accounts: None,
            locations: None,
        })
    }

    /// Connected business accounts, discovered once per run
    pub async fn accounts(&mut self) -> Result<Vec<Account>> {
        if self.accounts.is_none() {
            self.accounts = Some(self.client.find_accounts().await?);
        }
        Ok(self.accounts.clone().unwrap_or_default())
    }

    /// Location ids, discovered once per run
    pub async fn locations(&mut self) -> Result<Vec<String>> {
        if self.locations.is_none() {
            let body = self.client.get("v2/locations", &JsonObject::new()).await?;
            let ids = body
                .get("locations")
                .and_then(Value::as_array)
                .map(|locations| {
                    locations
                        .iter()
                        .filter_map(|l| l.get("id").and_then(Value::as_str))
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default();
            self.locations = Some(ids);
        }
        Ok(self.locations.clone().unwrap_or_default())
    }

    /// Seed discovered accounts, for tests and pre-discovered runs
    pub fn with_accounts(mut self, accounts: Vec<Account>) -> Self {
        self.accounts = Some(accounts);
        self
    }
}

/// Emit a record through the partition's watermark filter
///
/// The record is dropped when its cursor is not strictly newer than the
/// watermark; otherwise the watermark advances and the record is kept.
pub(crate) fn emit_if_new(
    state: &mut WatermarkStore,
    partition: &str,
    cursor_field: &str,
    record: ShapedRecord,
    out: &mut Vec<ShapedRecord>,
) {
    let value = Value::Object(record);
    if state.accepts(partition, &value, cursor_field) {
        state.observe(partition, &value, cursor_field);
        if let Value::Object(record) = value {
            out.push(record);
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("accounts", &self.accounts.as_ref().map(Vec::len))
            .field("locations", &self.locations.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}
