//! Sync engine
//!
//! Owns the per-run [`SyncContext`] and a stream catalog, and drives
//! reads stream by stream. Hosts restore watermark state before a run
//! and persist the snapshot after; the engine itself never touches disk.

use crate::client::GovernedClient;
use crate::config::ConnectorConfig;
use crate::error::{Error, Result};
use crate::state::WatermarkStore;
use crate::streams::{SourceStream, StreamDescriptor, SyncContext};
use crate::types::{ShapedRecord, StringMap};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// Knobs controlling how a run proceeds
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Abort the run on the first stream failure; otherwise failed
    /// streams are recorded in the stats and the run continues
    pub fail_fast: bool,
    /// Cap on records kept per stream, `None` for unbounded
    pub max_records: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fail_fast: true,
            max_records: None,
        }
    }
}

/// Counters accumulated over one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Streams read to completion
    pub streams_synced: usize,
    /// Streams that failed
    pub streams_failed: usize,
    /// Records kept after shaping and watermark filtering
    pub records_emitted: u64,
}

/// The extraction engine for one connector run
pub struct SyncEngine {
    ctx: SyncContext,
    streams: Vec<Box<dyn SourceStream>>,
    sync_config: SyncConfig,
    stats: SyncStats,
}

impl SyncEngine {
    /// Create an engine with an empty catalog
    pub fn new(client: Arc<GovernedClient>, config: ConnectorConfig) -> Result<Self> {
        Ok(Self {
            ctx: SyncContext::new(client, config)?,
            streams: Vec::new(),
            sync_config: SyncConfig::default(),
            stats: SyncStats::default(),
        })
    }

    /// Set the stream catalog
    #[must_use]
    pub fn with_streams(mut self, streams: Vec<Box<dyn SourceStream>>) -> Self {
        self.streams = streams;
        self
    }

    /// Set the run knobs
    #[must_use]
    pub fn with_sync_config(mut self, config: SyncConfig) -> Self {
        self.sync_config = config;
        self
    }

    /// Surface fatal setup problems before any stream reads
    ///
    /// Runs every stream's prepare hook; partition discovery happens
    /// here, so a credential without a qualifying account fails the run
    /// before the first record is fetched.
    pub async fn prepare(&mut self) -> Result<()> {
        for stream in &self.streams {
            stream.prepare(&mut self.ctx).await?;
        }
        Ok(())
    }

    /// Restore watermark state from a persisted snapshot
    pub fn restore_state(&mut self, snapshot: &StringMap) -> Result<()> {
        self.ctx.state.load(snapshot)
    }

    /// Snapshot the watermark state for persistence
    pub fn state_snapshot(&self) -> StringMap {
        self.ctx.state.snapshot()
    }

    /// The watermark store, for direct inspection
    pub fn state(&self) -> &WatermarkStore {
        &self.ctx.state
    }

    /// Descriptors of every stream in the catalog
    pub fn descriptors(&self) -> Vec<StreamDescriptor> {
        self.streams.iter().map(|s| s.descriptor()).collect()
    }

    /// Counters for the run so far
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Sync one stream by name
    pub async fn sync_stream(&mut self, name: &str) -> Result<Vec<ShapedRecord>> {
        let stream = self
            .streams
            .iter()
            .find(|s| s.descriptor().name == name)
            .ok_or_else(|| Error::stream_not_found(name))?;

        info!(stream = name, "Starting stream sync");
        match stream.read(&mut self.ctx).await {
            Ok(mut records) => {
                if let Some(cap) = self.sync_config.max_records {
                    records.truncate(cap);
                }
                self.stats.streams_synced += 1;
                self.stats.records_emitted += records.len() as u64;
                info!(stream = name, records = records.len(), "Stream sync complete");
                Ok(records)
            }
            Err(err) => {
                self.stats.streams_failed += 1;
                error!(stream = name, error = %err, "Stream sync failed");
                Err(err)
            }
        }
    }

    /// Sync every stream in the catalog, in catalog order
    ///
    /// With `fail_fast` unset, a failed stream is recorded in the stats
    /// and the run moves on to the next stream.
    pub async fn sync_all(&mut self) -> Result<BTreeMap<String, Vec<ShapedRecord>>> {
        let names: Vec<&'static str> = self.streams.iter().map(|s| s.descriptor().name).collect();

        let mut out = BTreeMap::new();
        for name in names {
            match self.sync_stream(name).await {
                Ok(records) => {
                    out.insert(name.to_string(), records);
                }
                Err(err) if self.sync_config.fail_fast => return Err(err),
                Err(_) => {}
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("streams", &self.streams.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
