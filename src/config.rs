//! Configuration for opening a store
//!
//! Engine tuning that is fixed for the lifetime of an open handle. Per-call
//! options live in [`crate::options`].

/// Open-time configuration for a store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Open Behaviour
    // -------------------------------------------------------------------------
    /// Create the store if the location holds none
    pub create_if_missing: bool,

    /// Fail the open if the location already holds a store
    pub error_if_exists: bool,

    // -------------------------------------------------------------------------
    // Engine Tuning
    // -------------------------------------------------------------------------
    /// Byte budget of the read cache used for SSTable point lookups
    pub cache_size: usize,

    /// MemTable size (bytes) that triggers a flush to a new SSTable
    pub write_buffer_size: usize,

    /// How often the WAL is fsynced for writes without `sync: true`
    pub wal_sync_strategy: WalSyncStrategy,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            cache_size: 8 << 20,        // 8 MB
            write_buffer_size: 4 << 20, // 4 MB
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    pub fn error_if_exists(mut self, error: bool) -> Self {
        self.config.error_if_exists = error;
        self
    }

    /// Set the read cache budget (in bytes)
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.config.cache_size = bytes;
        self
    }

    /// Set the memtable flush threshold (in bytes)
    pub fn write_buffer_size(mut self, bytes: usize) -> Self {
        self.config.write_buffer_size = bytes;
        self
    }

    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
