//! # System Constants
//!
//! Storage key prefixes, reserved checkpoint property names and the default
//! operational limits of the query storage layer.

/// Key prefixes of the persisted layout on the key-value backend
pub mod storage_keys {
    /// `QUERY:<queryId>` holds the serialized `QueryStatus`
    pub const QUERY_PREFIX: &str = "QUERY:";
    /// `TASKS:<queryId>` holds the serialized `TaskStates`
    pub const TASKS_PREFIX: &str = "TASKS:";
    /// `TASK:<taskId:queryId:queryType>` holds a serialized `QueryTask`
    pub const TASK_PREFIX: &str = "TASK:";
}

/// Reserved checkpoint property names
pub mod checkpoint_properties {
    /// Serialized query definition, present on CREATE checkpoints only
    pub const QUERY: &str = "QUERY";
    /// Zero-based partition index assigned by the decomposer
    pub const PARTITION: &str = "PARTITION";
    /// Total number of partitions of the query
    pub const PARTITION_COUNT: &str = "PARTITION_COUNT";
    /// Inclusive lower bound written by the range decomposer
    pub const RANGE_START: &str = "RANGE_START";
    /// Exclusive upper bound written by the range decomposer
    pub const RANGE_END: &str = "RANGE_END";
}

/// Default limits applied when configuration leaves them unset
pub mod system {
    pub const DEFAULT_LEASE_MS: u64 = 300_000;
    pub const INTERNAL_LOCK_LEASE_MS: u64 = 5_000;
    pub const INTERNAL_LOCK_WAIT_MS: u64 = 10_000;
    pub const LOCK_RETRY_INTERVAL_MS: u64 = 10;
    pub const HEARTBEAT_INTERVAL_MS: u64 = 60_000;
    pub const DEFAULT_MAX_RUNNING_PER_QUERY: usize = 10;
    pub const DEFAULT_INITIAL_TASKS: usize = 1;
    pub const DEFAULT_TOPIC_PREFIX: &str = "query-tasks";
    pub const DEFAULT_BUS_CAPACITY: usize = 1024;
}
