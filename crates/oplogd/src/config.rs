//! Process configuration for the replication agent.
//!
//! `AgentConfig` is a consuming-builder struct: a `new`/`Default` pair of
//! sane values, `with_*` setters that return `Self`, and plain accessors.
//! [`AgentCli`] layers `clap` on top so flags and environment variables
//! can override those defaults at process start.

use std::time::Duration;

use oplog_ingest::{BackoffConfig as IngestBackoffConfig, IngestorConfig};
use oplog_tail::{BackoffConfig as TailBackoffConfig, TailerConfig};

/// Every tunable the replication engine leaves as "default" or
/// "implementation-defined."
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Entry-count cap on the op-log (`Init(maxBytes)`'s in-memory
    /// approximation; see `oplog_store::InMemoryOpStoreConfig`).
    pub op_log_max_entries: usize,
    /// Bounded capacity of the ingest channel.
    pub ingest_queue_capacity: usize,
    /// Initial retry delay for both the Ingestor and the Tailer's
    /// backoff.
    pub backoff_initial_delay: Duration,
    /// Maximum retry delay.
    pub backoff_max_delay: Duration,
    /// Multiplier applied to the retry delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Page size for `ReadStates` during REPLICATE.
    pub tail_page_size: usize,
    /// How long a LIVE-TAIL iterator blocks before reporting a timeout.
    pub tail_live_timeout: Duration,
    /// URL template substituting `{{type}}`/`{{id}}`. `None` leaves
    /// `ref` absent on every emitted item.
    pub object_url_template: Option<String>,
}

impl AgentConfig {
    /// Builds a config with the replication engine's default tunables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            op_log_max_entries: 10_000,
            ingest_queue_capacity: 1_024,
            backoff_initial_delay: Duration::from_millis(500),
            backoff_max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.5,
            tail_page_size: 1_000,
            tail_live_timeout: Duration::from_secs(5),
            object_url_template: None,
        }
    }

    /// Sets the op-log entry cap.
    #[must_use]
    pub fn with_op_log_max_entries(mut self, max_entries: usize) -> Self {
        self.op_log_max_entries = max_entries;
        self
    }

    /// Sets the ingest channel's bounded capacity.
    #[must_use]
    pub fn with_ingest_queue_capacity(mut self, capacity: usize) -> Self {
        self.ingest_queue_capacity = capacity;
        self
    }

    /// Sets the initial backoff delay shared by the Ingestor and Tailer.
    #[must_use]
    pub fn with_backoff_initial_delay(mut self, delay: Duration) -> Self {
        self.backoff_initial_delay = delay;
        self
    }

    /// Sets the backoff ceiling shared by the Ingestor and Tailer.
    #[must_use]
    pub fn with_backoff_max_delay(mut self, delay: Duration) -> Self {
        self.backoff_max_delay = delay;
        self
    }

    /// Sets the backoff multiplier shared by the Ingestor and Tailer.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the REPLICATE page size.
    #[must_use]
    pub fn with_tail_page_size(mut self, page_size: usize) -> Self {
        self.tail_page_size = page_size;
        self
    }

    /// Sets the LIVE-TAIL iterator timeout.
    #[must_use]
    pub fn with_tail_live_timeout(mut self, timeout: Duration) -> Self {
        self.tail_live_timeout = timeout;
        self
    }

    /// Sets the object ref URL template.
    #[must_use]
    pub fn with_object_url_template(mut self, template: impl Into<String>) -> Self {
        self.object_url_template = Some(template.into());
        self
    }

    /// Builds the `Ingestor`'s config from this agent config.
    #[must_use]
    pub fn ingestor_config(&self) -> IngestorConfig {
        IngestorConfig {
            channel_capacity: self.ingest_queue_capacity,
            backoff: IngestBackoffConfig {
                initial_delay: self.backoff_initial_delay,
                max_delay: self.backoff_max_delay,
                backoff_multiplier: self.backoff_multiplier,
            },
        }
    }

    /// Builds a `Tailer`'s config from this agent config.
    #[must_use]
    pub fn tailer_config(&self) -> TailerConfig {
        TailerConfig {
            page_size: self.tail_page_size,
            live_tail_timeout: self.tail_live_timeout,
            object_url_template: self.object_url_template.clone(),
            backoff: TailBackoffConfig {
                initial_delay: self.backoff_initial_delay,
                max_delay: self.backoff_max_delay,
                backoff_multiplier: self.backoff_multiplier,
            },
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}
