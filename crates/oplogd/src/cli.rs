//! Command-line flags, layered over [`AgentConfig`]'s defaults.

use std::time::Duration;

use clap::Parser;

use crate::config::AgentConfig;

/// The operation-log replication agent.
#[derive(Debug, Parser)]
#[command(name = "oplogd", version, about)]
pub struct AgentCli {
    /// Entry-count cap on the op-log.
    #[arg(long, env = "OPLOGD_OP_LOG_MAX_ENTRIES")]
    pub op_log_max_entries: Option<usize>,

    /// Bounded capacity of the ingest channel.
    #[arg(long, env = "OPLOGD_INGEST_QUEUE_CAPACITY")]
    pub ingest_queue_capacity: Option<usize>,

    /// Initial retry delay, in milliseconds, shared by the Ingestor and
    /// the Tailer.
    #[arg(long, env = "OPLOGD_BACKOFF_INITIAL_MS")]
    pub backoff_initial_ms: Option<u64>,

    /// Maximum retry delay, in seconds.
    #[arg(long, env = "OPLOGD_BACKOFF_MAX_SECS")]
    pub backoff_max_secs: Option<u64>,

    /// Retry delay multiplier.
    #[arg(long, env = "OPLOGD_BACKOFF_MULTIPLIER")]
    pub backoff_multiplier: Option<f64>,

    /// Page size for `ReadStates` during REPLICATE.
    #[arg(long, env = "OPLOGD_TAIL_PAGE_SIZE")]
    pub tail_page_size: Option<usize>,

    /// LIVE-TAIL iterator timeout, in seconds.
    #[arg(long, env = "OPLOGD_TAIL_LIVE_TIMEOUT_SECS")]
    pub tail_live_timeout_secs: Option<u64>,

    /// URL template substituting `{{type}}`/`{{id}}` into emitted refs.
    #[arg(long, env = "OPLOGD_OBJECT_URL_TEMPLATE")]
    pub object_url_template: Option<String>,

    /// Parse and log the resolved configuration, then exit without
    /// starting the agent.
    #[arg(long)]
    pub dry_run: bool,
}

impl AgentCli {
    /// Resolves this CLI invocation into an [`AgentConfig`], applying
    /// each provided flag over the agent's defaults.
    #[must_use]
    pub fn into_config(self) -> AgentConfig {
        let mut config = AgentConfig::new();
        if let Some(v) = self.op_log_max_entries {
            config = config.with_op_log_max_entries(v);
        }
        if let Some(v) = self.ingest_queue_capacity {
            config = config.with_ingest_queue_capacity(v);
        }
        if let Some(v) = self.backoff_initial_ms {
            config = config.with_backoff_initial_delay(Duration::from_millis(v));
        }
        if let Some(v) = self.backoff_max_secs {
            config = config.with_backoff_max_delay(Duration::from_secs(v));
        }
        if let Some(v) = self.backoff_multiplier {
            config = config.with_backoff_multiplier(v);
        }
        if let Some(v) = self.tail_page_size {
            config = config.with_tail_page_size(v);
        }
        if let Some(v) = self.tail_live_timeout_secs {
            config = config.with_tail_live_timeout(Duration::from_secs(v));
        }
        if let Some(v) = self.object_url_template {
            config = config.with_object_url_template(v);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_yields_defaults() {
        let cli = AgentCli::parse_from(["oplogd"]);
        let config = cli.into_config();
        assert_eq!(config.op_log_max_entries, AgentConfig::new().op_log_max_entries);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = AgentCli::parse_from([
            "oplogd",
            "--op-log-max-entries",
            "42",
            "--object-url-template",
            "https://x/{{type}}/{{id}}",
        ]);
        let config = cli.into_config();
        assert_eq!(config.op_log_max_entries, 42);
        assert_eq!(
            config.object_url_template.as_deref(),
            Some("https://x/{{type}}/{{id}}")
        );
    }

    #[test]
    fn dry_run_flag_parses() {
        let cli = AgentCli::parse_from(["oplogd", "--dry-run"]);
        assert!(cli.dry_run);
    }
}
