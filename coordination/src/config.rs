//! Coordinator configuration
//!
//! Loaded from TOML with per-field defaults, then adjusted by `COUNCIL_*`
//! environment variables.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinationConfig {
    pub scheduler: SchedulerConfig,
    pub debate: DebateConfig,
    pub events: EventBusConfig,
}

impl CoordinationConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid coordinator TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `COUNCIL_*` environment variables over the current values
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        override_from_env(
            "COUNCIL_MAX_CONCURRENT_WORKFLOWS",
            &mut self.scheduler.max_concurrent_workflows,
        )?;
        override_from_env(
            "COUNCIL_MAX_IN_FLIGHT_TASKS",
            &mut self.scheduler.max_in_flight_tasks,
        )?;
        override_from_env("COUNCIL_MAX_QUEUED_TASKS", &mut self.scheduler.max_queued_tasks)?;
        override_from_env("COUNCIL_POLL_INTERVAL_MS", &mut self.scheduler.poll_interval_ms)?;
        override_from_env(
            "COUNCIL_DEFAULT_MAX_RETRIES",
            &mut self.scheduler.default_max_retries,
        )?;
        override_from_env("COUNCIL_RETRY_BACKOFF_MS", &mut self.scheduler.retry_backoff_ms)?;
        override_from_env(
            "COUNCIL_ENFORCE_WORKFLOW_TIMEOUT",
            &mut self.scheduler.enforce_workflow_timeout,
        )?;
        override_from_env("COUNCIL_DEBATE_MAX_ROUNDS", &mut self.debate.max_rounds)?;
        override_from_env(
            "COUNCIL_CONSENSUS_THRESHOLD",
            &mut self.debate.consensus_threshold,
        )?;
        override_from_env("COUNCIL_EVENT_CHANNEL_CAPACITY", &mut self.events.channel_capacity)?;
        override_from_env(
            "COUNCIL_EVENT_RETAINED_CAPACITY",
            &mut self.events.retained_capacity,
        )?;
        override_from_env("COUNCIL_PERSIST_EVENTS", &mut self.events.persist_events)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.scheduler.validate()?;
        self.debate.validate()?;
        self.events.validate()?;
        Ok(())
    }
}

fn override_from_env<T>(key: &str, slot: &mut T) -> anyhow::Result<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is not valid: {e}"))?;
    }
    Ok(())
}

/// Workflow scheduler limits and retry policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ceiling on workflows in `in_progress` or `paused`
    pub max_concurrent_workflows: usize,
    /// Executor invocations allowed to run at once
    pub max_in_flight_tasks: usize,
    /// Ready-queue capacity
    pub max_queued_tasks: usize,
    /// Upper bound on a single queue wait
    pub poll_interval_ms: u64,
    /// Retries for tasks that do not set their own
    pub default_max_retries: u32,
    /// Delay before a failed task is re-enqueued
    pub retry_backoff_ms: u64,
    /// Cancel workflows whose overall timeout has elapsed
    pub enforce_workflow_timeout: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 5,
            max_in_flight_tasks: 4,
            max_queued_tasks: 1024,
            poll_interval_ms: 100,
            default_max_retries: 3,
            retry_backoff_ms: 0,
            enforce_workflow_timeout: false,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Copy with every capacity raised to at least 1, so a config built
    /// in code without `validate` cannot stall the scheduler
    pub fn clamped(&self) -> Self {
        Self {
            max_concurrent_workflows: self.max_concurrent_workflows.max(1),
            max_in_flight_tasks: self.max_in_flight_tasks.max(1),
            max_queued_tasks: self.max_queued_tasks.max(1),
            ..self.clone()
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_workflows == 0 {
            bail!("scheduler.max_concurrent_workflows must be at least 1");
        }
        if self.max_in_flight_tasks == 0 {
            bail!("scheduler.max_in_flight_tasks must be at least 1");
        }
        if self.max_queued_tasks == 0 {
            bail!("scheduler.max_queued_tasks must be at least 1");
        }
        Ok(())
    }
}

/// Debate defaults applied by `create_debate`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebateConfig {
    pub max_rounds: u32,
    pub consensus_threshold: f64,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            consensus_threshold: 0.8,
        }
    }
}

impl DebateConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_rounds == 0 {
            bail!("debate.max_rounds must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.consensus_threshold) {
            bail!(
                "debate.consensus_threshold must be within [0, 1], got {}",
                self.consensus_threshold
            );
        }
        Ok(())
    }
}

/// Event bus sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventBusConfig {
    /// Broadcast channel capacity for stream subscribers
    pub channel_capacity: usize,
    /// Events kept for polling consumers
    pub retained_capacity: usize,
    /// Write every event to the knowledge base when one is attached
    pub persist_events: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            retained_capacity: 1000,
            persist_events: false,
        }
    }
}

impl EventBusConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channel_capacity == 0 {
            bail!("events.channel_capacity must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CoordinationConfig::default();
        assert_eq!(config.scheduler.max_concurrent_workflows, 5);
        assert_eq!(config.scheduler.default_max_retries, 3);
        assert!(!config.scheduler.enforce_workflow_timeout);
        assert_eq!(config.debate.max_rounds, 5);
        assert!((config.debate.consensus_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.events.channel_capacity, 256);
    }

    #[test]
    fn test_clamped_raises_zero_capacities() {
        let config = SchedulerConfig {
            max_in_flight_tasks: 0,
            max_queued_tasks: 0,
            retry_backoff_ms: 40,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let clamped = config.clamped();
        assert_eq!(clamped.max_in_flight_tasks, 1);
        assert_eq!(clamped.max_queued_tasks, 1);
        assert_eq!(clamped.max_concurrent_workflows, 5);
        assert_eq!(clamped.retry_backoff_ms, 40);
        assert!(clamped.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CoordinationConfig::from_toml_str(
            r#"
            [scheduler]
            max_in_flight_tasks = 1

            [debate]
            consensus_threshold = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.max_in_flight_tasks, 1);
        assert_eq!(config.scheduler.max_queued_tasks, 1024);
        assert!((config.debate.consensus_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.debate.max_rounds, 5);
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = CoordinationConfig::from_toml_str("[debate]\nconsensus_threshold = 1.5\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_zero_rounds() {
        let config = DebateConfig {
            max_rounds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[events]\nretained_capacity = 10").unwrap();
        let config = CoordinationConfig::load(file.path()).unwrap();
        assert_eq!(config.events.retained_capacity, 10);
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = CoordinationConfig::load("/nonexistent/council.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut slot = 0usize;
        std::env::set_var("COUNCIL_TEST_BAD_NUMBER", "many");
        let result = override_from_env("COUNCIL_TEST_BAD_NUMBER", &mut slot);
        std::env::remove_var("COUNCIL_TEST_BAD_NUMBER");
        assert!(result.is_err());
        assert_eq!(slot, 0);
    }

    #[test]
    fn test_env_override_applies() {
        let mut slot = 1u32;
        std::env::set_var("COUNCIL_TEST_ROUNDS", "7");
        override_from_env("COUNCIL_TEST_ROUNDS", &mut slot).unwrap();
        std::env::remove_var("COUNCIL_TEST_ROUNDS");
        assert_eq!(slot, 7);
    }
}
