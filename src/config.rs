//! Centralized engine configuration.
//!
//! - EngineConfig::default(): library defaults (no env lookups).
//! - EngineConfig::from_env(): defaults overridden by KS_* variables.
//! - with_* setters for overrides from code or CLI flags.
//!
//! Env:
//! - KS_STOP_ON_ERROR     = 0|1|true|false (default true)
//! - KS_SNAPSHOT_POLICY   = every_checkpoint|boundaries|never (default every_checkpoint)
//! - KS_DEFAULT_LOGLEVEL  = error|warn|info|debug|trace|off (default info)
//! - KS_CANCEL_GRACE_MS   = SIGTERM -> SIGKILL delay for cancelled subprocesses (default 5000)

use log::LevelFilter;
use std::fmt;
use std::time::Duration;

use crate::snapshots::SnapshotPolicy;
use crate::util::{env_bool, parse_level};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Halt at the first failing checkpoint. A manifest's
    /// `<execution stop_on_error>` overrides this at registration.
    pub stop_on_error: bool,

    /// Which checkpoints get a rollback point before they run.
    pub snapshot_policy: SnapshotPolicy,

    /// Log level for checkpoints registered without one.
    pub default_loglevel: LevelFilter,

    /// Grace period between SIGTERM and SIGKILL when a cancelled
    /// checkpoint's subprocess group is torn down.
    pub cancel_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            snapshot_policy: SnapshotPolicy::EveryCheckpoint,
            default_loglevel: LevelFilter::Info,
            cancel_grace_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the KS_* environment. Unparsable values are
    /// ignored with a warning.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(b) = env_bool("KS_STOP_ON_ERROR") {
            cfg.stop_on_error = b;
        }

        if let Ok(v) = std::env::var("KS_SNAPSHOT_POLICY") {
            match v.parse::<SnapshotPolicy>() {
                Ok(p) => cfg.snapshot_policy = p,
                Err(e) => log::warn!("KS_SNAPSHOT_POLICY ignored: {}", e),
            }
        }

        if let Ok(v) = std::env::var("KS_DEFAULT_LOGLEVEL") {
            match parse_level(&v) {
                Some(l) => cfg.default_loglevel = l,
                None => log::warn!("KS_DEFAULT_LOGLEVEL ignored: '{}'", v),
            }
        }

        if let Ok(v) = std::env::var("KS_CANCEL_GRACE_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.cancel_grace_ms = n;
            }
        }

        cfg
    }

    pub fn with_stop_on_error(mut self, on: bool) -> Self {
        self.stop_on_error = on;
        self
    }

    pub fn with_snapshot_policy(mut self, p: SnapshotPolicy) -> Self {
        self.snapshot_policy = p;
        self
    }

    pub fn with_default_loglevel(mut self, l: LevelFilter) -> Self {
        self.default_loglevel = l;
        self
    }

    pub fn with_cancel_grace_ms(mut self, ms: u64) -> Self {
        self.cancel_grace_ms = ms;
        self
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineConfig {{ \
             stop_on_error: {}, \
             snapshot_policy: {}, \
             default_loglevel: {}, \
             cancel_grace_ms: {} \
             }}",
            self.stop_on_error, self.snapshot_policy, self.default_loglevel, self.cancel_grace_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let c = EngineConfig::default();
        assert!(c.stop_on_error);
        assert_eq!(c.snapshot_policy, SnapshotPolicy::EveryCheckpoint);
        assert_eq!(c.cancel_grace(), Duration::from_secs(5));

        let c = c
            .with_stop_on_error(false)
            .with_snapshot_policy(SnapshotPolicy::Never)
            .with_default_loglevel(LevelFilter::Debug)
            .with_cancel_grace_ms(10)
            .build();
        let s = c.to_string();
        assert!(s.contains("stop_on_error: false"));
        assert!(s.contains("snapshot_policy: never"));
        assert!(s.contains("default_loglevel: DEBUG"));
    }
}
