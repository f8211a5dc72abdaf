use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::phase::PhaseKey;
use crate::request::ExecutionRequest;
use crate::retry::RetryPolicy;

/// Run configuration. Built once at start-up and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateConfig {
    /// Per-command timeout; 0 means unbounded.
    pub timeout_secs: u64,
    pub retries: u32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub dry_run: bool,
    pub parallel: bool,
    pub skip: Vec<PhaseKey>,
    pub health_scan: bool,
    pub component_cleanup: bool,
    /// Replaces the default selection entirely when present.
    pub only: Option<Vec<PhaseKey>>,
    pub log_dir: Option<PathBuf>,
    pub phases: BTreeMap<String, PhaseOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhaseOverride {
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            retries: 2,
            backoff_base_secs: RetryPolicy::DEFAULT_BASE_SECS,
            backoff_cap_secs: RetryPolicy::DEFAULT_CAP_SECS,
            dry_run: false,
            parallel: true,
            skip: Vec::new(),
            health_scan: false,
            component_cleanup: false,
            only: None,
            log_dir: None,
            phases: BTreeMap::new(),
        }
    }
}

impl UpdateConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse autopatch config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.retries == 0 {
            return Err(anyhow!("retries must be at least 1"));
        }
        for (name, phase_override) in &self.phases {
            PhaseKey::parse(name).with_context(|| format!("invalid [phases.{name}] section"))?;
            if phase_override.retries == Some(0) {
                return Err(anyhow!("[phases.{name}] retries must be at least 1"));
            }
        }
        if self.only.as_ref().is_some_and(Vec::is_empty) {
            return Err(anyhow!("'only' must name at least one phase"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> RetryPolicy {
        RetryPolicy::new(self.backoff_base_secs, self.backoff_cap_secs)
    }

    fn phase_override(&self, key: PhaseKey) -> Option<&PhaseOverride> {
        self.phases
            .iter()
            .find(|(name, _)| PhaseKey::parse(name).ok() == Some(key))
            .map(|(_, value)| value)
    }

    /// Effective command policy for one phase after applying `[phases.<key>]`.
    pub fn settings_for(&self, key: PhaseKey) -> PhaseSettings {
        let phase_override = self.phase_override(key);
        let timeout = match phase_override.and_then(|value| value.timeout_secs) {
            Some(secs) => timeout_from_secs(secs),
            None => self.timeout(),
        };
        let retries = phase_override
            .and_then(|value| value.retries)
            .unwrap_or(self.retries)
            .max(1);

        PhaseSettings {
            timeout,
            retries,
            backoff: self.backoff(),
        }
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Command policy handed to a phase adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSettings {
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub backoff: RetryPolicy,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        UpdateConfig::default().settings_for(PhaseKey::Winget)
    }
}

impl PhaseSettings {
    /// Raises a bounded timeout to `floor`. Unbounded stays unbounded.
    pub fn with_timeout_floor(mut self, floor: Duration) -> Self {
        self.timeout = self.timeout.map(|timeout| timeout.max(floor));
        self
    }

    pub fn single_attempt(mut self) -> Self {
        self.retries = 1;
        self
    }

    pub fn request<I, S>(&self, program: &str, args: I) -> ExecutionRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExecutionRequest::new(program, args)
            .timeout(self.timeout)
            .retries(self.retries)
            .backoff(self.backoff)
    }
}

/// The set of phases to run, resolved once before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSelection {
    phases: BTreeSet<PhaseKey>,
}

impl PhaseSelection {
    pub fn resolve(config: &UpdateConfig) -> Self {
        if let Some(only) = &config.only {
            return Self::explicit(only.iter().copied());
        }

        let mut phases = PhaseKey::ALL
            .into_iter()
            .filter(|key| !key.is_opt_in())
            .collect::<BTreeSet<_>>();
        for key in &config.skip {
            phases.remove(key);
        }
        if config.health_scan {
            phases.insert(PhaseKey::Health);
        }
        if config.component_cleanup {
            phases.insert(PhaseKey::Cleanup);
        }
        Self { phases }
    }

    pub fn explicit(phases: impl IntoIterator<Item = PhaseKey>) -> Self {
        Self {
            phases: phases.into_iter().collect(),
        }
    }

    pub fn contains(&self, key: PhaseKey) -> bool {
        self.phases.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn concurrent_group(&self) -> Vec<PhaseKey> {
        PhaseKey::CONCURRENT_GROUP
            .into_iter()
            .filter(|key| self.contains(*key))
            .collect()
    }

    pub fn sequential(&self) -> Vec<PhaseKey> {
        PhaseKey::SEQUENTIAL_ORDER
            .into_iter()
            .filter(|key| self.contains(*key))
            .collect()
    }

    /// Dispatch order: the package-manager group first, then the fixed sequence.
    pub fn execution_order(&self) -> Vec<PhaseKey> {
        let mut order = self.concurrent_group();
        order.extend(self.sequential());
        order
    }
}
