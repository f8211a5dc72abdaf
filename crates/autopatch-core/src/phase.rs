use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseKey {
    Winget,
    #[serde(alias = "choco")]
    Chocolatey,
    Store,
    #[serde(alias = "windows", alias = "os")]
    WindowsUpdate,
    Health,
    Cleanup,
}

impl PhaseKey {
    pub const ALL: [PhaseKey; 6] = [
        Self::Winget,
        Self::Chocolatey,
        Self::Store,
        Self::WindowsUpdate,
        Self::Health,
        Self::Cleanup,
    ];

    /// Package-manager phases touch disjoint external state and may overlap.
    pub const CONCURRENT_GROUP: [PhaseKey; 2] = [Self::Winget, Self::Chocolatey];

    /// Fixed order for everything after the concurrent group. The update
    /// service lock is shared by windows-update, health and cleanup.
    pub const SEQUENTIAL_ORDER: [PhaseKey; 4] = [
        Self::Store,
        Self::WindowsUpdate,
        Self::Health,
        Self::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Winget => "winget",
            Self::Chocolatey => "chocolatey",
            Self::Store => "store",
            Self::WindowsUpdate => "windows-update",
            Self::Health => "health",
            Self::Cleanup => "cleanup",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "winget" => Ok(Self::Winget),
            "chocolatey" | "choco" => Ok(Self::Chocolatey),
            "store" => Ok(Self::Store),
            "windows-update" | "windows" | "os" => Ok(Self::WindowsUpdate),
            "health" => Ok(Self::Health),
            "cleanup" => Ok(Self::Cleanup),
            _ => Err(anyhow!("unknown phase: {value}")),
        }
    }

    /// Opt-in phases never run unless explicitly requested.
    pub fn is_opt_in(&self) -> bool {
        matches!(self, Self::Health | Self::Cleanup)
    }

    pub fn is_concurrent(&self) -> bool {
        Self::CONCURRENT_GROUP.contains(self)
    }
}

impl fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    Skipped,
    Succeeded,
    Failed,
}

impl PhaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
