//! Fact sources
//!
//! Host-derived values written by the system loop. Whether they reflect the
//! real host or stay synthetic is a per-deployment choice ([`FactsMode`]).

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use sysinfo::System;

use crate::error::{Error, Result};

/// Upper bound of synthetic memory usage (8 GiB)
const SYNTHETIC_MEMORY_MAX: u64 = 8 * 1024 * 1024 * 1024;

/// Label tuple of the system info gauge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub version: String,
}

impl SystemInfo {
    /// Label values in registration order
    pub fn label_values(&self) -> [&str; 3] {
        [self.os.as_str(), self.arch.as_str(), self.version.as_str()]
    }
}

/// Provider of optional host facts
///
/// Any error is recoverable: the loop skips that update for one tick.
pub trait FactSource: Send + Sync {
    /// Memory in use, in bytes
    fn memory_used(&self) -> Result<u64>;

    /// Labels describing the host
    fn system_info(&self) -> Result<SystemInfo>;
}

// =============================================================================
// Synthetic
// =============================================================================

/// Fabricated facts
#[derive(Debug, Clone, Default)]
pub struct SyntheticFacts;

impl FactSource for SyntheticFacts {
    fn memory_used(&self) -> Result<u64> {
        Ok(rand::rng().random_range(0..SYNTHETIC_MEMORY_MAX))
    }

    fn system_info(&self) -> Result<SystemInfo> {
        Ok(SystemInfo {
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            version: "1.0".to_string(),
        })
    }
}

// =============================================================================
// Host
// =============================================================================

/// Facts read from the running host
pub struct HostFacts {
    system: Mutex<System>,
}

impl HostFacts {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for HostFacts {
    fn default() -> Self {
        Self::new()
    }
}

impl FactSource for HostFacts {
    fn memory_used(&self) -> Result<u64> {
        let mut system = self.system.lock();
        system.refresh_memory();

        // sysinfo reports zero total when the platform is unsupported
        if system.total_memory() == 0 {
            return Err(Error::Fact("memory statistics unavailable".to_string()));
        }
        Ok(system.used_memory())
    }

    fn system_info(&self) -> Result<SystemInfo> {
        let os = System::name().ok_or_else(|| Error::Fact("OS name unavailable".to_string()))?;
        let version = System::os_version()
            .ok_or_else(|| Error::Fact("OS version unavailable".to_string()))?;

        Ok(SystemInfo {
            os: os.to_lowercase(),
            arch: std::env::consts::ARCH.to_string(),
            version,
        })
    }
}

impl std::fmt::Debug for HostFacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFacts").finish()
    }
}

// =============================================================================
// Mode
// =============================================================================

/// Which fact source a deployment uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FactsMode {
    /// Fabricated values
    #[default]
    Synthetic,
    /// Real host memory and OS labels
    Host,
}

impl FactsMode {
    /// Build the fact source for this mode
    pub fn source(&self) -> Arc<dyn FactSource> {
        match self {
            FactsMode::Synthetic => Arc::new(SyntheticFacts),
            FactsMode::Host => Arc::new(HostFacts::new()),
        }
    }
}

impl std::fmt::Display for FactsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactsMode::Synthetic => write!(f, "synthetic"),
            FactsMode::Host => write!(f, "host"),
        }
    }
}
