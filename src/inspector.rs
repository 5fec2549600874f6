//! Entry point tying the individual detectors together
//!
//! An [`Inspector`] owns the [`SysfsSource`] every detector reads through, so
//! a whole report can be taken from a snapshot directory as easily as from the
//! running host.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::bios::BiosInfo;
use crate::config::Config;
use crate::error::{DiscoveryError, SourceError};
use crate::net::NetworkInfo;
use crate::source::SysfsSource;
use crate::topology::{self, TopologyInfo};

/// Reads host information rooted at a directory
#[derive(Debug, Clone, Default)]
pub struct Inspector {
    source: SysfsSource,
}

impl Inspector {
    /// Inspect the running host
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a directory laid out like `/`, e.g. a copied sysfs tree
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Inspector {
            source: SysfsSource::new(root),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_root(config.root())
    }

    pub fn source(&self) -> &SysfsSource {
        &self.source
    }

    pub fn topology(&self) -> Result<TopologyInfo, DiscoveryError> {
        topology::discover_with(&self.source)
    }

    pub fn bios(&self) -> Result<BiosInfo, SourceError> {
        #[cfg(target_os = "windows")]
        {
            BiosInfo::detect_wmi()
        }
        #[cfg(not(target_os = "windows"))]
        {
            BiosInfo::detect(&self.source)
        }
    }

    pub fn network(&self) -> Result<NetworkInfo, SourceError> {
        #[cfg(target_os = "windows")]
        {
            NetworkInfo::detect_wmi()
        }
        #[cfg(not(target_os = "windows"))]
        {
            NetworkInfo::detect(&self.source)
        }
    }

    /// Collect everything; only a topology failure is fatal
    pub fn host(&self) -> Result<HostInfo, DiscoveryError> {
        let topology = self.topology()?;

        let bios = self
            .bios()
            .map_err(|err| warn!("BIOS information unavailable: {err}"))
            .ok();
        let network = self
            .network()
            .map_err(|err| warn!("network information unavailable: {err}"))
            .ok();

        Ok(HostInfo {
            topology,
            bios,
            network,
        })
    }
}

/// Complete host report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub topology: TopologyInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bios: Option<BiosInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,
}

impl HostInfo {
    /// Display host info as formatted string
    pub fn display(&self) -> String {
        let mut output = self.topology.display();
        output.push('\n');

        if let Some(ref bios) = self.bios {
            output.push_str(&bios.display());
            output.push('\n');
        }
        if let Some(ref network) = self.network {
            output.push_str(&network.display());
        }
        output
    }
}
