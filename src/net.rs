//! Network interface detection module
//!
//! Detects network interfaces using:
//! - Linux: /sys/class/net
//! - Windows: WMI `nic` alias

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;
use crate::source::{child, Source};
use crate::wmic::{field, WmiRow};

const NET_ROOT: &str = "sys/class/net";

/// A network interface controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    /// Interface name (e.g., "eth0"); never empty
    pub name: String,
    /// Hardware address, if the interface has one
    pub mac_address: Option<String>,
    /// Software interface with no backing device (loopback, bridge, veth, ...)
    pub is_virtual: bool,
    /// Link speed in Mbit/s, only known while the link is up
    pub speed_mbps: Option<u64>,
    /// "full" or "half", only known while the link is up
    pub duplex: Option<String>,
}

/// All network interfaces of the host, sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub nics: Vec<Nic>,
}

impl NetworkInfo {
    /// Enumerate interfaces from sysfs
    pub fn detect<S: Source>(source: &S) -> Result<Self, SourceError> {
        let names = source.list_children(NET_ROOT)?;

        let mut nics = Vec::new();
        for name in names {
            let id = child(NET_ROOT, &name);
            // skip plain files such as bonding_masters
            if source.list_children(&id).is_err() {
                continue;
            }

            let is_virtual = match source.resolve(&id) {
                Ok(device) => device.contains("/devices/virtual/"),
                Err(err) => {
                    debug!("could not resolve {id}: {err}");
                    false
                }
            };
            let speed_mbps = source
                .read_parsed::<i64>(&child(&id, "speed"))
                .ok()
                .filter(|speed| *speed > 0)
                .and_then(|speed| u64::try_from(speed).ok());
            let duplex = source
                .read_optional(&child(&id, "duplex"))
                .filter(|duplex| duplex != "unknown");

            nics.push(Nic {
                mac_address: source.read_optional(&child(&id, "address")),
                name,
                is_virtual,
                speed_mbps,
                duplex,
            });
        }

        debug!("found {} network interfaces", nics.len());
        Ok(NetworkInfo { nics })
    }

    /// Query network adapters through WMI
    #[cfg(target_os = "windows")]
    pub fn detect_wmi() -> Result<Self, SourceError> {
        let rows = crate::wmic::query(
            "nic",
            &["Name", "MACAddress", "Speed", "PhysicalAdapter"],
        )?;
        Ok(Self::from_wmi_rows(&rows))
    }

    /// Map a WMI `nic` result set; adapters without a name are dropped
    pub fn from_wmi_rows(rows: &[WmiRow]) -> Self {
        let mut nics: Vec<Nic> = rows
            .iter()
            .filter_map(|row| {
                let name = field(row, "Name")?.to_string();
                Some(Nic {
                    name,
                    mac_address: field(row, "MACAddress").map(str::to_string),
                    is_virtual: field(row, "PhysicalAdapter")
                        .is_some_and(|physical| physical.eq_ignore_ascii_case("false")),
                    // WMI reports bits per second
                    speed_mbps: field(row, "Speed")
                        .and_then(|speed| speed.parse::<u64>().ok())
                        .map(|bps| bps / 1_000_000)
                        .filter(|mbps| *mbps > 0),
                    duplex: None,
                })
            })
            .collect();
        nics.sort_by(|a, b| a.name.cmp(&b.name));
        NetworkInfo { nics }
    }

    /// Display network interfaces as formatted string
    pub fn display(&self) -> String {
        let mut output = String::new();
        for nic in &self.nics {
            output.push_str(&format!(
                "NIC: {} {}{}",
                nic.name,
                nic.mac_address.as_deref().unwrap_or("--"),
                if nic.is_virtual { " (virtual)" } else { "" }
            ));
            if let Some(speed) = nic.speed_mbps {
                output.push_str(&format!(" | {speed} Mb/s"));
            }
            if let Some(ref duplex) = nic.duplex {
                output.push_str(&format!(" {duplex} duplex"));
            }
            output.push('\n');
        }
        output
    }
}
