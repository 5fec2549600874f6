//! BIOS detection module
//!
//! Detects firmware information using:
//! - Linux: /sys/class/dmi/id (readable without root)
//! - Windows: WMI `bios` alias

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;
use crate::source::{child, Source};
use crate::wmic::{field, WmiRow};

const DMI_ROOT: &str = "sys/class/dmi/id";

/// BIOS information; any field the host does not expose is `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiosInfo {
    /// Firmware vendor (e.g., "American Megatrends Inc.")
    pub vendor: Option<String>,
    /// Firmware version string
    pub version: Option<String>,
    /// Release date, MM/DD/YYYY
    pub date: Option<String>,
    /// Serial number; only reported by WMI
    pub serial_number: Option<String>,
}

impl BiosInfo {
    /// Read BIOS information from the DMI tables exported in sysfs
    pub fn detect<S: Source>(source: &S) -> Result<Self, SourceError> {
        // fail only when the DMI directory itself is absent
        source.list_children(DMI_ROOT)?;

        let info = BiosInfo {
            vendor: source.read_optional(&child(DMI_ROOT, "bios_vendor")),
            version: source.read_optional(&child(DMI_ROOT, "bios_version")),
            date: source.read_optional(&child(DMI_ROOT, "bios_date")),
            // DMI has no BIOS serial; product_serial belongs to the system
            serial_number: None,
        };
        debug!("bios: {info:?}");
        Ok(info)
    }

    /// Query BIOS information through WMI
    #[cfg(target_os = "windows")]
    pub fn detect_wmi() -> Result<Self, SourceError> {
        let rows = crate::wmic::query(
            "bios",
            &["Manufacturer", "Version", "ReleaseDate", "SerialNumber"],
        )?;
        Ok(Self::from_wmi_rows(&rows))
    }

    /// Map a WMI `bios` result set; only the first row is used
    pub fn from_wmi_rows(rows: &[WmiRow]) -> Self {
        let Some(row) = rows.first() else {
            return Self::default();
        };
        BiosInfo {
            vendor: field(row, "Manufacturer").map(str::to_string),
            version: field(row, "Version").map(str::to_string),
            date: field(row, "ReleaseDate").map(cim_date),
            serial_number: field(row, "SerialNumber").map(str::to_string),
        }
    }

    /// Display BIOS info as formatted string
    pub fn display(&self) -> String {
        let unknown = |value: &Option<String>| value.clone().unwrap_or_else(|| "Unknown".to_string());
        format!(
            "BIOS: {} {} ({})",
            unknown(&self.vendor),
            unknown(&self.version),
            unknown(&self.date)
        )
    }
}

/// Convert a CIM datetime (`yyyymmddHHMMSS.mmmmmmsUUU`) to MM/DD/YYYY.
///
/// Anything that doesn't look like one is returned unchanged.
fn cim_date(value: &str) -> String {
    let digits = value.get(..8).filter(|d| d.bytes().all(|b| b.is_ascii_digit()));
    match digits {
        Some(d) => format!("{}/{}/{}", &d[4..6], &d[6..8], &d[..4]),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SysfsSource;
    use crate::wmic::parse_csv;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_from_dmi() {
        let dir = TempDir::new().unwrap();
        let dmi = dir.path().join(DMI_ROOT);
        fs::create_dir_all(&dmi).unwrap();
        fs::write(dmi.join("bios_vendor"), "Acme Firmware\n").unwrap();
        fs::write(dmi.join("bios_version"), "1.2.3\n").unwrap();
        fs::write(dmi.join("bios_date"), "04/12/2023\n").unwrap();
        fs::write(dmi.join("product_serial"), "SYS-1234\n").unwrap();
        let source = SysfsSource::new(dir.path());

        let bios = BiosInfo::detect(&source).unwrap();

        assert_eq!(bios.vendor.as_deref(), Some("Acme Firmware"));
        assert_eq!(bios.version.as_deref(), Some("1.2.3"));
        assert_eq!(bios.date.as_deref(), Some("04/12/2023"));
        assert_eq!(bios.serial_number, None);
        assert_eq!(bios.display(), "BIOS: Acme Firmware 1.2.3 (04/12/2023)");
    }

    #[test]
    fn test_missing_dmi_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = SysfsSource::new(dir.path());

        let err = BiosInfo::detect(&source).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_wmi_rows() {
        let output = "\nNode,Manufacturer,ReleaseDate,SerialNumber,Version\nPC,LENOVO,20230412000000.000000+000,PF3ABCDE,N2HET33W\n";
        let rows = parse_csv("wmic bios", output).unwrap();

        let bios = BiosInfo::from_wmi_rows(&rows);

        assert_eq!(bios.vendor.as_deref(), Some("LENOVO"));
        assert_eq!(bios.date.as_deref(), Some("04/12/2023"));
        assert_eq!(bios.serial_number.as_deref(), Some("PF3ABCDE"));
        assert_eq!(BiosInfo::from_wmi_rows(&[]), BiosInfo::default());
    }

    #[test]
    fn test_cim_date_passthrough() {
        assert_eq!(cim_date("2023"), "2023");
        assert_eq!(cim_date("not-a-date"), "not-a-date");
    }
}
