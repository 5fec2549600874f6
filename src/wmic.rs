//! WMI query results
//!
//! On Windows the host is queried with `wmic <alias> get <fields> /format:csv`.
//! The output is a CSV table preceded by a blank line, with a leading `Node`
//! column holding the machine name:
//!
//! ```text
//!
//! Node,Manufacturer,ReleaseDate,SerialNumber,Version
//! DESKTOP-1,LENOVO,20230412000000.000000+000,PF3ABCDE,LENOVO - 1560
//! ```
//!
//! Parsing is platform independent so it can be tested anywhere; only
//! [`query`] needs Windows.

use csv::ReaderBuilder;
use std::collections::BTreeMap;

use crate::error::SourceError;

/// One row of a WMI result set; empty cells are `None`
pub type WmiRow = BTreeMap<String, Option<String>>;

/// Parse the CSV output of a `wmic ... /format:csv` invocation.
pub fn parse_csv(source_id: &str, output: &str) -> Result<Vec<WmiRow>, SourceError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(output.as_bytes());

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for record_result in reader.records() {
        let record = record_result
            .map_err(|err| SourceError::malformed(source_id, format!("invalid CSV: {err}")))?;

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let Some(columns) = header.as_ref() else {
            header = Some(record.iter().map(str::to_string).collect());
            continue;
        };

        let row: WmiRow = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = record
                    .get(i)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string);
                (column.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    if header.is_none() {
        return Err(SourceError::malformed(source_id, "no header row in query output"));
    }
    Ok(rows)
}

/// Look up a field of a row, treating absent columns like empty cells.
pub fn field<'a>(row: &'a WmiRow, name: &str) -> Option<&'a str> {
    row.get(name).and_then(|value| value.as_deref())
}

/// Run a WMI query through `wmic` and parse its result set.
#[cfg(target_os = "windows")]
pub fn query(alias: &str, fields: &[&str]) -> Result<Vec<WmiRow>, SourceError> {
    use std::process::Command;

    let field_list = fields.join(",");
    let source_id = format!("wmic {alias} get {field_list}");
    tracing::debug!("running {source_id}");

    let output = Command::new("wmic")
        .args([alias, "get", &field_list, "/format:csv"])
        .output()
        .map_err(|err| SourceError::unavailable(&source_id, &err))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::Unavailable {
            source_id,
            kind: std::io::ErrorKind::Other,
            reason: stderr.trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_csv(&source_id, &stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wmic_output() {
        let output = "\r\r\nNode,Manufacturer,ReleaseDate,SerialNumber,Version\r\r\nDESKTOP-1,LENOVO,20230412000000.000000+000,,LENOVO - 1560\r\r\n";
        let rows = parse_csv("wmic bios", output).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(field(&rows[0], "Manufacturer"), Some("LENOVO"));
        assert_eq!(field(&rows[0], "Version"), Some("LENOVO - 1560"));
        assert_eq!(field(&rows[0], "SerialNumber"), None);
        assert_eq!(field(&rows[0], "Missing"), None);
    }

    #[test]
    fn test_parse_multiple_rows_with_short_records() {
        let output = "Node,Name,MACAddress,Speed\nPC,Ethernet,AA:BB:CC:DD:EE:FF,1000000000\nPC,WAN Miniport\n";
        let rows = parse_csv("wmic nic", output).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(field(&rows[1], "Name"), Some("WAN Miniport"));
        assert_eq!(field(&rows[1], "MACAddress"), None);
    }

    #[test]
    fn test_empty_output_is_malformed() {
        let err = parse_csv("wmic bios", "\r\n\r\n").unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }
}
