//! Raw source reader
//!
//! Every subsystem reads the host through the [`Source`] trait: one call reads
//! a whole pseudo-file, another lists the members of a directory-like source.
//! Source identifiers are `/`-separated paths relative to the source root, so
//! the same code can inspect the live host (`/`) or a captured tree.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::trace;

use crate::error::SourceError;

/// Read-only access to the host's pseudo-files
pub trait Source {
    /// Read the complete content of one source, split into lines.
    ///
    /// Either the whole content is returned or the call fails; there is no
    /// partial read.
    fn read_source(&self, id: &str) -> Result<Vec<String>, SourceError>;

    /// List the names of the members of a hierarchical source.
    fn list_children(&self, id: &str) -> Result<BTreeSet<String>, SourceError>;

    /// Resolve a source through any links to its canonical identifier.
    fn resolve(&self, id: &str) -> Result<String, SourceError>;

    /// Read a single-value source with surrounding whitespace removed.
    fn read_value(&self, id: &str) -> Result<String, SourceError> {
        let lines = self.read_source(id)?;
        Ok(lines.join("\n").trim().to_string())
    }

    /// Read a single-value source and parse it.
    fn read_parsed<T>(&self, id: &str) -> Result<T, SourceError>
    where
        T: FromStr,
    {
        let value = self.read_value(id)?;
        value
            .parse::<T>()
            .map_err(|_| SourceError::malformed(id, format!("failed to parse '{value}'")))
    }

    /// Read an optional single-value source: missing or empty content yields `None`.
    fn read_optional(&self, id: &str) -> Option<String> {
        match self.read_value(id) {
            Ok(value) if !value.is_empty() => Some(value),
            Ok(_) => None,
            Err(err) => {
                trace!("optional source skipped: {err}");
                None
            }
        }
    }
}

/// [`Source`] backed by the filesystem, rooted at a directory.
///
/// With the default root of `/` this reads the live `/sys` and `/proc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsSource {
    root: PathBuf,
}

impl Default for SysfsSource {
    fn default() -> Self {
        Self::new("/")
    }
}

impl SysfsSource {
    /// Create a source whose identifiers are resolved below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory all identifiers are resolved against
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, id: &str) -> PathBuf {
        self.root.join(id.trim_start_matches('/'))
    }
}

impl Source for SysfsSource {
    fn read_source(&self, id: &str) -> Result<Vec<String>, SourceError> {
        let path = self.path(id);
        let content =
            fs::read_to_string(&path).map_err(|err| SourceError::unavailable(id, &err))?;
        let content = content.trim_end_matches('\0');
        Ok(content.lines().map(str::to_string).collect())
    }

    fn list_children(&self, id: &str) -> Result<BTreeSet<String>, SourceError> {
        let path = self.path(id);
        let entries = fs::read_dir(&path).map_err(|err| SourceError::unavailable(id, &err))?;

        let mut children = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| SourceError::unavailable(id, &err))?;
            children.insert(entry.file_name().to_string_lossy().to_string());
        }
        Ok(children)
    }

    fn resolve(&self, id: &str) -> Result<String, SourceError> {
        let path = self.path(id);
        let resolved = fs::canonicalize(&path).map_err(|err| SourceError::unavailable(id, &err))?;
        // the root itself may be a symlinked or relative path
        let root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let relative = resolved.strip_prefix(&root).unwrap_or(&resolved);
        Ok(format!("/{}", relative.to_string_lossy().trim_start_matches('/')))
    }
}

/// Join a child name onto a source identifier
pub fn child(id: &str, name: &str) -> String {
    format!("{}/{}", id.trim_end_matches('/'), name)
}

/// Extract the numeric suffix of members named `<prefix><number>`, ascending.
///
/// Members whose suffix is not purely numeric (`cpufreq`, `cpuidle`) are ignored.
pub fn numbered_children(children: &BTreeSet<String>, prefix: &str) -> Vec<usize> {
    let mut ids: Vec<usize> = children
        .iter()
        .filter_map(|name| name.strip_prefix(prefix))
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse().ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Parse a size such as `32K`, `8M`, `1G` or a plain byte count.
pub fn parse_byte_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = if let Some(v) = value.strip_suffix('K') {
        (v, 1024)
    } else if let Some(v) = value.strip_suffix('M') {
        (v, 1024 * 1024)
    } else if let Some(v) = value.strip_suffix('G') {
        (v, 1024 * 1024 * 1024)
    } else {
        (value, 1)
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Highest processor id accepted from a cpu list or mask; the kernel caps
/// `NR_CPUS` well below this.
pub const MAX_CPU_ID: usize = (1 << 16) - 1;

/// Parse a kernel cpu list such as `0-3,8,10-11`.
///
/// Ids above [`MAX_CPU_ID`] are rejected.
pub fn parse_cpu_list(cpulist: &str) -> Result<BTreeSet<usize>, String> {
    let cpulist = cpulist.trim().trim_end_matches('\0');
    let mut cpus = BTreeSet::new();
    if cpulist.is_empty() {
        return Ok(cpus);
    }

    for group in cpulist.split(',') {
        let group = group.trim();
        let (min, max) = match group.split_once('-') {
            Some((start, end)) => (
                start
                    .parse::<usize>()
                    .map_err(|_| format!("failed to parse cpulist group '{group}'"))?,
                end.parse::<usize>()
                    .map_err(|_| format!("failed to parse cpulist group '{group}'"))?,
            ),
            None => {
                let cpu = group
                    .parse::<usize>()
                    .map_err(|_| format!("failed to parse cpulist group '{group}'"))?;
                (cpu, cpu)
            }
        };
        if min > max {
            return Err(format!("inverted cpulist range '{group}'"));
        }
        if max > MAX_CPU_ID {
            return Err(format!("cpulist group '{group}' exceeds cpu {MAX_CPU_ID}"));
        }
        cpus.extend(min..=max);
    }
    Ok(cpus)
}

/// Parse a kernel hex cpu mask such as `00000000,0000000f`.
///
/// Words are 32 bits, most significant first.
pub fn parse_cpu_mask(mask: &str) -> Result<BTreeSet<usize>, String> {
    let mask = mask.trim().trim_end_matches('\0');
    let mut cpus = BTreeSet::new();

    for (word_index, word) in mask.rsplit(',').enumerate() {
        let word = word.trim().trim_start_matches("0x");
        if word.is_empty() {
            continue;
        }
        let bits = u32::from_str_radix(word, 16)
            .map_err(|_| format!("failed to parse cpumask word '{word}'"))?;
        if bits != 0 && word_index * 32 > MAX_CPU_ID {
            return Err(format!("cpumask sets cpus beyond {MAX_CPU_ID}"));
        }
        let mut v = bits;
        while v != 0 {
            let lsb = v.trailing_zeros() as usize;
            v &= !(1 << lsb);
            cpus.insert(word_index * 32 + lsb);
        }
    }
    Ok(cpus)
}
