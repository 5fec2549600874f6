//! Cache hierarchy builder
//!
//! The kernel describes every cache once per logical processor under
//! `cpu<N>/cache/index<M>/`, so a cache shared by eight threads shows up eight
//! times. Reports are merged on a canonical key made of the level, the type and
//! the set of processors the cache claims to be shared with. Size and level
//! alone are not enough: two private L1d caches look identical apart from who
//! shares them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::PartialData;
use crate::source::{child, numbered_children, parse_byte_size, parse_cpu_list, parse_cpu_mask, Source};

use super::nodes::CPU_ROOT;

/// Kind of content a cache holds.
///
/// Ordering is Data, Instruction, Unified, which is the order caches of the
/// same level are reported in.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CacheType {
    /// Data cache
    Data,
    /// Instruction cache
    Instruction,
    /// Cache holding both data and instructions
    Unified,
}

/// One physical cache instance within a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCache {
    cache_type: CacheType,
    level: u8,
    size_bytes: u64,
    logical_processors: BTreeSet<usize>,
}

impl MemoryCache {
    /// Data, instruction or unified
    pub fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    /// Zero-based distance from the processor: 0 is what the kernel calls L1
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Logical processors of the node that share this cache instance
    pub fn logical_processors(&self) -> &BTreeSet<usize> {
        &self.logical_processors
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheKey {
    level: u8,
    cache_type: CacheType,
    shared: BTreeSet<usize>,
}

#[derive(Debug)]
struct CacheRecord {
    key: CacheKey,
    size_bytes: u64,
}

#[derive(Debug)]
struct MergedCache {
    size_bytes: u64,
    reporters: BTreeSet<usize>,
}

/// Build the deduplicated cache list for the processors of one node.
///
/// Records that can't be used are skipped and noted in `annotations`.
pub(crate) fn build_caches<S: Source>(
    source: &S,
    processors: &BTreeSet<usize>,
    annotations: &mut Vec<PartialData>,
) -> Vec<MemoryCache> {
    let mut merged: BTreeMap<CacheKey, MergedCache> = BTreeMap::new();

    for &cpu in processors {
        let cache_root = child(CPU_ROOT, &format!("cpu{cpu}/cache"));
        let indexes = match source.list_children(&cache_root) {
            Ok(children) => numbered_children(&children, "index"),
            Err(err) => {
                note(
                    annotations,
                    PartialData::MalformedCacheRecord {
                        processor: cpu,
                        index: "cache".to_string(),
                        reason: err.to_string(),
                    },
                );
                continue;
            }
        };

        for index in indexes {
            let index_name = format!("index{index}");
            let id = child(&cache_root, &index_name);
            let record = match read_cache_record(source, cpu, &id, &index_name, annotations) {
                Ok(record) => record,
                Err(reason) => {
                    note(
                        annotations,
                        PartialData::MalformedCacheRecord {
                            processor: cpu,
                            index: index_name,
                            reason,
                        },
                    );
                    continue;
                }
            };

            let level = record.key.level;
            let cache_type = record.key.cache_type;
            match merged.get_mut(&record.key) {
                Some(existing) => {
                    if existing.size_bytes != record.size_bytes {
                        note(
                            annotations,
                            PartialData::CacheSizeMismatch {
                                processor: cpu,
                                level,
                                cache_type,
                                kept: existing.size_bytes,
                                other: record.size_bytes,
                            },
                        );
                    }
                    existing.reporters.insert(cpu);
                }
                None => {
                    merged.insert(
                        record.key,
                        MergedCache {
                            size_bytes: record.size_bytes,
                            reporters: BTreeSet::from([cpu]),
                        },
                    );
                }
            }
        }
    }

    let mut caches: Vec<MemoryCache> = merged
        .into_iter()
        .map(|(key, cache)| MemoryCache {
            cache_type: key.cache_type,
            level: key.level,
            size_bytes: cache.size_bytes,
            logical_processors: cache.reporters,
        })
        .collect();
    caches.sort_by(|a, b| {
        (a.level, a.cache_type, &a.logical_processors, a.size_bytes).cmp(&(
            b.level,
            b.cache_type,
            &b.logical_processors,
            b.size_bytes,
        ))
    });
    debug!(
        "built {} caches from {} processors",
        caches.len(),
        processors.len()
    );
    caches
}

fn read_cache_record<S: Source>(
    source: &S,
    cpu: usize,
    id: &str,
    index_name: &str,
    annotations: &mut Vec<PartialData>,
) -> Result<CacheRecord, String> {
    let level: u8 = source
        .read_parsed(&child(id, "level"))
        .map_err(|err| err.to_string())?;
    // the kernel numbers levels from 1
    let level = level
        .checked_sub(1)
        .ok_or_else(|| "cache level 0 is not a valid level".to_string())?;

    let code = source
        .read_value(&child(id, "type"))
        .map_err(|err| err.to_string())?;
    let cache_type = match code.parse::<CacheType>() {
        Ok(cache_type) => cache_type,
        Err(_) => {
            note(
                annotations,
                PartialData::UnknownCacheType {
                    processor: cpu,
                    code,
                },
            );
            CacheType::Unified
        }
    };

    let size = source
        .read_value(&child(id, "size"))
        .map_err(|err| err.to_string())?;
    let size_bytes =
        parse_byte_size(&size).ok_or_else(|| format!("failed to parse cache size '{size}'"))?;

    let shared = match read_shared_processors(source, id) {
        Some(shared) if !shared.is_empty() => shared,
        _ => {
            note(
                annotations,
                PartialData::MissingSharedCpus {
                    processor: cpu,
                    index: index_name.to_string(),
                },
            );
            BTreeSet::from([cpu])
        }
    };

    Ok(CacheRecord {
        key: CacheKey {
            level,
            cache_type,
            shared,
        },
        size_bytes,
    })
}

fn read_shared_processors<S: Source>(source: &S, id: &str) -> Option<BTreeSet<usize>> {
    if let Ok(list) = source.read_value(&child(id, "shared_cpu_list")) {
        if let Ok(cpus) = parse_cpu_list(&list) {
            return Some(cpus);
        }
    }
    let mask = source.read_value(&child(id, "shared_cpu_map")).ok()?;
    parse_cpu_mask(&mask).ok()
}

fn note(annotations: &mut Vec<PartialData>, condition: PartialData) {
    warn!("{condition}");
    annotations.push(condition);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SysfsSource;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_cache(root: &Path, cpu: usize, index: usize, fields: &[(&str, &str)]) {
        let dir = root.join(format!("sys/devices/system/cpu/cpu{cpu}/cache/index{index}"));
        fs::create_dir_all(&dir).unwrap();
        for (name, value) in fields {
            fs::write(dir.join(name), format!("{value}\n")).unwrap();
        }
    }

    fn l1d(root: &Path, cpu: usize, size: &str, shared: &str) {
        write_cache(
            root,
            cpu,
            0,
            &[("level", "1"), ("type", "Data"), ("size", size), ("shared_cpu_list", shared)],
        );
    }

    fn cpus(ids: &[usize]) -> BTreeSet<usize> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_cache_type_codes() {
        assert_eq!("Data".parse::<CacheType>().unwrap(), CacheType::Data);
        assert_eq!("instruction".parse::<CacheType>().unwrap(), CacheType::Instruction);
        assert_eq!("UNIFIED".parse::<CacheType>().unwrap(), CacheType::Unified);
        assert!("Trace".parse::<CacheType>().is_err());
        assert_eq!(CacheType::Data.to_string(), "data");
        assert!(CacheType::Data < CacheType::Instruction);
        assert!(CacheType::Instruction < CacheType::Unified);
    }

    #[test]
    fn test_per_processor_reports_merge() {
        let dir = TempDir::new().unwrap();
        for cpu in 0..4 {
            let shared = if cpu < 2 { "0-1" } else { "2-3" };
            l1d(dir.path(), cpu, "32K", shared);
            write_cache(
                dir.path(),
                cpu,
                2,
                &[
                    ("level", "2"),
                    ("type", "Unified"),
                    ("size", "256K"),
                    ("shared_cpu_list", "0-3"),
                ],
            );
        }
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0, 1, 2, 3]), &mut annotations);

        assert!(annotations.is_empty(), "{annotations:?}");
        assert_eq!(caches.len(), 3);
        assert_eq!(caches[0].level(), 0);
        assert_eq!(caches[0].cache_type(), CacheType::Data);
        assert_eq!(caches[0].logical_processors(), &cpus(&[0, 1]));
        assert_eq!(caches[1].logical_processors(), &cpus(&[2, 3]));
        assert_eq!(caches[2].level(), 1);
        assert_eq!(caches[2].cache_type(), CacheType::Unified);
        assert_eq!(caches[2].size_bytes(), 262_144);
        assert_eq!(caches[2].logical_processors(), &cpus(&[0, 1, 2, 3]));
    }

    #[test]
    fn test_data_and_instruction_with_same_sharing_stay_distinct() {
        let dir = TempDir::new().unwrap();
        l1d(dir.path(), 0, "48K", "0");
        write_cache(
            dir.path(),
            0,
            1,
            &[
                ("level", "1"),
                ("type", "Instruction"),
                ("size", "32K"),
                ("shared_cpu_list", "0"),
            ],
        );
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0]), &mut annotations);

        assert_eq!(caches.len(), 2);
        assert_eq!(caches[0].cache_type(), CacheType::Data);
        assert_eq!(caches[1].cache_type(), CacheType::Instruction);
    }

    #[test]
    fn test_size_mismatch_keeps_first_and_annotates() {
        let dir = TempDir::new().unwrap();
        l1d(dir.path(), 0, "32K", "0-1");
        l1d(dir.path(), 1, "64K", "0-1");
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0, 1]), &mut annotations);

        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].size_bytes(), 32_768);
        assert_eq!(caches[0].logical_processors(), &cpus(&[0, 1]));
        assert_eq!(
            annotations,
            vec![PartialData::CacheSizeMismatch {
                processor: 1,
                level: 0,
                cache_type: CacheType::Data,
                kept: 32_768,
                other: 65_536,
            }]
        );
    }

    #[test]
    fn test_different_sharing_sets_never_merge() {
        let dir = TempDir::new().unwrap();
        l1d(dir.path(), 0, "64K", "0-1");
        l1d(dir.path(), 1, "64K", "0-1");
        l1d(dir.path(), 2, "32K", "2");
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0, 1, 2]), &mut annotations);

        assert!(annotations.is_empty());
        assert_eq!(caches.len(), 2);
        assert_eq!(caches[0].size_bytes(), 65_536);
        assert_eq!(caches[0].logical_processors(), &cpus(&[0, 1]));
        assert_eq!(caches[1].size_bytes(), 32_768);
        assert_eq!(caches[1].logical_processors(), &cpus(&[2]));
    }

    #[test]
    fn test_unknown_type_is_unified() {
        let dir = TempDir::new().unwrap();
        write_cache(
            dir.path(),
            0,
            0,
            &[("level", "1"), ("type", "Trace"), ("size", "12K"), ("shared_cpu_list", "0")],
        );
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0]), &mut annotations);

        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].cache_type(), CacheType::Unified);
        assert_eq!(
            annotations,
            vec![PartialData::UnknownCacheType {
                processor: 0,
                code: "Trace".to_string()
            }]
        );
    }

    #[test]
    fn test_shared_cpu_map_fallback() {
        let dir = TempDir::new().unwrap();
        for cpu in 0..2 {
            write_cache(
                dir.path(),
                cpu,
                3,
                &[
                    ("level", "3"),
                    ("type", "Unified"),
                    ("size", "8M"),
                    ("shared_cpu_map", "00000000,00000003"),
                ],
            );
        }
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0, 1]), &mut annotations);

        assert!(annotations.is_empty());
        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].level(), 2);
        assert_eq!(caches[0].size_bytes(), 8 * 1024 * 1024);
    }

    #[test]
    fn test_missing_sharing_attributes_to_reporter() {
        let dir = TempDir::new().unwrap();
        for cpu in 0..2 {
            write_cache(
                dir.path(),
                cpu,
                0,
                &[("level", "1"), ("type", "Data"), ("size", "32K")],
            );
        }
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0, 1]), &mut annotations);

        assert_eq!(caches.len(), 2);
        assert_eq!(annotations.len(), 2);
        assert!(annotations
            .iter()
            .all(|note| matches!(note, PartialData::MissingSharedCpus { .. })));
    }

    #[test]
    fn test_oversized_sharing_list_is_annotated() {
        let dir = TempDir::new().unwrap();
        l1d(dir.path(), 0, "32K", "0-30000000");
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0]), &mut annotations);

        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].logical_processors(), &cpus(&[0]));
        assert_eq!(
            annotations,
            vec![PartialData::MissingSharedCpus {
                processor: 0,
                index: "index0".to_string(),
            }]
        );
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let dir = TempDir::new().unwrap();
        write_cache(
            dir.path(),
            0,
            0,
            &[("level", "1"), ("type", "Data"), ("size", "huge"), ("shared_cpu_list", "0")],
        );
        write_cache(
            dir.path(),
            0,
            1,
            &[("level", "0"), ("type", "Data"), ("size", "32K"), ("shared_cpu_list", "0")],
        );
        write_cache(
            dir.path(),
            0,
            2,
            &[("level", "2"), ("type", "Unified"), ("size", "1M"), ("shared_cpu_list", "0")],
        );
        let source = SysfsSource::new(dir.path());
        let mut annotations = Vec::new();

        let caches = build_caches(&source, &cpus(&[0]), &mut annotations);

        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].level(), 1);
        assert_eq!(annotations.len(), 2);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let dir = TempDir::new().unwrap();
        for cpu in 0..4 {
            l1d(dir.path(), cpu, "32K", if cpu % 2 == 0 { "0,2" } else { "1,3" });
        }
        let source = SysfsSource::new(dir.path());

        let first = build_caches(&source, &cpus(&[0, 1, 2, 3]), &mut Vec::new());
        let second = build_caches(&source, &cpus(&[0, 1, 2, 3]), &mut Vec::new());
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
