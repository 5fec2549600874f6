//! Core/thread mapper
//!
//! Groups the logical processors of a node into physical cores using
//! `cpu<N>/topology/core_id`. Cores are indexed in the order they are first
//! met while walking processors in ascending id order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::error::PartialData;
use crate::source::{child, parse_cpu_list, Source};

use super::nodes::CPU_ROOT;

/// A physical core and the hardware threads it exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CoreRecord")]
pub struct ProcessorCore {
    id: usize,
    index: usize,
    num_threads: usize,
    logical_processors: BTreeSet<usize>,
}

impl ProcessorCore {
    fn new(id: usize, index: usize, logical_processors: BTreeSet<usize>) -> Self {
        Self {
            id,
            index,
            num_threads: logical_processors.len(),
            logical_processors,
        }
    }

    /// Core id as assigned by the host; not unique across nodes
    pub fn id(&self) -> usize {
        self.id
    }

    /// Zero-based position of this core within its node
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of hardware threads, always the size of [`Self::logical_processors`]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn logical_processors(&self) -> &BTreeSet<usize> {
        &self.logical_processors
    }
}

/// Serialized form of a core; `num_threads` is recomputed on the way in
#[derive(Deserialize)]
struct CoreRecord {
    id: usize,
    index: usize,
    logical_processors: BTreeSet<usize>,
}

impl TryFrom<CoreRecord> for ProcessorCore {
    type Error = String;

    fn try_from(record: CoreRecord) -> Result<Self, Self::Error> {
        if record.logical_processors.is_empty() {
            return Err(format!("core {} has no logical processors", record.id));
        }
        Ok(ProcessorCore::new(
            record.id,
            record.index,
            record.logical_processors,
        ))
    }
}

/// Package and core id together; core ids restart on every package
type CoreKey = (Option<usize>, usize);

/// Map the given logical processors onto cores.
///
/// A processor whose core id can't be read is left out and noted in
/// `annotations`.
pub(crate) fn map_cores<S: Source>(
    source: &S,
    processors: &[usize],
    annotations: &mut Vec<PartialData>,
) -> Vec<ProcessorCore> {
    let mut processors = processors.to_vec();
    processors.sort_unstable();
    processors.dedup();

    let mut order: Vec<(CoreKey, BTreeSet<usize>)> = Vec::new();
    let mut seen: HashMap<CoreKey, usize> = HashMap::new();

    for cpu in processors {
        let topology = child(CPU_ROOT, &format!("cpu{cpu}/topology"));
        let core_id = match source.read_parsed::<usize>(&child(&topology, "core_id")) {
            Ok(core_id) => core_id,
            Err(err) => {
                let condition = PartialData::MissingCoreId { processor: cpu };
                warn!("{condition}: {err}");
                annotations.push(condition);
                continue;
            }
        };
        let package = source
            .read_parsed::<usize>(&child(&topology, "physical_package_id"))
            .ok();

        let key = (package, core_id);
        match seen.get(&key) {
            Some(&position) => {
                order[position].1.insert(cpu);
            }
            None => {
                seen.insert(key, order.len());
                order.push((key, BTreeSet::from([cpu])));
            }
        }
    }

    let cores: Vec<ProcessorCore> = order
        .into_iter()
        .enumerate()
        .map(|(index, ((_, core_id), threads))| ProcessorCore::new(core_id, index, threads))
        .collect();

    for core in &cores {
        check_sibling_count(source, core, annotations);
    }
    debug!("mapped {} cores", cores.len());
    cores
}

/// Compare the kernel's sibling list against the grouping built above.
///
/// The grouping wins; a disagreement is only noted.
fn check_sibling_count<S: Source>(
    source: &S,
    core: &ProcessorCore,
    annotations: &mut Vec<PartialData>,
) {
    let Some(&first) = core.logical_processors.first() else {
        return;
    };
    let id = child(CPU_ROOT, &format!("cpu{first}/topology/thread_siblings_list"));
    let Ok(list) = source.read_value(&id) else {
        return;
    };
    let Ok(siblings) = parse_cpu_list(&list) else {
        return;
    };
    if siblings.len() != core.num_threads {
        let condition = PartialData::ThreadCountMismatch {
            core_id: core.id,
            reported: siblings.len(),
            observed: core.num_threads,
        };
        warn!("{condition}");
        annotations.push(condition);
    }
}
