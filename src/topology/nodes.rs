//! Node enumerator
//!
//! NUMA nodes appear as `/sys/devices/system/node/node<N>` with a
//! `cpu<M>` link for every logical processor they own. Kernels built without
//! NUMA support have no node directory at all.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;
use crate::source::{child, numbered_children, Source};

use super::caches::MemoryCache;
use super::cores::ProcessorCore;

pub(crate) const NODE_ROOT: &str = "sys/devices/system/node";
pub(crate) const CPU_ROOT: &str = "sys/devices/system/cpu";

/// A NUMA node, or the whole host when it has no node abstraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    id: usize,
    cores: Vec<ProcessorCore>,
    caches: Vec<MemoryCache>,
    /// Relative access cost to every node, indexed by node position
    distances: Option<Vec<u32>>,
    memory_bytes: Option<u64>,
}

impl Node {
    pub(crate) fn new(
        id: usize,
        cores: Vec<ProcessorCore>,
        caches: Vec<MemoryCache>,
        distances: Option<Vec<u32>>,
        memory_bytes: Option<u64>,
    ) -> Self {
        Self {
            id,
            cores,
            caches,
            distances,
            memory_bytes,
        }
    }

    /// Node id as assigned by the host; not necessarily contiguous
    pub fn id(&self) -> usize {
        self.id
    }

    /// Cores of this node, ordered by their index
    pub fn cores(&self) -> &[ProcessorCore] {
        &self.cores
    }

    /// Caches of this node, ordered by level then type
    pub fn caches(&self) -> &[MemoryCache] {
        &self.caches
    }

    /// Distance vector from the kernel's `distance` file, when exposed
    pub fn distances(&self) -> Option<&[u32]> {
        self.distances.as_deref()
    }

    /// Memory local to this node, when exposed
    pub fn memory_bytes(&self) -> Option<u64> {
        self.memory_bytes
    }

    /// Hardware threads across all cores of the node
    pub fn num_threads(&self) -> usize {
        self.cores.iter().map(ProcessorCore::num_threads).sum()
    }
}

/// Discover the node ids present on the host, ascending.
///
/// A host without a node directory yields an empty list, as does an empty
/// directory. Any other failure to list it is returned.
pub(crate) fn enumerate_nodes<S: Source>(source: &S) -> Result<Vec<usize>, SourceError> {
    match source.list_children(NODE_ROOT) {
        Ok(children) => {
            let ids = numbered_children(&children, "node");
            debug!("found {} node directories", ids.len());
            Ok(ids)
        }
        Err(err) if err.is_not_found() => {
            debug!("no node directory, host exposes no NUMA nodes");
            Ok(Vec::new())
        }
        Err(err) => Err(err),
    }
}

/// Logical processors owned by a node, ascending.
pub(crate) fn node_processors<S: Source>(source: &S, node: usize) -> Result<Vec<usize>, SourceError> {
    let children = source.list_children(&child(NODE_ROOT, &format!("node{node}")))?;
    Ok(numbered_children(&children, "cpu"))
}

/// Every logical processor of the host, used for the synthesized node.
pub(crate) fn host_processors<S: Source>(source: &S) -> Result<Vec<usize>, SourceError> {
    let children = source.list_children(CPU_ROOT)?;
    let processors = numbered_children(&children, "cpu");
    if processors.is_empty() {
        return Err(SourceError::malformed(CPU_ROOT, "no logical processors listed"));
    }
    Ok(processors)
}

/// Parse `node<N>/distance`, a single line of space separated costs.
pub(crate) fn read_distances<S: Source>(source: &S, node: usize) -> Option<Vec<u32>> {
    let line = source.read_optional(&child(NODE_ROOT, &format!("node{node}/distance")))?;
    line.split_whitespace()
        .map(|cost| cost.parse::<u32>().ok())
        .collect()
}

/// Read `MemTotal` from `node<N>/meminfo`.
///
/// Lines look like `Node 0 MemTotal:       32768000 kB`.
pub(crate) fn read_memory<S: Source>(source: &S, node: usize) -> Option<u64> {
    let lines = source
        .read_source(&child(NODE_ROOT, &format!("node{node}/meminfo")))
        .ok()?;
    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 4 && parts[2] == "MemTotal:" {
            let kb = parts[3].parse::<u64>().ok()?;
            return kb.checked_mul(1024);
        }
    }
    None
}
