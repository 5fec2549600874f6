//! Host topology discovery
//!
//! Rebuilds the hierarchy nodes → cores → logical processors, plus the caches
//! of every node, from the flat files the kernel exposes under
//! `/sys/devices/system`.
//!
//! Discovery runs once per call and returns an owned [`TopologyInfo`]; nothing
//! is cached between calls. Records that are missing or inconsistent are
//! skipped and listed in [`TopologyInfo::annotations`] rather than failing the
//! whole call.

pub mod caches;
pub mod cores;
pub mod nodes;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::{DiscoveryError, PartialData};
use crate::source::{Source, SysfsSource};

pub use caches::{CacheType, MemoryCache};
pub use cores::ProcessorCore;
pub use nodes::Node;

/// Memory architecture of the host
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// A single node
    #[strum(serialize = "SMP")]
    Uniform,
    /// More than one node
    #[strum(serialize = "NUMA")]
    NonUniform,
}

/// Result of a topology discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyInfo {
    architecture: Architecture,
    nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<PartialData>,
}

impl TopologyInfo {
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Nodes ordered by id; never empty
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Records that were skipped or reconciled during discovery
    pub fn annotations(&self) -> &[PartialData] {
        &self.annotations
    }

    pub fn total_cores(&self) -> usize {
        self.nodes.iter().map(|node| node.cores().len()).sum()
    }

    pub fn total_threads(&self) -> usize {
        self.nodes.iter().map(Node::num_threads).sum()
    }

    /// Display topology as formatted string
    pub fn display(&self) -> String {
        const WIDTH: usize = 62;
        let mut output = String::new();

        output.push_str(&format!("╔{}╗\n", "═".repeat(WIDTH)));
        output.push_str(&format!("║{:^WIDTH$}║\n", "TOPOLOGY"));
        output.push_str(&format!("╠{}╣\n", "═".repeat(WIDTH)));

        let line = |content: &str| -> String {
            let content_width = WIDTH - 1;
            let content: String = content.chars().take(content_width).collect();
            format!("║ {:<content_width$}║\n", content)
        };

        output.push_str(&line(&format!(
            "Architecture: {} ({} node(s), {} cores, {} threads)",
            self.architecture,
            self.nodes.len(),
            self.total_cores(),
            self.total_threads()
        )));

        for node in &self.nodes {
            output.push_str(&format!("╠{}╣\n", "═".repeat(WIDTH)));
            let mut heading = format!("Node {}", node.id());
            if let Some(bytes) = node.memory_bytes() {
                heading.push_str(&format!(" | {} MB local memory", bytes / 1024 / 1024));
            }
            if let Some(distances) = node.distances() {
                let costs: Vec<String> = distances.iter().map(u32::to_string).collect();
                heading.push_str(&format!(" | distances [{}]", costs.join(" ")));
            }
            output.push_str(&line(&heading));

            for core in node.cores() {
                output.push_str(&line(&format!(
                    "  core #{} (id {}): {} thread(s) {}",
                    core.index(),
                    core.id(),
                    core.num_threads(),
                    format_processors(core.logical_processors())
                )));
            }
            for cache in node.caches() {
                output.push_str(&line(&format!(
                    "  L{} {} {} KB shared by {}",
                    cache.level() + 1,
                    cache.cache_type(),
                    cache.size_bytes() / 1024,
                    format_processors(cache.logical_processors())
                )));
            }
        }

        output.push_str(&format!("╚{}╝", "═".repeat(WIDTH)));
        output
    }
}

/// Render a processor set in cpulist form, e.g. `[0-3,8]`.
fn format_processors(processors: &BTreeSet<usize>) -> String {
    let mut groups: Vec<String> = Vec::new();
    let mut iter = processors.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            groups.push(start.to_string());
        } else {
            groups.push(format!("{start}-{end}"));
        }
    }
    format!("[{}]", groups.join(","))
}

/// Discover the topology of the running host.
pub fn discover_topology() -> Result<TopologyInfo, DiscoveryError> {
    discover_with(&SysfsSource::default())
}

/// Discover the topology visible through `source`.
pub fn discover_with<S: Source>(source: &S) -> Result<TopologyInfo, DiscoveryError> {
    let node_ids = nodes::enumerate_nodes(source).map_err(DiscoveryError::Failed)?;
    let mut annotations = Vec::new();

    let nodes = if node_ids.is_empty() {
        debug!("synthesizing a single node 0");
        let processors = nodes::host_processors(source).map_err(DiscoveryError::Failed)?;
        vec![build_node(source, 0, &processors, false, &mut annotations)]
    } else {
        let mut nodes = Vec::with_capacity(node_ids.len());
        for id in node_ids {
            let processors =
                nodes::node_processors(source, id).map_err(DiscoveryError::Failed)?;
            nodes.push(build_node(source, id, &processors, true, &mut annotations));
        }
        nodes
    };

    let topology = assemble(nodes, annotations);
    info!(
        "discovered {} topology: {} node(s), {} cores, {} threads, {} annotation(s)",
        topology.architecture,
        topology.nodes.len(),
        topology.total_cores(),
        topology.total_threads(),
        topology.annotations.len()
    );
    Ok(topology)
}

fn build_node<S: Source>(
    source: &S,
    id: usize,
    processors: &[usize],
    numa_node: bool,
    annotations: &mut Vec<PartialData>,
) -> Node {
    let cores = cores::map_cores(source, processors, annotations);
    let assigned: BTreeSet<usize> = cores
        .iter()
        .flat_map(|core| core.logical_processors().iter().copied())
        .collect();
    let caches = caches::build_caches(source, &assigned, annotations);

    let (distances, memory_bytes) = if numa_node {
        (
            nodes::read_distances(source, id),
            nodes::read_memory(source, id),
        )
    } else {
        (None, None)
    };

    debug!(
        "node {id}: {} processors, {} cores, {} caches",
        processors.len(),
        cores.len(),
        caches.len()
    );
    Node::new(id, cores, caches, distances, memory_bytes)
}

/// Compose nodes into the final result and classify the architecture.
fn assemble(mut nodes: Vec<Node>, annotations: Vec<PartialData>) -> TopologyInfo {
    nodes.sort_by_key(Node::id);
    let architecture = if nodes.len() == 1 {
        Architecture::Uniform
    } else {
        Architecture::NonUniform
    };
    TopologyInfo {
        architecture,
        nodes,
        annotations,
    }
}
