//! hwinspect - read-only host hardware inspection
//!
//! Reconstructs the processor topology of a machine (NUMA nodes, physical
//! cores, logical processors and the caches they share) from the pseudo-files
//! the kernel exports, and adds firmware and network interface details.
//!
//! ```no_run
//! let topology = hwinspect::discover_topology()?;
//! for node in topology.nodes() {
//!     println!("node {}: {} cores", node.id(), node.cores().len());
//! }
//! # Ok::<(), hwinspect::DiscoveryError>(())
//! ```
//!
//! Everything is read through a [`Source`], so a copied sysfs tree can be
//! inspected with [`Inspector::with_root`].

pub mod bios;
pub mod config;
pub mod error;
pub mod inspector;
pub mod net;
pub mod source;
pub mod topology;
pub mod wmic;

pub use bios::BiosInfo;
pub use config::Config;
pub use error::{DiscoveryError, PartialData, SourceError};
pub use inspector::{HostInfo, Inspector};
pub use net::{NetworkInfo, Nic};
pub use source::{Source, SysfsSource};
pub use topology::{
    discover_topology, discover_with, Architecture, CacheType, MemoryCache, Node, ProcessorCore,
    TopologyInfo,
};
