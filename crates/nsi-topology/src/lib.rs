mod error;
mod loader;
mod raw;
mod stp;
mod topology;
mod validate;

pub use error::TopologyError;
pub use loader::load_topology_file;
pub use stp::Stp;
pub use topology::{Topology, TopologyCache};
pub use validate::validate;
