//! statistics module
pub mod base;
pub mod cluster_node;
pub mod node_storage;
pub mod statistic_node;

pub use base::*;
pub use cluster_node::*;
pub use node_storage::*;
pub use statistic_node::*;
