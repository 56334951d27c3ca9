use super::ClusterNode;
use crate::base::{ResourceType, TrafficType, TOTAL_INBOUND_RESOURCE_NAME};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

lazy_static! {
    static ref CLUSTER_NODE_MAP: RwLock<HashMap<String, Arc<ClusterNode>>> =
        RwLock::new(HashMap::new());
    /// The virtual node counting all inbound traffic of the process.
    pub static ref INBOUND_NODE: Arc<ClusterNode> = Arc::new(ClusterNode::new(
        TOTAL_INBOUND_RESOURCE_NAME.into(),
        ResourceType::Common,
        TrafficType::Inbound,
    ));
}

/// Returns the cluster node of the given resource, creating and registering
/// it on first sight. Concurrent callers always receive the same node.
pub fn get_or_create_cluster_node(
    res_name: &str,
    resource_type: ResourceType,
    traffic_type: TrafficType,
) -> Arc<ClusterNode> {
    if let Some(node) = CLUSTER_NODE_MAP.read().unwrap().get(res_name) {
        return node.clone();
    }
    CLUSTER_NODE_MAP
        .write()
        .unwrap()
        .entry(res_name.into())
        .or_insert_with(|| {
            Arc::new(ClusterNode::new(
                res_name.into(),
                resource_type,
                traffic_type,
            ))
        })
        .clone()
}

pub fn get_cluster_node(res_name: &str) -> Option<Arc<ClusterNode>> {
    CLUSTER_NODE_MAP.read().unwrap().get(res_name).cloned()
}

/// snapshot of all registered cluster nodes
pub fn cluster_node_list() -> Vec<Arc<ClusterNode>> {
    CLUSTER_NODE_MAP.read().unwrap().values().cloned().collect()
}

pub fn cluster_node_amount() -> usize {
    CLUSTER_NODE_MAP.read().unwrap().len()
}

pub fn remove_cluster_node(res_name: &str) {
    CLUSTER_NODE_MAP.write().unwrap().remove(res_name);
}

pub fn reset_cluster_nodes() {
    CLUSTER_NODE_MAP.write().unwrap().clear();
}
