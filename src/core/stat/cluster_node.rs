use super::StatisticNode;
use crate::base::{BlockError, MetricEvent, ResourceType, TrafficType};
use crate::{config, logging, Error};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, RwLock};

/// ClusterNode aggregates the statistics of one resource across all callers
/// and additionally keeps one child StatisticNode per origin. The origin map
/// is published copy-on-write: readers clone an `Arc` of the whole map and
/// never block, writers serialize on a creation lock and swap in a new map.
#[derive(Debug)]
pub struct ClusterNode {
    name: String,
    resource_type: ResourceType,
    traffic_type: TrafficType,
    stat: Arc<StatisticNode>,
    origin_map: RwLock<Arc<HashMap<String, Arc<StatisticNode>>>>,
    creation_lock: Mutex<()>,
}

impl ClusterNode {
    /// Creates a node for the given resource. The resource name must not be
    /// empty, anonymous statistics would be unattributable.
    pub fn new(name: String, resource_type: ResourceType, traffic_type: TrafficType) -> Self {
        assert!(!name.is_empty(), "resource name cannot be empty");
        ClusterNode {
            name,
            resource_type,
            traffic_type,
            stat: Arc::new(StatisticNode::new()),
            origin_map: RwLock::new(Arc::new(HashMap::new())),
            creation_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &String {
        &self.name
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn traffic_type(&self) -> TrafficType {
        self.traffic_type
    }

    pub fn stat(&self) -> &Arc<StatisticNode> {
        &self.stat
    }

    pub fn current_origin_map(&self) -> Arc<HashMap<String, Arc<StatisticNode>>> {
        self.origin_map.read().unwrap().clone()
    }

    /// Returns the statistic node of the given origin, creating it on first
    /// sight. Creation is idempotent under concurrency: exactly one node per
    /// origin is ever published and every caller receives that same node.
    /// Once the distinct-origin cap is reached, unseen origins get `None` and
    /// their traffic is only accounted in the resource-level aggregate.
    pub fn get_or_create_origin_node(&self, origin: &str) -> Option<Arc<StatisticNode>> {
        self.get_or_create_origin_node_with_cap(origin, config::max_origin_amount())
    }

    pub(crate) fn get_or_create_origin_node_with_cap(
        &self,
        origin: &str,
        max_origin_amount: usize,
    ) -> Option<Arc<StatisticNode>> {
        {
            let current = self.origin_map.read().unwrap();
            if let Some(node) = current.get(origin) {
                return Some(node.clone());
            }
            // once the cap is filled, unseen origins are rejected without
            // ever touching the creation lock
            if current.len() >= max_origin_amount {
                return None;
            }
        }
        // slow path, serialize creations and re-check under the lock
        let _guard = self.creation_lock.lock().unwrap();
        let current = self.origin_map.read().unwrap().clone();
        if let Some(node) = current.get(origin) {
            return Some(node.clone());
        }
        if current.len() >= max_origin_amount {
            logging::warn!(
                "[ClusterNode] Origin amount exceeds the threshold, ignoring new origin, resource {}, origin {}, threshold {}",
                self.name,
                origin,
                max_origin_amount
            );
            return None;
        }
        let node = Arc::new(StatisticNode::new());
        let mut new_map = HashMap::clone(&current);
        new_map.insert(origin.into(), node.clone());
        *self.origin_map.write().unwrap() = Arc::new(new_map);
        Some(node)
    }

    /// Drops every per-origin node. In-flight readers holding the old map
    /// keep recording into the dropped nodes until they finish.
    pub fn clear_origin_map(&self) {
        let _guard = self.creation_lock.lock().unwrap();
        *self.origin_map.write().unwrap() = Arc::new(HashMap::new());
    }

    /// Attributes an application error to this resource. Engine rejections
    /// (`BlockError`) are not business failures and are ignored here, they
    /// are recorded as Block events at decision time instead.
    pub fn trace_error(&self, err: &Error, count: u64) {
        if count == 0 || BlockError::is_block_error(err) {
            return;
        }
        self.stat.add_count(MetricEvent::Error, count);
    }
}

// resource-level statistics read naturally off the cluster node
impl Deref for ClusterNode {
    type Target = StatisticNode;

    fn deref(&self) -> &StatisticNode {
        &self.stat
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{BlockType, TokenResult};
    use std::thread;

    fn new_node(name: &str) -> Arc<ClusterNode> {
        Arc::new(ClusterNode::new(
            name.into(),
            ResourceType::Web,
            TrafficType::Inbound,
        ))
    }

    #[test]
    #[should_panic(expected = "resource name cannot be empty")]
    fn empty_name() {
        ClusterNode::new("".into(), ResourceType::Common, TrafficType::Outbound);
    }

    #[test]
    fn origin_node_identity() {
        let node = new_node("GET:/api/users");
        let first = node.get_or_create_origin_node("service-a").unwrap();
        let second = node.get_or_create_origin_node("service-a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let other = node.get_or_create_origin_node("service-b").unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(node.current_origin_map().len(), 2);
    }

    #[test]
    fn origin_amount_cap() {
        let node = new_node("GET:/api/orders");
        for i in 0..5 {
            assert!(node
                .get_or_create_origin_node_with_cap(&format!("origin-{}", i), 5)
                .is_some());
        }
        assert_eq!(node.current_origin_map().len(), 5);
        // unseen origins beyond the cap are never published
        assert!(node
            .get_or_create_origin_node_with_cap("origin-overflow", 5)
            .is_none());
        assert_eq!(node.current_origin_map().len(), 5);
        assert!(!node.current_origin_map().contains_key("origin-overflow"));
        // already-published origins stay reachable
        assert!(node
            .get_or_create_origin_node_with_cap("origin-0", 5)
            .is_some());
    }

    #[test]
    fn concurrent_origin_creation() {
        let node = new_node("GET:/api/items");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let node = Arc::clone(&node);
            handles.push(thread::spawn(move || {
                let mut created = Vec::new();
                for i in 0..20 {
                    created.push(node.get_or_create_origin_node(&format!("caller-{}", i)).unwrap());
                }
                created
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(node.current_origin_map().len(), 20);
        // every thread must have received the same node per origin
        let map = node.current_origin_map();
        for created in &results {
            for (i, origin_node) in created.iter().enumerate() {
                let published = map.get(&format!("caller-{}", i)).unwrap();
                assert!(Arc::ptr_eq(origin_node, published));
            }
        }
    }

    #[test]
    fn over_cap_rejection_needs_no_creation_lock() {
        let node = new_node("GET:/api/search");
        for i in 0..3 {
            assert!(node
                .get_or_create_origin_node_with_cap(&format!("caller-{}", i), 3)
                .is_some());
        }
        // with the creation lock held, lookups and over-cap rejections
        // still complete on the read path alone
        let _guard = node.creation_lock.lock().unwrap();
        assert!(node
            .get_or_create_origin_node_with_cap("caller-x", 3)
            .is_none());
        assert!(node
            .get_or_create_origin_node_with_cap("caller-0", 3)
            .is_some());
    }

    #[test]
    fn clear_origin_map() {
        let node = new_node("GET:/api/carts");
        node.get_or_create_origin_node("caller-1");
        node.get_or_create_origin_node("caller-2");
        node.clear_origin_map();
        assert_eq!(node.current_origin_map().len(), 0);
    }

    #[test]
    fn trace_error_skips_block_error() {
        let node = new_node("GET:/api/pay");
        let rejection = Error::new(
            TokenResult::new_blocked(BlockType::CircuitBreaking)
                .block_err()
                .unwrap(),
        );
        node.trace_error(&rejection, 1);
        assert_eq!(node.sum(MetricEvent::Error), 0);

        let app_err = Error::msg("timeout talking to upstream");
        node.trace_error(&app_err, 0);
        assert_eq!(node.sum(MetricEvent::Error), 0);
        node.trace_error(&app_err, 2);
        assert_eq!(node.sum(MetricEvent::Error), 2);
    }
}
