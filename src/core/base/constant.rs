/// resource name of the process-wide inbound aggregate node
pub const TOTAL_INBOUND_RESOURCE_NAME: &str = "__total_inbound_traffic__";

/// soft cap on the number of distinct origins tracked per resource
pub const DEFAULT_MAX_ORIGIN_AMOUNT: usize = 2000;
