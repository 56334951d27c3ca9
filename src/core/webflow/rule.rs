use crate::{base::TrafficRule, config, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// How the resource of a web flow rule is identified.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(into = "u8", from = "u8")]
pub enum ResourceMode {
    RouteId,
    CustomApiName,
}

impl Default for ResourceMode {
    fn default() -> ResourceMode {
        ResourceMode::RouteId
    }
}

impl From<ResourceMode> for u8 {
    fn from(mode: ResourceMode) -> u8 {
        match mode {
            ResourceMode::RouteId => 0,
            ResourceMode::CustomApiName => 1,
        }
    }
}

impl From<u8> for ResourceMode {
    fn from(code: u8) -> ResourceMode {
        match code {
            1 => ResourceMode::CustomApiName,
            _ => ResourceMode::RouteId,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(into = "u8", from = "u8")]
pub enum ControlBehavior {
    Reject,
    RateLimiter,
}

impl Default for ControlBehavior {
    fn default() -> ControlBehavior {
        ControlBehavior::Reject
    }
}

impl From<ControlBehavior> for u8 {
    fn from(behavior: ControlBehavior) -> u8 {
        match behavior {
            ControlBehavior::Reject => 0,
            ControlBehavior::RateLimiter => 2,
        }
    }
}

impl From<u8> for ControlBehavior {
    fn from(code: u8) -> ControlBehavior {
        match code {
            2 => ControlBehavior::RateLimiter,
            _ => ControlBehavior::Reject,
        }
    }
}

/// Where the parameter value is extracted from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(into = "u8", from = "u8")]
pub enum ParseStrategy {
    ClientIp,
    Host,
    Header,
    UrlParam,
    Cookie,
    BodyParam,
    PathParam,
}

impl Default for ParseStrategy {
    fn default() -> ParseStrategy {
        ParseStrategy::ClientIp
    }
}

impl ParseStrategy {
    /// keyed strategies need a field name to know what to extract
    pub fn requires_field_name(&self) -> bool {
        matches!(
            self,
            ParseStrategy::Header
                | ParseStrategy::UrlParam
                | ParseStrategy::Cookie
                | ParseStrategy::BodyParam
                | ParseStrategy::PathParam
        )
    }
}

impl From<ParseStrategy> for u8 {
    fn from(strategy: ParseStrategy) -> u8 {
        match strategy {
            ParseStrategy::ClientIp => 0,
            ParseStrategy::Host => 1,
            ParseStrategy::Header => 2,
            ParseStrategy::UrlParam => 3,
            ParseStrategy::Cookie => 4,
            ParseStrategy::BodyParam => 5,
            ParseStrategy::PathParam => 6,
        }
    }
}

impl From<u8> for ParseStrategy {
    fn from(code: u8) -> ParseStrategy {
        match code {
            1 => ParseStrategy::Host,
            2 => ParseStrategy::Header,
            3 => ParseStrategy::UrlParam,
            4 => ParseStrategy::Cookie,
            5 => ParseStrategy::BodyParam,
            6 => ParseStrategy::PathParam,
            _ => ParseStrategy::ClientIp,
        }
    }
}

/// How the extracted value is matched against the rule's pattern.
/// `Unconditional` always matches; it is also the effective strategy when
/// the rule carries no pattern.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(into = "u8", from = "u8")]
pub enum MatchStrategy {
    Exact,
    Regex,
    Contains,
    Unconditional,
}

impl Default for MatchStrategy {
    fn default() -> MatchStrategy {
        MatchStrategy::Unconditional
    }
}

impl From<MatchStrategy> for u8 {
    fn from(strategy: MatchStrategy) -> u8 {
        match strategy {
            MatchStrategy::Exact => 0,
            MatchStrategy::Regex => 1,
            MatchStrategy::Contains => 2,
            MatchStrategy::Unconditional => 3,
        }
    }
}

impl From<u8> for MatchStrategy {
    fn from(code: u8) -> MatchStrategy {
        match code {
            0 => MatchStrategy::Exact,
            1 => MatchStrategy::Regex,
            2 => MatchStrategy::Contains,
            _ => MatchStrategy::Unconditional,
        }
    }
}

/// The parameter item of a web flow rule: what to extract from the request
/// and how to match it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebParamItem {
    pub parse_strategy: ParseStrategy,
    /// required for keyed strategies (header, URL param, cookie, body, path)
    pub field_name: String,
    /// empty means no pattern, the item matches unconditionally
    pub pattern: String,
    pub match_strategy: MatchStrategy,
}

/// WebFlowRule encompasses the fields of a request-level flow control rule.
/// A resource may carry many rules; each rule carries at most one parameter
/// item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebFlowRule {
    /// unique id
    pub id: String,
    /// route id or custom API name, depending on `resource_mode`
    pub resource: String,
    pub resource_mode: ResourceMode,
    /// admitted amount per interval
    pub count: f64,
    /// statistic interval of the rule (in ms)
    pub interval_ms: u32,
    /// extra burst amount tolerated on top of `count`
    pub burst: u32,
    pub control_behavior: ControlBehavior,
    /// max queueing time for the `RateLimiter` behavior (in ms)
    pub max_queueing_timeout_ms: u32,
    pub param_item: Option<WebParamItem>,
}

impl Default for WebFlowRule {
    fn default() -> Self {
        WebFlowRule {
            id: String::default(),
            resource: String::default(),
            resource_mode: ResourceMode::default(),
            count: 0.0,
            interval_ms: config::DEFAULT_STAT_INTERVAL_MS,
            burst: 0,
            control_behavior: ControlBehavior::default(),
            max_queueing_timeout_ms: 500,
            param_item: None,
        }
    }
}

impl WebFlowRule {
    pub fn new(resource: &str) -> Self {
        WebFlowRule {
            resource: resource.into(),
            ..Default::default()
        }
    }
}

impl TrafficRule for WebFlowRule {
    fn resource_name(&self) -> String {
        self.resource.clone()
    }

    fn is_valid(&self) -> crate::Result<()> {
        if self.resource.is_empty() {
            return Err(Error::msg("empty resource name"));
        }
        if self.count < 0.0 {
            return Err(Error::msg("invalid count"));
        }
        if self.interval_ms == 0 {
            return Err(Error::msg("invalid interval_ms"));
        }
        if let Some(item) = &self.param_item {
            if item.parse_strategy.requires_field_name() && item.field_name.is_empty() {
                return Err(Error::msg("field_name is required for keyed parse strategies"));
            }
        }
        Ok(())
    }
}

// `id` is excluded, same configuration means the same rule
impl PartialEq for WebFlowRule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.resource_mode == other.resource_mode
            && self.count.to_bits() == other.count.to_bits()
            && self.interval_ms == other.interval_ms
            && self.burst == other.burst
            && self.control_behavior == other.control_behavior
            && self.max_queueing_timeout_ms == other.max_queueing_timeout_ms
            && self.param_item == other.param_item
    }
}

impl Eq for WebFlowRule {}

impl Hash for WebFlowRule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.resource_mode.hash(state);
        self.count.to_bits().hash(state);
        self.interval_ms.hash(state);
        self.burst.hash(state);
        self.control_behavior.hash(state);
        self.max_queueing_timeout_ms.hash(state);
        self.param_item.hash(state);
    }
}

impl fmt::Display for WebFlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strategy_codes() {
        let rule: WebFlowRule = serde_json::from_str(
            r#"{
                "resource": "my_route",
                "count": 10.0,
                "paramItem": {
                    "parseStrategy": 3,
                    "fieldName": "p",
                    "pattern": "\\d+",
                    "matchStrategy": 1
                }
            }"#,
        )
        .unwrap();
        let item = rule.param_item.as_ref().unwrap();
        assert_eq!(item.parse_strategy, ParseStrategy::UrlParam);
        assert_eq!(item.match_strategy, MatchStrategy::Regex);
        assert_eq!(rule.resource_mode, ResourceMode::RouteId);
        assert_eq!(rule.control_behavior, ControlBehavior::Reject);
    }

    #[test]
    fn equality_ignores_id() {
        let r1 = WebFlowRule {
            id: "one".into(),
            ..WebFlowRule::new("my_route")
        };
        let r2 = WebFlowRule {
            id: "two".into(),
            ..WebFlowRule::new("my_route")
        };
        assert_eq!(r1, r2);
        let r3 = WebFlowRule {
            count: 5.0,
            ..WebFlowRule::new("my_route")
        };
        assert_ne!(r1, r3);
    }

    #[test]
    fn keyed_strategy_needs_field_name() {
        let rule = WebFlowRule {
            count: 10.0,
            param_item: Some(WebParamItem {
                parse_strategy: ParseStrategy::Header,
                ..Default::default()
            }),
            ..WebFlowRule::new("my_route")
        };
        assert!(rule.is_valid().is_err());

        let rule = WebFlowRule {
            count: 10.0,
            param_item: Some(WebParamItem {
                parse_strategy: ParseStrategy::ClientIp,
                ..Default::default()
            }),
            ..WebFlowRule::new("my_route")
        };
        assert!(rule.is_valid().is_ok());
    }

    #[test]
    fn empty_pattern_is_allowed() {
        // an exact strategy with no pattern degrades to unconditional matching
        let rule = WebFlowRule {
            count: 10.0,
            param_item: Some(WebParamItem {
                parse_strategy: ParseStrategy::Header,
                field_name: "X-Flag".into(),
                match_strategy: MatchStrategy::Exact,
                pattern: String::new(),
            }),
            ..WebFlowRule::new("my_route")
        };
        assert!(rule.is_valid().is_ok());
    }
}
