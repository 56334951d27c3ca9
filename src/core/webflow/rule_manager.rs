use super::{regex_cache, MatchStrategy, WebFlowRule};
use crate::{base::TrafficRule, logging};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// A loaded rule together with its derived statistics key. The key is
/// computed once at rule-load time, the rule itself stays immutable.
#[derive(Debug, Clone)]
pub struct ParamRuleHolder {
    pub rule: Arc<WebFlowRule>,
    /// the "converted param key" identifying the statistic bucket family
    pub param_key: String,
}

impl ParamRuleHolder {
    pub fn new(rule: Arc<WebFlowRule>) -> Self {
        let param_key = convert_param_key(&rule);
        ParamRuleHolder { rule, param_key }
    }
}

/// Derives the statistics-map key of a rule from its identity and matching
/// configuration.
fn convert_param_key(rule: &WebFlowRule) -> String {
    match &rule.param_item {
        Some(item) => format!(
            "{}${}${}${}${}",
            rule.resource,
            u8::from(item.parse_strategy),
            item.field_name,
            u8::from(item.match_strategy),
            item.pattern,
        ),
        None => rule.resource.clone(),
    }
}

lazy_static! {
    static ref PARAM_RULE_MAP: RwLock<HashMap<String, Vec<ParamRuleHolder>>> =
        RwLock::new(HashMap::new());
    static ref CURRENT_RULES: Mutex<HashSet<Arc<WebFlowRule>>> = Mutex::new(HashSet::new());
}

/// load_rules atomically replaces the active web flow rule set. Invalid
/// rules are ignored; regex patterns of the valid rules are compiled into
/// the pattern cache eagerly, so the per-request path never compiles.
/// The returned `bool` indicates whether the active set changed.
// This func acquires locks on global `CURRENT_RULES` and `PARAM_RULE_MAP`,
// please release your locks on them before calling this func
pub fn load_rules(rules: Vec<Arc<WebFlowRule>>) -> bool {
    let rules: HashSet<_> = rules.into_iter().collect();
    let mut global_rule_set = CURRENT_RULES.lock().unwrap();
    if *global_rule_set == rules {
        logging::info!(
            "[WebFlow] Loaded rules are the same as the current rules, ignoring the load operation."
        );
        return false;
    }

    let mut holder_map: HashMap<String, Vec<ParamRuleHolder>> = HashMap::new();
    for rule in &rules {
        if let Err(err) = rule.is_valid() {
            logging::warn!(
                "[WebFlow load_rules] Ignoring invalid rule {:?}, reason: {:?}",
                rule,
                err
            );
            continue;
        }
        if let Some(item) = &rule.param_item {
            if item.match_strategy == MatchStrategy::Regex
                && !regex_cache::add_regex_pattern(&item.pattern)
            {
                // the rule stays loaded, regex matching fails closed
                logging::warn!(
                    "[WebFlow load_rules] Failed to register regex pattern of rule {:?}",
                    rule
                );
            }
        }
        holder_map
            .entry(rule.resource.clone())
            .or_default()
            .push(ParamRuleHolder::new(Arc::clone(rule)));
    }

    *PARAM_RULE_MAP.write().unwrap() = holder_map;
    *global_rule_set = rules;
    logging::info!(
        "[WebFlow] Web flow rules were loaded, amount {}",
        global_rule_set.len()
    );
    true
}

/// `get_rules` returns the active rule set
pub fn get_rules() -> Vec<Arc<WebFlowRule>> {
    let rules = CURRENT_RULES.lock().unwrap();
    rules.iter().cloned().collect()
}

/// `get_rules_for_resource` returns the loaded rule holders of the resource
pub fn get_rules_for_resource(res: &str) -> Vec<ParamRuleHolder> {
    PARAM_RULE_MAP
        .read()
        .unwrap()
        .get(res)
        .cloned()
        .unwrap_or_default()
}

pub fn clear_rules() {
    CURRENT_RULES.lock().unwrap().clear();
    PARAM_RULE_MAP.write().unwrap().clear();
}
