use super::*;
use crate::{base::TrafficRule, logging, utils, Error, Result};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

pub type BreakerGenFn =
    dyn Send + Sync + Fn(Arc<Rule>, Option<Arc<CounterLeapArray>>) -> Arc<dyn CircuitBreaker>;

pub type RuleMap = HashMap<String, HashSet<Arc<Rule>>>;

lazy_static! {
    pub static ref GEN_FUN_MAP: RwLock<HashMap<BreakerGrade, Box<BreakerGenFn>>> = {
        let mut gen_fun_map: HashMap<BreakerGrade, Box<BreakerGenFn>> = HashMap::new();
        gen_fun_map.insert(BreakerGrade::AverageRt, Box::new(gen_average_rt));
        gen_fun_map.insert(BreakerGrade::ErrorRatio, Box::new(gen_error_ratio));
        gen_fun_map.insert(BreakerGrade::ErrorCount, Box::new(gen_error_count));
        RwLock::new(gen_fun_map)
    };
    pub static ref STATE_CHANGE_LISTENERS: Mutex<Vec<Arc<dyn StateChangeListener>>> =
        Mutex::new(Vec::new());
    pub static ref BREAKER_MAP: RwLock<HashMap<String, Vec<Arc<dyn CircuitBreaker>>>> =
        RwLock::new(HashMap::new());
    pub static ref CURRENT_RULES: Mutex<RuleMap> = Mutex::new(HashMap::new());
    pub static ref BREAKER_RULES: RwLock<RuleMap> = RwLock::new(HashMap::new());
}

pub fn state_change_listeners() -> &'static Mutex<Vec<Arc<dyn StateChangeListener>>> {
    &STATE_CHANGE_LISTENERS
}

use gen_fns::*;
mod gen_fns {
    use super::*;

    pub(super) fn gen_average_rt(
        rule: Arc<Rule>,
        stat: Option<Arc<CounterLeapArray>>,
    ) -> Arc<dyn CircuitBreaker> {
        match stat {
            Some(stat) => Arc::new(AverageRtBreaker::new_with_stat(rule, stat)),
            None => Arc::new(AverageRtBreaker::new(rule)),
        }
    }

    pub(super) fn gen_error_ratio(
        rule: Arc<Rule>,
        stat: Option<Arc<CounterLeapArray>>,
    ) -> Arc<dyn CircuitBreaker> {
        match stat {
            Some(stat) => Arc::new(ErrorRatioBreaker::new_with_stat(rule, stat)),
            None => Arc::new(ErrorRatioBreaker::new(rule)),
        }
    }

    pub(super) fn gen_error_count(
        rule: Arc<Rule>,
        stat: Option<Arc<CounterLeapArray>>,
    ) -> Arc<dyn CircuitBreaker> {
        match stat {
            Some(stat) => Arc::new(ErrorCountBreaker::new_with_stat(rule, stat)),
            None => Arc::new(ErrorCountBreaker::new(rule)),
        }
    }
}

/// `get_rules_of_resource` returns specific resource's rules
// This func acquires the read lock on global `BREAKER_RULES`,
// please release your write locks on it before calling this func
pub fn get_rules_of_resource(res: &str) -> Vec<Arc<Rule>> {
    let breaker_rules = BREAKER_RULES.read().unwrap();
    let placeholder = HashSet::new();
    let res_rules = breaker_rules.get(res).unwrap_or(&placeholder);
    let mut rules = Vec::with_capacity(res_rules.len());
    for r in res_rules {
        rules.push(Arc::clone(r));
    }
    rules
}

/// `get_rules` returns all the rules
// This func acquires the read lock on global `BREAKER_RULES`,
// please release your write locks on it before calling this func
pub fn get_rules() -> Vec<Arc<Rule>> {
    let mut rules = Vec::new();
    let breaker_rules = BREAKER_RULES.read().unwrap();
    for res_rules in (*breaker_rules).values() {
        for r in res_rules {
            rules.push(Arc::clone(r));
        }
    }
    rules
}

/// `clear_rules` clears all the previous rules.
// This func acquires locks on global `BREAKER_RULES`, `CURRENT_RULES` and `BREAKER_MAP`,
// please release your locks on them before calling this func
pub fn clear_rules() {
    CURRENT_RULES.lock().unwrap().clear();
    BREAKER_RULES.write().unwrap().clear();
    BREAKER_MAP.write().unwrap().clear();
}

/// load_rules replaces the old rules with the given circuit breaking rules.
/// The returned `bool` indicates whether the internal map has been changed.
// This func acquires locks on global `CURRENT_RULES`, `BREAKER_RULES` and `BREAKER_MAP`,
// please release your locks on them before calling this func
pub fn load_rules(rules: Vec<Arc<Rule>>) -> bool {
    let mut rule_map: RuleMap = HashMap::new();
    for rule in rules {
        let entry = rule_map.entry(rule.resource.clone()).or_default();
        entry.insert(rule);
    }

    let mut global_rule_map = CURRENT_RULES.lock().unwrap();
    if *global_rule_map == rule_map {
        logging::info!(
            "[CircuitBreaker] Loaded rules are the same as the current rules, ignoring the load operation."
        );
        return false;
    }

    // update the global rule map, ignoring invalid rules
    let mut valid_rules_map = HashMap::with_capacity(rule_map.len());
    for (res, rules) in &rule_map {
        let mut valid_rules = HashSet::new();
        for rule in rules {
            match rule.is_valid() {
                Ok(_) => {
                    valid_rules.insert(Arc::clone(rule));
                }
                Err(err) => logging::warn!(
                    "[CircuitBreaker load_rules] Ignoring invalid rule {:?}, reason: {:?}",
                    rule,
                    err
                ),
            }
        }
        if !valid_rules.is_empty() {
            valid_rules_map.insert(res.clone(), valid_rules);
        }
    }

    let start = utils::curr_time_nanos();
    let mut global_breaker_map = BREAKER_MAP.write().unwrap();
    let mut valid_breaker_map = HashMap::with_capacity(valid_rules_map.len());

    // rebuild the breakers, reusing equivalent breakers and their statistics
    for (res, rules) in valid_rules_map.iter() {
        let mut placeholder = Vec::new();
        let new_cbs_of_res = build_resource_circuit_breaker(
            res,
            rules,
            global_breaker_map.get_mut(res).unwrap_or(&mut placeholder),
        );
        if !new_cbs_of_res.is_empty() {
            valid_breaker_map.insert(res.clone(), new_cbs_of_res);
        }
    }

    if valid_rules_map.is_empty() {
        logging::info!("[CircuitBreaker] Circuit breaking rules were cleared")
    } else {
        logging::info!(
            "[CircuitBreaker] Circuit breaking rules were loaded: {:?}",
            valid_rules_map.values()
        )
    }

    *BREAKER_RULES.write().unwrap() = valid_rules_map;
    *global_breaker_map = valid_breaker_map;
    *global_rule_map = rule_map;
    drop(global_rule_map);
    drop(global_breaker_map);
    logging::debug!(
        "[CircuitBreaker load_rules] Time statistic(ns) for updating circuit breaking rules, time cost {}",
        utils::curr_time_nanos() - start
    );

    true
}

/// load_rules_of_resource loads the given resource's circuit breaking rules,
/// replacing all of that resource's previous rules.
/// The returned value indicates whether a real load operation happened; it is
/// false when the given rules equal the resource's current rules.
// This func acquires locks on global `CURRENT_RULES`, `BREAKER_RULES` and `BREAKER_MAP`,
// please release your locks on them before calling this func
pub fn load_rules_of_resource(res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
    if res.is_empty() {
        return Err(Error::msg("empty resource"));
    }
    let rules: HashSet<_> = rules.into_iter().collect();
    let mut global_rule_map = CURRENT_RULES.lock().unwrap();
    let mut global_breaker_map = BREAKER_MAP.write().unwrap();
    // clear resource rules
    if rules.is_empty() {
        global_rule_map.remove(res);
        global_breaker_map.remove(res);
        BREAKER_RULES.write().unwrap().remove(res);
        logging::info!(
            "[CircuitBreaker] Cleared resource level rules, resource {}",
            res
        );
        return Ok(true);
    }
    if global_rule_map.get(res).unwrap_or(&HashSet::new()) == &rules {
        logging::info!("[CircuitBreaker] Loaded resource level rules are the same as the current ones, ignoring the load operation.");
        return Ok(false);
    }

    let mut valid_res_rules = HashSet::with_capacity(rules.len());
    for rule in &rules {
        match rule.is_valid() {
            Ok(_) => {
                valid_res_rules.insert(Arc::clone(rule));
            }
            Err(err) => logging::warn!(
                "[CircuitBreaker load_rules_of_resource] Ignoring invalid rule {:?}, reason: {:?}",
                rule,
                err
            ),
        }
    }
    let start = utils::curr_time_nanos();
    let mut placeholder = Vec::new();
    let old_res_cbs = global_breaker_map.get_mut(res).unwrap_or(&mut placeholder);
    let new_res_cbs = build_resource_circuit_breaker(res, &valid_res_rules, old_res_cbs);

    if new_res_cbs.is_empty() {
        global_breaker_map.remove(res);
        BREAKER_RULES.write().unwrap().remove(res);
    } else {
        global_breaker_map.insert(res.into(), new_res_cbs);
        BREAKER_RULES
            .write()
            .unwrap()
            .insert(res.into(), valid_res_rules);
    }

    global_rule_map.insert(res.into(), rules);
    logging::debug!(
        "[CircuitBreaker load_rules_of_resource] Time statistic(ns) for updating circuit breaking rules, time cost {}",
        utils::curr_time_nanos() - start
    );

    Ok(true)
}

// This func acquires the read lock on global `BREAKER_MAP`,
// please release your write locks on it before calling this func
pub fn get_breakers_of_resource(resource: &str) -> Vec<Arc<dyn CircuitBreaker>> {
    let breakers_map = BREAKER_MAP.read().unwrap();
    let placeholder = Vec::new();
    let res_cbs = breakers_map.get(resource).unwrap_or(&placeholder);
    let mut breakers = Vec::with_capacity(res_cbs.len());
    for b in res_cbs {
        breakers.push(Arc::clone(b));
    }
    breakers
}

/// register_state_change_listeners registers global state change listeners for all circuit breakers
pub fn register_state_change_listeners(mut listeners: Vec<Arc<dyn StateChangeListener>>) {
    if listeners.is_empty() {
        return;
    }
    STATE_CHANGE_LISTENERS.lock().unwrap().append(&mut listeners);
}

/// clear_state_change_listeners removes every registered StateChangeListener
pub fn clear_state_change_listeners() {
    STATE_CHANGE_LISTENERS.lock().unwrap().clear();
}

/// set_circuit_breaker_generator sets the circuit breaker generator for the given grade.
/// Modifying the generator of default grades is not allowed.
pub fn set_circuit_breaker_generator(grade: BreakerGrade, generator: Box<BreakerGenFn>) -> Result<()> {
    match grade {
        BreakerGrade::Custom(_) => {
            GEN_FUN_MAP.write().unwrap().insert(grade, generator);
            Ok(())
        }
        _ => Err(Error::msg(
            "Default circuit breakers are not allowed to be modified.",
        )),
    }
}

pub fn remove_circuit_breaker_generator(grade: &BreakerGrade) -> Result<()> {
    match grade {
        BreakerGrade::Custom(_) => {
            GEN_FUN_MAP.write().unwrap().remove(grade);
            Ok(())
        }
        _ => Err(Error::msg(
            "Default circuit breakers are not allowed to be modified.",
        )),
    }
}

/// `clear_rules_of_resource` clears the resource level rules in the circuit breaker module.
pub fn clear_rules_of_resource(res: &str) {
    BREAKER_RULES.write().unwrap().remove(res);
    CURRENT_RULES.lock().unwrap().remove(res);
    BREAKER_MAP.write().unwrap().remove(res);
}

pub fn calculate_reuse_index_for(
    r: &Arc<Rule>,
    old_res_cbs: &[Arc<dyn CircuitBreaker>],
) -> (usize, usize) {
    // the index of the equivalent rule in the old circuit breaker slice
    let mut eq_idx = usize::MAX;
    // the index of the first statistic-reusable rule in the old circuit breaker slice
    let mut reuse_stat_idx = usize::MAX;

    for (idx, old_cb) in old_res_cbs.iter().enumerate() {
        let old_rule = old_cb.bound_rule();
        if old_rule == r {
            eq_idx = idx;
            break;
        }
        if reuse_stat_idx == usize::MAX && old_rule.is_stat_reusable(r) {
            reuse_stat_idx = idx;
        }
    }
    (eq_idx, reuse_stat_idx)
}

/// build_resource_circuit_breaker builds a CircuitBreaker slice from rules.
/// The resource of every rule must equal `res`.
pub fn build_resource_circuit_breaker(
    res: &str,
    rules_of_res: &HashSet<Arc<Rule>>,
    old_res_cbs: &mut Vec<Arc<dyn CircuitBreaker>>,
) -> Vec<Arc<dyn CircuitBreaker>> {
    let mut new_res_cbs = Vec::with_capacity(rules_of_res.len());
    for rule in rules_of_res {
        if res != rule.resource {
            logging::error!("Unmatched resource name in CircuitBreaker::build_resource_circuit_breaker, expect: {}, actual: {}, rule: {:?}", res, rule.resource, rule);
            continue;
        }

        let (eq_idx, reuse_stat_idx) = calculate_reuse_index_for(rule, old_res_cbs);

        if eq_idx != usize::MAX {
            // an equivalent breaker exists, keep it together with its state
            let eq_old_cb = Arc::clone(&old_res_cbs[eq_idx]);
            new_res_cbs.push(eq_old_cb);
            old_res_cbs.remove(eq_idx);
            continue;
        }

        let gen_fun_map = GEN_FUN_MAP.read().unwrap();
        let generator = gen_fun_map.get(&rule.grade);
        if generator.is_none() {
            logging::error!("[CircuitBreaker build_resource_circuit_breaker] Ignoring the rule due to unsupported circuit breaking grade, rule {:?}", rule);
            continue;
        }
        let generator = generator.unwrap();

        let cb = {
            if reuse_stat_idx != usize::MAX {
                generator(
                    rule.clone(),
                    Some(Arc::clone(old_res_cbs[reuse_stat_idx].stat())),
                )
            } else {
                generator(rule.clone(), None)
            }
        };

        if reuse_stat_idx != usize::MAX {
            old_res_cbs.remove(reuse_stat_idx);
        }
        new_res_cbs.push(cb);
    }
    new_res_cbs
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    #[should_panic(expected = "Default circuit breakers are not allowed to be modified.")]
    fn illegal_set() {
        set_circuit_breaker_generator(
            BreakerGrade::AverageRt,
            Box::new(
                |rule: Arc<Rule>, _: Option<Arc<CounterLeapArray>>| -> Arc<dyn CircuitBreaker> {
                    Arc::new(AverageRtBreaker::new(rule))
                },
            ),
        )
        .unwrap();
    }

    #[test]
    #[should_panic(expected = "Default circuit breakers are not allowed to be modified.")]
    fn illegal_remove() {
        remove_circuit_breaker_generator(&BreakerGrade::ErrorRatio).unwrap();
    }

    #[test]
    #[ignore]
    fn set_and_remove_generator() {
        clear_rules();
        let key = BreakerGrade::Custom(101);
        set_circuit_breaker_generator(
            key,
            Box::new(
                |rule: Arc<Rule>, _: Option<Arc<CounterLeapArray>>| -> Arc<dyn CircuitBreaker> {
                    Arc::new(ErrorRatioBreaker::new(rule))
                },
            ),
        )
        .unwrap();
        let resource = String::from("test-customized-cb");
        load_rules(vec![Arc::new(Rule {
            resource: resource.clone(),
            grade: key,
            count: 0.3,
            time_window: 1,
            stat_interval_ms: 1000,
            ..Default::default()
        })]);

        assert!(GEN_FUN_MAP.read().unwrap().contains_key(&key));
        assert!(!BREAKER_MAP.read().unwrap()[&resource].is_empty());
        remove_circuit_breaker_generator(&key).unwrap();
        assert!(!GEN_FUN_MAP.read().unwrap().contains_key(&key));
        clear_rules();
    }

    #[test]
    #[ignore]
    fn load_rules_diff() {
        clear_rules();
        let r0 = Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::AverageRt,
            count: 20.0,
            time_window: 1,
            stat_interval_ms: 1000,
            slow_ratio_threshold: 0.1,
            ..Default::default()
        });
        let r1 = Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::ErrorRatio,
            count: 0.3,
            time_window: 1,
            stat_interval_ms: 1000,
            ..Default::default()
        });
        let r2 = Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::ErrorCount,
            count: 10.0,
            time_window: 1,
            stat_interval_ms: 1000,
            ..Default::default()
        });
        assert!(load_rules(vec![
            Arc::clone(&r0),
            Arc::clone(&r1),
            Arc::clone(&r2)
        ]));
        {
            let breaker_map = BREAKER_MAP.read().unwrap();
            assert_eq!(breaker_map.len(), 1);
            assert_eq!(breaker_map["abc"].len(), 3);
        }

        // loading an identical set is a no-op
        assert!(!load_rules(vec![r0, r1, r2]));
        clear_rules();
    }

    #[test]
    #[ignore]
    fn load_rules_skips_invalid() {
        clear_rules();
        let good = Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::ErrorCount,
            count: 10.0,
            time_window: 1,
            stat_interval_ms: 1000,
            ..Default::default()
        });
        let bad = Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::ErrorCount,
            count: 10.0,
            time_window: 0,
            stat_interval_ms: 1000,
            ..Default::default()
        });
        assert!(load_rules(vec![good, bad]));
        assert_eq!(get_rules().len(), 1);
        clear_rules();
    }

    #[test]
    #[ignore]
    fn load_rules_of_resource_lifecycle() {
        clear_rules();
        let r0 = Arc::new(Rule {
            resource: "abc1".into(),
            grade: BreakerGrade::ErrorRatio,
            count: 0.3,
            time_window: 1,
            stat_interval_ms: 1000,
            ..Default::default()
        });
        let r1 = Arc::new(Rule {
            resource: "abc2".into(),
            grade: BreakerGrade::ErrorCount,
            count: 10.0,
            time_window: 1,
            stat_interval_ms: 1000,
            ..Default::default()
        });
        assert!(load_rules_of_resource("abc1", vec![Arc::clone(&r0)]).unwrap());
        assert!(load_rules_of_resource("abc2", vec![Arc::clone(&r1)]).unwrap());
        assert_eq!(get_breakers_of_resource("abc1").len(), 1);
        assert_eq!(get_breakers_of_resource("abc2").len(), 1);

        // reload of the identical set is a no-op
        assert!(!load_rules_of_resource("abc1", vec![Arc::clone(&r0)]).unwrap());

        // the empty set clears the resource
        assert!(load_rules_of_resource("abc1", Vec::new()).unwrap());
        assert!(get_breakers_of_resource("abc1").is_empty());
        assert_eq!(get_breakers_of_resource("abc2").len(), 1);

        assert!(load_rules_of_resource("", vec![r1]).is_err());
        clear_rules();
    }

    #[test]
    #[ignore]
    fn breaker_reuse_on_reload() {
        clear_rules();
        let r0 = Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::ErrorRatio,
            count: 0.3,
            time_window: 1,
            stat_interval_ms: 1000,
            ..Default::default()
        });
        assert!(load_rules(vec![Arc::clone(&r0)]));
        let old = &get_breakers_of_resource("abc")[0];
        let old_stat = Arc::clone(old.stat());

        // same stat dimensions but a different threshold: the breaker is
        // rebuilt, the sliding window survives
        let r1 = Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::ErrorRatio,
            count: 0.6,
            time_window: 1,
            stat_interval_ms: 1000,
            ..Default::default()
        });
        assert!(load_rules(vec![r1]));
        let new = &get_breakers_of_resource("abc")[0];
        assert!(Arc::ptr_eq(new.stat(), &old_stat));
        clear_rules();
    }
}
