use super::{regex_cache, rule_manager, MatchStrategy, ParamRuleHolder, ParseStrategy, WebFlowRule, WebParamItem};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Pluggable accessor over one concrete request type. Every getter returns
/// the extracted string or `None` when the request carries no such item.
#[cfg_attr(test, automock)]
pub trait RequestItemParser<R: Send + Sync + 'static>: Send + Sync {
    fn get_path(&self, request: &R) -> Option<String>;
    fn get_remote_address(&self, request: &R) -> Option<String>;
    fn get_header(&self, request: &R, key: &str) -> Option<String>;
    fn get_url_param(&self, request: &R, name: &str) -> Option<String>;
    fn get_cookie_value(&self, request: &R, name: &str) -> Option<String>;
    fn get_body_value(&self, request: &R, name: &str) -> Option<String>;
    fn get_path_value(&self, request: &R, name: &str) -> Option<String>;
}

/// WebParamParser resolves the flow-control keys of a request: it extracts
/// the parameter item of every applicable rule, applies the rule's match
/// strategy and emits the rule's precomputed param key paired with the
/// extracted value.
pub struct WebParamParser<R: Send + Sync + 'static> {
    item_parser: Arc<dyn RequestItemParser<R>>,
}

impl<R: Send + Sync + 'static> WebParamParser<R> {
    pub fn new(item_parser: Arc<dyn RequestItemParser<R>>) -> Self {
        WebParamParser { item_parser }
    }

    /// Resolves the control keys of the request for the given resource.
    /// A request may contribute to zero, one or several statistic buckets;
    /// rules whose item is absent from the request or whose pattern does
    /// not match contribute nothing.
    pub fn parse_parameters<F>(&self, resource: &str, request: &R, filter: F) -> HashMap<String, String>
    where
        F: Fn(&WebFlowRule) -> bool,
    {
        self.parse_with_rule_holders(&rule_manager::get_rules_for_resource(resource), request, filter)
    }

    pub(crate) fn parse_with_rule_holders<F>(
        &self,
        holders: &[ParamRuleHolder],
        request: &R,
        filter: F,
    ) -> HashMap<String, String>
    where
        F: Fn(&WebFlowRule) -> bool,
    {
        let mut params = HashMap::new();
        for holder in holders {
            if !filter(&holder.rule) {
                continue;
            }
            let item = match &holder.rule.param_item {
                Some(item) => item,
                None => continue,
            };
            let value = match self.extract_item(request, item) {
                Some(value) => value,
                // the request carries no such item, the rule does not apply
                None => continue,
            };
            if value_matches(item, &value) {
                params.insert(holder.param_key.clone(), value);
            }
        }
        params
    }

    fn extract_item(&self, request: &R, item: &WebParamItem) -> Option<String> {
        match item.parse_strategy {
            ParseStrategy::ClientIp => self.item_parser.get_remote_address(request),
            ParseStrategy::Host => self.item_parser.get_header(request, "Host"),
            ParseStrategy::Header => self.item_parser.get_header(request, &item.field_name),
            ParseStrategy::UrlParam => self.item_parser.get_url_param(request, &item.field_name),
            ParseStrategy::Cookie => self.item_parser.get_cookie_value(request, &item.field_name),
            ParseStrategy::BodyParam => self.item_parser.get_body_value(request, &item.field_name),
            ParseStrategy::PathParam => self.item_parser.get_path_value(request, &item.field_name),
        }
    }
}

/// Evaluates the item's match strategy against the extracted value. An
/// empty pattern matches unconditionally. A regex pattern that was never
/// registered in the cache matches nothing.
fn value_matches(item: &WebParamItem, value: &str) -> bool {
    if item.pattern.is_empty() {
        return true;
    }
    match item.match_strategy {
        MatchStrategy::Exact => value == item.pattern,
        MatchStrategy::Contains => value.contains(&item.pattern),
        MatchStrategy::Regex => match regex_cache::get_regex_pattern(&item.pattern) {
            Some(compiled) => compiled.is_match(value),
            None => false,
        },
        MatchStrategy::Unconditional => true,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn url_param_rule(resource: &str, pattern: &str, strategy: MatchStrategy) -> ParamRuleHolder {
        ParamRuleHolder::new(Arc::new(WebFlowRule {
            count: 10.0,
            param_item: Some(WebParamItem {
                parse_strategy: ParseStrategy::UrlParam,
                field_name: "url_key".into(),
                pattern: pattern.into(),
                match_strategy: strategy,
            }),
            ..WebFlowRule::new(resource)
        }))
    }

    fn url_val_parser() -> WebParamParser<()> {
        let mut item_parser = MockRequestItemParser::<()>::new();
        item_parser
            .expect_get_url_param()
            .returning(|_, name| {
                if name == "url_key" {
                    Some("url_val".into())
                } else {
                    None
                }
            });
        WebParamParser::new(Arc::new(item_parser))
    }

    #[test]
    fn match_strategies() {
        regex_cache::add_regex_pattern("url_v.*");
        let parser = url_val_parser();
        let holders = vec![
            url_param_rule("pp_route", "url_val", MatchStrategy::Exact),
            url_param_rule("pp_route", "url_", MatchStrategy::Contains),
            url_param_rule("pp_route", "url_v.*", MatchStrategy::Regex),
            url_param_rule("pp_route", "other", MatchStrategy::Exact),
        ];
        let params = parser.parse_with_rule_holders(&holders, &(), |_| true);
        // three of the four rules match, the mismatched exact rule emits no key
        assert_eq!(params.len(), 3);
        assert_eq!(params[&holders[0].param_key], "url_val");
        assert_eq!(params[&holders[1].param_key], "url_val");
        assert_eq!(params[&holders[2].param_key], "url_val");
        assert!(!params.contains_key(&holders[3].param_key));
    }

    #[test]
    fn parser_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WebParamParser<()>>();
        assert_send_sync::<MockRequestItemParser<()>>();
    }

    #[test]
    fn unregistered_regex_fails_closed() {
        let parser = url_val_parser();
        let holders = vec![url_param_rule(
            "pp_route",
            "url_v[a-l]+_never_registered",
            MatchStrategy::Regex,
        )];
        let params = parser.parse_with_rule_holders(&holders, &(), |_| true);
        assert!(params.is_empty());
    }

    #[test]
    fn absent_value_emits_no_key() {
        let mut item_parser = MockRequestItemParser::<()>::new();
        item_parser.expect_get_url_param().returning(|_, _| None);
        let parser = WebParamParser::new(Arc::new(item_parser));
        let holders = vec![url_param_rule("pp_route", "", MatchStrategy::Unconditional)];
        let params = parser.parse_with_rule_holders(&holders, &(), |_| true);
        assert!(params.is_empty());
    }

    #[test]
    fn host_strategy_reads_host_header() {
        let mut item_parser = MockRequestItemParser::<()>::new();
        item_parser.expect_get_header().returning(|_, key| {
            if key == "Host" {
                Some("hello.test.flowguard".into())
            } else {
                None
            }
        });
        let parser = WebParamParser::new(Arc::new(item_parser));
        let holders = vec![ParamRuleHolder::new(Arc::new(WebFlowRule {
            count: 120.0,
            param_item: Some(WebParamItem {
                parse_strategy: ParseStrategy::Host,
                ..Default::default()
            }),
            ..WebFlowRule::new("pp_route")
        }))];
        let params = parser.parse_with_rule_holders(&holders, &(), |_| true);
        assert_eq!(params[&holders[0].param_key], "hello.test.flowguard");
    }

    #[test]
    fn filter_excludes_rules() {
        let parser = url_val_parser();
        let holders = vec![
            url_param_rule("pp_route", "url_val", MatchStrategy::Exact),
        ];
        let params = parser.parse_with_rule_holders(&holders, &(), |_| false);
        assert!(params.is_empty());
    }

    #[test]
    fn rule_without_item_emits_no_key() {
        let parser = url_val_parser();
        let holders = vec![ParamRuleHolder::new(Arc::new(WebFlowRule::new("pp_route")))];
        let params = parser.parse_with_rule_holders(&holders, &(), |_| true);
        assert!(params.is_empty());
    }

    #[test]
    #[ignore]
    fn parse_through_loaded_rules() {
        rule_manager::clear_rules();
        let rule = Arc::new(WebFlowRule {
            count: 10.0,
            param_item: Some(WebParamItem {
                parse_strategy: ParseStrategy::UrlParam,
                field_name: "url_key".into(),
                pattern: "\\d+".into(),
                match_strategy: MatchStrategy::Regex,
            }),
            ..WebFlowRule::new("pp_loaded_route")
        });
        assert!(rule_manager::load_rules(vec![Arc::clone(&rule)]));

        let mut item_parser = MockRequestItemParser::<()>::new();
        item_parser
            .expect_get_url_param()
            .returning(|_, _| Some("23".into()));
        let parser = WebParamParser::new(Arc::new(item_parser));
        let params = parser.parse_parameters("pp_loaded_route", &(), |_| true);
        assert_eq!(params.len(), 1);
        assert_eq!(params["pp_loaded_route$3$url_key$1$\\d+"], "23");
        rule_manager::clear_rules();
    }
}
