//! Request-level flow control: web flow rules, parameter extraction and the
//! compiled regex pattern cache. The parser resolves the statistic keys a
//! request contributes to; the rate checks themselves consult the cluster
//! node registry through those keys.
pub mod param_parser;
pub mod regex_cache;
pub mod rule;
pub mod rule_manager;

pub use param_parser::*;
pub use rule::*;
pub use rule_manager::*;
