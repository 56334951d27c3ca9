use super::constant::*;
use crate::{
    base::{check_validity_for_statistic, ResourceType},
    logging::Logger,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use serde_json;
use std::fmt;

#[derive(Serialize, Deserialize, Debug)]
pub(super) struct AppConfig {
    // app_name represents the name of current running service.
    pub(super) app_name: String,
    // app_type indicates the resource_type of the service (e.g. web service, API gateway).
    pub(super) app_type: ResourceType,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app_name: DEFAULT_APP_NAME.into(),
            app_type: DEFAULT_APP_TYPE.into(),
        }
    }
}

// LogConfig represents the configuration of logging.
#[derive(Serialize, Deserialize, Debug)]
pub(super) struct LogConfig {
    // logger indicates that using logger to replace default logging.
    pub(super) logger: Logger,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            logger: Logger::EnvLogger(DEFAULT_LOG_LEVEL.into()),
        }
    }
}

// StatConfig represents configuration items related to statistics.
#[derive(Serialize, Deserialize, Debug)]
pub(super) struct StatConfig {
    // sample_count_total and interval_ms_total is the per resource's global default statistic sliding window config
    pub(super) sample_count_total: u32,
    pub(super) interval_ms_total: u32,
    // max_origin_amount caps the per-resource origin map size; origins beyond
    // the cap are not separately attributed.
    pub(super) max_origin_amount: usize,
}

impl Default for StatConfig {
    fn default() -> Self {
        StatConfig {
            sample_count_total: DEFAULT_SAMPLE_COUNT_TOTAL,
            interval_ms_total: DEFAULT_INTERVAL_MS_TOTAL,
            max_origin_amount: DEFAULT_ORIGIN_AMOUNT,
        }
    }
}

// FlowguardConfig represents the general configuration.
#[derive(Serialize, Deserialize, Debug, Default)]
pub(super) struct FlowguardConfig {
    pub(super) app: AppConfig,
    pub(super) log: LogConfig,
    pub(super) stat: StatConfig,
    // use_cache_time indicates whether to cache time(ms), it is false by default
    pub(super) use_cache_time: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ConfigEntity {
    pub(super) version: String,
    pub(super) config: FlowguardConfig,
}

impl Default for ConfigEntity {
    fn default() -> Self {
        ConfigEntity {
            version: FLOWGUARD_VERSION.into(),
            config: FlowguardConfig::default(),
        }
    }
}

impl ConfigEntity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::msg("empty version"));
        }
        if self.config.app.app_name.is_empty() {
            return Err(Error::msg("empty app name"));
        }
        if self.config.stat.max_origin_amount == 0 {
            return Err(Error::msg("max_origin_amount must be positive"));
        }
        check_validity_for_statistic(
            self.config.stat.sample_count_total,
            self.config.stat.interval_ms_total,
        )?;
        Ok(())
    }

    pub fn app_name(&self) -> &String {
        &self.config.app.app_name
    }

    pub fn app_type(&self) -> &ResourceType {
        &self.config.app.app_type
    }

    pub fn logger(&self) -> &Logger {
        &self.config.log.logger
    }

    pub fn max_origin_amount(&self) -> usize {
        self.config.stat.max_origin_amount
    }

    pub fn global_stat_sample_count_total(&self) -> u32 {
        self.config.stat.sample_count_total
    }

    pub fn global_stat_interval_ms_total(&self) -> u32 {
        self.config.stat.interval_ms_total
    }

    pub fn use_cache_time(&self) -> bool {
        self.config.use_cache_time
    }
}

impl fmt::Display for ConfigEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}
