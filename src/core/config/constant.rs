use crate::base::{ResourceType, DEFAULT_MAX_ORIGIN_AMOUNT};

// default app settings
pub const FLOWGUARD_VERSION: &str = "v1";
pub const DEFAULT_APP_NAME: &str = "unknown_service";
pub const DEFAULT_APP_TYPE: u8 = ResourceType::Common as _;
pub const APP_NAME_ENV_KEY: &str = "FLOWGUARD_APP_NAME";
pub const APP_TYPE_ENV_KEY: &str = "FLOWGUARD_APP_TYPE";
pub const CONF_FILE_PATH_ENV_KEY: &str = "FLOWGUARD_CONFIG_FILE_PATH";
pub const CONFIG_FILENAME: &str = "flowguard.yml";
pub const DEFAULT_LOG_LEVEL: &str = "info";

// default statistic settings
pub const DEFAULT_SAMPLE_COUNT_TOTAL: u32 = 20;
pub const DEFAULT_INTERVAL_MS_TOTAL: u32 = 10000;
pub const DEFAULT_ORIGIN_AMOUNT: usize = DEFAULT_MAX_ORIGIN_AMOUNT;

// default circuit breaking settings
pub const DEFAULT_STAT_INTERVAL_MS: u32 = 1000;
pub const DEFAULT_MIN_REQUEST_AMOUNT: u64 = 5;
pub const DEFAULT_SLOW_RATIO_THRESHOLD: f64 = 1.0;
pub const DEFAULT_HALF_OPEN_BASE_AMOUNT_PER_STEP: u64 = 5;
pub const DEFAULT_HALF_OPEN_RECOVERY_STEP_NUM: u32 = 1;
