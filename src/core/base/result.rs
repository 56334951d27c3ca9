//! Result
//!
use super::{Snapshot, TrafficRule};
use crate::{Error, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

type OtherBlockType = u8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockType {
    Unknown,
    CircuitBreaking,
    ParamFlow,
    Other(OtherBlockType),
}

impl Default for BlockType {
    fn default() -> Self {
        Self::Unknown
    }
}

lazy_static! {
    static ref BLOCK_TYPE_MAP: Mutex<HashMap<OtherBlockType, &'static str>> =
        Mutex::new(HashMap::new());
}

const EXIST_BLOCK_ERROR: &str = "Block type existed!";

pub fn registry_block_type(other: BlockType, desc: &'static str) -> Result<()> {
    match other {
        BlockType::Other(id) => {
            if BLOCK_TYPE_MAP.lock().unwrap().contains_key(&id) {
                Err(Error::msg(EXIST_BLOCK_ERROR))
            } else {
                BLOCK_TYPE_MAP.lock().unwrap().insert(id, desc);
                Ok(())
            }
        }
        _ => Err(Error::msg(EXIST_BLOCK_ERROR)),
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let BlockType::Other(id) = self {
            match BLOCK_TYPE_MAP.lock().unwrap().get(id) {
                Some(&desc) => write!(f, "{}", desc),
                None => write!(f, "{}", id),
            }
        } else {
            write!(f, "{:?}", self)
        }
    }
}

/// `BlockError` is the rejection raised by the engine itself (e.g. "blocked
/// by rule"). It is a distinct category from application errors: statistic
/// nodes must never count it toward breaker trip conditions.
#[derive(Debug, Clone, Default)]
pub struct BlockError {
    block_type: BlockType,
    block_msg: String,
    rule: Option<Arc<dyn TrafficRule>>,
    // the triggered metric value when the block happened
    snapshot_value: Option<Arc<Snapshot>>,
}

impl BlockError {
    pub fn new(block_type: BlockType) -> Self {
        BlockError {
            block_type,
            ..Default::default()
        }
    }

    pub fn new_with_msg(block_type: BlockType, block_msg: String) -> Self {
        BlockError {
            block_type,
            block_msg,
            ..Default::default()
        }
    }

    pub fn new_with_cause(
        block_type: BlockType,
        block_msg: String,
        rule: Arc<dyn TrafficRule>,
        snapshot_value: Arc<Snapshot>,
    ) -> Self {
        BlockError {
            block_type,
            block_msg,
            rule: Some(rule),
            snapshot_value: Some(snapshot_value),
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn block_msg(&self) -> &String {
        &self.block_msg
    }

    pub fn triggered_rule(&self) -> Option<Arc<dyn TrafficRule>> {
        self.rule.clone()
    }

    pub fn triggered_value(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_value.clone()
    }

    /// `is_block_error` reports whether the given error is an engine
    /// rejection rather than an application exception.
    pub fn is_block_error(err: &Error) -> bool {
        err.downcast_ref::<BlockError>().is_some()
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.block_msg.is_empty() {
            write!(f, "blocked by rule, type: {}", self.block_type)
        } else {
            write!(
                f,
                "blocked by rule, type: {}, message: {}",
                self.block_type, self.block_msg
            )
        }
    }
}

impl std::error::Error for BlockError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultStatus {
    Pass,
    Blocked,
    ShouldWait,
}

impl Default for ResultStatus {
    fn default() -> Self {
        ResultStatus::Pass
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// `TokenResult` is the admit-or-reject decision returned to the caller.
#[derive(Debug, Clone, Default)]
pub struct TokenResult {
    status: ResultStatus,
    block_err: Option<BlockError>,
    nanos_to_wait: u64,
}

impl TokenResult {
    pub fn new_pass() -> Self {
        Self::default()
    }

    pub fn new_should_wait(nanos_to_wait: u64) -> Self {
        Self {
            status: ResultStatus::ShouldWait,
            nanos_to_wait,
            ..Self::default()
        }
    }

    pub fn new_blocked(block_type: BlockType) -> Self {
        Self {
            status: ResultStatus::Blocked,
            block_err: Some(BlockError::new(block_type)),
            ..Self::default()
        }
    }

    pub fn new_blocked_with_msg(block_type: BlockType, block_msg: String) -> Self {
        Self {
            status: ResultStatus::Blocked,
            block_err: Some(BlockError::new_with_msg(block_type, block_msg)),
            ..Self::default()
        }
    }

    pub fn new_blocked_with_cause(
        block_type: BlockType,
        block_msg: String,
        rule: Arc<dyn TrafficRule>,
        snapshot_value: Arc<Snapshot>,
    ) -> Self {
        Self {
            status: ResultStatus::Blocked,
            block_err: Some(BlockError::new_with_cause(
                block_type,
                block_msg,
                rule,
                snapshot_value,
            )),
            ..Self::default()
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == ResultStatus::Pass
    }

    pub fn is_blocked(&self) -> bool {
        self.status == ResultStatus::Blocked
    }

    pub fn is_wait(&self) -> bool {
        self.status == ResultStatus::ShouldWait
    }

    pub fn status(&self) -> &ResultStatus {
        &self.status
    }

    pub fn block_err(&self) -> Option<BlockError> {
        self.block_err.clone()
    }

    pub fn nanos_to_wait(&self) -> u64 {
        self.nanos_to_wait
    }
}

impl fmt::Display for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.block_err {
            Some(err) => write!(
                f,
                "TokenResult{{status={}, blockErr={:?}, nanosToWait={:?}}}",
                self.status, err, self.nanos_to_wait
            ),
            None => write!(
                f,
                "TokenResult{{status={}, blockErr=None, nanosToWait={:?}}}",
                self.status, self.nanos_to_wait
            ),
        }
    }
}
