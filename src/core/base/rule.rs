use crate::Result;
use std::fmt;

pub trait TrafficRule: fmt::Debug + Send + Sync {
    fn resource_name(&self) -> String;
    fn is_valid(&self) -> Result<()> {
        Ok(())
    }
}
