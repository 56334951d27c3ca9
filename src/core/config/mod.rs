pub mod config;
pub mod constant;
pub mod entity;

pub use self::config::*;
pub use constant::*;
pub use entity::*;
