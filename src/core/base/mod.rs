pub mod constant;
pub mod resource;
pub mod result;
pub mod rule;
pub mod stat;

pub use constant::*;
pub use resource::*;
pub use result::*;
pub use rule::*;
pub use stat::*;
