pub mod carrier;
pub mod hop;
pub mod result;

pub use carrier::*;
pub use hop::*;
pub use result::*;
