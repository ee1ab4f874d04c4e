pub mod correlate;
pub mod external;
pub mod icmp;
pub mod plan;
pub mod socket;

pub use correlate::*;
pub use external::{ExternalTracer, IpColumn};
pub use icmp::*;
pub use plan::{HopDiscovery, HopSource, ProbePlan};
pub use socket::*;
