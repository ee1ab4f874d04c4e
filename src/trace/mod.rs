pub mod engine;
pub mod orchestrator;

pub use engine::{IcmpTracer, MAX_TTL};
pub use orchestrator::{Orchestrator, resolve_host};
