pub mod classify;
pub mod convergence;

pub use classify::{RouteClassifier, RouteSummary, summarize};
pub use convergence::convergence_boundary;
