pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod lookup;
pub mod prefs;
pub mod probe;
pub mod route;
pub mod state;
pub mod targets;
pub mod trace;
