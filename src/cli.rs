use clap::Parser;
use std::time::Duration;

use crate::trace::MAX_TTL;

/// Detect which backbone carries the return route to major national destinations
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "backhaul")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Destinations to probe as HOST or LABEL=HOST (default: built-in table)
    pub hosts: Vec<String>,

    /// Hop discovery strategy (auto, icmp, external)
    #[arg(short = 's', long = "strategy")]
    pub strategy: Option<String>,

    /// Maximum TTL (hops)
    #[arg(short = 'm', long = "max-ttl")]
    pub max_ttl: Option<u8>,

    /// Per-hop reply timeout in seconds
    #[arg(long = "hop-timeout")]
    pub hop_timeout: Option<f64>,

    /// Timeout for each remote ASN lookup in seconds
    #[arg(long = "remote-timeout")]
    pub remote_timeout: Option<f64>,

    /// Wall-clock limit for the whole batch in seconds
    #[arg(short = 'd', long = "deadline")]
    pub deadline: Option<f64>,

    /// Remote ASN source, in lookup order (http, ws, cymru); repeatable
    #[arg(short = 'r', long = "remote")]
    pub remotes: Vec<String>,

    /// External traceroute binary
    #[arg(long = "tracer")]
    pub tracer: Option<String>,

    /// Install the external tracer if it is missing
    #[arg(long = "auto-install")]
    pub auto_install: bool,

    /// Print results as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Enable debug logging
    #[arg(short = 'e', long = "log")]
    pub log: bool,
}

impl Args {
    pub fn hop_timeout_duration(&self) -> Option<Duration> {
        self.hop_timeout.map(Duration::from_secs_f64)
    }

    pub fn remote_timeout_duration(&self) -> Option<Duration> {
        self.remote_timeout.map(Duration::from_secs_f64)
    }

    pub fn deadline_duration(&self) -> Option<Duration> {
        self.deadline.map(Duration::from_secs_f64)
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref strategy) = self.strategy
            && !["auto", "icmp", "external"].contains(&strategy.to_lowercase().as_str())
        {
            return Err(format!("Unknown strategy: {}. Use auto, icmp, or external", strategy));
        }

        for remote in &self.remotes {
            if !["http", "ws", "cymru"].contains(&remote.to_lowercase().as_str()) {
                return Err(format!("Unknown remote: {}. Use http, ws, or cymru", remote));
            }
        }

        if let Some(max_ttl) = self.max_ttl {
            if max_ttl == 0 {
                return Err("Max TTL must be at least 1".into());
            }
            if max_ttl > MAX_TTL {
                return Err(format!("Max TTL cannot exceed {}", MAX_TTL));
            }
        }

        for (name, value) in [
            ("Hop timeout", self.hop_timeout),
            ("Remote timeout", self.remote_timeout),
            ("Deadline", self.deadline),
        ] {
            if let Some(v) = value
                && !(v.is_finite() && v > 0.0)
            {
                return Err(format!("{} must be positive", name));
            }
        }

        if let Some(ref tracer) = self.tracer
            && tracer.trim().is_empty()
        {
            return Err("Tracer binary cannot be empty".into());
        }

        for host in &self.hosts {
            let host = host.split_once('=').map_or(host.as_str(), |(_, h)| h);
            if host.trim().is_empty() {
                return Err("Destination host cannot be empty".into());
            }
        }

        Ok(())
    }
}
