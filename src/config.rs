use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cli::Args;
use crate::lookup::ripe::DEFAULT_RIPE_URL;
use crate::lookup::ws::DEFAULT_WS_URL;
use crate::probe::external::{DEFAULT_INSTALL_COMMAND, DEFAULT_TRACER};
use crate::probe::{ExternalTracer, HopSource, ProbePlan};
use crate::targets::{Destination, default_destinations};
use crate::trace::{IcmpTracer, MAX_TTL};

/// How hops are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStrategy {
    /// External tool first, raw ICMP if it is unavailable
    #[default]
    Auto,
    Icmp,
    External,
}

impl ProbeStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "icmp" => Some(Self::Icmp),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// Remote ASN transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    /// RIPEstat network-info over HTTPS
    Http,
    /// Shared WebSocket session
    Ws,
    /// Team Cymru TXT records
    Cymru,
}

impl RemoteKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(Self::Http),
            "ws" => Some(Self::Ws),
            "cymru" => Some(Self::Cymru),
            _ => None,
        }
    }
}

/// Runtime configuration: defaults, then the prefs file, then CLI args
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub strategy: ProbeStrategy,
    /// Maximum TTL, never above MAX_TTL
    pub max_ttl: u8,
    #[serde(with = "duration_serde")]
    pub hop_timeout: Duration,
    #[serde(with = "duration_serde")]
    pub remote_timeout: Duration,
    /// Batch deadline; None picks one from the strategy
    #[serde(with = "duration_serde::option")]
    pub deadline: Option<Duration>,
    pub remotes: Vec<RemoteKind>,
    #[serde(with = "duration_serde")]
    pub cache_ttl: Duration,
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,
    pub tracer_binary: String,
    pub auto_install: bool,
    pub install_command: String,
    pub ripe_url: String,
    pub ws_url: String,
    pub destinations: Vec<Destination>,
    pub json: bool,
    pub log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: ProbeStrategy::Auto,
            max_ttl: MAX_TTL,
            hop_timeout: Duration::from_secs(2),
            remote_timeout: Duration::from_secs(5),
            deadline: None,
            remotes: vec![RemoteKind::Http],
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            tracer_binary: DEFAULT_TRACER.to_string(),
            auto_install: false,
            install_command: DEFAULT_INSTALL_COMMAND.to_string(),
            ripe_url: DEFAULT_RIPE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            destinations: default_destinations(),
            json: false,
            log: false,
        }
    }
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        let mut config = Self::default();
        config.apply_args(args);
        config
    }
}

impl Config {
    /// Overlay whatever the user passed on the command line.
    ///
    /// Args are expected to have passed `Args::validate`; unknown names are
    /// ignored here.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(strategy) = args.strategy.as_deref().and_then(ProbeStrategy::parse) {
            self.strategy = strategy;
        }
        if let Some(max_ttl) = args.max_ttl {
            self.max_ttl = max_ttl.min(MAX_TTL);
        }
        if let Some(t) = args.hop_timeout_duration() {
            self.hop_timeout = t;
        }
        if let Some(t) = args.remote_timeout_duration() {
            self.remote_timeout = t;
        }
        if let Some(t) = args.deadline_duration() {
            self.deadline = Some(t);
        }
        if !args.remotes.is_empty() {
            self.remotes = parse_remotes(&args.remotes);
        }
        if let Some(ref tracer) = args.tracer {
            self.tracer_binary = tracer.clone();
        }
        if !args.hosts.is_empty() {
            self.destinations = args.hosts.iter().map(|h| Destination::parse(h)).collect();
        }
        self.auto_install |= args.auto_install;
        self.json |= args.json;
        self.log |= args.log;
    }

    /// Effective batch deadline. Raw ICMP is bounded by max_ttl × hop_timeout
    /// so it gets the shorter default.
    pub fn deadline(&self) -> Duration {
        self.deadline.unwrap_or(match self.strategy {
            ProbeStrategy::Icmp => Duration::from_secs(60),
            ProbeStrategy::Auto | ProbeStrategy::External => Duration::from_secs(120),
        })
    }

    pub fn icmp_tracer(&self) -> IcmpTracer {
        IcmpTracer {
            max_ttl: self.max_ttl,
            hop_timeout: self.hop_timeout,
        }
    }

    pub fn external_tracer(&self) -> ExternalTracer {
        ExternalTracer {
            binary: self.tracer_binary.clone(),
            max_ttl: self.max_ttl,
            auto_install: self.auto_install,
            install_command: self.install_command.clone(),
            ..ExternalTracer::default()
        }
    }

    /// Hop sources in the order they are tried
    pub fn probe_plan(&self) -> ProbePlan {
        let sources = match self.strategy {
            ProbeStrategy::Auto => vec![
                HopSource::External(self.external_tracer()),
                HopSource::Icmp(self.icmp_tracer()),
            ],
            ProbeStrategy::Icmp => vec![HopSource::Icmp(self.icmp_tracer())],
            ProbeStrategy::External => vec![HopSource::External(self.external_tracer())],
        };
        ProbePlan::new(sources)
    }
}

/// Parse remote names, dropping unknown ones and duplicates
pub fn parse_remotes<S: AsRef<str>>(names: &[S]) -> Vec<RemoteKind> {
    let mut remotes = Vec::new();
    for kind in names.iter().filter_map(|n| RemoteKind::parse(n.as_ref())) {
        if !remotes.contains(&kind) {
            remotes.push(kind);
        }
    }
    remotes
}

/// Serde helper for Duration
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration.map(|d| d.as_secs_f64()).serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<f64>::deserialize(deserializer)?
                .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
