//! External traceroute tool as a hop source

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::state::HopAddress;

pub const DEFAULT_TRACER: &str = "nexttrace";
/// Per-hop timeout handed to the tool; ICMP is its default mode
const TOOL_HOP_TIMEOUT_MS: u32 = 2000;
pub const DEFAULT_INSTALL_COMMAND: &str = "curl -Ls https://github.com/nxtrace/Ntrace-V1/raw/main/nt_install.sh | bash";

/// Install is attempted at most once per process, whatever the outcome
static INSTALL_ATTEMPT: OnceCell<bool> = OnceCell::const_new();

/// Which IP-shaped token of a hop line is the hop address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpColumn {
    #[default]
    First,
    Last,
}

/// Settings for the external tool
#[derive(Debug, Clone)]
pub struct ExternalTracer {
    pub binary: String,
    pub max_ttl: u8,
    pub auto_install: bool,
    pub install_command: String,
    pub column: IpColumn,
}

impl Default for ExternalTracer {
    fn default() -> Self {
        Self {
            binary: DEFAULT_TRACER.to_string(),
            max_ttl: 30,
            auto_install: false,
            install_command: DEFAULT_INSTALL_COMMAND.to_string(),
            column: IpColumn::First,
        }
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Locate `binary` on PATH (or as given, if it contains a slash)
pub fn find_binary(binary: &str) -> Option<PathBuf> {
    if binary.contains('/') {
        let path = PathBuf::from(binary);
        return is_executable(&path).then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

/// Wrap a command in `sudo -n` unless we are already root
fn privileged(program: &str, args: &[String]) -> Command {
    let mut cmd = if is_root() {
        Command::new(program)
    } else {
        let mut sudo = Command::new("sudo");
        sudo.arg("-n").arg(program);
        sudo
    };
    cmd.args(args);
    cmd
}

/// Parse a hop line's leading TTL and its address.
///
/// Lines without a hop number (banners, headers) are ignored. A numbered line
/// without any address is a silent hop.
pub fn parse_hop_line(line: &str, column: IpColumn) -> Option<HopAddress> {
    let mut fields = line.split_whitespace();
    let ttl: u8 = fields.next()?.trim_end_matches('.').parse().ok()?;
    if ttl == 0 {
        return None;
    }

    let mut addrs = fields.filter_map(|token| {
        token
            .trim_matches(|c: char| !c.is_ascii_digit() && c != '.')
            .parse::<Ipv4Addr>()
            .ok()
    });
    let addr = match column {
        IpColumn::First => addrs.next(),
        IpColumn::Last => addrs.last(),
    };
    Some(match addr {
        Some(ip) => HopAddress::new(ttl, ip, None),
        None => HopAddress::silent(ttl),
    })
}

/// Parse the tool's stdout into TTL-ordered hops, one per TTL
pub fn parse_hops(output: &str, column: IpColumn) -> Vec<HopAddress> {
    let mut hops: Vec<HopAddress> = Vec::new();
    for hop in output.lines().filter_map(|line| parse_hop_line(line, column)) {
        match hops.iter_mut().find(|h| h.ttl == hop.ttl) {
            // Multi-line hops: keep the first address seen for the TTL
            Some(existing) if existing.addr.is_none() => *existing = hop,
            Some(_) => {}
            None => hops.push(hop),
        }
    }
    hops.sort_by_key(|h| h.ttl);
    hops
}

impl ExternalTracer {
    /// Arguments passed to the tool for `target`
    pub fn command_args(&self, target: Ipv4Addr) -> Vec<String> {
        vec![
            "-q".into(),
            "1".into(),
            "-n".into(),
            "-m".into(),
            self.max_ttl.to_string(),
            "--timeout".into(),
            TOOL_HOP_TIMEOUT_MS.to_string(),
            target.to_string(),
        ]
    }

    /// Resolve the binary, installing it once if allowed
    async fn locate(&self) -> Result<PathBuf, ProbeError> {
        if let Some(path) = find_binary(&self.binary) {
            return Ok(path);
        }
        if !self.auto_install {
            return Err(ProbeError::ToolUnavailable(format!("{} not found on PATH", self.binary)));
        }

        let installed = *INSTALL_ATTEMPT
            .get_or_init(|| async {
                info!(tool = %self.binary, "external tracer missing, attempting install");
                let args = vec!["-c".to_string(), self.install_command.clone()];
                match privileged("bash", &args).stdout(Stdio::null()).stderr(Stdio::piped()).output().await {
                    Ok(out) if out.status.success() => true,
                    Ok(out) => {
                        warn!(
                            status = %out.status,
                            stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                            "tracer install failed"
                        );
                        false
                    }
                    Err(e) => {
                        warn!(error = %e, "tracer install could not run");
                        false
                    }
                }
            })
            .await;

        find_binary(&self.binary).ok_or_else(|| {
            let why = if installed { "installed but not on PATH" } else { "install failed" };
            ProbeError::ToolUnavailable(format!("{}: {}", self.binary, why))
        })
    }

    /// Run the tool against `target` and parse its hop list
    pub async fn discover(&self, target: Ipv4Addr, cancel: &CancellationToken) -> Result<Vec<HopAddress>, ProbeError> {
        let binary = self.locate().await?;
        let program = binary.to_string_lossy().into_owned();
        let args = self.command_args(target);
        debug!(%target, %program, ?args, "running external tracer");

        let mut cmd = privileged(&program, &args);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            out = cmd.output() => out.map_err(|e| ProbeError::ToolUnavailable(e.to_string()))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::ToolUnavailable(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let hops = parse_hops(&String::from_utf8_lossy(&output.stdout), self.column);
        if hops.iter().all(HopAddress::is_silent) {
            return Err(ProbeError::NoHops);
        }
        Ok(hops)
    }
}
