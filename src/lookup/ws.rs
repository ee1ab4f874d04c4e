//! WebSocket remote lookup.
//!
//! One long-lived connection task multiplexes every lookup. Callers hand the
//! task an IP plus a oneshot; answers are routed back by the `ip` field of the
//! reply. Requests that were in flight when the socket dropped are sent again
//! after the reconnect.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::resolver::{RemoteAnswer, RemoteLookup, normalize_asn};
use crate::error::LookupError;

pub const DEFAULT_WS_URL: &str = "wss://api.leo.moe/trace";

const REQUEST_QUEUE: usize = 256;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type Reply = oneshot::Sender<Result<RemoteAnswer, LookupError>>;

struct Request {
    ip: String,
    reply: Reply,
}

/// Waiters keyed by IP string
type Pending = HashMap<String, Vec<Reply>>;

/// Settings for the connection task
#[derive(Debug, Clone)]
pub struct WsSettings {
    pub url: String,
    pub handshake_timeout: Duration,
    /// How long a caller waits for its answer
    pub reply_timeout: Duration,
    /// How often abandoned waiters are dropped
    pub sweep_interval: Duration,
}

/// Handle to the shared connection task
pub struct WsLookup {
    tx: mpsc::Sender<Request>,
    reply_timeout: Duration,
}

impl WsLookup {
    /// Start the connection task. It runs until `cancel` fires or every
    /// handle is dropped.
    pub fn spawn(settings: WsSettings, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let reply_timeout = settings.reply_timeout;
        tokio::spawn(run_connection(settings, rx, cancel));
        Self { tx, reply_timeout }
    }
}

#[async_trait]
impl RemoteLookup for WsLookup {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<RemoteAnswer, LookupError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request {
                ip: ip.to_string(),
                reply,
            })
            .await
            .map_err(|_| LookupError::Transport("websocket task stopped".into()))?;

        match timeout(self.reply_timeout, rx).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(_)) => Err(LookupError::Transport("websocket task dropped request".into())),
            Err(_) => Err(LookupError::Timeout(self.reply_timeout)),
        }
    }
}

/// Parse one reply frame into its IP and answer
pub fn parse_ws_answer(text: &str) -> Result<(String, RemoteAnswer), LookupError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| LookupError::Malformed(e.to_string()))?;

    let ip = value
        .get("ip")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LookupError::Malformed("reply without ip".into()))?
        .to_string();

    let text_field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let asn = match value.get("asnumber") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => String::new(),
        Some(raw) => normalize_asn(raw)
            .ok_or_else(|| LookupError::Malformed(format!("unrecognised asnumber {}", raw)))?,
    };

    let owner = text_field("domain")
        .or_else(|| text_field("owner"))
        .or_else(|| text_field("isp"));

    // Sent either as an object or as a JSON-encoded string; often absent
    let router: HashMap<String, Vec<String>> = match value.get("router") {
        Some(serde_json::Value::String(s)) => serde_json::from_str(s).ok(),
        Some(v @ serde_json::Value::Object(_)) => serde_json::from_value(v.clone()).ok(),
        _ => None,
    }
    .unwrap_or_default();

    Ok((
        ip,
        RemoteAnswer {
            asn,
            prefix: text_field("prefix"),
            whois: text_field("whois"),
            owner,
            router,
        },
    ))
}

/// Deliver an answer to every waiter for its IP
fn dispatch(pending: &mut Pending, text: &str) {
    match parse_ws_answer(text) {
        Ok((ip, answer)) => {
            if let Some(waiters) = pending.remove(&ip) {
                for waiter in waiters {
                    let _ = waiter.send(Ok(answer.clone()));
                }
            } else {
                debug!(%ip, "unsolicited websocket reply");
            }
        }
        Err(e) => debug!(error = %e, "unparsable websocket frame"),
    }
}

/// Drop waiters whose callers already gave up
fn purge(pending: &mut Pending) {
    pending.retain(|_, waiters| {
        waiters.retain(|w| !w.is_closed());
        !waiters.is_empty()
    });
}

/// Queue a waiter; true when a frame must go out for its IP.
///
/// Waiters whose callers timed out are dropped first, so a retry after a
/// lost answer is sent again instead of queueing behind a dead request.
fn enqueue(pending: &mut Pending, request: Request) -> bool {
    let waiters = pending.entry(request.ip).or_default();
    waiters.retain(|w| !w.is_closed());
    let first = waiters.is_empty();
    waiters.push(request.reply);
    first
}

enum Disconnect {
    /// Cancelled or every handle dropped
    Shutdown,
    Lost(String),
}

async fn run_connection(settings: WsSettings, mut rx: mpsc::Receiver<Request>, cancel: CancellationToken) {
    let mut pending = Pending::new();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        // Connect lazily on first demand
        while pending.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                request = rx.recv() => match request {
                    Some(request) => {
                        enqueue(&mut pending, request);
                    }
                    None => return,
                },
            }
        }

        match connect_and_serve(&settings, &mut rx, &mut pending, &mut backoff, &cancel).await {
            Disconnect::Shutdown => return,
            Disconnect::Lost(reason) => {
                warn!(url = %settings.url, %reason, "websocket disconnected; reconnecting");
            }
        }

        // Keep accepting requests while backing off
        let pause = sleep(backoff);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = &mut pause => break,
                request = rx.recv() => match request {
                    Some(request) => {
                        enqueue(&mut pending, request);
                    }
                    None => return,
                },
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
        purge(&mut pending);
    }
}

async fn connect_and_serve(
    settings: &WsSettings,
    rx: &mut mpsc::Receiver<Request>,
    pending: &mut Pending,
    backoff: &mut Duration,
    cancel: &CancellationToken,
) -> Disconnect {
    let connect = tokio::select! {
        _ = cancel.cancelled() => return Disconnect::Shutdown,
        result = timeout(settings.handshake_timeout, connect_async(settings.url.as_str())) => result,
    };
    let stream = match connect {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => return Disconnect::Lost(e.to_string()),
        Err(_) => return Disconnect::Lost("handshake timed out".into()),
    };
    debug!(url = %settings.url, "websocket connected");
    *backoff = INITIAL_BACKOFF;

    let (mut write, mut read) = stream.split();

    // Resend everything still waiting, including frames lost with the old socket
    purge(pending);
    let outstanding: Vec<String> = pending.keys().cloned().collect();
    for ip in outstanding {
        if let Err(e) = write.send(Message::Text(ip)).await {
            return Disconnect::Lost(e.to_string());
        }
    }

    let mut sweep = interval(settings.sweep_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    sweep.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.close().await;
                return Disconnect::Shutdown;
            }
            _ = sweep.tick() => purge(pending),
            request = rx.recv() => {
                let Some(request) = request else {
                    let _ = write.close().await;
                    return Disconnect::Shutdown;
                };
                let ip = request.ip.clone();
                if enqueue(pending, request)
                    && let Err(e) = write.send(Message::Text(ip)).await
                {
                    return Disconnect::Lost(e.to_string());
                }
            }
            frame = read.next() => {
                let Some(frame) = frame else {
                    return Disconnect::Lost("stream ended".into());
                };
                match frame {
                    Ok(Message::Text(text)) => dispatch(pending, &text),
                    Ok(Message::Ping(payload)) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Ok(Message::Close(frame)) => {
                        return Disconnect::Lost(format!("closed by server: {:?}", frame));
                    }
                    Ok(_) => {}
                    Err(e) => return Disconnect::Lost(e.to_string()),
                }
            }
        }
    }
}
