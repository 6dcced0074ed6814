//! Health monitor
//!
//! A single background task probes the target on a fixed period and folds
//! every outcome into [`Statistics`]. Ticks never overlap: a slow probe
//! delays the next tick instead of running alongside it.
//!
//! Statistics survive `stop`, `start` and `restart`; only
//! [`Monitor::reset_statistics`] clears them.

pub mod probe;
pub mod report;
pub mod stats;

pub use probe::{HttpProbe, Probe, ProbeError, ProbeResponse, DEFAULT_USER_AGENT};
pub use report::{format_size, render, CheckResult};
pub use stats::{Statistics, StatsSnapshot};

use crate::server::FileServer;
use chrono::Local;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Remote target; `None` probes the attached server
    pub target: Option<String>,
    pub interval: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// How long `stop` waits for an in-flight probe
    pub stop_timeout: Duration,
    pub user_agent: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target: None,
            interval: Duration::from_secs(5),
            connect_timeout: probe::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: probe::DEFAULT_READ_TIMEOUT,
            stop_timeout: Duration::from_secs(3),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Set the target; blank means the local server
    pub fn target(mut self, target: impl AsRef<str>) -> Self {
        self.target = normalize_target(target.as_ref());
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Prefix `http://` unless an http(s) scheme is present
pub fn normalize_target(target: &str) -> Option<String> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    if target.starts_with("http://") || target.starts_with("https://") {
        Some(target.to_string())
    } else {
        Some(format!("http://{target}"))
    }
}

/// A resolved probe URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    /// Derived from the attached server rather than configured
    pub local: bool,
}

/// Everything one tick needs; cloned into the background task
struct Ticker<P> {
    probe: Arc<P>,
    stats: Arc<Statistics>,
    /// Held for a whole tick, across sessions, so a tick left running by a
    /// timed-out `stop` never overlaps the next session's first tick
    gate: Arc<tokio::sync::Mutex<()>>,
    configured: Option<String>,
    server: Option<FileServer>,
}

impl<P> Clone for Ticker<P> {
    fn clone(&self) -> Self {
        Self {
            probe: self.probe.clone(),
            stats: self.stats.clone(),
            gate: self.gate.clone(),
            configured: self.configured.clone(),
            server: self.server.clone(),
        }
    }
}

impl<P: Probe> Ticker<P> {
    fn resolve(&self) -> Option<Target> {
        if let Some(url) = &self.configured {
            return Some(Target {
                url: url.clone(),
                local: false,
            });
        }

        let server = self.server.as_ref()?;
        let addr = match server.local_addr() {
            Some(addr) => addr,
            None => server.config().socket_addr().ok()?,
        };
        Some(Target {
            url: format!("http://{}", probe_addr(addr)),
            local: true,
        })
    }

    async fn tick(&self) -> CheckResult {
        let _gate = self.gate.lock().await;
        let checked_at = Local::now();
        let target = self.resolve();

        let outcome = match &target {
            Some(t) => self.probe.check(&t.url).await,
            None => Err(ProbeError::NoTarget),
        };

        match &outcome {
            Ok(response) => self
                .stats
                .record_success(response.latency.as_millis() as u64),
            Err(_) => self.stats.record_failure(),
        }

        let result = CheckResult {
            target,
            checked_at,
            outcome,
        };
        info!("\n{}", render(&result, &self.stats.snapshot()));
        result
    }
}

/// Unspecified bind addresses are probed over loopback
fn probe_addr(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

struct Session {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic health monitor
pub struct Monitor<P = HttpProbe> {
    config: MonitorConfig,
    ticker: Ticker<P>,
    session: tokio::sync::Mutex<Option<Session>>,
    running: AtomicBool,
}

impl Monitor<HttpProbe> {
    pub fn new(config: MonitorConfig) -> Self {
        let probe = HttpProbe::new(
            config.connect_timeout,
            config.read_timeout,
            config.user_agent.clone(),
        );
        Self::with_probe(config, probe)
    }
}

impl<P: Probe> Monitor<P> {
    pub fn with_probe(config: MonitorConfig, probe: P) -> Self {
        Self {
            ticker: Ticker {
                probe: Arc::new(probe),
                stats: Arc::new(Statistics::new()),
                gate: Arc::new(tokio::sync::Mutex::new(())),
                configured: config.target.clone(),
                server: None,
            },
            config,
            session: tokio::sync::Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Probe this server when no target is configured
    pub fn local_server(mut self, server: FileServer) -> Self {
        self.ticker.server = Some(server);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn statistics(&self) -> StatsSnapshot {
        self.ticker.stats.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.ticker.stats.reset();
    }

    /// URL the next tick will probe
    pub fn target(&self) -> Option<Target> {
        self.ticker.resolve()
    }

    /// Run one check outside the schedule
    pub async fn check_now(&self) -> CheckResult {
        self.ticker.tick().await
    }

    /// Begin probing; the first check runs immediately
    pub async fn start(&self) {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run(
            self.ticker.clone(),
            self.config.interval,
            token.clone(),
        ));
        *session = Some(Session { token, handle });
        self.running.store(true, Ordering::SeqCst);

        match self.target() {
            Some(t) => info!(
                target_url = %t.url,
                interval = ?self.config.interval,
                "monitor started"
            ),
            None => warn!("monitor started without a target"),
        }
    }

    /// Cancel the timer and wait a bounded time for an in-flight check
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        let Some(Session { token, handle }) = session.take() else {
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        token.cancel();
        match time::timeout(self.config.stop_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "monitor task ended abnormally"),
            Err(_) => warn!(
                timeout = ?self.config.stop_timeout,
                "check still in flight, monitor stopped anyway"
            ),
        }
        info!("monitor stopped");
    }

    pub async fn restart(&self) {
        self.stop().await;
        self.start().await;
    }
}

async fn run<P: Probe>(ticker: Ticker<P>, period: Duration, token: CancellationToken) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                ticker.tick().await;
            }
        }
    }
}
