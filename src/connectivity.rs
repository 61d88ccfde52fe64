//! Decides once per run whether the quiz service can be reached.
//!
//! The verdict is computed from the configured base address and the host the
//! client itself is served from. A deployed client pointing at loopback, or at
//! nothing at all, is reported as not configured without touching the network.
//! Otherwise a single `GET /health` settles the state.

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use log::{info, warn};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_VAR: &str = "QUIZ_API_URL";

const LOOPBACK_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Local,
    Deployed,
}

impl Context {
    pub fn of_host(host: &str) -> Self {
        let host = host.trim();
        if LOOPBACK_NAMES.iter().any(|name| host.eq_ignore_ascii_case(name)) {
            Context::Local
        } else {
            Context::Deployed
        }
    }
}

/// The service address the client talks to, with what is known about it
/// before any request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub explicitly_configured: bool,
    pub client_host: String,
    pub context: Context,
}

impl Endpoint {
    pub fn resolve(configured: Option<&str>, client_host: &str) -> Self {
        let configured = configured.map(str::trim).filter(|v| !v.is_empty());
        Self {
            base_url: configured.unwrap_or(DEFAULT_API_URL).to_string(),
            explicitly_configured: configured.is_some(),
            client_host: client_host.to_string(),
            context: Context::of_host(client_host),
        }
    }

    /// Explicitly set, not loopback, and served over http(s).
    pub fn plausibly_configured(&self) -> bool {
        let lowered = self.base_url.to_ascii_lowercase();
        self.explicitly_configured
            && !LOOPBACK_NAMES.iter().any(|name| lowered.contains(name))
            && (lowered.starts_with("http://") || lowered.starts_with("https://"))
    }

    /// A deployed client without a plausible address has no service to talk to.
    pub fn is_misconfigured(&self) -> bool {
        self.context == Context::Deployed && !self.plausibly_configured()
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Checking,
    Connected,
    NotConfigured,
    Error,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectivityState::Checking => "checking",
            ConnectivityState::Connected => "connected",
            ConnectivityState::NotConfigured => "not-configured",
            ConnectivityState::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error("health check answered with HTTP {0}")]
    Status(u16),
    #[error("health check failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, health_url: &str) -> Result<(), ProbeFailure>;
}

pub struct HttpHealthProbe {
    http: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, health_url: &str) -> Result<(), ProbeFailure> {
        let resp = self
            .http
            .get(health_url)
            .send()
            .await
            .map_err(|e| ProbeFailure::Transport(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ProbeFailure::Status(resp.status().as_u16()))
        }
    }
}

#[derive(Debug, Clone)]
struct Verdict {
    state: ConnectivityState,
    reason: String,
}

/// What to show the user when the service is not usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub title: &'static str,
    pub address: String,
    pub reason: String,
    pub hints: Vec<String>,
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "Backend URL: {}", self.address)?;
        writeln!(f, "{}", self.reason)?;
        for hint in &self.hints {
            write!(f, "\n• {}", hint)?;
        }
        Ok(())
    }
}

/// Holds the connectivity verdict. It reads `Checking` until a verdict is
/// reached (at construction or in [`run`]) and never changes after that.
///
/// [`run`]: ConnectivityMonitor::run
pub struct ConnectivityMonitor {
    endpoint: Endpoint,
    verdict: OnceLock<Verdict>,
}

impl ConnectivityMonitor {
    /// Classifies `endpoint` right away. A misconfigured deployment is
    /// settled as `NotConfigured` here and never reaches the probe.
    pub fn new(endpoint: Endpoint) -> Self {
        let monitor = Self {
            endpoint,
            verdict: OnceLock::new(),
        };
        if monitor.endpoint.is_misconfigured() {
            let reason = if monitor.endpoint.explicitly_configured {
                format!(
                    "{} points at a local or non-http address, which a deployed client cannot reach.",
                    API_URL_VAR
                )
            } else {
                format!("{} is not set, so the local default is in use.", API_URL_VAR)
            };
            monitor.settle(ConnectivityState::NotConfigured, reason);
        }
        monitor
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectivityState {
        self.verdict
            .get()
            .map(|v| v.state)
            .unwrap_or(ConnectivityState::Checking)
    }

    /// Requests are pointless only when the client is known to be misconfigured.
    pub fn permits_requests(&self) -> bool {
        self.state() != ConnectivityState::NotConfigured
    }

    /// Probes the service once. Does nothing if a verdict already exists.
    pub async fn run(&self, probe: &dyn HealthProbe) -> ConnectivityState {
        if let Some(verdict) = self.verdict.get() {
            return verdict.state;
        }

        let health_url = self.endpoint.url("health");
        info!("Probing {}", health_url);
        match probe.probe(&health_url).await {
            Ok(()) => self.settle(ConnectivityState::Connected, "Backend is healthy.".to_string()),
            Err(failure) => self.settle(ConnectivityState::Error, failure.to_string()),
        }
    }

    fn settle(&self, state: ConnectivityState, reason: String) -> ConnectivityState {
        match self.verdict.set(Verdict { state, reason }) {
            Ok(()) => {
                match state {
                    ConnectivityState::Connected => {
                        info!("Backend at {} is {}", self.endpoint.base_url, state)
                    }
                    _ => warn!("Backend at {} is {}", self.endpoint.base_url, state),
                }
                state
            }
            Err(_) => {
                warn!("Connectivity already settled, ignoring late {} verdict", state);
                self.state()
            }
        }
    }

    pub fn diagnosis(&self) -> Option<Diagnosis> {
        let verdict = self.verdict.get()?;
        let address = self.endpoint.base_url.clone();
        match verdict.state {
            ConnectivityState::Checking | ConnectivityState::Connected => None,
            ConnectivityState::NotConfigured => Some(Diagnosis {
                title: "⚠️ Backend not configured",
                address,
                reason: verdict.reason.clone(),
                hints: vec![
                    "Deploy the quiz backend somewhere reachable".to_string(),
                    format!("Set {} to its public http(s) URL", API_URL_VAR),
                    "Restart the bot".to_string(),
                ],
            }),
            ConnectivityState::Error => Some(Diagnosis {
                title: "❌ Cannot connect to backend",
                address,
                reason: verdict.reason.clone(),
                hints: vec![
                    "Backend server is not running".to_string(),
                    "Backend URL is incorrect".to_string(),
                    "Backend is not reachable from this host".to_string(),
                    "Check backend logs for errors".to_string(),
                ],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProbe {
        healthy: bool,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(healthy: bool) -> Self {
            Self {
                healthy,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        async fn probe(&self, _health_url: &str) -> Result<(), ProbeFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy {
                Ok(())
            } else {
                Err(ProbeFailure::Transport("connection refused".to_string()))
            }
        }
    }

    #[test]
    fn resolves_default_address() {
        let endpoint = Endpoint::resolve(Some("  "), "localhost");

        assert_eq!(endpoint.base_url, DEFAULT_API_URL);
        assert!(!endpoint.explicitly_configured);
        assert_eq!(endpoint.context, Context::Local);
        assert!(!endpoint.plausibly_configured());
        assert!(!endpoint.is_misconfigured());
    }

    #[test]
    fn classifies_addresses() {
        let host = "quizapp.example.com";
        assert!(Endpoint::resolve(Some("https://api.example.com"), host).plausibly_configured());
        assert!(Endpoint::resolve(Some("HTTP://api.example.com"), host).plausibly_configured());
        assert!(!Endpoint::resolve(Some("api.example.com"), host).plausibly_configured());
        assert!(!Endpoint::resolve(Some("http://127.0.0.1:8000"), host).plausibly_configured());
        assert_eq!(Context::of_host("127.0.0.1"), Context::Local);
        assert_eq!(Context::of_host(host), Context::Deployed);
    }

    #[test]
    fn loopback_host_ignores_case() {
        assert_eq!(Context::of_host("LOCALHOST"), Context::Local);
        assert_eq!(Context::of_host(" LocalHost "), Context::Local);

        let endpoint = Endpoint::resolve(None, "LOCALHOST");
        assert_eq!(endpoint.context, Context::Local);
        assert!(!endpoint.is_misconfigured());
        assert!(ConnectivityMonitor::new(endpoint).permits_requests());
    }

    #[test]
    fn joins_paths_without_double_slash() {
        let endpoint = Endpoint::resolve(Some("https://api.example.com/"), "localhost");

        assert_eq!(endpoint.url("/health"), "https://api.example.com/health");
        assert_eq!(endpoint.url("quiz/3"), "https://api.example.com/quiz/3");
    }

    #[tokio::test]
    async fn local_default_is_probed() {
        let monitor = ConnectivityMonitor::new(Endpoint::resolve(None, "localhost"));
        let probe = FakeProbe::new(true);
        assert_eq!(monitor.state(), ConnectivityState::Checking);

        let state = monitor.run(&probe).await;

        assert_eq!(state, ConnectivityState::Connected);
        assert_eq!(probe.calls(), 1);
        assert_eq!(monitor.diagnosis(), None);
    }

    #[tokio::test]
    async fn deployed_loopback_is_not_configured_without_probe() {
        let monitor = ConnectivityMonitor::new(Endpoint::resolve(
            Some("http://localhost:8000"),
            "quizapp.example.com",
        ));
        let probe = FakeProbe::new(true);
        assert_eq!(monitor.state(), ConnectivityState::NotConfigured);

        let state = monitor.run(&probe).await;

        assert_eq!(state, ConnectivityState::NotConfigured);
        assert_eq!(probe.calls(), 0);
        assert!(!monitor.permits_requests());
        let diagnosis = monitor.diagnosis().unwrap();
        assert_eq!(diagnosis.address, "http://localhost:8000");
    }

    #[tokio::test]
    async fn deployed_with_healthy_backend_connects() {
        let monitor = ConnectivityMonitor::new(Endpoint::resolve(
            Some("https://api.example.com"),
            "quizapp.example.com",
        ));

        assert_eq!(
            monitor.run(&FakeProbe::new(true)).await,
            ConnectivityState::Connected
        );
    }

    #[tokio::test]
    async fn failed_probe_is_error_and_final() {
        let monitor = ConnectivityMonitor::new(Endpoint::resolve(
            Some("https://api.example.com"),
            "quizapp.example.com",
        ));

        assert_eq!(
            monitor.run(&FakeProbe::new(false)).await,
            ConnectivityState::Error
        );
        assert!(monitor.permits_requests());
        assert!(monitor.diagnosis().unwrap().reason.contains("connection refused"));

        // Terminal: a later run neither probes nor changes the verdict.
        let second = FakeProbe::new(true);
        assert_eq!(monitor.run(&second).await, ConnectivityState::Error);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn http_probe_reports_status_and_refusal() {
        let probe = HttpHealthProbe::new(test_support::http_client());

        let healthy = test_support::respond(200, r#"{"status":"healthy"}"#).await;
        assert!(probe.probe(&format!("{}/health", healthy)).await.is_ok());

        let broken = test_support::respond(503, "").await;
        assert!(matches!(
            probe.probe(&format!("{}/health", broken)).await,
            Err(ProbeFailure::Status(503))
        ));

        let closed = test_support::closed_address().await;
        let monitor = ConnectivityMonitor::new(Endpoint::resolve(Some(&closed), "localhost"));
        assert_eq!(monitor.run(&probe).await, ConnectivityState::Error);
    }
}
