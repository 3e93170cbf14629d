// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ollama availability checks
//!
//! Reachability is best effort: an unreachable server is reported, one start
//! attempt is offered, and the launch continues whatever the outcome.

use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::prompt::Prompter;
use crate::{LauncherError, Result};

/// Timeout for a single health request
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait between starting a server and checking it again
pub const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Where a locally started `ollama serve` writes its output
pub const SERVER_LOG: &str = "/tmp/ollama.log";

/// Something that can be asked whether it is up
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    /// Human readable target, for messages
    fn target(&self) -> &str;

    async fn is_reachable(&self) -> bool;
}

/// Something that can bring the model server up in the background
pub trait ServerStarter {
    fn describe(&self) -> String;

    /// Start the server without waiting for it
    fn start(&self) -> Result<()>;
}

/// Outcome of [`ensure_available`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Reachable on the first probe
    Reachable,
    /// Reachable after a start attempt
    Started,
    /// Still not reachable; the launch goes on regardless
    Unreachable,
}

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(HEALTH_TIMEOUT).build()?;

        // Normalize URL; Ollama's own OLLAMA_HOST form is a bare host:port
        let base_url = base_url
            .trim()
            .trim_end_matches('/')
            .trim_end_matches("/api/tags");
        let base_url = if base_url.contains("://") {
            base_url.to_string()
        } else {
            format!("http://{}", base_url)
        };

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama answers on its tags endpoint
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);

        self.client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                LauncherError::Runtime(format!(
                    "Cannot connect to Ollama at {}: {}",
                    self.base_url, e
                ))
            })?;

        Ok(())
    }

    /// List pulled models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if a specific model has been pulled
    pub async fn model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m == model || m.strip_suffix(":latest") == Some(model)))
    }
}

#[async_trait]
impl ServiceProbe for OllamaClient {
    fn target(&self) -> &str {
        &self.base_url
    }

    async fn is_reachable(&self) -> bool {
        match self.health_check().await {
            Ok(()) => true,
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }
}

/// `ollama serve` started on this machine, detached from the launcher
pub struct LocalServer {
    program: PathBuf,
    log_path: PathBuf,
}

impl LocalServer {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("ollama"),
            log_path: log_path.into(),
        }
    }

    /// Use another `ollama` executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for LocalServer {
    fn default() -> Self {
        Self::new(SERVER_LOG)
    }
}

impl ServerStarter for LocalServer {
    fn describe(&self) -> String {
        format!("a local Ollama server (`ollama serve`, log: {})", self.log_path.display())
    }

    fn start(&self) -> Result<()> {
        if which::which(&self.program).is_err() {
            return Err(LauncherError::Precondition(format!(
                "'{}' is not installed or not on PATH",
                self.program.display()
            )));
        }

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(
            log,
            "--- ollama serve started by panopticon-launch at {} ---",
            Local::now().to_rfc3339()
        )?;
        let stderr = log.try_clone()?;

        // The shell backgrounds the server and exits at once. It is reaped
        // here and the server is re-parented to init, so the process that
        // later replaces the launcher never inherits an unreaped child.
        #[cfg(unix)]
        let mut command = {
            use std::os::unix::process::CommandExt;
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg("\"$0\" serve &")
                .arg(&self.program)
                // Own process group, so an interrupt aimed at the app leaves it running
                .process_group(0);
            command
        };
        #[cfg(not(unix))]
        let mut command = {
            let mut command = Command::new(&self.program);
            command.arg("serve");
            command
        };
        command.stdin(Stdio::null()).stdout(log).stderr(stderr);

        #[cfg(unix)]
        {
            let status = command.status()?;
            if !status.success() {
                return Err(LauncherError::Runtime(format!(
                    "Could not launch ollama serve: {}",
                    status
                )));
            }
        }
        #[cfg(not(unix))]
        command.spawn()?;

        info!("Started ollama serve in the background, logging to {:?}", self.log_path);
        Ok(())
    }
}

/// Probe the server, offer one start attempt, probe once more.
///
/// Only a failed prompt is an error; every other outcome is an [`Availability`].
pub async fn ensure_available(
    probe: &dyn ServiceProbe,
    starter: &dyn ServerStarter,
    prompter: &mut dyn Prompter,
    settle: Duration,
) -> Result<Availability> {
    if probe.is_reachable().await {
        info!("Ollama is running at {}", probe.target());
        return Ok(Availability::Reachable);
    }

    warn!("Ollama is not reachable at {}", probe.target());
    offer_start(probe, starter, prompter, "Ollama is not reachable.", settle).await
}

/// Offer one start attempt, then probe once more.
///
/// `reason` opens the question shown to the user.
pub async fn offer_start(
    probe: &dyn ServiceProbe,
    starter: &dyn ServerStarter,
    prompter: &mut dyn Prompter,
    reason: &str,
    settle: Duration,
) -> Result<Availability> {
    let question = format!("{} Start {}?", reason, starter.describe());
    if !prompter.confirm(&question, true)? {
        warn!("Continuing without a running Ollama server");
        return Ok(Availability::Unreachable);
    }

    if let Err(e) = starter.start() {
        warn!("Could not start Ollama: {}", e);
        return Ok(Availability::Unreachable);
    }

    tokio::time::sleep(settle).await;

    if probe.is_reachable().await {
        info!("Ollama is now running at {}", probe.target());
        Ok(Availability::Started)
    } else {
        warn!(
            "Ollama is still not reachable at {}; continuing anyway",
            probe.target()
        );
        Ok(Availability::Unreachable)
    }
}

/// Warn when the chosen model has not been pulled yet
pub async fn warn_if_model_missing(client: &OllamaClient, model: &str) {
    match client.model_available(model).await {
        Ok(true) => info!("Model '{}' available", model),
        Ok(false) => warn!("Model '{}' not found on {}. Try: ollama pull {}", model, client.base_url(), model),
        Err(e) => debug!("Could not list models: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Answers from a fixed list, one per probe
    struct FakeProbe {
        answers: Mutex<Vec<bool>>,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(answers: &[bool]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ServiceProbe for FakeProbe {
        fn target(&self) -> &str {
            "http://localhost:11434"
        }

        async fn is_reachable(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers.lock().unwrap().pop().unwrap_or(false)
        }
    }

    struct FakeStarter {
        fail: bool,
        starts: AtomicUsize,
    }

    impl FakeStarter {
        fn new(fail: bool) -> Self {
            Self { fail, starts: AtomicUsize::new(0) }
        }
    }

    impl ServerStarter for FakeStarter {
        fn describe(&self) -> String {
            "a fake server".to_string()
        }

        fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LauncherError::Precondition("no ollama".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_client_url_normalization() {
        let client = OllamaClient::new("http://localhost:11434/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");

        let client = OllamaClient::new("http://localhost:11434/api/tags").unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");

        let client = OllamaClient::new("127.0.0.1:11434").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:11434");

        let client = OllamaClient::new("https://gpu-box.lan").unwrap();
        assert_eq!(client.base_url(), "https://gpu-box.lan");
    }

    #[tokio::test]
    async fn test_schemeless_host_is_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": []
            })))
            .mount(&server)
            .await;

        // host:port, the way `ollama` itself reads OLLAMA_HOST
        let client = OllamaClient::new(&server.address().to_string()).unwrap();
        assert!(client.is_reachable().await);
    }

    #[tokio::test]
    async fn test_probe_against_live_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "tinyllama:latest"}, {"name": "llama3:8b"}]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&server.uri()).unwrap();
        assert!(client.is_reachable().await);
        assert!(client.model_available("tinyllama").await.unwrap());
        assert!(client.model_available("llama3:8b").await.unwrap());
        assert!(!client.model_available("llama3").await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_against_closed_port() {
        // Grab a free port, then close it
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = OllamaClient::new(&format!("http://127.0.0.1:{}", port)).unwrap();
        assert!(!client.is_reachable().await);
    }

    #[tokio::test]
    async fn test_reachable_first_time_asks_nothing() {
        let probe = FakeProbe::new(&[true]);
        let starter = FakeStarter::new(false);
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());

        let result = ensure_available(&probe, &starter, &mut prompter, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(result, Availability::Reachable);
        assert_eq!(starter.starts.load(Ordering::SeqCst), 0);
        assert!(prompter.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_declined_start_continues() {
        let probe = FakeProbe::new(&[false]);
        let starter = FakeStarter::new(false);
        let mut prompter = ScriptedPrompter::new(["n"]);

        let result = ensure_available(&probe, &starter, &mut prompter, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(result, Availability::Unreachable);
        assert_eq!(starter.starts.load(Ordering::SeqCst), 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_then_single_reprobe() {
        let probe = FakeProbe::new(&[false, true]);
        let starter = FakeStarter::new(false);
        let mut prompter = ScriptedPrompter::new(["y"]);

        let result = ensure_available(&probe, &starter, &mut prompter, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(result, Availability::Started);
        assert_eq!(starter.starts.load(Ordering::SeqCst), 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_never_retries_more_than_once() {
        let probe = FakeProbe::new(&[false, false, true]);
        let starter = FakeStarter::new(false);
        let mut prompter = ScriptedPrompter::new([""]);

        let result = ensure_available(&probe, &starter, &mut prompter, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(result, Availability::Unreachable);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_start_is_not_fatal() {
        let probe = FakeProbe::new(&[false]);
        let starter = FakeStarter::new(true);
        let mut prompter = ScriptedPrompter::new(["y"]);

        let result = ensure_available(&probe, &starter, &mut prompter, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(result, Availability::Unreachable);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_local_server_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let server = LocalServer::new(dir.path().join("ollama.log"))
            .with_program(dir.path().join("no-such-ollama"));
        assert!(matches!(server.start(), Err(LauncherError::Precondition(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_local_server_runs_in_background() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("ollama");
        std::fs::write(&program, "#!/bin/sh\necho \"fake ollama $1\"\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        let log_path = dir.path().join("ollama.log");

        LocalServer::new(&log_path).with_program(&program).start().unwrap();

        // The server writes after the wrapper shell has already been reaped
        let mut log = String::new();
        for _ in 0..50 {
            log = std::fs::read_to_string(&log_path).unwrap_or_default();
            if log.contains("fake ollama serve") {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(log.contains("started by panopticon-launch"));
        assert!(log.contains("fake ollama serve"));
    }

    #[tokio::test]
    async fn test_offer_start_when_probe_answers() {
        let probe = FakeProbe::new(&[true]);
        let starter = FakeStarter::new(false);
        let mut prompter = ScriptedPrompter::new(["y"]);

        let result = offer_start(&probe, &starter, &mut prompter, "Not running.", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(result, Availability::Started);
        assert_eq!(starter.starts.load(Ordering::SeqCst), 1);
        assert!(prompter.transcript().contains("Not running. Start a fake server?"));
    }
}
