// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The launch pipeline
//!
//! preconditions → backend and credential resolution → Ollama check →
//! image build → handoff. Each step runs once, in order.

use async_trait::async_trait;
use std::convert::Infallible;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{names, suggest, Backend, Defaults, LaunchMode, RunConfiguration, Secret};
use crate::docker::{CompanionContainer, ContainerState, DockerRuntime};
use crate::handoff::Invocation;
use crate::ollama::{self, Availability, LocalServer, OllamaClient, ServiceProbe, SETTLE_DELAY};
use crate::preflight::Preconditions;
use crate::prompt::Prompter;
use crate::resolve::{self, is_loopback_url, EnvSnapshot, Field, Resolver};
use crate::Result;

/// Settings that shape a launch but are not part of the app's environment
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub mode: LaunchMode,
    pub workdir: PathBuf,
    pub docker: DockerRuntime,
    /// Reuse the existing image instead of building
    pub skip_build: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            mode: LaunchMode::default(),
            workdir: PathBuf::from("."),
            docker: DockerRuntime::default(),
            skip_build: false,
        }
    }
}

/// Best-effort check that the Ollama server for a launch is up
#[async_trait(?Send)]
pub trait OllamaCheck {
    async fn check(&self, host: &str, model: &str, prompter: &mut dyn Prompter) -> Result<Availability>;
}

/// Probes over HTTP and offers to start a local server or companion container
pub struct LiveOllamaCheck {
    mode: LaunchMode,
    docker: DockerRuntime,
    settle: Duration,
}

impl LiveOllamaCheck {
    pub fn new(mode: LaunchMode, docker: DockerRuntime) -> Self {
        Self { mode, docker, settle: SETTLE_DELAY }
    }

    /// URL reachable from this machine for a host the app will use
    fn probe_url(&self, host: &str) -> String {
        match self.mode {
            LaunchMode::DockerOllama => format!("http://localhost:{}", names::OLLAMA_PORT),
            _ => host.to_string(),
        }
    }
}

#[async_trait(?Send)]
impl OllamaCheck for LiveOllamaCheck {
    async fn check(&self, host: &str, model: &str, prompter: &mut dyn Prompter) -> Result<Availability> {
        let client = OllamaClient::new(&self.probe_url(host))?;

        let availability = match self.mode {
            LaunchMode::DockerOllama => {
                check_companion(&self.docker, &client, prompter, self.settle).await?
            }
            LaunchMode::Local | LaunchMode::Docker if is_loopback_url(host) => {
                let starter = LocalServer::default();
                ollama::ensure_available(&client, &starter, prompter, self.settle).await?
            }
            // A server on another machine cannot be started from here
            LaunchMode::Local | LaunchMode::Docker => {
                if client.is_reachable().await {
                    info!("Ollama is running at {}", client.base_url());
                    Availability::Reachable
                } else {
                    warn!("Ollama is not reachable at {}; continuing anyway", client.base_url());
                    Availability::Unreachable
                }
            }
        };

        if availability != Availability::Unreachable {
            ollama::warn_if_model_missing(&client, model).await;
        }
        Ok(availability)
    }
}

/// Companion mode needs the `panopticon-ollama` container itself, not just
/// something answering on the Ollama port: the app reaches it by name.
pub async fn check_companion(
    docker: &DockerRuntime,
    probe: &dyn ServiceProbe,
    prompter: &mut dyn Prompter,
    settle: Duration,
) -> Result<Availability> {
    let starter = CompanionContainer::new(docker.clone());
    match docker.container_state(names::OLLAMA_CONTAINER) {
        Ok(Some(ContainerState::Running)) => {
            ollama::ensure_available(probe, &starter, prompter, settle).await
        }
        state => {
            if let Err(e) = state {
                debug!("Cannot inspect '{}': {}", names::OLLAMA_CONTAINER, e);
            }
            warn!("Container '{}' is not running", names::OLLAMA_CONTAINER);
            let reason = format!("The '{}' container is not running.", names::OLLAMA_CONTAINER);
            ollama::offer_start(probe, &starter, prompter, &reason, settle).await
        }
    }
}

/// One launch, from preconditions to handoff
pub struct Launcher {
    options: LaunchOptions,
    resolver: Resolver,
}

impl Launcher {
    pub fn new(options: LaunchOptions, defaults: Defaults, env: EnvSnapshot) -> Self {
        Self {
            options,
            resolver: Resolver::new(defaults, env),
        }
    }

    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    /// Fail fast if a required tool or file is missing
    pub fn preflight(&self) -> Result<()> {
        Preconditions::for_mode(self.options.mode, &self.options.workdir).check()
    }

    fn ollama_host_field(&self) -> Field {
        match self.options.mode {
            LaunchMode::DockerOllama => Field {
                suggestion: Some(suggest::COMPANION_OLLAMA_HOST),
                ..resolve::OLLAMA_HOST
            },
            _ => resolve::OLLAMA_HOST,
        }
    }

    /// Build the run configuration from presets, environment and prompts
    pub async fn resolve(
        &mut self,
        prompter: &mut dyn Prompter,
        check: &dyn OllamaCheck,
    ) -> Result<RunConfiguration> {
        let backends = self.resolver.select_backends(prompter)?;
        info!("Backends: {}", backends);

        let (openai_api_key, openai_model) = if backends.contains(Backend::OpenAi) {
            let key = self.resolver.resolve(&resolve::OPENAI_API_KEY, prompter)?;
            if key.is_none() {
                warn!("OpenAI selected without an API key; OpenAI calls will fail");
            }
            let model = self.resolver.resolve_required(&resolve::OPENAI_MODEL, prompter)?;
            (key.map(Secret::new), model)
        } else {
            (None, self.resolver.fallback(&resolve::OPENAI_MODEL))
        };

        let (ollama_host, ollama_model) = if backends.contains(Backend::Ollama) {
            let host_field = self.ollama_host_field();
            let host = self.resolver.resolve_required(&host_field, prompter)?;
            let model = self.resolver.resolve_required(&resolve::OLLAMA_MODEL, prompter)?;
            let availability = check.check(&host, &model, prompter).await?;
            debug!("Ollama availability: {:?}", availability);
            (Some(host), model)
        } else {
            (None, self.resolver.fallback(&resolve::OLLAMA_MODEL))
        };

        let pixabay_api_key = self.resolver.resolve(&resolve::PIXABAY_API_KEY, prompter)?;
        if pixabay_api_key.is_none() {
            info!("No Pixabay key; image search disabled");
        }
        let news_api_key = self.resolver.resolve(&resolve::NEWS_API_KEY, prompter)?;
        if news_api_key.is_none() {
            info!("No NewsAPI key; headline scenarios disabled");
        }

        let host_port = self.resolver.resolve_port(prompter)?;
        let use_host_network = self.resolver.resolve_host_network(
            self.options.mode,
            backends,
            ollama_host.as_deref(),
            prompter,
        )?;

        let config = RunConfiguration {
            backends,
            openai_api_key,
            openai_model,
            ollama_host,
            ollama_model,
            pixabay_api_key: pixabay_api_key.map(Secret::new),
            news_api_key: news_api_key.map(Secret::new),
            host_port,
            use_host_network,
        };
        debug!("Resolved {:?}", config);
        Ok(config)
    }

    /// Build the image if needed and assemble the final command
    pub fn prepare_handoff(&self, config: &RunConfiguration) -> Result<Invocation> {
        let options = &self.options;
        if !options.mode.uses_containers() {
            return Ok(Invocation::local(config, &options.workdir));
        }

        if options.skip_build {
            info!("Skipping image build");
        } else {
            options.docker.build(&options.workdir, names::IMAGE)?;
        }
        if options.mode == LaunchMode::DockerOllama {
            options.docker.ensure_network(names::NETWORK)?;
        }
        options.docker.remove_container(names::CONTAINER)?;

        Ok(Invocation::container(
            config,
            options.mode,
            options.docker.bin(),
            &options.workdir,
            std::io::stdin().is_terminal(),
        ))
    }

    /// Run the whole pipeline. Only returns on failure.
    pub async fn run(
        mut self,
        prompter: &mut dyn Prompter,
        check: &dyn OllamaCheck,
    ) -> Result<Infallible> {
        self.preflight()?;
        let config = self.resolve(prompter, check).await?;
        info!(
            "Open http://localhost:{} once the app is up",
            config.host_port
        );
        self.prepare_handoff(&config)?.exec()
    }
}
