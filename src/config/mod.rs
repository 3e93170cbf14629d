// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for the launcher
//!
//! Three layers feed a launch: compiled-in (or file-provided) [`Defaults`],
//! the environment the launcher was started from, and the answers typed at
//! the prompts. The result is a [`RunConfiguration`] that is built once and
//! never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Environment variable names read and exported by the launcher
pub mod env {
    pub const BACKENDS: &str = "PANOPTICON_LLM_BACKENDS";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
    pub const OLLAMA_HOST: &str = "OLLAMA_HOST";
    pub const OLLAMA_MODEL: &str = "OLLAMA_MODEL";
    pub const PIXABAY_API_KEY: &str = "PIXABAY_API_KEY";
    pub const NEWS_API_KEY: &str = "NEWS_API_KEY";
    pub const PORT: &str = "PANOPTICON_PORT";
    pub const STREAMLIT_SERVER_PORT: &str = "STREAMLIT_SERVER_PORT";
}

/// Values offered at the prompts and used when the answer is blank
pub mod suggest {
    pub const OPENAI_MODEL: &str = "gpt-4.1-mini";
    pub const OLLAMA_HOST: &str = "http://localhost:11434";
    /// Ollama as seen from the app container in companion mode
    pub const COMPANION_OLLAMA_HOST: &str = "http://panopticon-ollama:11434";
    pub const OLLAMA_MODEL: &str = "tinyllama";
    pub const HOST_PORT: u16 = 8501;
}

/// Fixed names used by the container variants
pub mod names {
    pub const ENTRY_POINT: &str = "app.py";
    pub const BUILD_FILE: &str = "Dockerfile";
    pub const IMAGE: &str = "panopticon";
    pub const CONTAINER: &str = "panopticon";
    pub const CONTAINER_PORT: u16 = 8501;
    pub const OLLAMA_CONTAINER: &str = "panopticon-ollama";
    pub const OLLAMA_IMAGE: &str = "ollama/ollama";
    pub const OLLAMA_PORT: u16 = 11434;
    pub const NETWORK: &str = "panopticon-net";
    pub const DEFAULTS_FILE: &str = "panopticon.json";
}

/// A selectable LLM provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    OpenAi,
    Ollama,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::OpenAi => "openai",
            Backend::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subset of {openai, ollama}; may be empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendSet {
    openai: bool,
    ollama: bool,
}

impl BackendSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn only(backend: Backend) -> Self {
        Self::none().with(backend)
    }

    pub fn both() -> Self {
        Self { openai: true, ollama: true }
    }

    pub fn with(mut self, backend: Backend) -> Self {
        match backend {
            Backend::OpenAi => self.openai = true,
            Backend::Ollama => self.ollama = true,
        }
        self
    }

    pub fn contains(&self, backend: Backend) -> bool {
        match backend {
            Backend::OpenAi => self.openai,
            Backend::Ollama => self.ollama,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.openai && !self.ollama
    }

    /// Selected backends in a stable order
    pub fn iter(&self) -> impl Iterator<Item = Backend> + '_ {
        [Backend::OpenAi, Backend::Ollama]
            .into_iter()
            .filter(move |b| self.contains(*b))
    }

    /// Comma-joined form exported as `PANOPTICON_LLM_BACKENDS`
    pub fn to_env_value(&self) -> String {
        if self.is_empty() {
            "none".to_string()
        } else {
            self.iter().map(|b| b.as_str()).collect::<Vec<_>>().join(",")
        }
    }
}

impl fmt::Display for BackendSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_env_value())
    }
}

/// How the app is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LaunchMode {
    /// Run `streamlit` directly on this machine
    Local,
    /// Build the image and run it with `docker run`
    #[default]
    Docker,
    /// Like `docker`, with Ollama in a companion container
    DockerOllama,
}

impl LaunchMode {
    pub fn uses_containers(&self) -> bool {
        !matches!(self, LaunchMode::Local)
    }
}

/// A secret that never shows up in `Debug` output or logs
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Resolved environment for one launch
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub backends: BackendSet,
    pub openai_api_key: Option<Secret>,
    pub openai_model: String,
    pub ollama_host: Option<String>,
    pub ollama_model: String,
    pub pixabay_api_key: Option<Secret>,
    pub news_api_key: Option<Secret>,
    pub host_port: u16,
    pub use_host_network: bool,
}

impl RunConfiguration {
    /// Every variable the launcher manages, paired with its value.
    ///
    /// `None` means the variable must be absent from the child's environment,
    /// even if the launcher itself inherited it.
    pub fn env_vars(&self) -> Vec<(&'static str, Option<String>)> {
        let secret = |s: &Option<Secret>| s.as_ref().map(|v| v.expose().to_string());
        vec![
            (env::BACKENDS, Some(self.backends.to_env_value())),
            (env::OPENAI_API_KEY, secret(&self.openai_api_key)),
            (env::OPENAI_MODEL, Some(self.openai_model.clone())),
            (env::OLLAMA_HOST, self.ollama_host.clone()),
            (env::OLLAMA_MODEL, Some(self.ollama_model.clone())),
            (env::PIXABAY_API_KEY, secret(&self.pixabay_api_key)),
            (env::NEWS_API_KEY, secret(&self.news_api_key)),
            (env::PORT, Some(self.host_port.to_string())),
        ]
    }
}

/// Pre-set values that win over the environment and the prompts.
///
/// Blank fields are "not set". Loaded from `panopticon.json` when present.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Defaults {
    pub openai_api_key: String,
    pub openai_model: String,
    pub ollama_host: String,
    pub ollama_model: String,
    pub pixabay_api_key: String,
    pub news_api_key: String,
    pub host_port: Option<u16>,
}

impl Defaults {
    /// Load defaults from a JSON file, falling back to the compiled-in ones
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let defaults: Self = serde_json::from_str(&content).map_err(|e| {
                crate::LauncherError::Config(format!("Failed to parse {:?}: {}", path, e))
            })?;
            Ok(defaults)
        } else {
            tracing::debug!("Defaults file not found at {:?}, using compiled-in defaults", path);
            Ok(Self::default())
        }
    }

    /// Save defaults to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
