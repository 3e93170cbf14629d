// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Container runtime calls
//!
//! Every operation is a blocking call to the `docker` CLI. Build failures are
//! fatal; container bookkeeping is keyed by name so reruns never leave
//! duplicates behind.

use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::{debug, info, warn};

use crate::config::names;
use crate::ollama::ServerStarter;
use crate::{LauncherError, Result};

/// State of a named container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
}

/// Parse the output of `docker inspect -f {{.State.Running}}`
pub fn parse_running_flag(stdout: &str) -> Option<ContainerState> {
    match stdout.trim() {
        "true" => Some(ContainerState::Running),
        "false" => Some(ContainerState::Stopped),
        _ => None,
    }
}

/// Arguments for building the app image
pub fn build_args(tag: &str) -> Vec<String> {
    ["build", "-t", tag, "."].iter().map(|s| s.to_string()).collect()
}

/// Arguments for creating the companion Ollama container
pub fn companion_run_args() -> Vec<String> {
    vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        names::OLLAMA_CONTAINER.to_string(),
        "--network".to_string(),
        names::NETWORK.to_string(),
        "-p".to_string(),
        format!("{}:{}", names::OLLAMA_PORT, names::OLLAMA_PORT),
        "-v".to_string(),
        "ollama:/root/.ollama".to_string(),
        names::OLLAMA_IMAGE.to_string(),
    ]
}

/// Thin wrapper around the `docker` binary
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    bin: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerRuntime {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        debug!("{} {}", self.bin, args.join(" "));
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| LauncherError::Runtime(format!("Cannot run {}: {}", self.bin, e)))
    }

    fn succeed(&self, args: &[&str]) -> Result<()> {
        let output = self.output(args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(LauncherError::Runtime(format!(
                "`{} {}` failed: {}",
                self.bin,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    /// Build an image from `dir`, streaming docker's output to the terminal
    pub fn build(&self, dir: &Path, tag: &str) -> Result<()> {
        info!("Building image '{}' from {:?}", tag, dir);
        let status = Command::new(&self.bin)
            .args(build_args(tag))
            .current_dir(dir)
            .status()
            .map_err(|e| LauncherError::Build(format!("Cannot run {}: {}", self.bin, e)))?;

        if !status.success() {
            return Err(LauncherError::Build(format!(
                "`{} build` exited with {}",
                self.bin, status
            )));
        }
        info!("Image '{}' built", tag);
        Ok(())
    }

    /// State of a container, `None` if it does not exist
    pub fn container_state(&self, name: &str) -> Result<Option<ContainerState>> {
        let output = self.output(&["inspect", "-f", "{{.State.Running}}", name])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_running_flag(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Remove a container by name if it exists
    pub fn remove_container(&self, name: &str) -> Result<()> {
        if self.container_state(name)?.is_some() {
            info!("Removing existing container '{}'", name);
            self.succeed(&["rm", "-f", name])?;
        }
        Ok(())
    }

    /// Stop a container by name. Returns whether it was running.
    pub fn stop(&self, name: &str) -> Result<bool> {
        match self.container_state(name)? {
            Some(ContainerState::Running) => {
                self.succeed(&["stop", name])?;
                info!("Stopped '{}'", name);
                Ok(true)
            }
            Some(ContainerState::Stopped) => {
                info!("'{}' is not running", name);
                Ok(false)
            }
            None => {
                info!("No container named '{}'", name);
                Ok(false)
            }
        }
    }

    /// Create a user-defined network unless it already exists
    pub fn ensure_network(&self, name: &str) -> Result<()> {
        let output = self.output(&["network", "inspect", name])?;
        if output.status.success() {
            debug!("Network '{}' exists", name);
            return Ok(());
        }
        info!("Creating network '{}'", name);
        self.succeed(&["network", "create", name])
    }

    /// `NAME<TAB>STATUS` lines for containers whose name contains `filter`
    pub fn ps(&self, filter: &str) -> Result<Vec<String>> {
        let name_filter = format!("name={}", filter);
        let output = self.output(&[
            "ps",
            "-a",
            "--filter",
            &name_filter,
            "--format",
            "{{.Names}}\t{{.Status}}",
        ])?;
        if !output.status.success() {
            return Err(LauncherError::Runtime(format!(
                "`{} ps` failed: {}",
                self.bin,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(String::from)
            .collect())
    }
}

/// Ollama running in its own container next to the app
pub struct CompanionContainer {
    runtime: DockerRuntime,
}

impl CompanionContainer {
    pub fn new(runtime: DockerRuntime) -> Self {
        Self { runtime }
    }
}

impl ServerStarter for CompanionContainer {
    fn describe(&self) -> String {
        format!("the '{}' container", names::OLLAMA_CONTAINER)
    }

    fn start(&self) -> Result<()> {
        self.runtime.ensure_network(names::NETWORK)?;
        match self.runtime.container_state(names::OLLAMA_CONTAINER)? {
            Some(ContainerState::Running) => {
                warn!("'{}' is running but not answering yet", names::OLLAMA_CONTAINER);
                Ok(())
            }
            Some(ContainerState::Stopped) => {
                info!("Starting existing container '{}'", names::OLLAMA_CONTAINER);
                self.runtime.succeed(&["start", names::OLLAMA_CONTAINER])
            }
            None => {
                info!("Creating container '{}'", names::OLLAMA_CONTAINER);
                let args = companion_run_args();
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                self.runtime.succeed(&args)
            }
        }
    }
}
