// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Process handoff
//!
//! The final command is assembled from a [`RunConfiguration`] alone and then
//! replaces the launcher process, so signals reach the app directly.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use crate::config::{env, names, LaunchMode, RunConfiguration};
use crate::{LauncherError, Result};

/// A fully specified command line plus its environment changes
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// `Some` sets the variable, `None` removes it from the inherited environment
    pub env: Vec<(String, Option<String>)>,
    pub workdir: PathBuf,
}

impl Invocation {
    /// `streamlit run app.py` on this machine
    pub fn local(config: &RunConfiguration, workdir: &Path) -> Self {
        Self {
            program: "streamlit".to_string(),
            args: vec![
                "run".to_string(),
                names::ENTRY_POINT.to_string(),
                "--server.port".to_string(),
                config.host_port.to_string(),
            ],
            env: owned_env(config.env_vars()),
            workdir: workdir.to_path_buf(),
        }
    }

    /// `docker run` of the app image.
    ///
    /// Values are exported as bare `-e NAME` flags and travel through the
    /// environment of the docker client, so no secret ends up in argv.
    pub fn container(
        config: &RunConfiguration,
        mode: LaunchMode,
        docker_bin: &str,
        workdir: &Path,
        tty: bool,
    ) -> Self {
        let mut args = strings(&["run", "--rm", if tty { "-it" } else { "-i" }]);
        args.extend(strings(&["--name", names::CONTAINER]));

        let mut vars = owned_env(config.env_vars());

        if config.use_host_network {
            args.extend(strings(&["--network", "host"]));
            vars.push((
                env::STREAMLIT_SERVER_PORT.to_string(),
                Some(config.host_port.to_string()),
            ));
        } else {
            args.push("-p".to_string());
            args.push(format!("{}:{}", config.host_port, names::CONTAINER_PORT));
            if mode == LaunchMode::DockerOllama {
                args.extend(strings(&["--network", names::NETWORK]));
            }
        }

        for (name, value) in &vars {
            if value.is_some() {
                args.push("-e".to_string());
                args.push(name.clone());
            }
        }
        args.push(names::IMAGE.to_string());

        Self {
            program: docker_bin.to_string(),
            args,
            env: vars,
            workdir: workdir.to_path_buf(),
        }
    }

    /// Command line for logs; carries no values from the environment
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).current_dir(&self.workdir);
        for (name, value) in &self.env {
            match value {
                Some(v) => command.env(name, v),
                None => command.env_remove(name),
            };
        }
        command
    }

    /// Replace the current process. Only returns on failure.
    #[cfg(unix)]
    pub fn exec(self) -> Result<Infallible> {
        use std::os::unix::process::CommandExt;

        info!("Handing off to: {}", self.display());
        let source = self.to_command().exec();
        Err(LauncherError::Exec {
            program: self.program,
            source,
        })
    }

    /// Run to completion and exit with the child's code
    #[cfg(not(unix))]
    pub fn exec(self) -> Result<Infallible> {
        info!("Handing off to: {}", self.display());
        let status = self
            .to_command()
            .status()
            .map_err(|source| LauncherError::Exec {
                program: self.program.clone(),
                source,
            })?;
        std::process::exit(status.code().unwrap_or(1));
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn owned_env(vars: Vec<(&'static str, Option<String>)>) -> Vec<(String, Option<String>)> {
    vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
