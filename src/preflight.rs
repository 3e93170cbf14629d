// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Precondition checks run before anything is asked or started

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{names, LaunchMode};
use crate::{LauncherError, Result};

/// External tools and files a launch depends on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preconditions {
    files: Vec<PathBuf>,
    tools: Vec<String>,
}

impl Preconditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requirements for a launch mode, relative to the working directory
    pub fn for_mode(mode: LaunchMode, workdir: &Path) -> Self {
        let checks = Self::new().file(workdir.join(names::ENTRY_POINT));
        match mode {
            LaunchMode::Local => checks.tool("streamlit"),
            LaunchMode::Docker | LaunchMode::DockerOllama => {
                checks.file(workdir.join(names::BUILD_FILE)).tool("docker")
            }
        }
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tools.push(name.into());
        self
    }

    /// Fail on the first missing file or tool
    pub fn check(&self) -> Result<()> {
        for file in &self.files {
            if !file.is_file() {
                return Err(LauncherError::Precondition(format!(
                    "{} not found",
                    file.display()
                )));
            }
            debug!("Found {}", file.display());
        }

        for tool in &self.tools {
            let path = which::which(tool).map_err(|_| {
                LauncherError::Precondition(format!("'{}' is not installed or not on PATH", tool))
            })?;
            debug!("Found {} at {}", tool, path.display());
        }

        info!("Preconditions satisfied");
        Ok(())
    }
}

/// Whether an executable can be found on PATH
pub fn tool_available(name: &str) -> bool {
    which::which(name).is_ok()
}
