// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for the launcher

use thiserror::Error;

/// Result type alias for launcher operations
pub type Result<T> = std::result::Result<T, LauncherError>;

/// Launcher error types
///
/// Only fatal conditions live here. An unreachable model server, a missing
/// optional key or a bad menu entry are logged as warnings and never surface
/// as a `LauncherError`.
#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Missing precondition: {0}")]
    Precondition(String),

    #[error("Image build failed: {0}")]
    Build(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Prompt(String),

    #[error("Failed to hand off to {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
