// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Panopticon Launcher
//!
//! Resolves API keys, backend selection and ports for the Panopticon web app,
//! checks that the required tools are present, optionally builds the container
//! image, and then replaces itself with the app (or `docker run`).

pub mod config;
pub mod docker;
pub mod error;
pub mod handoff;
pub mod launcher;
pub mod ollama;
pub mod preflight;
pub mod prompt;
pub mod resolve;

pub use config::{Backend, BackendSet, Defaults, LaunchMode, RunConfiguration};
pub use error::{LauncherError, Result};
