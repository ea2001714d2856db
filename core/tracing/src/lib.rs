// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Error, Debug)]
pub enum TracingError {
    #[error("invalid filter `{filter}`: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TracingConfiguration {
    /// most verbose level emitted
    #[serde(default = "default_log_level")]
    log_level: String,

    #[serde(default = "default_display_thread_names")]
    display_thread_names: bool,

    #[serde(default = "default_display_thread_ids")]
    display_thread_ids: bool,

    /// per-target directives, e.g. `typedrpc=debug,info`
    #[serde(default = "default_filter")]
    filter: String,
}

impl Default for TracingConfiguration {
    fn default() -> Self {
        TracingConfiguration {
            log_level: default_log_level(),
            display_thread_names: default_display_thread_names(),
            display_thread_ids: default_display_thread_ids(),
            filter: default_filter(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_display_thread_names() -> bool {
    true
}

fn default_display_thread_ids() -> bool {
    false
}

fn default_filter() -> String {
    "info".to_string()
}

// unknown levels fall back to info
fn resolve_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

impl TracingConfiguration {
    pub fn with_log_level(self, log_level: impl Into<String>) -> Self {
        TracingConfiguration {
            log_level: log_level.into(),
            ..self
        }
    }

    pub fn with_display_thread_names(self, display_thread_names: bool) -> Self {
        TracingConfiguration {
            display_thread_names,
            ..self
        }
    }

    pub fn with_display_thread_ids(self, display_thread_ids: bool) -> Self {
        TracingConfiguration {
            display_thread_ids,
            ..self
        }
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        TracingConfiguration {
            filter: filter.into(),
            ..self
        }
    }

    pub fn log_level(&self) -> Level {
        resolve_level(&self.log_level)
    }

    pub fn display_thread_names(&self) -> bool {
        self.display_thread_names
    }

    pub fn display_thread_ids(&self) -> bool {
        self.display_thread_ids
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        EnvFilter::try_new(&self.filter).map_err(|e| TracingError::InvalidFilter {
            filter: self.filter.clone(),
            reason: e.to_string(),
        })
    }

    /// Install a global subscriber logging to stdout.
    pub fn setup_tracing_subscriber(&self) -> Result<(), TracingError> {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_thread_names(self.display_thread_names)
                    .with_thread_ids(self.display_thread_ids),
            )
            .with(self.env_filter()?)
            .with(LevelFilter::from_level(self.log_level()))
            .try_init()
            .map_err(|e| TracingError::AlreadyInstalled(e.to_string()))
    }
}
