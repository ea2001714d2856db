// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use duration_str::deserialize_duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use typedrpc_schema::Mode;

use crate::client::DEFAULT_TIMEOUT;
use crate::errors::{Result, RpcError};

fn from_yaml<T: DeserializeOwned>(yaml: &str) -> Result<T> {
    serde_yaml::from_str(yaml).map_err(|e| RpcError::Config(e.to_string()))
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClientConfig {
    /// gRPC endpoint of the server, e.g. `http://localhost:50051`
    pub endpoint: String,

    /// how long a call may take, "1s" if not set
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl ClientConfig {
    pub fn with_endpoint(endpoint: &str) -> Self {
        ClientConfig {
            endpoint: endpoint.to_string(),
            timeout: default_timeout(),
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        ClientConfig { timeout, ..self }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        from_yaml(yaml)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ProcedureConfig {
    /// overrides the service mode for this procedure
    #[serde(default)]
    pub mode: Option<Mode>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// mode of every procedure without an override
    #[serde(default)]
    pub mode: Mode,

    /// package of the generated schema, derived from the service name if not set
    #[serde(default)]
    pub package: Option<String>,

    #[serde(default)]
    pub procedures: HashMap<String, ProcedureConfig>,
}

impl ServiceConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        from_yaml(yaml)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// per-service configuration, by service name
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
}

impl ServerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        from_yaml(yaml)
    }

    /// Configuration of `service`, the default one if not listed.
    pub fn service(&self, service: &str) -> ServiceConfig {
        self.services.get(service).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config() {
        let config = ClientConfig::from_yaml("endpoint: http://localhost:50051\n").unwrap();
        assert_eq!(config, ClientConfig::with_endpoint("http://localhost:50051"));
        assert_eq!(config.timeout, Duration::from_secs(1));

        let config =
            ClientConfig::from_yaml("endpoint: http://localhost:50051\ntimeout: 250ms\n").unwrap();
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_duration() {
        let err = ClientConfig::from_yaml("endpoint: x\ntimeout: soon\n").unwrap_err();
        assert!(matches!(err, RpcError::Config(_)));
    }

    #[test]
    fn test_server_config() {
        let yaml = r#"
services:
  ExampleService:
    mode: passthrough
    package: example
    procedures:
      ping:
        mode: structured
      echo: {}
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();
        let service = config.service("ExampleService");
        assert_eq!(service.mode, Mode::Passthrough);
        assert_eq!(service.package.as_deref(), Some("example"));
        assert_eq!(service.procedures["ping"].mode, Some(Mode::Structured));
        assert_eq!(service.procedures["echo"].mode, None);

        assert_eq!(config.service("Other"), ServiceConfig::default());
    }
}
