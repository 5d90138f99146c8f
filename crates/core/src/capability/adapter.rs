use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcp::{CallToolResult, Implementation, McpClient, McpError, ServerCommand};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use super::{BoundCapability, CapabilityHandler, EffectClassifier, InvocationError};
use crate::domain::capability::Capability;

#[derive(Debug, Error)]
pub enum AdapterError {
  #[error("capability server `{server}` failed to start: {source}")]
  StartupFailure {
    server: String,
    #[source]
    source: McpError,
  },
}

/// Connection to one capability server plus the capabilities it offered at startup.
pub struct CapabilityAdapter {
  client: Arc<McpClient>,
  capabilities: Vec<Capability>,
  call_timeout: Duration,
}

impl CapabilityAdapter {
  /// Launch the server, run the handshake and discover its capabilities.
  /// The process is stopped before any error is returned.
  pub async fn connect(
    command: &ServerCommand,
    classifier: &EffectClassifier,
    handshake_timeout: Duration,
    call_timeout: Duration,
  ) -> Result<Self, AdapterError> {
    let startup_failure = |source| AdapterError::StartupFailure {
      server: command.name.clone(),
      source,
    };
    let client = McpClient::spawn(command, &client_info(), handshake_timeout)
      .await
      .map_err(startup_failure)?;

    let tools = match tokio::time::timeout(handshake_timeout, client.list_tools()).await {
      Ok(Ok(tools)) => tools,
      Ok(Err(err)) => {
        client.shutdown().await;
        return Err(startup_failure(err));
      }
      Err(_) => {
        client.shutdown().await;
        return Err(startup_failure(McpError::HandshakeTimeout {
          server: command.name.clone(),
          timeout: handshake_timeout,
        }));
      }
    };

    let capabilities: Vec<Capability> = tools
      .iter()
      .map(|tool| {
        Capability::from_input_schema(
          tool.name.clone(),
          tool
            .description
            .clone()
            .unwrap_or_else(|| "No description provided.".to_string()),
          &tool.input_schema,
          classifier.classify(tool),
        )
      })
      .collect();

    info!(
      event = "capabilities_discovered",
      server = %command.name,
      count = capabilities.len(),
      mutating = capabilities.iter().filter(|c| c.is_mutating()).count(),
      "capability server ready"
    );

    Ok(Self {
      client: Arc::new(client),
      capabilities,
      call_timeout,
    })
  }

  pub fn name(&self) -> &str {
    self.client.name()
  }

  pub fn list_capabilities(&self) -> &[Capability] {
    &self.capabilities
  }

  /// Wrap a discovered capability into an invocable form.
  pub fn bind(&self, capability: &Capability) -> BoundCapability {
    let handler = Arc::new(RemoteHandler {
      client: Arc::clone(&self.client),
    });
    BoundCapability::new(capability.clone(), handler, self.call_timeout)
  }

  pub fn bind_all(&self) -> Vec<BoundCapability> {
    self.capabilities.iter().map(|c| self.bind(c)).collect()
  }

  pub async fn shutdown(&self) {
    self.client.shutdown().await;
  }
}

fn client_info() -> Implementation {
  Implementation::new("autopilot", env!("CARGO_PKG_VERSION"))
}

struct RemoteHandler {
  client: Arc<McpClient>,
}

#[async_trait]
impl CapabilityHandler for RemoteHandler {
  async fn call(
    &self,
    capability: &str,
    arguments: Map<String, Value>,
  ) -> Result<CallToolResult, InvocationError> {
    self
      .client
      .call_tool(capability, arguments)
      .await
      .map_err(|err| InvocationError::Transport {
        capability: capability.to_string(),
        message: err.to_string(),
      })
  }
}

/// Owns every adapter opened during one cycle. [`SessionScope::close`] must be
/// awaited on every exit path; adapters are shut down in reverse order.
#[derive(Default)]
pub struct SessionScope {
  adapters: Vec<Arc<CapabilityAdapter>>,
}

impl SessionScope {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn connect(
    &mut self,
    command: &ServerCommand,
    classifier: &EffectClassifier,
    handshake_timeout: Duration,
    call_timeout: Duration,
  ) -> Result<Arc<CapabilityAdapter>, AdapterError> {
    let adapter = Arc::new(
      CapabilityAdapter::connect(command, classifier, handshake_timeout, call_timeout).await?,
    );
    self.adapters.push(Arc::clone(&adapter));
    Ok(adapter)
  }

  pub fn adapters(&self) -> &[Arc<CapabilityAdapter>] {
    &self.adapters
  }

  pub async fn close(self) {
    for adapter in self.adapters.into_iter().rev() {
      adapter.shutdown().await;
      info!(event = "capability_server_closed", server = adapter.name());
    }
  }
}
