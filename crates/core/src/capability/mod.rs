//! Capabilities the model may invoke: declarations, argument validation,
//! and the handlers that execute them (capability servers or local tools).

pub mod adapter;
pub mod effect;
pub mod launch;
pub mod local;
pub mod validator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcp::CallToolResult;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::capability::Capability;
use validator::{ArgumentValidator, ValidationError};

pub use adapter::{AdapterError, CapabilityAdapter, SessionScope};
pub use effect::EffectClassifier;
pub use local::LocalCapabilities;

/// Failure of a single invocation. Never escapes the tool execution step:
/// it is rendered into the conversation via [`InvocationError::to_model_text`].
#[derive(Debug, Error)]
pub enum InvocationError {
  #[error("capability `{0}` is not available")]
  UnknownCapability(String),
  #[error("invalid arguments for `{capability}`: {source}")]
  InvalidArguments {
    capability: String,
    #[source]
    source: ValidationError,
  },
  #[error("`{capability}` reported an error: {message}")]
  Remote { capability: String, message: String },
  #[error("`{capability}` failed: {message}")]
  Transport { capability: String, message: String },
  #[error("`{capability}` did not answer within {timeout:?}")]
  TimedOut { capability: String, timeout: Duration },
}

impl InvocationError {
  pub fn to_model_text(&self) -> String {
    format!("ERROR: {self}")
  }
}

/// Something that can execute a capability by name.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
  async fn call(
    &self,
    capability: &str,
    arguments: Map<String, Value>,
  ) -> Result<CallToolResult, InvocationError>;
}

/// A capability together with its validator and the handler that runs it.
#[derive(Clone)]
pub struct BoundCapability {
  capability: Arc<Capability>,
  validator: Arc<ArgumentValidator>,
  handler: Arc<dyn CapabilityHandler>,
  timeout: Duration,
}

impl std::fmt::Debug for BoundCapability {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BoundCapability")
      .field("name", &self.capability.name)
      .field("effect", &self.capability.effect)
      .field("timeout", &self.timeout)
      .finish()
  }
}

impl BoundCapability {
  pub fn new(capability: Capability, handler: Arc<dyn CapabilityHandler>, timeout: Duration) -> Self {
    let validator = ArgumentValidator::for_capability(&capability);
    Self {
      capability: Arc::new(capability),
      validator: Arc::new(validator),
      handler,
      timeout,
    }
  }

  pub fn capability(&self) -> &Capability {
    &self.capability
  }

  pub fn name(&self) -> &str {
    &self.capability.name
  }

  /// Validate, execute and flatten the result to text.
  pub async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, InvocationError> {
    let name = self.name();
    let arguments = self
      .validator
      .validate(arguments)
      .map_err(|source| InvocationError::InvalidArguments {
        capability: name.to_string(),
        source,
      })?;

    let result = tokio::time::timeout(self.timeout, self.handler.call(name, arguments))
      .await
      .map_err(|_| InvocationError::TimedOut {
        capability: name.to_string(),
        timeout: self.timeout,
      })??;

    let text = result.text_blocks().collect::<Vec<_>>().join("\n");
    if result.is_error {
      return Err(InvocationError::Remote {
        capability: name.to_string(),
        message: text,
      });
    }
    if text.trim().is_empty() {
      return Ok(format!("Tool {name} executed successfully (no output)."));
    }
    debug!(event = "capability_output", capability = name, bytes = text.len());
    Ok(text)
  }
}

/// Ordered set of bound capabilities with unique names.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
  entries: Vec<BoundCapability>,
}

impl CapabilitySet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert unless the name is taken. The first registration wins.
  pub fn insert(&mut self, bound: BoundCapability) -> bool {
    if self.get(bound.name()).is_some() {
      warn!(
        event = "capability_name_collision",
        capability = bound.name(),
        "duplicate capability ignored"
      );
      return false;
    }
    self.entries.push(bound);
    true
  }

  pub fn get(&self, name: &str) -> Option<&BoundCapability> {
    self.entries.iter().find(|bound| bound.name() == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &BoundCapability> {
    self.entries.iter()
  }

  pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
    self.entries.iter().map(BoundCapability::capability)
  }

  pub fn names(&self) -> Vec<&str> {
    self.entries.iter().map(BoundCapability::name).collect()
  }

  /// Subset without mutating capabilities.
  pub fn read_only(&self) -> CapabilitySet {
    CapabilitySet {
      entries: self
        .entries
        .iter()
        .filter(|bound| !bound.capability().is_mutating())
        .cloned()
        .collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl Extend<BoundCapability> for CapabilitySet {
  fn extend<I: IntoIterator<Item = BoundCapability>>(&mut self, iter: I) {
    for bound in iter {
      self.insert(bound);
    }
  }
}
