//! Registry-described quick actions.
//!
//! A quick action either navigates somewhere on the client or invokes a
//! named server action. Actions that need the backend are queued as
//! `quick-action` operations while offline and replayed later.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::channel::ServerChannel;
use super::usage::UsageTracker;
use crate::error::{ExecutorError, ResyncError};
use crate::features::connectivity::ConnectivityMonitor;
use crate::features::queue::{
    ExecutorCall, OnlineExecutor, OperationId, OperationQueue, OperationType,
};

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Client-side navigation
    Navigate {
        /// Destination route
        route: String,
    },
    /// Named server action
    Server {
        /// Server action name
        action: String,
    },
}

/// A quick action as declared in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Unique action id
    pub id: String,
    /// Display label
    pub label: String,
    /// Queue instead of running while offline
    #[serde(default)]
    pub requires_online: bool,
    /// What the action does
    #[serde(flatten)]
    pub kind: ActionKind,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    actions: Vec<ActionDefinition>,
}

/// Known quick actions, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: Vec<ActionDefinition>,
}

impl ActionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a registry from YAML (`actions: [...]`).
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML or duplicate ids.
    pub fn from_yaml(yaml: &str) -> Result<Self, ResyncError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| ResyncError::Config(format!("Invalid action registry: {e}")))?;

        let mut registry = Self::new();
        for action in file.actions {
            registry.register(action)?;
        }
        Ok(registry)
    }

    /// Load a registry file. A missing file is an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ResyncError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Add an action.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already registered.
    pub fn register(&mut self, action: ActionDefinition) -> Result<(), ResyncError> {
        if self.get(&action.id).is_some() {
            return Err(ResyncError::Config(format!(
                "Duplicate quick action id: {}",
                action.id
            )));
        }
        self.actions.push(action);
        Ok(())
    }

    /// Action with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// All actions, in declaration order.
    #[must_use]
    pub fn list(&self) -> &[ActionDefinition] {
        &self.actions
    }
}

/// Performs client-side navigation.
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    /// Navigate to `route` with `params`.
    fn navigate(&self, route: &str, params: &Value);
}

/// Outcome of executing a quick action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionResult {
    /// Navigation performed
    Navigated {
        /// Route navigated to
        route: String,
    },
    /// Server action completed
    Completed {
        /// Server response
        value: Value,
    },
    /// Deferred until connectivity returns
    Queued {
        /// Queued operation id
        id: OperationId,
        /// User-facing message
        message: String,
    },
}

/// Payload of a queued `quick-action` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Action id
    pub action_id: String,
    /// Parameters given at execution time
    #[serde(default)]
    pub params: Value,
}

/// Runs quick actions, queueing the ones that need a link.
pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    queue: Arc<OperationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    channel: Arc<ServerChannel>,
    navigator: Arc<dyn Navigator>,
    usage: Arc<UsageTracker>,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("actions", &self.registry.list().len())
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(
        registry: Arc<ActionRegistry>,
        queue: Arc<OperationQueue>,
        monitor: Arc<ConnectivityMonitor>,
        channel: Arc<ServerChannel>,
        navigator: Arc<dyn Navigator>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            registry,
            queue,
            monitor,
            channel,
            navigator,
            usage,
        }
    }

    /// Usage ranking for the registered actions.
    #[must_use]
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Execute the action `action_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown actions, a storage error if the use
    /// cannot be recorded or queued, and the server channel's error for
    /// failed server actions.
    pub async fn execute(&self, action_id: &str, params: Value) -> Result<ActionResult, ResyncError> {
        let action = self
            .registry
            .get(action_id)
            .ok_or_else(|| ResyncError::NotFound(format!("quick action '{action_id}'")))?;

        self.usage.record(action_id)?;

        if action.requires_online && !self.monitor.is_reachable() {
            let payload = serde_json::to_value(QueuedAction {
                action_id: action_id.to_string(),
                params,
            })?;
            let id = self.queue.enqueue(OperationType::QuickAction, payload)?;

            tracing::info!(action_id, operation_id = %id, "quick action queued while offline");
            return Ok(ActionResult::Queued {
                id,
                message: format!("{} will run when online", action.label),
            });
        }

        match &action.kind {
            ActionKind::Navigate { route } => {
                self.navigator.navigate(route, &params);
                Ok(ActionResult::Navigated {
                    route: route.clone(),
                })
            }
            ActionKind::Server { action: name } => {
                let value = self.channel.call(name, params).await?;
                Ok(ActionResult::Completed { value })
            }
        }
    }

    /// Executor that replays queued `quick-action` operations.
    #[must_use]
    pub fn replay_executor(&self) -> Arc<dyn OnlineExecutor> {
        Arc::new(QuickActionReplay {
            registry: Arc::clone(&self.registry),
            channel: Arc::clone(&self.channel),
        })
    }

    /// Register [`replay_executor`](Self::replay_executor) with the queue.
    pub fn register_replay(&self) {
        self.queue
            .register_executor(OperationType::QuickAction, self.replay_executor());
    }
}

struct QuickActionReplay {
    registry: Arc<ActionRegistry>,
    channel: Arc<ServerChannel>,
}

#[async_trait]
impl OnlineExecutor for QuickActionReplay {
    async fn execute(&self, call: ExecutorCall) -> Result<Value, ExecutorError> {
        let queued: QueuedAction = serde_json::from_value(call.payload)
            .map_err(|e| ExecutorError::Application(format!("Invalid quick action payload: {e}")))?;

        let action = self.registry.get(&queued.action_id).ok_or_else(|| {
            ExecutorError::Application(format!("Unknown quick action '{}'", queued.action_id))
        })?;

        match &action.kind {
            ActionKind::Server { action: name } => {
                Ok(self.channel.call(name, queued.params).await?)
            }
            // Navigation belongs to the moment it was requested
            ActionKind::Navigate { route } => {
                tracing::debug!(action_id = %queued.action_id, route, "stale navigation dropped");
                Ok(json!({ "skipped": true }))
            }
        }
    }
}
