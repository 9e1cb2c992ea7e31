//! Online executors: the functions that actually apply an operation.
//!
//! The queue never knows what an operation does. It looks up the executor
//! registered for the operation's type and treats the result as opaque
//! success or failure.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::operation::{OperationId, OperationType};
use crate::config::BackendConfig;
use crate::error::ExecutorError;

/// Words that historically identify a connectivity failure in an untyped
/// error message.
static NETWORK_MESSAGE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(network|fetch|connection|connect|timed? ?out|timeout|offline|unreachable|dns|econnrefused|econnreset|socket)\b",
    )
    .ok()
});

impl ExecutorError {
    /// Whether retrying later, once connectivity returns, can help.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Classify an untyped error message.
    ///
    /// Only for adapters wrapping code that cannot report typed errors;
    /// executors should return `Network`/`Timeout` directly.
    #[must_use]
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::Timeout(message);
        }

        let networkish = NETWORK_MESSAGE
            .as_ref()
            .is_some_and(|re| re.is_match(&message));
        if networkish {
            Self::Network(message)
        } else {
            Self::Application(message)
        }
    }
}

impl From<reqwest::Error> for ExecutorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else {
            Self::Application(err.to_string())
        }
    }
}

/// A single executor invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorCall {
    /// Operation type being executed
    pub op_type: OperationType,
    /// Opaque payload
    pub payload: Value,
    /// Queue id when replaying; `None` for immediate execution
    pub operation_id: Option<OperationId>,
}

impl ExecutorCall {
    /// Call for an immediate (not yet queued) execution.
    #[must_use]
    pub const fn immediate(op_type: OperationType, payload: Value) -> Self {
        Self {
            op_type,
            payload,
            operation_id: None,
        }
    }
}

/// Applies operations of one type against the authoritative backend.
///
/// Implementations must tolerate being invoked more than once for the same
/// operation: a replay can follow an attempt whose status update was lost.
#[async_trait]
pub trait OnlineExecutor: Send + Sync {
    /// Apply the operation.
    ///
    /// # Errors
    ///
    /// Returns `Network`/`Timeout` for connectivity failures and
    /// `Application` for everything else.
    async fn execute(&self, call: ExecutorCall) -> Result<Value, ExecutorError>;
}

/// Executor backed by a closure over the payload.
pub struct FnExecutor {
    f: Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ExecutorError>> + Send + Sync>,
}

impl FnExecutor {
    /// Wrap an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ExecutorError>> + Send + 'static,
    {
        Self {
            f: Box::new(move |payload| Box::pin(f(payload))),
        }
    }
}

impl std::fmt::Debug for FnExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnExecutor")
    }
}

#[async_trait]
impl OnlineExecutor for FnExecutor {
    async fn execute(&self, call: ExecutorCall) -> Result<Value, ExecutorError> {
        (self.f)(call.payload).await
    }
}

/// Executors keyed by operation type.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<OperationType, Arc<dyn OnlineExecutor>>>,
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

impl ExecutorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for `op_type`.
    pub fn register(&self, op_type: OperationType, executor: Arc<dyn OnlineExecutor>) {
        let mut executors = self
            .executors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        executors.insert(op_type, executor);
    }

    /// Register `executor` unless one is already registered.
    ///
    /// Returns whether it was registered.
    pub fn register_if_absent(&self, op_type: OperationType, executor: Arc<dyn OnlineExecutor>) -> bool {
        let mut executors = self
            .executors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if executors.contains_key(&op_type) {
            return false;
        }
        executors.insert(op_type, executor);
        true
    }

    /// Register the same executor for every operation type.
    pub fn register_all(&self, executor: &Arc<dyn OnlineExecutor>) {
        for op_type in OperationType::ALL {
            self.register(op_type, Arc::clone(executor));
        }
    }

    /// Executor for `op_type`, if any.
    #[must_use]
    pub fn get(&self, op_type: OperationType) -> Option<Arc<dyn OnlineExecutor>> {
        let executors = self
            .executors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        executors.get(&op_type).cloned()
    }

    /// Types with a registered executor, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<OperationType> {
        let executors = self
            .executors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut types: Vec<_> = executors.keys().copied().collect();
        types.sort();
        types
    }
}

/// Executor that posts operations to the backend over HTTP.
///
/// Sends `POST {base_url}/operations/{type}` with the payload as JSON and
/// the queue id as `Idempotency-Key`.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExecutor {
    /// Build an executor from backend settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExecutorError::Application(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, op_type: OperationType) -> String {
        format!("{}/operations/{}", self.base_url, op_type.as_str())
    }
}

#[async_trait]
impl OnlineExecutor for HttpExecutor {
    async fn execute(&self, call: ExecutorCall) -> Result<Value, ExecutorError> {
        let mut request = self
            .client
            .post(self.endpoint(call.op_type))
            .json(&json!({ "payload": call.payload }));
        if let Some(id) = call.operation_id {
            request = request.header("Idempotency-Key", id.to_string());
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body)
                .map_err(|e| ExecutorError::Application(format!("Invalid response body: {e}")));
        }

        let detail = response.text().await.unwrap_or_default();
        let message = format!("{} {status}: {detail}", call.op_type);

        // Gateways answering for an unreachable upstream are a connectivity
        // problem, not a rejection
        if matches!(status.as_u16(), 502..=504) {
            Err(ExecutorError::Network(message))
        } else if status.as_u16() == 408 {
            Err(ExecutorError::Timeout(message))
        } else {
            Err(ExecutorError::Application(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        assert!(matches!(
            ExecutorError::classify("Request timeout after 30s"),
            ExecutorError::Timeout(_)
        ));
        assert!(matches!(
            ExecutorError::classify("Failed to fetch"),
            ExecutorError::Network(_)
        ));
        assert!(matches!(
            ExecutorError::classify("Connection reset by peer"),
            ExecutorError::Network(_)
        ));
        assert!(matches!(
            ExecutorError::classify("Title must not be empty"),
            ExecutorError::Application(_)
        ));
        // "networking" is not the word "network"
        assert!(matches!(
            ExecutorError::classify("Invalid networking tag"),
            ExecutorError::Application(_)
        ));
    }

    #[test]
    fn test_transient() {
        assert!(ExecutorError::Network("x".into()).is_transient());
        assert!(ExecutorError::Timeout("x".into()).is_transient());
        assert!(!ExecutorError::Application("x".into()).is_transient());
    }

    #[tokio::test]
    async fn test_fn_executor_passes_payload() {
        let executor = FnExecutor::new(|payload: Value| async move {
            Ok(json!({ "echo": payload }))
        });

        let result = executor
            .execute(ExecutorCall::immediate(OperationType::CaptureText, json!("hi")))
            .await
            .unwrap();
        assert_eq!(result, json!({ "echo": "hi" }));
    }

    #[test]
    fn test_registry() {
        let registry = ExecutorRegistry::new();
        assert!(registry.get(OperationType::CheckIn).is_none());

        let first: Arc<dyn OnlineExecutor> = Arc::new(FnExecutor::new(|_| async { Ok(json!(1)) }));
        let second: Arc<dyn OnlineExecutor> = Arc::new(FnExecutor::new(|_| async { Ok(json!(2)) }));

        assert!(registry.register_if_absent(OperationType::CheckIn, first));
        assert!(!registry.register_if_absent(OperationType::CheckIn, Arc::clone(&second)));
        assert_eq!(registry.registered_types(), vec![OperationType::CheckIn]);

        registry.register_all(&second);
        assert_eq!(registry.registered_types().len(), OperationType::ALL.len());
    }

    #[test]
    fn test_http_endpoint() {
        let config = BackendConfig {
            base_url: "https://api.example.com/".to_string(),
            ..BackendConfig::default()
        };
        let executor = HttpExecutor::new(&config).unwrap();
        assert_eq!(
            executor.endpoint(OperationType::ContentDelete),
            "https://api.example.com/operations/content-delete"
        );
    }
}
