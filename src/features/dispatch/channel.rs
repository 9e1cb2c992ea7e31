//! Request/response channel for server actions.
//!
//! Each call gets a correlation id. The request goes out on an mpsc
//! channel; whoever serves it answers through [`ServerChannel::complete`]
//! with the same id. Calls that get no answer within the timeout fail and
//! are forgotten, so a late answer is dropped.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{ActionError, ExecutorError};

/// Outbound server action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Id to answer with
    pub correlation_id: Uuid,
    /// Server action name
    pub action: String,
    /// Action parameters
    pub params: Value,
}

type Responder = oneshot::Sender<Result<Value, String>>;

/// Correlates server action requests with their completions.
#[derive(Debug)]
pub struct ServerChannel {
    pending: Mutex<HashMap<Uuid, Responder>>,
    outbound: mpsc::UnboundedSender<ActionRequest>,
    timeout: Duration,
}

impl ServerChannel {
    /// Create a channel and the receiver its requests arrive on.
    #[must_use]
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<ActionRequest>) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let channel = Self {
            pending: Mutex::new(HashMap::new()),
            outbound,
            timeout,
        };
        (channel, requests)
    }

    /// Send `action` and wait for its completion.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when no completion arrives in time, `Disconnected`
    /// when the receiving side is gone and `Rejected` when the server
    /// answered with an error.
    pub async fn call(&self, action: &str, params: Value) -> Result<Value, ActionError> {
        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.lock().insert(correlation_id, tx);
        // Forgets the call however it ends, including when the caller
        // drops this future
        let _pending = PendingCall {
            channel: self,
            correlation_id,
        };

        let request = ActionRequest {
            correlation_id,
            action: action.to_string(),
            params,
        };
        if self.outbound.send(request).is_err() {
            return Err(ActionError::Disconnected);
        }

        tracing::debug!(%correlation_id, action, "server action sent");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(ActionError::Rejected {
                action: action.to_string(),
                message,
            }),
            Ok(Err(_)) => Err(ActionError::Disconnected),
            Err(_) => {
                tracing::warn!(%correlation_id, action, "server action timed out");
                Err(ActionError::Timeout {
                    action: action.to_string(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Deliver the result for `correlation_id`.
    ///
    /// Returns `false` when no call is waiting for it (unknown or late).
    pub fn complete(&self, correlation_id: Uuid, result: Result<Value, String>) -> bool {
        let Some(responder) = self.lock().remove(&correlation_id) else {
            tracing::debug!(%correlation_id, "completion for unknown or expired call ignored");
            return false;
        };
        responder.send(result).is_ok()
    }

    /// Calls still waiting for a completion.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Responder>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct PendingCall<'a> {
    channel: &'a ServerChannel,
    correlation_id: Uuid,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.channel.lock().remove(&self.correlation_id);
    }
}

impl From<ActionError> for ExecutorError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Timeout { .. } => Self::Timeout(err.to_string()),
            ActionError::Disconnected => Self::Network(err.to_string()),
            ActionError::Rejected { message, .. } => Self::Application(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_call_resolves_with_matching_completion() {
        let (channel, mut requests) = ServerChannel::new(Duration::from_secs(5));
        let channel = Arc::new(channel);

        let server = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                let request = requests.recv().await.unwrap();
                assert_eq!(request.action, "archive");
                // An unrelated id does not resolve the call
                assert!(!channel.complete(Uuid::new_v4(), Ok(json!("wrong"))));
                assert!(channel.complete(request.correlation_id, Ok(json!({ "archived": request.params["id"] }))));
            })
        };

        let value = channel.call("archive", json!({ "id": 7 })).await.unwrap();
        assert_eq!(value, json!({ "archived": 7 }));
        assert_eq!(channel.pending_calls(), 0);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_call() {
        let (channel, mut requests) = ServerChannel::new(Duration::from_secs(5));
        let channel = Arc::new(channel);

        let server = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                let request = requests.recv().await.unwrap();
                channel.complete(request.correlation_id, Err("forbidden".to_string()));
            })
        };

        let err = channel.call("archive", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ActionError::Rejected {
                action: "archive".to_string(),
                message: "forbidden".to_string()
            }
        );
        server.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_forgets_the_call() {
        let (channel, mut requests) = ServerChannel::new(Duration::from_secs(30));

        let err = channel.call("export", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ActionError::Timeout {
                action: "export".to_string(),
                timeout_ms: 30_000
            }
        );
        assert_eq!(channel.pending_calls(), 0);

        // The late answer goes nowhere
        let request = requests.recv().await.unwrap();
        assert!(!channel.complete(request.correlation_id, Ok(json!(true))));
    }

    #[tokio::test]
    async fn test_abandoned_call_is_forgotten() {
        let (channel, mut requests) = ServerChannel::new(Duration::from_secs(30));
        let channel = Arc::new(channel);

        let call = tokio::spawn({
            let channel = Arc::clone(&channel);
            async move { channel.call("export", json!({})).await }
        });
        let request = requests.recv().await.unwrap();
        assert_eq!(channel.pending_calls(), 1);

        call.abort();
        assert!(call.await.unwrap_err().is_cancelled());
        assert_eq!(channel.pending_calls(), 0);
        assert!(!channel.complete(request.correlation_id, Ok(json!(true))));
    }

    #[tokio::test]
    async fn test_disconnected_receiver() {
        let (channel, requests) = ServerChannel::new(Duration::from_secs(5));
        drop(requests);

        let err = channel.call("export", json!({})).await.unwrap_err();
        assert_eq!(err, ActionError::Disconnected);
        assert_eq!(channel.pending_calls(), 0);
    }

    #[test]
    fn test_action_error_conversion() {
        let timeout = ActionError::Timeout {
            action: "x".to_string(),
            timeout_ms: 1,
        };
        assert!(ExecutorError::from(timeout).is_transient());
        assert!(ExecutorError::from(ActionError::Disconnected).is_transient());
        assert_eq!(
            ExecutorError::from(ActionError::Rejected {
                action: "x".to_string(),
                message: "nope".to_string()
            }),
            ExecutorError::Application("nope".to_string())
        );
    }
}
