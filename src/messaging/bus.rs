use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, trace};
use tokio::sync::{mpsc, oneshot};

use crate::models::ContextId;

use super::protocol::{AgentCommand, AgentEvent, AgentFailure, AgentReply, CommandEnvelope};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("no receiver in {0}")]
    NoReceiver(ContextId),
    #[error("no answer from {context} within {after:?}")]
    DeliveryTimeout { context: ContextId, after: Duration },
    #[error(transparent)]
    Rejected(#[from] AgentFailure),
}

#[derive(Default)]
struct Routes {
    listeners: HashMap<ContextId, mpsc::UnboundedSender<CommandEnvelope>>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

/// Asynchronous, at-most-once transport between contexts.
///
/// Commands are request/response with a bounded wait. Events are best-effort
/// and vanish silently when nobody is listening.
#[derive(Clone)]
pub struct MessageBus {
    routes: Arc<Mutex<Routes>>,
    command_timeout: Duration,
}

impl MessageBus {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            routes: Arc::new(Mutex::new(Routes::default())),
            command_timeout,
        }
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        match self.routes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers the command receiver for `context`, replacing any previous one.
    pub fn attach_listener(&self, context: ContextId) -> mpsc::UnboundedReceiver<CommandEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.routes().listeners.insert(context, tx).is_some() {
            debug!("replaced command listener for {context}");
        }
        rx
    }

    /// Drops the route for `context` once its receiver is gone. A listener
    /// attached by a newer agent in the same context is left in place.
    pub fn prune_listener(&self, context: ContextId) {
        let mut routes = self.routes();
        if routes.listeners.get(&context).is_some_and(|tx| tx.is_closed()) {
            routes.listeners.remove(&context);
        }
    }

    pub fn has_listener(&self, context: ContextId) -> bool {
        self.routes()
            .listeners
            .get(&context)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Registers the controller's event inbox, replacing any previous one.
    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes().events = Some(tx);
        rx
    }

    pub async fn send_command(
        &self,
        context: ContextId,
        command: AgentCommand,
    ) -> Result<AgentReply, BusError> {
        self.send_command_within(context, command, self.command_timeout)
            .await
    }

    pub async fn send_command_within(
        &self,
        context: ContextId,
        command: AgentCommand,
        timeout: Duration,
    ) -> Result<AgentReply, BusError> {
        let listener = self.routes().listeners.get(&context).cloned();
        let Some(listener) = listener else {
            return Err(BusError::NoReceiver(context));
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = CommandEnvelope {
            command,
            reply: reply_tx,
        };
        if listener.send(envelope).is_err() {
            self.prune_listener(context);
            return Err(BusError::NoReceiver(context));
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result.map_err(BusError::Rejected),
            Ok(Err(_)) => Err(BusError::NoReceiver(context)),
            Err(_) => Err(BusError::DeliveryTimeout {
                context,
                after: timeout,
            }),
        }
    }

    /// Fire-and-forget; no acknowledgment, no retry.
    pub fn emit_event(&self, event: AgentEvent) {
        let sender = self.routes().events.clone();
        match sender {
            Some(tx) => {
                if tx.send(event).is_err() {
                    trace!("event dropped: controller inbox closed");
                }
            }
            None => trace!("event dropped: no controller subscribed"),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}
