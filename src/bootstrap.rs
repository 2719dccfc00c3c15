//! Makes sure a capture agent is listening before a command is delivered.
//!
//! Bounded and two-phase: direct delivery, then one injection, one settle
//! delay and exactly one retry. Nothing loops back, so a context that can
//! never host an agent fails fast instead of livelocking.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::browser::ContextHost;
use crate::error::SessionError;
use crate::messaging::{AgentCommand, AgentReply, BusError, MessageBus};
use crate::models::ContextId;

/// Where the bootstrap currently is. Every transition moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Direct,
    Inject,
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub reply: AgentReply,
    /// True when an agent had to be injected first.
    pub injected: bool,
}

pub struct Bootstrapper {
    bus: MessageBus,
    host: Arc<dyn ContextHost>,
    settle_delay: Duration,
}

impl Bootstrapper {
    pub fn new(bus: MessageBus, host: Arc<dyn ContextHost>, settle_delay: Duration) -> Self {
        Self {
            bus,
            host,
            settle_delay,
        }
    }

    pub async fn deliver(
        &self,
        context: ContextId,
        command: AgentCommand,
    ) -> Result<Delivery, SessionError> {
        let mut step = Step::Direct;
        loop {
            step = match step {
                Step::Direct => match self.bus.send_command(context, command).await {
                    Ok(reply) => {
                        return Ok(Delivery {
                            reply,
                            injected: false,
                        })
                    }
                    Err(BusError::NoReceiver(_)) => {
                        debug!("no agent listening in {context}, injecting");
                        Step::Inject
                    }
                    Err(BusError::DeliveryTimeout { after, .. }) => {
                        // An agent is there but hung; a second one would
                        // compete for the capture.
                        return Err(SessionError::DeliveryTimeout { context, after });
                    }
                    Err(BusError::Rejected(failure)) => {
                        return Err(SessionError::from_agent_failure(context, failure))
                    }
                },
                Step::Inject => {
                    if let Err(err) = self.host.inject_agent(context).await {
                        warn!("injection into {context} failed: {err}");
                        return Err(SessionError::InjectionFailed {
                            context,
                            reason: err.to_string(),
                        });
                    }
                    info!("agent injected into {context}, settling for {:?}", self.settle_delay);
                    tokio::time::sleep(self.settle_delay).await;
                    Step::Retry
                }
                Step::Retry => {
                    return match self.bus.send_command(context, command).await {
                        Ok(reply) => Ok(Delivery {
                            reply,
                            injected: true,
                        }),
                        Err(BusError::Rejected(failure)) => {
                            Err(SessionError::from_agent_failure(context, failure))
                        }
                        Err(err) => {
                            warn!("retry after injection into {context} failed: {err}");
                            Err(SessionError::InjectionFailed {
                                context,
                                reason: err.to_string(),
                            })
                        }
                    };
                }
            };
        }
    }
}
