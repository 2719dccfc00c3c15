pub mod bus;
pub mod protocol;

pub use bus::{BusError, MessageBus, DEFAULT_COMMAND_TIMEOUT};
pub use protocol::{
    AgentCommand, AgentEvent, AgentFailure, AgentReply, AgentStatus, CommandEnvelope,
};
