pub mod commands;
pub mod controller;

pub use commands::{dispatch, CommandOutcome, ControllerRequest, ControllerResponse};
pub use controller::{
    AgentHandle, ControllerDeps, ControllerHandle, SessionController, StatusReport, StopReport,
};
