pub mod agent;
pub mod capture;
pub mod loop_worker;
pub mod runner;

pub use agent::{AgentConfig, AgentDeps, CaptureAgent};
pub use capture::{CaptureDevice, CaptureError, CaptureGuard, CaptureStream, Frame, SyntheticCamera};
pub use loop_worker::DetectionTally;
pub use runner::DetectionRunner;
