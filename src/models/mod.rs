pub mod context;
pub mod detection;
pub mod session;

pub use context::ContextId;
pub use detection::{DetectionEvent, DetectionRecord, EmotionLabel};
pub use session::{SensingSession, SessionState};
