mod driver;
mod report;
mod runner;

pub use driver::{FrameOutput, PipelineDriver, PipelineState, StepOutcome, StopHandle};
pub use report::{EndReason, SessionReport};
pub use runner::{spawn_session, SessionHandle};
