//! Streaming orchestration: the bounded multi-step model/tool loop.

pub mod frames;
pub mod interrupt;
pub mod runner;
pub mod state;

pub use interrupt::InterruptionHandler;
pub use runner::{AgentConfiguration, OrchestrationStream, StepRunner};
pub use state::{FinalizeFlag, PartialToolCall, StreamingState};
