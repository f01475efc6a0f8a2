//! Maestro, a streaming agent orchestration engine.
//!
//! Accepts a user's conversation, drives a bounded multi-step exchange with
//! a model gateway that may invoke external tools, streams incremental
//! output back to the client, and durably records the conversation,
//! including a consistent partial capture when the client disconnects
//! mid-run.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use maestro::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let store = MemoryStore::new();
//! let runner = StepRunner::new(MaestroConfig::from_env(), store);
//! let agent = AgentConfiguration::new("gpt-4o").with_system_prompt("Be brief.");
//! let stream = runner
//!     .run_orchestration(agent, "conv-1", CancellationToken::new())
//!     .await;
//! # let _ = stream;
//! # }
//! ```

pub mod accounting;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod orchestrator;
pub mod persist;
pub mod prelude;
pub mod prompt;
pub mod store;
pub mod tools;
pub mod types;
