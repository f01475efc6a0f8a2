//! Cancellation capture.

use std::sync::Arc;

use tracing::debug;

use super::state::{FinalizeFlag, StreamingState};
use crate::persist::MessagePersister;
use crate::types::RawUsage;

/// Captures a consistent partial state when the client connection is torn
/// down mid-run.
///
/// Claims the run's finalize-once flag before doing anything; if the normal
/// completion path already finalized, the now-stale cancellation is a
/// no-op. Persistence failures on this path never propagate; the
/// connection-teardown sequence must not crash.
pub struct InterruptionHandler {
    persister: Arc<MessagePersister>,
    finalized: FinalizeFlag,
}

impl InterruptionHandler {
    pub fn new(persister: Arc<MessagePersister>, finalized: FinalizeFlag) -> Self {
        Self {
            persister,
            finalized,
        }
    }

    /// Freeze the run's in-flight state and persist it as a partial turn.
    pub async fn interrupt(
        &self,
        state: StreamingState,
        usage: &RawUsage,
        model: &str,
        task: &str,
    ) {
        if !self.finalized.try_claim() {
            debug!("run already finalized, ignoring stale cancellation");
            return;
        }
        let turns = state.freeze_partial();
        if turns.is_empty() {
            debug!("cancellation with nothing accumulated, nothing to persist");
            return;
        }
        self.persister
            .persist_cancelled(&turns, usage, model, task)
            .await;
    }
}
