//! The bounded multi-step streaming loop.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use super::frames;
use super::interrupt::InterruptionHandler;
use super::state::{FinalizeFlag, PartialToolCall, StreamingState};
use crate::config::MaestroConfig;
use crate::error::Result;
use crate::gateway::{
    ConfigGatewayResolver, GatewayRequest, GatewayResolver, ModelGateway, ReasoningEffort,
};
use crate::history::HistoryLoader;
use crate::persist::MessagePersister;
use crate::store::ConversationStore;
use crate::tools::{ToolExecutionGovernor, ToolRegistry};
use crate::types::{GatewayEvent, RawUsage, ToolInvocation, Turn, ValidationState};

/// Configuration for one orchestration run. Immutable for its duration.
#[derive(Clone)]
pub struct AgentConfiguration {
    pub model: String,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub registry: ToolRegistry,
    pub system_prompt: String,
    /// Opaque context variables handed to tool construction upstream;
    /// carried for persistence of run metadata, never interpreted here.
    pub context: serde_json::Value,
    /// Bound on model/tool round-trips before the run is forcibly
    /// finalized even without an explicit stop signal.
    pub step_cap: usize,
    /// Ceiling on concurrently executing tool calls within one step.
    pub parallel_tool_limit: usize,
    /// Task label attached to usage records.
    pub task: String,
}

impl AgentConfiguration {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_output_tokens: None,
            reasoning_effort: None,
            registry: ToolRegistry::new(),
            system_prompt: String::new(),
            context: serde_json::Value::Null,
            step_cap: 20,
            parallel_tool_limit: 4,
            task: "chat".to_string(),
        }
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_step_cap(mut self, cap: usize) -> Self {
        self.step_cap = cap;
        self
    }

    pub fn with_parallel_tool_limit(mut self, limit: usize) -> Self {
        self.parallel_tool_limit = limit;
        self
    }
}

/// The client-facing byte stream of one run.
pub type OrchestrationStream = UnboundedReceiverStream<Vec<u8>>;

/// Drives orchestration runs against a resolved model gateway.
pub struct StepRunner {
    resolver: Arc<dyn GatewayResolver>,
    store: Arc<dyn ConversationStore>,
}

impl StepRunner {
    pub fn new(config: MaestroConfig, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            resolver: Arc::new(ConfigGatewayResolver::new(config)),
            store,
        }
    }

    /// Use a custom gateway resolver instead of credential-based routing.
    pub fn with_resolver(
        resolver: Arc<dyn GatewayResolver>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self { resolver, store }
    }

    /// Run one end-to-end orchestration.
    ///
    /// Always yields a byte stream; a pre-stream failure (missing
    /// credential, unreadable history) produces a single labeled error
    /// frame followed by stream close, and never reaches persistence.
    pub async fn run_orchestration(
        &self,
        agent: AgentConfiguration,
        conversation_id: &str,
        cancel: CancellationToken,
    ) -> OrchestrationStream {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let stream = UnboundedReceiverStream::new(rx);

        let gateway = match self.resolver.resolve(&agent.model) {
            Ok(gateway) => gateway,
            Err(err) => {
                let _ = tx.send(frames::error_frame(&err.to_string()));
                return stream;
            }
        };

        let history = match HistoryLoader::new(self.store.clone())
            .load(conversation_id)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                let _ = tx.send(frames::error_frame(&err.to_string()));
                return stream;
            }
        };

        let run = RunContext {
            run_id: Uuid::new_v4(),
            agent,
            gateway,
            history,
            persister: Arc::new(MessagePersister::new(self.store.clone())),
            conversation_id: conversation_id.to_string(),
            tx,
        };
        tokio::spawn(run.drive(cancel));
        stream
    }
}

/// Everything one spawned run owns.
struct RunContext {
    run_id: Uuid,
    agent: AgentConfiguration,
    gateway: Box<dyn ModelGateway>,
    history: Vec<Turn>,
    persister: Arc<MessagePersister>,
    conversation_id: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// What one step's event stream amounted to.
struct StepOutcome {
    requested: Vec<ToolInvocation>,
    executions: Vec<(String, JoinHandle<serde_json::Value>)>,
    run_finished: bool,
}

impl RunContext {
    async fn drive(self, cancel: CancellationToken) {
        debug!(run_id = %self.run_id, model = %self.agent.model, "orchestration run start");

        let governor = Arc::new(ToolExecutionGovernor::new(self.agent.parallel_tool_limit));
        let finalized = FinalizeFlag::default();
        let interrupter = InterruptionHandler::new(self.persister.clone(), finalized.clone());
        let mut state = StreamingState::new(&self.conversation_id);
        let mut usage = RawUsage::default();

        let tool_defs = self.agent.registry.definitions();

        for step in 0..self.agent.step_cap {
            let mut turns = self.history.clone();
            turns.extend_from_slice(state.completed_turns());
            let request = GatewayRequest {
                system_prompt: self.agent.system_prompt.clone(),
                turns,
                tools: tool_defs.clone(),
                temperature: self.agent.temperature,
                max_output_tokens: self.agent.max_output_tokens,
                reasoning_effort: self.agent.reasoning_effort,
            };

            let events = match self.gateway.stream_step(&request).await {
                Ok(events) => events,
                Err(err) => {
                    // Failed state: best-effort error frame, no persistence
                    // for this attempt.
                    error!(run_id = %self.run_id, %err, "gateway stream setup failed");
                    self.emit(frames::error_frame(&err.to_string()));
                    return;
                }
            };

            let outcome = match self
                .consume_step(events, &mut state, &mut usage, &governor, &cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(StepAbort::Cancelled) => {
                    debug!(run_id = %self.run_id, step, "cancellation observed mid-stream");
                    interrupter
                        .interrupt(state, &usage, &self.agent.model, &self.agent.task)
                        .await;
                    return;
                }
                Err(StepAbort::Failed) => return,
            };

            // Drain tool executions; completion order across concurrent
            // calls is unordered. Spawned executors keep running even if
            // the run is cancelled while we wait.
            let mut results: HashMap<String, serde_json::Value> = HashMap::new();
            for (id, handle) in outcome.executions {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(run_id = %self.run_id, step, "cancellation observed during tool drain");
                        interrupter
                            .interrupt(state, &usage, &self.agent.model, &self.agent.task)
                            .await;
                        return;
                    }
                    joined = handle => {
                        let value = joined.unwrap_or_else(|err| {
                            serde_json::json!({ "error": format!("Tool task failed: {err}") })
                        });
                        results.insert(id, value);
                    }
                }
            }

            let requested = outcome.requested;
            let had_tools = !requested.is_empty();
            state.snapshot_step(requested.clone());
            for invocation in &requested {
                let result = results
                    .remove(&invocation.id)
                    .unwrap_or(serde_json::Value::Null);
                state.push_turn(Turn::tool_result(
                    self.conversation_id.clone(),
                    invocation.id.clone(),
                    invocation.name.clone(),
                    result,
                ));
            }

            debug!(
                run_id = %self.run_id,
                step,
                tool_calls = requested.len(),
                "step complete"
            );

            if outcome.run_finished || !had_tools {
                break;
            }
        }

        // Normal completion (explicit stop or step cap reached). The
        // cancellation path may have won the race in the same instant;
        // the flag arbitrates.
        if !finalized.try_claim() {
            debug!(run_id = %self.run_id, "run already finalized by cancellation");
            return;
        }
        let turns = state.into_completed();
        if let Err(err) = self
            .persister
            .persist_run(&turns, &usage, &self.agent.model, &self.agent.task)
            .await
        {
            // Surfaced: a completed answer failed to save.
            error!(run_id = %self.run_id, %err, "persistence failed on completion");
            self.emit(frames::error_frame(&err.to_string()));
            return;
        }
        debug!(run_id = %self.run_id, "orchestration run completed");
    }

    /// Consume one step's gateway stream, mutating the run state and
    /// launching governed tool executions as calls complete.
    async fn consume_step(
        &self,
        mut events: futures::stream::BoxStream<'static, Result<GatewayEvent>>,
        state: &mut StreamingState,
        usage: &mut RawUsage,
        governor: &Arc<ToolExecutionGovernor>,
        cancel: &CancellationToken,
    ) -> std::result::Result<StepOutcome, StepAbort> {
        let mut requested: Vec<ToolInvocation> = Vec::new();
        let mut executions: Vec<(String, JoinHandle<serde_json::Value>)> = Vec::new();
        let mut run_finished = false;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(StepAbort::Cancelled),
                event = events.next() => event,
            };
            let Some(event) = event else { break };
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    error!(run_id = %self.run_id, %err, "gateway stream failed mid-step");
                    self.emit(frames::error_frame(&err.to_string()));
                    return Err(StepAbort::Failed);
                }
            };

            self.emit(frames::encode_frame(&event));

            match event {
                GatewayEvent::TextDelta { text } => state.append_text(&text),
                GatewayEvent::ToolCallBegin { id, name } => state.begin_call(&id, &name),
                GatewayEvent::ToolCallDelta { id, fragment } => {
                    state.extend_call(&id, &fragment)
                }
                GatewayEvent::ToolCallComplete { id } => {
                    let Some(call) = state.take_call(&id) else { continue };
                    let PartialToolCall {
                        id: call_id,
                        name,
                        fragment,
                    } = call;
                    let arguments = serde_json::from_str(&fragment)
                        .unwrap_or(serde_json::Value::String(fragment));
                    let mut invocation =
                        ToolInvocation::new(call_id.clone(), name.clone(), arguments.clone());

                    if self.agent.registry.requires_approval(&name) {
                        // Never executed without an external affirmative
                        // signal; the model sees the hold as tool output.
                        invocation.validation = ValidationState::Pending;
                        state.note_resolved(invocation.clone());
                        requested.push(invocation);
                        let held = tokio::spawn(async move {
                            serde_json::Value::String(format!(
                                "The call to '{name}' is awaiting human approval and was not executed."
                            ))
                        });
                        executions.push((call_id, held));
                        continue;
                    }
                    state.note_resolved(invocation.clone());
                    requested.push(invocation);

                    match self.agent.registry.get(&name) {
                        Some(tool) => {
                            let governor = governor.clone();
                            let step_key = state.step_key();
                            let handle = tokio::spawn(async move {
                                governor.execute(step_key, &tool, arguments).await
                            });
                            executions.push((call_id, handle));
                        }
                        None => {
                            let missing = tokio::spawn(async move {
                                serde_json::json!({
                                    "error": format!("Tool '{name}' not found"),
                                })
                            });
                            executions.push((call_id, missing));
                        }
                    }
                }
                GatewayEvent::Usage { usage: step_usage } => usage.merge(&step_usage),
                GatewayEvent::StepFinished => break,
                GatewayEvent::RunFinished => {
                    run_finished = true;
                    break;
                }
                GatewayEvent::Error { message } => {
                    // Already relayed by the unconditional frame emission
                    // above; a second error frame would be a duplicate.
                    error!(run_id = %self.run_id, error = %message, "gateway reported a stream error");
                    return Err(StepAbort::Failed);
                }
            }
        }

        // A stream that ends without an explicit terminal event counts as
        // a finished run when it requested no tools.
        if requested.is_empty() {
            run_finished = true;
        }

        Ok(StepOutcome {
            requested,
            executions,
            run_finished,
        })
    }

    fn emit(&self, bytes: Vec<u8>) {
        // The client may already be gone; frames are best-effort.
        let _ = self.tx.send(bytes);
    }
}

enum StepAbort {
    Cancelled,
    Failed,
}
