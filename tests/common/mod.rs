//! Shared test helpers: a scripted gateway and a single-use resolver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use maestro::error::{MaestroError, Result};
use maestro::gateway::{GatewayRequest, GatewayResolver, ModelGateway};
use maestro::types::GatewayEvent;

/// One step's scripted event sequence.
pub struct Script {
    pub events: Vec<GatewayEvent>,
    /// Keep the stream open (pending forever) after the events, so a test
    /// can cancel mid-stream at a known point.
    pub hang: bool,
}

impl Script {
    pub fn finished(events: Vec<GatewayEvent>) -> Self {
        Self {
            events,
            hang: false,
        }
    }

    pub fn hanging(events: Vec<GatewayEvent>) -> Self {
        Self { events, hang: true }
    }
}

/// Gateway that replays pre-scripted steps and records each request.
pub struct ScriptedGateway {
    steps: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedGateway {
    pub fn new(steps: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request_turn_counts(&self) -> Vec<usize> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.turns.len())
            .collect()
    }
}

/// Local handle so the shared gateway can be boxed as a trait object while
/// the test keeps its own `Arc` for inspection.
pub struct SharedGateway(pub Arc<ScriptedGateway>);

#[async_trait]
impl ModelGateway for SharedGateway {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn stream_step(
        &self,
        request: &GatewayRequest,
    ) -> Result<BoxStream<'static, Result<GatewayEvent>>> {
        self.0.requests.lock().unwrap().push(request.clone());
        let script = self
            .0
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::finished(vec![GatewayEvent::RunFinished]));
        let Script { events, hang } = script;
        let head = futures::stream::iter(events.into_iter().map(Ok));
        if hang {
            Ok(head.chain(futures::stream::pending()).boxed())
        } else {
            Ok(head.boxed())
        }
    }
}

/// Resolver handing out one pre-built gateway, once.
pub struct SingleGatewayResolver {
    gateway: Mutex<Option<Box<dyn ModelGateway>>>,
}

impl SingleGatewayResolver {
    pub fn new(gateway: Box<dyn ModelGateway>) -> Arc<Self> {
        Arc::new(Self {
            gateway: Mutex::new(Some(gateway)),
        })
    }
}

impl GatewayResolver for SingleGatewayResolver {
    fn resolve(&self, _model: &str) -> Result<Box<dyn ModelGateway>> {
        self.gateway
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| MaestroError::InvalidState("gateway already resolved".into()))
    }
}

/// Resolve the scripted gateway into a runner-compatible resolver.
pub fn scripted_resolver(gateway: Arc<ScriptedGateway>) -> Arc<SingleGatewayResolver> {
    SingleGatewayResolver::new(Box::new(SharedGateway(gateway)))
}
