//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use voice_agent_config::Settings;
use voice_agent_core::{
    PipelineEngine, PublicUrlProvider, SequentialRunAllocator, StaticPublicUrl,
    WorkflowRunAllocator,
};
use voice_agent_telephony::{AdapterContext, InboundDispatcher, ProviderRegistry};

use crate::pipeline::DrainPipeline;
use crate::status::StatusLedger;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration, read-only after startup
    pub config: Arc<Settings>,
    /// Configured providers in detection order
    pub registry: Arc<ProviderRegistry>,
    pub dispatcher: Arc<InboundDispatcher>,
    pub status_ledger: Arc<StatusLedger>,
    /// Host vendors reach us on
    pub public_url: Arc<dyn PublicUrlProvider>,
}

impl AppState {
    /// Build state with explicit pipeline and run allocation collaborators
    pub fn new(
        settings: Settings,
        pipeline: Arc<dyn PipelineEngine>,
        allocator: Arc<dyn WorkflowRunAllocator>,
    ) -> Result<Self, ServerError> {
        let telephony = &settings.telephony;
        let public_url: Arc<dyn PublicUrlProvider> =
            Arc::new(StaticPublicUrl::new(settings.server.public_base_url.clone()));
        let context = AdapterContext::new(
            public_url.clone(),
            pipeline,
            Duration::from_secs(telephony.http_timeout_secs),
        )?
        .with_handshake_timeout(Duration::from_secs(telephony.handshake_timeout_secs));

        let registry = Arc::new(ProviderRegistry::from_config(telephony, context.clone())?);
        let dispatcher = Arc::new(InboundDispatcher::new(
            registry.clone(),
            allocator,
            context,
            telephony.require_signature,
        ));

        if !telephony.require_signature {
            tracing::warn!("Inbound webhook signature checks are disabled");
        }

        Ok(Self {
            config: Arc::new(settings),
            registry,
            dispatcher,
            status_ledger: Arc::new(StatusLedger::new()),
            public_url,
        })
    }

    /// Standalone state: draining pipeline and process-local run ids
    pub fn from_settings(settings: Settings) -> Result<Self, ServerError> {
        Self::new(
            settings,
            Arc::new(DrainPipeline),
            Arc::new(SequentialRunAllocator::default()),
        )
    }
}
