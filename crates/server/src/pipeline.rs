//! Placeholder pipeline engine
//!
//! Deployments plug their voice pipeline in through `PipelineEngine`. The
//! default engine keeps the stream open and drains it until the vendor
//! hangs up, so calls connect end to end without a pipeline attached.

use async_trait::async_trait;

use voice_agent_core::{AudioConnection, ConnectionMessage, PipelineEngine, StreamContext};

#[derive(Debug, Clone, Copy, Default)]
pub struct DrainPipeline;

#[async_trait]
impl PipelineEngine for DrainPipeline {
    async fn run_pipeline(&self, mut connection: Box<dyn AudioConnection>, context: StreamContext) {
        let mut text_frames = 0u64;
        let mut binary_bytes = 0usize;

        while let Some(frame) = connection.recv().await {
            match frame {
                Ok(ConnectionMessage::Text(_)) => text_frames += 1,
                Ok(ConnectionMessage::Binary(data)) => binary_bytes += data.len(),
                Err(e) => {
                    tracing::warn!(call_id = %context.call_id, error = %e, "Audio stream failed");
                    break;
                },
            }
        }

        tracing::info!(
            provider = %context.provider,
            call_id = %context.call_id,
            stream_id = %context.stream_id,
            workflow_run_id = context.workflow_run_id,
            text_frames,
            binary_bytes,
            "Audio stream ended"
        );
    }
}
