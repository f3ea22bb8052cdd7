use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use reviewhook_core::{BusEvent, EventBus, Pipeline, PipelineState};

/// In-process event bus backed by an unbounded channel.
#[derive(Clone)]
pub struct ChannelEventBus {
    sender: mpsc::UnboundedSender<BusEvent>,
}

impl ChannelEventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish(&self, event: BusEvent) -> Result<()> {
        let id = event.id;
        self.sender
            .send(event)
            .map_err(|_| anyhow!("event bus is closed"))?;
        info!("Published event {} to the bus", id);
        Ok(())
    }
}

/// Deliver bus events to the pipeline, one spawned run per event.
///
/// Runs until every sender has been dropped.
pub async fn dispatch_loop(mut receiver: mpsc::UnboundedReceiver<BusEvent>, pipeline: Arc<Pipeline>) {
    while let Some(event) = receiver.recv().await {
        if !event.matches_review_rule() {
            warn!(
                "Dropping event {} with source '{}' and detail-type '{}'",
                event.id, event.source, event.detail_type
            );
            continue;
        }

        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let id = event.id;
            let report = pipeline.process(event).await;
            match report.final_state() {
                Some(PipelineState::Done) => info!("Pipeline run for event {} finished", id),
                _ => warn!(
                    "Pipeline run for event {} failed: {}",
                    id,
                    report
                        .error
                        .as_ref()
                        .or(report.notification_error.as_ref())
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown error".to_string())
                ),
            }
        });
    }

    info!("Event bus closed, dispatch loop exiting");
}
