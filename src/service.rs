use std::fmt;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::generator::{ThumbnailGenerator, thumbnail_key};
use crate::notify::{ObjectCreated, Subscription};
use crate::reconciler::{BackfillReport, Reconciler};

/// Lifecycle of the service. `Streaming` lasts until shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Backfilling,
    Streaming,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Backfilling => write!(f, "backfilling"),
            ServiceState::Streaming => write!(f, "streaming"),
        }
    }
}

/// What handling a single notification did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Generated,
    AlreadyPresent,
}

/// Tally of the streaming phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub received: u64,
    pub generated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub malformed: u64,
}

/// Keeps the thumbnail bucket in step with the media bucket
pub struct ThumbnailService {
    generator: ThumbnailGenerator,
    reconciler: Reconciler,
    state: ServiceState,
}

impl ThumbnailService {
    pub fn new(generator: ThumbnailGenerator, reconciler: Reconciler) -> Self {
        Self {
            generator,
            reconciler,
            state: ServiceState::Backfilling,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn generator(&self) -> &ThumbnailGenerator {
        &self.generator
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Backfill once, then process notifications until the subscription ends.
    pub async fn run(&mut self, subscription: Subscription) -> StreamStats {
        if let Some(report) = self.backfill().await {
            debug!("Backfill report: {:?}", report);
        }
        self.stream(subscription).await
    }

    /// One reconciliation pass. A listing failure is logged and skipped; the
    /// missing thumbnails are picked up again on the next start.
    pub async fn backfill(&mut self) -> Option<BackfillReport> {
        self.transition(ServiceState::Backfilling);
        match self.reconciler.backfill(&self.generator).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Reconciliation pass aborted: {}", e);
                None
            }
        }
    }

    /// Consume the subscription sequentially. A failing event never ends the loop.
    pub async fn stream(&mut self, mut subscription: Subscription) -> StreamStats {
        self.transition(ServiceState::Streaming);
        let mut stats = StreamStats::default();

        while let Some(delivery) = subscription.next().await {
            let event = match delivery {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping undeliverable notification: {}", e);
                    stats.malformed += 1;
                    continue;
                }
            };

            stats.received += 1;
            match self.handle_event(&event).await {
                Ok(EventOutcome::Generated) => stats.generated += 1,
                Ok(EventOutcome::AlreadyPresent) => stats.skipped += 1,
                Err(e) => {
                    error!(key = %event.key, "Failed to process notification: {}", e);
                    stats.failed += 1;
                }
            }
        }

        subscription.close().await;
        info!(
            "Notification stream closed: {} received, {} generated, {} skipped, {} failed, {} malformed",
            stats.received, stats.generated, stats.skipped, stats.failed, stats.malformed
        );
        stats
    }

    /// Generate the thumbnail for `event` unless it already exists.
    pub async fn handle_event(&self, event: &ObjectCreated) -> Result<EventOutcome> {
        let key = thumbnail_key(&event.key);
        debug!(
            key = %event.key,
            etag = %event.etag,
            event = %event.event_name,
            "Object created"
        );

        if self
            .generator
            .store()
            .exists(self.generator.thumbnail_bucket(), &key)
            .await?
        {
            info!("Thumbnail exists: {}", key);
            return Ok(EventOutcome::AlreadyPresent);
        }

        self.generator.generate(&event.key, &event.etag).await?;
        Ok(EventOutcome::Generated)
    }

    fn transition(&mut self, next: ServiceState) {
        if self.state != next {
            info!("Service state: {} -> {}", self.state, next);
        } else {
            info!("Service state: {}", next);
        }
        self.state = next;
    }
}
