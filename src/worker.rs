use crate::error::IngestError;
use crate::fetcher::ImageFetcher;
use crate::queue::{MessageQueue, QueueMessage};
use crate::scorer::TrashScorer;
use crate::store::{FlightStore, NewWaypoint};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Capture event received from the queue when a new aerial image lands
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    /// Unique storage key of the source image; doubles as the waypoint id
    pub s3_key: String,
    /// Display/reference URL for the stored image
    pub s3_location: String,
    /// Storage bucket holding the image
    pub bucket: String,
    /// Capture time, ISO-8601 `YYYY-MM-DDTHH:MM:SS[.ffffff][Z]`
    pub timestamp: String,
    /// Nested capture metadata
    pub metadata: CaptureMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureMetadata {
    pub location: GeoLocation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Split a capture timestamp into its date and time-of-day parts.
///
/// `2025-10-11T15:50:57.000Z` -> (`2025-10-11`, `15:50:57`). The date part
/// names the flight; the time part orders waypoints within it.
fn split_capture_timestamp(raw: &str) -> Result<(String, String), IngestError> {
    let trimmed = raw.trim_end_matches('Z');
    let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").map_err(|e| {
        IngestError::MalformedMessage(format!("bad capture timestamp {raw:?}: {e}"))
    })?;

    Ok((
        parsed.format("%Y-%m-%d").to_string(),
        parsed.format("%H:%M:%S").to_string(),
    ))
}

/// Queue-driven ingestion worker.
///
/// Single-consumer cooperative loop: one message is polled, fully processed
/// (download, score, persist), and acknowledged before the next poll. All
/// collaborators are injected so tests can substitute fakes.
pub struct IngestWorker {
    queue: Arc<dyn MessageQueue>,
    fetcher: Arc<dyn ImageFetcher>,
    scorer: Arc<dyn TrashScorer>,
    store: Arc<FlightStore>,
    idle_sleep: Duration,
    error_backoff: Duration,
    shutdown: CancellationToken,
}

impl IngestWorker {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        fetcher: Arc<dyn ImageFetcher>,
        scorer: Arc<dyn TrashScorer>,
        store: Arc<FlightStore>,
        config: &crate::config::QueueConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            fetcher,
            scorer,
            store,
            idle_sleep: config.idle_sleep(),
            error_backoff: config.error_backoff(),
            shutdown,
        }
    }

    /// Run the poll loop until shutdown is requested.
    ///
    /// Cancellation takes effect between cycles: a message already received
    /// is processed to completion so no cycle is cut mid-flight.
    pub async fn run(&self) {
        info!("Ingestion worker started");

        while !self.shutdown.is_cancelled() {
            let received = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.queue.receive() => received,
            };

            match received {
                Ok(Some(message)) => self.handle_message(message).await,
                Ok(None) => {
                    debug!("Queue is empty");
                    self.pause(self.idle_sleep).await;
                }
                Err(e) => {
                    error!(error = %e, "Queue receive failed");
                    metrics::counter!("ingest.queue.errors").increment(1);
                    self.pause(self.error_backoff).await;
                }
            }
        }

        info!("Ingestion worker stopped");
    }

    /// Process one message and decide its acknowledgment.
    ///
    /// Every error is absorbed at this boundary; nothing propagates out to
    /// kill the loop. Duplicates still acknowledge because the row already
    /// exists and the message must not redeliver. Malformed messages are
    /// abandoned to the queue's own retention/DLQ policy. Anything else is
    /// left unacknowledged for redelivery after the visibility timeout.
    #[instrument(skip(self, message), fields(receive_count = message.receive_count))]
    async fn handle_message(&self, message: QueueMessage) {
        match self.process(&message).await {
            Ok(s3_key) => {
                metrics::counter!("ingest.messages.processed").increment(1);
                info!(s3_key = %s3_key, "Capture event processed");
                self.acknowledge(&message).await;
            }
            Err(IngestError::DuplicateWaypoint { ref id }) => {
                metrics::counter!("ingest.waypoints.duplicate").increment(1);
                info!(s3_key = %id, "Waypoint already recorded; acknowledging duplicate");
                self.acknowledge(&message).await;
            }
            Err(IngestError::MalformedMessage(ref reason)) => {
                metrics::counter!("ingest.messages.malformed").increment(1);
                warn!(reason = %reason, "Malformed message abandoned");
            }
            Err(e) => {
                metrics::counter!("ingest.messages.failed").increment(1);
                error!(error = %e, "Failed to process message; leaving for redelivery");
            }
        }
    }

    async fn process(&self, message: &QueueMessage) -> Result<String, IngestError> {
        let event: CaptureEvent = serde_json::from_str(&message.body)
            .map_err(|e| IngestError::MalformedMessage(e.to_string()))?;

        let (flight_date, time_of_day) = split_capture_timestamp(&event.timestamp)?;
        let flight_id = format!("flight-{flight_date}");

        info!(
            s3_key = %event.s3_key,
            lat = event.metadata.location.latitude,
            lng = event.metadata.location.longitude,
            "Received capture event"
        );

        // Degraded mode: a missing or undecodable image never blocks the
        // queue. The flag keeps "could not be scored" distinguishable from
        // "scored as clean".
        let (trash_score, score_unavailable) = match self.fetch_and_score(&event).await {
            Ok(score) => (score, false),
            Err(e) => {
                metrics::counter!("ingest.score.degraded").increment(1);
                warn!(s3_key = %event.s3_key, error = %e, "Recording degraded zero score");
                (0, true)
            }
        };

        let waypoint = NewWaypoint {
            id: event.s3_key.clone(),
            flight_id,
            flight_date,
            lat: event.metadata.location.latitude,
            lng: event.metadata.location.longitude,
            trash_score,
            score_unavailable,
            image_url: Some(event.s3_location.clone()),
            timestamp: time_of_day,
        };

        self.store.insert_waypoint(&waypoint).await?;
        metrics::counter!("ingest.waypoints.stored").increment(1);

        Ok(event.s3_key)
    }

    async fn fetch_and_score(&self, event: &CaptureEvent) -> Result<i64, IngestError> {
        let image = self.fetcher.fetch(&event.bucket, &event.s3_key).await?;
        self.scorer.score(image.path()).await
    }

    async fn acknowledge(&self, message: &QueueMessage) {
        if let Err(e) = self.queue.acknowledge(&message.receipt_handle).await {
            warn!(error = %e, "Failed to delete message from queue");
        }
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}
