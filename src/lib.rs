//! Skysweep Ingestion Service
//!
//! Waypoint ingestion service for the Skysweep aerial trash survey
//! platform. A drone photographs a water body along its flight path; each
//! capture is uploaded to S3 and announced on an SQS queue. This service
//! consumes those capture events one at a time, downloads the image, runs
//! the trash-scoring model, and durably records the waypoint under its
//! daily flight record, acknowledging the message only after the row is
//! committed, so the at-least-once queue and the unique waypoint key
//! together give exactly-once persistence.
//!
//! ## Features
//!
//! - **Idempotent Ingestion**: waypoint ids are the source image's storage
//!   key, so redelivered messages dedup in the store instead of duplicating
//! - **Degraded Scoring**: a missing or undecodable image records a zero
//!   score with an explicit `scoreUnavailable` flag rather than blocking
//!   the queue
//! - **Atomic Persistence**: flight creation and waypoint insert commit as
//!   one transaction; a crash mid-cycle never leaves a partial record
//! - **Read API**: flights with nested, time-ordered waypoints over HTTP
//!   for the map frontend
//!
//! ## Architecture
//!
//! ```text
//! SQS Queue                   S3 Bucket                SQLite
//! ┌──────────────┐           ┌──────────────┐         ┌──────────────┐
//! │ capture      │           │ aerial       │         │ flights      │
//! │ events       │           │ images       │         │ waypoints    │
//! └──────────────┘           └──────────────┘         └──────────────┘
//!        │                          │                        ▲
//!        ▼                          ▼                        │
//! ┌──────────────┐           ┌──────────────┐         ┌──────────────┐
//! │ Ingest       │──────────▶│ Image        │         │ Flight       │
//! │ Worker       │           │ Fetcher      │         │ Store        │
//! └──────────────┘           └──────────────┘         └──────────────┘
//!        │                          │                        ▲
//!        │                          ▼                        │
//!        │                   ┌──────────────┐                │
//!        └──────────────────▶│ Trash        │────────────────┘
//!                            │ Scorer       │
//!                            └──────────────┘
//!                                                     ┌──────────────┐
//!                                                     │ Read API     │
//!                                                     │ /flights     │
//!                                                     └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod queue;
pub mod scorer;
pub mod store;
pub mod worker;

pub use api::{AppState, FlightResponse, WaypointResponse};
pub use config::Config;
pub use error::IngestError;
pub use fetcher::{FetchedImage, ImageFetcher, S3ImageFetcher};
pub use queue::{MessageQueue, QueueMessage, SqsQueue};
pub use scorer::{SidecarScorer, TrashScorer};
pub use store::{Flight, FlightStore, FlightWithWaypoints, NewWaypoint, Waypoint};
pub use worker::{CaptureEvent, IngestWorker};
