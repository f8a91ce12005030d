use crate::config::DatabaseConfig;
use crate::error::IngestError;
use serde::Serialize;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// One calendar day of drone activity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Flight {
    /// Natural key: `flight-{YYYY-MM-DD}`
    pub id: String,
    /// ISO date
    pub date: String,
}

/// One scored, geolocated observation
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Waypoint {
    /// Natural key: the source image's storage key
    pub id: String,
    pub flight_id: String,
    pub lat: f64,
    pub lng: f64,
    /// Integer in [0, 100]
    pub trash_score: i64,
    /// True when the image could not be fetched or scored and a zero
    /// score was recorded in degraded mode
    pub score_unavailable: bool,
    pub image_url: Option<String>,
    /// Time of day, `HH:MM:SS`
    pub timestamp: String,
}

/// A waypoint ready to be persisted, with the parent flight it belongs to
#[derive(Debug, Clone)]
pub struct NewWaypoint {
    pub id: String,
    pub flight_id: String,
    pub flight_date: String,
    pub lat: f64,
    pub lng: f64,
    pub trash_score: i64,
    pub score_unavailable: bool,
    pub image_url: Option<String>,
    pub timestamp: String,
}

/// A flight with its waypoints nested, sorted by timestamp ascending
#[derive(Debug, Clone)]
pub struct FlightWithWaypoints {
    pub flight: Flight,
    pub waypoints: Vec<Waypoint>,
}

/// Durable store of flights and waypoints in SQLite
pub struct FlightStore {
    pool: SqlitePool,
}

impl FlightStore {
    /// Create a new store with a connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self, IngestError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(IngestError::Persistence)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(IngestError::Persistence)?;

        info!(url = %config.url, "Connected to SQLite database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<(), IngestError> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IngestError::Persistence(sqlx::Error::Migrate(Box::new(e))))?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Create the flight row if absent; no-op if it already exists.
    pub async fn ensure_flight(&self, flight_id: &str, date: &str) -> Result<(), IngestError> {
        let mut conn = self.pool.acquire().await.map_err(IngestError::Persistence)?;
        Self::ensure_flight_on(&mut conn, flight_id, date).await
    }

    async fn ensure_flight_on(
        conn: &mut sqlx::SqliteConnection,
        flight_id: &str,
        date: &str,
    ) -> Result<(), IngestError> {
        sqlx::query("INSERT INTO flights (id, date) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(flight_id)
            .bind(date)
            .execute(&mut *conn)
            .await
            .map_err(IngestError::Persistence)?;
        Ok(())
    }

    /// Persist a waypoint and its parent flight as one atomic unit.
    ///
    /// Either both rows persist or neither does. A unique-key collision on
    /// the waypoint id rolls the whole cycle back and surfaces as
    /// `DuplicateWaypoint`, the expected outcome for a redelivered
    /// message rather than a crash condition.
    #[instrument(skip(self, waypoint), fields(waypoint_id = %waypoint.id, flight_id = %waypoint.flight_id))]
    pub async fn insert_waypoint(&self, waypoint: &NewWaypoint) -> Result<(), IngestError> {
        let mut tx = self.pool.begin().await.map_err(IngestError::Persistence)?;

        Self::ensure_flight_on(&mut tx, &waypoint.flight_id, &waypoint.flight_date).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO waypoints (
                id, flight_id, lat, lng, trash_score,
                score_unavailable, image_url, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&waypoint.id)
        .bind(&waypoint.flight_id)
        .bind(waypoint.lat)
        .bind(waypoint.lng)
        .bind(waypoint.trash_score)
        .bind(waypoint.score_unavailable)
        .bind(&waypoint.image_url)
        .bind(&waypoint.timestamp)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await.map_err(IngestError::Persistence)?;
                debug!("Waypoint persisted");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if matches!(db.kind(), ErrorKind::UniqueViolation) => {
                Err(IngestError::DuplicateWaypoint {
                    id: waypoint.id.clone(),
                })
            }
            Err(e) => Err(IngestError::Persistence(e)),
        }
    }

    /// All flights ordered by date, each with waypoints ordered by
    /// timestamp ascending.
    pub async fn list_flights(&self) -> Result<Vec<FlightWithWaypoints>, IngestError> {
        let flights: Vec<Flight> = sqlx::query_as("SELECT id, date FROM flights ORDER BY date ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(IngestError::Persistence)?;

        let waypoints: Vec<Waypoint> = sqlx::query_as(
            r#"
            SELECT id, flight_id, lat, lng, trash_score,
                   score_unavailable, image_url, timestamp
            FROM waypoints
            ORDER BY flight_id, timestamp ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(IngestError::Persistence)?;

        let mut by_flight: HashMap<String, Vec<Waypoint>> = HashMap::new();
        for waypoint in waypoints {
            by_flight
                .entry(waypoint.flight_id.clone())
                .or_default()
                .push(waypoint);
        }

        Ok(flights
            .into_iter()
            .map(|flight| {
                let waypoints = by_flight.remove(&flight.id).unwrap_or_default();
                FlightWithWaypoints { flight, waypoints }
            })
            .collect())
    }

    /// One flight with nested waypoints, or None
    pub async fn get_flight(&self, flight_id: &str) -> Result<Option<FlightWithWaypoints>, IngestError> {
        let flight: Option<Flight> = sqlx::query_as("SELECT id, date FROM flights WHERE id = ?")
            .bind(flight_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(IngestError::Persistence)?;

        let Some(flight) = flight else {
            return Ok(None);
        };

        let waypoints: Vec<Waypoint> = sqlx::query_as(
            r#"
            SELECT id, flight_id, lat, lng, trash_score,
                   score_unavailable, image_url, timestamp
            FROM waypoints
            WHERE flight_id = ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(flight_id)
        .fetch_all(&self.pool)
        .await
        .map_err(IngestError::Persistence)?;

        Ok(Some(FlightWithWaypoints { flight, waypoints }))
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> FlightStore {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            run_migrations: true,
        };
        let store = FlightStore::new(&config).await.unwrap();
        store.run_migrations().await.unwrap();
        store
    }

    fn waypoint(id: &str, date: &str, time: &str) -> NewWaypoint {
        NewWaypoint {
            id: id.to_string(),
            flight_id: format!("flight-{date}"),
            flight_date: date.to_string(),
            lat: 34.09,
            lng: 74.87,
            trash_score: 37,
            score_unavailable: false,
            image_url: Some(format!("https://bucket.example/{id}")),
            timestamp: time.to_string(),
        }
    }

    #[tokio::test]
    async fn test_ensure_flight_is_idempotent() {
        let store = memory_store().await;

        store.ensure_flight("flight-2025-10-11", "2025-10-11").await.unwrap();
        store.ensure_flight("flight-2025-10-11", "2025-10-11").await.unwrap();

        let flights = store.list_flights().await.unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].flight.id, "flight-2025-10-11");
        assert_eq!(flights[0].flight.date, "2025-10-11");
    }

    #[tokio::test]
    async fn test_insert_waypoint_creates_flight_and_row() {
        let store = memory_store().await;

        store
            .insert_waypoint(&waypoint("img-42", "2025-10-11", "15:50:57"))
            .await
            .unwrap();

        let flight = store.get_flight("flight-2025-10-11").await.unwrap().unwrap();
        assert_eq!(flight.waypoints.len(), 1);
        let wp = &flight.waypoints[0];
        assert_eq!(wp.id, "img-42");
        assert_eq!(wp.lat, 34.09);
        assert_eq!(wp.lng, 74.87);
        assert_eq!(wp.trash_score, 37);
        assert!(!wp.score_unavailable);
        assert_eq!(wp.timestamp, "15:50:57");
    }

    #[tokio::test]
    async fn test_duplicate_waypoint_is_rejected_first_write_wins() {
        let store = memory_store().await;

        store
            .insert_waypoint(&waypoint("img-42", "2025-10-11", "15:50:57"))
            .await
            .unwrap();

        let mut second = waypoint("img-42", "2025-10-11", "16:00:00");
        second.lat = 1.0;
        second.lng = 2.0;
        let err = store.insert_waypoint(&second).await.unwrap_err();
        assert!(matches!(err, IngestError::DuplicateWaypoint { ref id } if id == "img-42"));

        let flight = store.get_flight("flight-2025-10-11").await.unwrap().unwrap();
        assert_eq!(flight.waypoints.len(), 1);
        assert_eq!(flight.waypoints[0].lat, 34.09);
        assert_eq!(flight.waypoints[0].timestamp, "15:50:57");
    }

    #[tokio::test]
    async fn test_duplicate_insert_rolls_back_flight_creation() {
        let store = memory_store().await;

        store
            .insert_waypoint(&waypoint("img-42", "2025-10-11", "15:50:57"))
            .await
            .unwrap();

        // Same waypoint id arriving under a different capture date must not
        // leave behind a flight row for that date.
        let err = store
            .insert_waypoint(&waypoint("img-42", "2025-10-12", "09:00:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::DuplicateWaypoint { .. }));

        let flights = store.list_flights().await.unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].flight.id, "flight-2025-10-11");
    }

    #[tokio::test]
    async fn test_waypoints_sorted_by_timestamp() {
        let store = memory_store().await;

        for (id, time) in [
            ("img-3", "16:10:00"),
            ("img-1", "08:05:12"),
            ("img-2", "12:30:44"),
        ] {
            store
                .insert_waypoint(&waypoint(id, "2025-10-11", time))
                .await
                .unwrap();
        }

        let flight = store.get_flight("flight-2025-10-11").await.unwrap().unwrap();
        let times: Vec<&str> = flight.waypoints.iter().map(|w| w.timestamp.as_str()).collect();
        assert_eq!(times, vec!["08:05:12", "12:30:44", "16:10:00"]);
    }

    #[tokio::test]
    async fn test_list_flights_ordered_by_date() {
        let store = memory_store().await;

        store
            .insert_waypoint(&waypoint("img-b", "2025-10-12", "10:00:00"))
            .await
            .unwrap();
        store
            .insert_waypoint(&waypoint("img-a", "2025-10-11", "10:00:00"))
            .await
            .unwrap();

        let flights = store.list_flights().await.unwrap();
        let ids: Vec<&str> = flights.iter().map(|f| f.flight.id.as_str()).collect();
        assert_eq!(ids, vec!["flight-2025-10-11", "flight-2025-10-12"]);
    }

    #[tokio::test]
    async fn test_get_flight_not_found() {
        let store = memory_store().await;
        assert!(store.get_flight("flight-2099-01-01").await.unwrap().is_none());
    }
}
