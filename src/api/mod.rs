//! # Read API
//!
//! Local HTTP access to the latest sampling cycle.
//!
//! - `GET /read`: current values, `null` where a sensor produced nothing
//! - `GET /diagnostics`: the acquisition diagnostics behind those values
//!
//! Handlers only read the shared [`DeviceState`]; the sampler is its single
//! writer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::{AquasenseError, Result};
use crate::sensors::{SensorKind, SensorReading};
use crate::telemetry::TelemetrySample;

/// State handle shared between the sampler and the API.
pub type SharedState = Arc<RwLock<DeviceState>>;

/// Latest known device state, in the `/read` response shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceState {
    /// Every registered sensor produced a value in the last cycle
    pub sensor_ready: bool,
    pub last_update: Option<DateTime<Utc>>,
    /// Seconds since the sampler started
    pub uptime: Option<f64>,
    pub turbidity: Option<f64>,
    pub temperature: Option<f64>,
    pub total_dissolved_solids: Option<f64>,
    #[serde(rename = "pH")]
    pub ph: Option<f64>,
    #[serde(skip)]
    pub readings: Vec<SensorReading>,
}

impl DeviceState {
    /// Replace the state with one cycle's results.
    ///
    /// `registered` lists the sensors the device carries; `sensor_ready`
    /// requires a value from each of them.
    pub fn record_cycle(
        &mut self,
        sample: &TelemetrySample,
        readings: &[SensorReading],
        registered: &[SensorKind],
    ) {
        self.sensor_ready = !registered.is_empty()
            && registered.iter().all(|kind| sample.value(*kind).is_some());
        self.last_update = Some(sample.measured_at);
        self.uptime = Some(sample.uptime);
        self.turbidity = sample.turbidity;
        self.temperature = sample.temperature;
        self.total_dissolved_solids = sample.total_dissolved_solids;
        self.ph = sample.ph;
        self.readings = readings.to_vec();
    }
}

/// Fresh, empty shared state
#[must_use]
pub fn shared_state() -> SharedState {
    Arc::new(RwLock::new(DeviceState::default()))
}

/// Routes of the read API
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/read", get(read_handler))
        .route("/diagnostics", get(diagnostics_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the read API on `bind` until the task is dropped.
///
/// # Errors
///
/// Returns `Config` for an unparsable address and `Io` if the listener
/// cannot be bound or the server fails.
pub async fn serve(bind: &str, state: SharedState) -> Result<()> {
    let addr: SocketAddr = bind.parse().map_err(|e| {
        AquasenseError::Config(toml::de::Error::custom(format!(
            "Invalid api bind '{}': {}",
            bind, e
        )))
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Read API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn read_handler(State(state): State<SharedState>) -> Json<DeviceState> {
    let state = state.read().await;
    Json(state.clone())
}

async fn diagnostics_handler(State(state): State<SharedState>) -> Json<Vec<SensorReading>> {
    let state = state.read().await;
    Json(state.readings.clone())
}
