//! # Sampler Module
//!
//! Runs the periodic sampling cycle.
//!
//! ## Cycle
//!
//! 1. Acquire: the ADC chain (pH, then turbidity) and the 1-Wire
//!    temperature read run in parallel on blocking threads. TDS follows
//!    on the ADC chain so it can use the fresh temperature.
//! 2. Append the sample to the CSV log.
//! 3. Start the upload on its own task. The cycle does not wait for it.
//! 4. Publish the cycle to the shared API state.
//!
//! ## Schedule
//!
//! Deadlines sit on a fixed grid, `next = previous + period`, so cycle
//! duration never accumulates as drift. A cycle that overruns its deadline
//! is followed by one immediate cycle and the grid then resumes; missed
//! deadlines are not replayed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::{self, JoinHandle};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::SharedState;
use crate::error::Result;
use crate::sensors::{BusKind, Conditions, SensorKind, SensorReading, SensorReadingService};
use crate::telemetry::{CsvLogger, TelemetrySample, Uploader};

/// Run `cycle` every `period` until `shutdown` resolves.
///
/// The first cycle starts immediately. A running cycle is always allowed
/// to finish. Returns the number of cycles run.
pub async fn run_periodic<F, Fut, S>(period: Duration, shutdown: S, mut cycle: F) -> u64
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut cycles = 0;
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            _ = ticker.tick() => {
                cycle(cycles).await;
                cycles += 1;
            }
        }
    }
    cycles
}

/// Read every registered sensor once, off the async runtime.
pub async fn acquire_cycle(service: Arc<SensorReadingService>) -> Vec<SensorReading> {
    let temperature = service.sensor(SensorKind::Temperature).map(|probe| {
        task::spawn_blocking(move || probe.read(&Conditions::default()))
    });

    let adc_chain: Vec<SensorKind> = service
        .kinds()
        .filter(|kind| kind.bus() == BusKind::Adc && *kind != SensorKind::Tds)
        .collect();
    let chain_service = Arc::clone(&service);
    let chain = task::spawn_blocking(move || {
        adc_chain
            .into_iter()
            .filter_map(|kind| chain_service.read(kind).ok())
            .collect::<Vec<_>>()
    });

    let mut readings = Vec::with_capacity(4);

    match chain.await {
        Ok(chain_readings) => readings.extend(chain_readings),
        Err(e) => error!("ADC acquisition task failed: {}", e),
    }

    let mut conditions = Conditions::default();
    if let Some(handle) = temperature {
        match handle.await {
            Ok(reading) => {
                conditions.water_temperature = reading.value;
                readings.push(reading);
            }
            Err(e) => error!("Temperature acquisition task failed: {}", e),
        }
    }

    if let Some(tds) = service.sensor(SensorKind::Tds) {
        match task::spawn_blocking(move || tds.read(&conditions)).await {
            Ok(reading) => readings.push(reading),
            Err(e) => error!("TDS acquisition task failed: {}", e),
        }
    }

    readings
}

/// Everything a cycle produced.
#[derive(Debug)]
pub struct CycleOutcome {
    pub sample: TelemetrySample,
    pub readings: Vec<SensorReading>,
    /// Background upload, if uploading is enabled
    pub upload: Option<JoinHandle<Result<u32>>>,
}

/// The device's sampling loop.
pub struct Sampler {
    device_id: String,
    service: Arc<SensorReadingService>,
    state: SharedState,
    period: Duration,
    logger: Option<CsvLogger>,
    uploader: Option<Uploader>,
    started: Instant,
}

impl Sampler {
    pub fn new(
        device_id: impl Into<String>,
        service: Arc<SensorReadingService>,
        state: SharedState,
        period: Duration,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            service,
            state,
            period,
            logger: None,
            uploader: None,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_csv_log(mut self, logger: CsvLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one sampling cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let measured_at = Utc::now();
        let uptime = self.started.elapsed().as_secs_f64();

        let readings = acquire_cycle(Arc::clone(&self.service)).await;
        let sample = TelemetrySample::from_readings(&self.device_id, measured_at, uptime, &readings);

        let missing: Vec<_> = readings
            .iter()
            .filter(|r| r.value.is_none())
            .map(|r| r.sensor.key())
            .collect();
        if missing.is_empty() {
            info!(
                "Cycle at {}: turbidity={:?} temperature={:?} tds={:?} ph={:?}",
                measured_at.to_rfc3339(),
                sample.turbidity,
                sample.temperature,
                sample.total_dissolved_solids,
                sample.ph
            );
        } else {
            warn!(
                "Cycle at {} without values for: {}",
                measured_at.to_rfc3339(),
                missing.join(", ")
            );
        }

        if let Some(logger) = &self.logger {
            let logger = logger.clone();
            let row = sample.clone();
            match task::spawn_blocking(move || logger.append(&row)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to log sample: {}", e),
                Err(e) => error!("Sample log task failed: {}", e),
            }
        }

        let upload = self.uploader.as_ref().map(|uploader| {
            let uploader = uploader.clone();
            let payload = sample.clone();
            tokio::spawn(async move { uploader.upload(&payload).await })
        });

        let registered: Vec<SensorKind> = self.service.kinds().collect();
        self.state
            .write()
            .await
            .record_cycle(&sample, &readings, &registered);

        CycleOutcome {
            sample,
            readings,
            upload,
        }
    }

    /// Sample every period until `shutdown` resolves.
    pub async fn run<S>(&self, shutdown: S) -> u64
    where
        S: Future<Output = ()>,
    {
        info!("Sampling every {:?}", self.period);
        let cycles = run_periodic(self.period, shutdown, move |_| async move {
            self.run_cycle().await;
        })
        .await;
        info!("Sampler stopped after {} cycle(s)", cycles);
        cycles
    }
}
