//! Sampling engine
//!
//! STARTUP resolves capabilities and announces the session, SAMPLING runs
//! one row per tick at the configured rate, SHUTDOWN flushes whatever is
//! left and releases both sources and the dispatcher.

use crate::clock::{Clock, ClockError};
use crate::signals::ControlFlags;
use crate::sources::{DiagnosticAdapter, PositionAdapter, PositionConnector};
use cloud_sync::{Dispatcher, Transport};
use obd_protocol::{resolve, CapabilitySet, DiagnosticLink, ObdError, RPM_COLUMN};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{
    build_header, BatchAccumulator, DriveSession, FlushPolicy, FlushReason, PositionReadings,
    Reading, RowAssembler, SealedBatch, POSITION_COLUMNS,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Shortest pause between ticks
const MIN_WAIT: Duration = Duration::from_micros(1);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("No destination queue address configured")]
    NoDestination,

    #[error("Neither the OBD adapter nor gpsd is available")]
    NoSources,

    #[error("Cannot read the system clock: {0}")]
    Clock(#[from] ClockError),

    #[error("Cannot install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

/// Why sampling ended
#[derive(Debug)]
pub enum StopReason {
    ExitRequested,
    SampleCountReached,
    DiagnosticFailure(ObdError),
    ClockFailure(ClockError),
}

impl StopReason {
    /// True when sampling ended on an error rather than on request
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::DiagnosticFailure(_) | StopReason::ClockFailure(_))
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub session: DriveSession,
    pub ticks: u64,
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub stop: StopReason,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub destination: String,
    pub wishlist: Vec<String>,
    pub optimisations: bool,
    /// `None` samples as fast as possible
    pub interval: Option<Duration>,
    pub sample_count: Option<u64>,
    pub max_payload_bytes: usize,
    pub flush_on_engine_stop: bool,
    pub verbose: bool,
}

pub struct Engine<L, C: PositionConnector, T, K> {
    settings: EngineSettings,
    capabilities: CapabilitySet,
    diagnostic: DiagnosticAdapter<L>,
    position: PositionAdapter<C>,
    assembler: RowAssembler,
    accumulator: BatchAccumulator,
    dispatcher: Dispatcher<T>,
    clock: K,
    flags: Arc<ControlFlags>,
    ticks: u64,
}

impl<L, C, T, K> Engine<L, C, T, K>
where
    L: DiagnosticLink,
    C: PositionConnector,
    T: Transport,
    K: Clock,
{
    /// Resolve capabilities and announce `session`.
    ///
    /// Fails before anything is sent when there is no destination or
    /// neither source is available.
    pub async fn startup(
        settings: EngineSettings,
        session: DriveSession,
        mut diagnostic: Option<L>,
        position: PositionAdapter<C>,
        transport: T,
        clock: K,
        flags: Arc<ControlFlags>,
    ) -> Result<Self, StartupError> {
        if settings.destination.trim().is_empty() {
            return Err(StartupError::NoDestination);
        }
        if diagnostic.is_none() && !position.is_connected() {
            return Err(StartupError::NoSources);
        }

        let capabilities = resolve(diagnostic.as_mut(), &settings.wishlist).await;
        let header = build_header(capabilities.columns());
        let engine_stop = settings.flush_on_engine_stop.then_some(RPM_COLUMN);
        let policy = FlushPolicy::standard(&header, settings.max_payload_bytes, engine_stop);
        info!("Logging columns: {}", header.join(","));

        let mut dispatcher = Dispatcher::new(transport, settings.destination.clone());
        info!("Starting drive session {}", session);
        // A failed announcement is logged by the dispatcher; sampling goes on
        let _ = dispatcher.send_start(session).await;

        Ok(Self {
            assembler: RowAssembler::new(capabilities.len()),
            accumulator: BatchAccumulator::new(session, header, policy),
            diagnostic: DiagnosticAdapter::new(diagnostic, settings.optimisations),
            capabilities,
            position,
            dispatcher,
            clock,
            flags,
            settings,
            ticks: 0,
        })
    }

    pub fn session(&self) -> DriveSession {
        self.accumulator.session()
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Sample until stopped, then shut down
    pub async fn run(mut self) -> RunSummary {
        let stop = loop {
            let tick_start = Instant::now();
            match self.tick().await {
                Ok(Some(stop)) => break stop,
                Ok(None) => {}
                Err(e) => {
                    error!("{}. Exiting", e);
                    break StopReason::ClockFailure(e);
                }
            }
            self.pace(tick_start).await;
        };
        self.shutdown(stop).await
    }

    /// One row cycle
    async fn tick(&mut self) -> Result<Option<StopReason>, ClockError> {
        if self.flags.take_trip_boundary() {
            self.start_trip().await;
        }

        let now = self.clock.now()?;
        let (diagnostics, fatal) = self.diagnostic.read_all(&self.capabilities).await;
        let position = self.position.read(now).await;
        if self.settings.verbose {
            self.echo(&diagnostics, position.as_ref());
        }

        match self.assembler.assemble(now, &diagnostics, position.as_ref()) {
            Ok(row) => match self.accumulator.append(row) {
                Ok(Some((batch, reason))) => self.flush(&batch, reason).await,
                Ok(None) => {}
                Err(e) => warn!("Row dropped: {}", e),
            },
            Err(e) => warn!("Row dropped: {}", e),
        }
        self.ticks += 1;

        if let Some(e) = fatal {
            error!("Received fatal OBD error: {}. Exiting", e);
            self.flags.request_exit();
            return Ok(Some(StopReason::DiagnosticFailure(e)));
        }
        if self.flags.exit_requested() {
            return Ok(Some(StopReason::ExitRequested));
        }
        if self.settings.sample_count.is_some_and(|count| self.ticks >= count) {
            return Ok(Some(StopReason::SampleCountReached));
        }
        Ok(None)
    }

    /// Wait out the rest of the tick
    async fn pace(&mut self, tick_start: Instant) {
        match self.settings.interval {
            Some(interval) => {
                let wait = interval.saturating_sub(tick_start.elapsed()).max(MIN_WAIT);
                self.dispatcher.idle(wait).await;
            }
            // Still give the signal task a turn
            None => tokio::task::yield_now().await,
        }
    }

    /// Close the current session's batch and begin a new session
    async fn start_trip(&mut self) {
        let session = DriveSession::new();
        if let Some(batch) = self.accumulator.rotate_session(session) {
            self.flush(&batch, FlushReason::TripBoundary).await;
        }
        info!("Trip boundary, new drive session {}", session);
        let _ = self.dispatcher.send_start(session).await;
    }

    /// Send a sealed batch; a failure is logged and counted by the dispatcher
    async fn flush(&mut self, batch: &SealedBatch, reason: FlushReason) {
        debug!("Flushing {} rows: {}", batch.len(), reason);
        let _ = self.dispatcher.send_batch(batch).await;
    }

    fn echo(&self, diagnostics: &[Reading], position: Option<&PositionReadings>) {
        for (column, reading) in self.capabilities.columns().zip(diagnostics) {
            info!("{}={}", column, reading);
        }
        if let Some(position) = position {
            let fields: Vec<String> = POSITION_COLUMNS
                .iter()
                .zip(position)
                .map(|(column, reading)| format!("{}={}", column, reading))
                .collect();
            info!("gpspos {}", fields.join(" "));
        }
    }

    async fn shutdown(mut self, stop: StopReason) -> RunSummary {
        info!("Stopping after {} samples: {:?}", self.ticks, stop);
        if let Some(batch) = self.accumulator.take() {
            self.flush(&batch, FlushReason::Shutdown).await;
        }

        self.diagnostic.close().await;
        self.position.close();

        let session = self.accumulator.session();
        let messages_sent = self.dispatcher.messages_sent();
        let messages_failed = self.dispatcher.messages_failed();
        self.dispatcher.close().await;

        RunSummary {
            session,
            ticks: self.ticks,
            messages_sent,
            messages_failed,
            stop,
        }
    }
}
