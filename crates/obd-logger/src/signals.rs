//! Process signal flags
//!
//! SIGINT and SIGTERM request exit, SIGUSR1 requests a trip boundary.
//! The handler task only sets flags; the sampling loop reads them once per
//! tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::info;

/// Requests delivered from outside the sampling loop
#[derive(Debug, Default)]
pub struct ControlFlags {
    exit: AtomicBool,
    trip_boundary: AtomicBool,
}

impl ControlFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    pub fn request_trip_boundary(&self) {
        self.trip_boundary.store(true, Ordering::SeqCst);
    }

    /// Read and clear a pending trip boundary request
    pub fn take_trip_boundary(&self) -> bool {
        self.trip_boundary.swap(false, Ordering::SeqCst)
    }
}

/// Route process signals into `flags`.
///
/// Must run inside the runtime; the returned task lives until the process
/// exits.
pub fn install(flags: Arc<ControlFlags>) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut trip = signal(SignalKind::user_defined1())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = interrupt.recv() => {
                    info!("SIGINT received, stopping after this sample");
                    flags.request_exit();
                }
                Some(()) = terminate.recv() => {
                    info!("SIGTERM received, stopping after this sample");
                    flags.request_exit();
                }
                Some(()) = trip.recv() => {
                    info!("SIGUSR1 received, starting a new trip");
                    flags.request_trip_boundary();
                }
                else => break,
            }
        }
    }))
}
