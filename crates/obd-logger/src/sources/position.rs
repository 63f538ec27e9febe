//! Position source adapter
//!
//! Owns the gpsd link and its reconnect state. While the link is down a
//! reconnect is tried at most once per retry window; every other tick
//! reports no position without touching the network.

use gps_client::{Fix, GpsError, GpsdClient};
use std::time::Duration;
use telemetry::{PositionReadings, Reading};
use tracing::{debug, info, warn};

#[allow(async_fn_in_trait)]
pub trait PositionLink {
    /// Latest fix, without waiting for new reports
    async fn poll(&mut self) -> Result<Option<Fix>, GpsError>;
}

impl PositionLink for GpsdClient {
    async fn poll(&mut self) -> Result<Option<Fix>, GpsError> {
        GpsdClient::poll(self).await
    }
}

/// Opens position links
#[allow(async_fn_in_trait)]
pub trait PositionConnector {
    type Link: PositionLink;

    async fn connect(&mut self) -> Result<Self::Link, GpsError>;
}

pub struct GpsdConnector {
    host: String,
    port: u16,
    timeout: Duration,
}

impl GpsdConnector {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

impl PositionConnector for GpsdConnector {
    type Link = GpsdClient;

    async fn connect(&mut self) -> Result<GpsdClient, GpsError> {
        GpsdClient::connect(&self.host, self.port, self.timeout).await
    }
}

pub struct PositionAdapter<C: PositionConnector> {
    connector: C,
    link: Option<C::Link>,
    /// Tick time of the last connection attempt, seconds since the epoch
    last_attempt: f64,
    retry_secs: f64,
    attempts: u64,
    locked: bool,
}

impl<C: PositionConnector> PositionAdapter<C> {
    /// Make the first connection attempt at tick time `now`
    pub async fn open(connector: C, now: f64, retry: Duration) -> Self {
        let mut adapter = Self {
            connector,
            link: None,
            last_attempt: now,
            retry_secs: retry.as_secs_f64(),
            attempts: 0,
            locked: false,
        };
        if adapter.attempt(now).await {
            info!("Connected to gpsd, logging position");
        } else {
            warn!("No gpsd connection, will retry every {:?}", retry);
        }
        adapter
    }

    async fn attempt(&mut self, now: f64) -> bool {
        self.last_attempt = now;
        self.attempts += 1;
        match self.connector.connect().await {
            Ok(link) => {
                self.link = Some(link);
                true
            }
            Err(e) => {
                debug!("gpsd connection attempt {} failed: {}", self.attempts, e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Connection attempts made so far, including the first
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Position columns for the tick starting at `now`.
    ///
    /// `None` when there is no link or no fix. A tick that reconnects still
    /// reports nothing; the new link is polled from the next tick on.
    pub async fn read(&mut self, now: f64) -> Option<PositionReadings> {
        let Some(link) = self.link.as_mut() else {
            if now - self.last_attempt >= self.retry_secs && self.attempt(now).await {
                info!("Delayed connection to gpsd achieved");
            }
            return None;
        };

        match link.poll().await {
            Ok(Some(fix)) => {
                if !self.locked {
                    info!("GPS acquisition complete");
                    self.locked = true;
                }
                Some(position_readings(&fix))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Lost gpsd connection: {}", e);
                self.link = None;
                self.last_attempt = now;
                None
            }
        }
    }

    pub fn close(&mut self) {
        if self.link.take().is_some() {
            debug!("Closed gpsd connection");
        }
    }
}

/// Columns in header order: lat, lon, alt, crs, spd, gtm
fn position_readings(fix: &Fix) -> PositionReadings {
    [
        Reading::Value(fix.lat),
        Reading::Value(fix.lon),
        Reading::Value(fix.altitude()),
        fix.course.into(),
        fix.speed.into(),
        fix.time.into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use gps_client::{FixQuality, ALTITUDE_UNKNOWN};
    use std::collections::VecDeque;

    struct ScriptedPosition {
        polls: VecDeque<Result<Option<Fix>, GpsError>>,
    }

    impl PositionLink for ScriptedPosition {
        async fn poll(&mut self) -> Result<Option<Fix>, GpsError> {
            self.polls.pop_front().unwrap_or(Err(GpsError::Disconnected))
        }
    }

    /// Fails every attempt except the ones listed
    struct ScriptedConnector {
        attempt: usize,
        succeed_on: Vec<usize>,
        polls: Vec<Result<Option<Fix>, GpsError>>,
    }

    impl ScriptedConnector {
        fn never() -> Self {
            Self {
                attempt: 0,
                succeed_on: Vec::new(),
                polls: Vec::new(),
            }
        }
    }

    impl PositionConnector for ScriptedConnector {
        type Link = ScriptedPosition;

        async fn connect(&mut self) -> Result<ScriptedPosition, GpsError> {
            self.attempt += 1;
            if self.succeed_on.contains(&self.attempt) {
                Ok(ScriptedPosition {
                    polls: std::mem::take(&mut self.polls).into(),
                })
            } else {
                Err(GpsError::Connect {
                    addr: "127.0.0.1:2947".to_string(),
                    reason: "refused".to_string(),
                })
            }
        }
    }

    fn fix(quality: FixQuality) -> Fix {
        Fix {
            quality,
            lat: 47.5,
            lon: -122.25,
            alt: Some(30.0),
            course: Some(180.0),
            speed: Some(13.5),
            time: Some(1_700_000_000.0),
        }
    }

    const RETRY: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_reconnect_is_rate_limited() {
        let mut adapter = PositionAdapter::open(ScriptedConnector::never(), 1000.0, RETRY).await;
        assert_eq!(adapter.attempts(), 1);

        // 25 seconds of 10 Hz ticks while gpsd stays down
        for tick in 0..=250 {
            let now = 1000.0 + tick as f64 * 0.1;
            assert!(adapter.read(now).await.is_none());
        }
        assert_eq!(adapter.attempts(), 3);
    }

    #[tokio::test]
    async fn test_delayed_connection_then_fix() {
        let connector = ScriptedConnector {
            attempt: 0,
            succeed_on: vec![2],
            polls: vec![Ok(None), Ok(Some(fix(FixQuality::ThreeD)))],
        };
        let mut adapter = PositionAdapter::open(connector, 0.0, RETRY).await;
        assert!(!adapter.is_connected());

        assert!(adapter.read(9.9).await.is_none());
        assert_eq!(adapter.attempts(), 1);
        // Reconnecting tick reports nothing
        assert!(adapter.read(10.0).await.is_none());
        assert!(adapter.is_connected());

        assert!(adapter.read(10.1).await.is_none());
        let readings = adapter.read(10.2).await.unwrap();
        assert_eq!(
            readings,
            [
                Reading::Value(47.5),
                Reading::Value(-122.25),
                Reading::Value(30.0),
                Reading::Value(180.0),
                Reading::Value(13.5),
                Reading::Value(1_700_000_000.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_lost_link_restarts_retry_window() {
        let connector = ScriptedConnector {
            attempt: 0,
            succeed_on: vec![1],
            polls: vec![Ok(Some(fix(FixQuality::TwoD))), Err(GpsError::Disconnected)],
        };
        let mut adapter = PositionAdapter::open(connector, 0.0, RETRY).await;
        assert!(adapter.is_connected());

        let readings = adapter.read(0.1).await.unwrap();
        assert_eq!(readings[2], Reading::Value(ALTITUDE_UNKNOWN));

        assert!(adapter.read(5.0).await.is_none());
        assert!(!adapter.is_connected());

        // Window counts from the loss, not from the first attempt
        adapter.read(14.9).await;
        assert_eq!(adapter.attempts(), 1);
        adapter.read(15.0).await;
        assert_eq!(adapter.attempts(), 2);
    }
}
