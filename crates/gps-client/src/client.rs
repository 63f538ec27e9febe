//! gpsd TCP client

use crate::error::GpsError;
use crate::fix::{parse_report, Fix, Update};
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Address gpsd listens on by default
pub const DEFAULT_GPSD_HOST: &str = "127.0.0.1";

/// Port gpsd listens on by default
pub const DEFAULT_GPSD_PORT: u16 = 2947;

/// Longest report line accepted before the buffer is discarded
const MAX_LINE_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// Connection to gpsd in JSON watch mode
pub struct GpsdClient {
    stream: TcpStream,
    /// Received bytes not yet terminated by a newline, kept across polls
    pending: Vec<u8>,
    /// Most recent fix state reported by gpsd
    latest: Option<Fix>,
}

impl GpsdClient {
    /// Connect to gpsd and enable watch mode
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, GpsError> {
        let addr = format!("{}:{}", host, port);
        debug!("Connecting to gpsd at {}", addr);

        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| GpsError::Timeout(timeout.as_millis() as u64))?
            .map_err(|e| GpsError::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        stream.write_all(WATCH_COMMAND).await?;

        info!("Connected to gpsd at {}", addr);
        Ok(Self {
            stream,
            pending: Vec::with_capacity(READ_CHUNK),
            latest: None,
        })
    }

    /// Consume every report already received and return the current fix.
    ///
    /// Never waits for new data. A fix stays current until gpsd reports
    /// otherwise.
    pub async fn poll(&mut self) -> Result<Option<Fix>, GpsError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => return Err(GpsError::Disconnected),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    self.ingest_lines();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.latest)
    }

    /// Parse each complete line; an unterminated tail stays buffered
    fn ingest_lines(&mut self) {
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]).into_owned();
            self.ingest(line.trim());
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > MAX_LINE_BYTES {
            warn!("Discarding {} bytes of unterminated gpsd output", self.pending.len());
            self.pending.clear();
        }
    }

    fn ingest(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        match parse_report(line) {
            Ok(Update::Fix(fix)) => self.latest = Some(fix),
            Ok(Update::Lost) => self.latest = None,
            Ok(Update::Ignored) => {}
            Err(e) => warn!("{}", e),
        }
    }
}
