//! OBD-II Client for ELM327 Adapters
//!
//! Provides async serial communication with OBD-II adapters.

use crate::error::ObdError;
use crate::link::DiagnosticLink;
use crate::protocol::{self, ObdProtocol, PROMPT};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Default timeout for OBD commands
const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Timeout for the adapter reset, which reprints the banner
const RESET_TIMEOUT_MS: u64 = 5000;

/// Device path that selects the simulated adapter
pub const MOCK_DEVICE: &str = "mock";

/// OBD-II client for communicating with ELM327-compatible adapters
pub struct ObdClient {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    device: String,
    /// Open serial stream; `None` in mock mode or after disconnect
    port: Option<SerialStream>,
    /// OBD protocol to use
    protocol: ObdProtocol,
    /// Command timeout
    timeout: Duration,
    /// Support bitmaps keyed by range base (0x00, 0x20, ...); `None` = range absent
    support: HashMap<u8, Option<u32>>,
    /// Mock mode for testing (uses simulated responses)
    mock_mode: bool,
    /// Number of mock reads served
    mock_reads: u64,
}

impl ObdClient {
    /// Open and initialize an adapter
    ///
    /// # Arguments
    /// * `device` - Serial port device path, or [`MOCK_DEVICE`]
    /// * `baud_rate` - Baud rate for serial communication
    /// * `protocol` - Bus protocol to select after reset
    pub async fn open(
        device: &str,
        baud_rate: u32,
        protocol: ObdProtocol,
    ) -> Result<Self, ObdError> {
        if device == MOCK_DEVICE {
            return Ok(Self::mock());
        }

        info!("Opening OBD adapter on {} at {} baud", device, baud_rate);
        let port = tokio_serial::new(device, baud_rate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open_native_async()
            .map_err(|e| ObdError::SerialError(format!("{}: {}", device, e)))?;

        let mut client = Self {
            device: device.to_string(),
            port: Some(port),
            protocol,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            support: HashMap::new(),
            mock_mode: false,
            mock_reads: 0,
        };
        client.initialize().await?;
        Ok(client)
    }

    /// Create a mock OBD client for testing (no hardware required)
    pub fn mock() -> Self {
        info!("Creating mock OBD client");
        Self {
            device: MOCK_DEVICE.to_string(),
            port: None,
            protocol: ObdProtocol::Iso15765_4Can11bit500,
            timeout: Duration::from_millis(100),
            support: HashMap::new(),
            mock_mode: true,
            mock_reads: 0,
        }
    }

    /// Reset the adapter and put it in a parseable state
    async fn initialize(&mut self) -> Result<(), ObdError> {
        info!("Initializing OBD adapter on {}", self.device);

        let normal = self.timeout;
        self.timeout = Duration::from_millis(RESET_TIMEOUT_MS);
        let reset = self.command("ATZ").await;
        self.timeout = normal;
        let banner = reset?;
        debug!("Adapter banner: {}", banner.trim());

        // Echo, linefeeds, spaces and headers off
        for setup in ["ATE0", "ATL0", "ATS0", "ATH0"] {
            let reply = self.command(setup).await?;
            if !reply.contains("OK") {
                warn!("{} not acknowledged: {}", setup, reply.trim());
            }
        }

        let select = self.protocol.to_elm_command();
        self.command(&select).await?;

        info!("OBD adapter initialized with {:?}", self.protocol);
        Ok(())
    }

    /// Send one command line and collect the reply up to the prompt
    async fn command(&mut self, cmd: &str) -> Result<String, ObdError> {
        let timeout = self.timeout;
        let port = self.port.as_mut().ok_or(ObdError::AdapterNotResponding)?;

        port.write_all(format!("{}\r", cmd).as_bytes()).await?;
        port.flush().await?;

        let reply = tokio::time::timeout(timeout, read_until_prompt(port))
            .await
            .map_err(|_| ObdError::Timeout(timeout.as_millis() as u64))??;
        Ok(reply)
    }

    /// Query a PID and return its data bytes
    pub async fn query_pid(&mut self, pid: u8, expected_lines: Option<u8>) -> Result<Vec<u8>, ObdError> {
        if self.mock_mode {
            return Ok(self.generate_mock_response(pid));
        }

        debug!("Querying PID {:02X}", pid);
        let reply = self.command(&protocol::mode1_request(pid, expected_lines)).await?;
        protocol::parse_mode1_response(pid, &reply)
    }

    /// Support bitmap for the 32-PID range starting at `base`
    async fn support_bitmap(&mut self, base: u8) -> Result<Option<u32>, ObdError> {
        let mut range = 0u8;
        loop {
            let bits = match self.support.get(&range) {
                Some(bits) => *bits,
                None => {
                    let bits = self.fetch_bitmap(range).await?;
                    self.support.insert(range, bits);
                    bits
                }
            };
            if range == base {
                return Ok(bits);
            }

            // The lowest bit of a range advertises the next range
            match (bits, range.checked_add(0x20)) {
                (Some(b), Some(next)) if b & 1 == 1 => range = next,
                _ => return Ok(None),
            }
        }
    }

    async fn fetch_bitmap(&mut self, range: u8) -> Result<Option<u32>, ObdError> {
        match self.query_pid(range, None).await {
            Ok(bytes) if bytes.len() >= 4 => {
                Ok(Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])))
            }
            Ok(bytes) => {
                warn!("Short support bitmap for range {:02X}: {:?}", range, bytes);
                Ok(None)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("Support range {:02X} unavailable: {}", range, e);
                Ok(None)
            }
        }
    }

    /// Check if client is connected
    pub fn is_connected(&self) -> bool {
        self.mock_mode || self.port.is_some()
    }

    /// Disconnect from the OBD adapter
    pub async fn disconnect(&mut self) {
        if self.port.take().is_some() {
            info!("Disconnecting OBD client from {}", self.device);
        }
    }

    /// Generate a mock response for testing
    fn generate_mock_response(&mut self, pid: u8) -> Vec<u8> {
        self.mock_reads += 1;
        let n = self.mock_reads;

        match pid {
            // Supported: 04 05 0C 0D 10 11, no further ranges
            0x00 => vec![0x18, 0x19, 0x80, 0x00],
            // RPM: 800-3500 RPM range
            0x0C => {
                let rpm = 800 + (n * 37 % 2700) as u16;
                let encoded = rpm * 4;
                vec![(encoded >> 8) as u8, (encoded & 0xFF) as u8]
            }
            // Speed: 0-120 km/h
            0x0D => vec![(n % 120) as u8],
            // Coolant temp: 70-105°C (stored as value + 40)
            0x05 => vec![(110 + (n % 35)) as u8],
            // Engine load / throttle: 20-80%
            0x04 | 0x11 => vec![(51 + (n % 153)) as u8],
            // MAF: 5-50 g/s
            0x10 => {
                let maf = 500 + (n * 13 % 4500) as u16;
                vec![(maf >> 8) as u8, (maf & 0xFF) as u8]
            }
            _ => vec![0],
        }
    }
}

/// Read from the adapter until the prompt character arrives
async fn read_until_prompt(port: &mut SerialStream) -> Result<String, ObdError> {
    let mut reply = Vec::with_capacity(64);
    let mut buf = [0u8; 64];
    loop {
        let n = port.read(&mut buf).await?;
        if n == 0 {
            return Err(ObdError::Disconnected);
        }
        reply.extend_from_slice(&buf[..n]);
        if let Some(end) = reply.iter().position(|b| *b == PROMPT) {
            reply.truncate(end);
            return Ok(String::from_utf8_lossy(&reply).into_owned());
        }
    }
}

impl DiagnosticLink for ObdClient {
    async fn query_capability(&mut self, pid: u8) -> Result<bool, ObdError> {
        if pid == 0 {
            return Ok(true);
        }
        let base = ((pid - 1) / 0x20) * 0x20;
        let bit = (pid - base - 1) as u32;
        Ok(self
            .support_bitmap(base)
            .await?
            .is_some_and(|bits| bits & (0x8000_0000 >> bit) != 0))
    }

    async fn read_parameter(
        &mut self,
        pid: u8,
        expected_bytes: usize,
    ) -> Result<Vec<u8>, ObdError> {
        if !self.is_connected() {
            return Err(ObdError::AdapterNotResponding);
        }
        // Knowing the width means a single ECU reply is enough
        let expected_lines = (expected_bytes > 0).then_some(1);
        let mut bytes = self.query_pid(pid, expected_lines).await?;
        if expected_bytes > 0 {
            if bytes.len() < expected_bytes {
                return Err(ObdError::InvalidResponse(format!(
                    "PID {:02X}: expected {} bytes, got {}",
                    pid,
                    expected_bytes,
                    bytes.len()
                )));
            }
            bytes.truncate(expected_bytes);
        }
        Ok(bytes)
    }

    async fn close(&mut self) {
        self.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::Conversion;

    #[tokio::test]
    async fn test_mock_client_creation() {
        let client = ObdClient::open(MOCK_DEVICE, 38400, ObdProtocol::Auto)
            .await
            .unwrap();
        assert!(client.is_connected());
        assert!(client.mock_mode);
    }

    #[tokio::test]
    async fn test_mock_pid_query() {
        let mut client = ObdClient::mock();
        let bytes = client.read_parameter(0x0C, 2).await.unwrap();
        let rpm = Conversion::Rpm.apply(&bytes).unwrap();
        assert!((800.0..=3500.0).contains(&rpm));
    }

    #[tokio::test]
    async fn test_mock_capabilities() {
        let mut client = ObdClient::mock();
        assert!(client.query_capability(0x0C).await.unwrap());
        assert!(client.query_capability(0x05).await.unwrap());
        assert!(!client.query_capability(0x06).await.unwrap());
        // Range 21-40 is not advertised
        assert!(!client.query_capability(0x2F).await.unwrap());
    }

    #[tokio::test]
    async fn test_disconnected_read_fails() {
        let mut client = ObdClient::mock();
        client.mock_mode = false;
        let err = client.read_parameter(0x0C, 2).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
