//! Diagnostic source adapter

use obd_protocol::{Capability, CapabilitySet, DiagnosticLink, ObdError};
use telemetry::Reading;
use tracing::debug;

/// Outcome of reading one diagnostic column
#[derive(Debug)]
pub enum DiagnosticReading {
    Value(f64),
    /// No link, no data or a malformed reply; blanks this field only
    Unavailable,
    /// The link is broken; sampling has to stop
    Fatal(ObdError),
}

/// Per-column reads over an optional diagnostic link
pub struct DiagnosticAdapter<L> {
    link: Option<L>,
    /// Pass the expected byte width along with each request
    optimised: bool,
}

impl<L: DiagnosticLink> DiagnosticAdapter<L> {
    pub fn new(link: Option<L>, optimised: bool) -> Self {
        Self { link, optimised }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn link_mut(&mut self) -> Option<&mut L> {
        self.link.as_mut()
    }

    pub async fn read(&mut self, capability: &Capability) -> DiagnosticReading {
        let Some(link) = self.link.as_mut() else {
            return DiagnosticReading::Unavailable;
        };

        let width = if self.optimised { capability.bytes } else { 0 };
        match link.read_parameter(capability.pid, width).await {
            Ok(bytes) => match capability.decode(&bytes) {
                Some(value) => DiagnosticReading::Value(value),
                None => {
                    debug!("{}: undecodable reply {:02X?}", capability.column, bytes);
                    DiagnosticReading::Unavailable
                }
            },
            Err(e) if e.is_fatal() => DiagnosticReading::Fatal(e),
            Err(e) => {
                debug!("{} unavailable: {}", capability.column, e);
                DiagnosticReading::Unavailable
            }
        }
    }

    /// Read every active column in order.
    ///
    /// After a fatal result the remaining columns are not queried and come
    /// back unavailable, so the row keeps its width.
    pub async fn read_all(&mut self, capabilities: &CapabilitySet) -> (Vec<Reading>, Option<ObdError>) {
        let mut readings = Vec::with_capacity(capabilities.len());
        let mut fatal = None;

        for capability in capabilities.iter() {
            if fatal.is_some() {
                readings.push(Reading::Unavailable);
                continue;
            }
            match self.read(capability).await {
                DiagnosticReading::Value(value) => readings.push(Reading::Value(value)),
                DiagnosticReading::Unavailable => readings.push(Reading::Unavailable),
                DiagnosticReading::Fatal(e) => {
                    readings.push(Reading::Unavailable);
                    fatal = Some(e);
                }
            }
        }
        (readings, fatal)
    }

    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{lookup_column, Capability};

    struct ScriptedLink {
        replies: Vec<Result<Vec<u8>, ObdError>>,
        widths: Vec<usize>,
        closed: bool,
    }

    impl DiagnosticLink for ScriptedLink {
        async fn query_capability(&mut self, _pid: u8) -> Result<bool, ObdError> {
            Ok(true)
        }

        async fn read_parameter(&mut self, _pid: u8, expected_bytes: usize) -> Result<Vec<u8>, ObdError> {
            self.widths.push(expected_bytes);
            self.replies.remove(0)
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    fn capability(column: &str) -> Capability {
        let spec = lookup_column(column).unwrap();
        Capability {
            pid: spec.pid,
            column: spec.column.unwrap(),
            bytes: spec.bytes,
            conversion: spec.conversion,
        }
    }

    fn adapter(replies: Vec<Result<Vec<u8>, ObdError>>, optimised: bool) -> DiagnosticAdapter<ScriptedLink> {
        DiagnosticAdapter::new(
            Some(ScriptedLink {
                replies,
                widths: Vec::new(),
                closed: false,
            }),
            optimised,
        )
    }

    #[tokio::test]
    async fn test_classification() {
        let rpm = capability("rpm");
        let mut adapter = adapter(
            vec![
                Ok(vec![0x0B, 0xB8]),
                Err(ObdError::NoData(0x0C)),
                Ok(vec![0x01]),
                Err(ObdError::Disconnected),
            ],
            false,
        );

        assert!(matches!(adapter.read(&rpm).await, DiagnosticReading::Value(v) if v == 750.0));
        assert!(matches!(adapter.read(&rpm).await, DiagnosticReading::Unavailable));
        assert!(matches!(adapter.read(&rpm).await, DiagnosticReading::Unavailable));
        assert!(matches!(adapter.read(&rpm).await, DiagnosticReading::Fatal(ObdError::Disconnected)));
    }

    #[tokio::test]
    async fn test_fatal_skips_remaining_columns() {
        let set: CapabilitySet = ["temp", "rpm", "vss"].into_iter().map(capability).collect();
        let mut adapter = adapter(
            vec![Err(ObdError::CanBusError("BUS ERROR".into())), Ok(vec![0x00, 0x00])],
            true,
        );

        let (readings, fatal) = adapter.read_all(&set).await;
        assert_eq!(readings, vec![Reading::Unavailable; 3]);
        assert!(matches!(fatal, Some(ObdError::CanBusError(_))));

        let link = adapter.link_mut().unwrap();
        assert_eq!(link.widths, vec![1]);
        assert_eq!(link.replies.len(), 1);
    }

    #[tokio::test]
    async fn test_optimised_passes_width() {
        let set: CapabilitySet = ["rpm", "vss"].into_iter().map(capability).collect();
        let mut plain = adapter(vec![Ok(vec![0x0B, 0xB8]), Ok(vec![50])], false);
        let mut optimised = adapter(vec![Ok(vec![0x0B, 0xB8]), Ok(vec![50])], true);

        let (readings, _) = plain.read_all(&set).await;
        assert_eq!(readings, vec![Reading::Value(750.0), Reading::Value(50.0)]);
        optimised.read_all(&set).await;

        assert_eq!(plain.link_mut().unwrap().widths, vec![0, 0]);
        assert_eq!(optimised.link_mut().unwrap().widths, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_without_link_everything_is_unavailable() {
        let set: CapabilitySet = ["rpm"].into_iter().map(capability).collect();
        let mut adapter: DiagnosticAdapter<ScriptedLink> = DiagnosticAdapter::new(None, false);
        let (readings, fatal) = adapter.read_all(&set).await;
        assert_eq!(readings, vec![Reading::Unavailable]);
        assert!(fatal.is_none());
        adapter.close().await;
        assert!(!adapter.is_connected());
    }
}
