//! Capability resolution
//!
//! Determines once, at startup, which catalog columns the attached vehicle
//! can actually answer. The resulting set fixes the diagnostic part of the
//! message header for the whole run.

use crate::link::DiagnosticLink;
use crate::pid::{Conversion, PidSpec, MODE1_CATALOG};
use tracing::{debug, info, warn};

/// A supported, logged diagnostic column
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub pid: u8,
    pub column: &'static str,
    /// Data bytes the vehicle returns for this PID
    pub bytes: usize,
    pub conversion: Conversion,
}

impl Capability {
    fn from_spec(spec: &PidSpec) -> Option<Self> {
        Some(Self {
            pid: spec.pid,
            column: spec.column?,
            bytes: spec.bytes,
            conversion: spec.conversion,
        })
    }

    /// Convert raw data bytes to physical units
    pub fn decode(&self, bytes: &[u8]) -> Option<f64> {
        self.conversion.apply(bytes)
    }
}

/// Ordered set of active diagnostic columns, in catalog order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitySet {
    entries: Vec<Capability>,
}

impl CapabilitySet {
    /// Empty set, used when no diagnostic link is available
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|c| c.column)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Split a comma separated column wishlist
pub fn parse_wishlist(columns: &str) -> Vec<String> {
    columns
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Probe the vehicle for every logged catalog entry.
///
/// An empty wishlist means every supported column. Entries that are not
/// wished for, not supported, or whose probe fails are left out; the
/// result keeps catalog order. Without a link the set is empty.
pub async fn resolve<L: DiagnosticLink>(link: Option<&mut L>, wishlist: &[String]) -> CapabilitySet {
    let Some(link) = link else {
        info!("No diagnostic link, logging position only");
        return CapabilitySet::empty();
    };

    for wanted in wishlist {
        if !MODE1_CATALOG.iter().any(|s| s.column == Some(wanted.as_str())) {
            warn!("Unknown OBD column in wishlist: {}", wanted);
        }
    }

    let mut entries = Vec::new();
    for spec in MODE1_CATALOG {
        let Some(capability) = Capability::from_spec(spec) else {
            continue;
        };
        if !wishlist.is_empty() && !wishlist.iter().any(|w| w == capability.column) {
            continue;
        }

        match link.query_capability(spec.pid).await {
            Ok(true) => entries.push(capability),
            Ok(false) => debug!("{} ({:02X}) not supported", capability.column, spec.pid),
            Err(e) => warn!(
                "Capability probe for {} ({:02X}) failed: {}",
                capability.column, spec.pid, e
            ),
        }
    }

    let set = CapabilitySet { entries };
    info!(
        "Resolved {} OBD columns: {}",
        set.len(),
        set.columns().collect::<Vec<_>>().join(",")
    );
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ObdError;
    use crate::pid::lookup_column;

    struct FakeLink {
        supported: Vec<u8>,
        broken: Vec<u8>,
        probes: usize,
    }

    impl DiagnosticLink for FakeLink {
        async fn query_capability(&mut self, pid: u8) -> Result<bool, ObdError> {
            self.probes += 1;
            if self.broken.contains(&pid) {
                return Err(ObdError::Timeout(2000));
            }
            Ok(self.supported.contains(&pid))
        }

        async fn read_parameter(&mut self, pid: u8, _: usize) -> Result<Vec<u8>, ObdError> {
            Err(ObdError::NoData(pid))
        }

        async fn close(&mut self) {}
    }

    fn link(supported: &[u8]) -> FakeLink {
        FakeLink {
            supported: supported.to_vec(),
            broken: Vec::new(),
            probes: 0,
        }
    }

    #[tokio::test]
    async fn test_resolution_keeps_catalog_order() {
        let mut fake = link(&[0x11, 0x0C, 0x05]);
        let set = resolve(Some(&mut fake), &[]).await;
        assert_eq!(set.columns().collect::<Vec<_>>(), vec!["temp", "rpm", "throttlepos"]);
    }

    #[tokio::test]
    async fn test_wishlist_filters_probes() {
        let mut fake = link(&[0x05, 0x0C, 0x0D]);
        let wishlist = parse_wishlist("vss, rpm,unknown_column");
        let set = resolve(Some(&mut fake), &wishlist).await;
        assert_eq!(set.columns().collect::<Vec<_>>(), vec!["rpm", "vss"]);
        assert_eq!(fake.probes, 2);
    }

    #[tokio::test]
    async fn test_failed_probe_is_excluded() {
        let mut fake = link(&[0x05, 0x0C]);
        fake.broken.push(0x05);
        let set = resolve(Some(&mut fake), &[]).await;
        assert_eq!(set.columns().collect::<Vec<_>>(), vec!["rpm"]);
    }

    #[tokio::test]
    async fn test_no_link_gives_empty_set() {
        let set = resolve::<FakeLink>(None, &parse_wishlist("rpm")).await;
        assert!(set.is_empty());
    }

    #[test]
    fn test_capability_decode() {
        let cap = Capability::from_spec(lookup_column("rpm").unwrap()).unwrap();
        assert_eq!(cap.decode(&[0x0F, 0xA0]), Some(1000.0));
    }
}
