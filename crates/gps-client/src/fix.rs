//! Position fixes decoded from gpsd TPV reports

use crate::error::GpsError;
use chrono::DateTime;
use serde::Deserialize;

/// Altitude reported when the fix has no vertical component
pub const ALTITUDE_UNKNOWN: f64 = -1000.0;

/// Fix quality as reported in the TPV `mode` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixQuality {
    /// Mode 0/1: no usable position
    NoFix,
    /// Mode 2: latitude/longitude only
    TwoD,
    /// Mode 3: latitude/longitude/altitude
    ThreeD,
}

impl FixQuality {
    fn from_mode(mode: u8) -> Self {
        match mode {
            2 => FixQuality::TwoD,
            3 => FixQuality::ThreeD,
            _ => FixQuality::NoFix,
        }
    }
}

/// A usable position fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub quality: FixQuality,
    /// Degrees, positive north
    pub lat: f64,
    /// Degrees, positive east
    pub lon: f64,
    /// Meters above mean sea level, when reported
    pub alt: Option<f64>,
    /// Course over ground, degrees from true north
    pub course: Option<f64>,
    /// Ground speed, m/s
    pub speed: Option<f64>,
    /// Fix time, seconds since the unix epoch
    pub time: Option<f64>,
}

impl Fix {
    /// Altitude, or [`ALTITUDE_UNKNOWN`] for 2D fixes
    pub fn altitude(&self) -> f64 {
        match self.quality {
            FixQuality::ThreeD => self.alt.unwrap_or(ALTITUDE_UNKNOWN),
            _ => ALTITUDE_UNKNOWN,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    #[serde(rename = "altMSL")]
    alt_msl: Option<f64>,
    track: Option<f64>,
    speed: Option<f64>,
    time: Option<String>,
}

/// Outcome of decoding one gpsd JSON line
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Update {
    /// Not a TPV report; position state unchanged
    Ignored,
    /// TPV report without a usable fix
    Lost,
    /// TPV report with a 2D or 3D fix
    Fix(Fix),
}

pub(crate) fn parse_report(line: &str) -> Result<Update, GpsError> {
    let report: Report =
        serde_json::from_str(line).map_err(|e| GpsError::Parse(e.to_string()))?;
    if report.class != "TPV" {
        return Ok(Update::Ignored);
    }

    let quality = FixQuality::from_mode(report.mode);
    let (lat, lon) = match (quality, report.lat, report.lon) {
        (FixQuality::NoFix, _, _) => return Ok(Update::Lost),
        (_, Some(lat), Some(lon)) => (lat, lon),
        _ => return Ok(Update::Lost),
    };

    let time = match report.time.as_deref() {
        Some(stamp) => Some(
            DateTime::parse_from_rfc3339(stamp)
                .map_err(|e| GpsError::Parse(format!("time {:?}: {}", stamp, e)))?
                .timestamp_millis() as f64
                / 1000.0,
        ),
        None => None,
    };

    Ok(Update::Fix(Fix {
        quality,
        lat,
        lon,
        alt: report.alt.or(report.alt_msl),
        course: report.track,
        speed: report.speed,
        time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_3d_fix() {
        let line = r#"{"class":"TPV","device":"/dev/ttyACM0","mode":3,"time":"2024-05-01T12:00:00.500Z","lat":47.6,"lon":-122.3,"alt":56.0,"track":90.5,"speed":12.25}"#;
        let Update::Fix(fix) = parse_report(line).unwrap() else {
            panic!("expected a fix");
        };
        assert_eq!(fix.quality, FixQuality::ThreeD);
        assert_eq!(fix.altitude(), 56.0);
        assert_eq!(fix.course, Some(90.5));
        assert_eq!(fix.speed, Some(12.25));
        assert_eq!(fix.time, Some(1_714_564_800.5));
    }

    #[test]
    fn test_2d_fix_uses_altitude_sentinel() {
        let line = r#"{"class":"TPV","mode":2,"lat":1.0,"lon":2.0,"alt":10.0}"#;
        let Update::Fix(fix) = parse_report(line).unwrap() else {
            panic!("expected a fix");
        };
        assert_eq!(fix.altitude(), ALTITUDE_UNKNOWN);
        assert_eq!(fix.time, None);
    }

    #[test]
    fn test_no_fix_and_other_classes() {
        assert_eq!(
            parse_report(r#"{"class":"TPV","mode":1}"#).unwrap(),
            Update::Lost
        );
        assert_eq!(
            parse_report(r#"{"class":"SKY","satellites":[]}"#).unwrap(),
            Update::Ignored
        );
        assert!(parse_report("not json").is_err());
    }
}
