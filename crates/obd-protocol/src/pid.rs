//! OBD-II PID Catalog and Response Decoding
//!
//! Mode 01 parameters as data: each entry carries its logged column name,
//! the number of data bytes the vehicle returns and the rule used to turn
//! those bytes into physical units.

use serde::{Deserialize, Serialize};

/// Column name of engine speed, used by the engine-stop flush heuristic
pub const RPM_COLUMN: &str = "rpm";

/// Decoding formula for the data bytes (A, B, ...) of a Mode 01 response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conversion {
    /// A
    Raw,
    /// A * 100 / 255 (%)
    Percent,
    /// A - 40 (°C)
    Temperature,
    /// (A - 128) * 100 / 128 (%)
    FuelTrim,
    /// A * 3 (kPa)
    FuelPressure,
    /// ((A*256)+B) / 4 (rpm)
    Rpm,
    /// A / 2 - 64 (° before TDC)
    TimingAdvance,
    /// ((A*256)+B) / 100 (g/s)
    Maf,
    /// A / 200 (V)
    O2Voltage,
    /// (A*256)+B
    Word,
    /// ((A*256)+B) * 0.079 (kPa, relative to manifold vacuum)
    FuelRailPressure,
    /// ((A*256)+B) * 10 (kPa gauge)
    FuelRailGauge,
    /// ((A*256)+B) / 10 - 40 (°C)
    CatalystTemp,
    /// ((A*256)+B) / 1000 (V)
    ModuleVoltage,
    /// ((A*256)+B) * 100 / 255 (%)
    AbsoluteLoad,
    /// ((A*256)+B) / 32768
    EquivalenceRatio,
}

impl Conversion {
    /// Minimum number of data bytes the formula reads
    pub fn min_bytes(&self) -> usize {
        match self {
            Conversion::Rpm
            | Conversion::Maf
            | Conversion::Word
            | Conversion::FuelRailPressure
            | Conversion::FuelRailGauge
            | Conversion::CatalystTemp
            | Conversion::ModuleVoltage
            | Conversion::AbsoluteLoad
            | Conversion::EquivalenceRatio => 2,
            _ => 1,
        }
    }

    /// Apply the formula; `None` when too few bytes were returned
    pub fn apply(&self, bytes: &[u8]) -> Option<f64> {
        if bytes.len() < self.min_bytes() {
            return None;
        }
        let a = bytes[0] as f64;
        let word = || (bytes[0] as f64 * 256.0) + bytes[1] as f64;

        let value = match self {
            Conversion::Raw => a,
            Conversion::Percent => a * 100.0 / 255.0,
            Conversion::Temperature => a - 40.0,
            Conversion::FuelTrim => (a - 128.0) * 100.0 / 128.0,
            Conversion::FuelPressure => a * 3.0,
            Conversion::Rpm => word() / 4.0,
            Conversion::TimingAdvance => a / 2.0 - 64.0,
            Conversion::Maf => word() / 100.0,
            Conversion::O2Voltage => a / 200.0,
            Conversion::Word => word(),
            Conversion::FuelRailPressure => word() * 0.079,
            Conversion::FuelRailGauge => word() * 10.0,
            Conversion::CatalystTemp => word() / 10.0 - 40.0,
            Conversion::ModuleVoltage => word() / 1000.0,
            Conversion::AbsoluteLoad => word() * 100.0 / 255.0,
            Conversion::EquivalenceRatio => word() / 32768.0,
        };
        Some(value)
    }
}

/// One entry of the Mode 01 catalog
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidSpec {
    /// PID byte
    pub pid: u8,
    /// Logged column name; `None` for PIDs that are never logged
    pub column: Option<&'static str>,
    /// Data bytes returned by the vehicle
    pub bytes: usize,
    /// Decoding formula
    pub conversion: Conversion,
    /// Human readable description
    pub description: &'static str,
}

const fn pid(
    pid: u8,
    column: Option<&'static str>,
    bytes: usize,
    conversion: Conversion,
    description: &'static str,
) -> PidSpec {
    PidSpec {
        pid,
        column,
        bytes,
        conversion,
        description,
    }
}

/// Mode 01 catalog in declaration order. Column order in every message
/// follows this order.
pub const MODE1_CATALOG: &[PidSpec] = &[
    pid(0x00, None, 4, Conversion::Raw, "PIDs supported [01 - 20]"),
    pid(0x01, None, 4, Conversion::Raw, "Monitor status since DTCs cleared"),
    pid(0x02, None, 2, Conversion::Raw, "Freeze DTC"),
    pid(0x03, None, 2, Conversion::Raw, "Fuel system status"),
    pid(0x04, Some("load_pct"), 1, Conversion::Percent, "Calculated engine load value"),
    pid(0x05, Some("temp"), 1, Conversion::Temperature, "Engine coolant temperature"),
    pid(0x06, Some("short_term_fuel_trim_1"), 1, Conversion::FuelTrim, "Short term fuel trim, bank 1"),
    pid(0x07, Some("long_term_fuel_trim_1"), 1, Conversion::FuelTrim, "Long term fuel trim, bank 1"),
    pid(0x08, Some("short_term_fuel_trim_2"), 1, Conversion::FuelTrim, "Short term fuel trim, bank 2"),
    pid(0x09, Some("long_term_fuel_trim_2"), 1, Conversion::FuelTrim, "Long term fuel trim, bank 2"),
    pid(0x0A, Some("fuel_pressure"), 1, Conversion::FuelPressure, "Fuel pressure"),
    pid(0x0B, Some("map"), 1, Conversion::Raw, "Intake manifold absolute pressure"),
    pid(0x0C, Some(RPM_COLUMN), 2, Conversion::Rpm, "Engine RPM"),
    pid(0x0D, Some("vss"), 1, Conversion::Raw, "Vehicle speed"),
    pid(0x0E, Some("timing_advance"), 1, Conversion::TimingAdvance, "Timing advance"),
    pid(0x0F, Some("intake_air_temp"), 1, Conversion::Temperature, "Intake air temperature"),
    pid(0x10, Some("maf"), 2, Conversion::Maf, "MAF air flow rate"),
    pid(0x11, Some("throttlepos"), 1, Conversion::Percent, "Throttle position"),
    pid(0x12, None, 1, Conversion::Raw, "Commanded secondary air status"),
    pid(0x13, None, 1, Conversion::Raw, "Oxygen sensors present"),
    pid(0x14, Some("o2_b1s1"), 2, Conversion::O2Voltage, "Oxygen sensor voltage, bank 1 sensor 1"),
    pid(0x15, Some("o2_b1s2"), 2, Conversion::O2Voltage, "Oxygen sensor voltage, bank 1 sensor 2"),
    pid(0x1C, None, 1, Conversion::Raw, "OBD standards this vehicle conforms to"),
    pid(0x1F, Some("runtime_since_start"), 2, Conversion::Word, "Run time since engine start"),
    pid(0x20, None, 4, Conversion::Raw, "PIDs supported [21 - 40]"),
    pid(0x21, Some("distance_with_mil"), 2, Conversion::Word, "Distance traveled with MIL on"),
    pid(0x22, Some("fuel_rail_pressure_vac"), 2, Conversion::FuelRailPressure, "Fuel rail pressure (relative to manifold vacuum)"),
    pid(0x23, Some("fuel_rail_pressure_direct"), 2, Conversion::FuelRailGauge, "Fuel rail pressure (diesel)"),
    pid(0x2C, Some("commanded_egr"), 1, Conversion::Percent, "Commanded EGR"),
    pid(0x2E, Some("commanded_evap_purge"), 1, Conversion::Percent, "Commanded evaporative purge"),
    pid(0x2F, Some("fuel_level"), 1, Conversion::Percent, "Fuel level input"),
    pid(0x30, Some("warmups_since_clear"), 1, Conversion::Raw, "Warm-ups since codes cleared"),
    pid(0x31, Some("distance_since_clear"), 2, Conversion::Word, "Distance traveled since codes cleared"),
    pid(0x33, Some("baro_pressure"), 1, Conversion::Raw, "Barometric pressure"),
    pid(0x3C, Some("catalyst_temp_b1s1"), 2, Conversion::CatalystTemp, "Catalyst temperature, bank 1 sensor 1"),
    pid(0x40, None, 4, Conversion::Raw, "PIDs supported [41 - 60]"),
    pid(0x42, Some("control_module_voltage"), 2, Conversion::ModuleVoltage, "Control module voltage"),
    pid(0x43, Some("abs_load"), 2, Conversion::AbsoluteLoad, "Absolute load value"),
    pid(0x44, Some("commanded_equiv_ratio"), 2, Conversion::EquivalenceRatio, "Command equivalence ratio"),
    pid(0x45, Some("relative_throttle_pos"), 1, Conversion::Percent, "Relative throttle position"),
    pid(0x46, Some("ambient_air_temp"), 1, Conversion::Temperature, "Ambient air temperature"),
    pid(0x5C, Some("oil_temp"), 1, Conversion::Temperature, "Engine oil temperature"),
];

/// Look up a catalog entry by PID
pub fn lookup(pid: u8) -> Option<&'static PidSpec> {
    MODE1_CATALOG.iter().find(|spec| spec.pid == pid)
}

/// Look up a catalog entry by logged column name
pub fn lookup_column(column: &str) -> Option<&'static PidSpec> {
    MODE1_CATALOG
        .iter()
        .find(|spec| spec.column == Some(column))
}
