//! ELM327 protocol selection and response framing

use crate::error::ObdError;
use crate::mode::{CURRENT_DATA, RESPONSE_OFFSET};
use serde::{Deserialize, Serialize};

/// Prompt character the ELM327 prints when it is ready for the next command
pub const PROMPT: u8 = b'>';

/// OBD-II bus protocols selectable with `ATSP<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    const ALL: [ObdProtocol; 10] = [
        ObdProtocol::Auto,
        ObdProtocol::J1850Pwm,
        ObdProtocol::J1850Vpw,
        ObdProtocol::Iso9141_2,
        ObdProtocol::Iso14230_4Kwp,
        ObdProtocol::Iso14230_4KwpFast,
        ObdProtocol::Iso15765_4Can11bit500,
        ObdProtocol::Iso15765_4Can29bit500,
        ObdProtocol::Iso15765_4Can11bit250,
        ObdProtocol::Iso15765_4Can29bit250,
    ];

    /// ELM327 protocol number (the digit after `ATSP`)
    pub fn code(&self) -> u8 {
        Self::ALL
            .iter()
            .position(|p| p == self)
            .unwrap_or_default() as u8
    }

    /// Protocol for an ELM327 protocol number
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// The ELM327 AT command that selects this protocol
    pub fn to_elm_command(&self) -> String {
        format!("ATSP{}", self.code())
    }
}

/// Mode 01 request for a PID.
///
/// With `expected_lines` set the adapter stops listening after that many
/// ECU replies instead of waiting out its own timeout.
pub fn mode1_request(pid: u8, expected_lines: Option<u8>) -> String {
    match expected_lines {
        Some(lines) => format!("{:02X}{:02X}{}", CURRENT_DATA, pid, lines),
        None => format!("{:02X}{:02X}", CURRENT_DATA, pid),
    }
}

/// Extract the data bytes of a Mode 01 reply to `pid` from raw adapter text.
///
/// Tolerates echo, `SEARCHING...` banners, spaces and header-less replies.
pub fn parse_mode1_response(pid: u8, raw: &str) -> Result<Vec<u8>, ObdError> {
    let text = raw.to_ascii_uppercase();

    for fault in ["UNABLE TO CONNECT", "CAN ERROR", "BUS ERROR", "BUS INIT: ...ERROR"] {
        if text.contains(fault) {
            return Err(ObdError::CanBusError(fault.to_string()));
        }
    }
    if text.contains("NO DATA") {
        return Err(ObdError::NoData(pid));
    }

    let expected = format!("{:02X}{:02X}", CURRENT_DATA + RESPONSE_OFFSET, pid);
    for line in text.split(['\r', '\n']) {
        let compact: String = line
            .chars()
            .filter(|c| !c.is_whitespace() && *c as u8 != PROMPT)
            .collect();
        if !compact.starts_with(&expected) || compact.len() % 2 != 0 {
            continue;
        }
        if !compact.bytes().all(|b| b.is_ascii_hexdigit()) {
            continue;
        }

        let data = &compact[expected.len()..];
        return (0..data.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&data[i..i + 2], 16)
                    .map_err(|e| ObdError::InvalidResponse(e.to_string()))
            })
            .collect();
    }

    Err(ObdError::InvalidResponse(raw.trim().to_string()))
}
