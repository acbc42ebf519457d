//! Decoding of OBD-II trouble code, VIN and liveness responses
//!
//! OBD-II stores each trouble code in two bytes (SAE J2012):
//!
//! ```text
//! byte 0: [7:6] system  [5:4] digit 1  [3:0] digit 2
//! byte 1: [7:4] digit 3 [3:0] digit 4
//! ```

use carbuddy_core::DtcCategory;

use super::response_sid;

/// Two-byte OBD-II trouble code as found in mode 03 responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObdDtc([u8; 2]);

impl ObdDtc {
    pub fn from_bytes(high: u8, low: u8) -> Self {
        Self([high, low])
    }

    /// Get the DTC category
    pub fn category(&self) -> DtcCategory {
        DtcCategory::from_dtc_high_byte(self.0[0])
    }

    /// `00 00` pads unused slots in legacy responses
    pub fn is_padding(&self) -> bool {
        self.0 == [0, 0]
    }

    /// Convert to standard code format (e.g., "P0301")
    pub fn to_code_string(&self) -> String {
        let prefix = self.category().prefix();
        let first_digit = (self.0[0] >> 4) & 0x03;
        let second_digit = self.0[0] & 0x0F;
        let third_digit = (self.0[1] >> 4) & 0x0F;
        let fourth_digit = self.0[1] & 0x0F;

        format!(
            "{}{:01X}{:01X}{:01X}{:01X}",
            prefix, first_digit, second_digit, third_digit, fourth_digit
        )
    }
}

/// Extract code strings from assembled mode 03 messages
///
/// CAN responses carry a count byte after the service id (`43 NN ...`),
/// legacy protocols do not (`43 AA BB CC DD EE FF`). Since codes are byte
/// pairs, an odd number of bytes after the service id means a count byte is
/// present. Duplicates across ECUs are kept; the tracker collapses them.
pub fn decode_stored_codes(messages: &[Vec<u8>]) -> Result<Vec<String>, String> {
    let mut codes = Vec::new();

    for message in messages {
        let Some((&sid, rest)) = message.split_first() else {
            continue;
        };
        if sid != response_sid::STORED_CODES {
            return Err(format!(
                "unexpected response 0x{:02X} to stored codes request",
                sid
            ));
        }

        let pairs = if rest.len() % 2 == 1 { &rest[1..] } else { rest };
        for pair in pairs.chunks_exact(2) {
            let dtc = ObdDtc::from_bytes(pair[0], pair[1]);
            if !dtc.is_padding() {
                codes.push(dtc.to_code_string());
            }
        }
    }

    Ok(codes)
}

/// Positive answer to `0100` from at least one ECU
pub fn is_link_ready(messages: &[Vec<u8>]) -> bool {
    messages
        .iter()
        .any(|m| m.len() >= 2 && m[0] == response_sid::CURRENT_DATA && m[1] == 0x00)
}

/// Positive answer to mode 04
pub fn is_clear_ack(messages: &[Vec<u8>]) -> bool {
    messages
        .iter()
        .any(|m| m.first() == Some(&response_sid::CLEAR_CODES))
}

/// Extract the VIN from mode 09 PID 02 messages
///
/// CAN sends one message `49 02 01` + 17 characters; legacy protocols send
/// five `49 02 NN` messages carrying four bytes each with leading zero
/// padding.
pub fn decode_vin(messages: &[Vec<u8>]) -> Option<String> {
    let mut text = String::new();

    for message in messages {
        if message.len() < 3 || message[0] != response_sid::VEHICLE_INFO || message[1] != 0x02 {
            continue;
        }
        text.extend(
            message[3..]
                .iter()
                .filter(|b| b.is_ascii_alphanumeric())
                .map(|&b| b as char),
        );
    }

    if text.len() < 17 {
        return None;
    }
    Some(text[text.len() - 17..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings() {
        assert_eq!(ObdDtc::from_bytes(0x01, 0x33).to_code_string(), "P0133");
        assert_eq!(ObdDtc::from_bytes(0x03, 0x01).to_code_string(), "P0301");
        assert_eq!(ObdDtc::from_bytes(0x44, 0x20).to_code_string(), "C0420");
        assert_eq!(ObdDtc::from_bytes(0x92, 0x34).to_code_string(), "B1234");
        assert_eq!(ObdDtc::from_bytes(0xC1, 0x00).to_code_string(), "U0100");
    }

    #[test]
    fn test_decode_legacy_codes() {
        let messages = vec![vec![0x43, 0x01, 0x33, 0x03, 0x01, 0x00, 0x00]];
        assert_eq!(decode_stored_codes(&messages).unwrap(), vec!["P0133", "P0301"]);
    }

    #[test]
    fn test_decode_can_codes() {
        let messages = vec![
            vec![0x43, 0x04, 0x01, 0x33, 0x01, 0x71, 0x04, 0x20, 0x04, 0x30],
            vec![0x43, 0x00],
        ];
        assert_eq!(
            decode_stored_codes(&messages).unwrap(),
            vec!["P0133", "P0171", "P0420", "P0430"]
        );
    }

    #[test]
    fn test_decode_rejects_wrong_service() {
        assert!(decode_stored_codes(&[vec![0x41, 0x00]]).is_err());
    }

    #[test]
    fn test_link_ready_and_clear_ack() {
        assert!(is_link_ready(&[vec![0x41, 0x00, 0xBE, 0x3F, 0xA8, 0x13]]));
        assert!(!is_link_ready(&[vec![0x41, 0x0C, 0x1A, 0xF8]]));
        assert!(is_clear_ack(&[vec![0x44]]));
        assert!(!is_clear_ack(&[]));
    }

    #[test]
    fn test_decode_vin_can() {
        let mut message = vec![0x49, 0x02, 0x01];
        message.extend_from_slice(b"1D4GP00R55B123456");
        assert_eq!(decode_vin(&[message]).as_deref(), Some("1D4GP00R55B123456"));
    }

    #[test]
    fn test_decode_vin_legacy() {
        let vin = b"1D4GP00R55B123456";
        let mut messages = vec![vec![0x49, 0x02, 0x01, 0x00, 0x00, 0x00, vin[0]]];
        for (i, chunk) in vin[1..].chunks(4).enumerate() {
            let mut message = vec![0x49, 0x02, (i + 2) as u8];
            message.extend_from_slice(chunk);
            messages.push(message);
        }
        assert_eq!(decode_vin(&messages).as_deref(), Some("1D4GP00R55B123456"));
    }

    #[test]
    fn test_decode_vin_missing() {
        assert_eq!(decode_vin(&[vec![0x49, 0x02, 0x01, 0x31]]), None);
    }
}
