//! OBD-II request strings and ELM327 reply decoding

pub mod dtc;
pub mod response;

pub use dtc::{decode_stored_codes, decode_vin, is_clear_ack, is_link_ready, ObdDtc};
pub use response::{assemble_messages, is_no_data, parse_reply, protocol_description, ElmReply};

/// OBD-II requests as sent to the ELM327 (mode + PID, hex text)
pub mod request {
    /// Mode 01 PID 00: supported PIDs 01-20, doubles as a liveness check
    pub const SUPPORTED_PIDS: &str = "0100";
    /// Mode 03: show stored trouble codes
    pub const STORED_CODES: &str = "03";
    /// Mode 04: clear trouble codes and stored values
    pub const CLEAR_CODES: &str = "04";
    /// Mode 09 PID 02: vehicle identification number
    pub const VIN: &str = "0902";
}

/// Positive response service ids (request mode + 0x40)
pub mod response_sid {
    pub const CURRENT_DATA: u8 = 0x41;
    pub const STORED_CODES: u8 = 0x43;
    pub const CLEAR_CODES: u8 = 0x44;
    pub const VEHICLE_INFO: u8 = 0x49;
}

/// ELM327 AT commands
pub mod at {
    /// Full reset, answers with the version banner
    pub const RESET: &str = "ATZ";
    pub const ECHO_OFF: &str = "ATE0";
    pub const LINEFEEDS_OFF: &str = "ATL0";
    pub const SPACES_OFF: &str = "ATS0";
    pub const HEADERS_OFF: &str = "ATH0";
    /// Automatic protocol selection
    pub const PROTOCOL_AUTO: &str = "ATSP0";
    /// Describe protocol by number
    pub const DESCRIBE_PROTOCOL_NUMBER: &str = "ATDPN";
    /// Identify, answers with the version banner
    pub const IDENTIFY: &str = "ATI";
    /// Close the vehicle protocol
    pub const PROTOCOL_CLOSE: &str = "ATPC";

    /// Initialization sequence run on every new session
    pub const INIT_SEQUENCE: &[&str] = &[
        RESET,
        ECHO_OFF,
        LINEFEEDS_OFF,
        SPACES_OFF,
        HEADERS_OFF,
        PROTOCOL_AUTO,
    ];
}
