//! ELM327 reply classification and frame assembly
//!
//! The adapter answers every command with text lines terminated by a `>`
//! prompt. Data lines are hex bytes; CAN multi-frame answers start with a
//! three-digit byte count followed by `N:` prefixed frames:
//!
//! ```text
//! 00A
//! 0: 43 04 01 33 01 71
//! 1: 04 20 04 30 00 00 00
//! ```

/// Lines that mean the adapter is fine but the vehicle side did not answer
const NO_VEHICLE_MARKERS: &[&str] = &[
    "NO DATA",
    "UNABLE TO CONNECT",
    "CAN ERROR",
    "BUS ERROR",
    "BUS BUSY",
    "FB ERROR",
    "STOPPED",
];

/// Lines that mean the adapter could not make sense of the exchange
const REJECT_MARKERS: &[&str] = &["DATA ERROR", "BUFFER FULL", "RX ERROR"];

/// Classified reply to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElmReply {
    /// Payload lines (echo, status chatter and blanks removed)
    Data(Vec<String>),
    /// Vehicle did not respond; carries the adapter's message
    NoVehicle(String),
    /// Adapter rejected the command or reported corrupt data
    Rejected(String),
}

/// Split a raw reply (prompt already stripped) and classify it
pub fn parse_reply(raw: &str, command: &str) -> ElmReply {
    let mut lines = Vec::new();

    for line in raw.split(['\r', '\n']) {
        let line = line.trim().trim_matches('\0');
        if line.is_empty() || line.eq_ignore_ascii_case(command) {
            continue;
        }
        let upper = line.to_ascii_uppercase();

        if upper == "?" || REJECT_MARKERS.iter().any(|m| upper.contains(m)) {
            return ElmReply::Rejected(line.to_string());
        }
        if upper == "ERROR" || NO_VEHICLE_MARKERS.iter().any(|m| upper.contains(m)) {
            return ElmReply::NoVehicle(line.to_string());
        }
        if upper.starts_with("BUS INIT") {
            if upper.contains("ERROR") {
                return ElmReply::NoVehicle(line.to_string());
            }
            continue;
        }
        if upper.starts_with("SEARCHING") {
            continue;
        }

        lines.push(upper);
    }

    ElmReply::Data(lines)
}

/// True for the adapter's `NO DATA` message, as opposed to bus or connect errors
pub fn is_no_data(reason: &str) -> bool {
    reason.trim().eq_ignore_ascii_case("NO DATA")
}

/// Turn data lines into response messages
///
/// Single-frame lines become one message each. A CAN byte-count header opens
/// a multi-frame message which collects the following `N:` frames and is
/// truncated to the declared length.
pub fn assemble_messages(lines: &[String]) -> Result<Vec<Vec<u8>>, String> {
    let mut messages = Vec::new();
    let mut pending: Option<(usize, Vec<u8>)> = None;

    for line in lines {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();

        if compact.len() == 3 && compact.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Some((len, mut data)) = pending.take() {
                data.truncate(len);
                messages.push(data);
            }
            let len = usize::from_str_radix(&compact, 16)
                .map_err(|e| format!("bad frame header {:?}: {}", line, e))?;
            pending = Some((len, Vec::with_capacity(len)));
            continue;
        }

        if let Some((index, payload)) = compact.split_once(':') {
            if index.len() == 1 && index.chars().all(|c| c.is_ascii_hexdigit()) {
                let bytes = decode_hex(payload, line)?;
                match pending.as_mut() {
                    Some((_, data)) => data.extend_from_slice(&bytes),
                    None => return Err(format!("frame without header: {:?}", line)),
                }
                continue;
            }
        }

        if let Some((len, mut data)) = pending.take() {
            data.truncate(len);
            messages.push(data);
        }
        messages.push(decode_hex(&compact, line)?);
    }

    if let Some((len, mut data)) = pending.take() {
        data.truncate(len);
        messages.push(data);
    }

    Ok(messages)
}

fn decode_hex(compact: &str, line: &str) -> Result<Vec<u8>, String> {
    hex::decode(compact).map_err(|e| format!("bad data line {:?}: {}", line, e))
}

/// Human-readable protocol for an `ATDPN` answer such as `A6`
pub fn protocol_description(reply: &str) -> Option<String> {
    let reply = reply.trim();
    // Automatic selection prefixes the number with "A"
    let number = match reply.len() {
        2 if reply.starts_with('A') => &reply[1..],
        _ => reply,
    };
    let description = match number {
        "1" => "SAE J1850 PWM",
        "2" => "SAE J1850 VPW",
        "3" => "ISO 9141-2",
        "4" => "ISO 14230-4 KWP (5 baud init)",
        "5" => "ISO 14230-4 KWP (fast init)",
        "6" => "ISO 15765-4 CAN (11 bit ID, 500 kbaud)",
        "7" => "ISO 15765-4 CAN (29 bit ID, 500 kbaud)",
        "8" => "ISO 15765-4 CAN (11 bit ID, 250 kbaud)",
        "9" => "ISO 15765-4 CAN (29 bit ID, 250 kbaud)",
        "A" => "SAE J1939 CAN",
        "B" => "USER1 CAN",
        "C" => "USER2 CAN",
        _ => return None,
    };
    Some(description.to_string())
}
