//! Descriptions for common SAE generic trouble codes

use super::code::DtcCode;

/// Fallback for codes missing from the table (manufacturer specific etc.)
pub const UNKNOWN_DESCRIPTION: &str = "Unknown trouble code";

/// Look up the generic description for a code
pub fn describe(code: &DtcCode) -> &'static str {
    match code.as_str() {
        "P0100" => "Mass or Volume Air Flow Circuit Malfunction",
        "P0101" => "Mass or Volume Air Flow Circuit Range/Performance Problem",
        "P0102" => "Mass or Volume Air Flow Circuit Low Input",
        "P0103" => "Mass or Volume Air Flow Circuit High Input",
        "P0106" => "Manifold Absolute Pressure/Barometric Pressure Circuit Range/Performance Problem",
        "P0110" => "Intake Air Temperature Circuit Malfunction",
        "P0113" => "Intake Air Temperature Circuit High Input",
        "P0115" => "Engine Coolant Temperature Circuit Malfunction",
        "P0117" => "Engine Coolant Temperature Circuit Low Input",
        "P0118" => "Engine Coolant Temperature Circuit High Input",
        "P0120" => "Throttle Position Sensor/Switch A Circuit Malfunction",
        "P0128" => "Coolant Thermostat (Coolant Temperature Below Thermostat Regulating Temperature)",
        "P0130" => "O2 Sensor Circuit Malfunction (Bank 1 Sensor 1)",
        "P0131" => "O2 Sensor Circuit Low Voltage (Bank 1 Sensor 1)",
        "P0133" => "O2 Sensor Circuit Slow Response (Bank 1 Sensor 1)",
        "P0135" => "O2 Sensor Heater Circuit Malfunction (Bank 1 Sensor 1)",
        "P0141" => "O2 Sensor Heater Circuit Malfunction (Bank 1 Sensor 2)",
        "P0171" => "System Too Lean (Bank 1)",
        "P0172" => "System Too Rich (Bank 1)",
        "P0174" => "System Too Lean (Bank 2)",
        "P0175" => "System Too Rich (Bank 2)",
        "P0300" => "Random/Multiple Cylinder Misfire Detected",
        "P0301" => "Cylinder 1 Misfire Detected",
        "P0302" => "Cylinder 2 Misfire Detected",
        "P0303" => "Cylinder 3 Misfire Detected",
        "P0304" => "Cylinder 4 Misfire Detected",
        "P0305" => "Cylinder 5 Misfire Detected",
        "P0306" => "Cylinder 6 Misfire Detected",
        "P0325" => "Knock Sensor 1 Circuit Malfunction (Bank 1 or Single Sensor)",
        "P0335" => "Crankshaft Position Sensor A Circuit Malfunction",
        "P0340" => "Camshaft Position Sensor Circuit Malfunction",
        "P0400" => "Exhaust Gas Recirculation Flow Malfunction",
        "P0401" => "Exhaust Gas Recirculation Flow Insufficient Detected",
        "P0402" => "Exhaust Gas Recirculation Flow Excessive Detected",
        "P0420" => "Catalyst System Efficiency Below Threshold (Bank 1)",
        "P0430" => "Catalyst System Efficiency Below Threshold (Bank 2)",
        "P0440" => "Evaporative Emission Control System Malfunction",
        "P0442" => "Evaporative Emission Control System Leak Detected (small leak)",
        "P0446" => "Evaporative Emission Control System Vent Control Circuit Malfunction",
        "P0455" => "Evaporative Emission Control System Leak Detected (gross leak)",
        "P0500" => "Vehicle Speed Sensor Malfunction",
        "P0505" => "Idle Control System Malfunction",
        "P0562" => "System Voltage Low",
        "P0700" => "Transmission Control System Malfunction",
        "P0715" => "Input/Turbine Speed Sensor Circuit Malfunction",
        "C0035" => "Left Front Wheel Speed Sensor Circuit",
        "C0040" => "Right Front Wheel Speed Sensor Circuit",
        "B0001" => "Driver Frontal Stage 1 Deployment Control",
        "U0001" => "High Speed CAN Communication Bus",
        "U0100" => "Lost Communication With ECM/PCM A",
        "U0101" => "Lost Communication With TCM",
        "U0121" => "Lost Communication With Anti-Lock Brake System (ABS) Control Module",
        "U0140" => "Lost Communication With Body Control Module",
        _ => UNKNOWN_DESCRIPTION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_codes() {
        let known = DtcCode::parse("P0301").unwrap();
        assert_eq!(describe(&known), "Cylinder 1 Misfire Detected");

        let unknown = DtcCode::parse("P1999").unwrap();
        assert_eq!(describe(&unknown), UNKNOWN_DESCRIPTION);
    }
}
