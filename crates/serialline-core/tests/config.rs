use pretty_assertions::assert_eq;
use serialline_core::{ConfigError, FlowControl, Parity, SerialOptions, SessionConfig};
use std::io::Write;

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "options": {{
                "baudRate": 115200,
                "dataBits": 7,
                "parity": "odd",
                "bufferSize": 4096,
                "flowControl": "hardware"
            }},
            "delimiter": ";",
            "skipEmptyLines": false,
            "maxReadRestarts": 3
        }}"#
    )
    .unwrap();

    let config = SessionConfig::from_file(file.path()).unwrap();
    assert_eq!(
        config.options,
        SerialOptions {
            baud_rate: 115200,
            data_bits: 7,
            stop_bits: 1,
            parity: Parity::Odd,
            buffer_size: 4096,
            flow_control: FlowControl::Hardware,
        }
    );
    assert_eq!(config.delimiter, ";");
    assert!(!config.skip_empty_lines);
    assert_eq!(config.max_read_restarts, Some(3));
}

#[test]
fn test_empty_file_object_uses_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{}}").unwrap();

    let config = SessionConfig::from_file(file.path()).unwrap();
    assert_eq!(config, SessionConfig::default());
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = SessionConfig::from_file(dir.path().join("missing.json"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_config_round_trips_through_json() {
    let config = SessionConfig::with_options(SerialOptions::with_baud_rate(57600)).delimiter("\r");
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"baudRate\":57600"));
    assert_eq!(SessionConfig::from_json_str(&json).unwrap(), config);
}
