#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

fn u3vcam(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_u3vcam"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("u3vcam should run")
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be one JSON document")
}

fn unique_temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "u3vcam-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

#[test]
fn version_prints_package_version() {
    let output = u3vcam(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("u3vcam {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn encode_then_decode_write_command() {
    let encoded = u3vcam(&[
        "--format",
        "json",
        "encode",
        "write",
        "0x40464",
        "5000",
        "--request-id",
        "9",
    ]);
    assert!(encoded.status.success());
    let encoded = json(&encoded);
    assert_eq!(encoded["length"], 28);
    assert_eq!(encoded["register"], "exposure_time");
    let hex = encoded["hex"]
        .as_str()
        .expect("hex should be a string")
        .to_string();

    let decoded = u3vcam(&["--format", "json", "decode", &hex]);
    assert!(decoded.status.success());
    let decoded = json(&decoded);
    assert_eq!(decoded["kind"], "command");
    assert_eq!(decoded["command"], "WRITEMEM_CMD");
    assert_eq!(decoded["request_id"], 9);
    assert_eq!(decoded["address"], 0x40464);
    assert_eq!(decoded["value"], 5000);
}

#[test]
fn encode_read_raw_is_24_bytes() {
    let output = u3vcam(&["--format", "raw", "encode", "read", "0x1D8"]);
    assert!(output.status.success());
    assert_eq!(output.stdout.len(), 24);
    assert_eq!(&output.stdout[..4], &[0x55, 0x33, 0x56, 0x43]);
}

#[test]
fn decode_rejects_bad_prefix() {
    let output = u3vcam(&["--format", "json", "decode", "000000000040020800000100"]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid frame prefix"));
}

#[test]
fn decode_rejects_malformed_hex() {
    let output = u3vcam(&["decode", "abc"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn regmap_lists_registers() {
    let output = u3vcam(&["--format", "json", "regmap"]);
    assert!(output.status.success());
    let registers = json(&output);
    let names: Vec<&str> = registers
        .as_array()
        .expect("regmap output should be an array")
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert!(names.contains(&"sbrm_pointer"));
    assert!(names.contains(&"laser_enable"));

    let resolved = u3vcam(&["--format", "json", "regmap", "--resolve", "263268"]);
    assert!(resolved.status.success());
    assert_eq!(json(&resolved)[0]["name"], "exposure_time");
}

#[test]
fn simulate_acquires_one_frame() {
    let output = u3vcam(&[
        "--format", "json", "simulate", "--width", "32", "--height", "4", "--exposure", "500",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let record = json(&output);
    assert_eq!(record["width"], 32);
    assert_eq!(record["height"], 4);
    assert_eq!(record["exposure"], 500);
    assert_eq!(record["illumination"], "ambient");
    assert_eq!(record["payload_chunks"], 2);
    assert_eq!(record["payload_bytes"], 256);
    assert_eq!(record["retries"], 0);
    assert_eq!(record["block_id"], 1);
}

#[test]
fn simulate_retries_partial_transfer() {
    let output = u3vcam(&[
        "--format",
        "json",
        "simulate",
        "--width",
        "32",
        "--height",
        "4",
        "--fault",
        "1:partial=3",
        "--fault",
        "2:empty",
    ]);
    assert!(output.status.success());
    let record = json(&output);
    assert_eq!(record["retries"], 2);
    assert_eq!(record["payload_bytes"], 256);
}

#[test]
fn simulate_raw_writes_pixels() {
    let path = unique_temp_path("pixels");
    let output = u3vcam(&[
        "--format",
        "raw",
        "simulate",
        "--width",
        "16",
        "--height",
        "2",
        "--laser",
        "--profile",
        "captured-uwp",
        "--output",
        path.to_str().expect("temp path should be UTF-8"),
    ]);
    assert!(output.status.success());
    assert_eq!(output.stdout.len(), 16 * 2 * 2);
    let written = std::fs::read(&path).expect("image file should exist");
    assert_eq!(written, output.stdout);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn simulate_exit_codes_follow_error_kind() {
    let small = ["simulate", "--width", "16", "--height", "2"];

    let detached = u3vcam(&[&small[..], &["--fault", "1:detach"]].concat());
    assert_eq!(detached.status.code(), Some(69));

    let exhausted = u3vcam(
        &[
            &small[..],
            &[
                "--max-attempts",
                "2",
                "--fault",
                "1:transient",
                "--fault",
                "1:transient",
            ],
        ]
        .concat(),
    );
    assert_eq!(exhausted.status.code(), Some(3));

    let laser = u3vcam(&[&small[..], &["--laser", "--reject-write", "0xC02E4=1"]].concat());
    assert_eq!(laser.status.code(), Some(4));

    let stalled = u3vcam(&[&small[..], &["--stall-after", "1", "--timeout", "200ms"]].concat());
    assert_eq!(stalled.status.code(), Some(124));
}

#[test]
fn simulate_rejects_bad_config() {
    let path = unique_temp_path("config.json");
    std::fs::write(&path, r#"{"session": {"pixel_size": 3}}"#).expect("config should be writable");
    let output = u3vcam(&[
        "simulate",
        "--config",
        path.to_str().expect("temp path should be UTF-8"),
    ]);
    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_file(&path);

    let missing = u3vcam(&["simulate", "--config", "/nonexistent/u3vcam.json"]);
    assert_eq!(missing.status.code(), Some(64));
}
