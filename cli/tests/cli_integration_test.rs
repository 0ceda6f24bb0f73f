use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tonemark"))
}

fn tmp_path(name: &str) -> PathBuf {
    let tmp_dir = PathBuf::from("tmp");
    fs::create_dir_all(&tmp_dir).ok();
    tmp_dir.join(name)
}

fn run_tonemark(args: &[&str]) -> (Output, String) {
    let output = Command::new(binary())
        .args(args)
        .output()
        .expect("Failed to execute tonemark");
    let text = String::from_utf8_lossy(&output.stderr).to_string() + &String::from_utf8_lossy(&output.stdout);
    (output, text)
}

#[test]
fn test_encode_then_decode_wav() {
    let encoded = tmp_path("cli_round_trip.wav");
    let (status, text) = run_tonemark(&["encode", encoded.to_str().unwrap(), "--text", "Hello CLI", "--cycles", "2"]);
    assert!(status.status.success(), "encode failed: {}", text);
    assert!(text.contains("Encoded"), "unexpected encode output: {}", text);
    assert!(encoded.exists());

    let (status, text) = run_tonemark(&["decode", encoded.to_str().unwrap()]);
    assert!(status.status.success(), "decode failed: {}", text);
    assert!(text.contains("Decoded: Hello CLI"), "unexpected decode output: {}", text);
}

#[test]
fn test_decode_json_output() {
    let encoded = tmp_path("cli_json.wav");
    run_tonemark(&["encode", encoded.to_str().unwrap(), "--text", "json", "-q", "2", "--cycles", "1"]);

    let (status, text) = run_tonemark(&["decode", encoded.to_str().unwrap(), "--json"]);
    assert!(status.status.success(), "decode failed: {}", text);
    let report: serde_json::Value = serde_json::from_slice(&status.stdout).expect("stdout is JSON");
    assert_eq!(report["text"], "json");
    assert_eq!(report["version"], 2);
    assert_eq!(report["recovery"], "candidate");
}

#[test]
fn test_container_output_round_trip() {
    let encoded = tmp_path("cli_round_trip.tmrk");
    let (status, text) = run_tonemark(&["encode", encoded.to_str().unwrap(), "--text", "boxed", "--cycles", "1"]);
    assert!(status.status.success(), "encode failed: {}", text);

    let header = fs::read(&encoded).unwrap();
    assert_eq!(&header[..4], b"TMRK");

    let (status, text) = run_tonemark(&["decode", encoded.to_str().unwrap()]);
    assert!(status.status.success(), "decode failed: {}", text);
    assert!(text.contains("Decoded: boxed"));
}

#[test]
fn test_listen_streams_recording() {
    let encoded = tmp_path("cli_listen.wav");
    run_tonemark(&["encode", encoded.to_str().unwrap(), "--text", "live", "--cycles", "2"]);

    let (status, text) = run_tonemark(&["listen", encoded.to_str().unwrap(), "--interval-ms", "200"]);
    assert!(status.status.success(), "listen failed: {}", text);
    assert!(text.contains("Decoded: live"), "unexpected listen output: {}", text);
}

#[test]
fn test_info_table() {
    let (status, text) = run_tonemark(&["info"]);
    assert!(status.status.success());
    assert!(text.contains("mobile"));
    assert!(text.contains("ultrasonic"));
    assert!(text.contains("16200"));

    let (status, _) = run_tonemark(&["info", "--band", "ultrasonic", "--json", "--sample-rate", "48000"]);
    let table: serde_json::Value = serde_json::from_slice(&status.stdout).expect("stdout is JSON");
    assert_eq!(table.as_array().map(|rows| rows.len()), Some(5));
    assert_eq!(table[0]["start_marker_hz"], 23000.0);
}

#[test]
fn test_payload_too_large_exit_code() {
    let encoded = tmp_path("cli_too_large.wav");
    let text = "x".repeat(120);
    let (status, output) = run_tonemark(&["encode", encoded.to_str().unwrap(), "--text", &text]);
    assert_eq!(status.status.code(), Some(2), "unexpected output: {}", output);
}

#[test]
fn test_silence_exit_code() {
    let silent = tmp_path("cli_silence.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&silent, spec).unwrap();
    for _ in 0..44100 * 10 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();

    let (status, text) = run_tonemark(&["decode", silent.to_str().unwrap()]);
    assert_eq!(status.status.code(), Some(3), "unexpected output: {}", text);
    assert!(text.contains("No cycle detected"));
}

#[test]
fn test_missing_input_fails() {
    let (status, _) = run_tonemark(&["decode", "tmp/does_not_exist.wav"]);
    assert!(!status.status.success());
}
