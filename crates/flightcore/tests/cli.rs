#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Output};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/flightcore-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn flightcore(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flightcore"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("flightcore should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn wrap_then_unwrap_round_trips_a_switch_command() {
    let wrapped = flightcore(&[
        "--format",
        "json",
        "wrap",
        "--type",
        "CommandEpsSwitchName",
        "--hex",
        "0501",
    ]);
    assert!(wrapped.status.success());
    let frame = stdout_json(&wrapped)["frame"]
        .as_str()
        .expect("frame should be a string")
        .to_string();

    let unwrapped = flightcore(&["--format", "json", "unwrap", &frame]);
    assert!(unwrapped.status.success());
    let packet = stdout_json(&unwrapped);
    assert_eq!(packet["packet_type"], "CommandEpsSwitchName");
    assert_eq!(packet["origin"], "ground");
    assert_eq!(packet["destination"], "obc");
    assert!(packet["decoded"]
        .as_str()
        .expect("switch command should decode")
        .contains("Rail5vB"));
}

#[test]
fn slip_frames_unwrap_with_flag_only() {
    let wrapped = flightcore(&[
        "--format",
        "pretty",
        "wrap",
        "--type",
        "CommandCameraCapture",
        "--to",
        "companion",
        "--slip",
    ]);
    assert!(wrapped.status.success());
    let frame = String::from_utf8_lossy(&wrapped.stdout).trim().to_string();
    assert!(frame.starts_with("c0") && frame.ends_with("c0"));

    let ok = flightcore(&["--format", "json", "unwrap", "--slip", &frame]);
    assert!(ok.status.success());
    assert_eq!(stdout_json(&ok)["destination"], "companion");

    let wrong = flightcore(&["unwrap", &frame]);
    assert_eq!(wrong.status.code(), Some(60));
}

#[test]
fn corrupt_frame_exits_60() {
    let output = flightcore(&["unwrap", "00010200020301000000"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unwrap failed"));
}

#[test]
fn bad_hex_is_usage_error() {
    let output = flightcore(&["unwrap", "xyz"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn run_answers_uplinked_ping() {
    let dir = unique_temp_dir("run");
    let config_path = dir.join("flight.json");
    std::fs::write(
        &config_path,
        r#"{
            "scheduler": {"slice_ms": 1},
            "pdu": {"warmup_ms": 10, "retry_interval_ms": 10, "poll_interval_ms": 1},
            "radio": {"receive_timeout_ms": 20, "min_receive_timeout_ms": 2,
                      "backlog_step_ms": 5, "post_send_delay_ms": 1, "poll_interval_ms": 1},
            "router": {"loop_period_ms": 1}
        }"#,
    )
    .expect("config should be writable");

    let output = flightcore(&[
        "--format",
        "json",
        "run",
        "--duration",
        "1s",
        "--deployed",
        "--config",
        config_path.to_str().expect("utf-8 path"),
        "--uplink",
        "CommandObcPing",
    ]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["deployed"], true);
    let transmitted = report["transmitted"]
        .as_array()
        .expect("transmitted should be an array");
    assert!(transmitted
        .iter()
        .any(|p| p["packet_type"] == "DataObcPong" && p["payload"] == "Pong"));
    let running = report["running_channels"]
        .as_array()
        .expect("running_channels should be an array");
    assert!(running.iter().any(|name| name == "radio"));
    assert!(running.iter().any(|name| name == "pdu"));
    assert_eq!(report["lingering_channels"], serde_json::json!([]));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_config_file_fails() {
    let output = flightcore(&[
        "run",
        "--duration",
        "100ms",
        "--config",
        "/nonexistent/flightcore.json",
    ]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn version_reports_package_version() {
    let output = flightcore(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("flightcore {}", env!("CARGO_PKG_VERSION"))
    );
}
