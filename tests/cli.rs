use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use breath_lamp::config::{load_config, save_config, Config, SensorSource, SimulatedSensorConfig};

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_breath-lamp"))
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("breath-lamp-cli-{}-{}", name, std::process::id()))
}

fn fast_config(present: bool) -> Config {
    let mut config = Config::default();
    config.service.address = "127.0.0.1:0".to_string();
    config.service.ready_timeout_ms = 3_000;
    config.lamp.write_delay_ms = 0;
    config.sensor.source = SensorSource::Simulated(SimulatedSensorConfig {
        present,
        frame_interval_ms: 1,
        ..SimulatedSensorConfig::default()
    });
    config
}

fn run_with(config: &Config, name: &str, args: &[&str]) -> Output {
    let path = temp_path(name).with_extension("yaml");
    save_config(config, &path).unwrap();

    let output = binary()
        .arg("--config")
        .arg(&path)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap();

    let _ = std::fs::remove_file(path);
    output
}

#[test]
fn bounded_run_exits_cleanly() {
    let output = run_with(&fast_config(true), "run", &["run", "--max-ticks", "10"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0), "stdout: {}", stdout);
    assert!(stdout.contains("Starting breathing monitor"));
    assert!(stdout.contains("Done!"));
}

#[test]
fn bounded_in_process_run_exits_cleanly() {
    let output = run_with(
        &fast_config(true),
        "in-process",
        &["run", "--in-process", "--max-ticks", "10"],
    );
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn missing_device_exits_with_failure() {
    let output = run_with(&fast_config(false), "no-device", &["run", "--max-ticks", "10"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert!(!stdout.contains("Starting breathing monitor"));
}

#[test]
fn serve_without_device_exits_with_failure() {
    let output = run_with(&fast_config(false), "serve", &["serve"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert!(!stdout.contains("ready "));
}

#[test]
fn init_config_writes_loadable_defaults() {
    let path = temp_path("init").with_extension("yaml");
    let status = binary()
        .arg("init-config")
        .arg(&path)
        .status()
        .unwrap();

    assert!(status.success());
    assert_eq!(load_config(&path).unwrap(), Config::default());
    let _ = std::fs::remove_file(path);
}
