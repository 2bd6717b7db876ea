//! Integration tests for ringvox-cli.
//!
//! Each test writes its input assets with ringvox-io into a temp directory and
//! runs the built `ringvox` binary against them.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use ringvox_core::{MemorySource, read_to_end};
use ringvox_io::{ToneSource, open_file, write_wav};
use tempfile::TempDir;

/// Helper to get the path to the `ringvox` binary built by cargo.
fn ringvox_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ringvox"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn run(args: &[&str]) -> Output {
    ringvox_bin().args(args).output().expect("failed to run ringvox")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A 0.25 s 48 kHz tone.
fn tone_wav(dir: &Path) -> PathBuf {
    let path = dir.join("tone.wav");
    write_wav(&path, &mut ToneSource::new(440.0, 0.25)).unwrap();
    path
}

/// 1000 frames of mono ramp at 8 kHz.
fn ramp_wav(dir: &Path) -> PathBuf {
    let path = dir.join("ramp.wav");
    let samples: Vec<i16> = (0..1000).collect();
    write_wav(&path, &mut MemorySource::from_i16(&samples, 8000, 1)).unwrap();
    path
}

// ---------------------------------------------------------------------------
// `ringvox info`
// ---------------------------------------------------------------------------

#[test]
fn cli_info_reports_format_and_length() {
    let dir = TempDir::new().unwrap();
    let path = tone_wav(dir.path());
    let output = run(&["info", path.to_str().unwrap()]);
    assert!(output.status.success(), "ringvox info failed");

    let out = stdout(&output);
    assert!(out.contains("Sample Rate: 48000 Hz"), "got: {out}");
    assert!(out.contains("Channels:    1"));
    assert!(out.contains("0.250s (12000 frames)"));
}

#[test]
fn cli_info_fails_on_missing_file() {
    let dir = TempDir::new().unwrap();
    let output = run(&["info", dir.path().join("gone.wav").to_str().unwrap()]);
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// `ringvox cat`
// ---------------------------------------------------------------------------

#[test]
fn cli_cat_to_wav_preserves_samples() {
    let dir = TempDir::new().unwrap();
    let input = tone_wav(dir.path());
    let out_path = dir.path().join("copy.wav");
    let output = run(&[
        "cat",
        input.to_str().unwrap(),
        "-o",
        out_path.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "ringvox cat failed");

    let mut original = open_file(&input).unwrap();
    let mut copy = open_file(&out_path).unwrap();
    assert_eq!(
        read_to_end(copy.as_mut()).unwrap(),
        read_to_end(original.as_mut()).unwrap()
    );
}

#[test]
fn cli_cat_raw_with_seek() {
    let dir = TempDir::new().unwrap();
    let input = ramp_wav(dir.path());
    let out_path = dir.path().join("tail.raw");
    // 0.1 s at 8 kHz is frame 800
    let output = run(&[
        "cat",
        input.to_str().unwrap(),
        "-o",
        out_path.to_str().unwrap(),
        "--format",
        "raw",
        "--seek",
        "0.1",
    ]);
    assert!(output.status.success(), "ringvox cat --format raw failed");

    let raw = std::fs::read(&out_path).unwrap();
    assert_eq!(raw.len(), 400);
    assert_eq!(i16::from_le_bytes([raw[0], raw[1]]), 800);
}

#[test]
fn cli_cat_rejects_seek_past_end() {
    let dir = TempDir::new().unwrap();
    let input = ramp_wav(dir.path());
    let out_path = dir.path().join("x.wav");
    let output = run(&[
        "cat",
        input.to_str().unwrap(),
        "-o",
        out_path.to_str().unwrap(),
        "--seek",
        "5",
    ]);
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// `ringvox simulate`
// ---------------------------------------------------------------------------

#[test]
fn cli_simulate_streams_to_completion() {
    let dir = TempDir::new().unwrap();
    let input = tone_wav(dir.path());
    let output = run(&["simulate", input.to_str().unwrap(), "--tick-ms", "50"]);
    assert!(output.status.success(), "ringvox simulate failed");

    let out = stdout(&output);
    assert!(out.contains("Backend:     virtual"), "got: {out}");
    assert!(out.contains("Load errors: 0"));
    assert!(out.contains("Finished"));
}

#[test]
fn cli_simulate_static_with_effect() {
    let dir = TempDir::new().unwrap();
    let input = ramp_wav(dir.path());
    let output = run(&[
        "simulate",
        input.to_str().unwrap(),
        "--static",
        "--effect",
        "reverb",
        "--position",
        "1,0,-2",
    ]);
    assert!(output.status.success(), "ringvox simulate --static failed");
    assert!(stdout(&output).contains("1 sources, 1 buffers created"));
}

#[test]
fn cli_simulate_loop_stops_at_time_limit() {
    let dir = TempDir::new().unwrap();
    let input = ramp_wav(dir.path());
    let output = run(&[
        "simulate",
        input.to_str().unwrap(),
        "--abloop",
        "100:900",
        "--max-secs",
        "1",
        "--tick-ms",
        "100",
    ]);
    assert!(output.status.success(), "ringvox simulate --abloop failed");
    let out = stdout(&output);
    assert!(out.contains("in 11 updates"), "got: {out}");
    assert!(out.contains("Finished"));
}

#[test]
fn cli_simulate_counts_missing_files() {
    let dir = TempDir::new().unwrap();
    let input = ramp_wav(dir.path());
    let missing = dir.path().join("missing.ogg");
    let output = run(&[
        "simulate",
        input.to_str().unwrap(),
        missing.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Load errors: 1"));
}

#[test]
fn cli_simulate_headless_finishes_immediately() {
    let dir = TempDir::new().unwrap();
    let input = ramp_wav(dir.path());
    let output = run(&["simulate", input.to_str().unwrap(), "--headless"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("none (headless)"));
    assert!(out.contains("in 1 updates"), "got: {out}");
}

#[test]
fn cli_simulate_reads_config_file() {
    let dir = TempDir::new().unwrap();
    let input = ramp_wav(dir.path());
    let config = dir.path().join("engine.toml");
    std::fs::write(&config, "[ring]\nbuffers = 1\n").unwrap();
    let output = run(&[
        "simulate",
        input.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    assert!(!output.status.success(), "invalid ring config should fail");
}

#[test]
fn cli_simulate_rejects_bad_vectors() {
    let output = run(&["simulate", "x.wav", "--velocity", "1,2,3,4"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("X,Y,Z"));
}
