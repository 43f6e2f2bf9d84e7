use std::fs;
use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_music_cli"))
}

fn fixture_file(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("music_cli_{}_{}", std::process::id(), name))
}

#[test]
fn analyze_fixture_finds_two_sections() {
    let output = cli()
        .args(["analyze", "--input", &fixture_file("two_sections.jsonl")])
        .output()
        .expect("failed to run music_cli analyze");
    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status.code()
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let json: Value = serde_json::from_str(stdout.trim()).expect("segments JSON payload");
    assert_eq!(json["entries"], 20);
    assert_eq!(json["segment_count"], 2);
    assert_eq!(json["segments"][0]["label"], "verse");
    assert_eq!(json["segments"][1]["fingerprint"][0], "G");
}

#[test]
fn analyze_rejects_lookback_beyond_window() {
    let output = cli()
        .args([
            "analyze",
            "--input",
            &fixture_file("two_sections.jsonl"),
            "--lookback",
            "900",
        ])
        .output()
        .expect("failed to run music_cli analyze");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(stderr.contains("3001"), "expected error code in stderr, got {stderr}");
    assert!(
        stderr.contains("Cache error in music_cli"),
        "expected structured error log, got {stderr}"
    );
}

#[test]
fn analyze_rejects_zero_bin_width() {
    for bin in ["0", "-1"] {
        let output = cli()
            .args([
                "analyze",
                "--input",
                &fixture_file("two_sections.jsonl"),
                &format!("--bin={bin}"),
            ])
            .output()
            .expect("failed to run music_cli analyze");
        assert_eq!(output.status.code(), Some(2), "--bin {bin}");
        assert!(output.stdout.is_empty());
        let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
        assert!(stderr.contains("3004"), "expected error code in stderr, got {stderr}");
    }
}

#[test]
fn malformed_fixture_reports_line() {
    let path = temp_file("malformed.jsonl");
    fs::write(
        &path,
        "{\"chord\":\"C\",\"frequency\":0.0,\"bpm\":0.0,\"timestamp\":1.0}\nnot json\n",
    )
    .unwrap();

    let output = cli()
        .args(["summary", "--input", &path.to_string_lossy()])
        .output()
        .expect("failed to run music_cli summary");
    fs::remove_file(&path).ok();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(stderr.contains("line 2"), "expected line number, got {stderr}");
}

#[test]
fn summary_prints_top_chords() {
    let output = cli()
        .args(["summary", "--input", &fixture_file("two_sections.jsonl")])
        .output()
        .expect("failed to run music_cli summary");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    assert!(stdout.contains("Entries: 20"), "got {stdout}");
    assert!(stdout.contains("Top chords: C x10, G x10"), "got {stdout}");
}

#[test]
fn replay_synthetic_progression() {
    let cache_path = temp_file("replay_cache.jsonl");
    let output = cli()
        .args([
            "replay",
            "--chords",
            "C,G",
            "--seconds-per-chord",
            "3",
            "--save-cache",
            &cache_path.to_string_lossy(),
        ])
        .output()
        .expect("failed to run music_cli replay");
    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status.code()
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let json: Value = serde_json::from_str(stdout.trim()).expect("replay report JSON payload");
    let chords: Vec<&str> = json["chords"]
        .as_array()
        .expect("chord timeline")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(chords.first(), Some(&"C"));
    assert_eq!(chords.last(), Some(&"G"));
    assert!(json["summary"]["blocks_processed"].as_u64().unwrap_or_default() > 0);
    assert!(json["telemetry"]["total_events"].as_u64().unwrap_or_default() > 0);
    assert_eq!(json["telemetry"]["dropped_blocks"], 0);
    let recent = json["telemetry"]["recent"].as_array().expect("telemetry events");
    assert!(recent.iter().any(|e| e["type"] == "cache_size"));

    let saved = fs::read_to_string(&cache_path).expect("saved cache fixture");
    fs::remove_file(&cache_path).ok();
    assert!(saved.lines().count() > 10);
}

#[test]
fn replay_rejects_unknown_chord() {
    let output = cli()
        .args(["replay", "--chords", "C,Q7"])
        .output()
        .expect("failed to run music_cli replay");
    assert_eq!(output.status.code(), Some(1));
}
