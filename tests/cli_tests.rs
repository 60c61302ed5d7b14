//! Command-line startup behavior of the `cellfill` binary
use std::process::Command;

use tempfile::tempdir;

fn cellfill() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cellfill"))
}

#[test]
fn run_reports_missing_dataset_before_missing_api_key() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("cellfill.toml");
    std::fs::write(&config, "[logging]\nfile_output = false\n").unwrap();
    let checkpoint = dir.path().join("checkpoint.json");
    std::fs::write(&checkpoint, r#"{"2-1": true}"#).unwrap();

    let output = cellfill()
        .current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .arg("run")
        .arg("--reset-checkpoint")
        .arg("--config")
        .arg(&config)
        .arg("--file")
        .arg(dir.path().join("absent.json"))
        .arg("--checkpoint")
        .arg(&checkpoint)
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("absent.json not found"), "stderr: {stderr}");
    assert!(!stderr.contains("API key"), "stderr: {stderr}");
    assert!(checkpoint.exists());
}

#[test]
fn run_without_api_key_leaves_checkpoint_alone() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("cellfill.toml");
    std::fs::write(&config, "[logging]\nfile_output = false\n").unwrap();
    let dataset = dir.path().join("terms.json");
    std::fs::write(&dataset, r#"[{"Term": "A", "Definition": ""}]"#).unwrap();
    let checkpoint = dir.path().join("checkpoint.json");
    std::fs::write(&checkpoint, r#"{"2-1": true}"#).unwrap();

    let output = cellfill()
        .current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .args(["run", "--reset-checkpoint", "--config"])
        .arg(&config)
        .arg("--file")
        .arg(&dataset)
        .arg("--checkpoint")
        .arg(&checkpoint)
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("missing API key"), "stderr: {stderr}");
    assert!(checkpoint.exists());
}
