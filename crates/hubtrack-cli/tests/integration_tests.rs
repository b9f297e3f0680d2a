//! Integration tests for CLI commands

use std::process::Command;
use tempfile::TempDir;

/// Helper to run hubtrack with an isolated configuration
fn hubtrack(dir: &TempDir, args: &[&str]) -> std::process::Output {
    let config = dir.path().join("config.yaml");
    if !config.exists() {
        std::fs::write(&config, "concurrency: 2\n").expect("Failed to write config");
    }
    Command::new(env!("CARGO_BIN_EXE_hubtrack"))
        .args(args)
        .arg("--config")
        .arg(&config)
        .env_remove("HUBTRACK_AUTH_PASS")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute hubtrack")
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

mod usage {
    use super::*;

    #[test]
    fn test_help() {
        let output = Command::new(env!("CARGO_BIN_EXE_hubtrack"))
            .arg("--help")
            .output()
            .unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("track"));
        assert!(stdout.contains("inspect"));
    }

    #[test]
    fn test_missing_subcommand_is_usage_error() {
        let output = Command::new(env!("CARGO_BIN_EXE_hubtrack")).output().unwrap();
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_unknown_output_format_is_usage_error() {
        let dir = TempDir::new().unwrap();
        let output = hubtrack(&dir, &["track", "https://charts.example.com", "-o", "xml"]);
        assert_eq!(output.status.code(), Some(64));
    }
}

mod track_command {
    use super::*;

    #[test]
    fn test_invalid_url() {
        let dir = TempDir::new().unwrap();
        let output = hubtrack(&dir, &["track", "not a url"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("invalid repository url"));
    }

    #[test]
    fn test_scheme_not_supported() {
        let dir = TempDir::new().unwrap();
        let output = hubtrack(&dir, &["track", "ftp://charts.example.com/stable"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("scheme not supported: ftp"));
    }

    #[test]
    fn test_invalid_registered_file() {
        let dir = TempDir::new().unwrap();
        let registered = dir.path().join("registered.yaml");
        std::fs::write(&registered, "- nginx@1.0.0\n").unwrap();

        let output = hubtrack(
            &dir,
            &[
                "track",
                "https://charts.example.com/stable",
                "--registered",
                registered.to_str().unwrap(),
            ],
        );

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("invalid registered packages file"));
    }

    #[test]
    fn test_invalid_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "concurrency: [oops\n").unwrap();

        let output = hubtrack(&dir, &["track", "https://charts.example.com/stable"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("Invalid configuration"));
    }

    #[test]
    fn test_unreachable_repository_is_network_error() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        let output = hubtrack(
            &dir,
            &[
                "track",
                "http://127.0.0.1:1/charts",
                "--images-dir",
                images.to_str().unwrap(),
            ],
        );

        assert_eq!(output.status.code(), Some(3));
        assert!(output.stdout.is_empty());
    }
}
