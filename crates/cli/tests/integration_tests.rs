/// Integration tests for the bundle CLI.
/// Tests cover: put/get, import/export, delete, listing, compaction, persistence, read-only mode
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Helper to run CLI commands and capture stdout
fn run_cli_with(bundle: &Path, envs: &[(&str, &str)], command: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cli"));
    cmd.env("BUNDLE_PATH", bundle.to_str().unwrap())
        .env("BUNDLE_COPY_CHUNK", "64") // small chunks exercise multi-step moves
        .env_remove("BUNDLE_READ_ONLY")
        .env_remove("BUNDLE_RESERVE");
    for (k, v) in envs {
        cmd.env(k, v);
    }

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().expect("Failed to open stdin");
        stdin
            .write_all(command.as_bytes())
            .expect("Failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("Failed to write EXIT");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn run_cli_command(bundle: &Path, command: &str) -> String {
    run_cli_with(bundle, &[], command)
}

#[test]
fn test_basic_put_get() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let output = run_cli_command(&bundle, "PUT greeting hello world\nGET greeting\n");

    assert!(output.contains("OK (11 bytes)"));
    assert!(output.contains("hello world"));
    assert!(output.contains("bye"));
}

#[test]
fn test_backslash_paths_are_normalized() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let output = run_cli_command(&bundle, "PUT ui/title.txt Title\nGET ui\\title.txt\nEXISTS ui\\title.txt\n");

    assert!(output.contains("Title"));
    assert!(output.contains("true"));
}

#[test]
fn test_missing_asset_is_nil() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let output = run_cli_command(&bundle, "GET nope\nDEL nope\nSTAT nope\nEXISTS nope\n");

    assert_eq!(output.matches("(nil)").count(), 3);
    assert!(output.contains("false"));
}

#[test]
fn test_delete_asset() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let output = run_cli_command(&bundle, "PUT delme value\nGET delme\nDEL delme\nGET delme\n");

    assert!(output.contains("value"));
    assert!(output.contains("(nil)"));
}

#[test]
fn test_import_and_export_file() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");
    let src = dir.path().join("source.bin");
    let dst = dir.path().join("exported.bin");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
    fs::write(&src, &data).unwrap();

    let commands = format!(
        "IMPORT tex/stone.bin {} 100\nSTAT tex/stone.bin\nEXPORT tex/stone.bin {}\n",
        src.display(),
        dst.display()
    );
    let output = run_cli_command(&bundle, &commands);

    assert!(output.contains("OK (10000 bytes)"));
    assert!(output.contains("size=10000 allocated=10100 offset=12"));
    assert_eq!(fs::read(&dst).unwrap(), data);
}

#[test]
fn test_import_missing_source_reports_error() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");
    let missing = dir.path().join("missing.bin");

    let output = run_cli_command(&bundle, &format!("IMPORT x {}\nEXISTS x\n", missing.display()));

    assert!(output.contains("ERR import failed"));
    assert!(output.contains("false"));
}

#[test]
fn test_bad_reserve_rejected() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");
    let src = dir.path().join("s.bin");
    fs::write(&src, b"abc").unwrap();

    let output = run_cli_command(&bundle, &format!("IMPORT x {} lots\n", src.display()));

    assert!(output.contains("ERR reserve must be a non-negative integer"));
}

#[test]
fn test_list_with_prefix() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let commands = "PUT ui/a 1\nPUT ui/b 2\nPUT snd/c 3\nLIST ui/\nLIST\n";
    let output = run_cli_command(&bundle, commands);

    assert!(output.contains("(2 assets)"));
    assert!(output.contains("(3 assets)"));
    assert!(output.contains("snd/c"));
}

#[test]
fn test_empty_list() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let output = run_cli_command(&bundle, "LIST\n");

    assert!(output.contains("(empty)"));
}

#[test]
fn test_compact_reclaims_deleted_space() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let commands = "PUT a aaaaaaaaaa\nPUT b bbbbb\nDEL a\nSTATS\nCOMPACT\nSTATS\nGET b\n";
    let output = run_cli_command(&bundle, commands);

    assert!(output.contains("trashed=1"));
    assert!(output.contains("OK (reclaimed 10 bytes)"));
    assert!(output.contains("trashed=0"));
    assert!(output.contains("index_offset=17"));
    assert!(output.contains("bbbbb"));
}

#[test]
fn test_default_reserve_from_env() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let output = run_cli_with(&bundle, &[("BUNDLE_RESERVE", "20")], "PUT a xyz\nSTAT a\n");

    assert!(output.contains("reserve=20"));
    assert!(output.contains("size=3 allocated=23"));
}

#[test]
fn test_persistence_across_restarts() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    run_cli_command(&bundle, "PUT persist survives\nPUT gone temp\nDEL gone\n");
    let output = run_cli_command(&bundle, "GET persist\nEXISTS gone\nSTATS\n");

    assert!(output.contains("assets=1"));
    assert!(output.contains("survives"));
    assert!(output.contains("false"));
    assert!(output.contains("trashed=0"));
}

#[test]
fn test_close_on_end_of_input() {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let mut child = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("BUNDLE_PATH", bundle.to_str().unwrap())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");
    child
        .stdin
        .take()
        .expect("Failed to open stdin")
        .write_all(b"PUT eof kept\n")
        .expect("Failed to write to stdin");
    let output = child.wait_with_output().expect("Failed to read output");
    assert!(output.status.success());

    let output = run_cli_command(&bundle, "GET eof\n");
    assert!(output.contains("kept"));
}

#[test]
fn test_read_only_mode_rejects_writes() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");
    run_cli_command(&bundle, "PUT a original\n");
    let before = fs::read(&bundle).unwrap();

    let output = run_cli_with(
        &bundle,
        &[("BUNDLE_READ_ONLY", "true")],
        "PUT a changed\nDEL a\nGET a\n",
    );

    assert!(output.contains("mode=ReadOnly"));
    assert!(output.contains("ERR put failed"));
    assert!(output.contains("ERR del failed"));
    assert!(output.contains("original"));
    assert_eq!(fs::read(&bundle).unwrap(), before);
}

#[test]
fn test_corrupt_bundle_fails_to_open() {
    use std::process::Command;

    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");
    fs::write(&bundle, b"definitely not a bundle").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("BUNDLE_PATH", bundle.to_str().unwrap())
        .output()
        .expect("Failed to run CLI");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("opening bundle"));
}

#[test]
fn test_unknown_command() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let output = run_cli_command(&bundle, "FROB x\n");

    assert!(output.contains("unknown command: FROB"));
}

#[test]
fn test_mixed_operations_stress() {
    let dir = tempdir().unwrap();
    let bundle = dir.path().join("assets.bundle");

    let mut commands = String::new();
    for i in 0..50 {
        commands.push_str(&format!("PUT key{:02} value{}\n", i, i));
    }
    for i in (0..50).step_by(3) {
        commands.push_str(&format!("DEL key{:02}\n", i));
    }
    // rewrite a few with longer values so they relocate
    for i in (1..50).step_by(7) {
        commands.push_str(&format!("PUT key{:02} much-longer-value-{}\n", i, i));
    }
    commands.push_str("COMPACT\n");
    for i in 0..50 {
        commands.push_str(&format!("GET key{:02}\n", i));
    }

    let output = run_cli_command(&bundle, &commands);

    assert!(output.contains("much-longer-value-8"));
    assert!(output.contains("value2\n"));
    // 17 deleted, two of them (key15, key36) written back
    assert_eq!(output.matches("(nil)").count(), 15);
}
