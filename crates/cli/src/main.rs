//! # CLI - interactive asset bundle shell
//!
//! A REPL-style front end for a packed asset bundle. Reads commands from
//! stdin, runs them against the bundle, and prints results to stdout.
//! Diagnostics go to stderr through `tracing`, so stdout stays scriptable.
//!
//! ## Commands
//!
//! ```text
//! IMPORT path src [reserve]  Import a local file (reserve = extra slack bytes)
//! PUT path text...           Import the given text
//! GET path                   Print an asset as text (or "(nil)")
//! DEL path                   Delete an asset
//! EXISTS path                Print true / false
//! STAT path                  Print size, allocation, offset and mtime
//! LIST [prefix]              List assets, optionally filtered by prefix
//! STATS                      Print bundle statistics
//! COMPACT                    Reclaim trashed space now
//! EXPORT path dst            Copy an asset out to a local file
//! EXIT / QUIT                Close the bundle and quit
//! ```
//!
//! The bundle is also closed (compacted and persisted) on end of input.
//!
//! ## Configuration
//!
//! ```text
//! BUNDLE_PATH        bundle file path                 (default: "assets.bundle")
//! BUNDLE_READ_ONLY   open without write access        (default: "false")
//! BUNDLE_RESERVE     default slack bytes per import   (default: 0)
//! BUNDLE_COPY_CHUNK  compaction copy chunk in bytes   (default: 4096)
//! RUST_LOG           log filter for stderr            (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ BUNDLE_PATH=game.bundle cargo run -p cli
//! bundle opened (path=game.bundle, mode=Writable, assets=0, reserve=0)
//! > PUT ui/title.txt Hello there
//! OK (11 bytes)
//! > GET ui\title.txt
//! Hello there
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use bundle::{AssetBundle, BundleError, BundleOptions, OpenMode};
use config::BundleConfig;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::time::UNIX_EPOCH;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Prints a failed command. A missing asset is reported as `(nil)` rather
/// than an error, matching a lookup miss.
fn report(op: &str, err: BundleError) {
    match err {
        BundleError::NotFound(_) => println!("(nil)"),
        other => println!("ERR {} failed: {}", op, other),
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cfg = BundleConfig::from_env();
    let mode = if cfg.read_only {
        OpenMode::ReadOnly
    } else {
        OpenMode::Writable
    };
    let options = BundleOptions {
        copy_chunk_size: cfg.copy_chunk_size,
    };

    let mut bundle = AssetBundle::open_with(&cfg.path, mode, options)
        .with_context(|| format!("opening bundle {}", cfg.path.display()))?;

    println!(
        "bundle opened (path={}, mode={:?}, assets={}, reserve={})",
        cfg.path.display(),
        mode,
        bundle.len(),
        cfg.default_reserve
    );
    println!("Commands: IMPORT path src [reserve] | PUT path text | GET path | DEL path");
    println!("          EXISTS path | STAT path | LIST [prefix] | EXPORT path dst");
    println!("          STATS | COMPACT | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "IMPORT" => match (parts.next(), parts.next()) {
                    (Some(path), Some(src)) => {
                        let reserve = match parts.next().map(str::parse::<u64>) {
                            None => Some(cfg.default_reserve),
                            Some(Ok(r)) => Some(r),
                            Some(Err(_)) => None,
                        };
                        match reserve {
                            Some(reserve) => {
                                match bundle.import_file_from_path(path, src, reserve) {
                                    Ok(()) => match bundle.get_file_size(path) {
                                        Ok(n) => println!("OK ({} bytes)", n),
                                        Err(e) => report("import", e),
                                    },
                                    Err(e) => println!("ERR import failed: {}", e),
                                }
                            }
                            None => println!("ERR reserve must be a non-negative integer"),
                        }
                    }
                    _ => println!("ERR usage: IMPORT path src [reserve]"),
                },
                "PUT" => {
                    if let Some(path) = parts.next() {
                        let text = parts.collect::<Vec<&str>>().join(" ");
                        match bundle.import_file(path, text.as_bytes(), cfg.default_reserve) {
                            Ok(()) => println!("OK ({} bytes)", text.len()),
                            Err(e) => println!("ERR put failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: PUT path text");
                    }
                }
                "GET" => {
                    if let Some(path) = parts.next() {
                        match bundle.read_file(path) {
                            Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                            Err(e) => report("read", e),
                        }
                    } else {
                        println!("ERR usage: GET path");
                    }
                }
                "DEL" => {
                    if let Some(path) = parts.next() {
                        match bundle.delete_file(path) {
                            Ok(()) => println!("OK"),
                            Err(e) => report("del", e),
                        }
                    } else {
                        println!("ERR usage: DEL path");
                    }
                }
                "EXISTS" => {
                    if let Some(path) = parts.next() {
                        println!("{}", bundle.file_exists(path));
                    } else {
                        println!("ERR usage: EXISTS path");
                    }
                }
                "STAT" => {
                    if let Some(path) = parts.next() {
                        match bundle.descriptor(path) {
                            Some(d) => {
                                let mtime = d
                                    .time
                                    .duration_since(UNIX_EPOCH)
                                    .map(|t| t.as_millis())
                                    .unwrap_or(0);
                                println!(
                                    "size={} allocated={} offset={} modified_ms={}",
                                    d.length, d.allocated_size, d.offset, mtime
                                );
                            }
                            None => println!("(nil)"),
                        }
                    } else {
                        println!("ERR usage: STAT path");
                    }
                }
                "LIST" => {
                    let names = match parts.next() {
                        Some(prefix) => bundle.enumerate_files_with_prefix(prefix),
                        None => bundle.enumerate_files(),
                    };
                    if names.is_empty() {
                        println!("(empty)");
                    } else {
                        for name in &names {
                            println!("{}", name);
                        }
                        println!("({} assets)", names.len());
                    }
                }
                "EXPORT" => match (parts.next(), parts.next()) {
                    (Some(path), Some(dst)) => match export(&bundle, path, dst) {
                        Ok(n) => println!("OK ({} bytes)", n),
                        Err(e) => match e.downcast::<BundleError>() {
                            Ok(be) => report("export", be),
                            Err(e) => println!("ERR export failed: {:#}", e),
                        },
                    },
                    _ => println!("ERR usage: EXPORT path dst"),
                },
                "STATS" => {
                    let s = bundle.stats();
                    println!(
                        "live={} trashed={} live_bytes={} slack_bytes={} trashed_bytes={} index_offset={} pooled_handles={}",
                        s.live_assets,
                        s.trashed_assets,
                        s.live_bytes,
                        s.slack_bytes,
                        s.trashed_bytes,
                        s.index_offset,
                        bundle.pooled_handle_count()
                    );
                }
                "COMPACT" => match bundle.compact() {
                    Ok(reclaimed) => println!("OK (reclaimed {} bytes)", reclaimed),
                    Err(e) => println!("ERR compact failed: {}", e),
                },
                "EXIT" | "QUIT" => {
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    let path = bundle.path().to_path_buf();
    bundle
        .close()
        .with_context(|| format!("closing bundle {}", path.display()))?;
    info!(path = %path.display(), "shell finished");
    println!("bye");
    Ok(())
}

/// Streams asset `path` into the local file `dst`. Returns bytes copied.
fn export(bundle: &AssetBundle, path: &str, dst: &str) -> Result<u64> {
    let mut stream = bundle.open_file(path)?;
    let mut out = File::create(dst).with_context(|| format!("creating {}", dst))?;
    let n = io::copy(&mut stream, &mut out)?;
    out.sync_all()?;
    Ok(n)
}
