//! `scan` / `report` / `diff` / `help` command-line front end.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigHandle;
use crate::differ::diff as compute_diff;
use crate::records::RecordsHandle;
use crate::stats::StatsSink;
use crate::util::format_duration;
use crate::walker::{walk_parallel_per_directory, walk_parallel_per_file, walk_recursive, WalkOptions};
use crate::{anyhow_loc, bail_loc};

const REVERT_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "seye", about = "Scan, diff, and report on directory trees", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the config file. Defaults to ./config.json.
    #[arg(long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Path to the records index. Defaults to ./records.json.
    #[arg(long, global = true, default_value = "records.json")]
    pub records: PathBuf,
}

/// Which walker to run. `Auto` follows §4.2's own rationale: per-file
/// dispatch wins when every file is being hashed, per-directory dispatch wins
/// when `readdir`+`stat` is the only cost.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WalkAlgorithm {
    #[default]
    Auto,
    Recursive,
    PerFile,
    PerDirectory,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk a directory, recording it and diffing it against the previous scan.
    Scan {
        path: PathBuf,
        /// Hash every regular file with SHA-256 instead of a metadata-only scan.
        #[arg(short = 'c', long)]
        comprehensive: bool,
        /// Worker thread count. Defaults to the number of logical CPUs.
        #[arg(short = 'n', long)]
        threads: Option<usize>,
        /// Walker algorithm. Defaults to picking per-file or per-directory
        /// parallel dispatch based on `--comprehensive`.
        #[arg(long, value_enum, default_value_t = WalkAlgorithm::Auto)]
        algorithm: WalkAlgorithm,
    },
    /// Walk a directory and print size, largest-file, and duplicate summaries.
    Report {
        path: PathBuf,
        #[arg(short = 'l', long)]
        largest: Option<usize>,
        #[arg(short = 'd', long)]
        duplicates: Option<usize>,
    },
    /// Diff the first and most recent recorded scans for a root.
    Diff { path: PathBuf },
    /// Print usage.
    Help,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Scan {
            path,
            comprehensive,
            threads,
            algorithm,
        } => cmd_scan(&cli.config, &cli.records, &path, comprehensive, threads, algorithm),
        Command::Report {
            path,
            largest,
            duplicates,
        } => cmd_report(&path, largest, duplicates),
        Command::Diff { path } => cmd_diff(&cli.config, &cli.records, &path),
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        "usage:\n  \
         scan <path> [-c|--comprehensive] [-n|--threads N] [--algorithm auto|recursive|per-file|per-directory]\n  \
         \x20                                                  walk a directory and record it\n  \
         report <path> [-l N] [-d N]                          print size / largest-file / duplicate summaries\n  \
         diff <path>                                           diff the first and latest recorded scans\n  \
         help                                                  print this message"
    );
}

fn root_key(path: &std::path::Path) -> anyhow::Result<String> {
    let abs = path.canonicalize().with_context_loc(path)?;
    Ok(abs.to_string_lossy().to_string())
}

trait ContextLoc<T> {
    fn with_context_loc(self, path: &std::path::Path) -> anyhow::Result<T>;
}

impl<T> ContextLoc<T> for std::io::Result<T> {
    fn with_context_loc(self, path: &std::path::Path) -> anyhow::Result<T> {
        self.map_err(|e| anyhow_loc!("resolving path {}: {}", path.display(), e))
    }
}

/// Resolve `Auto` per §4.2's own rationale: comprehensive scans are
/// CPU/IO-bound on hashing, so per-file dispatch wins; shallow scans are
/// dominated by `readdir`+`stat`, so per-directory dispatch wins.
fn resolve_algorithm(algorithm: WalkAlgorithm, comprehensive: bool) -> WalkAlgorithm {
    match algorithm {
        WalkAlgorithm::Auto if comprehensive => WalkAlgorithm::PerFile,
        WalkAlgorithm::Auto => WalkAlgorithm::PerDirectory,
        other => other,
    }
}

fn cmd_scan(
    config_path: &std::path::Path,
    records_path: &std::path::Path,
    path: &std::path::Path,
    comprehensive: bool,
    threads: Option<usize>,
    algorithm: WalkAlgorithm,
) -> anyhow::Result<()> {
    let mut config = ConfigHandle::load(config_path)?;
    let mut records = RecordsHandle::load(records_path)?;
    let root = root_key(path)?;

    if !config.config.run_previously {
        tracing::info!("first run: scans will be written to {}", config.config.scans_output_dir.display());
        config.set_run_previously(true)?;
    }
    std::fs::create_dir_all(&config.config.scans_output_dir)?;

    let mut opts = WalkOptions::default();
    opts.comprehensive = comprehensive;
    if let Some(n) = threads {
        opts.num_workers = n;
    }

    let start = std::time::Instant::now();
    let tree = match resolve_algorithm(algorithm, comprehensive) {
        WalkAlgorithm::Recursive => walk_recursive(path, &opts, None),
        WalkAlgorithm::PerFile => walk_parallel_per_file(path, &opts, None)?,
        WalkAlgorithm::PerDirectory => walk_parallel_per_directory(path, &opts, None)?,
        WalkAlgorithm::Auto => unreachable!("resolve_algorithm never returns Auto"),
    };
    tracing::info!("scanned {} files in {}", tree.num_files_below, format_duration(start.elapsed()));

    let first_scan = records.get_first_scan_filename(&root);
    let last_scan = records.get_last_scan_filename(&root);

    let scan_name = records.add_full_scan_record(&root, comprehensive)?;
    let scan_path = config.config.scans_output_dir.join(&scan_name);
    if let Err(e) = crate::persistence::write_tree(&scan_path, &tree) {
        records.revert_full_scan_record(&root, REVERT_GRACE)?;
        return Err(e);
    }

    if let Some(last_scan) = last_scan {
        let last_path = config.config.scans_output_dir.join(&last_scan);
        let old_tree = crate::persistence::read_tree(&last_path)?;
        let d = compute_diff(&old_tree, &tree);
        let diff_name = records.add_diff_scan_record(&root, comprehensive)?;
        let diff_path = config.config.scans_output_dir.join(&diff_name);
        if let Err(e) = crate::persistence::write_diff(&diff_path, &d) {
            records.revert_diff_scan_record(&root, REVERT_GRACE)?;
            return Err(e);
        }
        println!(
            "diff vs previous scan: {} file change(s), {} directory change(s)",
            d.files.len(),
            d.trees.len()
        );

        // Once more than two full scans exist for this root, the previous
        // "latest" is neither the first scan (kept forever as a diff bookend)
        // nor the current one, so its `.tree` file is redundant: everything it
        // held is reconstructable from the first scan plus the chain of diffs.
        // Retire it to keep storage proportional to diffs, not full trees.
        if records.should_retire_oldest(&root) && first_scan.as_deref() != Some(last_scan.as_str()) {
            if let Err(e) = std::fs::remove_file(&last_path) {
                tracing::warn!("failed to retire superseded scan {}: {e}", last_path.display());
            }
        }
    } else {
        println!("first scan recorded for {root}");
    }

    Ok(())
}

fn cmd_report(path: &std::path::Path, largest: Option<usize>, duplicates: Option<usize>) -> anyhow::Result<()> {
    let comprehensive = duplicates.is_some();
    let mut opts = WalkOptions::default();
    opts.comprehensive = comprehensive;
    let stats = StatsSink::new();

    let tree = walk_recursive(path, &opts, Some(&stats));

    println!("{}", path.display());
    println!("  total size:  {} bytes", tree.size_below);
    println!("  total files: {}", tree.num_files_below);

    if let Some(n) = largest {
        println!("  largest files:");
        for f in stats.largest_files(n) {
            println!("    {:>12}  {}", f.size, f.path);
        }
    }

    if let Some(n) = duplicates {
        println!("  largest duplicate groups:");
        for group in stats.largest_duplicates(n) {
            println!("    {} copies, {} bytes each:", group.len(), group[0].size);
            for f in &group {
                println!("      {}", f.path);
            }
        }
    }

    Ok(())
}

fn cmd_diff(config_path: &std::path::Path, records_path: &std::path::Path, path: &std::path::Path) -> anyhow::Result<()> {
    let records = RecordsHandle::load(records_path)?;
    let root = root_key(path)?;
    let config = ConfigHandle::load(config_path)?;

    let first_name = records
        .get_first_scan_filename(&root)
        .ok_or_else(|| anyhow_loc!("no recorded scans for {root}"))?;
    let last_name = records
        .get_last_scan_filename(&root)
        .ok_or_else(|| anyhow_loc!("no recorded scans for {root}"))?;

    if first_name == last_name {
        bail_loc!("only one scan recorded for {root}; nothing to diff");
    }

    let first = crate::persistence::read_tree(config.config.scans_output_dir.join(&first_name))?;
    let last = crate::persistence::read_tree(config.config.scans_output_dir.join(&last_name))?;
    let d = compute_diff(&first, &last);

    println!("diff {root}: {first_name} -> {last_name}");
    for (path, fd) in &d.files {
        println!("  {:?} {path} ({:+} bytes)", fd.kind, fd.size_diff);
    }
    for (path, td) in &d.trees {
        println!("  {:?} {path} ({:+} bytes, {:+} files)", td.kind, td.size_diff_direct, td.num_files_diff_direct);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn cmd_scan_retires_superseded_full_scans_but_keeps_bookends() {
        let tmp = tempfile::tempdir().unwrap();
        let scan_root = tmp.path().join("data");
        std::fs::create_dir(&scan_root).unwrap();
        std::fs::write(scan_root.join("a.txt"), b"hello").unwrap();

        let config_path = tmp.path().join("config.json");
        let records_path = tmp.path().join("records.json");

        // Point the scans directory inside the tempdir rather than letting
        // `ConfigHandle::load` default to `./scans` relative to the test
        // runner's working directory.
        let scans_dir = tmp.path().join("scans");
        let config = Config {
            run_previously: false,
            scans_output_dir: scans_dir.clone(),
        };
        std::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        for _ in 0..4 {
            cmd_scan(&config_path, &records_path, &scan_root, false, None, WalkAlgorithm::Recursive).unwrap();
        }

        let records = RecordsHandle::load(&records_path).unwrap();
        let root = root_key(&scan_root).unwrap();
        let first = records.get_first_scan_filename(&root).unwrap();
        let last = records.get_last_scan_filename(&root).unwrap();
        let middle = records.get_scan_filename(&root, 2);

        assert!(scans_dir.join(&first).exists(), "first scan must stay as a diff bookend");
        assert!(scans_dir.join(&last).exists(), "current scan must exist");
        assert!(!scans_dir.join(&middle).exists(), "superseded middle scan must be retired");
    }
}
