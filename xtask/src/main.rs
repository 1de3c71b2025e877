use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

const BENCH_TARGET: &str = "substrate_benchmark";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Hearth workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the substrate benchmarks and write a Markdown report
    Bench {
        /// Run quickly (lower sample size/time)
        #[arg(long, default_value_t = false)]
        quick: bool,

        /// Generate report only (skip running benchmarks)
        #[arg(long, default_value_t = false)]
        report_only: bool,

        /// Criterion baseline to save this run under
        #[arg(long, default_value = "current")]
        baseline: String,

        /// Baseline to compare against in the report
        #[arg(long)]
        against: Option<String>,

        /// Where to write the report
        #[arg(long, default_value = "benchmark_results/report.md")]
        out: PathBuf,
    },
}

#[derive(Deserialize)]
struct Estimates {
    mean: Estimate,
    std_dev: Estimate,
}

#[derive(Deserialize)]
struct Estimate {
    point_estimate: f64,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    mean_ns: f64,
    std_dev_ns: f64,
}

/// benchmark id -> baseline -> sample
type Results = BTreeMap<String, BTreeMap<String, Sample>>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Bench {
            quick,
            report_only,
            baseline,
            against,
            out,
        } => {
            if !report_only {
                run_benchmarks(quick, &baseline)?;
            }
            generate_report(&baseline, against.as_deref(), &out)?;
        }
    }

    Ok(())
}

fn run_benchmarks(quick: bool, baseline: &str) -> Result<()> {
    println!("Compiling {BENCH_TARGET}...");
    let status = Command::new("cargo")
        .args(["build", "--bench", BENCH_TARGET, "--release"])
        .status()
        .context("failed to invoke cargo build")?;
    if !status.success() {
        anyhow::bail!("failed to compile {BENCH_TARGET}");
    }

    println!("\n>>> Benchmarking into baseline '{baseline}'");
    let start = Instant::now();

    let mut cmd = Command::new("cargo");
    cmd.env("CARGO_INCREMENTAL", "0")
        .args(["bench", "--bench", BENCH_TARGET, "--"])
        .arg("--save-baseline")
        .arg(baseline);

    if quick {
        cmd.args(["--measurement-time", "0.1", "--noplot", "--sample-size", "10"]);
    }

    let status = cmd
        .status()
        .with_context(|| format!("failed to run {BENCH_TARGET}"))?;
    if !status.success() {
        anyhow::bail!("{BENCH_TARGET} exited with {status}");
    }
    println!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

fn generate_report(baseline: &str, against: Option<&str>, out: &Path) -> Result<()> {
    println!("\n>>> Generating report...");
    let criterion_dir = Path::new("target/criterion");
    if !criterion_dir.exists() {
        anyhow::bail!("no criterion output at {}", criterion_dir.display());
    }

    let mut results = Results::new();
    collect_results(criterion_dir, criterion_dir, &mut results)?;

    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file =
        fs::File::create(out).with_context(|| format!("failed to create {}", out.display()))?;

    writeln!(file, "# Substrate Benchmark Report")?;
    writeln!(file)?;
    match against {
        Some(other) => {
            writeln!(file, "| Benchmark | {baseline} | ± | {other} | Speedup |")?;
            writeln!(file, "|---|---|---|---|---|")?;
        }
        None => {
            writeln!(file, "| Benchmark | {baseline} | ± |")?;
            writeln!(file, "|---|---|---|")?;
        }
    }

    for (bench, runs) in &results {
        let Some(current) = runs.get(baseline) else {
            continue;
        };
        write!(
            file,
            "| {bench} | {} | {} |",
            format_ns(current.mean_ns),
            format_ns(current.std_dev_ns)
        )?;
        if let Some(other) = against {
            match runs.get(other) {
                Some(prev) => write!(
                    file,
                    " {} | **{:.2}x** |",
                    format_ns(prev.mean_ns),
                    prev.mean_ns / current.mean_ns
                )?,
                None => write!(file, " N/A | - |")?,
            }
        }
        writeln!(file)?;
    }

    println!("Report written to {}", out.display());
    Ok(())
}

fn format_ns(ns: f64) -> String {
    if ns >= 1e9 {
        format!("{:.2} s", ns / 1e9)
    } else if ns >= 1e6 {
        format!("{:.2} ms", ns / 1e6)
    } else if ns >= 1e3 {
        format!("{:.2} µs", ns / 1e3)
    } else {
        format!("{ns:.0} ns")
    }
}

/// Walks `target/criterion`, reading `<bench id>/<baseline>/estimates.json`.
fn collect_results(root: &Path, dir: &Path, results: &mut Results) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            if path.file_name().and_then(|s| s.to_str()) != Some("report") {
                collect_results(root, &path, results)?;
            }
            continue;
        }
        if path.file_name().and_then(|s| s.to_str()) != Some("estimates.json") {
            continue;
        }

        let Some(baseline_dir) = path.parent() else {
            continue;
        };
        let Some(bench_dir) = baseline_dir.parent() else {
            continue;
        };
        let baseline = baseline_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let bench = bench_dir
            .strip_prefix(root)
            .unwrap_or(bench_dir)
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");

        let content =
            fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let estimates: Estimates = serde_json::from_str(&content)
            .with_context(|| format!("malformed {}", path.display()))?;

        results.entry(bench).or_default().insert(
            baseline,
            Sample {
                mean_ns: estimates.mean.point_estimate,
                std_dev_ns: estimates.std_dev.point_estimate,
            },
        );
    }
    Ok(())
}
