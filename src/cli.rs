//! CLI commands for butterfly-plot

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crate::config::PlotConfig;
use crate::optimizer::{optimize, CancelFlag, OptimizationResult};
use crate::path::{PathSequence, Polyline, SequenceEntry};
use crate::progress::{self, ProgressEvent};

/// Initialize structured logging with tracing.
///
/// - `log_format`: "text" for human-readable, "json" for structured JSON lines.
/// - Respects RUST_LOG env var for filtering (default: `info`).
pub fn init_tracing(log_format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(false).init();
        }
    }
}

#[derive(Parser)]
#[command(name = "butterfly-plot")]
#[command(about = "Toolpath optimization for pen plotters", long_about = None)]
pub struct Cli {
    /// Log output format: "text" or "json"
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-order drawing paths to minimize pen-up travel
    Optimize {
        /// Input JSON file: an array of polylines, each an array of [x, y] points
        input: PathBuf,

        /// Output JSON report (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON config file; the flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pen footprint width in mm (0 disables the overlap filter)
        #[arg(long)]
        pen_width: Option<f64>,

        /// Minimum visible fraction (0-100 %) for a path to survive the filter
        #[arg(long)]
        visibility_threshold: Option<f64>,

        /// Cap on 2-opt improvement passes
        #[arg(long)]
        max_iterations: Option<i64>,

        /// Endpoint-coincidence tolerance in mm
        #[arg(long)]
        merge_threshold: Option<f64>,

        /// Stream progress events to stderr as JSON lines
        #[arg(long)]
        progress: bool,
    },

    /// Report draw/travel statistics for an input without optimizing
    Stats {
        /// Input JSON file: an array of polylines, each an array of [x, y] points
        input: PathBuf,
    },
}

/// JSON report written by the `optimize` subcommand
#[derive(Debug, Serialize)]
struct OptimizeReport {
    path_count: usize,
    kept_count: usize,
    removed_count: usize,
    removed_indices: Vec<usize>,
    original_dist: f64,
    final_dist: f64,
    iterations: usize,
    improvement_pct: f64,
    dist_history: Vec<f64>,
    paths: Vec<SequenceEntry>,
}

impl OptimizeReport {
    fn new(result: &OptimizationResult) -> Self {
        let improvement_pct = if result.original_pen_up > 0.0 {
            (1.0 - result.final_pen_up / result.original_pen_up) * 100.0
        } else {
            0.0
        };
        Self {
            path_count: result.filter.kept_indices.len() + result.filter.removed_indices.len(),
            kept_count: result.filter.kept_indices.len(),
            removed_count: result.filter.removed_indices.len(),
            removed_indices: result.filter.removed_indices.clone(),
            original_dist: result.original_pen_up,
            final_dist: result.final_pen_up,
            iterations: result.iterations,
            improvement_pct,
            dist_history: result.pen_up_history.clone(),
            paths: result.sequence.entries().to_vec(),
        }
    }
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Optimize {
                input,
                output,
                config,
                pen_width,
                visibility_threshold,
                max_iterations,
                merge_threshold,
                progress: stream_progress,
            } => {
                let paths = load_paths(&input)?;

                let mut plot_config = match config {
                    Some(path) => load_config(&path)?,
                    None => PlotConfig::default(),
                };
                if let Some(v) = pen_width {
                    plot_config.pen_width = v;
                }
                if let Some(v) = visibility_threshold {
                    plot_config.visibility_threshold = v;
                }
                if let Some(v) = max_iterations {
                    plot_config.max_iterations = v;
                }
                if let Some(v) = merge_threshold {
                    plot_config.merge_threshold = v;
                }

                let (mut tx, rx) = progress::channel(256);
                let printer = thread::spawn(move || {
                    for event in rx {
                        if stream_progress {
                            if let Ok(line) = serde_json::to_string(&event) {
                                let stderr = std::io::stderr();
                                let _ = writeln!(stderr.lock(), "{}", line);
                            }
                        } else if let ProgressEvent::Log { msg } = &event {
                            tracing::info!("{}", msg);
                        }
                    }
                });

                let cancel = CancelFlag::new();
                let result = optimize(&paths, &plot_config, &mut tx, &cancel);
                tx.close();
                let _ = printer.join();

                let result = result?;
                let report = OptimizeReport::new(&result);
                write_report(&report, output.as_deref())
            }
            Commands::Stats { input } => {
                let paths = load_paths(&input)?;
                let draw_length: f64 = paths.iter().map(|p| p.draw_length()).sum();
                let pen_up = PathSequence::identity(0..paths.len()).pen_up(&paths);

                println!("paths:               {}", paths.len());
                println!("draw length:         {:.2} mm", draw_length);
                println!("pen-up (input order): {:.2} mm", pen_up);
                Ok(())
            }
        }
    }
}

fn load_paths(path: &Path) -> Result<Vec<Polyline>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let raw: Vec<Vec<[f64; 2]>> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse polylines from {}", path.display()))?;
    Ok(raw.iter().map(|p| Polyline::from_pairs(p)).collect())
}

fn load_config(path: &Path) -> Result<PlotConfig> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse config from {}", path.display()))
}

fn write_report(report: &OptimizeReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimize_command(input: PathBuf, output: PathBuf) -> Cli {
        Cli {
            log_format: "text".to_string(),
            command: Commands::Optimize {
                input,
                output: Some(output),
                config: None,
                pen_width: None,
                visibility_threshold: None,
                max_iterations: None,
                merge_threshold: None,
                progress: false,
            },
        }
    }

    #[test]
    fn test_optimize_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("paths.json");
        let output = dir.path().join("report.json");
        std::fs::write(&input, r#"[[[0, 0], [1, 0]], [[2, 0], [3, 0]]]"#).unwrap();

        optimize_command(input, output.clone()).run().unwrap();

        let report: serde_json::Value =
            serde_json::from_reader(File::open(&output).unwrap()).unwrap();
        assert_eq!(report["path_count"], 2);
        assert_eq!(report["kept_count"], 2);
        assert_eq!(report["iterations"], 0);
        assert_eq!(report["final_dist"], 1.0);
        assert_eq!(report["paths"].as_array().unwrap().len(), 2);
        assert_eq!(report["paths"][0]["index"], 0);
        assert_eq!(report["paths"][0]["flipped"], false);
    }

    #[test]
    fn test_config_file_with_flag_override() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("paths.json");
        let output = dir.path().join("report.json");
        let config = dir.path().join("config.json");
        // Near-duplicate pair: the filter drops the second path.
        std::fs::write(
            &input,
            r#"[[[0, 0], [10, 0]], [[0, 0.1], [10, 0.1]]]"#,
        )
        .unwrap();
        std::fs::write(&config, r#"{"pen_width": 0.0}"#).unwrap();

        let mut cli = optimize_command(input, output.clone());
        if let Commands::Optimize { config: c, pen_width, .. } = &mut cli.command {
            *c = Some(config);
            // The flag overrides the config file's disabled filter.
            *pen_width = Some(1.0);
        }
        cli.run().unwrap();

        let report: serde_json::Value =
            serde_json::from_reader(File::open(&output).unwrap()).unwrap();
        assert_eq!(report["removed_indices"], serde_json::json!([1]));
        assert_eq!(report["kept_count"], 1);
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("paths.json");
        let output = dir.path().join("report.json");
        std::fs::write(&input, r#"[[[0, 0]]]"#).unwrap();

        let err = optimize_command(input, output).run().unwrap_err();
        assert!(err.to_string().contains("malformed path 0"));
    }

    #[test]
    fn test_stats_runs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("paths.json");
        std::fs::write(&input, r#"[[[0, 0], [3, 4]]]"#).unwrap();

        let cli = Cli {
            log_format: "text".to_string(),
            command: Commands::Stats { input },
        };
        cli.run().unwrap();
    }
}
