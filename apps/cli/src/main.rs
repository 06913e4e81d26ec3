use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use analysis as an;
use model::*;

mod logging;
mod prompt;

#[derive(Parser)]
#[command(name = "pace")]
#[command(about = "Race-pace analysis over lap-table files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one driver and write the derived series
    Report {
        /// Lap table to analyze (.csv, .ndjson or .jsonl)
        #[arg(long)]
        laps: PathBuf,
        /// Driver code; prompted for interactively when omitted
        #[arg(long)]
        driver: Option<String>,
        #[arg(long, default_value_t = 2025)]
        year: u16,
        #[arg(long, default_value = "Unknown")]
        event: String,
        /// Session kind: R, Q, S, FP1, FP2, FP3
        #[arg(long, default_value = "R")]
        session: SessionKind,
        /// Directory the derived series are written into
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        /// Estimated seconds gained per lap as fuel burns off
        #[arg(long, default_value_t = 0.06)]
        fuel_effect: f64,
        /// Quicklap threshold (1.07 is conventional); off when omitted
        #[arg(long)]
        quicklap: Option<f64>,
        /// Keep in-laps and out-laps in the degradation fit
        #[arg(long)]
        keep_box_laps: bool,
        /// Minimum qualifying laps a stint needs for a fit
        #[arg(long, default_value_t = 2)]
        min_fit_samples: usize,
        /// Also write the gap-to-leader series and the field-fastest map
        #[arg(long)]
        with_gaps: bool,
    },
    /// List driver codes present in a lap table
    Drivers {
        #[arg(long)]
        laps: PathBuf,
    },
    /// Convert a lap table between CSV and NDJSON
    Convert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            laps,
            driver,
            year,
            event,
            session,
            out_dir,
            fuel_effect,
            quicklap,
            keep_box_laps,
            min_fit_samples,
            with_gaps,
        } => {
            let cfg = an::AnalysisConfig {
                fuel_effect_per_lap_s: fuel_effect,
                exclude_pit_adjacent: !keep_box_laps,
                quicklap_threshold: quicklap,
                min_fit_samples,
            };
            run_report(&laps, driver, year, &event, session, &out_dir, &cfg, with_gaps)
        }
        Commands::Drivers { laps } => run_drivers(&laps),
        Commands::Convert { input, output } => run_convert(&input, &output),
    }
}

#[derive(Serialize)]
struct GapRow {
    driver: String,
    lap_number: u32,
    gap_s: f64,
}

#[allow(clippy::too_many_arguments)]
fn run_report(
    laps_path: &Path,
    driver: Option<String>,
    year: u16,
    event: &str,
    kind: SessionKind,
    out_dir: &Path,
    cfg: &an::AnalysisConfig,
    with_gaps: bool,
) -> Result<()> {
    let laps = iox::load_laps(laps_path)?;
    let session = iox::session_from_laps(year, event, kind, laps);
    info!(session = %session.id, rows = session.laps.len(), "lap table loaded");

    let codes = an::drivers(&session.laps);
    if codes.is_empty() {
        bail!("no laps available in {}", laps_path.display());
    }
    let code = match driver {
        Some(d) => d.trim().to_uppercase(),
        None => prompt::prompt_driver_stdin(&codes)?,
    };

    let report = an::analyze_driver(&session, &code, cfg)
        .with_context(|| format!("analyze driver {code}"))?;
    print_summary(&session, &report);

    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    iox::export_rows_csv(&report.deltas, &out_dir.join("deltas.csv"))?;
    iox::export_rows_csv(&report.corrected, &out_dir.join("corrected.csv"))?;
    iox::export_rows_csv(&report.fits, &out_dir.join("fits.csv"))?;
    iox::export_rows_csv(&report.trendlines, &out_dir.join("trendlines.csv"))?;
    iox::export_rows_csv(&report.compounds, &out_dir.join("compounds.csv"))?;
    iox::export_report_json(&report, &out_dir.join("report.json"))?;

    if with_gaps {
        let fastest = an::fastest_per_lap(&an::pick_accurate(&session.laps));
        iox::export_fastest_csv(&fastest, &out_dir.join("fastest.csv"))?;

        let rows: Vec<GapRow> = an::gap_to_leader(&session.laps)
            .into_iter()
            .flat_map(|(driver, gaps)| {
                gaps.into_iter().map(move |g| GapRow {
                    driver: driver.clone(),
                    lap_number: g.lap_number,
                    gap_s: g.gap_s,
                })
            })
            .collect();
        iox::export_rows_csv(&rows, &out_dir.join("gaps.csv"))?;
    }

    info!(dir = %out_dir.display(), "derived series written");
    Ok(())
}

fn print_summary(session: &RaceSession, report: &DriverPaceReport) {
    let s = &report.summary;
    println!("\nPace report: {} — {} {} ({})", report.driver, session.event, session.year, session.kind);
    if let Some(team) = &report.team {
        println!("  Team:      {team}");
    }
    println!("  Laps:      {}", s.laps);
    if let (Some(best), Some(worst), Some(mean)) = (s.fastest_s, s.slowest_s, s.mean_s) {
        println!("  Fastest:   {}", fmt_time(best));
        println!("  Slowest:   {}", fmt_time(worst));
        println!("  Mean:      {}", fmt_time(mean));
    }
    let compounds: Vec<String> = s.compounds.iter().map(|c| c.to_string()).collect();
    println!("  Compounds: {}", compounds.join(", "));
    for fit in &report.fits {
        println!(
            "  Stint {} (laps {}-{}): {:+.3} s/lap over {} clean laps",
            fit.stint, fit.lap_first, fit.lap_last, fit.slope_s_per_lap, fit.sample_count
        );
    }
}

fn fmt_time(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor() as u32;
    format!("{}:{:06.3}", minutes, seconds - minutes as f64 * 60.0)
}

fn run_drivers(laps_path: &Path) -> Result<()> {
    let laps = iox::load_laps(laps_path)?;
    for code in an::drivers(&laps) {
        let count = laps.iter().filter(|l| l.driver == code).count();
        println!("{code}  {count} laps");
    }
    Ok(())
}

fn run_convert(input: &Path, output: &Path) -> Result<()> {
    let laps = iox::load_laps(input)?;
    match output.extension().and_then(|e| e.to_str()) {
        Some("csv") => iox::export_csv(&laps, output)?,
        Some("ndjson") | Some("jsonl") => iox::export_ndjson(&laps, output)?,
        _ => bail!("unsupported output format: {}", output.display()),
    }
    info!(rows = laps.len(), from = %input.display(), to = %output.display(), "table converted");
    Ok(())
}
