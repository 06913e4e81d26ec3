//! File-backed lap-table import/export. This is the in-process half of the
//! session loader: it materializes an immutable lap table from disk and
//! writes derived series back out for the renderer.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::{fs::File, path::Path};
use uuid::Uuid;

use model::*;

/// Reads a flat lap-table CSV, one row per lap. Empty cells for optional
/// columns come back as `None`. The table is validated before it is
/// returned.
pub fn import_csv(path: &Path) -> Result<Vec<LapRecord>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open lap table {}", path.display()))?;
    let mut laps = Vec::new();
    for (i, rec) in rdr.deserialize().enumerate() {
        let lap: LapRecord = rec.with_context(|| format!("row {} of {}", i + 2, path.display()))?;
        laps.push(lap);
    }
    validate_table(&laps)?;
    Ok(laps)
}

pub fn export_csv(laps: &[LapRecord], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for l in laps {
        w.serialize(l)?;
    }
    w.flush()?;
    Ok(())
}

/// Reads a lap table with one JSON lap per line.
pub fn import_ndjson(path: &Path) -> Result<Vec<LapRecord>> {
    let f = File::open(path).with_context(|| format!("open lap table {}", path.display()))?;
    let rdr = BufReader::new(f);
    let mut laps = Vec::new();
    for (i, line) in rdr.lines().enumerate() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        let lap: LapRecord =
            serde_json::from_str(&s).with_context(|| format!("line {} of {}", i + 1, path.display()))?;
        laps.push(lap);
    }
    validate_table(&laps)?;
    Ok(laps)
}

pub fn export_ndjson(laps: &[LapRecord], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for l in laps {
        let s = serde_json::to_string(l)?;
        writeln!(w, "{}", s)?;
    }
    w.flush()?;
    Ok(())
}

/// Extension-dispatched import: `.csv`, `.ndjson` or `.jsonl`.
pub fn load_laps(path: &Path) -> Result<Vec<LapRecord>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => import_csv(path),
        Some("ndjson") | Some("jsonl") => import_ndjson(path),
        _ => bail!("unsupported lap table format: {}", path.display()),
    }
}

/// Wraps a loaded lap table as a session snapshot, minting its id.
pub fn session_from_laps(year: u16, event: &str, kind: SessionKind, laps: Vec<LapRecord>) -> RaceSession {
    RaceSession {
        id: Uuid::new_v4(),
        year,
        event: event.to_string(),
        kind,
        laps,
    }
}

/// Enforces the table invariants: lap numbers unique per driver, stints
/// non-decreasing with lap number. Errors name the offending driver/lap.
pub fn validate_table(laps: &[LapRecord]) -> Result<()> {
    let mut per_driver: BTreeMap<&str, Vec<&LapRecord>> = BTreeMap::new();
    for l in laps {
        per_driver.entry(l.driver.as_str()).or_default().push(l);
    }
    for (driver, mut rows) in per_driver {
        rows.sort_by_key(|l| l.lap_number);
        for w in rows.windows(2) {
            if w[0].lap_number == w[1].lap_number {
                bail!("duplicate lap {} for driver {}", w[0].lap_number, driver);
            }
            if w[1].stint < w[0].stint {
                bail!(
                    "stint decreases at lap {} for driver {} ({} -> {})",
                    w[1].lap_number,
                    driver,
                    w[0].stint,
                    w[1].stint
                );
            }
        }
    }
    Ok(())
}

/// Writes any serde-serializable row series as a tidy CSV.
pub fn export_rows_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for r in rows {
        w.serialize(r)?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct FastestRow {
    lap_number: u32,
    time_s: f64,
    driver: String,
}

pub fn export_fastest_csv(fastest: &BTreeMap<u32, FastestLap>, path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for (&lap_number, f) in fastest {
        w.serialize(FastestRow {
            lap_number,
            time_s: f.time_s,
            driver: f.driver.clone(),
        })?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_report_json(report: &DriverPaceReport, path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, report)?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap(driver: &str, n: u32, stint: u32, time_s: Option<f64>) -> LapRecord {
        LapRecord {
            driver: driver.to_string(),
            team: Some("McLaren".to_string()),
            lap_number: n,
            lap_time_s: time_s,
            compound: Compound::Soft,
            stint,
            pit_in_time_s: None,
            pit_out_time_s: if n == 1 { Some(12.5) } else { None },
            is_accurate: true,
        }
    }

    #[test]
    fn csv_round_trip_preserves_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laps.csv");
        let laps = vec![
            lap("PIA", 1, 1, Some(92.3)),
            lap("PIA", 2, 1, None),
            lap("VER", 1, 1, Some(92.0)),
        ];

        export_csv(&laps, &path).unwrap();
        let back = import_csv(&path).unwrap();
        assert_eq!(back, laps);
    }

    #[test]
    fn ndjson_round_trip_preserves_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laps.ndjson");
        let laps = vec![lap("PIA", 1, 1, Some(92.3)), lap("PIA", 2, 2, Some(93.1))];

        export_ndjson(&laps, &path).unwrap();
        let back = import_ndjson(&path).unwrap();
        assert_eq!(back, laps);
    }

    #[test]
    fn load_laps_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let laps = vec![lap("NOR", 1, 1, Some(91.0))];

        let csv_path = dir.path().join("t.csv");
        export_csv(&laps, &csv_path).unwrap();
        assert_eq!(load_laps(&csv_path).unwrap(), laps);

        let jsonl_path = dir.path().join("t.jsonl");
        export_ndjson(&laps, &jsonl_path).unwrap();
        assert_eq!(load_laps(&jsonl_path).unwrap(), laps);

        assert!(load_laps(&dir.path().join("t.parquet")).is_err());
    }

    #[test]
    fn validation_rejects_duplicate_lap_numbers() {
        let laps = vec![lap("PIA", 3, 1, Some(92.0)), lap("PIA", 3, 1, Some(92.1))];
        let err = validate_table(&laps).unwrap_err();
        assert!(err.to_string().contains("duplicate lap 3"));
    }

    #[test]
    fn validation_rejects_decreasing_stints() {
        let laps = vec![lap("PIA", 4, 2, Some(92.0)), lap("PIA", 5, 1, Some(92.1))];
        let err = validate_table(&laps).unwrap_err();
        assert!(err.to_string().contains("stint decreases"));
    }

    #[test]
    fn validation_allows_same_lap_number_across_drivers() {
        let laps = vec![lap("PIA", 1, 1, Some(92.0)), lap("VER", 1, 1, Some(92.1))];
        assert!(validate_table(&laps).is_ok());
    }

    #[test]
    fn session_wrapper_mints_a_fresh_id() {
        let a = session_from_laps(2025, "Monza", SessionKind::Race, vec![]);
        let b = session_from_laps(2025, "Monza", SessionKind::Race, vec![]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, SessionKind::Race);
    }

    #[test]
    fn fastest_map_writes_one_row_per_lap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fastest.csv");
        let mut fastest = BTreeMap::new();
        fastest.insert(1, FastestLap { time_s: 90.0, driver: "VER".to_string() });
        fastest.insert(2, FastestLap { time_s: 89.8, driver: "PIA".to_string() });

        export_fastest_csv(&fastest, &path).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<FastestRow> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lap_number, 1);
        assert_eq!(rows[0].driver, "VER");
        assert_eq!(rows[1].time_s, 89.8);
    }
}
