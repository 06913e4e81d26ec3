use std::collections::BTreeMap;

use model::*;

/// Field-fastest time per lap number, keyed by lap number.
pub type FastestByLap = BTreeMap<u32, FastestLap>;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("unknown driver {0:?}")]
    UnknownDriver(String),
    #[error("no laps available")]
    NoLaps,
}

/// Tuning knobs for the normalization pipeline. The defaults are the
/// values observed to work on race data; none of them is assumed to
/// generalize, which is why they are parameters and not constants.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    /// Estimated seconds gained per lap as fuel burns off.
    pub fuel_effect_per_lap_s: f64,
    /// Drop in-laps and out-laps from degradation fitting.
    pub exclude_pit_adjacent: bool,
    /// Drop laps slower than `threshold * fastest lap of the set` from
    /// degradation fitting. Off when `None`; 1.07 is the usual value.
    pub quicklap_threshold: Option<f64>,
    /// Minimum qualifying laps a stint needs before a line is fitted.
    pub min_fit_samples: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fuel_effect_per_lap_s: 0.06,
            exclude_pit_adjacent: true,
            quicklap_threshold: None,
            min_fit_samples: 2,
        }
    }
}

/// Distinct driver codes present in the table, sorted.
pub fn drivers(laps: &[LapRecord]) -> Vec<String> {
    let mut codes: Vec<String> = laps.iter().map(|l| l.driver.clone()).collect();
    codes.sort_unstable();
    codes.dedup();
    codes
}

/// One driver's rows, sorted by lap number. A code no row matches is a
/// lookup failure the caller has to deal with.
pub fn pick_driver(laps: &[LapRecord], code: &str) -> Result<Vec<LapRecord>, AnalysisError> {
    let mut rows: Vec<LapRecord> = laps.iter().filter(|l| l.driver == code).cloned().collect();
    if rows.is_empty() {
        return Err(AnalysisError::UnknownDriver(code.to_string()));
    }
    rows.sort_by_key(|l| l.lap_number);
    Ok(rows)
}

pub fn pick_accurate(laps: &[LapRecord]) -> Vec<LapRecord> {
    laps.iter().filter(|l| l.is_accurate).cloned().collect()
}

pub fn pick_wo_box(laps: &[LapRecord]) -> Vec<LapRecord> {
    laps.iter().filter(|l| !is_box_lap(l)).cloned().collect()
}

/// Laps faster than `threshold * fastest lap of the given set`. Laps
/// without a valid time never qualify.
pub fn pick_quicklaps(laps: &[LapRecord], threshold: f64) -> Vec<LapRecord> {
    let cutoff = quicklap_cutoff(laps.iter().filter_map(|l| l.lap_time_s), threshold);
    laps.iter()
        .filter(|l| match (l.lap_time_s, cutoff) {
            (Some(t), Some(c)) => t < c,
            _ => false,
        })
        .cloned()
        .collect()
}

fn is_box_lap(lap: &LapRecord) -> bool {
    lap.pit_in_time_s.is_some() || lap.pit_out_time_s.is_some()
}

fn quicklap_cutoff(times: impl Iterator<Item = f64>, threshold: f64) -> Option<f64> {
    let best = times.fold(f64::INFINITY, f64::min);
    if best.is_finite() {
        Some(best * threshold)
    } else {
        None
    }
}

/// Minimum valid lap time per lap number across the whole field, with the
/// driver who set it. Laps without a valid time are skipped; a lap number
/// nobody has a valid time for gets no entry. Ties keep the earlier row.
pub fn fastest_per_lap(laps: &[LapRecord]) -> FastestByLap {
    let mut fastest = FastestByLap::new();
    for l in laps {
        let t = match l.lap_time_s {
            Some(t) => t,
            None => continue,
        };
        let beats = match fastest.get(&l.lap_number) {
            Some(cur) => t < cur.time_s,
            None => true,
        };
        if beats {
            fastest.insert(
                l.lap_number,
                FastestLap {
                    time_s: t,
                    driver: l.driver.clone(),
                },
            );
        }
    }
    fastest
}

/// Per-lap gap to the field-fastest time on the same lap number. Laps
/// missing either side are left out of the series, not zero-filled.
pub fn delta_to_fastest(driver_laps: &[LapRecord], fastest: &FastestByLap) -> Vec<LapDelta> {
    driver_laps
        .iter()
        .filter_map(|l| {
            let t = l.lap_time_s?;
            let f = fastest.get(&l.lap_number)?;
            Some(LapDelta {
                lap_number: l.lap_number,
                delta_s: t - f.time_s,
            })
        })
        .collect()
}

/// Last lap number of the driver's filtered lap set. An empty set means
/// fuel correction and fitting are undefined, so this fails fast.
pub fn total_laps(laps: &[LapRecord]) -> Result<u32, AnalysisError> {
    laps.iter()
        .map(|l| l.lap_number)
        .max()
        .ok_or(AnalysisError::NoLaps)
}

/// `lap_time - (total_laps - lap_number) * fuel_effect_per_lap_s`. Early
/// laps carry more fuel and get the larger downward correction, which
/// makes tyre wear comparable across a stint.
pub fn fuel_corrected_time(lap: &LapRecord, total_laps: u32, fuel_effect_per_lap_s: f64) -> Option<f64> {
    let t = lap.lap_time_s?;
    let remaining = total_laps.saturating_sub(lap.lap_number) as f64;
    Some(t - remaining * fuel_effect_per_lap_s)
}

pub fn fuel_corrected_series(laps: &[LapRecord], total_laps: u32, cfg: &AnalysisConfig) -> Vec<CorrectedLap> {
    laps.iter()
        .filter_map(|l| {
            let raw = l.lap_time_s?;
            let corrected = fuel_corrected_time(l, total_laps, cfg.fuel_effect_per_lap_s)?;
            Some(CorrectedLap {
                lap_number: l.lap_number,
                stint: l.stint,
                compound: l.compound,
                lap_time_s: raw,
                corrected_s: corrected,
            })
        })
        .collect()
}

/// Per-stint least-squares line of fuel-corrected time over lap number.
///
/// A lap qualifies for the fit when it has a valid time, is not an in-lap
/// or out-lap (unless that exclusion is switched off), sits strictly
/// before `total_laps`, and beats the quicklap cutoff when one is
/// configured. Stints with fewer qualifying laps than `min_fit_samples`
/// get no fit. The reported lap range still spans the whole stint so the
/// line can be drawn across excluded laps.
pub fn fit_stint_degradation(laps: &[LapRecord], total_laps: u32, cfg: &AnalysisConfig) -> Vec<DegradationFit> {
    let mut stints: BTreeMap<u32, Vec<&LapRecord>> = BTreeMap::new();
    for l in laps {
        stints.entry(l.stint).or_default().push(l);
    }

    let mut fits = Vec::new();
    for (stint, stint_laps) in stints {
        let lap_first = stint_laps.iter().map(|l| l.lap_number).min().unwrap_or(0);
        let lap_last = stint_laps.iter().map(|l| l.lap_number).max().unwrap_or(0);

        let mut candidates = Vec::with_capacity(stint_laps.len());
        for l in &stint_laps {
            let raw = match l.lap_time_s {
                Some(t) => t,
                None => continue,
            };
            if cfg.exclude_pit_adjacent && is_box_lap(l) {
                continue;
            }
            if l.lap_number >= total_laps {
                continue;
            }
            candidates.push((*l, raw));
        }

        // cutoff over the already-excluded set, so box-lap times cannot
        // move it
        let mut cutoff = None;
        if let Some(th) = cfg.quicklap_threshold {
            cutoff = quicklap_cutoff(candidates.iter().map(|&(_, raw)| raw), th);
        }

        let mut xs = Vec::with_capacity(candidates.len());
        let mut ys = Vec::with_capacity(candidates.len());
        for (l, raw) in candidates {
            if let Some(c) = cutoff {
                if raw >= c {
                    continue;
                }
            }
            match fuel_corrected_time(l, total_laps, cfg.fuel_effect_per_lap_s) {
                Some(y) => {
                    xs.push(l.lap_number as f64);
                    ys.push(y);
                }
                None => continue,
            }
        }

        if xs.len() < cfg.min_fit_samples {
            continue;
        }
        if let Some((slope, intercept)) = least_squares_line(&xs, &ys) {
            fits.push(DegradationFit {
                stint,
                slope_s_per_lap: slope,
                intercept_s: intercept,
                sample_count: xs.len() as u32,
                lap_first,
                lap_last,
            });
        }
    }
    fits
}

/// The fitted line evaluated at every lap of the stint's full range,
/// including laps the fit itself excluded.
pub fn trendline(fit: &DegradationFit) -> Vec<TrendPoint> {
    (fit.lap_first..=fit.lap_last)
        .map(|n| TrendPoint {
            stint: fit.stint,
            lap_number: n,
            fitted_s: fit.slope_s_per_lap * n as f64 + fit.intercept_s,
        })
        .collect()
}

fn least_squares_line(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let sum_x2: f64 = xs.iter().map(|x| x * x).sum();

    let den = n * sum_x2 - sum_x * sum_x;
    if den.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / den;
    let intercept = (sum_y - slope * sum_x) / n;
    Some((slope, intercept))
}

/// Valid-time laps grouped by compound, softest compound first.
pub fn laps_by_compound(laps: &[LapRecord]) -> Vec<CompoundLap> {
    let mut rows: Vec<CompoundLap> = laps
        .iter()
        .filter_map(|l| {
            let t = l.lap_time_s?;
            Some(CompoundLap {
                compound: l.compound,
                lap_number: l.lap_number,
                lap_time_s: t,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.compound.cmp(&b.compound).then(a.lap_number.cmp(&b.lap_number)));
    rows
}

pub fn pace_summary(laps: &[LapRecord]) -> PaceSummary {
    let times: Vec<f64> = laps.iter().filter_map(|l| l.lap_time_s).collect();
    let (fastest, slowest, mean) = if times.is_empty() {
        (None, None, None)
    } else {
        let best = times.iter().copied().fold(f64::INFINITY, f64::min);
        let worst = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        (Some(best), Some(worst), Some(avg))
    };

    let mut compounds: Vec<Compound> = laps.iter().map(|l| l.compound).collect();
    compounds.sort_unstable();
    compounds.dedup();

    PaceSummary {
        laps: laps.len(),
        fastest_s: fastest,
        slowest_s: slowest,
        mean_s: mean,
        compounds,
    }
}

/// Per-driver gap to the race leader's cumulative time at each lap. A
/// driver leaves the series at the first lap whose cumulative time is
/// unknowable (a missing row or a missing lap time).
pub fn gap_to_leader(laps: &[LapRecord]) -> BTreeMap<String, Vec<LeaderGap>> {
    let mut cumulative: BTreeMap<String, Vec<(u32, f64)>> = BTreeMap::new();
    for code in drivers(laps) {
        let mut rows: Vec<&LapRecord> = laps.iter().filter(|l| l.driver == code).collect();
        rows.sort_by_key(|l| l.lap_number);

        let mut series = Vec::new();
        let mut cum = 0.0;
        let mut expected = 1;
        for l in rows {
            if l.lap_number != expected {
                break;
            }
            match l.lap_time_s {
                Some(t) => cum += t,
                None => break,
            }
            series.push((l.lap_number, cum));
            expected += 1;
        }
        cumulative.insert(code, series);
    }

    let mut leader: BTreeMap<u32, f64> = BTreeMap::new();
    for series in cumulative.values() {
        for &(n, t) in series {
            let entry = leader.entry(n).or_insert(t);
            if t < *entry {
                *entry = t;
            }
        }
    }

    cumulative
        .into_iter()
        .map(|(code, series)| {
            let gaps = series
                .into_iter()
                .filter_map(|(n, t)| {
                    leader.get(&n).map(|lead| LeaderGap {
                        lap_number: n,
                        gap_s: t - *lead,
                    })
                })
                .collect();
            (code, gaps)
        })
        .collect()
}

/// The whole filter -> join -> derive -> fit pipeline for one driver.
///
/// Only rows the timing source flagged accurate are consumed. The delta,
/// corrected and compound series are built over the driver's non-box rows
/// (the degradation fit keeps box rows in view and applies its own
/// exclusion). Everything returned is a snapshot; re-running on the same
/// session yields an identical report.
pub fn analyze_driver(session: &RaceSession, code: &str, cfg: &AnalysisConfig) -> Result<DriverPaceReport, AnalysisError> {
    let rows = pick_driver(&session.laps, code)?;
    let accurate = pick_accurate(&rows);
    if accurate.is_empty() {
        return Err(AnalysisError::NoLaps);
    }
    let clean = pick_wo_box(&accurate);
    let total = total_laps(&clean)?;

    let fastest = fastest_per_lap(&pick_accurate(&session.laps));
    let deltas = delta_to_fastest(&clean, &fastest);
    let corrected = fuel_corrected_series(&clean, total, cfg);
    let fits = fit_stint_degradation(&accurate, total, cfg);
    let trendlines = fits.iter().flat_map(trendline).collect();
    let compounds = laps_by_compound(&clean);
    let summary = pace_summary(&clean);
    let team = rows.iter().find_map(|l| l.team.clone());

    Ok(DriverPaceReport {
        session_id: session.id,
        driver: code.to_string(),
        team,
        summary,
        deltas,
        corrected,
        fits,
        trendlines,
        compounds,
    })
}
