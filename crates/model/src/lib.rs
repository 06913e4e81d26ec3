//! Lap-table domain model shared across the pace workspace.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tyre compound, ordered softest to hardest. Any compound string the
/// timing source emits that we do not recognize maps to `Unknown`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(from = "String", into = "String")]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    Unknown,
}

impl Compound {
    pub fn code(self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
            Compound::Unknown => "UNKNOWN",
        }
    }
}

impl From<String> for Compound {
    fn from(s: String) -> Self {
        match s.trim().to_uppercase().as_str() {
            "SOFT" => Compound::Soft,
            "MEDIUM" => Compound::Medium,
            "HARD" => Compound::Hard,
            "INTERMEDIATE" => Compound::Intermediate,
            "WET" => Compound::Wet,
            _ => Compound::Unknown,
        }
    }
}

impl From<Compound> for String {
    fn from(c: Compound) -> Self {
        c.code().to_string()
    }
}

impl std::fmt::Display for Compound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum SessionKind {
    Race,
    Qualifying,
    Sprint,
    Practice1,
    Practice2,
    Practice3,
}

impl SessionKind {
    pub fn code(self) -> &'static str {
        match self {
            SessionKind::Race => "R",
            SessionKind::Qualifying => "Q",
            SessionKind::Sprint => "S",
            SessionKind::Practice1 => "FP1",
            SessionKind::Practice2 => "FP2",
            SessionKind::Practice3 => "FP3",
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "R" | "RACE" => Ok(SessionKind::Race),
            "Q" | "QUALIFYING" => Ok(SessionKind::Qualifying),
            "S" | "SPRINT" => Ok(SessionKind::Sprint),
            "FP1" | "PRACTICE 1" => Ok(SessionKind::Practice1),
            "FP2" | "PRACTICE 2" => Ok(SessionKind::Practice2),
            "FP3" | "PRACTICE 3" => Ok(SessionKind::Practice3),
            other => Err(format!("unknown session kind {other:?}")),
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One row of a session's lap table, as handed over by the timing source.
///
/// `lap_time_s` is `None` when the source has no valid time for the lap.
/// `pit_in_time_s`/`pit_out_time_s` are session-time seconds and mark
/// in-laps and out-laps. `is_accurate` is the source's validity flag.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LapRecord {
    pub driver: String,
    #[serde(default)]
    pub team: Option<String>,
    pub lap_number: u32,
    #[serde(default)]
    pub lap_time_s: Option<f64>,
    pub compound: Compound,
    pub stint: u32,
    #[serde(default)]
    pub pit_in_time_s: Option<f64>,
    #[serde(default)]
    pub pit_out_time_s: Option<f64>,
    pub is_accurate: bool,
}

/// The fastest valid lap anyone set on a given lap number.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FastestLap {
    pub time_s: f64,
    pub driver: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LapDelta {
    pub lap_number: u32,
    pub delta_s: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct CorrectedLap {
    pub lap_number: u32,
    pub stint: u32,
    pub compound: Compound,
    pub lap_time_s: f64,
    pub corrected_s: f64,
}

/// Least-squares degradation line for one stint, fitted over the stint's
/// qualifying laps but reported with the stint's full lap range so the
/// line can be drawn across excluded laps as well.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DegradationFit {
    pub stint: u32,
    pub slope_s_per_lap: f64,
    pub intercept_s: f64,
    pub sample_count: u32,
    pub lap_first: u32,
    pub lap_last: u32,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrendPoint {
    pub stint: u32,
    pub lap_number: u32,
    pub fitted_s: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct CompoundLap {
    pub compound: Compound,
    pub lap_number: u32,
    pub lap_time_s: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LeaderGap {
    pub lap_number: u32,
    pub gap_s: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct PaceSummary {
    pub laps: usize,
    pub fastest_s: Option<f64>,
    pub slowest_s: Option<f64>,
    pub mean_s: Option<f64>,
    pub compounds: Vec<Compound>,
}

/// An immutable, fully materialized lap table for one session.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RaceSession {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub year: u16,
    pub event: String,
    pub kind: SessionKind,
    pub laps: Vec<LapRecord>,
}

/// Everything the pipeline derives for one driver, handed to the renderer
/// as plain tabular data.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DriverPaceReport {
    #[serde(with = "uuid::serde::simple")]
    pub session_id: Uuid,
    pub driver: String,
    pub team: Option<String>,
    pub summary: PaceSummary,
    pub deltas: Vec<LapDelta>,
    pub corrected: Vec<CorrectedLap>,
    pub fits: Vec<DegradationFit>,
    pub trendlines: Vec<TrendPoint>,
    pub compounds: Vec<CompoundLap>,
}
