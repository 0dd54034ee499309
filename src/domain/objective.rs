//! Objective selection: reduce a simulation result to one scalar.

use crate::domain::error::OptitraderError;
use crate::domain::simulation::SimulationResult;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyDirection {
    Maximize,
    Minimize,
}

impl StudyDirection {
    /// Map a score so that larger is always better.
    pub fn oriented(self, score: f64) -> f64 {
        match self {
            StudyDirection::Maximize => score,
            StudyDirection::Minimize => -score,
        }
    }

    /// The unfavorable score substituted for non-finite or failed trials.
    pub fn sentinel(self, magnitude: f64) -> f64 {
        match self {
            StudyDirection::Maximize => -magnitude.abs(),
            StudyDirection::Minimize => magnitude.abs(),
        }
    }

    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        self.oriented(candidate) > self.oriented(incumbent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    SharpeRatio,
    Sortino,
    Calmar,
    Omega,
    MaxDrawdown,
    TotalReturn,
}

impl Objective {
    pub const ALL: [Objective; 6] = [
        Objective::SharpeRatio,
        Objective::Sortino,
        Objective::Calmar,
        Objective::Omega,
        Objective::MaxDrawdown,
        Objective::TotalReturn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Objective::SharpeRatio => "sharpe_ratio",
            Objective::Sortino => "sortino",
            Objective::Calmar => "calmar",
            Objective::Omega => "omega",
            Objective::MaxDrawdown => "max_drawdown",
            Objective::TotalReturn => "total_return",
        }
    }

    pub fn direction(self) -> StudyDirection {
        match self {
            Objective::MaxDrawdown => StudyDirection::Minimize,
            _ => StudyDirection::Maximize,
        }
    }

    pub fn extract(self, result: &SimulationResult) -> f64 {
        let m = &result.metrics;
        match self {
            Objective::SharpeRatio => m.sharpe_ratio,
            Objective::Sortino => m.sortino_ratio,
            Objective::Calmar => m.calmar_ratio,
            Objective::Omega => m.omega_ratio,
            Objective::MaxDrawdown => m.max_drawdown,
            Objective::TotalReturn => m.total_return,
        }
    }
}

impl FromStr for Objective {
    type Err = OptitraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sharpe_ratio" => Ok(Objective::SharpeRatio),
            "sortino" | "sortino_ratio" => Ok(Objective::Sortino),
            "calmar" | "calmar_ratio" => Ok(Objective::Calmar),
            "omega" | "omega_ratio" => Ok(Objective::Omega),
            "max_drawdown" => Ok(Objective::MaxDrawdown),
            "total_return" => Ok(Objective::TotalReturn),
            _ => Err(OptitraderError::UnsupportedObjective {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
