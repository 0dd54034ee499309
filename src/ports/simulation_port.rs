//! Simulation engine port trait.

use crate::domain::error::OptitraderError;
use crate::domain::simulation::{SimulationInput, SimulationResult};

/// A blocking, side-effect-free backtest over precomputed signals.
pub trait SimulationPort: Sync {
    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, OptitraderError>;
}
