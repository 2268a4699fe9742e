//! Persisted summary of a run.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BreederError;
use crate::population::{Elite, Population, Unit};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generation: u32,
    pub problem_description: String,
    pub units: Vec<Unit>,
    pub elites: Vec<Elite>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn from_population(population: &Population) -> Self {
        Self {
            generation: population.generation(),
            problem_description: population.problem_description().to_string(),
            units: population.units().to_vec(),
            elites: population.elites().to_vec(),
            finished_at: Utc::now(),
        }
    }

    /// Highest-fitness elite across the whole run, earliest on ties.
    pub fn champion(&self) -> Option<&Elite> {
        self.elites
            .iter()
            .reduce(|best, e| if e.fitness() > best.fitness() { e } else { best })
    }

    pub fn save(&self, path: &Path) -> Result<(), BreederError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BreederError::Report(format!("serialize: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| BreederError::Report(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Run report written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, BreederError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| BreederError::Report(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| BreederError::Report(format!("{}: {e}", path.display())))
    }
}
