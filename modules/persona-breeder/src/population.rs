//! Population store: units, elite snapshots and the generation counter.
//!
//! The population owns every unit and elite. Other components only borrow units for
//! the duration of one call; all field updates go through the crate-private mutators
//! below so history stays append-only.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BreederError;

/// One evolving individual: a candidate specification plus its evolutionary metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    id: Uuid,
    specification: String,
    mutation_hint: String,
    fitness: f64,
    /// Per-criterion scores from the most recent evaluation.
    #[serde(default)]
    scores: BTreeMap<String, f64>,
    history: Vec<String>,
}

impl Unit {
    /// A fresh unit whose history starts with `specification`.
    pub fn seed(specification: impl Into<String>, mutation_hint: impl Into<String>) -> Self {
        let specification = specification.into();
        Self {
            id: Uuid::new_v4(),
            history: vec![specification.clone()],
            specification,
            mutation_hint: mutation_hint.into(),
            fitness: 0.0,
            scores: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn specification(&self) -> &str {
        &self.specification
    }

    pub fn mutation_hint(&self) -> &str {
        &self.mutation_hint
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    /// Every value `specification` has held, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Replace the specification and archive it. Returns false (and changes nothing)
    /// when the new text equals the current one.
    pub(crate) fn revise(&mut self, specification: String) -> bool {
        if specification == self.specification {
            return false;
        }
        self.history.push(specification.clone());
        self.specification = specification;
        true
    }

    pub(crate) fn set_mutation_hint(&mut self, mutation_hint: String) {
        self.mutation_hint = mutation_hint;
    }

    pub(crate) fn record_evaluation(&mut self, fitness: f64, scores: BTreeMap<String, f64>) {
        self.fitness = fitness;
        self.scores = scores;
    }
}

/// Immutable copy of the best unit of one evaluation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elite {
    generation: u32,
    captured_at: DateTime<Utc>,
    unit: Unit,
}

impl Elite {
    fn capture(unit: &Unit, generation: u32) -> Self {
        Self {
            generation,
            captured_at: Utc::now(),
            unit: unit.clone(),
        }
    }

    /// Generation counter value when the snapshot was taken.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn fitness(&self) -> f64 {
        self.unit.fitness
    }

    pub fn specification(&self) -> &str {
        &self.unit.specification
    }
}

/// The fixed-size collection of units evolved together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    size: usize,
    generation: u32,
    problem_description: String,
    elites: Vec<Elite>,
    units: Vec<Unit>,
}

impl Population {
    /// One unit per mutation hint, each seeded with `problem_description`.
    pub fn create<I, S>(
        mutation_hints: I,
        problem_description: impl Into<String>,
    ) -> Result<Self, BreederError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let problem_description = problem_description.into();
        let units: Vec<Unit> = mutation_hints
            .into_iter()
            .map(|hint| Unit::seed(problem_description.clone(), hint))
            .collect();

        if units.is_empty() {
            return Err(BreederError::EmptyMutationHints);
        }

        Ok(Self {
            size: units.len(),
            generation: 0,
            problem_description,
            elites: Vec::new(),
            units,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Completed evolutionary cycles.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn problem_description(&self) -> &str {
        &self.problem_description
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Elite snapshots in capture order, one per evaluation round.
    pub fn elites(&self) -> &[Elite] {
        &self.elites
    }

    /// Index of the unit with the strictly highest fitness; ties keep the first seen.
    pub fn best_index(&self) -> usize {
        let mut best = 0;
        for (i, unit) in self.units.iter().enumerate().skip(1) {
            if unit.fitness > self.units[best].fitness {
                best = i;
            }
        }
        best
    }

    pub(crate) fn units_mut(&mut self) -> &mut [Unit] {
        &mut self.units
    }

    /// Split borrow for operators that rewrite a unit while reading the lineage.
    pub(crate) fn units_and_elites(&mut self) -> (&mut [Unit], &[Elite]) {
        (&mut self.units, &self.elites)
    }

    /// Snapshot the current best unit. Call once, after a full evaluation sweep.
    pub(crate) fn capture_elite(&mut self) -> &Elite {
        let best = self.best_index();
        let elite = Elite::capture(&self.units[best], self.generation);
        self.elites.push(elite);
        &self.elites[self.elites.len() - 1]
    }

    pub(crate) fn advance_generation(&mut self) {
        self.generation += 1;
    }
}
