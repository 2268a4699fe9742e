//! Ideal-dialogue corpus for the exemplar-guided operator.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::BreederError;
use crate::simulate::Utterance;

/// A reference conversation: free text or role-tagged turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dialogue {
    Text(String),
    Turns(Vec<Utterance>),
}

impl Dialogue {
    pub fn render(&self) -> String {
        match self {
            Dialogue::Text(text) => text.clone(),
            Dialogue::Turns(turns) => turns
                .iter()
                .map(|u| format!("{}: {}", u.role, u.content))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    pub conversation: Dialogue,
}

/// Read-only sequence of exemplars. An empty corpus turns the exemplar operator
/// into a no-op.
#[derive(Debug, Clone, Default)]
pub struct ExemplarCorpus {
    exemplars: Vec<Exemplar>,
}

impl ExemplarCorpus {
    pub fn new(exemplars: Vec<Exemplar>) -> Self {
        Self { exemplars }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON array of `{"conversation": ...}` records.
    pub fn from_json(json: &str) -> Result<Self, BreederError> {
        let exemplars: Vec<Exemplar> = serde_json::from_str(json)
            .map_err(|e| BreederError::Exemplars(format!("invalid exemplar JSON: {e}")))?;
        Ok(Self { exemplars })
    }

    /// Load from disk. A missing or unreadable corpus degrades to an empty one.
    pub fn load_or_empty(path: &Path) -> Self {
        let loaded = std::fs::read_to_string(path)
            .map_err(|e| BreederError::Exemplars(format!("{}: {e}", path.display())))
            .and_then(|json| Self::from_json(&json));

        match loaded {
            Ok(corpus) => {
                info!(path = %path.display(), exemplars = corpus.len(), "Loaded exemplar corpus");
                corpus
            }
            Err(e) => {
                warn!(error = %e, "Failed to load exemplar corpus, exemplar mutation disabled");
                Self::empty()
            }
        }
    }

    pub fn exemplars(&self) -> &[Exemplar] {
        &self.exemplars
    }

    pub fn len(&self) -> usize {
        self.exemplars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exemplars.is_empty()
    }
}
