use crate::mass::{Mass, H2O, VALID_AA};
use crate::Error;
use serde::Serialize;
use std::fmt::Write;

/// A candidate peptide produced by an upstream digestion/modification stage.
/// Stable identifiers are indices into a flat array sorted ascending by
/// monoisotopic mass; candidates are immutable once the universe is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePeptide {
    /// Base amino acid sequence
    pub sequence: String,
    /// Neutral monoisotopic mass, including all modifications
    pub monoisotopic: f64,
    /// Per-residue modification masses (0.0 = unmodified), same length
    /// as `sequence`
    pub modifications: Vec<f64>,
    /// N-terminal modification mass
    pub nterm: Option<f64>,
    /// C-terminal modification mass
    pub cterm: Option<f64>,
    pub missed_cleavages: u8,
    /// Peptide begins at its protein's N-terminus
    pub protein_nterm: bool,
    /// Peptide ends at its protein's C-terminus
    pub protein_cterm: bool,
}

impl CandidatePeptide {
    pub fn new(sequence: &str) -> Result<Self, Error> {
        let mut monoisotopic = H2O;
        for c in sequence.bytes() {
            if !VALID_AA.contains(&c) {
                return Err(Error::InvalidResidue(c as char));
            }
            monoisotopic += c.monoisotopic();
        }
        Ok(CandidatePeptide {
            sequence: sequence.into(),
            monoisotopic,
            modifications: vec![0.0; sequence.len()],
            nterm: None,
            cterm: None,
            missed_cleavages: 0,
            protein_nterm: false,
            protein_cterm: false,
        })
    }

    /// Attach a modification to the 1-based residue `position`, adjusting
    /// the monoisotopic mass. Intended for candidate-universe construction
    /// and tests; candidates are immutable once handed to the engine.
    pub fn with_modification(mut self, position: usize, mass: f64) -> Self {
        self.modifications[position - 1] += mass;
        self.monoisotopic += mass;
        self
    }

    pub fn with_nterm(mut self, mass: f64) -> Self {
        self.monoisotopic += mass - self.nterm.unwrap_or_default();
        self.nterm = Some(mass);
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Residue mass at 0-based index, including any modification
    pub(crate) fn residue_mass(&self, idx: usize) -> f64 {
        self.sequence.as_bytes()[idx].monoisotopic() + self.modifications[idx]
    }

    /// Does the 1-based `position` carry a modification?
    pub fn is_modified(&self, position: usize) -> bool {
        self.modifications[position - 1] != 0.0
    }
}

impl std::fmt::Display for CandidatePeptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = self.nterm {
            write!(f, "[{:+}]-", m)?;
        }
        for (c, m) in self.sequence.bytes().zip(&self.modifications) {
            f.write_char(c as char)?;
            if *m != 0.0 {
                write!(f, "[{:+}]", m)?;
            }
        }
        if let Some(m) = self.cterm {
            write!(f, "-[{:+}]", m)?;
        }
        Ok(())
    }
}
