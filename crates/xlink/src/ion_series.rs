use crate::peptide::CandidatePeptide;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    A,
    B,
    C,
    X,
    Y,
    Z,
    /// Intact-peptide signature ion carrying a crosslinker cleavage stub.
    /// Never produced by [`IonSeries`]; built directly by the localizer.
    M,
}

impl Kind {
    /// Fragment retains the peptide's N-terminus (a/b/c series)
    pub fn n_terminal(&self) -> bool {
        matches!(self, Kind::A | Kind::B | Kind::C)
    }
}

/// A theoretical fragment ion
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ion {
    pub kind: Kind,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f64,
    /// 1-based residue position of the cleavage: for N-terminal series the
    /// last residue contained in the fragment, for C-terminal series the
    /// first residue contained in the fragment
    pub position: usize,
}

/// Generate theoretical fragment ions for a candidate peptide, optionally
/// with an extra "localized" mass (crosslinker chemistry) attached to one
/// residue. Fragments that contain the attachment site carry the extra mass.
pub struct IonSeries<'p> {
    pub kind: Kind,
    cumulative_mass: f64,
    peptide: &'p CandidatePeptide,
    localized: Option<(usize, f64)>,
    idx: usize,
}

const C: f64 = 12.0;
const O: f64 = 15.994915;
const H: f64 = 1.007825;
const PRO: f64 = 1.00727646;
const N: f64 = 14.003074;
const NH2: f64 = N + H * 2.0 + PRO;

impl<'p> IonSeries<'p> {
    /// Create a new [`IonSeries`] iterator for a specified peptide
    pub fn new(peptide: &'p CandidatePeptide, kind: Kind) -> Self {
        Self::build(peptide, kind, None)
    }

    /// Create an [`IonSeries`] with `mass` attached at the 1-based residue
    /// `site`
    pub fn localized(peptide: &'p CandidatePeptide, kind: Kind, site: usize, mass: f64) -> Self {
        Self::build(peptide, kind, Some((site, mass)))
    }

    fn build(peptide: &'p CandidatePeptide, kind: Kind, localized: Option<(usize, f64)>) -> Self {
        let added = localized.map(|(_, m)| m).unwrap_or_default();
        let nterm = peptide.nterm.unwrap_or_default();
        // Dynamic programming solution - memoize cumulative mass of the
        // peptide fragment for fast fragment ion generation
        let cumulative_mass = match kind {
            Kind::A => nterm - (C + O),
            Kind::B => nterm,
            Kind::C => nterm + NH2,
            Kind::X => peptide.monoisotopic + added - nterm + (C + O - NH2 + N + H),
            Kind::Y => peptide.monoisotopic + added - nterm,
            Kind::Z => peptide.monoisotopic + added - nterm - NH2,
            Kind::M => unreachable!("BUG: signature ions are not generated as a series"),
        };
        Self {
            kind,
            cumulative_mass,
            peptide,
            localized,
            idx: 0,
        }
    }
}

impl<'p> Iterator for IonSeries<'p> {
    type Item = Ion;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.peptide.sequence.len() {
            return None;
        }
        let residue = self.peptide.residue_mass(self.idx);
        // Extra mass travels with the fragment only while the fragment
        // contains the attachment site
        let extra = match self.localized {
            Some((site, mass)) if site == self.idx + 1 => mass,
            _ => 0.0,
        };

        self.idx += 1;
        let position = match self.kind.n_terminal() {
            true => {
                self.cumulative_mass += residue + extra;
                self.idx
            }
            false => {
                self.cumulative_mass -= residue + extra;
                self.idx + 1
            }
        };

        Some(Ion {
            kind: self.kind,
            monoisotopic_mass: self.cumulative_mass,
            position,
        })
    }
}
