use crate::mass::{Tolerance, STABILITY_EPS};

/// One allowed observed-mass window, tagged with the notch that produced it
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AllowedInterval {
    pub min: f64,
    pub max: f64,
    pub notch: usize,
}

/// Decides whether an observed precursor mass is explained by a theoretical
/// mass, and if so which allowed offset window ("notch") matched. Pure and
/// safe for concurrent calls.
#[derive(Clone, Debug)]
pub enum PrecursorMassAcceptor {
    /// Symmetric relative tolerance around zero mass difference
    Ppm(f64),
    /// Symmetric absolute tolerance around zero mass difference
    Da(f64),
    /// A sorted list of allowed mass offsets (e.g. isobaric modification
    /// hypotheses), each its own notch, all under a shared ppm tolerance
    NotchedPpm { ppm: f64, offsets: Vec<f64> },
    /// Accept any non-negative mass difference (crosslink/deadend/loop
    /// probing before the exact chemistry is known)
    Open,
}

impl PrecursorMassAcceptor {
    /// Build a single-notch acceptor from a [`Tolerance`], taking the widest
    /// half-width for asymmetric windows
    pub fn from_tolerance(tol: Tolerance) -> Self {
        match tol {
            Tolerance::Ppm(lo, hi) => PrecursorMassAcceptor::Ppm(lo.abs().max(hi.abs())),
            Tolerance::Da(lo, hi) => PrecursorMassAcceptor::Da(lo.abs().max(hi.abs())),
        }
    }

    /// Does `observed` fall in any allowed window around `theoretical`?
    /// Returns the notch of the matching window.
    pub fn accepts(&self, observed: f64, theoretical: f64) -> Option<usize> {
        match self {
            PrecursorMassAcceptor::Ppm(ppm) => {
                let half = Tolerance::ppm_to_delta_mass(theoretical, *ppm);
                ((observed - theoretical).abs() <= half).then_some(0)
            }
            PrecursorMassAcceptor::Da(da) => ((observed - theoretical).abs() <= *da).then_some(0),
            PrecursorMassAcceptor::NotchedPpm { ppm, offsets } => {
                let half = Tolerance::ppm_to_delta_mass(theoretical, *ppm);
                offsets
                    .iter()
                    .position(|offset| (observed - theoretical - offset).abs() <= half)
            }
            PrecursorMassAcceptor::Open => (observed >= theoretical - STABILITY_EPS).then_some(0),
        }
    }

    /// Inverse query: the observed-mass windows that would be accepted for
    /// a given theoretical mass. Used to derive beta-mass search windows.
    pub fn allowed_intervals(&self, theoretical: f64) -> Vec<AllowedInterval> {
        match self {
            PrecursorMassAcceptor::Ppm(ppm) => {
                let half = Tolerance::ppm_to_delta_mass(theoretical, *ppm);
                vec![AllowedInterval {
                    min: theoretical - half,
                    max: theoretical + half,
                    notch: 0,
                }]
            }
            PrecursorMassAcceptor::Da(da) => vec![AllowedInterval {
                min: theoretical - da,
                max: theoretical + da,
                notch: 0,
            }],
            PrecursorMassAcceptor::NotchedPpm { ppm, offsets } => {
                let half = Tolerance::ppm_to_delta_mass(theoretical, *ppm);
                offsets
                    .iter()
                    .enumerate()
                    .map(|(notch, offset)| AllowedInterval {
                        min: theoretical + offset - half,
                        max: theoretical + offset + half,
                        notch,
                    })
                    .collect()
            }
            PrecursorMassAcceptor::Open => vec![AllowedInterval {
                min: theoretical - STABILITY_EPS,
                max: f64::INFINITY,
                notch: 0,
            }],
        }
    }

    /// The (lowest, highest) theoretical mass that could be accepted for an
    /// observed precursor mass, across all notches. Used by the indexed
    /// scorer to skip candidates whose mass could never be accepted.
    pub fn theoretical_mass_bounds(&self, observed: f64) -> (f64, f64) {
        match self {
            PrecursorMassAcceptor::Ppm(ppm) => {
                let half = Tolerance::ppm_to_delta_mass(observed, *ppm);
                (observed - half, observed + half)
            }
            PrecursorMassAcceptor::Da(da) => (observed - da, observed + da),
            PrecursorMassAcceptor::NotchedPpm { ppm, offsets } => {
                let half = Tolerance::ppm_to_delta_mass(observed, *ppm);
                let min = offsets.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = offsets.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                (observed - max - half, observed - min + half)
            }
            PrecursorMassAcceptor::Open => (f64::NEG_INFINITY, observed + STABILITY_EPS),
        }
    }
}
