use crate::index::binary_search_slice;
use crate::ion_series::Kind;
use crate::mass::Tolerance;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DissociationType {
    Hcd,
    Cid,
    Etd,
    Ethcd,
}

impl DissociationType {
    /// Which fragment ion series this activation method produces
    pub fn ion_kinds(&self) -> &'static [Kind] {
        match self {
            DissociationType::Hcd | DissociationType::Cid => &[Kind::B, Kind::Y],
            DissociationType::Etd => &[Kind::C, Kind::Z],
            DissociationType::Ethcd => &[Kind::B, Kind::Y, Kind::C, Kind::Z],
        }
    }
}

/// A charge-less peak at monoisotopic mass. Spectra are deconvoluted
/// upstream; all peak masses here are neutral.
#[derive(PartialEq, PartialOrd, Copy, Clone, Default, Debug, Serialize)]
pub struct Peak {
    pub mass: f64,
    pub intensity: f32,
}

/// An MS2 scan with a deconvoluted precursor, ready for scoring.
/// Produced externally; read-only to this crate.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Scan {
    /// Scan identifier, carried through to results
    pub id: String,
    /// Neutral monoisotopic precursor mass
    pub precursor_mass: f64,
    pub precursor_charge: u8,
    /// Neutral fragment peaks, sorted by mass in ascending order
    pub peaks: Vec<Peak>,
    pub total_ion_current: f32,
    pub dissociation: DissociationType,
    /// Child (MS3) scans sharing this precursor, used for cleavable
    /// crosslinker stub confirmation
    pub children: Vec<Scan>,
}

impl Default for DissociationType {
    fn default() -> Self {
        DissociationType::Hcd
    }
}

impl Scan {
    pub fn new(
        id: &str,
        precursor_mass: f64,
        precursor_charge: u8,
        mut peaks: Vec<Peak>,
        dissociation: DissociationType,
    ) -> Self {
        peaks.sort_by(|a, b| a.mass.total_cmp(&b.mass));
        let total_ion_current = peaks.iter().map(|p| p.intensity).sum();
        Scan {
            id: id.into(),
            precursor_mass,
            precursor_charge,
            peaks,
            total_ion_current,
            dissociation,
            children: Vec::new(),
        }
    }
}

/// Binary search to the tolerance window, then linear scan for the most
/// intense peak within it
pub fn select_most_intense_peak(peaks: &[Peak], mass: f64, tolerance: Tolerance) -> Option<&Peak> {
    let (lo, hi) = tolerance.bounds(mass);
    let (i, j) = binary_search_slice(peaks, |peak, query| peak.mass.total_cmp(query), lo, hi);

    let mut best_peak = None;
    let mut max_int = 0.0;
    for peak in peaks[i..j]
        .iter()
        .filter(|peak| peak.mass >= lo && peak.mass <= hi)
    {
        if peak.intensity >= max_int {
            max_int = peak.intensity;
            best_peak = Some(peak);
        }
    }
    best_peak
}
