use crate::ion_series::IonSeries;
use crate::mass::STABILITY_EPS;
use crate::peptide::CandidatePeptide;
use crate::spectrum::DissociationType;
use crate::Error;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

/// Theoretical fragment masses are quantized to integer bins of this width
pub const FRAGMENT_BINS_PER_DALTON: f64 = 1000.0;

/// Stable candidate identifier - an index into the mass-sorted candidate
/// array
#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
#[repr(transparent)]
pub struct PeptideIx(pub u32);

pub fn mass_to_bin(mass: f64) -> usize {
    (mass * FRAGMENT_BINS_PER_DALTON).round() as usize
}

/// Inverted index over theoretical fragment masses: quantized mass bin ->
/// candidate ids producing a fragment in that bin. Built once per search
/// partition, read-only and safe for concurrent lookup thereafter.
#[derive(Debug)]
pub struct FragmentIndex {
    /// bin -> ascending candidate ids (deduplicated per candidate per bin).
    /// Ids index a mass-sorted array, so each list is also ascending in
    /// candidate mass.
    bins: Vec<Vec<PeptideIx>>,
    /// Global candidate mass table, ascending - the binary search target
    /// for precursor mass windows
    pub masses: Vec<f64>,
    pub max_fragment_mass: f64,
}

impl FragmentIndex {
    /// Fragment every candidate under the given activation method and
    /// populate the bin lists. Candidates with empty sequences are skipped;
    /// fail fast on an empty universe or an unsorted mass table.
    pub fn build(
        candidates: &[CandidatePeptide],
        dissociation: DissociationType,
        max_fragment_mass: f64,
    ) -> Result<Self, Error> {
        if candidates.is_empty() {
            return Err(Error::EmptyCandidates);
        }
        if let Some(index) = candidates
            .windows(2)
            .position(|w| w[0].monoisotopic > w[1].monoisotopic)
        {
            return Err(Error::UnsortedCandidateMasses { index: index + 1 });
        }

        log::trace!(
            "building fragment index for {} candidates",
            candidates.len()
        );

        let mut entries = candidates
            .par_iter()
            .enumerate()
            .filter(|(_, peptide)| !peptide.is_empty())
            .flat_map_iter(|(idx, peptide)| {
                dissociation
                    .ion_kinds()
                    .iter()
                    .flat_map(|kind| IonSeries::new(peptide, *kind))
                    .filter(|ion| {
                        ion.monoisotopic_mass > 0.0 && ion.monoisotopic_mass <= max_fragment_mass
                    })
                    .map(move |ion| (mass_to_bin(ion.monoisotopic_mass), PeptideIx(idx as u32)))
            })
            .collect::<Vec<_>>();

        // Deterministic grouping: sort by (bin, id), drop duplicate
        // candidate entries within a bin
        entries.par_sort_unstable();
        entries.dedup();

        let n_bins = mass_to_bin(max_fragment_mass) + 1;
        let mut bins = vec![Vec::new(); n_bins];
        for (bin, ix) in entries {
            bins[bin].push(ix);
        }

        log::trace!("fragment index holds {} bins", bins.len());

        Ok(FragmentIndex {
            bins,
            masses: candidates.iter().map(|p| p.monoisotopic).collect(),
            max_fragment_mass,
        })
    }

    pub fn bin(&self, bin: usize) -> &[PeptideIx] {
        self.bins.get(bin).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    /// Inclusive bin range covering the mass window `[lo, hi]`, clamped to
    /// the index
    pub fn bin_range(&self, lo: f64, hi: f64) -> std::ops::RangeInclusive<usize> {
        let lo_bin = mass_to_bin(lo.max(0.0));
        let hi_bin = mass_to_bin(hi.max(0.0)).min(self.bins.len().saturating_sub(1));
        lo_bin..=hi_bin
    }
}

impl std::ops::Index<PeptideIx> for FragmentIndex {
    type Output = f64;

    fn index(&self, index: PeptideIx) -> &Self::Output {
        &self.masses[index.0 as usize]
    }
}

/// Return the smallest index `i` such that `masses[i] >= target - 1e-9`.
/// The stability tolerance makes exact-mass ties resolve to the leftmost
/// equal element, so the result is reproducible regardless of rounding.
pub fn binary_search_get_index(masses: &[f64], target: f64) -> usize {
    masses.partition_point(|&m| m < target - STABILITY_EPS)
}

/// Return the widest `left` and `right` indices into a `slice` (sorted by the
/// function `key`) such that all values between `low` and `high` are
/// contained in `slice[left..right]`
///
/// # Invariants
///
/// * `slice[left] <= low || left == 0`
/// * `slice[right] <= high && (slice[right+1] > high || right == slice.len())`
/// * `0 <= left <= right <= slice.len()`
#[inline]
pub fn binary_search_slice<T, F, S>(slice: &[T], key: F, low: S, high: S) -> (usize, usize)
where
    F: Fn(&T, &S) -> Ordering,
{
    let left_idx = match slice.binary_search_by(|a| key(a, &low)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx.saturating_sub(1);
            while idx > 0 && key(&slice[idx], &low) != Ordering::Less {
                idx -= 1;
            }
            idx
        }
    };

    let right_idx = match slice[left_idx..].binary_search_by(|a| key(a, &high)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx + left_idx;
            while idx < slice.len() && key(&slice[idx], &high) != Ordering::Greater {
                idx = idx.saturating_add(1);
            }
            idx.min(slice.len())
        }
    };
    (left_idx, right_idx)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ion_series::Kind;

    fn candidates(sequences: &[&str]) -> Vec<CandidatePeptide> {
        let mut c = sequences
            .iter()
            .map(|s| CandidatePeptide::new(s).unwrap())
            .collect::<Vec<_>>();
        c.sort_by(|a, b| a.monoisotopic.total_cmp(&b.monoisotopic));
        c
    }

    #[test]
    fn empty_universe_fails_fast() {
        assert_eq!(
            FragmentIndex::build(&[], DissociationType::Hcd, 2000.0).unwrap_err(),
            Error::EmptyCandidates
        );
    }

    #[test]
    fn unsorted_masses_fail_fast() {
        let peptides = vec![
            CandidatePeptide::new("PEPTIDEKK").unwrap(),
            CandidatePeptide::new("LAK").unwrap(),
        ];
        assert_eq!(
            FragmentIndex::build(&peptides, DissociationType::Hcd, 2000.0).unwrap_err(),
            Error::UnsortedCandidateMasses { index: 1 }
        );
    }

    #[test]
    fn bins_contain_fragmenting_candidates() {
        let peptides = candidates(&["LAKER", "PEPTIDEK"]);
        let index = FragmentIndex::build(&peptides, DissociationType::Hcd, 2000.0).unwrap();

        // Every b/y ion of every candidate must be findable in its bin
        for (idx, peptide) in peptides.iter().enumerate() {
            for kind in [Kind::B, Kind::Y] {
                for ion in IonSeries::new(peptide, kind) {
                    let bin = index.bin(mass_to_bin(ion.monoisotopic_mass));
                    assert!(
                        bin.contains(&PeptideIx(idx as u32)),
                        "{} ion at {} missing",
                        peptide.sequence,
                        ion.monoisotopic_mass
                    );
                }
            }
        }
    }

    #[test]
    fn bin_lists_ascending_and_deduplicated() {
        // Two candidates sharing a tryptic core produce shared bins
        let peptides = candidates(&["LAKER", "RLAKE", "PEPTIDEK"]);
        let index = FragmentIndex::build(&peptides, DissociationType::Hcd, 2000.0).unwrap();
        for bin in 0..index.n_bins() {
            let ids = index.bin(bin);
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn leftmost_equal_mass_index() {
        let masses = [100.0, 200.0, 200.0, 200.0 + 5e-10, 300.0];
        // All three "equal" masses are within the stability tolerance
        assert_eq!(binary_search_get_index(&masses, 200.0), 1);
        assert_eq!(binary_search_get_index(&masses, 200.0 + 5e-10), 1);
        assert_eq!(binary_search_get_index(&masses, 250.0), 4);
        assert_eq!(binary_search_get_index(&masses, 400.0), 5);
        assert_eq!(binary_search_get_index(&masses, 50.0), 0);
    }

    #[test]
    fn binary_search_slice_smoke() {
        let data = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0];
        let bounds = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 1.75, 3.5);
        assert_eq!(bounds, (1, 6));
        assert!(data[bounds.0] <= 1.75);
        assert_eq!(&data[bounds.0..bounds.1], &[1.5, 2.0, 2.5, 3.0, 3.5]);

        let bounds = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 0.0, 5.0);
        assert_eq!(bounds, (0, data.len()));
    }
}
