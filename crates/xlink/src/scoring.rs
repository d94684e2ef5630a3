use crate::index::{binary_search_get_index, FragmentIndex, PeptideIx};
use crate::mass::Tolerance;
use crate::spectrum::Scan;

/// Per-lane table of preliminary scores: `table[id]` counts the distinct
/// fragment bins matched for that candidate. Saturating - scores never wrap
/// past the byte range. Allocated once per worker lane and reset (not
/// reallocated) at the start of every scan.
pub struct ScoringTable {
    scores: Vec<u8>,
}

impl ScoringTable {
    pub fn new(n_candidates: usize) -> Self {
        ScoringTable {
            scores: vec![0; n_candidates],
        }
    }

    pub fn reset(&mut self) {
        self.scores.fill(0);
    }

    /// Increment the score for a candidate, returning the previous value.
    /// Saturating increments keep returning `u8::MAX`, so callers comparing
    /// against the pre-increment value see each score crossed exactly once.
    pub fn increment(&mut self, ix: PeptideIx) -> u8 {
        let slot = &mut self.scores[ix.0 as usize];
        let prev = *slot;
        *slot = prev.saturating_add(1);
        prev
    }

    pub fn get(&self, ix: PeptideIx) -> u8 {
        self.scores[ix.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// First-pass indexed scoring for one scan.
///
/// Every observed peak is assumed to be singly charged; its tolerance window
/// is expanded to a range of fragment bins, and every candidate present in a
/// touched bin has its table entry incremented. Candidates enter the
/// shortlist the first time their score reaches `cutoff`, filtered by a
/// caller-supplied mass window so candidates whose mass could never
/// contribute to the precursor are not scored at all.
pub struct IndexedScorer {
    pub fragment_tol: Tolerance,
    /// Also probe the bin of the complementary fragment
    /// (`precursor - peak`) for each peak
    pub complementary_ions: bool,
    /// Table score at which a candidate enters the shortlist
    pub cutoff: u8,
}

impl IndexedScorer {
    /// Score `scan` against the index. `mass_bounds` is the candidate-mass
    /// window worth scoring (infinite bounds disable that side);
    /// `bins_scratch` and `shortlist` are lane-owned buffers, cleared here
    /// rather than reallocated.
    pub fn score(
        &self,
        scan: &Scan,
        index: &FragmentIndex,
        mass_bounds: (f64, f64),
        table: &mut ScoringTable,
        bins_scratch: &mut Vec<usize>,
        shortlist: &mut Vec<PeptideIx>,
    ) {
        debug_assert_eq!(table.len(), index.masses.len());
        table.reset();
        bins_scratch.clear();
        shortlist.clear();

        // Candidates outside this window can never contribute regardless
        // of fragment evidence
        let (mass_lo, mass_hi) = mass_bounds;
        let id_lo = match mass_lo.is_finite() {
            true => binary_search_get_index(&index.masses, mass_lo) as u32,
            false => 0,
        };
        let id_hi = match mass_hi.is_finite() {
            true => index
                .masses
                .partition_point(|&m| m <= mass_hi + crate::mass::STABILITY_EPS)
                as u32,
            false => index.masses.len() as u32,
        };

        for peak in &scan.peaks {
            let (lo, hi) = self.fragment_tol.bounds(peak.mass);
            bins_scratch.extend(index.bin_range(lo, hi));

            if self.complementary_ions {
                let comp = scan.precursor_mass - peak.mass;
                if comp > 0.0 {
                    let (lo, hi) = self.fragment_tol.bounds(comp);
                    bins_scratch.extend(index.bin_range(lo, hi));
                }
            }
        }

        // Count distinct bins only - two peaks touching the same bin must
        // not double-credit a candidate
        bins_scratch.sort_unstable();
        bins_scratch.dedup();

        let threshold = self.cutoff.max(1);
        for &bin in bins_scratch.iter() {
            let ids = index.bin(bin);
            let start = ids.partition_point(|ix| ix.0 < id_lo);
            for &ix in &ids[start..] {
                if ix.0 >= id_hi {
                    break;
                }
                if table.increment(ix) == threshold - 1 {
                    shortlist.push(ix);
                }
            }
        }
    }
}
