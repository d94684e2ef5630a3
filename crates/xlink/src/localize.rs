use crate::acceptor::PrecursorMassAcceptor;
use crate::crosslinker::Crosslinker;
use crate::ion_series::{Ion, IonSeries, Kind};
use crate::mass::Tolerance;
use crate::peptide::CandidatePeptide;
use crate::spectrum::{select_most_intense_peak, DissociationType, Scan};
use fnv::FnvHashSet;
use serde::Serialize;

/// An observed peak explained by a theoretical fragment
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MatchedIon {
    pub kind: Kind,
    /// Cleavage position of the theoretical fragment (see [`Ion`])
    pub position: usize,
    pub theoretical_mass: f64,
    pub observed_mass: f64,
    pub intensity: f32,
}

/// Matched ions for one child (MS3) scan, keyed by index into
/// `scan.children`. Kept separate from the primary score so the scoring
/// model stays decomposable.
#[derive(Clone, Debug, Serialize)]
pub struct ChildScanMatch {
    pub child_index: usize,
    pub score: f64,
    pub matched_ions: Vec<MatchedIon>,
}

/// The best-scoring attachment site assignment for one peptide
#[derive(Clone, Debug)]
pub struct Localization {
    /// 1-based link positions: one for deadend/cross, two for loop
    pub sites: Vec<usize>,
    pub score: f64,
    pub matched_ions: Vec<MatchedIon>,
    pub child_matches: Vec<ChildScanMatch>,
}

/// Enumerate the chemically valid attachment positions (1-based) on a
/// peptide for a reactive residue set. `b'X'` in the set is a wildcard.
///
/// A site is excluded when the residue already carries a modification, when
/// it is the C-terminal residue of a peptide that does not end its protein
/// (the crosslinked residue cannot also be cleaved, unless
/// `cleave_at_site`), and when it is an initiator methionine at a protein
/// N-terminus.
pub fn valid_link_sites(
    peptide: &CandidatePeptide,
    reactive: &[u8],
    cleave_at_site: bool,
) -> Vec<usize> {
    let wildcard = reactive.contains(&b'X');
    let bytes = peptide.sequence.as_bytes();
    let mut end = bytes.len();
    if !cleave_at_site && !peptide.protein_cterm {
        end = end.saturating_sub(1);
    }

    let mut sites = Vec::new();
    for (idx, &residue) in bytes[..end].iter().enumerate() {
        if !wildcard && !reactive.contains(&residue) {
            continue;
        }
        if peptide.is_modified(idx + 1) {
            continue;
        }
        if idx == 0 && peptide.protein_nterm && residue == b'M' {
            continue;
        }
        sites.push(idx + 1);
    }
    sites
}

/// Exhaustive attachment-site search: re-score theoretical fragment sets per
/// candidate site and keep the argmax.
pub struct SiteLocalizer<'a> {
    pub crosslinker: &'a Crosslinker,
    pub fragment_tol: Tolerance,
    pub precursor_acceptor: &'a PrecursorMassAcceptor,
    pub score_cutoff: f64,
    pub child_dissociation: DissociationType,
}

impl<'a> SiteLocalizer<'a> {
    /// Score a set of theoretical ions against a scan. Per matched fragment
    /// the score gains `1 + intensity / total_ion_current`, so the integer
    /// part counts matched fragments and the fraction rewards explained
    /// intensity.
    pub fn match_ions<I>(&self, scan: &Scan, ions: I) -> (f64, Vec<MatchedIon>)
    where
        I: Iterator<Item = Ion>,
    {
        let mut score = 0.0;
        let mut matched = Vec::new();
        for ion in ions {
            if let Some(peak) =
                select_most_intense_peak(&scan.peaks, ion.monoisotopic_mass, self.fragment_tol)
            {
                score += 1.0 + peak.intensity as f64 / scan.total_ion_current.max(1.0) as f64;
                matched.push(MatchedIon {
                    kind: ion.kind,
                    position: ion.position,
                    theoretical_mass: ion.monoisotopic_mass,
                    observed_mass: peak.mass,
                    intensity: peak.intensity,
                });
            }
        }
        (score, matched)
    }

    /// The chemistry masses to attach at a candidate site: cleavable
    /// reagents fragment along with the peptide backbone, so the stubs are
    /// localized instead of the intact reagent plus partner.
    fn masses_to_localize(&self, scan_dissociation: DissociationType, intact: f64) -> Vec<f64> {
        if self.crosslinker.cleaves_under(scan_dissociation) {
            vec![
                self.crosslinker.cleave_mass_short,
                self.crosslinker.cleave_mass_long,
            ]
        } else {
            vec![intact]
        }
    }

    /// Theoretical fragments for one attachment site, deduplicated by mass
    /// across the localized masses, plus intact-peptide signature (M) ions
    /// for cleavable reagents.
    fn site_ions(
        &self,
        peptide: &CandidatePeptide,
        dissociation: DissociationType,
        site: usize,
        masses: &[f64],
    ) -> Vec<Ion> {
        let mut seen: FnvHashSet<u64> = FnvHashSet::default();
        let mut ions = Vec::new();
        for &mass in masses {
            for kind in dissociation.ion_kinds() {
                for ion in IonSeries::localized(peptide, *kind, site, mass) {
                    if seen.insert(ion.monoisotopic_mass.to_bits()) {
                        ions.push(ion);
                    }
                }
            }
            if self.crosslinker.cleavable {
                let signature = peptide.monoisotopic + mass;
                if seen.insert(signature.to_bits()) {
                    ions.push(Ion {
                        kind: Kind::M,
                        monoisotopic_mass: signature,
                        position: peptide.len(),
                    });
                }
            }
        }
        ions
    }

    /// Localize a single chemistry mass (deadend, or crosslinker plus
    /// partner peptide) over candidate sites, returning the best-scoring
    /// assignment. `None` when the best score falls below the cutoff.
    pub fn localize_mass(
        &self,
        peptide: &CandidatePeptide,
        scan: &Scan,
        sites: &[usize],
        intact_mass: f64,
    ) -> Option<Localization> {
        let masses = self.masses_to_localize(scan.dissociation, intact_mass);

        let mut best: Option<Localization> = None;
        for &site in sites {
            let ions = self.site_ions(peptide, scan.dissociation, site, &masses);
            let (score, matched_ions) = self.match_ions(scan, ions.into_iter());
            if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
                best = Some(Localization {
                    sites: vec![site],
                    score,
                    matched_ions,
                    child_matches: Vec::new(),
                });
            }
        }

        let mut best = best.filter(|b| b.score >= self.score_cutoff)?;
        best.child_matches = self.match_child_scans(peptide, scan, best.sites[0]);
        Some(best)
    }

    /// Score child (MS3) scans whose precursor matches a stub-bearing
    /// peptide mass. Folded into per-child bookkeeping, never into the
    /// primary score.
    fn match_child_scans(
        &self,
        peptide: &CandidatePeptide,
        scan: &Scan,
        site: usize,
    ) -> Vec<ChildScanMatch> {
        if !self.crosslinker.cleavable {
            return Vec::new();
        }
        let stubs = [
            self.crosslinker.cleave_mass_short,
            self.crosslinker.cleave_mass_long,
        ];

        let mut matches = Vec::new();
        for (child_index, child) in scan.children.iter().enumerate() {
            let stub = stubs.iter().find(|&&stub| {
                self.precursor_acceptor
                    .accepts(child.precursor_mass, peptide.monoisotopic + stub)
                    .is_some()
            });
            let stub = match stub {
                Some(&stub) => stub,
                None => continue,
            };

            let ions = self.site_ions(peptide, self.child_dissociation, site, &[stub]);
            let (score, matched_ions) = self.match_ions(child, ions.into_iter());
            if !matched_ions.is_empty() {
                matches.push(ChildScanMatch {
                    child_index,
                    score,
                    matched_ions,
                });
            }
        }
        matches
    }

    /// Localize a self-loop: both reagent arms on one peptide. Sites are
    /// selected pairwise (`p1 < p2`); fragments cleaving inside the loop
    /// span are not observable and are excluded.
    pub fn localize_loop(
        &self,
        peptide: &CandidatePeptide,
        scan: &Scan,
        sites: &[usize],
    ) -> Option<Localization> {
        let loop_mass = self.crosslinker.loop_mass;
        let kinds = scan.dissociation.ion_kinds();

        let mut best: Option<Localization> = None;
        for (i, &p1) in sites.iter().enumerate() {
            for &p2 in &sites[i + 1..] {
                let mut ions = Vec::new();
                for kind in kinds {
                    if kind.n_terminal() {
                        // Fragments ending before the loop, then fragments
                        // containing the entire span
                        ions.extend(
                            IonSeries::new(peptide, *kind).filter(|ion| ion.position < p1),
                        );
                        ions.extend(
                            IonSeries::localized(peptide, *kind, p1, loop_mass)
                                .filter(|ion| ion.position >= p2),
                        );
                    } else {
                        ions.extend(
                            IonSeries::new(peptide, *kind).filter(|ion| ion.position > p2),
                        );
                        ions.extend(
                            IonSeries::localized(peptide, *kind, p2, loop_mass)
                                .filter(|ion| ion.position <= p1),
                        );
                    }
                }
                let (score, matched_ions) = self.match_ions(scan, ions.into_iter());
                if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
                    best = Some(Localization {
                        sites: vec![p1, p2],
                        score,
                        matched_ions,
                        child_matches: Vec::new(),
                    });
                }
            }
        }
        best.filter(|b| b.score >= self.score_cutoff)
    }

    /// Remove matched ions from `from` whose observed m/z also appears in
    /// `keep`, and return the re-computed score. Shared ions are ambiguous
    /// between the two peptides of a cross match and must not be credited
    /// twice.
    pub fn remove_shared_ions(&self, scan: &Scan, keep: &Localization, from: &mut Localization) {
        let kept: FnvHashSet<u64> = keep
            .matched_ions
            .iter()
            .map(|ion| ion.observed_mass.to_bits())
            .collect();
        from.matched_ions
            .retain(|ion| !kept.contains(&ion.observed_mass.to_bits()));
        from.score = from
            .matched_ions
            .iter()
            .map(|ion| 1.0 + ion.intensity as f64 / scan.total_ion_current.max(1.0) as f64)
            .sum();
    }
}
