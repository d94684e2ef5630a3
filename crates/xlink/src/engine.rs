use crate::acceptor::PrecursorMassAcceptor;
use crate::crosslinker::{Crosslinker, Quench};
use crate::index::{binary_search_get_index, FragmentIndex, PeptideIx};
use crate::ion_series::IonSeries;
use crate::localize::{valid_link_sites, ChildScanMatch, MatchedIon, SiteLocalizer};
use crate::mass::{Tolerance, NEUTRON, STABILITY_EPS};
use crate::peptide::CandidatePeptide;
use crate::scoring::{IndexedScorer, ScoringTable};
use crate::spectrum::{DissociationType, Scan};
use crate::Error;
use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};

/// How a candidate peptide explains the observed precursor mass
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossType {
    /// Unmodified peptide, no reagent involved
    Single,
    /// One arm reacted, the other hydrolyzed
    DeadEndH2O,
    /// One arm reacted, the other quenched by ammonia
    DeadEndNH2,
    /// One arm reacted, the other quenched by Tris buffer
    DeadEndTris,
    /// Both arms on the same peptide
    Loop,
    /// Two peptides joined by the reagent
    Cross,
}

/// One peptide's contribution to a spectral match
#[derive(Clone, Debug, Serialize)]
pub struct PeptideMatch {
    pub peptide: PeptideIx,
    pub score: f64,
    /// 1-based link positions (empty for single peptides)
    pub link_sites: Vec<usize>,
    pub matched_ions: Vec<MatchedIon>,
    pub child_matches: Vec<ChildScanMatch>,
}

/// The best explanation found for one scan
#[derive(Clone, Debug, Serialize)]
pub struct SpectralMatch {
    pub scan_index: usize,
    pub scan_id: String,
    pub cross_type: CrossType,
    /// Higher-scoring peptide of a cross match, or the only peptide
    pub alpha: PeptideMatch,
    /// Partner peptide of a cross match
    pub beta: Option<PeptideMatch>,
    pub total_score: f64,
    /// Margin over the runner-up explanation for the same scan
    pub delta_score: f64,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SearchBuilder {
    crosslinker: Option<Crosslinker>,
    fragment_tol: Option<Tolerance>,
    precursor_ppm: Option<f64>,
    /// Monoisotopic peak selection error range, e.g. (-1, 3)
    isotope_errors: Option<(i8, i8)>,
    /// Table score at which a candidate enters the shortlist
    prelim_score_cutoff: Option<u8>,
    /// Minimum localized score for a reportable match
    score_cutoff: Option<f64>,
    /// Shortlist depth after ranking by table score
    top_n: Option<usize>,
    /// Minimum precursor mass excess over a candidate for it to be
    /// considered the alpha peptide of a cross match
    min_cross_mass_gap: Option<f64>,
    max_fragment_mass: Option<f64>,
    quench_h2o: Option<bool>,
    quench_nh2: Option<bool>,
    quench_tris: Option<bool>,
    /// Probe the complementary (precursor minus peak) fragment bin per peak
    complementary_ions: Option<bool>,
    /// Allow the link site on a C-terminal cleavage residue
    cleave_at_crosslink_site: Option<bool>,
    child_dissociation: Option<DissociationType>,
    workers: Option<usize>,
}

impl SearchBuilder {
    pub fn build(self) -> Result<SearchParameters, Error> {
        let precursor_ppm = self.precursor_ppm.unwrap_or(10.0);
        if precursor_ppm <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "precursor_ppm must be positive, got {}",
                precursor_ppm
            )));
        }
        let acceptor = match self.isotope_errors {
            Some((min, max)) if min != 0 || max != 0 => {
                if min > max {
                    return Err(Error::InvalidParameter(format!(
                        "isotope_errors min {} exceeds max {}",
                        min, max
                    )));
                }
                PrecursorMassAcceptor::NotchedPpm {
                    ppm: precursor_ppm,
                    offsets: (min..=max).map(|i| i as f64 * NEUTRON).collect(),
                }
            }
            _ => PrecursorMassAcceptor::Ppm(precursor_ppm),
        };

        let top_n = self.top_n.unwrap_or(300);
        if top_n == 0 {
            return Err(Error::InvalidParameter("top_n must be nonzero".into()));
        }
        let max_fragment_mass = self.max_fragment_mass.unwrap_or(2000.0);
        if !(max_fragment_mass > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "max_fragment_mass must be positive, got {}",
                max_fragment_mass
            )));
        }

        let params = SearchParameters {
            crosslinker: self.crosslinker.unwrap_or_else(Crosslinker::dss),
            fragment_tol: self.fragment_tol.unwrap_or(Tolerance::Ppm(-10.0, 10.0)),
            acceptor,
            prelim_score_cutoff: self.prelim_score_cutoff.unwrap_or(3).max(1),
            score_cutoff: self.score_cutoff.unwrap_or(5.0),
            top_n,
            min_cross_mass_gap: self.min_cross_mass_gap.unwrap_or(200.0),
            max_fragment_mass,
            quench_h2o: self.quench_h2o.unwrap_or(true),
            quench_nh2: self.quench_nh2.unwrap_or(false),
            quench_tris: self.quench_tris.unwrap_or(true),
            complementary_ions: self.complementary_ions.unwrap_or(false),
            cleave_at_crosslink_site: self.cleave_at_crosslink_site.unwrap_or(false),
            child_dissociation: self.child_dissociation.unwrap_or(DissociationType::Hcd),
            workers: self
                .workers
                .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
                .unwrap_or(1)
                .max(1),
        };
        params.crosslinker.validate()?;
        Ok(params)
    }
}

#[derive(Clone, Debug)]
pub struct SearchParameters {
    pub crosslinker: Crosslinker,
    pub fragment_tol: Tolerance,
    pub acceptor: PrecursorMassAcceptor,
    pub prelim_score_cutoff: u8,
    pub score_cutoff: f64,
    pub top_n: usize,
    pub min_cross_mass_gap: f64,
    pub max_fragment_mass: f64,
    pub quench_h2o: bool,
    pub quench_nh2: bool,
    pub quench_tris: bool,
    pub complementary_ions: bool,
    pub cleave_at_crosslink_site: bool,
    pub child_dissociation: DissociationType,
    pub workers: usize,
}

impl Default for SearchParameters {
    fn default() -> Self {
        SearchBuilder::default()
            .build()
            .expect("default parameters are valid")
    }
}

/// Per-lane mutable state, allocated once per worker and reset (not
/// reallocated) at the start of every scan
pub struct LaneScratch {
    pub table: ScoringTable,
    pub bins: Vec<usize>,
    pub shortlist: Vec<PeptideIx>,
    seen_pairs: FnvHashSet<(PeptideIx, PeptideIx)>,
}

impl LaneScratch {
    pub fn new(n_candidates: usize) -> Self {
        LaneScratch {
            table: ScoringTable::new(n_candidates),
            bins: Vec::new(),
            shortlist: Vec::new(),
            seen_pairs: FnvHashSet::default(),
        }
    }
}

/// Per-scan crosslink search over a read-only candidate universe and
/// fragment index. The engine itself is immutable after construction and
/// shared by reference across worker lanes; all per-scan mutation goes
/// through a lane-owned [`LaneScratch`].
pub struct CrosslinkSearchEngine<'db> {
    candidates: &'db [CandidatePeptide],
    index: &'db FragmentIndex,
    pub params: SearchParameters,
    scorer: IndexedScorer,
}

impl<'db> CrosslinkSearchEngine<'db> {
    pub fn new(
        candidates: &'db [CandidatePeptide],
        index: &'db FragmentIndex,
        params: SearchParameters,
    ) -> Result<Self, Error> {
        if candidates.is_empty() {
            return Err(Error::EmptyCandidates);
        }
        if candidates.len() != index.masses.len() {
            return Err(Error::InvalidParameter(format!(
                "index covers {} candidates but {} were supplied",
                index.masses.len(),
                candidates.len()
            )));
        }
        params.crosslinker.validate()?;
        let scorer = IndexedScorer {
            fragment_tol: params.fragment_tol,
            complementary_ions: params.complementary_ions,
            cutoff: params.prelim_score_cutoff,
        };
        Ok(CrosslinkSearchEngine {
            candidates,
            index,
            params,
            scorer,
        })
    }

    pub fn n_candidates(&self) -> usize {
        self.candidates.len()
    }

    fn localizer(&self) -> SiteLocalizer<'_> {
        SiteLocalizer {
            crosslinker: &self.params.crosslinker,
            fragment_tol: self.params.fragment_tol,
            precursor_acceptor: &self.params.acceptor,
            score_cutoff: self.params.score_cutoff,
            child_dissociation: self.params.child_dissociation,
        }
    }

    /// Search one scan. Deterministic for a fixed engine and scan: the
    /// shortlist ranking, pair enumeration, and best-match selection all
    /// break ties by candidate order, never by thread timing.
    pub fn search_scan(
        &self,
        scan: &Scan,
        scan_index: usize,
        scratch: &mut LaneScratch,
    ) -> Option<SpectralMatch> {
        scratch.seen_pairs.clear();
        // Any candidate light enough to be one side of a cross match can
        // contribute, so only the upper mass bound is enforced here
        let (_, mass_hi) = self
            .params
            .acceptor
            .theoretical_mass_bounds(scan.precursor_mass);
        self.scorer.score(
            scan,
            self.index,
            (f64::NEG_INFINITY, mass_hi),
            &mut scratch.table,
            &mut scratch.bins,
            &mut scratch.shortlist,
        );

        // Rank by table score, highest first; sort is stable so ties keep
        // ascending candidate (mass) order
        let LaneScratch {
            table, shortlist, ..
        } = &mut *scratch;
        shortlist.sort_by_key(|&ix| std::cmp::Reverse(table.get(ix)));
        shortlist.truncate(self.params.top_n);

        let localizer = self.localizer();
        let mut best: Option<SpectralMatch> = None;
        let mut runner_up = 0.0f64;
        for i in 0..scratch.shortlist.len() {
            let ix = scratch.shortlist[i];
            let candidate = self.classify(scan, scan_index, ix, &localizer, scratch);
            if let Some(candidate) = candidate {
                match &best {
                    Some(b) if candidate.total_score <= b.total_score => {
                        runner_up = runner_up.max(candidate.total_score);
                    }
                    _ => {
                        if let Some(b) = &best {
                            runner_up = runner_up.max(b.total_score);
                        }
                        best = Some(candidate);
                    }
                }
            }
        }

        if let Some(b) = &mut best {
            b.delta_score = b.total_score - runner_up;
        }
        best
    }

    /// Decide what a shortlisted candidate could be for this precursor and
    /// localize it. The branches are mutually exclusive and checked in
    /// priority order; a candidate explains the precursor in at most one
    /// way.
    fn classify(
        &self,
        scan: &Scan,
        scan_index: usize,
        ix: PeptideIx,
        localizer: &SiteLocalizer<'_>,
        scratch: &mut LaneScratch,
    ) -> Option<SpectralMatch> {
        let peptide = &self.candidates[ix.0 as usize];
        let mass = peptide.monoisotopic;
        let acceptor = &self.params.acceptor;
        let xl = &self.params.crosslinker;

        if acceptor.accepts(scan.precursor_mass, mass).is_some() {
            self.single(scan, scan_index, ix, localizer)
        } else if self.params.quench_tris
            && acceptor
                .accepts(scan.precursor_mass, mass + xl.deadend_mass_tris)
                .is_some()
        {
            self.deadend(scan, scan_index, ix, localizer, Quench::Tris)
        } else if self.params.quench_h2o
            && acceptor
                .accepts(scan.precursor_mass, mass + xl.deadend_mass_h2o)
                .is_some()
        {
            self.deadend(scan, scan_index, ix, localizer, Quench::H2O)
        } else if self.params.quench_nh2
            && acceptor
                .accepts(scan.precursor_mass, mass + xl.deadend_mass_nh2)
                .is_some()
        {
            self.deadend(scan, scan_index, ix, localizer, Quench::NH2)
        } else if xl.loop_mass != 0.0
            && acceptor
                .accepts(scan.precursor_mass, mass + xl.loop_mass)
                .is_some()
        {
            self.self_loop(scan, scan_index, ix, localizer)
        } else if scan.precursor_mass - mass >= self.params.min_cross_mass_gap {
            self.cross(scan, scan_index, ix, localizer, scratch)
        } else {
            None
        }
    }

    fn single(
        &self,
        scan: &Scan,
        scan_index: usize,
        ix: PeptideIx,
        localizer: &SiteLocalizer<'_>,
    ) -> Option<SpectralMatch> {
        let peptide = &self.candidates[ix.0 as usize];
        let ions = scan
            .dissociation
            .ion_kinds()
            .iter()
            .flat_map(|kind| IonSeries::new(peptide, *kind));
        let (score, matched_ions) = localizer.match_ions(scan, ions);
        if score < self.params.score_cutoff {
            return None;
        }
        Some(SpectralMatch {
            scan_index,
            scan_id: scan.id.clone(),
            cross_type: CrossType::Single,
            alpha: PeptideMatch {
                peptide: ix,
                score,
                link_sites: Vec::new(),
                matched_ions,
                child_matches: Vec::new(),
            },
            beta: None,
            total_score: score,
            delta_score: 0.0,
        })
    }

    fn deadend(
        &self,
        scan: &Scan,
        scan_index: usize,
        ix: PeptideIx,
        localizer: &SiteLocalizer<'_>,
        quench: Quench,
    ) -> Option<SpectralMatch> {
        let peptide = &self.candidates[ix.0 as usize];
        let sites = valid_link_sites(
            peptide,
            &self.params.crosslinker.all_sites(),
            self.params.cleave_at_crosslink_site,
        );
        if sites.is_empty() {
            return None;
        }
        let deadend_mass = self.params.crosslinker.deadend_mass(quench);
        let localization = localizer.localize_mass(peptide, scan, &sites, deadend_mass)?;
        let cross_type = match quench {
            Quench::H2O => CrossType::DeadEndH2O,
            Quench::NH2 => CrossType::DeadEndNH2,
            Quench::Tris => CrossType::DeadEndTris,
        };
        Some(SpectralMatch {
            scan_index,
            scan_id: scan.id.clone(),
            cross_type,
            total_score: localization.score,
            alpha: PeptideMatch {
                peptide: ix,
                score: localization.score,
                link_sites: localization.sites,
                matched_ions: localization.matched_ions,
                child_matches: localization.child_matches,
            },
            beta: None,
            delta_score: 0.0,
        })
    }

    fn self_loop(
        &self,
        scan: &Scan,
        scan_index: usize,
        ix: PeptideIx,
        localizer: &SiteLocalizer<'_>,
    ) -> Option<SpectralMatch> {
        let peptide = &self.candidates[ix.0 as usize];
        let sites = valid_link_sites(
            peptide,
            &self.params.crosslinker.all_sites(),
            self.params.cleave_at_crosslink_site,
        );
        // A loop needs two distinct attachment points
        if sites.len() < 2 {
            return None;
        }
        let localization = localizer.localize_loop(peptide, scan, &sites)?;
        Some(SpectralMatch {
            scan_index,
            scan_id: scan.id.clone(),
            cross_type: CrossType::Loop,
            total_score: localization.score,
            alpha: PeptideMatch {
                peptide: ix,
                score: localization.score,
                link_sites: localization.sites,
                matched_ions: localization.matched_ions,
                child_matches: localization.child_matches,
            },
            beta: None,
            delta_score: 0.0,
        })
    }

    /// Attachment sites for a cross pair under every arm assignment that
    /// leaves both peptides with at least one site. Asymmetric reagents get
    /// both orientations; the site lists stay sorted and deduplicated.
    fn cross_sites(
        &self,
        alpha: &CandidatePeptide,
        beta: &CandidatePeptide,
    ) -> Option<(Vec<usize>, Vec<usize>)> {
        let xl = &self.params.crosslinker;
        let cleave = self.params.cleave_at_crosslink_site;
        let mut arms: Vec<(&[u8], &[u8])> =
            vec![(xl.first_sites.as_slice(), xl.second_sites.as_slice())];
        if !xl.symmetric() {
            arms.push((xl.second_sites.as_slice(), xl.first_sites.as_slice()));
        }

        let mut alpha_sites = Vec::new();
        let mut beta_sites = Vec::new();
        for (alpha_arm, beta_arm) in arms {
            let a = valid_link_sites(alpha, alpha_arm, cleave);
            let b = valid_link_sites(beta, beta_arm, cleave);
            if !a.is_empty() && !b.is_empty() {
                alpha_sites.extend(a);
                beta_sites.extend(b);
            }
        }
        alpha_sites.sort_unstable();
        alpha_sites.dedup();
        beta_sites.sort_unstable();
        beta_sites.dedup();
        (!alpha_sites.is_empty() && !beta_sites.is_empty()).then_some((alpha_sites, beta_sites))
    }

    fn cross(
        &self,
        scan: &Scan,
        scan_index: usize,
        alpha_ix: PeptideIx,
        localizer: &SiteLocalizer<'_>,
        scratch: &mut LaneScratch,
    ) -> Option<SpectralMatch> {
        let xl = &self.params.crosslinker;
        let alpha = &self.candidates[alpha_ix.0 as usize];
        let pair_mass = alpha.monoisotopic + xl.total_mass;

        // Partner masses whose full pair mass could be accepted, across all
        // notches. The acceptance window must be taken at the full-mass
        // scale: a ppm half-width at the partner's own (smaller) mass would
        // clip valid partners near the tolerance edge.
        let (full_lo, full_hi) = self
            .params
            .acceptor
            .theoretical_mass_bounds(scan.precursor_mass);
        let (mass_lo, mass_hi) = (full_lo - pair_mass, full_hi - pair_mass);
        let lo = match mass_lo.is_finite() {
            true => binary_search_get_index(&self.index.masses, mass_lo),
            false => 0,
        };
        let hi = match mass_hi.is_finite() {
            true => self
                .index
                .masses
                .partition_point(|&m| m <= mass_hi + STABILITY_EPS),
            false => self.index.masses.len(),
        };

        let mut best: Option<SpectralMatch> = None;
        for beta_id in lo..hi {
            let beta_ix = PeptideIx(beta_id as u32);
            // The partner needs fragment evidence of its own
            if scratch.table.get(beta_ix) < self.params.prelim_score_cutoff {
                continue;
            }
            let beta = &self.candidates[beta_id];
            if self
                .params
                .acceptor
                .accepts(
                    scan.precursor_mass,
                    alpha.monoisotopic + xl.total_mass + beta.monoisotopic,
                )
                .is_none()
            {
                continue;
            }

            // Each unordered pair is evaluated once per scan, regardless of
            // which side reached the shortlist first
            let pair = match alpha_ix <= beta_ix {
                true => (alpha_ix, beta_ix),
                false => (beta_ix, alpha_ix),
            };
            if !scratch.seen_pairs.insert(pair) {
                continue;
            }

            let (alpha_sites, beta_sites) = match self.cross_sites(alpha, beta) {
                Some(sites) => sites,
                None => continue,
            };

            let alpha_loc = localizer.localize_mass(
                alpha,
                scan,
                &alpha_sites,
                xl.total_mass + beta.monoisotopic,
            );
            let beta_loc = localizer.localize_mass(
                beta,
                scan,
                &beta_sites,
                xl.total_mass + alpha.monoisotopic,
            );
            let (mut first, mut second) = match (alpha_loc, beta_loc) {
                (Some(a), Some(b)) => (a, b),
                _ => continue,
            };

            // Peaks claimed by both peptides are credited only to the
            // higher-scoring side; the alpha/beta roles follow the scores
            // after this deduplication
            let mut roles = (alpha_ix, beta_ix);
            if second.score > first.score {
                std::mem::swap(&mut first, &mut second);
                roles = (beta_ix, alpha_ix);
            }
            localizer.remove_shared_ions(scan, &first, &mut second);
            if second.score > first.score {
                std::mem::swap(&mut first, &mut second);
                roles = (roles.1, roles.0);
            }

            let total_score = first.score + second.score;
            if best
                .as_ref()
                .map(|b| total_score > b.total_score)
                .unwrap_or(true)
            {
                best = Some(SpectralMatch {
                    scan_index,
                    scan_id: scan.id.clone(),
                    cross_type: CrossType::Cross,
                    total_score,
                    alpha: PeptideMatch {
                        peptide: roles.0,
                        score: first.score,
                        link_sites: first.sites,
                        matched_ions: first.matched_ions,
                        child_matches: first.child_matches,
                    },
                    beta: Some(PeptideMatch {
                        peptide: roles.1,
                        score: second.score,
                        link_sites: second.sites,
                        matched_ions: second.matched_ions,
                        child_matches: second.child_matches,
                    }),
                    delta_score: 0.0,
                });
            }
        }
        best
    }
}
