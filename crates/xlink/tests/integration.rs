use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use xlink_core::crosslinker::Crosslinker;
use xlink_core::engine::{CrossType, CrosslinkSearchEngine, LaneScratch, SearchParameters};
use xlink_core::index::{FragmentIndex, PeptideIx};
use xlink_core::ion_series::{Ion, IonSeries, Kind};
use xlink_core::mass::NEUTRON;
use xlink_core::peptide::CandidatePeptide;
use xlink_core::runner::run_search;
use xlink_core::spectrum::{DissociationType, Peak, Scan};

fn universe(sequences: &[&str]) -> Vec<CandidatePeptide> {
    let mut c = sequences
        .iter()
        .map(|s| CandidatePeptide::new(s).unwrap())
        .collect::<Vec<_>>();
    c.sort_by(|a, b| a.monoisotopic.total_cmp(&b.monoisotopic));
    c
}

fn find(candidates: &[CandidatePeptide], sequence: &str) -> usize {
    candidates
        .iter()
        .position(|p| p.sequence == sequence)
        .unwrap()
}

fn scan_from_ions(id: &str, ions: &[Ion], precursor_mass: f64) -> Scan {
    let peaks = ions
        .iter()
        .map(|ion| Peak {
            mass: ion.monoisotopic_mass,
            intensity: 10.0,
        })
        .collect();
    Scan::new(id, precursor_mass, 3, peaks, DissociationType::Hcd)
}

fn plain_ions(peptide: &CandidatePeptide) -> Vec<Ion> {
    IonSeries::new(peptide, Kind::B)
        .chain(IonSeries::new(peptide, Kind::Y))
        .collect()
}

fn localized_ions(peptide: &CandidatePeptide, site: usize, mass: f64) -> Vec<Ion> {
    IonSeries::localized(peptide, Kind::B, site, mass)
        .chain(IonSeries::localized(peptide, Kind::Y, site, mass))
        .collect()
}

fn params(crosslinker: Crosslinker) -> SearchParameters {
    let mut p = SearchParameters::default();
    p.crosslinker = crosslinker;
    p.prelim_score_cutoff = 2;
    p.score_cutoff = 2.0;
    p
}

/// A workload exercising every match class against one universe
fn mixed_workload() -> (Vec<CandidatePeptide>, Vec<Scan>) {
    let candidates = universe(&[
        "LAKER",
        "PEPTIDEK",
        "AKAPEPTKLR",
        "TIDEKLAR",
        "AKPEKTIDKR",
        "EKFLPSDVR",
    ]);
    let xl = Crosslinker::dss();

    let single = &candidates[find(&candidates, "PEPTIDEK")];
    let deadend = &candidates[find(&candidates, "AKAPEPTKLR")];
    let looped = &candidates[find(&candidates, "AKPEKTIDKR")];
    let alpha = &candidates[find(&candidates, "AKAPEPTKLR")];
    let beta = &candidates[find(&candidates, "TIDEKLAR")];

    let mut scans = vec![scan_from_ions(
        "scan=0",
        &plain_ions(single),
        single.monoisotopic,
    )];

    scans.push(scan_from_ions(
        "scan=1",
        &localized_ions(deadend, 2, xl.deadend_mass_h2o),
        deadend.monoisotopic + xl.deadend_mass_h2o,
    ));

    let (p1, p2) = (2, 5);
    let mut loop_ions: Vec<Ion> = IonSeries::new(looped, Kind::B)
        .filter(|i| i.position < p1)
        .collect();
    loop_ions.extend(
        IonSeries::localized(looped, Kind::B, p1, xl.loop_mass).filter(|i| i.position >= p2),
    );
    loop_ions.extend(IonSeries::new(looped, Kind::Y).filter(|i| i.position > p2));
    loop_ions.extend(
        IonSeries::localized(looped, Kind::Y, p2, xl.loop_mass).filter(|i| i.position <= p1),
    );
    scans.push(scan_from_ions(
        "scan=2",
        &loop_ions,
        looped.monoisotopic + xl.loop_mass,
    ));

    let mut cross_ions = localized_ions(alpha, 2, xl.total_mass + beta.monoisotopic);
    cross_ions.extend(localized_ions(beta, 5, xl.total_mass + alpha.monoisotopic));
    scans.push(scan_from_ions(
        "scan=3",
        &cross_ions,
        alpha.monoisotopic + beta.monoisotopic + xl.total_mass,
    ));

    // A scan nothing should explain
    scans.push(Scan::new(
        "scan=4",
        4321.0,
        2,
        vec![Peak {
            mass: 42.0,
            intensity: 1.0,
        }],
        DissociationType::Hcd,
    ));

    (candidates, scans)
}

#[test]
fn mixed_workload_classification() {
    let (candidates, scans) = mixed_workload();
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
    let engine =
        CrosslinkSearchEngine::new(&candidates, &index, params(Crosslinker::dss())).unwrap();

    let results = run_search(&engine, &scans, &AtomicBool::new(false), None);
    assert_eq!(results.len(), 5);

    let types: Vec<_> = results
        .iter()
        .map(|r| r.as_ref().map(|m| m.cross_type))
        .collect();
    assert_eq!(
        types,
        vec![
            Some(CrossType::Single),
            Some(CrossType::DeadEndH2O),
            Some(CrossType::Loop),
            Some(CrossType::Cross),
            None,
        ]
    );

    // Deadend and loop matches localize to the planted sites
    assert_eq!(results[1].as_ref().unwrap().alpha.link_sites, vec![2]);
    assert_eq!(results[2].as_ref().unwrap().alpha.link_sites, vec![2, 5]);
}

#[test]
fn results_identical_for_any_worker_count() {
    let (candidates, scans) = mixed_workload();
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();

    let mut baseline: Option<Vec<String>> = None;
    for workers in [1, 2, 3, 8] {
        let mut p = params(Crosslinker::dss());
        p.workers = workers;
        let engine = CrosslinkSearchEngine::new(&candidates, &index, p).unwrap();
        let results = run_search(&engine, &scans, &AtomicBool::new(false), None);

        // Full debug render: cross type, peptides, sites, scores, ions
        let summary: Vec<String> = results.iter().map(|r| format!("{:?}", r)).collect();
        match &baseline {
            None => baseline = Some(summary),
            Some(b) => assert_eq!(b, &summary, "{} workers diverged", workers),
        }
    }
}

#[test]
fn cross_match_scores_decompose() {
    let candidates = universe(&["AKAPEPTKLR", "TIDEKLAR", "EKFLPSDVR"]);
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
    let engine =
        CrosslinkSearchEngine::new(&candidates, &index, params(Crosslinker::dss())).unwrap();

    let a = find(&candidates, "AKAPEPTKLR");
    let b = find(&candidates, "TIDEKLAR");
    let xl_mass = engine.params.crosslinker.total_mass;
    let mut ions = localized_ions(&candidates[a], 2, xl_mass + candidates[b].monoisotopic);
    ions.extend(localized_ions(
        &candidates[b],
        5,
        xl_mass + candidates[a].monoisotopic,
    ));
    let scan = scan_from_ions(
        "scan=1",
        &ions,
        candidates[a].monoisotopic + candidates[b].monoisotopic + xl_mass,
    );

    let mut scratch = LaneScratch::new(candidates.len());
    let result = engine.search_scan(&scan, 0, &mut scratch).unwrap();
    assert_eq!(result.cross_type, CrossType::Cross);

    let beta = result.beta.as_ref().unwrap();
    assert!(result.alpha.score >= beta.score);
    assert!((result.total_score - result.alpha.score - beta.score).abs() < 1e-9);
    assert_eq!(result.alpha.link_sites.len(), 1);
    assert_eq!(beta.link_sites.len(), 1);

    let pair = [result.alpha.peptide, beta.peptide];
    assert!(pair.contains(&PeptideIx(a as u32)));
    assert!(pair.contains(&PeptideIx(b as u32)));

    // No matched peak is credited to both sides
    for ion in &result.alpha.matched_ions {
        assert!(!beta
            .matched_ions
            .iter()
            .any(|other| other.observed_mass == ion.observed_mass));
    }
}

#[test]
fn deadend_takes_priority_when_masses_coincide() {
    // Precursor = peptide + H2O deadend; even though a cross explanation
    // with some lighter partner might fit loosely, the deadend hypothesis
    // is checked first and wins outright
    let candidates = universe(&["AKAPEPTKLR", "LAKER", "PEPTIDEK"]);
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
    let engine =
        CrosslinkSearchEngine::new(&candidates, &index, params(Crosslinker::dss())).unwrap();

    let target = find(&candidates, "AKAPEPTKLR");
    let deadend = engine.params.crosslinker.deadend_mass_h2o;
    let scan = scan_from_ions(
        "scan=1",
        &localized_ions(&candidates[target], 8, deadend),
        candidates[target].monoisotopic + deadend,
    );

    let mut scratch = LaneScratch::new(candidates.len());
    let result = engine.search_scan(&scan, 0, &mut scratch).unwrap();
    assert_eq!(result.cross_type, CrossType::DeadEndH2O);
    assert_eq!(result.alpha.peptide, PeptideIx(target as u32));
    assert_eq!(result.alpha.link_sites, vec![8]);
}

#[test]
fn cleavable_cross_search_with_stub_fragments() {
    let candidates = universe(&["AKAPEPTKLR", "TIDEKLAR", "EKFLPSDVR"]);
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
    let xl = Crosslinker::dsso();
    let engine = CrosslinkSearchEngine::new(&candidates, &index, params(xl.clone())).unwrap();

    let a = find(&candidates, "AKAPEPTKLR");
    let b = find(&candidates, "TIDEKLAR");

    // HCD cleaves DSSO: the observable fragments carry stub masses, and
    // each intact peptide plus a stub shows up as a signature ion
    let mut ions = localized_ions(&candidates[a], 2, xl.cleave_mass_short);
    ions.extend(localized_ions(&candidates[b], 5, xl.cleave_mass_long));
    ions.push(Ion {
        kind: Kind::M,
        monoisotopic_mass: candidates[a].monoisotopic + xl.cleave_mass_short,
        position: candidates[a].len(),
    });
    ions.push(Ion {
        kind: Kind::M,
        monoisotopic_mass: candidates[b].monoisotopic + xl.cleave_mass_long,
        position: candidates[b].len(),
    });
    let scan = scan_from_ions(
        "scan=1",
        &ions,
        candidates[a].monoisotopic + candidates[b].monoisotopic + xl.total_mass,
    );

    let mut scratch = LaneScratch::new(candidates.len());
    let result = engine.search_scan(&scan, 0, &mut scratch).unwrap();
    assert_eq!(result.cross_type, CrossType::Cross);
    assert_eq!(result.alpha.link_sites.len(), 1);

    // The signature ions were matched on at least one side
    let has_signature = result
        .alpha
        .matched_ions
        .iter()
        .chain(result.beta.as_ref().unwrap().matched_ions.iter())
        .any(|ion| ion.kind == Kind::M);
    assert!(has_signature);
}

#[test]
fn isotope_error_notches_rescue_offset_precursors() {
    let candidates = universe(&["LAKER", "PEPTIDEK"]);
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();

    let mut p = params(Crosslinker::dss());
    p.acceptor = xlink_core::acceptor::PrecursorMassAcceptor::NotchedPpm {
        ppm: 10.0,
        offsets: vec![-NEUTRON, 0.0, NEUTRON, 2.0 * NEUTRON],
    };
    let engine = CrosslinkSearchEngine::new(&candidates, &index, p).unwrap();

    let target = find(&candidates, "PEPTIDEK");
    // Monoisotopic peak picked one isotope high
    let scan = scan_from_ions(
        "scan=1",
        &plain_ions(&candidates[target]),
        candidates[target].monoisotopic + NEUTRON,
    );

    let mut scratch = LaneScratch::new(candidates.len());
    let result = engine.search_scan(&scan, 0, &mut scratch).unwrap();
    assert_eq!(result.cross_type, CrossType::Single);
    assert_eq!(result.alpha.peptide, PeptideIx(target as u32));
}

#[test]
fn scratch_reuse_does_not_leak_between_scans() {
    let (candidates, scans) = mixed_workload();
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
    let engine =
        CrosslinkSearchEngine::new(&candidates, &index, params(Crosslinker::dss())).unwrap();

    // One scratch across all scans vs a fresh scratch per scan
    let mut shared = LaneScratch::new(candidates.len());
    for (i, scan) in scans.iter().enumerate() {
        let reused = engine.search_scan(scan, i, &mut shared);
        let mut fresh = LaneScratch::new(candidates.len());
        let isolated = engine.search_scan(scan, i, &mut fresh);
        assert_eq!(format!("{:?}", reused), format!("{:?}", isolated));
    }
}

#[test]
fn cancellation_mid_run() {
    let (candidates, scans) = mixed_workload();
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
    let mut p = params(Crosslinker::dss());
    p.workers = 1;
    let engine = CrosslinkSearchEngine::new(&candidates, &index, p).unwrap();

    let cancel = AtomicBool::new(false);
    let progress = |_percent: usize, _message: &str| {
        cancel.store(true, Ordering::Relaxed);
    };
    let results = run_search(&engine, &scans, &cancel, Some(&progress));

    assert_eq!(results.len(), scans.len());
    // The first scan completes before the flag is seen; later ones are
    // abandoned
    assert!(results[0].is_some());
    assert!(results.iter().skip(1).all(Option::is_none));
}

#[test]
fn progress_reports_are_monotone() {
    let (candidates, scans) = mixed_workload();
    let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
    let mut p = params(Crosslinker::dss());
    p.workers = 4;
    let engine = CrosslinkSearchEngine::new(&candidates, &index, p).unwrap();

    let reported = Mutex::new(Vec::new());
    let progress = |percent: usize, _message: &str| reported.lock().unwrap().push(percent);
    run_search(&engine, &scans, &AtomicBool::new(false), Some(&progress));

    let reported = reported.into_inner().unwrap();
    assert!(reported.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*reported.last().unwrap(), 100);
}
