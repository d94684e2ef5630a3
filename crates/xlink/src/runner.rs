use crate::engine::{CrosslinkSearchEngine, LaneScratch, SpectralMatch};
use crate::spectrum::Scan;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Search every scan across worker lanes. Lane `l` owns scans `l`,
/// `l + workers`, `l + 2 * workers`, ... and a single [`LaneScratch`] reused
/// for all of them. Results land at the scan's own position, so the output
/// is byte-for-byte identical for any worker count.
///
/// `cancel` is checked cooperatively before every scan; scans not yet
/// searched when it flips are left as `None`. `progress` is invoked with
/// strictly increasing whole percentages and a phase label.
pub fn run_search(
    engine: &CrosslinkSearchEngine<'_>,
    scans: &[Scan],
    cancel: &AtomicBool,
    progress: Option<&(dyn Fn(usize, &str) + Sync)>,
) -> Vec<Option<SpectralMatch>> {
    let n = scans.len();
    if n == 0 {
        return Vec::new();
    }
    let workers = engine.params.workers.min(n).max(1);
    log::trace!("searching {} scans across {} lanes", n, workers);

    let searched = AtomicUsize::new(0);
    let last_percent = Mutex::new(0usize);

    let lanes = std::thread::scope(|s| {
        let handles = (0..workers)
            .map(|lane| {
                let searched = &searched;
                let last_percent = &last_percent;
                s.spawn(move || {
                    let mut scratch = LaneScratch::new(engine.n_candidates());
                    let mut out = Vec::new();
                    let mut i = lane;
                    while i < n {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        out.push((i, engine.search_scan(&scans[i], i, &mut scratch)));

                        let done = searched.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(report) = progress {
                            let percent = done * 100 / n;
                            let mut last = last_percent.lock().expect("progress lock");
                            if percent > *last {
                                *last = percent;
                                report(percent, "crosslink search");
                            }
                        }
                        i += workers;
                    }
                    out
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("search worker panicked"))
            .collect::<Vec<_>>()
    });

    let mut results = vec![None; n];
    for lane in lanes {
        for (i, result) in lane {
            results[i] = result;
        }
    }
    log::trace!(
        "searched {} of {} scans",
        searched.load(Ordering::Relaxed),
        n
    );
    results
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::{CrossType, SearchParameters};
    use crate::index::FragmentIndex;
    use crate::ion_series::{IonSeries, Kind};
    use crate::peptide::CandidatePeptide;
    use crate::spectrum::{DissociationType, Peak};

    fn universe(sequences: &[&str]) -> Vec<CandidatePeptide> {
        let mut c = sequences
            .iter()
            .map(|s| CandidatePeptide::new(s).unwrap())
            .collect::<Vec<_>>();
        c.sort_by(|a, b| a.monoisotopic.total_cmp(&b.monoisotopic));
        c
    }

    fn scan_for(peptide: &CandidatePeptide, id: &str) -> Scan {
        let peaks = IonSeries::new(peptide, Kind::B)
            .chain(IonSeries::new(peptide, Kind::Y))
            .map(|ion| Peak {
                mass: ion.monoisotopic_mass,
                intensity: 10.0,
            })
            .collect();
        Scan::new(id, peptide.monoisotopic, 2, peaks, DissociationType::Hcd)
    }

    fn fixture() -> (Vec<CandidatePeptide>, Vec<Scan>) {
        let candidates = universe(&["LAKER", "PEPTIDEK", "AKAPEPTKLR", "TIDEKLAR"]);
        let scans = (0..7)
            .map(|i| {
                let peptide = &candidates[i % candidates.len()];
                scan_for(peptide, &format!("scan={}", i))
            })
            .collect();
        (candidates, scans)
    }

    fn params() -> SearchParameters {
        let mut p = SearchParameters::default();
        p.prelim_score_cutoff = 2;
        p.score_cutoff = 2.0;
        p
    }

    #[test]
    fn identical_results_for_any_worker_count() {
        let (candidates, scans) = fixture();
        let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();

        let mut baseline = None;
        for workers in [1, 2, 5] {
            let mut p = params();
            p.workers = workers;
            let engine = CrosslinkSearchEngine::new(&candidates, &index, p).unwrap();
            let results = run_search(&engine, &scans, &AtomicBool::new(false), None);
            let summary: Vec<_> = results
                .iter()
                .map(|r| {
                    r.as_ref()
                        .map(|m| (m.scan_id.clone(), m.alpha.peptide, m.total_score))
                })
                .collect();
            match &baseline {
                None => baseline = Some(summary),
                Some(b) => assert_eq!(b, &summary, "{} workers diverged", workers),
            }
        }
    }

    #[test]
    fn every_scan_identified() {
        let (candidates, scans) = fixture();
        let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
        let engine = CrosslinkSearchEngine::new(&candidates, &index, params()).unwrap();

        let results = run_search(&engine, &scans, &AtomicBool::new(false), None);
        assert_eq!(results.len(), scans.len());
        for (i, result) in results.iter().enumerate() {
            let m = result.as_ref().expect("scan should match");
            assert_eq!(m.scan_index, i);
            assert_eq!(m.cross_type, CrossType::Single);
        }
    }

    #[test]
    fn cancellation_leaves_unsearched_scans_empty() {
        let (candidates, scans) = fixture();
        let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
        let engine = CrosslinkSearchEngine::new(&candidates, &index, params()).unwrap();

        let cancel = AtomicBool::new(true);
        let results = run_search(&engine, &scans, &cancel, None);
        assert_eq!(results.len(), scans.len());
        assert!(results.iter().all(Option::is_none));
    }

    #[test]
    fn progress_is_monotone_and_complete() {
        let (candidates, scans) = fixture();
        let index = FragmentIndex::build(&candidates, DissociationType::Hcd, 2000.0).unwrap();
        let mut p = params();
        p.workers = 3;
        let engine = CrosslinkSearchEngine::new(&candidates, &index, p).unwrap();

        let reported = Mutex::new(Vec::new());
        let callback = |percent: usize, message: &str| {
            assert!(!message.is_empty());
            reported.lock().unwrap().push(percent);
        };
        run_search(&engine, &scans, &AtomicBool::new(false), Some(&callback));

        let reported = reported.into_inner().unwrap();
        assert!(!reported.is_empty());
        assert!(reported.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*reported.last().unwrap(), 100);
    }
}
