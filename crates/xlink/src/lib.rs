pub mod acceptor;
pub mod crosslinker;
pub mod engine;
pub mod index;
pub mod ion_series;
pub mod localize;
pub mod mass;
pub mod peptide;
pub mod runner;
pub mod scoring;
pub mod spectrum;

/// Errors raised while assembling a search. These are all configuration
/// problems surfaced before any scan is processed - per-scan no-match
/// conditions are represented as empty result slots, never as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The candidate universe is empty
    EmptyCandidates,
    /// The candidate array must be sorted ascending by monoisotopic mass
    UnsortedCandidateMasses { index: usize },
    /// A peptide sequence contained a character that is not an amino acid
    InvalidResidue(char),
    /// The crosslinker configuration is chemically inconsistent
    InvalidCrosslinker(String),
    /// A search parameter is out of range
    InvalidParameter(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::EmptyCandidates => f.write_str("candidate universe is empty"),
            Error::UnsortedCandidateMasses { index } => write!(
                f,
                "candidate mass table is not sorted ascending (at index {})",
                index
            ),
            Error::InvalidResidue(c) => write!(f, "invalid amino acid residue: {}", c),
            Error::InvalidCrosslinker(s) => write!(f, "invalid crosslinker: {}", s),
            Error::InvalidParameter(s) => write!(f, "invalid parameter: {}", s),
        }
    }
}

impl std::error::Error for Error {}
