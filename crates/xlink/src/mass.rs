use serde::{Deserialize, Serialize};
use std::ops::Mul;

pub const H2O: f64 = 18.010565;
pub const PROTON: f64 = 1.00727646;
pub const NEUTRON: f64 = 1.00335;
pub const NH3: f64 = 17.026549;

/// Numerical stability tolerance for exact-mass comparisons. Candidate mass
/// table lookups treat masses within this window as equal so that binary
/// search results do not depend on floating-point rounding.
pub const STABILITY_EPS: f64 = 1e-9;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f64, f64),
    Da(f64, f64),
}

impl Tolerance {
    /// Compute the (`lower`, `upper`) window (in Da) for a monoisotopic
    /// mass and a given tolerance
    pub fn bounds(&self, center: f64) -> (f64, f64) {
        match self {
            Tolerance::Ppm(lo, hi) => {
                let delta_lo = center * lo / 1_000_000.0;
                let delta_hi = center * hi / 1_000_000.0;
                (center + delta_lo, center + delta_hi)
            }
            Tolerance::Da(lo, hi) => (center + lo, center + hi),
        }
    }

    pub fn contains(&self, center: f64, rhs: f64) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }

    /// Widest absolute half-width of this tolerance at a given mass
    pub fn half_width(&self, center: f64) -> f64 {
        match self {
            Tolerance::Ppm(lo, hi) => center * lo.abs().max(hi.abs()) / 1_000_000.0,
            Tolerance::Da(lo, hi) => lo.abs().max(hi.abs()),
        }
    }

    pub fn ppm_to_delta_mass(center: f64, ppm: f64) -> f64 {
        ppm * center / 1_000_000.0
    }
}

impl Mul<f64> for Tolerance {
    type Output = Tolerance;

    fn mul(self, rhs: f64) -> Self::Output {
        match self {
            Tolerance::Ppm(lo, hi) => Tolerance::Ppm(lo * rhs, hi * rhs),
            Tolerance::Da(lo, hi) => Tolerance::Da(lo * rhs, hi * rhs),
        }
    }
}

pub trait Mass {
    fn monoisotopic(&self) -> f64;
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

impl Mass for u8 {
    fn monoisotopic(&self) -> f64 {
        match self {
            b'A' => 71.03711,
            b'R' => 156.10111,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.04049,
            b'F' => 147.06841,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Mass, Tolerance, VALID_AA};

    #[test]
    fn smoke() {
        for ch in VALID_AA {
            assert!(ch.monoisotopic() > 0.0);
        }
    }

    #[test]
    fn tolerances() {
        let (lo, hi) = Tolerance::Ppm(-10.0, 20.0).bounds(1000.0);
        assert!((lo - 999.99).abs() < 1e-9);
        assert!((hi - 1000.02).abs() < 1e-9);

        let (lo, hi) = Tolerance::Da(-0.5, 0.25).bounds(1000.0);
        assert!((lo - 999.5).abs() < 1e-9);
        assert!((hi - 1000.25).abs() < 1e-9);

        assert!(Tolerance::Ppm(-10.0, 10.0).contains(1000.0, 1000.0001));
        assert!(!Tolerance::Ppm(-10.0, 10.0).contains(1000.0, 1000.02));
    }

    #[test]
    fn half_width() {
        assert!((Tolerance::Ppm(-10.0, 10.0).half_width(1000.0) - 0.01).abs() < 1e-12);
        assert!((Tolerance::Da(-0.5, 0.25).half_width(1000.0) - 0.5).abs() < 1e-12);
    }
}
