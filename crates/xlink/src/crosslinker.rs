use crate::spectrum::DissociationType;
use crate::Error;
use serde::{Deserialize, Serialize};

/// A crosslinking reagent. Immutable configuration, shared read-only across
/// worker lanes. The two reactive arms may target different residue sets
/// (asymmetric reagents); `b'X'` acts as a wildcard matching any residue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Crosslinker {
    pub name: String,
    /// Residues reactive with the first arm
    pub first_sites: Vec<u8>,
    /// Residues reactive with the second arm
    pub second_sites: Vec<u8>,
    /// Combined mass added when both arms react (two peptides, or both ends
    /// of a loop)
    pub total_mass: f64,
    /// Reagent fragments in the mass spectrometer, leaving short/long stubs
    pub cleavable: bool,
    pub cleave_mass_short: f64,
    pub cleave_mass_long: f64,
    /// Activation methods able to cleave the reagent
    pub cleave_dissociation_types: Vec<DissociationType>,
    /// Mass added by a self-loop (both arms on one peptide)
    pub loop_mass: f64,
    /// Deadend masses: one arm reacted, the other quenched
    pub deadend_mass_h2o: f64,
    pub deadend_mass_nh2: f64,
    pub deadend_mass_tris: f64,
}

impl Crosslinker {
    /// DSS / BS3: non-cleavable, amine-reactive on both arms
    pub fn dss() -> Self {
        Crosslinker {
            name: "DSS".into(),
            first_sites: vec![b'K'],
            second_sites: vec![b'K'],
            total_mass: 138.06808,
            cleavable: false,
            cleave_mass_short: 0.0,
            cleave_mass_long: 0.0,
            cleave_dissociation_types: Vec::new(),
            loop_mass: 138.06808,
            deadend_mass_h2o: 156.07864,
            deadend_mass_nh2: 155.09463,
            deadend_mass_tris: 259.14191,
        }
    }

    /// DSSO: MS-cleavable, amine-reactive on both arms
    pub fn dsso() -> Self {
        Crosslinker {
            name: "DSSO".into(),
            first_sites: vec![b'K'],
            second_sites: vec![b'K'],
            total_mass: 158.0038,
            cleavable: true,
            cleave_mass_short: 54.01056,
            cleave_mass_long: 85.98264,
            cleave_dissociation_types: vec![
                DissociationType::Cid,
                DissociationType::Hcd,
                DissociationType::Ethcd,
            ],
            loop_mass: 158.0038,
            deadend_mass_h2o: 176.0143,
            deadend_mass_nh2: 175.0303,
            deadend_mass_tris: 279.0777,
        }
    }

    /// Both arms react with the same residue set
    pub fn symmetric(&self) -> bool {
        self.first_sites == self.second_sites
    }

    /// Union of both arms' reactive residues
    pub fn all_sites(&self) -> Vec<u8> {
        let mut sites = self.first_sites.clone();
        for &s in &self.second_sites {
            if !sites.contains(&s) {
                sites.push(s);
            }
        }
        sites
    }

    /// Will this activation method cleave the reagent?
    pub fn cleaves_under(&self, dissociation: DissociationType) -> bool {
        self.cleavable && self.cleave_dissociation_types.contains(&dissociation)
    }

    pub fn deadend_mass(&self, quench: Quench) -> f64 {
        match quench {
            Quench::H2O => self.deadend_mass_h2o,
            Quench::NH2 => self.deadend_mass_nh2,
            Quench::Tris => self.deadend_mass_tris,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.first_sites.is_empty() || self.second_sites.is_empty() {
            return Err(Error::InvalidCrosslinker(
                "both arms need at least one reactive residue".into(),
            ));
        }
        if !self.total_mass.is_finite() || self.total_mass <= 0.0 {
            return Err(Error::InvalidCrosslinker(format!(
                "total mass must be positive, got {}",
                self.total_mass
            )));
        }
        if self.cleavable {
            if self.cleave_mass_short <= 0.0 || self.cleave_mass_long < self.cleave_mass_short {
                return Err(Error::InvalidCrosslinker(
                    "cleavable reagent requires 0 < short stub <= long stub".into(),
                ));
            }
            if self.cleave_dissociation_types.is_empty() {
                return Err(Error::InvalidCrosslinker(
                    "cleavable reagent requires at least one cleaving dissociation type".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Deadend quench chemistries
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Quench {
    H2O,
    NH2,
    Tris,
}
