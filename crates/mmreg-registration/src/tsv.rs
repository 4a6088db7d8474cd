//! Tab-separated record of a registration result.
//!
//! One row holds the volume centre, the top 3×4 block of Phi, the binning
//! level, the return status, the last `‖Δ‖` and the iteration count, all
//! written with seven decimals.

use serde::{Deserialize, Serialize};
use mmreg_core::{volume::centre_of, Phi};
use crate::engine::RegistrationResult;
use crate::error::{RegistrationError, Result};

/// Column names, tab separated.
pub const TSV_HEADER: &str = concat!(
    "Zpos\tYpos\tXpos\t",
    "Fzz\tFzy\tFzx\tZdisp\t",
    "Fyz\tFyy\tFyx\tYdisp\t",
    "Fxz\tFxy\tFxx\tXdisp\t",
    "bin\treturnStatus\tdeltaPhiNorm\titerations"
);

const FIELDS: usize = 19;

/// The 19 fields of one result row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhiRecord {
    /// Centre `(z, y, x)` of the registered volume.
    pub centre: [f64; 3],
    /// Top 3×4 block of Phi, row-major.
    pub phi: [f64; 12],
    /// Binning level the volumes were registered at.
    pub bin: usize,
    pub return_status: i32,
    pub delta_phi_norm: f64,
    pub iterations: usize,
}

impl PhiRecord {
    /// Record of `result` for volumes of `shape` registered at binning `bin`.
    pub fn from_result(result: &RegistrationResult, shape: [usize; 3], bin: usize) -> Self {
        Self {
            centre: centre_of(shape),
            phi: result.phi.affine_block(),
            bin,
            return_status: result.return_status(),
            delta_phi_norm: result.delta_phi_norm,
            iterations: result.iterations,
        }
    }

    /// Phi stored in the record, e.g. to seed another run.
    pub fn phi(&self) -> Phi {
        Phi::from_affine_block(self.phi)
    }

    /// One tab-separated row without trailing newline.
    pub fn to_row(&self) -> String {
        let mut row = String::new();
        let values = self
            .centre
            .iter()
            .chain(self.phi.iter())
            .copied()
            .chain([
                self.bin as f64,
                self.return_status as f64,
                self.delta_phi_norm,
                self.iterations as f64,
            ]);
        for (i, v) in values.enumerate() {
            if i > 0 {
                row.push('\t');
            }
            row.push_str(&format!("{:.7}", v));
        }
        row
    }

    /// Parse a row written by [`to_row`](Self::to_row).
    pub fn parse_row(line: &str) -> Result<Self> {
        let values = line
            .trim_end_matches(['\r', '\n'])
            .split('\t')
            .map(|field| {
                field.trim().parse::<f64>().map_err(|_| {
                    RegistrationError::invalid_configuration(format!(
                        "malformed TSV field {:?}",
                        field
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.len() != FIELDS {
            return Err(RegistrationError::invalid_configuration(format!(
                "expected {} TSV fields, got {}",
                FIELDS,
                values.len()
            )));
        }

        let mut phi = [0.0; 12];
        phi.copy_from_slice(&values[3..15]);
        Ok(Self {
            centre: [values[0], values[1], values[2]],
            phi,
            bin: whole(values[15], "bin")?,
            return_status: values[16].round() as i32,
            delta_phi_norm: values[17],
            iterations: whole(values[18], "iterations")?,
        })
    }

    /// Header line and one row, newline terminated.
    pub fn to_tsv(&self) -> String {
        format!("{}\n{}\n", TSV_HEADER, self.to_row())
    }

    /// First record of a TSV document, skipping the header.
    pub fn parse_tsv(text: &str) -> Result<Self> {
        let row = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .find(|line| !line.starts_with("Zpos") && !line.starts_with('#'))
            .ok_or_else(|| RegistrationError::invalid_configuration("TSV holds no data row"))?;
        Self::parse_row(row)
    }
}

fn whole(value: f64, name: &str) -> Result<usize> {
    if !value.is_finite() || value < 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must be a non-negative integer, got {}",
            name, value
        )));
    }
    Ok(value.round() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PhiRecord {
        PhiRecord {
            centre: [15.5, 15.5, 15.5],
            phi: [1.0, 0.0, 0.0, 1.25, 0.0, 1.0, 0.0, -0.5, 0.0, 0.0, 1.0, 0.0],
            bin: 2,
            return_status: 2,
            delta_phi_norm: 0.0004,
            iterations: 7,
        }
    }

    #[test]
    fn test_header_has_nineteen_columns() {
        assert_eq!(TSV_HEADER.split('\t').count(), FIELDS);
        assert!(TSV_HEADER.starts_with("Zpos\tYpos\tXpos\tFzz\t"));
        assert!(TSV_HEADER.contains("\tXdisp\tbin\t"));
        assert!(TSV_HEADER.ends_with("\titerations"));
    }

    #[test]
    fn test_row_format() {
        let row = record().to_row();
        let fields: Vec<&str> = row.split('\t').collect();
        assert_eq!(fields.len(), FIELDS);
        assert_eq!(fields[0], "15.5000000");
        assert_eq!(fields[6], "1.2500000");
        assert_eq!(fields[10], "-0.5000000");
        assert_eq!(fields[16], "2.0000000");
        assert_eq!(fields[17], "0.0004000");
        assert_eq!(fields[18], "7.0000000");
    }

    #[test]
    fn test_row_before_first_iteration() {
        let mut fresh = record();
        fresh.delta_phi_norm = f64::NAN;
        fresh.iterations = 0;
        let row = fresh.to_row();
        assert!(!row.contains('\n'));
        let fields: Vec<&str> = row.split('\t').collect();
        assert_eq!(fields[17], "NaN");
        assert_eq!(fields[18], "0.0000000");
        assert!(PhiRecord::parse_row(&row).unwrap().delta_phi_norm.is_nan());
    }

    #[test]
    fn test_parse_tsv_seeds_phi() {
        let text = record().to_tsv();
        let parsed = PhiRecord::parse_tsv(&text).unwrap();
        assert_eq!(parsed, record());
        assert_eq!(parsed.phi().translation()[0], 1.25);
    }

    #[test]
    fn test_failed_status_parses() {
        let mut failed = record();
        failed.return_status = -1;
        let parsed = PhiRecord::parse_row(&failed.to_row()).unwrap();
        assert_eq!(parsed.return_status, -1);
    }

    #[test]
    fn test_malformed_rows_rejected() {
        assert!(PhiRecord::parse_row("1\t2\t3").is_err());
        let row = record().to_row().replace("15.5000000", "abc");
        assert!(PhiRecord::parse_row(&row).is_err());
        assert!(PhiRecord::parse_tsv(TSV_HEADER).is_err());
    }
}
