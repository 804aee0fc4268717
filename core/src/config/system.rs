use std::{error::Error, fs::File, io::BufReader, path::Path};

use nalgebra::{DMatrix, Matrix3xX};
use serde::{Deserialize, Serialize};

use crate::{
    basis::{build_centers, BasisLayout, Center},
    error::FockError,
};

/// A system in a config file: one entry per shell, plus the density in the order of
/// the shells' functions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigSystem {
    #[serde(default)]
    pub name: String,
    pub centers: Vec<[f64; 3]>,
    pub exponents: Vec<f64>,
    pub momenta: Vec<i32>,
    /// Rows of the density matrix
    pub density: Vec<Vec<f64>>,
}

impl ConfigSystem {
    pub fn new(name: String, centers: &[Center], density: &DMatrix<f64>) -> Self {
        Self {
            name,
            centers: centers
                .iter()
                .map(|center| center.position.into())
                .collect(),
            exponents: centers.iter().map(|center| center.exponent).collect(),
            momenta: centers.iter().map(|center| center.momentum).collect(),
            density: density
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        Ok(serde_json::to_writer(
            File::options()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?,
            self,
        )?)
    }

    pub fn positions(&self) -> Matrix3xX<f64> {
        Matrix3xX::from_fn(self.centers.len(), |axis, center| self.centers[center][axis])
    }

    pub fn shells(&self) -> Result<Vec<Center>, FockError> {
        build_centers(&self.positions(), &self.exponents, &self.momenta)
    }

    /// The density as a matrix, checking that it is square and fits the shells.
    pub fn density_matrix(&self) -> Result<DMatrix<f64>, FockError> {
        let n = BasisLayout::new(&self.shells()?).n_functions();

        if self.density.len() != n {
            return Err(FockError::DimensionMismatch {
                what: "density rows",
                expected: n,
                found: self.density.len(),
            });
        }
        if let Some(row) = self.density.iter().find(|row| row.len() != n) {
            return Err(FockError::DimensionMismatch {
                what: "density row",
                expected: n,
                found: row.len(),
            });
        }

        Ok(DMatrix::from_fn(n, n, |i, j| self.density[i][j]))
    }
}
