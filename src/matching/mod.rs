//! Distance between fibre collections via optimal assignment.
//!
//! A cost matrix of pairwise element distances is built (cells are
//! independent, so rows are computed in parallel) and solved exactly with
//! the Munkres algorithm; the matched pairs' distances sum to the
//! collection distance.

pub mod munkres;

pub use munkres::Munkres;

use rayon::prelude::*;

use crate::geom::Fibre;
use crate::set::Set;
use crate::util::{Error, Result};

/// Dense row-major cost matrix.
#[derive(Clone, Debug)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl CostMatrix {
    /// Wrap precomputed cells. `cells.len()` must equal `rows * cols`.
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<f64>) -> Self {
        assert_eq!(cells.len(), rows * cols);
        Self { rows, cols, data: cells }
    }

    /// Pairwise element distances between two sets: cell `(i, j)` holds
    /// `T::distance(a[i], b[j])`.
    pub fn between<T: Fibre>(a: &Set<T>, b: &Set<T>) -> Self {
        let rows = a.size();
        let cols = b.size();
        let mut data = vec![0.0; rows * cols];
        data.par_chunks_mut(cols.max(1))
            .enumerate()
            .for_each(|(i, row)| {
                if i < rows {
                    let elem = a.elem(i);
                    for (j, cell) in row.iter_mut().enumerate() {
                        *cell = T::distance(elem, b.elem(j));
                    }
                }
            });
        Self { rows, cols, data }
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Cell `(row, col)`.
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// The flat row-major cells.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Options of [`Set::distance`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DistanceOpts {
    /// Add the bare norm of every unmatched reference element to the
    /// total cost.
    pub add_extra: bool,
}

impl<T: Fibre> Set<T> {
    /// The pairwise cost matrix against `reference`.
    pub fn similarity_matrix(&self, reference: &Set<T>) -> CostMatrix {
        CostMatrix::between(self, reference)
    }

    /// Minimum-cost correspondence with `reference`.
    ///
    /// Requires `self.size() <= reference.size()`. Returns the total cost
    /// over matched pairs and the matched reference index for every
    /// element of `self` (distinct values in `0..reference.size()`).
    pub fn distance(
        &self,
        reference: &Set<T>,
        opts: DistanceOpts,
    ) -> Result<(f64, Vec<usize>)> {
        if reference.size() < self.size() {
            return Err(Error::precondition(format!(
                "size of reference set ({}) must be greater than or equal to that of the set of interest ({})",
                reference.size(),
                self.size()
            )));
        }
        let costs = self.similarity_matrix(reference);
        let matched = Munkres::new(self.size(), reference.size())?.match_indices(&costs)?;

        let mut total = 0.0;
        for (i, &j) in matched.iter().enumerate() {
            total += T::distance(self.elem(i), reference.elem(j));
        }
        if opts.add_extra {
            for j in 0..reference.size() {
                if !matched.contains(&j) {
                    total += reference.elem(j).norm();
                }
            }
        }
        Ok((total, matched))
    }

    /// The copy of this set closest to `reference`: elements permuted into
    /// the matched order, each replaced by its nearest discrete symmetry
    /// variant against its reference partner. Sizes must be equal.
    pub fn smallest_distance_set(&self, reference: &Set<T>) -> Result<Set<T>> {
        if self.size() != reference.size() {
            return Err(Error::precondition(format!(
                "size of set ({}) does not match that of reference set ({})",
                self.size(),
                reference.size()
            )));
        }
        let (_, matched) = self.distance(reference, DistanceOpts::default())?;
        let mut smallest = self.permute(&matched)?;
        for i in 0..smallest.size() {
            let nearest = T::nearest_variant(&smallest.elem_data(i), reference.elem(i));
            smallest.elem_mut(i).assign(&nearest)?;
        }
        Ok(smallest)
    }
}
