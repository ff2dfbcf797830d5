//! Exact rectangular minimum-cost assignment (Hungarian/Munkres).
//!
//! Solves an `nrows x ncols` cost matrix with `ncols >= nrows` in O(n^3):
//! row reduction, a greedy initial assignment on zeros, then repeated
//! propose/augment passes over chains of alternating proposed and
//! assigned zeros until every row is matched to a distinct column.

use std::collections::BTreeSet;

use super::CostMatrix;
use crate::util::{Error, Result};

/// Reusable Munkres solver state for a fixed problem shape.
pub struct Munkres {
    nrows: usize,
    ncols: usize,
    costs: Vec<f64>,
    open_rows: BTreeSet<usize>,
    open_cols: BTreeSet<usize>,
    /// Column assigned to each row.
    assigned_col: Vec<Option<usize>>,
    /// Row assigned to each column.
    assigned_row: Vec<Option<usize>>,
    /// Column proposed for each row during an augmentation pass.
    proposed_col: Vec<Option<usize>>,
}

impl Munkres {
    /// A solver for `nrows x ncols` problems. The column count must be at
    /// least the row count.
    pub fn new(nrows: usize, ncols: usize) -> Result<Self> {
        if ncols < nrows {
            return Err(Error::precondition(format!(
                "number of columns ({ncols}) must equal or exceed number of rows ({nrows})"
            )));
        }
        Ok(Self {
            nrows,
            ncols,
            costs: vec![0.0; nrows * ncols],
            open_rows: BTreeSet::new(),
            open_cols: BTreeSet::new(),
            assigned_col: vec![None; nrows],
            assigned_row: vec![None; ncols],
            proposed_col: vec![None; nrows],
        })
    }

    /// Solve for the minimum-cost assignment. Returns the matched column
    /// for every row; the columns are distinct.
    pub fn match_indices(&mut self, costs: &CostMatrix) -> Result<Vec<usize>> {
        if costs.rows() != self.nrows || costs.cols() != self.ncols {
            return Err(Error::precondition(format!(
                "cost matrix {}x{} does not match solver shape {}x{}",
                costs.rows(),
                costs.cols(),
                self.nrows,
                self.ncols
            )));
        }
        if self.nrows == 0 {
            return Ok(Vec::new());
        }
        self.costs.copy_from_slice(costs.data());
        self.open_all_rows();
        self.open_all_cols();
        self.assigned_col.fill(None);
        self.assigned_row.fill(None);

        self.subtract_row_min();
        self.initial_assignment();

        while !self.found_solution() {
            self.proposed_col.fill(None);
            let proposed = self.new_match();
            self.reassign_matches(proposed);
        }

        Ok(self
            .assigned_col
            .iter()
            .map(|col| col.unwrap_or_default())
            .collect())
    }

    #[inline]
    fn cost(&self, row: usize, col: usize) -> f64 {
        self.costs[row * self.ncols + col]
    }

    fn open_all_rows(&mut self) {
        self.open_rows = (0..self.nrows).collect();
    }

    fn open_all_cols(&mut self) {
        self.open_cols = (0..self.ncols).collect();
    }

    fn subtract_row_min(&mut self) {
        for row in self.costs.chunks_mut(self.ncols) {
            let min = row.iter().copied().fold(f64::INFINITY, f64::min);
            for cell in row {
                *cell -= min;
            }
        }
    }

    /// Greedily assign zeros, each row and column at most once.
    fn initial_assignment(&mut self) {
        let rows: Vec<usize> = self.open_rows.iter().copied().collect();
        for row in rows {
            let hit = self
                .open_cols
                .iter()
                .copied()
                .find(|&col| self.cost(row, col) == 0.0);
            if let Some(col) = hit {
                self.assigned_col[row] = Some(col);
                self.assigned_row[col] = Some(row);
                self.open_rows.remove(&row);
                self.open_cols.remove(&col);
            }
        }
        self.open_all_rows();
        self.open_all_cols();
    }

    /// Close each column holding an assignment; the solution is complete
    /// once every row's column is closed.
    fn found_solution(&mut self) -> bool {
        let mut num_assigned = 0;
        for col in 0..self.ncols {
            if self.assigned_row[col].is_some() {
                self.open_cols.remove(&col);
                num_assigned += 1;
            }
        }
        num_assigned == self.nrows
    }

    /// Find an open zero with no assignment in its row. Rows whose zero is
    /// already assigned are closed and their assigned column re-opened;
    /// when no open zero remains the costs are adjusted and the search
    /// restarts.
    fn new_match(&mut self) -> (usize, usize) {
        loop {
            let rows: Vec<usize> = self.open_rows.iter().copied().collect();
            for row in rows {
                if !self.open_rows.contains(&row) {
                    continue;
                }
                let hit = self
                    .open_cols
                    .iter()
                    .copied()
                    .find(|&col| self.cost(row, col) == 0.0);
                if let Some(col) = hit {
                    self.proposed_col[row] = Some(col);
                    match self.assigned_col[row] {
                        None => return (row, col),
                        Some(assigned) => {
                            self.open_cols.insert(assigned);
                            self.open_rows.remove(&row);
                        }
                    }
                }
            }
            self.increment_costs();
        }
    }

    /// Add the minimum open value to every closed row and subtract it from
    /// every open column; only already-rejected cells change, so the
    /// minimal assignment is preserved.
    fn increment_costs(&mut self) {
        let mut min = f64::INFINITY;
        for &row in &self.open_rows {
            for &col in &self.open_cols {
                min = min.min(self.cost(row, col));
            }
        }
        for row in 0..self.nrows {
            if !self.open_rows.contains(&row) {
                for col in 0..self.ncols {
                    self.costs[row * self.ncols + col] += min;
                }
            }
        }
        for row in 0..self.nrows {
            for &col in &self.open_cols {
                self.costs[row * self.ncols + col] -= min;
            }
        }
    }

    /// Walk the chain of alternating proposed and assigned zeros from the
    /// new proposal, unassign the old links and assign the proposed ones.
    fn reassign_matches(&mut self, new_match: (usize, usize)) {
        let mut unassign: Vec<(usize, usize)> = Vec::new();
        let mut assign: Vec<(usize, usize)> = vec![new_match];

        let mut col = new_match.1;
        while let Some(row) = self.assigned_row[col] {
            unassign.push((row, col));
            let Some(proposed) = self.proposed_col[row] else {
                // An assigned row in the chain always carries a proposal.
                unreachable!("augmenting chain broke at row {row}");
            };
            assign.push((row, proposed));
            col = proposed;
        }

        for (row, col) in unassign {
            self.assigned_row[col] = None;
            self.assigned_col[row] = None;
        }
        for (row, col) in assign {
            self.assigned_row[col] = Some(row);
            self.assigned_col[row] = Some(col);
        }

        self.open_all_rows();
        self.open_all_cols();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(rows: usize, cols: usize, cells: &[f64]) -> Vec<usize> {
        let costs = CostMatrix::from_cells(rows, cols, cells.to_vec());
        Munkres::new(rows, cols).unwrap().match_indices(&costs).unwrap()
    }

    fn total(rows: usize, cols: usize, cells: &[f64], matched: &[usize]) -> f64 {
        matched
            .iter()
            .enumerate()
            .map(|(i, &j)| cells[i * cols + j])
            .sum()
    }

    fn brute_force(rows: usize, cols: usize, cells: &[f64]) -> f64 {
        fn recurse(row: usize, rows: usize, cols: usize, cells: &[f64], used: &mut Vec<bool>) -> f64 {
            if row == rows {
                return 0.0;
            }
            let mut best = f64::INFINITY;
            for col in 0..cols {
                if !used[col] {
                    used[col] = true;
                    let cost = cells[row * cols + col] + recurse(row + 1, rows, cols, cells, used);
                    best = best.min(cost);
                    used[col] = false;
                }
            }
            best
        }
        recurse(0, rows, cols, cells, &mut vec![false; cols])
    }

    #[test]
    fn test_identity() {
        let matched = solve(3, 3, &[0.0, 5.0, 5.0, 5.0, 0.0, 5.0, 5.0, 5.0, 0.0]);
        assert_eq!(matched, vec![0, 1, 2]);
    }

    #[test]
    fn test_requires_wide_matrix() {
        assert!(Munkres::new(3, 2).is_err());
    }

    #[test]
    fn test_classic_square() {
        // Well-known 3x3 instance with optimum 5 (1 + 2 + 2).
        let cells = [1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 3.0, 6.0, 9.0];
        let matched = solve(3, 3, &cells);
        assert_eq!(total(3, 3, &cells, &matched), brute_force(3, 3, &cells));
    }

    #[test]
    fn test_rectangular_leaves_columns_unmatched() {
        let cells = [4.0, 1.0, 3.0, 9.0, 2.0, 8.0, 7.0, 6.0];
        let matched = solve(2, 4, &cells);
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|&j| j < 4));
        assert_ne!(matched[0], matched[1]);
        assert_eq!(total(2, 4, &cells, &matched), brute_force(2, 4, &cells));
    }

    #[test]
    fn test_matches_brute_force_on_grid() {
        // A few deterministic pseudo-random instances.
        let mut seed = 1u64;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) % 1000) as f64 / 10.0
        };
        for rows in 1..=4 {
            for extra in 0..=2 {
                let cols = rows + extra;
                let cells: Vec<f64> = (0..rows * cols).map(|_| next()).collect();
                let matched = solve(rows, cols, &cells);
                let optimal = brute_force(rows, cols, &cells);
                assert!(
                    (total(rows, cols, &cells, &matched) - optimal).abs() < 1e-9,
                    "suboptimal assignment for {rows}x{cols}"
                );
            }
        }
    }

    #[test]
    fn test_empty_problem() {
        let matched = solve(0, 3, &[]);
        assert!(matched.is_empty());
    }
}
