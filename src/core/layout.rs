//! Row geometry of a flat-buffer collection.
//!
//! A set's buffer holds one row-span per element (coordinate rows followed
//! by the per-element scalar-property slots). The spans are either uniform,
//! described by a single degree/row-vsize pair, or per-element, described by
//! parallel `row_ends`/`degrees` arrays.

use crate::util::{Error, Result};

/// Row geometry: uniform elements or per-element boundaries.
///
/// Invariant for `Variable`: `row_ends` is strictly increasing and its last
/// entry equals the base size of the buffer it describes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Every element has `degree` coordinate rows and occupies `row_vsize`
    /// buffer slots (`degree * ROW_WIDTH + num_elem_props`).
    Fixed { degree: usize, row_vsize: usize },
    /// Per-element boundaries: element `i` ends at `row_ends[i]` and has
    /// `degrees[i]` coordinate rows.
    Variable {
        row_ends: Vec<usize>,
        degrees: Vec<usize>,
    },
}

impl Layout {
    /// An empty variable layout.
    pub fn variable() -> Self {
        Self::Variable {
            row_ends: Vec::new(),
            degrees: Vec::new(),
        }
    }

    /// A uniform layout.
    pub fn fixed(degree: usize, row_vsize: usize) -> Self {
        Self::Fixed { degree, row_vsize }
    }

    /// True when element boundaries are stored per element.
    #[inline]
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }

    /// Degree (coordinate row count) of element `index`.
    #[inline]
    pub fn degree(&self, index: usize) -> usize {
        match self {
            Self::Fixed { degree, .. } => *degree,
            Self::Variable { degrees, .. } => degrees[index],
        }
    }

    /// Start slot of element `index`.
    #[inline]
    pub fn row_start(&self, index: usize) -> usize {
        match self {
            Self::Fixed { row_vsize, .. } => index * row_vsize,
            Self::Variable { row_ends, .. } => {
                if index == 0 {
                    0
                } else {
                    row_ends[index - 1]
                }
            }
        }
    }

    /// One-past-the-end slot of element `index`.
    #[inline]
    pub fn row_end(&self, index: usize) -> usize {
        match self {
            Self::Fixed { row_vsize, .. } => (index + 1) * row_vsize,
            Self::Variable { row_ends, .. } => row_ends[index],
        }
    }

    /// Buffer span (in slots) of element `index`.
    #[inline]
    pub fn row_vsize(&self, index: usize) -> usize {
        self.row_end(index) - self.row_start(index)
    }

    /// Total base size (all element spans) for a collection of `size`
    /// elements.
    #[inline]
    pub fn bsize(&self, size: usize) -> usize {
        match self {
            Self::Fixed { row_vsize, .. } => size * row_vsize,
            Self::Variable { row_ends, .. } => row_ends.last().copied().unwrap_or(0),
        }
    }

    /// Record a span appended at the back. No-op for `Fixed` (geometry is
    /// implied by the element count).
    pub fn push(&mut self, degree: usize, row_vsize: usize) {
        if let Self::Variable { row_ends, degrees } = self {
            let end = row_ends.last().copied().unwrap_or(0) + row_vsize;
            row_ends.push(end);
            degrees.push(degree);
        }
    }

    /// Record a span inserted at `index`, shifting every later boundary.
    pub fn insert(&mut self, index: usize, degree: usize, row_vsize: usize) {
        if let Self::Variable { row_ends, degrees } = self {
            let start = if index == 0 { 0 } else { row_ends[index - 1] };
            row_ends.insert(index, start + row_vsize);
            degrees.insert(index, degree);
            for end in row_ends[index + 1..].iter_mut() {
                *end += row_vsize;
            }
        }
    }

    /// Record the span at `index` removed, shifting every later boundary.
    pub fn erase(&mut self, index: usize) {
        let removed = self.row_vsize(index);
        if let Self::Variable { row_ends, degrees } = self {
            row_ends.remove(index);
            degrees.remove(index);
            for end in row_ends[index..].iter_mut() {
                *end -= removed;
            }
        }
    }

    /// Truncate the per-element records to `new_size` spans.
    pub fn truncate(&mut self, new_size: usize) {
        if let Self::Variable { row_ends, degrees } = self {
            row_ends.truncate(new_size);
            degrees.truncate(new_size);
        }
    }

    /// Convert to a uniform layout for `size` elements. Fails with
    /// `DegreeMismatch` when spans are not actually uniform.
    pub fn freeze(&self, size: usize) -> Result<Layout> {
        match self {
            Self::Fixed { .. } => Ok(self.clone()),
            Self::Variable { degrees, .. } => {
                if size == 0 {
                    return Ok(Self::fixed(0, 0));
                }
                let degree = degrees[0];
                let row_vsize = self.row_vsize(0);
                for i in 1..size {
                    if self.degree(i) != degree || self.row_vsize(i) != row_vsize {
                        return Err(Error::DegreeMismatch {
                            elem: self.degree(i),
                            set: degree,
                        });
                    }
                }
                Ok(Self::fixed(degree, row_vsize))
            }
        }
    }

    /// Convert to a per-element layout for `size` elements.
    pub fn free(&self, size: usize) -> Layout {
        match self {
            Self::Variable { .. } => self.clone(),
            Self::Fixed { degree, row_vsize } => {
                let row_ends = (1..=size).map(|i| i * row_vsize).collect();
                let degrees = vec![*degree; size];
                Self::Variable { row_ends, degrees }
            }
        }
    }

    /// Check the `Variable` invariant for a buffer of base size `bsize`.
    pub fn check(&self, size: usize, bsize: usize) -> Result<()> {
        match self {
            Self::Fixed { row_vsize, .. } => {
                if size * row_vsize != bsize {
                    return Err(Error::format(format!(
                        "fixed layout covers {} slots but base size is {bsize}",
                        size * row_vsize
                    )));
                }
            }
            Self::Variable { row_ends, degrees } => {
                if row_ends.len() != size || degrees.len() != size {
                    return Err(Error::format("layout arrays do not match element count"));
                }
                let mut prev = 0;
                for &end in row_ends {
                    if end <= prev {
                        return Err(Error::format("row ends are not strictly increasing"));
                    }
                    prev = end;
                }
                if row_ends.last().copied().unwrap_or(0) != bsize {
                    return Err(Error::format("last row end does not match base size"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_geometry() {
        let l = Layout::fixed(3, 10); // 3 rows * 3 + 1 elem prop
        assert_eq!(l.row_start(0), 0);
        assert_eq!(l.row_end(0), 10);
        assert_eq!(l.row_start(2), 20);
        assert_eq!(l.bsize(4), 40);
        assert!(!l.is_variable());
    }

    #[test]
    fn test_variable_push_insert_erase() {
        let mut l = Layout::variable();
        l.push(2, 6);
        l.push(3, 9);
        assert_eq!(l.row_start(1), 6);
        assert_eq!(l.row_end(1), 15);
        assert_eq!(l.degree(1), 3);

        l.insert(1, 1, 3);
        assert_eq!(l.row_end(0), 6);
        assert_eq!(l.row_end(1), 9);
        assert_eq!(l.row_end(2), 18);
        assert_eq!(l.degree(1), 1);
        l.check(3, 18).unwrap();

        l.erase(1);
        assert_eq!(l.row_end(1), 15);
        l.check(2, 15).unwrap();
    }

    #[test]
    fn test_freeze_uniform() {
        let mut l = Layout::variable();
        l.push(3, 9);
        l.push(3, 9);
        let frozen = l.freeze(2).unwrap();
        assert_eq!(frozen, Layout::fixed(3, 9));
    }

    #[test]
    fn test_freeze_rejects_heterogeneous() {
        let mut l = Layout::variable();
        l.push(3, 9);
        l.push(4, 12);
        assert!(l.freeze(2).is_err());
    }

    #[test]
    fn test_free_round_trip() {
        let fixed = Layout::fixed(2, 7);
        let freed = fixed.free(3);
        assert!(freed.is_variable());
        assert_eq!(freed.row_end(2), 21);
        assert_eq!(freed.freeze(3).unwrap(), fixed);
    }
}
