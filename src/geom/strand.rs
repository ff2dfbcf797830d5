//! Strand: a fibre as a truncated Fourier series of coefficient rows.

use glam::DVec3;

use super::{kind::FibreKind, sq_diff, Fibre, ACS_PROP};
use crate::core::{Element, ElementData};

/// Marker for strand elements.
///
/// Because the descriptor basis is orthonormal, the Euclidean distance
/// between two strands' coefficients equals the distance between
/// identically-spaced trains of path points along each strand (Parseval).
/// The only symmetry is a head-to-tail flip, which negates every
/// odd-degree coefficient row.
pub enum Strand {}

/// Negate the odd-degree coefficient rows (reverse path direction).
pub fn flip(elem: &ElementData) -> ElementData {
    let mut flipped = elem.clone();
    for i in (1..elem.degree()).step_by(2) {
        flipped.set_row(i, -elem.row(i));
    }
    flipped
}

fn flip_row(index: usize, row: DVec3) -> DVec3 {
    if index % 2 == 1 {
        -row
    } else {
        row
    }
}

impl Fibre for Strand {
    const KIND: FibreKind = FibreKind::Strand;
    const NAME: &'static str = "strand";
    const INTRINSIC_PROPS: &'static [&'static str] = &[ACS_PROP];

    fn distance(a: Element<'_>, b: Element<'_>) -> f64 {
        let direct = sq_diff(a, b, |_, row| row);
        let flipped = sq_diff(a, b, flip_row);
        direct.min(flipped).sqrt()
    }

    fn nearest_variant(elem: &ElementData, reference: Element<'_>) -> ElementData {
        let a = elem.as_element();
        let direct = sq_diff(a, reference, |_, row| row);
        let flipped = sq_diff(a, reference, flip_row);
        if flipped < direct {
            flip(elem)
        } else {
            elem.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Schema;
    use glam::dvec3;

    fn strand(rows: &[DVec3]) -> ElementData {
        ElementData::from_rows(rows, Schema::empty())
    }

    #[test]
    fn test_flip_negates_odd_rows() {
        let s = strand(&[
            dvec3(1.0, 1.0, 1.0),
            dvec3(2.0, 0.0, -2.0),
            dvec3(3.0, 3.0, 3.0),
        ]);
        let f = flip(&s);
        assert_eq!(f.row(0), s.row(0));
        assert_eq!(f.row(1), -s.row(1));
        assert_eq!(f.row(2), s.row(2));
        // Flip is an involution.
        assert_eq!(flip(&f), s);
    }

    #[test]
    fn test_distance_is_flip_invariant() {
        let a = strand(&[dvec3(0.0, 0.0, 0.0), dvec3(1.0, 2.0, 3.0)]);
        let b = flip(&a);
        assert!(Strand::distance(a.as_element(), b.as_element()) < 1e-12);
        assert!(Strand::distance(a.as_element(), a.as_element()) < 1e-12);
    }

    #[test]
    fn test_nearest_variant_flips_when_closer() {
        let a = strand(&[dvec3(0.0, 0.0, 0.0), dvec3(1.0, 2.0, 3.0)]);
        let reference = flip(&a);
        let nearest = Strand::nearest_variant(&a, reference.as_element());
        assert_eq!(nearest, reference);
    }
}
