//! Track: a fibre as an explicit 3D polyline.

use super::{kind::FibreKind, sq_diff, Fibre, ACS_PROP};
use crate::core::{Element, ElementData};

/// Marker for track elements. The degree is the number of path points;
/// the only symmetry is reversing the point order.
pub enum Track {}

/// Reverse the point order.
pub fn reverse(elem: &ElementData) -> ElementData {
    let mut reversed = elem.clone();
    let n = elem.degree();
    for i in 0..n {
        reversed.set_row(i, elem.row(n - 1 - i));
    }
    reversed
}

impl Fibre for Track {
    const KIND: FibreKind = FibreKind::Track;
    const NAME: &'static str = "track";
    const INTRINSIC_PROPS: &'static [&'static str] = &[ACS_PROP];

    fn distance(a: Element<'_>, b: Element<'_>) -> f64 {
        let n = b.degree();
        let direct = sq_diff(a, b, |_, row| row);
        let reversed = sq_diff(a, b, |i, _| b.row(n - 1 - i));
        direct.min(reversed).sqrt()
    }

    fn nearest_variant(elem: &ElementData, reference: Element<'_>) -> ElementData {
        let a = elem.as_element();
        let n = reference.degree();
        let direct = sq_diff(a, reference, |_, row| row);
        let reversed = sq_diff(a, reference, |i, _| reference.row(n - 1 - i));
        if reversed < direct {
            reverse(elem)
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

    #[test]
    fn test_reverse() {
        let t = ElementData::from_rows(
            &[dvec3(0.0, 0.0, 0.0), dvec3(1.0, 0.0, 0.0), dvec3(2.0, 0.0, 0.0)],
            Schema::empty(),
        );
        let r = reverse(&t);
        assert_eq!(r.row(0), dvec3(2.0, 0.0, 0.0));
        assert_eq!(r.row(2), dvec3(0.0, 0.0, 0.0));
        assert!(Track::distance(t.as_element(), r.as_element()) < 1e-12);
    }
}
