//! Tractlet: a fibre bundle as a backbone strand plus two width axes.
//!
//! A tractlet element stores its three axes back-to-back, each a strand of
//! `degree() / 3` coefficient rows: the backbone first, then the two
//! perpendicular width axes. The element degree is the total row count and
//! must be a multiple of three.

use glam::DVec3;

use super::{kind::FibreKind, sq_diff, Fibre, ACS_PROP};
use crate::core::{Element, ElementData};

/// Marker for tractlet elements.
pub enum Tractlet {}

/// One of the sixteen discrete symmetries of the tractlet model:
/// flipping the section direction, switching the two width axes and
/// inverting either width axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Variant {
    pub flipped: bool,
    pub switched: bool,
    pub invert1: bool,
    pub invert2: bool,
}

impl Variant {
    /// All sixteen variants.
    pub fn all() -> impl Iterator<Item = Variant> {
        (0..16u8).map(|bits| Variant {
            flipped: bits & 1 != 0,
            switched: bits & 2 != 0,
            invert1: bits & 4 != 0,
            invert2: bits & 8 != 0,
        })
    }

    /// Row `index` of `elem` under this variant.
    fn row(&self, elem: Element<'_>, axis_degree: usize, index: usize) -> DVec3 {
        let axis = index / axis_degree;
        let within = index % axis_degree;
        let src_axis = if self.switched {
            match axis {
                1 => 2,
                2 => 1,
                other => other,
            }
        } else {
            axis
        };
        let mut row = elem.row(src_axis * axis_degree + within);
        if self.flipped && within % 2 == 1 {
            row = -row;
        }
        if (src_axis == 1 && self.invert1) || (src_axis == 2 && self.invert2) {
            row = -row;
        }
        row
    }

    /// Apply this variant to an owned element.
    pub fn apply(&self, elem: &ElementData) -> ElementData {
        let axis_degree = elem.degree() / 3;
        let view = elem.as_element();
        let mut out = elem.clone();
        for i in 0..elem.degree() {
            out.set_row(i, self.row(view, axis_degree, i));
        }
        out
    }
}

/// The variant of `b` minimizing the squared difference to `a`, and that
/// minimum.
fn best_variant(a: Element<'_>, b: Element<'_>) -> (Variant, f64) {
    debug_assert_eq!(b.degree() % 3, 0, "tractlet degree must be a multiple of 3");
    let axis_degree = b.degree() / 3;
    let mut best = (Variant::default(), f64::INFINITY);
    for variant in Variant::all() {
        let dist = sq_diff(a, b, |i, _| variant.row(b, axis_degree, i));
        if dist < best.1 {
            best = (variant, dist);
        }
    }
    best
}

impl Fibre for Tractlet {
    const KIND: FibreKind = FibreKind::Tractlet;
    const NAME: &'static str = "tractlet";
    const INTRINSIC_PROPS: &'static [&'static str] = &[ACS_PROP];

    fn distance(a: Element<'_>, b: Element<'_>) -> f64 {
        best_variant(a, b).1.sqrt()
    }

    fn nearest_variant(elem: &ElementData, reference: Element<'_>) -> ElementData {
        let (variant, _) = best_variant(elem.as_element(), reference);
        variant.apply(elem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Schema;
    use glam::dvec3;

    fn tractlet() -> ElementData {
        // One row per axis (axis degree 1).
        ElementData::from_rows(
            &[
                dvec3(1.0, 0.0, 0.0),
                dvec3(0.0, 1.0, 0.0),
                dvec3(0.0, 0.0, 1.0),
            ],
            Schema::empty(),
        )
    }

    #[test]
    fn test_switch_axes_is_zero_distance() {
        let t = tractlet();
        let switched = Variant { switched: true, ..Variant::default() }.apply(&t);
        assert_eq!(switched.row(1), dvec3(0.0, 0.0, 1.0));
        assert_eq!(switched.row(2), dvec3(0.0, 1.0, 0.0));
        assert!(Tractlet::distance(t.as_element(), switched.as_element()) < 1e-12);
    }

    #[test]
    fn test_invert_axis_is_zero_distance() {
        let t = tractlet();
        let inverted = Variant { invert2: true, ..Variant::default() }.apply(&t);
        assert_eq!(inverted.row(2), dvec3(0.0, 0.0, -1.0));
        assert!(Tractlet::distance(t.as_element(), inverted.as_element()) < 1e-12);
    }

    #[test]
    fn test_nearest_variant_recovers() {
        let t = tractlet();
        let variant = Variant { switched: true, invert1: true, ..Variant::default() };
        let moved = variant.apply(&t);
        let nearest = Tractlet::nearest_variant(&moved, t.as_element());
        assert!(Tractlet::distance(nearest.as_element(), t.as_element()) < 1e-12);
    }
}
