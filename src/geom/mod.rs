//! Fibre kinds: pairwise metrics, symmetry variants and conversions.

pub mod basis;
pub mod kind;
pub mod strand;
pub mod track;
pub mod tractlet;

pub use kind::{convert, ConvertParams, FibreKind};
pub use strand::Strand;
pub use track::Track;
pub use tractlet::Tractlet;

use crate::core::{Element, ElementData};

/// Name of the apparent-connection-strength scalar property.
pub const ACS_PROP: &str = "acs";

/// A fibre kind: the element-level behavior a [`crate::set::Set`] is
/// parameterized over.
pub trait Fibre: 'static {
    /// The closed-enum tag of this kind.
    const KIND: FibreKind;

    /// Human-readable kind name used in file headers and diagnostics.
    const NAME: &'static str;

    /// Scalar-property names this kind understands. Sidecar columns with
    /// these names are parsed as numbers into the element schema on load;
    /// everything else stays a string-valued extended property.
    const INTRINSIC_PROPS: &'static [&'static str];

    /// Pairwise distance between two elements of this kind. Opaque to the
    /// collection and matching layers.
    fn distance(a: Element<'_>, b: Element<'_>) -> f64;

    /// The copy of `elem` closest to `reference` among this kind's
    /// discrete symmetry variants (flips, axis switches...). Used per
    /// matched pair by `Set::smallest_distance_set`.
    fn nearest_variant(elem: &ElementData, reference: Element<'_>) -> ElementData;
}

/// Squared difference between two elements, applying `map_row` to the
/// second element's rows first. Rows past the shorter element count as
/// zero (Fourier zero-padding); property slots are compared pairwise.
pub(crate) fn sq_diff(
    a: Element<'_>,
    b: Element<'_>,
    map_row: impl Fn(usize, glam::DVec3) -> glam::DVec3,
) -> f64 {
    let rows = a.degree().max(b.degree());
    let mut sum = 0.0;
    for i in 0..rows {
        let ra = if i < a.degree() { a.row(i) } else { glam::DVec3::ZERO };
        let rb = if i < b.degree() { map_row(i, b.row(i)) } else { glam::DVec3::ZERO };
        sum += (ra - rb).length_squared();
    }
    let props = a.schema().len().min(b.schema().len());
    for p in 0..props {
        let d = a.prop(p) - b.prop(p);
        sum += d * d;
    }
    sum
}
