//! The closed set of fibre kinds and the conversion dispatch table.

use std::fmt;

use glam::DVec3;

use super::basis;
use crate::core::ElementData;
use crate::util::{Error, Result};

/// Tag for the three fibre representations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FibreKind {
    /// Truncated Fourier series of coefficient rows.
    Strand,
    /// Backbone strand plus two perpendicular width axes.
    Tractlet,
    /// Explicit 3D polyline.
    Track,
}

impl FibreKind {
    /// Kind name used in headers and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Strand => "strand",
            Self::Tractlet => "tractlet",
            Self::Track => "track",
        }
    }

    /// Parse a kind name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "strand" => Ok(Self::Strand),
            "tractlet" => Ok(Self::Tractlet),
            "track" => Ok(Self::Track),
            other => Err(Error::other(format!("unknown fibre kind '{other}'"))),
        }
    }
}

impl fmt::Display for FibreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters of a kind conversion.
#[derive(Clone, Copy, Debug)]
pub struct ConvertParams {
    /// Path points to sample when producing a track.
    pub num_points: usize,
    /// Coefficient rows per axis when producing a strand or tractlet.
    pub degree: usize,
}

impl Default for ConvertParams {
    fn default() -> Self {
        Self { num_points: 100, degree: 3 }
    }
}

type ConvertFn = fn(&ElementData, &ConvertParams) -> Result<ElementData>;

/// Explicit pairwise dispatch table. Every supported conversion is one
/// entry; same-kind conversions are the identity and bypass the table.
const CONVERSIONS: &[(FibreKind, FibreKind, ConvertFn)] = &[
    (FibreKind::Strand, FibreKind::Track, strand_to_track),
    (FibreKind::Track, FibreKind::Strand, track_to_strand),
    (FibreKind::Strand, FibreKind::Tractlet, strand_to_tractlet),
    (FibreKind::Tractlet, FibreKind::Strand, tractlet_to_strand),
    (FibreKind::Tractlet, FibreKind::Track, tractlet_to_track),
    (FibreKind::Track, FibreKind::Tractlet, track_to_tractlet),
];

/// Convert an element between fibre kinds, carrying its scalar properties
/// across unchanged.
pub fn convert(
    elem: &ElementData,
    from: FibreKind,
    to: FibreKind,
    params: &ConvertParams,
) -> Result<ElementData> {
    if from == to {
        return Ok(elem.clone());
    }
    let entry = CONVERSIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .ok_or_else(|| Error::other(format!("no conversion from {from} to {to}")))?;
    (entry.2)(elem, params)
}

fn with_props_of(rows: Vec<DVec3>, template: &ElementData) -> ElementData {
    let mut out = ElementData::from_rows(&rows, template.schema().clone());
    for i in 0..template.schema().len() {
        out.set_prop(i, template.prop(i));
    }
    out
}

fn strand_to_track(elem: &ElementData, params: &ConvertParams) -> Result<ElementData> {
    if params.num_points == 0 {
        return Err(Error::precondition(
            "conversion to a track requires a non-zero point count",
        ));
    }
    let coeffs: Vec<DVec3> = elem.rows().collect();
    let times = basis::timeline(params.num_points, true);
    Ok(with_props_of(basis::sample_path(&coeffs, &times), elem))
}

fn track_to_strand(elem: &ElementData, params: &ConvertParams) -> Result<ElementData> {
    let points: Vec<DVec3> = elem.rows().collect();
    let coeffs = basis::fit_coefficients(&points, params.degree)?;
    Ok(with_props_of(coeffs, elem))
}

fn strand_to_tractlet(elem: &ElementData, _params: &ConvertParams) -> Result<ElementData> {
    // Backbone from the strand, width axes zeroed.
    let mut rows: Vec<DVec3> = elem.rows().collect();
    rows.resize(elem.degree() * 3, DVec3::ZERO);
    Ok(with_props_of(rows, elem))
}

fn tractlet_to_strand(elem: &ElementData, _params: &ConvertParams) -> Result<ElementData> {
    if elem.degree() % 3 != 0 {
        return Err(Error::precondition(
            "tractlet degree must be a multiple of three",
        ));
    }
    let backbone: Vec<DVec3> = elem.rows().take(elem.degree() / 3).collect();
    Ok(with_props_of(backbone, elem))
}

fn tractlet_to_track(elem: &ElementData, params: &ConvertParams) -> Result<ElementData> {
    let strand = tractlet_to_strand(elem, params)?;
    strand_to_track(&strand, params)
}

fn track_to_tractlet(elem: &ElementData, params: &ConvertParams) -> Result<ElementData> {
    let strand = track_to_strand(elem, params)?;
    strand_to_tractlet(&strand, params)
}
