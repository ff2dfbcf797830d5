//! Framing constants of the fibre track format.
//!
//! A primary stream is a `key: value` header opened by the magic line,
//! followed by packed coordinate triples. Structure is carried in-band by
//! reserved sentinel triples outside the valid coordinate domain: element
//! records close with an all-NaN triple, nested set records with
//! `[-inf, NaN, +inf]`, and the stream itself with an all-`+inf` triple.
//! The record count is appended as a plain-text footer after the end
//! sentinel, so a truncated file is detectable without any header patching.

use std::path::Path;

use glam::DVec3;

use crate::util::DataType;

/// Magic first line of a primary stream.
pub const MAGIC: &str = "fibre tracks";

/// Literal preamble opening a properties sidecar.
pub const PROPS_PREAMBLE: &str = "%%% Extended Properties File %%% - keys: ";

/// Marks the end of one element's coordinate rows.
pub const ELEMENT_SEPARATOR: DVec3 = DVec3::new(f64::NAN, f64::NAN, f64::NAN);

/// Marks the end of one nested set record.
pub const SET_SEPARATOR: DVec3 = DVec3::new(f64::NEG_INFINITY, f64::NAN, f64::INFINITY);

/// Marks the end of the data section.
pub const END_OF_DATA: DVec3 = DVec3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);

/// Header hint keys recording a uniform set's shape.
pub const NUM_ELEMS_HINT: &str = "__num_elems__";
pub const ELEM_DEGREE_HINT: &str = "__elem_degree__";
pub const ELEM_VSIZE_HINT: &str = "__elem_row_size__";

/// Extension selecting the text encoding.
pub const TEXT_EXTENSION: &str = "txt";

/// True for the element separator (all components NaN).
#[inline]
pub fn is_element_separator(c: DVec3) -> bool {
    c.x.is_nan() && c.y.is_nan() && c.z.is_nan()
}

/// True for the set separator (`[-inf, NaN, +inf]`).
#[inline]
pub fn is_set_separator(c: DVec3) -> bool {
    c.x == f64::NEG_INFINITY && c.y.is_nan() && c.z == f64::INFINITY
}

/// True for the end-of-data sentinel (all components `+inf`).
#[inline]
pub fn is_end_of_data(c: DVec3) -> bool {
    c.x == f64::INFINITY && c.y == f64::INFINITY && c.z == f64::INFINITY
}

/// The `--- END <n> ---` line closing one outer record's rows in a nested
/// element sidecar.
pub fn row_separator(count: usize) -> String {
    format!("--- END {count} ---")
}

/// True when a sidecar line is a record separator.
pub fn is_row_separator(line: &str) -> bool {
    line.len() > 12 && line.starts_with("--- END ") && line.ends_with(" ---")
}

/// Coordinate encoding of a primary stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coding {
    /// Packed floating-point rows in the given encoding.
    Binary(DataType),
    /// Whitespace-separated decimal triples, one per line.
    Text,
}

impl Coding {
    /// The encoding implied by a file extension: `.txt` selects text,
    /// anything else the default binary encoding.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(TEXT_EXTENSION) => Self::Text,
            _ => Self::Binary(DataType::default()),
        }
    }

    /// True for the text encoding.
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_distinct() {
        assert!(is_element_separator(ELEMENT_SEPARATOR));
        assert!(is_set_separator(SET_SEPARATOR));
        assert!(is_end_of_data(END_OF_DATA));

        assert!(!is_set_separator(ELEMENT_SEPARATOR));
        assert!(!is_element_separator(SET_SEPARATOR));
        assert!(!is_end_of_data(SET_SEPARATOR));
        assert!(!is_element_separator(DVec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_row_separator_round_trip() {
        assert!(is_row_separator(&row_separator(0)));
        assert!(is_row_separator(&row_separator(421)));
        assert!(!is_row_separator("--- END ---"));
        assert!(!is_row_separator("1.0\t2.0"));
    }

    #[test]
    fn test_coding_for_path() {
        assert_eq!(Coding::for_path(Path::new("a.txt")), Coding::Text);
        assert!(matches!(Coding::for_path(Path::new("a.frr")), Coding::Binary(_)));
    }
}
