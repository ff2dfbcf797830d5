//! Non-owning, read-only set views.

use std::collections::BTreeMap;

use crate::core::{Element, Schema};
use crate::geom::Fibre;
use crate::set::Set;
use crate::util::Result;

/// A read-only view of a [`Set`].
///
/// A view can never reallocate, insert, erase or resize: the structural
/// API simply does not exist on it, so owner-versus-view aliasing is
/// checked at compile time rather than by runtime assertion.
#[derive(Clone, Copy)]
pub struct SetView<'a, T: Fibre> {
    set: &'a Set<T>,
}

impl<'a, T: Fibre> SetView<'a, T> {
    pub(crate) fn new(set: &'a Set<T>) -> Self {
        Self { set }
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.set.size()
    }

    /// True when the viewed set holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Degree of element `index`.
    #[inline]
    pub fn elem_degree(&self, index: usize) -> usize {
        self.set.elem_degree(index)
    }

    /// View of element `index`.
    pub fn elem(&self, index: usize) -> Element<'a> {
        self.set.elem(index)
    }

    /// The set-wide scalar-property schema.
    #[inline]
    pub fn schema(&self) -> &'a Schema {
        self.set.schema()
    }

    /// The per-element scalar-property schema.
    #[inline]
    pub fn elem_schema(&self) -> &'a Schema {
        self.set.elem_schema()
    }

    /// Set property by name.
    pub fn prop_by_name(&self, name: &str) -> Result<f64> {
        self.set.prop_by_name(name)
    }

    /// One cell of an extended element column.
    pub fn get_extend_elem_prop(&self, key: &str, index: usize) -> Result<&'a str> {
        self.set.get_extend_elem_prop(key, index)
    }

    /// All extended values of element `index`.
    pub fn get_extend_elem_prop_row(&self, index: usize) -> Result<BTreeMap<String, String>> {
        self.set.get_extend_elem_prop_row(index)
    }

    /// Iterate over element views.
    pub fn iter(&self) -> impl Iterator<Item = Element<'a>> + '_ {
        (0..self.size()).map(move |i| self.elem(i))
    }

    /// Clone the viewed elements into a new owning set.
    pub fn to_owned_set(&self) -> Result<Set<T>> {
        let indices: Vec<usize> = (0..self.size()).collect();
        self.set.select(&indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ElementData;
    use crate::geom::Strand;
    use glam::dvec3;

    #[test]
    fn test_view_reads_through() {
        let mut set: Set<Strand> = Set::new(Schema::empty(), Schema::new(["acs"]));
        let mut e = ElementData::from_rows(&[dvec3(1.0, 0.0, 0.0)], Schema::new(["acs"]));
        e.set_prop_by_name("acs", 4.0).unwrap();
        set.push_back(&e).unwrap();
        set.add_extend_elem_prop("label", "a");

        let view = set.view();
        assert_eq!(view.size(), 1);
        assert_eq!(view.elem(0).prop_by_name("acs").unwrap(), 4.0);
        assert_eq!(view.get_extend_elem_prop("label", 0).unwrap(), "a");

        let copy = view.to_owned_set().unwrap();
        assert_eq!(copy.size(), 1);
        assert_eq!(copy.elem(0).prop_by_name("acs").unwrap(), 4.0);
    }
}
