//! Flat-buffer fibre collections.
//!
//! A [`Set`] owns one contiguous `f64` buffer holding every element's
//! coordinate rows and per-element scalar-property slots back to back,
//! followed by the set-wide scalar-property block in the final
//! `num_props()` slots. Row geometry lives in a [`Layout`]; string-valued
//! "extended" properties live beside the buffer (a set-wide map plus
//! per-element columns that always stay exactly `size()` long).

mod view;

pub use view::SetView;

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use tracing::warn;

use crate::core::{Element, ElementData, ElementMut, Layout, Schema, ROW_WIDTH, UNSET};
use crate::geom::Fibre;
use crate::util::{Error, Result};

/// Reserved set-wide scalar property scaling all element intensities.
pub const BASE_INTENSITY_PROP: &str = "base_intensity";

/// Extended element column labelling anatomical bundles.
pub const BUNDLE_INDEX_EPROP: &str = "bundle_index";

/// Set-wide scalar-property names understood by the library itself;
/// header columns with these names are parsed as numbers on load.
pub const SET_INTRINSIC_PROPS: &[&str] = &[BASE_INTENSITY_PROP];

/// An owning, schema-flexible collection of fibre elements.
#[derive(Clone)]
pub struct Set<T: Fibre> {
    buffer: Vec<f64>,
    size: usize,
    layout: Layout,
    schema: Schema,
    elem_schema: Schema,
    ext_props: BTreeMap<String, String>,
    ext_keys: Vec<String>,
    ext_defaults: Vec<String>,
    ext_values: Vec<Vec<String>>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Fibre> Set<T> {
    /// An empty set with per-element (variable) degrees.
    pub fn new(schema: Schema, elem_schema: Schema) -> Self {
        let buffer = vec![UNSET; schema.len()];
        Self {
            buffer,
            size: 0,
            layout: Layout::variable(),
            schema,
            elem_schema,
            ext_props: BTreeMap::new(),
            ext_keys: Vec::new(),
            ext_defaults: Vec::new(),
            ext_values: Vec::new(),
            _kind: PhantomData,
        }
    }

    /// A pre-sized uniform set: `size` elements of `degree` rows, every
    /// slot set to `fill`.
    pub fn with_size(
        size: usize,
        degree: usize,
        schema: Schema,
        elem_schema: Schema,
        fill: f64,
    ) -> Self {
        let row_vsize = degree * ROW_WIDTH + elem_schema.len();
        let buffer = vec![fill; size * row_vsize + schema.len()];
        Self {
            buffer,
            size,
            layout: Layout::fixed(degree, row_vsize),
            schema,
            elem_schema,
            ext_props: BTreeMap::new(),
            ext_keys: Vec::new(),
            ext_defaults: Vec::new(),
            ext_values: Vec::new(),
            _kind: PhantomData,
        }
    }

    /// Build a set by pushing every element of an iterator.
    pub fn from_elements<I>(elems: I) -> Result<Self>
    where
        I: IntoIterator<Item = ElementData>,
    {
        let mut iter = elems.into_iter();
        let first = match iter.next() {
            Some(e) => e,
            None => return Ok(Self::new(Schema::empty(), Schema::empty())),
        };
        let mut set = Self::new(Schema::empty(), first.schema().clone());
        set.push_back(&first)?;
        for elem in iter {
            set.push_back(&elem)?;
        }
        set.freeze_elem_degree(true)?;
        Ok(set)
    }

    // === Sizes and geometry ===

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// True when the set holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Total buffer slot count.
    #[inline]
    pub fn vsize(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer slot count without the trailing set-property block.
    #[inline]
    pub fn bsize(&self) -> usize {
        self.buffer.len() - self.schema.len()
    }

    /// Number of set-wide scalar properties.
    #[inline]
    pub fn num_props(&self) -> usize {
        self.schema.len()
    }

    /// Number of per-element scalar properties.
    #[inline]
    pub fn num_elem_props(&self) -> usize {
        self.elem_schema.len()
    }

    /// Degree of element `index`.
    #[inline]
    pub fn elem_degree(&self, index: usize) -> usize {
        self.layout.degree(index)
    }

    /// The uniform degree. Only valid on a non-freed set.
    pub fn uniform_degree(&self) -> Option<usize> {
        match &self.layout {
            Layout::Fixed { degree, .. } => Some(*degree),
            Layout::Variable { .. } => None,
        }
    }

    /// True when every element shares a single fixed degree.
    #[inline]
    pub fn is_uniform(&self) -> bool {
        !self.layout.is_variable()
    }

    /// The set-wide scalar-property schema.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The per-element scalar-property schema.
    #[inline]
    pub fn elem_schema(&self) -> &Schema {
        &self.elem_schema
    }

    /// The row geometry.
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// A read-only view of this set.
    pub fn view(&self) -> SetView<'_, T> {
        SetView::new(self)
    }

    // === Element access ===

    /// View of element `index`. Panics when out of range.
    pub fn elem(&self, index: usize) -> Element<'_> {
        assert!(index < self.size, "element index {index} out of range");
        let start = self.layout.row_start(index);
        let end = self.layout.row_end(index);
        Element::new(
            &self.buffer[start..end],
            self.layout.degree(index),
            &self.elem_schema,
        )
    }

    /// Mutable view of element `index`. Panics when out of range.
    pub fn elem_mut(&mut self, index: usize) -> ElementMut<'_> {
        assert!(index < self.size, "element index {index} out of range");
        let start = self.layout.row_start(index);
        let end = self.layout.row_end(index);
        let degree = self.layout.degree(index);
        ElementMut::new(&mut self.buffer[start..end], degree, &self.elem_schema)
    }

    /// Owned copy of element `index`.
    pub fn elem_data(&self, index: usize) -> ElementData {
        self.elem(index).to_data()
    }

    /// Iterate over element views.
    pub fn iter(&self) -> impl Iterator<Item = Element<'_>> {
        (0..self.size).map(|i| self.elem(i))
    }

    // === Structural mutation ===

    fn check_pushable(&self, elem: &ElementData) -> Result<()> {
        if !elem.schema().matches(&self.elem_schema) {
            return Err(Error::SchemaMismatch {
                elem: elem.schema().to_string(),
                set: self.elem_schema.to_string(),
            });
        }
        if let Layout::Fixed { degree, row_vsize } = &self.layout {
            if self.size > 0 && (elem.degree() != *degree || elem.vsize() != *row_vsize) {
                return Err(Error::DegreeMismatch {
                    elem: elem.degree(),
                    set: *degree,
                });
            }
        }
        Ok(())
    }

    /// Append one element. Fails when the element's scalar-property schema
    /// differs from the set's, or its degree differs and the set is not
    /// freed.
    pub fn push_back(&mut self, elem: &ElementData) -> Result<()> {
        self.insert(elem, self.size)
    }

    /// Append one element together with its extended-property row.
    /// Missing keys fall back to the column defaults.
    pub fn push_back_with_props(
        &mut self,
        elem: &ElementData,
        props_row: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.push_back(elem)?;
        self.set_extend_elem_prop_row(props_row, self.size - 1, true)
    }

    /// Insert one element at `index`, shifting everything after it.
    pub fn insert(&mut self, elem: &ElementData, index: usize) -> Result<()> {
        if index > self.size {
            return Err(Error::out_of_range(index, self.size));
        }
        self.check_pushable(elem)?;
        // An empty frozen set adopts the geometry of its first element.
        if self.size == 0 {
            if let Layout::Fixed { degree, row_vsize } = &mut self.layout {
                *degree = elem.degree();
                *row_vsize = elem.vsize();
            }
        }
        let at = self.layout.row_start(index);
        self.buffer.splice(at..at, elem.values().iter().copied());
        self.layout.insert(index, elem.degree(), elem.vsize());
        for (col, default) in self.ext_values.iter_mut().zip(&self.ext_defaults) {
            col.insert(index, default.clone());
        }
        self.size += 1;
        Ok(())
    }

    /// Erase the element at `index`, shifting everything after it.
    pub fn erase(&mut self, index: usize) -> Result<()> {
        if index >= self.size {
            return Err(Error::out_of_range(index, self.size));
        }
        let start = self.layout.row_start(index);
        let end = self.layout.row_end(index);
        self.buffer.drain(start..end);
        self.layout.erase(index);
        for col in self.ext_values.iter_mut() {
            col.remove(index);
        }
        self.size -= 1;
        Ok(())
    }

    /// Resize to `new_size` elements. New slots are filled with `fill`;
    /// extended columns extend with their registered defaults. On a freed
    /// set the degree of appended elements must be given as `new_degree`;
    /// on a uniform set it may be omitted but must match when present.
    pub fn resize(&mut self, new_size: usize, fill: f64, new_degree: Option<usize>) -> Result<()> {
        if new_size < self.size {
            let cut = self.layout.row_start(new_size);
            let bsize = self.bsize();
            self.buffer.drain(cut..bsize);
            self.layout.truncate(new_size);
            for col in self.ext_values.iter_mut() {
                col.truncate(new_size);
            }
            self.size = new_size;
            return Ok(());
        }

        let degree = match (&self.layout, new_degree) {
            (Layout::Fixed { degree, .. }, None) => *degree,
            (Layout::Fixed { degree, .. }, Some(d)) => {
                if self.size > 0 && d != *degree {
                    return Err(Error::DegreeMismatch { elem: d, set: *degree });
                }
                d
            }
            (Layout::Variable { .. }, Some(d)) => d,
            (Layout::Variable { .. }, None) => {
                return Err(Error::precondition(
                    "resize of a freed set requires the new element degree",
                ))
            }
        };
        if self.size == 0 {
            if let Layout::Fixed { degree: d, row_vsize } = &mut self.layout {
                *d = degree;
                *row_vsize = degree * ROW_WIDTH + self.elem_schema.len();
            }
        }
        let row_vsize = degree * ROW_WIDTH + self.elem_schema.len();
        let grow = new_size - self.size;
        let at = self.bsize();
        self.buffer
            .splice(at..at, std::iter::repeat(fill).take(grow * row_vsize));
        for _ in 0..grow {
            self.layout.push(degree, row_vsize);
        }
        for (col, default) in self.ext_values.iter_mut().zip(&self.ext_defaults) {
            col.resize(new_size, default.clone());
        }
        self.size = new_size;
        Ok(())
    }

    /// Resize to `new_size`, filling appended positions with copies of
    /// `elem`.
    pub fn resize_with(&mut self, new_size: usize, elem: &ElementData) -> Result<()> {
        if new_size < self.size {
            return self.resize(new_size, UNSET, None);
        }
        while self.size < new_size {
            self.push_back(elem)?;
        }
        Ok(())
    }

    /// Append every element of `other` together with its extended rows.
    pub fn append(&mut self, other: &Set<T>) -> Result<()> {
        for i in 0..other.size() {
            let row = other.get_extend_elem_prop_row(i)?;
            self.push_back_with_props(&other.elem_data(i), &row)?;
        }
        Ok(())
    }

    /// A new owning set holding only the given elements, in the given
    /// order, carrying over set properties and extended columns.
    pub fn select(&self, indices: &[usize]) -> Result<Set<T>> {
        let mut out = Set::new(self.schema.clone(), self.elem_schema.clone());
        let out_bsize = out.bsize();
        out.buffer[out_bsize..].copy_from_slice(&self.buffer[self.bsize()..]);
        out.ext_props = self.ext_props.clone();
        for (key, default) in self.ext_keys.iter().zip(&self.ext_defaults) {
            out.add_extend_elem_prop(key, default);
        }
        for &index in indices {
            if index >= self.size {
                return Err(Error::out_of_range(index, self.size));
            }
            let row = self.get_extend_elem_prop_row(index)?;
            out.push_back_with_props(&self.elem_data(index), &row)?;
        }
        if self.is_uniform() {
            out.freeze_elem_degree(false)?;
        }
        Ok(out)
    }

    /// Reorder into a new set so that `out[indices[i]] == self[i]`.
    /// `indices` must be a full permutation of `0..size()`.
    pub fn permute(&self, indices: &[usize]) -> Result<Set<T>> {
        if indices.len() != self.size {
            return Err(Error::precondition(format!(
                "permutation length {} does not match set size {}",
                indices.len(),
                self.size
            )));
        }
        let mut inverse = vec![usize::MAX; self.size];
        for (i, &target) in indices.iter().enumerate() {
            if target >= self.size || inverse[target] != usize::MAX {
                return Err(Error::precondition(
                    "permutation indices must use every position exactly once",
                ));
            }
            inverse[target] = i;
        }
        self.select(&inverse)
    }

    // === Set-wide scalar properties ===

    /// Set property at `index` (schema order).
    #[inline]
    pub fn prop(&self, index: usize) -> f64 {
        self.buffer[self.bsize() + index]
    }

    /// Overwrite set property `index`.
    pub fn set_prop(&mut self, index: usize, value: f64) {
        let base = self.bsize();
        self.buffer[base + index] = value;
    }

    /// Set property by name, validated against the schema.
    pub fn prop_by_name(&self, name: &str) -> Result<f64> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        Ok(self.prop(index))
    }

    /// Overwrite a set property by name.
    pub fn set_prop_by_name(&mut self, name: &str, value: f64) -> Result<()> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        self.set_prop(index, value);
        Ok(())
    }

    /// True when the set schema holds `name`.
    pub fn has_prop(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    /// Add a set property, or overwrite it when already present.
    pub fn add_prop(&mut self, name: &str, value: f64) {
        if let Some(index) = self.schema.index_of(name) {
            self.set_prop(index, value);
            return;
        }
        let pos = self.schema.insert_position(name);
        let base = self.bsize();
        self.schema = self.schema.with(name);
        self.buffer.insert(base + pos, value);
    }

    /// Remove a set property. `KeyNotFound` when absent.
    pub fn remove_prop(&mut self, name: &str) -> Result<()> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        let base = self.bsize();
        self.buffer.remove(base + index);
        self.schema = self.schema.without(name);
        Ok(())
    }

    /// The reserved base-intensity property, 1.0 when absent.
    pub fn base_intensity(&self) -> f64 {
        self.prop_by_name(BASE_INTENSITY_PROP).unwrap_or(1.0)
    }

    /// Set (adding when absent) the reserved base-intensity property.
    pub fn set_base_intensity(&mut self, value: f64) {
        self.add_prop(BASE_INTENSITY_PROP, value);
    }

    // === Per-element scalar properties ===

    /// Add a per-element scalar property, inserting one slot into every
    /// element's span filled with `default`. When already present, every
    /// element's value is reset to `default` instead.
    pub fn add_elem_prop(&mut self, name: &str, default: f64) {
        if let Some(index) = self.elem_schema.index_of(name) {
            for i in 0..self.size {
                self.elem_mut(i).set_prop(index, default);
            }
            return;
        }
        let pos = self.elem_schema.insert_position(name);
        let new_schema = self.elem_schema.with(name);
        self.rebuild_elem_props(new_schema, |props, out| {
            out.extend_from_slice(&props[..pos]);
            out.push(default);
            out.extend_from_slice(&props[pos..]);
        });
    }

    /// Remove a per-element scalar property, deleting its slot from every
    /// element's span. `KeyNotFound` when absent and `ignore_missing` is
    /// false.
    pub fn remove_elem_prop(&mut self, name: &str, ignore_missing: bool) -> Result<()> {
        let Some(pos) = self.elem_schema.index_of(name) else {
            if ignore_missing {
                return Ok(());
            }
            return Err(Error::KeyNotFound(name.to_string()));
        };
        let new_schema = self.elem_schema.without(name);
        self.rebuild_elem_props(new_schema, |props, out| {
            out.extend_from_slice(&props[..pos]);
            out.extend_from_slice(&props[pos + 1..]);
        });
        Ok(())
    }

    /// Rewrite the buffer element by element with a new element schema,
    /// mapping each old property block through `remap`.
    fn rebuild_elem_props(&mut self, new_schema: Schema, remap: impl Fn(&[f64], &mut Vec<f64>)) {
        let old_props = self.elem_schema.len();
        let new_props = new_schema.len();
        let mut buffer = Vec::with_capacity(self.buffer.len() + self.size);
        let mut row_ends = Vec::with_capacity(self.size);
        let mut degrees = Vec::with_capacity(self.size);
        for i in 0..self.size {
            let start = self.layout.row_start(i);
            let end = self.layout.row_end(i);
            let span = &self.buffer[start..end];
            let rows = span.len() - old_props;
            buffer.extend_from_slice(&span[..rows]);
            remap(&span[rows..], &mut buffer);
            row_ends.push(buffer.len());
            degrees.push(self.layout.degree(i));
        }
        buffer.extend_from_slice(&self.buffer[self.bsize()..]);
        self.layout = match &self.layout {
            Layout::Fixed { degree, row_vsize } => {
                Layout::fixed(*degree, row_vsize + new_props - old_props)
            }
            Layout::Variable { .. } => Layout::Variable { row_ends, degrees },
        };
        self.buffer = buffer;
        self.elem_schema = new_schema;
    }

    // === Extended set properties ===

    /// True when the extended set property `key` exists.
    pub fn has_extend_prop(&self, key: &str) -> bool {
        self.ext_props.contains_key(key)
    }

    /// Extended set property by key. `KeyNotFound` when absent.
    pub fn get_extend_prop(&self, key: &str) -> Result<&str> {
        self.ext_props
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Set (or add) an extended set property.
    pub fn set_extend_prop(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ext_props.insert(key.into(), value.into());
    }

    /// All extended set properties.
    pub fn extend_props(&self) -> &BTreeMap<String, String> {
        &self.ext_props
    }

    /// Replace all extended set properties.
    pub fn set_extend_props(&mut self, props: BTreeMap<String, String>) {
        self.ext_props = props;
    }

    // === Extended element columns ===

    /// Number of extended element columns.
    #[inline]
    pub fn num_extend_elem_props(&self) -> usize {
        self.ext_keys.len()
    }

    /// Column keys, sorted.
    pub fn extend_elem_prop_keys(&self) -> Vec<String> {
        let mut keys = self.ext_keys.clone();
        keys.sort();
        keys
    }

    /// True when the column `key` exists.
    pub fn has_extend_elem_prop(&self, key: &str) -> bool {
        self.ext_keys.iter().any(|k| k == key)
    }

    fn key_index(&self, key: &str) -> Result<usize> {
        self.ext_keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Register an extended element column with a default value. When the
    /// key already exists only its default is replaced.
    pub fn add_extend_elem_prop(&mut self, key: impl Into<String>, default: impl Into<String>) {
        let key = key.into();
        let default = default.into();
        if let Ok(index) = self.key_index(&key) {
            self.ext_defaults[index] = default;
            return;
        }
        self.ext_values.push(vec![default.clone(); self.size]);
        self.ext_keys.push(key);
        self.ext_defaults.push(default);
    }

    /// Drop an extended element column. Absent keys are ignored.
    pub fn remove_extend_elem_prop(&mut self, key: &str) {
        if let Ok(index) = self.key_index(key) {
            self.ext_keys.remove(index);
            self.ext_defaults.remove(index);
            self.ext_values.remove(index);
        }
    }

    /// Drop every extended element column.
    pub fn clear_extend_elem_props(&mut self) {
        self.ext_keys.clear();
        self.ext_defaults.clear();
        self.ext_values.clear();
    }

    /// Set one cell of an extended element column.
    pub fn set_extend_elem_prop(
        &mut self,
        key: &str,
        value: impl Into<String>,
        index: usize,
    ) -> Result<()> {
        if index >= self.size {
            return Err(Error::out_of_range(index, self.size));
        }
        let key_i = self.key_index(key)?;
        self.ext_values[key_i][index] = value.into();
        Ok(())
    }

    /// Read one cell of an extended element column.
    pub fn get_extend_elem_prop(&self, key: &str, index: usize) -> Result<&str> {
        if index >= self.size {
            return Err(Error::out_of_range(index, self.size));
        }
        let key_i = self.key_index(key)?;
        Ok(&self.ext_values[key_i][index])
    }

    /// All extended values of element `index` as a key-to-value map.
    pub fn get_extend_elem_prop_row(&self, index: usize) -> Result<BTreeMap<String, String>> {
        if index >= self.size {
            return Err(Error::out_of_range(index, self.size));
        }
        let mut row = BTreeMap::new();
        for (key, col) in self.ext_keys.iter().zip(&self.ext_values) {
            row.insert(key.clone(), col[index].clone());
        }
        Ok(row)
    }

    /// Fill element `index`'s cells from a key-to-value map. Keys absent from
    /// the map use the column default when `lenient`, and fail with
    /// `PropertyRowMismatch` otherwise.
    pub fn set_extend_elem_prop_row(
        &mut self,
        row: &BTreeMap<String, String>,
        index: usize,
        lenient: bool,
    ) -> Result<()> {
        if index >= self.size {
            return Err(Error::out_of_range(index, self.size));
        }
        for key_i in 0..self.ext_keys.len() {
            let value = match row.get(&self.ext_keys[key_i]) {
                Some(v) => v.clone(),
                None if lenient => self.ext_defaults[key_i].clone(),
                None => return Err(Error::PropertyRowMismatch(self.ext_keys[key_i].clone())),
            };
            self.ext_values[key_i][index] = value;
        }
        Ok(())
    }

    /// (Re)number the `bundle_index` column 0..size.
    pub fn reset_bundle_indices(&mut self) {
        if !self.has_extend_elem_prop(BUNDLE_INDEX_EPROP) {
            self.add_extend_elem_prop(BUNDLE_INDEX_EPROP, "-1");
        }
        for i in 0..self.size {
            // key is known to exist and the index is in range
            let _ = self.set_extend_elem_prop(BUNDLE_INDEX_EPROP, i.to_string(), i);
        }
    }

    // === Degree representation ===

    /// Convert per-element degrees to a single fixed degree. Fails with
    /// `DegreeMismatch` when the elements are not actually uniform, unless
    /// `best_effort` (then it silently stays freed).
    pub fn freeze_elem_degree(&mut self, best_effort: bool) -> Result<()> {
        match self.layout.freeze(self.size) {
            Ok(layout) => {
                self.layout = layout;
                Ok(())
            }
            Err(_) if best_effort => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Convert a fixed degree to per-element degrees, allowing mixed-degree
    /// pushes afterwards.
    pub fn free_elem_degree(&mut self) {
        self.layout = self.layout.free(self.size);
    }

    // === Persistence dispatch ===

    /// Load a set from `path`. `.txt` selects the text encoding, anything
    /// else the binary encoding declared in the file header.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = crate::stream::Reader::<T>::open(path)?;
        Self::load_from(&mut reader)
    }

    /// Load a set through an already-open element reader, honoring the
    /// size hints in its header when present.
    pub fn load_from(reader: &mut crate::stream::Reader<T>) -> Result<Self> {
        use crate::stream::{ELEM_DEGREE_HINT, ELEM_VSIZE_HINT, NUM_ELEMS_HINT};

        let mut ext_props = reader.extend_props().clone();
        let mut schema_values: Vec<(String, f64)> = Vec::new();
        for &key in SET_INTRINSIC_PROPS {
            if let Some(value) = ext_props.remove(key) {
                let value = value.parse::<f64>().map_err(|_| {
                    Error::format(format!("header property '{key}' is not a number"))
                })?;
                schema_values.push((key.to_string(), value));
            }
        }

        let hints = (
            ext_props.remove(NUM_ELEMS_HINT),
            ext_props.remove(ELEM_DEGREE_HINT),
            ext_props.remove(ELEM_VSIZE_HINT),
        );

        let schema = Schema::new(schema_values.iter().map(|(k, _)| k.clone()));
        let elem_schema = reader.schema().clone();

        let mut set = if let (Some(n), Some(d), Some(_v)) = hints {
            let n = n
                .parse::<usize>()
                .map_err(|_| Error::format("bad element count hint"))?;
            let d = d
                .parse::<usize>()
                .map_err(|_| Error::format("bad element degree hint"))?;
            Set::with_size(n, d, schema, elem_schema, UNSET)
        } else {
            Set::new(schema, elem_schema)
        };
        for (key, value) in &schema_values {
            set.set_prop_by_name(key, *value)?;
        }
        set.ext_props = ext_props;
        for key in reader.extend_keys() {
            set.add_extend_elem_prop(key.clone(), "");
        }

        let mut count = 0usize;
        while let Some((elem, props_row)) = reader.next()? {
            if elem.degree() == 0 {
                warn!("omitting element {count}: its degree is 0");
                continue;
            }
            // A degree change mid-stream abandons the uniform pre-size.
            if set.size() > 0 && set.uniform_degree().is_some_and(|d| d != elem.degree()) {
                set.resize(count.min(set.size()), UNSET, None)?;
                set.free_elem_degree();
            }
            if count >= set.size() {
                set.push_back_with_props(&elem, &props_row)?;
            } else {
                set.elem_mut(count).assign(&elem)?;
                set.set_extend_elem_prop_row(&props_row, count, true)?;
            }
            count += 1;
        }
        if set.size() > count {
            set.resize(count, UNSET, None)?;
        }
        if set.is_empty() {
            warn!("no elements loaded");
        }
        set.freeze_elem_degree(true)?;
        Ok(set)
    }

    /// Save the set to `path`. `.txt` selects the text encoding.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        use crate::stream::{Coding, Writer, ELEM_DEGREE_HINT, ELEM_VSIZE_HINT, NUM_ELEMS_HINT};

        let path = path.as_ref();
        let mut file_props = self.ext_props.clone();
        for (i, name) in self.schema.names().iter().enumerate() {
            file_props.insert(name.clone(), self.prop(i).to_string());
        }
        if let Layout::Fixed { degree, row_vsize } = &self.layout {
            file_props.insert(NUM_ELEMS_HINT.to_string(), self.size.to_string());
            file_props.insert(ELEM_DEGREE_HINT.to_string(), degree.to_string());
            file_props.insert(ELEM_VSIZE_HINT.to_string(), row_vsize.to_string());
        }
        let mut writer = Writer::<T>::create(
            path,
            self.elem_schema.clone(),
            self.extend_elem_prop_keys(),
            file_props,
            Coding::for_path(path),
        )?;
        for i in 0..self.size {
            let row = self.get_extend_elem_prop_row(i)?;
            writer.append(&self.elem_data(i), &row)?;
        }
        writer.close()
    }
}

impl<T: Fibre> fmt::Debug for Set<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Set")
            .field("kind", &T::NAME)
            .field("size", &self.size)
            .field("layout", &self.layout)
            .field("schema", &self.schema)
            .field("elem_schema", &self.elem_schema)
            .field("extend_elem_props", &self.ext_keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Strand;
    use glam::dvec3;

    fn strand(degree: usize, seed: f64, acs: f64) -> ElementData {
        let rows: Vec<_> = (0..degree)
            .map(|i| dvec3(seed + i as f64, seed * 2.0, -(i as f64)))
            .collect();
        let mut e = ElementData::from_rows(&rows, Schema::new(["acs"]));
        e.set_prop_by_name("acs", acs).unwrap();
        e
    }

    fn sample_set() -> Set<Strand> {
        let mut set = Set::new(Schema::empty(), Schema::new(["acs"]));
        set.push_back(&strand(3, 1.0, 1.0)).unwrap();
        set.push_back(&strand(3, 2.0, 2.0)).unwrap();
        set.push_back(&strand(3, 3.0, 3.0)).unwrap();
        set
    }

    #[test]
    fn test_push_back_geometry() {
        let set = sample_set();
        assert_eq!(set.size(), 3);
        assert_eq!(set.bsize() + set.num_props(), set.vsize());
        assert_eq!(set.elem(1).prop_by_name("acs").unwrap(), 2.0);
        assert_eq!(set.elem(2).row(0), dvec3(3.0, 6.0, 0.0));
    }

    #[test]
    fn test_push_back_schema_mismatch() {
        let mut set = sample_set();
        let wrong = ElementData::from_rows(&[dvec3(0.0, 0.0, 0.0)], Schema::empty());
        assert!(matches!(
            set.push_back(&wrong),
            Err(Error::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_degree_enforcement() {
        let mut set = sample_set();
        set.freeze_elem_degree(false).unwrap();
        let short = strand(2, 9.0, 0.5);
        assert!(matches!(
            set.push_back(&short),
            Err(Error::DegreeMismatch { .. })
        ));
        set.free_elem_degree();
        set.push_back(&short).unwrap();
        assert_eq!(set.size(), 4);
        assert_eq!(set.elem_degree(3), 2);
        // Heterogeneous now, so freezing must fail unless best-effort.
        assert!(set.freeze_elem_degree(false).is_err());
        set.freeze_elem_degree(true).unwrap();
        assert!(!set.is_uniform());
    }

    #[test]
    fn test_insert_erase_shift() {
        let mut set = sample_set();
        set.add_prop("base_intensity", 0.5);
        let before: Vec<f64> = set.elem(1).values().to_vec();
        set.insert(&strand(3, 9.0, 9.0), 1).unwrap();
        assert_eq!(set.size(), 4);
        assert_eq!(set.elem(1).prop(0), 9.0);
        assert_eq!(set.elem(2).values(), &before[..]);
        assert_eq!(set.prop_by_name("base_intensity").unwrap(), 0.5);
        set.erase(1).unwrap();
        assert_eq!(set.elem(1).values(), &before[..]);
        assert_eq!(set.bsize() + set.num_props(), set.vsize());
        assert!(matches!(
            set.erase(10),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_elem_prop_add_remove_inverse() {
        let mut set = sample_set();
        let before = set.buffer.clone();
        set.add_elem_prop("width", 7.0);
        assert_eq!(set.elem_schema().names(), &["acs", "width"]);
        assert_eq!(set.elem(1).prop_by_name("width").unwrap(), 7.0);
        assert_eq!(set.elem(1).prop_by_name("acs").unwrap(), 2.0);
        assert_eq!(set.bsize() + set.num_props(), set.vsize());
        set.remove_elem_prop("width", false).unwrap();
        assert_eq!(set.buffer, before);
        assert!(matches!(
            set.remove_elem_prop("width", false),
            Err(Error::KeyNotFound(_))
        ));
        set.remove_elem_prop("width", true).unwrap();
    }

    #[test]
    fn test_set_prop_block_tracks_mutation() {
        let mut set = sample_set();
        set.add_prop("base_intensity", 2.0);
        set.push_back(&strand(3, 4.0, 4.0)).unwrap();
        assert_eq!(set.prop_by_name("base_intensity").unwrap(), 2.0);
        set.erase(0).unwrap();
        assert_eq!(set.prop_by_name("base_intensity").unwrap(), 2.0);
        set.remove_prop("base_intensity").unwrap();
        assert_eq!(set.num_props(), 0);
        assert!(matches!(
            set.remove_prop("base_intensity"),
            Err(Error::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_extended_columns_track_mutation() {
        let mut set = sample_set();
        set.add_extend_elem_prop("bundle_index", "-1");
        set.set_extend_elem_prop("bundle_index", "7", 1).unwrap();
        set.insert(&strand(3, 5.0, 5.0), 0).unwrap();
        assert_eq!(set.get_extend_elem_prop("bundle_index", 0).unwrap(), "-1");
        assert_eq!(set.get_extend_elem_prop("bundle_index", 2).unwrap(), "7");
        set.erase(0).unwrap();
        assert_eq!(set.get_extend_elem_prop("bundle_index", 1).unwrap(), "7");
        assert!(matches!(
            set.get_extend_elem_prop("missing", 0),
            Err(Error::KeyNotFound(_))
        ));
        assert!(matches!(
            set.get_extend_elem_prop("bundle_index", 33),
            Err(Error::IndexOutOfRange { .. })
        ));
        // Column length equals size after every mutation.
        for col in &set.ext_values {
            assert_eq!(col.len(), set.size());
        }
    }

    #[test]
    fn test_row_strictness() {
        let mut set = sample_set();
        set.add_extend_elem_prop("label", "x");
        let row = BTreeMap::new();
        assert!(matches!(
            set.set_extend_elem_prop_row(&row, 0, false),
            Err(Error::PropertyRowMismatch(_))
        ));
        set.set_extend_elem_prop_row(&row, 0, true).unwrap();
        assert_eq!(set.get_extend_elem_prop("label", 0).unwrap(), "x");
    }

    #[test]
    fn test_select() {
        let mut set = sample_set();
        set.add_prop("base_intensity", 0.25);
        set.add_extend_elem_prop("bundle_index", "-1");
        set.set_extend_elem_prop("bundle_index", "2", 2).unwrap();
        set.freeze_elem_degree(false).unwrap();

        let picked = set.select(&[2, 0]).unwrap();
        assert_eq!(picked.size(), 2);
        assert_eq!(picked.elem(0).prop_by_name("acs").unwrap(), 3.0);
        assert_eq!(picked.elem(1).prop_by_name("acs").unwrap(), 1.0);
        assert_eq!(picked.get_extend_elem_prop("bundle_index", 0).unwrap(), "2");
        assert_eq!(picked.prop_by_name("base_intensity").unwrap(), 0.25);
        assert!(picked.is_uniform());

        assert!(matches!(
            set.select(&[5]),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_permute() {
        let set = sample_set();
        let permuted = set.permute(&[2, 0, 1]).unwrap();
        // permuted[indices[i]] == set[i]
        assert_eq!(permuted.elem(2).prop(0), set.elem(0).prop(0));
        assert_eq!(permuted.elem(0).prop(0), set.elem(1).prop(0));
        assert_eq!(permuted.elem(1).prop(0), set.elem(2).prop(0));
        assert!(set.permute(&[0, 0, 1]).is_err());
        assert!(set.permute(&[0, 1]).is_err());
    }

    #[test]
    fn test_resize() {
        let mut set = sample_set();
        set.add_extend_elem_prop("label", "d");
        let untouched: Vec<f64> = set.elem(0).values().to_vec();
        set.resize(5, 0.0, Some(3)).unwrap();
        assert_eq!(set.size(), 5);
        assert_eq!(set.elem(0).values(), &untouched[..]);
        assert!(set.elem(4).values().iter().all(|v| *v == 0.0));
        assert_eq!(set.get_extend_elem_prop("label", 4).unwrap(), "d");
        set.resize(2, 0.0, None).unwrap();
        assert_eq!(set.size(), 2);
        assert_eq!(set.bsize() + set.num_props(), set.vsize());
    }

    #[test]
    fn test_reset_bundle_indices() {
        let mut set = sample_set();
        set.reset_bundle_indices();
        assert_eq!(set.get_extend_elem_prop(BUNDLE_INDEX_EPROP, 2).unwrap(), "2");
    }

    #[test]
    fn test_base_intensity_default() {
        let mut set = sample_set();
        assert_eq!(set.base_intensity(), 1.0);
        set.set_base_intensity(0.5);
        assert_eq!(set.base_intensity(), 0.5);
    }

    #[test]
    fn test_append() {
        let mut a = sample_set();
        let b = sample_set();
        a.append(&b).unwrap();
        assert_eq!(a.size(), 6);
        assert_eq!(a.elem(5).prop(0), 3.0);
    }
}
