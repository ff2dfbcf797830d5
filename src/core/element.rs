//! Element views and owned element data.
//!
//! An element is `degree` coordinate rows followed by the scalar-property
//! slots of its schema, flattened into `degree * ROW_WIDTH + schema.len()`
//! buffer slots. [`Element`]/[`ElementMut`] are views over a slice of a
//! set's buffer; [`ElementData`] owns its slots and is what gets pushed
//! into a set or returned from a reader.

use std::ops::{Add, AddAssign, Mul, MulAssign, Sub, SubAssign};

use glam::DVec3;

use super::{Schema, ROW_WIDTH, UNSET};
use crate::util::{Error, Result};

/// Immutable view over one element's buffer slice.
#[derive(Clone, Copy)]
pub struct Element<'a> {
    values: &'a [f64],
    degree: usize,
    schema: &'a Schema,
}

impl<'a> Element<'a> {
    /// Wrap a buffer slice. `values.len()` must equal
    /// `degree * ROW_WIDTH + schema.len()`.
    pub(crate) fn new(values: &'a [f64], degree: usize, schema: &'a Schema) -> Self {
        debug_assert_eq!(values.len(), degree * ROW_WIDTH + schema.len());
        Self { values, degree, schema }
    }

    /// Number of coordinate rows.
    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Total slot count (rows plus property slots).
    #[inline]
    pub fn vsize(&self) -> usize {
        self.values.len()
    }

    /// Slot count of the coordinate rows alone.
    #[inline]
    pub fn bsize(&self) -> usize {
        self.degree * ROW_WIDTH
    }

    /// The shared scalar-property schema.
    #[inline]
    pub fn schema(&self) -> &Schema {
        self.schema
    }

    /// All slots, rows first then properties.
    #[inline]
    pub fn values(&self) -> &[f64] {
        self.values
    }

    /// Coordinate row `index`.
    #[inline]
    pub fn row(&self, index: usize) -> DVec3 {
        let base = index * ROW_WIDTH;
        DVec3::new(self.values[base], self.values[base + 1], self.values[base + 2])
    }

    /// Iterate over the coordinate rows.
    pub fn rows(&self) -> impl Iterator<Item = DVec3> + '_ {
        (0..self.degree).map(|i| self.row(i))
    }

    /// Scalar property at `index` (schema order).
    #[inline]
    pub fn prop(&self, index: usize) -> f64 {
        self.values[self.bsize() + index]
    }

    /// Scalar property by name, validated against the schema.
    pub fn prop_by_name(&self, name: &str) -> Result<f64> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        Ok(self.prop(index))
    }

    /// Squared 2-norm over every slot (rows and properties).
    pub fn norm2(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// 2-norm over every slot.
    pub fn norm(&self) -> f64 {
        self.norm2().sqrt()
    }

    /// Copy into an owned element.
    pub fn to_data(&self) -> ElementData {
        ElementData {
            values: self.values.to_vec(),
            degree: self.degree,
            schema: self.schema.clone(),
        }
    }
}

/// Mutable view over one element's buffer slice.
///
/// A view can overwrite existing slots but never resize them; structural
/// changes go through the owning set.
pub struct ElementMut<'a> {
    values: &'a mut [f64],
    degree: usize,
    schema: &'a Schema,
}

impl<'a> ElementMut<'a> {
    pub(crate) fn new(values: &'a mut [f64], degree: usize, schema: &'a Schema) -> Self {
        debug_assert_eq!(values.len(), degree * ROW_WIDTH + schema.len());
        Self { values, degree, schema }
    }

    /// Reborrow as an immutable view.
    pub fn as_element(&self) -> Element<'_> {
        Element::new(&*self.values, self.degree, self.schema)
    }

    /// Number of coordinate rows.
    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Slot count of the coordinate rows alone.
    #[inline]
    pub fn bsize(&self) -> usize {
        self.degree * ROW_WIDTH
    }

    /// Coordinate row `index`.
    #[inline]
    pub fn row(&self, index: usize) -> DVec3 {
        self.as_element().row(index)
    }

    /// Overwrite coordinate row `index`.
    pub fn set_row(&mut self, index: usize, row: DVec3) {
        let base = index * ROW_WIDTH;
        self.values[base] = row.x;
        self.values[base + 1] = row.y;
        self.values[base + 2] = row.z;
    }

    /// Scalar property at `index` (schema order).
    #[inline]
    pub fn prop(&self, index: usize) -> f64 {
        self.values[self.bsize() + index]
    }

    /// Overwrite scalar property `index`.
    pub fn set_prop(&mut self, index: usize, value: f64) {
        let base = self.bsize();
        self.values[base + index] = value;
    }

    /// Overwrite a scalar property by name, validated against the schema.
    pub fn set_prop_by_name(&mut self, name: &str, value: f64) -> Result<()> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        self.set_prop(index, value);
        Ok(())
    }

    /// Set every slot to zero.
    pub fn zero(&mut self) {
        self.values.fill(0.0);
    }

    /// Set every slot to the unset sentinel.
    pub fn invalidate(&mut self) {
        self.values.fill(UNSET);
    }

    /// Overwrite all slots from an owned element. The source must have the
    /// same slot count and a matching schema; a view can never grow or
    /// shrink the span it aliases.
    pub fn assign(&mut self, data: &ElementData) -> Result<()> {
        if !data.schema.matches(self.schema) {
            return Err(Error::SchemaMismatch {
                elem: data.schema.to_string(),
                set: self.schema.to_string(),
            });
        }
        if data.values.len() != self.values.len() {
            return Err(Error::OwnershipViolation(format!(
                "cannot resize element through a view ({} slots into {})",
                data.values.len(),
                self.values.len()
            )));
        }
        self.values.copy_from_slice(&data.values);
        Ok(())
    }

    /// Multiply every slot by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in self.values.iter_mut() {
            *v *= factor;
        }
    }
}

/// Owned element: flat slot vector plus degree and schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementData {
    values: Vec<f64>,
    degree: usize,
    schema: Schema,
}

impl ElementData {
    /// A new element of `degree` rows, every slot set to the unset
    /// sentinel.
    pub fn new(degree: usize, schema: Schema) -> Self {
        Self {
            values: vec![UNSET; degree * ROW_WIDTH + schema.len()],
            degree,
            schema,
        }
    }

    /// A new element of `degree` rows, every slot zero.
    pub fn zeroed(degree: usize, schema: Schema) -> Self {
        Self {
            values: vec![0.0; degree * ROW_WIDTH + schema.len()],
            degree,
            schema,
        }
    }

    /// Build from coordinate rows; property slots start unset.
    pub fn from_rows(rows: &[DVec3], schema: Schema) -> Self {
        let mut data = Self::new(rows.len(), schema);
        for (i, row) in rows.iter().enumerate() {
            data.set_row(i, *row);
        }
        data
    }

    /// Borrow as an immutable view.
    pub fn as_element(&self) -> Element<'_> {
        Element::new(&self.values, self.degree, &self.schema)
    }

    /// Borrow as a mutable view.
    pub fn as_element_mut(&mut self) -> ElementMut<'_> {
        ElementMut::new(&mut self.values, self.degree, &self.schema)
    }

    /// Number of coordinate rows.
    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Total slot count.
    #[inline]
    pub fn vsize(&self) -> usize {
        self.values.len()
    }

    /// Slot count of the coordinate rows alone.
    #[inline]
    pub fn bsize(&self) -> usize {
        self.degree * ROW_WIDTH
    }

    /// The scalar-property schema.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// All slots, rows first then properties.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Coordinate row `index`.
    #[inline]
    pub fn row(&self, index: usize) -> DVec3 {
        self.as_element().row(index)
    }

    /// Overwrite coordinate row `index`.
    pub fn set_row(&mut self, index: usize, row: DVec3) {
        let base = index * ROW_WIDTH;
        self.values[base] = row.x;
        self.values[base + 1] = row.y;
        self.values[base + 2] = row.z;
    }

    /// Append a coordinate row, growing the element by one degree.
    pub fn push_row(&mut self, row: DVec3) {
        let base = self.bsize();
        self.values
            .splice(base..base, [row.x, row.y, row.z]);
        self.degree += 1;
    }

    /// Iterate over the coordinate rows.
    pub fn rows(&self) -> impl Iterator<Item = DVec3> + '_ {
        (0..self.degree).map(|i| self.row(i))
    }

    /// Scalar property at `index` (schema order).
    #[inline]
    pub fn prop(&self, index: usize) -> f64 {
        self.values[self.bsize() + index]
    }

    /// Scalar property by name, validated against the schema.
    pub fn prop_by_name(&self, name: &str) -> Result<f64> {
        self.as_element().prop_by_name(name)
    }

    /// Overwrite scalar property `index`.
    pub fn set_prop(&mut self, index: usize, value: f64) {
        let base = self.bsize();
        self.values[base + index] = value;
    }

    /// Overwrite a scalar property by name, validated against the schema.
    pub fn set_prop_by_name(&mut self, name: &str, value: f64) -> Result<()> {
        self.as_element_mut().set_prop_by_name(name, value)
    }

    /// Add `name` to this element's schema with the given value.
    pub fn add_prop(&mut self, name: &str, value: f64) {
        if let Some(index) = self.schema.index_of(name) {
            self.set_prop(index, value);
            return;
        }
        let pos = self.schema.insert_position(name);
        self.schema = self.schema.with(name);
        self.values.insert(self.bsize() + pos, value);
    }

    /// Set every slot to zero.
    pub fn zero(&mut self) {
        self.values.fill(0.0);
    }

    /// Set every slot to the unset sentinel.
    pub fn invalidate(&mut self) {
        self.values.fill(UNSET);
    }

    /// Squared 2-norm over every slot.
    pub fn norm2(&self) -> f64 {
        self.as_element().norm2()
    }

    /// 2-norm over every slot.
    pub fn norm(&self) -> f64 {
        self.norm2().sqrt()
    }

    fn check_compatible(&self, other: &ElementData) {
        assert!(
            self.schema.matches(&other.schema) && self.degree == other.degree,
            "elementwise arithmetic requires matching degree and schema"
        );
    }
}

impl AddAssign<&ElementData> for ElementData {
    fn add_assign(&mut self, rhs: &ElementData) {
        self.check_compatible(rhs);
        for (a, b) in self.values.iter_mut().zip(&rhs.values) {
            *a += b;
        }
    }
}

impl SubAssign<&ElementData> for ElementData {
    fn sub_assign(&mut self, rhs: &ElementData) {
        self.check_compatible(rhs);
        for (a, b) in self.values.iter_mut().zip(&rhs.values) {
            *a -= b;
        }
    }
}

impl MulAssign<f64> for ElementData {
    fn mul_assign(&mut self, rhs: f64) {
        for v in self.values.iter_mut() {
            *v *= rhs;
        }
    }
}

impl Add<&ElementData> for ElementData {
    type Output = ElementData;
    fn add(mut self, rhs: &ElementData) -> ElementData {
        self += rhs;
        self
    }
}

impl Sub<&ElementData> for ElementData {
    type Output = ElementData;
    fn sub(mut self, rhs: &ElementData) -> ElementData {
        self -= rhs;
        self
    }
}

impl Mul<f64> for ElementData {
    type Output = ElementData;
    fn mul(mut self, rhs: f64) -> ElementData {
        self *= rhs;
        self
    }
}
