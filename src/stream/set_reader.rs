//! Streaming reader for a sequence of whole sets.
//!
//! The mirror of [`super::SetWriter`]: each outer record is a complete
//! set. Set-wide properties come from the `<path>x` sidecar row; the
//! inner extended-property table is rebuilt from the `<path>xx` rows up
//! to the record's `--- END <n> ---` separator.

use std::collections::BTreeMap;
use std::path::Path;

use super::format::{self, is_row_separator};
use super::reader::Reader;
use super::sidecar::SidecarReader;
use super::writer::elem_sidecar_path;
use crate::core::{ElementData, Schema};
use crate::geom::Fibre;
use crate::set::{Set, SET_INTRINSIC_PROPS};
use crate::util::{Error, Result};

/// Reader for a sequence of whole sets.
pub struct SetReader<T: Fibre> {
    reader: Reader<T>,
    elem_sidecar: Option<SidecarReader>,
    elem_schema: Schema,
    extend_elem_keys: Vec<String>,
}

impl<T: Fibre> SetReader<T> {
    /// Open a set stream.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = Reader::open_with(path, SET_INTRINSIC_PROPS)?;

        let elem_sidecar = SidecarReader::open(&elem_sidecar_path(path))?;
        let (elem_schema, extend_elem_keys) = match &elem_sidecar {
            Some(sidecar) => {
                let mut scalar = Vec::new();
                let mut extended = Vec::new();
                for key in sidecar.header() {
                    if T::INTRINSIC_PROPS.contains(&key.as_str()) {
                        scalar.push(key.clone());
                    } else {
                        extended.push(key.clone());
                    }
                }
                (Schema::new(scalar), extended)
            }
            None => (Schema::empty(), Vec::new()),
        };

        Ok(Self {
            reader,
            elem_sidecar,
            elem_schema,
            extend_elem_keys,
        })
    }

    /// Free-form header properties of the stream.
    pub fn extend_props(&self) -> &BTreeMap<String, String> {
        self.reader.extend_props()
    }

    /// Sets read so far.
    pub fn count(&self) -> usize {
        self.reader.count()
    }

    /// Read the next whole set. `Ok(None)` once the end sentinel is
    /// reached.
    pub fn next(&mut self) -> Result<Option<Set<T>>> {
        if self.reader.is_finished() {
            return Ok(None);
        }
        let first = self.reader.read_coord()?;
        if format::is_end_of_data(first) {
            self.reader.set_finished();
            self.reader.finish_stream()?;
            if let Some(sidecar) = &mut self.elem_sidecar {
                if sidecar.next_line()?.is_some() {
                    return Err(Error::Desync(
                        "element sidecar holds rows past the last set record".into(),
                    ));
                }
            }
            return Ok(None);
        }

        // Set body: element records up to the set separator.
        let mut elements: Vec<Vec<glam::DVec3>> = Vec::new();
        let mut coord = first;
        loop {
            if format::is_set_separator(coord) {
                break;
            }
            let mut rows = Vec::new();
            while !format::is_element_separator(coord) {
                if format::is_end_of_data(coord) || format::is_set_separator(coord) {
                    return Err(Error::format("unterminated element record in set"));
                }
                rows.push(coord);
                coord = self.reader.read_coord()?;
            }
            elements.push(rows);
            coord = self.reader.read_coord()?;
        }

        let mut set: Set<T> = Set::new(self.reader.schema().clone(), self.elem_schema.clone());
        for rows in &elements {
            set.push_back(&ElementData::from_rows(rows, self.elem_schema.clone()))?;
        }

        // Set-wide properties from the record's sidecar row.
        if self.reader.has_sidecar() {
            let row = self.reader.sidecar_next_row()?.ok_or_else(|| {
                Error::Desync("no corresponding row found in set properties file".into())
            })?;
            let names: Vec<String> = self.reader.schema().names().to_vec();
            for name in &names {
                if let Some(value) = row.get(name) {
                    let value = value.parse::<f64>().map_err(|_| {
                        Error::format(format!("set property '{name}' is not a number"))
                    })?;
                    set.set_prop_by_name(name, value)?;
                }
            }
            let extend: Vec<String> = self.reader.extend_keys().to_vec();
            for key in &extend {
                if let Some(value) = row.get(key) {
                    set.set_extend_prop(key.clone(), value.clone());
                }
            }
        }

        // Per-element rows up to the record separator.
        if let Some(sidecar) = &mut self.elem_sidecar {
            for key in &self.extend_elem_keys {
                set.add_extend_elem_prop(key.clone(), "");
            }
            let mut index = 0usize;
            loop {
                let line = sidecar.next_line()?.ok_or_else(|| {
                    Error::Desync("set properties rows are incomplete".into())
                })?;
                if is_row_separator(&line) {
                    break;
                }
                if index >= set.size() {
                    return Err(Error::format(
                        "loaded properties contain more rows than elements in the set",
                    ));
                }
                let row = sidecar.parse_row(&line)?;
                for (prop_i, name) in self.elem_schema.names().iter().enumerate() {
                    if let Some(value) = row.get(name) {
                        let value = value.parse::<f64>().map_err(|_| {
                            Error::format(format!(
                                "element property '{name}' is not a number"
                            ))
                        })?;
                        set.elem_mut(index).set_prop(prop_i, value);
                    }
                }
                let mut ext_row = BTreeMap::new();
                for key in &self.extend_elem_keys {
                    if let Some(value) = row.get(key) {
                        ext_row.insert(key.clone(), value.clone());
                    }
                }
                set.set_extend_elem_prop_row(&ext_row, index, true)?;
                index += 1;
            }
        }

        self.reader.mark_record();
        Ok(Some(set))
    }

    /// Reseat all streams to their post-header positions.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader.rewind()?;
        if let Some(sidecar) = &mut self.elem_sidecar {
            sidecar.rewind()?;
        }
        Ok(())
    }
}
