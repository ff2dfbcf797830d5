//! Streaming writer for a sequence of whole sets.
//!
//! Adds one nesting level to [`super::Writer`]: each outer record is a
//! complete set (e.g. one posterior sample). Set-wide properties go to
//! the `<path>x` sidecar, one row per set; the per-element rows of each
//! set go to the `<path>xx` sidecar, closed by a `--- END <n> ---`
//! separator line.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::format::{row_separator, Coding};
use super::sidecar::SidecarWriter;
use super::writer::{elem_sidecar_path, Writer};
use crate::core::Schema;
use crate::geom::Fibre;
use crate::set::Set;
use crate::util::{Error, Result};

/// Writer for a sequence of whole sets.
pub struct SetWriter<T: Fibre> {
    writer: Writer<T>,
    elem_sidecar: Option<SidecarWriter>,
    elem_schema: Schema,
    elem_header: Vec<String>,
}

impl<T: Fibre> SetWriter<T> {
    /// Create a set stream. `schema`/`extend_keys` describe the set-wide
    /// properties (one sidecar row per set), `elem_schema`/
    /// `extend_elem_keys` the per-element columns of the nested sidecar.
    pub fn create(
        path: impl AsRef<Path>,
        schema: Schema,
        elem_schema: Schema,
        extend_keys: Vec<String>,
        extend_elem_keys: Vec<String>,
        file_props: BTreeMap<String, String>,
        coding: Coding,
    ) -> Result<Self> {
        let path = path.as_ref();
        let writer = Writer::create(path, schema, extend_keys, file_props, coding)?;

        let mut elem_header: Vec<String> = elem_schema.names().to_vec();
        elem_header.extend(extend_elem_keys);

        let elem_path = elem_sidecar_path(path);
        let elem_sidecar = if elem_header.is_empty() {
            remove_stale(&elem_path)?;
            None
        } else {
            Some(SidecarWriter::create(&elem_path, elem_header.clone())?)
        };

        Ok(Self {
            writer,
            elem_sidecar,
            elem_schema,
            elem_header,
        })
    }

    /// Sets written so far.
    pub fn count(&self) -> usize {
        self.writer.count()
    }

    /// Append one whole set as a single outer record.
    pub fn append(&mut self, set: &Set<T>) -> Result<()> {
        if !set.schema().matches(self.writer.schema()) {
            return Err(Error::SchemaMismatch {
                elem: set.schema().to_string(),
                set: self.writer.schema().to_string(),
            });
        }
        if !set.elem_schema().matches(&self.elem_schema) {
            return Err(Error::SchemaMismatch {
                elem: set.elem_schema().to_string(),
                set: self.elem_schema.to_string(),
            });
        }

        for i in 0..set.size() {
            let elem = set.elem_data(i);
            self.writer.write_element_body(&elem)?;
        }
        self.writer.write_set_separator()?;

        let values = self
            .writer
            .record_values(|name| set.prop_by_name(name).ok(), set.extend_props())?;
        self.writer.finish_record(&values)?;

        if let Some(sidecar) = &mut self.elem_sidecar {
            for i in 0..set.size() {
                let row = set.get_extend_elem_prop_row(i)?;
                let values: Vec<String> = self
                    .elem_header
                    .iter()
                    .map(|key| {
                        if let Some(prop_i) = self.elem_schema.index_of(key) {
                            Ok(set.elem(i).prop(prop_i).to_string())
                        } else {
                            row.get(key)
                                .cloned()
                                .ok_or_else(|| Error::PropertyRowMismatch(key.clone()))
                        }
                    })
                    .collect::<Result<_>>()?;
                sidecar.write_row(&values)?;
            }
            sidecar.write_line(&row_separator(self.writer.count()))?;
        }
        Ok(())
    }

    /// Finalize and atomically rename all staged files.
    pub fn close(self) -> Result<()> {
        self.writer.close()?;
        if let Some(sidecar) = self.elem_sidecar {
            sidecar.close()?;
        }
        Ok(())
    }
}

fn remove_stale(path: &PathBuf) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
