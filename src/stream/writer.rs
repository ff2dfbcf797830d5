//! Streaming writer for a sequence of fibre elements.
//!
//! Writes the primary stream (header, packed records, end sentinel and
//! count footer) plus the `<path>x` properties sidecar. Output is staged
//! in temp files beside the targets and atomically renamed at close, so a
//! crash mid-write never leaves a truncated file under the target name.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write as _};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use glam::DVec3;
use tempfile::NamedTempFile;
use tracing::debug;

use super::format::{Coding, ELEMENT_SEPARATOR, END_OF_DATA, MAGIC, SET_SEPARATOR};
use super::sidecar::SidecarWriter;
use crate::core::{ElementData, Schema};
use crate::geom::Fibre;
use crate::util::{DataType, Error, Result};

/// Writer for a plain sequence of elements plus its properties sidecar.
pub struct Writer<T: Fibre> {
    out: BufWriter<NamedTempFile>,
    target: PathBuf,
    coding: Coding,
    sidecar: Option<SidecarWriter>,
    schema: Schema,
    prop_header: Vec<String>,
    count: usize,
    total_count: usize,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Fibre> Writer<T> {
    /// Create the primary stream and (when any keys are declared) its
    /// sidecar. `schema` names the scalar properties written from each
    /// record itself; `extend_keys` the string-valued columns supplied
    /// per append.
    pub fn create(
        path: impl AsRef<Path>,
        schema: Schema,
        extend_keys: Vec<String>,
        mut file_props: BTreeMap<String, String>,
        coding: Coding,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!("creating fibre stream {}", path.display());

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;
        let mut out = BufWriter::new(tmp);

        file_props.insert(
            "software version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        writeln!(out, "{MAGIC}")?;
        for (key, value) in &file_props {
            writeln!(out, "{key}: {value}")?;
        }
        if let Coding::Binary(dtype) = coding {
            writeln!(out, "datatype: {}", dtype.specifier())?;
        }
        writeln!(out, "file: .")?;
        writeln!(out, "END")?;

        let mut prop_header: Vec<String> = schema.names().to_vec();
        prop_header.extend(extend_keys);

        let sidecar_path = sidecar_path(path);
        let sidecar = if prop_header.is_empty() {
            // A stale sidecar from a previous save would desynchronize.
            match fs::remove_file(&sidecar_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            None
        } else {
            Some(SidecarWriter::create(&sidecar_path, prop_header.clone())?)
        };

        Ok(Self {
            out,
            target: path.to_path_buf(),
            coding,
            sidecar,
            schema,
            prop_header,
            count: 0,
            total_count: 0,
            _kind: PhantomData,
        })
    }

    /// The scalar-property schema of the records.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The sidecar column keys (scalar keys first, then extended).
    pub fn prop_header(&self) -> &[String] {
        &self.prop_header
    }

    /// Records written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Append one element and its extended-property row. The row must
    /// hold a value for every declared extended key.
    pub fn append(
        &mut self,
        elem: &ElementData,
        props_row: &BTreeMap<String, String>,
    ) -> Result<()> {
        if !elem.schema().matches(&self.schema) {
            return Err(Error::SchemaMismatch {
                elem: elem.schema().to_string(),
                set: self.schema.to_string(),
            });
        }
        self.write_element_body(elem)?;
        let values = self.record_values(
            |name| elem.prop_by_name(name).ok(),
            props_row,
        )?;
        self.finish_record(&values)
    }

    /// Finalize the stream: end sentinel, count footer, flush and rename
    /// both staged files over their targets.
    pub fn close(mut self) -> Result<()> {
        self.write_coord(END_OF_DATA)?;
        writeln!(self.out, "count: {}", self.count)?;
        writeln!(self.out, "total_count: {}", self.total_count)?;
        writeln!(self.out, "END")?;
        let tmp = self
            .out
            .into_inner()
            .map_err(|e| Error::other(format!("stream flush failed: {e}")))?;
        tmp.persist(&self.target)
            .map_err(|e| Error::other(format!("stream rename failed: {e}")))?;
        if let Some(sidecar) = self.sidecar {
            sidecar.close()?;
        }
        debug!("closed fibre stream {}", self.target.display());
        Ok(())
    }

    // === record plumbing shared with SetWriter ===

    /// Write one element's rows closed by the element separator.
    pub(crate) fn write_element_body(&mut self, elem: &ElementData) -> Result<()> {
        for row in elem.rows() {
            self.write_coord(row)?;
        }
        self.write_coord(ELEMENT_SEPARATOR)
    }

    /// Close a nested set record.
    pub(crate) fn write_set_separator(&mut self) -> Result<()> {
        self.write_coord(SET_SEPARATOR)
    }

    /// Resolve the sidecar values of one record: scalar columns from
    /// `scalar`, extended columns from `props_row`.
    pub(crate) fn record_values(
        &self,
        scalar: impl Fn(&str) -> Option<f64>,
        props_row: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        self.prop_header
            .iter()
            .map(|key| {
                if self.schema.contains(key) {
                    Ok(scalar(key)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| f64::NAN.to_string()))
                } else {
                    props_row
                        .get(key)
                        .cloned()
                        .ok_or_else(|| Error::PropertyRowMismatch(key.clone()))
                }
            })
            .collect()
    }

    /// Write the record's sidecar row and bump the running counts.
    pub(crate) fn finish_record(&mut self, values: &[String]) -> Result<()> {
        if let Some(sidecar) = &mut self.sidecar {
            sidecar.write_row(values)?;
        }
        self.count += 1;
        self.total_count += 1;
        Ok(())
    }

    fn write_coord(&mut self, c: DVec3) -> Result<()> {
        match self.coding {
            Coding::Text => {
                writeln!(self.out, "{} {} {}", c.x, c.y, c.z)?;
            }
            Coding::Binary(dtype) => match dtype {
                DataType::Float64LE => {
                    self.out.write_f64::<LittleEndian>(c.x)?;
                    self.out.write_f64::<LittleEndian>(c.y)?;
                    self.out.write_f64::<LittleEndian>(c.z)?;
                }
                DataType::Float64BE => {
                    self.out.write_f64::<BigEndian>(c.x)?;
                    self.out.write_f64::<BigEndian>(c.y)?;
                    self.out.write_f64::<BigEndian>(c.z)?;
                }
                DataType::Float32LE => {
                    self.out.write_f32::<LittleEndian>(c.x as f32)?;
                    self.out.write_f32::<LittleEndian>(c.y as f32)?;
                    self.out.write_f32::<LittleEndian>(c.z as f32)?;
                }
                DataType::Float32BE => {
                    self.out.write_f32::<BigEndian>(c.x as f32)?;
                    self.out.write_f32::<BigEndian>(c.y as f32)?;
                    self.out.write_f32::<BigEndian>(c.z as f32)?;
                }
            },
        }
        Ok(())
    }
}

/// The properties sidecar path of a primary stream (`<path>x`).
pub(crate) fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("x");
    PathBuf::from(name)
}

/// The nested element sidecar path of a set stream (`<path>xx`).
pub(crate) fn elem_sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("xx");
    PathBuf::from(name)
}
