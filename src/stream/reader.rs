//! Streaming reader for a sequence of fibre elements.
//!
//! Parses the primary stream header, then yields one record at a time in
//! lock-step with the `<path>x` properties sidecar. The stream ends at
//! the end-of-data sentinel; the count footer, when present, is validated
//! against the number of records actually read.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use glam::DVec3;
use smallvec::SmallVec;
use tracing::debug;

use super::format::{self, Coding, MAGIC};
use super::sidecar::SidecarReader;
use super::writer::sidecar_path;
use crate::core::{ElementData, Schema};
use crate::geom::Fibre;
use crate::util::{DataType, Error, Result};

/// Reader for a plain sequence of elements plus its properties sidecar.
pub struct Reader<T: Fibre> {
    input: BufReader<File>,
    coding: Coding,
    begin: u64,
    ext_props: BTreeMap<String, String>,
    sidecar: Option<SidecarReader>,
    schema: Schema,
    extend_keys: Vec<String>,
    tokens: VecDeque<f64>,
    count: usize,
    finished: bool,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Fibre> Reader<T> {
    /// Open a stream of elements of kind `T`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, T::INTRINSIC_PROPS)
    }

    /// Open a stream, splitting the sidecar header into scalar-property
    /// keys (those in `intrinsics`) and extended keys.
    pub fn open_with(
        path: impl AsRef<Path>,
        intrinsics: &'static [&'static str],
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!("opening fibre stream {}", path.display());
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        let mut input = BufReader::new(file);
        let mut consumed = 0u64;

        let mut line = String::new();
        consumed += input.read_line(&mut line)? as u64;
        if line.trim_end() != MAGIC {
            return Err(Error::format(format!(
                "expected magic line '{MAGIC}' at start of fibre stream"
            )));
        }

        let mut ext_props = BTreeMap::new();
        let mut dtype: Option<DataType> = None;
        loop {
            line.clear();
            let n = input.read_line(&mut line)?;
            if n == 0 {
                return Err(Error::format("stream header is not closed by END"));
            }
            consumed += n as u64;
            let trimmed = line.trim_end();
            if trimmed == "END" {
                break;
            }
            let Some((key, value)) = trimmed.split_once(':') else {
                return Err(Error::format(format!("malformed header line '{trimmed}'")));
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();
            match key.as_str() {
                "datatype" => dtype = Some(DataType::parse(value)?),
                "file" | "roi" => {}
                _ => {
                    ext_props.insert(key, value.to_string());
                }
            }
        }

        let coding = match Coding::for_path(path) {
            Coding::Text => Coding::Text,
            Coding::Binary(_) => {
                let dtype = dtype.ok_or_else(|| {
                    Error::format("no datatype specified in fibre stream header")
                })?;
                Coding::Binary(dtype)
            }
        };

        let sidecar = SidecarReader::open(&sidecar_path(path))?;
        let (schema, extend_keys) = split_header(&sidecar, intrinsics);

        Ok(Self {
            input,
            coding,
            begin: consumed,
            ext_props,
            sidecar,
            schema,
            extend_keys,
            tokens: VecDeque::new(),
            count: 0,
            finished: false,
            _kind: PhantomData,
        })
    }

    /// Free-form header properties (everything except the reserved keys).
    pub fn extend_props(&self) -> &BTreeMap<String, String> {
        &self.ext_props
    }

    /// The scalar-property schema found in the sidecar header.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The extended (string-valued) sidecar keys.
    pub fn extend_keys(&self) -> &[String] {
        &self.extend_keys
    }

    /// Records read so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Read the next record. `Ok(None)` once the end sentinel is reached;
    /// the returned map holds the extended column values of the record.
    #[allow(clippy::type_complexity)]
    pub fn next(&mut self) -> Result<Option<(ElementData, BTreeMap<String, String>)>> {
        if self.finished {
            return Ok(None);
        }
        let first = self.read_coord()?;
        if format::is_end_of_data(first) {
            self.finished = true;
            self.finish_stream()?;
            return Ok(None);
        }

        let mut rows: SmallVec<[DVec3; 16]> = SmallVec::new();
        let mut coord = first;
        while !format::is_element_separator(coord) {
            if format::is_end_of_data(coord) || format::is_set_separator(coord) {
                return Err(Error::format("unterminated element record"));
            }
            rows.push(coord);
            coord = self.read_coord()?;
        }
        let mut elem = ElementData::from_rows(&rows, self.schema.clone());

        let mut ext_row = BTreeMap::new();
        if self.sidecar.is_some() {
            let row = self.sidecar_next_row()?.ok_or_else(|| {
                Error::Desync("sidecar ran out of lines before the primary stream".into())
            })?;
            for (i, name) in self.schema.names().iter().enumerate() {
                if let Some(value) = row.get(name) {
                    let value = value.parse::<f64>().map_err(|_| {
                        Error::format(format!("sidecar value for '{name}' is not a number"))
                    })?;
                    elem.set_prop(i, value);
                }
            }
            for key in &self.extend_keys {
                if let Some(value) = row.get(key) {
                    ext_row.insert(key.clone(), value.clone());
                }
            }
        }

        self.count += 1;
        Ok(Some((elem, ext_row)))
    }

    /// Reseat both streams to their post-header positions.
    pub fn rewind(&mut self) -> Result<()> {
        self.input.seek(SeekFrom::Start(self.begin))?;
        self.tokens.clear();
        self.count = 0;
        self.finished = false;
        if let Some(sidecar) = &mut self.sidecar {
            sidecar.rewind()?;
        }
        Ok(())
    }

    // === record plumbing shared with SetReader ===

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn set_finished(&mut self) {
        self.finished = true;
    }

    pub(crate) fn mark_record(&mut self) {
        self.count += 1;
    }

    pub(crate) fn has_sidecar(&self) -> bool {
        self.sidecar.is_some()
    }

    pub(crate) fn sidecar_next_row(&mut self) -> Result<Option<BTreeMap<String, String>>> {
        match &mut self.sidecar {
            Some(sidecar) => sidecar.next_row(),
            None => Ok(None),
        }
    }

    /// Validate the count footer (when present) and check the sidecar is
    /// exhausted in step with the primary stream.
    pub(crate) fn finish_stream(&mut self) -> Result<()> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? > 0 {
            if let Some(value) = line.trim_end().strip_prefix("count:") {
                let declared = value.trim().parse::<usize>().map_err(|_| {
                    Error::format(format!("malformed count footer '{}'", line.trim_end()))
                })?;
                if declared != self.count {
                    return Err(Error::format(format!(
                        "stream footer declares {declared} records but {} were read",
                        self.count
                    )));
                }
            }
        }
        if let Some(sidecar) = &mut self.sidecar {
            if sidecar.next_line()?.is_some() {
                return Err(Error::Desync(
                    "sidecar holds more rows than the primary stream".into(),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn read_coord(&mut self) -> Result<DVec3> {
        match self.coding {
            Coding::Binary(dtype) => {
                let read = |input: &mut BufReader<File>| -> std::io::Result<[f64; 3]> {
                    Ok(match dtype {
                        DataType::Float64LE => [
                            input.read_f64::<LittleEndian>()?,
                            input.read_f64::<LittleEndian>()?,
                            input.read_f64::<LittleEndian>()?,
                        ],
                        DataType::Float64BE => [
                            input.read_f64::<BigEndian>()?,
                            input.read_f64::<BigEndian>()?,
                            input.read_f64::<BigEndian>()?,
                        ],
                        DataType::Float32LE => [
                            input.read_f32::<LittleEndian>()? as f64,
                            input.read_f32::<LittleEndian>()? as f64,
                            input.read_f32::<LittleEndian>()? as f64,
                        ],
                        DataType::Float32BE => [
                            input.read_f32::<BigEndian>()? as f64,
                            input.read_f32::<BigEndian>()? as f64,
                            input.read_f32::<BigEndian>()? as f64,
                        ],
                    })
                };
                let [x, y, z] = read(&mut self.input).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        Error::format("unexpected end of fibre stream")
                    } else {
                        Error::Io(e)
                    }
                })?;
                Ok(DVec3::new(x, y, z))
            }
            Coding::Text => {
                let x = self.next_token()?;
                let y = self.next_token()?;
                let z = self.next_token()?;
                Ok(DVec3::new(x, y, z))
            }
        }
    }

    fn next_token(&mut self) -> Result<f64> {
        while self.tokens.is_empty() {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(Error::format("unexpected end of fibre stream"));
            }
            for token in line.split_whitespace() {
                let value = token.parse::<f64>().map_err(|_| {
                    Error::format(format!("malformed coordinate token '{token}'"))
                })?;
                self.tokens.push_back(value);
            }
        }
        Ok(self.tokens.pop_front().unwrap_or(f64::NAN))
    }
}

/// Split a sidecar header into the scalar schema (keys listed in
/// `intrinsics`, in header order) and the remaining extended keys.
fn split_header(
    sidecar: &Option<SidecarReader>,
    intrinsics: &'static [&'static str],
) -> (Schema, Vec<String>) {
    let Some(sidecar) = sidecar else {
        return (Schema::empty(), Vec::new());
    };
    let mut scalar = Vec::new();
    let mut extended = Vec::new();
    for key in sidecar.header() {
        if intrinsics.contains(&key.as_str()) {
            scalar.push(key.clone());
        } else {
            extended.push(key.clone());
        }
    }
    (Schema::new(scalar), extended)
}
