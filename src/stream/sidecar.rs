//! Properties sidecar files.
//!
//! A sidecar is a literal preamble followed on the same line by a
//! tab-delimited key header, then one tab-delimited value row per record.
//! Writers stage into a temp file next to the target and rename at close.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::format::PROPS_PREAMBLE;
use crate::util::{Error, Result};

/// Writer half of a properties sidecar.
pub struct SidecarWriter {
    out: BufWriter<NamedTempFile>,
    target: PathBuf,
    header: Vec<String>,
}

impl SidecarWriter {
    /// Create a sidecar beside `target` and write its preamble and key
    /// header.
    pub fn create(target: &Path, header: Vec<String>) -> Result<Self> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;
        let mut out = BufWriter::new(tmp);
        write!(out, "{PROPS_PREAMBLE}")?;
        for key in &header {
            write!(out, "{key}\t")?;
        }
        writeln!(out)?;
        Ok(Self {
            out,
            target: target.to_path_buf(),
            header,
        })
    }

    /// The declared keys, in column order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Write one tab-delimited value row. `values` must be in column
    /// order.
    pub fn write_row(&mut self, values: &[String]) -> Result<()> {
        debug_assert_eq!(values.len(), self.header.len());
        for value in values {
            write!(self.out, "{value}\t")?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Write a literal line (record separators of nested sidecars).
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    /// Flush and atomically move the staged file over the target.
    pub fn close(self) -> Result<()> {
        let tmp = self
            .out
            .into_inner()
            .map_err(|e| Error::other(format!("sidecar flush failed: {e}")))?;
        tmp.persist(&self.target)
            .map_err(|e| Error::other(format!("sidecar rename failed: {e}")))?;
        Ok(())
    }
}

/// Reader half of a properties sidecar.
pub struct SidecarReader {
    input: BufReader<File>,
    header: Vec<String>,
    begin: u64,
}

impl SidecarReader {
    /// Open a sidecar when it exists; `Ok(None)` when it does not.
    pub fn open(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let file = File::open(path)?;
        let mut input = BufReader::new(file);

        let mut first = String::new();
        let consumed = input.read_line(&mut first)?;
        let line = first.trim_end_matches(['\n', '\r']);
        let Some(keys) = line.strip_prefix(PROPS_PREAMBLE) else {
            return Err(Error::format(format!(
                "required file intro '{PROPS_PREAMBLE}' was not found at start of extended properties file"
            )));
        };
        let header: Vec<String> = split_tabs(keys)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if header.is_empty() {
            return Err(Error::format("no keys found in extended properties file"));
        }
        Ok(Some(Self {
            input,
            header,
            begin: consumed as u64,
        }))
    }

    /// The declared keys, in column order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Read the next raw line. `Ok(None)` at end of file.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Read the next row as a key-to-value map. `Ok(None)` at end of file.
    pub fn next_row(&mut self) -> Result<Option<BTreeMap<String, String>>> {
        match self.next_line()? {
            None => Ok(None),
            Some(line) => self.parse_row(&line).map(Some),
        }
    }

    /// Parse one tab-delimited row against the header.
    pub fn parse_row(&self, line: &str) -> Result<BTreeMap<String, String>> {
        let mut row = BTreeMap::new();
        for (count, value) in split_tabs(line).enumerate() {
            if count >= self.header.len() {
                return Err(Error::format(format!(
                    "more values found on sidecar line than exist in header ({}): '{line}'",
                    self.header.len()
                )));
            }
            row.insert(self.header[count].clone(), value.to_string());
        }
        Ok(row)
    }

    /// Reseat the stream to the first row.
    pub fn rewind(&mut self) -> Result<()> {
        self.input.seek(SeekFrom::Start(self.begin))?;
        Ok(())
    }
}

/// Split a tab-delimited line, dropping the empty field a trailing tab
/// produces.
fn split_tabs(line: &str) -> impl Iterator<Item = &str> {
    let trimmed = line.strip_suffix('\t').unwrap_or(line);
    trimmed.split('\t')
}
