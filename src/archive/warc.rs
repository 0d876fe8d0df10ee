//! Minimal WARC/1.0 record codec.
//!
//! Each record is a version line, `Name: value` header lines, a blank line,
//! exactly `Content-Length` payload bytes and two CRLFs:
//!
//! ```text
//! WARC/1.0\r\n
//! WARC-Type: resource\r\n
//! WARC-Record-ID: <urn:uuid:…>\r\n
//! WARC-Date: 2024-03-31T12:00:00Z\r\n
//! Content-Type: application/octet-stream\r\n
//! Content-Length: 1024\r\n
//! \r\n
//! <payload>\r\n\r\n
//! ```
//!
//! Payloads are streamed in both directions; neither side holds a whole
//! record in memory.

use crate::error::{KeepsakeError, Result};
use std::io::{self, BufRead, Read, Write};

pub const WARC_VERSION: &str = "WARC/1.0";

const HEADER_TYPE: &str = "WARC-Type";
const HEADER_RECORD_ID: &str = "WARC-Record-ID";
const HEADER_DATE: &str = "WARC-Date";
const HEADER_CONTENT_TYPE: &str = "Content-Type";
const HEADER_CONTENT_LENGTH: &str = "Content-Length";

/// Parsed or to-be-written header block of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcHeader {
    pub warc_type: String,
    pub record_id: String,
    pub date: String,
    pub content_type: String,
    pub content_length: u64,
    /// Any further header lines, in order
    pub extra: Vec<(String, String)>,
}

impl WarcHeader {
    /// Look up a header by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name.to_ascii_lowercase().as_str() {
            "warc-type" => Some(&self.warc_type),
            "warc-record-id" => Some(&self.record_id),
            "warc-date" => Some(&self.date),
            "content-type" => Some(&self.content_type),
            _ => self
                .extra
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
        }
    }

    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{WARC_VERSION}\r\n")?;
        write!(out, "{HEADER_TYPE}: {}\r\n", self.warc_type)?;
        write!(out, "{HEADER_RECORD_ID}: {}\r\n", self.record_id)?;
        write!(out, "{HEADER_DATE}: {}\r\n", self.date)?;
        for (name, value) in &self.extra {
            write!(out, "{name}: {value}\r\n")?;
        }
        write!(out, "{HEADER_CONTENT_TYPE}: {}\r\n", self.content_type)?;
        write!(out, "{HEADER_CONTENT_LENGTH}: {}\r\n\r\n", self.content_length)
    }
}

/// Format a GUID as a WARC record id.
pub fn record_id(identifier: &str) -> String {
    format!("<urn:uuid:{identifier}>")
}

/// Appends records to a WARC stream.
#[derive(Debug)]
pub struct WarcWriter<W: Write> {
    inner: W,
    records: usize,
}

impl<W: Write> WarcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    /// Write one record whose payload is read from `payload`.
    ///
    /// # Errors
    ///
    /// Fails if `payload` yields a different number of bytes than
    /// `header.content_length`; the stream is then unusable.
    pub fn write_record<R: Read>(&mut self, header: &WarcHeader, payload: R) -> Result<()> {
        header.write_to(&mut self.inner)?;

        let copied = io::copy(&mut payload.take(header.content_length), &mut self.inner)?;
        if copied != header.content_length {
            return Err(KeepsakeError::ArchiveIo(format!(
                "payload of {} is {copied} bytes, header declares {}",
                header.record_id, header.content_length
            )));
        }

        self.inner.write_all(b"\r\n\r\n")?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// # Errors
    ///
    /// Returns error if the underlying writer fails.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Iterates over the records of a WARC stream.
///
/// [`WarcReader::next_header`] skips whatever is left of the previous
/// record's payload, so callers only read the payloads they care about.
#[derive(Debug)]
pub struct WarcReader<R: BufRead> {
    inner: R,
    remaining: u64,
}

impl<R: BufRead> WarcReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            remaining: 0,
        }
    }

    /// Advance to the next record and return its header, or `None` at the end
    /// of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::ArchiveIo`] for a truncated or malformed header.
    pub fn next_header(&mut self) -> Result<Option<WarcHeader>> {
        self.skip_payload()?;

        let version = loop {
            let mut line = String::new();
            if self.inner.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                break line.to_owned();
            }
        };

        if !version.starts_with("WARC/") {
            return Err(KeepsakeError::ArchiveIo(format!(
                "expected WARC version line, found '{version}'"
            )));
        }

        let mut warc_type = None;
        let mut record_id = None;
        let mut date = String::new();
        let mut content_type = String::new();
        let mut content_length = None;
        let mut extra = Vec::new();

        loop {
            let mut line = String::new();
            if self.inner.read_line(&mut line)? == 0 {
                return Err(KeepsakeError::ArchiveIo(
                    "WARC header block truncated".to_owned(),
                ));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                KeepsakeError::ArchiveIo(format!("malformed WARC header line '{line}'"))
            })?;
            let value = value.trim().to_owned();

            match name.trim().to_ascii_lowercase().as_str() {
                "warc-type" => warc_type = Some(value),
                "warc-record-id" => record_id = Some(value),
                "warc-date" => date = value,
                "content-type" => content_type = value,
                "content-length" => {
                    content_length = Some(value.parse::<u64>().map_err(|e| {
                        KeepsakeError::ArchiveIo(format!("invalid Content-Length '{value}': {e}"))
                    })?);
                }
                _ => extra.push((name.trim().to_owned(), value)),
            }
        }

        let missing = |name: &str| KeepsakeError::ArchiveIo(format!("WARC record lacks {name}"));
        let header = WarcHeader {
            warc_type: warc_type.ok_or_else(|| missing(HEADER_TYPE))?,
            record_id: record_id.ok_or_else(|| missing(HEADER_RECORD_ID))?,
            date,
            content_type,
            content_length: content_length.ok_or_else(|| missing(HEADER_CONTENT_LENGTH))?,
            extra,
        };

        self.remaining = header.content_length;
        Ok(Some(header))
    }

    /// Copy the unread payload of the current record into `out`.
    ///
    /// # Errors
    ///
    /// Returns error if reading the package or writing `out` fails.
    pub fn copy_payload<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        let expected = self.remaining;
        let copied = io::copy(&mut (&mut self.inner).take(expected), out)?;
        self.remaining = 0;
        if copied != expected {
            return Err(KeepsakeError::ArchiveIo(format!(
                "WARC payload truncated: read {copied} of {expected} bytes"
            )));
        }
        Ok(copied)
    }

    fn skip_payload(&mut self) -> Result<()> {
        if self.remaining > 0 {
            self.copy_payload(&mut io::sink())?;
        }
        Ok(())
    }
}
