use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader, Read},
    num::ParseIntError,
    path::Path,
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use flate2::read::{DeflateDecoder, MultiGzDecoder};
use thiserror::Error;

/// Column layout of the vendor's raw export.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum VendorFormat {
    /// 23andMe: `rsid  chromosome  position  genotype`, alleles pre-joined.
    #[value(name = "23andme")]
    TwentyThreeAndMe,
    /// ancestry.com: `rsid  chromosome  position  allele1  allele2`.
    #[value(name = "ancestry")]
    Ancestry,
}

/// A single genotype observation from a raw vendor export.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawCall {
    pub rsid: String,
    pub chromosome: String,
    pub position: u64,
    pub alleles: String,
}

/// Container wrapping the raw text, resolved once before any line is read.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputContainer {
    /// ZIP archive; the sole entry holds the text.
    ZipArchive,
    /// Gzip member(s) wrapping the text.
    Gzip,
    PlainText,
}

impl InputContainer {
    /// Sniff the container from the file's leading bytes.
    pub fn detect(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 4];
        let n = read_up_to(&mut file, &mut magic)?;

        if n >= 4 && magic == [0x50, 0x4b, 0x03, 0x04] {
            Ok(Self::ZipArchive)
        } else if n >= 2 && magic[0] == 0x1f && magic[1] == 0x8b {
            Ok(Self::Gzip)
        } else {
            Ok(Self::PlainText)
        }
    }
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Open the raw export as a text stream, peeling off the detected container.
pub fn open_raw_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let container = InputContainer::detect(path)
        .with_context(|| format!("failed to probe input {}", path.display()))?;
    let file =
        File::open(path).with_context(|| format!("failed to open input {}", path.display()))?;
    let reader = BufReader::new(file);

    match container {
        InputContainer::ZipArchive => {
            tracing::debug!("detected ZIP input");
            let entry = read_zip_sole_entry(Box::new(reader))
                .with_context(|| format!("failed to read ZIP entry in {}", path.display()))?;
            Ok(Box::new(BufReader::new(entry)))
        }
        InputContainer::Gzip => {
            tracing::debug!("detected gzip input");
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
        }
        InputContainer::PlainText => Ok(Box::new(reader)),
    }
}

/// Streams the first (sole) entry of a ZIP archive without seeking.
fn read_zip_sole_entry(mut reader: Box<dyn BufRead + Send>) -> Result<Box<dyn Read + Send>> {
    // 30-byte local file header; signature already checked by the caller
    let mut header = [0u8; 30];
    reader.read_exact(&mut header)?;

    let flags = u16::from_le_bytes([header[6], header[7]]);
    let compression = u16::from_le_bytes([header[8], header[9]]);
    let compressed_size =
        u32::from_le_bytes([header[18], header[19], header[20], header[21]]) as u64;
    let name_len = u16::from_le_bytes([header[26], header[27]]) as usize;
    let extra_len = u16::from_le_bytes([header[28], header[29]]) as usize;

    // No seeking on a stream: discard the name and extra field
    if name_len > 0 {
        io::copy(&mut reader.by_ref().take(name_len as u64), &mut io::sink())?;
    }
    if extra_len > 0 {
        io::copy(&mut reader.by_ref().take(extra_len as u64), &mut io::sink())?;
    }

    match compression {
        8 => Ok(Box::new(DeflateDecoder::new(reader))),
        0 => {
            if (flags & 0x0008) != 0 {
                // Stored entry with data descriptor: size unknown up front
                Ok(Box::new(reader))
            } else {
                Ok(Box::new(reader.take(compressed_size)))
            }
        }
        other => anyhow::bail!("unsupported ZIP compression method: {other}"),
    }
}

/// Iterator over raw calls in a vendor genotype text stream.
pub struct Reader<R> {
    inner: R,
    vendor: VendorFormat,
    line: u64,
    buf: String,
}

impl<R> Reader<R>
where
    R: BufRead,
{
    pub fn new(inner: R, vendor: VendorFormat) -> Self {
        Self {
            inner,
            vendor,
            line: 0,
            buf: String::new(),
        }
    }
}

impl<R> Iterator for Reader<R>
where
    R: BufRead,
{
    type Item = Result<RawCall, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let trimmed = self.buf.trim_end_matches(&['\n', '\r'][..]);
                    if trimmed.is_empty()
                        || trimmed.starts_with('#')
                        || trimmed.starts_with("rsid")
                    {
                        continue;
                    }

                    return Some(parse_call(trimmed, self.vendor).map_err(|kind| ParseError {
                        line: self.line,
                        raw: trimmed.to_string(),
                        kind,
                    }));
                }
                Err(e) => {
                    return Some(Err(ParseError {
                        line: self.line,
                        raw: String::new(),
                        kind: ParseErrorKind::Io(e),
                    }));
                }
            }
        }
    }
}

/// Errors raised while parsing a raw genotype line.
#[derive(Debug, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: u64,
    pub raw: String,
    #[source]
    pub kind: ParseErrorKind,
}

#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("expected at least {expected} tab-delimited fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid position in column {column}: {source}")]
    InvalidPosition {
        column: usize,
        #[source]
        source: ParseIntError,
    },
}

fn parse_call(line: &str, vendor: VendorFormat) -> Result<RawCall, ParseErrorKind> {
    let fields: Vec<&str> = line.split('\t').collect();
    let expected = match vendor {
        VendorFormat::TwentyThreeAndMe => 4,
        VendorFormat::Ancestry => 5,
    };
    if fields.len() < expected {
        return Err(ParseErrorKind::FieldCount {
            expected,
            found: fields.len(),
        });
    }

    let position = fields[2]
        .parse::<u64>()
        .map_err(|source| ParseErrorKind::InvalidPosition { column: 3, source })?;

    let alleles = match vendor {
        VendorFormat::TwentyThreeAndMe => fields[3].to_string(),
        // ancestry splits the two alleles across adjacent columns
        VendorFormat::Ancestry => format!("{}{}", fields[3], fields[4]),
    };

    Ok(RawCall {
        rsid: fields[0].to_string(),
        chromosome: fields[1].to_string(),
        position,
        alleles,
    })
}

/// Read the whole export into a marker-indexed table. Later occurrences of a
/// marker overwrite earlier ones. Any malformed line aborts the load.
pub fn load_raw_calls(
    path: &Path,
    vendor: VendorFormat,
) -> Result<HashMap<String, RawCall>> {
    let reader = open_raw_input(path)?;
    let mut calls = HashMap::new();
    for result in Reader::new(reader, vendor) {
        let call = result.with_context(|| format!("malformed input {}", path.display()))?;
        calls.insert(call.rsid.clone(), call);
    }
    tracing::info!(markers = calls.len(), "indexed raw calls");
    Ok(calls)
}
