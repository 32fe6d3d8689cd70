//! Final result set of a run and its two compressed copies
//!
//! The product is encoded once with `bitcode`, then written LZ4-compressed
//! and zlib-compressed. Each copy goes through a write-rename so a crash
//! during the write never leaves a truncated file behind. The two copies are
//! independent: failure of one is logged and the other is still attempted.

use bitcode::{Decode, Encode};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::core_types::{ParcelTable, RunConfig, MILESTONE_SLOTS};
use crate::grid::SourceAccumulator;
use crate::simulation::stats::RunStats;

/// Errors writing or reading a run product
#[derive(Debug)]
pub enum OutputError {
    /// Failed to write or read a file
    Io { path: PathBuf, source: std::io::Error },
    /// Failed to compress or decompress a payload
    Codec { codec: &'static str, msg: String },
    /// Payload is not a valid run product
    Decode(String),
    /// Extension is neither `lz4` nor `zlib`
    UnknownFormat(PathBuf),
    /// Neither copy could be written
    NothingWritten,
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            OutputError::Codec { codec, msg } => write!(f, "{codec} codec failed: {msg}"),
            OutputError::Decode(msg) => write!(f, "Failed to decode run product: {msg}"),
            OutputError::UnknownFormat(path) => {
                write!(f, "Unknown output format: {}", path.display())
            }
            OutputError::NothingWritten => write!(f, "No output copy could be written"),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Milestone archive as slot-major columns (`k * numpart + slot`)
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct ArchiveColumns {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub p: Vec<f32>,
    pub t: Vec<f32>,
    pub age: Vec<f32>,
}

/// Everything persisted at the end of a run
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct RunProduct {
    pub run_name: String,
    pub reanalysis: String,
    /// Start of the backward run, ISO 8601
    pub start: String,
    pub idx_orgn: u64,
    pub numpart: u64,
    pub flags: Vec<u32>,
    pub archive: ArchiveColumns,
    pub chi: Vec<f32>,
    pub passed: Vec<i32>,
    pub source_rows: u32,
    pub source_cols: u32,
    pub source: Vec<f32>,
    pub regional: Vec<f64>,
    pub region_names: Vec<String>,
    pub stats: RunStats,
}

impl RunProduct {
    /// Assemble the product, down-casting per-parcel and gridded values to f32
    pub fn assemble(
        run_name: &str,
        config: &RunConfig,
        table: &ParcelTable,
        acc: &SourceAccumulator,
        stats: &RunStats,
    ) -> Self {
        let numpart = table.numpart();
        let mut archive = ArchiveColumns::default();
        for k in 0..MILESTONE_SLOTS {
            for slot in 0..numpart {
                let m = table.milestone(slot, k);
                archive.x.push(m.x as f32);
                archive.y.push(m.y as f32);
                archive.p.push(m.p as f32);
                archive.t.push(m.t as f32);
                archive.age.push(m.age as f32);
            }
        }
        let (rows, cols) = acc.source().shape();
        Self {
            run_name: run_name.to_string(),
            reanalysis: config.reanalysis.tag().to_string(),
            start: config.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            idx_orgn: table.index().origin(),
            numpart: numpart as u64,
            flags: table.all_flags().iter().map(|f| f.bits()).collect(),
            archive,
            chi: table.all_chi().iter().map(|&c| c as f32).collect(),
            passed: table
                .all_ratchets()
                .iter()
                .map(|r| i32::from(r.value()))
                .collect(),
            source_rows: rows as u32,
            source_cols: cols as u32,
            source: acc.source().as_slice().iter().map(|&v| v as f32).collect(),
            regional: acc.regional().to_vec(),
            region_names: acc.mask().names().to_vec(),
            stats: stats.clone(),
        }
    }

    /// Milestone `k` column index of a parcel slot
    pub fn archive_index(&self, slot: usize, k: usize) -> usize {
        k * self.numpart as usize + slot
    }

    /// Write the LZ4 and zlib copies
    ///
    /// Returns the number of copies written.
    ///
    /// # Errors
    /// Returns `OutputError::NothingWritten` when both copies failed
    pub fn save(&self, lz4_path: &Path, zlib_path: &Path) -> Result<usize, OutputError> {
        let encoded = bitcode::encode(self);
        let attempts = [
            (lz4_path, Ok(lz4_flex::compress_prepend_size(&encoded))),
            (zlib_path, zlib_compress(&encoded)),
        ];

        let mut written = 0;
        for (path, payload) in attempts {
            match payload.and_then(|bytes| atomic_write(path, &bytes)) {
                Ok(()) => {
                    info!("wrote {}", path.display());
                    written += 1;
                }
                Err(e) => error!("output copy failed: {}", e),
            }
        }
        if written == 0 {
            return Err(OutputError::NothingWritten);
        }
        Ok(written)
    }

    /// Read a copy back, choosing the codec from the file extension
    ///
    /// # Errors
    /// Returns `OutputError` if the file cannot be read, decompressed or decoded
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OutputError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let encoded = match path.extension().and_then(|e| e.to_str()) {
            Some("lz4") => lz4_flex::decompress_size_prepended(&bytes).map_err(|e| {
                OutputError::Codec {
                    codec: "lz4",
                    msg: e.to_string(),
                }
            })?,
            Some("zlib") => {
                let mut out = Vec::new();
                ZlibDecoder::new(bytes.as_slice())
                    .read_to_end(&mut out)
                    .map_err(|e| OutputError::Codec {
                        codec: "zlib",
                        msg: e.to_string(),
                    })?;
                out
            }
            _ => return Err(OutputError::UnknownFormat(path.to_path_buf())),
        };
        bitcode::decode(&encoded).map_err(|e| OutputError::Decode(e.to_string()))
    }
}

fn zlib_compress(bytes: &[u8]) -> Result<Vec<u8>, OutputError> {
    let codec_error = |e: std::io::Error| OutputError::Codec {
        codec: "zlib",
        msg: e.to_string(),
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(codec_error)?;
    encoder.finish().map_err(codec_error)
}

/// Write `data` to `{path}.tmp`, sync, then rename over `path`
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), OutputError> {
    let io_error = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp).map_err(io_error)?;
    file.write_all(data).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)
}
