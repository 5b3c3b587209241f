// mediabackup/src/transform/mod.rs
//! Compression and encryption applied to a finished archive stream.
//!
//! On write the order is fixed: compress, then encrypt. On read it is the exact
//! inverse: decrypt, then decompress. Which transforms apply is decided by the
//! caller's flags, never by the file name.
pub mod crypto;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tempfile::SpooledTempFile;

use crate::errors::{MediaError, Result};
use crypto::{DecryptReader, EncryptWriter};

pub const COMPRESSION_SUFFIX: &str = ".gz";
pub const ENCRYPTION_SUFFIX: &str = ".enc";

#[derive(Debug, Clone, Default)]
pub struct WriteTransforms {
    pub compress: bool,
    pub encrypt: bool,
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadTransforms {
    pub decrypt: bool,
    pub decompress: bool,
    pub passphrase: Option<String>,
}

/// A transformed byte stream, rewound to its start, with its derived name.
pub struct TransformedStream {
    pub name: String,
    pub size: u64,
    pub content: SpooledTempFile,
}

impl std::fmt::Debug for TransformedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformedStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

pub fn gzip_writer<W: Write>(inner: W) -> GzEncoder<W> {
    GzEncoder::new(inner, Compression::default())
}

fn require_passphrase(passphrase: Option<&str>) -> Result<&str> {
    passphrase.filter(|p| !p.is_empty()).ok_or_else(|| {
        MediaError::Config(
            "A passphrase is required for encryption; set `passphrase` in the config or MEDIABACKUP_PASSPHRASE"
                .to_string(),
        )
    })
}

fn encode<R: Read, W: Write>(
    input: &mut R,
    output: W,
    compress: bool,
    passphrase: Option<&str>,
) -> io::Result<W> {
    match (compress, passphrase) {
        (false, None) => {
            let mut output = output;
            io::copy(input, &mut output)?;
            Ok(output)
        }
        (true, None) => {
            let mut gz = gzip_writer(output);
            io::copy(input, &mut gz)?;
            gz.finish()
        }
        (false, Some(passphrase)) => {
            let mut encrypted = EncryptWriter::new(output, passphrase)?;
            io::copy(input, &mut encrypted)?;
            encrypted.finish()
        }
        (true, Some(passphrase)) => {
            let mut gz = gzip_writer(EncryptWriter::new(output, passphrase)?);
            io::copy(input, &mut gz)?;
            gz.finish()?.finish()
        }
    }
}

fn decode<R: Read, W: Write>(
    input: R,
    output: &mut W,
    passphrase: Option<&str>,
    decompress: bool,
) -> io::Result<u64> {
    match (passphrase, decompress) {
        (None, false) => {
            let mut input = input;
            io::copy(&mut input, output)
        }
        (None, true) => io::copy(&mut GzDecoder::new(input), output),
        (Some(passphrase), false) => io::copy(&mut DecryptReader::new(input, passphrase)?, output),
        (Some(passphrase), true) => {
            let mut gz = GzDecoder::new(DecryptReader::new(input, passphrase)?);
            let written = io::copy(&mut gz, output)?;
            // The gzip trailer can end before the final frame; drain it to verify the seal.
            io::copy(&mut gz.into_inner(), &mut io::sink())?;
            Ok(written)
        }
    }
}

fn rewind(mut content: SpooledTempFile) -> Result<(SpooledTempFile, u64)> {
    let size = content.seek(SeekFrom::End(0))?;
    content.seek(SeekFrom::Start(0))?;
    Ok((content, size))
}

/// Applies compression and/or encryption to `input`, appending the matching
/// suffixes to `name`.
pub fn apply<R: Read>(
    mut input: R,
    name: &str,
    transforms: &WriteTransforms,
    spool_max_size: usize,
) -> Result<TransformedStream> {
    let passphrase = if transforms.encrypt {
        Some(require_passphrase(transforms.passphrase.as_deref())?)
    } else {
        None
    };

    let spool = SpooledTempFile::new(spool_max_size);
    let content = encode(&mut input, spool, transforms.compress, passphrase)
        .map_err(|e| MediaError::Transform(format!("Failed to transform {}: {}", name, e)))?;
    let (content, size) = rewind(content)?;

    let mut name = name.to_string();
    if transforms.compress {
        name.push_str(COMPRESSION_SUFFIX);
    }
    if transforms.encrypt {
        name.push_str(ENCRYPTION_SUFFIX);
    }
    Ok(TransformedStream { name, size, content })
}

/// Reverses [`apply`]: decrypts, then decompresses.
///
/// The whole stream is drained into a spooled buffer before returning, so a
/// wrong passphrase or corrupt input is reported before anything downstream
/// consumes a single byte.
pub fn invert<R: Read>(
    input: R,
    name: &str,
    transforms: &ReadTransforms,
    spool_max_size: usize,
) -> Result<TransformedStream> {
    let passphrase = if transforms.decrypt {
        Some(require_passphrase(transforms.passphrase.as_deref())?)
    } else {
        None
    };

    let mut content = SpooledTempFile::new(spool_max_size);
    decode(input, &mut content, passphrase, transforms.decompress)
        .map_err(|e| MediaError::Transform(format!("Failed to read {}: {}", name, e)))?;
    let (content, size) = rewind(content)?;

    let mut name = name.to_string();
    if transforms.decrypt {
        if let Some(stripped) = name.strip_suffix(ENCRYPTION_SUFFIX) {
            name = stripped.to_string();
        }
    }
    if transforms.decompress {
        if let Some(stripped) = name.strip_suffix(COMPRESSION_SUFFIX) {
            name = stripped.to_string();
        }
    }
    Ok(TransformedStream { name, size, content })
}
