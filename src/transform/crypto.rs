//! Passphrase-keyed streaming encryption using AES-256-GCM.
//!
//! Container layout:
//!
//! ```text
//! magic "MBAK" | version (1 byte)
//!   | argon2 memory KiB, iterations, parallelism (u32 BE each)
//!   | salt (16 bytes) | nonce prefix (7 bytes)
//! frame*: final flag (1 byte) | ciphertext length (u32 BE) | ciphertext
//! ```
//!
//! The key is derived from the passphrase with Argon2id using the costs
//! recorded in the header. Each frame seals at most [`CHUNK_SIZE`] bytes of
//! plaintext. The nonce is `prefix || frame counter (u32 BE) || final flag`,
//! and the header is authenticated as associated data, so altered costs,
//! reordered, dropped, or truncated frames fail to decrypt. Exactly one final
//! frame ends the stream.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload, generic_array::GenericArray},
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use std::io::{self, Read, Write};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const MAGIC: &[u8; 4] = b"MBAK";
pub const VERSION: u8 = 2;
pub const KEY_SIZE: usize = 32;
pub const SALT_SIZE: usize = 16;
pub const NONCE_PREFIX_SIZE: usize = 7;
pub const TAG_SIZE: usize = 16;
/// Plaintext bytes sealed per frame.
pub const CHUNK_SIZE: usize = 64 * 1024;

const KDF_PARAMS_SIZE: usize = 12;
const KDF_OFFSET: usize = MAGIC.len() + 1;
const SALT_OFFSET: usize = KDF_OFFSET + KDF_PARAMS_SIZE;
const NONCE_OFFSET: usize = SALT_OFFSET + SALT_SIZE;
const HEADER_SIZE: usize = NONCE_OFFSET + NONCE_PREFIX_SIZE;

// Largest costs accepted from a header; checked before any derivation.
const MAX_MEMORY_KIB: u32 = 1024 * 1024;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

/// Argon2id costs used to stretch the passphrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn to_bytes(self) -> [u8; KDF_PARAMS_SIZE] {
        let mut bytes = [0u8; KDF_PARAMS_SIZE];
        bytes[..4].copy_from_slice(&self.memory_kib.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.iterations.to_be_bytes());
        bytes[8..].copy_from_slice(&self.parallelism.to_be_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let field = |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let params = Self {
            memory_kib: field(0),
            iterations: field(4),
            parallelism: field(8),
        };
        if params.memory_kib > MAX_MEMORY_KIB
            || params.iterations > MAX_ITERATIONS
            || params.parallelism > MAX_PARALLELISM
        {
            return Err(invalid_data(format!(
                "key derivation costs out of range: {:?}",
                params
            )));
        }
        Ok(params)
    }

    fn argon2(self) -> io::Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| invalid_data(format!("invalid key derivation costs: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct StreamKey {
    bytes: [u8; KEY_SIZE],
}

impl StreamKey {
    /// Derives the archive key from a passphrase with Argon2id.
    fn derive(passphrase: &str, salt: &[u8], params: KdfParams) -> io::Result<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        params
            .argon2()?
            .hash_password_into(passphrase.as_bytes(), salt, &mut bytes)
            .map_err(|e| io::Error::other(format!("key derivation failed: {}", e)))?;
        Ok(Self { bytes })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(GenericArray::from_slice(&self.bytes))
    }
}

fn frame_nonce(prefix: &[u8; NONCE_PREFIX_SIZE], counter: u32, last: bool) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..NONCE_PREFIX_SIZE].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_SIZE..NONCE_PREFIX_SIZE + 4].copy_from_slice(&counter.to_be_bytes());
    nonce[11] = last as u8;
    nonce
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Encrypts everything written to it into `inner`.
///
/// [`EncryptWriter::finish`] must be called to seal the final frame; a writer
/// dropped without it leaves a stream that will not decrypt.
pub struct EncryptWriter<W: Write> {
    inner: W,
    cipher: Aes256Gcm,
    header: [u8; HEADER_SIZE],
    nonce_prefix: [u8; NONCE_PREFIX_SIZE],
    counter: u32,
    buffer: Vec<u8>,
}

impl<W: Write> EncryptWriter<W> {
    pub fn new(inner: W, passphrase: &str) -> io::Result<Self> {
        Self::with_params(inner, passphrase, KdfParams::default())
    }

    pub fn with_params(mut inner: W, passphrase: &str, params: KdfParams) -> io::Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce_prefix);

        let cipher = StreamKey::derive(passphrase, &salt, params)?.cipher();

        let mut header = [0u8; HEADER_SIZE];
        header[..KDF_OFFSET - 1].copy_from_slice(MAGIC);
        header[KDF_OFFSET - 1] = VERSION;
        header[KDF_OFFSET..SALT_OFFSET].copy_from_slice(&params.to_bytes());
        header[SALT_OFFSET..NONCE_OFFSET].copy_from_slice(&salt);
        header[NONCE_OFFSET..].copy_from_slice(&nonce_prefix);
        inner.write_all(&header)?;
        Ok(Self {
            inner,
            cipher,
            header,
            nonce_prefix,
            counter: 0,
            buffer: Vec::with_capacity(CHUNK_SIZE),
        })
    }

    fn seal_frame(&mut self, last: bool) -> io::Result<()> {
        let nonce = frame_nonce(&self.nonce_prefix, self.counter, last);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &self.buffer,
                    aad: &self.header,
                },
            )
            .map_err(|_| io::Error::other("encryption failed"))?;

        self.inner.write_all(&[last as u8])?;
        self.inner.write_all(&(ciphertext.len() as u32).to_be_bytes())?;
        self.inner.write_all(&ciphertext)?;

        self.buffer.clear();
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| io::Error::other("encrypted stream exceeds the frame limit"))?;
        Ok(())
    }

    /// Seals the final frame and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.seal_frame(true)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let take = buf.len().min(CHUNK_SIZE - self.buffer.len());
        self.buffer.extend_from_slice(&buf[..take]);
        if self.buffer.len() == CHUNK_SIZE {
            self.seal_frame(false)?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypts a stream produced by [`EncryptWriter`].
///
/// Authentication failures (wrong passphrase, tampering) and truncation are
/// reported as [`io::ErrorKind::InvalidData`].
pub struct DecryptReader<R: Read> {
    inner: R,
    cipher: Aes256Gcm,
    header: [u8; HEADER_SIZE],
    nonce_prefix: [u8; NONCE_PREFIX_SIZE],
    counter: u32,
    plaintext: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> DecryptReader<R> {
    pub fn new(mut inner: R, passphrase: &str) -> io::Result<Self> {
        let mut header = [0u8; HEADER_SIZE];
        inner.read_exact(&mut header).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => invalid_data("not an encrypted archive: stream too short"),
            _ => e,
        })?;
        if &header[..KDF_OFFSET - 1] != MAGIC {
            return Err(invalid_data("not an encrypted archive: bad magic bytes"));
        }
        if header[KDF_OFFSET - 1] != VERSION {
            return Err(invalid_data(format!(
                "unsupported encrypted archive version {}",
                header[KDF_OFFSET - 1]
            )));
        }

        let params = KdfParams::from_bytes(&header[KDF_OFFSET..SALT_OFFSET])?;
        let salt = &header[SALT_OFFSET..NONCE_OFFSET];
        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        nonce_prefix.copy_from_slice(&header[NONCE_OFFSET..]);
        let cipher = StreamKey::derive(passphrase, salt, params)?.cipher();

        Ok(Self {
            inner,
            cipher,
            header,
            nonce_prefix,
            counter: 0,
            plaintext: Vec::new(),
            pos: 0,
            done: false,
        })
    }

    fn read_frame(&mut self) -> io::Result<()> {
        let mut frame_header = [0u8; 5];
        self.inner.read_exact(&mut frame_header).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => invalid_data("encrypted archive is truncated"),
            _ => e,
        })?;

        let last = match frame_header[0] {
            0 => false,
            1 => true,
            other => return Err(invalid_data(format!("invalid frame flag {}", other))),
        };
        let len = u32::from_be_bytes([
            frame_header[1],
            frame_header[2],
            frame_header[3],
            frame_header[4],
        ]) as usize;
        if !(TAG_SIZE..=CHUNK_SIZE + TAG_SIZE).contains(&len) {
            return Err(invalid_data(format!("invalid frame length {}", len)));
        }

        let mut ciphertext = vec![0u8; len];
        self.inner.read_exact(&mut ciphertext).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => invalid_data("encrypted archive is truncated"),
            _ => e,
        })?;

        let nonce = frame_nonce(&self.nonce_prefix, self.counter, last);
        self.plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: &self.header,
                },
            )
            .map_err(|_| {
                invalid_data("decryption failed: wrong passphrase or corrupted archive")
            })?;
        self.pos = 0;
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| invalid_data("encrypted stream exceeds the frame limit"))?;

        if last {
            let mut trailing = [0u8; 1];
            if self.inner.read(&mut trailing)? != 0 {
                return Err(invalid_data("unexpected data after the final frame"));
            }
            self.done = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.plaintext.len() {
                let n = buf.len().min(self.plaintext.len() - self.pos);
                buf[..n].copy_from_slice(&self.plaintext[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.done || buf.is_empty() {
                return Ok(0);
            }
            self.read_frame()?;
        }
    }
}
