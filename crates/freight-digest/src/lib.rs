//! Streaming blake2b-256 checksums for freight cache objects.
//!
//! Every object in the freight cache is identified by the lowercase hex
//! encoding of its blake2b-256 digest (64 characters). This crate provides
//! the one hashing primitive the rest of the workspace builds on:
//! [`checksum`] consumes any [`Read`] stream and emits that digest.
//!
//! # Invariants
//!
//! - A digest is exactly 64 lowercase hex characters.
//! - The digest is deterministic over the byte sequence, independent of
//!   buffer size.

use std::io::{self, Read};

use blake2::digest::consts::U32;
use blake2::Blake2b;
use digest::Digest;

/// The 256-bit blake2b variant used for all freight digests.
pub type Blake2b256 = Blake2b<U32>;

/// Length of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Buffer size used when the caller passes `0` to [`checksum`].
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Consume `reader` fully and return the lowercase hex blake2b-256 digest of
/// its bytes.
///
/// A `buffer_size` of `0` selects [`DEFAULT_BUFFER_SIZE`].
pub fn checksum<R: Read>(mut reader: R, buffer_size: usize) -> io::Result<String> {
    let buffer_size = if buffer_size == 0 {
        DEFAULT_BUFFER_SIZE
    } else {
        buffer_size
    };
    let mut hasher = Blake2b256::new();
    let mut buf = vec![0u8; buffer_size];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of an in-memory byte slice.
pub fn checksum_bytes(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Blake2b256::digest(bytes))
}

/// Returns `true` if `s` is syntactically a freight digest: exactly 64
/// lowercase hex characters.
pub fn is_valid(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// A [`Read`] adapter that hashes every byte read through it.
///
/// Used by the cache to tee a workspace file into a temp object while
/// computing its digest in a single pass. Call [`HashingReader::finalize`]
/// to retrieve the hex digest once the stream is exhausted.
pub struct HashingReader<R> {
    reader: R,
    hasher: Blake2b256,
}

impl<R: Read> HashingReader<R> {
    /// Wrap `reader` with a fresh hasher.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: Blake2b256::new(),
        }
    }

    /// Consume the adapter and return the hex digest of all bytes read.
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
