//! Streaming checksum computation.
//!
//! Content files and packages can be many gigabytes, so digests are always
//! computed over a fixed-size buffer rather than by loading the whole input.

use crate::error::{KeepsakeError, Result, ResultExt as _};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::digest::Output;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Buffer size for streaming reads (8 KB).
const BUFFER_SIZE: usize = 8192;

/// Digest algorithm, fixed per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }

    /// Length in characters of a hex digest of this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = KeepsakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            other => Err(KeepsakeError::Argument(format!(
                "unsupported checksum algorithm '{other}'"
            ))),
        }
    }
}

/// Compute the digest of everything `source` yields, as lowercase hex.
///
/// # Errors
///
/// Returns error if reading from `source` fails.
pub fn compute_checksum<R: Read>(source: R, algorithm: ChecksumAlgorithm) -> Result<String> {
    match algorithm {
        ChecksumAlgorithm::Md5 => stream_digest::<Md5, R>(source),
        ChecksumAlgorithm::Sha256 => stream_digest::<Sha256, R>(source),
    }
}

/// Compute the digest of a file using streaming I/O.
///
/// # Errors
///
/// Returns error if the file cannot be opened or read.
pub fn compute_file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    compute_checksum(BufReader::with_capacity(BUFFER_SIZE, file), algorithm)
        .with_context(|| format!("Failed to hash {}", path.display()))
}

/// Compare two digests ignoring case and surrounding whitespace.
///
/// Archive-reported and catalog-stored checksums may differ in case.
pub fn digests_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn stream_digest<D, R>(mut source: R) -> Result<String>
where
    D: Digest,
    Output<D>: fmt::LowerHex,
    R: Read,
{
    let mut hasher = D::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = source.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("{hash:x}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn test_md5_known_value() {
        let hash = compute_checksum(&b"hello world"[..], ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(hash, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_sha256_known_value() {
        let hash = compute_checksum(&b"hello world"[..], ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_md5_empty_input() {
        let hash = compute_checksum(&b""[..], ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(hash, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_file_checksum_larger_than_buffer() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let data = vec![7u8; BUFFER_SIZE * 3 + 100];
        temp_file.write_all(&data).unwrap();
        temp_file.flush().unwrap();

        let from_file = compute_file_checksum(temp_file.path(), ChecksumAlgorithm::Md5).unwrap();
        let from_memory = compute_checksum(&data[..], ChecksumAlgorithm::Md5).unwrap();

        assert_eq!(from_file, from_memory);
        assert_eq!(from_file.len(), ChecksumAlgorithm::Md5.hex_len());
    }

    #[test]
    fn test_file_checksum_nonexistent() {
        let result = compute_file_checksum(Path::new("/nonexistent/file.bin"), ChecksumAlgorithm::Md5);
        assert!(result.is_err());
    }

    #[test]
    fn test_digests_equal_ignores_case() {
        assert!(digests_equal("ABCD", "abcd"));
        assert!(digests_equal(" abcd\n", "ABCD"));
        assert!(!digests_equal("abcd", "abce"));
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("MD5".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Md5);
        assert_eq!(
            "sha-256".parse::<ChecksumAlgorithm>().unwrap(),
            ChecksumAlgorithm::Sha256
        );
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }
}
