use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::Result;

const CHUNK_SIZE: usize = 65536;

/// Streams the file in fixed-size chunks and returns its hex-encoded SHA-256
/// digest, used for `file_hash` and change detection (§4.4.3).
pub async fn hash_file(path: &std::path::Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn hashes_match_for_identical_content() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"hello world").unwrap();
        b.write_all(b"hello world").unwrap();
        let ha = hash_file(a.path()).await.unwrap();
        let hb = hash_file(b.path()).await.unwrap();
        assert_eq!(ha, hb);
    }

    #[tokio::test]
    async fn hashes_differ_for_different_content() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"hello world").unwrap();
        b.write_all(b"goodbye world").unwrap();
        let ha = hash_file(a.path()).await.unwrap();
        let hb = hash_file(b.path()).await.unwrap();
        assert_ne!(ha, hb);
    }
}
