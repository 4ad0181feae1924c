//! EV-013: BLAKE3 fingerprints of entity source files.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

const STREAM_BUF_SIZE: usize = 65536;

/// Content fingerprint per source file, ordered by path.
pub type Snapshot = BTreeMap<PathBuf, String>;

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Fingerprint every file. Files that vanish mid-scan are left out, so
/// they show up as removed on the next diff.
pub fn snapshot(files: &[PathBuf]) -> Snapshot {
    files
        .iter()
        .filter_map(|path| match hash_file(path) {
            Ok(hash) => Some((path.clone(), hash)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                None
            }
        })
        .collect()
}
