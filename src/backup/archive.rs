//! tar.gz packing of backup directories
//!
//! All functions here do blocking file I/O and are meant to be called from
//! `spawn_blocking`.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::errors::Result;

pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Pack `dir` into `archive` under the top-level entry `root_name`
pub fn compress_dir(dir: &Path, root_name: &str, archive: &Path) -> Result<()> {
    let file = File::create(archive)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(root_name, dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Contents of every archive entry whose path satisfies `wanted`
pub fn read_entries<F>(archive: &Path, wanted: F) -> Result<Vec<(String, Vec<u8>)>>
where
    F: Fn(&str) -> bool,
{
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut found = Vec::new();
    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();
        if !wanted(&path) {
            continue;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        found.push((path, contents));
    }
    Ok(found)
}

/// Contents of a single archive entry
pub fn read_entry(archive: &Path, entry_path: &str) -> Result<Option<Vec<u8>>> {
    let mut entries = read_entries(archive, |path| path == entry_path)?;
    Ok(entries.pop().map(|(_, contents)| contents))
}

/// Total size of a file or directory tree in bytes
pub fn disk_usage(path: &Path) -> io::Result<u64> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += disk_usage(&entry?.path())?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("backup-x");
        std::fs::create_dir_all(source.join("zones")).unwrap();
        std::fs::write(source.join("manifest.json"), b"{}").unwrap();
        std::fs::write(source.join("zones/example.com.json"), b"[1]").unwrap();

        let archive = dir.path().join("backup-x.tar.gz");
        compress_dir(&source, "backup-x", &archive).unwrap();

        assert_eq!(read_entry(&archive, "backup-x/manifest.json").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(read_entry(&archive, "backup-x/missing.json").unwrap(), None);

        let zones = read_entries(&archive, |p| p.starts_with("backup-x/zones/") && p.ends_with(".json")).unwrap();
        assert_eq!(zones.len(), 1);

        let checksum = sha256_file(&archive).unwrap();
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, sha256_file(&archive).unwrap());
        assert_eq!(disk_usage(&source).unwrap(), 5);
    }
}
