//! Release archive extraction.

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use super::error::AcquireError;
use crate::platform::ArchiveKind;

/// Unpack `archive` into `dest` in full.
///
/// `dest` must already exist. Entries that would escape `dest` are rejected
/// by the underlying readers.
pub fn extract(kind: ArchiveKind, archive: &Path, dest: &Path) -> Result<(), AcquireError> {
    debug!(archive = %archive.display(), dest = %dest.display(), ?kind, "Extracting archive");

    let file = File::open(archive).map_err(|e| AcquireError::io(archive, e))?;
    let failed = |message: String| AcquireError::ExtractionFailed {
        archive: archive.to_path_buf(),
        message,
    };

    match kind {
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(file).map_err(|e| failed(e.to_string()))?;
            zip.extract(dest).map_err(|e| failed(e.to_string()))
        }
        ArchiveKind::TarGz => {
            let mut tar = tar::Archive::new(GzDecoder::new(file));
            tar.set_preserve_permissions(true);
            tar.unpack(dest).map_err(|e| failed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_tar_gz(path: &Path, name: &str, body: &[u8]) {
        let gz = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, body).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, name: &str, body: &[u8]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        zip.start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(body).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("proxy.tar.gz");
        write_tar_gz(&archive, "bin/proxy", b"#!/bin/sh\n");

        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        extract(ArchiveKind::TarGz, &archive, &out).unwrap();

        assert_eq!(fs::read(out.join("bin/proxy")).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("proxy.zip");
        write_zip(&archive, "proxy.exe", b"MZ");

        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        extract(ArchiveKind::Zip, &archive, &out).unwrap();

        assert_eq!(fs::read(out.join("proxy.exe")).unwrap(), b"MZ");
    }

    #[test]
    fn test_corrupt_archive_is_extraction_failure() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("proxy.zip");
        fs::write(&archive, b"not a zip").unwrap();

        let err = extract(ArchiveKind::Zip, &archive, dir.path()).unwrap_err();
        assert!(matches!(err, AcquireError::ExtractionFailed { .. }));
    }

    #[test]
    fn test_missing_archive_is_io_error() {
        let dir = tempdir().unwrap();
        let err = extract(ArchiveKind::TarGz, &dir.path().join("nope.tar.gz"), dir.path())
            .unwrap_err();
        assert!(matches!(err, AcquireError::Io { .. }));
    }
}
