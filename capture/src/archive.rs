//! # archive — บีบอัด Day Store ที่จบแล้ว
//!
//! `data-DAY.db` → `data-DAY.db.gz` แล้วลบตัว live ทิ้ง
//! Idempotent: ถ้า live copy หายไปแล้ว (เคยบีบอัดไปแล้ว) = no-op

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use flate2::write::GzEncoder;
use flate2::Compression;

#[derive(Debug, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// บีบอัดสำเร็จ — path ของไฟล์ `.gz`
    Archived(PathBuf),
    /// ไม่มี live copy ให้บีบอัด (ทำไปแล้ว หรือวันนั้นไม่มีข้อมูล)
    AlreadyGone,
}

/// Blocking I/O — caller ฝั่ง async ต้องห่อด้วย `spawn_blocking`
pub fn archive_day(db_path: &Path) -> anyhow::Result<ArchiveOutcome> {
    if !db_path.exists() {
        return Ok(ArchiveOutcome::AlreadyGone);
    }

    let gz_path = PathBuf::from(format!("{}.gz", db_path.display()));

    let mut input = File::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("Failed to create {}", gz_path.display()))?;

    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder).context("Failed to compress day store")?;
    encoder.finish().context("Failed to finalize gzip stream")?;

    std::fs::remove_file(db_path)
        .with_context(|| format!("Failed to remove live copy {}", db_path.display()))?;

    Ok(ArchiveOutcome::Archived(gz_path))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_archive_compresses_and_removes_live_copy() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data-2024-06-14.db");
        std::fs::write(&db, b"not really sqlite but good enough").unwrap();

        let outcome = archive_day(&db).unwrap();

        let gz = dir.path().join("data-2024-06-14.db.gz");
        assert_eq!(outcome, ArchiveOutcome::Archived(gz.clone()));
        assert!(!db.exists());

        let mut decoder = GzDecoder::new(File::open(&gz).unwrap());
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).unwrap();
        assert_eq!(restored, b"not really sqlite but good enough");
    }

    #[test]
    fn test_archive_is_idempotent_when_live_copy_gone() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data-2024-06-14.db");

        assert_eq!(archive_day(&db).unwrap(), ArchiveOutcome::AlreadyGone);
    }
}
