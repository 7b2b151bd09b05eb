//! File naming inside a database directory.
//!
//! ```text
//! 000005.log         write-ahead log segment
//! 000007.ldb         sorted table
//! MANIFEST-000002    version edit log
//! CURRENT            name of the active manifest
//! 000009.dbtmp       scratch file, renamed into place
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Log,
    Table,
    Descriptor,
    Current,
    Temp,
}

pub fn log_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.log", number))
}

pub fn table_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.ldb", number))
}

/// Older table suffix, still accepted when reading.
pub fn sst_table_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.sst", number))
}

pub fn descriptor_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("MANIFEST-{:06}", number))
}

pub fn current_file_name(dir: &Path) -> PathBuf {
    dir.join("CURRENT")
}

pub fn temp_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.dbtmp", number))
}

/// Classify a directory entry. Returns `None` for files the engine does not own.
pub fn parse_file_name(name: &str) -> Option<(u64, FileType)> {
    if name == "CURRENT" {
        return Some((0, FileType::Current));
    }
    if let Some(rest) = name.strip_prefix("MANIFEST-") {
        return parse_number(rest).map(|n| (n, FileType::Descriptor));
    }
    let (stem, suffix) = name.split_once('.')?;
    let number = parse_number(stem)?;
    let file_type = match suffix {
        "log" => FileType::Log,
        "ldb" | "sst" => FileType::Table,
        "dbtmp" => FileType::Temp,
        _ => return None,
    };
    Some((number, file_type))
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Point CURRENT at `MANIFEST-<number>` with a write-then-rename.
pub fn set_current_file(dir: &Path, descriptor_number: u64) -> Result<()> {
    let manifest = format!("MANIFEST-{:06}\n", descriptor_number);
    let tmp = temp_file_name(dir, descriptor_number);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(manifest.as_bytes())?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, current_file_name(dir)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Read the manifest file name out of CURRENT.
pub fn read_current_file(dir: &Path) -> Result<String> {
    let contents = fs::read_to_string(current_file_name(dir))?;
    let name = contents.strip_suffix('\n').ok_or_else(|| {
        crate::error::StrataError::corruption("CURRENT file does not end with newline")
    })?;
    if name.is_empty() {
        return Err(crate::error::StrataError::corruption("CURRENT file is empty"));
    }
    Ok(name.to_string())
}
