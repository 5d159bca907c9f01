//! General utility functions for undbpf
//!
//! This module contains common helper functions used across the library.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::dbpf::DBPF_MAGIC;

/// Format a file size in human-readable form (B, KB, MB, GB)
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

/// Create a glob matcher from a pattern string
///
/// Handles common patterns:
/// - `*.ext` becomes `**/*.ext` (match in any directory)
/// - Plain text without wildcards becomes `**/*text*` (substring search)
pub fn create_glob_matcher(pattern: &str) -> Result<GlobMatcher> {
    let pattern = if pattern.starts_with("*.") {
        format!("**/{}", pattern)
    } else if !pattern.contains('*') && !pattern.contains('?') {
        // Treat as substring search
        format!("**/*{}*", pattern)
    } else {
        pattern.to_string()
    };

    let glob = Glob::new(&pattern).with_context(|| format!("Invalid pattern: {}", pattern))?;
    Ok(glob.compile_matcher())
}

/// Check if a name matches the optional filter
pub fn matches_filter(name: &str, matcher: Option<&GlobMatcher>) -> bool {
    match matcher {
        Some(m) => m.is_match(name),
        None => true,
    }
}

/// Check whether a file starts with the DBPF magic
pub fn is_dbpf_file(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    match File::open(path) {
        Ok(mut file) => file.read_exact(&mut magic).is_ok() && magic == DBPF_MAGIC,
        Err(_) => false,
    }
}

/// Recursively collect DBPF files under a directory, regardless of extension
///
/// Plugin packs ship DBPF content as `.dat`, `.SC4Lot`, `.SC4Desc` and
/// plain unlabeled files, so detection goes by magic, not name.
pub fn collect_dbpf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_dbpf_files_recursive(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_dbpf_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                collect_dbpf_files_recursive(&path, files)?;
            } else if is_dbpf_file(&path) {
                files.push(path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_dbpf_discovery_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();

        let mut dat = File::create(nested.join("plugin.SC4Lot")).unwrap();
        dat.write_all(b"DBPF rest of file").unwrap();
        let mut other = File::create(dir.path().join("readme.txt")).unwrap();
        other.write_all(b"not an archive").unwrap();

        let found = collect_dbpf_files(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("plugin.SC4Lot"));
    }

    #[test]
    fn test_glob_matcher_substring_fallback() {
        let matcher = create_glob_matcher("growable").unwrap();
        assert!(matches_filter("stop_maxis_growable_R$.dat", Some(&matcher)));
        assert!(!matches_filter("terrain_mod.dat", Some(&matcher)));
        assert!(matches_filter("anything", None));
    }
}
