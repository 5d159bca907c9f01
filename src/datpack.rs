//! Datpacking: merging DBPF archives
//!
//! Combines the entries of several archives into one, keyed by their
//! (type, group, instance) triples. A key seen twice is a conflict: it is
//! always reported, and resolved by keeping the bytes of the entry
//! encountered last. The merged archive gets a freshly built index table;
//! nothing from the input index tables is carried over.

use std::collections::HashMap;

use crate::dbpf::{DbpfFile, Tgi};
use crate::dbpf_writer::{serialize_entries, DbpfWriteOptions};
use crate::error::Result;

/// One duplicate key found during a merge
#[derive(Debug, Clone)]
pub struct MergeConflict {
    pub key: Tgi,
    /// Source whose bytes were replaced
    pub replaced: String,
    /// Source whose bytes won (last writer)
    pub kept: String,
}

/// Result of merging archives: the combined entries plus every conflict
#[derive(Debug)]
pub struct MergeResult {
    /// Merged entries, in first-encounter order
    pub entries: Vec<(Tgi, Vec<u8>)>,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeResult {
    /// Serialize the merged archive
    pub fn serialize(&self, options: &DbpfWriteOptions) -> Result<Vec<u8>> {
        serialize_entries(&self.entries, options)
    }

    /// Total payload bytes across merged entries
    pub fn data_size(&self) -> usize {
        self.entries.iter().map(|(_, data)| data.len()).sum()
    }
}

/// Merge archives in input order
///
/// Each input is a (label, archive) pair; labels name the sources in
/// conflict reports. Entry payloads are copied raw, compressed or not.
pub fn merge(inputs: &[(String, DbpfFile)]) -> MergeResult {
    let mut entries: Vec<(Tgi, Vec<u8>)> = Vec::new();
    let mut sources: Vec<String> = Vec::new();
    let mut positions: HashMap<Tgi, usize> = HashMap::new();
    let mut conflicts = Vec::new();

    for (label, archive) in inputs {
        for entry in archive.entries() {
            let data = archive.raw_entry(entry).to_vec();
            match positions.get(&entry.tgi) {
                Some(&i) => {
                    conflicts.push(MergeConflict {
                        key: entry.tgi,
                        replaced: sources[i].clone(),
                        kept: label.clone(),
                    });
                    entries[i].1 = data;
                    sources[i] = label.clone();
                }
                None => {
                    positions.insert(entry.tgi, entries.len());
                    entries.push((entry.tgi, data));
                    sources.push(label.clone());
                }
            }
        }
    }

    MergeResult { entries, conflicts }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(entries: &[(Tgi, &[u8])]) -> DbpfFile {
        let owned: Vec<(Tgi, Vec<u8>)> =
            entries.iter().map(|(t, d)| (*t, d.to_vec())).collect();
        let bytes = serialize_entries(&owned, &DbpfWriteOptions::fixed(0)).unwrap();
        DbpfFile::parse(bytes).unwrap()
    }

    #[test]
    fn test_merge_disjoint_archives() {
        let inputs = vec![
            ("a.dat".to_string(), archive(&[(Tgi::new(1, 1, 1), b"one")])),
            ("b.dat".to_string(), archive(&[(Tgi::new(1, 1, 2), b"two")])),
        ];
        let result = merge(&inputs);

        assert_eq!(result.entries.len(), 2);
        assert!(result.conflicts.is_empty());

        let merged = DbpfFile::parse(
            result.serialize(&DbpfWriteOptions::fixed(0)).unwrap(),
        )
        .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged.raw_entry(merged.get(Tgi::new(1, 1, 2)).unwrap()),
            b"two"
        );
    }

    #[test]
    fn test_duplicate_key_reports_conflict_last_write_wins() {
        let shared = Tgi::new(5, 6, 7);
        let inputs = vec![
            (
                "first.dat".to_string(),
                archive(&[(shared, b"old bytes"), (Tgi::new(5, 6, 8), b"keep")]),
            ),
            ("second.dat".to_string(), archive(&[(shared, b"new bytes")])),
        ];
        let result = merge(&inputs);

        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.key, shared);
        assert_eq!(conflict.replaced, "first.dat");
        assert_eq!(conflict.kept, "second.dat");

        // Last writer's bytes survive, at the key's original position
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].0, shared);
        assert_eq!(result.entries[0].1, b"new bytes");
    }

    #[test]
    fn test_merge_rebuilds_index() {
        let inputs = vec![
            ("a.dat".to_string(), archive(&[(Tgi::new(1, 1, 1), b"xx")])),
            ("b.dat".to_string(), archive(&[(Tgi::new(2, 2, 2), b"yyyy")])),
        ];
        let bytes = merge(&inputs)
            .serialize(&DbpfWriteOptions::fixed(0))
            .unwrap();
        let merged = DbpfFile::parse(bytes).unwrap();

        assert_eq!(merged.header.index_count, 2);
        // Entries are contiguous from the end of the header
        assert_eq!(merged.entries()[0].offset, 96);
        assert_eq!(merged.entries()[1].offset, 98);
    }
}
