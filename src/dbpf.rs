//! DBPF container format handling
//!
//! DBPF ("Database Packed File") is the archive format SimCity 4 uses for
//! its `.dat` plugins. The layout is a 96-byte header, a data region of
//! contiguous entry payloads, and a flat index table of 20-byte records,
//! one per entry:
//!
//! - header: `DBPF` magic, version 1.0, timestamps, index version 7, entry
//!   count, index offset, index size
//! - index record: type id, group id, instance id, file offset, file size
//!   (all little-endian u32)
//!
//! Entries are keyed by their (type, group, instance) triple, unique
//! within one archive. Compressed entries carry a 4-byte size prefix and
//! the `10 FB` QFS signature; see [`crate::qfs`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::qfs;

/// DBPF magic signature
pub const DBPF_MAGIC: [u8; 4] = *b"DBPF";

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 96;

/// Size of one index table record in bytes
pub const INDEX_ENTRY_SIZE: usize = 20;

/// Type id of exemplar entries
pub const EXEMPLAR_TYPE_ID: u32 = 0x6534_284A;

/// Type id of cohort entries (used by exemplar patches)
pub const COHORT_TYPE_ID: u32 = 0x0534_2861;

/// Group id shared by every LotConfiguration exemplar
pub const LOT_CONFIG_GROUP_ID: u32 = 0xA8FB_D372;

/// Group id the resource-loading hooks scan for patch cohorts
pub const PATCH_COHORT_GROUP_ID: u32 = 0xB036_97D1;

/// Composite (type, group, instance) key of one archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tgi {
    pub type_id: u32,
    pub group_id: u32,
    pub instance_id: u32,
}

impl Tgi {
    pub const fn new(type_id: u32, group_id: u32, instance_id: u32) -> Self {
        Self {
            type_id,
            group_id,
            instance_id,
        }
    }
}

impl fmt::Display for Tgi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T=0x{:08X} G=0x{:08X} I=0x{:08X}",
            self.type_id, self.group_id, self.instance_id
        )
    }
}

/// Parsed DBPF header
#[derive(Debug, Clone)]
pub struct DbpfHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub created: u32,
    pub modified: u32,
    pub index_major: u32,
    pub index_count: u32,
    pub index_offset: u32,
    pub index_size: u32,
}

impl DbpfHeader {
    /// Parse the 96-byte header from the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Truncated(format!(
                "file of {} bytes is shorter than the {}-byte header",
                data.len(),
                HEADER_SIZE
            )));
        }
        if data[0..4] != DBPF_MAGIC {
            return Err(Error::Format(format!(
                "bad magic {:02X?} (expected \"DBPF\")",
                &data[0..4]
            )));
        }

        let mut cursor = Cursor::new(&data[4..HEADER_SIZE]);
        let major_version = cursor.read_u32::<LittleEndian>()?;
        let minor_version = cursor.read_u32::<LittleEndian>()?;
        // Reserved
        for _ in 0..3 {
            cursor.read_u32::<LittleEndian>()?;
        }
        let created = cursor.read_u32::<LittleEndian>()?;
        let modified = cursor.read_u32::<LittleEndian>()?;
        let index_major = cursor.read_u32::<LittleEndian>()?;
        let index_count = cursor.read_u32::<LittleEndian>()?;
        let index_offset = cursor.read_u32::<LittleEndian>()?;
        let index_size = cursor.read_u32::<LittleEndian>()?;

        Ok(DbpfHeader {
            major_version,
            minor_version,
            created,
            modified,
            index_major,
            index_count,
            index_offset,
            index_size,
        })
    }
}

/// One entry in the index table
#[derive(Debug, Clone)]
pub struct DbpfEntry {
    /// Composite key
    pub tgi: Tgi,
    /// Byte offset of the payload within the archive
    pub offset: u32,
    /// Payload length in bytes
    pub size: u32,
}

/// A DBPF archive held fully in memory
///
/// The whole file is read into one buffer up front; entry payloads are
/// slices of that buffer. Once constructed the archive is immutable, so
/// entries can be processed concurrently without locking.
pub struct DbpfFile {
    data: Vec<u8>,
    pub header: DbpfHeader,
    entries: Vec<DbpfEntry>,
    lookup: HashMap<Tgi, usize>,
}

impl DbpfFile {
    /// Open a DBPF file for reading
    ///
    /// # Example
    /// ```no_run
    /// use undbpf::DbpfFile;
    /// let dat = DbpfFile::open("SimCity_1.dat")?;
    /// # Ok::<(), undbpf::Error>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        Self::parse(data)
    }

    /// Parse an archive from an in-memory buffer
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let header = DbpfHeader::parse(&data)?;

        let index_start = header.index_offset as usize;
        let index_len = header.index_count as usize * INDEX_ENTRY_SIZE;
        let index_end = index_start.checked_add(index_len).ok_or_else(|| {
            Error::Truncated(format!(
                "index table offset {:#x} overflows",
                header.index_offset
            ))
        })?;
        if index_end > data.len() {
            return Err(Error::Truncated(format!(
                "index table ({} entries at offset {:#x}) runs past end of file ({} bytes)",
                header.index_count,
                header.index_offset,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(&data[index_start..index_end]);
        let mut entries = Vec::with_capacity(header.index_count as usize);
        let mut lookup = HashMap::with_capacity(header.index_count as usize);

        for _ in 0..header.index_count {
            let type_id = cursor.read_u32::<LittleEndian>()?;
            let group_id = cursor.read_u32::<LittleEndian>()?;
            let instance_id = cursor.read_u32::<LittleEndian>()?;
            let offset = cursor.read_u32::<LittleEndian>()?;
            let size = cursor.read_u32::<LittleEndian>()?;
            let tgi = Tgi::new(type_id, group_id, instance_id);

            let span_end = offset as usize + size as usize;
            if (offset as usize) < HEADER_SIZE {
                return Err(Error::Format(format!(
                    "entry {} offset {:#x} points inside the header",
                    tgi, offset
                )));
            }
            if span_end > data.len() {
                return Err(Error::Truncated(format!(
                    "entry {} ({} bytes at offset {:#x}) runs past end of file ({} bytes)",
                    tgi,
                    size,
                    offset,
                    data.len()
                )));
            }
            // Entry spans live in the data region; an entry covering the
            // index table means the offsets are lying about something.
            if (offset as usize) < index_end && span_end > index_start {
                return Err(Error::Format(format!(
                    "entry {} span overlaps the index table at offset {:#x}",
                    tgi, header.index_offset
                )));
            }
            if lookup.contains_key(&tgi) {
                return Err(Error::Format(format!("duplicate entry key {}", tgi)));
            }

            lookup.insert(tgi, entries.len());
            entries.push(DbpfEntry { tgi, offset, size });
        }

        Ok(DbpfFile {
            data,
            header,
            entries,
            lookup,
        })
    }

    /// Number of entries in the archive
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All index entries, in index-table order
    pub fn entries(&self) -> &[DbpfEntry] {
        &self.entries
    }

    /// Look up an entry by key
    pub fn get(&self, tgi: Tgi) -> Option<&DbpfEntry> {
        self.lookup.get(&tgi).map(|&i| &self.entries[i])
    }

    /// Iterate entries matching an optional type and group filter
    pub fn entries_matching(
        &self,
        type_id: Option<u32>,
        group_id: Option<u32>,
    ) -> impl Iterator<Item = &DbpfEntry> {
        self.entries.iter().filter(move |e| {
            type_id.map_or(true, |t| e.tgi.type_id == t)
                && group_id.map_or(true, |g| e.tgi.group_id == g)
        })
    }

    /// Raw payload bytes of an entry, exactly as stored
    pub fn raw_entry(&self, entry: &DbpfEntry) -> &[u8] {
        &self.data[entry.offset as usize..entry.offset as usize + entry.size as usize]
    }

    /// Extract an entry by key, decompressing when needed
    pub fn extract(&self, tgi: Tgi) -> Result<Vec<u8>> {
        let entry = self
            .get(tgi)
            .ok_or_else(|| Error::EntryNotFound(tgi.to_string()))?;
        self.extract_entry(entry)
    }

    /// Extract an entry's payload, decompressing when needed
    ///
    /// The QFS signature is checked exactly once per entry; payloads that
    /// do not carry it are returned verbatim, never run through the
    /// decoder on a guess.
    pub fn extract_entry(&self, entry: &DbpfEntry) -> Result<Vec<u8>> {
        let raw = self.raw_entry(entry);
        if qfs::is_compressed(raw) {
            qfs::decompress(&raw[4..])
        } else {
            Ok(raw.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbpf_writer::{serialize_entries, DbpfWriteOptions};

    fn sample_archive() -> Vec<u8> {
        let entries = vec![
            (Tgi::new(0x10, 0x20, 0x30), b"first".to_vec()),
            (Tgi::new(0x10, 0x20, 0x31), b"second entry".to_vec()),
            (Tgi::new(0x11, 0x21, 0x32), b"x".to_vec()),
        ];
        serialize_entries(&entries, &DbpfWriteOptions::fixed(0)).unwrap()
    }

    #[test]
    fn test_open_yields_byte_exact_entries() {
        let bytes = sample_archive();
        let dat = DbpfFile::parse(bytes).unwrap();

        assert_eq!(dat.len(), 3);
        assert_eq!(dat.header.index_count, 3);
        assert_eq!(
            dat.raw_entry(dat.get(Tgi::new(0x10, 0x20, 0x30)).unwrap()),
            b"first"
        );
        assert_eq!(
            dat.raw_entry(dat.get(Tgi::new(0x10, 0x20, 0x31)).unwrap()),
            b"second entry"
        );
        assert_eq!(dat.raw_entry(dat.get(Tgi::new(0x11, 0x21, 0x32)).unwrap()), b"x");
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let mut bytes = sample_archive();
        bytes[0] = b'X';
        assert!(matches!(DbpfFile::parse(bytes), Err(Error::Format(_))));
    }

    #[test]
    fn test_index_past_end_is_truncated_error() {
        let mut bytes = sample_archive();
        // Point the index table far past the end of the buffer
        bytes[40..44].copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());
        assert!(matches!(DbpfFile::parse(bytes), Err(Error::Truncated(_))));
    }

    #[test]
    fn test_entry_span_past_end_is_truncated_error() {
        let bytes = sample_archive();
        let dat = DbpfFile::parse(bytes.clone()).unwrap();
        let index_start = dat.header.index_offset as usize;

        // Inflate the first entry's size field
        let mut broken = bytes;
        broken[index_start + 16..index_start + 20]
            .copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());
        assert!(matches!(DbpfFile::parse(broken), Err(Error::Truncated(_))));
    }

    #[test]
    fn test_entries_matching_filters_by_type_and_group() {
        let dat = DbpfFile::parse(sample_archive()).unwrap();

        let both: Vec<_> = dat.entries_matching(Some(0x10), Some(0x20)).collect();
        assert_eq!(both.len(), 2);

        let by_type: Vec<_> = dat.entries_matching(Some(0x11), None).collect();
        assert_eq!(by_type.len(), 1);
        assert_eq!(by_type[0].tgi.instance_id, 0x32);

        assert_eq!(dat.entries_matching(Some(0xFF), None).count(), 0);
    }

    #[test]
    fn test_empty_archive_round_trip() {
        let bytes = serialize_entries(&[], &DbpfWriteOptions::fixed(0)).unwrap();
        let dat = DbpfFile::parse(bytes).unwrap();
        assert!(dat.is_empty());
    }

    #[test]
    fn test_extract_entry_decompresses() {
        // Raw entry: 4-byte size prefix + QFS stream for "ABCDABCDABCD"
        let mut payload = vec![17, 0, 0, 0];
        payload.extend_from_slice(&[0x10, 0xFB, 0x00, 0x00, 0x0C]);
        payload.extend_from_slice(&[0xE0, b'A', b'B', b'C', b'D', 0x14, 0x03]);

        let tgi = Tgi::new(EXEMPLAR_TYPE_ID, LOT_CONFIG_GROUP_ID, 1);
        let bytes =
            serialize_entries(&[(tgi, payload)], &DbpfWriteOptions::fixed(0)).unwrap();
        let dat = DbpfFile::parse(bytes).unwrap();

        assert_eq!(dat.extract(tgi).unwrap(), b"ABCDABCDABCD");
    }

    #[test]
    fn test_extract_missing_entry() {
        let dat = DbpfFile::parse(sample_archive()).unwrap();
        assert!(matches!(
            dat.extract(Tgi::new(1, 2, 3)),
            Err(Error::EntryNotFound(_))
        ));
    }
}
