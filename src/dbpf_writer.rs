//! DBPF archive writing
//!
//! Entries are streamed out first, in insertion order, then the index
//! table; the header's index count/offset/size fields are backfilled by
//! seeking once the table position is known. Total entry size is only
//! known after the data pass, so offsets are never computed up front.
//!
//! Generated entries are always written uncompressed.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::dbpf::{Tgi, DBPF_MAGIC};
use crate::error::{Error, Result};

/// Options for writing DBPF archives
#[derive(Debug, Clone, Copy)]
pub struct DbpfWriteOptions {
    /// Creation timestamp stored in the header (Unix seconds)
    pub created: u32,
    /// Modification timestamp stored in the header (Unix seconds)
    pub modified: u32,
}

impl Default for DbpfWriteOptions {
    fn default() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        Self {
            created: now,
            modified: now,
        }
    }
}

impl DbpfWriteOptions {
    /// Pin both timestamps, making the output byte-reproducible
    pub fn fixed(timestamp: u32) -> Self {
        Self {
            created: timestamp,
            modified: timestamp,
        }
    }
}

/// Offset of the backfilled index fields (count, offset, size) in the header
const INDEX_FIELDS_OFFSET: u64 = 36;

struct WrittenEntry {
    tgi: Tgi,
    offset: u32,
    size: u32,
}

/// A DBPF archive writer
///
/// # Example
/// ```no_run
/// use undbpf::{DbpfWriter, Tgi};
///
/// let mut writer = DbpfWriter::create("patch.dat")?;
/// writer.add_entry(Tgi::new(0x05342861, 0xB03697D1, 1), b"payload")?;
/// writer.finish()?;
/// # Ok::<(), undbpf::Error>(())
/// ```
pub struct DbpfWriter<W: Write + Seek> {
    writer: W,
    entries: Vec<WrittenEntry>,
    options: DbpfWriteOptions,
}

impl DbpfWriter<BufWriter<File>> {
    /// Create a new DBPF file for writing
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, DbpfWriteOptions::default())
    }

    /// Create a new DBPF file with explicit options
    pub fn create_with_options<P: AsRef<Path>>(
        path: P,
        options: DbpfWriteOptions,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Self::new_with_options(BufWriter::new(file), options)
    }
}

impl<W: Write + Seek> DbpfWriter<W> {
    /// Wrap an arbitrary seekable sink
    pub fn new(writer: W) -> Result<Self> {
        Self::new_with_options(writer, DbpfWriteOptions::default())
    }

    pub fn new_with_options(writer: W, options: DbpfWriteOptions) -> Result<Self> {
        let mut this = Self {
            writer,
            entries: Vec::new(),
            options,
        };
        this.write_header()?;
        Ok(this)
    }

    /// Header with zeroed index fields; finish() patches them in
    fn write_header(&mut self) -> Result<()> {
        self.writer.write_all(&DBPF_MAGIC)?;
        self.writer.write_u32::<LittleEndian>(1)?; // major version
        self.writer.write_u32::<LittleEndian>(0)?; // minor version
        self.writer.write_all(&[0u8; 12])?; // reserved
        self.writer.write_u32::<LittleEndian>(self.options.created)?;
        self.writer.write_u32::<LittleEndian>(self.options.modified)?;
        self.writer.write_u32::<LittleEndian>(7)?; // index major version
        self.writer.write_u32::<LittleEndian>(0)?; // index count (backfilled)
        self.writer.write_u32::<LittleEndian>(0)?; // index offset (backfilled)
        self.writer.write_u32::<LittleEndian>(0)?; // index size (backfilled)
        self.writer.write_all(&[0u8; 32])?; // hole table fields
        self.writer.write_u32::<LittleEndian>(0)?; // index minor version
        self.writer.write_all(&[0u8; 12])?; // pad to 96 bytes
        Ok(())
    }

    /// Append an entry payload
    ///
    /// Keys must be unique within the archive; adding a duplicate is
    /// rejected rather than silently shadowing the earlier entry.
    pub fn add_entry(&mut self, tgi: Tgi, data: &[u8]) -> Result<()> {
        if self.entries.iter().any(|e| e.tgi == tgi) {
            return Err(Error::InvalidInput(format!("duplicate entry key {}", tgi)));
        }

        let offset = self.writer.stream_position()?;
        self.writer.write_all(data)?;

        self.entries.push(WrittenEntry {
            tgi,
            offset: offset as u32,
            size: data.len() as u32,
        });
        Ok(())
    }

    /// Write the index table, backfill the header, and return the sink
    pub fn finish(mut self) -> Result<W> {
        let index_offset = self.writer.stream_position()?;

        for entry in &self.entries {
            self.writer.write_u32::<LittleEndian>(entry.tgi.type_id)?;
            self.writer.write_u32::<LittleEndian>(entry.tgi.group_id)?;
            self.writer.write_u32::<LittleEndian>(entry.tgi.instance_id)?;
            self.writer.write_u32::<LittleEndian>(entry.offset)?;
            self.writer.write_u32::<LittleEndian>(entry.size)?;
        }
        let index_size = self.writer.stream_position()? - index_offset;

        self.writer.seek(SeekFrom::Start(INDEX_FIELDS_OFFSET))?;
        self.writer
            .write_u32::<LittleEndian>(self.entries.len() as u32)?;
        self.writer.write_u32::<LittleEndian>(index_offset as u32)?;
        self.writer.write_u32::<LittleEndian>(index_size as u32)?;
        self.writer.seek(SeekFrom::End(0))?;

        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Serialize a sequence of keyed payloads into archive bytes
pub fn serialize_entries(
    entries: &[(Tgi, Vec<u8>)],
    options: &DbpfWriteOptions,
) -> Result<Vec<u8>> {
    let mut writer = DbpfWriter::new_with_options(Cursor::new(Vec::new()), *options)?;
    for (tgi, data) in entries {
        writer.add_entry(*tgi, data)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbpf::DbpfFile;

    #[test]
    fn test_archive_round_trip() {
        let entries = vec![
            (Tgi::new(1, 2, 3), vec![0xAAu8; 40]),
            (Tgi::new(1, 2, 4), b"hello".to_vec()),
        ];
        let bytes = serialize_entries(&entries, &DbpfWriteOptions::fixed(1234)).unwrap();
        let dat = DbpfFile::parse(bytes).unwrap();

        assert_eq!(dat.len(), 2);
        assert_eq!(dat.header.created, 1234);
        for (tgi, data) in &entries {
            assert_eq!(dat.raw_entry(dat.get(*tgi).unwrap()), data.as_slice());
        }
    }

    #[test]
    fn test_index_follows_data() {
        let bytes = serialize_entries(
            &[(Tgi::new(1, 2, 3), b"abc".to_vec())],
            &DbpfWriteOptions::fixed(0),
        )
        .unwrap();
        let dat = DbpfFile::parse(bytes).unwrap();

        // Data region starts right after the header, index right after data
        let entry = dat.get(Tgi::new(1, 2, 3)).unwrap();
        assert_eq!(entry.offset, 96);
        assert_eq!(dat.header.index_offset, 96 + 3);
        assert_eq!(dat.header.index_size, 20);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut writer = DbpfWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.add_entry(Tgi::new(1, 2, 3), b"a").unwrap();
        assert!(matches!(
            writer.add_entry(Tgi::new(1, 2, 3), b"b"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fixed_timestamps_reproducible() {
        let entries = vec![(Tgi::new(9, 9, 9), b"data".to_vec())];
        let opts = DbpfWriteOptions::fixed(42);
        let first = serialize_entries(&entries, &opts).unwrap();
        let second = serialize_entries(&entries, &opts).unwrap();
        assert_eq!(first, second);
    }
}
