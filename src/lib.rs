//! # undbpf
//!
//! A Rust library for extracting and patching SimCity 4 DBPF `.dat` files.
//!
//! ## Overview
//!
//! SimCity 4 plugins are DBPF archives: an indexed container of entries
//! keyed by (type, group, instance), many of them QFS-compressed exemplar
//! payloads holding typed property records. This library provides:
//!
//! - Reading DBPF archives and locating entries by key
//! - QFS (RefPack) decompression
//! - Decoding and encoding exemplar/cohort property streams, including
//!   the format's mixed-byte-order record header and rep-field scalars
//! - Classifying LotConfiguration exemplars by zone, wealth and purpose
//! - Synthesizing cohort patches that override targeted exemplars, with
//!   deterministic instance-id allocation
//! - Writing DBPF archives and datpacking many archives into one
//!
//! ## Example - Reading
//!
//! ```rust,no_run
//! use undbpf::DbpfFile;
//! use undbpf::dbpf::{EXEMPLAR_TYPE_ID, LOT_CONFIG_GROUP_ID};
//!
//! fn main() -> anyhow::Result<()> {
//!     let dat = DbpfFile::open("SimCity_1.dat")?;
//!
//!     for entry in dat.entries_matching(Some(EXEMPLAR_TYPE_ID), Some(LOT_CONFIG_GROUP_ID)) {
//!         let payload = dat.extract_entry(entry)?;
//!         let exemplar = undbpf::exemplar::decode_payload(&payload)?;
//!         let lot = undbpf::lots::classify(entry.tgi, &exemplar);
//!         println!("{:?}", lot.name);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Example - Building a patch
//!
//! ```rust,no_run
//! use undbpf::dbpf::LOT_CONFIG_GROUP_ID;
//! use undbpf::exemplar::PropertyNameTable;
//! use undbpf::patch::{build_blocker, PatchIdRange};
//! use undbpf::dbpf_writer::DbpfWriteOptions;
//!
//! fn main() -> anyhow::Result<()> {
//!     let patch = build_blocker(
//!         LOT_CONFIG_GROUP_ID,
//!         &[0x6A63633B, 0x6A63633C],
//!         PatchIdRange::default(),
//!         &PropertyNameTable::default(),
//!     )?;
//!
//!     let bytes = patch.to_archive_bytes(&DbpfWriteOptions::default())?;
//!     std::fs::write("stop_growable.dat", bytes)?;
//!     Ok(())
//! }
//! ```

pub mod datpack;
pub mod dbpf;
pub mod dbpf_writer;
pub mod error;
pub mod exemplar;
pub mod lots;
pub mod patch;
pub mod qfs;
pub mod utils;

pub use datpack::{merge, MergeConflict, MergeResult};
pub use dbpf::{DbpfEntry, DbpfFile, DbpfHeader, Tgi};
pub use dbpf_writer::{serialize_entries, DbpfWriteOptions, DbpfWriter};
pub use error::{Error, Result};
pub use exemplar::{ExemplarPayload, PropertyNameTable, PropertyRecord, PropertyValue};
pub use lots::{classify, LotConfiguration, Purpose, Wealth};
pub use patch::{build_blocker, build_cohort, CohortPatch, PatchIdRange};
pub use utils::{collect_dbpf_files, create_glob_matcher, format_size, matches_filter};
