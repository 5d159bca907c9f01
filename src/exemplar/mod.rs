//! Exemplar and cohort payload parsing
//!
//! Decompressed exemplar entries hold a property stream: a small header
//! (`EQZB1###` for exemplars, `CQZB1###` for cohorts) followed by typed,
//! repeat-counted property records. This module decodes and encodes that
//! stream, including the two format quirks that make it hostile to
//! generic struct readers: a repetition-count field stored big-endian
//! inside an otherwise little-endian record header, and two properties
//! whose scalar value is carried in the repetition count itself.

pub mod reader;
pub mod types;
pub mod writer;

pub use reader::{decode_payload, decode_properties};
pub use types::{
    DataType, ExemplarPayload, PayloadKind, PropertyNameTable, PropertyRecord, PropertyValue,
    PROP_EXEMPLAR_NAME, PROP_GROWTH_STAGE, PROP_LOT_OBJECT, PROP_MIN_SLOPE, PROP_PATCH_TARGETS,
    PROP_ROAD_CORNER, PROP_ZONE_PURPOSE, PROP_ZONE_TYPES, PROP_ZONE_WEALTH,
};
pub use writer::{encode_payload, encode_properties};
