//! Property stream data model

use std::collections::HashMap;

use crate::dbpf::Tgi;

/// Signature of exemplar payloads
pub const EXEMPLAR_SIGNATURE: [u8; 4] = *b"EQZB";

/// Signature of cohort payloads
pub const COHORT_SIGNATURE: [u8; 4] = *b"CQZB";

/// Format version bytes following the signature
pub const FORMAT_VERSION: [u8; 4] = *b"1###";

/// Fixed property record header length: id (4) + type (2) + flags (2) +
/// repetition count (2) + padding (3)
pub const RECORD_HEADER_LEN: usize = 13;

/// ExemplarName (standard assignment, verified against base-game fixtures)
pub const PROP_EXEMPLAR_NAME: u32 = 0x0000_0020;
/// Exemplar Patch Targets: (group, instance) pairs a cohort overrides
pub const PROP_PATCH_TARGETS: u32 = 0x0062_E78A;
/// MinSlope: maximum terrain slope a lot tolerates, in degrees
pub const PROP_MIN_SLOPE: u32 = 0x699B_08A4;
/// Zone compatibility set of a lot
pub const PROP_ZONE_TYPES: u32 = 0x88ED_C793;
/// Wealth levels of a lot
pub const PROP_ZONE_WEALTH: u32 = 0x88ED_C795;
/// Purpose codes of a lot
pub const PROP_ZONE_PURPOSE: u32 = 0x88ED_C796;
/// Growth stage (rep-field scalar encoding)
pub const PROP_GROWTH_STAGE: u32 = 0x2781_2837;
/// Corner-placement indicator (rep-field scalar encoding)
pub const PROP_ROAD_CORNER: u32 = 0x4A4A_88F0;
/// Lot object reference list
pub const PROP_LOT_OBJECT: u32 = 0x88ED_C792;

/// Properties that store their scalar in the repetition-count field
///
/// Recognition is by property id plus the declared Uint8 type code, never
/// by inspecting the data shape: ordinary Uint8 arrays use the exact same
/// type code.
pub const REP_SCALAR_PROPERTIES: [u32; 2] = [PROP_GROWTH_STAGE, PROP_ROAD_CORNER];

/// Whether a (property id, type) pair uses the rep-field scalar encoding
pub fn uses_rep_scalar(id: u32, data_type: DataType) -> bool {
    data_type == DataType::Uint8 && REP_SCALAR_PROPERTIES.contains(&id)
}

/// Value type codes used by property records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 0x0100: byte array
    Uint8,
    /// 0x0300: 32-bit unsigned array
    Uint32,
    /// 0x0900: 32-bit float array
    Float32,
    /// 0x0C00 (variant 0x0C05 accepted on decode): UTF-8 string
    String,
}

impl DataType {
    /// Map a wire type code to a data type
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0100 => Some(DataType::Uint8),
            0x0300 => Some(DataType::Uint32),
            0x0900 => Some(DataType::Float32),
            0x0C00 | 0x0C05 => Some(DataType::String),
            _ => None,
        }
    }

    /// Canonical wire code for this type
    pub fn code(self) -> u16 {
        match self {
            DataType::Uint8 => 0x0100,
            DataType::Uint32 => 0x0300,
            DataType::Float32 => 0x0900,
            DataType::String => 0x0C00,
        }
    }

    /// Bytes per element
    pub fn element_size(self) -> usize {
        match self {
            DataType::Uint8 | DataType::String => 1,
            DataType::Uint32 | DataType::Float32 => 4,
        }
    }
}

/// Decoded property value
///
/// `Scalar` is the rep-field encoding resolved at decode time; it never
/// needs to be re-derived from the type code later.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Uint8(Vec<u8>),
    Uint32(Vec<u32>),
    Float32(Vec<f32>),
    String(String),
    /// Single byte carried in the repetition-count field itself
    /// (GrowthStage / RoadCornerIndicator encoding)
    Scalar(u8),
}

impl PropertyValue {
    /// Wire type this value serializes as
    pub fn data_type(&self) -> DataType {
        match self {
            PropertyValue::Uint8(_) | PropertyValue::Scalar(_) => DataType::Uint8,
            PropertyValue::Uint32(_) => DataType::Uint32,
            PropertyValue::Float32(_) => DataType::Float32,
            PropertyValue::String(_) => DataType::String,
        }
    }

    /// Element count, or the inline scalar for rep-field values
    pub fn rep(&self) -> usize {
        match self {
            PropertyValue::Uint8(v) => v.len(),
            PropertyValue::Uint32(v) => v.len(),
            PropertyValue::Float32(v) => v.len(),
            PropertyValue::String(s) => s.len(),
            PropertyValue::Scalar(v) => *v as usize,
        }
    }
}

/// One typed, repeat-counted property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    /// 32-bit property id
    pub id: u32,
    /// Key flag word, preserved across decode/encode
    pub flags: u16,
    pub value: PropertyValue,
}

/// Flag word observed on every base-game and generated property
pub const DEFAULT_PROPERTY_FLAGS: u16 = 0x0080;

impl PropertyRecord {
    pub fn new(id: u32, value: PropertyValue) -> Self {
        Self {
            id,
            flags: DEFAULT_PROPERTY_FLAGS,
            value,
        }
    }
}

/// Payload variant, selected by signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Exemplar,
    Cohort,
}

impl PayloadKind {
    /// Header length preceding the property stream
    ///
    /// Exemplar headers carry 8 reserved bytes cohort headers lack:
    /// signature (8) + parent reference (12) [+ reserved (8)] + count (4).
    pub fn header_len(self) -> usize {
        match self {
            PayloadKind::Exemplar => 32,
            PayloadKind::Cohort => 24,
        }
    }

    pub fn signature(self) -> [u8; 4] {
        match self {
            PayloadKind::Exemplar => EXEMPLAR_SIGNATURE,
            PayloadKind::Cohort => COHORT_SIGNATURE,
        }
    }
}

/// A decoded exemplar or cohort payload
#[derive(Debug, Clone, PartialEq)]
pub struct ExemplarPayload {
    pub kind: PayloadKind,
    /// Parent cohort reference (all zeros when unset)
    pub parent: Tgi,
    pub properties: Vec<PropertyRecord>,
    /// False when the stream ended before the declared property count
    pub complete: bool,
}

impl ExemplarPayload {
    /// Look up a property by id
    ///
    /// `None` means the property is absent from the stream; a present
    /// property with an empty array decodes as `Some` with rep 0.
    pub fn property(&self, id: u32) -> Option<&PropertyRecord> {
        self.properties.iter().find(|p| p.id == id)
    }
}

/// Injected property-id-to-name mapping
///
/// Reverse-engineering notes disagree on a few assignments (ExemplarName
/// in particular has two conflicting historical claims), so the table is
/// supplied by the caller; the default carries the assignments verified
/// against known-good base-game fixtures.
#[derive(Debug, Clone)]
pub struct PropertyNameTable {
    entries: HashMap<u32, String>,
}

impl Default for PropertyNameTable {
    fn default() -> Self {
        let mut table = Self {
            entries: HashMap::new(),
        };
        table.insert(PROP_EXEMPLAR_NAME, "ExemplarName");
        table.insert(PROP_PATCH_TARGETS, "ExemplarPatchTargets");
        table.insert(PROP_MIN_SLOPE, "MinSlope");
        table.insert(PROP_ZONE_TYPES, "ZoneTypes");
        table.insert(PROP_ZONE_WEALTH, "ZoneWealth");
        table.insert(PROP_ZONE_PURPOSE, "ZonePurpose");
        table.insert(PROP_GROWTH_STAGE, "GrowthStage");
        table.insert(PROP_ROAD_CORNER, "RoadCornerIndicator");
        table.insert(PROP_LOT_OBJECT, "LotConfigPropertyLotObject");
        table
    }
}

impl PropertyNameTable {
    /// Empty table, for callers supplying their own assignments
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: u32, name: impl Into<String>) {
        self.entries.insert(id, name.into());
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.entries.get(&id).map(|s| s.as_str())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// Reverse lookup by name
    pub fn id(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_codes() {
        assert_eq!(DataType::from_code(0x0100), Some(DataType::Uint8));
        assert_eq!(DataType::from_code(0x0300), Some(DataType::Uint32));
        assert_eq!(DataType::from_code(0x0900), Some(DataType::Float32));
        assert_eq!(DataType::from_code(0x0C00), Some(DataType::String));
        assert_eq!(DataType::from_code(0x0C05), Some(DataType::String));
        assert_eq!(DataType::from_code(0x0200), None);
        assert_eq!(DataType::String.code(), 0x0C00);
    }

    #[test]
    fn test_rep_scalar_recognition_requires_id_and_type() {
        assert!(uses_rep_scalar(PROP_GROWTH_STAGE, DataType::Uint8));
        assert!(uses_rep_scalar(PROP_ROAD_CORNER, DataType::Uint8));
        // Same type code on an ordinary property: not a scalar
        assert!(!uses_rep_scalar(PROP_ZONE_TYPES, DataType::Uint8));
        // Same id with a different declared type: not a scalar
        assert!(!uses_rep_scalar(PROP_GROWTH_STAGE, DataType::Uint32));
    }

    #[test]
    fn test_name_table_lookup() {
        let table = PropertyNameTable::default();
        assert_eq!(table.name(PROP_MIN_SLOPE), Some("MinSlope"));
        assert_eq!(table.id("ZoneTypes"), Some(PROP_ZONE_TYPES));
        assert!(!table.contains(0xDEAD_BEEF));

        let mut custom = PropertyNameTable::empty();
        custom.insert(0x6A0F_82B2, "ExemplarName");
        assert_eq!(custom.id("ExemplarName"), Some(0x6A0F_82B2));
    }
}
