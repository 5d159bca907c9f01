//! Lot configuration classification
//!
//! Turns a decoded LotConfiguration exemplar into its domain view: zone
//! compatibility, wealth, purpose, growth stage, corner placement. The
//! (purpose, wealth) taxonomy has exactly twelve valid combinations; lots
//! compatible with a reserved zone (military through civic) are never
//! patch targets.

use serde::{Deserialize, Serialize};

use crate::dbpf::Tgi;
use crate::exemplar::{
    ExemplarPayload, PropertyValue, PROP_EXEMPLAR_NAME, PROP_GROWTH_STAGE, PROP_ROAD_CORNER,
    PROP_ZONE_PURPOSE, PROP_ZONE_TYPES, PROP_ZONE_WEALTH,
};

/// Development purpose of a growable lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Purpose {
    Residential,
    CommercialService,
    CommercialOffice,
    IndustrialResource,
    IndustrialDirty,
    IndustrialManufacturing,
    IndustrialHighTech,
}

impl Purpose {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Purpose::Residential),
            2 => Some(Purpose::CommercialService),
            3 => Some(Purpose::CommercialOffice),
            5 => Some(Purpose::IndustrialResource),
            6 => Some(Purpose::IndustrialDirty),
            7 => Some(Purpose::IndustrialManufacturing),
            8 => Some(Purpose::IndustrialHighTech),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Purpose::Residential => 1,
            Purpose::CommercialService => 2,
            Purpose::CommercialOffice => 3,
            Purpose::IndustrialResource => 5,
            Purpose::IndustrialDirty => 6,
            Purpose::IndustrialManufacturing => 7,
            Purpose::IndustrialHighTech => 8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Purpose::Residential => "R",
            Purpose::CommercialService => "CS",
            Purpose::CommercialOffice => "CO",
            Purpose::IndustrialResource => "I-r",
            Purpose::IndustrialDirty => "I-d",
            Purpose::IndustrialManufacturing => "I-m",
            Purpose::IndustrialHighTech => "I-ht",
        }
    }
}

/// Wealth level of a growable lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Wealth {
    Low,
    Medium,
    High,
}

impl Wealth {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Wealth::Low),
            2 => Some(Wealth::Medium),
            3 => Some(Wealth::High),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Wealth::Low => 1,
            Wealth::Medium => 2,
            Wealth::High => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Wealth::Low => "$",
            Wealth::Medium => "$$",
            Wealth::High => "$$$",
        }
    }
}

/// The twelve (purpose, wealth) combinations the game actually grows
pub const VALID_COMBINATIONS: [(Purpose, Wealth); 12] = [
    (Purpose::Residential, Wealth::Low),
    (Purpose::Residential, Wealth::Medium),
    (Purpose::Residential, Wealth::High),
    (Purpose::CommercialService, Wealth::Low),
    (Purpose::CommercialService, Wealth::Medium),
    (Purpose::CommercialService, Wealth::High),
    (Purpose::CommercialOffice, Wealth::Medium),
    (Purpose::CommercialOffice, Wealth::High),
    (Purpose::IndustrialResource, Wealth::Low),
    (Purpose::IndustrialDirty, Wealth::Medium),
    (Purpose::IndustrialManufacturing, Wealth::Medium),
    (Purpose::IndustrialHighTech, Wealth::High),
];

/// Short group label, e.g. `R$`, `CS$$`, `I-ht$$$`
pub fn group_label(purpose: Purpose, wealth: Wealth) -> String {
    format!("{}{}", purpose.label(), wealth.label())
}

/// Parse a group label back into its combination
pub fn combination_from_label(label: &str) -> Option<(Purpose, Wealth)> {
    VALID_COMBINATIONS
        .iter()
        .copied()
        .find(|&(p, w)| group_label(p, w) == label)
}

/// Zone codes reserved for non-growable content: military, airport,
/// seaport, spaceport, landmark, civic
pub fn is_reserved_zone(zone: u8) -> bool {
    (0x0A..=0x0F).contains(&zone)
}

/// Classified view of one LotConfiguration exemplar
///
/// Derived from the property stream and recomputed on demand; absence of
/// a property is kept distinct from a present-but-empty array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotConfiguration {
    pub group_id: u32,
    pub instance_id: u32,
    pub name: Option<String>,
    pub zone_types: Option<Vec<u8>>,
    pub purposes: Option<Vec<u8>>,
    pub wealths: Option<Vec<u8>>,
    pub growth_stage: Option<u8>,
    pub corner_lot: bool,
}

/// Coerce a property value into a byte list
///
/// Base-game exemplars store the taxonomy arrays as Uint8, but custom
/// content occasionally uses Uint32 for the same properties.
fn as_u8_list(value: &PropertyValue) -> Vec<u8> {
    match value {
        PropertyValue::Uint8(v) => v.clone(),
        PropertyValue::Uint32(v) => v.iter().map(|&x| x as u8).collect(),
        PropertyValue::Scalar(v) => vec![*v],
        _ => Vec::new(),
    }
}

fn scalar_of(value: &PropertyValue) -> Option<u8> {
    match value {
        PropertyValue::Scalar(v) => Some(*v),
        PropertyValue::Uint8(v) => v.first().copied(),
        PropertyValue::Uint32(v) => v.first().map(|&x| x as u8),
        _ => None,
    }
}

/// Classify a decoded exemplar payload
pub fn classify(tgi: Tgi, payload: &ExemplarPayload) -> LotConfiguration {
    let name = payload.property(PROP_EXEMPLAR_NAME).and_then(|p| match &p.value {
        PropertyValue::String(s) => Some(s.clone()),
        PropertyValue::Uint8(v) => {
            let end = v.iter().position(|&b| b == 0).unwrap_or(v.len());
            Some(String::from_utf8_lossy(&v[..end]).into_owned())
        }
        _ => None,
    });

    LotConfiguration {
        group_id: tgi.group_id,
        instance_id: tgi.instance_id,
        name,
        zone_types: payload
            .property(PROP_ZONE_TYPES)
            .map(|p| as_u8_list(&p.value)),
        purposes: payload
            .property(PROP_ZONE_PURPOSE)
            .map(|p| as_u8_list(&p.value)),
        wealths: payload
            .property(PROP_ZONE_WEALTH)
            .map(|p| as_u8_list(&p.value)),
        growth_stage: payload
            .property(PROP_GROWTH_STAGE)
            .and_then(|p| scalar_of(&p.value)),
        corner_lot: payload
            .property(PROP_ROAD_CORNER)
            .and_then(|p| scalar_of(&p.value))
            .map_or(false, |v| v != 0),
    }
}

impl LotConfiguration {
    /// Whether the zone set touches the reserved range
    pub fn has_reserved_zone(&self) -> bool {
        self.zone_types
            .as_deref()
            .map_or(false, |zones| zones.iter().any(|&z| is_reserved_zone(z)))
    }

    /// (group, instance) pair identifying this lot as a patch target
    pub fn patch_target(&self) -> (u32, u32) {
        (self.group_id, self.instance_id)
    }

    /// All valid (purpose, wealth) combinations this lot grows as
    ///
    /// Empty when the lot is excluded: reserved zone compatibility, a
    /// missing zone-type set, or missing purpose/wealth properties. A lot
    /// carrying several purposes or wealths lands in several groups.
    pub fn group_keys(&self) -> Vec<(Purpose, Wealth)> {
        if self.zone_types.is_none() || self.has_reserved_zone() {
            return Vec::new();
        }
        let (purposes, wealths) = match (&self.purposes, &self.wealths) {
            (Some(p), Some(w)) => (p, w),
            _ => return Vec::new(),
        };

        let mut keys = Vec::new();
        for &p in purposes {
            for &w in wealths {
                let combo = match (Purpose::from_code(p), Wealth::from_code(w)) {
                    (Some(p), Some(w)) => (p, w),
                    _ => continue,
                };
                if VALID_COMBINATIONS.contains(&combo) && !keys.contains(&combo) {
                    keys.push(combo);
                }
            }
        }
        keys
    }

    /// Primary grouping key, when the lot is patchable at all
    pub fn group_key(&self) -> Option<(Purpose, Wealth)> {
        self.group_keys().into_iter().next()
    }
}
