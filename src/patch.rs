//! Cohort patch synthesis
//!
//! A patch is a cohort payload with exactly two properties: the target
//! list (the (group, instance) pairs of every exemplar it overrides) and
//! the override value itself. In this toolkit the override is MinSlope
//! set high enough that no terrain qualifies, which stops the targeted
//! lots from ever growing while leaving every other property intact.
//!
//! Cohort instance ids are allocated deterministically: hash the
//! canonicalized target set and map the digest into a private id range
//! disjoint from the base game's identifier space. The same target set
//! always yields the same id and byte-identical payload, so regenerated
//! patches diff clean.

use sha2::{Digest, Sha256};

use crate::dbpf::{Tgi, COHORT_TYPE_ID, PATCH_COHORT_GROUP_ID};
use crate::dbpf_writer::{serialize_entries, DbpfWriteOptions};
use crate::error::{Error, Result};
use crate::exemplar::{
    encode_payload, PayloadKind, PropertyNameTable, PropertyRecord, PropertyValue,
    PROP_MIN_SLOPE, PROP_PATCH_TARGETS,
};

/// MinSlope value (degrees) that makes a lot unbuildable on any terrain
pub const UNBUILDABLE_MIN_SLOPE: f32 = 89.0;

/// Private instance-id sub-range for synthesized cohorts
///
/// A deployment parameter, not a format invariant: the default base sits
/// just past the base game's own range, but the whole range is injectable
/// so it can be reassigned without touching synthesis.
#[derive(Debug, Clone, Copy)]
pub struct PatchIdRange {
    /// First instance id of the range
    pub base: u32,
    /// Number of ids in the range
    pub size: u32,
}

impl Default for PatchIdRange {
    fn default() -> Self {
        Self {
            base: 0xFE7C_E000,
            size: 0x1000,
        }
    }
}

impl PatchIdRange {
    fn id_for_digest(&self, digest: &[u8]) -> u32 {
        let word = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        self.base + (word % self.size.max(1))
    }
}

/// Deterministic cohort instance id for a target set
///
/// Targets are sorted and deduplicated before hashing, so the id is
/// independent of insertion order.
pub fn cohort_instance_id(range: PatchIdRange, targets: &[(u32, u32)]) -> u32 {
    let mut canonical: Vec<(u32, u32)> = targets.to_vec();
    canonical.sort_unstable();
    canonical.dedup();

    let mut hasher = Sha256::new();
    for (group, instance) in &canonical {
        hasher.update(format!("{:08X}{:08X}", group, instance));
    }
    let digest = hasher.finalize();
    range.id_for_digest(digest.as_slice())
}

/// Fallback id derivation for inputs that only carry lot names
pub fn cohort_instance_id_from_names<S: AsRef<str>>(range: PatchIdRange, names: &[S]) -> u32 {
    let mut canonical: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
    canonical.sort_unstable();
    canonical.dedup();

    let mut hasher = Sha256::new();
    for name in &canonical {
        hasher.update(name.as_bytes());
    }
    let digest = hasher.finalize();
    range.id_for_digest(digest.as_slice())
}

/// A synthesized cohort patch, ready to be written into an archive
#[derive(Debug, Clone)]
pub struct CohortPatch {
    pub instance_id: u32,
    /// Encoded cohort payload (uncompressed)
    pub payload: Vec<u8>,
    pub target_count: usize,
}

impl CohortPatch {
    /// Archive key of the cohort entry
    pub fn tgi(&self) -> Tgi {
        Tgi::new(COHORT_TYPE_ID, PATCH_COHORT_GROUP_ID, self.instance_id)
    }

    /// Serialize a single-entry archive holding just this patch
    pub fn to_archive_bytes(&self, options: &DbpfWriteOptions) -> Result<Vec<u8>> {
        serialize_entries(&[(self.tgi(), self.payload.clone())], options)
    }
}

/// Build a cohort patch overriding one property across a set of exemplars
///
/// # Arguments
/// * `target_group_id` - group shared by every target exemplar
/// * `target_instance_ids` - instance ids to override; must be non-empty
/// * `override_id` - property id of the override; must be present in the
///   supplied name table
/// * `override_value` - value the patch forces onto every target
///
/// The target list is canonicalized (sorted, deduplicated), making the
/// output byte-identical across input orderings.
pub fn build_cohort(
    target_group_id: u32,
    target_instance_ids: &[u32],
    override_id: u32,
    override_value: PropertyValue,
    range: PatchIdRange,
    names: &PropertyNameTable,
) -> Result<CohortPatch> {
    if target_instance_ids.is_empty() {
        return Err(Error::InvalidInput(
            "cohort patch needs at least one target exemplar".to_string(),
        ));
    }
    if !names.contains(override_id) {
        return Err(Error::InvalidInput(format!(
            "unknown override property 0x{:08X}",
            override_id
        )));
    }

    let mut ids: Vec<u32> = target_instance_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let targets: Vec<(u32, u32)> = ids.iter().map(|&i| (target_group_id, i)).collect();
    let instance_id = cohort_instance_id(range, &targets);

    // Flat (group, instance) pair list, the layout the hooks expect
    let mut pairs = Vec::with_capacity(targets.len() * 2);
    for (group, instance) in &targets {
        pairs.push(*group);
        pairs.push(*instance);
    }

    let records = vec![
        PropertyRecord::new(PROP_PATCH_TARGETS, PropertyValue::Uint32(pairs)),
        PropertyRecord::new(override_id, override_value),
    ];
    let payload = encode_payload(PayloadKind::Cohort, Tgi::new(0, 0, 0), &records)?;

    Ok(CohortPatch {
        instance_id,
        payload,
        target_count: targets.len(),
    })
}

/// Build the standard growth-blocking patch (MinSlope override)
pub fn build_blocker(
    target_group_id: u32,
    target_instance_ids: &[u32],
    range: PatchIdRange,
    names: &PropertyNameTable,
) -> Result<CohortPatch> {
    build_cohort(
        target_group_id,
        target_instance_ids,
        PROP_MIN_SLOPE,
        PropertyValue::Float32(vec![UNBUILDABLE_MIN_SLOPE]),
        range,
        names,
    )
}
