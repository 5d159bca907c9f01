//! Property stream encoding
//!
//! The structural inverse of [`crate::exemplar::reader`]: little-endian
//! fields, big-endian repetition count, zero padding. Rep-field scalars
//! write their value into the count field and emit no value bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::dbpf::Tgi;
use crate::error::{Error, Result};
use crate::exemplar::types::{
    PayloadKind, PropertyRecord, PropertyValue, FORMAT_VERSION, RECORD_HEADER_LEN,
};

/// Encode a complete payload: header, declared count, property stream
pub fn encode_payload(
    kind: PayloadKind,
    parent: Tgi,
    records: &[PropertyRecord],
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(kind.header_len() + records.len() * RECORD_HEADER_LEN);

    out.extend_from_slice(&kind.signature());
    out.extend_from_slice(&FORMAT_VERSION);
    out.extend_from_slice(&parent.type_id.to_le_bytes());
    out.extend_from_slice(&parent.group_id.to_le_bytes());
    out.extend_from_slice(&parent.instance_id.to_le_bytes());
    if kind == PayloadKind::Exemplar {
        out.extend_from_slice(&[0u8; 8]);
    }
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());

    for record in records {
        encode_record(&mut out, record)?;
    }
    Ok(out)
}

/// Encode just the property stream, without a payload header
pub fn encode_properties(records: &[PropertyRecord]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        encode_record(&mut out, record)?;
    }
    Ok(out)
}

fn encode_record(out: &mut Vec<u8>, record: &PropertyRecord) -> Result<()> {
    let rep = record.value.rep();
    if rep > u16::MAX as usize {
        return Err(Error::InvalidInput(format!(
            "property 0x{:08X} repetition count {} exceeds the 16-bit field",
            record.id, rep
        )));
    }

    out.extend_from_slice(&record.id.to_le_bytes());
    out.extend_from_slice(&record.value.data_type().code().to_le_bytes());
    out.extend_from_slice(&record.flags.to_le_bytes());
    out.extend_from_slice(&(rep as u16).to_be_bytes());
    out.extend_from_slice(&[0u8; 3]);

    match &record.value {
        PropertyValue::Uint8(v) => out.extend_from_slice(v),
        PropertyValue::Uint32(v) => {
            let mut raw = vec![0u8; v.len() * 4];
            LittleEndian::write_u32_into(v, &mut raw);
            out.extend_from_slice(&raw);
        }
        PropertyValue::Float32(v) => {
            let mut raw = vec![0u8; v.len() * 4];
            LittleEndian::write_f32_into(v, &mut raw);
            out.extend_from_slice(&raw);
        }
        PropertyValue::String(s) => out.extend_from_slice(s.as_bytes()),
        // Value already lives in the count field
        PropertyValue::Scalar(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exemplar::reader::{decode_payload, decode_properties};
    use crate::exemplar::types::{
        PROP_GROWTH_STAGE, PROP_MIN_SLOPE, PROP_PATCH_TARGETS, PROP_ZONE_TYPES,
    };

    fn sample_records() -> Vec<PropertyRecord> {
        vec![
            PropertyRecord::new(
                0x0000_0020,
                PropertyValue::String("IND_Chem_Plant3".to_string()),
            ),
            PropertyRecord::new(PROP_ZONE_TYPES, PropertyValue::Uint8(vec![4, 5, 6])),
            PropertyRecord::new(PROP_PATCH_TARGETS, PropertyValue::Uint32(Vec::new())),
            PropertyRecord::new(PROP_GROWTH_STAGE, PropertyValue::Scalar(3)),
            PropertyRecord::new(PROP_MIN_SLOPE, PropertyValue::Float32(vec![89.0])),
        ]
    }

    #[test]
    fn test_property_round_trip() {
        let records = sample_records();
        let bytes = encode_properties(&records).unwrap();
        let (decoded, complete) =
            decode_properties(&bytes, records.len() as u32, 0).unwrap();

        assert!(complete);
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_payload_round_trip_both_kinds() {
        let records = sample_records();
        for kind in [PayloadKind::Exemplar, PayloadKind::Cohort] {
            let parent = Tgi::new(0x0534_2861, 0xB036_97D1, 0x1234);
            let bytes = encode_payload(kind, parent, &records).unwrap();
            let payload = decode_payload(&bytes).unwrap();

            assert_eq!(payload.kind, kind);
            assert_eq!(payload.parent, parent);
            assert_eq!(payload.properties, records);
            assert!(payload.complete);
        }
    }

    #[test]
    fn test_scalar_emits_no_value_bytes() {
        let record = PropertyRecord::new(PROP_GROWTH_STAGE, PropertyValue::Scalar(6));
        let bytes = encode_properties(&[record]).unwrap();

        assert_eq!(bytes.len(), RECORD_HEADER_LEN);
        // Scalar 6 sits in the big-endian count field
        assert_eq!(&bytes[8..10], &[0x00, 0x06]);
    }

    #[test]
    fn test_rep_count_field_is_big_endian() {
        let record =
            PropertyRecord::new(PROP_ZONE_TYPES, PropertyValue::Uint8(vec![0u8; 0x0102]));
        let bytes = encode_properties(&[record]).unwrap();
        assert_eq!(&bytes[8..10], &[0x01, 0x02]);
    }

    #[test]
    fn test_oversized_array_rejected() {
        let record = PropertyRecord::new(
            PROP_ZONE_TYPES,
            PropertyValue::Uint8(vec![0u8; u16::MAX as usize + 1]),
        );
        assert!(matches!(
            encode_properties(&[record]),
            Err(Error::InvalidInput(_))
        ));
    }
}
