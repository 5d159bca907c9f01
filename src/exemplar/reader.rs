//! Property stream decoding

use byteorder::{ByteOrder, LittleEndian};

use crate::dbpf::Tgi;
use crate::error::{Error, Result};
use crate::exemplar::types::{
    uses_rep_scalar, DataType, ExemplarPayload, PayloadKind, PropertyRecord, PropertyValue,
    COHORT_SIGNATURE, EXEMPLAR_SIGNATURE, RECORD_HEADER_LEN,
};

/// Fixed record header fields, before value bytes
struct RecordHeader {
    id: u32,
    type_code: u16,
    flags: u16,
    rep: u16,
    padding: [u8; 3],
}

/// Decode the 13-byte record header
///
/// Every multi-byte field is little-endian except the repetition count,
/// which is big-endian. That is the on-disk format, not an accident; do
/// not "fix" it to a uniform byte order.
fn decode_record_header(bytes: &[u8]) -> RecordHeader {
    RecordHeader {
        id: LittleEndian::read_u32(&bytes[0..4]),
        type_code: LittleEndian::read_u16(&bytes[4..6]),
        flags: LittleEndian::read_u16(&bytes[6..8]),
        rep: u16::from_be_bytes([bytes[8], bytes[9]]),
        padding: [bytes[10], bytes[11], bytes[12]],
    }
}

/// Decode a full exemplar or cohort payload
///
/// The payload kind is selected by signature; the two kinds carry
/// different header lengths, so the property stream offset depends on it.
pub fn decode_payload(data: &[u8]) -> Result<ExemplarPayload> {
    if data.len() < 4 {
        return Err(Error::Decode {
            offset: 0,
            reason: format!("payload of {} bytes has no signature", data.len()),
        });
    }
    let kind = if data[0..4] == EXEMPLAR_SIGNATURE {
        PayloadKind::Exemplar
    } else if data[0..4] == COHORT_SIGNATURE {
        PayloadKind::Cohort
    } else {
        return Err(Error::Decode {
            offset: 0,
            reason: format!("unknown payload signature {:02X?}", &data[0..4]),
        });
    };

    let header_len = kind.header_len();
    if data.len() < header_len {
        return Err(Error::Decode {
            offset: data.len(),
            reason: format!(
                "{} bytes is too short for the {}-byte header",
                data.len(),
                header_len
            ),
        });
    }

    // Signature (8 bytes incl. version), then parent reference
    let parent = Tgi::new(
        LittleEndian::read_u32(&data[8..12]),
        LittleEndian::read_u32(&data[12..16]),
        LittleEndian::read_u32(&data[16..20]),
    );
    let declared = LittleEndian::read_u32(&data[header_len - 4..header_len]);

    let (properties, complete) = decode_properties(&data[header_len..], declared, header_len)?;

    Ok(ExemplarPayload {
        kind,
        parent,
        properties,
        complete,
    })
}

/// Decode up to `declared` property records from `stream`
///
/// `base` is the byte offset of `stream` within the enclosing payload,
/// used only for error reporting.
///
/// Running out of header bytes before the declared count is a graceful
/// stop (the records decoded so far are returned with `complete` false).
/// A malformed record (unknown type code, non-zero padding on an
/// ordinary property, or a value running past the end of the buffer) is
/// a [`Error::Decode`].
pub fn decode_properties(
    stream: &[u8],
    declared: u32,
    base: usize,
) -> Result<(Vec<PropertyRecord>, bool)> {
    // A corrupt count must not drive the allocation; cap by what the
    // buffer could physically hold.
    let possible = stream.len() / RECORD_HEADER_LEN;
    let mut records = Vec::with_capacity((declared as usize).min(possible));
    let mut pos = 0usize;

    for _ in 0..declared {
        if stream.len() - pos < RECORD_HEADER_LEN {
            return Ok((records, false));
        }
        let (record, consumed) = decode_record(&stream[pos..], base + pos)?;
        records.push(record);
        pos += consumed;
    }

    Ok((records, true))
}

fn decode_record(bytes: &[u8], offset: usize) -> Result<(PropertyRecord, usize)> {
    let header = decode_record_header(bytes);

    let data_type = DataType::from_code(header.type_code).ok_or_else(|| Error::Decode {
        offset,
        reason: format!(
            "property 0x{:08X} has unknown type code 0x{:04X}",
            header.id, header.type_code
        ),
    })?;

    // Rep-field scalar: the value is the count field, no value bytes
    // follow, and the padding bytes may legitimately be non-zero.
    if uses_rep_scalar(header.id, data_type) {
        let record = PropertyRecord {
            id: header.id,
            flags: header.flags,
            value: PropertyValue::Scalar(header.rep as u8),
        };
        return Ok((record, RECORD_HEADER_LEN));
    }

    if header.padding != [0, 0, 0] {
        return Err(Error::Decode {
            offset,
            reason: format!(
                "property 0x{:08X} has non-zero padding {:02X?}",
                header.id, header.padding
            ),
        });
    }

    let rep = header.rep as usize;
    let value_len = rep * data_type.element_size();
    let available = bytes.len() - RECORD_HEADER_LEN;
    if value_len > available {
        return Err(Error::Decode {
            offset,
            reason: format!(
                "property 0x{:08X} declares {} value bytes but only {} remain",
                header.id, value_len, available
            ),
        });
    }

    let raw = &bytes[RECORD_HEADER_LEN..RECORD_HEADER_LEN + value_len];
    let value = match data_type {
        DataType::Uint8 => PropertyValue::Uint8(raw.to_vec()),
        DataType::Uint32 => {
            let mut values = vec![0u32; rep];
            LittleEndian::read_u32_into(raw, &mut values);
            PropertyValue::Uint32(values)
        }
        DataType::Float32 => {
            let mut values = vec![0f32; rep];
            LittleEndian::read_f32_into(raw, &mut values);
            PropertyValue::Float32(values)
        }
        DataType::String => {
            // Trim at the first NUL; invalid UTF-8 is replaced, never fatal
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            PropertyValue::String(String::from_utf8_lossy(&raw[..end]).into_owned())
        }
    };

    let record = PropertyRecord {
        id: header.id,
        flags: header.flags,
        value,
    };
    Ok((record, RECORD_HEADER_LEN + value_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exemplar::types::{PROP_GROWTH_STAGE, PROP_ZONE_TYPES};

    /// Hand-built record: ZoneTypes, Uint8 x2, rep count in the odd byte order
    fn zone_types_record() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PROP_ZONE_TYPES.to_le_bytes());
        bytes.extend_from_slice(&0x0100u16.to_le_bytes()); // type
        bytes.extend_from_slice(&0x0080u16.to_le_bytes()); // flags
        bytes.extend_from_slice(&2u16.to_be_bytes()); // rep, big-endian
        bytes.extend_from_slice(&[0, 0, 0]); // padding
        bytes.extend_from_slice(&[0x01, 0x02]);
        bytes
    }

    #[test]
    fn test_record_header_mixed_byte_order() {
        // rep bytes are [0x01, 0x02]: big-endian 0x0102, NOT 0x0201
        let mut bytes = vec![0u8; 13];
        bytes[0..4].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        bytes[4..6].copy_from_slice(&0x0300u16.to_le_bytes());
        bytes[6..8].copy_from_slice(&0x0080u16.to_le_bytes());
        bytes[8] = 0x01;
        bytes[9] = 0x02;

        let header = decode_record_header(&bytes);
        assert_eq!(header.id, 0x1234_5678);
        assert_eq!(header.type_code, 0x0300);
        assert_eq!(header.flags, 0x0080);
        assert_eq!(header.rep, 0x0102);
    }

    #[test]
    fn test_decode_uint8_array() {
        let (records, complete) = decode_properties(&zone_types_record(), 1, 0).unwrap();
        assert!(complete);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, PROP_ZONE_TYPES);
        assert_eq!(records[0].value, PropertyValue::Uint8(vec![0x01, 0x02]));
    }

    #[test]
    fn test_growth_stage_scalar_from_rep_field() {
        // GrowthStage, Uint8 type, rep field 6, non-zero "padding": the
        // scalar is 6 and no value bytes are consumed.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PROP_GROWTH_STAGE.to_le_bytes());
        bytes.extend_from_slice(&0x0100u16.to_le_bytes());
        bytes.extend_from_slice(&0x0080u16.to_le_bytes());
        bytes.extend_from_slice(&6u16.to_be_bytes());
        bytes.extend_from_slice(&[0xAB, 0xCD, 0xEF]);
        // A following record must start right after the 13-byte header
        bytes.extend_from_slice(&zone_types_record());

        let (records, complete) = decode_properties(&bytes, 2, 0).unwrap();
        assert!(complete);
        assert_eq!(records[0].value, PropertyValue::Scalar(6));
        assert_eq!(records[1].id, PROP_ZONE_TYPES);
    }

    #[test]
    fn test_rep_zero_is_empty_array_not_absent() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PROP_ZONE_TYPES.to_le_bytes());
        bytes.extend_from_slice(&0x0100u16.to_le_bytes());
        bytes.extend_from_slice(&0x0080u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);

        let (records, complete) = decode_properties(&bytes, 1, 0).unwrap();
        assert!(complete);
        assert_eq!(records[0].value, PropertyValue::Uint8(Vec::new()));
    }

    #[test]
    fn test_uint32_overrun_is_decode_error() {
        // Declares 8 u32 elements with only 4 value bytes present
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1111_1111u32.to_le_bytes());
        bytes.extend_from_slice(&0x0300u16.to_le_bytes());
        bytes.extend_from_slice(&0x0080u16.to_le_bytes());
        bytes.extend_from_slice(&8u16.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(&[0xFF; 4]);

        let err = decode_properties(&bytes, 1, 0).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_header_shortage_is_graceful_partial() {
        let mut bytes = zone_types_record();
        bytes.extend_from_slice(&[0x12, 0x34]); // 2 stray bytes, not a header

        let (records, complete) = decode_properties(&bytes, 2, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!complete);
    }

    #[test]
    fn test_nonzero_padding_on_ordinary_property_is_error() {
        let mut bytes = zone_types_record();
        bytes[10] = 0x99;

        let err = decode_properties(&bytes, 1, 0).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_unknown_signature_is_decode_error() {
        let err = decode_payload(b"XYZW1###____________________").unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 0, .. }));
    }

    #[test]
    fn test_string_decodes_lossy_and_nul_trimmed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x0000_0020u32.to_le_bytes());
        bytes.extend_from_slice(&0x0C00u16.to_le_bytes());
        bytes.extend_from_slice(&0x0080u16.to_le_bytes());
        bytes.extend_from_slice(&6u16.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(b"R$\xFF!\x00Z");

        let (records, _) = decode_properties(&bytes, 1, 0).unwrap();
        match &records[0].value {
            PropertyValue::String(s) => assert_eq!(s, "R$\u{FFFD}!"),
            other => panic!("expected string, got {:?}", other),
        }
    }
}
