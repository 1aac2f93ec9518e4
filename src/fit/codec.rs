// SPDX-License-Identifier: MIT

//! FIT binary decode/encode.
//!
//! Decode walks the record stream, tracking definition messages per local
//! type, and buckets every data message into a [`FitMessageSet`]. Kinds we
//! don't specifically model are preserved opaquely (raw field bytes), so a
//! round trip keeps them. Encode re-frames the set under a protocol 2.0
//! header and emits kind buckets in a pinned order (file_id first, activity
//! last). Garmin doesn't require the original interleaving, only the
//! bracketing, and a deterministic order keeps output reproducible.

use crate::fit::crc::crc16;
use crate::fit::message::{
    kind, FitDevField, FitField, FitMessage, FitMessageSet, TIMESTAMP_FIELD,
};

/// Protocol version written into the output header (2.0).
const PROTOCOL_VERSION: u8 = 0x20;
/// Profile version written into the output header. Matches what Garmin's
/// own units of the spoofed generation produce.
const PROFILE_VERSION: u16 = 2134;

const HEADER_LEN: usize = 14;
const FIT_SIGNATURE: &[u8; 4] = b".FIT";

/// Errors from decoding a FIT byte stream.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid FIT file: {0}")]
    InvalidFormat(String),

    #[error("truncated FIT data at byte {offset}")]
    Truncated { offset: usize },
}

/// A field definition: (definition number, size in bytes, base type).
type FieldDef = (u8, u8, u8);

/// Definition message state for one local message type.
#[derive(Debug, Clone)]
struct Definition {
    kind: u16,
    big_endian: bool,
    fields: Vec<FieldDef>,
    /// (field number, size, developer data index)
    dev_fields: Vec<FieldDef>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            bytes,
            pos: start,
            end,
        }
    }

    fn remaining(&self) -> bool {
        self.pos < self.end
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.end {
            return Err(DecodeError::Truncated { offset: self.pos });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self, big_endian: bool) -> Result<u16, DecodeError> {
        let b: [u8; 2] = self.take(2)?.try_into().unwrap();
        Ok(if big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }
}

/// Decode a FIT byte stream into a message set.
pub fn decode(bytes: &[u8]) -> Result<FitMessageSet, DecodeError> {
    if bytes.len() < 12 {
        return Err(DecodeError::InvalidFormat(
            "file too short for FIT header".to_string(),
        ));
    }
    if &bytes[8..12] != FIT_SIGNATURE {
        return Err(DecodeError::InvalidFormat(
            "missing .FIT signature".to_string(),
        ));
    }

    let header_size = bytes[0] as usize;
    if header_size < 12 {
        return Err(DecodeError::InvalidFormat(format!(
            "header size {} too small",
            header_size
        )));
    }
    if header_size > bytes.len() {
        return Err(DecodeError::Truncated { offset: bytes.len() });
    }

    let data_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let data_end = header_size + data_size;
    // Data region plus the two-byte file CRC must fit.
    if data_end + 2 > bytes.len() {
        return Err(DecodeError::Truncated { offset: bytes.len() });
    }

    let mut reader = Reader::new(bytes, header_size, data_end);
    let mut definitions: [Option<Definition>; 16] = Default::default();
    let mut set = FitMessageSet::new();
    let mut first_kind: Option<u16> = None;
    let mut last_timestamp: Option<u32> = None;

    while reader.remaining() {
        let header = reader.u8()?;

        if header & 0x80 != 0 {
            // Compressed-timestamp data message: local type in bits 5-6,
            // 5-bit time offset in bits 0-4.
            let local = ((header >> 5) & 0x03) as usize;
            let offset = header & 0x1F;
            let def = definitions[local].clone().ok_or_else(|| {
                DecodeError::InvalidFormat(format!(
                    "data record for undefined local type {}",
                    local
                ))
            })?;
            let mut msg = read_data_message(&mut reader, &def)?;
            if let Some(base) = last_timestamp {
                // Expand the rolling offset to a full timestamp so the
                // sample time survives re-framing.
                let ts = expand_timestamp(base, offset);
                msg.set_u32(TIMESTAMP_FIELD, ts);
                last_timestamp = Some(ts);
            }
            first_kind.get_or_insert(msg.kind);
            set.push(msg);
        } else if header & 0x40 != 0 {
            // Definition message
            let local = (header & 0x0F) as usize;
            let has_dev = header & 0x20 != 0;
            let _reserved = reader.u8()?;
            let arch = reader.u8()?;
            let big_endian = arch == 1;
            let msg_kind = reader.u16(big_endian)?;

            let num_fields = reader.u8()? as usize;
            let mut fields = Vec::with_capacity(num_fields);
            for _ in 0..num_fields {
                let def = reader.take(3)?;
                fields.push((def[0], def[1], def[2]));
            }

            let mut dev_fields = Vec::new();
            if has_dev {
                let num_dev = reader.u8()? as usize;
                for _ in 0..num_dev {
                    let def = reader.take(3)?;
                    dev_fields.push((def[0], def[1], def[2]));
                }
            }

            definitions[local] = Some(Definition {
                kind: msg_kind,
                big_endian,
                fields,
                dev_fields,
            });
        } else {
            // Normal data message
            let local = (header & 0x0F) as usize;
            let def = definitions[local].clone().ok_or_else(|| {
                DecodeError::InvalidFormat(format!(
                    "data record for undefined local type {}",
                    local
                ))
            })?;
            let msg = read_data_message(&mut reader, &def)?;
            if let Some(ts) = msg.field_u32(TIMESTAMP_FIELD) {
                last_timestamp = Some(ts);
            }
            first_kind.get_or_insert(msg.kind);
            set.push(msg);
        }
    }

    if first_kind != Some(kind::FILE_ID) {
        return Err(DecodeError::InvalidFormat(
            "first data message is not file_id".to_string(),
        ));
    }

    Ok(set)
}

fn read_data_message(reader: &mut Reader, def: &Definition) -> Result<FitMessage, DecodeError> {
    let mut msg = FitMessage::new(def.kind);
    msg.big_endian = def.big_endian;
    for &(def_num, size, base_type) in &def.fields {
        let data = reader.take(size as usize)?.to_vec();
        msg.push_field(FitField {
            def_num,
            base_type,
            data,
        });
    }
    for &(field_num, size, dev_data_index) in &def.dev_fields {
        let data = reader.take(size as usize)?.to_vec();
        msg.push_dev_field(FitDevField {
            field_num,
            dev_data_index,
            data,
        });
    }
    Ok(msg)
}

/// Apply a 5-bit compressed time offset to the rolling timestamp base.
fn expand_timestamp(base: u32, offset: u8) -> u32 {
    let candidate = (base & !0x1F) | offset as u32;
    if candidate < base {
        candidate + 0x20
    } else {
        candidate
    }
}

/// Encode a message set into a fresh FIT byte stream.
///
/// The output always uses a 14-byte protocol 2.0 header; the input's
/// protocol version is not preserved. Each field is written back at the
/// width and byte order it carries in the set.
pub fn encode(set: &FitMessageSet) -> Vec<u8> {
    let mut body = Vec::new();
    // One local type is enough: a new definition is emitted whenever the
    // upcoming message's layout differs from the last one written.
    let mut current_layout: Option<Vec<u8>> = None;

    for msg_kind in set.write_order() {
        for msg in set.messages_of(msg_kind) {
            let layout = layout_key(msg);
            if current_layout.as_ref() != Some(&layout) {
                write_definition(&mut body, msg);
                current_layout = Some(layout);
            }
            write_data(&mut body, msg);
        }
    }

    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + 2);
    out.push(HEADER_LEN as u8);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&PROFILE_VERSION.to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(FIT_SIGNATURE);
    let header_crc = crc16(&out[..12]);
    out.extend_from_slice(&header_crc.to_le_bytes());

    out.extend_from_slice(&body);

    let file_crc = crc16(&out);
    out.extend_from_slice(&file_crc.to_le_bytes());
    out
}

/// Canonical byte key for a message's wire layout (kind, byte order, field
/// and developer-field triples). Two messages with equal keys can share a
/// definition.
fn layout_key(msg: &FitMessage) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + msg.fields().len() * 3 + msg.dev_fields().len() * 3);
    key.extend_from_slice(&msg.kind.to_le_bytes());
    key.push(msg.big_endian as u8);
    for field in msg.fields() {
        key.push(field.def_num);
        key.push(field.data.len() as u8);
        key.push(field.base_type);
    }
    key.push(0xFF);
    for dev in msg.dev_fields() {
        key.push(dev.field_num);
        key.push(dev.data.len() as u8);
        key.push(dev.dev_data_index);
    }
    key
}

fn write_definition(out: &mut Vec<u8>, msg: &FitMessage) {
    let has_dev = !msg.dev_fields().is_empty();
    let mut header = 0x40u8; // definition, local type 0
    if has_dev {
        header |= 0x20;
    }
    out.push(header);
    out.push(0); // reserved
    out.push(msg.big_endian as u8);
    if msg.big_endian {
        out.extend_from_slice(&msg.kind.to_be_bytes());
    } else {
        out.extend_from_slice(&msg.kind.to_le_bytes());
    }
    out.push(msg.fields().len() as u8);
    for field in msg.fields() {
        out.push(field.def_num);
        out.push(field.data.len() as u8);
        out.push(field.base_type);
    }
    if has_dev {
        out.push(msg.dev_fields().len() as u8);
        for dev in msg.dev_fields() {
            out.push(dev.field_num);
            out.push(dev.data.len() as u8);
            out.push(dev.dev_data_index);
        }
    }
}

fn write_data(out: &mut Vec<u8>, msg: &FitMessage) {
    out.push(0x00); // data, local type 0
    for field in msg.fields() {
        out.extend_from_slice(&field.data);
    }
    for dev in msg.dev_fields() {
        out.extend_from_slice(&dev.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-assemble a minimal FIT stream: 12-byte header, one file_id
    /// definition + data record, trailing CRC.
    fn minimal_fit() -> Vec<u8> {
        let mut body = Vec::new();
        // file_id definition: local 0, little endian, 3 fields
        body.extend_from_slice(&[0x40, 0x00, 0x00, 0x00, 0x00, 0x03]);
        body.extend_from_slice(&[0x00, 0x01, 0x00]); // type: enum, 1 byte
        body.extend_from_slice(&[0x01, 0x02, 0x84]); // manufacturer: u16
        body.extend_from_slice(&[0x04, 0x04, 0x86]); // time_created: u32
        // file_id data: type=4, manufacturer=115, time=0x40000000
        body.extend_from_slice(&[0x00, 0x04, 0x73, 0x00, 0x00, 0x00, 0x00, 0x40]);

        let mut out = Vec::new();
        out.push(12); // legacy header without header CRC
        out.push(0x10); // protocol 1.0 on input
        out.extend_from_slice(&1000u16.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(b".FIT");
        out.extend_from_slice(&body);
        let crc = crc16(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    #[test]
    fn test_decode_minimal_file() {
        let set = decode(&minimal_fit()).unwrap();
        assert_eq!(set.len(), 1);
        let file_id = &set.messages_of(kind::FILE_ID)[0];
        assert_eq!(file_id.field_u8(0), Some(4));
        assert_eq!(file_id.field_u16(1), Some(115));
        assert_eq!(file_id.field_u32(4), Some(0x4000_0000));
    }

    #[test]
    fn test_decode_rejects_missing_signature() {
        let mut bytes = minimal_fit();
        bytes[8] = b'X';
        match decode(&bytes) {
            Err(DecodeError::InvalidFormat(msg)) => assert!(msg.contains("signature")),
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_short_input() {
        assert!(matches!(
            decode(b".FIT"),
            Err(DecodeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_decode_truncated_mid_record() {
        let full = minimal_fit();
        // Chop inside the data record (header claims more data than present)
        let cut = &full[..full.len() - 6];
        assert!(matches!(
            decode(cut),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_file_without_file_id_first() {
        let mut body = Vec::new();
        // record definition instead of file_id
        body.extend_from_slice(&[0x40, 0x00, 0x00, 0x14, 0x00, 0x01]);
        body.extend_from_slice(&[0x03, 0x01, 0x02]); // heart_rate: u8
        body.extend_from_slice(&[0x00, 0x82]); // data: hr=130

        let mut bytes = Vec::new();
        bytes.push(12);
        bytes.push(0x10);
        bytes.extend_from_slice(&1000u16.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b".FIT");
        bytes.extend_from_slice(&body);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        match decode(&bytes) {
            Err(DecodeError::InvalidFormat(msg)) => assert!(msg.contains("file_id")),
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_compressed_timestamp_expansion() {
        // Base 0x...3C (low 5 bits = 0x1C). Offset 0x02 < 0x1C rolls over.
        assert_eq!(expand_timestamp(0x0000_003C, 0x02), 0x0000_0042);
        // Offset equal to current low bits keeps the timestamp.
        assert_eq!(expand_timestamp(0x0000_003C, 0x1C), 0x0000_003C);
        // Offset ahead within the same window.
        assert_eq!(expand_timestamp(0x0000_003C, 0x1E), 0x0000_003E);
    }

    #[test]
    fn test_decode_expands_compressed_records() {
        let mut body = Vec::new();
        // file_id definition + data (local 0)
        body.extend_from_slice(&[0x40, 0x00, 0x00, 0x00, 0x00, 0x01]);
        body.extend_from_slice(&[0x00, 0x01, 0x00]);
        body.extend_from_slice(&[0x00, 0x04]);
        // record definition (local 1): timestamp u32 + power u16
        body.extend_from_slice(&[0x41, 0x00, 0x00, 0x14, 0x00, 0x02]);
        body.extend_from_slice(&[0xFD, 0x04, 0x86]);
        body.extend_from_slice(&[0x07, 0x02, 0x84]);
        // full record: ts=0x1000, power=200
        body.push(0x01);
        body.extend_from_slice(&0x1000u32.to_le_bytes());
        body.extend_from_slice(&200u16.to_le_bytes());
        // record definition (local 1) without timestamp: power only
        body.extend_from_slice(&[0x41, 0x00, 0x00, 0x14, 0x00, 0x01]);
        body.extend_from_slice(&[0x07, 0x02, 0x84]);
        // compressed record: local 1 (bits 5-6 = 01), offset 5
        body.push(0x80 | (1 << 5) | 0x05);
        body.extend_from_slice(&210u16.to_le_bytes());

        let mut bytes = Vec::new();
        bytes.push(12);
        bytes.push(0x10);
        bytes.extend_from_slice(&1000u16.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b".FIT");
        bytes.extend_from_slice(&body);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        let set = decode(&bytes).unwrap();
        let records = set.messages_of(kind::RECORD);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field_u32(TIMESTAMP_FIELD), Some(0x1000));
        // 0x1000 low 5 bits are 0, offset 5 lands in the same window
        assert_eq!(records[1].field_u32(TIMESTAMP_FIELD), Some(0x1005));
        assert_eq!(records[1].field_u16(7), Some(210));
    }

    #[test]
    fn test_encode_emits_protocol_2_header_and_valid_crc() {
        let set = decode(&minimal_fit()).unwrap();
        let out = encode(&set);

        assert_eq!(out[0], 14);
        assert_eq!(out[1], 0x20); // protocol 2.0
        assert_eq!(&out[8..12], b".FIT");
        // Header CRC covers the first 12 bytes
        let header_crc = u16::from_le_bytes([out[12], out[13]]);
        assert_eq!(header_crc, crc16(&out[..12]));
        // File CRC covers everything before the trailer
        let file_crc = u16::from_le_bytes([out[out.len() - 2], out[out.len() - 1]]);
        assert_eq!(file_crc, crc16(&out[..out.len() - 2]));
    }

    #[test]
    fn test_encode_decode_round_trip_preserves_values() {
        let set = decode(&minimal_fit()).unwrap();
        let reencoded = encode(&set);
        let set2 = decode(&reencoded).unwrap();
        assert_eq!(set, set2);
    }

    #[test]
    fn test_big_endian_fields_round_trip() {
        let mut body = Vec::new();
        // file_id definition, big endian architecture
        body.extend_from_slice(&[0x40, 0x00, 0x01]);
        body.extend_from_slice(&0u16.to_be_bytes());
        body.push(0x02);
        body.extend_from_slice(&[0x00, 0x01, 0x00]);
        body.extend_from_slice(&[0x01, 0x02, 0x84]);
        // data: type=4, manufacturer=0x0104 big endian
        body.extend_from_slice(&[0x00, 0x04, 0x01, 0x04]);

        let mut bytes = Vec::new();
        bytes.push(12);
        bytes.push(0x10);
        bytes.extend_from_slice(&1000u16.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b".FIT");
        bytes.extend_from_slice(&body);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        let set = decode(&bytes).unwrap();
        assert_eq!(set.messages_of(kind::FILE_ID)[0].field_u16(1), Some(0x0104));

        let set2 = decode(&encode(&set)).unwrap();
        assert_eq!(set2.messages_of(kind::FILE_ID)[0].field_u16(1), Some(0x0104));
    }
}
