// SPDX-License-Identifier: MIT

//! In-memory model of a decoded FIT file.
//!
//! A [`FitMessageSet`] buckets messages by global message number. Each
//! [`FitMessage`] carries its own field layout and byte order, and every
//! field keeps the raw bytes it was decoded from. Re-encoding writes each
//! value back at exactly the width it was read, which is what keeps
//! power/cadence/heart-rate/GPS samples intact across a round trip.

use std::collections::BTreeMap;

/// Global message numbers for the kinds this crate specifically models.
pub mod kind {
    pub const FILE_ID: u16 = 0;
    pub const SESSION: u16 = 18;
    pub const LAP: u16 = 19;
    pub const RECORD: u16 = 20;
    pub const EVENT: u16 = 21;
    pub const DEVICE_INFO: u16 = 23;
    pub const ACTIVITY: u16 = 34;
    pub const FILE_CREATOR: u16 = 49;
    pub const FIELD_DESCRIPTION: u16 = 206;
    pub const DEVELOPER_DATA_ID: u16 = 207;
}

/// FIT base type numbers used when synthesizing fields.
pub mod base_type {
    pub const ENUM: u8 = 0x00;
    pub const UINT8: u8 = 0x02;
    pub const STRING: u8 = 0x07;
    pub const UINT16: u8 = 0x84;
    pub const UINT32: u8 = 0x86;
}

/// The timestamp field number shared by all message kinds.
pub const TIMESTAMP_FIELD: u8 = 253;

/// Emission order for the write path: file_id first, activity last, and a
/// fixed sequence in between. Kinds not listed here are emitted after `lap`
/// in ascending global-number order, so unknown kinds survive a round trip
/// at a deterministic position.
const WRITE_ORDER_HEAD: &[u16] = &[
    kind::FILE_ID,
    kind::FILE_CREATOR,
    kind::DEVELOPER_DATA_ID,
    kind::FIELD_DESCRIPTION,
    kind::DEVICE_INFO,
    kind::EVENT,
    kind::RECORD,
    kind::LAP,
];
const WRITE_ORDER_TAIL: &[u16] = &[kind::SESSION, kind::ACTIVITY];

/// A single field within a data message: definition number, base type, and
/// the raw value bytes in the message's byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitField {
    pub def_num: u8,
    pub base_type: u8,
    pub data: Vec<u8>,
}

/// A developer-data field, preserved opaquely for round-trip fidelity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitDevField {
    pub field_num: u8,
    pub dev_data_index: u8,
    pub data: Vec<u8>,
}

/// One decoded data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitMessage {
    /// Global message number.
    pub kind: u16,
    /// Architecture of the definition this message was decoded under.
    pub big_endian: bool,
    fields: Vec<FitField>,
    dev_fields: Vec<FitDevField>,
}

impl FitMessage {
    pub fn new(kind: u16) -> Self {
        Self {
            kind,
            big_endian: false,
            fields: Vec::new(),
            dev_fields: Vec::new(),
        }
    }

    pub fn fields(&self) -> &[FitField] {
        &self.fields
    }

    pub fn dev_fields(&self) -> &[FitDevField] {
        &self.dev_fields
    }

    pub fn push_field(&mut self, field: FitField) {
        self.fields.push(field);
    }

    pub fn push_dev_field(&mut self, field: FitDevField) {
        self.dev_fields.push(field);
    }

    pub fn field(&self, def_num: u8) -> Option<&FitField> {
        self.fields.iter().find(|f| f.def_num == def_num)
    }

    fn field_position(&self, def_num: u8) -> Option<usize> {
        self.fields.iter().position(|f| f.def_num == def_num)
    }

    /// Read a field as u8 (single byte).
    pub fn field_u8(&self, def_num: u8) -> Option<u8> {
        let field = self.field(def_num)?;
        (field.data.len() == 1).then(|| field.data[0])
    }

    /// Read a field as u16 in the message's byte order.
    pub fn field_u16(&self, def_num: u8) -> Option<u16> {
        let field = self.field(def_num)?;
        let bytes: [u8; 2] = field.data.as_slice().try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    /// Read a field as u32 in the message's byte order.
    pub fn field_u32(&self, def_num: u8) -> Option<u32> {
        let field = self.field(def_num)?;
        let bytes: [u8; 4] = field.data.as_slice().try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    /// Set a single-byte field, appending it if absent.
    pub fn set_u8(&mut self, def_num: u8, base: u8, value: u8) {
        self.set_raw(def_num, base, vec![value]);
    }

    /// Set a u16 field in the message's byte order, appending it if absent.
    pub fn set_u16(&mut self, def_num: u8, value: u16) {
        let data = if self.big_endian {
            value.to_be_bytes().to_vec()
        } else {
            value.to_le_bytes().to_vec()
        };
        self.set_raw(def_num, base_type::UINT16, data);
    }

    /// Set a u32 field in the message's byte order, appending it if absent.
    pub fn set_u32(&mut self, def_num: u8, value: u32) {
        let data = if self.big_endian {
            value.to_be_bytes().to_vec()
        } else {
            value.to_le_bytes().to_vec()
        };
        self.set_raw(def_num, base_type::UINT32, data);
    }

    fn set_raw(&mut self, def_num: u8, base: u8, data: Vec<u8>) {
        match self.field_position(def_num) {
            Some(pos) => {
                let field = &mut self.fields[pos];
                field.base_type = base;
                field.data = data;
            }
            None => self.push_field(FitField {
                def_num,
                base_type: base,
                data,
            }),
        }
    }

    /// Zero out a string field in place, keeping its declared width so the
    /// message layout is unchanged. No-op if the field is absent.
    pub fn clear_string(&mut self, def_num: u8) {
        if let Some(pos) = self.field_position(def_num) {
            self.fields[pos].data.fill(0);
        }
    }
}

/// Ordered collection of decoded messages, bucketed by global number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FitMessageSet {
    buckets: BTreeMap<u16, Vec<FitMessage>>,
}

impl FitMessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: FitMessage) {
        self.buckets.entry(message.kind).or_default().push(message);
    }

    /// All messages of a given kind, in decode order. Empty if none.
    pub fn messages_of(&self, kind: u16) -> &[FitMessage] {
        self.buckets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mutable bucket for a kind, created on demand.
    pub fn messages_of_mut(&mut self, kind: u16) -> &mut Vec<FitMessage> {
        self.buckets.entry(kind).or_default()
    }

    /// Total number of data messages.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kinds present, in the pinned emission order.
    pub fn write_order(&self) -> Vec<u16> {
        let mut order: Vec<u16> = WRITE_ORDER_HEAD
            .iter()
            .copied()
            .filter(|k| self.buckets.contains_key(k))
            .collect();
        order.extend(self.buckets.keys().copied().filter(|k| {
            !WRITE_ORDER_HEAD.contains(k) && !WRITE_ORDER_TAIL.contains(k)
        }));
        order.extend(
            WRITE_ORDER_TAIL
                .iter()
                .copied()
                .filter(|k| self.buckets.contains_key(k)),
        );
        order
    }
}
