//! Attribute update packets.
//!
//! Body layout: `entity_id: varint`, then entries of
//! `[index: u8][kind tag: varint][value]`, closed by a single `0xFF` or by the
//! end of the input.

use entsync_core::EntityId;
use entsync_metadata::{
    read_entry, write_entry, write_varint, EntitySchema, MetaError, MetaValue, Reader, ValueKind,
    TERMINATOR,
};
use thiserror::Error;

/// A malformed message. The whole message is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// An entry or header failed to decode.
    #[error("malformed entry: {0}")]
    Meta(#[from] MetaError),
    /// Bytes remain after the message body.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    /// Frame header is inconsistent with the data.
    #[error("frame declares {declared} bytes but {available} are available")]
    BadFrameLength {
        /// Length from the header.
        declared: usize,
        /// Bytes actually present.
        available: usize,
    },
    /// Unknown message tag.
    #[error("unknown message tag {0}")]
    UnknownMessage(u8),
}

/// Changed attributes of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPacket {
    /// Entity the entries belong to.
    pub entity_id: EntityId,
    /// `(index, value)` pairs in ascending index order.
    pub entries: Vec<(u8, MetaValue)>,
}

/// An entry the receiver's schema could not place.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    /// Index from the wire.
    pub index: u8,
    /// Kind from the wire.
    pub kind: ValueKind,
    /// Kind the receiver declares at that index, `None` if undeclared.
    pub expected: Option<ValueKind>,
}

/// A packet decoded against a receiver schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedPacket {
    /// Entries the receiver can apply.
    pub packet: SyncPacket,
    /// Entries dropped because the receiver's layout disagrees.
    pub skipped: Vec<SkippedEntry>,
}

impl SyncPacket {
    /// Packet with no entries.
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            entries: Vec::new(),
        }
    }

    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the body to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.entity_id);
        write_entries(buf, &self.entries);
    }

    /// Encode the body.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Decode a complete body, keeping every well-formed entry.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let mut reader = Reader::new(bytes);
        let packet = Self::read(&mut reader)?;
        expect_end(&reader)?;
        Ok(packet)
    }

    /// Decode a complete body, dropping entries `schema` cannot place.
    pub fn decode_checked(bytes: &[u8], schema: &EntitySchema) -> Result<CheckedPacket, PacketError> {
        let mut reader = Reader::new(bytes);
        let packet = Self::read(&mut reader)?;
        expect_end(&reader)?;
        Ok(packet.check(schema))
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        let entity_id = reader.read_varint()?;
        let entries = read_entries(reader)?;
        Ok(Self { entity_id, entries })
    }

    /// Split entries into those `schema` accepts and those it does not.
    pub fn check(self, schema: &EntitySchema) -> CheckedPacket {
        let mut skipped = Vec::new();
        let entries = self
            .entries
            .into_iter()
            .filter(|(index, value)| {
                let expected = schema.kind_of(*index);
                if expected == Some(value.kind()) {
                    return true;
                }
                skipped.push(SkippedEntry {
                    index: *index,
                    kind: value.kind(),
                    expected,
                });
                false
            })
            .collect();
        CheckedPacket {
            packet: SyncPacket {
                entity_id: self.entity_id,
                entries,
            },
            skipped,
        }
    }
}

/// Append `entries` and the terminator to `buf`.
pub fn write_entries(buf: &mut Vec<u8>, entries: &[(u8, MetaValue)]) {
    for (index, value) in entries {
        write_entry(buf, *index, value);
    }
    buf.push(TERMINATOR);
}

/// Read entries up to and including the terminator, or to the end of input.
pub fn read_entries(reader: &mut Reader<'_>) -> Result<Vec<(u8, MetaValue)>, PacketError> {
    let mut entries = Vec::new();
    while let Some(entry) = read_entry(reader)? {
        entries.push(entry);
    }
    Ok(entries)
}

pub(crate) fn expect_end(reader: &Reader<'_>) -> Result<(), PacketError> {
    match reader.remaining() {
        0 => Ok(()),
        extra => Err(PacketError::TrailingBytes(extra)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entsync_metadata::{FieldDef, LayerDef};

    fn no() -> MetaValue {
        MetaValue::Boolean(false)
    }

    fn zero() -> MetaValue {
        MetaValue::VarInt(0)
    }

    static BASE: LayerDef = LayerDef {
        name: "base",
        count: 2,
        pinned_base: None,
        fields: &[
            FieldDef::new("flag", 0, ValueKind::Boolean, no),
            FieldDef::new("count", 1, ValueKind::VarInt, zero),
        ],
    };

    fn schema() -> EntitySchema {
        EntitySchema::builder("test").layer(&BASE).build().unwrap()
    }

    #[test]
    fn encodes_known_layout() {
        let packet = SyncPacket {
            entity_id: 5,
            entries: vec![(0, MetaValue::Boolean(true)), (1, MetaValue::VarInt(300))],
        };
        assert_eq!(
            packet.encode(),
            vec![0x05, 0x00, 0x07, 0x01, 0x01, 0x01, 0xAC, 0x02, 0xFF]
        );
    }

    #[test]
    fn empty_packet_is_just_id_and_terminator() {
        assert_eq!(SyncPacket::new(300).encode(), vec![0xAC, 0x02, 0xFF]);
        assert_eq!(
            SyncPacket::decode(&[0xAC, 0x02, 0xFF]).unwrap(),
            SyncPacket::new(300)
        );
    }

    #[test]
    fn decode_round_trips() {
        let packet = SyncPacket {
            entity_id: -1,
            entries: vec![
                (0, MetaValue::Byte(0x21)),
                (9, MetaValue::Float(20.0)),
                (16, MetaValue::Boolean(true)),
            ],
        };
        assert_eq!(SyncPacket::decode(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn unknown_index_is_skipped_not_fatal() {
        let packet = SyncPacket {
            entity_id: 1,
            entries: vec![(0, MetaValue::Boolean(true)), (7, MetaValue::VarInt(3))],
        };
        let checked = SyncPacket::decode_checked(&packet.encode(), &schema()).unwrap();
        assert_eq!(checked.packet.entries, vec![(0, MetaValue::Boolean(true))]);
        assert_eq!(
            checked.skipped,
            vec![SkippedEntry {
                index: 7,
                kind: ValueKind::VarInt,
                expected: None,
            }]
        );
    }

    #[test]
    fn kind_mismatch_is_skipped() {
        let packet = SyncPacket {
            entity_id: 1,
            entries: vec![(0, MetaValue::VarInt(1)), (1, MetaValue::VarInt(2))],
        };
        let checked = packet.check(&schema());
        assert_eq!(checked.packet.entries, vec![(1, MetaValue::VarInt(2))]);
        assert_eq!(checked.skipped[0].expected, Some(ValueKind::Boolean));
    }

    #[test]
    fn unknown_kind_tag_rejects_message() {
        let bytes = [0x01, 0x00, 0x63, 0x00, 0xFF];
        assert_eq!(
            SyncPacket::decode(&bytes),
            Err(PacketError::Meta(MetaError::UnknownKind(0x63)))
        );
    }

    #[test]
    fn stream_end_closes_entry_list() {
        let bytes = [0x01, 0x00, 0x07, 0x01];
        assert_eq!(
            SyncPacket::decode(&bytes).unwrap().entries,
            vec![(0, MetaValue::Boolean(true))]
        );
    }

    #[test]
    fn truncated_entry_rejects_message() {
        let bytes = [0x01, 0x00, 0x07];
        assert!(matches!(
            SyncPacket::decode(&bytes),
            Err(PacketError::Meta(MetaError::Truncated { .. }))
        ));
    }

    #[test]
    fn trailing_bytes_reject_message() {
        assert_eq!(
            SyncPacket::decode(&[0x01, 0xFF, 0x00]),
            Err(PacketError::TrailingBytes(1))
        );
    }
}
