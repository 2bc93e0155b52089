//! Framed messages from the server to one observer.
//!
//! Frame format: `[length: u32 LE][tag: u8][payload]`, where `length` counts
//! the tag and payload.

use crate::packet::{expect_end, read_entries, write_entries, PacketError, SyncPacket};
use entsync_core::EntityId;
use entsync_metadata::{write_varint, MetaValue, Reader};

const TAG_TRACK: u8 = 0;
const TAG_UPDATE: u8 = 1;
const TAG_UNTRACK: u8 = 2;

const HEADER_LEN: usize = 4;

/// Server-to-observer message.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// The entity became visible: full snapshot of every written attribute.
    Track {
        /// Entity id.
        entity_id: EntityId,
        /// Layout fingerprint of the entity's schema.
        fingerprint: u64,
        /// Every explicitly written attribute, ascending.
        entries: Vec<(u8, MetaValue)>,
    },
    /// Attributes changed since the last flush.
    Update(SyncPacket),
    /// The entity is no longer visible.
    Untrack(EntityId),
}

impl SyncMessage {
    /// Entity the message concerns.
    pub fn entity_id(&self) -> EntityId {
        match self {
            SyncMessage::Track { entity_id, .. } => *entity_id,
            SyncMessage::Update(packet) => packet.entity_id,
            SyncMessage::Untrack(entity_id) => *entity_id,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            SyncMessage::Track { .. } => TAG_TRACK,
            SyncMessage::Update(_) => TAG_UPDATE,
            SyncMessage::Untrack(_) => TAG_UNTRACK,
        }
    }
}

/// Encode `message` as one frame.
pub fn encode_message(message: &SyncMessage) -> Vec<u8> {
    let mut frame = vec![0; HEADER_LEN];
    frame.push(message.tag());
    match message {
        SyncMessage::Track {
            entity_id,
            fingerprint,
            entries,
        } => {
            write_varint(&mut frame, *entity_id);
            frame.extend_from_slice(&fingerprint.to_le_bytes());
            write_entries(&mut frame, entries);
        }
        SyncMessage::Update(packet) => packet.encode_into(&mut frame),
        SyncMessage::Untrack(entity_id) => write_varint(&mut frame, *entity_id),
    }
    let length = (frame.len() - HEADER_LEN) as u32;
    frame[..HEADER_LEN].copy_from_slice(&length.to_le_bytes());
    frame
}

/// Decode exactly one frame.
pub fn decode_message(data: &[u8]) -> Result<SyncMessage, PacketError> {
    let mut reader = Reader::new(data);
    let header = reader.read_bytes(HEADER_LEN)?;
    let declared = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if declared == 0 || declared != reader.remaining() {
        return Err(PacketError::BadFrameLength {
            declared,
            available: reader.remaining(),
        });
    }

    let message = match reader.read_u8()? {
        TAG_TRACK => {
            let entity_id = reader.read_varint()?;
            let raw = reader.read_bytes(8)?;
            let mut fingerprint = [0u8; 8];
            fingerprint.copy_from_slice(raw);
            SyncMessage::Track {
                entity_id,
                fingerprint: u64::from_le_bytes(fingerprint),
                entries: read_entries(&mut reader)?,
            }
        }
        TAG_UPDATE => SyncMessage::Update(SyncPacket::read(&mut reader)?),
        TAG_UNTRACK => SyncMessage::Untrack(reader.read_varint()?),
        other => return Err(PacketError::UnknownMessage(other)),
    };
    expect_end(&reader)?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_round_trips() {
        let message = SyncMessage::Track {
            entity_id: 42,
            fingerprint: 0x0123_4567_89AB_CDEF,
            entries: vec![(16, MetaValue::Boolean(true))],
        };
        let frame = encode_message(&message);
        assert_eq!(&frame[..4], &((frame.len() - 4) as u32).to_le_bytes());
        assert_eq!(decode_message(&frame).unwrap(), message);
    }

    #[test]
    fn untrack_frame_layout() {
        assert_eq!(
            encode_message(&SyncMessage::Untrack(3)),
            vec![2, 0, 0, 0, TAG_UNTRACK, 3]
        );
    }

    #[test]
    fn update_wraps_packet_body() {
        let packet = SyncPacket {
            entity_id: 7,
            entries: vec![(0, MetaValue::Byte(1))],
        };
        let frame = encode_message(&SyncMessage::Update(packet.clone()));
        assert_eq!(&frame[5..], packet.encode().as_slice());
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut frame = encode_message(&SyncMessage::Untrack(3));
        frame.push(0);
        assert_eq!(
            decode_message(&frame),
            Err(PacketError::BadFrameLength {
                declared: 2,
                available: 3,
            })
        );
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(
            decode_message(&[2, 0, 0, 0, 9, 0]),
            Err(PacketError::UnknownMessage(9))
        );
    }
}
