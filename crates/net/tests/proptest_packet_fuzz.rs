//! Fuzz-style property tests for the sync wire format.
//!
//! Decoders must reject arbitrary network input gracefully, and whatever the
//! server encodes must decode to the same message.

use entsync_entity::{EntityKind, SchemaRegistry};
use entsync_metadata::{ChatComponent, MetaValue};
use entsync_net::{decode_message, encode_message, EntityMirror, SyncMessage, SyncPacket};
use proptest::prelude::*;

fn entry() -> impl Strategy<Value = (u8, MetaValue)> {
    (
        0u8..0xFF,
        prop_oneof![
            any::<i8>().prop_map(MetaValue::Byte),
            any::<i32>().prop_map(MetaValue::VarInt),
            any::<bool>().prop_map(MetaValue::Boolean),
            (-1.0e6f32..1.0e6).prop_map(MetaValue::Float),
            prop::option::of("[a-z ]{0,12}")
                .prop_map(|name| MetaValue::OptionalChat(name.map(ChatComponent::text))),
        ],
    )
}

fn packet() -> impl Strategy<Value = SyncPacket> {
    (any::<i32>(), prop::collection::vec(entry(), 0..12)).prop_map(|(entity_id, entries)| {
        SyncPacket { entity_id, entries }
    })
}

proptest! {
    /// Property: arbitrary bytes don't crash the packet decoder.
    #[test]
    fn arbitrary_bytes_dont_crash_packet_decoder(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _ = SyncPacket::decode(&random_bytes);
    }

    /// Property: arbitrary bytes don't crash the frame decoder or the mirror.
    #[test]
    fn arbitrary_bytes_dont_crash_mirror(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _ = decode_message(&random_bytes);
        let mut mirror = EntityMirror::new(SchemaRegistry::build().unwrap());
        let _ = mirror.receive(&random_bytes);
    }

    /// Property: packets roundtrip.
    #[test]
    fn packets_roundtrip(packet in packet()) {
        let decoded = SyncPacket::decode(&packet.encode()).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    /// Property: framed messages roundtrip.
    #[test]
    fn messages_roundtrip(packet in packet(), fingerprint in any::<u64>()) {
        let messages = [
            SyncMessage::Track {
                entity_id: packet.entity_id,
                fingerprint,
                entries: packet.entries.clone(),
            },
            SyncMessage::Untrack(packet.entity_id),
            SyncMessage::Update(packet),
        ];
        for message in messages {
            prop_assert_eq!(decode_message(&encode_message(&message)).unwrap(), message);
        }
    }

    /// Property: a mirror only ever holds values its schema declares.
    #[test]
    fn mirror_respects_local_layout(packet in packet()) {
        let registry = SchemaRegistry::build().unwrap();
        let schema = registry.schema(EntityKind::Zombie).clone();
        let mut mirror = EntityMirror::new(registry);
        mirror.apply(SyncMessage::Track {
            entity_id: packet.entity_id,
            fingerprint: schema.fingerprint(),
            entries: Vec::new(),
        });
        mirror.apply(SyncMessage::Update(packet.clone()));

        let entity = mirror.entity(packet.entity_id).unwrap();
        for (index, value) in entity.values() {
            prop_assert_eq!(schema.kind_of(index), Some(value.kind()));
        }
    }

    /// Property: the end of the stream closes the entry list like a terminator.
    #[test]
    fn unterminated_packets_decode(packet in packet()) {
        let mut bytes = packet.encode();
        bytes.pop();
        prop_assert_eq!(SyncPacket::decode(&bytes).unwrap(), packet);
    }

    /// Property: cutting a packet inside its last entry rejects the whole packet.
    #[test]
    fn packets_cut_mid_entry_fail(packet in packet()) {
        prop_assume!(!packet.entries.is_empty());
        let mut bytes = packet.encode();
        bytes.pop();
        bytes.pop();
        prop_assert!(SyncPacket::decode(&bytes).is_err());
    }
}
