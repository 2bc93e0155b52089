#![warn(missing_docs)]
//! Wire format for attribute synchronization: update packets, framed
//! messages, observer visibility and the observer-side mirror.

mod message;
mod mirror;
mod packet;
mod tracker;

pub use message::{decode_message, encode_message, SyncMessage};
pub use mirror::{EntityMirror, MirroredEntity};
pub use packet::{
    read_entries, write_entries, CheckedPacket, PacketError, SkippedEntry, SyncPacket,
};
pub use tracker::{chunk_distance, ChunkPos, ObserverTracker, VisibilityChange};
