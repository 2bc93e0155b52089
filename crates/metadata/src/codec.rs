//! Byte-level encoding of attribute values and entries.
//!
//! Entry format: `[index: u8][kind tag: varint][value]`, with `0xFF` in the
//! index position terminating an entry list. Every value encoding is either
//! fixed-width or length-prefixed, so a reader can step over any entry once it
//! knows the kind tag.

use crate::value::{
    BlockStateId, ChatComponent, Compound, ItemStack, MetaValue, Particle, Pose, ValueKind,
    VillagerData,
};
use entsync_core::{BlockPos, Direction, Rotation};
use thiserror::Error;
use tracing::trace;

/// Index byte that terminates an entry list.
pub const TERMINATOR: u8 = 0xFF;

/// Largest index that may carry a value.
pub const MAX_INDEX: u8 = 0xFE;

/// Maximum UTF-8 length of a plain string value (bytes).
pub const MAX_STRING_LEN: usize = 32_767 * 4;

/// Maximum length of a JSON-bearing or opaque byte payload.
pub const MAX_PAYLOAD_LEN: usize = 2 * 1024 * 1024;

const VARINT_MAX_BYTES: usize = 5;

/// Malformed attribute data encountered while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    /// The kind tag is not one this build understands.
    #[error("unknown value kind tag {0}")]
    UnknownKind(i32),
    /// Input ended in the middle of a value.
    #[error("truncated attribute data: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the decoder tried to read.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },
    /// A varint ran past five bytes.
    #[error("varint exceeds 5 bytes")]
    VarIntTooLong,
    /// A length prefix was negative.
    #[error("negative length prefix {0}")]
    NegativeLength(i32),
    /// A length prefix exceeded the allowed maximum.
    #[error("length {len} exceeds maximum {max}")]
    LengthTooLarge {
        /// Declared length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// String bytes were not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// A JSON payload failed to parse.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),
    /// Boolean byte other than 0 or 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
    /// Enumerated value outside its range.
    #[error("invalid {kind} discriminant {raw}")]
    InvalidEnum {
        /// Kind being decoded.
        kind: ValueKind,
        /// Raw discriminant read.
        raw: i64,
    },
}

/// Append `value` as a protocol varint (two's complement, 7 bits per byte).
pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut remaining = value as u32;
    loop {
        if remaining & !0x7F == 0 {
            buf.push(remaining as u8);
            return;
        }
        buf.push((remaining as u8 & 0x7F) | 0x80);
        remaining >>= 7;
    }
}

/// Encoded length of `value` as a varint.
pub fn varint_len(value: i32) -> usize {
    let bits = 32 - (value as u32).leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Cursor over an input buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the input is exhausted.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Consume `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], MetaError> {
        if self.remaining() < len {
            return Err(MetaError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], MetaError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Consume one byte.
    pub fn read_u8(&mut self) -> Result<u8, MetaError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Consume a varint.
    pub fn read_varint(&mut self) -> Result<i32, MetaError> {
        let mut result: u32 = 0;
        for i in 0..VARINT_MAX_BYTES {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result as i32);
            }
        }
        Err(MetaError::VarIntTooLong)
    }

    fn read_len(&mut self, max: usize) -> Result<usize, MetaError> {
        let raw = self.read_varint()?;
        let len = usize::try_from(raw).map_err(|_| MetaError::NegativeLength(raw))?;
        if len > max {
            return Err(MetaError::LengthTooLarge { len, max });
        }
        Ok(len)
    }

    fn read_bool(&mut self) -> Result<bool, MetaError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MetaError::InvalidBool(other)),
        }
    }

    fn read_f32(&mut self) -> Result<f32, MetaError> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> Result<i64, MetaError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    fn read_string(&mut self, max: usize) -> Result<String, MetaError> {
        let len = self.read_len(max)?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| MetaError::InvalidUtf8)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, MetaError> {
        let text = self.read_string(MAX_PAYLOAD_LEN)?;
        serde_json::from_str(&text).map_err(|err| MetaError::InvalidJson(err.to_string()))
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

/// Length of the JSON text `value` travels as.
pub(crate) fn json_len<T: serde::Serialize>(value: &T) -> usize {
    serde_json::to_vec(value).map_or(usize::MAX, |text| text.len())
}

fn write_json<T: serde::Serialize>(buf: &mut Vec<u8>, value: &T) {
    // Maps keyed by strings always serialize.
    let text = serde_json::to_string(value).unwrap_or_default();
    write_string(buf, &text);
}

fn write_bool(buf: &mut Vec<u8>, value: bool) {
    buf.push(value as u8);
}

fn write_compound(buf: &mut Vec<u8>, compound: &Compound) {
    write_json(buf, &compound.0);
}

fn read_compound(reader: &mut Reader<'_>) -> Result<Compound, MetaError> {
    reader.read_json().map(Compound)
}

/// Append the encoding of `value` (without its kind tag).
pub fn encode_value(value: &MetaValue, buf: &mut Vec<u8>) {
    match value {
        MetaValue::Byte(v) => buf.push(*v as u8),
        MetaValue::VarInt(v) => write_varint(buf, *v),
        MetaValue::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
        MetaValue::String(v) => write_string(buf, v),
        MetaValue::Chat(chat) => write_json(buf, &chat.0),
        MetaValue::OptionalChat(chat) => {
            write_bool(buf, chat.is_some());
            if let Some(chat) = chat {
                write_json(buf, &chat.0);
            }
        }
        MetaValue::ItemStack(stack) => {
            write_bool(buf, stack.is_some());
            if let Some(stack) = stack {
                write_varint(buf, stack.item_id);
                buf.push(stack.count as u8);
                write_bool(buf, stack.tag.is_some());
                if let Some(tag) = &stack.tag {
                    write_compound(buf, tag);
                }
            }
        }
        MetaValue::Boolean(v) => write_bool(buf, *v),
        MetaValue::Rotation(rot) => {
            for axis in [rot.x, rot.y, rot.z] {
                buf.extend_from_slice(&axis.to_be_bytes());
            }
        }
        MetaValue::BlockPosition(pos) => buf.extend_from_slice(&pos.pack().to_be_bytes()),
        MetaValue::OptionalBlockPosition(pos) => {
            write_bool(buf, pos.is_some());
            if let Some(pos) = pos {
                buf.extend_from_slice(&pos.pack().to_be_bytes());
            }
        }
        MetaValue::Direction(dir) => write_varint(buf, dir.as_u8() as i32),
        MetaValue::OptionalUuid(uuid) => {
            write_bool(buf, uuid.is_some());
            if let Some(uuid) = uuid {
                buf.extend_from_slice(&uuid.to_be_bytes());
            }
        }
        MetaValue::BlockState(state) => write_varint(buf, state.0),
        MetaValue::Compound(compound) => write_compound(buf, compound),
        MetaValue::Particle(particle) => {
            write_varint(buf, particle.id);
            write_varint(buf, particle.data.len() as i32);
            buf.extend_from_slice(&particle.data);
        }
        MetaValue::VillagerData(data) => {
            write_varint(buf, data.villager_type);
            write_varint(buf, data.profession);
            write_varint(buf, data.level);
        }
        // 0 means absent; present values are shifted up by one.
        MetaValue::OptionalVarInt(v) => match v {
            Some(v) => write_varint(buf, (*v as u32).wrapping_add(1) as i32),
            None => write_varint(buf, 0),
        },
        MetaValue::Pose(pose) => write_varint(buf, pose.as_i32()),
    }
}

/// Decode one value of `kind` from `reader`.
pub fn decode_value(kind: ValueKind, reader: &mut Reader<'_>) -> Result<MetaValue, MetaError> {
    let value = match kind {
        ValueKind::Byte => MetaValue::Byte(reader.read_u8()? as i8),
        ValueKind::VarInt => MetaValue::VarInt(reader.read_varint()?),
        ValueKind::Float => MetaValue::Float(reader.read_f32()?),
        ValueKind::String => MetaValue::String(reader.read_string(MAX_STRING_LEN)?),
        ValueKind::Chat => MetaValue::Chat(ChatComponent(reader.read_json()?)),
        ValueKind::OptionalChat => MetaValue::OptionalChat(if reader.read_bool()? {
            Some(ChatComponent(reader.read_json()?))
        } else {
            None
        }),
        ValueKind::ItemStack => MetaValue::ItemStack(if reader.read_bool()? {
            let item_id = reader.read_varint()?;
            let count = reader.read_u8()? as i8;
            let tag = if reader.read_bool()? {
                Some(read_compound(reader)?)
            } else {
                None
            };
            Some(ItemStack {
                item_id,
                count,
                tag,
            })
        } else {
            None
        }),
        ValueKind::Boolean => MetaValue::Boolean(reader.read_bool()?),
        ValueKind::Rotation => MetaValue::Rotation(Rotation::new(
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        )),
        ValueKind::BlockPosition => MetaValue::BlockPosition(BlockPos::unpack(reader.read_i64()?)),
        ValueKind::OptionalBlockPosition => {
            MetaValue::OptionalBlockPosition(if reader.read_bool()? {
                Some(BlockPos::unpack(reader.read_i64()?))
            } else {
                None
            })
        }
        ValueKind::Direction => {
            let raw = reader.read_varint()?;
            let dir = u8::try_from(raw)
                .ok()
                .and_then(Direction::from_u8)
                .ok_or(MetaError::InvalidEnum {
                    kind,
                    raw: raw as i64,
                })?;
            MetaValue::Direction(dir)
        }
        ValueKind::OptionalUuid => MetaValue::OptionalUuid(if reader.read_bool()? {
            Some(u128::from_be_bytes(reader.read_array()?))
        } else {
            None
        }),
        ValueKind::BlockState => MetaValue::BlockState(BlockStateId(reader.read_varint()?)),
        ValueKind::Compound => MetaValue::Compound(read_compound(reader)?),
        ValueKind::Particle => {
            let id = reader.read_varint()?;
            let len = reader.read_len(MAX_PAYLOAD_LEN)?;
            let data = reader.read_bytes(len)?.to_vec();
            MetaValue::Particle(Particle { id, data })
        }
        ValueKind::VillagerData => MetaValue::VillagerData(VillagerData {
            villager_type: reader.read_varint()?,
            profession: reader.read_varint()?,
            level: reader.read_varint()?,
        }),
        ValueKind::OptionalVarInt => {
            let raw = reader.read_varint()? as u32;
            MetaValue::OptionalVarInt(match raw {
                0 => None,
                shifted => Some(i32::try_from(shifted - 1).map_err(|_| {
                    MetaError::InvalidEnum {
                        kind,
                        raw: shifted as i64,
                    }
                })?),
            })
        }
        ValueKind::Pose => {
            let raw = reader.read_varint()?;
            MetaValue::Pose(Pose::from_i32(raw).ok_or(MetaError::InvalidEnum {
                kind,
                raw: raw as i64,
            })?)
        }
    };
    Ok(value)
}

/// Encode a single value into a fresh buffer.
pub fn encode(value: &MetaValue) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(value, &mut buf);
    buf
}

/// Decode a single value of `kind`, returning it with the bytes consumed.
pub fn decode(kind: ValueKind, bytes: &[u8]) -> Result<(MetaValue, usize), MetaError> {
    let mut reader = Reader::new(bytes);
    let value = decode_value(kind, &mut reader)?;
    Ok((value, reader.position()))
}

/// Append one `[index][kind][value]` entry.
pub fn write_entry(buf: &mut Vec<u8>, index: u8, value: &MetaValue) {
    debug_assert!(index <= MAX_INDEX, "index {index} collides with the terminator");
    let kind = value.kind();
    trace!(index, kind = kind.as_str(), "encoding attribute entry");
    buf.push(index);
    write_varint(buf, kind.tag());
    encode_value(value, buf);
}

/// Read the next entry, or `None` at the terminator or end of input.
///
/// A terminator byte is consumed.
pub fn read_entry(reader: &mut Reader<'_>) -> Result<Option<(u8, MetaValue)>, MetaError> {
    let index = match reader.peek_u8() {
        None => return Ok(None),
        Some(TERMINATOR) => {
            reader.read_u8()?;
            return Ok(None);
        }
        Some(_) => reader.read_u8()?,
    };
    let tag = reader.read_varint()?;
    let kind = ValueKind::from_tag(tag).ok_or(MetaError::UnknownKind(tag))?;
    let value = decode_value(kind, reader)?;
    Ok(Some((index, value)))
}
