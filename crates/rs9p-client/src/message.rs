//! A single framed 9P PDU.
//!
//! A [`Message`] starts out as a builder which only accepts appended fields.
//! [`Message::build`] patches the total size into the frame and turns it into a
//! decoder, which only hands fields back out in order. Frames read off the wire
//! are decoders from the start.

use {
    crate::{
        error::{Error, errno::*},
        fcall::*,
        io_err, res,
        serialize::{self, Decodable, Encodable},
        utils::Result,
    },
    bytes::Bytes,
    num_traits::FromPrimitive,
    std::io::Cursor,
};

/// size[4] placeholder, patched by `build`
const SIZE_PLACEHOLDER: u32 = 0;

/// A 9P message, either being written or being read.
#[derive(Debug)]
pub enum Message {
    /// Append-only frame under construction.
    Builder {
        msg_type: MsgType,
        tag: u16,
        buf: Vec<u8>,
    },
    /// Complete frame, consumed field by field.
    Decoder {
        msg_type: MsgType,
        tag: u16,
        cursor: Cursor<Bytes>,
    },
}

impl Message {
    /// Start a message of `msg_type` whose tag is chosen later by the session.
    pub fn new(msg_type: MsgType) -> Message {
        Message::with_tag(msg_type, NOTAG)
    }

    /// Start a message with an explicit tag.
    pub fn with_tag(msg_type: MsgType, tag: u16) -> Message {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&SIZE_PLACEHOLDER.to_le_bytes());
        buf.push(msg_type as u8);
        buf.extend_from_slice(&tag.to_le_bytes());
        Message::Builder { msg_type, tag, buf }
    }

    /// Encode a typed message as spoken in `dialect`.
    pub fn from_fcall(fcall: &FCall, dialect: Dialect) -> Result<Message> {
        let mut msg = Message::new(MsgType::from(fcall));
        if let Message::Builder { ref mut buf, .. } = msg {
            serialize::encode_body(buf, fcall, dialect)?;
        }
        Ok(msg)
    }

    /// Wrap a frame received from the stream.
    ///
    /// The frame must include its own size field and the size must match.
    pub fn received(frame: Bytes) -> Result<Message> {
        if frame.len() < HEADER_SIZE {
            return res!(io_err!(
                UnexpectedEof,
                format!("Frame of {} bytes is shorter than a header", frame.len())
            ));
        }

        let mut cursor = Cursor::new(frame);
        let size: u32 = Decodable::decode(&mut cursor)?;
        let typ: u8 = Decodable::decode(&mut cursor)?;
        let tag: u16 = Decodable::decode(&mut cursor)?;

        if size as usize != cursor.get_ref().len() {
            return res!(io_err!(
                InvalidData,
                format!(
                    "Frame size field {} does not match {} received bytes",
                    size,
                    cursor.get_ref().len()
                )
            ));
        }

        let msg_type = MsgType::from_u8(typ)
            .ok_or_else(|| io_err!(InvalidData, format!("Invalid message type {}", typ)))?;

        Ok(Message::Decoder {
            msg_type,
            tag,
            cursor,
        })
    }

    pub fn msg_type(&self) -> MsgType {
        match *self {
            Message::Builder { msg_type, .. } | Message::Decoder { msg_type, .. } => msg_type,
        }
    }

    pub fn tag(&self) -> u16 {
        match *self {
            Message::Builder { tag, .. } | Message::Decoder { tag, .. } => tag,
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self, Message::Decoder { .. })
    }

    /// Total frame length in bytes, including the size field.
    pub fn len(&self) -> usize {
        match *self {
            Message::Builder { ref buf, .. } => buf.len(),
            Message::Decoder { ref cursor, .. } => cursor.get_ref().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the tag of a message still under construction.
    pub fn set_tag(&mut self, new_tag: u16) -> Result<()> {
        match *self {
            Message::Builder {
                ref mut tag,
                ref mut buf,
                ..
            } => {
                *tag = new_tag;
                buf[5..HEADER_SIZE].copy_from_slice(&new_tag.to_le_bytes());
                Ok(())
            }
            Message::Decoder { .. } => Err(Error::No(EINVAL)),
        }
    }

    /// Append a field.
    pub fn push<T: Encodable>(&mut self, value: &T) -> Result<&mut Self> {
        match *self {
            Message::Builder { ref mut buf, .. } => {
                value.encode(buf)?;
            }
            Message::Decoder { .. } => return Err(Error::No(EINVAL)),
        }
        Ok(self)
    }

    /// Patch in the final size and switch to decoding.
    ///
    /// The returned message reads from just past the header.
    pub fn build(self) -> Result<Message> {
        match self {
            Message::Builder {
                msg_type,
                tag,
                mut buf,
            } => {
                let size = u32::try_from(buf.len()).map_err(|_| Error::No(EMSGSIZE))?;
                buf[..4].copy_from_slice(&size.to_le_bytes());
                let mut cursor = Cursor::new(Bytes::from(buf));
                cursor.set_position(HEADER_SIZE as u64);
                Ok(Message::Decoder {
                    msg_type,
                    tag,
                    cursor,
                })
            }
            Message::Decoder { .. } => Err(Error::No(EINVAL)),
        }
    }

    /// The complete frame of a built message.
    pub fn bytes(&self) -> Option<&Bytes> {
        match *self {
            Message::Builder { .. } => None,
            Message::Decoder { ref cursor, .. } => Some(cursor.get_ref()),
        }
    }

    /// Bytes left to decode.
    pub fn remaining(&self) -> usize {
        match *self {
            Message::Builder { .. } => 0,
            Message::Decoder { ref cursor, .. } => {
                cursor.get_ref().len().saturating_sub(cursor.position() as usize)
            }
        }
    }

    /// Consume the next field.
    pub fn read<T: Decodable>(&mut self) -> Result<T> {
        match *self {
            Message::Builder { .. } => Err(Error::No(EINVAL)),
            Message::Decoder { ref mut cursor, .. } => Ok(Decodable::decode(cursor)?),
        }
    }

    /// Decode the remaining body as a typed message spoken in `dialect`.
    pub fn into_fcall(self, dialect: Dialect) -> Result<FCall> {
        match self {
            Message::Builder { .. } => Err(Error::No(EINVAL)),
            Message::Decoder {
                msg_type,
                mut cursor,
                ..
            } => Ok(serialize::decode_body(&mut cursor, msg_type, dialect)?),
        }
    }
}
