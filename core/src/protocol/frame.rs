use crate::ack::AckRange;
use crate::{BusError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Epoch, SeqId, TopicId};

/// Fixed header length in bytes: kind (1) + topic id (2) + seq id (4) + epoch (2).
pub const HEADER_LEN: usize = 9;

/// Frame terminator. Chosen so that ordinary text payloads never contain it;
/// header bytes may, which is why decoders skip the header before scanning.
pub const DELIMITER: [u8; 4] = *b"<\r\n>";

/// Upper bound on a single frame, matching the codec guard the broker applies
/// before buffering an unterminated frame indefinitely.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Frame kinds carried in header byte 0.
///
/// Encoded as ASCII digits so captures stay greppable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Heartbeat = b'0',
    Data = b'1',
    Subscribe = b'2',
    Ack = b'3',
    Connect = b'4',
}

impl FrameKind {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'0' => Ok(FrameKind::Heartbeat),
            b'1' => Ok(FrameKind::Data),
            b'2' => Ok(FrameKind::Subscribe),
            b'3' => Ok(FrameKind::Ack),
            b'4' => Ok(FrameKind::Connect),
            other => Err(BusError::MalformedFrame(format!(
                "unknown frame kind byte 0x{:02x}",
                other
            ))),
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub topic: TopicId,
    pub seq: SeqId,
    pub epoch: Epoch,
    pub body: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, topic: TopicId, seq: SeqId, epoch: Epoch, body: Bytes) -> Self {
        Self {
            kind,
            topic,
            seq,
            epoch,
            body,
        }
    }

    /// Heartbeat frames carry no addressing information.
    pub fn heartbeat() -> Self {
        Self::new(FrameKind::Heartbeat, 0, 0, 0, Bytes::new())
    }

    /// Ack frame with the range rendered as ASCII `"first-last"` body text.
    pub fn ack(topic: TopicId, range: AckRange, epoch: Epoch) -> Self {
        Self::new(
            FrameKind::Ack,
            topic,
            0,
            epoch,
            Bytes::from(format_ack_range(range)),
        )
    }

    /// Total encoded length including header and delimiter.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body.len() + DELIMITER.len()
    }
}

/// Parse the ASCII `"<first>-<last>"` half-open range carried in ack bodies.
pub fn parse_ack_range(body: &[u8]) -> Result<AckRange> {
    let text = std::str::from_utf8(body)
        .map_err(|_| BusError::MalformedFrame("ack body is not UTF-8".into()))?;

    let (first, last) = text
        .split_once('-')
        .ok_or_else(|| BusError::MalformedFrame(format!("ack body {:?} has no separator", text)))?;

    let first: SeqId = first
        .parse()
        .map_err(|_| BusError::MalformedFrame(format!("bad ack range start {:?}", first)))?;
    let last: SeqId = last
        .parse()
        .map_err(|_| BusError::MalformedFrame(format!("bad ack range end {:?}", last)))?;

    if first >= last {
        return Err(BusError::MalformedFrame(format!(
            "empty ack range {}-{}",
            first, last
        )));
    }

    Ok(AckRange::new(first, last))
}

/// Inverse of [`parse_ack_range`].
pub fn format_ack_range(range: AckRange) -> String {
    format!("{}-{}", range.first, range.last)
}

/// Delimiter-terminated frame codec with a fixed binary header.
///
/// The decoder buffers until it sees the full header plus a delimiter, then
/// yields one [`Frame`] per delimiter. The delimiter scan starts *after* the
/// header because header bytes are free-form binary and may contain the
/// delimiter sequence.
pub struct BusFrameCodec;

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

impl Decoder for BusFrameCodec {
    type Item = Frame;
    type Error = BusError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_LEN + DELIMITER.len() {
            return Ok(None);
        }

        let body_end = match find_delimiter(&src[HEADER_LEN..]) {
            Some(offset) => HEADER_LEN + offset,
            None => {
                if src.len() > MAX_FRAME_LEN {
                    return Err(BusError::MalformedFrame(format!(
                        "no delimiter within {} bytes",
                        MAX_FRAME_LEN
                    )));
                }
                return Ok(None);
            }
        };

        let mut frame = src.split_to(body_end);
        src.advance(DELIMITER.len());

        let kind = FrameKind::from_byte(frame[0])?;
        let topic = u16::from_be_bytes([frame[1], frame[2]]);
        let seq = u32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]);
        let epoch = u16::from_be_bytes([frame[7], frame[8]]);
        frame.advance(HEADER_LEN);

        Ok(Some(Frame {
            kind,
            topic,
            seq,
            epoch,
            body: frame.freeze(),
        }))
    }
}

impl Encoder<Frame> for BusFrameCodec {
    type Error = BusError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(frame.encoded_len());
        dst.put_u8(frame.kind.as_byte());
        dst.put_u16(frame.topic);
        dst.put_u32(frame.seq);
        dst.put_u16(frame.epoch);
        dst.extend_from_slice(&frame.body);
        dst.extend_from_slice(&DELIMITER);
        Ok(())
    }
}
