// SMPP v3.4 Codec - Separates parsing/encoding logic from domain models
//
// Each PDU implements Encodable/Decodable rather than having all parsing logic
// in one monolithic frame parser. The registry maps command ids to decoders so
// that a connector only pays for the PDUs it actually exchanges.

use crate::datatypes::{
    Bind, BindResponse, CommandId, CommandStatus, DeliverSm, DeliverSmResponse, EnquireLink,
    EnquireLinkResponse, GenericNack, SubmitSm, SubmitSmResponse, Tlv, Unbind, UnbindResponse,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

/// Maximum allowed PDU size to prevent memory exhaustion attacks
pub const MAX_PDU_SIZE: u32 = 65536; // 64KB

/// SMPP v3.4 PDU Header (16 bytes, common to all PDUs)
#[derive(Debug, Clone, PartialEq)]
pub struct PduHeader {
    pub command_length: u32,
    pub command_id: CommandId,
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl PduHeader {
    pub const SIZE: usize = 16;

    /// Decode PDU header from buffer with validation
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }

        let command_length = buf.get_u32();
        let command_id_raw = buf.get_u32();
        let command_status = CommandStatus::from(buf.get_u32());
        let sequence_number = buf.get_u32();

        if !(Self::SIZE as u32..=MAX_PDU_SIZE).contains(&command_length) {
            return Err(CodecError::InvalidPduLength {
                length: command_length,
                min: Self::SIZE as u32,
                max: MAX_PDU_SIZE,
            });
        }

        let command_id = CommandId::try_from(command_id_raw)
            .map_err(|_| CodecError::InvalidCommandId(command_id_raw))?;

        // SMPP v3.4 rule: requests must have command_status = 0
        if !command_id.is_response() && command_status != CommandStatus::Ok {
            return Err(CodecError::InvalidRequestStatus {
                command_id,
                command_status,
            });
        }

        if sequence_number == 0xFFFF_FFFF {
            return Err(CodecError::ReservedSequenceNumber(sequence_number));
        }

        Ok(PduHeader {
            command_length,
            command_id,
            command_status,
            sequence_number,
        })
    }

    /// Encode PDU header to buffer. The length is patched by `to_bytes`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.command_length);
        buf.put_u32(self.command_id as u32);
        buf.put_u32(self.command_status.code());
        buf.put_u32(self.sequence_number);
    }

    /// Header for an outgoing PDU whose length is not yet known
    pub fn outgoing(command_id: CommandId, command_status: CommandStatus, sequence_number: u32) -> Self {
        Self {
            command_length: 0,
            command_id,
            command_status,
            sequence_number,
        }
    }

    /// Number of body octets following the header
    pub fn body_len(&self) -> usize {
        self.command_length as usize - Self::SIZE
    }
}

/// Trait for types that can be encoded to bytes
pub trait Encodable {
    /// Encode this PDU (header included) to the buffer
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError>;

    /// Encode into a fresh buffer and patch the command_length field.
    fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf)?;

        if buf.len() < PduHeader::SIZE {
            return Err(CodecError::FieldValidation {
                field: "header",
                reason: format!("encoded PDU is only {} octets", buf.len()),
            });
        }
        let length = buf.len() as u32;
        buf[0..4].copy_from_slice(&length.to_be_bytes());

        Ok(buf.freeze())
    }
}

/// Trait for types that can be decoded from the body that follows a header
pub trait Decodable: Sized {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError>;
}

/// Codec errors with detailed context for debugging
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Incomplete PDU: need more data")]
    Incomplete,

    #[error("Invalid command_id: {0:#x}")]
    InvalidCommandId(u32),

    #[error("Invalid PDU length: {length}, must be {min}-{max}")]
    InvalidPduLength { length: u32, min: u32, max: u32 },

    #[error("Request PDU {command_id:?} has non-zero status: {command_status:?}")]
    InvalidRequestStatus {
        command_id: CommandId,
        command_status: CommandStatus,
    },

    #[error("Reserved sequence number: {0}")]
    ReservedSequenceNumber(u32),

    #[error("Unexpected command_id: expected one of {expected:?}, got {actual:?}")]
    UnexpectedCommandId {
        expected: &'static [CommandId],
        actual: CommandId,
    },

    #[error("Field '{field}' validation failed: {reason}")]
    FieldValidation { field: &'static str, reason: String },

    #[error("TLV parsing error: {0}")]
    TlvError(String),

    #[error("UTF-8 decoding error in field '{field}': {source}")]
    Utf8Error {
        field: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Reject a header whose command_id is not one of `expected`
pub fn expect_command(header: &PduHeader, expected: &'static [CommandId]) -> Result<(), CodecError> {
    if expected.contains(&header.command_id) {
        Ok(())
    } else {
        Err(CodecError::UnexpectedCommandId {
            expected,
            actual: header.command_id,
        })
    }
}

/// Decode a NUL-terminated C-Octet string of at most `max_len` octets
/// (terminator included).
pub fn decode_cstring(
    buf: &mut Cursor<&[u8]>,
    max_len: usize,
    field_name: &'static str,
) -> Result<String, CodecError> {
    let available = buf.chunk();
    let end = match available.iter().take(max_len).position(|&b| b == 0) {
        Some(end) => end,
        None if available.len() < max_len => return Err(CodecError::Incomplete),
        None => {
            return Err(CodecError::FieldValidation {
                field: field_name,
                reason: format!("missing NUL terminator within {max_len} octets"),
            });
        }
    };

    let value = available[..end].to_vec();
    buf.advance(end + 1);

    String::from_utf8(value).map_err(|e| CodecError::Utf8Error {
        field: field_name,
        source: e,
    })
}

/// Encode a C-Octet string, rejecting values that would not fit `max_len`
/// once terminated.
pub fn encode_cstring(
    buf: &mut BytesMut,
    value: &str,
    max_len: usize,
    field_name: &'static str,
) -> Result<(), CodecError> {
    if value.len() + 1 > max_len {
        return Err(CodecError::FieldValidation {
            field: field_name,
            reason: format!("{} octets exceeds maximum of {}", value.len(), max_len - 1),
        });
    }
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
    Ok(())
}

/// Decode a single byte
pub fn decode_u8(buf: &mut Cursor<&[u8]>) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u8())
}

/// Decode a 16-bit big-endian integer
pub fn decode_u16(buf: &mut Cursor<&[u8]>) -> Result<u16, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u16())
}

/// Decode TLVs until `body_end` (absolute cursor position).
pub fn decode_tlvs(buf: &mut Cursor<&[u8]>, body_end: u64) -> Result<Vec<Tlv>, CodecError> {
    let mut tlvs = Vec::new();
    while buf.position() < body_end {
        tlvs.push(Tlv::decode(buf)?);
    }
    if buf.position() != body_end {
        return Err(CodecError::TlvError(format!(
            "optional parameters overran PDU body by {} octets",
            buf.position() - body_end
        )));
    }
    Ok(tlvs)
}

/// Generic frame type that can hold any PDU the gateway exchanges
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    // Session management PDUs
    Bind(Bind),
    BindResp(BindResponse),
    Unbind(Unbind),
    UnbindResp(UnbindResponse),
    EnquireLink(EnquireLink),
    EnquireLinkResp(EnquireLinkResponse),

    // Message PDUs
    SubmitSm(Box<SubmitSm>),
    SubmitSmResp(SubmitSmResponse),
    DeliverSm(Box<DeliverSm>),
    DeliverSmResp(DeliverSmResponse),

    GenericNack(GenericNack),

    // For PDUs without a registered decoder (forward compatibility)
    Unknown { header: PduHeader, body: Bytes },
}

/// Registry of PDU decoders for extensible parsing
type DecoderFn =
    Box<dyn Fn(PduHeader, &mut Cursor<&[u8]>) -> Result<Frame, CodecError> + Send + Sync>;

pub struct PduRegistry {
    decoders: HashMap<CommandId, DecoderFn>,
}

impl PduRegistry {
    /// Create a new registry with the PDUs a gateway session understands
    pub fn new() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
        };

        for id in [
            CommandId::BindTransmitter,
            CommandId::BindReceiver,
            CommandId::BindTransceiver,
        ] {
            registry.register(id, |h, b| Bind::decode(h, b).map(Frame::Bind));
        }
        for id in [
            CommandId::BindTransmitterResp,
            CommandId::BindReceiverResp,
            CommandId::BindTransceiverResp,
        ] {
            registry.register(id, |h, b| BindResponse::decode(h, b).map(Frame::BindResp));
        }

        registry.register(CommandId::Unbind, |h, b| Unbind::decode(h, b).map(Frame::Unbind));
        registry.register(CommandId::UnbindResp, |h, b| {
            UnbindResponse::decode(h, b).map(Frame::UnbindResp)
        });
        registry.register(CommandId::EnquireLink, |h, b| {
            EnquireLink::decode(h, b).map(Frame::EnquireLink)
        });
        registry.register(CommandId::EnquireLinkResp, |h, b| {
            EnquireLinkResponse::decode(h, b).map(Frame::EnquireLinkResp)
        });
        registry.register(CommandId::SubmitSm, |h, b| {
            SubmitSm::decode(h, b).map(|pdu| Frame::SubmitSm(Box::new(pdu)))
        });
        registry.register(CommandId::SubmitSmResp, |h, b| {
            SubmitSmResponse::decode(h, b).map(Frame::SubmitSmResp)
        });
        registry.register(CommandId::DeliverSm, |h, b| {
            DeliverSm::decode(h, b).map(|pdu| Frame::DeliverSm(Box::new(pdu)))
        });
        registry.register(CommandId::DeliverSmResp, |h, b| {
            DeliverSmResponse::decode(h, b).map(Frame::DeliverSmResp)
        });
        registry.register(CommandId::GenericNack, |h, b| {
            GenericNack::decode(h, b).map(Frame::GenericNack)
        });

        registry
    }

    fn register<F>(&mut self, command_id: CommandId, decoder: F)
    where
        F: Fn(PduHeader, &mut Cursor<&[u8]>) -> Result<Frame, CodecError> + Send + Sync + 'static,
    {
        self.decoders.insert(command_id, Box::new(decoder));
    }

    /// Decode a PDU given its header and body
    pub fn decode_pdu(
        &self,
        header: PduHeader,
        buf: &mut Cursor<&[u8]>,
    ) -> Result<Frame, CodecError> {
        let body_size = header.body_len();
        if buf.remaining() < body_size {
            return Err(CodecError::Incomplete);
        }

        match self.decoders.get(&header.command_id) {
            Some(decoder) => decoder(header, buf),
            None => {
                let body = buf.copy_to_bytes(body_size);
                tracing::debug!(
                    command_id = ?header.command_id,
                    "no decoder registered, treating PDU as opaque data"
                );

                Ok(Frame::Unknown { header, body })
            }
        }
    }

    /// Check if a command_id is registered
    pub fn is_registered(&self, command_id: CommandId) -> bool {
        self.decoders.contains_key(&command_id)
    }
}

impl Default for PduRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// Get the command_id for this frame
    pub fn command_id(&self) -> CommandId {
        match self {
            Frame::Bind(pdu) => pdu.kind.command_id(),
            Frame::BindResp(pdu) => pdu.kind.response_command_id(),
            Frame::Unbind(_) => CommandId::Unbind,
            Frame::UnbindResp(_) => CommandId::UnbindResp,
            Frame::EnquireLink(_) => CommandId::EnquireLink,
            Frame::EnquireLinkResp(_) => CommandId::EnquireLinkResp,
            Frame::SubmitSm(_) => CommandId::SubmitSm,
            Frame::SubmitSmResp(_) => CommandId::SubmitSmResp,
            Frame::DeliverSm(_) => CommandId::DeliverSm,
            Frame::DeliverSmResp(_) => CommandId::DeliverSmResp,
            Frame::GenericNack(_) => CommandId::GenericNack,
            Frame::Unknown { header, .. } => header.command_id,
        }
    }

    /// Get the sequence number for this frame
    pub fn sequence_number(&self) -> u32 {
        match self {
            Frame::Bind(pdu) => pdu.sequence_number,
            Frame::BindResp(pdu) => pdu.sequence_number,
            Frame::Unbind(pdu) => pdu.sequence_number,
            Frame::UnbindResp(pdu) => pdu.sequence_number,
            Frame::EnquireLink(pdu) => pdu.sequence_number,
            Frame::EnquireLinkResp(pdu) => pdu.sequence_number,
            Frame::SubmitSm(pdu) => pdu.sequence_number,
            Frame::SubmitSmResp(pdu) => pdu.sequence_number,
            Frame::DeliverSm(pdu) => pdu.sequence_number,
            Frame::DeliverSmResp(pdu) => pdu.sequence_number,
            Frame::GenericNack(pdu) => pdu.sequence_number,
            Frame::Unknown { header, .. } => header.sequence_number,
        }
    }

    /// Check if this frame is a response PDU
    pub fn is_response(&self) -> bool {
        self.command_id().is_response()
    }

    /// Check whether `buf` holds at least one complete PDU. Returns the PDU
    /// length on success.
    pub fn check(buf: &mut Cursor<&[u8]>) -> Result<usize, CodecError> {
        if buf.remaining() < PduHeader::SIZE {
            return Err(CodecError::Incomplete);
        }

        // Peek at command_length without advancing cursor
        let pos = buf.position();
        let command_length = buf.get_u32();
        buf.set_position(pos);

        if !(PduHeader::SIZE as u32..=MAX_PDU_SIZE).contains(&command_length) {
            return Err(CodecError::InvalidPduLength {
                length: command_length,
                min: PduHeader::SIZE as u32,
                max: MAX_PDU_SIZE,
            });
        }

        if buf.remaining() < command_length as usize {
            return Err(CodecError::Incomplete);
        }

        Ok(command_length as usize)
    }

    /// Parse one complete PDU from the cursor
    pub fn parse(registry: &PduRegistry, buf: &mut Cursor<&[u8]>) -> Result<Frame, CodecError> {
        let header = PduHeader::decode(buf)?;
        registry.decode_pdu(header, buf)
    }

    /// Serialize the frame into wire bytes
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        match self {
            Frame::Bind(pdu) => pdu.to_bytes(),
            Frame::BindResp(pdu) => pdu.to_bytes(),
            Frame::Unbind(pdu) => pdu.to_bytes(),
            Frame::UnbindResp(pdu) => pdu.to_bytes(),
            Frame::EnquireLink(pdu) => pdu.to_bytes(),
            Frame::EnquireLinkResp(pdu) => pdu.to_bytes(),
            Frame::SubmitSm(pdu) => pdu.to_bytes(),
            Frame::SubmitSmResp(pdu) => pdu.to_bytes(),
            Frame::DeliverSm(pdu) => pdu.to_bytes(),
            Frame::DeliverSmResp(pdu) => pdu.to_bytes(),
            Frame::GenericNack(pdu) => pdu.to_bytes(),
            Frame::Unknown { header, .. } => Err(CodecError::FieldValidation {
                field: "command_id",
                reason: format!("cannot re-encode opaque PDU {:?}", header.command_id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{BindKind, MessageBody};

    fn parse(bytes: &[u8]) -> Frame {
        let registry = PduRegistry::new();
        let mut cursor = Cursor::new(bytes);
        Frame::parse(&registry, &mut cursor).unwrap()
    }

    #[test]
    fn pdu_header_encode_decode() {
        let header = PduHeader {
            command_length: 16,
            command_id: CommandId::EnquireLink,
            command_status: CommandStatus::Ok,
            sequence_number: 42,
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        let mut cursor = Cursor::new(buf.as_ref());
        let decoded = PduHeader::decode(&mut cursor).unwrap();

        assert_eq!(header, decoded);
    }

    #[test]
    fn pdu_header_validation() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x08, // command_length too small
            0x00, 0x00, 0x00, 0x15, // command_id
            0x00, 0x00, 0x00, 0x00, // command_status
            0x00, 0x00, 0x00, 0x01, // sequence_number
        ];
        let mut cursor = Cursor::new(data);
        assert!(matches!(
            PduHeader::decode(&mut cursor),
            Err(CodecError::InvalidPduLength { .. })
        ));

        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x10, // command_length
            0x00, 0x00, 0x00, 0x15, // enquire_link
            0x00, 0x00, 0x00, 0x08, // non-zero status on a request
            0x00, 0x00, 0x00, 0x01,
        ];
        let mut cursor = Cursor::new(data);
        assert!(matches!(
            PduHeader::decode(&mut cursor),
            Err(CodecError::InvalidRequestStatus { .. })
        ));
    }

    #[test]
    fn decode_cstring_stops_at_terminator() {
        let data = b"hello\0rest";
        let mut cursor = Cursor::new(&data[..]);
        let result = decode_cstring(&mut cursor, 16, "test").unwrap();
        assert_eq!(result, "hello");
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn decode_cstring_without_terminator() {
        let data = b"abcdefgh";
        let mut cursor = Cursor::new(&data[..]);
        assert!(matches!(
            decode_cstring(&mut cursor, 4, "system_id"),
            Err(CodecError::FieldValidation { field: "system_id", .. })
        ));
    }

    #[test]
    fn encode_cstring_rejects_overlong_values() {
        let mut buf = BytesMut::new();
        encode_cstring(&mut buf, "hello", 10, "test").unwrap();
        assert_eq!(buf.as_ref(), b"hello\0");

        let mut buf = BytesMut::new();
        assert!(encode_cstring(&mut buf, "0123456789", 10, "test").is_err());
    }

    #[test]
    fn check_reports_incomplete_and_length() {
        let bytes = EnquireLink::new(7).to_bytes().unwrap();
        let mut cursor = Cursor::new(&bytes[..10]);
        assert!(matches!(Frame::check(&mut cursor), Err(CodecError::Incomplete)));

        let mut cursor = Cursor::new(bytes.as_ref());
        assert_eq!(Frame::check(&mut cursor).unwrap(), 16);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn bind_transceiver_decodes_through_registry() {
        let bind = Bind::new(BindKind::Transceiver, 3, "gw", "secret");
        let bytes = bind.to_bytes().unwrap();

        match parse(&bytes) {
            Frame::Bind(decoded) => {
                assert_eq!(decoded.kind, BindKind::Transceiver);
                assert_eq!(decoded.system_id, "gw");
                assert_eq!(decoded.password, "secret");
            }
            other => panic!("expected bind, got {other:?}"),
        }
    }

    #[test]
    fn submit_sm_with_payload_tlv_survives_the_wire() {
        let mut body = MessageBody::new("258840000000", "Gateway");
        body.set_content(&"x".repeat(300));
        let submit = SubmitSm::new(9, body);
        let bytes = submit.to_bytes().unwrap();

        let Frame::SubmitSm(decoded) = parse(&bytes) else {
            panic!("expected submit_sm");
        };
        assert!(decoded.body.short_message.is_empty());
        assert_eq!(decoded.body.content(), "x".repeat(300));
        assert_eq!(decoded.sequence_number, 9);
    }

    #[test]
    fn unregistered_command_is_opaque() {
        let mut pdu = Vec::new();
        pdu.extend_from_slice(&20u32.to_be_bytes());
        pdu.extend_from_slice(&(CommandId::DataSm as u32).to_be_bytes());
        pdu.extend_from_slice(&0u32.to_be_bytes());
        pdu.extend_from_slice(&1u32.to_be_bytes());
        pdu.extend_from_slice(&[1, 2, 3, 4]);

        match parse(&pdu) {
            Frame::Unknown { header, body } => {
                assert_eq!(header.command_id, CommandId::DataSm);
                assert_eq!(body.as_ref(), &[1, 2, 3, 4]);
            }
            other => panic!("expected opaque frame, got {other:?}"),
        }
    }

    #[test]
    fn frame_accessors() {
        let frame = Frame::EnquireLink(EnquireLink::new(42));
        assert_eq!(frame.command_id(), CommandId::EnquireLink);
        assert_eq!(frame.sequence_number(), 42);
        assert!(!frame.is_response());

        let frame = Frame::EnquireLinkResp(EnquireLinkResponse::new(43));
        assert_eq!(frame.sequence_number(), 43);
        assert!(frame.is_response());
    }
}
