use crate::codec::{CodecError, Decodable, Encodable, PduHeader, expect_command};
use crate::datatypes::{CommandId, CommandStatus};
use bytes::BytesMut;
use std::io::Cursor;

// Header-only PDUs. Each is a single 16 octet header; they differ only in
// command_id and whether command_status is meaningful.

/// enquire_link: link-level keep-alive probe, sent by either peer
#[derive(Clone, Debug, PartialEq)]
pub struct EnquireLink {
    pub sequence_number: u32,
}

/// enquire_link_resp. Always ESME_ROK.
#[derive(Clone, Debug, PartialEq)]
pub struct EnquireLinkResponse {
    pub sequence_number: u32,
}

/// unbind: graceful session teardown, sent by either peer
#[derive(Clone, Debug, PartialEq)]
pub struct Unbind {
    pub sequence_number: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnbindResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

/// generic_nack: negative acknowledgement for a PDU the peer could not parse
#[derive(Clone, Debug, PartialEq)]
pub struct GenericNack {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl EnquireLink {
    pub fn new(sequence_number: u32) -> Self {
        Self { sequence_number }
    }
}

impl EnquireLinkResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self { sequence_number }
    }
}

impl Unbind {
    pub fn new(sequence_number: u32) -> Self {
        Self { sequence_number }
    }
}

impl UnbindResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
        }
    }
}

impl GenericNack {
    pub fn new(sequence_number: u32, command_status: CommandStatus) -> Self {
        Self {
            command_status,
            sequence_number,
        }
    }
}

fn encode_header_only(
    buf: &mut BytesMut,
    command_id: CommandId,
    command_status: CommandStatus,
    sequence_number: u32,
) -> Result<(), CodecError> {
    PduHeader::outgoing(command_id, command_status, sequence_number).encode(buf);
    Ok(())
}

impl Encodable for EnquireLink {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_header_only(buf, CommandId::EnquireLink, CommandStatus::Ok, self.sequence_number)
    }
}

impl Decodable for EnquireLink {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::EnquireLink])?;
        Ok(Self::new(header.sequence_number))
    }
}

impl Encodable for EnquireLinkResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_header_only(buf, CommandId::EnquireLinkResp, CommandStatus::Ok, self.sequence_number)
    }
}

impl Decodable for EnquireLinkResponse {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::EnquireLinkResp])?;
        Ok(Self::new(header.sequence_number))
    }
}

impl Encodable for Unbind {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_header_only(buf, CommandId::Unbind, CommandStatus::Ok, self.sequence_number)
    }
}

impl Decodable for Unbind {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::Unbind])?;
        Ok(Self::new(header.sequence_number))
    }
}

impl Encodable for UnbindResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_header_only(buf, CommandId::UnbindResp, self.command_status, self.sequence_number)
    }
}

impl Decodable for UnbindResponse {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::UnbindResp])?;
        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
        })
    }
}

impl Encodable for GenericNack {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_header_only(buf, CommandId::GenericNack, self.command_status, self.sequence_number)
    }
}

impl Decodable for GenericNack {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::GenericNack])?;
        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_pdus_are_sixteen_octets() {
        assert_eq!(EnquireLink::new(1).to_bytes().unwrap().len(), 16);
        assert_eq!(UnbindResponse::new(2).to_bytes().unwrap().len(), 16);
    }

    #[test]
    fn generic_nack_keeps_status() {
        let nack = GenericNack::new(456, CommandStatus::InvalidCommandId);
        let bytes = nack.to_bytes().unwrap();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        assert_eq!(GenericNack::decode(header, &mut cursor).unwrap(), nack);
    }

    #[test]
    fn decoding_with_wrong_header_fails() {
        let bytes = Unbind::new(3).to_bytes().unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        assert!(matches!(
            EnquireLink::decode(header, &mut cursor),
            Err(CodecError::UnexpectedCommandId { .. })
        ));
    }
}
