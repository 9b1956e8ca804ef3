use crate::codec::{
    CodecError, Decodable, Encodable, PduHeader, decode_cstring, decode_tlvs, decode_u8,
    encode_cstring, expect_command,
};
use crate::datatypes::tlv::{Tlv, find_tlv, tags};
use crate::datatypes::{CommandId, CommandStatus, NumericPlanIndicator, TypeOfNumber};
use bytes::{BufMut, BytesMut};
use std::io::Cursor;

// SMPP v3.4 field limits (terminator included)
const SYSTEM_ID_LEN: usize = 16;
const PASSWORD_LEN: usize = 9;
const SYSTEM_TYPE_LEN: usize = 13;
const ADDRESS_RANGE_LEN: usize = 41;

/// SMPP v3.4 interface version octet
pub const INTERFACE_VERSION_34: u8 = 0x34;

/// The three bind flavours an ESME can request. The wire layout of
/// bind_transmitter, bind_receiver and bind_transceiver is identical; only
/// the command_id differs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BindKind {
    Transmitter,
    Receiver,
    Transceiver,
}

impl BindKind {
    pub fn command_id(self) -> CommandId {
        match self {
            BindKind::Transmitter => CommandId::BindTransmitter,
            BindKind::Receiver => CommandId::BindReceiver,
            BindKind::Transceiver => CommandId::BindTransceiver,
        }
    }

    pub fn response_command_id(self) -> CommandId {
        match self {
            BindKind::Transmitter => CommandId::BindTransmitterResp,
            BindKind::Receiver => CommandId::BindReceiverResp,
            BindKind::Transceiver => CommandId::BindTransceiverResp,
        }
    }

    fn from_command_id(id: CommandId) -> Option<Self> {
        match id {
            CommandId::BindTransmitter | CommandId::BindTransmitterResp => Some(BindKind::Transmitter),
            CommandId::BindReceiver | CommandId::BindReceiverResp => Some(BindKind::Receiver),
            CommandId::BindTransceiver | CommandId::BindTransceiverResp => Some(BindKind::Transceiver),
            _ => None,
        }
    }
}

/// bind_transmitter / bind_receiver / bind_transceiver request
#[derive(Clone, Debug, PartialEq)]
pub struct Bind {
    pub kind: BindKind,
    pub sequence_number: u32,
    /// Identifies the ESME requesting to bind. Max 15 octets.
    pub system_id: String,
    /// Authenticates the ESME. Max 8 octets.
    pub password: String,
    /// Identifies the type of ESME system. Max 12 octets.
    pub system_type: String,
    pub interface_version: u8,
    pub addr_ton: TypeOfNumber,
    pub addr_npi: NumericPlanIndicator,
    /// Regular expression of SME addresses served by this ESME. Max 40 octets.
    pub address_range: String,
}

impl Bind {
    pub fn new(
        kind: BindKind,
        sequence_number: u32,
        system_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sequence_number,
            system_id: system_id.into(),
            password: password.into(),
            system_type: String::new(),
            interface_version: INTERFACE_VERSION_34,
            addr_ton: TypeOfNumber::Unknown,
            addr_npi: NumericPlanIndicator::Unknown,
            address_range: String::new(),
        }
    }

    pub fn with_system_type(mut self, system_type: impl Into<String>) -> Self {
        self.system_type = system_type.into();
        self
    }
}

const BIND_REQUESTS: &[CommandId] = &[
    CommandId::BindTransmitter,
    CommandId::BindReceiver,
    CommandId::BindTransceiver,
];

const BIND_RESPONSES: &[CommandId] = &[
    CommandId::BindTransmitterResp,
    CommandId::BindReceiverResp,
    CommandId::BindTransceiverResp,
];

impl Encodable for Bind {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        PduHeader::outgoing(self.kind.command_id(), CommandStatus::Ok, self.sequence_number)
            .encode(buf);
        encode_cstring(buf, &self.system_id, SYSTEM_ID_LEN, "system_id")?;
        encode_cstring(buf, &self.password, PASSWORD_LEN, "password")?;
        encode_cstring(buf, &self.system_type, SYSTEM_TYPE_LEN, "system_type")?;
        buf.put_u8(self.interface_version);
        buf.put_u8(self.addr_ton.into());
        buf.put_u8(self.addr_npi.into());
        encode_cstring(buf, &self.address_range, ADDRESS_RANGE_LEN, "address_range")?;
        Ok(())
    }
}

impl Decodable for Bind {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, BIND_REQUESTS)?;
        let kind = BindKind::from_command_id(header.command_id)
            .ok_or(CodecError::InvalidCommandId(header.command_id as u32))?;

        Ok(Self {
            kind,
            sequence_number: header.sequence_number,
            system_id: decode_cstring(buf, SYSTEM_ID_LEN, "system_id")?,
            password: decode_cstring(buf, PASSWORD_LEN, "password")?,
            system_type: decode_cstring(buf, SYSTEM_TYPE_LEN, "system_type")?,
            interface_version: decode_u8(buf)?,
            addr_ton: TypeOfNumber::from(decode_u8(buf)?),
            addr_npi: NumericPlanIndicator::from(decode_u8(buf)?),
            address_range: decode_cstring(buf, ADDRESS_RANGE_LEN, "address_range")?,
        })
    }
}

/// bind_*_resp. On error the SMSC may omit the body entirely.
#[derive(Clone, Debug, PartialEq)]
pub struct BindResponse {
    pub kind: BindKind,
    pub command_status: CommandStatus,
    pub sequence_number: u32,
    /// SMSC identifier
    pub system_id: String,
    /// sc_interface_version TLV, if the SMSC sent one
    pub sc_interface_version: Option<u8>,
}

impl BindResponse {
    pub fn ok(kind: BindKind, sequence_number: u32, system_id: impl Into<String>) -> Self {
        Self {
            kind,
            command_status: CommandStatus::Ok,
            sequence_number,
            system_id: system_id.into(),
            sc_interface_version: Some(INTERFACE_VERSION_34),
        }
    }

    pub fn error(kind: BindKind, sequence_number: u32, status: CommandStatus) -> Self {
        Self {
            kind,
            command_status: status,
            sequence_number,
            system_id: String::new(),
            sc_interface_version: None,
        }
    }
}

impl Encodable for BindResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        PduHeader::outgoing(
            self.kind.response_command_id(),
            self.command_status,
            self.sequence_number,
        )
        .encode(buf);
        encode_cstring(buf, &self.system_id, SYSTEM_ID_LEN, "system_id")?;
        if let Some(version) = self.sc_interface_version {
            Tlv::u8(tags::SC_INTERFACE_VERSION, version).encode(buf)?;
        }
        Ok(())
    }
}

impl Decodable for BindResponse {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, BIND_RESPONSES)?;
        let kind = BindKind::from_command_id(header.command_id)
            .ok_or(CodecError::InvalidCommandId(header.command_id as u32))?;
        let body_end = buf.position() + header.body_len() as u64;

        let (system_id, sc_interface_version) = if header.body_len() == 0 {
            (String::new(), None)
        } else {
            let system_id = decode_cstring(buf, SYSTEM_ID_LEN, "system_id")?;
            let tlvs = decode_tlvs(buf, body_end)?;
            let version = find_tlv(&tlvs, tags::SC_INTERFACE_VERSION).and_then(Tlv::as_u8);
            (system_id, version)
        };

        Ok(Self {
            kind,
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            system_id,
            sc_interface_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Frame, PduRegistry};

    #[test]
    fn overlong_password_is_rejected_on_encode() {
        let bind = Bind::new(BindKind::Transmitter, 1, "gateway", "far-too-long");
        assert!(matches!(
            bind.to_bytes(),
            Err(CodecError::FieldValidation { field: "password", .. })
        ));
    }

    #[test]
    fn error_response_without_body() {
        let mut pdu = Vec::new();
        pdu.extend_from_slice(&16u32.to_be_bytes());
        pdu.extend_from_slice(&(CommandId::BindReceiverResp as u32).to_be_bytes());
        pdu.extend_from_slice(&(CommandStatus::InvalidPassword.code()).to_be_bytes());
        pdu.extend_from_slice(&5u32.to_be_bytes());

        let registry = PduRegistry::new();
        let mut cursor = Cursor::new(pdu.as_slice());
        let frame = Frame::parse(&registry, &mut cursor).unwrap();
        assert_eq!(
            frame,
            Frame::BindResp(BindResponse::error(
                BindKind::Receiver,
                5,
                CommandStatus::InvalidPassword
            ))
        );
    }

    #[test]
    fn ok_response_carries_interface_version() {
        let response = BindResponse::ok(BindKind::Transmitter, 2, "SMSC");
        let bytes = response.to_bytes().unwrap();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = BindResponse::decode(header, &mut cursor).unwrap();
        assert_eq!(decoded, response);
    }
}
