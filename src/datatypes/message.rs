use crate::codec::{
    CodecError, Decodable, Encodable, PduHeader, decode_cstring, decode_tlvs, decode_u8,
    encode_cstring, expect_command,
};
use crate::datatypes::tlv::{Tlv, find_tlv, tags};
use crate::datatypes::{CommandId, CommandStatus, NumericPlanIndicator, TypeOfNumber};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

// SMPP v3.4 field limits (terminator included)
const SERVICE_TYPE_LEN: usize = 6;
const ADDR_LEN: usize = 21;
const TIME_LEN: usize = 17;
const MESSAGE_ID_LEN: usize = 65;

/// Longest user data that fits the short_message field. Anything longer
/// travels in the message_payload TLV.
pub const MAX_SHORT_MESSAGE_LENGTH: usize = 254;

/// esm_class message type bit marking an SMSC delivery receipt
pub const ESM_CLASS_DELIVERY_RECEIPT: u8 = 0x04;

/// data_coding values the gateway produces
pub const DATA_CODING_DEFAULT: u8 = 0x00;
pub const DATA_CODING_UCS2: u8 = 0x08;

/// Concatenation info carried in the sar_* TLVs
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SarInfo {
    pub reference: u16,
    pub total: u8,
    pub sequence: u8,
}

/// Mandatory body shared by submit_sm and deliver_sm. The two PDUs have the
/// same layout; only the direction and which fields are meaningful differ.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageBody {
    /// 4.4.1 service_type: SMS application service. Max 5 octets.
    pub service_type: String,
    pub source_addr_ton: TypeOfNumber,
    pub source_addr_npi: NumericPlanIndicator,
    /// Originator address. Max 20 octets.
    pub source_addr: String,
    pub dest_addr_ton: TypeOfNumber,
    pub dest_addr_npi: NumericPlanIndicator,
    /// Recipient address. Max 20 octets.
    pub destination_addr: String,
    /// Message mode and type. Bit 2 set on deliver_sm marks a delivery receipt.
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    /// 0x01 requests an SMSC delivery receipt
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    /// Up to 254 octets of user data; sm_length is derived on encode
    pub short_message: Bytes,
    /// Optional parameters in wire order
    pub tlvs: Vec<Tlv>,
}

impl MessageBody {
    /// Body with TON/NPI inferred from the address shapes
    pub fn new(destination: impl Into<String>, source: impl Into<String>) -> Self {
        let destination = destination.into();
        let source = source.into();
        let (dest_ton, dest_npi) = TypeOfNumber::infer(&destination);
        let (source_ton, source_npi) = TypeOfNumber::infer(&source);

        Self {
            service_type: String::new(),
            source_addr_ton: source_ton,
            source_addr_npi: source_npi,
            source_addr: source,
            dest_addr_ton: dest_ton,
            dest_addr_npi: dest_npi,
            destination_addr: destination,
            esm_class: 0,
            protocol_id: 0,
            priority_flag: 0,
            schedule_delivery_time: String::new(),
            validity_period: String::new(),
            registered_delivery: 0,
            replace_if_present_flag: 0,
            data_coding: DATA_CODING_DEFAULT,
            sm_default_msg_id: 0,
            short_message: Bytes::new(),
            tlvs: Vec::new(),
        }
    }

    /// Set the user data, choosing UCS2 for non-ASCII text and moving the
    /// payload into the message_payload TLV when it is too long for
    /// short_message.
    pub fn set_content(&mut self, text: &str) {
        let encoded: Vec<u8> = if text.is_ascii() {
            self.data_coding = DATA_CODING_DEFAULT;
            text.as_bytes().to_vec()
        } else {
            self.data_coding = DATA_CODING_UCS2;
            text.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect()
        };

        self.tlvs.retain(|tlv| tlv.tag != tags::MESSAGE_PAYLOAD);
        if encoded.len() > MAX_SHORT_MESSAGE_LENGTH {
            self.short_message = Bytes::new();
            self.tlvs.push(Tlv::new(tags::MESSAGE_PAYLOAD, encoded));
        } else {
            self.short_message = Bytes::from(encoded);
        }
    }

    /// User data decoded as text, from short_message or message_payload
    pub fn content(&self) -> String {
        let raw: &[u8] = if self.short_message.is_empty() {
            find_tlv(&self.tlvs, tags::MESSAGE_PAYLOAD)
                .map(|tlv| tlv.value.as_ref())
                .unwrap_or_default()
        } else {
            self.short_message.as_ref()
        };

        if self.data_coding == DATA_CODING_UCS2 {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            String::from_utf8_lossy(raw).into_owned()
        }
    }

    pub fn tlv(&self, tag: u16) -> Option<&Tlv> {
        find_tlv(&self.tlvs, tag)
    }

    pub fn is_delivery_receipt(&self) -> bool {
        self.esm_class & ESM_CLASS_DELIVERY_RECEIPT != 0
    }

    pub fn set_sar(&mut self, sar: SarInfo) {
        self.tlvs.retain(|tlv| {
            !matches!(
                tlv.tag,
                tags::SAR_MSG_REF_NUM | tags::SAR_TOTAL_SEGMENTS | tags::SAR_SEGMENT_SEQNUM
            )
        });
        self.tlvs.push(Tlv::u16(tags::SAR_MSG_REF_NUM, sar.reference));
        self.tlvs.push(Tlv::u8(tags::SAR_TOTAL_SEGMENTS, sar.total));
        self.tlvs.push(Tlv::u8(tags::SAR_SEGMENT_SEQNUM, sar.sequence));
    }

    /// Concatenation info, present only when all three sar_* TLVs are set
    pub fn sar(&self) -> Option<SarInfo> {
        Some(SarInfo {
            reference: self.tlv(tags::SAR_MSG_REF_NUM)?.as_u16()?,
            total: self.tlv(tags::SAR_TOTAL_SEGMENTS)?.as_u8()?,
            sequence: self.tlv(tags::SAR_SEGMENT_SEQNUM)?.as_u8()?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let sm_length = u8::try_from(self.short_message.len())
            .ok()
            .filter(|len| (*len as usize) <= MAX_SHORT_MESSAGE_LENGTH)
            .ok_or_else(|| CodecError::FieldValidation {
                field: "short_message",
                reason: format!(
                    "{} octets exceeds {MAX_SHORT_MESSAGE_LENGTH}",
                    self.short_message.len()
                ),
            })?;
        if sm_length > 0 && self.tlv(tags::MESSAGE_PAYLOAD).is_some() {
            return Err(CodecError::FieldValidation {
                field: "short_message",
                reason: "short_message and message_payload are mutually exclusive".to_string(),
            });
        }

        encode_cstring(buf, &self.service_type, SERVICE_TYPE_LEN, "service_type")?;
        buf.put_u8(self.source_addr_ton.into());
        buf.put_u8(self.source_addr_npi.into());
        encode_cstring(buf, &self.source_addr, ADDR_LEN, "source_addr")?;
        buf.put_u8(self.dest_addr_ton.into());
        buf.put_u8(self.dest_addr_npi.into());
        encode_cstring(buf, &self.destination_addr, ADDR_LEN, "destination_addr")?;
        buf.put_u8(self.esm_class);
        buf.put_u8(self.protocol_id);
        buf.put_u8(self.priority_flag);
        encode_cstring(buf, &self.schedule_delivery_time, TIME_LEN, "schedule_delivery_time")?;
        encode_cstring(buf, &self.validity_period, TIME_LEN, "validity_period")?;
        buf.put_u8(self.registered_delivery);
        buf.put_u8(self.replace_if_present_flag);
        buf.put_u8(self.data_coding);
        buf.put_u8(self.sm_default_msg_id);
        buf.put_u8(sm_length);
        buf.put_slice(&self.short_message);
        for tlv in &self.tlvs {
            tlv.encode(buf)?;
        }
        Ok(())
    }

    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let body_end = buf.position() + header.body_len() as u64;

        let service_type = decode_cstring(buf, SERVICE_TYPE_LEN, "service_type")?;
        let source_addr_ton = TypeOfNumber::from(decode_u8(buf)?);
        let source_addr_npi = NumericPlanIndicator::from(decode_u8(buf)?);
        let source_addr = decode_cstring(buf, ADDR_LEN, "source_addr")?;
        let dest_addr_ton = TypeOfNumber::from(decode_u8(buf)?);
        let dest_addr_npi = NumericPlanIndicator::from(decode_u8(buf)?);
        let destination_addr = decode_cstring(buf, ADDR_LEN, "destination_addr")?;
        let esm_class = decode_u8(buf)?;
        let protocol_id = decode_u8(buf)?;
        let priority_flag = decode_u8(buf)?;
        let schedule_delivery_time = decode_cstring(buf, TIME_LEN, "schedule_delivery_time")?;
        let validity_period = decode_cstring(buf, TIME_LEN, "validity_period")?;
        let registered_delivery = decode_u8(buf)?;
        let replace_if_present_flag = decode_u8(buf)?;
        let data_coding = decode_u8(buf)?;
        let sm_default_msg_id = decode_u8(buf)?;
        let sm_length = decode_u8(buf)? as usize;
        if buf.remaining() < sm_length {
            return Err(CodecError::Incomplete);
        }
        let short_message = buf.copy_to_bytes(sm_length);
        let tlvs = decode_tlvs(buf, body_end)?;

        Ok(Self {
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            protocol_id,
            priority_flag,
            schedule_delivery_time,
            validity_period,
            registered_delivery,
            replace_if_present_flag,
            data_coding,
            sm_default_msg_id,
            short_message,
            tlvs,
        })
    }
}

/// submit_sm: ESME to SMSC short message submission
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSm {
    pub sequence_number: u32,
    pub body: MessageBody,
}

impl SubmitSm {
    pub fn new(sequence_number: u32, body: MessageBody) -> Self {
        Self {
            sequence_number,
            body,
        }
    }
}

impl Encodable for SubmitSm {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        PduHeader::outgoing(CommandId::SubmitSm, CommandStatus::Ok, self.sequence_number)
            .encode(buf);
        self.body.encode(buf)
    }
}

impl Decodable for SubmitSm {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::SubmitSm])?;
        Ok(Self {
            sequence_number: header.sequence_number,
            body: MessageBody::decode(&header, buf)?,
        })
    }
}

/// submit_sm_resp carrying the SMSC-assigned message id
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
    pub message_id: String,
}

impl SubmitSmResponse {
    pub fn ok(sequence_number: u32, message_id: impl Into<String>) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            message_id: message_id.into(),
        }
    }

    pub fn error(sequence_number: u32, status: CommandStatus) -> Self {
        Self {
            command_status: status,
            sequence_number,
            message_id: String::new(),
        }
    }
}

impl Encodable for SubmitSmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        PduHeader::outgoing(CommandId::SubmitSmResp, self.command_status, self.sequence_number)
            .encode(buf);
        encode_cstring(buf, &self.message_id, MESSAGE_ID_LEN, "message_id")
    }
}

impl Decodable for SubmitSmResponse {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::SubmitSmResp])?;
        // Error responses frequently arrive without a body
        let message_id = if header.body_len() == 0 {
            String::new()
        } else {
            decode_cstring(buf, MESSAGE_ID_LEN, "message_id")?
        };
        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
        })
    }
}

/// deliver_sm: SMSC to ESME mobile-originated message or delivery receipt
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSm {
    pub sequence_number: u32,
    pub body: MessageBody,
}

impl DeliverSm {
    pub fn new(sequence_number: u32, body: MessageBody) -> Self {
        Self {
            sequence_number,
            body,
        }
    }
}

impl Encodable for DeliverSm {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        PduHeader::outgoing(CommandId::DeliverSm, CommandStatus::Ok, self.sequence_number)
            .encode(buf);
        self.body.encode(buf)
    }
}

impl Decodable for DeliverSm {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::DeliverSm])?;
        Ok(Self {
            sequence_number: header.sequence_number,
            body: MessageBody::decode(&header, buf)?,
        })
    }
}

/// deliver_sm_resp. The message_id field is unused and always NULL.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl DeliverSmResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
        }
    }
}

impl Encodable for DeliverSmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        PduHeader::outgoing(CommandId::DeliverSmResp, self.command_status, self.sequence_number)
            .encode(buf);
        buf.put_u8(0);
        Ok(())
    }
}

impl Decodable for DeliverSmResponse {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        expect_command(&header, &[CommandId::DeliverSmResp])?;
        if header.body_len() > 0 {
            decode_cstring(buf, MESSAGE_ID_LEN, "message_id")?;
        }
        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
        })
    }
}
