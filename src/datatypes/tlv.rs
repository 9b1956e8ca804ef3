use crate::codec::{CodecError, decode_u16};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

/// Optional parameter tags used by the gateway (SMPP v3.4 Section 5.3.2)
pub mod tags {
    pub const SC_INTERFACE_VERSION: u16 = 0x0210;
    pub const RECEIPTED_MESSAGE_ID: u16 = 0x001E;
    pub const USER_MESSAGE_REFERENCE: u16 = 0x0204;
    pub const SAR_MSG_REF_NUM: u16 = 0x020C;
    pub const SAR_TOTAL_SEGMENTS: u16 = 0x020E;
    pub const SAR_SEGMENT_SEQNUM: u16 = 0x020F;
    pub const NETWORK_ERROR_CODE: u16 = 0x0423;
    pub const MESSAGE_PAYLOAD: u16 = 0x0424;
    pub const MESSAGE_STATE: u16 = 0x0427;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tlv {
    /// The Tag field is used to uniquely identify the particular optional parameter in question.
    pub tag: u16,

    /// The Value field contains the actual data for the optional parameter in question.
    /// Its length is written on the wire as the Length field.
    pub value: Bytes,
}

impl Tlv {
    pub fn new(tag: u16, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    pub fn u8(tag: u16, value: u8) -> Self {
        Self::new(tag, vec![value])
    }

    pub fn u16(tag: u16, value: u16) -> Self {
        Self::new(tag, value.to_be_bytes().to_vec())
    }

    /// C-Octet string value (NUL terminated on the wire)
    pub fn cstring(tag: u16, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        Self::new(tag, bytes)
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.value.first().copied()
    }

    pub fn as_u16(&self) -> Option<u16> {
        (self.value.len() >= 2).then(|| u16::from_be_bytes([self.value[0], self.value[1]]))
    }

    /// Value read as a string, stopping at the first NUL
    pub fn as_str(&self) -> Option<String> {
        let end = self
            .value
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.value.len());
        String::from_utf8(self.value[..end].to_vec()).ok()
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let length = u16::try_from(self.value.len())
            .map_err(|_| CodecError::TlvError(format!("tag {:#06x} value too long", self.tag)))?;
        buf.put_u16(self.tag);
        buf.put_u16(length);
        buf.put_slice(&self.value);
        Ok(())
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let tag = decode_u16(buf)?;
        let length = decode_u16(buf)? as usize;
        if buf.remaining() < length {
            return Err(CodecError::TlvError(format!(
                "tag {tag:#06x} declares {length} octets, {} available",
                buf.remaining()
            )));
        }
        Ok(Self {
            tag,
            value: buf.copy_to_bytes(length),
        })
    }
}

/// Look up a TLV by tag
pub fn find_tlv(tlvs: &[Tlv], tag: u16) -> Option<&Tlv> {
    tlvs.iter().find(|tlv| tlv.tag == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        assert_eq!(Tlv::u8(tags::MESSAGE_STATE, 2).as_u8(), Some(2));
        assert_eq!(Tlv::u16(tags::SAR_MSG_REF_NUM, 0x1234).as_u16(), Some(0x1234));
        assert_eq!(
            Tlv::cstring(tags::RECEIPTED_MESSAGE_ID, "abc123").as_str().as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn truncated_value_is_an_error() {
        let data: &[u8] = &[0x04, 0x27, 0x00, 0x05, 0x01];
        let mut cursor = Cursor::new(data);
        assert!(matches!(Tlv::decode(&mut cursor), Err(CodecError::TlvError(_))));
    }
}
