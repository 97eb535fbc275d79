use bytes::BytesMut;

use crate::error::DecodeResult;
use crate::lsa::Header;

use super::{OspfPacket, OspfPacketHeader};

pub const LSACK_TYPE: u8 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LsAck {
    pub header: OspfPacketHeader,
    pub lsa_headers: Vec<Header>,
}

impl OspfPacket for LsAck {
    fn header(&self) -> &OspfPacketHeader {
        &self.header
    }
    fn encode_body(&self, buf: &mut BytesMut) {
        for lsa_header in &self.lsa_headers {
            lsa_header.encode(buf);
        }
    }
}

impl LsAck {
    pub fn new(router_id: u32, area_id: u32, lsa_headers: Vec<Header>) -> Self {
        Self {
            header: OspfPacketHeader::new(LSACK_TYPE, router_id, area_id),
            lsa_headers,
        }
    }

    pub fn try_from_be_bytes(packet: &[u8]) -> DecodeResult<Self> {
        let header = OspfPacketHeader::try_from_be_bytes(packet)?;
        let body = &packet[OspfPacketHeader::length()..header.packet_length as usize];
        let lsa_headers = body
            .chunks_exact(Header::length())
            .map(Header::try_from_be_bytes)
            .collect::<DecodeResult<Vec<_>>>()?;
        Ok(Self {
            header,
            lsa_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::InitialSequenceNumber;

    #[test]
    fn acks_carry_bare_headers() {
        let lsa_header = Header::new(5, 0, 11, 0xc8000000, 0x02020202, InitialSequenceNumber);
        let ack = LsAck::new(0x01010101, 0, vec![lsa_header, lsa_header]);
        let bytes = ack.to_bytes();
        assert_eq!(bytes.len(), 24 + 40);
        let decoded = LsAck::try_from_be_bytes(&bytes).unwrap();
        assert_eq!(decoded.lsa_headers, vec![lsa_header, lsa_header]);
        assert_eq!(decoded.header.packet_length, 64);
    }
}
