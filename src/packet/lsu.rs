use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeResult, OspfError};
use crate::lsa::{Header, Lsa};

use super::{OspfPacket, OspfPacketHeader};

pub const LSU_TYPE: u8 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lsu {
    pub header: OspfPacketHeader,
    pub lsas: Vec<Lsa>,
}

impl OspfPacket for Lsu {
    fn header(&self) -> &OspfPacketHeader {
        &self.header
    }
    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u32(self.lsas.len() as u32);
        for lsa in &self.lsas {
            buf.put_slice(&lsa.to_be_bytes());
        }
    }
}

impl Lsu {
    pub fn new(router_id: u32, area_id: u32, lsas: Vec<Lsa>) -> Self {
        Self {
            header: OspfPacketHeader::new(LSU_TYPE, router_id, area_id),
            lsas,
        }
    }

    /// Splits an update packet into its lsas. A malformed lsa is reported in
    /// place and skipped by its declared length; when that length itself is
    /// unusable the remaining lsas are dropped.
    pub fn split(packet: &[u8]) -> DecodeResult<(OspfPacketHeader, Vec<DecodeResult<Lsa>>)> {
        let header = OspfPacketHeader::try_from_be_bytes(packet)?;
        let mut buf = &packet[OspfPacketHeader::length()..header.packet_length as usize];
        if buf.remaining() < 4 {
            return Err(OspfError::Truncated {
                needed: 4,
                available: buf.remaining(),
            });
        }
        let count = buf.get_u32();
        let mut lsas = Vec::new();
        for _ in 0..count {
            if buf.is_empty() {
                lsas.push(Err(OspfError::Truncated {
                    needed: Header::length(),
                    available: 0,
                }));
                break;
            }
            let result = Lsa::try_from_be_bytes(buf);
            let advance = match (&result, Header::try_from_be_bytes(buf)) {
                (Ok(lsa), _) => Some(lsa.length()),
                (Err(_), Ok(header))
                    if header.length as usize >= Header::length()
                        && header.length as usize <= buf.len() =>
                {
                    Some(header.length as usize)
                }
                _ => None,
            };
            lsas.push(result);
            match advance {
                Some(length) => buf.advance(length),
                None => break,
            }
        }
        Ok((header, lsas))
    }
}
