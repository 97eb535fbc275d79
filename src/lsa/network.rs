use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeResult, OspfError};

pub const NETWORK_LSA_TYPE: u8 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkLSA {
    pub network_mask: u32,
    pub attached_routers: Vec<u32>,
}

impl NetworkLSA {
    pub fn new(network_mask: u32, attached_routers: Vec<u32>) -> Self {
        Self {
            network_mask,
            attached_routers,
        }
    }
    pub fn length(&self) -> usize {
        4 + 4 * self.attached_routers.len()
    }
    pub fn try_from_be_bytes(payload: &[u8]) -> DecodeResult<Self> {
        if payload.len() < 4 || payload.len() % 4 != 0 {
            return Err(OspfError::InvalidBodyLength {
                lsa_type: NETWORK_LSA_TYPE,
                body_len: payload.len(),
            });
        }
        let mut buf = payload;
        let network_mask = buf.get_u32();
        let mut attached_routers = Vec::with_capacity(buf.remaining() / 4);
        while buf.remaining() >= 4 {
            attached_routers.push(buf.get_u32());
        }
        Ok(Self {
            network_mask,
            attached_routers,
        })
    }
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.network_mask);
        for router in &self.attached_routers {
            buf.put_u32(*router);
        }
    }
}
