use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeResult, OspfError};

pub const SUMMARY_LSA_TYPE_3: u8 = 3;
pub const SUMMARY_LSA_TYPE_4: u8 = 4;

/// Summary-LSA body. Type 3 describes a network, type 4 an ASBR, in which
/// case the mask is zero. Deprecated TOS entries are skipped on decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SummaryLSA {
    pub network_mask: u32,
    pub metric: u32,
}

impl SummaryLSA {
    pub fn length(&self) -> usize {
        8
    }
    pub fn try_from_be_bytes(payload: &[u8]) -> DecodeResult<Self> {
        if payload.len() < 8 || payload.len() % 4 != 0 {
            return Err(OspfError::InvalidBodyLength {
                lsa_type: SUMMARY_LSA_TYPE_3,
                body_len: payload.len(),
            });
        }
        let mut buf = payload;
        let network_mask = buf.get_u32();
        let metric = buf.get_u32() & 0x00ff_ffff;
        Ok(Self {
            network_mask,
            metric,
        })
    }
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.network_mask);
        buf.put_u32(self.metric.min(crate::lsa::LSInfinity));
    }
}
