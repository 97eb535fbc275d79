use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeResult, OspfError};

pub const ROUTER_LSA_TYPE: u8 = 1;

pub const LS_ID_POINT_TO_POINT: u8 = 1;
pub const LS_ID_TRANSIT: u8 = 2;
pub const LS_ID_STUB: u8 = 3;
pub const LS_ID_VIRTUAL_LINK: u8 = 4;

pub const ROUTER_FLAG_B: u8 = 0x01;
pub const ROUTER_FLAG_E: u8 = 0x02;
pub const ROUTER_FLAG_V: u8 = 0x04;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterLSA {
    pub veb: u8,
    pub link_states: Vec<LinkState>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkState {
    pub link_id: u32,
    pub link_data: u32,
    pub ls_type: u8,
    pub metric: u16,
    pub tos: Vec<u32>,
}

impl LinkState {
    pub fn new(ls_type: u8, link_id: u32, link_data: u32, metric: u16) -> Self {
        Self {
            link_id,
            link_data,
            ls_type,
            metric,
            tos: Vec::new(),
        }
    }
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.link_id);
        buf.put_u32(self.link_data);
        buf.put_u8(self.ls_type);
        buf.put_u8(self.tos.len() as u8);
        buf.put_u16(self.metric);
        for tos in &self.tos {
            buf.put_u32(*tos);
        }
    }

    // the pass tos is host endian
    pub fn tos_type(tos: u32) -> u8 {
        (tos >> 24) as u8
    }
    pub fn tos_metric(tos: u32) -> u16 {
        (tos & 0x0000ffff) as u16
    }
    pub fn length(&self) -> usize {
        12 + self.tos.len() * 4
    }
    fn decode(buf: &mut &[u8]) -> DecodeResult<Self> {
        if buf.remaining() < 12 {
            return Err(OspfError::Truncated {
                needed: 12,
                available: buf.remaining(),
            });
        }
        let link_id = buf.get_u32();
        let link_data = buf.get_u32();
        let ls_type = buf.get_u8();
        let tos_count = buf.get_u8() as usize;
        let metric = buf.get_u16();
        if buf.remaining() < tos_count * 4 {
            return Err(OspfError::Truncated {
                needed: tos_count * 4,
                available: buf.remaining(),
            });
        }
        let tos = (0..tos_count).map(|_| buf.get_u32()).collect();
        Ok(Self {
            link_id,
            link_data,
            ls_type,
            metric,
            tos,
        })
    }
}

impl RouterLSA {
    pub fn is_abr(&self) -> bool {
        self.veb & ROUTER_FLAG_B != 0
    }
    pub fn is_asbr(&self) -> bool {
        self.veb & ROUTER_FLAG_E != 0
    }
    pub fn try_from_be_bytes(payload: &[u8]) -> DecodeResult<Self> {
        if payload.len() < 4 {
            return Err(OspfError::InvalidBodyLength {
                lsa_type: ROUTER_LSA_TYPE,
                body_len: payload.len(),
            });
        }
        let mut buf = payload;
        let veb = buf.get_u8();
        let _ = buf.get_u8();
        let link_count = buf.get_u16();
        let mut link_states = Vec::with_capacity((link_count as usize).min(buf.remaining() / 12));
        for _ in 0..link_count {
            link_states.push(LinkState::decode(&mut buf)?);
        }
        if buf.has_remaining() {
            return Err(OspfError::InvalidBodyLength {
                lsa_type: ROUTER_LSA_TYPE,
                body_len: payload.len(),
            });
        }
        Ok(Self { veb, link_states })
    }
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.veb);
        buf.put_u8(0);
        buf.put_u16(self.link_states.len() as u16);
        for link_state in &self.link_states {
            link_state.encode(buf);
        }
    }
    pub fn length(&self) -> usize {
        4 + self
            .link_states
            .iter()
            .map(|link_state| link_state.length())
            .sum::<usize>()
    }
}
