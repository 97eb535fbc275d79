//! AS-scope Opaque-LSAs and the three overlay payloads carried in them.
//!
//! The link-state ID of an opaque lsa is `opaque type << 24 | opaque id`.
//! Opaque types outside the overlay set are kept as raw payload and flooded
//! without being interpreted.
//!
//! ```text
//! ABR-LSA body, repeated:      Prefix-LSA body:           ASBR-LSA body:
//! +----------------------+     +------------------+       +------------------+
//! | neighbor router id   |     | subnet mask      |       | dest router id   |
//! +------+---------------+     +------------------+       +------------------+
//! |metric|                     | subnet address   |       | metric           |
//! +------+                     +------------------+       +------------------+
//!                              | metric           |
//!                              +------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeResult, OspfError};

pub const OPAQUE_AS_LSA_TYPE: u8 = 11;

pub const OPQ_T_MULTI_ABR: u8 = 200;
pub const OPQ_T_MULTI_PREFIX: u8 = 201;
pub const OPQ_T_MULTI_ASBR: u8 = 202;

/// the widest metric an ABR-LSA entry can carry.
pub const ABR_METRIC_MAX: u32 = 0xff;

const ABR_ENTRY_LENGTH: usize = 5;
const PREFIX_LENGTH: usize = 12;
const ASBR_LENGTH: usize = 8;

pub const fn opaque_type(link_state_id: u32) -> u8 {
    (link_state_id >> 24) as u8
}

pub const fn opaque_id(link_state_id: u32) -> u32 {
    link_state_id & 0x00ff_ffff
}

pub const fn opaque_lsid(opaque_type: u8, opaque_id: u32) -> u32 {
    (opaque_type as u32) << 24 | (opaque_id & 0x00ff_ffff)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AbrEntry {
    pub neighbor: u32,
    pub metric: u8,
}

/// One per originating ABR: the overlay neighbors and the intra-area cost to each.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AbrLSA {
    pub entries: Vec<AbrEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefixLSA {
    pub subnet_mask: u32,
    pub subnet_addr: u32,
    pub metric: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsbrLSA {
    pub dest_router: u32,
    pub metric: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpaqueLSA {
    Abr(AbrLSA),
    Prefix(PrefixLSA),
    Asbr(AsbrLSA),
    Generic(Bytes),
}

impl AbrLSA {
    /// clamps a cost into the 8-bit metric field.
    pub fn clamp_metric(cost: u32) -> u8 {
        cost.min(ABR_METRIC_MAX) as u8
    }
    fn decode(payload: &[u8]) -> DecodeResult<Self> {
        if payload.len() % ABR_ENTRY_LENGTH != 0 {
            return Err(OspfError::InvalidBodyLength {
                lsa_type: OPAQUE_AS_LSA_TYPE,
                body_len: payload.len(),
            });
        }
        let mut buf = payload;
        let mut entries = Vec::with_capacity(payload.len() / ABR_ENTRY_LENGTH);
        while buf.remaining() >= ABR_ENTRY_LENGTH {
            entries.push(AbrEntry {
                neighbor: buf.get_u32(),
                metric: buf.get_u8(),
            });
        }
        Ok(Self { entries })
    }
    fn encode(&self, buf: &mut BytesMut) {
        for entry in &self.entries {
            buf.put_u32(entry.neighbor);
            buf.put_u8(entry.metric);
        }
    }
}

impl PrefixLSA {
    fn decode(payload: &[u8]) -> DecodeResult<Self> {
        if payload.len() != PREFIX_LENGTH {
            return Err(OspfError::InvalidBodyLength {
                lsa_type: OPAQUE_AS_LSA_TYPE,
                body_len: payload.len(),
            });
        }
        let mut buf = payload;
        Ok(Self {
            subnet_mask: buf.get_u32(),
            subnet_addr: buf.get_u32(),
            metric: buf.get_u32(),
        })
    }
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.subnet_mask);
        buf.put_u32(self.subnet_addr);
        buf.put_u32(self.metric);
    }
}

impl AsbrLSA {
    fn decode(payload: &[u8]) -> DecodeResult<Self> {
        if payload.len() != ASBR_LENGTH {
            return Err(OspfError::InvalidBodyLength {
                lsa_type: OPAQUE_AS_LSA_TYPE,
                body_len: payload.len(),
            });
        }
        let mut buf = payload;
        Ok(Self {
            dest_router: buf.get_u32(),
            metric: buf.get_u32(),
        })
    }
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.dest_router);
        buf.put_u32(self.metric);
    }
}

impl OpaqueLSA {
    pub fn try_from_be_bytes(link_state_id: u32, payload: &[u8]) -> DecodeResult<Self> {
        match opaque_type(link_state_id) {
            OPQ_T_MULTI_ABR => AbrLSA::decode(payload).map(OpaqueLSA::Abr),
            OPQ_T_MULTI_PREFIX => PrefixLSA::decode(payload).map(OpaqueLSA::Prefix),
            OPQ_T_MULTI_ASBR => AsbrLSA::decode(payload).map(OpaqueLSA::Asbr),
            _ => Ok(OpaqueLSA::Generic(Bytes::copy_from_slice(payload))),
        }
    }
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            OpaqueLSA::Abr(abr) => abr.encode(buf),
            OpaqueLSA::Prefix(prefix) => prefix.encode(buf),
            OpaqueLSA::Asbr(asbr) => asbr.encode(buf),
            OpaqueLSA::Generic(data) => buf.put_slice(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::{Header, Lsa, LsaBody, InitialSequenceNumber};

    #[test]
    fn abr_body_layout() {
        let abr = AbrLSA {
            entries: vec![
                AbrEntry { neighbor: 0x02020202, metric: 10 },
                AbrEntry { neighbor: 0x03030303, metric: 255 },
            ],
        };
        let mut buf = BytesMut::new();
        abr.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[2, 2, 2, 2, 10, 3, 3, 3, 3, 255]
        );
        assert_eq!(AbrLSA::decode(&buf).unwrap(), abr);
        assert!(AbrLSA::decode(&buf[..7]).is_err());
        assert_eq!(AbrLSA::clamp_metric(300), 255);
    }

    #[test]
    fn prefix_lsa_through_generic_decoder() {
        let lsid = opaque_lsid(OPQ_T_MULTI_PREFIX, 7);
        let lsa = Lsa::new(
            Header::new(0, 0, OPAQUE_AS_LSA_TYPE, lsid, 0x01010101, InitialSequenceNumber),
            LsaBody::Opaque(OpaqueLSA::Prefix(PrefixLSA {
                subnet_mask: 0xffffff00,
                subnet_addr: 0x0a000000,
                metric: 3,
            })),
        );
        assert_eq!(lsa.header.length, 32);
        let decoded = Lsa::try_from_be_bytes(&lsa.to_be_bytes()).unwrap();
        assert_eq!(decoded.body, lsa.body);
        assert_eq!(opaque_type(decoded.header.link_state_id), OPQ_T_MULTI_PREFIX);
        assert_eq!(opaque_id(decoded.header.link_state_id), 7);
    }

    #[test]
    fn asbr_length_must_match() {
        assert!(AsbrLSA::decode(&[0; 4]).is_err());
        assert!(AsbrLSA::decode(&[0; 12]).is_err());
        let asbr = AsbrLSA::decode(&[9, 9, 9, 9, 0, 0, 0, 4]).unwrap();
        assert_eq!(asbr.dest_router, 0x09090909);
        assert_eq!(asbr.metric, 4);
    }

    #[test]
    fn unknown_opaque_type_is_kept_raw() {
        let body = OpaqueLSA::try_from_be_bytes(opaque_lsid(1, 0), &[1, 2, 3]).unwrap();
        assert_eq!(body, OpaqueLSA::Generic(Bytes::from_static(&[1, 2, 3])));
    }
}
