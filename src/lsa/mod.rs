use std::cmp::Ordering;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeResult, OspfError};

pub mod network;
pub mod opaque;
pub mod router;
pub mod summary;

use network::{NetworkLSA, NETWORK_LSA_TYPE};
use opaque::{OpaqueLSA, OPAQUE_AS_LSA_TYPE};
use router::{RouterLSA, ROUTER_LSA_TYPE};
use summary::{SummaryLSA, SUMMARY_LSA_TYPE_3, SUMMARY_LSA_TYPE_4};

#[allow(non_upper_case_globals)]
pub const LSRefreshTime: u16 = 1800;

#[allow(non_upper_case_globals)]
pub const MinLSArrival: u32 = 1;

#[allow(non_upper_case_globals)]
pub const MaxAge: u16 = 3600;

#[allow(non_upper_case_globals)]
pub const MaxAgeDiff: u16 = 900;
#[allow(non_upper_case_globals)]
pub const LSInfinity: u32 = 0xffffff;
#[allow(non_upper_case_globals)]
pub const InitialSequenceNumber: i32 = 0x80000001u32 as i32;
#[allow(non_upper_case_globals)]
pub const MaxSequenceNumber: i32 = 0x7fffffff;

pub const OPTION_E: u8 = 0x02;
pub const OPTION_O: u8 = 0x40;

/// # Header
/// the common 20 byte lsa header, RFC 2328 layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub age: u16,
    pub options: u8,
    pub lsa_type: u8,
    pub link_state_id: u32,
    pub advertising_router: u32,
    pub sequence_number: i32,
    pub checksum: u16,
    pub length: u16,
}

impl Header {
    pub fn new(
        age: u16,
        options: u8,
        lsa_type: u8,
        link_state_id: u32,
        advertising_router: u32,
        sequence_number: i32,
    ) -> Self {
        Self {
            age,
            options,
            lsa_type,
            link_state_id,
            advertising_router,
            sequence_number,
            checksum: 0,
            length: Self::length() as u16,
        }
    }
    pub fn length() -> usize {
        20
    }
    pub fn try_from_be_bytes(bytes: &[u8]) -> DecodeResult<Self> {
        if bytes.len() < Self::length() {
            return Err(OspfError::Truncated {
                needed: Self::length(),
                available: bytes.len(),
            });
        }
        let mut buf = &bytes[..Self::length()];
        Ok(Self {
            age: buf.get_u16(),
            options: buf.get_u8(),
            lsa_type: buf.get_u8(),
            link_state_id: buf.get_u32(),
            advertising_router: buf.get_u32(),
            sequence_number: buf.get_i32(),
            checksum: buf.get_u16(),
            length: buf.get_u16(),
        })
    }
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.age);
        buf.put_u8(self.options);
        buf.put_u8(self.lsa_type);
        buf.put_u32(self.link_state_id);
        buf.put_u32(self.advertising_router);
        buf.put_i32(self.sequence_number);
        buf.put_u16(self.checksum);
        buf.put_u16(self.length);
    }
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::length());
        self.encode(&mut buf);
        buf.to_vec()
    }
    pub fn is_max_age(&self) -> bool {
        self.age >= MaxAge
    }
}

/// Decides which of two instances of the same lsa is the more recent one.
/// `Greater` means `a` is newer than `b`.
pub fn compare(a: &Header, b: &Header) -> Ordering {
    match a.sequence_number.cmp(&b.sequence_number) {
        Ordering::Equal => {}
        other => return other,
    }
    match a.checksum.cmp(&b.checksum) {
        Ordering::Equal => {}
        other => return other,
    }
    match (a.is_max_age(), b.is_max_age()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    if a.age.abs_diff(b.age) > MaxAgeDiff {
        // the younger instance wins
        return b.age.cmp(&a.age);
    }
    Ordering::Equal
}

/// ISO 8473 fletcher checksum over the lsa minus its age field.
/// `lsa` must start at the age field and hold the whole advertisement.
pub fn fletcher_checksum(lsa: &[u8]) -> u16 {
    const CHECKSUM_OFFSET: usize = 14;
    if lsa.len() < Header::length() {
        return 0;
    }
    let data = &lsa[2..];
    let (mut c0, mut c1) = (0i64, 0i64);
    for (i, byte) in data.iter().enumerate() {
        let byte = if i == CHECKSUM_OFFSET || i == CHECKSUM_OFFSET + 1 {
            0
        } else {
            *byte as i64
        };
        c0 = (c0 + byte) % 255;
        c1 = (c1 + c0) % 255;
    }
    let mut x = ((data.len() - CHECKSUM_OFFSET - 1) as i64 * c0 - c1) % 255;
    if x <= 0 {
        x += 255;
    }
    let mut y = 510 - c0 - x;
    if y > 255 {
        y -= 255;
    }
    ((x as u16) << 8) | (y as u16 & 0xff)
}

/// checksum verification: the fletcher sums over a correct lsa are both zero.
pub fn checksum_is_valid(lsa: &[u8]) -> bool {
    if lsa.len() < Header::length() {
        return false;
    }
    let (mut c0, mut c1) = (0u32, 0u32);
    for byte in &lsa[2..] {
        c0 = (c0 + *byte as u32) % 255;
        c1 = (c1 + c0) % 255;
    }
    c0 == 0 && c1 == 0
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LsaBody {
    Router(RouterLSA),
    Network(NetworkLSA),
    SummaryNetwork(SummaryLSA),
    SummaryRouter(SummaryLSA),
    Opaque(OpaqueLSA),
}

impl LsaBody {
    pub fn lsa_type(&self) -> u8 {
        match self {
            LsaBody::Router(_) => ROUTER_LSA_TYPE,
            LsaBody::Network(_) => NETWORK_LSA_TYPE,
            LsaBody::SummaryNetwork(_) => SUMMARY_LSA_TYPE_3,
            LsaBody::SummaryRouter(_) => SUMMARY_LSA_TYPE_4,
            LsaBody::Opaque(_) => OPAQUE_AS_LSA_TYPE,
        }
    }
    pub fn try_from_be_bytes(header: &Header, body: &[u8]) -> DecodeResult<Self> {
        let result = match header.lsa_type {
            ROUTER_LSA_TYPE => RouterLSA::try_from_be_bytes(body).map(LsaBody::Router),
            NETWORK_LSA_TYPE => NetworkLSA::try_from_be_bytes(body).map(LsaBody::Network),
            SUMMARY_LSA_TYPE_3 => SummaryLSA::try_from_be_bytes(body).map(LsaBody::SummaryNetwork),
            SUMMARY_LSA_TYPE_4 => SummaryLSA::try_from_be_bytes(body).map(LsaBody::SummaryRouter),
            OPAQUE_AS_LSA_TYPE => {
                OpaqueLSA::try_from_be_bytes(header.link_state_id, body).map(LsaBody::Opaque)
            }
            other => return Err(OspfError::UnknownLsaType(other)),
        };
        result.map_err(|err| match err {
            OspfError::Truncated { .. } => OspfError::InvalidBodyLength {
                lsa_type: header.lsa_type,
                body_len: body.len(),
            },
            err => err,
        })
    }
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaBody::Router(lsa) => lsa.encode(buf),
            LsaBody::Network(lsa) => lsa.encode(buf),
            LsaBody::SummaryNetwork(lsa) | LsaBody::SummaryRouter(lsa) => lsa.encode(buf),
            LsaBody::Opaque(lsa) => lsa.encode(buf),
        }
    }
    pub fn as_opaque(&self) -> Option<&OpaqueLSA> {
        match self {
            LsaBody::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }
}

/// A decoded advertisement together with the exact bytes it was built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lsa {
    pub header: Header,
    pub body: LsaBody,
    raw: Bytes,
}

impl Lsa {
    /// builds a fresh instance for origination, filling in length and checksum.
    pub fn new(mut header: Header, body: LsaBody) -> Self {
        header.lsa_type = body.lsa_type();
        let mut buf = BytesMut::with_capacity(Header::length() + 64);
        header.checksum = 0;
        header.encode(&mut buf);
        body.encode(&mut buf);
        header.length = buf.len() as u16;
        buf[18..20].copy_from_slice(&header.length.to_be_bytes());
        header.checksum = fletcher_checksum(&buf);
        buf[16..18].copy_from_slice(&header.checksum.to_be_bytes());
        Self {
            header,
            body,
            raw: buf.freeze(),
        }
    }

    /// Bounds-checked decode of one lsa. Trailing bytes beyond the declared
    /// length are ignored, so a caller walking an update packet can advance
    /// by `header.length`.
    pub fn try_from_be_bytes(data: &[u8]) -> DecodeResult<Self> {
        let header = Header::try_from_be_bytes(data)?;
        let declared = header.length as usize;
        if declared < Header::length() {
            return Err(OspfError::LengthTooShort(declared));
        }
        if declared > data.len() {
            return Err(OspfError::LengthExceedsBuffer {
                declared,
                available: data.len(),
            });
        }
        let raw = &data[..declared];
        if !checksum_is_valid(raw) {
            return Err(OspfError::BadChecksum {
                declared: header.checksum,
                computed: fletcher_checksum(raw),
            });
        }
        let body = LsaBody::try_from_be_bytes(&header, &raw[Header::length()..])?;
        Ok(Self {
            header,
            body,
            raw: Bytes::copy_from_slice(raw),
        })
    }

    /// wire bytes carrying the current age.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut bytes = self.raw.to_vec();
        bytes[0..2].copy_from_slice(&self.header.age.to_be_bytes());
        bytes
    }

    pub fn length(&self) -> usize {
        self.raw.len()
    }

    pub fn set_age(&mut self, age: u16) {
        self.header.age = age.min(MaxAge);
    }

    pub fn is_max_age(&self) -> bool {
        self.header.is_max_age()
    }
}
