use std::net;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OspfError {
    #[error("truncated buffer: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("declared length {declared} exceeds buffer of {available} bytes")]
    LengthExceedsBuffer { declared: usize, available: usize },
    #[error("declared length {0} is shorter than the lsa header")]
    LengthTooShort(usize),
    #[error("body of {body_len} bytes is inconsistent with lsa type {lsa_type}")]
    InvalidBodyLength { lsa_type: u8, body_len: usize },
    #[error("checksum mismatch: header says {declared:#06x}, computed {computed:#06x}")]
    BadChecksum { declared: u16, computed: u16 },
    #[error("unknown lsa type {0}")]
    UnknownLsaType(u8),
    #[error("unknown interface {0}")]
    UnknownInterface(u32),
    #[error("unknown neighbor {neighbor} on interface {ifindex}")]
    UnknownNeighbor { ifindex: u32, neighbor: net::Ipv4Addr },
    #[error("neighbor {0} is not exchanging databases")]
    NeighborNotExchanging(net::Ipv4Addr),
    #[error("as-scoped lsa received in stub area {0}")]
    AsScopeInStubArea(net::Ipv4Addr),
    #[error("link state database holds {count} lsas, limit is {limit}")]
    LsdbOverflow { count: usize, limit: usize },
    #[error("router is shutting down")]
    ShuttingDown,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type DecodeResult<T> = Result<T, OspfError>;

impl OspfError {
    /// malformed input from the wire, as opposed to a local state problem.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            OspfError::Truncated { .. }
                | OspfError::LengthExceedsBuffer { .. }
                | OspfError::LengthTooShort(_)
                | OspfError::InvalidBodyLength { .. }
                | OspfError::BadChecksum { .. }
                | OspfError::UnknownLsaType(_)
        )
    }
}
