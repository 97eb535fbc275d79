pub mod lsack;
pub mod lsu;

use std::net;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeResult, OspfError};

pub const OSPF_PACKET_HEADER_LENGTH: usize = 24;

/// The common ospf packet header. Authentication is always null here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OspfPacketHeader {
    pub version: u8,
    pub packet_type: u8,
    pub packet_length: u16,
    pub router_id: u32,
    pub area_id: u32,
    pub checksum: u16,
    pub auth_type: u16,
    pub authentication: [u8; 8],
}

impl OspfPacketHeader {
    pub fn new(packet_type: u8, router_id: u32, area_id: u32) -> Self {
        Self {
            version: crate::OSPF_VERSION_2,
            packet_type,
            packet_length: OSPF_PACKET_HEADER_LENGTH as u16,
            router_id,
            area_id,
            checksum: 0,
            auth_type: 0,
            authentication: [0; 8],
        }
    }
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.packet_type);
        buf.put_u16(self.packet_length);
        buf.put_u32(self.router_id);
        buf.put_u32(self.area_id);
        buf.put_u16(self.checksum);
        buf.put_u16(self.auth_type);
        buf.put_slice(&self.authentication);
    }
    pub fn length() -> usize {
        OSPF_PACKET_HEADER_LENGTH
    }
    /// Decodes the header and checks that the declared packet length fits `bytes`.
    pub fn try_from_be_bytes(bytes: &[u8]) -> DecodeResult<Self> {
        if bytes.len() < Self::length() {
            return Err(OspfError::Truncated {
                needed: Self::length(),
                available: bytes.len(),
            });
        }
        let mut buf = bytes;
        let mut header = Self {
            version: buf.get_u8(),
            packet_type: buf.get_u8(),
            packet_length: buf.get_u16(),
            router_id: buf.get_u32(),
            area_id: buf.get_u32(),
            checksum: buf.get_u16(),
            auth_type: buf.get_u16(),
            authentication: [0; 8],
        };
        buf.copy_to_slice(&mut header.authentication);
        let declared = header.packet_length as usize;
        if declared < Self::length() {
            return Err(OspfError::LengthTooShort(declared));
        }
        if declared > bytes.len() {
            return Err(OspfError::LengthExceedsBuffer {
                declared,
                available: bytes.len(),
            });
        }
        let computed = checksum_without_field(&bytes[..declared]);
        if computed != header.checksum {
            return Err(OspfError::BadChecksum {
                declared: header.checksum,
                computed,
            });
        }
        Ok(header)
    }
}

fn checksum_without_field(packet: &[u8]) -> u16 {
    let mut copy = packet.to_vec();
    copy[12..14].copy_from_slice(&[0, 0]);
    packet_checksum(&copy)
}

/// Writes the checksum of an encoded packet into its header.
pub fn seal_checksum(packet: &mut [u8]) {
    let checksum = checksum_without_field(packet);
    packet[12..14].copy_from_slice(&checksum.to_be_bytes());
}

/// internet checksum over the packet with the authentication field left out.
pub fn packet_checksum(packet: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for (i, chunk) in packet.chunks(2).enumerate() {
        // bytes 16..24 hold the authentication data
        if (8..12).contains(&i) {
            continue;
        }
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum += word as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

pub trait OspfPacket {
    fn header(&self) -> &OspfPacketHeader;
    fn encode_body(&self, buf: &mut BytesMut);

    /// the whole packet with length and checksum filled in.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(crate::MTU);
        self.header().encode(&mut buf);
        self.encode_body(&mut buf);
        let length = buf.len() as u16;
        buf[2..4].copy_from_slice(&length.to_be_bytes());
        seal_checksum(&mut buf);
        buf.to_vec()
    }
    fn length(&self) -> usize {
        self.to_bytes().len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Update(lsu::Lsu),
    Ack(lsack::LsAck),
}

impl Packet {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Packet::Update(lsu) => lsu.to_bytes(),
            Packet::Ack(ack) => ack.to_bytes(),
        }
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Update(_) => "ls update",
            Packet::Ack(_) => "ls ack",
        }
    }
}

/// A packet the router wants sent; handing it to a socket is the caller's job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub ifindex: u32,
    pub destination: net::Ipv4Addr,
    pub packet: Packet,
}

impl Output {
    pub fn display(&self) -> String {
        let count = match &self.packet {
            Packet::Update(lsu) => lsu.lsas.len(),
            Packet::Ack(ack) => ack.lsa_headers.len(),
        };
        format!(
            "{} to {} on {}: {} lsa(s)",
            self.packet.kind(),
            self.destination,
            self.ifindex,
            count
        )
    }
}
