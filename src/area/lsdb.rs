use std::collections::BTreeMap;

use crate::error::{DecodeResult, OspfError};
use crate::lsa::{Header, Lsa};
use crate::timer::SpfTime;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct LsaIdentifier {
    pub lsa_type: u32,
    pub link_state_id: u32,
    pub advertising_router: u32,
}

impl LsaIdentifier {
    pub fn from_header(lsa_header: &Header) -> Self {
        Self {
            lsa_type: lsa_header.lsa_type as u32,
            link_state_id: lsa_header.link_state_id,
            advertising_router: lsa_header.advertising_router,
        }
    }
    pub fn to_be_bytes(&self) -> [u8; 12] {
        let mut bytes = [0; 12];
        bytes[0..4].copy_from_slice(&self.lsa_type.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.link_state_id.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.advertising_router.to_be_bytes());
        bytes
    }
    pub fn length() -> usize {
        12
    }
    pub fn try_from_be_bytes(bytes: &[u8]) -> DecodeResult<Self> {
        if bytes.len() < Self::length() {
            return Err(OspfError::Truncated {
                needed: Self::length(),
                available: bytes.len(),
            });
        }
        let lsa_type = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let link_state_id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let advertising_router = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        Ok(Self {
            lsa_type,
            link_state_id,
            advertising_router,
        })
    }
}

impl std::fmt::Display for LsaIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type {} id {} adv {}",
            self.lsa_type,
            crate::util::fmt_id(self.link_state_id),
            crate::util::fmt_id(self.advertising_router)
        )
    }
}

/// Stable handle into an `LsaDb`. A handle goes stale once its lsa is
/// superseded or removed; lookups through a stale handle return nothing.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct LsaHandle {
    index: usize,
    generation: u32,
}

pub struct LsdbEntry {
    pub lsa: Lsa,
    pub installed_at: SpfTime,
    pub self_originated: bool,
    /// premature-aged or expired, waiting for acknowledgments before removal.
    pub flushing: bool,
}

struct Slot {
    generation: u32,
    entry: Option<LsdbEntry>,
}

/// # LsaDb
/// one link state database, either an area's or the AS-scope one.
/// records live in an arena; `index` maps the lsa key to its current handle.
#[derive(Default)]
pub struct LsaDb {
    slots: Vec<Slot>,
    free: Vec<usize>,
    index: BTreeMap<LsaIdentifier, LsaHandle>,
}

impl LsaDb {
    pub fn empty() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
    pub fn lookup(&self, lsa_id: &LsaIdentifier) -> Option<LsaHandle> {
        self.index.get(lsa_id).copied()
    }
    pub fn contains_lsa(&self, lsa_id: &LsaIdentifier) -> bool {
        self.index.contains_key(lsa_id)
    }
    pub fn get(&self, handle: LsaHandle) -> Option<&LsdbEntry> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }
    pub fn get_mut(&mut self, handle: LsaHandle) -> Option<&mut LsdbEntry> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }
    pub fn fetch_lsa(&self, lsa_id: &LsaIdentifier) -> Option<&Lsa> {
        self.lookup(lsa_id)
            .and_then(|handle| self.get(handle))
            .map(|entry| &entry.lsa)
    }
    pub fn fetch_entry(&self, lsa_id: &LsaIdentifier) -> Option<&LsdbEntry> {
        self.lookup(lsa_id).and_then(|handle| self.get(handle))
    }
    pub fn fetch_entry_mut(&mut self, lsa_id: &LsaIdentifier) -> Option<&mut LsdbEntry> {
        let handle = self.lookup(lsa_id)?;
        self.get_mut(handle)
    }

    /// Installs `lsa`, superseding and returning any stored instance.
    pub fn install(
        &mut self,
        lsa: Lsa,
        now: SpfTime,
        self_originated: bool,
    ) -> (LsaHandle, Option<LsdbEntry>) {
        let lsa_id = LsaIdentifier::from_header(&lsa.header);
        let old = self.remove_lsa(&lsa_id);
        let entry = LsdbEntry {
            lsa,
            installed_at: now,
            self_originated,
            flushing: false,
        };
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.entry = Some(entry);
                LsaHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                LsaHandle {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        self.index.insert(lsa_id, handle);
        (handle, old)
    }

    pub fn remove_lsa(&mut self, lsa_id: &LsaIdentifier) -> Option<LsdbEntry> {
        let handle = self.index.remove(lsa_id)?;
        let slot = &mut self.slots[handle.index];
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        entry
    }

    /// entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (LsaIdentifier, &LsdbEntry)> + '_ {
        self.index
            .iter()
            .filter_map(move |(lsa_id, handle)| self.get(*handle).map(|entry| (*lsa_id, entry)))
    }

    pub fn identifiers(&self) -> Vec<LsaIdentifier> {
        self.index.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::summary::SummaryLSA;
    use crate::lsa::{LsaBody, InitialSequenceNumber};

    fn summary(seq: i32, metric: u32) -> Lsa {
        Lsa::new(
            Header::new(0, 0, 3, 0x0a000000, 0x01010101, seq),
            LsaBody::SummaryNetwork(SummaryLSA {
                network_mask: 0xffffff00,
                metric,
            }),
        )
    }

    #[test]
    fn install_supersedes_and_stales_handle() {
        let mut lsdb = LsaDb::empty();
        let (first, old) = lsdb.install(summary(InitialSequenceNumber, 1), SpfTime::ZERO, false);
        assert!(old.is_none());
        let (second, old) = lsdb.install(summary(InitialSequenceNumber + 1, 2), SpfTime::ZERO, false);
        assert_eq!(old.map(|e| e.lsa.header.sequence_number), Some(InitialSequenceNumber));
        assert_eq!(lsdb.len(), 1);
        assert!(lsdb.get(first).is_none());
        assert_eq!(
            lsdb.get(second).map(|e| e.lsa.header.sequence_number),
            Some(InitialSequenceNumber + 1)
        );
    }

    #[test]
    fn remove_frees_key() {
        let mut lsdb = LsaDb::empty();
        let lsa = summary(InitialSequenceNumber, 1);
        let lsa_id = LsaIdentifier::from_header(&lsa.header);
        lsdb.install(lsa, SpfTime::ZERO, true);
        assert!(lsdb.contains_lsa(&lsa_id));
        assert!(lsdb.remove_lsa(&lsa_id).unwrap().self_originated);
        assert!(lsdb.fetch_lsa(&lsa_id).is_none());
        assert!(lsdb.is_empty());
    }

    #[test]
    fn identifier_round_trip() {
        let lsa_id = LsaIdentifier {
            lsa_type: 11,
            link_state_id: 0xc8000000,
            advertising_router: 0x01020304,
        };
        assert_eq!(LsaIdentifier::try_from_be_bytes(&lsa_id.to_be_bytes()), Ok(lsa_id));
        assert!(LsaIdentifier::try_from_be_bytes(&[0; 11]).is_err());
    }
}
