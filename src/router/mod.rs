//! The engine context. Every protocol operation goes through a `Router`
//! value; nothing lives in process-wide state.

use std::collections::BTreeMap;
use std::net;

use crate::area::lsdb::{LsaDb, LsaIdentifier};
use crate::area::{Area, Scope};
use crate::config::RouterConfig;
use crate::error::OspfError;
use crate::interface::Interface;
use crate::lsa::LsaBody;
use crate::neighbor::{status::Status, Neighbor};
use crate::overlay::OverlayDb;
use crate::packet::Output;
use crate::rtable::RouteTable;
use crate::timer::{SpfTime, TimerId, TimerKind, TimerQueue, SECOND};
use crate::util::{bits_to_ipv4_addr, ipv4_addr_to_bits};

pub mod event;
mod flood;
mod originate;
mod route;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerAction {
    AgeTick,
    Retransmit { ifindex: u32, neighbor: net::Ipv4Addr },
    RunSpf,
    Shutdown,
}

/// What happened to a received lsa.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// newer than the stored copy: installed and flooded to this many adjacencies.
    Installed { flooded: usize },
    /// same instance as the stored one: acknowledged, not flooded.
    Duplicate,
    /// older than the stored one: the stored copy went back to the sender.
    Older,
    /// MaxAge with no stored instance: acknowledged and dropped.
    Dropped,
    /// arrived within MinLSArrival of the stored copy.
    TooSoon,
    /// a newer instance of one of our own lsas: superseded or flushed.
    SelfOriginated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub overlay_dijkstras: u64,
    pub spf_runs: u64,
    pub lsas_received: u64,
    pub lsas_rejected: u64,
    pub lsas_originated: u64,
    pub lsas_flushed: u64,
}

pub struct Router {
    config: RouterConfig,
    router_id: u32,
    areas: BTreeMap<net::Ipv4Addr, Area>,
    as_lsdb: LsaDb,
    overlay: OverlayDb,
    rtable: RouteTable,
    interfaces: BTreeMap<u32, Interface>,
    neighbors: BTreeMap<(u32, net::Ipv4Addr), Neighbor>,
    timers: TimerQueue<TimerAction>,
    spf_timer: TimerId,
    shutdown_timer: TimerId,
    outbox: Vec<Output>,
    first_overlay_lsas_sent: bool,
    overflow: bool,
    shutting_down: bool,
    shutdown_expired: bool,
    /// bodies waiting for their MaxSequenceNumber instance to be flushed.
    wrapped: BTreeMap<(Scope, LsaIdentifier), LsaBody>,
    stats: Stats,
}

impl Router {
    pub fn new(config: RouterConfig) -> Result<Self, OspfError> {
        config.validate()?;
        let mut timers = TimerQueue::new(config.random_seed);
        let age_timer = timers.create(TimerKind::Interval, TimerAction::AgeTick);
        timers.start(age_timer, SECOND, false);
        let spf_timer = timers.create(TimerKind::OneShot, TimerAction::RunSpf);
        let shutdown_timer = timers.create(TimerKind::OneShot, TimerAction::Shutdown);
        let mut router = Self {
            router_id: ipv4_addr_to_bits(config.router_id),
            areas: BTreeMap::new(),
            as_lsdb: LsaDb::empty(),
            overlay: OverlayDb::new(),
            rtable: RouteTable::new(),
            interfaces: BTreeMap::new(),
            neighbors: BTreeMap::new(),
            timers,
            spf_timer,
            shutdown_timer,
            outbox: Vec::new(),
            first_overlay_lsas_sent: false,
            overflow: false,
            shutting_down: false,
            shutdown_expired: false,
            wrapped: BTreeMap::new(),
            stats: Stats::default(),
            config,
        };
        for area in &router.config.areas {
            router.areas.insert(area.id, Area::new(area.id, area.stub));
        }
        for interface in &router.config.interfaces {
            router
                .interfaces
                .insert(interface.ifindex, Interface::from_config(interface));
        }
        crate::util::log(&format!(
            "router {} with {} area(s), {} interface(s)",
            router.config.router_id,
            router.areas.len(),
            router.interfaces.len()
        ));
        Ok(router)
    }

    pub fn router_id(&self) -> net::Ipv4Addr {
        bits_to_ipv4_addr(self.router_id)
    }
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
    pub fn area(&self, area_id: net::Ipv4Addr) -> Option<&Area> {
        self.areas.get(&area_id)
    }
    pub fn as_lsdb(&self) -> &LsaDb {
        &self.as_lsdb
    }
    pub fn lsdb(&self, scope: Scope) -> Option<&LsaDb> {
        match scope {
            Scope::Area(area_id) => self.areas.get(&area_id).map(|area| &area.lsdb),
            Scope::As => Some(&self.as_lsdb),
        }
    }
    fn lsdb_mut(&mut self, scope: Scope) -> Option<&mut LsaDb> {
        match scope {
            Scope::Area(area_id) => self.areas.get_mut(&area_id).map(|area| &mut area.lsdb),
            Scope::As => Some(&mut self.as_lsdb),
        }
    }
    fn scopes(&self) -> Vec<Scope> {
        self.areas
            .keys()
            .map(|area_id| Scope::Area(*area_id))
            .chain(std::iter::once(Scope::As))
            .collect()
    }
    pub fn rtable(&self) -> &RouteTable {
        &self.rtable
    }
    pub fn overlay(&self) -> &OverlayDb {
        &self.overlay
    }
    pub fn interface(&self, ifindex: u32) -> Option<&Interface> {
        self.interfaces.get(&ifindex)
    }
    pub fn neighbor(&self, ifindex: u32, neighbor: net::Ipv4Addr) -> Option<&Neighbor> {
        self.neighbors.get(&(ifindex, neighbor))
    }
    pub fn stats(&self) -> Stats {
        self.stats
    }
    pub fn now(&self) -> SpfTime {
        self.timers.now()
    }
    pub fn is_overflowed(&self) -> bool {
        self.overflow
    }
    pub fn first_overlay_lsas_sent(&self) -> bool {
        self.first_overlay_lsas_sent
    }
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Done once every flush has been acknowledged or the shutdown timer ran out.
    pub fn is_finished(&self) -> bool {
        self.shutting_down
            && (self.shutdown_expired
                || self
                    .neighbors
                    .values()
                    .all(|neighbor| neighbor.retransmit_count() == 0))
    }

    /// An ABR has up interfaces in at least two areas.
    pub fn is_abr(&self) -> bool {
        self.areas
            .keys()
            .filter(|area_id| {
                self.interfaces
                    .values()
                    .any(|interface| interface.up && interface.area_id == **area_id)
            })
            .count()
            >= 2
    }

    /// Drains the packets produced since the last call.
    pub fn take_output(&mut self) -> Vec<Output> {
        std::mem::take(&mut self.outbox)
    }

    /// Milliseconds until the next timer fires, `None` when nothing is pending.
    pub fn timeout(&self) -> Option<u32> {
        self.timers.timeout()
    }

    /// Moves the clock forward by `ms`, stopping at every timer that comes
    /// due on the way so work it schedules is timed from its own firing.
    pub fn advance(&mut self, ms: u64) {
        let target = self.timers.now().as_millis() + ms;
        while let Some(wait) = self.timers.timeout() {
            if self.timers.now().as_millis() + wait as u64 > target {
                break;
            }
            self.timers.advance(wait as u64);
            for action in self.timers.tick() {
                self.handle_timer(action);
            }
        }
        self.timers.set_now(SpfTime::from_millis(target));
    }

    fn handle_timer(&mut self, action: TimerAction) {
        match action {
            TimerAction::AgeTick => self.age_tick(),
            TimerAction::Retransmit { ifindex, neighbor } => self.retransmit(ifindex, neighbor),
            TimerAction::RunSpf => self.run_calculations(),
            TimerAction::Shutdown => {
                crate::util::log("shutdown wait expired");
                self.shutdown_expired = true;
            }
        }
    }

    fn schedule_calculation(&mut self) {
        if self.shutting_down || self.timers.is_running(self.spf_timer) {
            return;
        }
        self.timers
            .start(self.spf_timer, self.config.spf_delay_ms, false);
    }

    /// Adjacency state as reported by the neighbor state machine.
    pub fn neighbor_state(
        &mut self,
        ifindex: u32,
        neighbor_id: net::Ipv4Addr,
        addr: net::Ipv4Addr,
        state: Status,
    ) -> Result<(), OspfError> {
        if !self.interfaces.contains_key(&ifindex) {
            return Err(OspfError::UnknownInterface(ifindex));
        }
        let key = (ifindex, neighbor_id);
        if state == Status::Down {
            if let Some(neighbor) = self.neighbors.remove(&key) {
                self.timers.destroy(neighbor.rxmt_timer);
                crate::util::log(&format!("neighbor {} on {} down", neighbor_id, ifindex));
            }
        } else {
            match self.neighbors.get_mut(&key) {
                Some(neighbor) => {
                    if neighbor.state.is_exchanging() && !state.is_exchanging() {
                        neighbor.clear_retransmit();
                        self.timers.stop(neighbor.rxmt_timer);
                    }
                    crate::util::debug(&format!(
                        "neighbor {} on {}: {:?} -> {:?}",
                        neighbor_id, ifindex, neighbor.state, state
                    ));
                    neighbor.state = state;
                    neighbor.ipv4_addr = addr;
                }
                None => {
                    let rxmt_timer = self.timers.create(
                        TimerKind::Interval,
                        TimerAction::Retransmit {
                            ifindex,
                            neighbor: neighbor_id,
                        },
                    );
                    self.neighbors.insert(
                        key,
                        Neighbor::new(neighbor_id, ifindex, addr, state, rxmt_timer),
                    );
                    crate::util::log(&format!(
                        "neighbor {} on {} reached {:?}",
                        neighbor_id, ifindex, state
                    ));
                }
            }
        }
        self.originate_router_lsas();
        self.release_max_age();
        self.schedule_calculation();
        Ok(())
    }

    /// Interface state as reported by the interface state machine.
    pub fn interface_state(&mut self, ifindex: u32, up: bool) -> Result<(), OspfError> {
        let interface = self
            .interfaces
            .get_mut(&ifindex)
            .ok_or(OspfError::UnknownInterface(ifindex))?;
        if interface.up == up {
            return Ok(());
        }
        interface.up = up;
        crate::util::log(&format!(
            "interface {} {}",
            interface.name,
            if up { "up" } else { "down" }
        ));
        if !up {
            self.drop_neighbors(|key| key.0 == ifindex);
        }
        self.originate_router_lsas();
        self.release_max_age();
        self.schedule_calculation();
        Ok(())
    }

    fn drop_neighbors(&mut self, mut doomed: impl FnMut(&(u32, net::Ipv4Addr)) -> bool) {
        let keys: Vec<_> = self.neighbors.keys().copied().filter(|key| doomed(key)).collect();
        for key in keys {
            if let Some(neighbor) = self.neighbors.remove(&key) {
                self.timers.destroy(neighbor.rxmt_timer);
            }
        }
    }

    /// Applies a new configuration. A router id change first withdraws
    /// everything originated under the old id.
    pub fn reconfigure(&mut self, config: RouterConfig) -> Result<(), OspfError> {
        config.validate()?;
        if self.shutting_down {
            return Err(OspfError::ShuttingDown);
        }
        let router_id = ipv4_addr_to_bits(config.router_id);
        if router_id != self.router_id {
            crate::util::log(&format!(
                "router id {} -> {}: withdrawing own lsas",
                self.router_id(),
                config.router_id
            ));
            self.flush_all_self_originated();
            self.first_overlay_lsas_sent = false;
            for entry in self.rtable.entries.values_mut() {
                entry.advertised = false;
                entry.sent_overlay = false;
                entry.overlay_id = None;
                entry.overlay_metric = crate::lsa::LSInfinity;
                entry.changed = true;
            }
            self.router_id = router_id;
        }

        let stale: Vec<u32> = self
            .interfaces
            .values()
            .filter(|interface| match config.interface(interface.ifindex) {
                Some(wanted) => wanted.area_id != interface.area_id || wanted.addr != interface.ip,
                None => true,
            })
            .map(|interface| interface.ifindex)
            .collect();
        for ifindex in &stale {
            self.interfaces.remove(ifindex);
        }
        self.drop_neighbors(|key| stale.contains(&key.0));
        for wanted in &config.interfaces {
            match self.interfaces.get_mut(&wanted.ifindex) {
                Some(interface) => {
                    let up = interface.up;
                    *interface = Interface::from_config(wanted);
                    interface.up = up;
                }
                None => {
                    self.interfaces
                        .insert(wanted.ifindex, Interface::from_config(wanted));
                }
            }
        }

        self.areas
            .retain(|area_id, _| config.areas.iter().any(|area| area.id == *area_id));
        for wanted in &config.areas {
            let area = self
                .areas
                .entry(wanted.id)
                .or_insert_with(|| Area::new(wanted.id, wanted.stub));
            if area.stub != wanted.stub {
                area.stub = wanted.stub;
                area.spf_pending = true;
            }
        }
        for area in self.areas.values_mut() {
            area.spf_pending = true;
        }
        self.config = config;
        self.originate_router_lsas();
        self.release_max_age();
        self.schedule_calculation();
        Ok(())
    }

    /// Starts the orderly withdrawal: every own lsa is flushed and no new
    /// work is scheduled. `is_finished` turns true once the flushes are
    /// acknowledged or the shutdown timer expires.
    pub fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        crate::util::log("shutting down: flushing self-originated lsas");
        self.flush_all_self_originated();
        self.shutting_down = true;
        self.timers.stop(self.spf_timer);
        self.timers
            .start(self.shutdown_timer, self.config.shutdown_wait * SECOND, false);
    }

    pub fn show_lsdb(&self) -> String {
        let mut lines = Vec::new();
        for scope in self.scopes() {
            let Some(lsdb) = self.lsdb(scope) else {
                continue;
            };
            lines.push(format!("{} ({} lsas)", scope, lsdb.len()));
            for (lsa_id, entry) in lsdb.iter() {
                lines.push(format!(
                    "  {:<40} seq {:#010x} age {:>4}{}{}",
                    lsa_id.to_string(),
                    entry.lsa.header.sequence_number as u32,
                    entry.lsa.header.age,
                    if entry.self_originated { " self" } else { "" },
                    if entry.flushing { " flushing" } else { "" }
                ));
            }
        }
        lines.join("\n")
    }

    pub fn show_routes(&self) -> String {
        self.rtable
            .entries
            .values()
            .map(|entry| entry.display())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn show_overlay(&self) -> String {
        format!(
            "first overlay lsas sent: {}\n{}",
            self.first_overlay_lsas_sent,
            self.overlay.display(&self.as_lsdb)
        )
    }

    pub fn show_timers(&self) -> String {
        let mut lines = vec![format!(
            "now {}, {} timer(s) pending, next in {}",
            self.timers.now(),
            self.timers.pending(),
            self.timers
                .timeout()
                .map(|ms| format!("{} ms", ms))
                .unwrap_or_else(|| "never".to_string())
        )];
        for neighbor in self.neighbors.values() {
            lines.push(format!(
                "  nbr {} on {}: {:?}, {} to retransmit, rxmt in {:?}",
                neighbor.id,
                neighbor.ifindex,
                neighbor.state,
                neighbor.retransmit_count(),
                self.timers.milliseconds_to_firing(neighbor.rxmt_timer)
            ));
        }
        let stats = self.stats;
        lines.push(format!(
            "spf runs {}, overlay dijkstras {}, lsas received {} rejected {} originated {} flushed {}{}",
            stats.spf_runs,
            stats.overlay_dijkstras,
            stats.lsas_received,
            stats.lsas_rejected,
            stats.lsas_originated,
            stats.lsas_flushed,
            if self.overflow { ", OVERFLOW" } else { "" }
        ));
        lines.join("\n")
    }
}
