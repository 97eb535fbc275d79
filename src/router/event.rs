//! The single-threaded event loop around a `Router`: inputs arrive on a
//! channel, timers are driven from the queue's next deadline, and every
//! packet the router produces is handed to the output channel.

use std::net;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration, Instant};

use crate::config::RouterConfig;
use crate::neighbor::status::Status;
use crate::packet::Output;

use super::Router;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShowKind {
    Lsdb,
    Routes,
    Overlay,
    Timers,
}

impl std::str::FromStr for ShowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lsdb" => Ok(ShowKind::Lsdb),
            "routes" | "route" => Ok(ShowKind::Routes),
            "overlay" => Ok(ShowKind::Overlay),
            "timers" | "stats" => Ok(ShowKind::Timers),
            other => Err(format!("nothing to show called '{}'", other)),
        }
    }
}

#[derive(Debug)]
pub enum Event {
    /// a single encoded lsa
    LsaReceived {
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        data: Vec<u8>,
    },
    /// a whole link state update packet
    UpdateReceived {
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        packet: Vec<u8>,
    },
    /// concatenated lsa headers being acknowledged
    AckReceived {
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        headers: Vec<u8>,
    },
    NeighborChange {
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        addr: net::Ipv4Addr,
        state: Status,
    },
    InterfaceChange {
        ifindex: u32,
        up: bool,
    },
    Reconfigure(RouterConfig),
    Show(ShowKind, oneshot::Sender<String>),
    Shutdown,
}

impl Router {
    pub fn handle_event(&mut self, event: Event) {
        let result = match event {
            Event::LsaReceived {
                ifindex,
                neighbor,
                data,
            } => self.receive_lsa(ifindex, neighbor, &data).map(|acceptance| {
                crate::util::debug(&format!("lsa from {}: {:?}", neighbor, acceptance));
            }),
            Event::UpdateReceived {
                ifindex,
                neighbor,
                packet,
            } => self.receive_update(ifindex, neighbor, &packet).map(|results| {
                crate::util::debug(&format!(
                    "update from {}: {} lsa(s), {} rejected",
                    neighbor,
                    results.len(),
                    results.iter().filter(|result| result.is_err()).count()
                ));
            }),
            Event::AckReceived {
                ifindex,
                neighbor,
                headers,
            } => self.receive_ack_bytes(ifindex, neighbor, &headers).map(|released| {
                crate::util::debug(&format!("ack from {} released {}", neighbor, released));
            }),
            Event::NeighborChange {
                ifindex,
                neighbor,
                addr,
                state,
            } => self.neighbor_state(ifindex, neighbor, addr, state),
            Event::InterfaceChange { ifindex, up } => self.interface_state(ifindex, up),
            Event::Reconfigure(config) => self.reconfigure(config),
            Event::Show(kind, reply) => {
                let text = match kind {
                    ShowKind::Lsdb => self.show_lsdb(),
                    ShowKind::Routes => self.show_routes(),
                    ShowKind::Overlay => self.show_overlay(),
                    ShowKind::Timers => self.show_timers(),
                };
                // the asker may have given up waiting
                let _ = reply.send(text);
                Ok(())
            }
            Event::Shutdown => {
                self.shutdown();
                Ok(())
            }
        };
        if let Err(err) = result {
            crate::util::error(&err.to_string());
        }
    }
}

/// Runs `router` until its shutdown completes. A closed input channel counts
/// as a shutdown request. Returns the router for inspection.
pub async fn run(
    mut router: Router,
    mut events: mpsc::Receiver<Event>,
    output: mpsc::Sender<Output>,
) -> Router {
    let mut last = Instant::now();
    let mut closed = false;
    loop {
        let deadline = router
            .timeout()
            .map(|ms| last + Duration::from_millis(ms as u64));
        let received = tokio::select! {
            event = events.recv(), if !closed => Some(event),
            _ = sleep_until(deadline) => None,
        };

        // events are handled at their arrival time
        let elapsed = last.elapsed();
        let whole_ms = elapsed.as_millis() as u64;
        router.advance(whole_ms);
        // carry the sub-millisecond remainder into the next round
        last += Duration::from_millis(whole_ms);

        match received {
            Some(Some(event)) => router.handle_event(event),
            Some(None) => {
                crate::util::log("event channel closed");
                closed = true;
                router.shutdown();
            }
            None => {}
        }

        for packet in router.take_output() {
            if output.send(packet).await.is_err() {
                crate::util::error("output channel closed");
                router.shutdown();
                break;
            }
        }
        if router.is_finished() {
            crate::util::log("shutdown complete");
            return router;
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
