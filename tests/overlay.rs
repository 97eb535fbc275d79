mod common;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use common::*;
use ospf_lib::area::lsdb::LsaIdentifier;
use ospf_lib::config::BACKBONE;
use ospf_lib::lsa::opaque::{opaque_lsid, AbrEntry, AsbrLSA, OpaqueLSA, OPAQUE_AS_LSA_TYPE, OPQ_T_MULTI_ABR, OPQ_T_MULTI_ASBR};
use ospf_lib::lsa::router::ROUTER_FLAG_B;
use ospf_lib::lsa::{Header, InitialSequenceNumber, Lsa, LsaBody, MaxAge, OPTION_E, OPTION_O};
use ospf_lib::neighbor::status::Status;
use ospf_lib::rtable::{Destination, NextHop, PathType, Prefix};
use ospf_lib::{OspfError, Router};

const REMOTE_NET: u32 = 0xc0a80300;
const MASK: u32 = 0xffffff00;

fn own_abr_id() -> LsaIdentifier {
    LsaIdentifier {
        lsa_type: OPAQUE_AS_LSA_TYPE as u32,
        link_state_id: opaque_lsid(OPQ_T_MULTI_ABR, 0),
        advertising_router: id(R1),
    }
}

fn own_abr_entries(router: &Router) -> Option<Vec<AbrEntry>> {
    let lsa = router.as_lsdb().fetch_lsa(&own_abr_id())?;
    if lsa.is_max_age() {
        return None;
    }
    match &lsa.body {
        LsaBody::Opaque(OpaqueLSA::Abr(abr)) => Some(abr.entries.clone()),
        _ => None,
    }
}

fn summary_metric(router: &Router, area: Ipv4Addr, lsa_type: u32, lsid: u32) -> Option<u32> {
    let lsa_id = LsaIdentifier {
        lsa_type,
        link_state_id: lsid,
        advertising_router: id(R1),
    };
    let lsa = router.area(area)?.lsdb.fetch_lsa(&lsa_id)?;
    if lsa.is_max_age() {
        return None;
    }
    match &lsa.body {
        LsaBody::SummaryNetwork(summary) | LsaBody::SummaryRouter(summary) => Some(summary.metric),
        _ => None,
    }
}

fn own_prefix_metric(router: &Router, addr: u32) -> Option<u32> {
    router
        .as_lsdb()
        .iter()
        .filter(|(lsa_id, _)| lsa_id.advertising_router == id(R1))
        .find_map(|(_, entry)| match &entry.lsa.body {
            LsaBody::Opaque(OpaqueLSA::Prefix(prefix)) if prefix.subnet_addr == addr => Some(prefix.metric),
            _ => None,
        })
}

fn network(addr: u32) -> Destination {
    Destination::Network(Prefix::new(addr, MASK))
}

/// R1 is an ABR between the backbone (towards R2) and area 0.0.0.1. R2 is
/// an ABR whose overlay neighbor R3 advertises 192.168.3.0/24.
fn overlay_topology(router: &mut Router) {
    overlay_topology_with(router, abr_lsa(R3, InitialSequenceNumber, &[(R2, 7)]));
}

fn overlay_topology_with(router: &mut Router, r3_abr: Lsa) {
    let r2_router = router_lsa(
        R2,
        InitialSequenceNumber,
        ROUTER_FLAG_B,
        vec![
            p2p(R1, Ipv4Addr::new(10, 0, 0, 2), 10),
            stub(0x0a000200, MASK, 1),
        ],
    );
    let updates = [
        r2_router,
        abr_lsa(R2, InitialSequenceNumber, &[(R1, 10), (R3, 7)]),
        r3_abr,
        prefix_lsa(R3, 1, InitialSequenceNumber, REMOTE_NET, MASK, 4),
    ];
    for lsa in updates {
        router.receive_lsa(1, R2, &lsa.to_be_bytes()).unwrap();
    }
}

#[test]
fn overlay_path_is_selected_and_summarized() {
    let mut router = abr_router(false, Status::Full);
    overlay_topology(&mut router);
    router.advance(1000);

    assert!(router.is_abr());
    assert!(router.first_overlay_lsas_sent());
    assert_eq!(
        own_abr_entries(&router),
        Some(vec![AbrEntry {
            neighbor: id(R2),
            metric: 10
        }])
    );

    let r3 = &router.overlay().abrs[&id(R3)];
    assert_eq!(r3.cost, 17);
    assert_eq!(r3.next_hop, Some(id(R2)));

    let entry = router.rtable().get(&network(REMOTE_NET)).unwrap();
    assert_eq!(entry.path_type, Some(PathType::InterArea));
    assert_eq!(entry.cost, 21);
    assert_eq!(entry.area_id, Some(BACKBONE));
    assert_eq!(
        entry.next_hops,
        BTreeSet::from([NextHop {
            ifindex: Some(1),
            router: id(R2)
        }])
    );

    // summarized into area 1 only, never back into the path's own area
    assert_eq!(summary_metric(&router, AREA1, 3, REMOTE_NET), Some(21));
    assert_eq!(summary_metric(&router, BACKBONE, 3, REMOTE_NET), None);

    // intra-area routes go into the overlay and into the other area
    assert_eq!(own_prefix_metric(&router, 0x0a000200), Some(11));
    assert_eq!(summary_metric(&router, AREA1, 3, 0x0a000200), Some(11));
    assert_eq!(summary_metric(&router, BACKBONE, 3, 0x0a010000), Some(10));
    assert!(router.stats().overlay_dijkstras >= 1);
}

#[test]
fn cheaper_overlay_path_is_readvertised() {
    let mut router = abr_router(false, Status::Full);
    overlay_topology(&mut router);
    router.advance(1000);
    let before = router
        .area(AREA1)
        .unwrap()
        .lsdb
        .fetch_lsa(&own_summary_id(REMOTE_NET))
        .unwrap()
        .header
        .sequence_number;

    let updates = [
        abr_lsa(R2, InitialSequenceNumber + 1, &[(R1, 10), (R3, 7), (R4, 2)]),
        abr_lsa(R4, InitialSequenceNumber, &[(R2, 2)]),
        prefix_lsa(R4, 1, InitialSequenceNumber, REMOTE_NET, MASK, 1),
    ];
    for lsa in updates {
        router.receive_lsa(1, R2, &lsa.to_be_bytes()).unwrap();
    }
    router.advance(1000);

    let entry = router.rtable().get(&network(REMOTE_NET)).unwrap();
    assert_eq!(entry.cost, 13);
    assert_eq!(router.overlay().abrs[&id(R4)].next_hop, Some(id(R2)));

    let summary = router
        .area(AREA1)
        .unwrap()
        .lsdb
        .fetch_lsa(&own_summary_id(REMOTE_NET))
        .unwrap();
    assert_eq!(summary.header.sequence_number, before + 1);
    assert_eq!(summary_metric(&router, AREA1, 3, REMOTE_NET), Some(13));
}

#[test]
fn flushed_prefix_withdraws_the_summary() {
    let mut router = abr_router(false, Status::Full);
    overlay_topology(&mut router);
    router.advance(1000);
    assert_eq!(summary_metric(&router, AREA1, 3, REMOTE_NET), Some(21));

    let prefix = prefix_lsa(R3, 1, InitialSequenceNumber, REMOTE_NET, MASK, 4);
    router
        .receive_lsa(1, R2, &max_aged(&prefix).to_be_bytes())
        .unwrap();
    router.advance(1000);

    assert_eq!(summary_metric(&router, AREA1, 3, REMOTE_NET), None);
    assert!(router.rtable().get(&network(REMOTE_NET)).is_none());
}

#[test]
fn aged_out_abr_lsa_takes_its_prefixes_with_it() {
    let mut router = abr_router(false, Status::Full);
    // R3's ABR-LSA arrives two seconds short of MaxAge
    let fresh = abr_lsa(R3, InitialSequenceNumber, &[(R2, 7)]);
    let mut header = fresh.header;
    header.age = MaxAge - 2;
    let old = Lsa::new(header, fresh.body);
    overlay_topology_with(&mut router, old.clone());
    router.advance(1000);

    assert!(router.overlay().abrs.contains_key(&id(R3)));
    assert_eq!(router.rtable().get(&network(REMOTE_NET)).unwrap().cost, 21);
    assert_eq!(summary_metric(&router, AREA1, 3, REMOTE_NET), Some(21));

    router.advance(2000);

    let stored = router.as_lsdb().fetch_lsa(&lsa_id(&old));
    assert!(stored.map(|lsa| lsa.is_max_age()).unwrap_or(true));
    assert!(!router.overlay().abrs.contains_key(&id(R3)));
    assert!(router.rtable().get(&network(REMOTE_NET)).is_none());
    assert_eq!(summary_metric(&router, AREA1, 3, REMOTE_NET), None);
    // R2 is still on the overlay
    assert!(router.overlay().abrs.contains_key(&id(R2)));
}

#[test]
fn stub_area_gets_no_asbr_summary() {
    let mut router = abr_router(true, Status::Full);
    overlay_topology(&mut router);
    let asbr = Ipv4Addr::new(9, 9, 9, 9);
    let asbr_lsa = Lsa::new(
        Header::new(
            1,
            OPTION_E | OPTION_O,
            OPAQUE_AS_LSA_TYPE,
            opaque_lsid(OPQ_T_MULTI_ASBR, 1),
            id(R3),
            InitialSequenceNumber,
        ),
        LsaBody::Opaque(OpaqueLSA::Asbr(AsbrLSA {
            dest_router: id(asbr),
            metric: 5,
        })),
    );
    router.receive_lsa(1, R2, &asbr_lsa.to_be_bytes()).unwrap();
    router.advance(1000);

    let entry = router.rtable().get(&Destination::Asbr(id(asbr))).unwrap();
    assert_eq!(entry.path_type, Some(PathType::InterArea));
    assert_eq!(entry.cost, 22);
    assert_eq!(summary_metric(&router, AREA1, 4, id(asbr)), None);
    assert_eq!(summary_metric(&router, AREA1, 3, REMOTE_NET), Some(21));
}

#[test]
fn stub_area_refuses_as_scoped_lsas() {
    let mut router = abr_router(true, Status::Full);
    let prefix = prefix_lsa(R5, 1, InitialSequenceNumber, REMOTE_NET, MASK, 4);

    assert_eq!(
        router.receive_lsa(2, R5, &prefix.to_be_bytes()),
        Err(OspfError::AsScopeInStubArea(AREA1))
    );
    assert!(router.as_lsdb().fetch_lsa(&lsa_id(&prefix)).is_none());
    assert_eq!(router.stats().lsas_rejected, 1);
    let output = router.take_output();
    assert!(acks_to(&output, Ipv4Addr::new(10, 1, 0, 5)).is_empty());
    assert!(updates_on(&output, 1).is_empty());

    // the same lsa over the backbone is fine
    assert!(router.receive_lsa(1, R2, &prefix.to_be_bytes()).is_ok());
    assert!(router.as_lsdb().fetch_lsa(&lsa_id(&prefix)).is_some());
}

#[test]
fn overlay_lsas_wait_for_adjacencies() {
    let mut router = abr_router(false, Status::ExStart);
    overlay_topology(&mut router);
    router.advance(1000);
    assert!(!router.first_overlay_lsas_sent());
    assert_eq!(own_abr_entries(&router), None);

    router
        .neighbor_state(2, R5, Ipv4Addr::new(10, 1, 0, 5), Status::Full)
        .unwrap();
    router.advance(1000);
    assert!(router.first_overlay_lsas_sent());
    assert!(own_abr_entries(&router).is_some());
}

#[test]
fn losing_the_second_area_withdraws_overlay_lsas() {
    let mut router = abr_router(false, Status::Full);
    overlay_topology(&mut router);
    router.advance(1000);
    assert!(own_abr_entries(&router).is_some());

    router.interface_state(2, false).unwrap();
    router.advance(1000);

    assert!(!router.is_abr());
    assert!(!router.first_overlay_lsas_sent());
    assert_eq!(own_abr_entries(&router), None);
    assert_eq!(own_prefix_metric_live(&router, 0x0a000200), None);
    let entry = router.rtable().get(&network(0x0a000200)).unwrap();
    assert_eq!(entry.path_type, Some(PathType::IntraArea));
    assert_eq!(entry.cost, 11);
}

fn own_prefix_metric_live(router: &Router, addr: u32) -> Option<u32> {
    router
        .as_lsdb()
        .iter()
        .filter(|(lsa_id, entry)| lsa_id.advertising_router == id(R1) && !entry.lsa.is_max_age())
        .find_map(|(_, entry)| match &entry.lsa.body {
            LsaBody::Opaque(OpaqueLSA::Prefix(prefix)) if prefix.subnet_addr == addr => Some(prefix.metric),
            _ => None,
        })
}
