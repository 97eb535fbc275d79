mod common;

use std::net::Ipv4Addr;

use common::*;
use ospf_lib::area::Scope;
use ospf_lib::config::{RouterConfig, BACKBONE};
use ospf_lib::lsa::router::ROUTER_LSA_TYPE;
use ospf_lib::lsa::{InitialSequenceNumber, LsaBody, MaxAge, MaxSequenceNumber};
use ospf_lib::neighbor::status::Status;
use ospf_lib::packet::lsu::Lsu;
use ospf_lib::packet::{seal_checksum, OspfPacket, Packet};
use ospf_lib::router::Acceptance;
use ospf_lib::{AllSPFRouters, OspfError};

const NET3: u32 = 0xc0a80300;
const BB: Scope = Scope::Area(BACKBONE);

#[test]
fn newer_instance_is_installed_flooded_and_acked() {
    let mut router = backbone_router();
    let lsa = summary(R3, NET3, InitialSequenceNumber, 1, 5);

    let result = router.receive_lsa(1, R2, &lsa.to_be_bytes());
    assert_eq!(result, Ok(Acceptance::Installed { flooded: 1 }));

    let output = router.take_output();
    let flooded = updates_on(&output, 2);
    assert_eq!(flooded.len(), 1);
    assert_eq!(flooded[0].header, lsa.header);
    assert!(output
        .iter()
        .any(|out| out.ifindex == 2 && out.destination == AllSPFRouters));
    assert!(updates_on(&output, 1).is_empty());
    assert_eq!(acks_to(&output, Ipv4Addr::new(10, 0, 0, 2)), vec![lsa.header]);

    let stored = router.lsdb(BB).unwrap().fetch_lsa(&lsa_id(&lsa)).unwrap();
    assert_eq!(stored.header.sequence_number, InitialSequenceNumber);
    assert!(router.neighbor(2, R4).unwrap().is_retransmitting(BB, &lsa_id(&lsa)));
    assert!(!router.neighbor(1, R2).unwrap().is_retransmitting(BB, &lsa_id(&lsa)));
    assert_eq!(router.stats().lsas_received, 1);
}

#[test]
fn sequence_numbers_decide_which_instance_wins() {
    let mut router = backbone_router();
    let newer = summary(R3, NET3, InitialSequenceNumber + 5, 1, 5);
    let older = summary(R3, NET3, InitialSequenceNumber + 2, 1, 7);
    assert!(matches!(
        router.receive_lsa(1, R2, &newer.to_be_bytes()),
        Ok(Acceptance::Installed { .. })
    ));
    router.take_output();

    assert_eq!(
        router.receive_lsa(1, R2, &older.to_be_bytes()),
        Ok(Acceptance::Older)
    );
    let output = router.take_output();
    // the sender gets our copy back
    let sent_back: Vec<_> = output
        .iter()
        .filter(|out| out.destination == Ipv4Addr::new(10, 0, 0, 2))
        .collect();
    assert_eq!(sent_back.len(), 1);
    match &sent_back[0].packet {
        Packet::Update(lsu) => assert_eq!(lsu.lsas[0].header, newer.header),
        other => panic!("expected an update, got {:?}", other),
    }
    let stored = router.lsdb(BB).unwrap().fetch_lsa(&lsa_id(&newer)).unwrap();
    assert_eq!(stored.body, newer.body);

    // the same instance again is only acknowledged
    assert_eq!(
        router.receive_lsa(1, R2, &newer.to_be_bytes()),
        Ok(Acceptance::Duplicate)
    );
    let output = router.take_output();
    assert!(updates_on(&output, 2).is_empty());
    assert_eq!(acks_to(&output, Ipv4Addr::new(10, 0, 0, 2)), vec![newer.header]);
}

#[test]
fn duplicate_from_a_flooding_target_is_an_implied_ack() {
    let mut router = backbone_router();
    let lsa = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    router.receive_lsa(1, R2, &lsa.to_be_bytes()).unwrap();
    router.take_output();
    assert!(router.neighbor(2, R4).unwrap().is_retransmitting(BB, &lsa_id(&lsa)));

    assert_eq!(
        router.receive_lsa(2, R4, &lsa.to_be_bytes()),
        Ok(Acceptance::Duplicate)
    );
    assert!(!router.neighbor(2, R4).unwrap().is_retransmitting(BB, &lsa_id(&lsa)));
    assert!(router.take_output().is_empty());
}

#[test]
fn newer_instance_within_min_ls_arrival_is_ignored() {
    let mut router = backbone_router();
    let first = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    let second = summary(R3, NET3, InitialSequenceNumber + 1, 1, 6);
    router.receive_lsa(1, R2, &first.to_be_bytes()).unwrap();

    router.advance(500);
    assert_eq!(
        router.receive_lsa(1, R2, &second.to_be_bytes()),
        Ok(Acceptance::TooSoon)
    );
    router.advance(600);
    assert!(matches!(
        router.receive_lsa(1, R2, &second.to_be_bytes()),
        Ok(Acceptance::Installed { .. })
    ));
    let stored = router.lsdb(BB).unwrap().fetch_lsa(&lsa_id(&second)).unwrap();
    assert_eq!(stored.header.sequence_number, InitialSequenceNumber + 1);
}

#[test]
fn malformed_lsas_are_rejected_and_counted() {
    let mut router = backbone_router();
    let lsa = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    let mut corrupted = lsa.to_be_bytes();
    corrupted[27] ^= 0x01;

    assert!(matches!(
        router.receive_lsa(1, R2, &corrupted),
        Err(OspfError::BadChecksum { .. })
    ));
    assert!(matches!(
        router.receive_lsa(1, R2, &lsa.to_be_bytes()[..10]),
        Err(OspfError::Truncated { .. })
    ));
    let mut overlong = lsa.to_be_bytes();
    overlong[18..20].copy_from_slice(&200u16.to_be_bytes());
    assert!(matches!(
        router.receive_lsa(1, R2, &overlong),
        Err(OspfError::LengthExceedsBuffer { .. })
    ));

    assert_eq!(router.stats().lsas_rejected, 3);
    assert!(!router.lsdb(BB).unwrap().contains_lsa(&lsa_id(&lsa)));
    assert!(router.take_output().is_empty());
}

#[test]
fn update_packets_are_processed_lsa_by_lsa() {
    let mut router = backbone_router();
    let good = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    let bad = summary(R3, 0xc0a80400, InitialSequenceNumber, 1, 5);
    let lsu = Lsu::new(id(R2), 0, vec![bad.clone(), good.clone()]);
    let mut packet = lsu.to_bytes();
    // corrupt the first lsa's metric
    packet[24 + 4 + 27] ^= 0xff;
    seal_checksum(&mut packet);

    let results = router.receive_update(1, R2, &packet).unwrap();
    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], Err(OspfError::BadChecksum { .. })));
    assert!(matches!(results[1], Ok(Acceptance::Installed { .. })));
    assert!(router.lsdb(BB).unwrap().contains_lsa(&lsa_id(&good)));
    assert!(!router.lsdb(BB).unwrap().contains_lsa(&lsa_id(&bad)));
}

#[test]
fn update_with_bad_packet_checksum_is_dropped_whole() {
    let mut router = backbone_router();
    let lsa = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    let mut packet = Lsu::new(id(R2), 0, vec![lsa.clone()]).to_bytes();
    packet[24 + 4 + 27] ^= 0xff;

    assert!(matches!(
        router.receive_update(1, R2, &packet),
        Err(OspfError::BadChecksum { .. })
    ));
    assert_eq!(router.stats().lsas_rejected, 1);
    assert!(!router.lsdb(BB).unwrap().contains_lsa(&lsa_id(&lsa)));
    assert!(router.take_output().is_empty());
}

#[test]
fn only_exchanging_neighbors_are_heard() {
    let mut router = backbone_router();
    let lsa = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    router
        .neighbor_state(1, R2, Ipv4Addr::new(10, 0, 0, 2), Status::TwoWay)
        .unwrap();
    assert_eq!(
        router.receive_lsa(1, R2, &lsa.to_be_bytes()),
        Err(OspfError::NeighborNotExchanging(R2))
    );
    assert_eq!(
        router.receive_lsa(1, R5, &lsa.to_be_bytes()),
        Err(OspfError::UnknownNeighbor {
            ifindex: 1,
            neighbor: R5
        })
    );
    assert_eq!(
        router.receive_lsa(9, R2, &lsa.to_be_bytes()),
        Err(OspfError::UnknownInterface(9))
    );
}

#[test]
fn max_age_without_stored_instance_is_acked_and_dropped() {
    let mut router = backbone_router();
    let lsa = max_aged(&summary(R3, NET3, InitialSequenceNumber, 1, 5));
    assert_eq!(
        router.receive_lsa(1, R2, &lsa.to_be_bytes()),
        Ok(Acceptance::Dropped)
    );
    let output = router.take_output();
    assert_eq!(output.len(), 1);
    assert_eq!(acks_to(&output, Ipv4Addr::new(10, 0, 0, 2)), vec![lsa.header]);
    assert!(!router.lsdb(BB).unwrap().contains_lsa(&lsa_id(&lsa)));
}

#[test]
fn unacknowledged_lsas_are_retransmitted_until_acked() {
    let mut router = backbone_router();
    let lsa = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    router.receive_lsa(1, R2, &lsa.to_be_bytes()).unwrap();
    router.take_output();

    router.advance(6_000);
    let output = router.take_output();
    let unicast: Vec<_> = output
        .iter()
        .filter(|out| out.destination == Ipv4Addr::new(10, 0, 1, 4))
        .collect();
    assert!(!unicast.is_empty());
    assert!(updates_on(&output, 2)
        .iter()
        .any(|resent| lsa_id(resent) == lsa_id(&lsa)));

    assert!(router.receive_ack(2, R4, &[lsa.header]).unwrap() >= 1);
    assert!(!router.neighbor(2, R4).unwrap().is_retransmitting(BB, &lsa_id(&lsa)));
}

#[test]
fn max_age_instance_leaves_once_every_neighbor_acked() {
    let mut router = backbone_router();
    let lsa = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    router.receive_lsa(1, R2, &lsa.to_be_bytes()).unwrap();
    router.advance(1_000);

    let flushed = max_aged(&lsa);
    assert_eq!(
        router.receive_lsa(1, R2, &flushed.to_be_bytes()),
        Ok(Acceptance::Installed { flooded: 1 })
    );
    let entry = router.lsdb(BB).unwrap().fetch_entry(&lsa_id(&lsa)).unwrap();
    assert!(entry.lsa.is_max_age());

    router.receive_ack(2, R4, &[flushed.header]).unwrap();
    assert!(!router.lsdb(BB).unwrap().contains_lsa(&lsa_id(&lsa)));
}

#[test]
fn aged_out_lsas_are_flushed() {
    let mut router = backbone_router();
    let lsa = summary(R3, NET3, InitialSequenceNumber, MaxAge - 2, 5);
    router.receive_lsa(1, R2, &lsa.to_be_bytes()).unwrap();
    router.take_output();

    router.advance(2_000);
    let entry = router.lsdb(BB).unwrap().fetch_entry(&lsa_id(&lsa)).unwrap();
    assert!(entry.lsa.is_max_age());
    assert!(entry.flushing);
    let header = entry.lsa.header;
    let output = router.take_output();
    assert!(updates_on(&output, 1).iter().any(|l| lsa_id(l) == lsa_id(&lsa)));
    assert!(updates_on(&output, 2).iter().any(|l| lsa_id(l) == lsa_id(&lsa)));

    router.receive_ack(1, R2, &[header]).unwrap();
    assert!(router.lsdb(BB).unwrap().contains_lsa(&lsa_id(&lsa)));
    router.receive_ack(2, R4, &[header]).unwrap();
    assert!(!router.lsdb(BB).unwrap().contains_lsa(&lsa_id(&lsa)));
}

#[test]
fn stale_own_lsa_is_flushed() {
    let mut router = backbone_router();
    let stale = summary(R1, NET3, InitialSequenceNumber + 9, 1, 5);
    assert_eq!(
        router.receive_lsa(1, R2, &stale.to_be_bytes()),
        Ok(Acceptance::SelfOriginated)
    );
    let entry = router.lsdb(BB).unwrap().fetch_entry(&lsa_id(&stale)).unwrap();
    assert!(entry.lsa.is_max_age());
    assert_eq!(entry.lsa.header.sequence_number, InitialSequenceNumber + 9);
    assert!(router.stats().lsas_flushed >= 1);
}

fn own_router_lsa_id() -> ospf_lib::area::lsdb::LsaIdentifier {
    ospf_lib::area::lsdb::LsaIdentifier {
        lsa_type: ROUTER_LSA_TYPE as u32,
        link_state_id: id(R1),
        advertising_router: id(R1),
    }
}

#[test]
fn own_router_lsa_jumps_past_a_stale_sequence_number() {
    let mut router = backbone_router();
    router.advance(1_500);
    let stale = router_lsa(R1, InitialSequenceNumber + 0x20, 0, vec![]);
    assert_eq!(
        router.receive_lsa(1, R2, &stale.to_be_bytes()),
        Ok(Acceptance::SelfOriginated)
    );
    let stored = router.lsdb(BB).unwrap().fetch_lsa(&own_router_lsa_id()).unwrap();
    assert_eq!(stored.header.sequence_number, InitialSequenceNumber + 0x21);
    match &stored.body {
        // p2p links to R2 and R4 plus the two stub networks
        LsaBody::Router(body) => assert_eq!(body.link_states.len(), 4),
        other => panic!("unexpected body {:?}", other),
    }
}

#[test]
fn sequence_number_wraps_through_a_flush() {
    let mut router = backbone_router();
    router.advance(1_500);
    router.take_output();
    let at_max = router_lsa(R1, MaxSequenceNumber, 0, vec![]);
    router.receive_lsa(1, R2, &at_max.to_be_bytes()).unwrap();

    let entry = router.lsdb(BB).unwrap().fetch_entry(&own_router_lsa_id()).unwrap();
    assert!(entry.flushing);
    assert_eq!(entry.lsa.header.sequence_number, MaxSequenceNumber);
    let header = entry.lsa.header;

    router.receive_ack(1, R2, &[header]).unwrap();
    router.receive_ack(2, R4, &[header]).unwrap();
    let entry = router.lsdb(BB).unwrap().fetch_entry(&own_router_lsa_id()).unwrap();
    assert!(!entry.flushing);
    assert_eq!(entry.lsa.header.sequence_number, InitialSequenceNumber);
}

#[test]
fn own_lsas_are_refreshed_before_they_age_out() {
    let mut router = backbone_router();
    let before = router
        .lsdb(BB)
        .unwrap()
        .fetch_lsa(&own_router_lsa_id())
        .unwrap()
        .header
        .sequence_number;
    router.advance(1_800_000);
    let after = router.lsdb(BB).unwrap().fetch_lsa(&own_router_lsa_id()).unwrap();
    assert_eq!(after.header.sequence_number, before + 1);
    assert!(after.header.age < 10);
}

#[test]
fn database_overflow_is_flagged_and_cleared() {
    let mut router = backbone_router_with(RouterConfig::new(R1).with_lsdb_limit(2));
    let first = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    let second = summary(R3, 0xc0a80400, InitialSequenceNumber, 1, 5);
    router.receive_lsa(1, R2, &first.to_be_bytes()).unwrap();
    assert!(!router.is_overflowed());
    router.receive_lsa(1, R2, &second.to_be_bytes()).unwrap();
    assert!(router.is_overflowed());

    router.advance(1_000);
    let flushed = max_aged(&second);
    router.receive_lsa(1, R2, &flushed.to_be_bytes()).unwrap();
    router.receive_ack(2, R4, &[flushed.header]).unwrap();
    assert!(!router.is_overflowed());
}

#[test]
fn shutdown_flushes_own_lsas_and_waits_for_acks() {
    let mut router = backbone_router();
    router.shutdown();
    assert!(router.is_shutting_down());
    assert!(!router.is_finished());

    let entry = router.lsdb(BB).unwrap().fetch_entry(&own_router_lsa_id()).unwrap();
    assert!(entry.flushing);
    let header = entry.lsa.header;
    let output = router.take_output();
    assert!(updates_on(&output, 1).iter().all(|lsa| lsa.is_max_age()));
    assert!(!updates_on(&output, 2).is_empty());

    let lsa = summary(R3, NET3, InitialSequenceNumber, 1, 5);
    assert_eq!(
        router.receive_lsa(1, R2, &lsa.to_be_bytes()),
        Err(OspfError::ShuttingDown)
    );

    router.receive_ack(1, R2, &[header]).unwrap();
    assert!(!router.is_finished());
    router.receive_ack(2, R4, &[header]).unwrap();
    assert!(router.is_finished());
}

#[test]
fn shutdown_gives_up_after_the_wait() {
    let mut router = backbone_router();
    router.shutdown();
    router.advance(9_000);
    assert!(!router.is_finished());
    router.advance(1_000);
    assert!(router.is_finished());
}

#[test]
fn router_id_change_withdraws_old_lsas() {
    let mut router = backbone_router();
    let old_id = own_router_lsa_id();
    let config = router.config().clone();
    let mut renamed = config.clone();
    renamed.router_id = Ipv4Addr::new(9, 9, 9, 9);
    router.reconfigure(renamed).unwrap();

    assert_eq!(router.router_id(), Ipv4Addr::new(9, 9, 9, 9));
    let old = router.lsdb(BB).unwrap().fetch_entry(&old_id).unwrap();
    assert!(old.flushing);
    let new_id = ospf_lib::area::lsdb::LsaIdentifier {
        lsa_type: ROUTER_LSA_TYPE as u32,
        link_state_id: id(Ipv4Addr::new(9, 9, 9, 9)),
        advertising_router: id(Ipv4Addr::new(9, 9, 9, 9)),
    };
    assert!(router.lsdb(BB).unwrap().contains_lsa(&new_id));
}
