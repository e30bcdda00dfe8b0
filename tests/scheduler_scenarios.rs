
use std::time::Duration;

use chainnode_monitor::events::MonitorEvent;
use chainnode_monitor::scheduler::{BootstrapPoller, HeightPoller, Poller, UpdatePoller};
use chainnode_monitor::store::RecordStore;
use chainnode_monitor::types::{CreateDelegate, CreateNode};
use harness::{drain, names, Call, Harness};

const N1: &str = "10.0.0.1:4096";

fn add_node(h: &Harness, ip: &str, port: u16) -> String {
    h.registry
        .add_node(CreateNode {
            ip: ip.to_string(),
            port,
            name: format!("node-{port}"),
            node_type: 0,
        })
        .unwrap()
}

fn add_delegate(h: &Harness, node_id: &str, public_key: &str) {
    h.registry
        .add_delegate(CreateDelegate {
            id: node_id.to_string(),
            public_key: public_key.to_string(),
            name: public_key.to_string(),
        })
        .unwrap();
}

#[tokio::test]
async fn fresh_node_catches_up_to_tip_and_attributes_block() {
    let h = Harness::new();
    let id = add_node(&h, "10.0.0.1", 4096);
    add_delegate(&h, &id, "delegateA");
    h.chain.set_height(N1, 50);
    h.chain.add_block(N1, 50, "delegateA");
    let mut rx = h.subscribe();

    HeightPoller::new(h.ctx.clone()).tick().await;
    assert_eq!(h.roster.node(&id).unwrap().lastest_height, Some(49));

    UpdatePoller::new(h.ctx.clone()).tick().await;
    assert_eq!(h.chain.calls().last(), Some(&Call::Block(N1.to_string(), 50)));

    let node = h.roster.node(&id).unwrap();
    assert_eq!(node.lastest_height, Some(50));
    assert_eq!(node.block_height(), Some(50));
    assert_eq!(h.roster.delegate("delegateA").unwrap().block_height(), Some(50));

    let events = drain(&mut rx);
    let names = names(&events);
    assert_eq!(names.iter().filter(|n| **n == "delegate/update").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "node/update").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "height/update").count(), 1);

    // persisted
    let stored = h.store.all_nodes().unwrap();
    assert_eq!(stored[0].lastest_height, Some(50));
    assert_eq!(h.store.all_delegates().unwrap()[0].block_height(), Some(50));
}

#[tokio::test]
async fn height_poller_is_fair_across_the_roster() {
    let h = Harness::new();
    for port in [1, 2, 3, 4] {
        add_node(&h, "10.0.0.9", port);
    }
    let mut poller = HeightPoller::new(h.ctx.clone());

    for _ in 0..12 {
        poller.tick().await;
        h.clock.advance(Duration::from_millis(400));
    }

    let visits: Vec<String> = h
        .chain
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Height(ep) => Some(ep),
            _ => None,
        })
        .collect();
    assert_eq!(visits.len(), 12);
    for port in [1, 2, 3, 4] {
        let ep = format!("10.0.0.9:{port}");
        assert_eq!(visits.iter().filter(|v| **v == ep).count(), 3);
    }
    assert_eq!(visits[0..4], visits[4..8]);
}

#[tokio::test]
async fn repeated_ticks_inside_window_query_once() {
    let h = Harness::new();
    add_node(&h, "10.0.0.1", 4096);
    h.chain.set_height(N1, 10);
    let mut poller = HeightPoller::new(h.ctx.clone());

    poller.tick().await;
    for _ in 0..4 {
        h.clock.advance(Duration::from_millis(200));
        poller.tick().await;
    }
    assert_eq!(h.chain.calls().len(), 1);
}

#[tokio::test]
async fn rollback_resets_and_recovers() {
    let h = Harness::new();
    let id = add_node(&h, "10.0.0.1", 4096);
    add_delegate(&h, &id, "delegateA");
    add_delegate(&h, &id, "delegateB");
    for height in 1..=100 {
        let producer = if height % 2 == 0 { "delegateA" } else { "delegateB" };
        h.chain.add_block(N1, height, producer);
    }
    h.chain.set_height(N1, 100);

    let mut height = HeightPoller::new(h.ctx.clone());
    let mut update = UpdatePoller::new(h.ctx.clone());
    let mut bootstrap = BootstrapPoller::new(h.ctx.clone());
    height.tick().await;
    update.tick().await;
    bootstrap.tick().await;
    assert_eq!(h.roster.delegate("delegateA").unwrap().block_height(), Some(100));
    assert_eq!(h.roster.delegate("delegateB").unwrap().block_height(), Some(99));

    h.chain.truncate(N1, 40);
    h.clock.advance(Duration::from_secs(2));
    let mut rx = h.subscribe();
    height.tick().await;

    let node = h.roster.node(&id).unwrap();
    assert_eq!(node.lastest_height, Some(39));
    assert!(node.block.is_none());
    assert!(h.roster.delegates_of(&id).iter().all(|d| d.block.is_none()));
    assert!(names(&drain(&mut rx)).contains(&"height/update"));

    // catch-up resumes at the new tip
    h.clock.advance(Duration::from_secs(3));
    update.tick().await;
    assert_eq!(h.chain.calls().last(), Some(&Call::Block(N1.to_string(), 40)));
    assert_eq!(h.roster.node(&id).unwrap().lastest_height, Some(40));
    assert_eq!(h.roster.delegate("delegateA").unwrap().block_height(), Some(40));

    // bootstrap fills in the delegate left without a block
    bootstrap.tick().await;
    assert_eq!(h.roster.delegate("delegateB").unwrap().block_height(), Some(39));
    assert_eq!(h.roster.node(&id).unwrap().block_height(), Some(40));
}

#[tokio::test]
async fn range_catch_up_requests_exact_gap() {
    let h = Harness::new();
    let id = add_node(&h, "10.0.0.1", 4096);
    h.roster.update_node(&id, |n| n.lastest_height = Some(10));
    h.roster.set_cache_height(&id, 15);

    UpdatePoller::new(h.ctx.clone()).tick().await;
    assert_eq!(h.chain.calls(), vec![Call::Range(N1.to_string(), 10, 5)]);
}

#[tokio::test]
async fn blocks_by_strangers_do_not_broadcast_updates() {
    let h = Harness::new();
    let id = add_node(&h, "10.0.0.1", 4096);
    add_delegate(&h, &id, "delegateA");
    for height in 11..=15 {
        h.chain.add_block(N1, height, "someone-else");
    }
    h.roster.update_node(&id, |n| n.lastest_height = Some(10));
    h.roster.set_cache_height(&id, 15);
    let mut rx = h.subscribe();

    UpdatePoller::new(h.ctx.clone()).tick().await;

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .all(|e| !matches!(e, MonitorEvent::NodeUpdate(_) | MonitorEvent::DelegateUpdate(_))));
    assert_eq!(names(&events), vec!["height/update"]);
    assert_eq!(h.roster.node(&id).unwrap().lastest_height, Some(15));
}

#[tokio::test]
async fn replayed_blocks_are_ignored() {
    let h = Harness::new();
    let id = add_node(&h, "10.0.0.1", 4096);
    add_delegate(&h, &id, "delegateA");
    h.chain.add_block(N1, 20, "delegateA");
    h.chain.add_block(N1, 21, "delegateA");
    h.roster.update_node(&id, |n| n.lastest_height = Some(19));
    h.roster.set_cache_height(&id, 21);

    UpdatePoller::new(h.ctx.clone()).tick().await;
    assert_eq!(h.roster.delegate("delegateA").unwrap().block_height(), Some(21));

    // the same block arriving again through bootstrap changes nothing
    let mut rx = h.subscribe();
    let applied = h
        .ctx
        .reconciler
        .apply_produced(&id, &harness::block(21, "delegateA"));
    assert!(applied.node.is_none() && applied.delegate.is_none());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn batch_with_two_producers_broadcasts_once_per_kind() {
    let h = Harness::new();
    let id = add_node(&h, "10.0.0.1", 4096);
    add_delegate(&h, &id, "delegateA");
    add_delegate(&h, &id, "delegateB");
    for (height, producer) in [(11, "delegateA"), (12, "delegateB"), (13, "delegateA"), (14, "delegateB")] {
        h.chain.add_block(N1, height, producer);
    }
    h.roster.update_node(&id, |n| n.lastest_height = Some(10));
    h.roster.set_cache_height(&id, 14);
    let mut rx = h.subscribe();

    UpdatePoller::new(h.ctx.clone()).tick().await;
    assert_eq!(h.chain.calls(), vec![Call::Range(N1.to_string(), 10, 4)]);
    assert_eq!(h.roster.delegate("delegateA").unwrap().block_height(), Some(13));
    assert_eq!(h.roster.delegate("delegateB").unwrap().block_height(), Some(14));

    let events = drain(&mut rx);
    let delegate_updates: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::DelegateUpdate(d) => Some(d),
            _ => None,
        })
        .collect();
    assert_eq!(delegate_updates.len(), 1);
    assert_eq!(delegate_updates[0].public_key, "delegateB");
    assert_eq!(delegate_updates[0].block_height, Some(14));

    let names = names(&events);
    assert_eq!(names.iter().filter(|n| **n == "node/update").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "height/update").count(), 1);
    let node_update = events.iter().find_map(|e| match e {
        MonitorEvent::NodeUpdate(n) => Some(n),
        _ => None,
    });
    assert_eq!(node_update.unwrap().block_height, Some(14));
}
