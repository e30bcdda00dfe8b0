
use std::time::Duration;

use chainnode_monitor::events::MonitorEvent;
use chainnode_monitor::scheduler::{HeightPoller, Poller, UpdatePoller};
use chainnode_monitor::types::CreateNode;
use harness::{drain, Harness};

const SEED: &str = "10.0.0.5:4096";

fn add_seed(h: &Harness) -> String {
    h.registry
        .add_node(CreateNode {
            ip: "10.0.0.5".to_string(),
            port: 4096,
            name: "seed-1".to_string(),
            node_type: 1,
        })
        .unwrap()
}

#[tokio::test]
async fn stalled_network_alerts_four_times() {
    let h = Harness::new();
    add_seed(&h);
    h.chain.set_height(SEED, 200);
    HeightPoller::new(h.ctx.clone()).tick().await;
    let mut rx = h.subscribe();

    let mut levels = Vec::new();
    for _ in 0..(6 * 180) {
        if let Some(alert) = h.watcher.tick().await {
            levels.push(alert.level);
        }
        h.clock.advance(Duration::from_secs(20));
    }

    assert_eq!(levels, vec![1, 2, 3, 4]);
    let notices: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            MonitorEvent::MailNotify(text) => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(notices.len(), 4);
    assert!(notices.iter().all(|n| n.ends_with("at height 199")));
}

#[tokio::test]
async fn progress_resets_the_silence_timer() {
    let h = Harness::new();
    let id = add_seed(&h);
    h.chain.set_height(SEED, 10);
    let mut height = HeightPoller::new(h.ctx.clone());
    let mut update = UpdatePoller::new(h.ctx.clone());
    height.tick().await;

    h.watcher.tick().await;
    h.clock.advance(Duration::from_secs(290));
    assert!(h.watcher.tick().await.is_none());

    // the tip moves and catch-up walks to it
    h.chain.add_block(SEED, 10, "forger");
    h.chain.add_block(SEED, 11, "forger");
    h.chain.set_height(SEED, 11);
    height.tick().await;
    update.tick().await;
    assert_eq!(h.roster.node(&id).unwrap().lastest_height, Some(11));
    assert!(h.watcher.tick().await.is_none());

    h.clock.advance(Duration::from_secs(290));
    assert!(h.watcher.tick().await.is_none());
    h.clock.advance(Duration::from_secs(20));
    let alert = h.watcher.tick().await.unwrap();
    assert_eq!(alert.level, 1);
    assert_eq!(alert.height, 11);
}
