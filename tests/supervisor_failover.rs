//! Master discovery and failover against a scripted cluster

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use weedfiler::common::{Error, Result, SupervisorConfig};
use weedfiler::master::{ConnectionState, MasterCell, MasterClient, MasterSupervisor};

/// Masters that are up answer health checks and membership queries; the rest fail
struct ScriptedCluster {
    up: Mutex<HashSet<String>>,
    members: Vec<String>,
    discovery_failures: AtomicUsize,
    discovery_calls: AtomicUsize,
}

impl ScriptedCluster {
    fn new(members: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            up: Mutex::new(members.iter().map(|m| m.to_string()).collect()),
            members: members.iter().map(|m| m.to_string()).collect(),
            discovery_failures: AtomicUsize::new(0),
            discovery_calls: AtomicUsize::new(0),
        })
    }

    fn set_up(&self, addr: &str, up: bool) {
        let mut set = self.up.lock().unwrap();
        if up {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    fn is_up(&self, addr: &str) -> bool {
        self.up.lock().unwrap().contains(addr)
    }
}

#[async_trait]
impl MasterClient for ScriptedCluster {
    async fn probe(&self, addr: &str) -> Result<()> {
        if self.is_up(addr) {
            Ok(())
        } else {
            Err(Error::ProbeFailed {
                addr: addr.to_string(),
                reason: "connection refused".into(),
            })
        }
    }

    async fn list_masters(&self, addr: &str) -> Result<Vec<String>> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.discovery_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.discovery_failures.store(pending - 1, Ordering::SeqCst);
            return Err(Error::Http(format!("{} unavailable", addr)));
        }
        if self.is_up(addr) {
            Ok(self.members.clone())
        } else {
            Err(Error::Http(format!("{} unavailable", addr)))
        }
    }
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        bootstrap_retry_ms: 1,
        connected_poll_ms: 5,
        disconnected_poll_ms: 2,
        ..Default::default()
    }
}

fn supervisor(
    seed: &str,
    cluster: Arc<ScriptedCluster>,
    config: SupervisorConfig,
) -> (MasterSupervisor, MasterCell, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let cell = MasterCell::new(seed);
    let sup = MasterSupervisor::new(cell.clone(), cluster, config, rx).with_jitter(|| 0.25);
    (sup, cell, tx)
}

#[tokio::test]
async fn test_healthy_master_stays_installed() {
    let cluster = ScriptedCluster::new(&["m1:9333", "m2:9333", "m3:9333"]);
    let (mut sup, cell, _tx) = supervisor("m1:9333", cluster, SupervisorConfig::default());

    assert!(sup.bootstrap().await);
    for _ in 0..3 {
        let iteration = sup.run_once().await;
        assert_eq!(iteration.state, ConnectionState::Connected);
        assert_eq!(iteration.master, "m1:9333");
        assert_eq!(iteration.sleep, Duration::from_millis(12_500));
    }
    assert_eq!(cell.get(), "m1:9333");
}

#[tokio::test]
async fn test_fails_over_to_next_live_master() {
    let cluster = ScriptedCluster::new(&["m1:9333", "m2:9333", "m3:9333"]);
    let (mut sup, cell, _tx) = supervisor("m1:9333", cluster.clone(), SupervisorConfig::default());
    assert!(sup.bootstrap().await);

    cluster.set_up("m1:9333", false);
    let iteration = sup.run_once().await;

    assert_eq!(iteration.state, ConnectionState::Connected);
    assert_eq!(iteration.master, "m2:9333");
    assert_eq!(cell.get(), "m2:9333");
}

#[tokio::test]
async fn test_all_masters_down_keeps_last_address() {
    let cluster = ScriptedCluster::new(&["m1:9333", "m2:9333", "m3:9333"]);
    let (mut sup, cell, _tx) = supervisor("m1:9333", cluster.clone(), SupervisorConfig::default());
    assert!(sup.bootstrap().await);

    for m in ["m1:9333", "m2:9333", "m3:9333"] {
        cluster.set_up(m, false);
    }
    let iteration = sup.run_once().await;

    assert_eq!(iteration.state, ConnectionState::Disconnected);
    assert_eq!(iteration.master, "m1:9333");
    assert_eq!(iteration.sleep, Duration::from_millis(2500));
    assert_eq!(sup.state(), ConnectionState::Disconnected);

    // Recovery through a member that comes back
    cluster.set_up("m3:9333", true);
    let iteration = sup.run_once().await;
    assert_eq!(iteration.state, ConnectionState::Connected);
    assert_eq!(cell.get(), "m3:9333");
}

#[tokio::test]
async fn test_bootstrap_retries_until_discovery_succeeds() {
    let cluster = ScriptedCluster::new(&["m1:9333"]);
    cluster.discovery_failures.store(3, Ordering::SeqCst);
    let (mut sup, cell, _tx) = supervisor("m1:9333", cluster.clone(), fast_config());

    assert!(sup.bootstrap().await);
    assert_eq!(cluster.discovery_calls.load(Ordering::SeqCst), 4);
    assert_eq!(cell.get(), "m1:9333");
}

#[tokio::test]
async fn test_bootstrap_stops_on_shutdown() {
    let cluster = ScriptedCluster::new(&["m1:9333"]);
    cluster.set_up("m1:9333", false);
    let (mut sup, _cell, tx) = supervisor("m1:9333", cluster, fast_config());

    let stop = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tx
    });

    let bootstrapped = tokio::time::timeout(Duration::from_secs(5), sup.bootstrap())
        .await
        .expect("bootstrap should observe shutdown");
    assert!(!bootstrapped);
    stop.await.unwrap();
}

/// Every master is unreachable but discovery answers with blank addresses
struct BlankMembership;

#[async_trait]
impl MasterClient for BlankMembership {
    async fn probe(&self, addr: &str) -> Result<()> {
        Err(Error::ProbeFailed {
            addr: addr.to_string(),
            reason: "timeout".into(),
        })
    }

    async fn list_masters(&self, _addr: &str) -> Result<Vec<String>> {
        Ok(vec![String::new(), " ".into()])
    }
}

#[tokio::test]
async fn test_blank_membership_never_installs_empty_address() {
    let (tx, rx) = watch::channel(false);
    let cell = MasterCell::new("m1:9333");
    let mut sup = MasterSupervisor::new(cell.clone(), Arc::new(BlankMembership), fast_config(), rx);

    for _ in 0..3 {
        let iteration = sup.run_once().await;
        assert_eq!(iteration.state, ConnectionState::Disconnected);
        assert!(!iteration.master.is_empty());
    }
    assert_eq!(cell.get(), "m1:9333");
    drop(tx);
}

#[tokio::test]
async fn test_spawned_loop_joins_after_shutdown() {
    let cluster = ScriptedCluster::new(&["m1:9333", "m2:9333"]);
    let (mut sup, cell, tx) = supervisor("m1:9333", cluster.clone(), fast_config());
    assert!(sup.bootstrap().await);

    cluster.set_up("m1:9333", false);
    let handle = sup.spawn();

    let mut switched = false;
    for _ in 0..200 {
        if cell.get() == "m2:9333" {
            switched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(switched, "loop should have failed over to m2");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor should stop")
        .unwrap();
}

/// Health and discovery answers configured separately per master
struct SplitCluster {
    healthy: HashSet<String>,
    membership: Vec<(String, Vec<String>)>,
}

#[async_trait]
impl MasterClient for SplitCluster {
    async fn probe(&self, addr: &str) -> Result<()> {
        if self.healthy.contains(addr) {
            Ok(())
        } else {
            Err(Error::ProbeFailed {
                addr: addr.to_string(),
                reason: "no route to host".into(),
            })
        }
    }

    async fn list_masters(&self, addr: &str) -> Result<Vec<String>> {
        self.membership
            .iter()
            .find(|(node, _)| node == addr)
            .map(|(_, members)| members.clone())
            .ok_or_else(|| Error::Http(format!("{} unavailable", addr)))
    }
}

#[tokio::test]
async fn test_failing_seed_hands_over_to_reported_member() {
    let cluster = Arc::new(SplitCluster {
        healthy: ["m2:9333".to_string()].into_iter().collect(),
        membership: vec![(
            "m1:9333".to_string(),
            vec!["m2:9333".to_string(), "m3:9333".to_string()],
        )],
    });
    let (_tx, rx) = watch::channel(false);
    let cell = MasterCell::new("m1:9333");
    let mut sup = MasterSupervisor::new(cell.clone(), cluster, SupervisorConfig::default(), rx);

    let iteration = sup.run_once().await;

    assert_eq!(iteration.state, ConnectionState::Connected);
    assert_eq!(iteration.master, "m2:9333");
    assert_eq!(cell.get(), "m2:9333");
    assert!(iteration.sleep >= Duration::from_secs(10));
    assert!(iteration.sleep < Duration::from_secs(20));
}
