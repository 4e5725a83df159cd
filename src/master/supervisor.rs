//! Background task that keeps the filer pointed at a healthy master
//!
//! The supervisor bootstraps against the seed master once, then polls the
//! current master forever. When the current master stops answering it asks
//! the [`MasterRegistry`] for other candidates and installs the first healthy
//! one into the shared [`MasterCell`]. Poll pacing depends on whether the
//! last check succeeded.

use crate::common::{Result, SupervisorConfig};
use crate::master::cell::MasterCell;
use crate::master::client::MasterClient;
use crate::master::registry::MasterRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Whether the last health check found a live master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Outcome of one supervisor iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iteration {
    pub state: ConnectionState,
    /// Master installed after this iteration
    pub master: String,
    /// How long the loop waits before the next check
    pub sleep: Duration,
}

type JitterFn = Box<dyn FnMut() -> f64 + Send>;

pub struct MasterSupervisor {
    cell: MasterCell,
    registry: MasterRegistry,
    client: Arc<dyn MasterClient>,
    config: SupervisorConfig,
    state: ConnectionState,
    jitter: JitterFn,
    shutdown: watch::Receiver<bool>,
}

impl MasterSupervisor {
    /// Build a supervisor whose registry is seeded with the cell's current
    /// address.
    pub fn new(
        cell: MasterCell,
        client: Arc<dyn MasterClient>,
        config: SupervisorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let registry = MasterRegistry::new(vec![cell.get()], client.clone());
        Self {
            cell,
            registry,
            client,
            config,
            state: ConnectionState::Connected,
            jitter: Box::new(rand::random::<f64>),
            shutdown,
        }
    }

    /// Replace the source of poll jitter; values are expected in [0, 1)
    pub fn with_jitter(mut self, jitter: impl FnMut() -> f64 + Send + 'static) -> Self {
        self.jitter = Box::new(jitter);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Block until some master answers a membership query.
    ///
    /// Retries forever at the bootstrap interval. Returns false only if
    /// shutdown was requested first.
    pub async fn bootstrap(&mut self) -> bool {
        tracing::info!("Filer server bootstraps with master {}", self.cell.get());
        loop {
            match self.registry.find_master().await {
                Ok(master) => {
                    tracing::info!(
                        "Master cluster discovered through {}: {:?}",
                        master,
                        self.registry.candidates()
                    );
                    return true;
                }
                Err(e) => {
                    tracing::info!("Filer server failed to get master cluster info: {}", e);
                    if self.sleep_or_shutdown(self.config.bootstrap_retry()).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Check `current`, failing over to other candidates if it is down
    pub async fn detect_healthy_master(&mut self, current: &str) -> Result<String> {
        let first = match self.client.probe(current).await {
            Ok(()) => return Ok(current.to_string()),
            Err(e) => e,
        };
        tracing::debug!("Master {} failed health check: {}", current, first);

        self.registry.reset();
        let mut last_err = first;
        for attempt in 1..=self.config.failover_attempts {
            match self.registry.find_master().await {
                Ok(candidate) => match self.client.probe(&candidate).await {
                    Ok(()) => return Ok(candidate),
                    Err(e) => {
                        tracing::debug!("Failover attempt {} to {}: {}", attempt, candidate, e);
                        last_err = e;
                    }
                },
                Err(e) => {
                    tracing::debug!("Failover attempt {}: {}", attempt, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// One health check, install and pacing decision
    pub async fn run_once(&mut self) -> Iteration {
        let current = self.cell.get();
        tracing::trace!("Filer server sending to master {}", current);

        let state = match self.detect_healthy_master(&current).await {
            Ok(master) => {
                if self.cell.set(&master) {
                    tracing::info!("Switched master from {} to {}", current, master);
                }
                if self.state == ConnectionState::Disconnected {
                    tracing::info!("Filer server connected with master at {}", master);
                }
                ConnectionState::Connected
            }
            Err(e) => {
                if self.state == ConnectionState::Connected {
                    tracing::warn!("Filer server failed to talk with master {}: {}", current, e);
                }
                ConnectionState::Disconnected
            }
        };

        self.state = state;
        Iteration {
            state,
            master: self.cell.get(),
            sleep: self.poll_interval(state),
        }
    }

    /// Wait before the next check: jittered base interval while connected,
    /// short fixed interval while not
    pub fn poll_interval(&mut self, state: ConnectionState) -> Duration {
        match state {
            ConnectionState::Connected => {
                let jitter = (self.jitter)();
                let jitter = if (0.0..1.0).contains(&jitter) { jitter } else { 0.0 };
                let base = self.config.connected_poll();
                // mul_f64 rounds; keep the result strictly below twice the base
                let extra = base
                    .mul_f64(jitter)
                    .min(base.saturating_sub(Duration::from_nanos(1)));
                base + extra
            }
            ConnectionState::Disconnected => self.config.disconnected_poll(),
        }
    }

    /// Poll until shutdown
    pub async fn run(mut self) {
        loop {
            let iteration = self.run_once().await;
            if self.sleep_or_shutdown(iteration.sleep).await {
                tracing::info!("Master supervisor stopped");
                return;
            }
        }
    }

    /// Run the polling loop on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Sleep for `duration`; true if shutdown was requested meanwhile
    async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        if *self.shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            changed = self.shutdown.changed() => changed.is_err() || *self.shutdown.borrow(),
        }
    }
}

impl std::fmt::Debug for MasterSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSupervisor")
            .field("master", &self.cell.get())
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysUp;

    #[async_trait]
    impl MasterClient for AlwaysUp {
        async fn probe(&self, _addr: &str) -> Result<()> {
            Ok(())
        }

        async fn list_masters(&self, addr: &str) -> Result<Vec<String>> {
            Ok(vec![addr.to_string()])
        }
    }

    fn supervisor(jitter: f64) -> (MasterSupervisor, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let sup = MasterSupervisor::new(
            MasterCell::new("m1:9333"),
            Arc::new(AlwaysUp),
            SupervisorConfig::default(),
            rx,
        )
        .with_jitter(move || jitter);
        (sup, tx)
    }

    #[test]
    fn test_poll_interval_bounds() {
        let (mut sup, _tx) = supervisor(0.0);
        assert_eq!(
            sup.poll_interval(ConnectionState::Connected),
            Duration::from_secs(10)
        );

        let (mut sup, _tx) = supervisor(0.999);
        let d = sup.poll_interval(ConnectionState::Connected);
        assert!(d >= Duration::from_secs(10) && d < Duration::from_secs(20));

        assert_eq!(
            sup.poll_interval(ConnectionState::Disconnected),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_jitter_near_one_stays_below_double() {
        let (mut sup, _tx) = supervisor(0.999_999_999_99);
        let d = sup.poll_interval(ConnectionState::Connected);
        assert!(d < Duration::from_secs(20));
        assert!(d > Duration::from_millis(19_999));
    }

    #[test]
    fn test_out_of_range_jitter_is_ignored() {
        let (mut sup, _tx) = supervisor(1.5);
        assert_eq!(
            sup.poll_interval(ConnectionState::Connected),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_default_jitter_in_range() {
        let (tx, rx) = watch::channel(false);
        let mut sup = MasterSupervisor::new(
            MasterCell::new("m1:9333"),
            Arc::new(AlwaysUp),
            SupervisorConfig::default(),
            rx,
        );
        for _ in 0..100 {
            let d = sup.poll_interval(ConnectionState::Connected);
            assert!(d >= Duration::from_secs(10) && d < Duration::from_secs(20));
        }
        drop(tx);
    }

    #[tokio::test]
    async fn test_healthy_master_kept() {
        let (mut sup, _tx) = supervisor(0.5);
        let iteration = sup.run_once().await;
        assert_eq!(iteration.state, ConnectionState::Connected);
        assert_eq!(iteration.master, "m1:9333");
        assert_eq!(iteration.sleep, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let (mut sup, tx) = supervisor(0.0);
        tx.send(true).unwrap();
        assert!(sup.sleep_or_shutdown(Duration::from_secs(3600)).await);
    }
}
