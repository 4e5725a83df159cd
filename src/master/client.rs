//! Network calls the filer makes against master nodes

use crate::common::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health check and membership discovery against a master
#[async_trait]
pub trait MasterClient: Send + Sync {
    /// Lightweight liveness check; any transport error is a failure
    async fn probe(&self, addr: &str) -> Result<()>;

    /// Current master membership as reported by `addr`
    async fn list_masters(&self, addr: &str) -> Result<Vec<String>>;
}

/// Body of `GET /cluster/status` on a master
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(rename = "IsLeader", default)]
    pub is_leader: bool,
    #[serde(rename = "Leader", default)]
    pub leader: String,
    #[serde(rename = "Peers", default)]
    pub peers: Vec<String>,
}

impl ClusterStatus {
    /// Peers, plus the leader when the answering node is the leader
    pub fn members(self) -> Vec<String> {
        let mut members = self.peers;
        if self.is_leader && !self.leader.is_empty() && !members.contains(&self.leader) {
            members.push(self.leader);
        }
        members
    }
}

/// reqwest-backed client with a hard per-request timeout
#[derive(Clone)]
pub struct HttpMasterClient {
    client: Client,
}

impl HttpMasterClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MasterClient for HttpMasterClient {
    async fn probe(&self, addr: &str) -> Result<()> {
        let url = format!("http://{}/stats", addr);
        tracing::trace!("Connecting to {} ...", url);
        self.client
            .get(&url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| Error::ProbeFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })
    }

    async fn list_masters(&self, addr: &str) -> Result<Vec<String>> {
        let url = format!("http://{}/cluster/status", addr);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "list masters on {} failed {} {}",
                addr, status, body
            )));
        }
        let cluster = resp.json::<ClusterStatus>().await?;
        Ok(cluster.members())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_status_members() {
        let status: ClusterStatus = serde_json::from_str(
            r#"{"IsLeader":true,"Leader":"m1:9333","Peers":["m2:9333","m3:9333"]}"#,
        )
        .unwrap();
        assert_eq!(status.members(), vec!["m2:9333", "m3:9333", "m1:9333"]);
    }

    #[test]
    fn test_follower_status_omits_leader() {
        let status: ClusterStatus =
            serde_json::from_str(r#"{"Leader":"m1:9333","Peers":["m2:9333"]}"#).unwrap();
        assert_eq!(status.members(), vec!["m2:9333"]);
    }

    #[test]
    fn test_empty_status() {
        let status: ClusterStatus = serde_json::from_str("{}").unwrap();
        assert!(status.members().is_empty());
    }

    #[tokio::test]
    async fn test_health_check_unreachable_fails() {
        let client = HttpMasterClient::new(Duration::from_millis(200)).unwrap();
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let err = client.probe("127.0.0.1:9").await.unwrap_err();
        assert!(matches!(err, Error::ProbeFailed { .. }));
    }
}
