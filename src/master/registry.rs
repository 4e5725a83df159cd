//! Known master nodes and round-robin selection among them

use crate::common::{Error, Result};
use crate::master::client::MasterClient;
use std::sync::Arc;

/// Candidate master addresses discovered from the cluster.
///
/// `known` is what discovery queries, in order: the master that answered
/// last, the seeds, then the rest of the last reported membership. `candidates` is the current round-robin set; once
/// the cursor runs past its end the next lookup rediscovers.
pub struct MasterRegistry {
    client: Arc<dyn MasterClient>,
    seeds: Vec<String>,
    known: Vec<String>,
    candidates: Vec<String>,
    cursor: usize,
}

impl MasterRegistry {
    pub fn new(seeds: Vec<String>, client: Arc<dyn MasterClient>) -> Self {
        let seeds = dedup(seeds);
        Self {
            client,
            known: seeds.clone(),
            seeds,
            candidates: Vec::new(),
            cursor: 0,
        }
    }

    /// Next master to try, rediscovering the membership when the candidate
    /// set is empty or used up.
    pub async fn find_master(&mut self) -> Result<String> {
        if let Some(addr) = self.next_candidate() {
            return Ok(addr);
        }
        self.discover().await?;
        self.next_candidate().ok_or(Error::NoMasterAvailable)
    }

    /// Drop the candidate set so the next lookup asks the cluster again
    pub fn reset(&mut self) {
        if !self.candidates.is_empty() {
            tracing::debug!(
                "Resetting master candidates {:?} at position {}",
                self.candidates,
                self.cursor
            );
        }
        self.candidates.clear();
        self.cursor = 0;
    }

    /// Current round-robin candidates
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    fn next_candidate(&mut self) -> Option<String> {
        let addr = self.candidates.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(addr)
    }

    async fn discover(&mut self) -> Result<()> {
        for addr in self.known.clone() {
            tracing::trace!("Listing masters on {}", addr);
            match self.client.list_masters(&addr).await {
                Ok(members) if !members.is_empty() => {
                    let mut candidates = members;
                    candidates.push(addr.clone());
                    self.candidates = dedup(candidates);
                    self.cursor = 0;

                    // Next discovery asks the node that answered, then the seeds
                    let mut known = vec![addr];
                    known.extend(self.seeds.iter().cloned());
                    known.extend(self.candidates.iter().cloned());
                    self.known = dedup(known);

                    tracing::debug!("Current master nodes: {:?}", self.candidates);
                    return Ok(());
                }
                Ok(_) => {
                    tracing::debug!("Master {} reported an empty membership", addr);
                }
                Err(e) => {
                    tracing::debug!("Failed listing masters on {}: {}", addr, e);
                }
            }
        }
        Err(Error::NoMasterAvailable)
    }
}

/// Remove empty and repeated addresses, keeping first occurrences in order
fn dedup(addrs: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let addr = addr.trim().to_string();
        if !addr.is_empty() && !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}
