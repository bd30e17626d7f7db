//! The gossip cluster (§4.7): a live member set maintained by a
//! peer-to-peer SWIM-style failure detector.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chitchat::transport::UdpTransport;
use chitchat::{spawn_chitchat, ChitchatConfig, ChitchatHandle, ChitchatId, FailureDetectorConfig};
use tokio::sync::watch;

use crate::error::GossipError;
use crate::metrics;

/// How long a member can go unheard-from before it is pruned from the
/// live set, even if the underlying gossip engine still lists it as
/// suspect rather than dead.
const DEAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub node_id: String,
    pub address: SocketAddr,
    pub attributes: HashMap<String, String>,
    /// When this node was last observed in `live_nodes()`.
    pub last_seen: Instant,
}

#[derive(Clone, Debug)]
pub enum MemberEvent {
    Joined(Member),
    Left(String),
}

pub struct GossipCluster {
    handle: ChitchatHandle,
    node_id: String,
    /// The last-known state of each member, refreshed on every `members()`
    /// call and pruned once a member has gone `DEAD_TIMEOUT` unheard-from.
    last_known: std::sync::Mutex<HashMap<String, Member>>,
}

impl GossipCluster {
    /// Joins the cluster by gossiping with `seeds`. Fails fast only when
    /// `seeds` is non-empty and none of them ever respond (§7
    /// `GossipJoinFailed`); an empty seed list is a legitimate first-node
    /// bootstrap.
    pub async fn join(
        node_id: String,
        advertise_addr: SocketAddr,
        gossip_listen_addr: SocketAddr,
        seeds: Vec<String>,
        attributes: HashMap<String, String>,
    ) -> Result<GossipCluster, GossipError> {
        let chitchat_id = ChitchatId::new(node_id.clone(), 0, advertise_addr);
        let mut config = ChitchatConfig::default();
        config.chitchat_id = chitchat_id;
        config.gossip_interval = Duration::from_millis(500);
        config.listen_addr = gossip_listen_addr;
        config.seed_nodes = seeds;
        config.failure_detector_config = FailureDetectorConfig::default();

        let handle = spawn_chitchat(config, Vec::new(), &UdpTransport)
            .await
            .map_err(|e| GossipError::Transport(e.to_string()))?;

        {
            let chitchat = handle.chitchat();
            let mut guard = chitchat.lock().await;
            for (key, value) in &attributes {
                guard.self_node_state().set(key, value);
            }
        }

        Ok(GossipCluster {
            handle,
            node_id,
            last_known: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Current live members, pruned for `DEAD_TIMEOUT` silence.
    pub async fn members(&self) -> Vec<Member> {
        let chitchat = self.handle.chitchat();
        let guard = chitchat.lock().await;
        let mut last_known = self.last_known.lock().unwrap();
        let now = Instant::now();
        for chitchat_id in guard.live_nodes() {
            if let Some(state) = guard.node_state(chitchat_id) {
                let attributes = state
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                last_known.insert(
                    chitchat_id.node_id.clone(),
                    Member {
                        node_id: chitchat_id.node_id.clone(),
                        address: chitchat_id.gossip_advertise_addr,
                        attributes,
                        last_seen: now,
                    },
                );
            }
        }
        last_known.retain(|_, member| is_fresh(member.last_seen, now));
        let out: Vec<Member> = last_known.values().cloned().collect();
        metrics::CLUSTER_MEMBERS.set(out.len() as i64);
        out
    }

    /// A lazily-restartable stream of membership changes, delivered in
    /// causal order per subscriber (§5 Ordering guarantees).
    pub fn subscribe(&self) -> watch::Receiver<Vec<ChitchatId>> {
        self.handle.chitchat().blocking_lock().live_nodes_watcher()
    }

    pub async fn leave(self) -> Result<(), GossipError> {
        self.handle
            .shutdown()
            .await
            .map_err(|e| GossipError::Transport(e.to_string()))
    }
}

/// Whether a member last seen at `seen` is still within `DEAD_TIMEOUT` of
/// `now`, used to prune entries `chitchat` itself has not yet marked dead.
fn is_fresh(seen: Instant, now: Instant) -> bool {
    now.duration_since(seen) < DEAD_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_within_dead_timeout_is_fresh() {
        let now = Instant::now();
        let seen = now - Duration::from_secs(1);
        assert!(is_fresh(seen, now));
    }

    #[test]
    fn member_past_dead_timeout_is_not_fresh() {
        let now = Instant::now();
        let seen = now - (DEAD_TIMEOUT + Duration::from_secs(1));
        assert!(!is_fresh(seen, now));
    }

    #[test]
    fn member_event_variants_carry_expected_data() {
        let joined = MemberEvent::Joined(Member {
            node_id: "a".to_string(),
            address: "127.0.0.1:7280".parse().unwrap(),
            attributes: HashMap::new(),
            last_seen: Instant::now(),
        });
        let left = MemberEvent::Left("a".to_string());
        assert!(matches!(joined, MemberEvent::Joined(_)));
        assert!(matches!(left, MemberEvent::Left(ref id) if id == "a"));
    }
}
