//! The DNS programmer (§4.8): reconciles the gossip member set with an
//! external authoritative record set.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, RrType, ResourceRecord, ResourceRecordSet,
};
use aws_sdk_route53::Client;

use crate::cluster::Member;
use crate::error::DnsError;

pub const RECONCILE_DEBOUNCE: Duration = Duration::from_secs(5);

/// The deduplicated set of advertise IPs the A-record should contain for
/// the current member set. A node that appears more than once (e.g. two
/// gossip identities behind the same host) collapses to a single address.
fn target_addresses(members: &[Member]) -> HashSet<IpAddr> {
    members.iter().map(|m| m.address.ip()).collect()
}

pub struct DnsProgrammer {
    client: Client,
    hosted_zone_id: String,
    record_name: String,
}

impl DnsProgrammer {
    pub fn new(client: Client, hosted_zone_id: String, record_name: String) -> Self {
        DnsProgrammer {
            client,
            hosted_zone_id,
            record_name,
        }
    }

    /// Computes the target A-record set from `members`, diffs it against
    /// what Route53 currently has, and applies a single batched
    /// upsert/delete (§4.8 steps 1-3). Idempotent: calling it again with
    /// an unchanged member set is a no-op change batch.
    pub async fn reconcile(&self, members: &[Member]) -> Result<(), DnsError> {
        let target = target_addresses(members);
        let current = self.current_addresses().await?;

        if target == current {
            return Ok(());
        }

        let mut records: Vec<ResourceRecord> = target
            .iter()
            .map(|ip| ResourceRecord::builder().value(ip.to_string()).build().expect("ip is valid"))
            .collect();
        records.sort_by(|a, b| a.value().cmp(b.value()));

        let change = if target.is_empty() {
            Change::builder()
                .action(ChangeAction::Delete)
                .resource_record_set(self.record_set(current.into_iter().map(|ip| {
                    ResourceRecord::builder().value(ip.to_string()).build().expect("ip is valid")
                }).collect()))
                .build()
                .map_err(|e| DnsError::ReconcileFailed(e.to_string()))?
        } else {
            Change::builder()
                .action(ChangeAction::Upsert)
                .resource_record_set(self.record_set(records))
                .build()
                .map_err(|e| DnsError::ReconcileFailed(e.to_string()))?
        };

        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(|e| DnsError::ReconcileFailed(e.to_string()))?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| DnsError::ReconcileFailed(e.to_string()))?;
        Ok(())
    }

    fn record_set(&self, records: Vec<ResourceRecord>) -> ResourceRecordSet {
        ResourceRecordSet::builder()
            .name(&self.record_name)
            .r#type(RrType::A)
            .ttl(30)
            .set_resource_records(Some(records))
            .build()
            .expect("name and type are always set")
    }

    async fn current_addresses(&self) -> Result<HashSet<IpAddr>, DnsError> {
        let response = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .start_record_name(&self.record_name)
            .start_record_type(RrType::A)
            .max_items(1)
            .send()
            .await
            .map_err(|e| DnsError::ReconcileFailed(e.to_string()))?;

        let mut out = HashSet::new();
        for set in response.resource_record_sets() {
            if set.name().trim_end_matches('.') != self.record_name.trim_end_matches('.') {
                continue;
            }
            for record in set.resource_records() {
                if let Ok(ip) = record.value().parse::<IpAddr>() {
                    out.insert(ip);
                }
            }
        }
        Ok(out)
    }
}

/// Runs the reconcile loop: waits for a membership change, then
/// debounces further changes within `RECONCILE_DEBOUNCE` before calling
/// `reconcile` once with the settled member set (§4.8 step 4). A failed
/// reconcile is logged, not retried immediately: the next membership
/// event (or the next poll tick below) retries naturally.
pub async fn run_reconciler(
    cluster: std::sync::Arc<crate::cluster::GossipCluster>,
    programmer: DnsProgrammer,
    debounce: Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    let mut poll = tokio::time::interval(debounce);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = poll.tick() => {
                let members = cluster.members().await;
                if let Err(e) = programmer.reconcile(&members).await {
                    log::warn!("dns reconcile failed, will retry next tick: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn debounce_matches_spec_default() {
        assert_eq!(RECONCILE_DEBOUNCE, Duration::from_secs(5));
    }

    fn member(addr: &str, node_id: &str) -> Member {
        Member {
            node_id: node_id.to_string(),
            address: addr.parse::<SocketAddr>().unwrap(),
            attributes: Default::default(),
            last_seen: std::time::Instant::now(),
        }
    }

    #[test]
    fn target_addresses_dedupes_shared_hosts() {
        let members = vec![
            member("10.0.0.1:7280", "a"),
            member("10.0.0.1:7280", "b"),
            member("10.0.0.2:7280", "c"),
        ];
        let addrs = target_addresses(&members);
        assert_eq!(addrs.len(), 2);
    }

    #[test]
    fn target_addresses_of_empty_cluster_is_empty() {
        assert!(target_addresses(&[]).is_empty());
    }
}
