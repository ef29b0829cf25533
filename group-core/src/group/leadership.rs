// group-core/src/group/leadership.rs

//! Leader election over a single base key.
//!
//! | Stored leader | Ping alive | Outcome                                  |
//! |---------------|------------|------------------------------------------|
//! | absent        | any        | claim with SETNX, purge old memberships  |
//! | self          | any        | nothing to do                            |
//! | other         | yes        | `LeadershipConflict`                     |
//! | other         | no         | delete stale record, then claim          |

use crate::error::{GroupError, Result};
use crate::identity::LeaderId;
use crate::store::StoreClient;

use super::keys::GroupKeys;

/// How initialization settled leadership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leadership {
    /// No leader was recorded; this process claimed the key.
    Claimed { purge: PurgeReport },
    /// A dead leader's record was replaced.
    Reclaimed { previous: LeaderId, purge: PurgeReport },
    /// The record already named this process.
    AlreadyHeld,
    /// Store integration is turned off.
    Disabled,
}

impl Leadership {
    /// Returns true if this process wrote the leader record.
    pub fn is_new_claim(&self) -> bool {
        matches!(self, Self::Claimed { .. } | Self::Reclaimed { .. })
    }

    pub fn purge(&self) -> Option<&PurgeReport> {
        match self {
            Self::Claimed { purge } | Self::Reclaimed { purge, .. } => Some(purge),
            Self::AlreadyHeld | Self::Disabled => None,
        }
    }
}

/// Result of clearing membership sets left by a previous generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Keys matched by the purge pattern.
    pub scanned: usize,
    /// Non-empty sets deleted.
    pub deleted: usize,
    /// Keys that could not be inspected or deleted.
    pub failed: usize,
}

pub(crate) async fn resolve(
    client: &mut dyn StoreClient,
    keys: &GroupKeys,
    me: &LeaderId,
) -> Result<Leadership> {
    let has_ping = client.exists(keys.ping()).await?;
    let stored = client.get(keys.leader()).await?;

    match stored {
        None => {
            let purge = claim(client, keys, me).await?;
            tracing::info!("Claimed group leadership as {}", me);
            Ok(Leadership::Claimed { purge })
        }
        Some(holder) if holder == me.as_str() => {
            tracing::info!("Group leadership already held by {}", me);
            Ok(Leadership::AlreadyHeld)
        }
        Some(holder) if has_ping => Err(GroupError::leadership_conflict(holder, me.as_str())),
        Some(holder) => {
            tracing::info!("Leader {} stopped heartbeating, reclaiming", holder);
            client.del(keys.leader()).await?;
            let purge = claim(client, keys, me).await?;
            tracing::info!("Reclaimed group leadership as {}", me);
            Ok(Leadership::Reclaimed {
                previous: LeaderId::from(holder),
                purge,
            })
        }
    }
}

async fn claim(client: &mut dyn StoreClient, keys: &GroupKeys, me: &LeaderId) -> Result<PurgeReport> {
    if !client.set_nx(keys.leader(), me.as_str()).await? {
        // Someone claimed between our read and our write.
        let winner = client.get(keys.leader()).await?.unwrap_or_default();
        return Err(GroupError::leadership_conflict(winner, me.as_str()));
    }
    Ok(purge_groups(client, keys).await)
}

/// Deletes every non-empty membership set under the base key.
///
/// Best-effort: failures are logged and counted, never returned.
pub(crate) async fn purge_groups(client: &mut dyn StoreClient, keys: &GroupKeys) -> PurgeReport {
    let mut report = PurgeReport::default();

    let found = match client.keys(keys.purge_pattern()).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Failed to list group keys for purge: {}", e);
            return report;
        }
    };
    report.scanned = found.len();

    for key in found {
        match client.scard(&key).await {
            Ok(0) => {}
            Ok(_) => match client.del(&key).await {
                Ok(_) => report.deleted += 1,
                Err(e) => {
                    tracing::warn!("Failed to purge group {}: {}", key, e);
                    report.failed += 1;
                }
            },
            Err(e) => {
                tracing::warn!("Failed to inspect group {}: {}", key, e);
                report.failed += 1;
            }
        }
    }

    if report.scanned > 0 {
        tracing::info!(
            "Purged {} of {} stale group keys ({} failed)",
            report.deleted,
            report.scanned,
            report.failed
        );
    }
    report
}
