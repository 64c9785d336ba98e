//! Resolution policies for retired keys.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use bibsync_types::RecordKey;

use crate::error::Result;
use crate::traits::IdentityLog;

/// How far to follow identity mappings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ResolvePolicy {
    /// Follow at most one mapping.
    #[default]
    SingleHop,
    /// Follow mappings until a key with no mapping, a cycle, or `max_hops`.
    Chase { max_hops: usize },
}

/// The outcome of resolving one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// The key to read.
    pub key: RecordKey,
    /// Number of mappings followed.
    pub hops: usize,
    /// The walk revisited a key.
    pub cycle: bool,
    /// The walk stopped at `max_hops` with a mapping still pending.
    pub truncated: bool,
}

impl Resolution {
    fn unchanged(key: RecordKey) -> Self {
        Self {
            key,
            hops: 0,
            cycle: false,
            truncated: false,
        }
    }
}

/// Resolve `key` against `log` under `policy`.
pub fn resolve_with<L: IdentityLog + ?Sized>(
    log: &L,
    key: &RecordKey,
    policy: ResolvePolicy,
) -> Result<Resolution> {
    match policy {
        ResolvePolicy::SingleHop => Ok(match log.mapping(key)? {
            Some(m) => Resolution {
                key: m.successor,
                hops: 1,
                cycle: false,
                truncated: false,
            },
            None => Resolution::unchanged(key.clone()),
        }),
        ResolvePolicy::Chase { max_hops } => chase(log, key, max_hops),
    }
}

fn chase<L: IdentityLog + ?Sized>(log: &L, key: &RecordKey, max_hops: usize) -> Result<Resolution> {
    let mut seen = HashSet::new();
    seen.insert(key.clone());
    let mut out = Resolution::unchanged(key.clone());

    while let Some(m) = log.mapping(&out.key)? {
        if out.hops == max_hops {
            out.truncated = true;
            warn!(start = %key, at = %out.key, max_hops, "mapping chase hit hop limit");
            break;
        }
        if !seen.insert(m.successor.clone()) {
            out.cycle = true;
            warn!(start = %key, at = %out.key, "mapping cycle detected");
            break;
        }
        out.key = m.successor;
        out.hops += 1;
    }
    Ok(out)
}
