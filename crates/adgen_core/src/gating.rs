use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{Candidate, CandidateId, JobId};

/// Unlocked candidates per job group for accounts without an entitlement.
pub const DEFAULT_FREE_ITEMS_PER_JOB: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "plan")]
pub enum Entitlement {
    #[default]
    Free,
    Paid { tier: String },
}

impl Entitlement {
    pub fn is_entitled(&self) -> bool {
        matches!(self, Entitlement::Paid { .. })
    }
}

/// Decides which candidates render obscured.
///
/// Holds no cache: callers invoke [`GatingPolicy::apply`] on every render of a
/// candidate collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatingPolicy {
    free_items_per_job: usize,
}

impl Default for GatingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FREE_ITEMS_PER_JOB)
    }
}

impl GatingPolicy {
    pub fn new(free_items_per_job: usize) -> Self {
        Self { free_items_per_job }
    }

    pub fn free_items_per_job(&self) -> usize {
        self.free_items_per_job
    }

    /// Returns the locked candidate ids. Each group is one job's candidates;
    /// within a group the oldest `free_items_per_job` stay unlocked.
    pub fn apply<'a, G, I>(&self, groups: G, entitlement: &Entitlement) -> HashSet<CandidateId>
    where
        G: IntoIterator<Item = I>,
        I: IntoIterator<Item = &'a Candidate>,
    {
        let mut locked = HashSet::new();
        if entitlement.is_entitled() {
            return locked;
        }
        for group in groups {
            let mut items: Vec<&Candidate> = group.into_iter().collect();
            items.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.ordinal.cmp(&b.ordinal))
                    .then_with(|| a.id.cmp(&b.id))
            });
            locked.extend(
                items
                    .into_iter()
                    .skip(self.free_items_per_job)
                    .map(|candidate| candidate.id.clone()),
            );
        }
        locked
    }
}

/// `apply(itemsByJob, entitled)` with the default free allowance.
pub fn apply(items_by_job: &BTreeMap<JobId, Vec<Candidate>>, entitled: bool) -> HashSet<CandidateId> {
    let entitlement = if entitled {
        Entitlement::Paid {
            tier: "paid".to_string(),
        }
    } else {
        Entitlement::Free
    };
    GatingPolicy::default().apply(items_by_job.values(), &entitlement)
}
