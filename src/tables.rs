use std::collections::BTreeMap;

use anyhow::Result;

/// Vote ledger for one still-unmatched source symbol. Tracks the accumulated
/// weight per candidate target, the current first-place candidate, and the
/// runner-up total (the runner-up identity is never needed).
#[derive(Clone, Debug)]
pub(crate) struct PendingEntry {
    source: String,
    votes: BTreeMap<String, u32>,
    first: Option<(String, u32)>,
    second_votes: u32,
    owner_lock: Option<String>,
}

impl PendingEntry {
    fn new(source: String) -> Self {
        Self {
            source,
            votes: BTreeMap::new(),
            first: None,
            second_votes: 0,
            owner_lock: None,
        }
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn owner_lock(&self) -> Option<&str> {
        self.owner_lock.as_deref()
    }

    pub(crate) fn first_target(&self) -> Option<(&str, u32)> {
        self.first
            .as_ref()
            .map(|(target, votes)| (target.as_str(), *votes))
    }

    pub(crate) fn second_votes(&self) -> u32 {
        self.second_votes
    }

    pub(crate) fn gap(&self) -> u32 {
        match &self.first {
            Some((_, votes)) => votes.saturating_sub(self.second_votes),
            None => 0,
        }
    }

    pub(crate) fn votes_for(&self, target: &str) -> u32 {
        self.votes.get(target).copied().unwrap_or(0)
    }

    pub(crate) fn add_vote(&mut self, target: &str, weight: u32) {
        let slot = self.votes.entry(target.to_string()).or_insert(0);
        *slot += weight;
        let total = *slot;

        self.first = match self.first.take() {
            None => Some((target.to_string(), total)),
            Some((leader, _)) if leader == target => Some((leader, total)),
            Some((_, leader_votes)) if total > leader_votes => {
                self.second_votes = leader_votes;
                Some((target.to_string(), total))
            }
            Some(leader) => {
                if total > self.second_votes {
                    self.second_votes = total;
                }
                Some(leader)
            }
        };
    }

    /// Drop the full accumulated weight for `target` and recompute the
    /// first/second totals from the remaining ledger.
    pub(crate) fn remove_vote(&mut self, target: &str) {
        if self.votes.remove(target).is_some() {
            self.recompute();
        }
    }

    /// Restrict the entry to targets owned by `owner`; every other candidate
    /// loses its votes.
    pub(crate) fn set_owner_lock(&mut self, owner: &str, target_owner: impl Fn(&str) -> String) {
        self.owner_lock = Some(owner.to_string());
        let stale: Vec<String> = self
            .votes
            .keys()
            .filter(|target| target_owner(target) != owner)
            .cloned()
            .collect();
        for target in stale {
            self.votes.remove(&target);
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        let mut first: Option<(String, u32)> = None;
        let mut second = 0;
        for (target, votes) in &self.votes {
            let votes = *votes;
            if first.as_ref().map_or(true, |(_, leader)| votes > *leader) {
                if let Some((_, leader)) = &first {
                    second = *leader;
                }
                first = Some((target.clone(), votes));
            } else if votes > second {
                second = votes;
            }
        }
        self.first = first;
        self.second_votes = second;
    }
}

/// Pending and confirmed matches for one symbol kind. A source key lives in
/// the pending map or the forward map, never both; a target key is claimed
/// by at most one forward entry.
#[derive(Debug, Default)]
pub(crate) struct MatchTable {
    pending: BTreeMap<String, PendingEntry>,
    forward: BTreeMap<String, String>,
    inverse: BTreeMap<String, String>,
}

impl MatchTable {
    pub(crate) fn confirmed_target(&self, source: &str) -> Option<&str> {
        self.forward.get(source).map(String::as_str)
    }

    pub(crate) fn confirmed_source(&self, target: &str) -> Option<&str> {
        self.inverse.get(target).map(String::as_str)
    }

    pub(crate) fn is_target_claimed(&self, target: &str) -> bool {
        self.inverse.contains_key(target)
    }

    pub(crate) fn pending_entry(&self, source: &str) -> Option<&PendingEntry> {
        self.pending.get(source)
    }

    pub(crate) fn pending_entry_mut(&mut self, source: &str) -> Option<&mut PendingEntry> {
        self.pending.get_mut(source)
    }

    /// Entries are created lazily on first vote.
    pub(crate) fn ensure_pending(&mut self, source: &str) -> &mut PendingEntry {
        self.pending
            .entry(source.to_string())
            .or_insert_with(|| PendingEntry::new(source.to_string()))
    }

    pub(crate) fn pending(&self) -> impl Iterator<Item = &PendingEntry> {
        self.pending.values()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn confirmed_pairs(&self) -> impl Iterator<Item = (&String, &String)> {
        self.forward.iter()
    }

    pub(crate) fn confirmed_len(&self) -> usize {
        self.forward.len()
    }

    pub(crate) fn forward_map(&self) -> &BTreeMap<String, String> {
        &self.forward
    }

    /// Promote `source -> target`. Re-confirming an identical pair is a
    /// no-op; conflicting confirmations and already-claimed targets are
    /// programmer errors and abort the run.
    pub(crate) fn confirm(&mut self, source: &str, target: &str) -> Result<()> {
        if let Some(existing) = self.forward.get(source) {
            if existing == target {
                return Ok(());
            }
            anyhow::bail!(
                "cannot confirm {source} -> {target}: source already confirmed to {existing}"
            );
        }
        if let Some(claimed_by) = self.inverse.get(target) {
            anyhow::bail!(
                "cannot confirm {source} -> {target}: target already claimed by {claimed_by}"
            );
        }

        self.pending.remove(source);
        self.forward.insert(source.to_string(), target.to_string());
        self.inverse.insert(target.to_string(), source.to_string());

        // The newly claimed target is no longer a candidate anywhere else.
        for entry in self.pending.values_mut() {
            entry.remove_vote(target);
        }
        Ok(())
    }
}
