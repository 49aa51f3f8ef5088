use anyhow::Result;
use tracing::debug;

use crate::engine::{MergeEngine, SymbolKind};
use crate::model::member_key_owner;
use crate::passes::{Pass, PassResult};
use crate::tables::PendingEntry;

pub(crate) const MIN_VOTES: u32 = 3;
pub(crate) const MIN_GAP: u32 = 2;
pub(crate) const BATCH_PERCENT: usize = 10;

/// Promotes the highest-confidence pending entries of one symbol kind.
/// Batching plus the gap requirement keeps narrow wins from locking in;
/// the loop pass re-runs the evidence passes between batches.
pub(crate) struct VoteCollectorPass {
    kind: SymbolKind,
}

impl VoteCollectorPass {
    pub(crate) fn new(kind: SymbolKind) -> Self {
        Self { kind }
    }

    fn batch_floor(&self) -> usize {
        match self.kind {
            SymbolKind::Method => 10,
            SymbolKind::Class | SymbolKind::Field => 5,
        }
    }
}

fn promotable(entry: &PendingEntry) -> Option<(&str, u32)> {
    let (target, first) = entry.first_target()?;
    if first < MIN_VOTES {
        return None;
    }
    let gap = entry.gap();
    if gap < MIN_GAP {
        return None;
    }
    Some((target, gap))
}

/// A member match may only land once its owners correspond: the source owner
/// is confirmed to the target owner, or both owners kept the same clean
/// name. Entries ahead of their class stay pending until the class resolves.
fn owners_compatible(engine: &MergeEngine, source: &str, target: &str) -> bool {
    let source_owner = member_key_owner(source);
    let target_owner = member_key_owner(target);
    if engine.classes().confirmed_target(source_owner) == Some(target_owner) {
        return true;
    }
    source_owner == target_owner
        && engine
            .src_env()
            .class(source_owner)
            .is_some_and(|class| !class.obfuscated)
        && engine
            .tgt_env()
            .class(target_owner)
            .is_some_and(|class| !class.obfuscated)
}

impl Pass for VoteCollectorPass {
    fn name(&self) -> &'static str {
        match self.kind {
            SymbolKind::Class => "collect-classes",
            SymbolKind::Method => "collect-methods",
            SymbolKind::Field => "collect-fields",
        }
    }

    fn run(&self, engine: &mut MergeEngine) -> Result<PassResult> {
        let table = engine.table(self.kind);
        let mut candidates: Vec<(u32, String)> = table
            .pending()
            .filter_map(|entry| promotable(entry).map(|(_, gap)| (gap, entry.source().to_string())))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let limit = self
            .batch_floor()
            .max(table.pending_len() * BATCH_PERCENT / 100);

        let mut promoted = 0;
        for (_, source) in candidates.into_iter().take(limit) {
            // Earlier confirmations in this batch purge their targets from
            // the remaining ledgers; re-evaluate before committing.
            let Some(entry) = engine.table(self.kind).pending_entry(&source) else {
                continue;
            };
            let Some((target, _)) = promotable(entry) else {
                continue;
            };
            if self.kind != SymbolKind::Class && !owners_compatible(engine, &source, target) {
                continue;
            }
            let target = target.to_string();
            engine.confirm(self.kind, &source, &target)?;
            promoted += 1;
        }

        if promoted > 0 {
            debug!(kind = self.kind.label(), promoted, "promoted pending entries");
        }
        Ok(PassResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MEDIUM, STRONG, VERY_STRONG, WEAK};
    use crate::model::{fixtures, Environment};

    fn method_engine(sources: &[&str], targets: &[&str]) -> MergeEngine {
        let mut src = Environment::default();
        fixtures::install(
            &mut src,
            fixtures::class("A", true),
            sources
                .iter()
                .map(|name| fixtures::method("A", name, "()V", true))
                .collect(),
            vec![],
        );
        let mut tgt = Environment::default();
        fixtures::install(
            &mut tgt,
            fixtures::class("B", true),
            targets
                .iter()
                .map(|name| fixtures::method("B", name, "()V", true))
                .collect(),
            vec![],
        );
        let mut engine = MergeEngine::new(src, tgt);
        engine.confirm_class("A", "B").expect("owner classes matched");
        engine
    }

    #[test]
    fn promotes_entries_meeting_votes_and_gap() {
        let mut engine = method_engine(&["m"], &["x"]);
        assert!(engine.vote_method("A.m()V", "B.x()V", VERY_STRONG));

        VoteCollectorPass::new(SymbolKind::Method)
            .run(&mut engine)
            .expect("run collector");

        assert_eq!(engine.methods().confirmed_target("A.m()V"), Some("B.x()V"));
    }

    #[test]
    fn entries_below_the_vote_floor_stay_pending() {
        let mut engine = method_engine(&["m"], &["x"]);
        assert!(engine.vote_method("A.m()V", "B.x()V", MEDIUM));

        VoteCollectorPass::new(SymbolKind::Method)
            .run(&mut engine)
            .expect("run collector");

        assert!(engine.methods().confirmed_target("A.m()V").is_none());
    }

    #[test]
    fn narrow_gaps_block_promotion() {
        let mut engine = method_engine(&["m"], &["x", "y"]);
        assert!(engine.vote_method("A.m()V", "B.x()V", STRONG));
        assert!(engine.vote_method("A.m()V", "B.y()V", MEDIUM));

        VoteCollectorPass::new(SymbolKind::Method)
            .run(&mut engine)
            .expect("run collector");

        assert!(engine.methods().confirmed_target("A.m()V").is_none());
    }

    #[test]
    fn a_claimed_target_is_reevaluated_mid_batch() {
        // Both sources prefer x; the weaker one must not steal it after the
        // stronger one claims it.
        let mut engine = method_engine(&["m", "n"], &["x", "y"]);
        assert!(engine.vote_method("A.m()V", "B.x()V", VERY_STRONG));
        assert!(engine.vote_method("A.n()V", "B.x()V", STRONG));

        VoteCollectorPass::new(SymbolKind::Method)
            .run(&mut engine)
            .expect("run collector");

        assert_eq!(engine.methods().confirmed_target("A.m()V"), Some("B.x()V"));
        assert!(engine.methods().confirmed_target("A.n()V").is_none());
        let entry = engine.methods().pending_entry("A.n()V").expect("still pending");
        assert_eq!(entry.votes_for("B.x()V"), 0);
    }

    #[test]
    fn batch_order_is_gap_descending_then_key_ascending() {
        let mut engine = method_engine(&["m", "n"], &["x", "y"]);
        // Same gap for both; ordering falls back to the source key, so A.m
        // claims its target first even though both are eligible.
        assert!(engine.vote_method("A.m()V", "B.x()V", STRONG));
        assert!(engine.vote_method("A.n()V", "B.x()V", STRONG));
        assert!(engine.vote_method("A.n()V", "B.y()V", WEAK));

        VoteCollectorPass::new(SymbolKind::Method)
            .run(&mut engine)
            .expect("run collector");

        assert_eq!(engine.methods().confirmed_target("A.m()V"), Some("B.x()V"));
        assert!(engine.methods().confirmed_target("A.n()V").is_none());
    }

    #[test]
    fn members_wait_for_their_owner_classes() {
        let mut src = Environment::default();
        fixtures::install(
            &mut src,
            fixtures::class("A", true),
            vec![fixtures::method("A", "m", "()V", true)],
            vec![],
        );
        let mut tgt = Environment::default();
        fixtures::install(
            &mut tgt,
            fixtures::class("B", true),
            vec![fixtures::method("B", "x", "()V", true)],
            vec![],
        );
        let mut engine = MergeEngine::new(src, tgt);
        assert!(engine.vote_method("A.m()V", "B.x()V", VERY_STRONG));

        VoteCollectorPass::new(SymbolKind::Method)
            .run(&mut engine)
            .expect("run collector");
        assert!(
            engine.methods().confirmed_target("A.m()V").is_none(),
            "member must wait for its owner classes"
        );

        engine.confirm_class("A", "B").expect("owner classes matched");
        VoteCollectorPass::new(SymbolKind::Method)
            .run(&mut engine)
            .expect("run collector again");
        assert_eq!(engine.methods().confirmed_target("A.m()V"), Some("B.x()V"));
    }

    #[test]
    fn single_candidate_promotes_when_votes_suffice() {
        let mut engine = method_engine(&["m"], &["x"]);
        assert!(engine.vote_method("A.m()V", "B.x()V", STRONG));

        VoteCollectorPass::new(SymbolKind::Method)
            .run(&mut engine)
            .expect("run collector");

        // first = 3 >= MIN_VOTES, second = 0, gap = 3 >= MIN_GAP.
        assert_eq!(engine.methods().confirmed_target("A.m()V"), Some("B.x()V"));
    }
}
