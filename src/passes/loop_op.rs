use anyhow::Result;

use crate::engine::MergeEngine;
use crate::passes::{Pass, PassResult};

/// Jumps back to `target` while the current cycle confirmed anything. Each
/// accepted jump starts a fresh cycle, so the decision always reflects the
/// work done since the previous jump.
pub(crate) struct ConditionalLoopPass {
    target: usize,
}

impl ConditionalLoopPass {
    pub(crate) fn new(target: usize) -> Self {
        Self { target }
    }
}

impl Pass for ConditionalLoopPass {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn run(&self, _engine: &mut MergeEngine) -> Result<PassResult> {
        Ok(PassResult::JumpTo {
            target: self.target,
            predicate: Box::new(|engine| engine.changes_this_cycle() > 0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Environment;

    #[test]
    fn jump_fires_only_while_the_cycle_changed_something() {
        let mut quiet = MergeEngine::new(Environment::default(), Environment::default());
        let result = ConditionalLoopPass::new(1).run(&mut quiet).expect("run");
        let PassResult::JumpTo { target, predicate } = result else {
            panic!("loop pass must emit a jump");
        };
        assert_eq!(target, 1);
        assert!(!predicate(&quiet));

        let mut busy = MergeEngine::new(Environment::default(), Environment::default());
        busy.confirm_class("a", "x").expect("confirm");
        assert!(predicate(&busy));
    }
}
