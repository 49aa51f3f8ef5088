use anyhow::Result;

use crate::engine::{MergeEngine, SymbolKind};

pub(crate) mod anchor;
pub(crate) mod collector;
pub(crate) mod constants;
pub(crate) mod descriptors;
pub(crate) mod loop_op;
pub(crate) mod structural;

/// Outcome of one pass invocation, consumed by the pipeline runner.
pub(crate) enum PassResult {
    /// Advance to the next pass.
    Continue,
    /// Jump back to `target` if the predicate holds against the engine,
    /// otherwise advance.
    JumpTo {
        target: usize,
        predicate: Box<dyn Fn(&MergeEngine) -> bool>,
    },
    /// Halt the pipeline.
    Done,
}

/// One stage of the matching pipeline.
pub(crate) trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, engine: &mut MergeEngine) -> Result<PassResult>;
}

/// The standard pipeline: anchor once, loop the heuristic passes to a fixed
/// point, then let the hybrid ranker feed the residual back into the loop.
pub(crate) fn install_default_pipeline(engine: &mut MergeEngine, with_ranker: bool) {
    engine.add_pass(Box::new(anchor::AnchorPass));
    // The conditional loops jump back here, skipping the anchor stage.
    engine.add_pass(Box::new(constants::UniqueConstantsPass));
    engine.add_pass(Box::new(descriptors::UniqueDescriptorsPass));
    engine.add_pass(Box::new(structural::StructuralPass));
    engine.add_pass(Box::new(collector::VoteCollectorPass::new(SymbolKind::Class)));
    engine.add_pass(Box::new(collector::VoteCollectorPass::new(SymbolKind::Method)));
    engine.add_pass(Box::new(collector::VoteCollectorPass::new(SymbolKind::Field)));
    engine.add_pass(Box::new(loop_op::ConditionalLoopPass::new(1)));
    if with_ranker {
        engine.add_pass(Box::new(crate::ranker::HybridRankerPass));
        engine.add_pass(Box::new(collector::VoteCollectorPass::new(SymbolKind::Method)));
        engine.add_pass(Box::new(loop_op::ConditionalLoopPass::new(1)));
    }
}
