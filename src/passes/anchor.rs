use anyhow::Result;
use tracing::debug;

use crate::engine::{MergeEngine, SymbolKind};
use crate::passes::{Pass, PassResult};

/// Direct confirmation of symbols whose human-readable names survived in
/// both archives. These are ground truth and prime the evidence fabric
/// before any heuristic votes.
pub(crate) struct AnchorPass;

impl Pass for AnchorPass {
    fn name(&self) -> &'static str {
        "anchor"
    }

    fn run(&self, engine: &mut MergeEngine) -> Result<PassResult> {
        let class_anchors: Vec<String> = engine
            .src_env()
            .classes()
            .filter(|(name, class)| {
                !class.obfuscated
                    && engine.classes().confirmed_target(name).is_none()
                    && !engine.classes().is_target_claimed(name)
                    && engine
                        .tgt_env()
                        .class(name)
                        .is_some_and(|candidate| !candidate.obfuscated)
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in &class_anchors {
            engine.confirm_class(name, name)?;
        }

        let mut member_anchors: Vec<(SymbolKind, String, String)> = Vec::new();
        for (src_class, tgt_class) in engine.classes().confirmed_pairs() {
            let Some(record) = engine.src_env().class(src_class) else {
                continue;
            };
            for key in &record.methods {
                let Some(method) = engine.src_env().method(key) else {
                    continue;
                };
                if method.obfuscated || engine.methods().confirmed_target(key).is_some() {
                    continue;
                }
                let target_key = format!("{}.{}{}", tgt_class, method.name, method.descriptor);
                if engine.methods().is_target_claimed(&target_key) {
                    continue;
                }
                if engine
                    .tgt_env()
                    .method(&target_key)
                    .is_some_and(|candidate| !candidate.obfuscated)
                {
                    member_anchors.push((SymbolKind::Method, key.clone(), target_key));
                }
            }
            for key in &record.fields {
                let Some(field) = engine.src_env().field(key) else {
                    continue;
                };
                if field.obfuscated || engine.fields().confirmed_target(key).is_some() {
                    continue;
                }
                let target_key = format!("{}.{}:{}", tgt_class, field.name, field.descriptor);
                if engine.fields().is_target_claimed(&target_key) {
                    continue;
                }
                if engine
                    .tgt_env()
                    .field(&target_key)
                    .is_some_and(|candidate| !candidate.obfuscated)
                {
                    member_anchors.push((SymbolKind::Field, key.clone(), target_key));
                }
            }
        }

        let anchored_members = member_anchors.len();
        for (kind, source, target) in member_anchors {
            engine.confirm(kind, &source, &target)?;
        }

        debug!(
            classes = class_anchors.len(),
            members = anchored_members,
            "anchored non-obfuscated symbols"
        );
        Ok(PassResult::Continue)
    }
}
