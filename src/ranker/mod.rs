use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::engine::{MergeEngine, VERY_STRONG};
use crate::model::member_key_owner;
use crate::passes::{Pass, PassResult};

pub(crate) mod knn;
pub(crate) mod tfidf;

const TFIDF_SHARE: f64 = 0.4;
const KNN_SHARE: f64 = 0.6;
const ACCEPT_SCORE: f64 = 0.7;
const ACCEPT_GAP: f64 = 0.15;

/// FNV-1a over raw bytes; used for token and feature fingerprints so runs
/// are reproducible across processes.
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Late-stage disambiguation for methods the voting passes left pending.
/// TF-IDF proposes candidates from unique evidence, the weighted feature
/// vector scores structural shape, and only comfortable winners are fed
/// back into the vote tables.
pub(crate) struct HybridRankerPass;

impl Pass for HybridRankerPass {
    fn name(&self) -> &'static str {
        "hybrid-ranker"
    }

    fn run(&self, engine: &mut MergeEngine) -> Result<PassResult> {
        let votes: Vec<(String, String)> = {
            let queries: Vec<(String, &crate::model::MethodRecord)> = engine
                .src_env()
                .methods()
                .filter(|(key, method)| {
                    method.obfuscated && engine.methods().confirmed_target(key).is_none()
                })
                .map(|(key, method)| (key.clone(), method))
                .collect();
            if queries.is_empty() {
                return Ok(PassResult::Done);
            }

            let candidates: Vec<(String, &crate::model::MethodRecord)> = engine
                .tgt_env()
                .methods()
                .filter(|(key, _)| !engine.methods().is_target_claimed(key))
                .map(|(key, method)| (key.clone(), method))
                .collect();
            if candidates.is_empty() {
                return Ok(PassResult::Done);
            }

            let index = tfidf::TfIdfIndex::build(
                candidates
                    .iter()
                    .map(|(key, method)| {
                        (key.clone(), tfidf::method_tokens(method, engine.tgt_env()))
                    })
                    .collect(),
            );
            let vectors: HashMap<&str, [f64; knn::FEATURE_DIMENSIONS]> = candidates
                .iter()
                .map(|(key, method)| {
                    (key.as_str(), knn::feature_vector(method, engine.tgt_env()))
                })
                .collect();

            let mut votes = Vec::new();
            for (source_key, source_method) in &queries {
                let tokens = tfidf::method_tokens(source_method, engine.src_env());
                let ranked = index.query(&tokens, tfidf::DEFAULT_TOP_K);
                if ranked.is_empty() {
                    continue;
                }
                let source_vector = knn::feature_vector(source_method, engine.src_env());
                let lock = engine
                    .methods()
                    .pending_entry(source_key)
                    .and_then(|entry| entry.owner_lock().map(str::to_string))
                    .or_else(|| {
                        engine
                            .classes()
                            .confirmed_target(member_key_owner(source_key))
                            .map(str::to_string)
                    });

                let mut best: Option<(String, f64)> = None;
                let mut second = 0.0f64;
                for (target_key, tfidf_score) in ranked {
                    let Some(target_method) = engine.tgt_env().method(&target_key) else {
                        continue;
                    };
                    if target_method.is_static() != source_method.is_static() {
                        continue;
                    }
                    if target_method.is_special_name() != source_method.is_special_name() {
                        continue;
                    }
                    if let Some(lock) = &lock {
                        if member_key_owner(&target_key) != lock.as_str() {
                            continue;
                        }
                    }
                    let Some(target_vector) = vectors.get(target_key.as_str()) else {
                        continue;
                    };
                    let combined = TFIDF_SHARE * tfidf_score
                        + KNN_SHARE * knn::weighted_cosine(&source_vector, target_vector);
                    best = match best.take() {
                        None => Some((target_key, combined)),
                        Some((_, leader_score)) if combined > leader_score => {
                            second = leader_score;
                            Some((target_key, combined))
                        }
                        Some(leader) => {
                            if combined > second {
                                second = combined;
                            }
                            Some(leader)
                        }
                    };
                }

                if let Some((target_key, score)) = best {
                    if score >= ACCEPT_SCORE && score - second >= ACCEPT_GAP {
                        votes.push((source_key.clone(), target_key));
                    }
                }
            }
            votes
        };

        let mut accepted = 0;
        let proposed = votes.len();
        for (source, target) in votes {
            if engine.vote_method(&source, &target, VERY_STRONG) {
                accepted += 1;
            }
        }
        debug!(proposed, accepted, "hybrid-ranker votes");
        Ok(PassResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fixtures, ConstValue, Environment};
    use crate::opcodes;

    fn method_with_body(
        owner: &str,
        name: &str,
        text: &str,
        ops: &[u8],
    ) -> crate::model::MethodRecord {
        let mut method = fixtures::method(owner, name, "()V", true);
        method.constants = vec![ConstValue::Str(text.to_string())];
        method.code = fixtures::plain_code(ops);
        method
    }

    #[test]
    fn residual_methods_get_a_decisive_vote_when_evidence_aligns() {
        let body = [
            opcodes::ALOAD_0,
            opcodes::LDC,
            opcodes::IFEQ,
            opcodes::GOTO,
            opcodes::RETURN,
        ];
        let mut src = Environment::default();
        fixtures::install(
            &mut src,
            fixtures::class("a", true),
            vec![method_with_body("a", "m", "Crash Report Header", &body)],
            vec![],
        );
        let mut tgt = Environment::default();
        fixtures::install(
            &mut tgt,
            fixtures::class("x", true),
            vec![
                method_with_body("x", "p", "Crash Report Header", &body),
                method_with_body(
                    "x",
                    "q",
                    "Completely Different Text",
                    &[opcodes::NEW, opcodes::DUP, opcodes::ARETURN],
                ),
            ],
            vec![],
        );

        let mut engine = MergeEngine::new(src, tgt);
        let result = HybridRankerPass.run(&mut engine).expect("run ranker");
        assert!(matches!(result, PassResult::Continue));

        let entry = engine.methods().pending_entry("a.m()V").expect("entry");
        assert_eq!(entry.first_target(), Some(("x.p()V", VERY_STRONG)));
    }

    #[test]
    fn an_empty_residual_halts_the_pipeline_tail() {
        let mut src = Environment::default();
        fixtures::install(
            &mut src,
            fixtures::class("classDone", false),
            vec![fixtures::method("classDone", "methodGo", "()V", false)],
            vec![],
        );
        let tgt = Environment::default();

        let mut engine = MergeEngine::new(src, tgt);
        let result = HybridRankerPass.run(&mut engine).expect("run ranker");
        assert!(matches!(result, PassResult::Done));
    }

    #[test]
    fn ambiguous_candidates_are_skipped() {
        let body = [opcodes::ALOAD_0, opcodes::LDC, opcodes::RETURN];
        let mut src = Environment::default();
        fixtures::install(
            &mut src,
            fixtures::class("a", true),
            vec![method_with_body("a", "m", "Twin Payload", &body)],
            vec![],
        );
        let mut tgt = Environment::default();
        fixtures::install(
            &mut tgt,
            fixtures::class("x", true),
            vec![
                method_with_body("x", "p", "Twin Payload", &body),
                method_with_body("x", "q", "Twin Payload", &body),
            ],
            vec![],
        );

        let mut engine = MergeEngine::new(src, tgt);
        HybridRankerPass.run(&mut engine).expect("run ranker");

        assert!(engine.methods().pending_entry("a.m()V").is_none());
    }
}
