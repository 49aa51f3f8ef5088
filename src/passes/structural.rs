use std::collections::BTreeSet;

use anyhow::Result;
use tracing::debug;

use crate::engine::{MergeEngine, MEDIUM, STRONG, WEAK};
use crate::model::{ClassRecord, Environment};
use crate::passes::{Pass, PassResult};

/// Scores every unmatched obfuscated class pair in the default package by
/// summing hierarchy, member-count, and descriptor-set signals. Quadratic in
/// the candidate pools, so both pools are pruned up front.
pub(crate) struct StructuralPass;

struct ClassShape<'a> {
    name: &'a str,
    record: &'a ClassRecord,
    method_descriptors: BTreeSet<&'a str>,
    field_descriptors: BTreeSet<&'a str>,
}

fn shapes<'a>(
    env: &'a Environment,
    mut skip: impl FnMut(&str) -> bool,
) -> Vec<ClassShape<'a>> {
    env.classes()
        .filter(|(name, record)| {
            record.obfuscated && record.in_default_package() && !skip(name)
        })
        .map(|(name, record)| {
            let method_descriptors = record
                .methods
                .iter()
                .filter_map(|key| env.method(key))
                .map(|method| method.descriptor.as_str())
                .collect();
            let field_descriptors = record
                .fields
                .iter()
                .filter_map(|key| env.field(key))
                .map(|field| field.descriptor.as_str())
                .collect();
            ClassShape {
                name,
                record,
                method_descriptors,
                field_descriptors,
            }
        })
        .collect()
}

/// `min/max` member-count similarity; undefined when both counts are zero.
fn count_ratio(a: usize, b: usize) -> Option<f64> {
    let max = a.max(b);
    if max == 0 {
        return None;
    }
    Some(a.min(b) as f64 / max as f64)
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

fn pair_weight(engine: &MergeEngine, src: &ClassShape<'_>, tgt: &ClassShape<'_>) -> u32 {
    let mut weight = 0;

    if let (Some(src_super), Some(tgt_super)) =
        (&src.record.super_name, &tgt.record.super_name)
    {
        if engine.classes().confirmed_target(src_super) == Some(tgt_super.as_str()) {
            weight += STRONG;
        }
    }

    for interface in &src.record.interfaces {
        if let Some(mapped) = engine.classes().confirmed_target(interface) {
            if tgt.record.interfaces.iter().any(|candidate| candidate == mapped) {
                weight += MEDIUM;
            }
        }
    }

    let method_ratio = count_ratio(src.record.methods.len(), tgt.record.methods.len());
    let field_ratio = count_ratio(src.record.fields.len(), tgt.record.fields.len());
    if let (Some(methods), Some(fields)) = (method_ratio, field_ratio) {
        if methods > 0.7 && fields > 0.7 {
            weight += WEAK;
        }
    }

    let method_similarity = jaccard(&src.method_descriptors, &tgt.method_descriptors);
    if method_similarity > 0.5 {
        weight += MEDIUM;
    } else if method_similarity > 0.3 {
        weight += WEAK;
    }

    if jaccard(&src.field_descriptors, &tgt.field_descriptors) > 0.5 {
        weight += WEAK;
    }

    weight
}

impl Pass for StructuralPass {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn run(&self, engine: &mut MergeEngine) -> Result<PassResult> {
        let votes: Vec<(String, String, u32)> = {
            let source_shapes = shapes(engine.src_env(), |name| {
                engine.classes().confirmed_target(name).is_some()
            });
            let target_shapes = shapes(engine.tgt_env(), |name| {
                engine.classes().is_target_claimed(name)
            });

            let mut votes = Vec::new();
            for src in &source_shapes {
                for tgt in &target_shapes {
                    let weight = pair_weight(engine, src, tgt);
                    if weight > 0 {
                        votes.push((src.name.to_string(), tgt.name.to_string(), weight));
                    }
                }
            }
            votes
        };

        let mut accepted = 0;
        let cast = votes.len();
        for (source, target, weight) in votes {
            if engine.vote_class(&source, &target, weight) {
                accepted += 1;
            }
        }
        debug!(cast, accepted, "structural votes");
        Ok(PassResult::Continue)
    }
}
