use std::collections::BTreeSet;

use crate::descriptor::{param_stats, return_type};
use crate::model::{ConstValue, Environment, InsnKind, MethodRecord};
use crate::opcodes;
use crate::ranker::fnv1a;
use crate::ranker::tfidf::{element_type, normalize_member, type_is_obfuscated};

pub(crate) const FEATURE_DIMENSIONS: usize = 33;

/// Opcodes whose histogram proportions get their own dimension.
const HISTOGRAM_OPCODES: [u8; 15] = [
    opcodes::ALOAD_0,
    opcodes::LDC,
    opcodes::DUP,
    opcodes::GETFIELD,
    opcodes::PUTFIELD,
    opcodes::INVOKEVIRTUAL,
    opcodes::INVOKESPECIAL,
    opcodes::INVOKESTATIC,
    opcodes::NEW,
    opcodes::IFEQ,
    opcodes::IFNE,
    opcodes::GOTO,
    opcodes::IRETURN,
    opcodes::ARETURN,
    opcodes::RETURN,
];

/// Per-dimension importance. Layout: 8 structural counters, 3 flags, 4 hash
/// summaries, 15 opcode proportions, 3 parameter-type ratios.
pub(crate) const FEATURE_WEIGHTS: [f64; FEATURE_DIMENSIONS] = [
    2.0, 1.8, 2.2, 2.0, 2.5, 2.2, 1.8, 1.5, // counters
    1.0, 1.0, 1.2, // flags
    3.5, 3.0, 2.8, 2.5, // hash summaries
    0.6, 1.0, 0.8, 1.1, 0.9, 1.0, 0.9, 1.2, 1.1, 0.7, 0.7, 0.5, 0.8, 1.0, 0.6, // opcodes
    1.5, 1.5, 1.5, // parameter ratios
];

/// Hash a variable-length feature down to a stable coordinate in [0, 1].
fn hash_feature(values: BTreeSet<String>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let joined = values.into_iter().collect::<Vec<_>>().join("\n");
    fnv1a(joined.as_bytes()) as f64 / u64::MAX as f64
}

fn clamped(value: usize, scale: f64) -> f64 {
    (value as f64 / scale).min(1.0)
}

pub(crate) fn feature_vector(method: &MethodRecord, env: &Environment) -> [f64; FEATURE_DIMENSIONS] {
    let mut vector = [0.0f64; FEATURE_DIMENSIONS];

    let mut calls = 0usize;
    let mut field_accesses = 0usize;
    let mut branches = 0usize;
    let mut call_set: BTreeSet<String> = BTreeSet::new();
    let mut access_set: BTreeSet<String> = BTreeSet::new();
    let mut type_set: BTreeSet<String> = BTreeSet::new();
    for insn in &method.code {
        if opcodes::is_branch(insn.opcode) {
            branches += 1;
        }
        match &insn.kind {
            InsnKind::Call { owner, name, .. } => {
                calls += 1;
                call_set.insert(normalize_member(owner, name, env));
            }
            InsnKind::Field { owner, name } => {
                field_accesses += 1;
                access_set.insert(normalize_member(owner, name, env));
            }
            InsnKind::Type(name) => {
                let element = element_type(name);
                if !type_is_obfuscated(element, env) {
                    type_set.insert(element.to_string());
                }
            }
            InsnKind::Plain => {}
        }
    }

    let mut string_set: BTreeSet<String> = BTreeSet::new();
    let mut numeric_constants = 0usize;
    for value in &method.constants {
        match value {
            ConstValue::Str(text) => {
                string_set.insert(text.clone());
            }
            ConstValue::Type(_) => {}
            _ => numeric_constants += 1,
        }
    }

    let stats = param_stats(&method.descriptor);

    // Structural counters, squashed into [0, 1].
    vector[0] = clamped(method.code.len(), 500.0);
    vector[1] = clamped(stats.total, 10.0);
    vector[2] = clamped(calls, 50.0);
    vector[3] = clamped(field_accesses, 50.0);
    vector[4] = clamped(string_set.len(), 20.0);
    vector[5] = clamped(numeric_constants, 20.0);
    vector[6] = clamped(branches, 50.0);
    vector[7] = clamped(method.exceptions.len(), 5.0);

    // Flags.
    vector[8] = if method.is_static() { 1.0 } else { 0.0 };
    vector[9] = if return_type(&method.descriptor) == "V" { 1.0 } else { 0.0 };
    vector[10] = if string_set.is_empty() { 0.0 } else { 1.0 };

    // Hash summaries of the variable-length features.
    vector[11] = hash_feature(string_set);
    vector[12] = hash_feature(call_set);
    vector[13] = hash_feature(access_set);
    vector[14] = hash_feature(type_set);

    // Opcode histogram proportions.
    let total = method.code.len().max(1) as f64;
    for (slot, opcode) in HISTOGRAM_OPCODES.iter().enumerate() {
        let count = method.code.iter().filter(|insn| insn.opcode == *opcode).count();
        vector[15 + slot] = count as f64 / total;
    }

    // Parameter-type ratios, denominator clamped to one.
    let params = stats.total.max(1) as f64;
    vector[30] = stats.primitives as f64 / params;
    vector[31] = stats.objects as f64 / params;
    vector[32] = stats.arrays as f64 / params;

    vector
}

/// Cosine over importance-weighted coordinates; 0 when either weighted norm
/// vanishes.
pub(crate) fn weighted_cosine(
    a: &[f64; FEATURE_DIMENSIONS],
    b: &[f64; FEATURE_DIMENSIONS],
) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for dimension in 0..FEATURE_DIMENSIONS {
        let weight = FEATURE_WEIGHTS[dimension];
        dot += weight * a[dimension] * b[dimension];
        norm_a += weight * a[dimension] * a[dimension];
        norm_b += weight * b[dimension] * b[dimension];
    }
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator < f64::EPSILON {
        0.0
    } else {
        (dot / denominator).clamp(0.0, 1.0)
    }
}
