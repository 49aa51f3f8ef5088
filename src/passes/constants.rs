use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::debug;

use crate::engine::{MergeEngine, MEDIUM, STRONG, VERY_STRONG};
use crate::model::{ConstValue, Environment};
use crate::passes::{Pass, PassResult};

/// Votes method pairs that share a constant which is unique within both
/// archives. Long strings are close to fingerprints; short or common values
/// carry less weight.
pub(crate) struct UniqueConstantsPass;

/// Constants too generic to discriminate are ignored outright.
pub(crate) fn significant(value: &ConstValue) -> bool {
    match value {
        ConstValue::Str(text) => {
            text.chars().count() >= 5
                && !text.chars().all(|c| c.is_ascii_lowercase())
                && text != "true"
                && text != "false"
        }
        ConstValue::Int(v) => v.unsigned_abs() >= 3,
        ConstValue::Long(v) => v.unsigned_abs() >= 3,
        ConstValue::Float(v) => *v != 0.0 && *v != 1.0,
        ConstValue::Double(v) => *v != 0.0 && *v != 1.0,
        ConstValue::Type(_) => false,
    }
}

pub(crate) fn constant_weight(value: &ConstValue) -> u32 {
    match value {
        ConstValue::Str(text) => {
            let length = text.chars().count();
            if length > 20 {
                VERY_STRONG
            } else if length >= 11 {
                STRONG
            } else {
                MEDIUM
            }
        }
        ConstValue::Int(v) => {
            if v.unsigned_abs() > 1000 {
                STRONG
            } else {
                MEDIUM
            }
        }
        ConstValue::Long(v) => {
            if v.unsigned_abs() > 1000 {
                STRONG
            } else {
                MEDIUM
            }
        }
        ConstValue::Float(v) => {
            if v.abs() > 1000.0 {
                STRONG
            } else {
                MEDIUM
            }
        }
        ConstValue::Double(v) => {
            if v.abs() > 1000.0 {
                STRONG
            } else {
                MEDIUM
            }
        }
        ConstValue::Type(_) => MEDIUM,
    }
}

/// `constant -> owning method`, with `None` marking constants seen in more
/// than one method of the archive.
fn unique_constants(
    env: &Environment,
    mut skip: impl FnMut(&str) -> bool,
) -> BTreeMap<ConstValue, Option<String>> {
    let mut map: BTreeMap<ConstValue, Option<String>> = BTreeMap::new();
    for (key, method) in env.methods() {
        if skip(key) {
            continue;
        }
        let mut seen_here: BTreeSet<&ConstValue> = BTreeSet::new();
        for value in &method.constants {
            if !significant(value) || !seen_here.insert(value) {
                continue;
            }
            map.entry(value.clone())
                .and_modify(|slot| *slot = None)
                .or_insert_with(|| Some(key.clone()));
        }
    }
    map
}

impl Pass for UniqueConstantsPass {
    fn name(&self) -> &'static str {
        "unique-constants"
    }

    fn run(&self, engine: &mut MergeEngine) -> Result<PassResult> {
        let votes: Vec<(String, String, u32)> = {
            let source_map = unique_constants(engine.src_env(), |key| {
                engine.methods().confirmed_target(key).is_some()
            });
            let target_map = unique_constants(engine.tgt_env(), |key| {
                engine.methods().is_target_claimed(key)
            });

            source_map
                .iter()
                .filter_map(|(value, source)| {
                    let source = source.as_ref()?;
                    let target = target_map.get(value)?.as_ref()?;
                    Some((source.clone(), target.clone(), constant_weight(value)))
                })
                .collect()
        };

        let mut accepted = 0;
        let cast = votes.len();
        for (source, target, weight) in votes {
            if engine.vote_method(&source, &target, weight) {
                accepted += 1;
            }
        }
        debug!(cast, accepted, "unique-constant votes");
        Ok(PassResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;

    #[test]
    fn significance_rules_filter_generic_values() {
        assert!(significant(&ConstValue::Str("Database error".to_string())));
        assert!(!significant(&ConstValue::Str("tiny".to_string())), "too short");
        assert!(
            !significant(&ConstValue::Str("alllowercase".to_string())),
            "lowercase-only strings are too common"
        );
        assert!(!significant(&ConstValue::Str("false".to_string())));
        assert!(significant(&ConstValue::Int(3)));
        assert!(!significant(&ConstValue::Int(-2)));
        assert!(significant(&ConstValue::Long(-40)));
        assert!(!significant(&ConstValue::Float(1.0)));
        assert!(significant(&ConstValue::Double(0.5)));
    }

    #[test]
    fn weights_scale_with_discriminative_power() {
        assert_eq!(
            constant_weight(&ConstValue::Str("Database connection failed".to_string())),
            VERY_STRONG
        );
        assert_eq!(
            constant_weight(&ConstValue::Str("Out of range".to_string())),
            STRONG
        );
        assert_eq!(constant_weight(&ConstValue::Str("Help!".to_string())), MEDIUM);
        assert_eq!(constant_weight(&ConstValue::Int(4096)), STRONG);
        assert_eq!(constant_weight(&ConstValue::Int(7)), MEDIUM);
    }

    #[test]
    fn a_unique_long_string_drives_a_very_strong_vote() {
        let mut src = Environment::default();
        let mut foo = fixtures::method("A", "foo", "()V", true);
        foo.constants = vec![ConstValue::Str("Database connection failed".to_string())];
        fixtures::install(&mut src, fixtures::class("A", true), vec![foo], vec![]);

        let mut tgt = Environment::default();
        let mut x = fixtures::method("q", "x", "()V", true);
        x.constants = vec![ConstValue::Str("Database connection failed".to_string())];
        fixtures::install(&mut tgt, fixtures::class("q", true), vec![x], vec![]);

        let mut engine = MergeEngine::new(src, tgt);
        UniqueConstantsPass.run(&mut engine).expect("run pass");

        let entry = engine.methods().pending_entry("A.foo()V").expect("entry");
        assert_eq!(entry.first_target(), Some(("q.x()V", VERY_STRONG)));
        assert_eq!(entry.second_votes(), 0);
    }

    #[test]
    fn constants_shared_by_two_methods_are_not_unique() {
        let mut src = Environment::default();
        let shared = ConstValue::Str("Shared Message".to_string());
        let mut one = fixtures::method("A", "one", "()V", true);
        one.constants = vec![shared.clone()];
        let mut two = fixtures::method("A", "two", "()V", true);
        two.constants = vec![shared.clone()];
        fixtures::install(&mut src, fixtures::class("A", true), vec![one, two], vec![]);

        let mut tgt = Environment::default();
        let mut x = fixtures::method("B", "x", "()V", true);
        x.constants = vec![shared.clone()];
        fixtures::install(&mut tgt, fixtures::class("B", true), vec![x], vec![]);

        let mut engine = MergeEngine::new(src, tgt);
        UniqueConstantsPass.run(&mut engine).expect("run pass");

        assert!(engine.methods().pending_entry("A.one()V").is_none());
        assert!(engine.methods().pending_entry("A.two()V").is_none());
    }

    #[test]
    fn repeats_inside_one_method_do_not_break_uniqueness() {
        let mut src = Environment::default();
        let value = ConstValue::Str("Repeated Banner".to_string());
        let mut only = fixtures::method("A", "only", "()V", true);
        only.constants = vec![value.clone(), value.clone()];
        fixtures::install(&mut src, fixtures::class("A", true), vec![only], vec![]);

        let mut tgt = Environment::default();
        let mut x = fixtures::method("B", "x", "()V", true);
        x.constants = vec![value.clone()];
        fixtures::install(&mut tgt, fixtures::class("B", true), vec![x], vec![]);

        let mut engine = MergeEngine::new(src, tgt);
        UniqueConstantsPass.run(&mut engine).expect("run pass");

        assert!(engine.methods().pending_entry("A.only()V").is_some());
    }
}
