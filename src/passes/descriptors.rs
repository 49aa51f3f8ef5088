use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use crate::descriptor::remap_descriptor;
use crate::engine::{MergeEngine, SymbolKind, STRONG};
use crate::passes::{Pass, PassResult};

/// Within each confirmed class pair, votes members whose remapped descriptor
/// shape is unique on both sides. Confirmed class names are substituted into
/// the descriptors and unresolved references wildcarded, so the shapes grow
/// more informative as class matches accumulate.
pub(crate) struct UniqueDescriptorsPass;

fn shape(is_static: bool, remapped: &str) -> String {
    if is_static {
        format!("STATIC:{remapped}")
    } else {
        format!("INSTANCE:{remapped}")
    }
}

fn mark_unique(map: &mut BTreeMap<String, Option<String>>, shaped: String, key: &str) {
    map.entry(shaped)
        .and_modify(|slot| *slot = None)
        .or_insert_with(|| Some(key.to_string()));
}

impl Pass for UniqueDescriptorsPass {
    fn name(&self) -> &'static str {
        "unique-descriptors"
    }

    fn run(&self, engine: &mut MergeEngine) -> Result<PassResult> {
        let votes: Vec<(SymbolKind, String, String)> = {
            let mut votes = Vec::new();
            for (src_class, tgt_class) in engine.classes().confirmed_pairs() {
                let (Some(src_record), Some(tgt_record)) = (
                    engine.src_env().class(src_class),
                    engine.tgt_env().class(tgt_class),
                ) else {
                    continue;
                };

                let mut src_methods: BTreeMap<String, Option<String>> = BTreeMap::new();
                for key in &src_record.methods {
                    if engine.methods().confirmed_target(key).is_some() {
                        continue;
                    }
                    let Some(method) = engine.src_env().method(key) else {
                        continue;
                    };
                    let remapped = remap_descriptor(&method.descriptor, |name| {
                        engine.classes().confirmed_target(name).map(str::to_string)
                    });
                    mark_unique(&mut src_methods, shape(method.is_static(), &remapped), key);
                }

                let mut tgt_methods: BTreeMap<String, Option<String>> = BTreeMap::new();
                for key in &tgt_record.methods {
                    if engine.methods().is_target_claimed(key) {
                        continue;
                    }
                    let Some(method) = engine.tgt_env().method(key) else {
                        continue;
                    };
                    let remapped = remap_descriptor(&method.descriptor, |name| {
                        engine
                            .classes()
                            .confirmed_source(name)
                            .map(|_| name.to_string())
                    });
                    mark_unique(&mut tgt_methods, shape(method.is_static(), &remapped), key);
                }

                for (shaped, source) in &src_methods {
                    let (Some(source), Some(Some(target))) = (source, tgt_methods.get(shaped))
                    else {
                        continue;
                    };
                    votes.push((SymbolKind::Method, source.clone(), target.clone()));
                }

                let mut src_fields: BTreeMap<String, Option<String>> = BTreeMap::new();
                for key in &src_record.fields {
                    if engine.fields().confirmed_target(key).is_some() {
                        continue;
                    }
                    let Some(field) = engine.src_env().field(key) else {
                        continue;
                    };
                    let remapped = remap_descriptor(&field.descriptor, |name| {
                        engine.classes().confirmed_target(name).map(str::to_string)
                    });
                    mark_unique(&mut src_fields, shape(field.is_static(), &remapped), key);
                }

                let mut tgt_fields: BTreeMap<String, Option<String>> = BTreeMap::new();
                for key in &tgt_record.fields {
                    if engine.fields().is_target_claimed(key) {
                        continue;
                    }
                    let Some(field) = engine.tgt_env().field(key) else {
                        continue;
                    };
                    let remapped = remap_descriptor(&field.descriptor, |name| {
                        engine
                            .classes()
                            .confirmed_source(name)
                            .map(|_| name.to_string())
                    });
                    mark_unique(&mut tgt_fields, shape(field.is_static(), &remapped), key);
                }

                for (shaped, source) in &src_fields {
                    let (Some(source), Some(Some(target))) = (source, tgt_fields.get(shaped))
                    else {
                        continue;
                    };
                    votes.push((SymbolKind::Field, source.clone(), target.clone()));
                }
            }
            votes
        };

        let mut accepted = 0;
        let cast = votes.len();
        for (kind, source, target) in votes {
            if engine.vote(kind, &source, &target, STRONG) {
                accepted += 1;
            }
        }
        debug!(cast, accepted, "unique-descriptor votes");
        Ok(PassResult::Continue)
    }
}
