use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::model::{member_key_owner, Environment};
use crate::passes::{Pass, PassResult};
use crate::tables::MatchTable;

pub(crate) const WEAK: u32 = 1;
pub(crate) const MEDIUM: u32 = 2;
pub(crate) const STRONG: u32 = 3;
pub(crate) const VERY_STRONG: u32 = 5;

/// Hard stop for the pass pipeline, counted in accepted jumps.
pub(crate) const MAX_ITERATIONS: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SymbolKind {
    Class,
    Method,
    Field,
}

impl SymbolKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
        }
    }
}

/// Frozen three-way mapping handed to the report writer.
#[derive(Debug)]
pub(crate) struct MatchResult {
    pub(crate) classes: BTreeMap<String, String>,
    pub(crate) methods: BTreeMap<String, String>,
    pub(crate) fields: BTreeMap<String, String>,
}

impl MatchResult {
    pub(crate) fn mapping_count(&self) -> usize {
        self.classes.len() + self.methods.len() + self.fields.len()
    }
}

/// Owns both environments and all match state, exposes the voting API to
/// passes, and drives the pass pipeline to a fixed point.
pub(crate) struct MergeEngine {
    src: Environment,
    tgt: Environment,
    classes: MatchTable,
    methods: MatchTable,
    fields: MatchTable,
    passes: Vec<Box<dyn Pass>>,
    changes: usize,
    iterations: u32,
}

impl MergeEngine {
    pub(crate) fn new(src: Environment, tgt: Environment) -> Self {
        Self {
            src,
            tgt,
            classes: MatchTable::default(),
            methods: MatchTable::default(),
            fields: MatchTable::default(),
            passes: Vec::new(),
            changes: 0,
            iterations: 0,
        }
    }

    pub(crate) fn src_env(&self) -> &Environment {
        &self.src
    }

    pub(crate) fn tgt_env(&self) -> &Environment {
        &self.tgt
    }

    pub(crate) fn classes(&self) -> &MatchTable {
        &self.classes
    }

    pub(crate) fn methods(&self) -> &MatchTable {
        &self.methods
    }

    pub(crate) fn fields(&self) -> &MatchTable {
        &self.fields
    }

    pub(crate) fn table(&self, kind: SymbolKind) -> &MatchTable {
        match kind {
            SymbolKind::Class => &self.classes,
            SymbolKind::Method => &self.methods,
            SymbolKind::Field => &self.fields,
        }
    }

    pub(crate) fn changes_this_cycle(&self) -> usize {
        self.changes
    }

    pub(crate) fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub(crate) fn vote(&mut self, kind: SymbolKind, source: &str, target: &str, weight: u32) -> bool {
        match kind {
            SymbolKind::Class => self.vote_class(source, target, weight),
            SymbolKind::Method => self.vote_method(source, target, weight),
            SymbolKind::Field => self.vote_field(source, target, weight),
        }
    }

    /// Class votes carry no compatibility filter; type-kind filtering stays
    /// permissive.
    pub(crate) fn vote_class(&mut self, source: &str, target: &str, weight: u32) -> bool {
        if let Some(existing) = self.classes.confirmed_target(source) {
            return existing == target;
        }
        if self.classes.is_target_claimed(target) {
            return false;
        }
        self.classes.ensure_pending(source).add_vote(target, weight);
        true
    }

    pub(crate) fn vote_method(&mut self, source: &str, target: &str, weight: u32) -> bool {
        if let Some(existing) = self.methods.confirmed_target(source) {
            return existing == target;
        }
        if self.methods.is_target_claimed(target) {
            return false;
        }
        let (Some(src_record), Some(tgt_record)) = (self.src.method(source), self.tgt.method(target))
        else {
            return false;
        };
        if src_record.is_static() != tgt_record.is_static() {
            return false;
        }
        // Constructors and static initializers only ever match each other.
        if src_record.is_special_name() != tgt_record.is_special_name() {
            return false;
        }
        let derived_lock = self
            .classes
            .confirmed_target(member_key_owner(source))
            .map(|owner| owner.to_string());
        if let Some(lock) = self
            .methods
            .pending_entry(source)
            .and_then(|entry| entry.owner_lock().map(|owner| owner.to_string()))
            .or_else(|| derived_lock.clone())
        {
            if member_key_owner(target) != lock {
                return false;
            }
        }
        let entry = self.methods.ensure_pending(source);
        if entry.owner_lock().is_none() {
            if let Some(lock) = derived_lock {
                entry.set_owner_lock(&lock, |key| member_key_owner(key).to_string());
            }
        }
        entry.add_vote(target, weight);
        true
    }

    pub(crate) fn vote_field(&mut self, source: &str, target: &str, weight: u32) -> bool {
        if let Some(existing) = self.fields.confirmed_target(source) {
            return existing == target;
        }
        if self.fields.is_target_claimed(target) {
            return false;
        }
        let (Some(src_record), Some(tgt_record)) = (self.src.field(source), self.tgt.field(target))
        else {
            return false;
        };
        if src_record.is_static() != tgt_record.is_static() {
            return false;
        }
        let derived_lock = self
            .classes
            .confirmed_target(member_key_owner(source))
            .map(|owner| owner.to_string());
        if let Some(lock) = self
            .fields
            .pending_entry(source)
            .and_then(|entry| entry.owner_lock().map(|owner| owner.to_string()))
            .or_else(|| derived_lock.clone())
        {
            if member_key_owner(target) != lock {
                return false;
            }
        }
        let entry = self.fields.ensure_pending(source);
        if entry.owner_lock().is_none() {
            if let Some(lock) = derived_lock {
                entry.set_owner_lock(&lock, |key| member_key_owner(key).to_string());
            }
        }
        entry.add_vote(target, weight);
        true
    }

    pub(crate) fn confirm(&mut self, kind: SymbolKind, source: &str, target: &str) -> Result<()> {
        match kind {
            SymbolKind::Class => self.confirm_class(source, target),
            SymbolKind::Method => self.confirm_method(source, target),
            SymbolKind::Field => self.confirm_field(source, target),
        }
    }

    /// Confirm a class pair and propagate the owner lock to every pending
    /// member entry of the source class.
    pub(crate) fn confirm_class(&mut self, source: &str, target: &str) -> Result<()> {
        self.classes
            .confirm(source, target)
            .with_context(|| format!("class confirmation {source} -> {target}"))?;
        self.changes += 1;
        debug!(source, target, "class confirmed");

        let Some(record) = self.src.class(source) else {
            return Ok(());
        };
        for key in &record.methods {
            if let Some(entry) = self.methods.pending_entry_mut(key) {
                entry.set_owner_lock(target, |candidate| member_key_owner(candidate).to_string());
            }
        }
        for key in &record.fields {
            if let Some(entry) = self.fields.pending_entry_mut(key) {
                entry.set_owner_lock(target, |candidate| member_key_owner(candidate).to_string());
            }
        }
        Ok(())
    }

    pub(crate) fn confirm_method(&mut self, source: &str, target: &str) -> Result<()> {
        self.methods
            .confirm(source, target)
            .with_context(|| format!("method confirmation {source} -> {target}"))?;
        self.changes += 1;
        debug!(source, target, "method confirmed");
        Ok(())
    }

    pub(crate) fn confirm_field(&mut self, source: &str, target: &str) -> Result<()> {
        self.fields
            .confirm(source, target)
            .with_context(|| format!("field confirmation {source} -> {target}"))?;
        self.changes += 1;
        debug!(source, target, "field confirmed");
        Ok(())
    }

    /// Execute the pipeline to convergence and freeze the result.
    pub(crate) fn run(mut self) -> Result<MatchResult> {
        let passes = std::mem::take(&mut self.passes);
        let mut index = 0;
        self.changes = 0;
        while index < passes.len() {
            let pass = &passes[index];
            debug!(pass = pass.name(), index, "running pass");
            let result = pass
                .run(&mut self)
                .with_context(|| format!("pass {} aborted the run", pass.name()))?;
            match result {
                PassResult::Continue => index += 1,
                PassResult::Done => break,
                PassResult::JumpTo { target, predicate } => {
                    if predicate(&self) {
                        if self.iterations >= MAX_ITERATIONS {
                            warn!(
                                iterations = self.iterations,
                                "iteration cap reached with changes still occurring; \
                                 returning partial mappings"
                            );
                            break;
                        }
                        self.iterations += 1;
                        index = target;
                        // A new cycle starts here; the jump decision above
                        // already consumed the previous cycle's count.
                        self.changes = 0;
                    } else {
                        index += 1;
                    }
                }
            }
        }

        info!(
            classes = self.classes.confirmed_len(),
            methods = self.methods.confirmed_len(),
            fields = self.fields.confirmed_len(),
            class_total = self.src.class_count(),
            method_total = self.src.method_count(),
            field_total = self.src.field_count(),
            iterations = self.iterations,
            "matching finished"
        );

        Ok(MatchResult {
            classes: self.classes.forward_map().clone(),
            methods: self.methods.forward_map().clone(),
            fields: self.fields.forward_map().clone(),
        })
    }
}
