//! Per-file merge: applies one descriptor's changes to one source text.
//!
//! The merge is pure. It reads nothing from disk and writes nothing; the
//! orchestrator owns the read-then-write lifecycle around it.

use crate::anchor::{Anchor, AnchorResolver};
use crate::applier::ChangeApplier;
use crate::config::MergeConfig;
use crate::entry_point::EntryPoint;
use crate::error::{MergeError, MergeWarning, Result};
use crate::identifiers::{HostAdapter, IdentifierMap};
use crate::idempotency::{Decision, IdempotencyFilter};
use crate::model::{CodeChange, FileDescriptor, ScenarioFlags};
use crate::signature::Signature;
use crate::syntax::{SourceTree, SourceTreeProvider};
use crate::tokens::TokenSubstitution;

/// Result of merging one file in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub text: String,
    pub changed: bool,
    pub applied: usize,
    pub skipped: usize,
    pub usings_added: usize,
    pub diagnostics: Vec<MergeWarning>,
}

/// Changes of one method key, with the strategy decided against the initial snapshot
struct Plan<'d> {
    key: &'d str,
    entry: EntryPoint,
    changes: Vec<&'d CodeChange>,
}

pub struct FileMerge<'a> {
    provider: &'a dyn SourceTreeProvider,
    config: &'a MergeConfig,
    identifiers: &'a IdentifierMap,
    flags: &'a ScenarioFlags,
}

impl<'a> FileMerge<'a> {
    #[must_use]
    pub fn new(
        provider: &'a dyn SourceTreeProvider,
        config: &'a MergeConfig,
        identifiers: &'a IdentifierMap,
        flags: &'a ScenarioFlags,
    ) -> Self {
        Self {
            provider,
            config,
            identifiers,
            flags,
        }
    }

    /// Apply every applicable change of `descriptor` to `source`
    pub fn run(&self, file: &str, source: &str, descriptor: &FileDescriptor) -> Result<MergeResult> {
        if source.len() as u64 > self.config.max_file_size {
            return Err(MergeError::validation(format!(
                "{file} is {} bytes, larger than max_file_size {}",
                source.len(),
                self.config.max_file_size
            )));
        }

        let mut tree = self.provider.parse(source)?;
        let mut diagnostics = Vec::new();

        let mut plans = Vec::new();
        for (key, method) in &descriptor.methods {
            let changes: Vec<&CodeChange> = method
                .code_changes
                .iter()
                .filter(|c| c.applies_to(self.flags))
                .collect();
            if changes.is_empty() {
                continue;
            }
            match EntryPoint::select(self.provider, &tree, key) {
                Some(entry) => plans.push(Plan { key, entry, changes }),
                None => {
                    log::warn!("{file}: method '{key}' not found");
                    diagnostics.push(MergeWarning::MethodNotFound {
                        file: file.to_string(),
                        method: key.clone(),
                    });
                }
            }
        }

        let ids = self.discover_hosts(&tree, &plans);
        let substitution = TokenSubstitution::new(&ids);
        let applier = ChangeApplier::new(self.provider);
        let (mut applied, mut skipped) = (0, 0);

        for plan in &plans {
            for change in &plan.changes {
                let list = plan.entry.locate(self.provider, &tree).ok_or_else(|| {
                    MergeError::Malformed(format!("{file}: '{}' no longer present", plan.entry))
                })?;

                let block = substitution.render(&change.block);
                let check = change.check_block.as_deref().map(|c| substitution.render(c));
                let parent = change
                    .parent
                    .as_deref()
                    .map(|p| Signature::of(&substitution.render(p)));
                let after = change.insert_after.as_deref().map(|a| substitution.render(a));
                let before = change.insert_before.as_deref().map(|b| substitution.render(b));
                let anchor = Anchor::from_parts(after.as_deref(), before.as_deref());
                let (scope, resolution) = AnchorResolver::resolve_within(&list, parent.as_ref(), &anchor);

                let text = match IdempotencyFilter::check(self.provider, &scope, &block, check.as_deref())? {
                    Decision::Skip => {
                        log::debug!("{file} [{}]: already present: {}", plan.key, first_line(&block));
                        skipped += 1;
                        continue;
                    }
                    Decision::Insert(text) => text,
                };

                if let Some(reason) = resolution.fallback {
                    let parent_missed = parent.is_some() && !resolution.inside_parent;
                    let anchor = match change.parent.as_deref() {
                        Some(parent) if parent_missed => parent,
                        _ => change.anchor_label(),
                    };
                    let warning = MergeWarning::AnchorFallback {
                        file: file.to_string(),
                        method: plan.key.to_string(),
                        anchor: anchor.to_string(),
                        reason,
                    };
                    if self.config.strict_anchors {
                        log::warn!("{warning}");
                    } else {
                        log::info!("{warning}");
                    }
                    diagnostics.push(warning);
                }

                log::debug!(
                    "{file} [{}]: inserting at {} ({:?}): {}",
                    plan.key,
                    resolution.position,
                    resolution.edge,
                    first_line(&text)
                );
                tree = applier.insert(&tree, &scope, &resolution, &text, &change.leading_trivia)?;
                applied += 1;
            }
        }

        let namespaces: Vec<&str> = descriptor
            .usings
            .iter()
            .filter(|u| u.applies_to(self.flags))
            .map(|u| u.name())
            .collect();
        let (merged, usings_added) = applier.merge_usings(&tree, &namespaces)?;
        tree = merged;

        let text = self.provider.serialize(&tree);
        Ok(MergeResult {
            changed: text != source,
            text,
            applied,
            skipped,
            usings_added,
            diagnostics,
        })
    }

    /// Host names from every selected list of the initial snapshot
    fn discover_hosts(&self, tree: &SourceTree, plans: &[Plan<'_>]) -> IdentifierMap {
        let adapter = HostAdapter::new(self.config.host_bindings.clone());
        plans
            .iter()
            .filter_map(|plan| plan.entry.locate(self.provider, tree))
            .fold(self.identifiers.clone(), |ids, list| adapter.discover(&list, ids))
    }
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or_default()
}
