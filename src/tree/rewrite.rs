//! Destructive rewriting with identity-preserving substitution.

use super::{Assoc, Tree};
use std::collections::HashMap;

/// What a rewrite callback decides to do with the node it was handed.
pub enum RewriteAction {
    /// Leave the node as-is (the common case).
    Keep,
    /// Replace the node with a different one.
    Replace(Tree),
    /// Splice the node out of its containing slot/array entirely.
    Delete,
}

/// Rewrite every node reachable from `root`, post-order, replacing each
/// with whatever `f` returns. Children are rewritten before the callback
/// sees the parent, so a callback observes an already-rewritten subtree.
/// A node reachable through more than one path (a shared subexpression)
/// is rewritten once; every occurrence receives the same replacement,
/// keeping substitution identity-consistent across the whole tree.
pub fn rewrite<C>(
    root: &Tree,
    ctx: &mut C,
    f: &mut dyn FnMut(&Tree, &mut C) -> RewriteAction,
) -> Option<Tree> {
    let mut memo = HashMap::new();
    rewrite_aux(root, &mut memo, ctx, f)
}

fn rewrite_vec<C>(
    items: Vec<Tree>,
    memo: &mut HashMap<u32, Option<Tree>>,
    ctx: &mut C,
    f: &mut dyn FnMut(&Tree, &mut C) -> RewriteAction,
) -> Vec<Tree> {
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if let Some(replaced) = rewrite_aux(&item, memo, ctx, f) {
            kept.push(replaced);
        }
    }
    kept
}

fn rewrite_children<C>(
    t: &Tree,
    memo: &mut HashMap<u32, Option<Tree>>,
    ctx: &mut C,
    f: &mut dyn FnMut(&Tree, &mut C) -> RewriteAction,
) {
    let kind = t.kind();

    if kind.has_ports() {
        let rewritten = rewrite_vec(t.ports(), memo, ctx, f);
        t.set_ports(rewritten);
    }
    if kind.has_generics() {
        let rewritten = rewrite_vec(t.generics(), memo, ctx, f);
        t.set_generics(rewritten);
    }
    if kind.has_params() {
        let rewritten = rewrite_vec(t.params(), memo, ctx, f);
        t.set_params(rewritten);
    }
    if kind.has_decls() {
        let rewritten = rewrite_vec(t.decls(), memo, ctx, f);
        t.set_decls(rewritten);
    }
    if kind.has_stmts() {
        let rewritten = rewrite_vec(t.stmts(), memo, ctx, f);
        t.set_stmts(rewritten);
    }
    if kind.has_value() {
        if let Some(v) = t.value() {
            let replaced = rewrite_aux(&v, memo, ctx, f);
            t.set_value(replaced);
        }
    }
    if kind.has_target() {
        let target = t.target();
        if let Some(replaced) = rewrite_aux(&target, memo, ctx, f) {
            t.set_target(replaced);
        }
    }
    if kind.has_ref() {
        if let Some(r) = t.refers_to() {
            let replaced = rewrite_aux(&r, memo, ctx, f);
            t.set_refers_to(replaced);
        }
    }
    if kind == super::Kind::Aggregate {
        let mut rebuilt = Vec::new();
        for assoc in t.assocs() {
            let kept = match assoc {
                Assoc::Positional(v) => rewrite_aux(&v, memo, ctx, f).map(Assoc::Positional),
                Assoc::Named(n, v) => rewrite_aux(&v, memo, ctx, f).map(|v| Assoc::Named(n, v)),
                Assoc::Range(r, v) => rewrite_aux(&v, memo, ctx, f).map(|v| Assoc::Range(r, v)),
                Assoc::Others(v) => rewrite_aux(&v, memo, ctx, f).map(Assoc::Others),
            };
            if let Some(assoc) = kept {
                rebuilt.push(assoc);
            }
        }
        t.set_assocs(rebuilt);
    }
}

fn rewrite_aux<C>(
    t: &Tree,
    memo: &mut HashMap<u32, Option<Tree>>,
    ctx: &mut C,
    f: &mut dyn FnMut(&Tree, &mut C) -> RewriteAction,
) -> Option<Tree> {
    let key = t.alloc_index();
    if let Some(cached) = memo.get(&key) {
        return cached.clone();
    }

    // Insert a provisional "keep as-is" entry before recursing so a cycle
    // (should one ever occur) terminates instead of looping forever.
    memo.insert(key, Some(t.clone()));

    rewrite_children(t, memo, ctx, f);

    let result = match f(t, ctx) {
        RewriteAction::Keep => Some(t.clone()),
        RewriteAction::Replace(new) => Some(new),
        RewriteAction::Delete => None,
    };
    memo.insert(key, result.clone());
    result
}
