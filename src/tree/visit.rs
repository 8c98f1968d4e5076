//! Generation-guarded depth-first visitor.
//!
//! A node already tagged with the current generation is skipped, which
//! keeps a visit over a design with shared subtrees (shared types,
//! shared package declarations) `O(nodes)` rather than `O(paths)`.

use super::{next_generation, Assoc, Tree};

/// Walk `root` and every node reachable from it, invoking `f(node, ctx)`
/// post-order exactly once per distinct node.
pub fn visit<C>(root: &Tree, ctx: &mut C, f: &mut dyn FnMut(&Tree, &mut C)) {
    let gen = next_generation();
    visit_aux(root, gen, ctx, f);
}

/// Same traversal as [`visit`] but against a caller-supplied generation
/// rather than minting its own; used by `gc` so marking several roots
/// shares one generation before the sweep.
pub(crate) fn visit_aux<C>(t: &Tree, gen: u32, ctx: &mut C, f: &mut dyn FnMut(&Tree, &mut C)) {
    if t.generation() == gen {
        return;
    }
    t.set_generation(gen);

    let kind = t.kind();

    if kind.has_ports() {
        for p in t.ports() {
            visit_aux(&p, gen, ctx, f);
        }
    }
    if kind.has_generics() {
        for g in t.generics() {
            visit_aux(&g, gen, ctx, f);
        }
    }
    if kind.has_params() {
        for p in t.params() {
            visit_aux(&p, gen, ctx, f);
        }
    }
    if kind.has_decls() {
        for d in t.decls() {
            visit_aux(&d, gen, ctx, f);
        }
    }
    if kind.has_stmts() {
        for s in t.stmts() {
            visit_aux(&s, gen, ctx, f);
        }
    }
    if kind.has_value() {
        if let Some(v) = t.value() {
            visit_aux(&v, gen, ctx, f);
        }
    }
    if kind.has_delay() {
        if let Some(d) = t.delay() {
            visit_aux(&d, gen, ctx, f);
        }
    }
    if kind.has_target() {
        visit_aux(&t.target(), gen, ctx, f);
    }
    if kind.has_ref() {
        if let Some(r) = t.refers_to() {
            visit_aux(&r, gen, ctx, f);
        }
    }
    if kind.has_message() {
        visit_aux(&t.message(), gen, ctx, f);
    }
    if kind.has_severity() {
        visit_aux(&t.severity(), gen, ctx, f);
    }
    if kind == super::Kind::Aggregate {
        for assoc in t.assocs() {
            let inner = match &assoc {
                Assoc::Positional(v) | Assoc::Named(_, v) | Assoc::Range(_, v) | Assoc::Others(v) => v,
            };
            visit_aux(inner, gen, ctx, f);
        }
    }

    f(t, ctx);
}

#[cfg(test)]
mod tests {
    use super::super::Kind;
    use super::*;

    #[test]
    fn shared_subtree_is_visited_once() {
        let shared = Tree::new(Kind::Literal);
        let arch = Tree::new(Kind::Arch);
        let a = Tree::new(Kind::ConstDecl);
        let b = Tree::new(Kind::ConstDecl);
        a.set_value(Some(shared.clone()));
        b.set_value(Some(shared.clone()));
        arch.add_decl(a);
        arch.add_decl(b);

        let mut count = 0;
        visit(&arch, &mut count, &mut |node, count| {
            if node.kind() == Kind::Literal {
                *count += 1;
            }
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn post_order_visits_children_before_parent() {
        let child = Tree::new(Kind::Literal);
        let parent = Tree::new(Kind::ConstDecl);
        parent.set_value(Some(child.clone()));

        let mut order = Vec::new();
        visit(&parent, &mut order, &mut |node, order| {
            order.push(node.kind());
        });
        assert_eq!(order, vec![Kind::Literal, Kind::ConstDecl]);
    }
}
