//! Structure-sharing deep copy.
//!
//! `copy` duplicates the shape of a subtree but only mints a fresh
//! identity for nodes the caller's predicate flags; everything else is
//! shared with the source tree. The node passed in as `root` is always
//! cloned regardless of the predicate — asking to copy something and
//! getting the same object back would be useless to the caller.

use super::{Assoc, Tree};
use std::collections::HashMap;

/// Copy `root`. `should_copy(node)` decides, for every node other than
/// `root` itself, whether it gets a fresh clone (`true`) or is shared
/// with the source tree (`false`). A node reachable through more than one
/// path resolves to the same output node either way, preserving
/// back-references (e.g. a `REF` to a shared declaration still points at
/// that same declaration in the copy; a `REF` to a cloned declaration
/// points at its clone).
pub fn copy(root: &Tree, should_copy: &dyn Fn(&Tree) -> bool) -> Tree {
    let mut memo = HashMap::new();
    copy_aux(root, true, &mut memo, should_copy)
}

/// Copy several roots that may cross-reference each other (an entity and
/// the architecture that refers back to its ports) under one shared memo,
/// so a reference from one root into another resolves to that other
/// root's copy instead of diverging into its own separate clone.
pub fn copy_many(roots: &[Tree], should_copy: &dyn Fn(&Tree) -> bool) -> Vec<Tree> {
    let mut memo = HashMap::new();
    roots.iter().map(|r| copy_aux(r, true, &mut memo, should_copy)).collect()
}

fn copy_aux(
    t: &Tree,
    force: bool,
    memo: &mut HashMap<u32, Tree>,
    should_copy: &dyn Fn(&Tree) -> bool,
) -> Tree {
    let key = t.alloc_index();
    if let Some(existing) = memo.get(&key) {
        return existing.clone();
    }

    // `should_copy` only ever answers for declaration-kind nodes: a
    // prescan collects the declarations that need fresh identity,
    // everything else is walked structurally regardless. A statement or
    // expression is never itself a copy-list candidate, so it
    // must always be freshly rebuilt — otherwise a `REF` buried inside an
    // uncopied `INSTANCE`/`PROCESS` would keep pointing at the pre-copy
    // declaration instead of redirecting to its fresh copy below.
    if !force && t.kind().is_decl() && !should_copy(t) {
        memo.insert(key, t.clone());
        return t.clone();
    }

    let new = Tree::new(t.kind());
    // Register before recursing into children so a cycle (should one
    // exist) resolves to the in-progress clone instead of looping.
    memo.insert(key, new.clone());

    let kind = t.kind();
    new.set_loc(t.loc());

    if kind.has_ident() {
        if let Some(id) = t.ident_opt() {
            new.set_ident(id);
        }
    }
    if kind.has_ident2() {
        if let Some(id) = t.ident2_opt() {
            new.set_ident2(id);
        }
    }
    if kind.has_type() {
        if let Some(ty) = t.ty_opt() {
            new.set_type(ty);
        }
    }
    if let Some(lit) = t.literal_opt() {
        new.set_literal(lit);
    }
    if let Some(mode) = t.port_mode_opt() {
        new.set_port_mode(mode);
    }
    if let Some(pos) = t.pos_opt() {
        new.set_pos(pos);
    }
    if kind.has_range() {
        if let Some(range) = t.range_opt() {
            new.set_range(range);
        }
    }
    if kind.has_context() {
        for unit in t.context() {
            new.add_context(unit);
        }
    }

    if kind.has_ports() {
        for p in t.ports() {
            new.add_port(copy_aux(&p, false, memo, should_copy));
        }
    }
    if kind.has_generics() {
        for g in t.generics() {
            new.add_generic(copy_aux(&g, false, memo, should_copy));
        }
    }
    if kind.has_params() {
        for p in t.params() {
            new.add_param(copy_aux(&p, false, memo, should_copy));
        }
    }
    if kind.has_decls() {
        for d in t.decls() {
            new.add_decl(copy_aux(&d, false, memo, should_copy));
        }
    }
    if kind.has_stmts() {
        for s in t.stmts() {
            new.add_stmt(copy_aux(&s, false, memo, should_copy));
        }
    }
    if kind.has_value() {
        if let Some(v) = t.value() {
            new.set_value(Some(copy_aux(&v, false, memo, should_copy)));
        }
    }
    if kind.has_delay() {
        if let Some(d) = t.delay() {
            new.set_delay(copy_aux(&d, false, memo, should_copy));
        }
    }
    if kind.has_target() {
        if let Some(target) = t.target_opt() {
            new.set_target(copy_aux(&target, false, memo, should_copy));
        }
    }
    if kind.has_ref() {
        if let Some(r) = t.refers_to() {
            new.set_refers_to(Some(copy_aux(&r, false, memo, should_copy)));
        }
    }
    if kind.has_message() {
        if let Some(m) = t.message_opt() {
            new.set_message(copy_aux(&m, false, memo, should_copy));
        }
    }
    if kind.has_severity() {
        if let Some(s) = t.severity_opt() {
            new.set_severity(copy_aux(&s, false, memo, should_copy));
        }
    }
    if kind == super::Kind::Aggregate {
        for assoc in t.assocs() {
            let copied = match assoc {
                Assoc::Positional(v) => Assoc::Positional(copy_aux(&v, false, memo, should_copy)),
                Assoc::Named(n, v) => Assoc::Named(n, copy_aux(&v, false, memo, should_copy)),
                Assoc::Range(r, v) => Assoc::Range(r, copy_aux(&v, false, memo, should_copy)),
                Assoc::Others(v) => Assoc::Others(copy_aux(&v, false, memo, should_copy)),
            };
            new.add_assoc(copied);
        }
    }
    if kind == super::Kind::SignalDecl {
        for net in t.nets() {
            new.add_net(net);
        }
    }

    new.set_attrs(t.attrs_snapshot());

    new
}

/// The elaborator's should-copy predicate (`elab_should_copy`): signal,
/// variable, generate-loop, and port declarations always get fresh
/// identity so each instance/iteration owns independent net storage;
/// array-typed constants do too (their storage is per-instance); every
/// other node — including shared expressions, types, and statements —
/// is shared with the source architecture/entity in the library.
pub fn elab_should_copy(t: &Tree) -> bool {
    use super::Kind;
    match t.kind() {
        Kind::ConstDecl => t.ty().is_array(),
        Kind::SignalDecl | Kind::Genvar | Kind::VarDecl | Kind::PortDecl => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::Kind;
    use super::*;
    use crate::ident::Ident;

    #[test]
    fn copied_node_is_always_fresh() {
        let sig = Tree::new(Kind::SignalDecl);
        sig.set_ident(Ident::new("s"));
        let copied = copy(&sig, &|_| false);
        assert!(!copied.ptr_eq(&sig));
        assert_eq!(copied.ident(), Ident::new("s"));
    }

    #[test]
    fn shared_nodes_keep_identity_consistent_across_references() {
        let shared_type_decl = Tree::new(Kind::TypeDecl);
        let arch = Tree::new(Kind::Arch);
        let a = Tree::new(Kind::SignalDecl);
        let b = Tree::new(Kind::SignalDecl);
        // Reuse the same non-copied node from two places; both should
        // resolve to the identical shared object post-copy.
        a.set_value(Some(shared_type_decl.clone()));
        b.set_value(Some(shared_type_decl.clone()));
        arch.add_decl(a.clone());
        arch.add_decl(b.clone());

        let copied = copy(&arch, &|t| t.kind() == Kind::SignalDecl);
        let decls = copied.decls();
        assert!(!decls[0].ptr_eq(&a));
        assert!(!decls[1].ptr_eq(&b));
        assert!(decls[0].value().unwrap().ptr_eq(&shared_type_decl));
        assert!(decls[0].value().unwrap().ptr_eq(&decls[1].value().unwrap()));
    }
}
