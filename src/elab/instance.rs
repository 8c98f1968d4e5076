//! Instance binding: direct entity instantiation only — component and
//! configuration binding are out of scope and fatal.

use super::funcs::rebind_functions;
use super::nets::MapEntry;
use super::ElabCtx;
use crate::ident::Ident;
use crate::library::Library;
use crate::tree::rewrite::{rewrite, RewriteAction};
use crate::tree::{copy, Kind, Tree};

/// The outcome of binding one `INSTANCE` statement: a fully substituted,
/// function-rebound copy of the chosen architecture, plus the net-wiring
/// work still to be applied by the caller once nets exist.
pub(crate) struct BoundInstance {
    pub arch: Tree,
    pub entity: Tree,
    pub map_entries: Vec<MapEntry>,
    pub chosen_arch: Ident,
}

/// Flag used on a `REF` to mark it as naming a formal in a named
/// association (`formal => actual`) rather than using the formal. This
/// crate's front end resolves associations to a plain formal `Ident` up
/// front (see `Kind::Param`), so no `REF` is ever built in formal
/// position and this attribute is never actually set; the check is kept
/// for parity with the substitution rule as stated.
fn formal_position_attr() -> Ident {
    Ident::new("formal")
}

pub(crate) fn bind_instance(inst_stmt: &Tree, out: &Tree, lib: &Library, ctx: &mut ElabCtx) -> Option<BoundInstance> {
    let entity = inst_stmt.refers_to()?;
    if entity.kind() != Kind::Entity {
        ctx.diags.error(
            inst_stmt.loc(),
            "component and configuration binding are not supported, only direct entity instantiation".to_string(),
        );
        return None;
    }

    let arch = match lib.pick_arch(entity.ident()) {
        Ok(a) => a,
        Err(e) => {
            ctx.diags.error(inst_stmt.loc(), format!("{e}"));
            return None;
        }
    };

    let mut copies = copy::copy_many(&[entity.clone(), arch.clone()], &copy::elab_should_copy);
    let copied_arch = copies.pop().expect("two roots copied");
    let copied_entity = copies.pop().expect("two roots copied");

    let mut substitutions: Vec<(Tree, Option<Tree>)> = Vec::new();
    let mut map_entries: Vec<MapEntry> = Vec::new();
    let mut deleted_formals: Vec<Tree> = Vec::new();

    for formal in copied_entity.ports() {
        let actual_param = inst_stmt.params().into_iter().find(|p| p.ident() == formal.ident());
        let (actual, sub_range) = match &actual_param {
            Some(p) => (p.value(), p.range_opt()),
            None => (formal.value(), None),
        };

        match actual {
            None => {
                let local_sig = Tree::new(Kind::SignalDecl);
                local_sig.set_ident(formal.ident());
                local_sig.set_type(formal.ty());
                copied_arch.add_decl(local_sig.clone());
                map_entries.push(MapEntry::Floating { formal: local_sig });

                deleted_formals.push(formal.clone());
                substitutions.push((formal, None));
            }
            Some(actual) => {
                let local_sig = Tree::new(Kind::SignalDecl);
                local_sig.set_ident(formal.ident());
                local_sig.set_type(formal.ty());
                copied_arch.add_decl(local_sig.clone());
                substitutions.push((formal.clone(), Some(local_sig.clone())));

                if matches!(actual.kind(), Kind::Literal | Kind::Aggregate) {
                    map_entries.push(MapEntry::Floating { formal: local_sig });
                } else if validate_signal_actual(&actual) {
                    match sub_range {
                        Some(r) => map_entries.push(MapEntry::Sub {
                            formal: local_sig,
                            offset_index: r.low,
                            actual,
                        }),
                        None => map_entries.push(MapEntry::Whole { formal: local_sig, actual }),
                    }
                } else {
                    ctx.diags.error(formal.loc(), format!("invalid actual bound to port {}", formal.ident()));
                    return None;
                }
            }
        }
    }

    for formal in copied_entity.generics() {
        let actual_param = inst_stmt.generics().into_iter().find(|p| p.ident() == formal.ident());
        let actual = match &actual_param {
            Some(p) => p.value(),
            None => formal.value(),
        };

        match actual {
            None => {
                deleted_formals.push(formal.clone());
                substitutions.push((formal, None));
            }
            Some(actual) => match classify_constant_actual(&actual) {
                Some(subst) => substitutions.push((formal.clone(), Some(subst))),
                None => {
                    ctx.diags.error(formal.loc(), format!("invalid actual bound to generic {}", formal.ident()));
                    return None;
                }
            },
        }
    }

    let bound_arch = apply_substitutions(&copied_arch, &substitutions);
    let bound_arch = strip_assignments_to_deleted_formals(&bound_arch, &deleted_formals);

    for unit in copied_entity.context() {
        if !out.context().contains(&unit) {
            out.add_context(unit);
        }
    }

    rebind_functions(&bound_arch, lib, &copied_entity.context(), ctx);

    Some(BoundInstance {
        arch: bound_arch,
        entity: copied_entity,
        map_entries,
        chosen_arch: arch.ident(),
    })
}

/// `actual` is a legal signal-class binding iff it bottoms out, through
/// any chain of `ARRAY_REF`/`ARRAY_SLICE`, at a `REF` to a `SIGNAL_DECL`.
fn validate_signal_actual(actual: &Tree) -> bool {
    let mut cur = actual.clone();
    loop {
        match cur.kind() {
            Kind::Ref => return cur.refers_to().map(|d| d.kind() == Kind::SignalDecl).unwrap_or(false),
            Kind::ArrayRef | Kind::ArraySlice => match cur.value() {
                Some(v) => cur = v,
                None => return false,
            },
            _ => return false,
        }
    }
}

/// Classify a generic's actual per the substitution rule: a reference to
/// an existing declaration is shared by identity; a self-contained value
/// is substituted by (shared) identity too, but triggers whole-node
/// replacement rather than a `refers_to` retarget (see
/// `apply_substitutions`).
fn classify_constant_actual(actual: &Tree) -> Option<Tree> {
    match actual.kind() {
        Kind::SignalDecl | Kind::EnumLit | Kind::Literal | Kind::Aggregate | Kind::Ref => Some(actual.clone()),
        _ => None,
    }
}

/// Rewrite every `REF` resolving to one of `substitutions`'s formals.
/// `SIGNAL_DECL`/`ENUM_LIT` substitutes retarget the `REF`'s pointer only
/// (cheap, preserves sharing); everything else replaces the whole `REF`
/// node with the substitute; `None` deletes it, splicing the reference
/// out of whatever slot held it.
fn apply_substitutions(arch: &Tree, substitutions: &[(Tree, Option<Tree>)]) -> Tree {
    let formal_attr = formal_position_attr();
    rewrite(arch, &mut (), &mut |node, _| {
        if node.kind() != Kind::Ref {
            return RewriteAction::Keep;
        }
        if node.attr_int(formal_attr) == Some(1) {
            return RewriteAction::Keep;
        }
        let Some(target) = node.refers_to() else {
            return RewriteAction::Keep;
        };
        for (formal, subst) in substitutions {
            if !target.ptr_eq(formal) {
                continue;
            }
            return match subst {
                None => RewriteAction::Delete,
                Some(s) if matches!(s.kind(), Kind::SignalDecl | Kind::EnumLit) => {
                    node.set_refers_to(Some(s.clone()));
                    RewriteAction::Keep
                }
                Some(s) => RewriteAction::Replace(s.clone()),
            };
        }
        RewriteAction::Keep
    })
    .unwrap_or_else(|| arch.clone())
}

/// A generic `rewrite` can't splice a mandatory (non-`Option`) `target`
/// slot, so an `OPEN`-bound port's dangling assignment target survives
/// the pass above unchanged; and when the deletion hits the RHS instead,
/// the assignment survives with an emptied `value` slot. This second
/// pass drops the whole statement in either case, matching "assignments
/// to it are removed".
fn strip_assignments_to_deleted_formals(arch: &Tree, deleted: &[Tree]) -> Tree {
    rewrite(arch, &mut (), &mut |node, _| {
        if !matches!(node.kind(), Kind::VarAssign | Kind::SignalAssign) {
            return RewriteAction::Keep;
        }
        if node.value().is_none() {
            return RewriteAction::Delete;
        }
        let target = node.target();
        if target.kind() == Kind::Ref {
            if let Some(d) = target.refers_to() {
                if deleted.iter().any(|f| f.ptr_eq(&d)) {
                    return RewriteAction::Delete;
                }
            }
        }
        RewriteAction::Keep
    })
    .unwrap_or_else(|| arch.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::elab::ElabConfig;
    use crate::types::Type;

    fn entity_with_one_in_port() -> Tree {
        let entity = Tree::new(Kind::Entity);
        entity.set_ident(Ident::new("adder"));
        let port = Tree::new(Kind::PortDecl);
        port.set_ident(Ident::new("a"));
        port.set_type(Type::integer(0, 1));
        port.set_port_mode(crate::tree::PortMode::In);
        entity.add_port(port);
        entity
    }

    #[test]
    fn open_port_deletes_its_assignment() {
        let entity = entity_with_one_in_port();
        let port = entity.ports().remove(0);

        let arch = Tree::new(Kind::Arch);
        arch.set_ident(Ident::new("rtl"));
        arch.set_ident2(Ident::new("adder"));

        let a_ref = Tree::new(Kind::Ref);
        a_ref.set_ident(Ident::new("a"));
        a_ref.set_refers_to(Some(port.clone()));
        a_ref.set_type(port.ty());

        let target_sig = Tree::new(Kind::SignalDecl);
        target_sig.set_ident(Ident::new("local"));
        target_sig.set_type(Type::integer(0, 1));

        let target_ref = Tree::new(Kind::Ref);
        target_ref.set_ident(Ident::new("local"));
        target_ref.set_refers_to(Some(target_sig.clone()));
        target_ref.set_type(target_sig.ty());

        let assign = Tree::new(Kind::SignalAssign);
        assign.set_target(target_ref);
        assign.set_value(Some(a_ref));
        arch.add_stmt(assign);

        lib_put_and_bind(&entity, &arch);
    }

    fn lib_put_and_bind(entity: &Tree, arch: &Tree) {
        let lib = Library::tmp();
        lib.put(entity.clone());
        let arch_full_name = Ident::new("adder-rtl");
        let arch_for_lib = arch.clone();
        // pick_arch matches on `name.until('-') == entity`, so the unit
        // must be registered under a name carrying that prefix.
        let renamed = Tree::new(Kind::Arch);
        renamed.set_ident(arch_full_name);
        renamed.set_ident2(arch_for_lib.ident2());
        for stmt in arch_for_lib.stmts() {
            renamed.add_stmt(stmt);
        }
        lib.put(renamed);

        let inst = Tree::new(Kind::Instance);
        inst.set_ident(Ident::new("u1"));
        inst.set_refers_to(Some(entity.clone()));

        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        let mut ectx = ElabCtx::new(&config, &mut diags);
        let out = Tree::new(Kind::Elab);
        out.set_ident(Ident::new("top.elab"));

        let bound = bind_instance(&inst, &out, &lib, &mut ectx).expect("binds with OPEN port (default-less, deleted)");
        assert!(bound.arch.stmts().is_empty(), "assignment driven by an unconnected port must be removed");
    }
}
