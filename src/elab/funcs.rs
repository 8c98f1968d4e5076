//! Function rebinding: before simplification, every `FCALL` is retargeted
//! to the matching package-body `FUNC_BODY`, when one is loaded, so
//! constant folding can see through to a known definition instead of
//! stopping at a bare declaration.

use super::ElabCtx;
use crate::ident::Ident;
use crate::library::Library;
use crate::tree::{visit, Kind, Tree};

const TABLE_CAPACITY: usize = 32;

/// Retarget every `FCALL` in `arch` to the matching `FUNC_BODY` found in
/// the package body of each unit named in `context`, mutating `refers_to`
/// in place (no restructuring needed since a function call's target is
/// an optional slot, not a value the call is built from).
pub(crate) fn rebind_functions(arch: &Tree, lib: &Library, context: &[Ident], ctx: &mut ElabCtx) {
    let mut table: Vec<(Ident, Tree, Tree)> = Vec::with_capacity(TABLE_CAPACITY);

    for unit in context {
        let body_name = Ident::extend(*unit, "-body");
        let body = match lib.get(body_name) {
            Ok(Some(b)) if b.kind() == Kind::PackBody => b,
            Ok(_) => continue,
            Err(e) => {
                ctx.diags.note(arch.loc(), format!("no package body for {unit}: {e}"));
                continue;
            }
        };

        for decl in body.decls() {
            if decl.kind() != Kind::FuncBody {
                continue;
            }
            if table.len() == TABLE_CAPACITY {
                flush(arch, &table);
                table.clear();
            }
            table.push((decl.ident(), decl.ty(), decl.clone()));
        }
    }

    flush(arch, &table);
}

fn flush(arch: &Tree, table: &[(Ident, Tree, Tree)]) {
    if table.is_empty() {
        return;
    }
    visit::visit(arch, &mut (), &mut |node, _| {
        if node.kind() != Kind::FCall {
            return;
        }
        let Some(decl) = node.refers_to() else { return };
        if decl.kind() != Kind::FuncDecl {
            return;
        }
        let decl_ty = decl.ty();
        if let Some((_, _, body)) = table.iter().find(|(ident, ty, _)| *ident == decl.ident() && **ty == *decl_ty) {
            node.set_refers_to(Some(body.clone()));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::elab::ElabConfig;
    use crate::library::Library;
    use crate::types::Type;

    #[test]
    fn fcall_is_retargeted_to_matching_package_body() {
        let lib = Library::tmp();

        let func_decl = Tree::new(Kind::FuncDecl);
        func_decl.set_ident(Ident::new("scale"));
        func_decl.set_type(Type::integer(0, 1023));

        let func_body = Tree::new(Kind::FuncBody);
        func_body.set_ident(Ident::new("scale"));
        func_body.set_type(Type::integer(0, 1023));

        let pack_body = Tree::new(Kind::PackBody);
        pack_body.set_ident(Ident::new("utils-body"));
        pack_body.add_decl(func_body.clone());
        lib.put(pack_body);

        let call = Tree::new(Kind::FCall);
        call.set_ident(Ident::new("scale"));
        call.set_type(Type::integer(0, 1023));
        call.set_refers_to(Some(func_decl.clone()));

        let arch = Tree::new(Kind::Arch);
        let assign = Tree::new(Kind::VarAssign);
        let target = Tree::new(Kind::VarDecl);
        target.set_ident(Ident::new("dummy"));
        target.set_type(Type::integer(0, 1023));
        assign.set_target(target);
        assign.set_value(Some(call.clone()));
        arch.add_stmt(assign);

        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        let mut ectx = ElabCtx::new(&config, &mut diags);

        rebind_functions(&arch, &lib, &[Ident::new("utils")], &mut ectx);

        assert!(call.refers_to().unwrap().ptr_eq(&func_body));
    }
}
