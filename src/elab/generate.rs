//! `for-generate` unrolling. `if-generate` is not handled here: the
//! simplifier is required to have eliminated it before elaboration ever
//! sees a statement list, so its survival to this point is fatal.

use super::ElabCtx;
use crate::ident::Ident;
use crate::library::Library;
use crate::tree::rewrite::{rewrite, RewriteAction};
use crate::tree::{copy, Kind, Literal, Tree};
use crate::types::Type;

/// Unroll one `FOR_GENERATE` statement: for every integer `i` in its
/// (already constant-folded) range, copy the generate body, substitute
/// its `GENVAR` with the literal `i`, then install decls/stmts of that
/// copy under a path extended with `<label>[i]`.
pub(crate) fn elab_for_generate(
    stmt: &Tree,
    out: &Tree,
    path: Ident,
    inst: Ident,
    lib: &Library,
    ctx: &mut ElabCtx,
    elab_body: fn(&Tree, &Tree, Ident, Ident, &Library, &mut ElabCtx),
) {
    let Some(range) = stmt.range_opt() else {
        ctx.diags.error(stmt.loc(), "for-generate has no constant-folded range".to_string());
        return;
    };
    let Some(genvar) = stmt.refers_to() else {
        ctx.diags.error(stmt.loc(), "for-generate has no loop variable".to_string());
        return;
    };
    if genvar.kind() != Kind::Genvar {
        ctx.diags.error(stmt.loc(), "for-generate's ref slot does not name a GENVAR".to_string());
        return;
    }

    let label = stmt.ident();
    let genvar_ty = Type::integer(range.low, range.high);

    for i in range.low..=range.high {
        let body = copy::copy(stmt, &copy::elab_should_copy);
        let Some(body_genvar) = body.refers_to() else {
            ctx.diags.error(stmt.loc(), "copied for-generate lost its loop variable".to_string());
            continue;
        };

        let literal = Tree::new(Kind::Literal);
        literal.set_type(genvar_ty.clone());
        literal.set_literal(Literal::Int(i));
        let body = substitute_genvar(&body, &body_genvar, &literal);

        let suffix = format!("{label}[{i}]");
        let new_path = super::hpathf(Some(path), Ident::PATH_SEP, &suffix);
        let new_inst = super::hpathf(Some(inst), Ident::PATH_SEP, &suffix);
        elab_body(&body, out, new_path, new_inst, lib, ctx);
    }
}

/// Replace every `REF` resolving to `genvar` with `literal`. Used both
/// for unrolling and (defensively) to keep `assume_int` callable on any
/// index expression left over from a single-iteration body.
fn substitute_genvar(body: &Tree, genvar: &Tree, literal: &Tree) -> Tree {
    rewrite(body, &mut (), &mut |node, _| {
        if node.kind() == Kind::Ref {
            if let Some(target) = node.refers_to() {
                if target.ptr_eq(genvar) {
                    return RewriteAction::Replace(literal.clone());
                }
            }
        }
        RewriteAction::Keep
    })
    .unwrap_or_else(|| body.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::elab::ElabConfig;
    use crate::library::Library;
    use crate::elab::nets;
    use crate::tree::Kind;
    use crate::types::Range;

    /// Stand-in for `elab_architecture_body`: installs each iteration's
    /// signal under its (already-extended) path and allocates its nets,
    /// without the full decl/stmt machinery this test doesn't exercise.
    fn fake_body(body: &Tree, out: &Tree, path: Ident, _inst: Ident, _lib: &Library, ctx: &mut ElabCtx) {
        for decl in body.decls() {
            nets::elab_signal_nets(&decl, ctx);
            decl.set_ident(path);
            out.add_decl(decl);
        }
    }

    #[test]
    fn unrolls_one_iteration_per_range_value() {
        let genvar = Tree::new(Kind::Genvar);
        genvar.set_ident(Ident::new("i"));

        let body_sig = Tree::new(Kind::SignalDecl);
        body_sig.set_ident(Ident::new("s"));
        body_sig.set_type(Type::integer(0, 1));

        let gen = Tree::new(Kind::ForGenerate);
        gen.set_ident(Ident::new("g"));
        gen.set_refers_to(Some(genvar));
        gen.set_range(Range { low: 0, high: 2 });
        gen.add_decl(body_sig);

        let out = Tree::new(Kind::Elab);
        out.set_ident(Ident::new("top.elab"));

        let lib = Library::tmp();
        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        let mut ctx = ElabCtx::new(&config, &mut diags);

        elab_for_generate(&gen, &out, Ident::new(":top(a)"), Ident::new("@top(a)"), &lib, &mut ctx, fake_body);

        assert_eq!(out.decls().len(), 3);
        assert_eq!(out.decls()[0].nets(), vec![0]);
        assert_eq!(out.decls()[1].nets(), vec![1]);
        assert_eq!(out.decls()[2].nets(), vec![2]);
        let idents: Vec<String> = out.decls().iter().map(|d| d.ident().to_string()).collect();
        assert_eq!(idents, vec![":top(a):g[0]", ":top(a):g[1]", ":top(a):g[2]"]);
    }
}
