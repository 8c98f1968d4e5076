//! Net allocation and resolution.
//!
//! A net is a 32-bit identifier naming one scalar wire; `ELAB`'s
//! `SIGNAL_DECL`s each carry `width(type)` of them.

use super::ElabCtx;
use crate::tree::{Kind, Tree};

/// Evaluate a constant integer expression. The simplifier (external,
/// out of scope) is assumed to have already folded index and
/// bound expressions down to a `LITERAL`; anything else reaching here
/// is a bug in an earlier stage, not a user-facing error.
pub(crate) fn assume_int(expr: &Tree) -> i64 {
    match expr.literal_opt() {
        Some(crate::tree::Literal::Int(n)) => n,
        other => panic!("assume_int: expected a folded integer literal, found {other:?} on a {:?} node", expr.kind()),
    }
}

/// Give `sig` fresh nets if it does not already have any. Used both for
/// ordinary local signals and for port/generic-derived signals that end
/// up unconnected (`OPEN`) or constant-driven (`LITERAL`).
pub(crate) fn elab_signal_nets(sig: &Tree, ctx: &mut ElabCtx) {
    if !sig.nets().is_empty() {
        return;
    }
    let width = sig.ty().width().unwrap_or(1).max(0);
    for _ in 0..width {
        sig.add_net(ctx.alloc_net());
    }
}

/// The n-th scalar net underlying a signal-valued expression (`elab_get_net`).
pub(crate) fn elab_get_net(expr: &Tree, n: i64) -> Option<u32> {
    match expr.kind() {
        Kind::Ref => {
            let decl = expr.refers_to()?;
            usize::try_from(n).ok().and_then(|i| decl.nets().get(i).copied())
        }
        Kind::ArrayRef => {
            let value = expr.value()?;
            let low = value.ty().dim0()?.low;
            let index = assume_int(&expr.params().first()?.clone());
            elab_get_net(&value, n + (index - low))
        }
        Kind::ArraySlice => {
            let value = expr.value()?;
            let slice = expr.range_opt()?;
            let base_low = value.ty().dim0()?.low;
            elab_get_net(&value, n - base_low + slice.low)
        }
        _ => None,
    }
}

/// One resolved port/generic association awaiting net wiring. Built by
/// `elab::instance::bind_port_map`; consumed by `wire_port_map`.
pub(crate) enum MapEntry {
    /// Whole-port association: `formal`'s entire net array comes from
    /// `actual` (width-checked first).
    Whole { formal: Tree, actual: Tree },
    /// Sub-element association (`dout(3) => sig`): only the nets
    /// covering one array element of `formal` are overwritten.
    Sub { formal: Tree, offset_index: i64, actual: Tree },
    /// Constant-driven or unconnected: `formal` gets its own fresh,
    /// unwired nets.
    Floating { formal: Tree },
}

/// Apply every recorded map entry's net wiring (`elab_map_nets`).
pub(crate) fn wire_port_map(entries: &[MapEntry], ctx: &mut ElabCtx) {
    for entry in entries {
        match entry {
            MapEntry::Whole { formal, actual } => wire_whole(formal, actual, ctx),
            MapEntry::Sub { formal, offset_index, actual } => wire_sub(formal, *offset_index, actual, ctx),
            MapEntry::Floating { formal } => elab_signal_nets(formal, ctx),
        }
    }
}

fn actual_width(actual: &Tree) -> Option<i64> {
    match actual.kind() {
        Kind::Ref => actual.refers_to()?.ty().width(),
        Kind::ArrayRef => Some(1),
        Kind::ArraySlice => {
            let range = actual.range_opt()?;
            Some(range.len())
        }
        _ => actual.ty_opt().and_then(|t| t.width()),
    }
}

fn wire_whole(formal: &Tree, actual: &Tree, ctx: &mut ElabCtx) {
    let formal_ty = formal.ty();
    let width = match (formal_ty.is_unconstrained_array(), actual_width(actual)) {
        (true, Some(aw)) => aw,
        (false, Some(aw)) => {
            let fw = formal_ty.width().unwrap_or(aw);
            if fw != aw {
                let loc = if actual.loc().is_valid() { actual.loc() } else { formal.loc() };
                ctx.diags.error(
                    loc,
                    format!("actual width {aw} does not match formal width {fw}"),
                );
                return;
            }
            fw
        }
        (_, None) => {
            ctx.diags.error(formal.loc(), format!("cannot determine width of actual for port {}", formal.ident()));
            return;
        }
    };

    for i in 0..width {
        match elab_get_net(actual, i) {
            Some(net) => formal.add_net(net),
            None => {
                ctx.diags.error(formal.loc(), format!("cannot resolve net {i} of actual bound to port {}", formal.ident()));
                return;
            }
        }
    }
    // A `UARRAY` formal's width is only validated for constrained
    // formals up above, so assert the formal ends up with exactly the
    // width it was just wired to: a `UARRAY` formal's width becomes
    // whatever its first association gives it, and a later mismatched
    // one is still caught by the equality check above.
    assert_eq!(formal.nets().len() as i64, width);
}

fn wire_sub(formal: &Tree, offset_index: i64, actual: &Tree, ctx: &mut ElabCtx) {
    elab_signal_nets(formal, ctx);
    let formal_ty = formal.ty();
    let Some(low) = formal_ty.dim0().map(|r| r.low) else {
        ctx.diags.error(formal.loc(), format!("port {} is not an array", formal.ident()));
        return;
    };
    let elem_width = formal_ty.elem().and_then(|e| e.width()).unwrap_or(1);
    let offset = (offset_index - low) * elem_width;
    for i in 0..elem_width {
        let Some(net) = elab_get_net(actual, i) else {
            ctx.diags.error(formal.loc(), format!("cannot resolve net {i} of sub-element actual for port {}", formal.ident()));
            return;
        };
        let idx = offset + i;
        if idx < 0 || idx as usize >= formal.nets().len() {
            ctx.diags.error(formal.loc(), format!("sub-element index out of range for port {}", formal.ident()));
            return;
        }
        formal.change_net(idx as usize, net);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::elab::ElabConfig;
    use crate::ident::Ident;
    use crate::tree::Literal;
    use crate::types::{Range, Type};

    fn new_ctx(diags: &mut Diagnostics, config: &ElabConfig) -> ElabCtx<'_> {
        ElabCtx::new(config, diags)
    }

    #[test]
    fn fresh_signal_gets_consecutive_nets() {
        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        let mut ctx = new_ctx(&mut diags, &config);

        let sig = Tree::new(Kind::SignalDecl);
        sig.set_ident(Ident::new("s"));
        sig.set_type(Type::carray(Type::integer(0, 1), vec![Range { low: 0, high: 2 }]));
        elab_signal_nets(&sig, &mut ctx);
        assert_eq!(sig.nets(), vec![0, 1, 2]);
    }

    #[test]
    fn array_ref_resolves_offset_net() {
        let outer = Tree::new(Kind::SignalDecl);
        outer.set_ident(Ident::new("bus"));
        outer.set_type(Type::carray(Type::integer(0, 1), vec![Range { low: 0, high: 3 }]));
        outer.add_net(10);
        outer.add_net(11);
        outer.add_net(12);
        outer.add_net(13);

        let base_ref = Tree::new(Kind::Ref);
        base_ref.set_ident(Ident::new("bus"));
        base_ref.set_refers_to(Some(outer.clone()));
        base_ref.set_type(outer.ty());

        let index = Tree::new(Kind::Literal);
        index.set_literal(Literal::Int(2));
        index.set_type(Type::integer(0, 3));

        let array_ref = Tree::new(Kind::ArrayRef);
        array_ref.set_value(Some(base_ref));
        array_ref.add_param(index);
        array_ref.set_type(Type::integer(0, 1));

        assert_eq!(elab_get_net(&array_ref, 0), Some(12));
    }

    #[test]
    fn whole_port_width_mismatch_reports_diagnostic_and_skips_wiring() {
        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        let mut ctx = new_ctx(&mut diags, &config);

        let formal = Tree::new(Kind::SignalDecl);
        formal.set_ident(Ident::new("p"));
        formal.set_type(Type::carray(Type::integer(0, 1), vec![Range { low: 0, high: 3 }]));

        let actual_sig = Tree::new(Kind::SignalDecl);
        actual_sig.set_ident(Ident::new("a"));
        actual_sig.set_type(Type::carray(Type::integer(0, 1), vec![Range { low: 0, high: 1 }]));
        actual_sig.add_net(0);
        actual_sig.add_net(1);

        let actual_ref = Tree::new(Kind::Ref);
        actual_ref.set_ident(Ident::new("a"));
        actual_ref.set_refers_to(Some(actual_sig.clone()));
        actual_ref.set_type(actual_sig.ty());

        wire_whole(&formal, &actual_ref, &mut ctx);
        assert!(diags.has_errors());
        assert!(formal.nets().is_empty());
    }
}
