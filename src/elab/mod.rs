//! The elaborator: recursive expansion of a top-level entity into one
//! flat `ELAB` unit — instance binding, port/generic mapping, net wiring,
//! generate unrolling and package-body function rebinding.

pub mod funcs;
pub mod generate;
pub mod instance;
pub mod nets;

use crate::diag::Diagnostics;
use crate::ident::Ident;
use crate::library::Library;
use crate::tree::{copy, visit, Kind, Tree};

/// Elaboration-wide switches threaded explicitly through the call chain
/// instead of read from the global `options` registry (DESIGN.md, Open
/// Question 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct ElabConfig {
    pub cover: bool,
}

/// Mutable state shared across the whole elaboration: the monotonic net
/// counter (allocation order is user-observable) and the
/// diagnostic sink. `path`/`inst` are deliberately not stored here: each
/// recursive call frame carries its own already-extended identifiers as
/// plain arguments, since those vary per frame, not globally.
pub struct ElabCtx<'a> {
    pub config: &'a ElabConfig,
    pub diags: &'a mut Diagnostics,
    next_net: u32,
}

impl<'a> ElabCtx<'a> {
    pub fn new(config: &'a ElabConfig, diags: &'a mut Diagnostics) -> Self {
        ElabCtx { config, diags, next_net: 0 }
    }

    pub(crate) fn alloc_net(&mut self) -> crate::tree::NetId {
        let id = self.next_net;
        self.next_net += 1;
        id
    }

    pub fn nnets(&self) -> u32 {
        self.next_net
    }
}

/// Compose a hierarchical path/instance name (`hpathf`): lowercase
/// `suffix`, join it onto `parent` with `sep`. VHDL path and instance
/// names are always rendered lowercase regardless of source case.
pub(crate) fn hpathf(parent: Option<Ident>, sep: char, suffix: &str) -> Ident {
    let mut piece = String::with_capacity(suffix.len() + 1);
    piece.push(sep);
    piece.push_str(&suffix.to_ascii_lowercase());
    match parent {
        Some(p) => Ident::extend(p, &piece),
        None => Ident::new(&piece),
    }
}

/// Strip an architecture's library-qualified identifier (`entity-arch`)
/// down to the bare architecture name, for path composition.
fn arch_simple_name(full: Ident) -> String {
    let s = full.to_string();
    match s.split_once('-') {
        Some((_, suffix)) => suffix.to_string(),
        None => s,
    }
}

/// Entry point. `entity` must have no ports and no generics.
/// Returns `None` (and leaves the library untouched) if any diagnostic
/// error was reported during elaboration.
pub fn elaborate(entity: &Tree, lib: &Library, config: &ElabConfig, diags: &mut Diagnostics) -> Option<Tree> {
    if entity.kind() != Kind::Entity {
        diags.error(entity.loc(), "elaboration target must be an entity".to_string());
        return None;
    }
    if !entity.ports().is_empty() || !entity.generics().is_empty() {
        diags.error(
            entity.loc(),
            format!("top-level entity {} may not have ports or generics", entity.ident()),
        );
        return None;
    }

    let arch = match lib.pick_arch(entity.ident()) {
        Ok(a) => a,
        Err(e) => {
            diags.error(entity.loc(), format!("{e}"));
            return None;
        }
    };

    let out = Tree::new(Kind::Elab);
    out.set_ident(Ident::extend(entity.ident(), ".elab"));
    for unit in entity.context() {
        out.add_context(unit);
    }

    let mut ctx = ElabCtx::new(config, diags);

    funcs::rebind_functions(&arch, lib, &entity.context(), &mut ctx);
    // simplify(&arch) runs here in the full pipeline; constant folding
    // is an external collaborator this crate does not own.

    let suffix = format!("{}({})", entity.ident(), arch_simple_name(arch.ident()));
    let path = hpathf(None, Ident::PATH_SEP, &suffix);
    let inst = hpathf(None, Ident::INSTANCE_SEP, &suffix);

    let bound_arch = copy::copy(&arch, &copy::elab_should_copy);
    fixup_entity_refs(&bound_arch, entity, &bound_arch);

    elab_architecture_body(&bound_arch, &out, path, inst, lib, &mut ctx);

    if ctx.diags.has_errors() {
        return None;
    }

    out.add_attr_int(Ident::new("nnets"), ctx.nnets() as i64);

    if config.cover {
        cover_tag(&out);
    }

    lib.put(out.clone());
    let _ = lib.save();

    Some(out)
}

/// Elaborate one architecture (or generate-body) scope: its decls then
/// its statements, in that order.
fn elab_architecture_body(scope: &Tree, out: &Tree, path: Ident, inst: Ident, lib: &Library, ctx: &mut ElabCtx) {
    elab_decls(scope, out, path, ctx);
    elab_stmts(scope, out, path, inst, lib, ctx);
}

/// Declaration installation.
fn elab_decls(scope: &Tree, out: &Tree, path: Ident, ctx: &mut ElabCtx) {
    let path_attr = Ident::new("PATH_NAME");
    let inst_attr = Ident::new("INSTANCE_NAME");

    for decl in scope.decls() {
        match decl.kind() {
            Kind::SignalDecl => {
                nets::elab_signal_nets(&decl, ctx);
                rename_decl(&decl, path, path_attr, inst_attr);
                out.add_decl(decl);
            }
            Kind::FuncBody | Kind::ProcBody | Kind::Alias | Kind::FileDecl | Kind::VarDecl => {
                rename_decl(&decl, path, path_attr, inst_attr);
                out.add_decl(decl);
            }
            Kind::ConstDecl if decl.ty().is_array() => {
                rename_decl(&decl, path, path_attr, inst_attr);
                out.add_decl(decl);
            }
            Kind::FuncDecl | Kind::ProcDecl => {
                rename_decl(&decl, path, path_attr, inst_attr);
            }
            // Types, scalar constants, enum literals and genvars have
            // been fully folded or consumed by this point.
            _ => {}
        }
    }
}

fn rename_decl(decl: &Tree, scope_path: Ident, path_attr: Ident, inst_attr: Ident) {
    let simple = decl.ident();
    let hier = hpathf(Some(scope_path), Ident::PATH_SEP, &simple.to_string());
    decl.add_attr_str(path_attr, hier.to_string());
    decl.add_attr_str(inst_attr, hier.to_string());
    decl.set_ident(hier);
}

/// Statement handling.
fn elab_stmts(scope: &Tree, out: &Tree, path: Ident, inst: Ident, lib: &Library, ctx: &mut ElabCtx) {
    for stmt in scope.stmts() {
        match stmt.kind() {
            Kind::Instance => elab_instance_stmt(&stmt, out, path, inst, lib, ctx),
            Kind::Block => elab_block(&stmt, out, path, inst, lib, ctx),
            Kind::ForGenerate => generate::elab_for_generate(&stmt, out, path, inst, lib, ctx, elab_architecture_body),
            Kind::IfGenerate => {
                ctx.diags.error(
                    stmt.loc(),
                    "if-generate must be eliminated by the simplifier before elaboration runs".to_string(),
                );
            }
            _ => {
                let hier = hpathf(Some(path), Ident::PATH_SEP, &stmt.ident().to_string());
                stmt.set_ident(hier);
                out.add_stmt(stmt);
            }
        }
    }
}

fn elab_block(stmt: &Tree, out: &Tree, path: Ident, inst: Ident, lib: &Library, ctx: &mut ElabCtx) {
    let label = stmt.ident().to_string();
    let new_path = hpathf(Some(path), Ident::PATH_SEP, &label);
    let new_inst = hpathf(Some(inst), Ident::PATH_SEP, &label);
    elab_architecture_body(stmt, out, new_path, new_inst, lib, ctx);
}

/// Instance binding: bind the instance's architecture, wire its
/// nets, then recurse into it with `path`/`inst` extended onto the
/// instance's label and chosen entity/architecture.
fn elab_instance_stmt(stmt: &Tree, out: &Tree, path: Ident, inst: Ident, lib: &Library, ctx: &mut ElabCtx) {
    let Some(bound) = instance::bind_instance(stmt, out, lib, ctx) else {
        return;
    };
    nets::wire_port_map(&bound.map_entries, ctx);
    fixup_entity_refs(&bound.arch, &bound.entity, &bound.arch);

    let label = stmt.ident();
    let entity_name = bound.entity.ident();
    let arch_name = arch_simple_name(bound.chosen_arch);

    let path_suffix = format!("{label}@{entity_name}({arch_name})");
    let new_path = hpathf(Some(path), Ident::PATH_SEP, &path_suffix);

    let inst_suffix = format!("{entity_name}({arch_name})");
    let new_inst = hpathf(Some(inst), Ident::INSTANCE_SEP, &inst_suffix);

    elab_architecture_body(&bound.arch, out, new_path, new_inst, lib, ctx);
}

/// Entity-ref fixup: every `REF` that resolved to `entity`
/// before expansion now points at `arch` instead, so attributes
/// observed through the architecture resolve correctly.
fn fixup_entity_refs(scope: &Tree, entity: &Tree, arch: &Tree) {
    visit::visit(scope, &mut (), &mut |node, _| {
        if node.kind() != Kind::Ref {
            return;
        }
        if let Some(target) = node.refers_to() {
            if target.ptr_eq(entity) {
                node.set_refers_to(Some(arch.clone()));
            }
        }
    });
}

/// Coverage tagging is an external collaborator named out of
/// scope for this core; the hook point is kept so a real tagger can be
/// plugged in without touching the elaboration call path.
fn cover_tag(_elab: &Tree) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Ident;
    use crate::library::Library;
    use crate::loc::Loc;
    use crate::tree::PortMode;
    use crate::types::{Range, Type};

    fn mk_arch(ident: &str, entity: Ident, line: u32) -> Tree {
        let arch = Tree::new(Kind::Arch);
        arch.set_ident(Ident::new(ident));
        arch.set_ident2(entity);
        arch.set_loc(Loc::new("top.vhd", line, 1));
        arch
    }

    #[test]
    fn empty_entity_round_trips_to_an_empty_elab() {
        let lib = Library::tmp();
        let entity = Tree::new(Kind::Entity);
        entity.set_ident(Ident::new("top"));
        lib.put(entity.clone());
        lib.put(mk_arch("top-a", Ident::new("top"), 1));

        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        let out = elaborate(&entity, &lib, &config, &mut diags).expect("elaborates cleanly");

        assert_eq!(out.ident(), Ident::new("top.elab"));
        assert_eq!(out.attr_int(Ident::new("nnets")), Some(0));
        assert!(out.decls().is_empty());
        assert!(out.stmts().is_empty());
    }

    #[test]
    fn signal_allocation_assigns_dense_nets() {
        let lib = Library::tmp();
        let entity = Tree::new(Kind::Entity);
        entity.set_ident(Ident::new("top"));
        lib.put(entity.clone());

        let arch = mk_arch("top-a", Ident::new("top"), 1);
        let sig = Tree::new(Kind::SignalDecl);
        sig.set_ident(Ident::new("s"));
        sig.set_type(Type::carray(Type::integer(0, 1), vec![Range { low: 0, high: 3 }]));
        arch.add_decl(sig);
        lib.put(arch);

        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        let out = elaborate(&entity, &lib, &config, &mut diags).expect("elaborates cleanly");

        assert_eq!(out.attr_int(Ident::new("nnets")), Some(4));
        assert_eq!(out.decls().len(), 1);
        assert_eq!(out.decls()[0].ident().to_string(), ":top(a):s");
        assert_eq!(out.decls()[0].nets(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn top_level_entity_with_ports_is_fatal() {
        let lib = Library::tmp();
        let entity = Tree::new(Kind::Entity);
        entity.set_ident(Ident::new("top"));
        let port = Tree::new(Kind::PortDecl);
        port.set_ident(Ident::new("clk"));
        port.set_type(Type::integer(0, 1));
        port.set_port_mode(PortMode::In);
        entity.add_port(port);

        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        assert!(elaborate(&entity, &lib, &config, &mut diags).is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn for_generate_unrolls_three_signals_with_distinct_nets() {
        let lib = Library::tmp();
        let entity = Tree::new(Kind::Entity);
        entity.set_ident(Ident::new("top"));
        lib.put(entity.clone());

        let arch = mk_arch("top-a", Ident::new("top"), 1);
        let genvar = Tree::new(Kind::Genvar);
        genvar.set_ident(Ident::new("i"));

        let gen = Tree::new(Kind::ForGenerate);
        gen.set_ident(Ident::new("g"));
        gen.set_refers_to(Some(genvar));
        gen.set_range(Range { low: 0, high: 2 });

        let body_sig = Tree::new(Kind::SignalDecl);
        body_sig.set_ident(Ident::new("s"));
        body_sig.set_type(Type::integer(0, 1));
        gen.add_decl(body_sig);

        arch.add_stmt(gen);
        lib.put(arch);

        let config = ElabConfig::default();
        let mut diags = Diagnostics::new();
        let out = elaborate(&entity, &lib, &config, &mut diags).expect("elaborates cleanly");

        assert_eq!(out.attr_int(Ident::new("nnets")), Some(3));
        let mut names: Vec<String> = out.decls().iter().map(|d| d.ident().to_string()).collect();
        names.sort();
        assert_eq!(names, vec![":top(a):g[0]:s", ":top(a):g[1]:s", ":top(a):g[2]:s"]);
    }
}
