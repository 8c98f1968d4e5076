//! End-to-end elaboration scenarios, built from synthetic
//! trees since this crate owns no parser. S1/S2/S4 are also covered as
//! inline unit tests in `src/elab/mod.rs` and `src/elab/generate.rs`;
//! the scenarios here exercise cross-unit wiring that only shows up
//! once a whole design is run through `elaborate`.

use vhdl_elab::diag::Diagnostics;
use vhdl_elab::elab::{elaborate, ElabConfig};
use vhdl_elab::ident::Ident;
use vhdl_elab::library::Library;
use vhdl_elab::loc::Loc;
use vhdl_elab::tree::{Kind, PortMode, Tree};
use vhdl_elab::types::{Range, Type};

fn one_port_entity(name: &str, port: &str) -> Tree {
    let entity = Tree::new(Kind::Entity);
    entity.set_ident(Ident::new(name));
    let p = Tree::new(Kind::PortDecl);
    p.set_ident(Ident::new(port));
    p.set_type(Type::integer(0, 1));
    p.set_port_mode(PortMode::In);
    entity.add_port(p);
    entity
}

fn arch_for(name: &str, entity: Ident, line: u32) -> Tree {
    let arch = Tree::new(Kind::Arch);
    arch.set_ident(Ident::new(name));
    arch.set_ident2(entity);
    arch.set_loc(Loc::new("design.vhd", line, 1));
    arch
}

fn signal_ref(sig: &Tree) -> Tree {
    let r = Tree::new(Kind::Ref);
    r.set_ident(sig.ident());
    r.set_refers_to(Some(sig.clone()));
    r.set_type(sig.ty());
    r
}

fn instance(label: &str, entity: &Tree) -> Tree {
    let inst = Tree::new(Kind::Instance);
    inst.set_ident(Ident::new(label));
    inst.set_ident2(Ident::new(""));
    inst.set_refers_to(Some(entity.clone()));
    inst
}

fn param(formal: &str, actual: Tree) -> Tree {
    let p = Tree::new(Kind::Param);
    p.set_ident(Ident::new(formal));
    p.set_value(Some(actual));
    p
}

/// S3: an outer signal, declared in the top architecture, is bound as
/// the actual for an instance's input port. The formal's nets must
/// resolve to the same nets the outer signal was allocated, proving a
/// `REF` buried inside the (shared, never directly copied) `INSTANCE`
/// statement still gets redirected to the outer signal's fresh copy
/// during architecture expansion.
#[test]
fn instance_port_map_wires_outer_signal_nets_onto_the_formal() {
    let lib = Library::tmp();

    let adder = one_port_entity("adder", "a");
    lib.put(adder.clone());
    lib.put(arch_for("adder-rtl", Ident::new("adder"), 1));

    let top = Tree::new(Kind::Entity);
    top.set_ident(Ident::new("top"));
    lib.put(top.clone());

    let top_arch = arch_for("top-a", Ident::new("top"), 1);
    let sig = Tree::new(Kind::SignalDecl);
    sig.set_ident(Ident::new("sig"));
    sig.set_type(Type::integer(0, 1));
    top_arch.add_decl(sig.clone());

    let inst = instance("u1", &adder);
    inst.add_param(param("a", signal_ref(&sig)));
    top_arch.add_stmt(inst);
    lib.put(top_arch);

    let config = ElabConfig::default();
    let mut diags = Diagnostics::new();
    let out = elaborate(&top, &lib, &config, &mut diags).expect("elaborates cleanly");
    assert!(!diags.has_errors());

    let sig_nets = out
        .decls()
        .iter()
        .find(|d| d.ident().to_string() == ":top(a):sig")
        .expect("outer signal installed")
        .nets();
    let formal_nets = out
        .decls()
        .iter()
        .find(|d| d.ident().to_string() == ":top(a):u1@adder(rtl):a")
        .expect("instance port signal installed")
        .nets();

    assert_eq!(sig_nets, vec![0]);
    assert_eq!(formal_nets, sig_nets, "formal must be wired to the outer signal's own net");
}

/// S5: a port left `OPEN` gets its own unwired nets and any assignment
/// driven by it is dropped, rather than surviving with a dangling ref.
#[test]
fn open_port_gets_floating_nets_and_drops_its_driven_assignment() {
    let lib = Library::tmp();

    let adder = one_port_entity("adder", "a");
    lib.put(adder.clone());
    let adder_arch = arch_for("adder-rtl", Ident::new("adder"), 1);

    let a_port = adder.ports().remove(0);
    let a_ref = Tree::new(Kind::Ref);
    a_ref.set_ident(Ident::new("a"));
    a_ref.set_refers_to(Some(a_port));
    a_ref.set_type(Type::integer(0, 1));

    let local = Tree::new(Kind::SignalDecl);
    local.set_ident(Ident::new("local"));
    local.set_type(Type::integer(0, 1));
    adder_arch.add_decl(local.clone());

    let assign = Tree::new(Kind::SignalAssign);
    assign.set_target(signal_ref(&local));
    assign.set_value(Some(a_ref));
    adder_arch.add_stmt(assign);
    lib.put(adder_arch);

    let top = Tree::new(Kind::Entity);
    top.set_ident(Ident::new("top"));
    lib.put(top.clone());

    let top_arch = arch_for("top-a", Ident::new("top"), 1);
    // No param bound for "a": the formal falls back to `None`, the OPEN case.
    top_arch.add_stmt(instance("u1", &adder));
    lib.put(top_arch);

    let config = ElabConfig::default();
    let mut diags = Diagnostics::new();
    let out = elaborate(&top, &lib, &config, &mut diags).expect("elaborates cleanly");
    assert!(!diags.has_errors());

    assert!(out.stmts().is_empty(), "the assignment driven by the OPEN port must not survive");
    let floating = out
        .decls()
        .iter()
        .find(|d| d.ident().to_string() == ":top(a):u1@adder(rtl):a")
        .expect("OPEN formal still gets its own signal");
    assert_eq!(floating.nets().len(), 1, "OPEN formal gets its own fresh, unwired net");
}

/// S6: a constrained port bound to a narrower actual is a hard error;
/// no nets are wired and elaboration reports it rather than panicking.
#[test]
fn width_mismatch_between_formal_and_actual_is_a_fatal_diagnostic() {
    let lib = Library::tmp();

    let bus_entity = Tree::new(Kind::Entity);
    bus_entity.set_ident(Ident::new("sink"));
    let wide_port = Tree::new(Kind::PortDecl);
    wide_port.set_ident(Ident::new("d"));
    wide_port.set_type(Type::carray(Type::integer(0, 1), vec![Range { low: 0, high: 3 }]));
    wide_port.set_port_mode(PortMode::In);
    bus_entity.add_port(wide_port);
    lib.put(bus_entity.clone());
    lib.put(arch_for("sink-rtl", Ident::new("sink"), 1));

    let top = Tree::new(Kind::Entity);
    top.set_ident(Ident::new("top"));
    lib.put(top.clone());

    let top_arch = arch_for("top-a", Ident::new("top"), 1);
    let narrow_sig = Tree::new(Kind::SignalDecl);
    narrow_sig.set_ident(Ident::new("narrow"));
    narrow_sig.set_type(Type::carray(Type::integer(0, 1), vec![Range { low: 0, high: 1 }]));
    top_arch.add_decl(narrow_sig.clone());

    let inst = instance("u1", &bus_entity);
    inst.add_param(param("d", signal_ref(&narrow_sig)));
    top_arch.add_stmt(inst);
    lib.put(top_arch);

    let config = ElabConfig::default();
    let mut diags = Diagnostics::new();
    let out = elaborate(&top, &lib, &config, &mut diags);

    assert!(out.is_none(), "a width mismatch must fail elaboration");
    assert!(diags.has_errors());
}

/// A design with no signals or instances elaborates to an empty, but
/// valid, `ELAB` unit — the degenerate case every other scenario builds
/// on.
#[test]
fn empty_design_elaborates_to_an_empty_unit() {
    let lib = Library::tmp();
    let top = Tree::new(Kind::Entity);
    top.set_ident(Ident::new("top"));
    lib.put(top.clone());
    lib.put(arch_for("top-a", Ident::new("top"), 1));

    let config = ElabConfig::default();
    let mut diags = Diagnostics::new();
    let out = elaborate(&top, &lib, &config, &mut diags).expect("elaborates cleanly");
    assert_eq!(out.attr_int(Ident::new("nnets")), Some(0));
    assert!(out.decls().is_empty());
    assert!(out.stmts().is_empty());
}
