//! The tree IR: a polymorphic node type shared by every stage from
//! semantic analysis through elaboration.
//!
//! Nodes live in a thread-local allocator (`ALL_TREES`) so that [`gc`]
//! can run a mark-and-sweep independent of who currently holds a
//! handle; a handle itself is a cheap `Rc<RefCell<TreeData>>` clone.

pub mod copy;
pub mod gc;
pub mod kind;
pub mod rewrite;
pub mod serialize;
pub mod visit;

pub use kind::Kind;

use crate::ident::Ident;
use crate::loc::Loc;
use crate::types::{Range, Type};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A flat 32-bit net identifier, allocated monotonically in DFS order
/// during elaboration (see `elab::nets`).
pub type NetId = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Real(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    In,
    Out,
    InOut,
    Buffer,
    Linkage,
}

/// One element of a `T_AGGREGATE`'s association list.
#[derive(Debug, Clone)]
pub enum Assoc {
    Positional(Tree),
    Named(Ident, Tree),
    Range(Range, Tree),
    Others(Tree),
}

#[derive(Debug, Clone)]
pub enum AttrValue {
    Str(String),
    Int(i64),
}

#[derive(Debug, Clone)]
pub struct TreeData {
    pub kind: Kind,
    pub loc: Loc,
    pub ident: Option<Ident>,
    pub ident2: Option<Ident>,
    pub ty: Option<Rc<Type>>,

    pub ports: Vec<Tree>,
    pub generics: Vec<Tree>,
    pub params: Vec<Tree>,
    pub decls: Vec<Tree>,
    pub stmts: Vec<Tree>,

    pub value: Option<Tree>,
    pub delay: Option<Tree>,
    pub target: Option<Tree>,
    pub refers_to: Option<Tree>,
    pub message: Option<Tree>,
    pub severity: Option<Tree>,

    pub literal: Option<Literal>,
    pub port_mode: Option<PortMode>,
    pub pos: Option<u32>,
    pub range: Option<Range>,

    pub assocs: Vec<Assoc>,
    pub context: Vec<Ident>,
    pub nets: Vec<NetId>,

    pub attrs: HashMap<Ident, AttrValue>,

    generation: u32,
    alloc_index: u32,
}

/// A handle to a tree node. Cheap to clone; identity (`Rc::ptr_eq`) is
/// what the rewriter and copy predicate compare against.
///
/// Trees are `Rc`-based, not `Arc`-based: the design this follows
/// is explicit that elaboration is single-threaded and synchronous, so
/// the allocator below is a `thread_local`, not a process-wide `Mutex`,
/// and a `Tree` handle never needs to cross a thread boundary.
#[derive(Clone)]
pub struct Tree(Rc<RefCell<TreeData>>);

struct Allocator {
    trees: Vec<Option<Tree>>,
    generation: u32,
}

thread_local! {
    static ALL_TREES: RefCell<Allocator> = RefCell::new(Allocator {
        trees: Vec::new(),
        generation: 0,
    });
}

impl Tree {
    pub fn new(kind: Kind) -> Tree {
        ALL_TREES.with(|cell| {
        let mut alloc = cell.borrow_mut();
        let index = alloc.trees.len() as u32;
        let data = TreeData {
            kind,
            loc: Loc::invalid(),
            ident: None,
            ident2: None,
            ty: None,
            ports: Vec::new(),
            generics: Vec::new(),
            params: Vec::new(),
            decls: Vec::new(),
            stmts: Vec::new(),
            value: None,
            delay: None,
            target: None,
            refers_to: None,
            message: None,
            severity: None,
            literal: None,
            port_mode: None,
            pos: None,
            range: None,
            assocs: Vec::new(),
            context: Vec::new(),
            nets: Vec::new(),
            attrs: HashMap::new(),
            generation: 0,
            alloc_index: index,
        };
        let tree = Tree(Rc::new(RefCell::new(data)));
        alloc.trees.push(Some(tree.clone()));
        tree
        })
    }

    pub fn kind(&self) -> Kind {
        self.0.borrow().kind
    }

    pub fn loc(&self) -> Loc {
        self.0.borrow().loc.clone()
    }

    pub fn set_loc(&self, loc: Loc) {
        self.0.borrow_mut().loc = loc;
    }

    pub fn ident(&self) -> Ident {
        let k = self.kind();
        assert!(k.has_ident(), "{k:?} has no ident slot");
        self.0.borrow().ident.expect("ident slot not yet set")
    }

    pub fn set_ident(&self, id: Ident) {
        let k = self.kind();
        assert!(k.has_ident(), "{k:?} has no ident slot");
        self.0.borrow_mut().ident = Some(id);
    }

    pub fn ident2(&self) -> Ident {
        let k = self.kind();
        assert!(k.has_ident2(), "{k:?} has no ident2 slot");
        self.0.borrow().ident2.expect("ident2 slot not yet set")
    }

    pub fn set_ident2(&self, id: Ident) {
        let k = self.kind();
        assert!(k.has_ident2(), "{k:?} has no ident2 slot");
        self.0.borrow_mut().ident2 = Some(id);
    }

    pub fn ty(&self) -> Rc<Type> {
        let k = self.kind();
        assert!(k.has_type(), "{k:?} has no type slot");
        Rc::clone(self.0.borrow().ty.as_ref().expect("type slot not yet set"))
    }

    pub fn set_type(&self, ty: Rc<Type>) {
        let k = self.kind();
        assert!(k.has_type(), "{k:?} has no type slot");
        self.0.borrow_mut().ty = Some(ty);
    }

    pub fn ports(&self) -> Vec<Tree> {
        assert!(self.kind().has_ports());
        self.0.borrow().ports.clone()
    }

    pub fn add_port(&self, port: Tree) {
        assert!(self.kind().has_ports());
        self.0.borrow_mut().ports.push(port);
    }

    pub fn generics(&self) -> Vec<Tree> {
        assert!(self.kind().has_generics());
        self.0.borrow().generics.clone()
    }

    pub fn add_generic(&self, generic: Tree) {
        assert!(self.kind().has_generics());
        self.0.borrow_mut().generics.push(generic);
    }

    pub fn params(&self) -> Vec<Tree> {
        assert!(self.kind().has_params());
        self.0.borrow().params.clone()
    }

    pub fn add_param(&self, param: Tree) {
        assert!(self.kind().has_params());
        self.0.borrow_mut().params.push(param);
    }

    pub fn decls(&self) -> Vec<Tree> {
        assert!(self.kind().has_decls());
        self.0.borrow().decls.clone()
    }

    pub fn add_decl(&self, decl: Tree) {
        assert!(self.kind().has_decls());
        self.0.borrow_mut().decls.push(decl);
    }

    pub fn stmts(&self) -> Vec<Tree> {
        assert!(self.kind().has_stmts());
        self.0.borrow().stmts.clone()
    }

    pub fn add_stmt(&self, stmt: Tree) {
        assert!(self.kind().has_stmts());
        self.0.borrow_mut().stmts.push(stmt);
    }

    pub fn value(&self) -> Option<Tree> {
        assert!(self.kind().has_value(), "{:?} has no value slot", self.kind());
        self.0.borrow().value.clone()
    }

    pub fn set_value(&self, value: Option<Tree>) {
        assert!(self.kind().has_value());
        self.0.borrow_mut().value = value;
    }

    pub fn delay(&self) -> Option<Tree> {
        assert!(self.kind().has_delay());
        self.0.borrow().delay.clone()
    }

    pub fn set_delay(&self, delay: Tree) {
        assert!(self.kind().has_delay());
        self.0.borrow_mut().delay = Some(delay);
    }

    pub fn target(&self) -> Tree {
        assert!(self.kind().has_target());
        self.0.borrow().target.clone().expect("target slot not yet set")
    }

    pub fn set_target(&self, target: Tree) {
        assert!(self.kind().has_target());
        self.0.borrow_mut().target = Some(target);
    }

    pub fn refers_to(&self) -> Option<Tree> {
        assert!(self.kind().has_ref(), "{:?} has no ref slot", self.kind());
        self.0.borrow().refers_to.clone()
    }

    pub fn set_refers_to(&self, target: Option<Tree>) {
        assert!(self.kind().has_ref());
        self.0.borrow_mut().refers_to = target;
    }

    pub fn message(&self) -> Tree {
        assert!(self.kind().has_message());
        self.0.borrow().message.clone().expect("message slot not yet set")
    }

    pub fn set_message(&self, message: Tree) {
        assert!(self.kind().has_message());
        self.0.borrow_mut().message = Some(message);
    }

    pub fn severity(&self) -> Tree {
        assert!(self.kind().has_severity());
        self.0.borrow().severity.clone().expect("severity slot not yet set")
    }

    pub fn set_severity(&self, severity: Tree) {
        assert!(self.kind().has_severity());
        self.0.borrow_mut().severity = Some(severity);
    }

    pub fn literal(&self) -> Literal {
        assert_eq!(self.kind(), Kind::Literal);
        self.0.borrow().literal.expect("literal slot not yet set")
    }

    pub fn set_literal(&self, literal: Literal) {
        assert_eq!(self.kind(), Kind::Literal);
        self.0.borrow_mut().literal = Some(literal);
    }

    pub fn port_mode(&self) -> PortMode {
        assert_eq!(self.kind(), Kind::PortDecl);
        self.0.borrow().port_mode.expect("port mode not yet set")
    }

    pub fn set_port_mode(&self, mode: PortMode) {
        assert_eq!(self.kind(), Kind::PortDecl);
        self.0.borrow_mut().port_mode = Some(mode);
    }

    pub fn pos(&self) -> u32 {
        assert_eq!(self.kind(), Kind::EnumLit);
        self.0.borrow().pos.expect("pos not yet set")
    }

    pub fn set_pos(&self, pos: u32) {
        assert_eq!(self.kind(), Kind::EnumLit);
        self.0.borrow_mut().pos = Some(pos);
    }

    pub fn range(&self) -> Range {
        assert!(self.kind().has_range());
        self.0.borrow().range.expect("range not yet set")
    }

    pub fn set_range(&self, range: Range) {
        assert!(self.kind().has_range());
        self.0.borrow_mut().range = Some(range);
    }

    pub fn assocs(&self) -> Vec<Assoc> {
        assert_eq!(self.kind(), Kind::Aggregate);
        self.0.borrow().assocs.clone()
    }

    pub fn add_assoc(&self, assoc: Assoc) {
        assert_eq!(self.kind(), Kind::Aggregate);
        self.0.borrow_mut().assocs.push(assoc);
    }

    pub fn set_ports(&self, ports: Vec<Tree>) {
        assert!(self.kind().has_ports());
        self.0.borrow_mut().ports = ports;
    }

    pub fn set_generics(&self, generics: Vec<Tree>) {
        assert!(self.kind().has_generics());
        self.0.borrow_mut().generics = generics;
    }

    pub fn set_params(&self, params: Vec<Tree>) {
        assert!(self.kind().has_params());
        self.0.borrow_mut().params = params;
    }

    pub fn set_decls(&self, decls: Vec<Tree>) {
        assert!(self.kind().has_decls());
        self.0.borrow_mut().decls = decls;
    }

    pub fn set_stmts(&self, stmts: Vec<Tree>) {
        assert!(self.kind().has_stmts());
        self.0.borrow_mut().stmts = stmts;
    }

    pub fn set_assocs(&self, assocs: Vec<Assoc>) {
        assert_eq!(self.kind(), Kind::Aggregate);
        self.0.borrow_mut().assocs = assocs;
    }

    pub fn context(&self) -> Vec<Ident> {
        assert!(self.kind().has_context());
        self.0.borrow().context.clone()
    }

    pub fn add_context(&self, unit: Ident) {
        assert!(self.kind().has_context());
        self.0.borrow_mut().context.push(unit);
    }

    pub fn nets(&self) -> Vec<NetId> {
        assert_eq!(self.kind(), Kind::SignalDecl);
        self.0.borrow().nets.clone()
    }

    pub fn add_net(&self, net: NetId) {
        assert_eq!(self.kind(), Kind::SignalDecl);
        self.0.borrow_mut().nets.push(net);
    }

    pub fn change_net(&self, index: usize, net: NetId) {
        assert_eq!(self.kind(), Kind::SignalDecl);
        let mut data = self.0.borrow_mut();
        assert!(index < data.nets.len(), "net index out of range");
        data.nets[index] = net;
    }

    pub fn add_attr_str(&self, name: Ident, value: impl Into<String>) {
        self.0.borrow_mut().attrs.insert(name, AttrValue::Str(value.into()));
    }

    pub fn add_attr_int(&self, name: Ident, value: i64) {
        self.0.borrow_mut().attrs.insert(name, AttrValue::Int(value));
    }

    pub fn attr_str(&self, name: Ident) -> Option<String> {
        match self.0.borrow().attrs.get(&name) {
            Some(AttrValue::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn attr_int(&self, name: Ident) -> Option<i64> {
        match self.0.borrow().attrs.get(&name) {
            Some(AttrValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn attrs_snapshot(&self) -> HashMap<Ident, AttrValue> {
        self.0.borrow().attrs.clone()
    }

    pub fn set_attrs(&self, attrs: HashMap<Ident, AttrValue>) {
        self.0.borrow_mut().attrs = attrs;
    }

    pub fn ident_opt(&self) -> Option<Ident> {
        assert!(self.kind().has_ident());
        self.0.borrow().ident
    }

    pub fn ident2_opt(&self) -> Option<Ident> {
        assert!(self.kind().has_ident2());
        self.0.borrow().ident2
    }

    pub fn ty_opt(&self) -> Option<Rc<Type>> {
        assert!(self.kind().has_type());
        self.0.borrow().ty.clone()
    }

    pub fn literal_opt(&self) -> Option<Literal> {
        self.0.borrow().literal
    }

    pub fn port_mode_opt(&self) -> Option<PortMode> {
        self.0.borrow().port_mode
    }

    pub fn pos_opt(&self) -> Option<u32> {
        self.0.borrow().pos
    }

    pub fn target_opt(&self) -> Option<Tree> {
        assert!(self.kind().has_target());
        self.0.borrow().target.clone()
    }

    pub fn message_opt(&self) -> Option<Tree> {
        assert!(self.kind().has_message());
        self.0.borrow().message.clone()
    }

    pub fn severity_opt(&self) -> Option<Tree> {
        assert!(self.kind().has_severity());
        self.0.borrow().severity.clone()
    }

    pub fn range_opt(&self) -> Option<Range> {
        assert!(self.kind().has_range());
        self.0.borrow().range
    }

    pub fn ptr_eq(&self, other: &Tree) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn alloc_index(&self) -> u32 {
        self.0.borrow().alloc_index
    }

    fn generation(&self) -> u32 {
        self.0.borrow().generation
    }

    fn set_generation(&self, gen: u32) {
        self.0.borrow_mut().generation = gen;
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("Tree")
            .field("kind", &data.kind)
            .field("ident", &data.ident)
            .finish_non_exhaustive()
    }
}

/// Bump the global generation counter and return the new value. Used by
/// both `visit`/`rewrite` (to guard against revisiting shared subtrees)
/// and `gc` (to mark liveness).
fn next_generation() -> u32 {
    ALL_TREES.with(|cell| {
        let mut alloc = cell.borrow_mut();
        alloc.generation += 1;
        alloc.generation
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_slot_access_panics() {
        let lit = Tree::new(Kind::Literal);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| lit.ports()));
        assert!(result.is_err());
    }

    #[test]
    fn signal_decl_accumulates_nets() {
        let sig = Tree::new(Kind::SignalDecl);
        sig.add_net(0);
        sig.add_net(1);
        assert_eq!(sig.nets(), vec![0, 1]);
        sig.change_net(0, 5);
        assert_eq!(sig.nets(), vec![5, 1]);
    }

    #[test]
    fn attribute_bag_round_trips() {
        let arch = Tree::new(Kind::Arch);
        let name = Ident::new("PATH_NAME");
        arch.add_attr_str(name, "top:a");
        assert_eq!(arch.attr_str(name).as_deref(), Some("top:a"));
    }
}
