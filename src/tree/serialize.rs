//! Binary serialization with structure sharing via back-references.
//!
//! Null slots are a sentinel, already-emitted nodes are a back-reference
//! token, and identifiers/types get their own back-reference sub-contexts so
//! a type shared by a thousand decls is written once. The wire format is
//! plain byte-width fields rather than a bit-packed/VBR encoding.

use super::{Assoc, AttrValue, Kind, Literal, NetId, PortMode, Tree};
use crate::ident::Ident;
use crate::loc::Loc;
use crate::types::{PhysicalUnit, Range, Type};
use std::collections::HashMap;
use std::rc::Rc;
use std::{error, fmt};

const TAG_NEW: u16 = 0x0000;
const TAG_NULL: u16 = 0xFFFF;
const TAG_BACKREF: u16 = 0xFFFE;

#[derive(Debug, Clone)]
pub enum Error {
    UnexpectedEof,
    InvalidSentinel(u16),
    InvalidKind(u8),
    UnknownTreeBackref(u32),
    UnknownIdentBackref(u32),
    UnknownTypeBackref(u32),
    InvalidTypeTag(u8),
    InvalidLiteralTag(u8),
    InvalidPortMode(u8),
    InvalidAssocTag(u8),
    InvalidAttrTag(u8),
    Utf8,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of stream"),
            Self::InvalidSentinel(tag) => write!(f, "invalid slot tag 0x{tag:04x}"),
            Self::InvalidKind(k) => write!(f, "invalid tree kind tag {k}"),
            Self::UnknownTreeBackref(id) => write!(f, "unresolved tree back-reference {id}"),
            Self::UnknownIdentBackref(id) => write!(f, "unresolved identifier back-reference {id}"),
            Self::UnknownTypeBackref(id) => write!(f, "unresolved type back-reference {id}"),
            Self::InvalidTypeTag(t) => write!(f, "invalid type tag {t}"),
            Self::InvalidLiteralTag(t) => write!(f, "invalid literal tag {t}"),
            Self::InvalidPortMode(m) => write!(f, "invalid port mode tag {m}"),
            Self::InvalidAssocTag(t) => write!(f, "invalid aggregate association tag {t}"),
            Self::InvalidAttrTag(t) => write!(f, "invalid attribute value tag {t}"),
            Self::Utf8 => write!(f, "invalid utf-8 in identifier or string payload"),
        }
    }
}

impl error::Error for Error {}

// ---------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------

struct Writer {
    buf: Vec<u8>,
    trees: HashMap<u32, u32>,
    next_tree: u32,
    idents: HashMap<Ident, u32>,
    next_ident: u32,
    types: HashMap<usize, u32>,
    next_type: u32,
}

impl Writer {
    fn new() -> Self {
        Writer {
            buf: Vec::new(),
            trees: HashMap::new(),
            next_tree: 0,
            idents: HashMap::new(),
            next_ident: 0,
            types: HashMap::new(),
            next_type: 0,
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, s: &str) {
        let raw = s.as_bytes();
        self.u32(raw.len() as u32);
        self.buf.extend_from_slice(raw);
    }

    fn ident(&mut self, id: Ident) {
        if let Some(&back) = self.idents.get(&id) {
            self.u16(TAG_BACKREF);
            self.u32(back);
            return;
        }
        let slot = self.next_ident;
        self.next_ident += 1;
        self.idents.insert(id, slot);
        self.u16(TAG_NEW);
        self.bytes(&id.as_arc());
    }

    fn ident_slot(&mut self, id: Option<Ident>) {
        match id {
            None => self.u16(TAG_NULL),
            Some(id) => self.ident(id),
        }
    }

    fn loc(&mut self, loc: &Loc) {
        self.bytes(&loc.file);
        self.u32(loc.first_line);
        self.u16(loc.first_column);
        self.u32(loc.last_line);
        self.u16(loc.last_column);
        match &loc.line_text {
            None => self.u8(0),
            Some(text) => {
                self.u8(1);
                self.bytes(text);
            }
        }
    }

    fn range(&mut self, r: &Range) {
        self.i64(r.low);
        self.i64(r.high);
    }

    fn range_slot(&mut self, r: Option<Range>) {
        match r {
            None => self.u8(0),
            Some(r) => {
                self.u8(1);
                self.range(&r);
            }
        }
    }

    fn ty_slot(&mut self, ty: Option<Rc<Type>>) {
        match ty {
            None => self.u16(TAG_NULL),
            Some(ty) => self.ty(&ty),
        }
    }

    fn ty(&mut self, ty: &Rc<Type>) {
        let key = Rc::as_ptr(ty) as usize;
        if let Some(&back) = self.types.get(&key) {
            self.u16(TAG_BACKREF);
            self.u32(back);
            return;
        }
        let slot = self.next_type;
        self.next_type += 1;
        self.types.insert(key, slot);
        self.u16(TAG_NEW);
        match &**ty {
            Type::Integer { range } => {
                self.u8(0);
                self.range(range);
            }
            Type::Physical { range, units } => {
                self.u8(1);
                self.range(range);
                self.u32(units.len() as u32);
                for unit in units {
                    self.ident(unit.name);
                    self.i64(unit.multiplier);
                }
            }
            Type::Enum { literals } => {
                self.u8(2);
                self.u32(literals.len() as u32);
                for lit in literals {
                    self.ident(*lit);
                }
            }
            Type::CArray { elem, dims } => {
                self.u8(3);
                self.ty(elem);
                self.u32(dims.len() as u32);
                for d in dims {
                    self.range(d);
                }
            }
            Type::UArray { elem, index_dims } => {
                self.u8(4);
                self.ty(elem);
                self.u32(*index_dims as u32);
            }
            Type::Subtype { base, dims } => {
                self.u8(5);
                self.ty(base);
                self.u32(dims.len() as u32);
                for d in dims {
                    self.range(d);
                }
            }
            Type::Func { params, result } => {
                self.u8(6);
                self.u32(params.len() as u32);
                for p in params {
                    self.ty(p);
                }
                self.ty(result);
            }
            Type::Unresolved => self.u8(7),
        }
    }

    fn tree_slot(&mut self, slot: Option<Tree>) {
        match slot {
            None => self.u16(TAG_NULL),
            Some(t) => self.tree(&t),
        }
    }

    fn tree_vec(&mut self, items: Vec<Tree>) {
        self.u32(items.len() as u32);
        for item in items {
            self.tree(&item);
        }
    }

    fn tree(&mut self, t: &Tree) {
        let key = t.alloc_index();
        if let Some(&back) = self.trees.get(&key) {
            self.u16(TAG_BACKREF);
            self.u32(back);
            return;
        }
        let slot = self.next_tree;
        self.next_tree += 1;
        self.trees.insert(key, slot);
        self.u16(TAG_NEW);
        self.node(t);
    }

    fn node(&mut self, t: &Tree) {
        let kind = t.kind();
        self.u8(kind as u8);
        self.loc(&t.loc());

        if kind.has_ident() {
            self.ident_slot(t.ident_opt());
        }
        if kind.has_ident2() {
            self.ident_slot(t.ident2_opt());
        }
        if kind.has_type() {
            self.ty_slot(t.ty_opt());
        }
        if kind.has_ports() {
            self.tree_vec(t.ports());
        }
        if kind.has_generics() {
            self.tree_vec(t.generics());
        }
        if kind.has_params() {
            self.tree_vec(t.params());
        }
        if kind.has_decls() {
            self.tree_vec(t.decls());
        }
        if kind.has_stmts() {
            self.tree_vec(t.stmts());
        }
        if kind.has_value() {
            self.tree_slot(t.value());
        }
        if kind.has_delay() {
            self.tree_slot(t.delay());
        }
        if kind.has_target() {
            self.tree_slot(t.target_opt());
        }
        if kind.has_ref() {
            self.tree_slot(t.refers_to());
        }
        if kind.has_message() {
            self.tree_slot(t.message_opt());
        }
        if kind.has_severity() {
            self.tree_slot(t.severity_opt());
        }
        if kind == Kind::Literal {
            match t.literal_opt() {
                None => self.u8(0xFF),
                Some(Literal::Int(v)) => {
                    self.u8(0);
                    self.i64(v);
                }
                Some(Literal::Real(v)) => {
                    self.u8(1);
                    self.f64(v);
                }
            }
        }
        if kind == Kind::PortDecl {
            match t.port_mode_opt() {
                None => self.u8(0xFF),
                Some(mode) => self.u8(match mode {
                    PortMode::In => 0,
                    PortMode::Out => 1,
                    PortMode::InOut => 2,
                    PortMode::Buffer => 3,
                    PortMode::Linkage => 4,
                }),
            }
        }
        if kind == Kind::EnumLit {
            match t.pos_opt() {
                None => self.u32(u32::MAX),
                Some(pos) => self.u32(pos),
            }
        }
        if kind.has_range() {
            self.range_slot(t.range_opt());
        }
        if kind == Kind::Aggregate {
            let assocs = t.assocs();
            self.u32(assocs.len() as u32);
            for assoc in assocs {
                match assoc {
                    Assoc::Positional(v) => {
                        self.u8(0);
                        self.tree(&v);
                    }
                    Assoc::Named(name, v) => {
                        self.u8(1);
                        self.ident(name);
                        self.tree(&v);
                    }
                    Assoc::Range(r, v) => {
                        self.u8(2);
                        self.range(&r);
                        self.tree(&v);
                    }
                    Assoc::Others(v) => {
                        self.u8(3);
                        self.tree(&v);
                    }
                }
            }
        }
        if kind.has_context() {
            let context = t.context();
            self.u32(context.len() as u32);
            for unit in context {
                self.ident(unit);
            }
        }
        if kind == Kind::SignalDecl {
            let nets = t.nets();
            self.u32(nets.len() as u32);
            for net in nets {
                self.u32(net);
            }
        }

        let attrs = t.attrs_snapshot();
        self.u32(attrs.len() as u32);
        for (name, value) in attrs {
            self.ident(name);
            match value {
                AttrValue::Str(s) => {
                    self.u8(0);
                    self.bytes(&s);
                }
                AttrValue::Int(n) => {
                    self.u8(1);
                    self.i64(n);
                }
            }
        }
    }
}

/// Serialize `root` to a self-contained byte stream.
pub fn write(root: &Tree) -> Vec<u8> {
    let mut w = Writer::new();
    w.tree(root);
    w.buf
}

// ---------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    trees: Vec<Option<Tree>>,
    idents: Vec<Option<Ident>>,
    types: Vec<Option<Rc<Type>>>,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader {
            buf,
            pos: 0,
            trees: Vec::new(),
            idents: Vec::new(),
            types: Vec::new(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.pos + n > self.buf.len() {
            return Err(Error::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64, Error> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes(b.try_into().expect("8 bytes")))
    }

    fn f64(&mut self) -> Result<f64, Error> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes(b.try_into().expect("8 bytes")))
    }

    fn string(&mut self) -> Result<String, Error> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| Error::Utf8)
    }

    fn ident_slot(&mut self) -> Result<Option<Ident>, Error> {
        match self.u16()? {
            TAG_NULL => Ok(None),
            TAG_NEW => {
                let slot = self.idents.len();
                self.idents.push(None);
                let s = self.string()?;
                let id = Ident::new(&s);
                self.idents[slot] = Some(id);
                Ok(Some(id))
            }
            TAG_BACKREF => {
                let idx = self.u32()? as usize;
                self.idents
                    .get(idx)
                    .and_then(|x| *x)
                    .map(Some)
                    .ok_or(Error::UnknownIdentBackref(idx as u32))
            }
            other => Err(Error::InvalidSentinel(other)),
        }
    }

    fn ident(&mut self) -> Result<Ident, Error> {
        self.ident_slot()?.ok_or(Error::UnexpectedEof)
    }

    fn loc(&mut self) -> Result<Loc, Error> {
        let file = self.string()?;
        let first_line = self.u32()?;
        let first_column = self.u16()?;
        let last_line = self.u32()?;
        let last_column = self.u16()?;
        let line_text = match self.u8()? {
            0 => None,
            _ => Some(self.string()?.into()),
        };
        Ok(Loc {
            file: file.into(),
            first_line,
            first_column,
            last_line,
            last_column,
            line_text,
        })
    }

    fn range(&mut self) -> Result<Range, Error> {
        let low = self.i64()?;
        let high = self.i64()?;
        Ok(Range { low, high })
    }

    fn range_slot(&mut self) -> Result<Option<Range>, Error> {
        match self.u8()? {
            0 => Ok(None),
            _ => Ok(Some(self.range()?)),
        }
    }

    fn ty_slot(&mut self) -> Result<Option<Rc<Type>>, Error> {
        match self.u16()? {
            TAG_NULL => Ok(None),
            TAG_NEW => self.ty_new().map(Some),
            TAG_BACKREF => {
                let idx = self.u32()? as usize;
                self.types
                    .get(idx)
                    .cloned()
                    .flatten()
                    .ok_or(Error::UnknownTypeBackref(idx as u32))
            }
            other => Err(Error::InvalidSentinel(other)),
        }
    }

    fn ty(&mut self) -> Result<Rc<Type>, Error> {
        self.ty_slot()?.ok_or(Error::UnexpectedEof)
    }

    fn ty_new(&mut self) -> Result<Rc<Type>, Error> {
        let slot = self.types.len();
        self.types.push(None);
        let tag = self.u8()?;
        let ty = match tag {
            0 => Type::Integer { range: self.range()? },
            1 => {
                let range = self.range()?;
                let count = self.u32()?;
                let mut units = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let name = self.ident()?;
                    let multiplier = self.i64()?;
                    units.push(PhysicalUnit { name, multiplier });
                }
                Type::Physical { range, units }
            }
            2 => {
                let count = self.u32()?;
                let mut literals = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    literals.push(self.ident()?);
                }
                Type::Enum { literals }
            }
            3 => {
                let elem = self.ty()?;
                let count = self.u32()?;
                let mut dims = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    dims.push(self.range()?);
                }
                Type::CArray { elem, dims }
            }
            4 => {
                let elem = self.ty()?;
                let index_dims = self.u32()? as usize;
                Type::UArray { elem, index_dims }
            }
            5 => {
                let base = self.ty()?;
                let count = self.u32()?;
                let mut dims = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    dims.push(self.range()?);
                }
                Type::Subtype { base, dims }
            }
            6 => {
                let count = self.u32()?;
                let mut params = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    params.push(self.ty()?);
                }
                let result = self.ty()?;
                Type::Func { params, result }
            }
            7 => Type::Unresolved,
            other => return Err(Error::InvalidTypeTag(other)),
        };
        let rc = Rc::new(ty);
        self.types[slot] = Some(Rc::clone(&rc));
        Ok(rc)
    }

    fn tree_slot(&mut self) -> Result<Option<Tree>, Error> {
        match self.u16()? {
            TAG_NULL => Ok(None),
            TAG_NEW => self.tree_new().map(Some),
            TAG_BACKREF => {
                let idx = self.u32()? as usize;
                self.trees
                    .get(idx)
                    .cloned()
                    .flatten()
                    .ok_or(Error::UnknownTreeBackref(idx as u32))
            }
            other => Err(Error::InvalidSentinel(other)),
        }
    }

    fn tree(&mut self) -> Result<Tree, Error> {
        self.tree_slot()?.ok_or(Error::UnexpectedEof)
    }

    fn tree_vec(&mut self) -> Result<Vec<Tree>, Error> {
        let count = self.u32()?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(self.tree()?);
        }
        Ok(out)
    }

    fn tree_new(&mut self) -> Result<Tree, Error> {
        let slot = self.trees.len();
        self.trees.push(None);

        let kind_byte = self.u8()?;
        let kind = Kind::try_from(kind_byte).map_err(|_| Error::InvalidKind(kind_byte))?;
        let t = Tree::new(kind);
        self.trees[slot] = Some(t.clone());

        t.set_loc(self.loc()?);

        if kind.has_ident() {
            if let Some(id) = self.ident_slot()? {
                t.set_ident(id);
            }
        }
        if kind.has_ident2() {
            if let Some(id) = self.ident_slot()? {
                t.set_ident2(id);
            }
        }
        if kind.has_type() {
            if let Some(ty) = self.ty_slot()? {
                t.set_type(ty);
            }
        }
        if kind.has_ports() {
            t.set_ports(self.tree_vec()?);
        }
        if kind.has_generics() {
            t.set_generics(self.tree_vec()?);
        }
        if kind.has_params() {
            t.set_params(self.tree_vec()?);
        }
        if kind.has_decls() {
            t.set_decls(self.tree_vec()?);
        }
        if kind.has_stmts() {
            t.set_stmts(self.tree_vec()?);
        }
        if kind.has_value() {
            t.set_value(self.tree_slot()?);
        }
        if kind.has_delay() {
            if let Some(d) = self.tree_slot()? {
                t.set_delay(d);
            }
        }
        if kind.has_target() {
            if let Some(target) = self.tree_slot()? {
                t.set_target(target);
            }
        }
        if kind.has_ref() {
            t.set_refers_to(self.tree_slot()?);
        }
        if kind.has_message() {
            if let Some(m) = self.tree_slot()? {
                t.set_message(m);
            }
        }
        if kind.has_severity() {
            if let Some(s) = self.tree_slot()? {
                t.set_severity(s);
            }
        }
        if kind == Kind::Literal {
            match self.u8()? {
                0xFF => {}
                0 => t.set_literal(Literal::Int(self.i64()?)),
                1 => t.set_literal(Literal::Real(self.f64()?)),
                other => return Err(Error::InvalidLiteralTag(other)),
            }
        }
        if kind == Kind::PortDecl {
            match self.u8()? {
                0xFF => {}
                0 => t.set_port_mode(PortMode::In),
                1 => t.set_port_mode(PortMode::Out),
                2 => t.set_port_mode(PortMode::InOut),
                3 => t.set_port_mode(PortMode::Buffer),
                4 => t.set_port_mode(PortMode::Linkage),
                other => return Err(Error::InvalidPortMode(other)),
            }
        }
        if kind == Kind::EnumLit {
            let pos = self.u32()?;
            if pos != u32::MAX {
                t.set_pos(pos);
            }
        }
        if kind.has_range() {
            if let Some(r) = self.range_slot()? {
                t.set_range(r);
            }
        }
        if kind == Kind::Aggregate {
            let count = self.u32()?;
            let mut assocs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let assoc = match self.u8()? {
                    0 => Assoc::Positional(self.tree()?),
                    1 => {
                        let name = self.ident()?;
                        Assoc::Named(name, self.tree()?)
                    }
                    2 => {
                        let r = self.range()?;
                        Assoc::Range(r, self.tree()?)
                    }
                    3 => Assoc::Others(self.tree()?),
                    other => return Err(Error::InvalidAssocTag(other)),
                };
                assocs.push(assoc);
            }
            t.set_assocs(assocs);
        }
        if kind.has_context() {
            let count = self.u32()?;
            for _ in 0..count {
                t.add_context(self.ident()?);
            }
        }
        if kind == Kind::SignalDecl {
            let count = self.u32()?;
            for _ in 0..count {
                t.add_net(self.u32()? as NetId);
            }
        }

        let attr_count = self.u32()?;
        let mut attrs = std::collections::HashMap::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            let name = self.ident()?;
            let value = match self.u8()? {
                0 => AttrValue::Str(self.string()?),
                1 => AttrValue::Int(self.i64()?),
                other => return Err(Error::InvalidAttrTag(other)),
            };
            attrs.insert(name, value);
        }
        t.set_attrs(attrs);

        Ok(t)
    }
}

/// Deserialize a tree previously produced by [`write`].
pub fn read(buf: &[u8]) -> Result<Tree, Error> {
    let mut r = Reader::new(buf);
    r.tree()
}

/// Structural equality between two (sub)trees: same kind, same slots
/// recursively, same attribute bag — used to check the serialize/
/// deserialize round trip. A shared-subtree pair visited more than once
/// short-circuits via `seen` so cyclic/shared structure terminates.
pub fn structural_eq(a: &Tree, b: &Tree) -> bool {
    let mut seen = HashMap::new();
    eq_aux(a, b, &mut seen)
}

fn eq_aux(a: &Tree, b: &Tree, seen: &mut HashMap<(u32, u32), bool>) -> bool {
    let key = (a.alloc_index(), b.alloc_index());
    if let Some(&result) = seen.get(&key) {
        return result;
    }
    seen.insert(key, true);

    if a.kind() != b.kind() {
        seen.insert(key, false);
        return false;
    }
    let kind = a.kind();
    let mut ok = a.loc() == b.loc();

    if kind.has_ident() {
        ok &= a.ident_opt() == b.ident_opt();
    }
    if kind.has_ident2() {
        ok &= a.ident2_opt() == b.ident2_opt();
    }
    if kind.has_type() {
        ok &= a.ty_opt() == b.ty_opt();
    }
    if kind.has_ports() {
        ok &= eq_vec(&a.ports(), &b.ports(), seen);
    }
    if kind.has_generics() {
        ok &= eq_vec(&a.generics(), &b.generics(), seen);
    }
    if kind.has_params() {
        ok &= eq_vec(&a.params(), &b.params(), seen);
    }
    if kind.has_decls() {
        ok &= eq_vec(&a.decls(), &b.decls(), seen);
    }
    if kind.has_stmts() {
        ok &= eq_vec(&a.stmts(), &b.stmts(), seen);
    }
    if kind.has_value() {
        ok &= eq_opt(a.value(), b.value(), seen);
    }
    if kind.has_delay() {
        ok &= eq_opt(a.delay(), b.delay(), seen);
    }
    if kind.has_target() {
        ok &= eq_opt(a.target_opt(), b.target_opt(), seen);
    }
    if kind.has_ref() {
        ok &= eq_opt(a.refers_to(), b.refers_to(), seen);
    }
    if kind.has_message() {
        ok &= eq_opt(a.message_opt(), b.message_opt(), seen);
    }
    if kind.has_severity() {
        ok &= eq_opt(a.severity_opt(), b.severity_opt(), seen);
    }
    if kind == Kind::Literal {
        ok &= a.literal_opt() == b.literal_opt();
    }
    if kind == Kind::PortDecl {
        ok &= a.port_mode_opt() == b.port_mode_opt();
    }
    if kind == Kind::EnumLit {
        ok &= a.pos_opt() == b.pos_opt();
    }
    if kind.has_range() {
        ok &= a.range_opt() == b.range_opt();
    }
    if kind == Kind::Aggregate {
        let (av, bv) = (a.assocs(), b.assocs());
        ok &= av.len() == bv.len();
        if ok {
            for (x, y) in av.iter().zip(bv.iter()) {
                ok &= match (x, y) {
                    (Assoc::Positional(p), Assoc::Positional(q)) => eq_aux(p, q, seen),
                    (Assoc::Named(n1, p), Assoc::Named(n2, q)) => n1 == n2 && eq_aux(p, q, seen),
                    (Assoc::Range(r1, p), Assoc::Range(r2, q)) => r1 == r2 && eq_aux(p, q, seen),
                    (Assoc::Others(p), Assoc::Others(q)) => eq_aux(p, q, seen),
                    _ => false,
                };
            }
        }
    }
    if kind.has_context() {
        ok &= a.context() == b.context();
    }
    if kind == Kind::SignalDecl {
        ok &= a.nets() == b.nets();
    }
    ok &= attrs_eq(&a.attrs_snapshot(), &b.attrs_snapshot());

    seen.insert(key, ok);
    ok
}

fn eq_opt(a: Option<Tree>, b: Option<Tree>, seen: &mut HashMap<(u32, u32), bool>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => eq_aux(&a, &b, seen),
        _ => false,
    }
}

fn eq_vec(a: &[Tree], b: &[Tree], seen: &mut HashMap<(u32, u32), bool>) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| eq_aux(x, y, seen))
}

fn attrs_eq(a: &HashMap<Ident, AttrValue>, b: &HashMap<Ident, AttrValue>) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(k, v)| match (v, b.get(k)) {
        (AttrValue::Str(x), Some(AttrValue::Str(y))) => x == y,
        (AttrValue::Int(x), Some(AttrValue::Int(y))) => x == y,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn round_trips_a_simple_signal_decl() {
        let bit = Type::integer(0, 1);
        let sig = Tree::new(Kind::SignalDecl);
        sig.set_ident(Ident::new("s"));
        sig.set_type(bit);
        sig.add_net(0);
        sig.add_net(1);
        sig.add_attr_str(Ident::new("PATH_NAME"), ":top(a):s");

        let bytes = write(&sig);
        let back = read(&bytes).unwrap();
        assert!(structural_eq(&sig, &back));
    }

    #[test]
    fn round_trips_shared_subtrees_via_backreferences() {
        let shared = Tree::new(Kind::Literal);
        shared.set_literal(Literal::Int(7));

        let arch = Tree::new(Kind::Arch);
        let a = Tree::new(Kind::ConstDecl);
        a.set_type(Type::integer(0, 7));
        a.set_value(Some(shared.clone()));
        let b = Tree::new(Kind::ConstDecl);
        b.set_type(Type::integer(0, 7));
        b.set_value(Some(shared.clone()));
        arch.add_decl(a);
        arch.add_decl(b);

        let bytes = write(&arch);
        let back = read(&bytes).unwrap();
        assert!(structural_eq(&arch, &back));

        let decls = back.decls();
        assert!(decls[0].value().unwrap().ptr_eq(&decls[1].value().unwrap()));
    }

    #[test]
    fn rejects_truncated_stream() {
        let sig = Tree::new(Kind::SignalDecl);
        sig.set_type(Type::integer(0, 1));
        let mut bytes = write(&sig);
        bytes.truncate(bytes.len() / 2);
        assert!(read(&bytes).is_err());
    }
}
