//! Interned identifiers.
//!
//! VHDL identifiers are compared constantly during elaboration (decl lookup,
//! `REF` rebinding, hierarchical path composition) so they are interned once
//! and compared thereafter as a `Copy` handle rather than as a string.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::{Arc, Mutex};

struct Interner {
    strings: Vec<Arc<str>>,
}

impl Interner {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(idx) = self.strings.iter().position(|existing| &**existing == s) {
            return idx as u32;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(Arc::from(s));
        idx
    }

    fn get(&self, idx: u32) -> Arc<str> {
        Arc::clone(&self.strings[idx as usize])
    }
}

static INTERNER: Lazy<Mutex<Interner>> = Lazy::new(|| {
    Mutex::new(Interner {
        strings: Vec::new(),
    })
});

/// An interned identifier. Equality and hashing are O(1).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ident(u32);

impl Ident {
    /// Separator used when composing hierarchical identifiers (`elab_instance`,
    /// `hpathf`). VHDL path names join with `:`, instance names with `@` at
    /// the instance boundary and `:` elsewhere; callers choose the separator.
    pub const PATH_SEP: char = ':';
    pub const INSTANCE_SEP: char = '@';

    /// Intern `s`, returning its handle. Idempotent.
    pub fn new(s: &str) -> Self {
        let mut interner = INTERNER.lock().expect("ident interner poisoned");
        Ident(interner.intern(s))
    }

    /// Return the interned text as a cheaply cloned `Arc<str>`.
    pub fn as_arc(self) -> Arc<str> {
        INTERNER.lock().expect("ident interner poisoned").get(self.0)
    }

    /// Compose `a<sep>b` as a fresh interned identifier.
    pub fn prefix(a: Ident, b: Ident, sep: char) -> Ident {
        let (a_str, b_str) = (a.as_arc(), b.as_arc());
        let mut buf = String::with_capacity(a_str.len() + 1 + b_str.len());
        buf.push_str(&a_str);
        buf.push(sep);
        buf.push_str(&b_str);
        Ident::new(&buf)
    }

    /// Compose `a<sep>suffix` from a raw string suffix (array index brackets,
    /// generate-statement labels, and similar path extensions that are not
    /// themselves standalone identifiers).
    pub fn extend(a: Ident, suffix: &str) -> Ident {
        let a_str = a.as_arc();
        let mut buf = String::with_capacity(a_str.len() + suffix.len());
        buf.push_str(&a_str);
        buf.push_str(suffix);
        Ident::new(&buf)
    }

    /// Return the prefix of `self` up to (not including) the first `sep`,
    /// or `self` unchanged if `sep` does not occur.
    pub fn until(self, sep: char) -> Ident {
        match self.as_arc().split_once(sep) {
            Some((head, _)) => Ident::new(head),
            None => self,
        }
    }

    /// Lowercase this identifier as a fresh interned identifier. VHDL
    /// hierarchical path/instance names are always rendered lowercase
    /// regardless of the source's declared case.
    pub fn to_lower(self) -> Ident {
        Ident::new(&self.as_arc().to_ascii_lowercase())
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_arc())
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_arc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let a = Ident::new("work");
        let b = Ident::new("work");
        assert_eq!(a, b);
    }

    #[test]
    fn prefix_composes_with_separator() {
        let top = Ident::new("top");
        let a = Ident::new("a");
        let joined = Ident::prefix(top, a, Ident::PATH_SEP);
        assert_eq!(&*joined.as_arc(), "top:a");
    }

    #[test]
    fn until_splits_on_first_separator() {
        let full = Ident::new("leaf-ra");
        assert_eq!(&*full.until('-').as_arc(), "leaf");
        let no_sep = Ident::new("leaf");
        assert_eq!(no_sep.until('-'), no_sep);
    }

    #[test]
    fn to_lower_normalizes_case() {
        let mixed = Ident::new("TOP");
        assert_eq!(&*mixed.to_lower().as_arc(), "top");
    }
}
