//! The VHDL type model.
//!
//! Types are reference counted (`Rc<Type>`) because the same declared type
//! is shared by every decl and expression of that type across an entire
//! design; elaboration's copy operation (`tree::copy`) relies on types
//! being shared, not cloned, when a decl is duplicated.

use crate::ident::Ident;
use std::rc::Rc;

/// A single dimension's bounds, already constant-folded. `range_bounds`
/// assumes the simplifier has already reduced a range to two integer
/// literals; this crate's stand-in simplifier provides the same
/// guarantee for the literal/attribute forms it understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub low: i64,
    pub high: i64,
}

impl Range {
    pub fn len(&self) -> i64 {
        (self.high - self.low + 1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalUnit {
    pub name: Ident,
    pub multiplier: i64,
}

#[derive(Debug, PartialEq)]
pub enum Type {
    /// `INTEGER`-like scalar type with a constraining range.
    Integer { range: Range },
    /// `PHYSICAL` type (e.g. `TIME`): an integer range plus named units.
    Physical { range: Range, units: Vec<PhysicalUnit> },
    /// Enumeration type with ordered literal names (position = index).
    Enum { literals: Vec<Ident> },
    /// Constrained array: fixed ranges, known width.
    CArray { elem: Rc<Type>, dims: Vec<Range> },
    /// Unconstrained array: element type and index subtype only. Width is
    /// undefined until an object of this type is constrained.
    UArray { elem: Rc<Type>, index_dims: usize },
    /// A subtype: a base type plus a narrower constraint.
    Subtype { base: Rc<Type>, dims: Vec<Range> },
    /// Function signature (used to disambiguate overloaded names during
    /// function rebinding, see `elab::funcs`).
    Func { params: Vec<Rc<Type>>, result: Rc<Type> },
    /// Not yet resolved; never legal on a fully elaborated tree.
    Unresolved,
}

impl Type {
    pub fn integer(low: i64, high: i64) -> Rc<Type> {
        Rc::new(Type::Integer {
            range: Range { low, high },
        })
    }

    pub fn carray(elem: Rc<Type>, dims: Vec<Range>) -> Rc<Type> {
        Rc::new(Type::CArray { elem, dims })
    }

    pub fn uarray(elem: Rc<Type>, index_dims: usize) -> Rc<Type> {
        Rc::new(Type::UArray { elem, index_dims })
    }

    pub fn is_unconstrained_array(&self) -> bool {
        matches!(self, Type::UArray { .. })
    }

    /// Whether this type (following a `Subtype` to its base) denotes an
    /// array, constrained or not. Grounded in `type_is_array` as used by
    /// `elab_should_copy` to decide whether a `CONST_DECL` needs per-copy
    /// identity (array-typed constants own per-instance storage; scalar
    /// constants are pure values and can be shared).
    pub fn is_array(&self) -> bool {
        match self {
            Type::CArray { .. } | Type::UArray { .. } => true,
            Type::Subtype { base, .. } => base.is_array(),
            _ => false,
        }
    }

    /// First-dimension bounds, following a `Subtype` to its constraint when
    /// present. Returns `None` for unconstrained arrays and non-array types.
    pub fn dim0(&self) -> Option<Range> {
        match self {
            Type::CArray { dims, .. } => dims.first().copied(),
            Type::Subtype { dims, .. } => dims.first().copied(),
            Type::Integer { range } | Type::Physical { range, .. } => Some(*range),
            _ => None,
        }
    }

    pub fn elem(&self) -> Option<&Rc<Type>> {
        match self {
            Type::CArray { elem, .. } => Some(elem),
            Type::UArray { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Total scalar element count for storage purposes. `None` for
    /// unconstrained arrays (`type_width` is only meaningful for
    /// constrained types) and for not-yet-resolved types.
    pub fn width(&self) -> Option<i64> {
        match self {
            Type::Integer { .. } | Type::Physical { .. } | Type::Enum { .. } => Some(1),
            Type::CArray { elem, dims } => {
                let elem_width = elem.width()?;
                let mut total: i64 = 1;
                for dim in dims {
                    total = total.checked_mul(dim.len())?;
                }
                total.checked_mul(elem_width)
            }
            Type::Subtype { base, dims } if !dims.is_empty() => {
                let elem_width = base.elem().and_then(|e| e.width()).unwrap_or(1);
                let mut total: i64 = 1;
                for dim in dims {
                    total = total.checked_mul(dim.len())?;
                }
                total.checked_mul(elem_width)
            }
            Type::Subtype { base, .. } => base.width(),
            Type::UArray { .. } | Type::Unresolved => None,
            Type::Func { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_width_is_one() {
        assert_eq!(Type::integer(0, 7).width(), Some(1));
    }

    #[test]
    fn carray_width_multiplies_dims_by_element() {
        let bit = Type::integer(0, 1);
        let bv = Type::carray(bit, vec![Range { low: 0, high: 3 }]);
        assert_eq!(bv.width(), Some(4));
    }

    #[test]
    fn uarray_width_is_indeterminate() {
        let bit = Type::integer(0, 1);
        let uv = Type::uarray(bit, 1);
        assert_eq!(uv.width(), None);
        assert!(uv.is_unconstrained_array());
    }
}
