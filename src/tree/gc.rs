//! Mark-and-sweep garbage collection over the global tree allocator.
//!
//! Rooted at every `ENTITY/ARCH/PACKAGE/PACK_BODY/ELAB` node currently
//! live. A single generation bump marks everything reachable from the
//! roots (reusing the visitor's generation-guarded traversal so a shared
//! subtree between two roots is only walked once); any allocator slot
//! whose node did not get tagged is freed. The allocator vector is then
//! compacted — `alloc_index` is only ever used as a hash-map key by
//! `rewrite`/`copy`/`serialize`, never as a direct index back into this
//! vector, so shrinking it is safe.

use super::visit::visit_aux;
use super::{next_generation, Tree, ALL_TREES};

/// Run one mark-sweep pass rooted at `roots`. Returns the number of nodes
/// freed. Calling this twice in a row with no new allocations in between
/// frees nothing the second time and leaves the allocator list equal,
/// matching the idempotence property required of `gc`.
pub fn gc(roots: &[Tree]) -> usize {
    let gen = next_generation();
    for root in roots {
        visit_aux(root, gen, &mut (), &mut |_, _| {});
    }

    ALL_TREES.with(|cell| {
        let mut alloc = cell.borrow_mut();
        let before = alloc.trees.len();
        alloc.trees.retain(|slot| match slot {
            Some(t) => t.generation() == gen,
            None => false,
        });
        before - alloc.trees.len()
    })
}

/// Total number of nodes currently tracked by the allocator, live or not
/// yet swept. Mostly useful for tests asserting idempotence.
pub fn allocator_len() -> usize {
    ALL_TREES.with(|cell| cell.borrow().trees.len())
}

#[cfg(test)]
mod tests {
    use super::super::Kind;
    use super::*;

    #[test]
    fn gc_frees_unreachable_nodes_and_keeps_reachable_ones() {
        let root = Tree::new(Kind::Arch);
        let kept = Tree::new(Kind::SignalDecl);
        root.add_decl(kept.clone());
        let _orphan = Tree::new(Kind::SignalDecl);

        let freed = gc(&[root.clone()]);
        assert!(freed >= 1);
        assert_eq!(root.decls().len(), 1);
        assert!(root.decls()[0].ptr_eq(&kept));
    }

    #[test]
    fn gc_is_idempotent_with_no_new_allocations() {
        let root = Tree::new(Kind::Arch);
        gc(&[root.clone()]);
        let len_after_first = allocator_len();
        gc(&[root.clone()]);
        assert_eq!(allocator_len(), len_after_first);
    }
}
