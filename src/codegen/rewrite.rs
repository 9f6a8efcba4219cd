//! Post-order tree rewrite, run once per expression before lowering.
//!
//! Three universal fixups happen here, then the backend gets a chance to
//! fold subtrees into its own addressing forms:
//!   - lvalue nodes become pointers to what they named,
//!   - function values decay to function pointers,
//!   - a bare aggregate type surviving to this point is a hard error.

use crate::error::{CodegenError, CodegenResult};
use crate::node::{NodeArena, NodeFlags, NodeId, Op};
use crate::target::{Backend, FuncState};

/// Rewrite the tree rooted at `id` bottom-up. The backend may replace
/// any node, so the returned id is the new root.
pub fn rewrite(
    be: &dyn Backend,
    st: &FuncState,
    arena: &mut NodeArena,
    id: NodeId,
) -> CodegenResult<NodeId> {
    let (left, right) = {
        let n = arena.node(id);
        (n.left, n.right)
    };
    if let Some(l) = left {
        let l = rewrite(be, st, arena, l)?;
        arena.node_mut(id).left = Some(l);
    }
    if let Some(r) = right {
        let r = rewrite(be, st, arena, r)?;
        arena.node_mut(id).right = Some(r);
    }

    {
        let n = arena.node_mut(id);
        if n.flags.contains(NodeFlags::LVAL) {
            n.ty = n.ty.ptr_to();
            n.flags.remove(NodeFlags::LVAL);
        }
        if n.ty.is_func() && !n.ty.is_ptr() {
            n.ty = n.ty.ptr_to();
        }
        if n.ty.is_record() && !n.ty.is_ptr() {
            return Err(CodegenError::BadNodeType { ty: n.ty });
        }
    }

    Ok(be.rewrite_node(st, arena, id))
}

/// Collapse a node onto its left child: the child's payload moves up,
/// the child is released, and the parent takes operator `op`. No-op if
/// there is no left child.
pub fn squash_left(arena: &mut NodeArena, id: NodeId, op: Op) {
    let Some(l) = arena.node(id).left else {
        return;
    };
    let child = *arena.node(l);
    let n = arena.node_mut(id);
    n.op = op;
    n.value = child.value;
    n.val2 = child.val2;
    n.sym = child.sym;
    n.left = None;
    arena.release(l);
}

/// Collapse a node onto its right child.
pub fn squash_right(arena: &mut NodeArena, id: NodeId, op: Op) {
    let Some(r) = arena.node(id).right else {
        return;
    };
    let child = *arena.node(r);
    let n = arena.node_mut(id);
    n.op = op;
    n.value = child.value;
    n.val2 = child.val2;
    n.sym = child.sym;
    n.right = None;
    arena.release(r);
}
