//! The left-right tree walk that drives code emission.
//!
//! Short-circuit and conditional operators are partial-evaluation
//! constructs, so they are branched around here, above the backend.
//! Everything else runs the escalation ladder: shortcut, direct with
//! the left value live, push, uni-direct, then the portable
//! helper-call fallback.

use crate::codegen::{helpers, Codegen};
use crate::error::{CodegenError, CodegenResult};
use crate::node::{NodeId, Op};
use crate::target::Backend;

fn kid(id: Option<NodeId>, op: Op) -> CodegenResult<NodeId> {
    id.ok_or_else(|| CodegenError::InvalidOp {
        op: format!("{op:?} missing operand"),
    })
}

/// Lower one rewritten expression tree. Stack depth bookkeeping for
/// pushed left operands lives here so the backend hooks only have to
/// account for stack motion they invent themselves.
pub fn lower(be: &mut dyn Backend, cg: &mut Codegen, id: NodeId) -> CodegenResult<()> {
    if cg.state.unreachable {
        return Ok(());
    }
    let n = cg.node(id);

    match n.op {
        // The condition subtree has already left its truth value in
        // the work register by the time the colon child runs, so the
        // question node itself emits nothing.
        Op::Question => {
            lower(be, cg, kid(n.left, n.op)?)?;
            lower(be, cg, kid(n.right, n.op)?)?;
            return Ok(());
        }
        Op::Colon => {
            let l = kid(n.left, n.op)?;
            let r = kid(n.right, n.op)?;
            let lab = cg.labels.take();
            be.jump_if_false(cg.asm, "L", lab);
            lower(be, cg, l)?;
            be.jump(cg.asm, "LC", lab);
            be.label(cg.asm, "L", lab);
            lower(be, cg, r)?;
            be.label(cg.asm, "LC", lab);
            return helpers::make_node(be, cg, id);
        }
        Op::OrOr | Op::AndAnd => {
            let l = kid(n.left, n.op)?;
            let r = kid(n.right, n.op)?;
            let lab = cg.labels.take();
            lower(be, cg, l)?;
            if n.op == Op::OrOr {
                be.jump_if_true(cg.asm, "L", lab);
            } else {
                be.jump_if_false(cg.asm, "L", lab);
            }
            lower(be, cg, r)?;
            be.label(cg.asm, "L", lab);
            // No node to build; both paths left their value behind.
            return Ok(());
        }
        _ => {}
    }

    if be.shortcut(cg, id)? {
        return Ok(());
    }

    if let Some(l) = n.left {
        lower(be, cg, l)?;
        // Direct completion with the left value still live.
        if be.direct(cg, id)? {
            // A claimed cleanup releases the stacked call arguments;
            // the byte count rides in its right-hand constant.
            if n.op == Op::Cleanup {
                let v = n.right.map(|r| cg.node(r).value).unwrap_or(0);
                cg.state.sp -= v as i32;
            }
            return Ok(());
        }
        if !be.push_result(cg, l)? {
            helpers::helper(be, cg, l, "push")?;
        }
        cg.state.sp += be.stack_size(cg.node(l).ty) as i32;
    } else if be.uni_direct(cg, id)? {
        return Ok(());
    }

    if let Some(r) = n.right {
        lower(be, cg, r)?;
    }

    // Function call arguments stay stacked; the call/return plus the
    // cleanup node dispose of them, not the operator itself.
    if let Some(l) = n.left {
        if !matches!(n.op, Op::ArgComma | Op::FuncCall | Op::CallName) {
            cg.state.sp -= be.stack_size(cg.node(l).ty) as i32;
        }
    }

    helpers::make_node(be, cg, id)
}
