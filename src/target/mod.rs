//! The target backend contract.
//!
//! One implementation per CPU. The generic walk offers a backend the
//! same subtree at escalating granularity: `shortcut` may claim a whole
//! subtree, `direct` may fuse an operator with the left value still
//! live, `uni_direct` may fuse a childless or unary form before its
//! operand is evaluated, and `node_emit` may open-code a single node
//! once its operands are in place. Declining at any step is free; the
//! helper-call fallback in `codegen::helpers` is always behind it.

pub mod m6809;

use crate::codegen::{Asm, Codegen};
use crate::error::{CodegenError, CodegenResult};
use crate::node::{NodeArena, NodeId};
use crate::types::Ty;

/// Output sections, switched through directives with the driver's
/// push/pop discipline collapsing redundant switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Code,
    Data,
    Bss,
    Literal,
}

/// Per-function code generation state, reset at every prologue and
/// threaded explicitly through the rewrite and lowering calls.
#[derive(Debug, Default)]
pub struct FuncState {
    /// Local frame size from the frame record, in bytes.
    pub frame: u16,
    /// Bytes currently pushed past the frame. Must be zero again when
    /// the function footer arrives; anything else is a fatal imbalance.
    pub sp: i32,
    /// Set after an unconditional transfer, cleared at labels. While
    /// set, lowering emits nothing.
    pub unreachable: bool,
    /// Whether any return record appeared in the body; controls
    /// whether the shared return label is worth placing.
    pub ret_used: bool,
    /// Label id the function's return jumps target.
    pub ret_label: u16,
}

impl FuncState {
    pub fn new() -> FuncState {
        FuncState::default()
    }

    /// Fresh state for a new function whose returns jump to `ret_label`.
    pub fn reset(&mut self, ret_label: u16) {
        *self = FuncState {
            ret_label,
            ..FuncState::default()
        };
    }
}

/// Everything a CPU target provides. Sizing and the rewrite hook are
/// immutable queries; the emission methods append to the assembly
/// buffer the caller hands in.
pub trait Backend {
    // ── Sizing ────────────────────────────────────────────────────

    /// Stored size of a value of type `ty`, in bytes.
    fn size_of(&self, ty: Ty) -> u32;

    /// Bytes a pushed value of type `ty` occupies on the stack. At
    /// least the stored size, rounded up to the push granularity.
    fn stack_size(&self, ty: Ty) -> u32;

    /// Bytes one call argument of type `ty` occupies at the call site.
    fn arg_size(&self, ty: Ty) -> u32 {
        self.stack_size(ty)
    }

    // ── Tree rewriting ────────────────────────────────────────────

    /// Target stage of the rewrite pass: fold addressing idioms into
    /// specialized node forms. Children have already been rewritten.
    /// Returns the node that replaces `id` (usually `id` itself).
    fn rewrite_node(&self, st: &FuncState, arena: &mut NodeArena, id: NodeId) -> NodeId;

    // ── The escalation ladder ─────────────────────────────────────

    /// Whole-subtree claim, tried before any operand is evaluated.
    fn shortcut(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool>;

    /// Fuse the node's operation with the left value still live in the
    /// working register, before it would be spilled.
    fn direct(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool>;

    /// Claim a node with no left operand before its right operand is
    /// evaluated.
    fn uni_direct(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool>;

    /// Open-code one node whose operands are in place: right value in
    /// the working register, left value spilled to the stack.
    fn node_emit(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool>;

    /// Spill the just-computed value of node `id` to the stack. A
    /// decline routes through the universal push helper instead.
    fn push_result(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool>;

    /// Perform a cast with the operand value live. A decline routes
    /// through the from/to-named cast helper.
    fn cast(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool>;

    // ── File and function framing ─────────────────────────────────

    fn file_begin(&mut self, out: &mut Asm);
    fn file_end(&mut self, out: &mut Asm);

    /// Statement separator, emitted after each lowered expression.
    fn stmt_end(&mut self, out: &mut Asm);

    fn segment(&mut self, out: &mut Asm, seg: Segment);
    fn export(&mut self, out: &mut Asm, name: &str);
    fn prologue(&mut self, out: &mut Asm, name: &str);

    /// Reserve the local frame once its size is known.
    fn frame(&mut self, out: &mut Asm, size: u16);
    fn epilogue(&mut self, out: &mut Asm, frame: u16);

    // ── Labels and jumps ──────────────────────────────────────────

    fn label(&mut self, out: &mut Asm, tail: &str, id: u16);
    fn jump(&mut self, out: &mut Asm, tail: &str, id: u16);

    /// Conditional branches test the truth value left in the working
    /// register by a bool-wrapped expression.
    fn jump_if_false(&mut self, out: &mut Asm, tail: &str, id: u16);
    fn jump_if_true(&mut self, out: &mut Asm, tail: &str, id: u16);

    // ── Switch fabric ─────────────────────────────────────────────

    /// Dispatch on the selector value through the switch's table.
    fn switch_dispatch(&mut self, out: &mut Asm, id: u16, ty: Ty);

    /// Place the label for one case slot; entry 0 is the default.
    fn case_label(&mut self, out: &mut Asm, id: u16, entry: u16);

    /// Open the dispatch table itself, with its entry count.
    fn switch_table(&mut self, out: &mut Asm, id: u16, count: u16);

    /// One table entry referring to a case slot's label.
    fn case_ref(&mut self, out: &mut Asm, id: u16, entry: u16);

    // ── Data emission ─────────────────────────────────────────────

    fn data_label(&mut self, out: &mut Asm, name: &str, size: u16);
    fn literal_label(&mut self, out: &mut Asm, id: u16);

    /// One literal value of type `ty` into the open segment.
    fn value(&mut self, out: &mut Asm, ty: Ty, v: u32) -> CodegenResult<()>;

    /// Reserve `bytes` of uninitialized space.
    fn space(&mut self, out: &mut Asm, bytes: u32);

    /// Reference to a string-literal pool entry.
    fn text_ref(&mut self, out: &mut Asm, label: u16);

    /// Reference to a named symbol plus a byte offset.
    fn name_ref(&mut self, out: &mut Asm, name: &str, offset: u32);

    // ── Helper framing ────────────────────────────────────────────

    /// Call the out-of-line runtime routine `name`.
    fn helper_call(&mut self, out: &mut Asm, name: &str);
}

/// Backend factory keyed by the CPU selector the driver is launched
/// with.
pub fn for_cpu(cpu: u32) -> CodegenResult<Box<dyn Backend>> {
    match cpu {
        6809 => Ok(Box::new(m6809::M6809::new())),
        _ => Err(CodegenError::UnknownCpu { cpu }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_cpu_is_fatal() {
        assert!(matches!(
            for_cpu(9999),
            Err(CodegenError::UnknownCpu { cpu: 9999 })
        ));
    }

    #[test]
    fn test_func_state_reset() {
        let mut st = FuncState::new();
        st.frame = 8;
        st.sp = 4;
        st.unreachable = true;
        st.ret_used = true;
        st.reset(7);
        assert_eq!(st.frame, 0);
        assert_eq!(st.sp, 0);
        assert!(!st.unreachable);
        assert!(!st.ret_used);
        assert_eq!(st.ret_label, 7);
    }
}
