//! Tree construction, constant folding and type conversion.
//!
//! `tree` is the one node allocator the climb methods use; it folds
//! integer-constant operands on the spot, so front-end arithmetic
//! usually never reaches the stream. The conversion helpers mirror the
//! classic C rules: promotion to int, arithmetic unification, pointer
//! checks that degrade to diagnostics rather than aborts.

use crate::error::CodegenResult;
use crate::node::{NodeFlags, NodeId, Op};
use crate::types::{unify_arith, Ty};

use super::tokens::TokenStream;
use super::Builder;

impl<'a, S: TokenStream> Builder<'a, S> {
    // ── Node construction ─────────────────────────────────────────

    /// Allocate a node over two subtrees, folding constants first. The
    /// type defaults from the right operand (the left when there is no
    /// right); most callers retype the node immediately after.
    pub(super) fn tree(
        &mut self,
        op: Op,
        left: Option<NodeId>,
        right: Option<NodeId>,
    ) -> CodegenResult<NodeId> {
        let folded = match (left, right) {
            (Some(l), Some(r)) => self.fold_binary(op, l, r),
            (None, Some(r)) => self.fold_unary(op, r),
            _ => None,
        };
        if let Some(n) = folded {
            return Ok(n);
        }
        let ty = match (left, right) {
            (_, Some(r)) => self.arena.node(r).ty,
            (Some(l), None) => self.arena.node(l).ty,
            (None, None) => Ty::VOID,
        };
        let id = self.arena.acquire()?;
        let n = self.arena.node_mut(id);
        n.op = op;
        n.ty = ty;
        n.left = left;
        n.right = right;
        Ok(id)
    }

    /// A constant leaf.
    pub(super) fn make_constant(&mut self, value: u32, ty: Ty) -> CodegenResult<NodeId> {
        let id = self.arena.acquire()?;
        let n = self.arena.node_mut(id);
        n.op = Op::Constant;
        n.ty = ty;
        n.value = value;
        Ok(id)
    }

    // ── Constant folding ──────────────────────────────────────────

    fn fold_binary(&mut self, op: Op, l: NodeId, r: NodeId) -> Option<NodeId> {
        let ln = *self.arena.node(l);
        let rn = *self.arena.node(r);
        // An identity operand on the right folds the node away. Zero
        // offsets and unit scales from pointer arithmetic all land here.
        if rn.op == Op::Constant && rn.ty.is_int_arith() {
            let identity = match op {
                Op::Plus | Op::Minus | Op::Or | Op::Hat | Op::LtLt | Op::GtGt => rn.value == 0,
                Op::Star | Op::Slash => rn.value == 1,
                _ => false,
            };
            if identity {
                self.arena.release(r);
                return Some(l);
            }
        }
        if ln.op != Op::Constant || rn.op != Op::Constant {
            return None;
        }
        if !ln.ty.is_int_arith() || !rn.ty.is_int_arith() {
            return None;
        }
        let ty = match op {
            Op::LtLt | Op::GtGt => ln.ty.promote(),
            Op::Plus | Op::Minus | Op::Star | Op::Slash | Op::Percent | Op::And | Op::Or
            | Op::Hat => unify_arith(ln.ty, rn.ty),
            _ => return None,
        };
        let a = self.convert_const(ln.value, ln.ty, ty);
        let b = match op {
            Op::LtLt | Op::GtGt => rn.value & 31,
            _ => self.convert_const(rn.value, rn.ty, ty),
        };
        let signed = !ty.is_unsigned();
        let v = match op {
            Op::Plus => a.wrapping_add(b),
            Op::Minus => a.wrapping_sub(b),
            Op::Star => a.wrapping_mul(b),
            Op::Slash | Op::Percent => {
                if b == 0 {
                    self.diags.error("division by zero", self.span());
                    0
                } else if signed {
                    let sa = self.as_signed(a, ty);
                    let sb = self.as_signed(b, ty);
                    let q = if op == Op::Slash {
                        sa.wrapping_div(sb)
                    } else {
                        sa.wrapping_rem(sb)
                    };
                    q as u32
                } else if op == Op::Slash {
                    a / b
                } else {
                    a % b
                }
            }
            Op::And => a & b,
            Op::Or => a | b,
            Op::Hat => a ^ b,
            Op::LtLt => a.wrapping_shl(b),
            Op::GtGt => {
                if signed {
                    self.as_signed(a, ty).wrapping_shr(b) as u32
                } else {
                    a.wrapping_shr(b)
                }
            }
            _ => return None,
        };
        let v = self.mask_to(v, ty);
        {
            let n = self.arena.node_mut(l);
            n.ty = ty;
            n.value = v;
        }
        self.arena.release(r);
        Some(l)
    }

    fn fold_unary(&mut self, op: Op, r: NodeId) -> Option<NodeId> {
        let rn = *self.arena.node(r);
        if rn.op != Op::Constant || !rn.ty.is_int_arith() {
            return None;
        }
        let ty = rn.ty.promote();
        let a = self.convert_const(rn.value, rn.ty, ty);
        let v = match op {
            Op::Negate => (a as i32).wrapping_neg() as u32,
            Op::Tilde => !a,
            _ => return None,
        };
        let v = self.mask_to(v, ty);
        let n = self.arena.node_mut(r);
        n.ty = ty;
        n.value = v;
        Some(r)
    }

    /// Truncate a folded value to the stored width of `ty`.
    fn mask_to(&self, v: u32, ty: Ty) -> u32 {
        match self.be.size_of(ty) {
            1 => v & 0xFF,
            2 => v & 0xFFFF,
            _ => v,
        }
    }

    /// Read a stored constant back as a signed 32-bit value.
    fn as_signed(&self, v: u32, ty: Ty) -> i32 {
        match self.be.size_of(ty) {
            1 => v as u8 as i8 as i32,
            2 => v as u16 as i16 as i32,
            _ => v as i32,
        }
    }

    /// Re-type a constant value, sign-extending or truncating as the
    /// widths demand.
    fn convert_const(&self, v: u32, from: Ty, to: Ty) -> u32 {
        let widened = if from.is_unsigned() {
            v
        } else {
            self.as_signed(v, from) as u32
        };
        self.mask_to(widened, to)
    }

    // ── Conversions ───────────────────────────────────────────────

    /// Convert `n` to type `t`, folding the conversion into integer
    /// constants and wrapping anything else in a cast node.
    pub(super) fn make_cast(&mut self, n: NodeId, t: Ty) -> CodegenResult<NodeId> {
        let node = *self.arena.node(n);
        if node.ty == t {
            return Ok(n);
        }
        if node.op == Op::Constant && node.ty.is_int_arith() && (t.is_int_arith() || t.is_ptr()) {
            let v = self.convert_const(node.value, node.ty, t);
            let m = self.arena.node_mut(n);
            m.ty = t;
            m.value = v;
            return Ok(n);
        }
        let c = self.tree(Op::Cast, None, Some(n))?;
        self.arena.node_mut(c).ty = t;
        Ok(c)
    }

    /// Convert `n` to exactly `t`. With `warn` clear this is an explicit
    /// request and any scalar punning goes through; with it set, only
    /// the implicit conversions C allows are silent and the rest
    /// diagnose, leaving the node unconverted.
    pub(super) fn typeconv(&mut self, n: NodeId, t: Ty, warn: bool) -> CodegenResult<NodeId> {
        let nt = self.arena.node(n).ty;
        if !nt.is_scalar() || !t.is_scalar() {
            self.diags.error("invalid type conversion", self.span());
            return Ok(n);
        }
        if nt.is_ptr() && self.pointer_conv(nt, t) {
            return self.make_cast(n, t);
        }
        if nt == t || (nt.is_arith() && t.is_arith()) {
            return self.make_cast(n, t);
        }
        if !warn {
            return self.make_cast(n, t);
        }
        self.diags.error("type mismatch", self.span());
        Ok(n)
    }

    /// The implicit legacy conversions for unprototyped arguments.
    pub(super) fn typeconv_implicit(&mut self, n: NodeId) -> CodegenResult<NodeId> {
        let t = self.arena.node(n).ty;
        let p = t.promote();
        if p != t {
            return self.typeconv(n, p, false);
        }
        Ok(n)
    }

    /// Convert an lvalue reference into the loaded value. Function
    /// names decay to pointers rather than loads, and a record cannot
    /// be loaded whole.
    pub(super) fn make_rval(&mut self, n: NodeId) -> CodegenResult<NodeId> {
        let node = *self.arena.node(n);
        if !node.flags.contains(NodeFlags::LVAL) {
            return Ok(n);
        }
        if node.ty.is_func() {
            self.arena.node_mut(n).flags.remove(NodeFlags::LVAL);
            return Ok(n);
        }
        if node.ty.is_record() {
            self.badtype();
            let m = self.arena.node_mut(n);
            m.flags.remove(NodeFlags::LVAL);
            m.ty = node.ty.ptr_to();
            return Ok(n);
        }
        // The wrapped node keeps its lvalue flag: the rewrite pass
        // folds it into a pointer, making the operand the address this
        // dereference loads through.
        let d = self.tree(Op::Deref, None, Some(n))?;
        self.arena.node_mut(d).ty = node.ty;
        Ok(d)
    }

    /// Wrap a value for use as a truth test.
    pub(super) fn bool_tree(&mut self, n: NodeId) -> CodegenResult<NodeId> {
        self.tree(Op::Bool, None, Some(n))
    }

    // ── Typed tree builders ───────────────────────────────────────

    /// Promote and unify two arithmetic operands, converting both.
    fn promoted_pair(&mut self, l: NodeId, r: NodeId) -> CodegenResult<(NodeId, NodeId, Ty)> {
        let lt = self.arena.node(l).ty;
        let rt = self.arena.node(r).ty;
        let ty = unify_arith(lt.promote(), rt.promote());
        let l = self.typeconv(l, ty, false)?;
        let r = self.typeconv(r, ty, false)?;
        Ok((l, r, ty))
    }

    /// Arithmetic on promoted, unified operands.
    pub(super) fn arith_tree(&mut self, op: Op, l: NodeId, r: NodeId) -> CodegenResult<NodeId> {
        let lt = self.arena.node(l).ty;
        let rt = self.arena.node(r).ty;
        if !lt.is_arith() || !rt.is_arith() {
            self.badtype();
            return self.tree(op, Some(l), Some(r));
        }
        let (l, r, ty) = self.promoted_pair(l, r)?;
        let n = self.tree(op, Some(l), Some(r))?;
        self.arena.node_mut(n).ty = ty;
        Ok(n)
    }

    /// Integer-only arithmetic. A shift keeps the promoted type of its
    /// left side and the count converts to plain int.
    pub(super) fn intarith_tree(&mut self, op: Op, l: NodeId, r: NodeId) -> CodegenResult<NodeId> {
        let lt = self.arena.node(l).ty;
        let rt = self.arena.node(r).ty;
        if !lt.is_int_arith() || !rt.is_int_arith() {
            self.badtype();
            return self.tree(op, Some(l), Some(r));
        }
        if matches!(op, Op::LtLt | Op::GtGt) {
            let ty = lt.promote();
            let l = self.typeconv(l, ty, false)?;
            let r = self.typeconv(r, Ty::INT, false)?;
            let n = self.tree(op, Some(l), Some(r))?;
            self.arena.node_mut(n).ty = ty;
            return Ok(n);
        }
        let (l, r, ty) = self.promoted_pair(l, r)?;
        let n = self.tree(op, Some(l), Some(r))?;
        self.arena.node_mut(n).ty = ty;
        Ok(n)
    }

    /// Comparison. The node keeps the unified operand type so the width
    /// and signedness of the compare survive to the helper call.
    pub(super) fn ordercomp_tree(&mut self, op: Op, l: NodeId, r: NodeId) -> CodegenResult<NodeId> {
        let lt = self.arena.node(l).ty;
        let rt = self.arena.node(r).ty;
        if lt.is_ptr() || rt.is_ptr() {
            if !self.pointer_compare(l, lt, r, rt) {
                self.diags.error("type mismatch", self.span());
            }
            let ty = if lt.is_ptr() { lt } else { rt };
            let n = self.tree(op, Some(l), Some(r))?;
            self.arena.node_mut(n).ty = ty;
            return Ok(n);
        }
        if !lt.is_arith() || !rt.is_arith() {
            self.badtype();
            return self.tree(op, Some(l), Some(r));
        }
        let (l, r, ty) = self.promoted_pair(l, r)?;
        let n = self.tree(op, Some(l), Some(r))?;
        self.arena.node_mut(n).ty = ty;
        Ok(n)
    }

    /// `&&` and `||` over boolean-converted operands.
    pub(super) fn logic_tree(&mut self, op: Op, l: NodeId, r: NodeId) -> CodegenResult<NodeId> {
        let lt = self.arena.node(l).ty;
        let rt = self.arena.node(r).ty;
        if !lt.is_scalar() || !rt.is_scalar() {
            self.badtype();
        }
        let l = self.bool_tree(l)?;
        let r = self.bool_tree(r)?;
        let n = self.tree(op, Some(l), Some(r))?;
        self.arena.node_mut(n).ty = Ty::INT;
        Ok(n)
    }

    /// Simple assignment. The right side converts to the stored type.
    pub(super) fn assign_tree(&mut self, l: NodeId, r: NodeId) -> CodegenResult<NodeId> {
        let lt = self.arena.node(l).ty;
        let r = self.typeconv(r, lt, true)?;
        let n = self.tree(Op::Eq, Some(l), Some(r))?;
        self.arena.node_mut(n).ty = lt;
        Ok(n)
    }

    // ── Pointer rules ─────────────────────────────────────────────

    /// Whether a pointer may convert to `t` without an explicit cast.
    fn pointer_conv(&self, nt: Ty, t: Ty) -> bool {
        t.is_ptr() && (nt == t || nt == Ty::PTR || t == Ty::PTR)
    }

    /// Whether two compared operands are pointer-compatible: matching
    /// pointers, one side `void *`, or a pointer against constant zero.
    pub(crate) fn pointer_compare(&self, l: NodeId, lt: Ty, r: NodeId, rt: Ty) -> bool {
        if lt.is_ptr() && rt.is_ptr() {
            return lt == rt || lt == Ty::PTR || rt == Ty::PTR;
        }
        let (other, ot) = if lt.is_ptr() { (r, rt) } else { (l, lt) };
        let n = self.arena.node(other);
        ot.is_int_arith() && n.op == Op::Constant && n.value == 0
    }

    /// Element size behind a pointer, for index scaling.
    pub(super) fn scale_of(&self, ty: Ty) -> u32 {
        match ty.deref() {
            Some(inner) => self.be.size_of(inner).max(1),
            None => 1,
        }
    }
}
