//! Motorola 6809 backend: stack-and-accumulator model.
//!
//! Word values live in D, the high word of a 32-bit value in U, and X
//! carries addresses. The frame sits on the hardware stack, so every
//! frame-relative offset is adjusted by the bytes currently pushed past
//! it. One register variable is supported, mapped to Y.
//!
//! The hook set claims what the instruction set does well: word loads
//! and stores against the frame, named statics and the literal pool,
//! immediate add/subtract/bitwise fusion, and read-modify-write for
//! discarded increments. Everything else declines down to the helper
//! calls.

use crate::codegen::rewrite::{squash_left, squash_right};
use crate::codegen::{lower, Asm, Codegen};
use crate::error::{CodegenError, CodegenResult};
use crate::node::{Node, NodeArena, NodeFlags, NodeId, Op};
use crate::types::{Base, Ty};

use super::{Backend, FuncState, Segment};

/// Bytes between the caller's pushed arguments and the frame top: the
/// return address.
const ARG_BASE: u32 = 2;

pub struct M6809;

impl M6809 {
    pub fn new() -> M6809 {
        M6809
    }

    /// Frame-relative operand, adjusted for bytes pushed past the
    /// frame since the statement began.
    fn frame_operand(cg: &Codegen, value: u32) -> String {
        format!("{},s", value as i32 + cg.state.sp)
    }

    /// Widen the byte just loaded into B to a word in D.
    fn extend_byte(cg: &mut Codegen, ty: Ty) {
        if ty.is_unsigned() {
            cg.asm.ins("clra");
        } else {
            cg.asm.ins("sex");
        }
    }

    /// Memory operand for a squashed load/store form, or `None` when
    /// the node is not one.
    fn squashed_operand(cg: &mut Codegen, n: &Node) -> CodegenResult<Option<String>> {
        Ok(match n.op {
            Op::LocalRef | Op::LocalStore => Some(Self::frame_operand(cg, n.value)),
            Op::NameRef | Op::NameStore => {
                let name = cg.name(n.sym)?;
                Some(format!("_{}+{}", name, n.value))
            }
            Op::LabelRef | Op::LabelStore => Some(format!("T{}", n.value)),
            _ => None,
        })
    }

    /// `base+2`-style operand for the low half of a 32-bit access.
    fn low_half(operand: &str) -> String {
        if let Some((base, off)) = operand.rsplit_once(",") {
            // Indexed mode: bump the displacement.
            let disp: i32 = base.parse().unwrap_or(0);
            format!("{},{}", disp + 2, off)
        } else {
            format!("{operand}+2")
        }
    }

    fn can_squash(&self, size: u32) -> bool {
        matches!(size, 1 | 2 | 4)
    }
}

impl Default for M6809 {
    fn default() -> Self {
        M6809::new()
    }
}

impl Backend for M6809 {
    // ── Sizing ────────────────────────────────────────────────────

    fn size_of(&self, ty: Ty) -> u32 {
        if ty.is_ptr() {
            return 2;
        }
        match ty.base {
            Base::Void => 0,
            Base::Char | Base::UChar => 1,
            Base::Int | Base::UInt => 2,
            Base::Long | Base::ULong | Base::Float => 4,
            Base::LongLong | Base::ULongLong | Base::Double => 8,
            Base::Func(_) | Base::Record(_) => 0,
        }
    }

    fn stack_size(&self, ty: Ty) -> u32 {
        self.size_of(ty).max(2)
    }

    // ── Tree rewriting ────────────────────────────────────────────

    fn rewrite_node(&self, st: &FuncState, arena: &mut NodeArena, id: NodeId) -> NodeId {
        let n = *arena.node(id);
        match n.op {
            // Argument slots were numbered from the call frame base;
            // now that the frame size is known they become plain
            // stack-relative offsets past the locals and the return
            // address.
            Op::Argument => {
                arena.node_mut(id).value = n.value + st.frame as u32 + ARG_BASE;
                id
            }
            Op::Deref => {
                let Some(r) = n.right else { return id };
                let child = *arena.node(r);
                if child.left.is_some() || child.right.is_some() {
                    return id;
                }
                let sz = self.size_of(n.ty);
                match child.op {
                    Op::Local | Op::Argument if self.can_squash(sz) => {
                        squash_right(arena, id, Op::LocalRef);
                    }
                    Op::Name if self.can_squash(sz) => {
                        squash_right(arena, id, Op::NameRef);
                    }
                    Op::Label if self.can_squash(sz) => {
                        squash_right(arena, id, Op::LabelRef);
                    }
                    Op::Reg if sz == 2 => {
                        squash_right(arena, id, Op::RegRef);
                    }
                    _ => {}
                }
                id
            }
            Op::Eq => {
                let Some(l) = n.left else { return id };
                let child = *arena.node(l);
                if child.left.is_some() || child.right.is_some() {
                    return id;
                }
                let sz = self.size_of(n.ty);
                match child.op {
                    Op::Local | Op::Argument if self.can_squash(sz) => {
                        squash_left(arena, id, Op::LocalStore);
                    }
                    Op::Name if self.can_squash(sz) => {
                        squash_left(arena, id, Op::NameStore);
                    }
                    Op::Label if self.can_squash(sz) => {
                        squash_left(arena, id, Op::LabelStore);
                    }
                    Op::Reg if sz == 2 => {
                        squash_left(arena, id, Op::RegStore);
                    }
                    _ => {}
                }
                id
            }
            // A call through a bare function name needs no pointer
            // value in the accumulator.
            Op::FuncCall => {
                if let Some(r) = n.right {
                    if arena.node(r).op == Op::Name && arena.node(r).ty.is_func_ptr() {
                        squash_right(arena, id, Op::CallName);
                    }
                }
                id
            }
            // Casts that keep the bit pattern vanish here; the operand
            // takes over the cast's result flags.
            Op::Cast => {
                let Some(r) = n.right else { return id };
                let from = arena.node(r).ty;
                if from == n.ty
                    || from.sign_only_differs(n.ty)
                    || (from.is_ptr() && n.ty.is_ptr())
                {
                    arena.node_mut(r).flags.insert(n.flags);
                    arena.node_mut(r).ty = n.ty;
                    arena.node_mut(id).right = None;
                    arena.release(id);
                    return r;
                }
                id
            }
            _ => id,
        }
    }

    // ── The escalation ladder ─────────────────────────────────────

    fn shortcut(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool> {
        let n = cg.node(id);
        match n.op {
            // The comma needs no stacking at all: the left value is
            // simply abandoned in the accumulator.
            Op::Comma => {
                let (Some(l), Some(r)) = (n.left, n.right) else {
                    return Ok(false);
                };
                lower(self, cg, l)?;
                lower(self, cg, r)?;
                Ok(true)
            }
            // A discarded increment or compound add is a plain
            // read-modify-write when the object sits in a word slot
            // and the step is a constant.
            Op::PlusPlus | Op::MinusMinus | Op::PlusEq | Op::MinusEq
                if n.flags.contains(NodeFlags::NORETURN) && self.size_of(n.ty) == 2 =>
            {
                let (Some(l), Some(r)) = (n.left, n.right) else {
                    return Ok(false);
                };
                let ln = cg.node(l);
                let rn = cg.node(r);
                if rn.op != Op::Constant {
                    return Ok(false);
                }
                let dst = match ln.op {
                    Op::Local | Op::Argument => Self::frame_operand(cg, ln.value),
                    Op::Name => format!("_{}+{}", cg.name(ln.sym)?, ln.value),
                    _ => return Ok(false),
                };
                let mnemonic = if matches!(n.op, Op::PlusPlus | Op::PlusEq) {
                    "addd"
                } else {
                    "subd"
                };
                cg.asm.ins(format!("ldd {dst}"));
                cg.asm.ins(format!("{} #{}", mnemonic, rn.value & 0xFFFF));
                cg.asm.ins(format!("std {dst}"));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn direct(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool> {
        let n = cg.node(id);
        // Argument teardown after a call: one stack adjustment covers
        // every pushed argument.
        if n.op == Op::Cleanup {
            let bytes = n.right.map(|r| cg.node(r).value).unwrap_or(0);
            if bytes > 0 {
                cg.asm.ins(format!("leas {bytes},s"));
            }
            return Ok(true);
        }

        let Some(r) = n.right else { return Ok(false) };
        let rn = cg.node(r);
        let sz = self.size_of(n.ty);
        if rn.op != Op::Constant || !matches!(sz, 1 | 2) {
            return Ok(false);
        }
        let v = rn.value & 0xFFFF;
        // Store of a constant through a computed address: the address
        // is live in D, so park it in X first.
        if n.op == Op::Eq {
            cg.asm.ins("tfr d,x");
            if sz == 1 {
                cg.asm.ins(format!("ldb #{}", v & 0xFF));
                cg.asm.ins("stb ,x");
            } else {
                cg.asm.ins(format!("ldd #{v}"));
                cg.asm.ins("std ,x");
            }
            return Ok(true);
        }
        if sz != 2 {
            return Ok(false);
        }
        match n.op {
            Op::Plus => {
                cg.asm.ins(format!("addd #{v}"));
                Ok(true)
            }
            Op::Minus => {
                cg.asm.ins(format!("subd #{v}"));
                Ok(true)
            }
            Op::Or => {
                cg.asm.ins(format!("ora #{}", v >> 8));
                cg.asm.ins(format!("orb #{}", v & 0xFF));
                Ok(true)
            }
            Op::And => {
                cg.asm.ins(format!("anda #{}", v >> 8));
                cg.asm.ins(format!("andb #{}", v & 0xFF));
                Ok(true)
            }
            Op::Hat => {
                cg.asm.ins(format!("eora #{}", v >> 8));
                cg.asm.ins(format!("eorb #{}", v & 0xFF));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn uni_direct(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool> {
        let n = cg.node(id);
        // A squashed store never has a left operand, so a constant
        // right side is fused here before it would be lowered.
        if !matches!(
            n.op,
            Op::LocalStore | Op::NameStore | Op::LabelStore | Op::RegStore
        ) {
            return Ok(false);
        }
        let Some(r) = n.right else { return Ok(false) };
        let rn = cg.node(r);
        if rn.op != Op::Constant || self.size_of(n.ty) != 2 {
            return Ok(false);
        }
        cg.asm.ins(format!("ldd #{}", rn.value & 0xFFFF));
        if n.op == Op::RegStore {
            cg.asm.ins("tfr d,y");
        } else {
            let dst = Self::squashed_operand(cg, &n)?.unwrap_or_default();
            cg.asm.ins(format!("std {dst}"));
        }
        Ok(true)
    }

    fn node_emit(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool> {
        let n = cg.node(id);
        let sz = self.size_of(n.ty);
        match n.op {
            Op::Constant => match sz {
                0..=2 => {
                    cg.asm.ins(format!("ldd #{}", n.value & 0xFFFF));
                    Ok(true)
                }
                4 => {
                    cg.asm.ins(format!("ldu #{}", n.value >> 16));
                    cg.asm.ins(format!("ldd #{}", n.value & 0xFFFF));
                    Ok(true)
                }
                _ => Ok(false),
            },

            // Address leaves.
            Op::Name => {
                let name = cg.name(n.sym)?;
                cg.asm.ins(format!("ldd #_{}+{}", name, n.value));
                Ok(true)
            }
            Op::Label => {
                cg.asm.ins(format!("ldd #T{}", n.value));
                Ok(true)
            }
            Op::Local | Op::Argument => {
                let operand = Self::frame_operand(cg, n.value);
                cg.asm.ins(format!("leax {operand}"));
                cg.asm.ins("tfr x,d");
                Ok(true)
            }

            // Squashed loads.
            Op::LocalRef | Op::NameRef | Op::LabelRef => {
                let src = Self::squashed_operand(cg, &n)?.unwrap_or_default();
                match sz {
                    1 => {
                        cg.asm.ins(format!("ldb {src}"));
                        Self::extend_byte(cg, n.ty);
                        Ok(true)
                    }
                    2 => {
                        cg.asm.ins(format!("ldd {src}"));
                        Ok(true)
                    }
                    4 => {
                        cg.asm.ins(format!("ldu {src}"));
                        cg.asm.ins(format!("ldd {}", Self::low_half(&src)));
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            Op::RegRef => {
                cg.asm.ins("tfr y,d");
                Ok(true)
            }

            // Squashed stores; the value to store is live.
            Op::LocalStore | Op::NameStore | Op::LabelStore => {
                let dst = Self::squashed_operand(cg, &n)?.unwrap_or_default();
                match sz {
                    1 => {
                        cg.asm.ins(format!("stb {dst}"));
                        Ok(true)
                    }
                    2 => {
                        cg.asm.ins(format!("std {dst}"));
                        Ok(true)
                    }
                    4 => {
                        cg.asm.ins(format!("stu {dst}"));
                        cg.asm.ins(format!("std {}", Self::low_half(&dst)));
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            Op::RegStore => {
                cg.asm.ins("tfr d,y");
                Ok(true)
            }

            // Load through a computed address live in D.
            Op::Deref => match sz {
                1 => {
                    cg.asm.ins("tfr d,x");
                    cg.asm.ins("ldb ,x");
                    Self::extend_byte(cg, n.ty);
                    Ok(true)
                }
                2 => {
                    cg.asm.ins("tfr d,x");
                    cg.asm.ins("ldd ,x");
                    Ok(true)
                }
                4 => {
                    cg.asm.ins("tfr d,x");
                    cg.asm.ins("ldu ,x");
                    cg.asm.ins("ldd 2,x");
                    Ok(true)
                }
                _ => Ok(false),
            },

            // Store through a pushed address; the value is live.
            Op::Eq => match sz {
                1 => {
                    cg.asm.ins("puls x");
                    cg.asm.ins("stb ,x");
                    Ok(true)
                }
                2 => {
                    cg.asm.ins("puls x");
                    cg.asm.ins("std ,x");
                    Ok(true)
                }
                4 => {
                    cg.asm.ins("puls x");
                    cg.asm.ins("stu ,x");
                    cg.asm.ins("std 2,x");
                    Ok(true)
                }
                _ => Ok(false),
            },

            // Calls.
            Op::CallName => {
                let name = cg.name(n.sym)?;
                cg.asm.ins(format!("jsr _{}+{}", name, n.value));
                Ok(true)
            }
            Op::FuncCall => {
                cg.asm.ins("tfr d,x");
                cg.asm.ins("jsr ,x");
                Ok(true)
            }

            Op::Null => Ok(true),
            _ => Ok(false),
        }
    }

    fn push_result(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool> {
        let ty = cg.node(id).ty;
        match self.stack_size(ty) {
            2 => {
                cg.asm.ins("pshs d");
                Ok(true)
            }
            4 => {
                cg.asm.ins("pshs d,u");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn cast(&mut self, cg: &mut Codegen, id: NodeId) -> CodegenResult<bool> {
        let n = cg.node(id);
        let Some(r) = n.right else { return Ok(false) };
        let from = cg.node(r).ty;
        if from == n.ty || from.sign_only_differs(n.ty) || (from.is_ptr() && n.ty.is_ptr()) {
            return Ok(true);
        }
        // Word-to-word scalar punning is a no-op in D.
        if self.size_of(from) == 2
            && self.size_of(n.ty) == 2
            && from.is_scalar()
            && n.ty.is_scalar()
            && !from.is_float()
            && !n.ty.is_float()
        {
            return Ok(true);
        }
        Ok(false)
    }

    // ── File and function framing ─────────────────────────────────

    fn file_begin(&mut self, out: &mut Asm) {
        out.ins(".code");
    }

    fn file_end(&mut self, _out: &mut Asm) {}

    fn stmt_end(&mut self, out: &mut Asm) {
        out.raw(";");
    }

    fn segment(&mut self, out: &mut Asm, seg: Segment) {
        out.ins(match seg {
            Segment::Code => ".code",
            Segment::Data => ".data",
            Segment::Bss => ".bss",
            Segment::Literal => ".literal",
        });
    }

    fn export(&mut self, out: &mut Asm, name: &str) {
        out.ins(format!(".export _{name}"));
    }

    fn prologue(&mut self, out: &mut Asm, name: &str) {
        out.raw(format!("_{name}:"));
    }

    fn frame(&mut self, out: &mut Asm, size: u16) {
        if size > 0 {
            out.ins(format!("leas -{size},s"));
        }
    }

    fn epilogue(&mut self, out: &mut Asm, frame: u16) {
        if frame > 0 {
            out.ins(format!("leas {frame},s"));
        }
        out.ins("rts");
    }

    // ── Labels and jumps ──────────────────────────────────────────

    fn label(&mut self, out: &mut Asm, tail: &str, id: u16) {
        out.raw(format!("L{id}{tail}:"));
    }

    fn jump(&mut self, out: &mut Asm, tail: &str, id: u16) {
        out.ins(format!("jmp L{id}{tail}"));
    }

    fn jump_if_false(&mut self, out: &mut Asm, tail: &str, id: u16) {
        out.ins("cmpd #0");
        out.ins(format!("lbeq L{id}{tail}"));
    }

    fn jump_if_true(&mut self, out: &mut Asm, tail: &str, id: u16) {
        out.ins("cmpd #0");
        out.ins(format!("lbne L{id}{tail}"));
    }

    // ── Switch fabric ─────────────────────────────────────────────

    fn switch_dispatch(&mut self, out: &mut Asm, id: u16, ty: Ty) {
        out.ins(format!("ldx #Sw{id}"));
        if self.size_of(ty) == 4 {
            out.ins("jsr __switchl");
        } else {
            out.ins("jsr __switch");
        }
    }

    fn case_label(&mut self, out: &mut Asm, id: u16, entry: u16) {
        out.raw(format!("Sw{id}_{entry}:"));
    }

    fn switch_table(&mut self, out: &mut Asm, id: u16, count: u16) {
        out.raw(format!("Sw{id}:"));
        out.ins(format!(".word {count}"));
    }

    fn case_ref(&mut self, out: &mut Asm, id: u16, entry: u16) {
        out.ins(format!(".word Sw{id}_{entry}"));
    }

    // ── Data emission ─────────────────────────────────────────────

    fn data_label(&mut self, out: &mut Asm, name: &str, _size: u16) {
        out.raw(format!("_{name}:"));
    }

    fn literal_label(&mut self, out: &mut Asm, id: u16) {
        out.raw(format!("T{id}:"));
    }

    fn value(&mut self, out: &mut Asm, ty: Ty, v: u32) -> CodegenResult<()> {
        // No float story on this target; a silent bit dump would
        // corrupt images.
        if ty.is_float() {
            return Err(CodegenError::DataType { ty });
        }
        match self.size_of(ty) {
            1 => out.ins(format!(".byte {}", v & 0xFF)),
            2 => out.ins(format!(".word {}", v & 0xFFFF)),
            // Big-endian high word first.
            4 => {
                out.ins(format!(".word {}", v >> 16));
                out.ins(format!(".word {}", v & 0xFFFF));
            }
            _ => return Err(CodegenError::DataType { ty }),
        }
        Ok(())
    }

    fn space(&mut self, out: &mut Asm, bytes: u32) {
        out.ins(format!(".ds {bytes}"));
    }

    fn text_ref(&mut self, out: &mut Asm, label: u16) {
        out.ins(format!(".word T{label}"));
    }

    fn name_ref(&mut self, out: &mut Asm, name: &str, offset: u32) {
        out.ins(format!(".word _{name}+{offset}"));
    }

    // ── Helper framing ────────────────────────────────────────────

    fn helper_call(&mut self, out: &mut Asm, name: &str) {
        out.ins(format!("jsr __{name}"));
    }
}
