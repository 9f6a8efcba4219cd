//! Helper-call emission: the portable fallback for every operator the
//! backend declines to open-code. A helper call is a `jsr`-style line
//! naming a runtime routine, optionally followed by inline operand
//! words the routine picks up from its return address.

use crate::codegen::Codegen;
use crate::error::{CodegenError, CodegenResult};
use crate::node::{NodeFlags, NodeId, Op};
use crate::target::Backend;
use crate::types::{Base, Ty};

/// Helper-name suffix for a type. Pointers take the integer helpers.
pub fn type_suffix(ty: Ty) -> CodegenResult<&'static str> {
    if ty.is_ptr() {
        return Ok("");
    }
    match ty.base {
        Base::UChar => Ok("uc"),
        Base::Char => Ok("c"),
        Base::UInt => Ok("u"),
        Base::Int => Ok(""),
        Base::ULong => Ok("ul"),
        Base::Long => Ok("l"),
        Base::Float => Ok("f"),
        Base::Double => Ok("d"),
        _ => Err(CodegenError::HelperType { ty }),
    }
}

fn strip_sign(ty: Ty) -> Ty {
    if !ty.is_ptr() && ty.is_unsigned() {
        if let Some(t) = ty.sign_twin() {
            return t;
        }
    }
    ty
}

/// Sign-folded suffix, for callers that build helper names themselves.
pub fn helper_suffix(ty: Ty) -> CodegenResult<&'static str> {
    type_suffix(strip_sign(ty))
}

/// Emit a helper call suffixed by the node's type with signedness
/// folded away, for operators whose low-word result is sign-agnostic.
pub fn helper(be: &mut dyn Backend, cg: &mut Codegen, id: NodeId, base: &str) -> CodegenResult<()> {
    let ty = strip_sign(cg.node(id).ty);
    let suffix = type_suffix(ty)?;
    be.helper_call(cg.asm, &format!("{base}{suffix}"));
    Ok(())
}

/// Emit a helper call suffixed by the node's exact type. Division,
/// shifts right, and ordered comparisons need the signed/unsigned
/// distinction.
pub fn helper_s(
    be: &mut dyn Backend,
    cg: &mut Codegen,
    id: NodeId,
    base: &str,
) -> CodegenResult<()> {
    let suffix = type_suffix(cg.node(id).ty)?;
    be.helper_call(cg.asm, &format!("{base}{suffix}"));
    Ok(())
}

fn cast_helper(be: &mut dyn Backend, cg: &mut Codegen, id: NodeId) -> CodegenResult<()> {
    let n = cg.node(id);
    let r = n.right.ok_or(CodegenError::InvalidOp {
        op: "Cast".into(),
    })?;
    let from = type_suffix(cg.node(r).ty)?;
    let to = type_suffix(n.ty)?;
    be.helper_call(cg.asm, &format!("cast{from}_{to}"));
    Ok(())
}

fn set_bool(cg: &mut Codegen, id: NodeId) {
    cg.arena.node_mut(id).flags.insert(NodeFlags::ISBOOL);
}

/// Finish a node the generic walk has prepared: operands are in place
/// (working register, and the stack for binary forms). The backend gets
/// first refusal, then the helper table applies.
pub fn make_node(be: &mut dyn Backend, cg: &mut Codegen, id: NodeId) -> CodegenResult<()> {
    let n = cg.node(id);

    if n.op == Op::Cast {
        if be.cast(cg, id)? {
            return Ok(());
        }
        return cast_helper(be, cg, id);
    }
    if be.node_emit(cg, id)? {
        return Ok(());
    }

    match n.op {
        // Nothing to finish: either pure structure or fully handled
        // by the branching walk above us.
        Op::Null | Op::OrOr | Op::AndAnd | Op::Colon | Op::Question | Op::ArgComma => Ok(()),

        Op::Plus => helper(be, cg, id, "plus"),
        Op::Minus => helper(be, cg, id, "minus"),
        Op::Star => helper(be, cg, id, "mul"),
        Op::Slash => helper_s(be, cg, id, "div"),
        Op::Percent => helper_s(be, cg, id, "mod"),
        Op::And => helper(be, cg, id, "band"),
        Op::Or => helper(be, cg, id, "or"),
        Op::Hat => helper(be, cg, id, "xor"),
        Op::LtLt => helper(be, cg, id, "shl"),
        Op::GtGt => helper_s(be, cg, id, "shr"),

        Op::Eq => helper(be, cg, id, "assign"),
        Op::PlusEq => helper(be, cg, id, "pluseq"),
        Op::MinusEq => helper(be, cg, id, "minuseq"),
        Op::StarEq => helper(be, cg, id, "muleq"),
        Op::SlashEq => helper_s(be, cg, id, "diveq"),
        Op::PercentEq => helper_s(be, cg, id, "modeq"),
        Op::AndEq => helper(be, cg, id, "andeq"),
        Op::OrEq => helper(be, cg, id, "oreq"),
        Op::HatEq => helper(be, cg, id, "xoreq"),
        Op::ShlEq => helper(be, cg, id, "shleq"),
        Op::ShrEq => helper_s(be, cg, id, "shreq"),

        // Post-increment without a consumer degenerates to the
        // compound assignment, which skips saving the old value.
        Op::PlusPlus => {
            if n.flags.contains(NodeFlags::NORETURN) {
                helper(be, cg, id, "pluseq")
            } else {
                helper(be, cg, id, "postinc")
            }
        }
        Op::MinusMinus => {
            if n.flags.contains(NodeFlags::NORETURN) {
                helper(be, cg, id, "minuseq")
            } else {
                helper(be, cg, id, "postdec")
            }
        }

        Op::EqEq => {
            helper(be, cg, id, "cceq")?;
            set_bool(cg, id);
            Ok(())
        }
        Op::BangEq => {
            helper(be, cg, id, "ccne")?;
            set_bool(cg, id);
            Ok(())
        }
        Op::Lt => {
            helper_s(be, cg, id, "cclt")?;
            set_bool(cg, id);
            Ok(())
        }
        Op::Gt => {
            helper_s(be, cg, id, "ccgt")?;
            set_bool(cg, id);
            Ok(())
        }
        Op::LtEq => {
            helper_s(be, cg, id, "cclteq")?;
            set_bool(cg, id);
            Ok(())
        }
        Op::GtEq => {
            helper_s(be, cg, id, "ccgteq")?;
            set_bool(cg, id);
            Ok(())
        }
        Op::Bang => {
            helper(be, cg, id, "not")?;
            set_bool(cg, id);
            Ok(())
        }
        Op::Tilde => helper(be, cg, id, "cpl"),
        Op::Negate => helper(be, cg, id, "negate"),
        Op::Deref => helper(be, cg, id, "deref"),

        // A truth-value wrap is free when the operand already left a
        // truth value in the register.
        Op::Bool => {
            let boolean = n
                .right
                .map(|r| cg.node(r).flags.contains(NodeFlags::ISBOOL))
                .unwrap_or(false);
            if boolean {
                set_bool(cg, id);
                Ok(())
            } else {
                helper(be, cg, id, "bool")?;
                set_bool(cg, id);
                Ok(())
            }
        }

        // The call result is an integer-width value whatever the
        // declared return type says; the helper suffix follows suit.
        Op::FuncCall => {
            cg.arena.node_mut(id).ty = Ty::PTR;
            helper(be, cg, id, "callfunc")
        }
        Op::Comma => helper(be, cg, id, "pop"),
        Op::Cleanup => Err(CodegenError::UnhandledCleanup),

        Op::Constant => {
            helper(be, cg, id, "const")?;
            be.value(cg.asm, n.ty, n.value)
        }
        Op::Label => {
            helper(be, cg, id, "const")?;
            be.text_ref(cg.asm, n.value as u16);
            Ok(())
        }
        Op::Name => {
            helper(be, cg, id, "loadn")?;
            let name = cg.name(n.sym)?;
            be.name_ref(cg.asm, &name, n.value);
            Ok(())
        }
        Op::Local => {
            helper(be, cg, id, "loadl")?;
            be.value(cg.asm, Ty::PTR, n.value)
        }
        Op::Argument => {
            helper(be, cg, id, "loada")?;
            be.value(cg.asm, Ty::PTR, n.value)
        }

        // Backend-specific forms the backend itself declined, and
        // data-record leaves that have no business in an expression.
        _ => Err(CodegenError::InvalidOp {
            op: format!("{:?}", n.op),
        }),
    }
}
