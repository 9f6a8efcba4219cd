//! Function call construction.
//!
//! Arguments chain with earlier ones on the right, matching the
//! right-to-left stacking order at the call site. Every call wraps in a
//! cleanup node carrying the argument byte count, so the caller-pops
//! convention survives into lowering unchanged.

use crate::error::{CodegenError, CodegenResult};
use crate::node::{NodeId, Op};
use crate::types::{ArgTail, Base, Ty};

use super::tokens::{Punct, TokenStream};
use super::Builder;

impl<'a, S: TokenStream> Builder<'a, S> {
    /// `l(...)`. The callee may be a function name or a function
    /// pointer value; the opening paren is already consumed.
    pub(super) fn function_call(&mut self, l: NodeId) -> CodegenResult<NodeId> {
        let l = self.make_rval(l)?;
        let lt = self.arena.node(l).ty;
        let pid = match lt.base {
            Base::Func(pid) if lt.indir <= 1 => pid,
            _ => {
                self.diags.error("not a function", self.span());
                self.junk_to(Punct::RParen);
                self.require(Punct::RParen);
                return Ok(l);
            }
        };
        let proto = match self.types.proto(pid) {
            Some(p) => p.clone(),
            None => return Err(CodegenError::Prototype { id: pid.0 }),
        };

        let mut argsize = 0u32;
        let mut argc = 0usize;
        let call = if self.eat(Punct::RParen) {
            self.tree(Op::FuncCall, None, Some(l))?
        } else {
            let args =
                self.call_args(&proto.params, 0, proto.tail, &mut argsize, &mut argc)?;
            self.tree(Op::FuncCall, Some(args), Some(l))?
        };
        if argc < proto.params.len() && proto.tail != ArgTail::Unspecified {
            self.diags.error("missing argument", self.span());
        }
        self.arena.node_mut(call).ty = proto.ret;

        let size = self.make_constant(argsize, Ty::UINT)?;
        let n = self.tree(Op::Cleanup, Some(call), Some(size))?;
        self.arena.node_mut(n).ty = proto.ret;
        Ok(n)
    }

    /// One argument and, recursively, the rest of the list.
    fn call_args(
        &mut self,
        params: &[Ty],
        i: usize,
        tail: ArgTail,
        argsize: &mut u32,
        argc: &mut usize,
    ) -> CodegenResult<NodeId> {
        let n = self.expression_tree(false)?;
        let n = self.convert_arg(n, params, i, tail)?;
        *argc += 1;
        let ty = self.arena.node(n).ty;
        *argsize += self.be.arg_size(ty);
        if self.eat(Punct::Comma) {
            let rest = self.call_args(params, i + 1, tail, argsize, argc)?;
            return self.tree(Op::ArgComma, Some(rest), Some(n));
        }
        self.require(Punct::RParen);
        Ok(n)
    }

    /// Convert argument `i` to its declared type, or apply the legacy
    /// promotions past the declared parameters.
    fn convert_arg(
        &mut self,
        n: NodeId,
        params: &[Ty],
        i: usize,
        tail: ArgTail,
    ) -> CodegenResult<NodeId> {
        if let Some(&pt) = params.get(i) {
            return self.typeconv(n, pt, true);
        }
        match tail {
            ArgTail::Fixed => {
                self.diags.error("unexpected argument", self.span());
                Ok(n)
            }
            ArgTail::Varargs | ArgTail::Unspecified => self.typeconv_implicit(n),
        }
    }
}
