//! The precedence ladder, one method per binding level.
//!
//! Binary levels iterate, so `a - b - c` associates left. Assignment
//! and the conditional re-enter their own level on the right and bind
//! right. Every operand consumed as a value passes through `make_rval`
//! on the way in.

use crate::error::CodegenResult;
use crate::node::{NodeFlags, NodeId, Op};
use crate::types::{Base, Ty};

use super::tokens::{Punct, Storage, Token, TokenStream};
use super::Builder;

impl<'a, S: TokenStream> Builder<'a, S> {
    // ── Assignment and conditional ────────────────────────────────

    /// Assignment, the lowest level below the comma.
    pub(super) fn assignment(&mut self) -> CodegenResult<NodeId> {
        let l = self.ternary()?;
        let Some(p) = self.punct() else {
            return Ok(l);
        };

        if p == Punct::Eq {
            self.advance();
            if !self.arena.node(l).is_lval() {
                self.diags.error("missing lvalue", self.span());
            }
            let r = self.assignment()?;
            let r = self.make_rval(r)?;
            return self.assign_tree(l, r);
        }

        let op = match p {
            Punct::PlusEq => Op::PlusEq,
            Punct::MinusEq => Op::MinusEq,
            Punct::StarEq => Op::StarEq,
            Punct::SlashEq => Op::SlashEq,
            Punct::PercentEq => Op::PercentEq,
            Punct::LtLtEq => Op::ShlEq,
            Punct::GtGtEq => Op::ShrEq,
            Punct::AndEq => Op::AndEq,
            Punct::OrEq => Op::OrEq,
            Punct::HatEq => Op::HatEq,
            _ => return Ok(l),
        };
        self.advance();
        if !self.arena.node(l).is_lval() {
            self.diags.error("missing lvalue", self.span());
            let r = self.assignment()?;
            self.arena.release_tree(r);
            return Ok(l);
        }
        let lt = self.arena.node(l).ty;
        let r = self.assignment()?;
        let r = self.make_rval(r)?;

        // Pointer += and -= scale like pointer arithmetic, shifts take
        // an int count, everything else converts to the stored type.
        let r = if lt.is_ptr() && matches!(op, Op::PlusEq | Op::MinusEq) {
            let k = self.scale_of(lt);
            self.scaled_index(r, k)?
        } else if matches!(op, Op::ShlEq | Op::ShrEq) {
            self.typeconv(r, Ty::INT, false)?
        } else {
            self.typeconv(r, lt, true)?
        };
        let n = self.tree(op, Some(l), Some(r))?;
        self.arena.node_mut(n).ty = lt;
        Ok(n)
    }

    /// The conditional operator. Both arms re-enter this level, so
    /// `a ? b : c ? d : e` nests to the right.
    fn ternary(&mut self) -> CodegenResult<NodeId> {
        let c = self.logic_or()?;
        if !self.eat(Punct::Question) {
            return Ok(c);
        }
        let c = self.make_rval(c)?;
        if !self.arena.node(c).ty.is_scalar() {
            self.badtype();
        }
        let a1 = self.ternary()?;
        let a1 = self.make_rval(a1)?;
        if !self.eat(Punct::Colon) {
            self.diags.error("missing colon", self.span());
            return Ok(c);
        }
        let a2 = self.ternary()?;
        let a2 = self.make_rval(a2)?;

        let t1 = self.arena.node(a1).ty;
        let t2 = self.arena.node(a2).ty;
        if !(t1.is_arith() && t2.is_arith()) && !self.pointer_compare(a1, t1, a2, t2) {
            self.badtype();
        }
        let a2 = self.typeconv(a2, t1, true)?;
        let cond = self.bool_tree(c)?;
        let colon = self.tree(Op::Colon, Some(a1), Some(a2))?;
        self.arena.node_mut(colon).ty = t1;
        let q = self.tree(Op::Question, Some(cond), Some(colon))?;
        self.arena.node_mut(q).ty = t1;
        Ok(q)
    }

    // ── Binary levels ─────────────────────────────────────────────

    fn logic_or(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.logic_and()?;
        while self.eat(Punct::OrOr) {
            let l2 = self.make_rval(l)?;
            let r = self.logic_and()?;
            let r = self.make_rval(r)?;
            l = self.logic_tree(Op::OrOr, l2, r)?;
        }
        Ok(l)
    }

    fn logic_and(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.bit_or()?;
        while self.eat(Punct::AndAnd) {
            let l2 = self.make_rval(l)?;
            let r = self.bit_or()?;
            let r = self.make_rval(r)?;
            l = self.logic_tree(Op::AndAnd, l2, r)?;
        }
        Ok(l)
    }

    fn bit_or(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.bit_xor()?;
        while self.eat(Punct::Or) {
            let l2 = self.make_rval(l)?;
            let r = self.bit_xor()?;
            let r = self.make_rval(r)?;
            l = self.intarith_tree(Op::Or, l2, r)?;
        }
        Ok(l)
    }

    fn bit_xor(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.bit_and()?;
        while self.eat(Punct::Hat) {
            let l2 = self.make_rval(l)?;
            let r = self.bit_and()?;
            let r = self.make_rval(r)?;
            l = self.intarith_tree(Op::Hat, l2, r)?;
        }
        Ok(l)
    }

    fn bit_and(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.equality()?;
        while self.eat(Punct::And) {
            let l2 = self.make_rval(l)?;
            let r = self.equality()?;
            let r = self.make_rval(r)?;
            l = self.intarith_tree(Op::And, l2, r)?;
        }
        Ok(l)
    }

    fn equality(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.relational()?;
        loop {
            let op = match self.punct() {
                Some(Punct::EqEq) => Op::EqEq,
                Some(Punct::BangEq) => Op::BangEq,
                _ => return Ok(l),
            };
            self.advance();
            let l2 = self.make_rval(l)?;
            let r = self.relational()?;
            let r = self.make_rval(r)?;
            l = self.ordercomp_tree(op, l2, r)?;
        }
    }

    fn relational(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.shift()?;
        loop {
            let op = match self.punct() {
                Some(Punct::Lt) => Op::Lt,
                Some(Punct::Gt) => Op::Gt,
                Some(Punct::LtEq) => Op::LtEq,
                Some(Punct::GtEq) => Op::GtEq,
                _ => return Ok(l),
            };
            self.advance();
            let l2 = self.make_rval(l)?;
            let r = self.shift()?;
            let r = self.make_rval(r)?;
            l = self.ordercomp_tree(op, l2, r)?;
        }
    }

    fn shift(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.additive()?;
        loop {
            let op = match self.punct() {
                Some(Punct::LtLt) => Op::LtLt,
                Some(Punct::GtGt) => Op::GtGt,
                _ => return Ok(l),
            };
            self.advance();
            let l2 = self.make_rval(l)?;
            let r = self.additive()?;
            let r = self.make_rval(r)?;
            l = self.intarith_tree(op, l2, r)?;
        }
    }

    fn additive(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.multiplicative()?;
        loop {
            let op = match self.punct() {
                Some(Punct::Plus) => Op::Plus,
                Some(Punct::Minus) => Op::Minus,
                _ => return Ok(l),
            };
            self.advance();
            let l2 = self.make_rval(l)?;
            let r = self.multiplicative()?;
            let r = self.make_rval(r)?;
            l = self.additive_step(op, l2, r)?;
        }
    }

    /// One `+` or `-`. Pointer plus int scales the index; pointer minus
    /// pointer yields an int count of elements.
    fn additive_step(&mut self, op: Op, l: NodeId, r: NodeId) -> CodegenResult<NodeId> {
        let lt = self.arena.node(l).ty;
        let rt = self.arena.node(r).ty;
        match (lt.is_ptr(), rt.is_ptr()) {
            (false, false) => self.arith_tree(op, l, r),
            (true, false) => {
                let k = self.scale_of(lt);
                let idx = self.scaled_index(r, k)?;
                let n = self.tree(op, Some(l), Some(idx))?;
                self.arena.node_mut(n).ty = lt;
                Ok(n)
            }
            (false, true) => {
                if op != Op::Plus {
                    self.badtype();
                    return self.tree(op, Some(l), Some(r));
                }
                let k = self.scale_of(rt);
                let idx = self.scaled_index(l, k)?;
                let n = self.tree(Op::Plus, Some(idx), Some(r))?;
                self.arena.node_mut(n).ty = rt;
                Ok(n)
            }
            (true, true) => {
                if op != Op::Minus || !self.pointer_compare(l, lt, r, rt) {
                    self.diags.error("type mismatch", self.span());
                    return self.tree(op, Some(l), Some(r));
                }
                let k = self.scale_of(lt);
                let d = self.tree(Op::Minus, Some(l), Some(r))?;
                self.arena.node_mut(d).ty = Ty::INT;
                if k == 1 {
                    return Ok(d);
                }
                let kc = self.make_constant(k, Ty::INT)?;
                let q = self.tree(Op::Slash, Some(d), Some(kc))?;
                self.arena.node_mut(q).ty = Ty::INT;
                Ok(q)
            }
        }
    }

    fn multiplicative(&mut self) -> CodegenResult<NodeId> {
        let mut l = self.unary()?;
        loop {
            let op = match self.punct() {
                Some(Punct::Star) => Op::Star,
                Some(Punct::Slash) => Op::Slash,
                Some(Punct::Percent) => Op::Percent,
                _ => return Ok(l),
            };
            self.advance();
            let l2 = self.make_rval(l)?;
            let r = self.unary()?;
            let r = self.make_rval(r)?;
            l = if op == Op::Percent {
                self.intarith_tree(op, l2, r)?
            } else {
                self.arith_tree(op, l2, r)?
            };
        }
    }

    // ── Unary level ───────────────────────────────────────────────

    fn unary(&mut self) -> CodegenResult<NodeId> {
        let Some(p) = self.punct() else {
            let l = self.postfix()?;
            return self.trailing_incdec(l);
        };
        match p {
            Punct::PlusPlus | Punct::MinusMinus => {
                self.advance();
                let op = if p == Punct::PlusPlus {
                    Op::PlusEq
                } else {
                    Op::MinusEq
                };
                let l = self.unary()?;
                self.incdec_tree(op, l)
            }
            Punct::Minus => {
                self.advance();
                let operand = self.unary()?;
                let r = self.make_rval(operand)?;
                if !self.arena.node(r).ty.is_arith() {
                    self.badtype();
                }
                self.tree(Op::Negate, None, Some(r))
            }
            Punct::Tilde => {
                self.advance();
                let operand = self.unary()?;
                let r = self.make_rval(operand)?;
                if !self.arena.node(r).ty.is_int_arith() {
                    self.badtype();
                }
                self.tree(Op::Tilde, None, Some(r))
            }
            Punct::Bang => {
                self.advance();
                let operand = self.unary()?;
                let r = self.make_rval(operand)?;
                let rt = self.arena.node(r).ty;
                if !rt.is_scalar() {
                    self.badtype();
                }
                let n = self.tree(Op::Bang, None, Some(r))?;
                // The truth test keeps its operand's width so the
                // helper examines the right registers; a pointer tests
                // as an unsigned word.
                self.arena.node_mut(n).ty = if rt.is_ptr() { Ty::UINT } else { rt };
                Ok(n)
            }
            Punct::Star => {
                self.advance();
                let operand = self.unary()?;
                let r = self.make_rval(operand)?;
                let rt = self.arena.node(r).ty;
                if rt.is_func_ptr() {
                    // (*fp)() and fp() call the same way: dereferencing
                    // a function pointer is itself.
                    return Ok(r);
                }
                match rt.deref() {
                    Some(inner) => {
                        // The operand's value is the address, so the
                        // operand itself becomes the lvalue.
                        let m = self.arena.node_mut(r);
                        m.ty = inner;
                        m.flags.insert(NodeFlags::LVAL);
                        Ok(r)
                    }
                    None => {
                        self.badtype();
                        Ok(r)
                    }
                }
            }
            Punct::And => {
                self.advance();
                let operand = self.unary()?;
                let node = *self.arena.node(operand);
                if node.op == Op::Reg {
                    // Registers have no address to take.
                    self.diags
                        .error("can't take address of register", self.span());
                } else if node.flags.contains(NodeFlags::LVAL) {
                    let m = self.arena.node_mut(operand);
                    m.flags.remove(NodeFlags::LVAL);
                    m.ty = node.ty.ptr_to();
                } else {
                    self.diags.error("missing lvalue", self.span());
                }
                Ok(operand)
            }
            Punct::LParen => {
                self.advance();
                if let Token::TypeName { ty } = self.token() {
                    self.advance();
                    self.require(Punct::RParen);
                    let operand = self.unary()?;
                    let operand = self.make_rval(operand)?;
                    return self.typeconv(operand, ty, false);
                }
                let inner = self.expression_tree(true)?;
                self.require(Punct::RParen);
                let l = self.postfix_ops(inner)?;
                self.trailing_incdec(l)
            }
            _ => {
                let l = self.postfix()?;
                self.trailing_incdec(l)
            }
        }
    }

    /// Prefix `++`/`--`, expressed as the matching compound assignment.
    fn incdec_tree(&mut self, op: Op, l: NodeId) -> CodegenResult<NodeId> {
        if !self.arena.node(l).is_lval() {
            self.diags.error("missing lvalue", self.span());
            return Ok(l);
        }
        let lt = self.arena.node(l).ty;
        let step = self.incdec_step(lt)?;
        let n = self.tree(op, Some(l), Some(step))?;
        self.arena.node_mut(n).ty = lt;
        Ok(n)
    }

    /// Postfix `++`/`--` keep their own operators so lowering can yield
    /// the old value.
    fn trailing_incdec(&mut self, l: NodeId) -> CodegenResult<NodeId> {
        let op = match self.punct() {
            Some(Punct::PlusPlus) => Op::PlusPlus,
            Some(Punct::MinusMinus) => Op::MinusMinus,
            _ => return Ok(l),
        };
        self.advance();
        if !self.arena.node(l).is_lval() {
            self.diags.error("missing lvalue", self.span());
            return Ok(l);
        }
        let lt = self.arena.node(l).ty;
        let step = self.incdec_step(lt)?;
        let n = self.tree(op, Some(l), Some(step))?;
        self.arena.node_mut(n).ty = lt;
        Ok(n)
    }

    /// The constant a `++` adds: the element size for pointers, one in
    /// the object's own type otherwise.
    fn incdec_step(&mut self, lt: Ty) -> CodegenResult<NodeId> {
        if lt.is_ptr() {
            let k = self.scale_of(lt);
            return self.make_constant(k, Ty::UINT);
        }
        if lt.is_int_arith() {
            return self.make_constant(1, lt);
        }
        self.make_constant(1, Ty::UINT)
    }

    /// Scale an index for pointer arithmetic over elements of size `k`.
    /// The index narrows to word width first so the multiply helper and
    /// the stack accounting agree.
    pub(super) fn scaled_index(&mut self, r: NodeId, k: u32) -> CodegenResult<NodeId> {
        let rt = self.arena.node(r).ty;
        if !rt.is_int_arith() {
            self.badtype();
            return Ok(r);
        }
        let r = self.typeconv(r, Ty::UINT, false)?;
        if k == 1 {
            return Ok(r);
        }
        let kc = self.make_constant(k, Ty::UINT)?;
        self.tree(Op::Star, Some(r), Some(kc))
    }

    // ── Postfix level ─────────────────────────────────────────────

    fn postfix(&mut self) -> CodegenResult<NodeId> {
        let l = self.primary()?;
        self.postfix_ops(l)
    }

    /// Subscripts, calls and member selections, applied left to right.
    pub(super) fn postfix_ops(&mut self, l: NodeId) -> CodegenResult<NodeId> {
        let mut l = l;
        loop {
            l = match self.punct() {
                Some(Punct::LSquare) => {
                    self.advance();
                    self.subscript(l)?
                }
                Some(Punct::LParen) => {
                    self.advance();
                    self.function_call(l)?
                }
                Some(Punct::Dot) => {
                    self.advance();
                    self.member(l, false)?
                }
                Some(Punct::Arrow) => {
                    self.advance();
                    self.member(l, true)?
                }
                _ => return Ok(l),
            };
        }
    }

    /// `l[i]`: scale, add, and mark the sum an lvalue of the element.
    fn subscript(&mut self, l: NodeId) -> CodegenResult<NodeId> {
        let l = self.make_rval(l)?;
        let lt = self.arena.node(l).ty;
        let Some(elem) = lt.deref() else {
            self.diags.error("can't subscript", self.span());
            self.junk_to(Punct::RSquare);
            self.require(Punct::RSquare);
            return Ok(l);
        };
        let idx = self.expression_tree(true)?;
        self.require(Punct::RSquare);
        let k = self.scale_of(lt);
        let idx = self.scaled_index(idx, k)?;
        let n = self.tree(Op::Plus, Some(l), Some(idx))?;
        let m = self.arena.node_mut(n);
        m.ty = elem;
        m.flags.insert(NodeFlags::LVAL);
        Ok(n)
    }

    /// `.` and `->`. Member names resolve against the record layout,
    /// not the scope.
    fn member(&mut self, l: NodeId, arrow: bool) -> CodegenResult<NodeId> {
        let name = match self.token() {
            Token::Ident { id } => id,
            Token::Symbol { id, .. } => id,
            t => {
                self.diags.error(
                    format!("expected identifier, found {}", t.description()),
                    self.span(),
                );
                return Ok(l);
            }
        };
        self.advance();

        let (l, rec_ty) = if arrow {
            let l = self.make_rval(l)?;
            (l, self.arena.node(l).ty.deref())
        } else {
            (l, Some(self.arena.node(l).ty))
        };
        let rid = match rec_ty {
            Some(Ty {
                base: Base::Record(rid),
                indir: 0,
            }) => rid,
            _ => {
                self.diags.error("can't take member", self.span());
                return Ok(l);
            }
        };
        let (offset, mty) = match self.types.member(rid, name) {
            Some(m) => (m.offset, m.ty),
            None => {
                self.diags.error("unknown member", self.span());
                self.arena.node_mut(l).ty = Ty::INT;
                return Ok(l);
            }
        };
        let off = self.make_constant(offset, Ty::UINT)?;
        let n = self.tree(Op::Plus, Some(l), Some(off))?;
        let m = self.arena.node_mut(n);
        m.ty = mty;
        m.flags.insert(NodeFlags::LVAL);
        Ok(n)
    }

    // ── Leaves ────────────────────────────────────────────────────

    fn primary(&mut self) -> CodegenResult<NodeId> {
        match self.token() {
            Token::Symbol { id, ty, storage } => {
                self.advance();
                let n = self.arena.acquire()?;
                let node = self.arena.node_mut(n);
                node.ty = ty;
                node.flags.insert(NodeFlags::LVAL);
                node.sym = id;
                match storage {
                    Storage::Static => node.op = Op::Name,
                    Storage::Local { offset } => {
                        node.op = Op::Local;
                        node.value = offset;
                    }
                    Storage::Argument { offset } => {
                        node.op = Op::Argument;
                        node.value = offset;
                    }
                    Storage::Register { index } => {
                        node.op = Op::Reg;
                        node.value = index;
                    }
                }
                Ok(n)
            }
            Token::IntConst { value, ty } => {
                self.advance();
                self.make_constant(value, ty)
            }
            Token::StrLit { label } => {
                self.advance();
                let n = self.arena.acquire()?;
                let node = self.arena.node_mut(n);
                node.op = Op::Label;
                node.ty = Ty::CHAR.ptr_to();
                node.value = label as u32;
                Ok(n)
            }
            t => {
                self.diags.error(
                    format!("expected expression, found {}", t.description()),
                    self.span(),
                );
                if !(self.at_eof()
                    || self.at(Punct::Semicolon)
                    || self.at(Punct::RParen)
                    || self.at(Punct::RSquare))
                {
                    self.advance();
                }
                self.make_constant(0, Ty::INT)
            }
        }
    }
}
