//! Expression tree construction.
//!
//! The builder turns a stream of resolved tokens into the node trees
//! the rewrite and lowering passes consume. One method per binding
//! level handles precedence, constant arithmetic folds as trees are
//! built, and type errors go to the diagnostic sink while construction
//! continues with a substitute, so one bad expression never stops the
//! translation unit.
//!
//! Trees come out of the shared `NodeArena` and belong to the caller:
//! hand them to the record writer or the lowering driver, then release
//! them.

mod call;
mod climb;
mod conv;
pub mod tokens;


pub use tokens::{Punct, Storage, Token, TokenBuffer, TokenStream};

use crate::diagnostic::DiagnosticSink;
use crate::error::CodegenResult;
use crate::node::{NodeArena, NodeFlags, NodeId, Op};
use crate::span::{Span, Spanned};
use crate::target::Backend;
use crate::types::{Ty, TypeStore};

// ─── Builder ───────────────────────────────────────────────────────

/// Builds expression trees from resolved tokens.
pub struct Builder<'a, S: TokenStream> {
    /// Token source.
    stream: S,
    /// One token of lookahead.
    current: Spanned<Token>,
    /// Node storage, shared with the rest of the pipeline.
    arena: &'a mut NodeArena,
    /// Prototype and record layouts for calls and member access.
    types: &'a TypeStore,
    /// Target sizing, for pointer scaling and argument space.
    be: &'a dyn Backend,
    /// Error and warning collector.
    diags: &'a mut DiagnosticSink,
}

impl<'a, S: TokenStream> Builder<'a, S> {
    pub fn new(
        stream: S,
        arena: &'a mut NodeArena,
        types: &'a TypeStore,
        be: &'a dyn Backend,
        diags: &'a mut DiagnosticSink,
    ) -> Self {
        let mut stream = stream;
        let current = stream.next_token();
        Self {
            stream,
            current,
            arena,
            types,
            be,
            diags,
        }
    }

    // ── Entry points ──────────────────────────────────────────────

    /// Parse a full expression into a tree. With `comma` set the `,`
    /// sequencing operator is accepted at top level; call sites that
    /// use commas as delimiters clear it.
    pub fn expression_tree(&mut self, comma: bool) -> CodegenResult<NodeId> {
        let l = self.assignment()?;
        let mut n = self.make_rval(l)?;
        while comma && self.eat(Punct::Comma) {
            let r = self.assignment()?;
            let r = self.make_rval(r)?;
            n = self.tree(Op::Comma, Some(n), Some(r))?;
        }
        Ok(n)
    }

    /// Parse an expression statement. Returns `None` for an empty
    /// statement, leaving the `;` unconsumed. `mkbool` wraps the result
    /// as a truth test, `noret` marks the value unused.
    pub fn expression(
        &mut self,
        comma: bool,
        mkbool: bool,
        noret: bool,
    ) -> CodegenResult<Option<NodeId>> {
        if self.at(Punct::Semicolon) {
            return Ok(None);
        }
        let n = self.expression_tree(comma)?;
        Ok(Some(self.finish_statement(n, mkbool, noret)?))
    }

    /// Parse an expression in a position where C allows an empty one,
    /// as in `for (;;)`. Absence produces an explicit null node.
    pub fn expression_or_null(&mut self, mkbool: bool, noret: bool) -> CodegenResult<NodeId> {
        if self.at(Punct::Semicolon) || self.at(Punct::RParen) {
            let id = self.arena.acquire()?;
            let n = self.arena.node_mut(id);
            n.op = Op::Null;
            n.ty = Ty::VOID;
            return Ok(id);
        }
        let n = self.expression_tree(true)?;
        self.finish_statement(n, mkbool, noret)
    }

    /// Parse an expression that must reduce to an integer constant.
    /// Yields 1 and a diagnostic when it does not.
    pub fn const_int_expression(&mut self) -> CodegenResult<u32> {
        let n = self.expression_tree(false)?;
        let node = *self.arena.node(n);
        let v = if node.op == Op::Constant {
            node.value
        } else {
            self.diags.error("not constant", self.span());
            1
        };
        self.arena.release_tree(n);
        Ok(v)
    }

    fn finish_statement(&mut self, n: NodeId, mkbool: bool, noret: bool) -> CodegenResult<NodeId> {
        let mut n = n;
        if mkbool {
            n = self.bool_tree(n)?;
        }
        if noret {
            self.arena.node_mut(n).flags.insert(NodeFlags::NORETURN);
        }
        Ok(n)
    }

    // ── Utility methods ───────────────────────────────────────────

    fn token(&self) -> Token {
        self.current.node
    }

    fn span(&self) -> Span {
        self.current.span
    }

    fn punct(&self) -> Option<Punct> {
        match self.current.node {
            Token::Punct(p) => Some(p),
            _ => None,
        }
    }

    fn advance(&mut self) {
        self.current = self.stream.next_token();
    }

    fn at(&self, p: Punct) -> bool {
        self.punct() == Some(p)
    }

    fn at_eof(&self) -> bool {
        matches!(self.current.node, Token::Eof)
    }

    /// Consume `p` if it is the current token.
    fn eat(&mut self, p: Punct) -> bool {
        if self.at(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume `p` or report what was found instead.
    fn require(&mut self, p: Punct) {
        if !self.eat(p) {
            let msg = format!(
                "expected {}, found {}",
                p.description(),
                self.token().description()
            );
            self.diags.error(msg, self.span());
        }
    }

    /// Skip tokens after an error until `close`, a semicolon or the end
    /// of input. The stopping token is left for the caller.
    fn junk_to(&mut self, close: Punct) {
        while !(self.at(close) || self.at(Punct::Semicolon) || self.at_eof()) {
            self.advance();
        }
    }

    fn badtype(&mut self) {
        self.diags.error("bad type for operator", self.span());
    }
}
