//! Expression lowering: the rewrite pass, the left-right walk with its
//! escalating backend hooks, and the universal helper-call fallback.

pub mod helpers;
pub mod lower;
pub mod rewrite;

#[cfg(test)]
mod tests;

use std::io;

use crate::error::CodegenResult;
use crate::node::{Node, NodeArena, NodeId};
use crate::symtab::NameSource;
use crate::types::SymId;

pub use lower::lower;
pub use rewrite::rewrite;

/// Output assembly text, collected line by line. The streaming driver
/// drains it after every record; tests read it whole.
#[derive(Debug, Default)]
pub struct Asm {
    lines: Vec<String>,
}

impl Asm {
    pub fn new() -> Asm {
        Asm::default()
    }

    /// One indented instruction.
    pub fn ins(&mut self, text: impl Into<String>) {
        self.lines.push(format!("\t{}", text.into()));
    }

    /// One unindented line (labels, raw directives).
    pub fn raw(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|s| s.as_str())
    }

    /// Whole output as text, one trailing newline per line.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Flush collected lines to a writer and clear the buffer.
    pub fn drain_to(&mut self, w: &mut impl io::Write) -> io::Result<()> {
        for line in self.lines.drain(..) {
            w.write_all(line.as_bytes())?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Issues the label ids used by short-circuit and conditional lowering.
/// These live in their own numbering space; construct labels come from
/// the front half through header records.
#[derive(Debug, Default)]
pub struct LabelSeq {
    next: u16,
}

impl LabelSeq {
    pub fn new() -> LabelSeq {
        LabelSeq::default()
    }

    pub fn take(&mut self) -> u16 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Everything expression lowering needs, threaded explicitly. The
/// backend stays a separate argument so hooks can re-enter `lower`
/// with themselves as the backend.
pub struct Codegen<'a> {
    pub arena: &'a mut NodeArena,
    pub asm: &'a mut Asm,
    pub state: &'a mut crate::target::FuncState,
    pub names: &'a mut dyn NameSource,
    pub labels: &'a mut LabelSeq,
}

impl Codegen<'_> {
    /// Copy out a node. `Node` is small and `Copy`; working on copies
    /// keeps the arena borrows short.
    pub fn node(&self, id: NodeId) -> Node {
        *self.arena.node(id)
    }

    pub fn name(&mut self, sym: SymId) -> CodegenResult<String> {
        self.names.name(sym)
    }
}
