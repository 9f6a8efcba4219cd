//! Stream driver: reads the record stream, holds the per-function and
//! segment state, and turns statement headers into the label and jump
//! fabric around lowered expressions.

use std::io::{Read, Write};

use log::debug;

use crate::codegen::{lower, rewrite, Asm, Codegen, LabelSeq};
use crate::error::{CodegenError, CodegenResult};
use crate::node::{NodeArena, Op, DEFAULT_NODE_CAPACITY};
use crate::record::{Block, Header, HeaderKind, RecordReader, FOOTER_BIT};
use crate::symtab::NameSource;
use crate::target::{Backend, FuncState, Segment};
use crate::types::Ty;

/// Deepest data/literal nesting the segment stack allows.
const SEG_STACK_MAX: usize = 16;

/// Segment save stack. Literals and switch tables interrupt whatever
/// section is open; pushing remembers it, popping restores it, and a
/// directive goes out only when the active section really changes.
struct SegStack {
    saved: Vec<Option<Segment>>,
    active: Option<Segment>,
}

impl SegStack {
    fn new() -> SegStack {
        SegStack {
            saved: Vec::new(),
            active: None,
        }
    }

    fn push(&mut self, be: &mut dyn Backend, out: &mut Asm, seg: Segment) -> CodegenResult<()> {
        if self.saved.len() == SEG_STACK_MAX {
            return Err(CodegenError::SegmentOverflow);
        }
        self.saved.push(self.active);
        if self.active != Some(seg) {
            be.segment(out, seg);
            self.active = Some(seg);
        }
        Ok(())
    }

    fn pop(&mut self, be: &mut dyn Backend, out: &mut Asm) -> CodegenResult<()> {
        let Some(prev) = self.saved.pop() else {
            return Err(CodegenError::SegmentUnderflow);
        };
        // The outermost pop restores "nothing" and needs no directive.
        if !self.saved.is_empty() {
            if let Some(seg) = prev {
                if self.active != Some(seg) {
                    be.segment(out, seg);
                    self.active = Some(seg);
                }
            }
        }
        Ok(())
    }
}

/// Open looping constructs, tracked so a continue record can pick the
/// right label tail for its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Construct {
    For,
    While,
    Do,
}

impl Construct {
    fn continue_tail(self) -> &'static str {
        match self {
            // A while loop re-tests at its condition label; for and do
            // have a dedicated continue point.
            Construct::While => "_cond",
            Construct::For | Construct::Do => "_continue",
        }
    }
}

pub struct Driver<R: Read, W: Write> {
    records: RecordReader<R>,
    out: W,
    be: Box<dyn Backend>,
    names: Box<dyn NameSource>,
    arena: NodeArena,
    asm: Asm,
    state: FuncState,
    labels: LabelSeq,
    segs: SegStack,
    loops: Vec<(u16, Construct)>,
}

impl<R: Read, W: Write> Driver<R, W> {
    pub fn new(
        input: R,
        out: W,
        be: Box<dyn Backend>,
        names: Box<dyn NameSource>,
    ) -> Driver<R, W> {
        Driver {
            records: RecordReader::new(input),
            out,
            be,
            names,
            arena: NodeArena::with_capacity(DEFAULT_NODE_CAPACITY),
            asm: Asm::new(),
            state: FuncState::new(),
            labels: LabelSeq::new(),
            segs: SegStack::new(),
            loops: Vec::new(),
        }
    }

    /// Translate the whole record stream to assembly text.
    pub fn run(&mut self) -> CodegenResult<()> {
        self.be.file_begin(&mut self.asm);
        self.asm.drain_to(&mut self.out)?;
        while let Some(block) = self.records.next_block()? {
            self.process_block(block)?;
            self.asm.drain_to(&mut self.out)?;
        }
        self.be.file_end(&mut self.asm);
        self.asm.drain_to(&mut self.out)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn process_block(&mut self, block: Block) -> CodegenResult<()> {
        match block {
            Block::Expr => {
                self.process_expression()?;
                Ok(())
            }
            Block::Header(h) => self.process_header(h),
            Block::Data => self.process_data(),
        }
    }

    /// Run blocks up to and including the next expression and return
    /// that expression's type. String literals referenced from inside
    /// an expression arrive as blocks just before it.
    fn compile_expression(&mut self) -> CodegenResult<Ty> {
        loop {
            match self.records.next_block()? {
                None => return Err(CodegenError::ShortRead),
                Some(Block::Expr) => return self.process_expression(),
                Some(Block::Header(h)) => self.process_header(h)?,
                Some(Block::Data) => self.process_data()?,
            }
        }
    }

    fn process_expression(&mut self) -> CodegenResult<Ty> {
        let root = self.records.read_tree(&mut self.arena)?;
        let root = rewrite(self.be.as_ref(), &self.state, &mut self.arena, root)?;
        {
            let mut cg = Codegen {
                arena: &mut self.arena,
                asm: &mut self.asm,
                state: &mut self.state,
                names: self.names.as_mut(),
                labels: &mut self.labels,
            };
            lower(self.be.as_mut(), &mut cg, root)?;
        }
        self.be.stmt_end(&mut self.asm);
        let ty = self.arena.node(root).ty;
        self.arena.release_tree(root);
        Ok(ty)
    }

    /// Data records are single-node trees describing one emission each.
    fn process_data(&mut self) -> CodegenResult<()> {
        let root = self.records.read_tree(&mut self.arena)?;
        let n = *self.arena.node(root);
        match n.op {
            Op::Pad => self.be.space(&mut self.asm, n.value),
            Op::Label => self.be.text_ref(&mut self.asm, n.value as u16),
            Op::Name => {
                let name = self.names.name(n.sym)?;
                self.be.name_ref(&mut self.asm, &name, n.value);
            }
            Op::CaseLabel => self
                .be
                .case_ref(&mut self.asm, n.value as u16, n.val2 as u16),
            _ => self.be.value(&mut self.asm, n.ty, n.value)?,
        }
        self.arena.release_tree(root);
        Ok(())
    }

    fn emit_label(&mut self, tail: &str, id: u16) {
        self.be.label(&mut self.asm, tail, id);
        self.state.unreachable = false;
    }

    fn emit_jump(&mut self, tail: &str, id: u16) {
        self.be.jump(&mut self.asm, tail, id);
        self.state.unreachable = true;
    }

    fn continue_tail(&self, id: u16) -> CodegenResult<&'static str> {
        self.loops
            .iter()
            .rev()
            .find(|(open, _)| *open == id)
            .map(|(_, c)| c.continue_tail())
            .ok_or(CodegenError::LoopContext { id })
    }

    fn process_header(&mut self, h: Header) -> CodegenResult<()> {
        debug!(
            "header {:?}{} name={} data={}",
            h.kind,
            if h.footer { " footer" } else { "" },
            h.name,
            h.data
        );
        match (h.kind, h.footer) {
            (HeaderKind::Export, false) => {
                let name = self.names.name(h.name)?;
                self.be.export(&mut self.asm, &name);
            }
            (HeaderKind::Function, false) => {
                self.segs
                    .push(self.be.as_mut(), &mut self.asm, Segment::Code)?;
                let name = self.names.name(h.data)?;
                self.state.reset(h.name);
                self.be.prologue(&mut self.asm, &name);
            }
            (HeaderKind::Function, true) => {
                if self.state.ret_used {
                    self.emit_label("_ret", h.name);
                }
                if self.state.sp != 0 {
                    return Err(CodegenError::StackImbalance { sp: self.state.sp });
                }
                let frame = self.state.frame;
                self.be.epilogue(&mut self.asm, frame);
                self.state.unreachable = true;
                self.segs.pop(self.be.as_mut(), &mut self.asm)?;
            }
            (HeaderKind::Frame, false) => {
                self.state.frame = h.name;
                self.be.frame(&mut self.asm, h.name);
            }

            (HeaderKind::For, false) => {
                self.loops.push((h.data, Construct::For));
                self.compile_expression()?;
                self.emit_label("_cond", h.data);
                self.compile_expression()?;
                self.be.jump_if_false(&mut self.asm, "_break", h.data);
                self.emit_jump("_body", h.data);
                self.emit_label("_continue", h.data);
                self.compile_expression()?;
                self.emit_jump("_cond", h.data);
                self.emit_label("_body", h.data);
            }
            (HeaderKind::For, true) => {
                self.emit_jump("_continue", h.data);
                self.emit_label("_break", h.data);
                self.loops.pop();
            }
            (HeaderKind::While, false) => {
                self.loops.push((h.data, Construct::While));
                self.emit_label("_cond", h.data);
                self.compile_expression()?;
                self.be.jump_if_false(&mut self.asm, "_break", h.data);
            }
            (HeaderKind::While, true) => {
                self.emit_jump("_cond", h.data);
                self.emit_label("_break", h.data);
                self.loops.pop();
            }
            (HeaderKind::Do, false) => {
                self.loops.push((h.data, Construct::Do));
                self.emit_label("_continue", h.data);
            }
            (HeaderKind::DoWhile, false) => {
                self.compile_expression()?;
                self.be.jump_if_true(&mut self.asm, "_continue", h.data);
            }
            (HeaderKind::Do, true) => {
                self.emit_jump("_continue", h.data);
                self.emit_label("_break", h.data);
                self.loops.pop();
            }

            (HeaderKind::Break, false) => self.emit_jump("_break", h.name),
            (HeaderKind::Continue, false) => {
                let tail = self.continue_tail(h.name)?;
                self.emit_jump(tail, h.name);
            }

            (HeaderKind::If, false) => {
                self.compile_expression()?;
                self.be.jump_if_false(&mut self.asm, "_else", h.name);
            }
            (HeaderKind::Else, false) => {
                self.emit_jump("_end", h.name);
                self.emit_label("_else", h.name);
            }
            (HeaderKind::If, true) => {
                // With an else arm the end label is pending, without
                // one the else label still needs placing.
                if h.data != 0 {
                    self.emit_label("_end", h.name);
                } else {
                    self.emit_label("_else", h.name);
                }
            }

            (HeaderKind::Return, false) => self.state.ret_used = true,
            (HeaderKind::Return, true) => {
                let ret = self.state.ret_label;
                self.emit_jump("_ret", ret);
            }
            (HeaderKind::Label, false) => self.emit_label("", h.name),
            (HeaderKind::Goto, false) => self.emit_jump("", h.name),

            (HeaderKind::Switch, false) => {
                let ty = self.compile_expression()?;
                self.be.switch_dispatch(&mut self.asm, h.name, ty);
                self.state.unreachable = true;
            }
            (HeaderKind::Case, false) => {
                self.be.case_label(&mut self.asm, h.name, h.data);
                self.state.unreachable = false;
            }
            (HeaderKind::Default, false) => {
                self.be.case_label(&mut self.asm, h.name, 0);
                self.state.unreachable = false;
            }
            (HeaderKind::Switch, true) => self.emit_label("_break", h.data),
            (HeaderKind::SwitchTab, false) => {
                self.segs
                    .push(self.be.as_mut(), &mut self.asm, Segment::Literal)?;
                self.be.switch_table(&mut self.asm, h.name, h.data);
            }
            (HeaderKind::SwitchTab, true) => self.segs.pop(self.be.as_mut(), &mut self.asm)?,

            (HeaderKind::Data, false) => {
                self.segs
                    .push(self.be.as_mut(), &mut self.asm, Segment::Data)?;
                let name = self.names.name(h.name)?;
                self.be.data_label(&mut self.asm, &name, h.data);
            }
            (HeaderKind::Data, true) => self.segs.pop(self.be.as_mut(), &mut self.asm)?,
            (HeaderKind::Bss, false) => {
                self.segs
                    .push(self.be.as_mut(), &mut self.asm, Segment::Bss)?;
                let name = self.names.name(h.name)?;
                self.be.data_label(&mut self.asm, &name, h.data);
            }
            (HeaderKind::Bss, true) => self.segs.pop(self.be.as_mut(), &mut self.asm)?,
            (HeaderKind::String, false) => {
                self.segs
                    .push(self.be.as_mut(), &mut self.asm, Segment::Literal)?;
                self.be.literal_label(&mut self.asm, h.name);
                let mut bytes = Vec::new();
                self.records.read_literal(|b| bytes.push(b))?;
                for b in bytes {
                    self.be.value(&mut self.asm, Ty::UCHAR, b as u32)?;
                }
            }
            (HeaderKind::String, true) => self.segs.pop(self.be.as_mut(), &mut self.asm)?,

            _ => {
                let mut raw = h.kind.to_wire();
                if h.footer {
                    raw |= FOOTER_BIT;
                }
                return Err(CodegenError::UnknownHeader { kind: raw });
            }
        }
        Ok(())
    }
}
