//! The record stream protocol between the two compiler halves.
//!
//! Every unit on the stream is framed by a sync byte and a tag byte so a
//! desync is caught at the next boundary instead of corrupting output
//! silently. Three record kinds exist: expression trees (preorder,
//! fixed-size node records), headers (control-flow and segment events)
//! and data records (one-node trees carrying initializer words). String
//! literal bytes follow their header raw, with a quoting scheme for the
//! terminator byte.

use std::io::{Read, Write};

use crate::error::{CodegenError, CodegenResult};
use crate::node::{Node, NodeArena, NodeFlags, NodeId, Op};
use crate::types::Ty;

pub const SYNC: u8 = b'%';
pub const TAG_EXPR: u8 = b'^';
pub const TAG_HEADER: u8 = b'H';
pub const TAG_DATA: u8 = b'[';

/// Size of one encoded tree node on the stream.
pub const NODE_RECORD_LEN: usize = 16;
/// Size of an encoded header after the sync pair.
pub const HEADER_LEN: usize = 6;

pub const FOOTER_BIT: u16 = 0x8000;
const KID_LEFT: u8 = 0x01;
const KID_RIGHT: u8 = 0x02;

/// Header event kinds. The footer bit is carried separately in
/// `Header::footer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderKind {
    Export,
    Function,
    Frame,
    For,
    While,
    Do,
    DoWhile,
    Break,
    Continue,
    If,
    Else,
    Return,
    Label,
    Goto,
    Switch,
    Case,
    Default,
    SwitchTab,
    Data,
    Bss,
    String,
}

impl HeaderKind {
    pub fn to_wire(self) -> u16 {
        match self {
            HeaderKind::Export => 1,
            HeaderKind::Function => 2,
            HeaderKind::Frame => 3,
            HeaderKind::For => 4,
            HeaderKind::While => 5,
            HeaderKind::Do => 6,
            HeaderKind::DoWhile => 7,
            HeaderKind::Break => 8,
            HeaderKind::Continue => 9,
            HeaderKind::If => 10,
            HeaderKind::Else => 11,
            HeaderKind::Return => 12,
            HeaderKind::Label => 13,
            HeaderKind::Goto => 14,
            HeaderKind::Switch => 15,
            HeaderKind::Case => 16,
            HeaderKind::Default => 17,
            HeaderKind::SwitchTab => 18,
            HeaderKind::Data => 19,
            HeaderKind::Bss => 20,
            HeaderKind::String => 21,
        }
    }

    pub fn from_wire(w: u16) -> CodegenResult<HeaderKind> {
        Ok(match w {
            1 => HeaderKind::Export,
            2 => HeaderKind::Function,
            3 => HeaderKind::Frame,
            4 => HeaderKind::For,
            5 => HeaderKind::While,
            6 => HeaderKind::Do,
            7 => HeaderKind::DoWhile,
            8 => HeaderKind::Break,
            9 => HeaderKind::Continue,
            10 => HeaderKind::If,
            11 => HeaderKind::Else,
            12 => HeaderKind::Return,
            13 => HeaderKind::Label,
            14 => HeaderKind::Goto,
            15 => HeaderKind::Switch,
            16 => HeaderKind::Case,
            17 => HeaderKind::Default,
            18 => HeaderKind::SwitchTab,
            19 => HeaderKind::Data,
            20 => HeaderKind::Bss,
            21 => HeaderKind::String,
            _ => return Err(CodegenError::UnknownHeader { kind: w }),
        })
    }
}

/// One decoded header record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub kind: HeaderKind,
    pub footer: bool,
    pub name: u16,
    pub data: u16,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut kind = self.kind.to_wire();
        if self.footer {
            kind |= FOOTER_BIT;
        }
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&kind.to_le_bytes());
        out[2..4].copy_from_slice(&self.name.to_le_bytes());
        out[4..6].copy_from_slice(&self.data.to_le_bytes());
        out
    }

    pub fn decode(raw: &[u8; HEADER_LEN]) -> CodegenResult<Header> {
        let kind = u16::from_le_bytes([raw[0], raw[1]]);
        Ok(Header {
            kind: HeaderKind::from_wire(kind & !FOOTER_BIT)?,
            footer: kind & FOOTER_BIT != 0,
            name: u16::from_le_bytes([raw[2], raw[3]]),
            data: u16::from_le_bytes([raw[4], raw[5]]),
        })
    }
}

fn encode_node(n: &Node) -> [u8; NODE_RECORD_LEN] {
    let mut out = [0u8; NODE_RECORD_LEN];
    out[0..2].copy_from_slice(&n.op.to_wire().to_le_bytes());
    out[2..4].copy_from_slice(&n.ty.to_wire().to_le_bytes());
    out[4] = n.flags.bits();
    out[5..7].copy_from_slice(&n.sym.to_le_bytes());
    out[7..11].copy_from_slice(&n.value.to_le_bytes());
    out[11..15].copy_from_slice(&n.val2.to_le_bytes());
    let mut kids = 0;
    if n.left.is_some() {
        kids |= KID_LEFT;
    }
    if n.right.is_some() {
        kids |= KID_RIGHT;
    }
    out[15] = kids;
    out
}

/// What follows a sync pair.
#[derive(Debug)]
pub enum Block {
    Expr,
    Header(Header),
    Data,
}

/// Read side of the protocol. Owns nothing but the input handle; trees
/// land in the arena the caller passes in.
pub struct RecordReader<R: Read> {
    inner: R,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> RecordReader<R> {
        RecordReader { inner }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> CodegenResult<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CodegenError::ShortRead
            } else {
                CodegenError::Io(e)
            }
        })
    }

    /// Read the next sync pair. `None` means clean end of stream; an EOF
    /// in the middle of a pair is a short read.
    pub fn next_block(&mut self) -> CodegenResult<Option<Block>> {
        let mut sync = [0u8; 1];
        match self.inner.read(&mut sync)? {
            0 => return Ok(None),
            _ => {}
        }
        if sync[0] != SYNC {
            return Err(CodegenError::Sync { byte: sync[0] });
        }
        let mut tag = [0u8; 1];
        self.read_exact(&mut tag)?;
        match tag[0] {
            TAG_EXPR => Ok(Some(Block::Expr)),
            TAG_DATA => Ok(Some(Block::Data)),
            TAG_HEADER => {
                let mut raw = [0u8; HEADER_LEN];
                self.read_exact(&mut raw)?;
                Ok(Some(Block::Header(Header::decode(&raw)?)))
            }
            t => Err(CodegenError::UnknownBlock { tag: t }),
        }
    }

    /// Decode one preorder tree into the arena, returning the root.
    pub fn read_tree(&mut self, arena: &mut NodeArena) -> CodegenResult<NodeId> {
        let mut raw = [0u8; NODE_RECORD_LEN];
        self.read_exact(&mut raw)?;
        let op = Op::from_wire(u16::from_le_bytes([raw[0], raw[1]]))?;
        let ty_raw = u16::from_le_bytes([raw[2], raw[3]]);
        let ty = Ty::from_wire(ty_raw).ok_or(CodegenError::UnknownType { raw: ty_raw })?;
        let id = arena.acquire()?;
        {
            let n = arena.node_mut(id);
            n.op = op;
            n.ty = ty;
            n.flags = NodeFlags::from_bits(raw[4]);
            n.sym = u16::from_le_bytes([raw[5], raw[6]]);
            n.value = u32::from_le_bytes([raw[7], raw[8], raw[9], raw[10]]);
            n.val2 = u32::from_le_bytes([raw[11], raw[12], raw[13], raw[14]]);
        }
        let kids = raw[15];
        if kids & KID_LEFT != 0 {
            let left = self.read_tree(arena)?;
            arena.node_mut(id).left = Some(left);
        }
        if kids & KID_RIGHT != 0 {
            let right = self.read_tree(arena)?;
            arena.node_mut(id).right = Some(right);
        }
        Ok(id)
    }

    /// Decode string-literal bytes up to the terminator. A 0xFF quote
    /// byte shifts the decoder: 0xFE then means a literal zero, anything
    /// else passes through unchanged. A bare zero ends the run even when
    /// the decoder is shifted.
    pub fn read_literal(&mut self, mut sink: impl FnMut(u8)) -> CodegenResult<()> {
        let mut shifted = false;
        loop {
            let mut c = [0u8; 1];
            self.read_exact(&mut c)?;
            let mut c = c[0];
            if c == 0 {
                return Ok(());
            }
            if c == 0xFF && !shifted {
                shifted = true;
                continue;
            }
            if shifted && c == 0xFE {
                c = 0;
            }
            shifted = false;
            sink(c);
        }
    }
}

/// Write side of the protocol, used by front halves and test harnesses.
pub struct RecordWriter<W: Write> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> RecordWriter<W> {
        RecordWriter { inner }
    }

    pub fn header(&mut self, kind: HeaderKind, name: u16, data: u16) -> CodegenResult<()> {
        self.write_header(Header { kind, footer: false, name, data })
    }

    pub fn footer(&mut self, kind: HeaderKind, name: u16, data: u16) -> CodegenResult<()> {
        self.write_header(Header { kind, footer: true, name, data })
    }

    fn write_header(&mut self, h: Header) -> CodegenResult<()> {
        self.inner.write_all(&[SYNC, TAG_HEADER])?;
        self.inner.write_all(&h.encode())?;
        Ok(())
    }

    /// Emit a full expression record for the given tree.
    pub fn expr_tree(&mut self, arena: &NodeArena, root: NodeId) -> CodegenResult<()> {
        self.inner.write_all(&[SYNC, TAG_EXPR])?;
        self.write_tree(arena, root)
    }

    /// Emit a data record. Data trees are single nodes today but the
    /// encoding does not care.
    pub fn data_node(&mut self, arena: &NodeArena, root: NodeId) -> CodegenResult<()> {
        self.inner.write_all(&[SYNC, TAG_DATA])?;
        self.write_tree(arena, root)
    }

    fn write_tree(&mut self, arena: &NodeArena, id: NodeId) -> CodegenResult<()> {
        let n = *arena.node(id);
        self.inner.write_all(&encode_node(&n))?;
        if let Some(l) = n.left {
            self.write_tree(arena, l)?;
        }
        if let Some(r) = n.right {
            self.write_tree(arena, r)?;
        }
        Ok(())
    }

    /// Emit the quoted byte run that follows a string header.
    pub fn literal(&mut self, bytes: &[u8]) -> CodegenResult<()> {
        for &b in bytes {
            match b {
                0x00 => self.inner.write_all(&[0xFF, 0xFE])?,
                0xFF => self.inner.write_all(&[0xFF, 0xFF])?,
                b => self.inner.write_all(&[b])?,
            }
        }
        self.inner.write_all(&[0x00])?;
        Ok(())
    }

    pub fn flush(&mut self) -> CodegenResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
