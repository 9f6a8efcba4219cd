//! Expression tree nodes and the fixed-capacity arena they live in.
//!
//! Trees are built per statement and torn down before the next record is
//! read, so the arena is sized for one statement's worth of nodes and
//! recycles slots through a free list. Exhaustion means the input is
//! beyond the configured limit and is reported as a fatal error rather
//! than grown silently.

use crate::error::{CodegenError, CodegenResult};
use crate::types::{SymId, Ty};

/// Operator tag. Single-character C operators keep their ASCII value on
/// the wire; everything else sits in a block above 0x100. The `*Ref`,
/// `*Store` and `CallName` forms never come out of the expression
/// builder; the rewrite pass synthesizes them when a backend claims the
/// addressing idiom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Null,
    // Binary arithmetic and bitwise.
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    And,
    Or,
    Hat,
    LtLt,
    GtGt,
    // Comparison.
    EqEq,
    BangEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    // Short-circuit and conditional.
    OrOr,
    AndAnd,
    Question,
    Colon,
    // Assignment.
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    ShlEq,
    ShrEq,
    AndEq,
    OrEq,
    HatEq,
    PlusPlus,
    MinusMinus,
    // Unary.
    Bang,
    Tilde,
    Negate,
    Deref,
    Bool,
    Cast,
    // Leaves.
    Constant,
    Name,
    Local,
    Argument,
    Label,
    Reg,
    // Data-record leaves; never seen inside an expression tree.
    Pad,
    CaseLabel,
    // Calls and sequencing.
    FuncCall,
    Cleanup,
    Comma,
    ArgComma,
    // Rewrite-specialized forms.
    NameRef,
    NameStore,
    LocalRef,
    LocalStore,
    LabelRef,
    LabelStore,
    RegRef,
    RegStore,
    CallName,
}

impl Op {
    pub fn to_wire(self) -> u16 {
        match self {
            Op::Plus => b'+' as u16,
            Op::Minus => b'-' as u16,
            Op::Star => b'*' as u16,
            Op::Slash => b'/' as u16,
            Op::Percent => b'%' as u16,
            Op::And => b'&' as u16,
            Op::Or => b'|' as u16,
            Op::Hat => b'^' as u16,
            Op::Lt => b'<' as u16,
            Op::Gt => b'>' as u16,
            Op::Bang => b'!' as u16,
            Op::Tilde => b'~' as u16,
            Op::Eq => b'=' as u16,
            Op::Question => b'?' as u16,
            Op::Colon => b':' as u16,
            Op::Comma => b',' as u16,
            Op::Null => 0x0100,
            Op::ShlEq => 0x0101,
            Op::ShrEq => 0x0102,
            Op::PlusPlus => 0x0103,
            Op::MinusMinus => 0x0104,
            Op::EqEq => 0x0105,
            Op::LtLt => 0x0106,
            Op::GtGt => 0x0107,
            Op::OrOr => 0x0108,
            Op::AndAnd => 0x0109,
            Op::PlusEq => 0x010A,
            Op::MinusEq => 0x010B,
            Op::SlashEq => 0x010C,
            Op::StarEq => 0x010D,
            Op::HatEq => 0x010E,
            Op::BangEq => 0x010F,
            Op::OrEq => 0x0110,
            Op::AndEq => 0x0111,
            Op::PercentEq => 0x0112,
            Op::LtEq => 0x0113,
            Op::GtEq => 0x0114,
            Op::Negate => 0x0115,
            Op::Deref => 0x0116,
            Op::FuncCall => 0x0117,
            Op::Cleanup => 0x0118,
            Op::Label => 0x0119,
            Op::Cast => 0x011A,
            Op::Constant => 0x011B,
            Op::ArgComma => 0x011C,
            Op::Bool => 0x011D,
            Op::Name => 0x011E,
            Op::Local => 0x011F,
            Op::Argument => 0x0120,
            Op::Pad => 0x0121,
            Op::CaseLabel => 0x0122,
            Op::Reg => 0x0123,
            Op::NameRef => 0x0130,
            Op::NameStore => 0x0131,
            Op::LocalRef => 0x0132,
            Op::LocalStore => 0x0133,
            Op::LabelRef => 0x0134,
            Op::LabelStore => 0x0135,
            Op::RegRef => 0x0136,
            Op::RegStore => 0x0137,
            Op::CallName => 0x0138,
        }
    }

    pub fn from_wire(w: u16) -> CodegenResult<Op> {
        ALL_OPS
            .iter()
            .copied()
            .find(|op| op.to_wire() == w)
            .ok_or(CodegenError::UnknownOp { op: w })
    }
}

/// Every operator, in wire-code order within each block. Drives decode
/// and the codec tests.
pub const ALL_OPS: &[Op] = &[
    Op::Null,
    Op::Plus,
    Op::Minus,
    Op::Star,
    Op::Slash,
    Op::Percent,
    Op::And,
    Op::Or,
    Op::Hat,
    Op::LtLt,
    Op::GtGt,
    Op::EqEq,
    Op::BangEq,
    Op::Lt,
    Op::Gt,
    Op::LtEq,
    Op::GtEq,
    Op::OrOr,
    Op::AndAnd,
    Op::Question,
    Op::Colon,
    Op::Eq,
    Op::PlusEq,
    Op::MinusEq,
    Op::StarEq,
    Op::SlashEq,
    Op::PercentEq,
    Op::ShlEq,
    Op::ShrEq,
    Op::AndEq,
    Op::OrEq,
    Op::HatEq,
    Op::PlusPlus,
    Op::MinusMinus,
    Op::Bang,
    Op::Tilde,
    Op::Negate,
    Op::Deref,
    Op::Bool,
    Op::Cast,
    Op::Constant,
    Op::Name,
    Op::Local,
    Op::Argument,
    Op::Pad,
    Op::CaseLabel,
    Op::Reg,
    Op::Label,
    Op::FuncCall,
    Op::Cleanup,
    Op::Comma,
    Op::ArgComma,
    Op::NameRef,
    Op::NameStore,
    Op::LocalRef,
    Op::LocalStore,
    Op::LabelRef,
    Op::LabelStore,
    Op::RegRef,
    Op::RegStore,
    Op::CallName,
];

/// Per-node flag bits, mirrored on the wire as a single byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeFlags(u8);

impl NodeFlags {
    /// Node designates a storage location; the tree below it computes
    /// the address, not the value.
    pub const LVAL: NodeFlags = NodeFlags(0x01);
    /// Result is discarded; stores may skip producing a value.
    pub const NORETURN: NodeFlags = NodeFlags(0x02);
    /// Value is already normalized to 0/1.
    pub const ISBOOL: NodeFlags = NodeFlags(0x04);

    pub const fn empty() -> NodeFlags {
        NodeFlags(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> NodeFlags {
        NodeFlags(bits & 0x07)
    }

    pub const fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = NodeFlags;
    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

/// Arena handle. Only ever minted by `NodeArena::acquire`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One expression tree node. Children are exclusively owned by their
/// parent; nothing else may hold their ids across a release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub op: Op,
    pub ty: Ty,
    pub flags: NodeFlags,
    pub sym: SymId,
    pub value: u32,
    pub val2: u32,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
}

impl Node {
    pub fn blank() -> Node {
        Node {
            op: Op::Null,
            ty: Ty::VOID,
            flags: NodeFlags::empty(),
            sym: 0,
            value: 0,
            val2: 0,
            left: None,
            right: None,
        }
    }

    pub fn is_lval(&self) -> bool {
        self.flags.contains(NodeFlags::LVAL)
    }

    pub fn is_constant(&self) -> bool {
        self.op == Op::Constant
    }
}

/// Fixed-capacity node pool with free-list recycling.
pub struct NodeArena {
    slots: Vec<Node>,
    free: Vec<NodeId>,
    capacity: usize,
}

pub const DEFAULT_NODE_CAPACITY: usize = 100;

impl NodeArena {
    pub fn with_capacity(capacity: usize) -> NodeArena {
        NodeArena {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Nodes currently held by callers.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Hand out a blank node. Recycled slots are re-blanked so no state
    /// leaks from a previous tree.
    pub fn acquire(&mut self) -> CodegenResult<NodeId> {
        if let Some(id) = self.free.pop() {
            self.slots[id.index()] = Node::blank();
            return Ok(id);
        }
        if self.slots.len() >= self.capacity {
            return Err(CodegenError::OutOfNodes { capacity: self.capacity });
        }
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Node::blank());
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.slots[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.slots[id.index()]
    }

    /// Return one slot to the pool. The children, if any, stay live;
    /// use `release_tree` to drop a whole subtree.
    pub fn release(&mut self, id: NodeId) {
        debug_assert!(
            !self.free.contains(&id),
            "node {} released twice",
            id.0
        );
        self.free.push(id);
    }

    /// Recursively release a tree, returning how many nodes went back.
    pub fn release_tree(&mut self, id: NodeId) -> usize {
        let node = self.slots[id.index()];
        let mut count = 1;
        if let Some(l) = node.left {
            count += self.release_tree(l);
        }
        if let Some(r) = node.right {
            count += self.release_tree(r);
        }
        self.release(id);
        count
    }
}
