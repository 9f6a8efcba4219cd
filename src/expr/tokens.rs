//! Resolved-token interface between the front half and the builder.
//!
//! The builder never sees raw source. Names arrive already resolved to
//! their storage class, type and (through the type) prototype, so the
//! stream is a thin seam: anything that can produce `Token`s can drive
//! expression construction, including tests.

use crate::span::Spanned;
use crate::types::{SymId, Ty};

// ─── Storage ───────────────────────────────────────────────────────

/// Where a resolved name lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    /// Static or external storage, addressed by symbol.
    Static,
    /// Automatic variable at a byte offset within the frame.
    Local { offset: u32 },
    /// Incoming argument at a byte offset from the argument base.
    Argument { offset: u32 },
    /// Register variable, by target register index.
    Register { index: u32 },
}

// ─── Tokens ────────────────────────────────────────────────────────

/// One resolved token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    /// A name resolved against the scope.
    Symbol { id: SymId, ty: Ty, storage: Storage },
    /// An integer constant, value already reduced to its type's width.
    IntConst { value: u32, ty: Ty },
    /// A string literal, referenced by the label it was emitted under.
    StrLit { label: u16 },
    /// A type name, as appears inside a cast.
    TypeName { ty: Ty },
    /// A bare identifier. Member names after `.` and `->` resolve
    /// against the record type, not the scope, so they arrive unresolved.
    Ident { id: SymId },
    Punct(Punct),
    Eof,
}

impl Token {
    pub fn description(self) -> &'static str {
        match self {
            Token::Symbol { .. } => "name",
            Token::IntConst { .. } => "constant",
            Token::StrLit { .. } => "string literal",
            Token::TypeName { .. } => "type name",
            Token::Ident { .. } => "identifier",
            Token::Punct(p) => p.description(),
            Token::Eof => "end of input",
        }
    }
}

/// Operator and delimiter tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Punct {
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
    EqEq,
    BangEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    OrOr,
    AndAnd,
    Question,
    Colon,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AndEq,
    OrEq,
    HatEq,
    LtLtEq,
    GtGtEq,
    PlusPlus,
    MinusMinus,
    Bang,
    Tilde,
    Comma,
    Semicolon,
    LParen,
    RParen,
    LSquare,
    RSquare,
    Dot,
    Arrow,
}

impl Punct {
    pub fn description(self) -> &'static str {
        match self {
            Punct::Plus => "'+'",
            Punct::Minus => "'-'",
            Punct::Star => "'*'",
            Punct::Slash => "'/'",
            Punct::Percent => "'%'",
            Punct::And => "'&'",
            Punct::Or => "'|'",
            Punct::Hat => "'^'",
            Punct::LtLt => "'<<'",
            Punct::GtGt => "'>>'",
            Punct::EqEq => "'=='",
            Punct::BangEq => "'!='",
            Punct::Lt => "'<'",
            Punct::Gt => "'>'",
            Punct::LtEq => "'<='",
            Punct::GtEq => "'>='",
            Punct::OrOr => "'||'",
            Punct::AndAnd => "'&&'",
            Punct::Question => "'?'",
            Punct::Colon => "':'",
            Punct::Eq => "'='",
            Punct::PlusEq => "'+='",
            Punct::MinusEq => "'-='",
            Punct::StarEq => "'*='",
            Punct::SlashEq => "'/='",
            Punct::PercentEq => "'%='",
            Punct::AndEq => "'&='",
            Punct::OrEq => "'|='",
            Punct::HatEq => "'^='",
            Punct::LtLtEq => "'<<='",
            Punct::GtGtEq => "'>>='",
            Punct::PlusPlus => "'++'",
            Punct::MinusMinus => "'--'",
            Punct::Bang => "'!'",
            Punct::Tilde => "'~'",
            Punct::Comma => "','",
            Punct::Semicolon => "';'",
            Punct::LParen => "'('",
            Punct::RParen => "')'",
            Punct::LSquare => "'['",
            Punct::RSquare => "']'",
            Punct::Dot => "'.'",
            Punct::Arrow => "'->'",
        }
    }
}

// ─── Streams ───────────────────────────────────────────────────────

/// Source of resolved tokens. Must return `Token::Eof` forever once the
/// input is exhausted.
pub trait TokenStream {
    fn next_token(&mut self) -> Spanned<Token>;
}

/// A fixed token sequence. Lets tests and embedding front ends hand the
/// builder pre-resolved tokens without a streaming lexer.
pub struct TokenBuffer {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

impl TokenBuffer {
    pub fn new(tokens: Vec<Spanned<Token>>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Wrap plain tokens with dummy spans.
    pub fn of(tokens: impl IntoIterator<Item = Token>) -> Self {
        Self::new(tokens.into_iter().map(Spanned::dummy).collect())
    }
}

impl TokenStream for TokenBuffer {
    fn next_token(&mut self) -> Spanned<Token> {
        match self.tokens.get(self.pos) {
            Some(t) => {
                self.pos += 1;
                t.clone()
            }
            None => Spanned::dummy(Token::Eof),
        }
    }
}
