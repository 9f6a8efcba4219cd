//! Type tags carried on tree nodes.
//!
//! A `Ty` is a base kind plus a pointer-indirection depth. The lvalue
//! rewrite raises the depth by one, dereference lowers it by one, so the
//! depth moves have to be cheap and total. Signedness is part of the base
//! kind; the helper namer and the cast-elision rule both key off it.

use std::fmt;

/// Symbol ids as issued by the front end. Resolved to text only at
/// emission time through a `NameSource`.
pub type SymId = u16;

/// Index into the prototype table of a `TypeStore`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtoId(pub u16);

/// Index into the aggregate-layout table of a `TypeStore`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecId(pub u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Base {
    Void,
    Char,
    UChar,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    Func(ProtoId),
    Record(RecId),
}

impl Base {
    fn wire_code(self) -> u16 {
        match self {
            Base::Void => 0,
            Base::Char => 1,
            Base::UChar => 2,
            Base::Int => 3,
            Base::UInt => 4,
            Base::Long => 5,
            Base::ULong => 6,
            Base::LongLong => 7,
            Base::ULongLong => 8,
            Base::Float => 9,
            Base::Double => 10,
            Base::Func(_) => 11,
            Base::Record(_) => 12,
        }
    }

    fn from_wire_code(code: u16) -> Option<Base> {
        Some(match code {
            0 => Base::Void,
            1 => Base::Char,
            2 => Base::UChar,
            3 => Base::Int,
            4 => Base::UInt,
            5 => Base::Long,
            6 => Base::ULong,
            7 => Base::LongLong,
            8 => Base::ULongLong,
            9 => Base::Float,
            10 => Base::Double,
            11 => Base::Func(ProtoId(0)),
            12 => Base::Record(RecId(0)),
            _ => return None,
        })
    }
}

/// A node type: base kind + pointer depth.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ty {
    pub base: Base,
    pub indir: u8,
}

impl Ty {
    pub const VOID: Ty = Ty { base: Base::Void, indir: 0 };
    pub const CHAR: Ty = Ty { base: Base::Char, indir: 0 };
    pub const UCHAR: Ty = Ty { base: Base::UChar, indir: 0 };
    pub const INT: Ty = Ty { base: Base::Int, indir: 0 };
    pub const UINT: Ty = Ty { base: Base::UInt, indir: 0 };
    pub const LONG: Ty = Ty { base: Base::Long, indir: 0 };
    pub const ULONG: Ty = Ty { base: Base::ULong, indir: 0 };
    pub const FLOAT: Ty = Ty { base: Base::Float, indir: 0 };
    pub const DOUBLE: Ty = Ty { base: Base::Double, indir: 0 };

    /// The canonical "pointer to something" type used where only the
    /// pointer-ness matters (cleanup sizes, decayed calls, helper names).
    pub const PTR: Ty = Ty { base: Base::Void, indir: 1 };

    pub const fn of(base: Base) -> Ty {
        Ty { base, indir: 0 }
    }

    pub const fn is_ptr(self) -> bool {
        self.indir > 0
    }

    /// One more level of indirection.
    pub fn ptr_to(self) -> Ty {
        Ty { base: self.base, indir: self.indir + 1 }
    }

    /// One less level of indirection, if there is one to remove.
    pub fn deref(self) -> Option<Ty> {
        if self.indir == 0 {
            None
        } else {
            Some(Ty { base: self.base, indir: self.indir - 1 })
        }
    }

    pub fn is_func(self) -> bool {
        self.indir == 0 && matches!(self.base, Base::Func(_))
    }

    pub fn is_func_ptr(self) -> bool {
        self.indir == 1 && matches!(self.base, Base::Func(_))
    }

    pub fn is_record(self) -> bool {
        self.indir == 0 && matches!(self.base, Base::Record(_))
    }

    /// Integer or floating, no indirection.
    pub fn is_arith(self) -> bool {
        if self.indir > 0 {
            return false;
        }
        matches!(
            self.base,
            Base::Char
                | Base::UChar
                | Base::Int
                | Base::UInt
                | Base::Long
                | Base::ULong
                | Base::LongLong
                | Base::ULongLong
                | Base::Float
                | Base::Double
        )
    }

    pub fn is_int_arith(self) -> bool {
        self.is_arith() && !self.is_float()
    }

    /// Arithmetic or pointer: anything with a truth value.
    pub fn is_scalar(self) -> bool {
        self.is_arith() || self.is_ptr()
    }

    pub fn is_float(self) -> bool {
        self.indir == 0 && matches!(self.base, Base::Float | Base::Double)
    }

    pub fn is_unsigned(self) -> bool {
        if self.indir > 0 {
            // Addresses compare and divide as unsigned quantities.
            return true;
        }
        matches!(
            self.base,
            Base::UChar | Base::UInt | Base::ULong | Base::ULongLong
        )
    }

    /// Same base width, opposite signedness.
    pub fn sign_twin(self) -> Option<Ty> {
        if self.indir > 0 {
            return None;
        }
        let base = match self.base {
            Base::Char => Base::UChar,
            Base::UChar => Base::Char,
            Base::Int => Base::UInt,
            Base::UInt => Base::Int,
            Base::Long => Base::ULong,
            Base::ULong => Base::Long,
            Base::LongLong => Base::ULongLong,
            Base::ULongLong => Base::LongLong,
            _ => return None,
        };
        Some(Ty::of(base))
    }

    /// True when the two differ at most in signedness. Cast elision keys
    /// off this: the bit pattern is identical either way.
    pub fn sign_only_differs(self, other: Ty) -> bool {
        self != other && Some(other) == self.sign_twin()
    }

    /// Implicit argument promotion for unprototyped and variadic tails:
    /// sub-int integers widen to int, float widens to double.
    pub fn promote(self) -> Ty {
        if self.indir > 0 {
            return self;
        }
        match self.base {
            Base::Char | Base::UChar => Ty::INT,
            Base::Float => Ty::DOUBLE,
            _ => self,
        }
    }

    fn arith_rank(self) -> u8 {
        match self.base {
            Base::Char | Base::UChar => 1,
            Base::Int | Base::UInt => 2,
            Base::Long | Base::ULong => 3,
            Base::LongLong | Base::ULongLong => 4,
            Base::Float => 5,
            Base::Double => 6,
            _ => 0,
        }
    }

    // ─── Wire codec ──────────────────────────────────────────────

    /// Pack into the 16-bit on-stream form: depth in the low nibble,
    /// base code above it. Prototype/aggregate identity does not cross
    /// the stream; the back half never needs it.
    pub fn to_wire(self) -> u16 {
        (self.base.wire_code() << 4) | (self.indir as u16 & 0x0F)
    }

    pub fn from_wire(w: u16) -> Option<Ty> {
        let base = Base::from_wire_code(w >> 4)?;
        Some(Ty { base, indir: (w & 0x0F) as u8 })
    }
}

/// The usual arithmetic conversions, after integer promotion. Both
/// operands must already be arithmetic.
pub fn unify_arith(a: Ty, b: Ty) -> Ty {
    if a.base == Base::Double || b.base == Base::Double {
        return Ty::DOUBLE;
    }
    if a.base == Base::Float || b.base == Base::Float {
        return Ty::FLOAT;
    }
    let a = a.promote();
    let b = b.promote();
    let (hi, lo) = if a.arith_rank() >= b.arith_rank() { (a, b) } else { (b, a) };
    if hi.arith_rank() > lo.arith_rank() {
        // The wider type holds every value of the narrower one on these
        // targets (16-bit int, 32-bit long), so only the wider type's
        // own signedness survives.
        return hi;
    }
    // Same rank: unsigned wins.
    if a.is_unsigned() || b.is_unsigned() {
        hi.sign_twin().filter(|t| t.is_unsigned()).unwrap_or(hi)
    } else {
        hi
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.base {
            Base::Void => "void".to_string(),
            Base::Char => "char".to_string(),
            Base::UChar => "unsigned char".to_string(),
            Base::Int => "int".to_string(),
            Base::UInt => "unsigned int".to_string(),
            Base::Long => "long".to_string(),
            Base::ULong => "unsigned long".to_string(),
            Base::LongLong => "long long".to_string(),
            Base::ULongLong => "unsigned long long".to_string(),
            Base::Float => "float".to_string(),
            Base::Double => "double".to_string(),
            Base::Func(id) => format!("fn#{}", id.0),
            Base::Record(id) => format!("struct#{}", id.0),
        };
        write!(f, "{}{}", name, "*".repeat(self.indir as usize))
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ─── Front-end type tables ───────────────────────────────────────

/// How a prototype's parameter list ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgTail {
    /// Exactly the declared parameters.
    Fixed,
    /// Declared parameters then `...`.
    Varargs,
    /// Old-style declaration with no parameter information.
    Unspecified,
}

#[derive(Clone, Debug)]
pub struct Prototype {
    pub ret: Ty,
    pub params: Vec<Ty>,
    pub tail: ArgTail,
}

#[derive(Clone, Debug)]
pub struct Member {
    pub name: SymId,
    pub offset: u32,
    pub ty: Ty,
}

#[derive(Clone, Debug)]
pub struct RecordLayout {
    pub size: u32,
    pub members: Vec<Member>,
}

/// Prototype and aggregate-layout tables, populated by the front end
/// before expression building starts.
#[derive(Debug, Default)]
pub struct TypeStore {
    protos: Vec<Prototype>,
    records: Vec<RecordLayout>,
}

impl TypeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_proto(&mut self, p: Prototype) -> ProtoId {
        self.protos.push(p);
        ProtoId((self.protos.len() - 1) as u16)
    }

    pub fn add_record(&mut self, r: RecordLayout) -> RecId {
        self.records.push(r);
        RecId((self.records.len() - 1) as u16)
    }

    pub fn proto(&self, id: ProtoId) -> Option<&Prototype> {
        self.protos.get(id.0 as usize)
    }

    pub fn record(&self, id: RecId) -> Option<&RecordLayout> {
        self.records.get(id.0 as usize)
    }

    pub fn member(&self, id: RecId, name: SymId) -> Option<&Member> {
        self.record(id)?.members.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_moves() {
        let p = Ty::INT.ptr_to();
        assert!(p.is_ptr());
        assert_eq!(p.deref(), Some(Ty::INT));
        assert_eq!(Ty::INT.deref(), None);
        assert_eq!(p.ptr_to().indir, 2);
    }

    #[test]
    fn test_sign_twins() {
        assert_eq!(Ty::INT.sign_twin(), Some(Ty::UINT));
        assert!(Ty::UINT.sign_only_differs(Ty::INT));
        assert!(!Ty::UINT.sign_only_differs(Ty::UINT));
        assert!(!Ty::LONG.sign_only_differs(Ty::UINT));
        assert_eq!(Ty::FLOAT.sign_twin(), None);
    }

    #[test]
    fn test_classification() {
        assert!(Ty::CHAR.is_arith());
        assert!(Ty::DOUBLE.is_arith());
        assert!(!Ty::DOUBLE.is_int_arith());
        assert!(!Ty::INT.ptr_to().is_arith());
        assert!(Ty::INT.ptr_to().is_unsigned());
        assert!(Ty::of(Base::Record(RecId(0))).is_record());
        assert!(!Ty::of(Base::Record(RecId(0))).ptr_to().is_record());
    }

    #[test]
    fn test_promotion() {
        assert_eq!(Ty::CHAR.promote(), Ty::INT);
        assert_eq!(Ty::UCHAR.promote(), Ty::INT);
        assert_eq!(Ty::FLOAT.promote(), Ty::DOUBLE);
        assert_eq!(Ty::ULONG.promote(), Ty::ULONG);
        assert_eq!(Ty::CHAR.ptr_to().promote(), Ty::CHAR.ptr_to());
    }

    #[test]
    fn test_unify() {
        assert_eq!(unify_arith(Ty::CHAR, Ty::CHAR), Ty::INT);
        assert_eq!(unify_arith(Ty::INT, Ty::UINT), Ty::UINT);
        assert_eq!(unify_arith(Ty::UINT, Ty::LONG), Ty::LONG);
        assert_eq!(unify_arith(Ty::ULONG, Ty::INT), Ty::ULONG);
        assert_eq!(unify_arith(Ty::INT, Ty::FLOAT), Ty::FLOAT);
        assert_eq!(unify_arith(Ty::FLOAT, Ty::DOUBLE), Ty::DOUBLE);
    }

    #[test]
    fn test_wire_roundtrip() {
        for ty in [
            Ty::VOID,
            Ty::UCHAR,
            Ty::INT.ptr_to().ptr_to(),
            Ty::ULONG,
            Ty::DOUBLE,
            Ty::of(Base::Func(ProtoId(0))).ptr_to(),
        ] {
            assert_eq!(Ty::from_wire(ty.to_wire()), Some(ty));
        }
        assert_eq!(Ty::from_wire(0xFFF0), None);
    }

    #[test]
    fn test_member_lookup() {
        let mut store = TypeStore::new();
        let rec = store.add_record(RecordLayout {
            size: 6,
            members: vec![
                Member { name: 1, offset: 0, ty: Ty::INT },
                Member { name: 2, offset: 2, ty: Ty::LONG },
            ],
        });
        assert_eq!(store.member(rec, 2).unwrap().offset, 2);
        assert!(store.member(rec, 9).is_none());
    }
}
