use std::fmt;

/// Index into the symbol table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Index into the builtin registry. This is the capability handle a native
/// slot carries.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

/// Handle to an arena slot: slot index plus the slot's allocation stamp.
///
/// Reclaiming a slot bumps its stamp, so a handle that outlives its value is
/// rejected by every read instead of silently aliasing the slot's next tenant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRef {
    index: u32,
    stamp: u32,
}

impl ValueRef {
    /// The canonical empty list.
    pub const NIL: ValueRef = ValueRef::new(0, 0);
    /// The canonical truthy integer `1`.
    pub const TRUE: ValueRef = ValueRef::new(1, 0);
    /// Binding of a symbol that was declared but never assigned.
    pub const UNBOUND: ValueRef = ValueRef::new(2, 0);

    /// Number of slots reserved for the constants above.
    pub const RESERVED: usize = 3;

    pub(crate) const fn new(index: u32, stamp: u32) -> Self {
        ValueRef { index, stamp }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn stamp(self) -> u32 {
        self.stamp
    }

    pub fn is_nil(self) -> bool {
        self == ValueRef::NIL
    }

    pub fn is_truthy(self) -> bool {
        !self.is_nil()
    }

    pub fn from_bool(b: bool) -> ValueRef {
        if b {
            ValueRef::TRUE
        } else {
            ValueRef::NIL
        }
    }
}

/// Contents of one arena slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Value {
    Nil,
    Integer(i64),
    Pair(ValueRef, ValueRef),
    Symbol(SymbolId),
    Unbound,
    /// Slot on the free list; carries the index of the next free slot.
    Free(Option<u32>),
    NativeProc(NativeId),
    NativeMacro(NativeId),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Integer(_) => Kind::Integer,
            Value::Pair(..) => Kind::Pair,
            Value::Symbol(_) => Kind::Symbol,
            Value::Unbound => Kind::Unbound,
            Value::Free(_) => Kind::Free,
            Value::NativeProc(_) => Kind::NativeProc,
            Value::NativeMacro(_) => Kind::NativeMacro,
        }
    }
}

/// Variant tag of a [`Value`], used for kind-checked reads and diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Kind {
    Nil,
    Integer,
    Pair,
    Symbol,
    Unbound,
    Free,
    NativeProc,
    NativeMacro,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Nil => "nil",
            Kind::Integer => "integer",
            Kind::Pair => "pair",
            Kind::Symbol => "symbol",
            Kind::Unbound => "unbound",
            Kind::Free => "free slot",
            Kind::NativeProc => "native procedure",
            Kind::NativeMacro => "native macro",
        };
        f.write_str(name)
    }
}

impl fmt::Debug for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({}@{})", self.index, self.stamp)
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Debug for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeId({})", self.0)
    }
}
