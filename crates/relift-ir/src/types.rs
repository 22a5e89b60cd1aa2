//! Value types, constants and entity handles.

use std::fmt;

/// Scalar type of an IR value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    I1,
    I8,
    I16,
    I32,
    I64,
    /// Pointer into the lifted address space (64-bit).
    Ptr,
}

impl Ty {
    /// Width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::I1 => 1,
            Self::I8 => 8,
            Self::I16 => 16,
            Self::I32 => 32,
            Self::I64 | Self::Ptr => 64,
        }
    }

    /// Storage size in bytes (an `i1` occupies one byte).
    pub const fn bytes(self) -> u32 {
        self.bits().div_ceil(8)
    }

    /// Mask selecting the low `bits()` bits.
    pub const fn mask(self) -> u64 {
        match self.bits() {
            64 => u64::MAX,
            n => (1u64 << n) - 1,
        }
    }

    pub const fn is_ptr(self) -> bool {
        matches!(self, Self::Ptr)
    }

    /// Integer type with the given byte width.
    pub const fn int_of_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(Self::I8),
            2 => Some(Self::I16),
            4 => Some(Self::I32),
            8 => Some(Self::I64),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ptr => f.write_str("ptr"),
            other => write!(f, "i{}", other.bits()),
        }
    }
}

/// Sign-extend the low `ty.bits()` bits of `bits` to 64 bits.
pub const fn sign_extend(bits: u64, ty: Ty) -> i64 {
    let shift = 64 - ty.bits();
    #[allow(clippy::cast_possible_wrap)]
    let wide = (bits << shift) as i64;
    wide >> shift
}

/// An integer or pointer constant. The payload is always masked to the type width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Constant {
    bits: u64,
    ty: Ty,
}

impl Constant {
    pub const fn new(bits: u64, ty: Ty) -> Self {
        Self {
            bits: bits & ty.mask(),
            ty,
        }
    }

    pub const fn bits(self) -> u64 {
        self.bits
    }

    pub const fn ty(self) -> Ty {
        self.ty
    }

    pub const fn as_signed(self) -> i64 {
        sign_extend(self.bits, self.ty)
    }

    pub const fn is_zero(self) -> bool {
        self.bits == 0
    }

    pub const fn is_all_ones(self) -> bool {
        self.bits == self.ty.mask()
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Instruction handle, stable for the lifetime of its function.
    InstId,
    "%"
);
entity_id!(
    /// Block handle, stable for the lifetime of its function.
    BlockId,
    "bb"
);
entity_id!(
    /// Function handle within a module.
    FuncId,
    "@f"
);

/// An SSA operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Const(Constant),
    /// The n-th parameter of the enclosing function.
    Arg(u32),
    /// The result of an instruction.
    Inst(InstId),
}

impl Value {
    pub const fn int(bits: u64, ty: Ty) -> Self {
        Self::Const(Constant::new(bits, ty))
    }

    pub const fn i1(flag: bool) -> Self {
        Self::int(flag as u64, Ty::I1)
    }

    pub const fn as_const(self) -> Option<Constant> {
        match self {
            Self::Const(c) => Some(c),
            _ => None,
        }
    }

    pub const fn as_inst(self) -> Option<InstId> {
        match self {
            Self::Inst(id) => Some(id),
            _ => None,
        }
    }

    pub const fn is_const(self) -> bool {
        matches!(self, Self::Const(_))
    }
}

impl From<InstId> for Value {
    fn from(id: InstId) -> Self {
        Self::Inst(id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "{} {:#x}", c.ty(), c.bits()),
            Self::Arg(n) => write!(f, "%arg{n}"),
            Self::Inst(id) => write!(f, "{id}"),
        }
    }
}
