//! The typed, SSA-form program model and its mutation primitives.
//!
//! This module is the in-memory program graph the rewriter operates on: a
//! [`Module`] of [`Function`]s, each a CFG of [`BasicBlock`]s of [`Inst`]ructions
//! producing typed values, plus global variables and interned constants.
//!
//! # Architecture
//!
//! Everything is arena-backed and id-addressed:
//!
//! - [`Value`] is a small `Copy` handle - a constant, global, argument, or
//!   instruction result
//! - use lists are kept per value, making [`Module::replace_all_uses_with`]
//!   O(users)
//! - ids are slab indices and stay stable for the lifetime of the run; maps key on
//!   them, never on addresses of moved objects
//!
//! # Key Components
//!
//! - [`Ty`] - the low-level type model
//! - [`Constant`] - interned constants and constant-expression trees
//! - [`Inst`] / [`InstKind`] - explicit-operand instructions
//! - [`Function`] / [`BasicBlock`] - CFG containers
//! - [`Module`] - the arena owner with all mutation primitives
//! - [`EraseQueue`] - caller-supplied deferred-erase handle

mod constant;
mod function;
mod instruction;
mod module;
mod types;

pub use constant::Constant;
pub use function::{BasicBlock, Function};
pub use instruction::{BinOp, Callee, CastOp, Inst, InstKind};
pub use module::{EraseQueue, GlobalVar, Linkage, Module};
pub use types::{FloatKind, FnTy, StructTy, Ty};

pub(crate) use constant::{sign_extend, truncate_bits};

use std::fmt;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from a raw arena index.
            #[must_use]
            pub const fn new(index: usize) -> Self {
                Self(index as u32)
            }

            /// Returns the raw arena index.
            #[must_use]
            pub const fn index(&self) -> usize {
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

arena_id!(
    /// Identifies a [`Function`] in its module.
    FuncId,
    "fn"
);
arena_id!(
    /// Identifies a [`BasicBlock`] in its module.
    BlockId,
    "bb"
);
arena_id!(
    /// Identifies an [`Inst`] in its module.
    InstId,
    "inst"
);
arena_id!(
    /// Identifies a [`GlobalVar`] in its module.
    GlobalId,
    "glob"
);
arena_id!(
    /// Identifies an interned [`Constant`] in its module.
    ConstId,
    "const"
);

/// Identifies a function argument: the owning function plus the parameter position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgId {
    /// The owning function.
    pub func: FuncId,
    /// Zero-based parameter position.
    pub index: u32,
}

impl fmt::Display for ArgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:arg{}", self.func, self.index)
    }
}

/// An SSA value: the handle every operand slot holds.
///
/// Values are `Copy` and compare by identity (arena id); structural constant equality
/// is achieved by interning, so two structurally equal constants are the *same*
/// [`ConstId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// An interned constant (including undef and constant expressions).
    Const(ConstId),

    /// A global variable; typed as a pointer to the global's pointee type.
    Global(GlobalId),

    /// A function argument.
    Arg(ArgId),

    /// The result of an instruction.
    Inst(InstId),
}

impl Value {
    /// Returns the instruction id if this value is an instruction result.
    #[must_use]
    pub const fn as_inst(&self) -> Option<InstId> {
        match self {
            Self::Inst(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the constant id if this value is a constant.
    #[must_use]
    pub const fn as_const(&self) -> Option<ConstId> {
        match self {
            Self::Const(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the global id if this value is a global variable.
    #[must_use]
    pub const fn as_global(&self) -> Option<GlobalId> {
        match self {
            Self::Global(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns `true` if this value is a constant.
    #[must_use]
    pub const fn is_const(&self) -> bool {
        matches!(self, Self::Const(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(id) => write!(f, "{id}"),
            Self::Global(id) => write!(f, "@{id}"),
            Self::Arg(id) => write!(f, "%{id}"),
            Self::Inst(id) => write!(f, "%{id}"),
        }
    }
}

/// A recorded use of a value.
///
/// Instructions use values through their operand slots; global variables use values
/// (other globals) through their initializer constant trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Use {
    /// The value appears as an operand of this instruction.
    Inst(InstId),

    /// The value appears inside this global's initializer.
    GlobalInit(GlobalId),
}
