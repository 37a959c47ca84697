//! Functions and basic blocks.
//!
//! A [`Function`] is an ordered list of basic blocks; the first block is the entry
//! block, and the front of the entry block is the canonical insertion point for stack
//! slot allocas. A [`BasicBlock`] is an ordered list of instruction ids into the
//! module's instruction arena.

use crate::ir::{BlockId, FnTy, FuncId, InstId, Ty};

/// A function in the lifted program.
///
/// Parameters are stored as types on the function itself; an argument *value* is
/// addressed as [`ArgId`](crate::ir::ArgId) `(function, index)`. Rebuilding the
/// signature when an argument is re-typed is therefore an in-place update - argument
/// ids stay stable across the rewrite.
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name.
    pub(crate) name: String,

    /// Entry address in the binary, when the function was lifted from one.
    pub(crate) address: Option<u64>,

    /// Return type.
    pub(crate) ret: Ty,

    /// Parameter types in order.
    pub(crate) params: Vec<Ty>,

    /// Parameter names; empty strings for unnamed parameters.
    pub(crate) param_names: Vec<String>,

    /// `true` for variadic signatures.
    pub(crate) vararg: bool,

    /// Basic blocks in layout order; the first is the entry block.
    pub(crate) blocks: Vec<BlockId>,
}

impl Function {
    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entry address in the binary, if known.
    #[must_use]
    pub const fn address(&self) -> Option<u64> {
        self.address
    }

    /// Returns the return type.
    #[must_use]
    pub fn ret_ty(&self) -> &Ty {
        &self.ret
    }

    /// Returns the parameter types.
    #[must_use]
    pub fn params(&self) -> &[Ty] {
        &self.params
    }

    /// Returns the name of the parameter at `index`, or an empty string.
    #[must_use]
    pub fn param_name(&self, index: u32) -> &str {
        self.param_names
            .get(index as usize)
            .map_or("", String::as_str)
    }

    /// Returns `true` for variadic signatures.
    #[must_use]
    pub const fn is_vararg(&self) -> bool {
        self.vararg
    }

    /// Returns the basic blocks in layout order.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Returns the entry block, if any block exists.
    #[must_use]
    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    /// Returns the full function type.
    #[must_use]
    pub fn fn_ty(&self) -> Ty {
        Ty::Function(Box::new(FnTy {
            ret: self.ret.clone(),
            params: self.params.clone(),
            vararg: self.vararg,
        }))
    }
}

/// A basic block: an ordered run of instructions with a single entry point.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Owning function.
    pub(crate) owner: FuncId,

    /// Instructions in execution order.
    pub(crate) insts: Vec<InstId>,
}

impl BasicBlock {
    /// Returns the owning function.
    #[must_use]
    pub const fn owner(&self) -> FuncId {
        self.owner
    }

    /// Returns the instructions in execution order.
    #[must_use]
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Returns the first instruction, if the block is non-empty.
    #[must_use]
    pub fn first_inst(&self) -> Option<InstId> {
        self.insts.first().copied()
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}
