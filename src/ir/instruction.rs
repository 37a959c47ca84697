//! IR instructions with explicit operands.
//!
//! Unlike the stack-based machine code this IR is lifted from, every instruction here
//! names its operands ([`Value`]s) directly in `result = op(operands)` form. The
//! instruction kind is a tagged variant, so every dispatch in the rewriter is an
//! exhaustiveness-checked `match` rather than a cast ladder.
//!
//! Instructions live in the module's instruction arena and belong to exactly one basic
//! block; ordering within the block is maintained by the block's instruction list.

use std::fmt;

use crate::ir::{BlockId, FuncId, Ty, Value};

/// Primitive cast operations.
///
/// These are the only conversions the type converter composes; every supported type
/// bridge is a minimal chain of them. The same set exists as constant expressions (see
/// [`Constant::Cast`](crate::ir::Constant::Cast)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    /// Reinterpret bits between equal-width types (pointer↔pointer, int↔float).
    BitCast,

    /// Integer to pointer.
    IntToPtr,

    /// Pointer to integer.
    PtrToInt,

    /// Integer resize. Always *signed*: widening sign-extends, narrowing truncates.
    /// Callers pick types with signedness baked in; unsigned semantics are recovered by
    /// later passes at the operand level.
    IntCast,

    /// Float resize between hardware float widths.
    FpCast,
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BitCast => "bitcast",
            Self::IntToPtr => "inttoptr",
            Self::PtrToInt => "ptrtoint",
            Self::IntCast => "intcast",
            Self::FpCast => "fpcast",
        };
        write!(f, "{s}")
    }
}

/// Two-operand arithmetic and logic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mul,
    /// Signed division.
    SDiv,
    /// Unsigned division.
    UDiv,
    /// Signed remainder.
    SRem,
    /// Unsigned remainder.
    URem,
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Shift left.
    Shl,
    /// Logical shift right.
    LShr,
    /// Arithmetic shift right.
    AShr,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::SDiv => "sdiv",
            Self::UDiv => "udiv",
            Self::SRem => "srem",
            Self::URem => "urem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::LShr => "lshr",
            Self::AShr => "ashr",
        };
        write!(f, "{s}")
    }
}

/// Call target: either a function in this module or a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    /// Direct call to a module function.
    Direct(FuncId),
    /// Indirect call through a value (typically an int-to-ptr cast of a word).
    Indirect(Value),
}

/// The operation an instruction performs, with explicit operands.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Reserves a stack slot for `allocated` and yields a pointer to it.
    Alloca {
        /// The type the slot holds; the instruction's result type is a pointer to it.
        allocated: Ty,
    },

    /// Reads through a pointer; the result type is the pointee.
    Load {
        /// Address operand.
        ptr: Value,
    },

    /// Writes a value through a pointer. Produces no result.
    Store {
        /// The stored value.
        value: Value,
        /// Address operand.
        ptr: Value,
    },

    /// Primitive cast; the result type is the instruction's type.
    Cast {
        /// Which cast.
        op: CastOp,
        /// The converted value.
        value: Value,
    },

    /// Extracts an element from an aggregate value.
    ExtractValue {
        /// Aggregate operand.
        agg: Value,
        /// Element index.
        index: u32,
    },

    /// Inserts an element into an aggregate value, yielding the updated aggregate.
    InsertValue {
        /// Aggregate operand.
        agg: Value,
        /// Inserted element.
        elem: Value,
        /// Element index.
        index: u32,
    },

    /// Pointer arithmetic through an aggregate type.
    Gep {
        /// Base pointer.
        base: Value,
        /// Index operands.
        indices: Vec<Value>,
    },

    /// Function call.
    Call {
        /// Call target.
        callee: Callee,
        /// Argument values.
        args: Vec<Value>,
    },

    /// Two-operand arithmetic/logic.
    Binary {
        /// The operation.
        op: BinOp,
        /// Left operand.
        lhs: Value,
        /// Right operand.
        rhs: Value,
    },

    /// Unconditional branch. Produces no result.
    Branch {
        /// Branch target.
        target: BlockId,
    },

    /// Two-way conditional branch. Produces no result.
    CondBranch {
        /// Branch condition (an `i1`).
        cond: Value,
        /// Target when the condition is non-zero.
        then_target: BlockId,
        /// Target when the condition is zero.
        else_target: BlockId,
    },

    /// Function return. Produces no result.
    Return {
        /// Returned value, absent for `void` functions.
        value: Option<Value>,
    },
}

impl InstKind {
    /// Returns the value operands of this instruction, in operand order.
    #[must_use]
    pub fn operands(&self) -> Vec<Value> {
        match self {
            Self::Alloca { .. } | Self::Branch { .. } => Vec::new(),
            Self::Load { ptr } => vec![*ptr],
            Self::Store { value, ptr } => vec![*value, *ptr],
            Self::Cast { value, .. } => vec![*value],
            Self::ExtractValue { agg, .. } => vec![*agg],
            Self::InsertValue { agg, elem, .. } => vec![*agg, *elem],
            Self::Gep { base, indices } => {
                let mut ops = vec![*base];
                ops.extend_from_slice(indices);
                ops
            }
            Self::Call { callee, args } => {
                let mut ops = Vec::with_capacity(args.len() + 1);
                if let Callee::Indirect(v) = callee {
                    ops.push(*v);
                }
                ops.extend_from_slice(args);
                ops
            }
            Self::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::CondBranch { cond, .. } => vec![*cond],
            Self::Return { value } => value.iter().copied().collect(),
        }
    }

    /// Replaces every operand equal to `old` with `new`, returning how many were patched.
    pub fn replace_value(&mut self, old: Value, new: Value) -> usize {
        let mut patched = 0;
        let mut patch = |v: &mut Value| {
            if *v == old {
                *v = new;
                patched += 1;
            }
        };
        match self {
            Self::Alloca { .. } | Self::Branch { .. } => {}
            Self::Load { ptr } => patch(ptr),
            Self::Store { value, ptr } => {
                patch(value);
                patch(ptr);
            }
            Self::Cast { value, .. } => patch(value),
            Self::ExtractValue { agg, .. } => patch(agg),
            Self::InsertValue { agg, elem, .. } => {
                patch(agg);
                patch(elem);
            }
            Self::Gep { base, indices } => {
                patch(base);
                for idx in indices {
                    patch(idx);
                }
            }
            Self::Call { callee, args } => {
                if let Callee::Indirect(v) = callee {
                    patch(v);
                }
                for arg in args {
                    patch(arg);
                }
            }
            Self::Binary { lhs, rhs, .. } => {
                patch(lhs);
                patch(rhs);
            }
            Self::CondBranch { cond, .. } => patch(cond),
            Self::Return { value } => {
                if let Some(v) = value {
                    patch(v);
                }
            }
        }
        patched
    }

    /// Returns `true` if this instruction produces a result value.
    #[must_use]
    pub const fn has_result(&self) -> bool {
        !matches!(
            self,
            Self::Store { .. } | Self::Branch { .. } | Self::CondBranch { .. } | Self::Return { .. }
        )
    }

    /// Returns `true` if this is a cast instruction.
    #[must_use]
    pub const fn is_cast(&self) -> bool {
        matches!(self, Self::Cast { .. })
    }

    /// Short mnemonic for diagnostics.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Alloca { .. } => "alloca",
            Self::Load { .. } => "load",
            Self::Store { .. } => "store",
            Self::Cast { op, .. } => match op {
                CastOp::BitCast => "bitcast",
                CastOp::IntToPtr => "inttoptr",
                CastOp::PtrToInt => "ptrtoint",
                CastOp::IntCast => "intcast",
                CastOp::FpCast => "fpcast",
            },
            Self::ExtractValue { .. } => "extractvalue",
            Self::InsertValue { .. } => "insertvalue",
            Self::Gep { .. } => "getelementptr",
            Self::Call { .. } => "call",
            Self::Binary { .. } => "binary",
            Self::Branch { .. } => "br",
            Self::CondBranch { .. } => "condbr",
            Self::Return { .. } => "ret",
        }
    }
}

/// An instruction in the module's instruction arena.
///
/// The result type is stored with the instruction; for result-less instructions
/// (stores, branches, returns) it is [`Ty::Void`].
#[derive(Debug, Clone)]
pub struct Inst {
    /// What the instruction does and which values it consumes.
    pub(crate) kind: InstKind,

    /// Result type; `Void` when the instruction produces no value.
    pub(crate) ty: Ty,

    /// Owning basic block.
    pub(crate) block: BlockId,

    /// Optional result name, carried for readability of emitted output. Empty when
    /// unnamed.
    pub(crate) name: String,
}

impl Inst {
    /// Returns the instruction's operation.
    #[must_use]
    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    /// Returns the result type (`Void` for result-less instructions).
    #[must_use]
    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    /// Returns the owning basic block.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Returns the result name, or an empty string when unnamed.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstId, InstId};

    #[test]
    fn test_operands_and_patching() {
        let a = Value::Const(ConstId::new(0));
        let b = Value::Const(ConstId::new(1));
        let c = Value::Inst(InstId::new(7));

        let mut kind = InstKind::Store { value: a, ptr: a };
        assert_eq!(kind.operands(), vec![a, a]);
        assert_eq!(kind.replace_value(a, c), 2);
        assert_eq!(kind.operands(), vec![c, c]);

        let mut gep = InstKind::Gep {
            base: a,
            indices: vec![b, a],
        };
        assert_eq!(gep.replace_value(a, c), 2);
        assert_eq!(gep.operands(), vec![c, b, c]);
    }

    #[test]
    fn test_has_result() {
        assert!(InstKind::Load {
            ptr: Value::Const(ConstId::new(0))
        }
        .has_result());
        assert!(!InstKind::Return { value: None }.has_result());
        assert!(!InstKind::Branch {
            target: BlockId::new(0)
        }
        .has_result());
    }
}
