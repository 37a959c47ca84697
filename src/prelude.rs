//! Convenient re-exports of the most commonly used types and traits.
//!
//! This module provides a curated selection of the most frequently used types from
//! across the library, allowing for convenient glob imports.
//!
//! # Usage Examples
//!
//! ```rust
//! use liftir::prelude::*;
//!
//! let abi = Abi::x86_32();
//! let mut module = Module::new("sample", abi);
//! let mut config = ConfigStore::new();
//! let mut modifier = IrModifier::new(&mut module, &mut config);
//! let _ = modifier.stats();
//! ```

pub use crate::abi::{Abi, Arch, Endian};
pub use crate::config::{ConfigFunction, ConfigObject, ConfigStore, CryptoPattern, Storage};
pub use crate::debug::DebugInfo;
pub use crate::image::{Image, ImageBuilder, Segment, SegmentFlags};
pub use crate::ir::{
    ArgId, BasicBlock, BinOp, BlockId, Callee, CastOp, ConstId, Constant, EraseQueue, FloatKind,
    FnTy, FuncId, Function, GlobalId, GlobalVar, Inst, InstId, InstKind, Linkage, Module,
    StructTy, Ty, Use, Value,
};
pub use crate::modify::{IrModifier, MaterializeStats};
pub use crate::{Error, Result};
