#![doc(html_no_source)]
#![deny(missing_docs)]

//! # liftir
//!
//! The IR-modification core of a machine-code decompiler. A lifter above this crate
//! translates machine instructions one-for-one into a low-level, typed, SSA-form
//! program model; `liftir` is the subsystem that progressively rewrites that model -
//! changing object types, materializing globals and stack variables from raw binary
//! addresses, localizing register spills - until types, objects, and control flow
//! resemble a high-level program. A parallel configuration database (addresses, names,
//! storage classes, type strings, crypto-pattern annotations) is kept in sync with
//! every rewrite.
//!
//! The surrounding system - file loader, disassembler, instruction lifter, high-level
//! emitter, driver - is an external collaborator. This crate neither parses binaries
//! nor decides type changes; it executes them while preserving well-formedness.
//!
//! # Architecture
//!
//! - **IR Layer** ([`ir`]): the arena-backed program graph - types, constants,
//!   instructions, functions, globals - with per-value use lists and O(users)
//!   replace-all-uses-with
//! - **Image Layer** ([`image`]): read-only view over the loaded object file; byte,
//!   word, and string reads plus typed constant materialization
//! - **Config Layer** ([`config`]): the source-level metadata mirror, keyed
//!   bidirectionally by IR handle and by binary address
//! - **Rewrite Layer** ([`modify`]): the type-conversion engine, declared-type
//!   changes, and lazy object materialization
//! - **Target Layer** ([`abi`]): word width, byte order, and the architecture
//!   predicates the materializer's heuristics depend on
//!
//! # Usage Examples
//!
//! ## Materializing and re-typing a stack variable
//!
//! ```rust
//! use liftir::abi::Abi;
//! use liftir::config::ConfigStore;
//! use liftir::image::ImageBuilder;
//! use liftir::ir::{InstKind, Module, Ty, Value};
//! use liftir::modify::IrModifier;
//!
//! let abi = Abi::x86_32();
//! let mut module = Module::new("sample", abi);
//! let mut config = ConfigStore::new();
//! let image = ImageBuilder::new(abi).build();
//!
//! let f = module.add_function("main", Ty::Void, vec![], false, Some(0x401000));
//! let bb = module.add_block(f);
//! module.append_inst(bb, InstKind::Return { value: None }, Ty::Void, "");
//!
//! let mut modifier = IrModifier::new(&mut module, &mut config);
//! let slot = modifier.get_stack_slot(f, -16, &Ty::Int(32), "x").unwrap();
//!
//! // Stack analysis later decides the slot is really a pointer.
//! let retyped = modifier
//!     .change_object_type(
//!         &image,
//!         Value::Inst(slot),
//!         &Ty::Int(8).ptr_to().ptr_to(),
//!         None,
//!         None,
//!         false,
//!     )
//!     .unwrap();
//! assert_eq!(module.value_ty(retyped), Ty::Int(8).ptr_to().ptr_to());
//! ```
//!
//! ## Materializing a global from a binary address
//!
//! ```rust
//! use liftir::abi::Abi;
//! use liftir::config::ConfigStore;
//! use liftir::image::{ImageBuilder, SegmentFlags};
//! use liftir::ir::Module;
//! use liftir::modify::IrModifier;
//!
//! let abi = Abi::x86_32();
//! let mut module = Module::new("sample", abi);
//! let mut config = ConfigStore::new();
//! let image = ImageBuilder::new(abi)
//!     .segment(".data", 0x804a018, SegmentFlags::WRITABLE, &[42, 0, 0, 0])
//!     .build();
//!
//! let mut modifier = IrModifier::new(&mut module, &mut config);
//! let g = modifier
//!     .get_global_variable(&image, None, 0x804a018, false, "")
//!     .unwrap();
//! assert_eq!(module.global(g).unwrap().name(), "global_var_804a018");
//! assert_eq!(config.ir_global_at(0x804a018), Some(g));
//! ```
//!
//! # Error Handling
//!
//! All fatal conditions surface as [`Result<T, Error>`](Result): an unsupported type
//! conversion, an object mutation on the wrong kind of value, a user the rewriter
//! cannot re-type. Recoverable conditions - an address where no global may live, an
//! initializer that cannot be read - are `None` returns, exactly because callers are
//! expected to carry on past them.
//!
//! # Thread Safety
//!
//! The core is strictly single-threaded by design: a [`ir::Module`], its
//! [`config::ConfigStore`], and the [`image::Image`] form one unit of mutation owned
//! by one actor. No operation suspends; operations complete or fail synchronously.

pub mod abi;
pub mod config;
pub mod debug;
mod error;
pub mod image;
pub mod ir;
pub mod modify;
pub mod prelude;

/// `liftir` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`crate::Error`]. Used consistently throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `liftir` Error type.
///
/// The main error type for all operations in this crate. See [`Error`] for the
/// variants and the fatality policy.
pub use error::Error;
