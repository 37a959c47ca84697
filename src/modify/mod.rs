//! The IR rewriter: type changes, object materialization, and the conversion engine.
//!
//! Everything in this module mutates the program graph *and* its configuration mirror
//! together, so that the invariants tying the two hold after every public operation:
//! addressed globals stay paired with their config entries, stack slots stay unique per
//! (function, offset), and every user of a re-typed object type-checks again before the
//! operation returns.
//!
//! # Key Components
//!
//! - [`IrModifier`] - the context threading the module and config store through every
//!   operation
//! - [`IrModifier::convert_value_to_type`] / [`IrModifier::convert_constant_to_type`] -
//!   the type-conversion engine
//! - [`IrModifier::change_object_type`] - declared-type changes with full use rewriting
//! - [`IrModifier::get_global_variable`] - lazy global materialization from an address
//! - [`IrModifier::get_stack_slot`] - lazy stack-slot materialization
//! - [`IrModifier::localize`] / [`IrModifier::rename_function`] - structural helpers
//! - [`MaterializeStats`] - diagnostic counters for the materializer's heuristics

mod convert;
mod globals;
mod localize;
mod object;
mod stack;

use crate::config::ConfigStore;
use crate::ir::Module;

/// Diagnostic counters of the global-variable materializer.
///
/// The code-segment heuristic is deliberately loose on ARM/Thumb and PIC32 and may
/// produce false-positive globals; `relaxed_accepts` counts the addresses that were
/// accepted only because of that relaxation, so drivers can surface the number for
/// review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Globals installed in both the IR and the config store.
    pub created: u64,

    /// Addresses rejected by the pre-check.
    pub rejected: u64,

    /// Addresses accepted only by the ARM/Thumb/PIC32 relaxation.
    pub relaxed_accepts: u64,
}

/// The rewriting context: the module and its configuration mirror, mutated together.
///
/// The modifier owns no IR; it borrows the module and config store for the duration of
/// a pass and threads them through every operation. There is no hidden global state -
/// two modifiers over two modules are fully independent.
///
/// # Examples
///
/// ```rust
/// use liftir::abi::Abi;
/// use liftir::config::ConfigStore;
/// use liftir::ir::{Module, Ty};
/// use liftir::modify::IrModifier;
///
/// let mut module = Module::new("demo", Abi::x86_32());
/// let mut config = ConfigStore::new();
/// let f = module.add_function("main", Ty::Void, vec![], false, Some(0x400));
/// module.add_block(f);
///
/// let mut modifier = IrModifier::new(&mut module, &mut config);
/// let slot = modifier.get_stack_slot(f, -16, &Ty::Int(32), "x").unwrap();
/// assert_eq!(modifier.get_stack_slot(f, -16, &Ty::Int(32), "x"), Some(slot));
/// ```
#[derive(Debug)]
pub struct IrModifier<'a> {
    pub(crate) module: &'a mut Module,
    pub(crate) config: &'a mut ConfigStore,
    pub(crate) stats: MaterializeStats,
}

impl<'a> IrModifier<'a> {
    /// Creates a modifier over the given module and config store.
    pub fn new(module: &'a mut Module, config: &'a mut ConfigStore) -> Self {
        Self {
            module,
            config,
            stats: MaterializeStats::default(),
        }
    }

    /// Returns the module.
    #[must_use]
    pub fn module(&self) -> &Module {
        self.module
    }

    /// Returns the module mutably.
    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    /// Returns the config store.
    #[must_use]
    pub fn config(&self) -> &ConfigStore {
        self.config
    }

    /// Returns the config store mutably.
    pub fn config_mut(&mut self) -> &mut ConfigStore {
        self.config
    }

    /// Returns the materializer's diagnostic counters.
    #[must_use]
    pub const fn stats(&self) -> &MaterializeStats {
        &self.stats
    }
}

/// Salts a name with the hex form of an address: `name_400123`.
#[must_use]
pub(crate) fn salt_with_hex(name: &str, addr: u64) -> String {
    format!("{name}_{addr:x}")
}

/// Normalizes a name into a safe identifier.
///
/// Characters outside `[A-Za-z0-9_]` become `_`; a leading digit (or an empty name)
/// gets a `_` prefix. Applying the function twice is a no-op, which is what makes
/// rename-to-same-name detection work.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_with_hex() {
        assert_eq!(salt_with_hex("global_var", 0x1234), "global_var_1234");
        assert_eq!(salt_with_hex("g", 0), "g_0");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("main"), "main");
        assert_eq!(normalize_name("operator=="), "operator__");
        assert_eq!(normalize_name("2nd"), "_2nd");
        assert_eq!(normalize_name(""), "_");
        // Idempotent.
        assert_eq!(normalize_name(&normalize_name("a.b")), normalize_name("a.b"));
    }
}
