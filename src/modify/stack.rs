//! Lazy materialization of stack slots.
//!
//! Stack analysis discovers frame offsets one memory access at a time;
//! [`IrModifier::get_stack_slot`] turns "offset -16 of function f" into an alloca in
//! f's entry block exactly once, registering it in the config store under
//! (function, offset). The slot's IR type is frozen at creation - later passes use
//! [`IrModifier::change_object_type`](crate::modify::IrModifier::change_object_type)
//! to re-type it.

use crate::config::{ConfigObject, Storage};
use crate::ir::{FuncId, InstId, InstKind, Ty};
use crate::modify::IrModifier;

impl IrModifier<'_> {
    /// Returns (creating on first use) the stack slot of `func` at `offset`.
    ///
    /// A new slot is allocated in the entry block with the requested type - or the
    /// ABI word type when the requested type cannot back storage - and named
    /// `<hint>_<offset>` (hint defaults to `stack_var`). Returns `None` for a
    /// function with no blocks.
    pub fn get_stack_slot(
        &mut self,
        func: FuncId,
        offset: i64,
        ty: &Ty,
        name: &str,
    ) -> Option<InstId> {
        if let Some(existing) = self.config.stack_slot(func, offset) {
            return Some(existing);
        }

        let ty = if ty.is_sized() {
            ty.clone()
        } else {
            self.module.abi().default_ty()
        };
        let base = if name.is_empty() { "stack_var" } else { name };
        let slot_name = format!("{base}_{offset}");

        let entry = self.module.entry_block(func)?;
        let slot = self.module.insert_inst_front(
            entry,
            InstKind::Alloca {
                allocated: ty.clone(),
            },
            ty.clone().ptr_to(),
            slot_name.clone(),
        );

        let function = self.module.function(func).name().to_string();
        self.config.insert_stack_slot(
            func,
            offset,
            slot,
            ConfigObject::new(slot_name, Storage::Stack { function, offset }, &ty),
        );
        Some(slot)
    }

    /// Places a named alloca at the head of `func`'s entry block.
    ///
    /// Returns `None` when the function has no blocks or an empty entry block -
    /// there is nothing to anchor the local to yet.
    pub fn create_alloca(&mut self, func: FuncId, ty: &Ty, name: &str) -> Option<InstId> {
        let entry = self.module.entry_block(func)?;
        if self.module.block(entry).is_empty() {
            return None;
        }
        Some(self.module.insert_inst_front(
            entry,
            InstKind::Alloca {
                allocated: ty.clone(),
            },
            ty.clone().ptr_to(),
            name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Abi;
    use crate::config::ConfigStore;
    use crate::ir::{Module, Value};

    fn setup() -> (Module, ConfigStore, FuncId) {
        let mut m = Module::new("t", Abi::x86_32());
        let f = m.add_function("main", Ty::Void, vec![], false, Some(0x400));
        let bb = m.add_block(f);
        m.append_inst(bb, InstKind::Return { value: None }, Ty::Void, "");
        (m, ConfigStore::new(), f)
    }

    #[test]
    fn test_slot_creation_and_naming() {
        let (mut m, mut cfg, f) = setup();
        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let slot = modifier
            .get_stack_slot(f, -16, &Ty::Int(32), "x")
            .expect("slot");

        assert!(m.is_alloca(slot));
        assert_eq!(m.inst(slot).map(|i| i.name()), Some("x_-16"));
        assert_eq!(m.value_ty(Value::Inst(slot)), Ty::Int(32).ptr_to());
        // Entry block: the alloca sits before the return.
        let entry = m.entry_block(f).expect("entry");
        assert_eq!(m.block(entry).first_inst(), Some(slot));

        let object = cfg.stack_object(f, -16).expect("config mirror");
        assert_eq!(object.name, "x_-16");
        assert_eq!(
            object.storage,
            Storage::Stack {
                function: "main".to_string(),
                offset: -16,
            }
        );
    }

    #[test]
    fn test_slot_reuse() {
        let (mut m, mut cfg, f) = setup();
        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let a = modifier.get_stack_slot(f, -16, &Ty::Int(32), "x");
        // A second request at the same offset returns the same slot, whatever the
        // requested type and hint say now.
        let b = modifier.get_stack_slot(f, -16, &Ty::Int(64), "y");
        assert_eq!(a, b);

        let other = modifier.get_stack_slot(f, -8, &Ty::Int(32), "x");
        assert_ne!(a, other);
    }

    #[test]
    fn test_unsized_type_falls_back_to_word() {
        let (mut m, mut cfg, f) = setup();
        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let slot = modifier
            .get_stack_slot(f, -4, &Ty::Void, "v")
            .expect("slot");
        assert_eq!(m.value_ty(Value::Inst(slot)), Ty::Int(32).ptr_to());
    }

    #[test]
    fn test_blockless_function() {
        let (mut m, mut cfg, _) = setup();
        let empty = m.add_function("stub", Ty::Void, vec![], false, None);
        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        assert_eq!(modifier.get_stack_slot(empty, -4, &Ty::Int(32), ""), None);
        assert_eq!(modifier.create_alloca(empty, &Ty::Int(32), "tmp"), None);
    }

    #[test]
    fn test_create_alloca() {
        let (mut m, mut cfg, f) = setup();
        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let a = modifier
            .create_alloca(f, &Ty::Int(8), "tmp")
            .expect("alloca");
        assert!(m.is_alloca(a));
        assert_eq!(m.inst(a).map(|i| i.name()), Some("tmp"));
        // Not registered as a stack slot.
        assert_eq!(cfg.slot_key(a), None);
    }
}
