//! Structural helpers: localization of pseudo-globals and function renaming.

use crate::config::{CallingConvention, ConfigFunction};
use crate::ir::{FuncId, InstId, InstKind, Ty, Value};
use crate::modify::{normalize_name, IrModifier};

impl IrModifier<'_> {
    /// Converts a store-defined pseudo-global into a true function-local.
    ///
    /// The pointer operand of `definition` is treated as a pseudo-global standing in
    /// for a spilled register: a fresh alloca of the pointee type is placed at the
    /// entry block, the stored value is re-stored through it at the original store's
    /// position, the original store is erased, and every instruction in `uses` is
    /// patched to reference the new local instead.
    ///
    /// Returns `false` (changing nothing) when `definition` is not a store or its
    /// pointer operand is not pointer-typed.
    pub fn localize(&mut self, definition: InstId, uses: &[InstId]) -> bool {
        let (value, ptr) = match self.module.inst(definition).map(|i| i.kind().clone()) {
            Some(InstKind::Store { value, ptr }) => (value, ptr),
            _ => return false,
        };
        let Some(pointee) = self.module.value_ty(ptr).pointee().cloned() else {
            return false;
        };

        let func = self.module.inst_function(definition);
        let Some(entry) = self.module.entry_block(func) else {
            return false;
        };

        let local = self.module.insert_inst_front(
            entry,
            InstKind::Alloca {
                allocated: pointee.clone(),
            },
            pointee.ptr_to(),
            "",
        );
        self.module.insert_inst_before(
            definition,
            InstKind::Store {
                value,
                ptr: Value::Inst(local),
            },
            Ty::Void,
            "",
        );
        self.module.erase_inst(definition);

        for &user in uses {
            self.module.replace_operand(user, ptr, Value::Inst(local));
        }
        true
    }

    /// Renames a function, normalizing the new name first.
    ///
    /// A rename to the function's current (normalized) name is a no-op. Otherwise the
    /// module function is renamed and its config entry updated - or inserted, when
    /// the function has a binary address but no entry yet.
    ///
    /// Returns the function id and its config entry after the rename.
    pub fn rename_function(&mut self, func: FuncId, name: &str) -> (FuncId, Option<&ConfigFunction>) {
        let normalized = normalize_name(name);
        if normalized == self.module.function(func).name() {
            return (func, self.config.function_of(func));
        }

        self.module.set_function_name(func, normalized.clone());
        if !self.config.rename_function(func, &normalized) {
            if let Some(address) = self.module.function(func).address() {
                self.config.insert_function(
                    func,
                    ConfigFunction {
                        address,
                        name: normalized,
                        calling_convention: CallingConvention::default(),
                        parameter_storages: Vec::new(),
                    },
                );
            }
        }
        (func, self.config.function_of(func))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Abi;
    use crate::config::ConfigStore;
    use crate::ir::{GlobalVar, Module};

    #[test]
    fn test_localize_rewrites_definition_and_uses() {
        let mut m = Module::new("t", Abi::x86_32());
        let mut cfg = ConfigStore::new();
        let f = m.add_function("f", Ty::Void, vec![], false, None);
        let bb = m.add_block(f);
        let ret = m.append_inst(bb, InstKind::Return { value: None }, Ty::Void, "");

        // A pseudo-global standing in for a spilled register.
        let pseudo = m.add_global(GlobalVar::new("reg_spill", Ty::Int(32)));
        let c = m.const_int(Ty::Int(32), 5);
        let def = m.insert_inst_before(
            ret,
            InstKind::Store {
                value: Value::Const(c),
                ptr: Value::Global(pseudo),
            },
            Ty::Void,
            "",
        );
        let load = m.insert_inst_before(
            ret,
            InstKind::Load {
                ptr: Value::Global(pseudo),
            },
            Ty::Int(32),
            "",
        );

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        assert!(modifier.localize(def, &[load]));

        // The original store is gone and the pseudo-global has no users left.
        assert!(m.inst(def).is_none());
        assert!(m.users_of(Value::Global(pseudo)).is_empty());

        // The entry block leads with the new alloca, and the load goes through it.
        let entry = m.entry_block(f).expect("entry");
        let local = m.block(entry).first_inst().expect("local");
        assert!(m.is_alloca(local));
        match m.inst(load).map(|i| i.kind().clone()) {
            Some(InstKind::Load { ptr }) => assert_eq!(ptr, Value::Inst(local)),
            other => panic!("unexpected {other:?}"),
        }
        // The stored value survived into the replacement store.
        let stores: Vec<_> = m
            .block(entry)
            .insts()
            .iter()
            .filter_map(|&i| m.inst(i))
            .filter(|i| matches!(i.kind(), InstKind::Store { .. }))
            .collect();
        assert_eq!(stores.len(), 1);
    }

    #[test]
    fn test_localize_rejects_non_stores() {
        let mut m = Module::new("t", Abi::x86_32());
        let mut cfg = ConfigStore::new();
        let f = m.add_function("f", Ty::Void, vec![], false, None);
        let bb = m.add_block(f);
        let ret = m.append_inst(bb, InstKind::Return { value: None }, Ty::Void, "");

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        assert!(!modifier.localize(ret, &[]));
    }

    #[test]
    fn test_rename_function() {
        let mut m = Module::new("t", Abi::x86_32());
        let mut cfg = ConfigStore::new();
        let f = m.add_function("sub_400", Ty::Void, vec![], false, Some(0x400));

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let (out, entry) = modifier.rename_function(f, "main.cold");
        assert_eq!(out, f);
        assert_eq!(entry.map(|e| e.name.as_str()), Some("main_cold"));
        assert_eq!(m.function(f).name(), "main_cold");
        assert_eq!(cfg.function_at(0x400).map(|e| e.name.as_str()), Some("main_cold"));
    }

    #[test]
    fn test_rename_to_same_name_is_a_no_op() {
        let mut m = Module::new("t", Abi::x86_32());
        let mut cfg = ConfigStore::new();
        let f = m.add_function("main", Ty::Void, vec![], false, Some(0x400));
        cfg.insert_function(
            f,
            ConfigFunction {
                address: 0x400,
                name: "main".to_string(),
                calling_convention: CallingConvention::Cdecl,
                parameter_storages: Vec::new(),
            },
        );

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let (out, entry) = modifier.rename_function(f, "main");
        assert_eq!(out, f);
        // The existing entry comes back untouched.
        assert_eq!(entry.map(|e| e.calling_convention), Some(CallingConvention::Cdecl));
        assert_eq!(m.function(f).name(), "main");
    }

    #[test]
    fn test_rename_without_address_skips_config() {
        let mut m = Module::new("t", Abi::x86_32());
        let mut cfg = ConfigStore::new();
        let f = m.add_function("helper", Ty::Void, vec![], false, None);

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let (_, entry) = modifier.rename_function(f, "renamed");
        assert!(entry.is_none());
        assert_eq!(m.function(f).name(), "renamed");
    }
}
