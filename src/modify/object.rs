//! Declared-type changes for globals, stack locals, and arguments.
//!
//! [`IrModifier::change_object_type`] is the heavyweight operation of this crate: it
//! swaps the declaration of an object for one of a new type and then visits *every*
//! use of the old object, patching each user so it type-checks again. The per-user
//! rules mirror what each instruction kind means for the object:
//!
//! - stores through the object convert the stored value to the new slot type
//! - stores *of* the object convert the replacement back to the old type
//! - loads are re-issued through the new declaration and their results converted back
//!   to what downstream code expects
//! - casts collapse when the new declaration already has their target type
//! - everything else gets the replacement converted back to the original type, which
//!   preserves downstream typing and lets later passes continue the propagation
//! - constant users (initializers of other globals) get a constant-expression bridge
//!
//! Erased instructions go to the caller's [`EraseQueue`] when one is provided, so
//! callers traversing users elsewhere keep valid cursors.

use rustc_hash::FxHashSet;

use crate::image::Image;
use crate::ir::{ConstId, EraseQueue, GlobalId, GlobalVar, InstId, InstKind, Ty, Use, Value};
use crate::modify::{convert::Anchor, IrModifier};
use crate::{Error, Result};

impl IrModifier<'_> {
    /// Changes the declared type of `val` to `to_ty` and re-types every use.
    ///
    /// `val` must be an alloca, a global variable, or a function argument. For allocas
    /// and globals, `to_ty` is the new *value* type - a pointer over the new slot
    /// type; for arguments it is the new argument type directly.
    ///
    /// A supplied `init` becomes the new global's initializer; otherwise one is read
    /// from the image at the global's address (`wide_string` controls string
    /// interpretation). When `erase` is provided, obsolete instructions are queued on
    /// it instead of being erased immediately.
    ///
    /// Returns the re-declared object, which replaces `val` everywhere. The
    /// configuration entry of a mirrored object is refreshed with the new type.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedObjectKind`] when `val` is not one of the three kinds
    /// - [`Error::UnhandledUse`] when a user cannot be re-typed (lifter bug)
    /// - [`Error::UnsupportedConversion`] when a required conversion has no rule
    pub fn change_object_type(
        &mut self,
        image: &Image,
        val: Value,
        to_ty: &Ty,
        init: Option<ConstId>,
        mut erase: Option<&mut EraseQueue>,
        wide_string: bool,
    ) -> Result<Value> {
        let is_subject = match val {
            Value::Inst(id) => self.module.is_alloca(id),
            Value::Global(_) | Value::Arg(_) => true,
            Value::Const(_) => false,
        };
        if !is_subject {
            return Err(Error::UnsupportedObjectKind {
                value: val.to_string(),
            });
        }

        let orig_ty = self.module.value_ty(val);
        if orig_ty == *to_ty {
            return Ok(val);
        }
        log::debug!("change_object_type: {val}: {orig_ty} -> {to_ty}");

        let nval = self.change_declaration(image, val, to_ty, init, wide_string)?;

        // Snapshot the users before rewriting. Iterating the live use list while
        // patching it loses users. Each user is visited once even when it holds the
        // object in more than one operand slot.
        let mut seen = FxHashSet::default();
        let users: Vec<Use> = self
            .module
            .users_of(val)
            .iter()
            .copied()
            .filter(|u| seen.insert(*u))
            .collect();

        let mut displaced: Vec<InstId> = Vec::new();
        for user in users {
            match user {
                Use::Inst(user_id) => self.retype_inst_user(
                    user_id,
                    val,
                    nval,
                    &orig_ty,
                    to_ty,
                    &mut erase,
                    &mut displaced,
                )?,
                Use::GlobalInit(user_global) => {
                    self.retype_const_user(user_global, val, nval, &orig_ty)?;
                }
            }
        }

        for inst in displaced {
            self.dispose(inst, &mut erase);
        }

        // The old declaration is dead once every user moved over; with a deferred
        // erase queue, users may linger until the caller flushes it, in which case
        // the old declaration lingers with them.
        match val {
            Value::Inst(old) if self.module.users_of(val).is_empty() => {
                self.module.erase_inst(old);
            }
            Value::Global(old) if self.module.users_of(val).is_empty() => {
                self.module.remove_global(old);
            }
            _ => {}
        }

        Ok(nval)
    }

    /// Rebuilds the declaration of `val` with the new type, without touching users.
    fn change_declaration(
        &mut self,
        image: &Image,
        val: Value,
        to_ty: &Ty,
        init: Option<ConstId>,
        wide_string: bool,
    ) -> Result<Value> {
        match val {
            Value::Inst(old) => {
                let pointee = self.pointee_of(to_ty, val)?;
                let name = self.module.take_inst_name(old);
                let id = self.module.insert_inst_before(
                    old,
                    InstKind::Alloca {
                        allocated: pointee.clone(),
                    },
                    to_ty.clone(),
                    name,
                );
                if let Some((func, offset)) = self.config.slot_key(old) {
                    self.config.rebind_stack_slot(old, id);
                    self.config.set_stack_object_type(func, offset, &pointee);
                }
                Ok(Value::Inst(id))
            }
            Value::Global(old) => self.redeclare_global(image, old, to_ty, init, wide_string),
            Value::Arg(arg) => {
                self.module.set_arg_ty(arg, to_ty.clone());
                Ok(val)
            }
            Value::Const(_) => Err(Error::UnsupportedObjectKind {
                value: val.to_string(),
            }),
        }
    }

    fn redeclare_global(
        &mut self,
        image: &Image,
        old: GlobalId,
        to_ty: &Ty,
        init: Option<ConstId>,
        wide_string: bool,
    ) -> Result<Value> {
        let pointee = self.pointee_of(to_ty, Value::Global(old))?;
        let (name, addr, is_const, linkage) = match self.module.global(old) {
            Some(g) => (g.name().to_string(), g.address(), g.is_constant(), g.linkage()),
            None => {
                return Err(Error::UnsupportedObjectKind {
                    value: Value::Global(old).to_string(),
                })
            }
        };
        let config_addr = self.config.global_address(old).or(addr);

        let init = match init {
            Some(c) => Some(c),
            None => config_addr
                .and_then(|a| image.constant_at(self.module, &pointee, a, wide_string)),
        };

        // When the freshly read initializer has a different shape than requested, the
        // initializer wins: the global's storage is what the image says it is.
        let final_pointee = match init {
            Some(c) => self.module.constant(c).ty().clone(),
            None => pointee,
        };

        let mut replacement = GlobalVar::new(name, final_pointee.clone())
            .read_only(is_const)
            .with_linkage(linkage);
        if let Some(a) = addr {
            replacement = replacement.at_address(a);
        }
        self.module.set_global_name(old, String::new());
        let new_id = self.module.add_global(replacement);
        self.module.set_global_init(new_id, init);

        self.config.rebind_global(old, new_id);
        if let Some(a) = config_addr {
            self.config.set_object_type(a, &final_pointee, wide_string);
        }
        Ok(Value::Global(new_id))
    }

    /// Re-types one instruction user of the changed object.
    #[allow(clippy::too_many_arguments)]
    fn retype_inst_user(
        &mut self,
        user: InstId,
        val: Value,
        nval: Value,
        orig_ty: &Ty,
        to_ty: &Ty,
        erase: &mut Option<&mut EraseQueue>,
        displaced: &mut Vec<InstId>,
    ) -> Result<()> {
        let (kind, user_ty) = match self.module.inst(user) {
            Some(inst) => (inst.kind().clone(), inst.ty().clone()),
            // Already gone (duplicate snapshot entry after an eager erase).
            None => return Ok(()),
        };

        match kind {
            InstKind::Store { value, ptr } if ptr == val => {
                let elem = match self.module.value_ty(nval).pointee() {
                    Some(e) => e.clone(),
                    None => return Err(self.unhandled(user, to_ty)),
                };
                let (conv, disp) = self.convert_live_collect(value, &elem, Anchor::Before(user))?;
                displaced.extend(disp);
                self.module.update_operands(user, |k| {
                    if let InstKind::Store { value, ptr } = k {
                        *value = conv;
                        *ptr = nval;
                    }
                });
            }
            InstKind::Store { .. } => {
                let (conv, disp) = self.convert_live_collect(nval, orig_ty, Anchor::Before(user))?;
                displaced.extend(disp);
                self.module.update_operands(user, |k| {
                    if let InstKind::Store { value, .. } = k {
                        *value = conv;
                    }
                });
            }
            InstKind::Load { .. } => {
                let pointee = match self.module.value_ty(nval).pointee() {
                    Some(p) => p.clone(),
                    None => return Err(self.unhandled(user, to_ty)),
                };
                let new_load =
                    self.module
                        .insert_inst_before(user, InstKind::Load { ptr: nval }, pointee, "");
                // The old load's result type is stale but still describes what its
                // users expect; convert the fresh load back to it, then retire the
                // old load.
                let (conv, disp) = self.convert_live_collect(
                    Value::Inst(new_load),
                    &user_ty,
                    Anchor::Before(user),
                )?;
                displaced.extend(disp);
                if conv != Value::Inst(user) {
                    self.module.replace_all_uses_with(Value::Inst(user), conv);
                    self.dispose(user, erase);
                }
            }
            InstKind::Cast { .. } => {
                if self.module.value_ty(nval) == user_ty {
                    self.module.replace_all_uses_with(Value::Inst(user), nval);
                    self.dispose(user, erase);
                } else {
                    let (conv, disp) =
                        self.convert_live_collect(nval, &user_ty, Anchor::Before(user))?;
                    displaced.extend(disp);
                    if conv != Value::Inst(user) {
                        self.module.replace_all_uses_with(Value::Inst(user), conv);
                        self.dispose(user, erase);
                    }
                }
            }
            // GEPs, calls, arithmetic, returns: give the user back a value of the
            // original type and keep going.
            _ => {
                let (conv, disp) = self.convert_live_collect(nval, orig_ty, Anchor::Before(user))?;
                displaced.extend(disp);
                if conv != val {
                    self.module.replace_operand(user, val, conv);
                }
            }
        }
        Ok(())
    }

    /// Re-types a constant user: another global whose initializer references `val`.
    fn retype_const_user(
        &mut self,
        user: GlobalId,
        val: Value,
        nval: Value,
        orig_ty: &Ty,
    ) -> Result<()> {
        let Value::Global(old_global) = val else {
            return Err(Error::UnhandledUse {
                user: user.to_string(),
                ty: self.module.value_ty(nval),
            });
        };
        let replacement = match nval {
            Value::Global(g) => self.module.const_global_addr(g),
            Value::Const(c) => c,
            _ => {
                return Err(Error::UnhandledUse {
                    user: user.to_string(),
                    ty: self.module.value_ty(nval),
                })
            }
        };
        // Bridge back to the type the initializer slot was built around.
        let conv = self.convert_constant_to_type(replacement, orig_ty)?;
        self.module.replace_global_in_init(user, old_global, conv);
        Ok(())
    }

    fn pointee_of(&self, to_ty: &Ty, val: Value) -> Result<Ty> {
        to_ty
            .pointee()
            .cloned()
            .ok_or_else(|| Error::UnsupportedConversion {
                from: self.module.value_ty(val),
                to: to_ty.clone(),
            })
    }

    fn unhandled(&self, user: InstId, to_ty: &Ty) -> Error {
        let user = match self.module.inst(user) {
            Some(inst) => format!("{} ({user})", inst.kind().mnemonic()),
            None => user.to_string(),
        };
        Error::UnhandledUse {
            user,
            ty: to_ty.clone(),
        }
    }

    /// Queues or erases an obsolete instruction, per the caller's choice.
    fn dispose(&mut self, inst: InstId, erase: &mut Option<&mut EraseQueue>) {
        match erase {
            Some(queue) => queue.insert(inst),
            None => {
                if self.module.users_of(Value::Inst(inst)).is_empty() {
                    self.module.erase_inst(inst);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Abi;
    use crate::config::ConfigStore;
    use crate::image::ImageBuilder;
    use crate::ir::{BinOp, BlockId, CastOp, Module};

    fn setup() -> (Module, ConfigStore, Image) {
        let abi = Abi::x86_32();
        (
            Module::new("t", abi),
            ConfigStore::new(),
            ImageBuilder::new(abi).build(),
        )
    }

    fn block_with_ret(m: &mut Module) -> (BlockId, InstId) {
        let f = m.add_function("f", Ty::Void, vec![], false, None);
        let bb = m.add_block(f);
        let ret = m.append_inst(bb, InstKind::Return { value: None }, Ty::Void, "");
        (bb, ret)
    }

    #[test]
    fn test_rejects_non_objects() {
        let (mut m, mut cfg, image) = setup();
        let (_, ret) = block_with_ret(&mut m);
        let c = m.const_int(Ty::Int(32), 1);

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let err = modifier
            .change_object_type(&image, Value::Const(c), &Ty::Int(64), None, None, false)
            .expect_err("constants are not objects");
        assert!(matches!(err, Error::UnsupportedObjectKind { .. }));

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let err = modifier
            .change_object_type(&image, Value::Inst(ret), &Ty::Int(64), None, None, false)
            .expect_err("non-alloca instructions are not objects");
        assert!(matches!(err, Error::UnsupportedObjectKind { .. }));
    }

    #[test]
    fn test_same_type_is_identity() {
        let (mut m, mut cfg, image) = setup();
        let (bb, _) = block_with_ret(&mut m);
        let slot = m.insert_inst_front(
            bb,
            InstKind::Alloca {
                allocated: Ty::Int(32),
            },
            Ty::Int(32).ptr_to(),
            "x",
        );
        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let out = modifier
            .change_object_type(
                &image,
                Value::Inst(slot),
                &Ty::Int(32).ptr_to(),
                None,
                None,
                false,
            )
            .expect("identity");
        assert_eq!(out, Value::Inst(slot));
    }

    #[test]
    fn test_alloca_retype_patches_loads_and_stores() {
        let (mut m, mut cfg, image) = setup();
        let (bb, ret) = block_with_ret(&mut m);
        let slot = m.insert_inst_front(
            bb,
            InstKind::Alloca {
                allocated: Ty::Int(32),
            },
            Ty::Int(32).ptr_to(),
            "x",
        );
        let c = m.const_int(Ty::Int(32), 7);
        let store = m.insert_inst_before(
            ret,
            InstKind::Store {
                value: Value::Const(c),
                ptr: Value::Inst(slot),
            },
            Ty::Void,
            "",
        );
        let load = m.insert_inst_before(
            ret,
            InstKind::Load {
                ptr: Value::Inst(slot),
            },
            Ty::Int(32),
            "",
        );
        let user = m.insert_inst_before(
            ret,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::Inst(load),
                rhs: Value::Inst(load),
            },
            Ty::Int(32),
            "",
        );

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let out = modifier
            .change_object_type(
                &image,
                Value::Inst(slot),
                &Ty::Int(64).ptr_to(),
                None,
                None,
                false,
            )
            .expect("retype alloca");

        let new_slot = out.as_inst().expect("an alloca");
        assert!(m.is_alloca(new_slot));
        assert_eq!(m.value_ty(out), Ty::Int(64).ptr_to());
        // The old alloca is gone, the name moved over.
        assert!(m.inst(slot).is_none());
        assert_eq!(m.inst(new_slot).map(|i| i.name()), Some("x"));

        // Store now writes an i64 through the new slot.
        match m.inst(store).map(|i| i.kind().clone()) {
            Some(InstKind::Store { value, ptr }) => {
                assert_eq!(ptr, out);
                assert_eq!(m.value_ty(value), Ty::Int(64));
            }
            other => panic!("unexpected {other:?}"),
        }

        // The old load is gone; its consumer sees an i32 again.
        assert!(m.inst(load).is_none());
        match m.inst(user).map(|i| i.kind().clone()) {
            Some(InstKind::Binary { lhs, rhs, .. }) => {
                assert_eq!(m.value_ty(lhs), Ty::Int(32));
                assert_eq!(lhs, rhs);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cast_user_collapses_when_types_align() {
        let (mut m, mut cfg, image) = setup();
        let (bb, ret) = block_with_ret(&mut m);
        let slot = m.insert_inst_front(
            bb,
            InstKind::Alloca {
                allocated: Ty::Int(32),
            },
            Ty::Int(32).ptr_to(),
            "x",
        );
        // A bitcast to i8* that will match the new declaration exactly.
        let cast = m.insert_inst_before(
            ret,
            InstKind::Cast {
                op: CastOp::BitCast,
                value: Value::Inst(slot),
            },
            Ty::Int(8).ptr_to(),
            "",
        );
        let load = m.insert_inst_before(
            ret,
            InstKind::Load {
                ptr: Value::Inst(cast),
            },
            Ty::Int(8),
            "",
        );

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let out = modifier
            .change_object_type(
                &image,
                Value::Inst(slot),
                &Ty::Int(8).ptr_to(),
                None,
                None,
                false,
            )
            .expect("retype alloca");

        // The cast collapsed onto the new declaration.
        assert!(m.inst(cast).is_none());
        match m.inst(load).map(|i| i.kind().clone()) {
            Some(InstKind::Load { ptr }) => assert_eq!(ptr, out),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_erase_queue_defers_deletion() {
        let (mut m, mut cfg, image) = setup();
        let (bb, ret) = block_with_ret(&mut m);
        let slot = m.insert_inst_front(
            bb,
            InstKind::Alloca {
                allocated: Ty::Int(32),
            },
            Ty::Int(32).ptr_to(),
            "x",
        );
        let load = m.insert_inst_before(
            ret,
            InstKind::Load {
                ptr: Value::Inst(slot),
            },
            Ty::Int(32),
            "",
        );

        let mut queue = EraseQueue::new();
        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        modifier
            .change_object_type(
                &image,
                Value::Inst(slot),
                &Ty::Int(64).ptr_to(),
                None,
                Some(&mut queue),
                false,
            )
            .expect("retype alloca");

        // The stale load is queued, not gone.
        assert!(queue.contains(load));
        assert!(m.inst(load).is_some());
        m.erase_queued(&mut queue);
        assert!(m.inst(load).is_none());
    }

    #[test]
    fn test_argument_retype_rewrites_signature() {
        let (mut m, mut cfg, image) = setup();
        let f = m.add_function("callee", Ty::Void, vec![Ty::Int(32)], false, None);
        let bb = m.add_block(f);
        let arg = crate::ir::ArgId { func: f, index: 0 };
        let ret = m.append_inst(bb, InstKind::Return { value: None }, Ty::Void, "");
        let user = m.insert_inst_before(
            ret,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::Arg(arg),
                rhs: Value::Arg(arg),
            },
            Ty::Int(32),
            "",
        );

        let mut modifier = IrModifier::new(&mut m, &mut cfg);
        let out = modifier
            .change_object_type(&image, Value::Arg(arg), &Ty::Int(64), None, None, false)
            .expect("retype argument");
        assert_eq!(out, Value::Arg(arg));
        assert_eq!(m.arg_ty(arg), &Ty::Int(64));
        assert_eq!(m.function(f).fn_ty().to_string(), "void (i64)");

        // The adder still sees i32 operands through a signed resize.
        match m.inst(user).map(|i| i.kind().clone()) {
            Some(InstKind::Binary { lhs, .. }) => {
                assert_eq!(m.value_ty(lhs), Ty::Int(32));
                assert_ne!(lhs, Value::Arg(arg));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
