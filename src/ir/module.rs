//! The module arena: the owner of every IR object and of the use-list bookkeeping.
//!
//! A [`Module`] holds functions, basic blocks, instructions, global variables, and
//! interned constants in slab arenas addressed by the id types in [`crate::ir`].
//! Instructions and globals can be erased (their slot becomes vacant); ids are never
//! reused within a run, so stale ids are detectable and maps keyed on ids stay valid.
//!
//! # Use Lists
//!
//! The module tracks, for every non-constant value, the set of places it is used:
//! instruction operand slots and global-variable initializers. This is what makes
//! [`Module::replace_all_uses_with`] O(users) and lets the object mutator snapshot a
//! user list before rewriting it.
//!
//! # Erasure
//!
//! Erasing is eager by default. Callers that are mid-traversal pass an [`EraseQueue`]
//! to operations that may delete instructions, and flush it with
//! [`Module::erase_queued`] once their cursors are dead.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::abi::Abi;
use crate::ir::{
    ArgId, BasicBlock, BlockId, ConstId, Constant, FuncId, Function, GlobalId, Inst, InstId,
    InstKind, Ty, Use, Value,
};

/// Linkage of a global object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    /// Visible outside the module. Everything materialized from a binary address gets
    /// external linkage.
    #[default]
    External,

    /// Module-private.
    Internal,
}

/// A global variable.
///
/// The *value* of a global is its address, so the value type is always a pointer:
/// `Pointer(pointee)`. The binary address is optional; when present the global is
/// mirrored in the configuration database.
#[derive(Debug, Clone)]
pub struct GlobalVar {
    /// Symbol name.
    pub(crate) name: String,

    /// The type of the storage the global occupies.
    pub(crate) pointee: Ty,

    /// Address in the binary image, when materialized from one.
    pub(crate) address: Option<u64>,

    /// Initializer constant, when one could be read or was supplied.
    pub(crate) init: Option<ConstId>,

    /// `true` when the backing segment is read-only.
    pub(crate) is_constant: bool,

    /// Linkage of the symbol.
    pub(crate) linkage: Linkage,
}

impl GlobalVar {
    /// Creates a global variable description.
    #[must_use]
    pub fn new(name: impl Into<String>, pointee: Ty) -> Self {
        Self {
            name: name.into(),
            pointee,
            address: None,
            init: None,
            is_constant: false,
            linkage: Linkage::External,
        }
    }

    /// Sets the binary address.
    #[must_use]
    pub fn at_address(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }

    /// Marks the global as read-only data.
    #[must_use]
    pub fn read_only(mut self, is_constant: bool) -> Self {
        self.is_constant = is_constant;
        self
    }

    /// Sets the linkage.
    #[must_use]
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Returns the symbol name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type of the storage (the pointee of the global's value type).
    #[must_use]
    pub fn pointee(&self) -> &Ty {
        &self.pointee
    }

    /// Returns the binary address, if any.
    #[must_use]
    pub const fn address(&self) -> Option<u64> {
        self.address
    }

    /// Returns the initializer, if any.
    #[must_use]
    pub const fn init(&self) -> Option<ConstId> {
        self.init
    }

    /// Returns `true` when the backing segment is read-only.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        self.is_constant
    }

    /// Returns the linkage.
    #[must_use]
    pub const fn linkage(&self) -> Linkage {
        self.linkage
    }
}

/// Deferred-erase handle.
///
/// Operations that would delete instructions append to the queue instead when the
/// caller provides one, so that a caller traversing users of some object does not have
/// those instructions deleted under it. Flush with [`Module::erase_queued`].
#[derive(Debug, Default)]
pub struct EraseQueue {
    pending: FxHashSet<InstId>,
}

impl EraseQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instruction to the queue.
    pub fn insert(&mut self, inst: InstId) {
        self.pending.insert(inst);
    }

    /// Returns `true` if the instruction is queued.
    #[must_use]
    pub fn contains(&self, inst: InstId) -> bool {
        self.pending.contains(&inst)
    }

    /// Returns the number of queued instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Iterates the queued instructions in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = InstId> + '_ {
        self.pending.iter().copied()
    }
}

/// The in-memory SSA program.
///
/// Created together with the configuration store at the start of lifting and alive for
/// the whole decompilation run. Strictly single-threaded: the module, config store,
/// and image form one unit of mutation owned by one actor.
///
/// # Examples
///
/// ```rust
/// use liftir::abi::Abi;
/// use liftir::ir::{InstKind, Module, Ty, Value};
///
/// let mut m = Module::new("demo", Abi::x86_32());
/// let f = m.add_function("main", Ty::Int(32), vec![], false, None);
/// let bb = m.add_block(f);
/// let slot = m.append_inst(
///     bb,
///     InstKind::Alloca { allocated: Ty::Int(32) },
///     Ty::Int(32).ptr_to(),
///     "x",
/// );
/// let loaded = m.append_inst(bb, InstKind::Load { ptr: Value::Inst(slot) }, Ty::Int(32), "");
/// assert_eq!(m.users_of(Value::Inst(slot)).len(), 1);
/// assert_eq!(m.value_ty(Value::Inst(loaded)), Ty::Int(32));
/// ```
#[derive(Debug)]
pub struct Module {
    name: String,
    abi: Abi,
    functions: Vec<Function>,
    blocks: Vec<BasicBlock>,
    insts: Vec<Option<Inst>>,
    globals: Vec<Option<GlobalVar>>,
    consts: Vec<Constant>,
    const_ids: FxHashMap<Constant, ConstId>,
    uses: FxHashMap<Value, Vec<Use>>,
}

impl Module {
    /// Creates an empty module for the given target ABI.
    #[must_use]
    pub fn new(name: impl Into<String>, abi: Abi) -> Self {
        Self {
            name: name.into(),
            abi,
            functions: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            globals: Vec::new(),
            consts: Vec::new(),
            const_ids: FxHashMap::default(),
            uses: FxHashMap::default(),
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the target ABI.
    #[must_use]
    pub const fn abi(&self) -> &Abi {
        &self.abi
    }

    // ========== Functions and blocks ==========

    /// Adds a function and returns its id.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        ret: Ty,
        params: Vec<Ty>,
        vararg: bool,
        address: Option<u64>,
    ) -> FuncId {
        let id = FuncId::new(self.functions.len());
        let param_names = vec![String::new(); params.len()];
        self.functions.push(Function {
            name: name.into(),
            address,
            ret,
            params,
            param_names,
            vararg,
            blocks: Vec::new(),
        });
        id
    }

    /// Returns the function with the given id.
    #[must_use]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    /// Iterates all functions.
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId::new(i), f))
    }

    /// Renames a function.
    pub fn set_function_name(&mut self, id: FuncId, name: impl Into<String>) {
        self.functions[id.index()].name = name.into();
    }

    /// Retypes one parameter, rebuilding the signature in place.
    ///
    /// Argument ids stay stable; the function type reported by
    /// [`Function::fn_ty`] reflects the change immediately.
    pub fn set_arg_ty(&mut self, arg: ArgId, ty: Ty) {
        self.functions[arg.func.index()].params[arg.index as usize] = ty;
    }

    /// Returns the type of the given argument.
    #[must_use]
    pub fn arg_ty(&self, arg: ArgId) -> &Ty {
        &self.functions[arg.func.index()].params[arg.index as usize]
    }

    /// Appends a new basic block to a function and returns its id.
    pub fn add_block(&mut self, func: FuncId) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BasicBlock {
            owner: func,
            insts: Vec::new(),
        });
        self.functions[func.index()].blocks.push(id);
        id
    }

    /// Returns the block with the given id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Returns the entry block of a function, if it has any blocks.
    #[must_use]
    pub fn entry_block(&self, func: FuncId) -> Option<BlockId> {
        self.functions[func.index()].entry_block()
    }

    // ========== Instructions ==========

    /// Appends an instruction at the end of a block.
    pub fn append_inst(
        &mut self,
        block: BlockId,
        kind: InstKind,
        ty: Ty,
        name: impl Into<String>,
    ) -> InstId {
        let id = self.new_inst(kind, ty, block, name.into());
        self.blocks[block.index()].insts.push(id);
        id
    }

    /// Inserts an instruction at the front of a block.
    ///
    /// This is the insertion used for stack-slot allocas: the front of the entry block
    /// keeps every alloca before any non-alloca instruction.
    pub fn insert_inst_front(
        &mut self,
        block: BlockId,
        kind: InstKind,
        ty: Ty,
        name: impl Into<String>,
    ) -> InstId {
        let id = self.new_inst(kind, ty, block, name.into());
        self.blocks[block.index()].insts.insert(0, id);
        id
    }

    /// Inserts an instruction immediately before `anchor`.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` has been erased.
    pub fn insert_inst_before(
        &mut self,
        anchor: InstId,
        kind: InstKind,
        ty: Ty,
        name: impl Into<String>,
    ) -> InstId {
        let block = self.inst_block(anchor);
        let id = self.new_inst(kind, ty, block, name.into());
        let insts = &mut self.blocks[block.index()].insts;
        let pos = insts
            .iter()
            .position(|&i| i == anchor)
            .unwrap_or_else(|| unreachable!("anchor {anchor} not in its block"));
        insts.insert(pos, id);
        id
    }

    /// Inserts an instruction immediately after `anchor`.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` has been erased.
    pub fn insert_inst_after(
        &mut self,
        anchor: InstId,
        kind: InstKind,
        ty: Ty,
        name: impl Into<String>,
    ) -> InstId {
        let block = self.inst_block(anchor);
        let id = self.new_inst(kind, ty, block, name.into());
        let insts = &mut self.blocks[block.index()].insts;
        let pos = insts
            .iter()
            .position(|&i| i == anchor)
            .unwrap_or_else(|| unreachable!("anchor {anchor} not in its block"));
        insts.insert(pos + 1, id);
        id
    }

    fn new_inst(&mut self, kind: InstKind, ty: Ty, block: BlockId, name: String) -> InstId {
        let id = InstId::new(self.insts.len());
        for op in kind.operands() {
            self.add_use(op, Use::Inst(id));
        }
        self.insts.push(Some(Inst {
            kind,
            ty,
            block,
            name,
        }));
        id
    }

    /// Returns the instruction with the given id, or `None` if it has been erased.
    #[must_use]
    pub fn inst(&self, id: InstId) -> Option<&Inst> {
        self.insts.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the block an instruction belongs to.
    ///
    /// # Panics
    ///
    /// Panics if the instruction has been erased.
    #[must_use]
    pub fn inst_block(&self, id: InstId) -> BlockId {
        match self.inst(id) {
            Some(inst) => inst.block,
            None => unreachable!("instruction {id} has been erased"),
        }
    }

    /// Returns the function an instruction belongs to.
    ///
    /// # Panics
    ///
    /// Panics if the instruction has been erased.
    #[must_use]
    pub fn inst_function(&self, id: InstId) -> FuncId {
        self.block(self.inst_block(id)).owner
    }

    /// Returns `true` if the instruction is an alloca.
    #[must_use]
    pub fn is_alloca(&self, id: InstId) -> bool {
        matches!(self.inst(id).map(Inst::kind), Some(InstKind::Alloca { .. }))
    }

    /// Sets an instruction's result name.
    pub fn set_inst_name(&mut self, id: InstId, name: impl Into<String>) {
        if let Some(inst) = self.insts.get_mut(id.index()).and_then(Option::as_mut) {
            inst.name = name.into();
        }
    }

    /// Takes an instruction's result name, leaving it unnamed.
    ///
    /// Declaration rebuilds use this to transfer the name to the replacement.
    pub fn take_inst_name(&mut self, id: InstId) -> String {
        match self.insts.get_mut(id.index()).and_then(Option::as_mut) {
            Some(inst) => std::mem::take(&mut inst.name),
            None => String::new(),
        }
    }

    /// Rewrites an instruction's operation in place, keeping use lists consistent.
    ///
    /// The closure may rearrange operands arbitrarily; uses are re-registered by
    /// diffing the operand lists before and after.
    pub fn update_operands(&mut self, id: InstId, f: impl FnOnce(&mut InstKind)) {
        let Some(inst) = self.insts.get_mut(id.index()).and_then(Option::as_mut) else {
            return;
        };
        let old_ops = inst.kind.operands();
        f(&mut inst.kind);
        let new_ops = inst.kind.operands();
        for op in old_ops {
            self.remove_use(op, Use::Inst(id));
        }
        for op in new_ops {
            self.add_use(op, Use::Inst(id));
        }
    }

    /// Patches every occurrence of `old` among `user`'s operands with `new`.
    ///
    /// Use lists on both values are kept consistent. Does nothing if `user` has been
    /// erased or does not use `old`.
    pub fn replace_operand(&mut self, user: InstId, old: Value, new: Value) {
        if old == new {
            return;
        }
        let Some(slot) = self.insts.get_mut(user.index()) else {
            return;
        };
        let Some(inst) = slot.as_mut() else {
            return;
        };
        let patched = inst.kind.replace_value(old, new);
        for _ in 0..patched {
            self.remove_use(old, Use::Inst(user));
            self.add_use(new, Use::Inst(user));
        }
    }

    /// Replaces every use of `old` with `new` across the whole module.
    ///
    /// O(users of `old`). Instruction operands are patched directly; when `old` is a
    /// global that appears inside another global's initializer, `new` must be a
    /// constant for the initializer to be rebuilt - a non-constant replacement there
    /// leaves the initializer untouched and logs a warning, and the use stays
    /// recorded so the use list keeps matching the real reference graph.
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        if old == new {
            return;
        }
        let Some(entries) = self.uses.remove(&old) else {
            return;
        };
        for entry in entries {
            match entry {
                Use::Inst(user) => {
                    let Some(inst) = self.insts.get_mut(user.index()).and_then(Option::as_mut)
                    else {
                        continue;
                    };
                    let patched = inst.kind.replace_value(old, new);
                    for _ in 0..patched {
                        self.add_use(new, Use::Inst(user));
                    }
                }
                Use::GlobalInit(user) => {
                    let (Value::Global(old_g), Value::Const(new_c)) = (old, new) else {
                        log::warn!("cannot rebuild initializer of {user}: {old} -> {new}");
                        // The initializer still references `old`; keep the entry.
                        self.add_use(old, entry);
                        continue;
                    };
                    self.replace_global_in_init(user, old_g, new_c);
                }
            }
        }
    }

    /// Erases an instruction: it is removed from its block, its operand uses are
    /// unregistered, and its slot becomes vacant.
    ///
    /// The instruction must itself be unused; erasing a value with live users would
    /// leave dangling operands.
    pub fn erase_inst(&mut self, id: InstId) {
        debug_assert!(
            self.users_of(Value::Inst(id)).is_empty(),
            "erasing {id} which still has users"
        );
        let Some(inst) = self.insts.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        for op in inst.kind.operands() {
            self.remove_use(op, Use::Inst(id));
        }
        let insts = &mut self.blocks[inst.block.index()].insts;
        if let Some(pos) = insts.iter().position(|&i| i == id) {
            insts.remove(pos);
        }
        self.uses.remove(&Value::Inst(id));
    }

    /// Erases every instruction in the queue, draining it.
    pub fn erase_queued(&mut self, queue: &mut EraseQueue) {
        let pending = std::mem::take(&mut queue.pending);
        for id in pending {
            self.erase_inst(id);
        }
    }

    // ========== Globals ==========

    /// Installs a global variable and returns its id.
    ///
    /// The initializer's global references (if any) are registered as uses.
    pub fn add_global(&mut self, global: GlobalVar) -> GlobalId {
        let id = GlobalId::new(self.globals.len());
        let init = global.init;
        self.globals.push(Some(global));
        if init.is_some() {
            self.set_global_init(id, init);
        }
        id
    }

    /// Returns the global with the given id, or `None` if it has been removed.
    #[must_use]
    pub fn global(&self, id: GlobalId) -> Option<&GlobalVar> {
        self.globals.get(id.index()).and_then(Option::as_ref)
    }

    /// Iterates all live globals.
    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &GlobalVar)> {
        self.globals
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|g| (GlobalId::new(i), g)))
    }

    /// Sets (or clears) a global's initializer, keeping use lists consistent.
    pub fn set_global_init(&mut self, id: GlobalId, init: Option<ConstId>) {
        let old = match self.globals.get_mut(id.index()).and_then(Option::as_mut) {
            Some(g) => std::mem::replace(&mut g.init, init),
            None => return,
        };
        if let Some(old_init) = old {
            for g in self.globals_referenced_by(old_init) {
                self.remove_use(Value::Global(g), Use::GlobalInit(id));
            }
        }
        if let Some(new_init) = init {
            for g in self.globals_referenced_by(new_init) {
                self.add_use(Value::Global(g), Use::GlobalInit(id));
            }
        }
    }

    /// Renames a global.
    pub fn set_global_name(&mut self, id: GlobalId, name: impl Into<String>) {
        if let Some(g) = self.globals.get_mut(id.index()).and_then(Option::as_mut) {
            g.name = name.into();
        }
    }

    /// Removes a global from the module.
    ///
    /// The global must be unused; its initializer's uses are unregistered.
    pub fn remove_global(&mut self, id: GlobalId) {
        debug_assert!(
            self.users_of(Value::Global(id)).is_empty(),
            "removing {id} which still has users"
        );
        self.set_global_init(id, None);
        if let Some(slot) = self.globals.get_mut(id.index()) {
            *slot = None;
        }
        self.uses.remove(&Value::Global(id));
    }

    /// Collects the distinct globals referenced anywhere inside a constant tree.
    ///
    /// Only walks the tree itself, not other globals' initializers.
    #[must_use]
    pub fn globals_referenced_by(&self, root: ConstId) -> Vec<GlobalId> {
        let mut found = Vec::new();
        let mut seen = FxHashSet::default();
        let mut work = vec![root];
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            let c = &self.consts[id.index()];
            if let Some(g) = c.as_global_addr() {
                if !found.contains(&g) {
                    found.push(g);
                }
            }
            work.extend(c.children());
        }
        found
    }

    /// Rebuilds one global's initializer with every address of `old` replaced by
    /// `new_const`, keeping use lists consistent.
    pub fn replace_global_in_init(&mut self, user: GlobalId, old: GlobalId, new_const: ConstId) {
        let Some(init) = self.global(user).and_then(GlobalVar::init) else {
            return;
        };
        let rebuilt = self.substitute_global_in_const(init, old, new_const);
        self.set_global_init(user, Some(rebuilt));
    }

    /// Rebuilds a constant tree with every address of `old` replaced by `new`.
    fn substitute_global_in_const(&mut self, root: ConstId, old: GlobalId, new: ConstId) -> ConstId {
        let c = self.consts[root.index()].clone();
        if c.is_addr_of(old) {
            return new;
        }
        let rebuilt = match c {
            Constant::Array { ty, elems } => {
                let elems = elems
                    .into_iter()
                    .map(|e| self.substitute_global_in_const(e, old, new))
                    .collect();
                Constant::Array { ty, elems }
            }
            Constant::Struct { ty, fields } => {
                let fields = fields
                    .into_iter()
                    .map(|e| self.substitute_global_in_const(e, old, new))
                    .collect();
                Constant::Struct { ty, fields }
            }
            Constant::Cast { op, value, ty } => Constant::Cast {
                op,
                value: self.substitute_global_in_const(value, old, new),
                ty,
            },
            Constant::ExtractValue { agg, index, ty } => Constant::ExtractValue {
                agg: self.substitute_global_in_const(agg, old, new),
                index,
                ty,
            },
            Constant::InsertValue {
                agg,
                elem,
                index,
                ty,
            } => Constant::InsertValue {
                agg: self.substitute_global_in_const(agg, old, new),
                elem: self.substitute_global_in_const(elem, old, new),
                index,
                ty,
            },
            other => other,
        };
        self.intern_const(rebuilt)
    }

    // ========== Constants ==========

    /// Interns a constant, returning the id of the canonical copy.
    pub fn intern_const(&mut self, constant: Constant) -> ConstId {
        if let Some(&id) = self.const_ids.get(&constant) {
            return id;
        }
        let id = ConstId::new(self.consts.len());
        self.const_ids.insert(constant.clone(), id);
        self.consts.push(constant);
        id
    }

    /// Returns the constant with the given id.
    #[must_use]
    pub fn constant(&self, id: ConstId) -> &Constant {
        &self.consts[id.index()]
    }

    /// Interns an integer constant of the given type, masking the value to its width.
    pub fn const_int(&mut self, ty: Ty, value: u64) -> ConstId {
        let masked = match ty {
            Ty::Int(bits) => crate::ir::truncate_bits(value, bits),
            _ => value,
        };
        self.intern_const(Constant::Int { ty, value: masked })
    }

    /// Interns an integer constant of the ABI word type.
    pub fn const_word(&mut self, value: u64) -> ConstId {
        let ty = self.abi.default_ty();
        self.const_int(ty, value)
    }

    /// Interns an undefined value of the given type.
    pub fn const_undef(&mut self, ty: Ty) -> ConstId {
        self.intern_const(Constant::Undef(ty))
    }

    /// Interns the address-of constant for a global.
    ///
    /// # Panics
    ///
    /// Panics if the global has been removed.
    pub fn const_global_addr(&mut self, id: GlobalId) -> ConstId {
        let pointee = match self.global(id) {
            Some(g) => g.pointee.clone(),
            None => unreachable!("taking the address of removed {id}"),
        };
        self.intern_const(Constant::GlobalAddr {
            global: id,
            ty: pointee.ptr_to(),
        })
    }

    // ========== Values ==========

    /// Returns the type of any value.
    ///
    /// # Panics
    ///
    /// Panics if the value refers to an erased instruction or removed global.
    #[must_use]
    pub fn value_ty(&self, value: Value) -> Ty {
        match value {
            Value::Const(id) => self.constant(id).ty().clone(),
            Value::Global(id) => match self.global(id) {
                Some(g) => g.pointee.clone().ptr_to(),
                None => unreachable!("type of removed {id}"),
            },
            Value::Arg(arg) => self.arg_ty(arg).clone(),
            Value::Inst(id) => match self.inst(id) {
                Some(inst) => inst.ty.clone(),
                None => unreachable!("type of erased {id}"),
            },
        }
    }

    /// Returns the recorded uses of a value.
    ///
    /// Constants are not tracked (they are freely shared); the slice is empty for them.
    #[must_use]
    pub fn users_of(&self, value: Value) -> &[Use] {
        self.uses.get(&value).map_or(&[], Vec::as_slice)
    }

    fn add_use(&mut self, value: Value, user: Use) {
        if matches!(value, Value::Const(_)) {
            return;
        }
        self.uses.entry(value).or_default().push(user);
    }

    fn remove_use(&mut self, value: Value, user: Use) {
        if let Some(list) = self.uses.get_mut(&value) {
            if let Some(pos) = list.iter().position(|u| *u == user) {
                list.swap_remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Abi;

    fn test_module() -> Module {
        Module::new("test", Abi::x86_32())
    }

    fn func_with_block(m: &mut Module) -> (FuncId, BlockId) {
        let f = m.add_function("f", Ty::Void, vec![], false, None);
        let bb = m.add_block(f);
        (f, bb)
    }

    #[test]
    fn test_insertion_order() {
        let mut m = test_module();
        let (_, bb) = func_with_block(&mut m);

        let ret = m.append_inst(bb, InstKind::Return { value: None }, Ty::Void, "");
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
        let load2 = m.insert_inst_after(
            load,
            InstKind::Load {
                ptr: Value::Inst(slot),
            },
            Ty::Int(32),
            "",
        );

        assert_eq!(m.block(bb).insts(), &[slot, load, load2, ret]);
        assert_eq!(m.users_of(Value::Inst(slot)).len(), 2);
    }

    #[test]
    fn test_replace_all_uses_with() {
        let mut m = test_module();
        let (_, bb) = func_with_block(&mut m);

        let a = m.append_inst(
            bb,
            InstKind::Alloca {
                allocated: Ty::Int(32),
            },
            Ty::Int(32).ptr_to(),
            "a",
        );
        let b = m.append_inst(
            bb,
            InstKind::Alloca {
                allocated: Ty::Int(32),
            },
            Ty::Int(32).ptr_to(),
            "b",
        );
        let load = m.append_inst(
            bb,
            InstKind::Load {
                ptr: Value::Inst(a),
            },
            Ty::Int(32),
            "",
        );
        let zero = m.const_int(Ty::Int(32), 0);
        let store = m.append_inst(
            bb,
            InstKind::Store {
                value: Value::Const(zero),
                ptr: Value::Inst(a),
            },
            Ty::Void,
            "",
        );

        m.replace_all_uses_with(Value::Inst(a), Value::Inst(b));

        assert!(m.users_of(Value::Inst(a)).is_empty());
        assert_eq!(m.users_of(Value::Inst(b)).len(), 2);
        match m.inst(load).map(Inst::kind) {
            Some(InstKind::Load { ptr }) => assert_eq!(*ptr, Value::Inst(b)),
            other => panic!("unexpected {other:?}"),
        }
        match m.inst(store).map(Inst::kind) {
            Some(InstKind::Store { ptr, .. }) => assert_eq!(*ptr, Value::Inst(b)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_erase_inst() {
        let mut m = test_module();
        let (_, bb) = func_with_block(&mut m);

        let a = m.append_inst(
            bb,
            InstKind::Alloca {
                allocated: Ty::Int(32),
            },
            Ty::Int(32).ptr_to(),
            "a",
        );
        let load = m.append_inst(
            bb,
            InstKind::Load {
                ptr: Value::Inst(a),
            },
            Ty::Int(32),
            "",
        );

        assert_eq!(m.users_of(Value::Inst(a)).len(), 1);
        m.erase_inst(load);
        assert!(m.users_of(Value::Inst(a)).is_empty());
        assert!(m.inst(load).is_none());
        assert_eq!(m.block(bb).insts(), &[a]);
    }

    #[test]
    fn test_erase_queue() {
        let mut m = test_module();
        let (_, bb) = func_with_block(&mut m);
        let ret = m.append_inst(bb, InstKind::Return { value: None }, Ty::Void, "");

        let mut q = EraseQueue::new();
        q.insert(ret);
        assert_eq!(q.len(), 1);
        m.erase_queued(&mut q);
        assert!(q.is_empty());
        assert!(m.inst(ret).is_none());
    }

    #[test]
    fn test_constant_interning() {
        let mut m = test_module();
        let a = m.const_int(Ty::Int(32), 42);
        let b = m.const_int(Ty::Int(32), 42);
        let c = m.const_int(Ty::Int(64), 42);
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Values are masked to the type's width before interning.
        let d = m.const_int(Ty::Int(8), 0x1FF);
        assert_eq!(m.constant(d).as_int_bits(), Some(0xFF));
    }

    #[test]
    fn test_global_init_uses() {
        let mut m = test_module();
        let g1 = m.add_global(GlobalVar::new("g1", Ty::Int(32)).at_address(0x1000));
        let addr = m.const_global_addr(g1);
        let g2 = m.add_global(GlobalVar::new("g2", Ty::Int(32).ptr_to()).at_address(0x1004));
        m.set_global_init(g2, Some(addr));

        assert_eq!(m.users_of(Value::Global(g1)), &[Use::GlobalInit(g2)]);
        assert_eq!(m.globals_referenced_by(addr), vec![g1]);

        m.set_global_init(g2, None);
        assert!(m.users_of(Value::Global(g1)).is_empty());
    }

    #[test]
    fn test_rauw_rebuilds_initializers() {
        let mut m = test_module();
        let g1 = m.add_global(GlobalVar::new("g1", Ty::Int(32)).at_address(0x1000));
        let addr = m.const_global_addr(g1);
        let g2 = m.add_global(GlobalVar::new("g2", Ty::Int(32).ptr_to()).at_address(0x1004));
        m.set_global_init(g2, Some(addr));

        let g3 = m.add_global(GlobalVar::new("g3", Ty::Int(32)).at_address(0x1008));
        let replacement = m.const_global_addr(g3);
        m.replace_all_uses_with(Value::Global(g1), Value::Const(replacement));

        assert!(m.users_of(Value::Global(g1)).is_empty());
        let init = m.global(g2).and_then(GlobalVar::init);
        assert_eq!(init, Some(replacement));
        assert_eq!(m.users_of(Value::Global(g3)), &[Use::GlobalInit(g2)]);
    }

    #[test]
    fn test_rauw_keeps_unrebuildable_initializer_uses() {
        let mut m = test_module();
        let g1 = m.add_global(GlobalVar::new("g1", Ty::Int(32)).at_address(0x1000));
        let addr = m.const_global_addr(g1);
        let g2 = m.add_global(GlobalVar::new("g2", Ty::Int(32).ptr_to()).at_address(0x1004));
        m.set_global_init(g2, Some(addr));

        let (_, bb) = func_with_block(&mut m);
        let load = m.append_inst(
            bb,
            InstKind::Load {
                ptr: Value::Global(g1),
            },
            Ty::Int(32),
            "",
        );
        let slot = m.append_inst(
            bb,
            InstKind::Alloca {
                allocated: Ty::Int(32),
            },
            Ty::Int(32).ptr_to(),
            "x",
        );

        // A non-constant replacement cannot flow into an initializer: the
        // instruction user is patched, the initializer reference survives, and so
        // does its use-list entry.
        m.replace_all_uses_with(Value::Global(g1), Value::Inst(slot));

        match m.inst(load).map(Inst::kind) {
            Some(InstKind::Load { ptr }) => assert_eq!(*ptr, Value::Inst(slot)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.global(g2).and_then(GlobalVar::init), Some(addr));
        assert_eq!(m.users_of(Value::Global(g1)), &[Use::GlobalInit(g2)]);
    }

    #[test]
    fn test_arg_retype() {
        let mut m = test_module();
        let f = m.add_function("f", Ty::Void, vec![Ty::Int(32)], false, None);
        let arg = ArgId { func: f, index: 0 };
        assert_eq!(m.arg_ty(arg), &Ty::Int(32));
        m.set_arg_ty(arg, Ty::Int(32).ptr_to());
        assert_eq!(m.arg_ty(arg), &Ty::Int(32).ptr_to());
        assert_eq!(m.value_ty(Value::Arg(arg)), Ty::Int(32).ptr_to());
    }
}
