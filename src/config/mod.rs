//! The configuration database: source-level metadata mirrored alongside the IR.
//!
//! Selected IR objects - globals with a binary address, stack slots, functions - have a
//! parallel entry here carrying what the IR cannot: symbolic names meant for output,
//! storage classification, type strings, crypto-pattern annotations, and provenance
//! flags. The database is keyed bidirectionally: by binary address / (function, offset)
//! on one side and by IR handle on the other, so both the rewriter and the emitter can
//! navigate it.
//!
//! IR handles are arena ids ([`GlobalId`], [`InstId`]), never raw pointers: IR objects
//! are freely re-created during type changes, and the database follows them via
//! explicit rebinding ([`ConfigStore::rebind_global`], [`ConfigStore::rebind_stack_slot`]).
//!
//! # On-Disk Form
//!
//! The store round-trips through a JSON document ([`ConfigStore::to_json_string`] /
//! [`ConfigStore::from_json_str`]) holding the objects and functions. IR bindings are
//! runtime state and are re-established lazily as objects are materialized in a later
//! run.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ir::{FuncId, GlobalId, InstId, Ty};
use crate::Result;

/// Storage class of a config object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "storage-kind", content = "storage-value", rename_all = "lowercase")]
pub enum Storage {
    /// The object lives at a fixed binary address.
    Global(u64),

    /// The object is a stack slot of a function, identified by the function's name
    /// and frame offset.
    Stack {
        /// Owning function name.
        function: String,
        /// Frame offset (typically negative, below the frame base).
        offset: i64,
    },

    /// The object lives in a register.
    Register(u32),
}

/// Calling convention of a lifted function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallingConvention {
    /// Not determined.
    #[default]
    Unknown,
    /// C calling convention.
    Cdecl,
    /// stdcall.
    Stdcall,
    /// fastcall.
    Fastcall,
    /// thiscall.
    Thiscall,
}

/// One mirrored object: a global variable, stack slot, or register-resident value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigObject {
    /// Name used in the IR.
    pub name: String,

    /// Name meant for emitted output, when one is known (from debug info or a crypto
    /// pattern). Empty otherwise.
    #[serde(default)]
    pub real_name: String,

    /// Storage class.
    #[serde(flatten)]
    pub storage: Storage,

    /// The object's type in textual IR form (see [`Ty::parse`]).
    pub type_llvm_ir: String,

    /// Human-readable description when the object matches a known crypto pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_description: Option<String>,

    /// `true` when name/type came from debug info (or another authoritative source).
    #[serde(default)]
    pub is_from_debug: bool,

    /// `true` when the object is a wide string.
    #[serde(default)]
    pub is_wide_string: bool,
}

impl ConfigObject {
    /// Creates an object entry with the given name and storage.
    #[must_use]
    pub fn new(name: impl Into<String>, storage: Storage, ty: &Ty) -> Self {
        Self {
            name: name.into(),
            real_name: String::new(),
            storage,
            type_llvm_ir: ty.to_string(),
            crypto_description: None,
            is_from_debug: false,
            is_wide_string: false,
        }
    }

    /// Parses the recorded type string back into a type.
    #[must_use]
    pub fn parse_ty(&self) -> Option<Ty> {
        Ty::parse(&self.type_llvm_ir)
    }
}

/// One mirrored function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFunction {
    /// Entry address in the binary.
    pub address: u64,

    /// Function name.
    pub name: String,

    /// Calling convention.
    #[serde(default)]
    pub calling_convention: CallingConvention,

    /// Storage of each parameter, in order.
    #[serde(default)]
    pub parameter_storages: Vec<Storage>,
}

/// A pre-recognized constant table (S-box or similar) at a known address.
///
/// Patterns are produced by an external signature scanner and registered before the
/// rewriting passes run; the global-variable materializer consults them when choosing
/// a name and type for an address. They carry a real [`Ty`] and therefore live only in
/// memory - the on-disk document keeps the derived description string on the object.
#[derive(Debug, Clone, PartialEq)]
pub struct CryptoPattern {
    /// Canonical name for the table.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// The table's type.
    pub ty: Ty,
}

/// The serialized document: objects and functions, no runtime bindings.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigDoc {
    #[serde(default)]
    objects: Vec<ConfigObject>,
    #[serde(default)]
    functions: Vec<ConfigFunction>,
}

/// The configuration database.
///
/// Created together with the module at the start of lifting and kept in sync by the
/// rewriter: every operation that changes a mirrored object's declaration also
/// refreshes its entry here.
#[derive(Debug, Default)]
pub struct ConfigStore {
    /// Global objects by binary address.
    objects: FxHashMap<u64, ConfigObject>,

    /// IR global installed for an address.
    ir_globals: FxHashMap<u64, GlobalId>,

    /// Reverse of `ir_globals`.
    global_addrs: FxHashMap<GlobalId, u64>,

    /// Stack objects by (function, offset).
    stack_objects: FxHashMap<(FuncId, i64), ConfigObject>,

    /// Alloca installed for a (function, offset).
    stack_slots: FxHashMap<(FuncId, i64), InstId>,

    /// Reverse of `stack_slots`.
    slot_keys: FxHashMap<InstId, (FuncId, i64)>,

    /// Stack objects loaded from disk, keyed by function name until the function is
    /// materialized.
    loaded_stack: FxHashMap<(String, i64), ConfigObject>,

    /// Functions by entry address.
    functions: FxHashMap<u64, ConfigFunction>,

    /// Entry address of a module function.
    func_addrs: FxHashMap<FuncId, u64>,

    /// Crypto patterns by address.
    crypto: FxHashMap<u64, CryptoPattern>,
}

impl ConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Globals ==========

    /// Returns the object entry at a binary address.
    #[must_use]
    pub fn object_at(&self, addr: u64) -> Option<&ConfigObject> {
        self.objects.get(&addr)
    }

    /// Returns the IR global installed at a binary address.
    #[must_use]
    pub fn ir_global_at(&self, addr: u64) -> Option<GlobalId> {
        self.ir_globals.get(&addr).copied()
    }

    /// Returns the binary address a global was materialized from.
    #[must_use]
    pub fn global_address(&self, global: GlobalId) -> Option<u64> {
        self.global_addrs.get(&global).copied()
    }

    /// Inserts (or replaces) the object entry for an address without binding an IR
    /// global.
    ///
    /// Used when an address is worth remembering even though no IR global could be
    /// built for it.
    pub fn insert_object(&mut self, addr: u64, object: ConfigObject) {
        self.objects.insert(addr, object);
    }

    /// Inserts the object entry for an address and binds the IR global that mirrors
    /// it.
    pub fn insert_global(&mut self, addr: u64, global: GlobalId, object: ConfigObject) {
        self.objects.insert(addr, object);
        self.ir_globals.insert(addr, global);
        self.global_addrs.insert(global, addr);
    }

    /// Moves an address binding from one IR global to its replacement.
    ///
    /// Declaration rebuilds create a fresh global; the config entry survives and
    /// follows it.
    pub fn rebind_global(&mut self, old: GlobalId, new: GlobalId) {
        if let Some(addr) = self.global_addrs.remove(&old) {
            self.ir_globals.insert(addr, new);
            self.global_addrs.insert(new, addr);
        }
    }

    /// Drops the IR binding for a global, keeping the object entry.
    ///
    /// Used when a materialized global turns out not to be buildable: the address
    /// stays remembered for later, but no IR global mirrors it anymore.
    pub fn unbind_global(&mut self, global: GlobalId) {
        if let Some(addr) = self.global_addrs.remove(&global) {
            self.ir_globals.remove(&addr);
        }
    }

    /// Refreshes the recorded type of the object at `addr`.
    pub fn set_object_type(&mut self, addr: u64, ty: &Ty, wide_string: bool) {
        if let Some(object) = self.objects.get_mut(&addr) {
            object.type_llvm_ir = ty.to_string();
            object.is_wide_string = wide_string;
        }
    }

    /// Iterates all global object entries.
    pub fn objects(&self) -> impl Iterator<Item = (u64, &ConfigObject)> {
        self.objects.iter().map(|(a, o)| (*a, o))
    }

    // ========== Stack slots ==========

    /// Returns the alloca registered for (function, offset), if any.
    #[must_use]
    pub fn stack_slot(&self, func: FuncId, offset: i64) -> Option<InstId> {
        self.stack_slots.get(&(func, offset)).copied()
    }

    /// Returns the stack object entry for (function, offset).
    #[must_use]
    pub fn stack_object(&self, func: FuncId, offset: i64) -> Option<&ConfigObject> {
        self.stack_objects.get(&(func, offset))
    }

    /// Returns the (function, offset) key of a registered stack alloca.
    #[must_use]
    pub fn slot_key(&self, slot: InstId) -> Option<(FuncId, i64)> {
        self.slot_keys.get(&slot).copied()
    }

    /// Returns a stack object loaded from disk for a function name, if present.
    #[must_use]
    pub fn loaded_stack_object(&self, function: &str, offset: i64) -> Option<&ConfigObject> {
        self.loaded_stack.get(&(function.to_string(), offset))
    }

    /// Registers a stack slot and its object entry.
    pub fn insert_stack_slot(
        &mut self,
        func: FuncId,
        offset: i64,
        slot: InstId,
        object: ConfigObject,
    ) {
        self.stack_objects.insert((func, offset), object);
        self.stack_slots.insert((func, offset), slot);
        self.slot_keys.insert(slot, (func, offset));
    }

    /// Moves a (function, offset) binding from one alloca to its replacement.
    pub fn rebind_stack_slot(&mut self, old: InstId, new: InstId) {
        if let Some(key) = self.slot_keys.remove(&old) {
            self.stack_slots.insert(key, new);
            self.slot_keys.insert(new, key);
        }
    }

    /// Refreshes the recorded type of the stack object at (function, offset).
    pub fn set_stack_object_type(&mut self, func: FuncId, offset: i64, ty: &Ty) {
        if let Some(object) = self.stack_objects.get_mut(&(func, offset)) {
            object.type_llvm_ir = ty.to_string();
        }
    }

    // ========== Functions ==========

    /// Returns the function entry at a binary address.
    #[must_use]
    pub fn function_at(&self, addr: u64) -> Option<&ConfigFunction> {
        self.functions.get(&addr)
    }

    /// Returns the config entry of a module function.
    #[must_use]
    pub fn function_of(&self, func: FuncId) -> Option<&ConfigFunction> {
        self.func_addrs
            .get(&func)
            .and_then(|addr| self.functions.get(addr))
    }

    /// Registers a function entry and binds the module function.
    pub fn insert_function(&mut self, func: FuncId, entry: ConfigFunction) {
        self.func_addrs.insert(func, entry.address);
        self.functions.insert(entry.address, entry);
    }

    /// Renames the entry bound to a module function, returning `true` when one
    /// existed.
    pub fn rename_function(&mut self, func: FuncId, name: &str) -> bool {
        let Some(addr) = self.func_addrs.get(&func) else {
            return false;
        };
        match self.functions.get_mut(addr) {
            Some(entry) => {
                entry.name = name.to_string();
                true
            }
            None => false,
        }
    }

    // ========== Crypto patterns ==========

    /// Returns the crypto pattern registered at an address.
    #[must_use]
    pub fn crypto_pattern_at(&self, addr: u64) -> Option<&CryptoPattern> {
        self.crypto.get(&addr)
    }

    /// Registers a crypto pattern at an address.
    pub fn insert_crypto_pattern(&mut self, addr: u64, pattern: CryptoPattern) {
        self.crypto.insert(addr, pattern);
    }

    // ========== Serialization ==========

    /// Serializes the store into its JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFormat`](crate::Error::ConfigFormat) when serialization
    /// fails.
    pub fn to_json_string(&self) -> Result<String> {
        let mut objects: Vec<ConfigObject> = self.objects.values().cloned().collect();
        objects.extend(self.stack_objects.values().cloned());
        objects.extend(self.loaded_stack.values().cloned());
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        let mut functions: Vec<ConfigFunction> = self.functions.values().cloned().collect();
        functions.sort_by_key(|f| f.address);
        let doc = ConfigDoc { objects, functions };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Loads a store from its JSON document.
    ///
    /// Only the document contents are restored; IR bindings are re-established as
    /// objects are materialized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFormat`](crate::Error::ConfigFormat) on malformed input.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let doc: ConfigDoc = serde_json::from_str(text)?;
        let mut store = Self::new();
        for object in doc.objects {
            match &object.storage {
                Storage::Global(addr) => {
                    store.objects.insert(*addr, object);
                }
                Storage::Stack { function, offset } => {
                    store
                        .loaded_stack
                        .insert((function.clone(), *offset), object);
                }
                Storage::Register(_) => {
                    // Register-resident objects have no address key; they are carried
                    // through the document for the emitter but not indexed here.
                }
            }
        }
        for function in doc.functions {
            store.functions.insert(function.address, function);
        }
        Ok(store)
    }
}
