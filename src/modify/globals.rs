//! Lazy materialization of global variables from binary addresses.
//!
//! Globals are not created up front: the first pass that wants "the global at
//! 0x804a018" asks [`IrModifier::get_global_variable`], which decides whether a global
//! may legally live there, reads its initializer bytes, and installs the object in
//! both the IR and the config store. Repeated calls for the same address return the
//! same global.
//!
//! # The pre-check
//!
//! Addresses in plain data segments are always accepted. An address inside a code
//! segment (or at a known function entry) is suspicious; it is accepted only when the
//! bytes read as a plausible C string, or when a word probe at the address or one word
//! to either side yields a value that itself addresses data. On ARM/Thumb - where data
//! is routinely interleaved with code - and on PIC32 - which leaves read-only data
//! unmarked - the check is relaxed unless the caller asks for `strict`; every such
//! relaxed accept is counted in [`MaterializeStats`](crate::modify::MaterializeStats)
//! because it may well be a false positive.
//!
//! # Initializers
//!
//! Without an authoritative type (debug info, an existing config entry, or a crypto
//! pattern), the initializer is read by shape: a nice C string becomes a string
//! constant, a word that addresses data becomes a reference to the global at that
//! address (materialized recursively), anything else becomes a plain word. A cycle -
//! the initializer reaching back to the global being built - is broken by substituting
//! the raw word read. If nothing can be read at all, the config entry is kept for
//! later but the IR global is discarded.

use rustc_hash::FxHashSet;

use crate::config::{ConfigObject, Storage};
use crate::debug::DebugInfo;
use crate::image::{is_nice_string, Image, Segment};
use crate::ir::{ConstId, GlobalId, GlobalVar, Value};
use crate::modify::{salt_with_hex, IrModifier};

/// Bound on initializer reference chains followed through the image.
const MAX_REFERENCE_DEPTH: usize = 32;

impl IrModifier<'_> {
    /// Decides whether a global variable may legally be synthesized at `addr`.
    ///
    /// Rejections and relaxed accepts are counted in [`IrModifier::stats`].
    pub fn can_be_created(&mut self, image: &Image, addr: u64, strict: bool) -> bool {
        if !image.has_data_on(addr) {
            self.stats.rejected += 1;
            return false;
        }

        let in_code = self.config.function_at(addr).is_some()
            || image.segment_at(addr).is_some_and(Segment::is_code);
        if !in_code {
            return true;
        }

        if let Some(s) = image.string_at(addr) {
            if is_nice_string(&s) {
                return true;
            }
        }

        let word_bytes = image.word_bytes();
        let probes = [
            Some(addr),
            addr.checked_add(word_bytes),
            addr.checked_sub(word_bytes),
        ];
        for probe in probes.into_iter().flatten() {
            if let Some(word) = image.word_at(probe) {
                if image.has_data_on(word) {
                    return true;
                }
            }
        }

        let abi = *self.module.abi();
        if (abi.is_arm_or_thumb() || abi.is_pic32()) && !strict {
            self.stats.relaxed_accepts += 1;
            return true;
        }

        self.stats.rejected += 1;
        false
    }

    /// Returns (creating on first use) the global variable at `addr`.
    ///
    /// The name hint is salted with the hex form of the address; debug info, an
    /// existing config entry, and crypto-pattern annotations override the default
    /// word type (in that order of authority). Returns `None` when the address fails
    /// the pre-check or no initializer can be read - in the latter case the config
    /// entry is still recorded for later use.
    pub fn get_global_variable(
        &mut self,
        image: &Image,
        debug: Option<&DebugInfo>,
        addr: u64,
        strict: bool,
        name: &str,
    ) -> Option<GlobalId> {
        self.get_global_inner(image, debug, addr, strict, name, 0)
    }

    fn get_global_inner(
        &mut self,
        image: &Image,
        debug: Option<&DebugInfo>,
        addr: u64,
        strict: bool,
        name: &str,
        depth: usize,
    ) -> Option<GlobalId> {
        if !self.can_be_created(image, addr, strict) {
            return None;
        }

        if let Some(existing) = self.config.ir_global_at(addr) {
            return Some(existing);
        }

        let base = if name.is_empty() { "global_var" } else { name };
        let mut final_name = salt_with_hex(base, addr);
        let mut ty = self.module.abi().default_ty();
        let is_constant = image.has_read_only_data_on(addr);
        let mut real_name = String::new();
        let mut from_debug = false;
        let mut wide = false;
        let mut crypto_desc: Option<String> = None;
        let mut init: Option<ConstId> = None;

        if let Some(entry) = debug.and_then(|d| d.global_at(addr)) {
            let (dbg_name, dbg_ty) = (entry.name.clone(), entry.parse_ty());
            if let Some(t) = dbg_ty {
                ty = t;
            }
            init = image.constant_at(self.module, &ty, addr, false);
            final_name.clone_from(&dbg_name);
            real_name = dbg_name;
            from_debug = true;
        }

        let config_entry = self
            .config
            .object_at(addr)
            .map(|o| (o.name.clone(), o.parse_ty(), o.is_wide_string));
        if let Some((cfg_name, cfg_ty, cfg_wide)) = config_entry {
            if let Some(t) = cfg_ty {
                ty = t;
            }
            init = image.constant_at(self.module, &ty, addr, cfg_wide);
            final_name.clone_from(&cfg_name);
            real_name = cfg_name;
            from_debug = true;
            wide = cfg_wide;
        }

        if !from_debug {
            let pattern = self
                .config
                .crypto_pattern_at(addr)
                .map(|p| (p.name.clone(), p.description.clone(), p.ty.clone()));
            if let Some((pat_name, pat_desc, pat_ty)) = pattern {
                ty = pat_ty;
                init = image.constant_at(self.module, &ty, addr, false);
                final_name.clone_from(&pat_name);
                real_name = pat_name;
                from_debug = true;
                crypto_desc = Some(pat_desc);
            }
        }

        // Install the global and its config entry before reading a default
        // initializer: reference chains in the data may lead back here, and the
        // address binding is what stops the recursion.
        let gid = self.module.add_global(
            GlobalVar::new(final_name.clone(), ty.clone())
                .at_address(addr)
                .read_only(is_constant),
        );
        let mut object = ConfigObject::new(final_name.clone(), Storage::Global(addr), &ty);
        object.real_name = real_name;
        object.is_from_debug = from_debug;
        object.is_wide_string = wide;
        object.crypto_description = crypto_desc;
        self.config.insert_global(addr, gid, object);

        if init.is_none() {
            init = self.read_reference_constant(image, debug, addr, gid, depth);
            if let Some(c) = init {
                if self.references_transitively(c, gid) {
                    log::debug!("initializer cycle at {addr:#x}, falling back to a word read");
                    let word_ty = self.module.abi().default_ty();
                    init = image.constant_at(self.module, &word_ty, addr, false);
                }
            }
        }

        let Some(init_c) = init else {
            // Remember the address in the config, but there is nothing the IR side
            // can be initialized with.
            if self.module.users_of(Value::Global(gid)).is_empty() {
                self.config.unbind_global(gid);
                self.module.remove_global(gid);
            }
            return None;
        };

        let init_ty = self.module.constant(init_c).ty().clone();
        let result = if init_ty == ty {
            self.module.set_global_init(gid, Some(init_c));
            gid
        } else {
            // The initializer's true shape wins: rebuild around it and bridge the
            // originally requested pointer type with a constant cast.
            self.module.set_global_name(gid, String::new());
            let ngid = self.module.add_global(
                GlobalVar::new(final_name, init_ty.clone())
                    .at_address(addr)
                    .read_only(is_constant),
            );
            self.module.set_global_init(ngid, Some(init_c));
            let addr_const = self.module.const_global_addr(ngid);
            let conv = match self.convert_constant_to_type(addr_const, &ty.ptr_to()) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("cannot bridge rebuilt global at {addr:#x}: {e}");
                    addr_const
                }
            };
            self.module
                .replace_all_uses_with(Value::Global(gid), Value::Const(conv));
            if self.module.users_of(Value::Global(gid)).is_empty() {
                self.module.remove_global(gid);
            }
            self.config.rebind_global(gid, ngid);
            self.config.set_object_type(addr, &init_ty, wide);
            ngid
        };

        self.stats.created += 1;
        Some(result)
    }

    /// Reads a best-guess initializer at `addr` when no authoritative type is known.
    fn read_reference_constant(
        &mut self,
        image: &Image,
        debug: Option<&DebugInfo>,
        addr: u64,
        this: GlobalId,
        depth: usize,
    ) -> Option<ConstId> {
        if let Some(s) = image.string_at(addr) {
            if is_nice_string(&s) {
                return image.string_const_at(self.module, addr);
            }
        }
        let word = image.word_at(addr)?;
        if word != 0 && image.has_data_on(word) && depth < MAX_REFERENCE_DEPTH {
            if word == addr {
                // Direct self-pointer; the cycle check rewrites this to a word read.
                return Some(self.module.const_global_addr(this));
            }
            if let Some(target) = self.get_global_inner(image, debug, word, false, "", depth + 1) {
                return Some(self.module.const_global_addr(target));
            }
        }
        Some(self.module.const_word(word))
    }

    /// Walks a constant tree, following other globals' initializers, looking for a
    /// reference to `target`.
    fn references_transitively(&self, root: ConstId, target: GlobalId) -> bool {
        let mut seen = FxHashSet::default();
        let mut work = vec![root];
        while let Some(c) = work.pop() {
            if !seen.insert(c) {
                continue;
            }
            let constant = self.module.constant(c);
            if let Some(g) = constant.as_global_addr() {
                if g == target {
                    return true;
                }
                if let Some(init) = self.module.global(g).and_then(GlobalVar::init) {
                    work.push(init);
                }
            }
            work.extend(constant.children());
        }
        false
    }
}
