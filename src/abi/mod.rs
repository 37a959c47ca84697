//! Target ABI facts the rewriter depends on.
//!
//! The rewriter itself is architecture-agnostic; everything target-specific it needs is
//! collected here: the natural word width (which doubles as the default type for
//! anything whose type is not yet known), byte order for image reads, and the handful
//! of architecture predicates that gate heuristics.
//!
//! The global-variable materializer relaxes its code-segment check on ARM/Thumb (data
//! is commonly interleaved with code) and on PIC32 (read-only data is routinely left
//! unmarked), so those two predicates are part of the ABI surface.

use crate::ir::Ty;

/// Byte order of the target image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

/// Target architecture family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 32-bit x86.
    X86,
    /// 64-bit x86.
    X86_64,
    /// 32-bit ARM.
    Arm,
    /// ARM in Thumb mode.
    Thumb,
    /// MIPS.
    Mips,
    /// PIC32 (MIPS-based microcontroller).
    Pic32,
    /// 32-bit PowerPC.
    PowerPc,
}

/// Target ABI description.
///
/// # Examples
///
/// ```rust
/// use liftir::abi::{Abi, Arch};
/// use liftir::ir::Ty;
///
/// let abi = Abi::x86_32();
/// assert_eq!(abi.word_bits(), 32);
/// assert_eq!(abi.default_ty(), Ty::Int(32));
/// assert!(!abi.is_arm_or_thumb());
///
/// let arm = Abi::new(Arch::Thumb, 32, liftir::abi::Endian::Little);
/// assert!(arm.is_arm_or_thumb());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abi {
    arch: Arch,
    word_bits: u32,
    endian: Endian,
}

impl Abi {
    /// Creates an ABI description.
    #[must_use]
    pub const fn new(arch: Arch, word_bits: u32, endian: Endian) -> Self {
        Self {
            arch,
            word_bits,
            endian,
        }
    }

    /// 32-bit little-endian x86.
    #[must_use]
    pub const fn x86_32() -> Self {
        Self::new(Arch::X86, 32, Endian::Little)
    }

    /// 64-bit little-endian x86.
    #[must_use]
    pub const fn x86_64() -> Self {
        Self::new(Arch::X86_64, 64, Endian::Little)
    }

    /// 32-bit little-endian ARM.
    #[must_use]
    pub const fn arm() -> Self {
        Self::new(Arch::Arm, 32, Endian::Little)
    }

    /// 32-bit big-endian MIPS.
    #[must_use]
    pub const fn mips() -> Self {
        Self::new(Arch::Mips, 32, Endian::Big)
    }

    /// Returns the architecture family.
    #[must_use]
    pub const fn arch(&self) -> Arch {
        self.arch
    }

    /// Returns the natural word width in bits.
    #[must_use]
    pub const fn word_bits(&self) -> u32 {
        self.word_bits
    }

    /// Returns the natural word width in bytes.
    #[must_use]
    pub const fn word_bytes(&self) -> u64 {
        (self.word_bits / 8) as u64
    }

    /// Returns the image byte order.
    #[must_use]
    pub const fn endian(&self) -> Endian {
        self.endian
    }

    /// Returns the ABI word type: the integer type of the target's natural
    /// pointer/word width. This is the type every lifted value starts with.
    #[must_use]
    pub const fn default_ty(&self) -> Ty {
        Ty::Int(self.word_bits)
    }

    /// Returns a pointer to the ABI word type.
    #[must_use]
    pub fn default_ptr_ty(&self) -> Ty {
        self.default_ty().ptr_to()
    }

    /// Returns `true` on ARM or Thumb, where data is commonly interleaved with code.
    #[must_use]
    pub const fn is_arm_or_thumb(&self) -> bool {
        matches!(self.arch, Arch::Arm | Arch::Thumb)
    }

    /// Returns `true` on PIC32, which does not reliably mark read-only data segments.
    #[must_use]
    pub const fn is_pic32(&self) -> bool {
        matches!(self.arch, Arch::Pic32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ty_tracks_word_width() {
        assert_eq!(Abi::x86_32().default_ty(), Ty::Int(32));
        assert_eq!(Abi::x86_64().default_ty(), Ty::Int(64));
        assert_eq!(Abi::x86_64().word_bytes(), 8);
    }

    #[test]
    fn test_relaxation_predicates() {
        assert!(Abi::arm().is_arm_or_thumb());
        assert!(Abi::new(Arch::Thumb, 32, Endian::Little).is_arm_or_thumb());
        assert!(Abi::new(Arch::Pic32, 32, Endian::Little).is_pic32());
        assert!(!Abi::mips().is_arm_or_thumb());
        assert!(!Abi::x86_32().is_pic32());
    }
}
