//! Segment table entries of the loaded image.

use bitflags::bitflags;

bitflags! {
    /// Classification flags of an image segment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u8 {
        /// The segment contains executable code.
        const CODE = 1 << 0;

        /// The segment is writable at runtime; its data is not read-only.
        const WRITABLE = 1 << 1;

        /// The segment has backing bytes in the file (not BSS).
        const INITIALIZED = 1 << 2;
    }
}

/// One mapped region of the object file.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Section/segment name as the loader reported it.
    pub(crate) name: String,

    /// Virtual address of the first byte.
    pub(crate) addr: u64,

    /// Size in bytes of the mapped region.
    pub(crate) size: u64,

    /// Offset of the segment's bytes within the image backing, for initialized
    /// segments.
    pub(crate) offset: usize,

    /// Classification flags.
    pub(crate) flags: SegmentFlags,
}

impl Segment {
    /// Returns the segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the virtual address of the first byte.
    #[must_use]
    pub const fn addr(&self) -> u64 {
        self.addr
    }

    /// Returns the segment size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the classification flags.
    #[must_use]
    pub const fn flags(&self) -> SegmentFlags {
        self.flags
    }

    /// Returns `true` if `addr` falls within this segment.
    #[must_use]
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.addr && addr - self.addr < self.size
    }

    /// Returns `true` if this is a code segment.
    #[must_use]
    pub const fn is_code(&self) -> bool {
        self.flags.contains(SegmentFlags::CODE)
    }

    /// Returns `true` if the segment's bytes are read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        !self.flags.contains(SegmentFlags::WRITABLE)
    }

    /// Returns `true` if the segment has backing bytes (not BSS).
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.flags.contains(SegmentFlags::INITIALIZED)
    }
}
