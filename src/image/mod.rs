//! Read-only view over the loaded object file.
//!
//! The rewriter's only external input is the binary image: initializer bytes for
//! globals, word probes for the materializer's heuristics, and string data. The image
//! is mapped once and treated as immutable for the whole run.
//!
//! # Architecture
//!
//! - **Backing**: either a memory-mapped file or an owned byte buffer
//! - **Segments**: a table of [`Segment`]s classifying address ranges (code vs data,
//!   writable, initialized); loading and segment discovery happen in the loader above
//!   this crate - the table arrives ready-made
//! - **Reads**: byte/word access honoring the target byte order, NUL-terminated
//!   C-string and wide-string reads, and typed constant materialization
//!
//! # Key Components
//!
//! - [`Image`] - the view itself
//! - [`ImageBuilder`] - in-memory construction, used by loaders and tests
//! - [`Segment`] / [`SegmentFlags`] - segment classification
//! - [`is_nice_string`] - the printability heuristic used when deciding whether an
//!   address inside a code segment is really string data

mod segment;

pub use segment::{Segment, SegmentFlags};

use std::path::Path;

use memmap2::Mmap;
use widestring::{U16String, U32String};

use crate::abi::{Abi, Endian};
use crate::ir::{CastOp, ConstId, Constant, Module, Ty};
use crate::Result;

/// Bytes behind the image: a mapping of the file on disk, or an owned buffer.
#[derive(Debug)]
enum Backend {
    Mapped(Mmap),
    Memory(Vec<u8>),
}

impl Backend {
    fn data(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map.as_ref(),
            Self::Memory(buf) => buf.as_slice(),
        }
    }
}

/// Read-only view over the loaded object file.
///
/// # Examples
///
/// ```rust
/// use liftir::abi::Abi;
/// use liftir::image::{ImageBuilder, SegmentFlags};
///
/// let image = ImageBuilder::new(Abi::x86_32())
///     .segment(".data", 0x1000, SegmentFlags::INITIALIZED | SegmentFlags::WRITABLE,
///              &[0x2A, 0x00, 0x00, 0x00])
///     .build();
///
/// assert!(image.has_data_on(0x1000));
/// assert!(!image.has_read_only_data_on(0x1000));
/// assert_eq!(image.word_at(0x1000), Some(42));
/// ```
#[derive(Debug)]
pub struct Image {
    abi: Abi,
    backend: Backend,
    segments: Vec<Segment>,
}

impl Image {
    /// Maps an object file from disk.
    ///
    /// The segment table comes from the loader; offsets index into the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`](crate::Error::FileError) when the file cannot be
    /// opened or mapped.
    pub fn map_file(path: &Path, abi: Abi, segments: Vec<Segment>) -> Result<Image> {
        let file = std::fs::File::open(path)?;
        let map = unsafe { Mmap::map(&file) }?;
        Ok(Image {
            abi,
            backend: Backend::Mapped(map),
            segments,
        })
    }

    /// Returns the target ABI the image was loaded for.
    #[must_use]
    pub const fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Returns the word width in bytes.
    #[must_use]
    pub const fn word_bytes(&self) -> u64 {
        self.abi.word_bytes()
    }

    /// Returns the segment table.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the segment containing `addr`, if any.
    #[must_use]
    pub fn segment_at(&self, addr: u64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(addr))
    }

    /// Returns `true` if the image has initialized bytes at `addr`.
    #[must_use]
    pub fn has_data_on(&self, addr: u64) -> bool {
        self.segment_at(addr).is_some_and(Segment::is_initialized)
    }

    /// Returns `true` if the image has initialized, read-only bytes at `addr`.
    #[must_use]
    pub fn has_read_only_data_on(&self, addr: u64) -> bool {
        self.segment_at(addr)
            .is_some_and(|s| s.is_initialized() && s.is_read_only())
    }

    /// Returns `len` bytes starting at `addr`, confined to one segment.
    #[must_use]
    pub fn bytes_at(&self, addr: u64, len: u64) -> Option<&[u8]> {
        let seg = self.segment_at(addr)?;
        if !seg.is_initialized() {
            return None;
        }
        let into_seg = addr - seg.addr;
        if into_seg.checked_add(len)? > seg.size {
            return None;
        }
        let start = seg.offset.checked_add(usize::try_from(into_seg).ok()?)?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.backend.data().get(start..end)
    }

    /// Returns the byte at `addr`.
    #[must_use]
    pub fn byte_at(&self, addr: u64) -> Option<u8> {
        self.bytes_at(addr, 1).map(|b| b[0])
    }

    /// Reads an unsigned integer of `size` bytes (at most 8) honoring the target byte
    /// order.
    #[must_use]
    pub fn read_uint(&self, addr: u64, size: u64) -> Option<u64> {
        if size == 0 || size > 8 {
            return None;
        }
        Some(Self::fold_bytes(self.bytes_at(addr, size)?, self.abi.endian()) as u64)
    }

    /// Reads an unsigned integer of `size` bytes (at most 16) honoring the target byte
    /// order. Used for the 80-bit x87 encoding.
    #[must_use]
    pub fn read_uint_wide(&self, addr: u64, size: u64) -> Option<u128> {
        if size == 0 || size > 16 {
            return None;
        }
        Some(Self::fold_bytes(self.bytes_at(addr, size)?, self.abi.endian()))
    }

    fn fold_bytes(bytes: &[u8], endian: Endian) -> u128 {
        match endian {
            Endian::Little => bytes
                .iter()
                .rev()
                .fold(0u128, |acc, b| (acc << 8) | u128::from(*b)),
            Endian::Big => bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)),
        }
    }

    /// Reads one ABI word at `addr`.
    #[must_use]
    pub fn word_at(&self, addr: u64) -> Option<u64> {
        self.read_uint(addr, self.word_bytes())
    }

    /// Reads a NUL-terminated byte string at `addr`.
    ///
    /// The scan stops at the segment end; the terminator must be found and the bytes
    /// must be valid UTF-8 for the read to succeed. The result excludes the NUL.
    #[must_use]
    pub fn string_at(&self, addr: u64) -> Option<String> {
        let bytes = self.scan_until_nul(addr, 1)?;
        String::from_utf8(bytes.iter().map(|u| *u as u8).collect()).ok()
    }

    /// Reads a NUL-terminated wide string with `unit_bytes` (2 or 4) units at `addr`.
    #[must_use]
    pub fn wide_string_at(&self, addr: u64, unit_bytes: u64) -> Option<String> {
        let units = self.scan_until_nul(addr, unit_bytes)?;
        match unit_bytes {
            2 => {
                let units: Vec<u16> = units.iter().map(|u| *u as u16).collect();
                U16String::from_vec(units).to_string().ok()
            }
            4 => U32String::from_vec(units).to_string().ok(),
            _ => None,
        }
    }

    /// Scans units of `unit_bytes` from `addr` until a zero unit, exclusive.
    fn scan_until_nul(&self, addr: u64, unit_bytes: u64) -> Option<Vec<u32>> {
        let mut units = Vec::new();
        let mut at = addr;
        loop {
            let unit = self.read_uint(at, unit_bytes)?;
            if unit == 0 {
                return Some(units);
            }
            units.push(u32::try_from(unit).ok()?);
            at = at.checked_add(unit_bytes)?;
        }
    }

    /// Materializes a constant of type `ty` from the bytes at `addr`.
    ///
    /// With `wide_string` set, the bytes are instead interpreted as a NUL-terminated
    /// wide string (unit width taken from `ty` when it is an array of `i16`/`i32`
    /// units, 16-bit otherwise) and the result is typed as the array covering it.
    ///
    /// Returns `None` when the bytes are not there or the type cannot be materialized
    /// (unsized types, integers wider than 64 bits).
    pub fn constant_at(
        &self,
        m: &mut Module,
        ty: &Ty,
        addr: u64,
        wide_string: bool,
    ) -> Option<ConstId> {
        if wide_string {
            return self.wide_string_const_at(m, ty, addr);
        }
        let wb = self.word_bytes();
        match ty {
            Ty::Int(bits) => {
                let value = self.read_uint(addr, ty.store_size(wb)?)?;
                Some(m.const_int(ty.clone(), value))
            }
            Ty::Float(kind) => {
                let bits = self.read_uint_wide(addr, u64::from(kind.bits() / 8))?;
                Some(m.intern_const(Constant::Float {
                    ty: ty.clone(),
                    bits,
                }))
            }
            Ty::Pointer(_) => {
                let word = self.word_at(addr)?;
                if word == 0 {
                    return Some(m.intern_const(Constant::Null(ty.clone())));
                }
                let word_const = m.const_word(word);
                Some(m.intern_const(Constant::Cast {
                    op: CastOp::IntToPtr,
                    value: word_const,
                    ty: ty.clone(),
                }))
            }
            Ty::Array(elem, len) => {
                let stride = aligned_stride(elem, wb)?;
                let mut elems = Vec::with_capacity(usize::try_from(*len).ok()?);
                for i in 0..*len {
                    let at = addr.checked_add(i.checked_mul(stride)?)?;
                    elems.push(self.constant_at(m, elem, at, false)?);
                }
                Some(m.intern_const(Constant::Array {
                    ty: ty.clone(),
                    elems,
                }))
            }
            Ty::Struct(s) => {
                let mut fields = Vec::with_capacity(s.fields.len());
                let mut off = 0u64;
                for field in &s.fields {
                    if !s.packed {
                        off = align_up(off, field.align(wb)?);
                    }
                    fields.push(self.constant_at(m, field, addr.checked_add(off)?, false)?);
                    off = off.checked_add(field.store_size(wb)?)?;
                }
                Some(m.intern_const(Constant::Struct {
                    ty: ty.clone(),
                    fields,
                }))
            }
            Ty::Void | Ty::Function(_) => None,
        }
    }

    /// Materializes a NUL-terminated C string at `addr` as an `[n x i8]` constant.
    ///
    /// The result includes the terminator in both bytes and type.
    pub fn string_const_at(&self, m: &mut Module, addr: u64) -> Option<ConstId> {
        let units = self.scan_until_nul(addr, 1)?;
        let mut bytes: Vec<u8> = units.iter().map(|u| *u as u8).collect();
        bytes.push(0);
        let ty = Ty::Array(Box::new(Ty::Int(8)), bytes.len() as u64);
        Some(m.intern_const(Constant::Str { ty, bytes }))
    }

    fn wide_string_const_at(&self, m: &mut Module, ty: &Ty, addr: u64) -> Option<ConstId> {
        let unit_bits = match ty.array_elem() {
            Some(Ty::Int(bits @ (16 | 32))) => *bits,
            _ => 16,
        };
        let mut units = self.scan_until_nul(addr, u64::from(unit_bits / 8))?;
        units.push(0);
        let ty = Ty::Array(Box::new(Ty::Int(unit_bits)), units.len() as u64);
        Some(m.intern_const(Constant::WideStr {
            ty,
            unit_bits,
            units,
        }))
    }
}

/// Builder for in-memory images.
///
/// Loaders use this to hand over an already-parsed file; tests use it to fabricate
/// small address spaces.
#[derive(Debug)]
pub struct ImageBuilder {
    abi: Abi,
    data: Vec<u8>,
    segments: Vec<Segment>,
}

impl ImageBuilder {
    /// Starts an empty image for the given target.
    #[must_use]
    pub fn new(abi: Abi) -> Self {
        Self {
            abi,
            data: Vec::new(),
            segments: Vec::new(),
        }
    }

    /// Adds an initialized segment with the given bytes.
    #[must_use]
    pub fn segment(mut self, name: &str, addr: u64, flags: SegmentFlags, bytes: &[u8]) -> Self {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        self.segments.push(Segment {
            name: name.to_string(),
            addr,
            size: bytes.len() as u64,
            offset,
            flags: flags | SegmentFlags::INITIALIZED,
        });
        self
    }

    /// Adds an uninitialized (BSS-like) segment.
    #[must_use]
    pub fn bss(mut self, name: &str, addr: u64, size: u64) -> Self {
        self.segments.push(Segment {
            name: name.to_string(),
            addr,
            size,
            offset: 0,
            flags: SegmentFlags::WRITABLE,
        });
        self
    }

    /// Finishes the image.
    #[must_use]
    pub fn build(self) -> Image {
        Image {
            abi: self.abi,
            backend: Backend::Memory(self.data),
            segments: self.segments,
        }
    }
}

/// Returns the in-memory stride of consecutive `elem`s.
fn aligned_stride(elem: &Ty, word_bytes: u64) -> Option<u64> {
    Some(align_up(elem.store_size(word_bytes)?, elem.align(word_bytes)?))
}

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Returns `true` if `s` reads as a plausible C string: non-empty and made entirely
/// of printable ASCII plus blank characters.
///
/// The materializer uses this at ratio 1.0 - a single unprintable byte disqualifies
/// the address from being treated as string data.
#[must_use]
pub fn is_nice_string(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_graphic() || matches!(c, ' ' | '\t' | '\n' | '\r'))
}
