//! Low-level type model for the lifted IR.
//!
//! This module provides the type representation used by every IR value. It mirrors the
//! shape of machine-level types rather than source-level ones: integers of arbitrary bit
//! width, the four hardware floating-point widths, typed pointers, and the two aggregate
//! forms (arrays and structs) that lifting occasionally produces.
//!
//! # Design Rationale
//!
//! The `Ty` enum is designed to be:
//! - **Fast to compare**: structural equality, no interning context needed
//! - **Self-contained**: width, element, and index queries resolve without a module
//! - **Round-trippable**: [`Ty`] has a textual form (`Display`) and a parser
//!   ([`Ty::parse`]) so the configuration database and debug info can carry types as
//!   strings
//!
//! # Type Categories
//!
//! - **Primitives**: `Void`, `Int(bits)`, `Float(kind)`
//! - **Derived**: `Pointer`, `Array`, `Struct`, `Function`

use std::fmt;

/// Hardware floating-point widths.
///
/// These are the only float widths machine code produces; everything else is an integer
/// in disguise and is routed through integer types by the conversion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    /// 16-bit half-precision float.
    Half,

    /// 32-bit single-precision float.
    Single,

    /// 64-bit double-precision float.
    Double,

    /// 80-bit x87 extended-precision float.
    X87Fp80,
}

impl FloatKind {
    /// Returns the width of this float kind in bits.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        match self {
            Self::Half => 16,
            Self::Single => 32,
            Self::Double => 64,
            Self::X87Fp80 => 80,
        }
    }

    /// Returns the float kind of the given bit width, if one exists.
    ///
    /// Only 16, 32, 64, and 80 map to a kind; any other width has no hardware float and
    /// must be bridged through an integer type.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            16 => Some(Self::Half),
            32 => Some(Self::Single),
            64 => Some(Self::Double),
            80 => Some(Self::X87Fp80),
            _ => None,
        }
    }
}

/// A struct type: an ordered field list, optionally packed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructTy {
    /// Field types in declaration order.
    pub fields: Vec<Ty>,
    /// `true` if the struct has no inter-field padding.
    pub packed: bool,
}

/// A function type: return type, parameters, and variadic flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnTy {
    /// Return type.
    pub ret: Ty,
    /// Parameter types in order.
    pub params: Vec<Ty>,
    /// `true` if the function accepts additional variadic arguments.
    pub vararg: bool,
}

/// A low-level IR type.
///
/// Every IR value carries exactly one `Ty`. Integer widths are arbitrary (the lifter and
/// the conversion engine both produce odd widths such as `i24` on occasion); float widths
/// are restricted to the hardware set in [`FloatKind`].
///
/// # Examples
///
/// ```rust
/// use liftir::ir::Ty;
///
/// let word = Ty::Int(32);
/// let ptr = word.clone().ptr_to();
///
/// assert!(word.is_integer());
/// assert!(ptr.is_pointer());
/// assert_eq!(ptr.pointee(), Some(&word));
/// assert_eq!(ptr.to_string(), "i32*");
/// assert_eq!(Ty::parse("i32*"), Some(ptr));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    /// The absence of a value. Only valid as a function return type.
    Void,

    /// Integer of the given bit width. The width is arbitrary and non-zero.
    Int(u32),

    /// Floating-point value of one of the hardware widths.
    Float(FloatKind),

    /// Typed pointer. The element type is recoverable via [`Ty::pointee`].
    Pointer(Box<Ty>),

    /// Fixed-length array of a single element type.
    Array(Box<Ty>, u64),

    /// Struct with an ordered field list.
    Struct(StructTy),

    /// Function signature type.
    Function(Box<FnTy>),
}

impl Ty {
    /// Returns `true` if this is the void type.
    #[must_use]
    pub const fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Returns `true` if this is an integer type.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// Returns `true` if this is a floating-point type.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    /// Returns `true` if this is a pointer type.
    #[must_use]
    pub const fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_))
    }

    /// Returns `true` if this is an array type.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_, _))
    }

    /// Returns `true` if this is a struct type.
    #[must_use]
    pub const fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// Returns `true` if this is an aggregate type (array or struct).
    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::Array(_, _) | Self::Struct(_))
    }

    /// Returns `true` if this is a function type.
    #[must_use]
    pub const fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Returns `true` if a value of this type occupies storage.
    ///
    /// `Void` and `Function` are unsized; everything else can be allocated, loaded, and
    /// stored. Stack slot allocation falls back to the ABI word type when asked for an
    /// unsized type.
    #[must_use]
    pub fn is_sized(&self) -> bool {
        match self {
            Self::Void | Self::Function(_) => false,
            Self::Int(_) | Self::Float(_) | Self::Pointer(_) => true,
            Self::Array(elem, _) => elem.is_sized(),
            Self::Struct(s) => s.fields.iter().all(Ty::is_sized),
        }
    }

    /// Returns the bit width of this type, if it is a primitive.
    ///
    /// Pointers have no intrinsic width here; their width is a property of the target
    /// ABI, not of the type.
    #[must_use]
    pub const fn bit_width(&self) -> Option<u32> {
        match self {
            Self::Int(bits) => Some(*bits),
            Self::Float(kind) => Some(kind.bits()),
            _ => None,
        }
    }

    /// Returns the pointed-to type if this is a pointer.
    #[must_use]
    pub fn pointee(&self) -> Option<&Ty> {
        match self {
            Self::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns the element type if this is an array.
    #[must_use]
    pub fn array_elem(&self) -> Option<&Ty> {
        match self {
            Self::Array(elem, _) => Some(elem),
            _ => None,
        }
    }

    /// Returns the array length if this is an array.
    #[must_use]
    pub const fn array_len(&self) -> Option<u64> {
        match self {
            Self::Array(_, len) => Some(*len),
            _ => None,
        }
    }

    /// Returns the type at the given index of an aggregate.
    ///
    /// For arrays any in-range index yields the element type; for structs the index
    /// selects a field. `None` for non-aggregates and out-of-range indices.
    #[must_use]
    pub fn type_at_index(&self, index: u32) -> Option<&Ty> {
        match self {
            Self::Array(elem, len) => (u64::from(index) < *len).then(|| elem.as_ref()),
            Self::Struct(s) => s.fields.get(index as usize),
            _ => None,
        }
    }

    /// Returns the number of contained elements of an aggregate.
    #[must_use]
    pub fn element_count(&self) -> Option<u64> {
        match self {
            Self::Array(_, len) => Some(*len),
            Self::Struct(s) => Some(s.fields.len() as u64),
            _ => None,
        }
    }

    /// Wraps this type in a pointer.
    #[must_use]
    pub fn ptr_to(self) -> Ty {
        Ty::Pointer(Box::new(self))
    }

    /// Returns the size in bytes a value of this type occupies in the image.
    ///
    /// `ptr_bytes` supplies the target pointer width. Structs are laid out with natural
    /// alignment unless packed; arrays use the aligned element stride. `None` for
    /// unsized types and integers wider than 64 bits (which the image reader does not
    /// materialize).
    #[must_use]
    pub fn store_size(&self, ptr_bytes: u64) -> Option<u64> {
        match self {
            Self::Void | Self::Function(_) => None,
            Self::Int(bits) => (*bits <= 64).then_some(u64::from((bits + 7) / 8)),
            Self::Float(kind) => Some(u64::from(kind.bits() / 8)),
            Self::Pointer(_) => Some(ptr_bytes),
            Self::Array(elem, len) => {
                let stride = align_to(elem.store_size(ptr_bytes)?, elem.align(ptr_bytes)?);
                stride.checked_mul(*len)
            }
            Self::Struct(s) => {
                let mut size = 0u64;
                let mut max_align = 1u64;
                for field in &s.fields {
                    let fsize = field.store_size(ptr_bytes)?;
                    if !s.packed {
                        let falign = field.align(ptr_bytes)?;
                        size = align_to(size, falign);
                        max_align = max_align.max(falign);
                    }
                    size = size.checked_add(fsize)?;
                }
                if !s.packed {
                    size = align_to(size, max_align);
                }
                Some(size)
            }
        }
    }

    /// Returns the natural alignment in bytes, capped at the pointer width.
    #[must_use]
    pub fn align(&self, ptr_bytes: u64) -> Option<u64> {
        match self {
            Self::Void | Self::Function(_) => None,
            Self::Int(_) | Self::Float(_) | Self::Pointer(_) => {
                Some(self.store_size(ptr_bytes)?.next_power_of_two().min(ptr_bytes.max(1)))
            }
            Self::Array(elem, _) => elem.align(ptr_bytes),
            Self::Struct(s) => {
                if s.packed {
                    return Some(1);
                }
                let mut max_align = 1u64;
                for field in &s.fields {
                    max_align = max_align.max(field.align(ptr_bytes)?);
                }
                Some(max_align)
            }
        }
    }

    /// Parses a type from its textual form.
    ///
    /// The grammar is the one `Display` emits: `void`, `iN`, `half`/`float`/`double`/
    /// `x86_fp80`, `[N x T]`, `{ T, ... }`, `<{ T, ... }>`, `T (T, ...)` with an
    /// optional trailing `...` for variadic signatures, and any number of `*` suffixes.
    /// Returns `None` on malformed input - type strings arrive from debug info and
    /// config documents, both of which are best-effort sources.
    #[must_use]
    pub fn parse(text: &str) -> Option<Ty> {
        let mut p = TyParser::new(text);
        let ty = p.parse_ty()?;
        p.skip_ws();
        p.at_end().then_some(ty)
    }
}

fn align_to(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Int(bits) => write!(f, "i{bits}"),
            Self::Float(FloatKind::Half) => write!(f, "half"),
            Self::Float(FloatKind::Single) => write!(f, "float"),
            Self::Float(FloatKind::Double) => write!(f, "double"),
            Self::Float(FloatKind::X87Fp80) => write!(f, "x86_fp80"),
            Self::Pointer(inner) => write!(f, "{inner}*"),
            Self::Array(elem, len) => write!(f, "[{len} x {elem}]"),
            Self::Struct(s) => {
                if s.fields.is_empty() {
                    return write!(f, "{}", if s.packed { "<{}>" } else { "{}" });
                }
                if s.packed {
                    write!(f, "<{{ ")?;
                } else {
                    write!(f, "{{ ")?;
                }
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                if s.packed {
                    write!(f, " }}>")
                } else {
                    write!(f, " }}")
                }
            }
            Self::Function(sig) => {
                write!(f, "{} (", sig.ret)?;
                for (i, param) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                if sig.vararg {
                    if sig.params.is_empty() {
                        write!(f, "...")?;
                    } else {
                        write!(f, ", ...")?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

/// Recursive-descent parser over the textual type grammar.
struct TyParser<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> TyParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text: text.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.text[self.pos..].starts_with(s.as_bytes()) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn parse_u64(&mut self) -> Option<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.text[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    /// Parses a full type, including function-type and pointer suffixes.
    fn parse_ty(&mut self) -> Option<Ty> {
        let mut ty = self.parse_base()?;
        loop {
            self.skip_ws();
            if self.eat(b'*') {
                ty = ty.ptr_to();
            } else if self.peek() == Some(b'(') {
                ty = self.parse_fn_suffix(ty)?;
            } else {
                return Some(ty);
            }
        }
    }

    fn parse_fn_suffix(&mut self, ret: Ty) -> Option<Ty> {
        if !self.eat(b'(') {
            return None;
        }
        let mut params = Vec::new();
        let mut vararg = false;
        self.skip_ws();
        if !self.eat(b')') {
            loop {
                self.skip_ws();
                if self.eat_str("...") {
                    vararg = true;
                    self.skip_ws();
                    if !self.eat(b')') {
                        return None;
                    }
                    break;
                }
                params.push(self.parse_ty()?);
                self.skip_ws();
                if self.eat(b')') {
                    break;
                }
                if !self.eat(b',') {
                    return None;
                }
            }
        }
        Some(Ty::Function(Box::new(FnTy {
            ret,
            params,
            vararg,
        })))
    }

    fn parse_base(&mut self) -> Option<Ty> {
        self.skip_ws();
        match self.peek()? {
            b'i' => {
                self.pos += 1;
                let bits = self.parse_u64()?;
                (bits > 0 && bits <= u64::from(u32::MAX)).then(|| Ty::Int(bits as u32))
            }
            b'[' => {
                self.pos += 1;
                self.skip_ws();
                let len = self.parse_u64()?;
                self.skip_ws();
                if self.bump()? != b'x' {
                    return None;
                }
                let elem = self.parse_ty()?;
                self.skip_ws();
                self.eat(b']').then(|| Ty::Array(Box::new(elem), len))
            }
            b'{' => {
                self.pos += 1;
                self.parse_struct_body(false)
            }
            b'<' => {
                self.pos += 1;
                self.skip_ws();
                if !self.eat(b'{') {
                    return None;
                }
                let ty = self.parse_struct_body(true)?;
                self.skip_ws();
                self.eat(b'>').then_some(ty)
            }
            _ => {
                if self.eat_str("void") {
                    Some(Ty::Void)
                } else if self.eat_str("half") {
                    Some(Ty::Float(FloatKind::Half))
                } else if self.eat_str("float") {
                    Some(Ty::Float(FloatKind::Single))
                } else if self.eat_str("double") {
                    Some(Ty::Float(FloatKind::Double))
                } else if self.eat_str("x86_fp80") {
                    Some(Ty::Float(FloatKind::X87Fp80))
                } else {
                    None
                }
            }
        }
    }

    fn parse_struct_body(&mut self, packed: bool) -> Option<Ty> {
        let mut fields = Vec::new();
        self.skip_ws();
        if !self.eat(b'}') {
            loop {
                fields.push(self.parse_ty()?);
                self.skip_ws();
                if self.eat(b'}') {
                    break;
                }
                if !self.eat(b',') {
                    return None;
                }
            }
        }
        Some(Ty::Struct(StructTy { fields, packed }))
    }
}
