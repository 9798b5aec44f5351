//! Reference-counted storage cells and the copy-on-write machinery.
//!
//! A [`StrBuf`] is a heap cell carrying a plain (non-atomic) reference count
//! and one payload: single-byte data with Latin-1 value semantics, wide
//! (`char`) data, or a UTF-8 byte image that only ever exists as a cached
//! projection of one of the other two. [`BufRef`] is the owning handle;
//! cloning one bumps the count, dropping one releases the cell through the
//! pool when the count reaches zero.
//!
//! # Mutation discipline
//!
//! The payload lives in an `UnsafeCell` so that shared handles can lazily
//! build projection caches, but actual mutation is only legal when it cannot
//! alias another borrow:
//!
//! * `payload_mut` is only called on cells with `refs < 2` (reached through
//!   the facade's `&mut` methods, or on a cell that was just allocated and
//!   has a single handle). A second live handle forces every mutator down
//!   the copy path, so a view borrowed through one handle can never watch
//!   bytes move under it.
//! * The projection cache slots live next to the payload in plain `Cell`s,
//!   never inside it. Building or dropping a cache therefore does not
//!   invalidate an outstanding payload borrow, and the handle cloned out of
//!   a slot keeps the projection alive for as long as a view closure runs,
//!   even if the slot itself is invalidated meanwhile.
//!
//! Mutators consume the caller's handle and return the resulting one (or
//! `None` when the content vanished entirely); the caller rebinds. Combined
//! with handle-based counting this reproduces the usual copy-on-write
//! bookkeeping without any manual increment/decrement pairs.

use crate::pool;
use crate::utf8;
use smallvec::SmallVec;
use std::cell::{Cell, UnsafeCell};
use std::cmp::Ordering;
use std::fmt;
use std::ptr::NonNull;

use memchr::{memchr, memmem};

/// Payload encoding of a cell.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Encoding {
    /// One byte per character, Latin-1 value semantics.
    SingleByte,
    /// One `char` per character.
    Wide,
    /// UTF-8 bytes; only ever a cached projection, never a primary buffer.
    Utf8,
}

pub(crate) enum Payload {
    Byte {
        data: Box<[u8]>,
        len: usize,
    },
    Wide {
        data: Box<[char]>,
        len: usize,
    },
    Utf8 {
        data: Box<[u8]>,
        bytes: usize,
        chars: usize,
    },
}

impl Payload {
    fn chars(&self) -> PayloadChars {
        match self {
            Payload::Byte { data, len } => PayloadChars::Bytes(data[..*len].iter()),
            Payload::Wide { data, len } => PayloadChars::Wide(data[..*len].iter()),
            // A Utf8 cell is never a comparison operand.
            Payload::Utf8 { .. } => PayloadChars::Bytes([].iter()),
        }
    }
}

/// Character iterator over a payload, widening Latin-1 bytes on the fly.
enum PayloadChars<'a> {
    Bytes(std::slice::Iter<'a, u8>),
    Wide(std::slice::Iter<'a, char>),
}

impl<'a> Iterator for PayloadChars<'a> {
    type Item = char;
    fn next(&mut self) -> Option<char> {
        match self {
            PayloadChars::Bytes(it) => it.next().map(|&b| b as char),
            PayloadChars::Wide(it) => it.next().copied(),
        }
    }
}

pub(crate) struct StrBuf {
    refs: Cell<usize>,
    payload: UnsafeCell<Payload>,
    // Cached cross-encoding projections, keyed by target encoding. Disjoint
    // from `payload` so cache traffic cannot invalidate payload borrows.
    cache_byte: Cell<Option<BufRef>>,
    cache_wide: Cell<Option<BufRef>>,
    cache_utf8: Cell<Option<BufRef>>,
}

impl StrBuf {
    fn payload(&self) -> &Payload {
        unsafe { &*self.payload.get() }
    }

    // Callers uphold the mutation discipline from the module comment.
    #[allow(clippy::mut_from_ref)]
    unsafe fn payload_mut(&self) -> &mut Payload {
        &mut *self.payload.get()
    }
}

fn new_cell(payload: Payload) -> BufRef {
    let b = Box::new(StrBuf {
        refs: Cell::new(1),
        payload: UnsafeCell::new(payload),
        cache_byte: Cell::new(None),
        cache_wide: Cell::new(None),
        cache_utf8: Cell::new(None),
    });
    BufRef(NonNull::from(Box::leak(b)))
}

/// Fresh pooled-shape cell: zeroed storage of exactly `capacity`, length 0.
pub(crate) fn alloc_cell(enc: Encoding, capacity: usize) -> BufRef {
    let payload = match enc {
        Encoding::SingleByte => Payload::Byte {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        },
        Encoding::Wide => Payload::Wide {
            data: vec!['\0'; capacity].into_boxed_slice(),
            len: 0,
        },
        Encoding::Utf8 => unreachable!("utf8 cells are built from their exact image"),
    };
    new_cell(payload)
}

pub(crate) fn byte_cell_from(src: &[u8]) -> BufRef {
    debug_assert!(!src.is_empty());
    let h = pool::acquire(Encoding::SingleByte, src.len());
    h.set_bytes(src);
    h
}

pub(crate) fn wide_cell_from(src: &[char]) -> BufRef {
    debug_assert!(!src.is_empty());
    let h = pool::acquire(Encoding::Wide, src.len());
    h.set_wide(src);
    h
}

/// Runs `f` over the writable prefix of a freshly acquired byte cell and
/// commits `n` as its length.
pub(crate) fn fill_bytes_with(h: &BufRef, n: usize, f: impl FnOnce(&mut [u8])) {
    debug_assert!(h.cell().refs.get() == 1 && n <= h.capacity());
    match unsafe { h.cell().payload_mut() } {
        Payload::Byte { data, len } => {
            f(&mut data[..n]);
            *len = n;
        }
        _ => unreachable!(),
    }
}

pub(crate) fn fill_wide_with(h: &BufRef, n: usize, f: impl FnOnce(&mut [char])) {
    debug_assert!(h.cell().refs.get() == 1 && n <= h.capacity());
    match unsafe { h.cell().payload_mut() } {
        Payload::Wide { data, len } => {
            f(&mut data[..n]);
            *len = n;
        }
        _ => unreachable!(),
    }
}

/// Owning handle to a [`StrBuf`].
pub(crate) struct BufRef(NonNull<StrBuf>);

impl Clone for BufRef {
    fn clone(&self) -> BufRef {
        let c = self.cell();
        c.refs.set(c.refs.get() + 1);
        BufRef(self.0)
    }
}

impl Drop for BufRef {
    fn drop(&mut self) {
        let c = self.cell();
        let r = c.refs.get();
        debug_assert!(r > 0);
        c.refs.set(r - 1);
        if r == 1 {
            pool::release_cell(self.0);
        }
    }
}

impl fmt::Debug for BufRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BufRef")
            .field("encoding", &self.encoding())
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("refs", &self.cell().refs.get())
            .finish()
    }
}

impl BufRef {
    fn cell(&self) -> &StrBuf {
        // The handle owns one count on the cell, so the cell is alive.
        unsafe { self.0.as_ref() }
    }

    pub(crate) fn ptr_id(&self) -> usize {
        self.0.as_ptr() as usize
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> usize {
        self.cell().refs.get()
    }

    pub(crate) fn encoding(&self) -> Encoding {
        match self.cell().payload() {
            Payload::Byte { .. } => Encoding::SingleByte,
            Payload::Wide { .. } => Encoding::Wide,
            Payload::Utf8 { .. } => Encoding::Utf8,
        }
    }

    /// Character count.
    pub(crate) fn len(&self) -> usize {
        match self.cell().payload() {
            Payload::Byte { len, .. } => *len,
            Payload::Wide { len, .. } => *len,
            Payload::Utf8 { chars, .. } => *chars,
        }
    }

    /// Maximum character count the storage can hold without reallocating.
    pub(crate) fn capacity(&self) -> usize {
        match self.cell().payload() {
            Payload::Byte { data, .. } => data.len(),
            Payload::Wide { data, .. } => data.len(),
            Payload::Utf8 { data, .. } => data.len(),
        }
    }

    /// UTF-8 byte count of the content.
    pub(crate) fn byte_len(&self) -> usize {
        match self.cell().payload() {
            Payload::Byte { data, len } => data[..*len]
                .iter()
                .map(|&b| if b < 0x80 { 1 } else { 2 })
                .sum(),
            Payload::Wide { data, len } => utf8::encoded_len_of_wide(&data[..*len]),
            Payload::Utf8 { bytes, .. } => *bytes,
        }
    }

    pub(crate) fn char_at(&self, idx: usize) -> Option<char> {
        match self.cell().payload() {
            Payload::Byte { data, len } => {
                if idx < *len {
                    Some(data[idx] as char)
                } else {
                    None
                }
            }
            Payload::Wide { data, len } => {
                if idx < *len {
                    Some(data[idx])
                } else {
                    None
                }
            }
            Payload::Utf8 { .. } => None,
        }
    }

    fn set_bytes(&self, src: &[u8]) {
        debug_assert!(self.cell().refs.get() == 1 && src.len() <= self.capacity());
        match unsafe { self.cell().payload_mut() } {
            Payload::Byte { data, len } => {
                data[..src.len()].copy_from_slice(src);
                *len = src.len();
            }
            _ => unreachable!(),
        }
    }

    fn set_wide(&self, src: &[char]) {
        debug_assert!(self.cell().refs.get() == 1 && src.len() <= self.capacity());
        match unsafe { self.cell().payload_mut() } {
            Payload::Wide { data, len } => {
                data[..src.len()].copy_from_slice(src);
                *len = src.len();
            }
            _ => unreachable!(),
        }
    }

    // ---------------------------------------------------------------------
    // Views and projection caches

    /// Single-byte view; characters above 0xFF render as `?`. This is the
    /// only lossy conversion and it only happens when explicitly asked for.
    pub(crate) fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        if let Payload::Byte { data, len } = self.cell().payload() {
            return f(&data[..*len]);
        }
        let p = self.byte_projection();
        match p.cell().payload() {
            Payload::Byte { data, len } => f(&data[..*len]),
            _ => unreachable!(),
        }
    }

    pub(crate) fn with_wide<R>(&self, f: impl FnOnce(&[char]) -> R) -> R {
        if let Payload::Wide { data, len } = self.cell().payload() {
            return f(&data[..*len]);
        }
        let p = self.wide_projection();
        match p.cell().payload() {
            Payload::Wide { data, len } => f(&data[..*len]),
            _ => unreachable!(),
        }
    }

    pub(crate) fn with_utf8<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        if let Payload::Utf8 { data, bytes, .. } = self.cell().payload() {
            // Utf8 payloads are encoded here from validated characters.
            return f(unsafe { std::str::from_utf8_unchecked(&data[..*bytes]) });
        }
        let p = self.utf8_projection();
        match p.cell().payload() {
            Payload::Utf8 { data, bytes, .. } => {
                f(unsafe { std::str::from_utf8_unchecked(&data[..*bytes]) })
            }
            _ => unreachable!(),
        }
    }

    fn byte_projection(&self) -> BufRef {
        let c = self.cell();
        cached(&c.cache_byte, || match c.payload() {
            Payload::Wide { data, len } => {
                let mut out = Vec::with_capacity(*len);
                for &ch in &data[..*len] {
                    out.push(if (ch as u32) <= 0xFF { ch as u8 } else { b'?' });
                }
                byte_cell_from(&out)
            }
            _ => unreachable!(),
        })
    }

    fn wide_projection(&self) -> BufRef {
        let c = self.cell();
        cached(&c.cache_wide, || match c.payload() {
            Payload::Byte { data, len } => {
                let wide: Vec<char> = data[..*len].iter().map(|&b| b as char).collect();
                wide_cell_from(&wide)
            }
            _ => unreachable!(),
        })
    }

    fn utf8_projection(&self) -> BufRef {
        let c = self.cell();
        cached(&c.cache_utf8, || {
            let (data, chars) = match c.payload() {
                Payload::Byte { data, len } => {
                    let mut out = Vec::with_capacity(*len);
                    let mut tmp = [0u8; 4];
                    for &b in &data[..*len] {
                        let n = utf8::encode_one(b as u32, &mut tmp);
                        out.extend_from_slice(&tmp[..n]);
                    }
                    (out, *len)
                }
                Payload::Wide { data, len } => (utf8::encode_from_wide(&data[..*len]), *len),
                Payload::Utf8 { .. } => unreachable!(),
            };
            let bytes = data.len();
            new_cell(Payload::Utf8 {
                data: data.into_boxed_slice(),
                bytes,
                chars,
            })
        })
    }

    fn drop_caches(&self) {
        let c = self.cell();
        c.cache_byte.take();
        c.cache_wide.take();
        c.cache_utf8.take();
    }

    // ---------------------------------------------------------------------
    // Copy-on-write gate

    /// The copy-on-write gate: shared cells are deep-copied, uniquely owned
    /// cells are handed back with their projection caches dropped (their
    /// primary content is about to change). Every mutation routes through
    /// here or re-checks the same condition for its in-place fast path.
    pub(crate) fn fork_for_write(self) -> BufRef {
        if self.cell().refs.get() > 1 {
            return self.deep_clone();
        }
        self.drop_caches();
        self
    }

    fn deep_clone(&self) -> BufRef {
        match self.cell().payload() {
            Payload::Byte { data, len } => byte_cell_from(&data[..*len]),
            Payload::Wide { data, len } => wide_cell_from(&data[..*len]),
            Payload::Utf8 { .. } => unreachable!(),
        }
    }

    /// Whether an in-place rewrite up to `new_len` is allowed.
    fn writable_to(&self, new_len: usize) -> bool {
        new_len <= self.capacity() && self.cell().refs.get() < 2
    }

    /// Rebuilds this cell's content as a wide primary.
    pub(crate) fn to_wide_primary(self) -> BufRef {
        if self.encoding() == Encoding::Wide {
            return self;
        }
        let old = self.len();
        let h = pool::acquire(Encoding::Wide, old);
        match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
            (Payload::Byte { data: a, .. }, Payload::Wide { data: d, len: l }) => {
                for (dst, &b) in d.iter_mut().zip(&a[..old]) {
                    *dst = b as char;
                }
                *l = old;
            }
            _ => unreachable!(),
        }
        h
    }

    // ---------------------------------------------------------------------
    // Mutators: consume the handle, return the resulting one

    pub(crate) fn append_from(self, other: &BufRef, count: usize) -> BufRef {
        debug_assert!(count > 0);
        match other.cell().payload() {
            Payload::Byte { data, len } => self.append_bytes(&data[..count.min(*len)]),
            Payload::Wide { data, len } => self.append_wide(&data[..count.min(*len)]),
            Payload::Utf8 { .. } => unreachable!(),
        }
    }

    pub(crate) fn append_bytes(self, other: &[u8]) -> BufRef {
        debug_assert!(!other.is_empty());
        match self.encoding() {
            Encoding::SingleByte => {
                let old = self.len();
                let new_len = old + other.len();
                if self.writable_to(new_len) {
                    self.drop_caches();
                    match unsafe { self.cell().payload_mut() } {
                        Payload::Byte { data, len } => {
                            data[old..new_len].copy_from_slice(other);
                            *len = new_len;
                        }
                        _ => unreachable!(),
                    }
                    return self;
                }
                let h = pool::acquire(Encoding::SingleByte, new_len);
                match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
                    (Payload::Byte { data: a, .. }, Payload::Byte { data: d, len: l }) => {
                        d[..old].copy_from_slice(&a[..old]);
                        d[old..new_len].copy_from_slice(other);
                        *l = new_len;
                    }
                    _ => unreachable!(),
                }
                h
            }
            Encoding::Wide => {
                let wide: SmallVec<[char; 32]> = other.iter().map(|&b| b as char).collect();
                self.append_wide(&wide)
            }
            Encoding::Utf8 => unreachable!(),
        }
    }

    pub(crate) fn append_wide(self, other: &[char]) -> BufRef {
        debug_assert!(!other.is_empty());
        match self.encoding() {
            Encoding::Wide => {
                let old = self.len();
                let new_len = old + other.len();
                if self.writable_to(new_len) {
                    self.drop_caches();
                    match unsafe { self.cell().payload_mut() } {
                        Payload::Wide { data, len } => {
                            data[old..new_len].copy_from_slice(other);
                            *len = new_len;
                        }
                        _ => unreachable!(),
                    }
                    return self;
                }
                let h = pool::acquire(Encoding::Wide, new_len);
                match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
                    (Payload::Wide { data: a, .. }, Payload::Wide { data: d, len: l }) => {
                        d[..old].copy_from_slice(&a[..old]);
                        d[old..new_len].copy_from_slice(other);
                        *l = new_len;
                    }
                    _ => unreachable!(),
                }
                h
            }
            // Appending wide data to a byte cell promotes the result.
            Encoding::SingleByte => {
                let old = self.len();
                let new_len = old + other.len();
                let h = pool::acquire(Encoding::Wide, new_len);
                match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
                    (Payload::Byte { data: a, .. }, Payload::Wide { data: d, len: l }) => {
                        for (dst, &b) in d.iter_mut().zip(&a[..old]) {
                            *dst = b as char;
                        }
                        d[old..new_len].copy_from_slice(other);
                        *l = new_len;
                    }
                    _ => unreachable!(),
                }
                h
            }
            Encoding::Utf8 => unreachable!(),
        }
    }

    pub(crate) fn insert_from(self, pos: usize, other: &BufRef, count: usize) -> BufRef {
        debug_assert!(count > 0);
        match other.cell().payload() {
            Payload::Byte { data, len } => self.insert_bytes(pos, &data[..count.min(*len)]),
            Payload::Wide { data, len } => self.insert_wide(pos, &data[..count.min(*len)]),
            Payload::Utf8 { .. } => unreachable!(),
        }
    }

    pub(crate) fn insert_bytes(self, pos: usize, src: &[u8]) -> BufRef {
        debug_assert!(!src.is_empty() && pos < self.len());
        match self.encoding() {
            Encoding::SingleByte => {
                let old = self.len();
                let new_len = old + src.len();
                if self.writable_to(new_len) {
                    self.drop_caches();
                    match unsafe { self.cell().payload_mut() } {
                        Payload::Byte { data, len } => {
                            data.copy_within(pos..old, pos + src.len());
                            data[pos..pos + src.len()].copy_from_slice(src);
                            *len = new_len;
                        }
                        _ => unreachable!(),
                    }
                    return self;
                }
                let h = pool::acquire(Encoding::SingleByte, new_len);
                match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
                    (Payload::Byte { data: a, .. }, Payload::Byte { data: d, len: l }) => {
                        d[..pos].copy_from_slice(&a[..pos]);
                        d[pos..pos + src.len()].copy_from_slice(src);
                        d[pos + src.len()..new_len].copy_from_slice(&a[pos..old]);
                        *l = new_len;
                    }
                    _ => unreachable!(),
                }
                h
            }
            Encoding::Wide => {
                let wide: SmallVec<[char; 32]> = src.iter().map(|&b| b as char).collect();
                self.insert_wide(pos, &wide)
            }
            Encoding::Utf8 => unreachable!(),
        }
    }

    pub(crate) fn insert_wide(self, pos: usize, src: &[char]) -> BufRef {
        debug_assert!(!src.is_empty() && pos < self.len());
        match self.encoding() {
            Encoding::Wide => {
                let old = self.len();
                let new_len = old + src.len();
                if self.writable_to(new_len) {
                    self.drop_caches();
                    match unsafe { self.cell().payload_mut() } {
                        Payload::Wide { data, len } => {
                            data.copy_within(pos..old, pos + src.len());
                            data[pos..pos + src.len()].copy_from_slice(src);
                            *len = new_len;
                        }
                        _ => unreachable!(),
                    }
                    return self;
                }
                let h = pool::acquire(Encoding::Wide, new_len);
                match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
                    (Payload::Wide { data: a, .. }, Payload::Wide { data: d, len: l }) => {
                        d[..pos].copy_from_slice(&a[..pos]);
                        d[pos..pos + src.len()].copy_from_slice(src);
                        d[pos + src.len()..new_len].copy_from_slice(&a[pos..old]);
                        *l = new_len;
                    }
                    _ => unreachable!(),
                }
                h
            }
            Encoding::SingleByte => self.to_wide_primary().insert_wide(pos, src),
            Encoding::Utf8 => unreachable!(),
        }
    }

    /// Removes `count` characters at `pos`. The facade never deletes the
    /// whole content through here (that is a plain release).
    pub(crate) fn delete_range(self, pos: usize, count: usize) -> BufRef {
        let old = self.len();
        debug_assert!(count > 0 && pos + count <= old && count < old);
        let new_len = old - count;
        if self.cell().refs.get() < 2 {
            self.drop_caches();
            match unsafe { self.cell().payload_mut() } {
                Payload::Byte { data, len } => {
                    data.copy_within(pos + count..old, pos);
                    *len = new_len;
                }
                Payload::Wide { data, len } => {
                    data.copy_within(pos + count..old, pos);
                    *len = new_len;
                }
                Payload::Utf8 { .. } => unreachable!(),
            }
            return self;
        }
        let h = pool::acquire(self.encoding(), new_len);
        match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
            (Payload::Byte { data: a, .. }, Payload::Byte { data: d, len: l }) => {
                d[..pos].copy_from_slice(&a[..pos]);
                d[pos..new_len].copy_from_slice(&a[pos + count..old]);
                *l = new_len;
            }
            (Payload::Wide { data: a, .. }, Payload::Wide { data: d, len: l }) => {
                d[..pos].copy_from_slice(&a[..pos]);
                d[pos..new_len].copy_from_slice(&a[pos + count..old]);
                *l = new_len;
            }
            _ => unreachable!(),
        }
        h
    }

    pub(crate) fn to_lower(self) -> BufRef {
        self.change_case(false)
    }

    pub(crate) fn to_upper(self) -> BufRef {
        self.change_case(true)
    }

    /// Scans for the first character the mapping would change; the prefix
    /// before it is already correct and is never rewritten. No change means
    /// no fork.
    fn change_case(self, upper: bool) -> BufRef {
        let first = match self.cell().payload() {
            Payload::Byte { data, len } => data[..*len]
                .iter()
                .position(|&b| map_case_byte(b, upper) != b),
            Payload::Wide { data, len } => data[..*len]
                .iter()
                .position(|&c| map_case_char(c, upper) != c),
            Payload::Utf8 { .. } => unreachable!(),
        };
        let start = match first {
            None => return self,
            Some(i) => i,
        };
        let h = self.fork_for_write();
        let old = h.len();
        match unsafe { h.cell().payload_mut() } {
            Payload::Byte { data, .. } => {
                for b in data[start..old].iter_mut() {
                    *b = map_case_byte(*b, upper);
                }
            }
            Payload::Wide { data, .. } => {
                for c in data[start..old].iter_mut() {
                    *c = map_case_char(*c, upper);
                }
            }
            Payload::Utf8 { .. } => unreachable!(),
        }
        h
    }

    /// Replaces every occurrence of `old` with `new`, returning the count.
    /// The facade routes both characters into this cell's encoding first.
    pub(crate) fn replace_char(self, old: char, new: char) -> (BufRef, usize) {
        debug_assert!(old != new);
        let first = match self.cell().payload() {
            Payload::Byte { data, len } => {
                debug_assert!((old as u32) <= 0xFF && (new as u32) <= 0xFF);
                memchr(old as u8, &data[..*len])
            }
            Payload::Wide { data, len } => data[..*len].iter().position(|&c| c == old),
            Payload::Utf8 { .. } => unreachable!(),
        };
        let start = match first {
            None => return (self, 0),
            Some(i) => i,
        };
        let h = self.fork_for_write();
        let end = h.len();
        let mut count = 0;
        match unsafe { h.cell().payload_mut() } {
            Payload::Byte { data, .. } => {
                for b in data[start..end].iter_mut() {
                    if *b == old as u8 {
                        *b = new as u8;
                        count += 1;
                    }
                }
            }
            Payload::Wide { data, .. } => {
                for c in data[start..end].iter_mut() {
                    if *c == old {
                        *c = new;
                        count += 1;
                    }
                }
            }
            Payload::Utf8 { .. } => unreachable!(),
        }
        (h, count)
    }

    /// Substring replacement in two phases: count occurrences to size the
    /// result exactly, then build it in one pass. `None` means the content
    /// disappeared entirely.
    pub(crate) fn replace_bytes(self, old: &[u8], new: &[u8]) -> (Option<BufRef>, usize) {
        debug_assert!(!old.is_empty());
        let (count, total) = match self.cell().payload() {
            Payload::Byte { data, len } => {
                let hay = &data[..*len];
                let mut n = 0;
                let mut at = 0;
                while let Some(i) = memmem::find(&hay[at..], old) {
                    n += 1;
                    at += i + old.len();
                }
                (n, *len)
            }
            _ => unreachable!(),
        };
        if count == 0 {
            return (Some(self), 0);
        }
        let new_len = total - count * old.len() + count * new.len();
        if new_len == 0 {
            return (None, count);
        }
        let h = pool::acquire(Encoding::SingleByte, new_len);
        match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
            (Payload::Byte { data: a, len }, Payload::Byte { data: d, len: l }) => {
                let hay = &a[..*len];
                let mut at = 0;
                let mut out = 0;
                while let Some(i) = memmem::find(&hay[at..], old) {
                    let keep = &hay[at..at + i];
                    d[out..out + keep.len()].copy_from_slice(keep);
                    out += keep.len();
                    d[out..out + new.len()].copy_from_slice(new);
                    out += new.len();
                    at += i + old.len();
                }
                let rest = &hay[at..];
                d[out..out + rest.len()].copy_from_slice(rest);
                out += rest.len();
                debug_assert_eq!(out, new_len);
                *l = new_len;
            }
            _ => unreachable!(),
        }
        (Some(h), count)
    }

    pub(crate) fn replace_wide(self, old: &[char], new: &[char]) -> (Option<BufRef>, usize) {
        debug_assert!(!old.is_empty());
        let (count, total) = match self.cell().payload() {
            Payload::Wide { data, len } => {
                let hay = &data[..*len];
                let mut n = 0;
                let mut at = 0;
                while let Some(i) = find_wide(&hay[at..], old) {
                    n += 1;
                    at += i + old.len();
                }
                (n, *len)
            }
            _ => unreachable!(),
        };
        if count == 0 {
            return (Some(self), 0);
        }
        let new_len = total - count * old.len() + count * new.len();
        if new_len == 0 {
            return (None, count);
        }
        let h = pool::acquire(Encoding::Wide, new_len);
        match (self.cell().payload(), unsafe { h.cell().payload_mut() }) {
            (Payload::Wide { data: a, len }, Payload::Wide { data: d, len: l }) => {
                let hay = &a[..*len];
                let mut at = 0;
                let mut out = 0;
                while let Some(i) = find_wide(&hay[at..], old) {
                    let keep = &hay[at..at + i];
                    d[out..out + keep.len()].copy_from_slice(keep);
                    out += keep.len();
                    d[out..out + new.len()].copy_from_slice(new);
                    out += new.len();
                    at += i + old.len();
                }
                let rest = &hay[at..];
                d[out..out + rest.len()].copy_from_slice(rest);
                out += rest.len();
                debug_assert_eq!(out, new_len);
                *l = new_len;
            }
            _ => unreachable!(),
        }
        (Some(h), count)
    }

    /// Overwrites the character at `idx`; setting the value already there is
    /// not a mutation and skips the copy-on-write fork.
    pub(crate) fn set_char(self, idx: usize, c: char) -> BufRef {
        debug_assert!(idx < self.len());
        let same = match self.cell().payload() {
            Payload::Byte { data, .. } => {
                debug_assert!((c as u32) <= 0xFF);
                data[idx] == c as u8
            }
            Payload::Wide { data, .. } => data[idx] == c,
            Payload::Utf8 { .. } => unreachable!(),
        };
        if same {
            return self;
        }
        let h = self.fork_for_write();
        match unsafe { h.cell().payload_mut() } {
            Payload::Byte { data, .. } => data[idx] = c as u8,
            Payload::Wide { data, .. } => data[idx] = c,
            Payload::Utf8 { .. } => unreachable!(),
        }
        h
    }

    fn leading_matching(&self, pred: impl Fn(char) -> bool) -> usize {
        match self.cell().payload() {
            Payload::Byte { data, len } => data[..*len]
                .iter()
                .take_while(|&&b| pred(b as char))
                .count(),
            Payload::Wide { data, len } => {
                data[..*len].iter().take_while(|&&c| pred(c)).count()
            }
            Payload::Utf8 { .. } => unreachable!(),
        }
    }

    fn trailing_matching(&self, pred: impl Fn(char) -> bool) -> usize {
        match self.cell().payload() {
            Payload::Byte { data, len } => data[..*len]
                .iter()
                .rev()
                .take_while(|&&b| pred(b as char))
                .count(),
            Payload::Wide { data, len } => {
                data[..*len].iter().rev().take_while(|&&c| pred(c)).count()
            }
            Payload::Utf8 { .. } => unreachable!(),
        }
    }

    /// Strips leading blanks; `None` when the content was nothing else.
    pub(crate) fn trim_leading(self) -> Option<BufRef> {
        let n = self.leading_matching(|c| c == ' ' || c == '\t');
        if n == 0 {
            return Some(self);
        }
        if n == self.len() {
            return None;
        }
        Some(self.delete_range(0, n))
    }

    pub(crate) fn trim_trailing(self) -> Option<BufRef> {
        let n = self.trailing_matching(|c| c == ' ' || c == '\t');
        if n == 0 {
            return Some(self);
        }
        let total = self.len();
        if n == total {
            return None;
        }
        Some(self.delete_range(total - n, n))
    }

    /// Strips the trailing run of `\r`/`\n`.
    pub(crate) fn remove_line_endings(self) -> Option<BufRef> {
        let n = self.trailing_matching(|c| c == '\r' || c == '\n');
        if n == 0 {
            return Some(self);
        }
        let total = self.len();
        if n == total {
            return None;
        }
        Some(self.delete_range(total - n, n))
    }

    /// Copy of `count` characters starting at `pos`, same encoding.
    pub(crate) fn slice_copy(&self, pos: usize, count: usize) -> BufRef {
        debug_assert!(count > 0 && pos + count <= self.len());
        match self.cell().payload() {
            Payload::Byte { data, .. } => byte_cell_from(&data[pos..pos + count]),
            Payload::Wide { data, .. } => wide_cell_from(&data[pos..pos + count]),
            Payload::Utf8 { .. } => unreachable!(),
        }
    }

    // ---------------------------------------------------------------------
    // Comparison, classification, search

    /// Window equality: the characters of `self` starting at `pos` against
    /// the whole of `other`. `count == 0` compares through to the ends (both
    /// must finish together); a nonzero `count` caps the comparison.
    pub(crate) fn eq_window(&self, other: &BufRef, pos: usize, count: usize) -> bool {
        let a = self.cell().payload().chars().skip(pos);
        let b = other.cell().payload().chars();
        eq_chars(a, b, count, false)
    }

    pub(crate) fn eq_window_ignore_case(&self, other: &BufRef, pos: usize, count: usize) -> bool {
        let a = self.cell().payload().chars().skip(pos);
        let b = other.cell().payload().chars();
        eq_chars(a, b, count, true)
    }

    /// Conventional per-character lexicographic order (unlike the codec's
    /// count-first [`crate::utf8::compare`]).
    pub(crate) fn cmp_seq(&self, other: &BufRef) -> Ordering {
        self.cell()
            .payload()
            .chars()
            .cmp(other.cell().payload().chars())
    }

    pub(crate) fn eq_str(&self, s: &str) -> bool {
        self.cell().payload().chars().eq(s.chars())
    }

    pub(crate) fn eq_str_ignore_case(&self, s: &str) -> bool {
        eq_chars(self.cell().payload().chars(), s.chars(), 0, true)
    }

    pub(crate) fn is_alphabetic(&self) -> bool {
        self.cell().payload().chars().all(|c| c.is_alphabetic())
    }

    pub(crate) fn is_alphanumeric(&self) -> bool {
        self.cell().payload().chars().all(|c| c.is_alphanumeric())
    }

    pub(crate) fn is_numeric(&self) -> bool {
        self.cell().payload().chars().all(|c| c.is_ascii_digit())
    }

    /// First occurrence of `needle` at or after character `start`.
    pub(crate) fn index_of_str(&self, needle: &str, start: usize) -> Option<usize> {
        debug_assert!(!needle.is_empty());
        match self.cell().payload() {
            Payload::Byte { data, len } => {
                let nb = latin1_needle(needle)?;
                if start > *len {
                    return None;
                }
                memmem::find(&data[start..*len], &nb).map(|i| i + start)
            }
            Payload::Wide { data, len } => {
                let hay = &data[..*len];
                let nw: SmallVec<[char; 16]> = needle.chars().collect();
                if start > hay.len() {
                    return None;
                }
                hay[start..]
                    .windows(nw.len())
                    .position(|w| w == &nw[..])
                    .map(|i| i + start)
            }
            Payload::Utf8 { .. } => unreachable!(),
        }
    }

    /// Last occurrence of `needle` starting at or before character `from`.
    pub(crate) fn last_index_of_str(&self, needle: &str, from: usize) -> Option<usize> {
        debug_assert!(!needle.is_empty());
        match self.cell().payload() {
            Payload::Byte { data, len } => {
                let nb = latin1_needle(needle)?;
                let end = (from + nb.len()).min(*len);
                memmem::rfind(&data[..end], &nb)
            }
            Payload::Wide { data, len } => {
                let hay = &data[..*len];
                let nw: SmallVec<[char; 16]> = needle.chars().collect();
                if nw.len() > hay.len() {
                    return None;
                }
                let top = (hay.len() - nw.len()).min(from);
                (0..=top).rev().find(|&i| &hay[i..i + nw.len()] == &nw[..])
            }
            Payload::Utf8 { .. } => unreachable!(),
        }
    }

    pub(crate) fn index_of_char(&self, c: char, start: usize) -> Option<usize> {
        match self.cell().payload() {
            Payload::Byte { data, len } => {
                if (c as u32) > 0xFF || start > *len {
                    return None;
                }
                memchr(c as u8, &data[start..*len]).map(|i| i + start)
            }
            Payload::Wide { data, len } => {
                if start > *len {
                    return None;
                }
                data[start..*len].iter().position(|&x| x == c).map(|i| i + start)
            }
            Payload::Utf8 { .. } => unreachable!(),
        }
    }
}

fn cached(slot: &Cell<Option<BufRef>>, build: impl FnOnce() -> BufRef) -> BufRef {
    if let Some(h) = slot.take() {
        let out = h.clone();
        slot.set(Some(h));
        return out;
    }
    let built = build();
    slot.set(Some(built.clone()));
    built
}

fn eq_chars(
    mut a: impl Iterator<Item = char>,
    mut b: impl Iterator<Item = char>,
    limit: usize,
    fold_case: bool,
) -> bool {
    let mut seen = 0;
    loop {
        if limit != 0 && seen == limit {
            return true;
        }
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) => {
                let (x, y) = if fold_case {
                    (map_case_char(x, false), map_case_char(y, false))
                } else {
                    (x, y)
                };
                if x != y {
                    return false;
                }
            }
            _ => return false,
        }
        seen += 1;
    }
}

fn find_wide(hay: &[char], needle: &[char]) -> Option<usize> {
    hay.windows(needle.len()).position(|w| w == needle)
}

/// Needle chars narrowed to Latin-1 bytes; `None` when any character cannot
/// occur in single-byte data at all.
fn latin1_needle(s: &str) -> Option<SmallVec<[u8; 16]>> {
    let mut out = SmallVec::new();
    for c in s.chars() {
        if (c as u32) > 0xFF {
            return None;
        }
        out.push(c as u8);
    }
    Some(out)
}

/// Case mapping within the byte range. Characters whose counterpart does
/// not fit back in one byte (0xFF, micro sign) keep their case.
fn map_case_byte(b: u8, upper: bool) -> u8 {
    let mapped = map_case_char(b as char, upper);
    if (mapped as u32) <= 0xFF {
        mapped as u8
    } else {
        b
    }
}

/// Length-preserving case mapping: multi-character expansions are left
/// alone so a case change never alters a buffer's length.
fn map_case_char(c: char, upper: bool) -> char {
    if upper {
        let mut it = c.to_uppercase();
        match (it.next(), it.next()) {
            (Some(u), None) => u,
            _ => c,
        }
    } else {
        let mut it = c.to_lowercase();
        match (it.next(), it.next()) {
            (Some(l), None) => l,
            _ => c,
        }
    }
}

// ---------------------------------------------------------------------
// Pool-facing surface

/// A cell with no outstanding handles, owned by the pool (or on its way to
/// destruction). Dropping one frees the cell.
pub(crate) struct DeadCell(NonNull<StrBuf>);

impl DeadCell {
    pub(crate) fn encoding(&self) -> Encoding {
        match unsafe { self.0.as_ref() }.payload() {
            Payload::Byte { .. } => Encoding::SingleByte,
            Payload::Wide { .. } => Encoding::Wide,
            Payload::Utf8 { .. } => Encoding::Utf8,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        match unsafe { self.0.as_ref() }.payload() {
            Payload::Byte { data, .. } => data.len(),
            Payload::Wide { data, .. } => data.len(),
            Payload::Utf8 { data, .. } => data.len(),
        }
    }

    /// Hands the cell back out with a single fresh reference.
    pub(crate) fn revive(self) -> BufRef {
        let ptr = self.0;
        std::mem::forget(self);
        unsafe { ptr.as_ref() }.refs.set(1);
        BufRef(ptr)
    }
}

impl Drop for DeadCell {
    fn drop(&mut self) {
        // Exclusive owner of a count-zero cell whose caches were detached in
        // `retire`, so this cannot re-enter the pool.
        unsafe { drop(Box::from_raw(self.0.as_ptr())) }
    }
}

/// Turns a count-zero cell into pool property: logical content reset, cached
/// projections detached. The detached handles are returned to the caller so
/// their (possibly re-entrant) releases happen outside any pool borrow.
pub(crate) fn retire(ptr: NonNull<StrBuf>) -> (DeadCell, SmallVec<[BufRef; 2]>) {
    let cell = unsafe { ptr.as_ref() };
    debug_assert_eq!(cell.refs.get(), 0);
    let mut caches: SmallVec<[BufRef; 2]> = SmallVec::new();
    for slot in [&cell.cache_byte, &cell.cache_wide, &cell.cache_utf8].iter() {
        if let Some(h) = slot.take() {
            caches.push(h);
        }
    }
    match unsafe { cell.payload_mut() } {
        Payload::Byte { len, .. } => *len = 0,
        Payload::Wide { len, .. } => *len = 0,
        Payload::Utf8 { bytes, chars, .. } => {
            *bytes = 0;
            *chars = 0;
        }
    }
    (DeadCell(ptr), caches)
}
