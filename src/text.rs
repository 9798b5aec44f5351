//! The public text value type.
//!
//! A [`Text`] is a handle to a shared, copy-on-write storage cell (see
//! [`crate::buffer`]), or no cell at all: the empty value is canonically
//! unbound, so empties cost nothing and two freshly cleared values never
//! share anything. Cloning is O(1); mutation through `&mut` either rewrites
//! a uniquely owned cell in place or forks a private copy first, so clones
//! behave like independent values throughout.
//!
//! Windowed operations take `pos`/`count` arguments in characters. A
//! `count` of `None` means "through to the end"; out-of-range positions
//! make the operation a no-op (or return the empty/`None` result) rather
//! than panicking, and over-long counts are clamped.

use crate::buffer::{self, BufRef, Encoding};
use crate::float_parse;
use crate::pool;
use crate::utf8;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt::{self, Write};
use std::ops::{Add, AddAssign};

/// Reference-counted, copy-on-write string value.
///
/// Content is stored single-byte (Latin-1 value semantics) while every
/// character fits in one byte, and wide (`char`) otherwise. Reads through
/// any encoding are available on every value; the conversions are built
/// lazily and cached on the storage cell.
#[derive(Clone, Default)]
pub struct Text {
    buf: Option<BufRef>,
}

macro_rules! signed_getters {
    ($($t:ident),* $(,)?) => { paste::paste! { $(
        #[doc = concat!("Decimal prefix of the content as `", stringify!($t),
                        "`; 0 when nothing parses.")]
        pub fn [<to_ $t>](&self) -> $t {
            self.with_utf8(float_parse::strtoi) as $t
        }
    )* } };
}

macro_rules! unsigned_getters {
    ($($t:ident),* $(,)?) => { paste::paste! { $(
        #[doc = concat!("Decimal prefix of the content as `", stringify!($t),
                        "`; 0 when nothing parses (including negative input).")]
        pub fn [<to_ $t>](&self) -> $t {
            self.with_utf8(float_parse::strtou) as $t
        }
    )* } };
}

impl Text {
    /// The empty value. Allocates nothing.
    pub const fn new() -> Text {
        Text { buf: None }
    }

    /// Character count.
    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_none()
    }

    /// UTF-8 byte count of the content.
    pub fn byte_len(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.byte_len())
    }

    /// Storage encoding currently in use. Empty values report
    /// [`Encoding::SingleByte`].
    pub fn encoding(&self) -> Encoding {
        self.buf.as_ref().map_or(Encoding::SingleByte, |b| b.encoding())
    }

    /// Drops the content. The storage cell is released (other handles keep
    /// it alive).
    pub fn clear(&mut self) {
        self.buf = None;
    }

    /// Wide-data constructor; always stores wide, even for content that
    /// would fit single-byte storage.
    pub fn from_wide(chars: &[char]) -> Text {
        if chars.is_empty() {
            return Text::new();
        }
        Text {
            buf: Some(buffer::wide_cell_from(chars)),
        }
    }

    /// Raw single-byte constructor: every byte is one Latin-1 character.
    pub fn from_latin1(bytes: &[u8]) -> Text {
        if bytes.is_empty() {
            return Text::new();
        }
        Text {
            buf: Some(buffer::byte_cell_from(bytes)),
        }
    }

    /// Decodes UTF-8 bytes, mapping malformed sequences to U+FFFD, and
    /// stores the result in the narrowest encoding that fits.
    pub fn from_utf8_lossy(bytes: &[u8]) -> Text {
        if bytes.is_empty() {
            return Text::new();
        }
        let wide = utf8::decode_to_wide(bytes);
        if wide.iter().all(|&c| (c as u32) <= 0xFF) {
            let narrow: Vec<u8> = wide.iter().map(|&c| c as u8).collect();
            Text {
                buf: Some(buffer::byte_cell_from(&narrow)),
            }
        } else {
            Text {
                buf: Some(buffer::wide_cell_from(&wide)),
            }
        }
    }

    // -----------------------------------------------------------------
    // Views

    /// Runs `f` over the single-byte rendition of the content. Characters
    /// above 0xFF render as `?`; this is the one lossy view and it only
    /// happens here.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match &self.buf {
            Some(b) => b.with_bytes(f),
            None => f(&[]),
        }
    }

    /// Runs `f` over the content as wide characters.
    pub fn with_wide<R>(&self, f: impl FnOnce(&[char]) -> R) -> R {
        match &self.buf {
            Some(b) => b.with_wide(f),
            None => f(&[]),
        }
    }

    /// Runs `f` over the content as UTF-8 text.
    pub fn with_utf8<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        match &self.buf {
            Some(b) => b.with_utf8(f),
            None => f(""),
        }
    }

    /// Character at `idx`, if in range.
    pub fn char_at(&self, idx: usize) -> Option<char> {
        self.buf.as_ref().and_then(|b| b.char_at(idx))
    }

    /// Copy of `count` characters starting at `pos`. Taking the whole value
    /// shares the storage cell instead of copying.
    pub fn substring(&self, pos: usize, count: Option<usize>) -> Text {
        let len = self.len();
        if pos >= len {
            return Text::new();
        }
        let n = count.unwrap_or(len - pos).min(len - pos);
        if n == 0 {
            return Text::new();
        }
        let b = match &self.buf {
            Some(b) => b,
            None => return Text::new(),
        };
        if pos == 0 && n == len {
            return Text { buf: Some(b.clone()) };
        }
        Text {
            buf: Some(b.slice_copy(pos, n)),
        }
    }

    // -----------------------------------------------------------------
    // Comparison

    /// Compares the window of `self` starting at character `pos`, capped at
    /// `count` characters, against `other` capped the same way. `None`
    /// compares through to the ends; windows of unequal length are unequal.
    pub fn compare(&self, other: &Text, pos: usize, count: Option<usize>) -> bool {
        self.compare_impl(other, pos, count, false)
    }

    /// [`compare`](Text::compare) under case folding (one-to-one mappings
    /// only, so folding never changes a window's length).
    pub fn compare_no_case(&self, other: &Text, pos: usize, count: Option<usize>) -> bool {
        self.compare_impl(other, pos, count, true)
    }

    fn compare_impl(&self, other: &Text, pos: usize, count: Option<usize>, fold: bool) -> bool {
        if pos > self.len() {
            return false;
        }
        match (&self.buf, &other.buf) {
            (None, None) => true,
            (None, Some(_)) => count == Some(0),
            (Some(a), None) => pos == a.len() || count == Some(0),
            (Some(a), Some(b)) => match count {
                Some(0) => true,
                Some(n) => {
                    if fold {
                        a.eq_window_ignore_case(b, pos, n)
                    } else {
                        a.eq_window(b, pos, n)
                    }
                }
                None => {
                    if fold {
                        a.eq_window_ignore_case(b, pos, 0)
                    } else {
                        a.eq_window(b, pos, 0)
                    }
                }
            },
        }
    }

    /// Whole-value equality under case folding.
    pub fn eq_ignore_case(&self, other: &Text) -> bool {
        self.compare_no_case(other, 0, None)
    }

    // -----------------------------------------------------------------
    // Search

    /// Whether `needle` occurs anywhere in the content. The empty needle is
    /// a substring of everything.
    pub fn contains(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        match &self.buf {
            Some(b) => b.index_of_str(needle, 0).is_some(),
            None => false,
        }
    }

    /// Character index of the first occurrence of `needle` at or after
    /// `start`.
    pub fn index_of(&self, needle: &str, start: usize) -> Option<usize> {
        if needle.is_empty() || start >= self.len() {
            return None;
        }
        self.buf.as_ref().and_then(|b| b.index_of_str(needle, start))
    }

    pub fn index_of_char(&self, c: char, start: usize) -> Option<usize> {
        if start >= self.len() {
            return None;
        }
        self.buf.as_ref().and_then(|b| b.index_of_char(c, start))
    }

    /// Character index of the last occurrence of `needle` starting at or
    /// before `from` (`None` searches from the end).
    pub fn last_index_of(&self, needle: &str, from: Option<usize>) -> Option<usize> {
        let len = self.len();
        if needle.is_empty() || len == 0 {
            return None;
        }
        let from = from.unwrap_or(len - 1).min(len - 1);
        self.buf.as_ref().and_then(|b| b.last_index_of_str(needle, from))
    }

    // -----------------------------------------------------------------
    // Mutation

    /// Appends up to `count` characters of `other` (`None` appends all).
    /// Appending everything to an empty value shares `other`'s storage.
    pub fn append(&mut self, other: &Text, count: Option<usize>) {
        let avail = other.len();
        let n = count.unwrap_or(avail).min(avail);
        if n == 0 {
            return;
        }
        let ob = match &other.buf {
            Some(b) => b,
            None => return,
        };
        match self.buf.take() {
            None => {
                self.buf = Some(if n == avail { ob.clone() } else { ob.slice_copy(0, n) });
            }
            Some(own) => {
                self.buf = Some(own.append_from(ob, n));
            }
        }
    }

    pub fn push_str(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        match self.buf.take() {
            None => *self = Text::from(s),
            Some(own) => {
                self.buf = Some(if s.is_ascii() {
                    own.append_bytes(s.as_bytes())
                } else if latin1able(s) {
                    own.append_bytes(&latin1_bytes(s))
                } else {
                    let wide: SmallVec<[char; 32]> = s.chars().collect();
                    own.append_wide(&wide)
                });
            }
        }
    }

    /// Appends one character. NUL is ignored.
    pub fn push(&mut self, c: char) {
        if c == '\0' {
            return;
        }
        match self.buf.take() {
            None => *self = Text::from(c),
            Some(own) => {
                self.buf = Some(if (c as u32) <= 0xFF {
                    own.append_bytes(&[c as u8])
                } else {
                    own.append_wide(&[c])
                });
            }
        }
    }

    /// Inserts up to `count` characters of `other` at character `pos`.
    /// Positions past the end are a no-op; `pos == len()` appends.
    pub fn insert(&mut self, pos: usize, other: &Text, count: Option<usize>) {
        let len = self.len();
        if pos > len {
            return;
        }
        let avail = other.len();
        let n = count.unwrap_or(avail).min(avail);
        if n == 0 {
            return;
        }
        if pos == len {
            self.append(other, Some(n));
            return;
        }
        let ob = match &other.buf {
            Some(b) => b,
            None => return,
        };
        if let Some(own) = self.buf.take() {
            self.buf = Some(own.insert_from(pos, ob, n));
        }
    }

    pub fn insert_str(&mut self, pos: usize, s: &str) {
        let len = self.len();
        if s.is_empty() || pos > len {
            return;
        }
        if pos == len {
            self.push_str(s);
            return;
        }
        if let Some(own) = self.buf.take() {
            self.buf = Some(if s.is_ascii() {
                own.insert_bytes(pos, s.as_bytes())
            } else if latin1able(s) {
                own.insert_bytes(pos, &latin1_bytes(s))
            } else {
                let wide: SmallVec<[char; 32]> = s.chars().collect();
                own.insert_wide(pos, &wide)
            });
        }
    }

    /// Removes up to `count` characters starting at `pos`.
    pub fn delete(&mut self, pos: usize, count: Option<usize>) {
        let len = self.len();
        if pos >= len {
            return;
        }
        let n = count.unwrap_or(len - pos).min(len - pos);
        if n == 0 {
            return;
        }
        if n == len {
            self.buf = None;
            return;
        }
        if let Some(own) = self.buf.take() {
            self.buf = Some(own.delete_range(pos, n));
        }
    }

    /// Replaces every occurrence of `old` with `new`, left to right and
    /// non-overlapping. Returns the number of replacements.
    pub fn replace(&mut self, old: &str, new: &str) -> usize {
        let old_chars = old.chars().count();
        if old_chars == 0 || old_chars > self.len() || old == new {
            return 0;
        }
        let own = match self.buf.take() {
            Some(h) => h,
            None => return 0,
        };
        let (res, n) = match own.encoding() {
            Encoding::SingleByte => {
                if !latin1able(old) {
                    // Pattern has characters single-byte data cannot hold.
                    self.buf = Some(own);
                    return 0;
                }
                if latin1able(new) {
                    let ob = latin1_bytes(old);
                    let nb = latin1_bytes(new);
                    own.replace_bytes(&ob, &nb)
                } else {
                    // The replacement needs wide storage, but only promote
                    // when the pattern occurs at all.
                    if own.index_of_str(old, 0).is_none() {
                        self.buf = Some(own);
                        return 0;
                    }
                    let ow: SmallVec<[char; 16]> = old.chars().collect();
                    let nw: SmallVec<[char; 16]> = new.chars().collect();
                    own.to_wide_primary().replace_wide(&ow, &nw)
                }
            }
            Encoding::Wide => {
                let ow: SmallVec<[char; 16]> = old.chars().collect();
                let nw: SmallVec<[char; 16]> = new.chars().collect();
                own.replace_wide(&ow, &nw)
            }
            Encoding::Utf8 => unreachable!(),
        };
        self.buf = res;
        n
    }

    /// Replaces every occurrence of the character `old` with `new`,
    /// returning the count.
    pub fn replace_char(&mut self, old: char, new: char) -> usize {
        if old == new || self.is_empty() {
            return 0;
        }
        let own = match self.buf.take() {
            Some(h) => h,
            None => return 0,
        };
        if own.encoding() == Encoding::SingleByte && (old as u32) > 0xFF {
            self.buf = Some(own);
            return 0;
        }
        let own = if own.encoding() == Encoding::SingleByte && (new as u32) > 0xFF {
            if own.index_of_char(old, 0).is_none() {
                self.buf = Some(own);
                return 0;
            }
            own.to_wide_primary()
        } else {
            own
        };
        let (h, n) = own.replace_char(old, new);
        self.buf = Some(h);
        n
    }

    /// Overwrites the character at `idx`; `false` when `idx` is out of
    /// range. Storage promotes to wide if the character needs it.
    pub fn set_char(&mut self, idx: usize, c: char) -> bool {
        if idx >= self.len() {
            return false;
        }
        let own = match self.buf.take() {
            Some(h) => h,
            None => return false,
        };
        let own = if own.encoding() == Encoding::SingleByte && (c as u32) > 0xFF {
            own.to_wide_primary()
        } else {
            own
        };
        self.buf = Some(own.set_char(idx, c));
        true
    }

    /// Strips leading spaces and tabs.
    pub fn trim_leading(&mut self) {
        if let Some(own) = self.buf.take() {
            self.buf = own.trim_leading();
        }
    }

    /// Strips trailing spaces and tabs.
    pub fn trim_trailing(&mut self) {
        if let Some(own) = self.buf.take() {
            self.buf = own.trim_trailing();
        }
    }

    /// Strips leading and trailing spaces and tabs.
    pub fn trim(&mut self) {
        self.trim_leading();
        self.trim_trailing();
    }

    /// Strips the trailing run of carriage returns and newlines.
    pub fn remove_line_endings(&mut self) {
        if let Some(own) = self.buf.take() {
            self.buf = own.remove_line_endings();
        }
    }

    /// Lowercases in place. Characters without a one-to-one mapping are
    /// left alone.
    pub fn to_lower(&mut self) {
        if let Some(own) = self.buf.take() {
            self.buf = Some(own.to_lower());
        }
    }

    /// Uppercases in place under the same one-to-one rule.
    pub fn to_upper(&mut self) {
        if let Some(own) = self.buf.take() {
            self.buf = Some(own.to_upper());
        }
    }

    // -----------------------------------------------------------------
    // Classification

    /// Whether every character is alphabetic. True for the empty value.
    pub fn is_alphabetic(&self) -> bool {
        self.buf.as_ref().map_or(true, |b| b.is_alphabetic())
    }

    /// Whether every character is alphanumeric. True for the empty value.
    pub fn is_alphanumeric(&self) -> bool {
        self.buf.as_ref().map_or(true, |b| b.is_alphanumeric())
    }

    /// Whether every character is an ASCII decimal digit. True for the
    /// empty value.
    pub fn is_numeric(&self) -> bool {
        self.buf.as_ref().map_or(true, |b| b.is_numeric())
    }

    /// Whether the whole content reads as an optionally signed decimal
    /// integer with surrounding blanks allowed.
    pub fn is_valid_integer(&self) -> bool {
        self.with_utf8(float_parse::is_valid_int)
    }

    /// Whether the whole content reads as a decimal floating point number
    /// with surrounding blanks allowed.
    pub fn is_valid_float(&self) -> bool {
        self.with_utf8(float_parse::is_valid_float)
    }

    // -----------------------------------------------------------------
    // Numeric conversion

    /// `true`/`false` (any case), otherwise whatever
    /// [`to_i64`](Text::to_i64) yields compared against zero.
    pub fn to_bool(&self) -> bool {
        match &self.buf {
            None => false,
            Some(b) => {
                if b.eq_str_ignore_case("true") {
                    true
                } else if b.eq_str_ignore_case("false") {
                    false
                } else {
                    self.to_i64() != 0
                }
            }
        }
    }

    /// Longest decimal prefix as `f64`; 0.0 when nothing parses.
    pub fn to_f64(&self) -> f64 {
        self.with_utf8(float_parse::strtod)
    }

    pub fn to_f32(&self) -> f32 {
        self.to_f64() as f32
    }

    /// Strict integer parse of the whole (blank-trimmed) content.
    pub fn parse_i64(&self) -> Option<i64> {
        self.with_utf8(|s| s.trim().parse().ok())
    }

    /// Strict float parse of the whole (blank-trimmed) content.
    pub fn parse_f64(&self) -> Option<f64> {
        self.with_utf8(|s| s.trim().parse().ok())
    }

    signed_getters!(i8, i16, i32, i64, i128, isize);
    unsigned_getters!(u8, u16, u32, u64, u128, usize);

    // -----------------------------------------------------------------
    // Formatting

    /// Renders `args` straight into pooled storage, sized exactly by a
    /// measuring pass. ASCII output lands in single-byte storage, anything
    /// else goes wide. Usually written as [`text!`](crate::text!).
    pub fn format(args: fmt::Arguments) -> Text {
        let mut m = Meter {
            bytes: 0,
            chars: 0,
            ascii: true,
        };
        let _ = m.write_fmt(args);
        if m.chars == 0 {
            return Text::new();
        }
        if m.ascii {
            let h = pool::acquire(Encoding::SingleByte, m.bytes);
            buffer::fill_bytes_with(&h, m.bytes, |dst| {
                let mut w = ByteFill { dst, at: 0 };
                let _ = w.write_fmt(args);
                debug_assert_eq!(w.at, w.dst.len());
            });
            Text { buf: Some(h) }
        } else {
            let h = pool::acquire(Encoding::Wide, m.chars);
            buffer::fill_wide_with(&h, m.chars, |dst| {
                let mut w = CharFill { dst, at: 0 };
                let _ = w.write_fmt(args);
                debug_assert_eq!(w.at, w.dst.len());
            });
            Text { buf: Some(h) }
        }
    }
}

/// Formats into a [`Text`], rendering directly into pooled storage.
///
/// ```
/// let t = polytext::text!("{}-{}", 12, "ab");
/// assert_eq!(t, "12-ab");
/// ```
#[macro_export]
macro_rules! text {
    ($($arg:tt)*) => {
        $crate::Text::format(::std::format_args!($($arg)*))
    };
}

/// First pass of [`Text::format`]: sizes the output without storing it.
struct Meter {
    bytes: usize,
    chars: usize,
    ascii: bool,
}

impl Write for Meter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.bytes += s.len();
        self.chars += s.chars().count();
        self.ascii = self.ascii && s.is_ascii();
        Ok(())
    }
}

struct ByteFill<'a> {
    dst: &'a mut [u8],
    at: usize,
}

impl Write for ByteFill<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let b = s.as_bytes();
        if self.at + b.len() > self.dst.len() {
            return Err(fmt::Error);
        }
        self.dst[self.at..self.at + b.len()].copy_from_slice(b);
        self.at += b.len();
        Ok(())
    }
}

struct CharFill<'a> {
    dst: &'a mut [char],
    at: usize,
}

impl Write for CharFill<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.at == self.dst.len() {
                return Err(fmt::Error);
            }
            self.dst[self.at] = c;
            self.at += 1;
        }
        Ok(())
    }
}

fn latin1able(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xFF)
}

fn latin1_bytes(s: &str) -> SmallVec<[u8; 32]> {
    s.chars().map(|c| c as u8).collect()
}

// ---------------------------------------------------------------------
// Conversions in

impl From<&str> for Text {
    /// Stores in the narrowest encoding that holds every character.
    fn from(s: &str) -> Text {
        if s.is_empty() {
            return Text::new();
        }
        if s.is_ascii() {
            return Text {
                buf: Some(buffer::byte_cell_from(s.as_bytes())),
            };
        }
        if latin1able(s) {
            return Text {
                buf: Some(buffer::byte_cell_from(&latin1_bytes(s))),
            };
        }
        let wide: Vec<char> = s.chars().collect();
        Text {
            buf: Some(buffer::wide_cell_from(&wide)),
        }
    }
}

impl From<String> for Text {
    fn from(s: String) -> Text {
        Text::from(s.as_str())
    }
}

impl From<char> for Text {
    /// NUL yields the empty value.
    fn from(c: char) -> Text {
        if c == '\0' {
            return Text::new();
        }
        if (c as u32) <= 0xFF {
            Text {
                buf: Some(buffer::byte_cell_from(&[c as u8])),
            }
        } else {
            Text {
                buf: Some(buffer::wide_cell_from(&[c])),
            }
        }
    }
}

impl From<bool> for Text {
    fn from(v: bool) -> Text {
        Text::from(if v { "1" } else { "0" })
    }
}

macro_rules! from_ints {
    ($($t:ty),* $(,)?) => { $(
        impl From<$t> for Text {
            fn from(n: $t) -> Text {
                let mut buf = itoa::Buffer::new();
                Text::from(buf.format(n))
            }
        }
    )* };
}

from_ints!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl From<f64> for Text {
    fn from(f: f64) -> Text {
        if f.is_finite() {
            let mut buf = ryu::Buffer::new();
            Text::from(buf.format(f))
        } else {
            crate::text!("{}", f)
        }
    }
}

impl From<f32> for Text {
    fn from(f: f32) -> Text {
        if f.is_finite() {
            let mut buf = ryu::Buffer::new();
            Text::from(buf.format(f))
        } else {
            crate::text!("{}", f)
        }
    }
}

// ---------------------------------------------------------------------
// Operators

impl AddAssign<&Text> for Text {
    fn add_assign(&mut self, rhs: &Text) {
        self.append(rhs, None);
    }
}

impl AddAssign<&str> for Text {
    fn add_assign(&mut self, rhs: &str) {
        self.push_str(rhs);
    }
}

impl AddAssign<char> for Text {
    fn add_assign(&mut self, rhs: char) {
        self.push(rhs);
    }
}

impl Add<&Text> for Text {
    type Output = Text;
    fn add(mut self, rhs: &Text) -> Text {
        self += rhs;
        self
    }
}

impl Add<&str> for Text {
    type Output = Text;
    fn add(mut self, rhs: &str) -> Text {
        self += rhs;
        self
    }
}

impl Add<char> for Text {
    type Output = Text;
    fn add(mut self, rhs: char) -> Text {
        self += rhs;
        self
    }
}

// ---------------------------------------------------------------------
// Equality and ordering

impl PartialEq for Text {
    fn eq(&self, other: &Text) -> bool {
        match (&self.buf, &other.buf) {
            (None, None) => true,
            (Some(a), Some(b)) => a.len() == b.len() && a.eq_window(b, 0, 0),
            _ => false,
        }
    }
}

impl Eq for Text {}

impl PartialEq<str> for Text {
    fn eq(&self, s: &str) -> bool {
        match &self.buf {
            None => s.is_empty(),
            Some(b) => b.eq_str(s),
        }
    }
}

impl PartialEq<&str> for Text {
    fn eq(&self, s: &&str) -> bool {
        *self == **s
    }
}

impl PartialEq<String> for Text {
    fn eq(&self, s: &String) -> bool {
        *self == **s
    }
}

impl PartialEq<Text> for &str {
    fn eq(&self, t: &Text) -> bool {
        *t == **self
    }
}

impl PartialOrd for Text {
    fn partial_cmp(&self, other: &Text) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Text {
    /// Per-character lexicographic order, regardless of storage encoding.
    fn cmp(&self, other: &Text) -> Ordering {
        match (&self.buf, &other.buf) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp_seq(b),
        }
    }
}

mod formatting {
    use super::Text;
    use std::fmt::{self, Debug, Display, Formatter};

    impl Display for Text {
        fn fmt(&self, f: &mut Formatter) -> fmt::Result {
            self.with_utf8(|s| f.write_str(s))
        }
    }

    impl Debug for Text {
        fn fmt(&self, f: &mut Formatter) -> fmt::Result {
            self.with_utf8(|s| write!(f, "\"{}\"", crate::utf8::escape(s, true)))
        }
    }
}
