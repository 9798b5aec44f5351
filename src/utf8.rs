//! UTF-8 primitives: sequence lengths, raw decode/encode, character and byte
//! counting, escape/unescape, comparison and substring search over byte
//! slices.
//!
//! Everything here is a pure function over borrowed data; the buffer and
//! facade layers own all allocation decisions. Decoding follows the classic
//! shift-and-accumulate scheme with a per-length magic offset. A malformed
//! sequence is caught structurally before the arithmetic runs and decodes
//! as a value above the scalar range with one byte consumed, so
//! [`decode_char`] substitutes U+FFFD and the scan resynchronizes at the
//! next byte.

use memchr::{memchr, memmem};
use std::cmp::Ordering;
use std::fmt::Write;

/// Trailing-byte count per lead byte. Continuation bytes (0x80..=0xBF) map
/// to 0 so that a scan landing mid-sequence still terminates. Lead bytes of
/// the withdrawn 5- and 6-byte forms are mapped for length lookup even
/// though decoding can never produce a scalar from them.
#[rustfmt::skip]
const TRAILING: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5,
];

// Accumulated lead-byte tag bits to subtract after shifting in a sequence of
// the given total length (index is length - 1; decoding rejects anything
// longer than four bytes before indexing).
const OFFSETS: [u32; 4] = [0x0000_0000, 0x0000_3080, 0x000E_2080, 0x03C8_2080];

// Reported for malformed sequences: the first value past the scalar range,
// so the from_u32 check in decode_char lands on U+FFFD.
const MALFORMED: u32 = 0x11_0000;

/// Total byte length of the sequence introduced by `lead`.
pub fn sequence_length(lead: u8) -> usize {
    TRAILING[lead as usize] as usize + 1
}

/// Bytes needed to encode `cp`, or 0 if `cp` is not encodable (above
/// U+10FFFF). This doubles as the encoding-error signal.
pub fn encoded_len(cp: u32) -> usize {
    if cp < 0x80 {
        1
    } else if cp < 0x800 {
        2
    } else if cp < 0x1_0000 {
        3
    } else if cp < 0x11_0000 {
        4
    } else {
        0
    }
}

/// Writes the canonical encoding of `cp` into `dst`, returning the number of
/// bytes written. Returns 0 (writing nothing) when `cp` is not encodable or
/// `dst` is too short.
pub fn encode_one(cp: u32, dst: &mut [u8]) -> usize {
    let n = encoded_len(cp);
    if n == 0 || n > dst.len() {
        return 0;
    }
    match n {
        1 => dst[0] = cp as u8,
        2 => {
            dst[0] = 0xC0 | (cp >> 6) as u8;
            dst[1] = 0x80 | (cp & 0x3F) as u8;
        }
        3 => {
            dst[0] = 0xE0 | (cp >> 12) as u8;
            dst[1] = 0x80 | ((cp >> 6) & 0x3F) as u8;
            dst[2] = 0x80 | (cp & 0x3F) as u8;
        }
        _ => {
            dst[0] = 0xF0 | (cp >> 18) as u8;
            dst[1] = 0x80 | ((cp >> 12) & 0x3F) as u8;
            dst[2] = 0x80 | ((cp >> 6) & 0x3F) as u8;
            dst[3] = 0x80 | (cp & 0x3F) as u8;
        }
    }
    n
}

/// Decodes one sequence from the front of `bytes`, returning the scalar and
/// the number of bytes consumed. A malformed sequence (a bare continuation
/// byte, a lead the encoding never produces, a tail truncated by the end of
/// the slice or a broken continuation byte) comes back as a value above the
/// scalar range with exactly one byte consumed, so a caller walking the
/// slice resynchronizes at the next byte. Empty input yields `(0, 0)`.
pub fn decode_one(bytes: &[u8]) -> (u32, usize) {
    let lead = match bytes.first() {
        Some(&b) => b,
        None => return (0, 0),
    };
    if lead < 0x80 {
        return (lead as u32, 1);
    }
    let n = sequence_length(lead);
    let complete = matches!(lead, 0xC0..=0xF7)
        && n <= bytes.len()
        && bytes[1..n].iter().all(|&b| b & 0xC0 == 0x80);
    if !complete {
        return (MALFORMED, 1);
    }
    let mut acc = 0u32;
    for &b in &bytes[..n] {
        acc = (acc << 6) + b as u32;
    }
    (acc - OFFSETS[n - 1], n)
}

/// [`decode_one`] with the scalar checked: anything that is not a Unicode
/// scalar value becomes U+FFFD. Empty input yields `(U+FFFD, 0)`.
pub fn decode_char(bytes: &[u8]) -> (char, usize) {
    let (v, n) = decode_one(bytes);
    if n == 0 {
        return ('\u{FFFD}', 0);
    }
    (std::char::from_u32(v).unwrap_or('\u{FFFD}'), n)
}

/// Number of complete characters in `bytes` together with the byte length of
/// that complete prefix (a trailing truncated sequence counts for neither).
pub fn count_chars_and_bytes(bytes: &[u8]) -> (usize, usize) {
    let mut off = 0;
    let mut chars = 0;
    while off < bytes.len() {
        let n = sequence_length(bytes[off]);
        if off + n > bytes.len() {
            break;
        }
        off += n;
        chars += 1;
    }
    (chars, off)
}

pub fn count_chars(bytes: &[u8]) -> usize {
    count_chars_and_bytes(bytes).0
}

/// Byte offset where character number `index` starts; clamps to the end of
/// the complete prefix when `index` is out of range.
pub fn byte_offset_of_char_index(bytes: &[u8], index: usize) -> usize {
    let mut off = 0;
    let mut seen = 0;
    while seen < index && off < bytes.len() {
        let n = sequence_length(bytes[off]);
        if off + n > bytes.len() {
            break;
        }
        off += n;
        seen += 1;
    }
    off
}

/// Number of complete characters strictly before byte `offset`.
pub fn char_index_of_byte_offset(bytes: &[u8], offset: usize) -> usize {
    count_chars(&bytes[..offset.min(bytes.len())])
}

/// Decodes the whole slice, substituting U+FFFD wherever the input is
/// malformed.
pub fn decode_to_wide(bytes: &[u8]) -> Vec<char> {
    let mut out = Vec::with_capacity(count_chars(bytes).max(1));
    let mut off = 0;
    while off < bytes.len() {
        let (c, n) = decode_char(&bytes[off..]);
        out.push(c);
        off += n;
    }
    out
}

/// Byte length of the encoding of `chars`, the non-writing dry run used to
/// size output buffers exactly.
pub fn encoded_len_of_wide(chars: &[char]) -> usize {
    chars.iter().map(|&c| encoded_len(c as u32)).sum()
}

pub fn encode_from_wide(chars: &[char]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len_of_wide(chars));
    let mut tmp = [0u8; 4];
    for &c in chars {
        let n = encode_one(c as u32, &mut tmp);
        out.extend_from_slice(&tmp[..n]);
    }
    out
}

/// Escapes `s` into printable ASCII. Control characters get their named C
/// escapes, other bytes below 0x20 (and 0x7F) become `\xHH`, characters in
/// `[0x80, 0xFFFF]` become `\uHHHH` and anything above `\UHHHHHHHH`.
/// `escape_quotes` additionally escapes `"`.
pub fn escape(s: &str, escape_quotes: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0C' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0B' => out.push_str("\\v"),
            '\\' => out.push_str("\\\\"),
            '"' if escape_quotes => out.push_str("\\\""),
            c if (c as u32) < 0x20 || c as u32 == 0x7F => {
                // Writing to a String cannot fail.
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if (c as u32) > 0xFFFF => {
                let _ = write!(out, "\\U{:08x}", c as u32);
            }
            c if (c as u32) >= 0x80 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

fn hex_value(c: char) -> Option<u32> {
    c.to_digit(16)
}

/// Inverse of [`escape`]: reads octal (`\ooo`, up to 3 digits), `\xHH`,
/// `\uHHHH`, `\UHHHHHHHH` and the named C escapes. An unknown escaped
/// character passes through literally; an escape naming an invalid scalar is
/// dropped; a lone trailing backslash is ignored.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut it = s.chars().peekable();
    while let Some(c) = it.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let e = match it.next() {
            Some(e) => e,
            None => break,
        };
        let cp = match e {
            '0'..='7' => {
                let mut v = e as u32 - '0' as u32;
                for _ in 0..2 {
                    match it.peek() {
                        Some(&d @ '0'..='7') => {
                            v = v * 8 + (d as u32 - '0' as u32);
                            it.next();
                        }
                        _ => break,
                    }
                }
                v
            }
            'x' | 'u' | 'U' => {
                let max = match e {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut v = 0;
                let mut got = 0;
                while got < max {
                    match it.peek().copied().and_then(hex_value) {
                        Some(h) => {
                            v = v * 16 + h;
                            it.next();
                            got += 1;
                        }
                        None => break,
                    }
                }
                if got == 0 {
                    // "\x" with no digits: treat like an unknown escape.
                    out.push(e);
                    continue;
                }
                v
            }
            'a' => 0x07,
            'b' => 0x08,
            'f' => 0x0C,
            'n' => 0x0A,
            'r' => 0x0D,
            't' => 0x09,
            'v' => 0x0B,
            other => {
                out.push(other);
                continue;
            }
        };
        if let Some(c) = std::char::from_u32(cp) {
            out.push(c);
        }
    }
    out
}

/// Orders two UTF-8 strings. Character counts decide before any content
/// does: with `count == 0` the whole strings are compared and differing
/// counts settle it ("b" sorts before "aa"). A nonzero `count` compares a
/// window of that many characters; a string too short to fill the window
/// sorts first, and a count neither string can fill drops back to the
/// whole-string rule. Within the window, characters are ordered by encoded
/// length and then by their bytes, one character at a time.
pub fn compare(a: &[u8], b: &[u8], mut count: usize) -> Ordering {
    let ca = count_chars(a);
    let cb = count_chars(b);
    if count > ca && count > cb {
        count = 0;
    }
    let limit = if count != 0 {
        if ca < count {
            return Ordering::Less;
        }
        if cb < count {
            return Ordering::Greater;
        }
        count
    } else {
        if ca != cb {
            return ca.cmp(&cb);
        }
        ca
    };
    let mut ia = 0;
    let mut ib = 0;
    // `limit` never exceeds either complete character count, so every hop
    // below stays inside its slice.
    for _ in 0..limit {
        let na = sequence_length(a[ia]);
        let nb = sequence_length(b[ib]);
        if na != nb {
            return na.cmp(&nb);
        }
        let ord = a[ia..ia + na].cmp(&b[ib..ib + nb]);
        if ord != Ordering::Equal {
            return ord;
        }
        ia += na;
        ib += nb;
    }
    Ordering::Equal
}

/// Byte offset of the first occurrence of `needle`. The empty needle matches
/// at 0. A thin wrapper over `memmem`; byte-level matches coincide with
/// character-level matches because UTF-8 is self-synchronizing.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    memmem::find(haystack, needle)
}

/// Byte offset of the first occurrence of the character `c`.
pub fn find_char(bytes: &[u8], c: char) -> Option<usize> {
    if (c as u32) < 0x80 {
        return memchr(c as u8, bytes);
    }
    let mut tmp = [0u8; 4];
    let n = encode_one(c as u32, &mut tmp);
    find(bytes, &tmp[..n])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lengths() {
        assert_eq!(sequence_length(b'a'), 1);
        assert_eq!(sequence_length(0xC3), 2);
        assert_eq!(sequence_length(0xE2), 3);
        assert_eq!(sequence_length(0xF0), 4);
        assert_eq!(sequence_length(0xFC), 6);
        // Continuation bytes do not claim trailing bytes.
        assert_eq!(sequence_length(0x80), 1);
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut tmp = [0u8; 4];
        for &c in &['a', '\u{0}', '\u{e9}', '\u{7FF}', '\u{800}', '\u{FFFD}', '\u{1F600}'] {
            let n = encode_one(c as u32, &mut tmp);
            assert_eq!(n, encoded_len(c as u32));
            assert_eq!(n, c.len_utf8());
            let (back, used) = decode_char(&tmp[..n]);
            assert_eq!((back, used), (c, n));
        }
        assert_eq!(encode_one(0x11_0000, &mut tmp), 0);
        assert_eq!(encoded_len(0x11_0000), 0);
    }

    #[test]
    fn random_char_round_trip() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut tmp = [0u8; 4];
        for _ in 0..2000 {
            let c = rng.gen::<char>();
            let n = encode_one(c as u32, &mut tmp);
            let mut std_buf = [0u8; 4];
            assert_eq!(&tmp[..n], c.encode_utf8(&mut std_buf).as_bytes());
            assert_eq!(decode_char(&tmp[..n]), (c, n));
        }
    }

    #[test]
    fn counts_and_offsets() {
        let s = "caf\u{e9}".as_bytes();
        assert_eq!(s.len(), 5);
        assert_eq!(count_chars_and_bytes(s), (4, 5));
        assert_eq!(byte_offset_of_char_index(s, 3), 3);
        assert_eq!(byte_offset_of_char_index(s, 4), 5);
        assert_eq!(byte_offset_of_char_index(s, 99), 5);
        assert_eq!(char_index_of_byte_offset(s, 5), 4);
        assert_eq!(char_index_of_byte_offset(s, 4), 3);
        assert_eq!(count_chars_and_bytes(&[]), (0, 0));
        // Truncated trailing sequence is not counted.
        assert_eq!(count_chars_and_bytes(&s[..4]), (3, 3));
    }

    #[test]
    fn wide_round_trip() {
        let s = "a\u{e9}\u{4e2d}\u{1F600}";
        let wide = decode_to_wide(s.as_bytes());
        assert_eq!(wide, s.chars().collect::<Vec<_>>());
        assert_eq!(encoded_len_of_wide(&wide), s.len());
        assert_eq!(encode_from_wide(&wide), s.as_bytes());
    }

    #[test]
    fn malformed_decodes_to_replacement() {
        // A lone continuation byte and a truncated two-byte sequence.
        assert_eq!(decode_char(&[0x80]), ('\u{FFFD}', 1));
        assert_eq!(decode_char(&[0xC3]), ('\u{FFFD}', 1));
        // Leads the encoding never produces, including the withdrawn
        // five-byte form even when its continuations are all present.
        assert_eq!(decode_char(&[0xFF]), ('\u{FFFD}', 1));
        assert_eq!(decode_char(&[0xFE, 0x80]), ('\u{FFFD}', 1));
        assert_eq!(decode_char(&[0xF8, 0x80, 0x80, 0x80, 0x80]), ('\u{FFFD}', 1));
        // A lead whose continuation never arrives gives back one byte, so
        // the characters after it survive.
        assert_eq!(decode_char(&[0xE2, b'A', b'B']), ('\u{FFFD}', 1));
        assert_eq!(decode_to_wide(&[0xC3, b'A']), vec!['\u{FFFD}', 'A']);
        let wide = decode_to_wide(&[b'a', 0xC3]);
        assert_eq!(wide, vec!['a', '\u{FFFD}']);
        // Surrogate encodings are structurally fine and fail the scalar
        // check instead, consuming the whole sequence.
        assert_eq!(decode_char(&[0xED, 0xA0, 0x80]), ('\u{FFFD}', 3));
    }

    #[test]
    fn escape_forms() {
        assert_eq!(escape("a\nb", false), "a\\nb");
        assert_eq!(escape("\t\r\x07\x08\x0b\x0c", false), "\\t\\r\\a\\b\\v\\f");
        assert_eq!(escape("\\", false), "\\\\");
        assert_eq!(escape("\x01\x7f", false), "\\x01\\x7f");
        assert_eq!(escape("\u{e9}", false), "\\u00e9");
        assert_eq!(escape("\u{1F600}", false), "\\U0001f600");
        assert_eq!(escape("say \"hi\"", false), "say \"hi\"");
        assert_eq!(escape("say \"hi\"", true), "say \\\"hi\\\"");
    }

    #[test]
    fn unescape_forms() {
        assert_eq!(unescape("\\101\\x41\\u0041"), "AAA");
        assert_eq!(unescape("\\u00e9"), "\u{e9}");
        assert_eq!(unescape("\\U0001f600"), "\u{1F600}");
        assert_eq!(unescape("\\n\\t\\a"), "\n\t\x07");
        // Unknown escapes pass the character through.
        assert_eq!(unescape("\\z\\q"), "zq");
        assert_eq!(unescape("\\\"\\'\\?"), "\"'?");
        // Octal stops after three digits.
        assert_eq!(unescape("\\1018"), "A8");
        // Escapes naming non-scalars are dropped.
        assert_eq!(unescape("a\\Uffffffffb"), "ab");
        assert_eq!(unescape("tail\\"), "tail");
    }

    #[test]
    fn escape_inverse() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let len = rng.gen_range(0..64);
            let s: String = (0..len).map(|_| rng.gen::<char>()).collect();
            assert_eq!(unescape(&escape(&s, false)), s, "source: {:?}", s);
            assert_eq!(unescape(&escape(&s, true)), s, "source: {:?}", s);
        }
    }

    #[test]
    fn count_first_compare() {
        assert_eq!(compare(b"b", b"aa", 0), Ordering::Less);
        assert_eq!(compare(b"aa", b"b", 0), Ordering::Greater);
        assert_eq!(compare(b"abc", b"abd", 0), Ordering::Less);
        assert_eq!(compare(b"abc", b"abc", 0), Ordering::Equal);
        assert_eq!(compare(b"", b"", 0), Ordering::Equal);
        assert_eq!(compare(b"", b"a", 0), Ordering::Less);
        // ASCII orders before any multi-byte character of the same position.
        assert_eq!(
            compare("z".as_bytes(), "\u{e9}".as_bytes(), 1),
            Ordering::Less
        );
        // A window both strings can fill compares just those characters.
        assert_eq!(compare(b"abcX", b"abcY", 3), Ordering::Equal);
        assert_eq!(compare(b"ab", b"abcd", 2), Ordering::Equal);
        // A string too short to fill the window sorts first, before any
        // content is looked at.
        assert_eq!(compare(b"ab", b"abcd", 3), Ordering::Less);
        assert_eq!(compare(b"zz", b"aaaa", 3), Ordering::Less);
        assert_eq!(compare(b"aaaa", b"zz", 3), Ordering::Greater);
        // A window neither string can fill drops back to the whole-string
        // rule.
        assert_eq!(compare(b"b", b"aa", 5), Ordering::Less);
        assert_eq!(compare(b"zz", b"aaaa", 9), Ordering::Less);
    }

    #[test]
    fn find_variants() {
        assert_eq!(find(b"hello world", b"world"), Some(6));
        assert_eq!(find(b"hello", b""), Some(0));
        assert_eq!(find(b"", b"x"), None);
        assert_eq!(find_char(b"abc", 'c'), Some(2));
        assert_eq!(find_char("ab\u{e9}c".as_bytes(), '\u{e9}'), Some(2));
        assert_eq!(find_char(b"abc", '\u{e9}'), None);
    }
}

#[cfg(all(test, feature = "unstable"))]
mod benches {
    extern crate test;
    use lazy_static::lazy_static;
    use rand::distributions::{Distribution, Uniform};
    use test::{black_box, Bencher};

    const LEN: usize = 50_000;

    fn bytes(n: usize, wide_pct: f64) -> Vec<u8> {
        let mut res = Vec::with_capacity(n);
        let ascii = Uniform::new_inclusive(0u8, 127u8);
        let between = Uniform::new_inclusive(0.0, 1.0);
        let mut rng = rand::thread_rng();
        while res.len() < n {
            if between.sample(&mut rng) < wide_pct {
                let c = rand::random::<char>();
                let ix = res.len();
                for _ in 0..c.len_utf8() {
                    res.push(0);
                }
                c.encode_utf8(&mut res[ix..]);
            } else {
                res.push(ascii.sample(&mut rng));
            }
        }
        res
    }

    lazy_static! {
        static ref ASCII: Vec<u8> = bytes(LEN, 0.0);
        static ref MIXED: Vec<u8> = bytes(LEN, 0.5);
    }

    #[bench]
    fn count_chars_ascii(b: &mut Bencher) {
        b.iter(|| black_box(super::count_chars(&ASCII[..])));
    }

    #[bench]
    fn count_chars_mixed(b: &mut Bencher) {
        b.iter(|| black_box(super::count_chars(&MIXED[..])));
    }

    #[bench]
    fn decode_wide_mixed(b: &mut Bencher) {
        b.iter(|| black_box(super::decode_to_wide(&MIXED[..])));
    }

    #[bench]
    fn compare_equal_mixed(b: &mut Bencher) {
        b.iter(|| black_box(super::compare(&MIXED[..], &MIXED[..], 0)));
    }
}
