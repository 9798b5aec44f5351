//! Permissive numeric parsers backing the numeric getters: no failures,
//! just 0s and stopping early, the way `atoi`/`atof` behaved. The parsers
//! scan the longest valid prefix themselves, so the result never depends on
//! process locale.

use smallvec::SmallVec;

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn skip_ws(bs: &[u8], mut i: usize) -> usize {
    while i < bs.len() && (bs[i] == b' ' || bs[i] == b'\t') {
        i += 1;
    }
    i
}

/// Signed decimal prefix of `s`; 0 when no digits are present or the value
/// overflows an `i64`.
pub(crate) fn strtoi(s: &str) -> i64 {
    let bs = s.as_bytes();
    let mut off = skip_ws(bs, 0);
    let neg = off < bs.len() && bs[off] == b'-';
    if neg || (off < bs.len() && bs[off] == b'+') {
        off += 1;
    }
    let mut i = 0i64;
    let mut any = false;
    for b in bs[off.min(bs.len())..].iter().cloned().take_while(|b| is_digit(*b)) {
        any = true;
        let digit = (b - b'0') as i64;
        i = match i.checked_mul(10).and_then(|i| i.checked_add(digit)) {
            Some(i) => i,
            // overflow
            None => return 0,
        };
    }
    if !any {
        return 0;
    }
    if neg {
        -i
    } else {
        i
    }
}

/// Unsigned decimal prefix; a leading `-` yields 0 rather than the
/// wrapped-around value `strtoul` would produce.
pub(crate) fn strtou(s: &str) -> u64 {
    let bs = s.as_bytes();
    let mut off = skip_ws(bs, 0);
    if off < bs.len() && bs[off] == b'-' {
        return 0;
    }
    if off < bs.len() && bs[off] == b'+' {
        off += 1;
    }
    let mut u = 0u64;
    let mut any = false;
    for b in bs[off.min(bs.len())..].iter().cloned().take_while(|b| is_digit(*b)) {
        any = true;
        let digit = (b - b'0') as u64;
        u = match u.checked_mul(10).and_then(|u| u.checked_add(digit)) {
            Some(u) => u,
            None => return 0,
        };
    }
    if any {
        u
    } else {
        0
    }
}

/// Float prefix of `s`; 0.0 when nothing numeric leads the string. The
/// scanned prefix is normalized into a small stack buffer (dangling decimal
/// points and digitless exponents are trimmed) and handed to the standard
/// float parser for the final conversion.
pub(crate) fn strtod(s: &str) -> f64 {
    let bs = s.as_bytes();
    let mut i = skip_ws(bs, 0);
    let mut norm: SmallVec<[u8; 32]> = SmallVec::new();
    if i < bs.len() && (bs[i] == b'-' || bs[i] == b'+') {
        if bs[i] == b'-' {
            norm.push(b'-');
        }
        i += 1;
    }
    let mut digits = 0;
    while i < bs.len() && is_digit(bs[i]) {
        norm.push(bs[i]);
        digits += 1;
        i += 1;
    }
    if i < bs.len() && bs[i] == b'.' {
        // Attach the point only if a fraction digit follows; "5." parses
        // fine either way but "5.e3" would not.
        if i + 1 < bs.len() && is_digit(bs[i + 1]) {
            norm.push(b'.');
            i += 1;
            while i < bs.len() && is_digit(bs[i]) {
                norm.push(bs[i]);
                digits += 1;
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    if i < bs.len() && (bs[i] | 0x20) == b'e' {
        // Only consume the exponent when at least one digit follows it.
        let mut j = i + 1;
        if j < bs.len() && (bs[j] == b'-' || bs[j] == b'+') {
            j += 1;
        }
        if j < bs.len() && is_digit(bs[j]) {
            norm.push(b'e');
            norm.extend_from_slice(&bs[i + 1..j]);
            while j < bs.len() && is_digit(bs[j]) {
                norm.push(bs[j]);
                j += 1;
            }
        }
    }
    std::str::from_utf8(&norm)
        .ok()
        .and_then(|t| t.parse().ok())
        .unwrap_or(0.0)
}

/// Whether the whole string is a decimal integer: optional blanks, optional
/// sign, digits, optional trailing blanks.
pub(crate) fn is_valid_int(s: &str) -> bool {
    let bs = s.as_bytes();
    if bs.is_empty() {
        return false;
    }
    let mut i = skip_ws(bs, 0);
    if i < bs.len() && (bs[i] == b'-' || bs[i] == b'+') {
        i += 1;
    }
    let start = i;
    while i < bs.len() && is_digit(bs[i]) {
        i += 1;
    }
    if i == start {
        return false;
    }
    skip_ws(bs, i) == bs.len()
}

/// Whether the whole string is a decimal float: optional blanks, optional
/// sign, digits with at most one point, optional exponent, optional trailing
/// blanks. A bare trailing `e` is tolerated, mirroring what `atof` accepted.
pub(crate) fn is_valid_float(s: &str) -> bool {
    let bs = s.as_bytes();
    if bs.is_empty() {
        return false;
    }
    let mut i = skip_ws(bs, 0);
    if i < bs.len() && (bs[i] == b'-' || bs[i] == b'+') {
        i += 1;
    }
    let mut got_dot = false;
    let mut digits = 0;
    while i < bs.len() && (is_digit(bs[i]) || (!got_dot && bs[i] == b'.')) {
        if bs[i] == b'.' {
            got_dot = true;
        } else {
            digits += 1;
        }
        i += 1;
    }
    if digits == 0 {
        return false;
    }
    if i < bs.len() && (bs[i] | 0x20) == b'e' {
        i += 1;
        if i == bs.len() {
            return true;
        }
        if bs[i] == b'-' || bs[i] == b'+' {
            i += 1;
        }
        let estart = i;
        while i < bs.len() && is_digit(bs[i]) {
            i += 1;
        }
        if i == estart {
            return false;
        }
    }
    skip_ws(bs, i) == bs.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_prefixes() {
        assert_eq!(strtoi("42"), 42);
        assert_eq!(strtoi("  -7x"), -7);
        assert_eq!(strtoi("+13"), 13);
        assert_eq!(strtoi(""), 0);
        assert_eq!(strtoi("abc"), 0);
        assert_eq!(strtoi("-"), 0);
        assert_eq!(strtoi("99999999999999999999"), 0);
        assert_eq!(strtoi("\t 8"), 8);
    }

    #[test]
    fn unsigned_prefixes() {
        assert_eq!(strtou("250"), 250);
        assert_eq!(strtou("-3"), 0);
        assert_eq!(strtou("+3"), 3);
        assert_eq!(strtou("12moo"), 12);
        assert_eq!(strtou(""), 0);
    }

    #[test]
    fn float_prefixes() {
        assert_eq!(strtod("3.5e2"), 350.0);
        assert_eq!(strtod(".5"), 0.5);
        assert_eq!(strtod("5."), 5.0);
        // An exponent straight after the dot still counts, as in C's atof.
        assert_eq!(strtod("5.e3"), 5000.0);
        assert_eq!(strtod("1e"), 1.0);
        assert_eq!(strtod("1e+2z"), 100.0);
        assert_eq!(strtod("  +2.25xyz"), 2.25);
        assert_eq!(strtod("-0.125"), -0.125);
        assert_eq!(strtod("x"), 0.0);
        assert_eq!(strtod(""), 0.0);
        assert_eq!(strtod("."), 0.0);
        assert!(strtod("1e999").is_infinite());
    }

    #[test]
    fn int_validity() {
        assert!(is_valid_int("42"));
        assert!(is_valid_int("  -42  "));
        assert!(is_valid_int("+7"));
        assert!(!is_valid_int(""));
        assert!(!is_valid_int("   "));
        assert!(!is_valid_int("4x"));
        assert!(!is_valid_int("4.0"));
        assert!(!is_valid_int("-"));
    }

    #[test]
    fn float_validity() {
        assert!(is_valid_float("42"));
        assert!(is_valid_float("4.25"));
        assert!(is_valid_float(".5"));
        assert!(is_valid_float("5."));
        assert!(is_valid_float("-1.5e-3 "));
        assert!(is_valid_float("1e"));
        assert!(!is_valid_float("1e+"));
        assert!(!is_valid_float(""));
        assert!(!is_valid_float("1.2.3"));
        assert!(!is_valid_float("x5"));
        assert!(!is_valid_float("."));
    }
}
