use polytext::{text, Encoding, Text};

// Builds the same content as a freshly parked-and-revived value would carry,
// so tests below can compare against plain std strings.
fn collect_utf8(t: &Text) -> String {
    t.with_utf8(|s| s.to_owned())
}

fn collect_wide(t: &Text) -> Vec<char> {
    t.with_wide(|w| w.to_vec())
}

#[test]
fn narrow_values_stay_narrow_through_growth() {
    let mut s = Text::from("Mini");
    s += " Me";
    assert_eq!(s.len(), 7);
    assert_eq!(s.byte_len(), 7);
    assert_eq!(s.encoding(), Encoding::SingleByte);
    assert_eq!(collect_utf8(&s), "Mini Me");

    for _ in 0..40 {
        s += "!";
    }
    assert_eq!(s.len(), 47);
    assert_eq!(s.encoding(), Encoding::SingleByte);
}

#[test]
fn wide_values_stay_wide_through_growth() {
    let mut s = Text::from_wide(&['M', 'i', 'n', 'i']);
    s += 'x';
    assert_eq!(s.len(), 5);
    assert_eq!(s.encoding(), Encoding::Wide);
    assert_eq!(collect_wide(&s), vec!['M', 'i', 'n', 'i', 'x']);
    s.push_str(" again");
    assert_eq!(s.encoding(), Encoding::Wide);
    assert_eq!(collect_utf8(&s), "Minix again");
}

#[test]
fn promotion_happens_exactly_once() {
    let mut s = Text::from("ascii ");
    assert_eq!(s.encoding(), Encoding::SingleByte);
    s += '\u{4e2d}';
    assert_eq!(s.encoding(), Encoding::Wide);
    s += " more ascii";
    assert_eq!(s.encoding(), Encoding::Wide);
    assert_eq!(s.len(), 18);
    assert_eq!(s.byte_len(), 20);
    s.with_bytes(|b| assert_eq!(&b[6..7], b"?"));
}

#[test]
fn trim_and_line_endings() {
    let mut s = Text::from("  pad \t");
    s.trim();
    assert_eq!(s, "pad");

    let mut line = Text::from("  indented\r\n");
    line.remove_line_endings();
    assert_eq!(line, "  indented");
    line.trim_leading();
    assert_eq!(line, "indented");

    let mut blank = Text::from(" \t\t ");
    blank.trim();
    assert!(blank.is_empty());
    blank.trim();
    assert!(blank.is_empty());
}

#[test]
fn replace_family() {
    let mut s = Text::from("XaXbXc");
    assert_eq!(s.replace("X", ""), 3);
    assert_eq!(s, "abc");

    let mut grow = Text::from("a-b-c");
    assert_eq!(grow.replace("-", "<->"), 2);
    assert_eq!(grow, "a<->b<->c");

    let mut chars = Text::from("mississippi");
    assert_eq!(chars.replace_char('s', 'z'), 4);
    assert_eq!(chars, "mizzizzippi");
    assert_eq!(chars.replace("zz", "ss"), 2);
    assert_eq!(chars, "missisippi");

    let mut vanish = Text::from("aaaa");
    assert_eq!(vanish.replace("aa", ""), 2);
    assert!(vanish.is_empty());
}

#[test]
fn substring_and_indexing() {
    let s = Text::from("hello");
    assert!(s.substring(5, Some(1)).is_empty());
    assert_eq!(s.substring(1, Some(3)), "ell");
    assert_eq!(s.substring(2, None), "llo");
    assert_eq!(s.char_at(0), Some('h'));
    assert_eq!(s.char_at(5), None);

    let wide = Text::from("a\u{4e2d}b");
    assert_eq!(wide.substring(1, Some(1)), Text::from("\u{4e2d}"));
    assert_eq!(wide.char_at(1), Some('\u{4e2d}'));
}

#[test]
fn utf8_construction_and_projection() {
    let s = Text::from_utf8_lossy(b"caf\xC3\xA9");
    assert_eq!(s.len(), 4);
    assert_eq!(s.byte_len(), 5);
    assert_eq!(collect_utf8(&s), "caf\u{e9}");

    let wide = Text::from("\u{4e2d}\u{6587}");
    assert_eq!(wide.encoding(), Encoding::Wide);
    assert_eq!(wide.len(), 2);
    assert_eq!(wide.byte_len(), 6);
    wide.with_bytes(|b| assert_eq!(b, b"??"));
}

#[test]
fn values_are_independent_after_clone() {
    let base = Text::from("shared base");
    let mut a = base.clone();
    let mut b = base.clone();

    a.to_upper();
    b.delete(0, Some(7));
    assert_eq!(base, "shared base");
    assert_eq!(a, "SHARED BASE");
    assert_eq!(b, "base");

    let mut c = base.clone();
    c.set_char(0, 'S');
    assert_eq!(base, "shared base");
    assert_eq!(c, "Shared base");

    let mut d = base.clone();
    d.insert_str(6, ",");
    assert_eq!(base, "shared base");
    assert_eq!(d, "shared, base");
}

#[test]
fn append_insert_delete_pipeline() {
    let mut s = Text::new();
    s.append(&Text::from("world"), None);
    s.insert_str(0, "hello ");
    assert_eq!(s, "hello world");
    s.insert(5, &Text::from(", there"), None);
    assert_eq!(s, "hello, there world");
    s.delete(5, Some(7));
    assert_eq!(s, "hello world");
    s.delete(5, None);
    assert_eq!(s, "hello");
    s.delete(0, None);
    assert!(s.is_empty());
}

#[test]
fn operators_compose() {
    let s = Text::from("a") + "b" + 'c' + &Text::from("d");
    assert_eq!(s, "abcd");

    let mut sum = Text::new();
    for part in ["one", " ", "two"].iter() {
        sum += *part;
    }
    assert_eq!(sum, "one two");

    assert!(Text::from("apple") < Text::from("banana"));
    assert!(Text::from("a") <= Text::from("a"));
    assert_eq!(Text::from("x"), "x");
    assert_eq!("x", Text::from("x"));
}

#[test]
fn windowed_comparisons() {
    let hay = Text::from("The quick brown fox");
    let quick = Text::from("quick");
    assert!(hay.compare(&quick, 4, Some(5)));
    assert!(!hay.compare(&quick, 4, None));
    assert!(hay.compare_no_case(&Text::from("THE"), 0, Some(3)));
    assert!(hay.eq_ignore_case(&Text::from("the quick brown fox")));

    let wide = Text::from_wide(&['q', 'u', 'i', 'c', 'k']);
    assert!(hay.compare(&wide, 4, Some(5)));
}

#[test]
fn search_api() {
    let s = Text::from("to be or not to be");
    assert_eq!(s.index_of("be", 0), Some(3));
    assert_eq!(s.index_of("be", 4), Some(16));
    assert_eq!(s.last_index_of("be", None), Some(16));
    assert_eq!(s.last_index_of("be", Some(15)), Some(3));
    assert!(s.contains("not"));
    assert!(!s.contains("knot"));
    assert_eq!(s.index_of_char('o', 2), Some(6));

    let wide = Text::from("x\u{4e2d}y\u{4e2d}");
    assert_eq!(wide.index_of("\u{4e2d}", 0), Some(1));
    assert_eq!(wide.index_of("\u{4e2d}", 2), Some(3));
    assert_eq!(wide.last_index_of("\u{4e2d}", None), Some(3));
}

#[test]
fn numeric_conversions() {
    assert_eq!(Text::from(1234i64), "1234");
    assert_eq!(Text::from(1234i64).to_i32(), 1234);
    assert_eq!(Text::from(-2.5f64).to_f64(), -2.5);
    assert_eq!(Text::from("0x10").to_i32(), 0);
    assert_eq!(Text::from("  12 ").to_i32(), 12);
    assert_eq!(Text::from("12.9").to_i32(), 12);
    assert_eq!(Text::from("1e3").to_f64(), 1000.0);

    assert_eq!(Text::from("42").parse_i64(), Some(42));
    assert_eq!(Text::from("4x").parse_i64(), None);
    assert!(Text::from("-13").is_valid_integer());
    assert!(!Text::from("").is_valid_integer());
    assert!(Text::from("2.5e-3").is_valid_float());
    assert!(!Text::from("e5").is_valid_float());

    assert!(Text::from("TRUE").to_bool());
    assert!(!Text::from("false").to_bool());
    assert!(Text::from("7").to_bool());
    assert!(!Text::from("0").to_bool());
}

#[test]
fn formatting_round_trip() {
    let t = text!("{}={} ({:.2})", "pi", 3, 3.14159);
    assert_eq!(t, "pi=3 (3.14)");
    assert_eq!(t.encoding(), Encoding::SingleByte);

    let padded = text!("{:>6}", 42);
    assert_eq!(padded, "    42");
    assert_eq!(padded.len(), 6);

    let wide = text!("{}\u{4e2d}", 7);
    assert_eq!(wide.encoding(), Encoding::Wide);
    assert_eq!(wide.len(), 2);

    assert_eq!(format!("{}", Text::from("plain")), "plain");
    assert_eq!(format!("{:?}", Text::from("tab\there")), "\"tab\\there\"");
}

#[test]
fn escape_helpers_are_public() {
    let escaped = polytext::utf8::escape("line\nbreak \u{e9}", false);
    assert_eq!(escaped, "line\\nbreak \\u00e9");
    assert_eq!(polytext::utf8::unescape(&escaped), "line\nbreak \u{e9}");
}

#[test]
fn case_changes() {
    let mut s = Text::from("The Quick Fox");
    s.to_lower();
    assert_eq!(s, "the quick fox");
    s.to_upper();
    assert_eq!(s, "THE QUICK FOX");

    let mut latin = Text::from("caf\u{e9}");
    latin.to_upper();
    assert_eq!(latin.char_at(3), Some('\u{c9}'));
}

#[test]
fn classification_api() {
    assert!(Text::from("words").is_alphabetic());
    assert!(Text::from("w0rd5").is_alphanumeric());
    assert!(Text::from("31337").is_numeric());
    assert!(!Text::from("3.14").is_numeric());
    assert!(Text::new().is_alphanumeric());
}

#[test]
fn long_mixed_pipeline() {
    let mut log = Text::new();
    for i in 0..50 {
        let line = text!("entry {:03}\n", i);
        log.append(&line, None);
    }
    assert_eq!(log.len(), 50 * 10);
    assert_eq!(log.index_of("entry 007", 0), Some(7 * 10));
    assert_eq!(log.replace("entry", "row"), 50);
    assert_eq!(log.len(), 50 * 8);
    log.remove_line_endings();
    assert_eq!(log.len(), 50 * 8 - 1);
    let tail = log.substring(log.len() - 7, None);
    assert_eq!(tail, "row 049");
}
