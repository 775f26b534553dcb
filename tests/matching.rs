use regex_vm::{compile, CompileFlags, Direction, ExecFlags, Program, ThreadedVm};

fn program(pattern: &str, direction: Direction) -> Program {
    compile(pattern, CompileFlags::default(), direction).unwrap()
}

/// Pinned-origin check: the whole subject must be covered by the match.
fn is_match(pattern: &str, subject: &str) -> bool {
    is_match_dir(pattern, subject, Direction::Forward)
}

fn is_match_dir(pattern: &str, subject: &str, direction: Direction) -> bool {
    let program = program(pattern, direction);
    let mut vm = ThreadedVm::new(&program);
    let flags = ExecFlags { any_match: true, ..ExecFlags::default() };
    vm.exec(subject.as_bytes(), 0, subject.len(), flags)
}

/// Runs with full priority semantics and returns the group spans, or
/// `None` if the subject did not match.
fn captures_dir(
    pattern: &str,
    subject: &str,
    direction: Direction,
    flags: ExecFlags,
) -> Option<Vec<Option<(usize, usize)>>> {
    let program = program(pattern, direction);
    let mut vm = ThreadedVm::new(&program);
    if !vm.exec(subject.as_bytes(), 0, subject.len(), flags) {
        return None;
    }
    Some(
        vm.captures()
            .chunks(2)
            .map(|pair| match (pair[0], pair[1]) {
                (Some(start), Some(end)) => Some((start, end)),
                _ => None,
            })
            .collect(),
    )
}

fn captures(pattern: &str, subject: &str) -> Option<Vec<Option<(usize, usize)>>> {
    captures_dir(pattern, subject, Direction::Forward, ExecFlags::default())
}

fn search_captures(pattern: &str, subject: &str) -> Option<Vec<Option<(usize, usize)>>> {
    let flags = ExecFlags { search: true, ..ExecFlags::default() };
    captures_dir(pattern, subject, Direction::Forward, flags)
}

fn group<'s>(subject: &'s str, span: Option<(usize, usize)>) -> &'s str {
    let (start, end) = span.unwrap();
    &subject[start..end]
}

#[test]
fn star_and_literal() {
    assert!(is_match("a*b", "b"));
    assert!(is_match("a*b", "ab"));
    assert!(is_match("a*b", "aaab"));
    assert!(!is_match("a*b", "acb"));
    assert!(!is_match("a*b", "abc"));
    assert!(!is_match("a*b", ""));
}

#[test]
fn anchored_dot_star() {
    assert!(is_match("^a.*b$", "afoob"));
    assert!(is_match("^a.*b$", "ab"));
    assert!(!is_match("^a.*b$", "bab"));
    assert!(!is_match("^a.*b$", ""));
}

#[test]
fn repeated_group_keeps_last_iteration() {
    let subject = "fooquxbarbaz";
    let spans = captures("^(foo|qux|baz)+(bar)?baz$", subject).unwrap();
    assert_eq!("qux", group(subject, spans[1]));
    assert_eq!("bar", group(subject, spans[2]));
    assert!(!is_match("^(foo|qux|baz)+(bar)?baz$", "fooquxbarbaze"));
    assert!(!is_match("^(foo|qux|baz)+(bar)?baz$", "quxbar"));
    assert!(!is_match("^(foo|qux|baz)+(bar)?baz$", "blahblah"));
    assert!(is_match("^(foo|qux|baz)+(bar)?baz$", "bazbaz"));
    assert!(is_match("^(foo|qux|baz)+(bar)?baz$", "quxbaz"));
}

#[test]
fn word_boundaries() {
    let subject = "qux foo baz";
    let spans = captures(r".*\b(foo|bar)\b.*", subject).unwrap();
    assert_eq!("foo", group(subject, spans[1]));
    assert!(!is_match(r".*\b(foo|bar)\b.*", "quxfoobaz"));
    assert!(is_match(r".*\b(foo|bar)\b.*", "bar"));
    assert!(!is_match(r".*\b(foo|bar)\b.*", "foobar"));
}

#[test]
fn plain_alternation() {
    assert!(is_match("(foo|bar)", "foo"));
    assert!(is_match("(foo|bar)", "bar"));
    assert!(!is_match("(foo|bar)", "foobar"));
}

#[test]
fn counted_repetitions() {
    assert!(!is_match("a{3,5}b", "aab"));
    assert!(is_match("a{3,5}b", "aaab"));
    assert!(is_match("a{3,5}b", "aaaaab"));
    assert!(!is_match("a{3,5}b", "aaaaaab"));

    assert!(!is_match("a{3}b", "aab"));
    assert!(is_match("a{3}b", "aaab"));
    assert!(!is_match("a{3}b", "aaaab"));

    assert!(!is_match("a{3,}b", "aab"));
    assert!(is_match("a{3,}b", "aaab"));
    assert!(is_match("a{3,}b", "aaaaab"));

    assert!(is_match("a{,3}b", "b"));
    assert!(is_match("a{,3}b", "ab"));
    assert!(is_match("a{,3}b", "aaab"));
    assert!(!is_match("a{,3}b", "aaaab"));
}

#[test]
fn greedy_and_lazy_counted_captures() {
    let subject = "aaaaaa";
    let spans = captures("(a{3,5})a+", subject).unwrap();
    assert_eq!("aaaaa", group(subject, spans[1]));

    let spans = captures("(a{3,5}?)a+", subject).unwrap();
    assert_eq!("aaa", group(subject, spans[1]));

    assert!(is_match("(a{3,5}?)a", "aaaa"));
}

#[test]
fn search_is_leftmost_and_greedy() {
    let subject = "blahfoobarfoobaz";
    let spans = search_captures("f.*a(.*o)", subject).unwrap();
    assert_eq!("foobarfoo", group(subject, spans[0]));
    assert_eq!("rfoo", group(subject, spans[1]));

    let subject = "mais que fais la police";
    let spans = search_captures("f.*a(.*o)", subject).unwrap();
    assert_eq!("fais la po", group(subject, spans[0]));
    assert_eq!(" po", group(subject, spans[1]));
}

#[test]
fn character_classes() {
    assert!(is_match("[àb-dX-Z-]{3,5}", "cà-Y"));
    assert!(!is_match("[àb-dX-Z-]{3,5}", "àeY"));
    assert!(is_match("[àb-dX-Z-]{3,5}", "dcbàX"));
    assert!(!is_match("[àb-dX-Z-]{3,5}", "efg"));

    assert!(is_match(r"\d{3}", "123"));
    assert!(!is_match(r"\d{3}", "1x3"));

    assert!(is_match(r"[-\d]+", "123-456"));
    assert!(!is_match(r"[-\d]+", "123_456"));

    assert!(is_match(r"[ \H]+", "abc "));
    assert!(!is_match(r"[ \H]+", "a \t"));

    assert!(!is_match(r"[^\]]+", "a]c"));
    assert!(is_match(r"[^\]]+", "abc"));

    assert!(!is_match("[^:\\n]+", "\nbc"));
    assert!(is_match("[^:\\n]+", "abc"));

    assert!(is_match("[d-ea-dcf-k]+", "abcde"));
}

#[test]
fn quoted_runs() {
    assert!(is_match(r"\Q{}[]*+?\Ea+", "{}[]*+?aa"));
    assert!(is_match(r"\Q...", "..."));
    assert!(!is_match(r"\Q...", "bla"));
}

#[test]
fn reset_start() {
    let spans = captures(r"foo\Kbar", "foobar").unwrap();
    assert_eq!((3, 6), spans[0].unwrap());
    assert!(captures(r"foo\Kbar", "bar").is_none());
}

#[test]
fn lazy_group_capture() {
    let subject = "foooo";
    let spans = captures("(fo+?).*", subject).unwrap();
    assert_eq!("fo", group(subject, spans[1]));
}

#[test]
fn lookahead() {
    let subject = "barfoo";
    let spans = search_captures("(?=foo).", subject).unwrap();
    assert_eq!("f", group(subject, spans[0]));

    assert!(!is_match("(?!f[oa]o)...", "foo"));
    assert!(is_match("(?!f[oa]o)...", "qux"));

    assert!(is_match("(?=)", ""));
}

#[test]
fn lookbehind() {
    assert!(is_match("(?<!f).", "f"));

    assert!(is_match("...(?<=f.o)", "foo"));
    assert!(!is_match("...(?<=f.o)", "qux"));

    assert!(!is_match("...(?<!foo)", "foo"));
    assert!(is_match("...(?<!foo)", "qux"));

    let flags = ExecFlags { search: true, ..ExecFlags::default() };
    assert!(captures_dir(r#"(?<!\\)(?:\\\\)*""#, "foo\"", Direction::Forward, flags).is_some());
}

#[test]
fn case_insensitivity() {
    assert!(is_match("Foo(?i)f[oB]+", "FooFOoBb"));

    let spans = search_captures("(?i)FOO", "some foo").unwrap();
    assert_eq!((5, 8), spans[0].unwrap());

    let subject = "fOO";
    let spans = search_captures("(?i)(?=Foo)", subject).unwrap();
    assert_eq!((0, 0), spans[0].unwrap());

    let subject = "afoo";
    let spans = search_captures(".?(?=foo)", subject).unwrap();
    assert_eq!("a", group(subject, spans[0]));
}

#[test]
fn corrected_class_fold_covers_whole_range() {
    // Both bounds fold independently: (?i)[Y-Z] accepts y and z.
    assert!(is_match("(?i)[Y-Z]", "y"));
    assert!(is_match("(?i)[Y-Z]", "Z"));
    assert!(!is_match("(?i)[Y-Z]", "x"));
}

#[test]
fn non_capturing_groups() {
    assert!(is_match("(?:foo)+", "foofoofoo"));
    assert!(!is_match("(?:foo)+", "barbarbar"));
}

#[test]
fn dollar_matches_before_trailing_newline() {
    let spans = search_captures("$", "foo\n").unwrap();
    assert_eq!((3, 3), spans[0].unwrap());
}

#[test]
fn caret_matches_after_newline() {
    let spans = search_captures("^a", "b\na").unwrap();
    assert_eq!((2, 3), spans[0].unwrap());
}

#[test]
fn empty_group_star_must_still_cover_subject() {
    assert!(!is_match("()*", " "));
}

#[test]
fn boundary_assertions_at_subject_edges() {
    let subject = "# foo bar";
    let spans = search_captures(r"\b(?<!-)(a|b|)(?!-)\b", subject).unwrap();
    assert_eq!((0, 0), spans[0].unwrap());
}

#[test]
fn unicode_subjects() {
    // "значит " is 13 bytes of UTF-8; the match offset is byte-based.
    let spans = search_captures("д", "значит д").unwrap();
    assert_eq!(13, spans[0].unwrap().0);

    let subject = "\0\n☎☏";
    assert!(is_match(r"\0\x0A☎☏", subject));
}

#[test]
fn backward_search_is_rightmost() {
    let flags = ExecFlags { search: true, ..ExecFlags::default() };

    let spans = captures_dir("fo{1,}", "foo1fooo2", Direction::Backward, flags).unwrap();
    assert_eq!((4, 8), spans[0].unwrap());

    let spans = captures_dir("foo", "foofoo", Direction::Backward, flags).unwrap();
    assert_eq!((3, 6), spans[0].unwrap());
}

#[test]
fn backward_lookaround_capture() {
    let subject = "foobarbazfoobazfooberbaz";
    let flags = ExecFlags { search: true, ..ExecFlags::default() };
    let spans =
        captures_dir("(?<=f)oo(b[ae]r)?(?=baz)", subject, Direction::Backward, flags).unwrap();
    assert_eq!("oober", group(subject, spans[0]));
    assert_eq!("ber", group(subject, spans[1]));
}

#[test]
fn backward_negative_lookbehind() {
    let subject = "quxbozfoobaz";
    let flags = ExecFlags { search: true, ..ExecFlags::default() };
    let spans =
        captures_dir("(baz|boz|foo|qux)(?<!baz)(?<!o)", subject, Direction::Backward, flags)
            .unwrap();
    assert_eq!("boz", group(subject, spans[0]));
}

#[test]
fn backward_line_end_with_not_end_of_line() {
    let subject = "foo\nbar\nbaz\nqux";
    let flags =
        ExecFlags { search: true, not_end_of_line: true, ..ExecFlags::default() };
    let spans = captures_dir("$", subject, Direction::Backward, flags).unwrap();
    assert_eq!((11, 11), spans[0].unwrap());
}

#[test]
fn forward_and_backward_accept_the_same_subjects() {
    let cases = [
        ("a*b", "aaab"),
        ("a*b", "b"),
        ("a*b", "abc"),
        ("^(foo|qux)+baz$", "fooquxbaz"),
        ("^(foo|qux)+baz$", "fooqux"),
        (r"\d{3}", "123"),
        (r"\d{3}", "12x"),
        ("(?:foo)+", "foofoo"),
        ("[d-ea-dcf-k]+", "abcde"),
    ];
    for (pattern, subject) in cases {
        assert_eq!(
            is_match_dir(pattern, subject, Direction::Forward),
            is_match_dir(pattern, subject, Direction::Backward),
            "pattern: {} subject: {}",
            pattern,
            subject,
        );
    }
}

#[test]
fn start_class_skipping_finds_matches() {
    // Single permitted byte: the memchr fast path.
    let subject = "zzzzzzzzfoozzz";
    let spans = search_captures("foo", subject).unwrap();
    assert_eq!((8, 11), spans[0].unwrap());

    // Two permitted bytes.
    let subject = "....bar..foo..";
    let spans = search_captures("(foo|bar)", subject).unwrap();
    assert_eq!((4, 7), spans[0].unwrap());

    // Backward skip.
    let flags = ExecFlags { search: true, ..ExecFlags::default() };
    let spans = captures_dir("foo", "..foo......", Direction::Backward, flags).unwrap();
    assert_eq!((2, 5), spans[0].unwrap());

    // No match at all after skipping.
    assert!(search_captures("foo", "zzzzzzzz").is_none());
}

#[test]
fn not_beginning_and_not_end_of_line_flags() {
    let anchored = program("^a", Direction::Forward);
    let mut vm = ThreadedVm::new(&anchored);
    assert!(vm.exec(b"a", 0, 1, ExecFlags::default()));
    let flags = ExecFlags { not_beginning_of_line: true, ..ExecFlags::default() };
    assert!(!vm.exec(b"a", 0, 1, flags));

    let anchored = program("a$", Direction::Forward);
    let mut vm = ThreadedVm::new(&anchored);
    assert!(vm.exec(b"a", 0, 1, ExecFlags::default()));
    let flags = ExecFlags { not_end_of_line: true, ..ExecFlags::default() };
    assert!(!vm.exec(b"a", 0, 1, flags));
}

#[test]
fn no_subs_still_reports_the_whole_match() {
    let flags = CompileFlags { no_subs: true };
    let program = compile("(a+)(b+)", flags, Direction::Forward).unwrap();
    let mut vm = ThreadedVm::new(&program);
    let exec_flags = ExecFlags { search: true, ..ExecFlags::default() };
    assert!(vm.exec(b"xaabbx", 0, 6, exec_flags));
    assert_eq!(Some(1), vm.captures()[0]);
    assert_eq!(Some(5), vm.captures()[1]);
    assert_eq!(None, vm.captures()[2]);
    assert_eq!(None, vm.captures()[4]);
}

#[test]
fn compilation_is_deterministic() {
    for direction in [Direction::Forward, Direction::Backward] {
        let a = program(r"^(foo|qux|baz)+(bar)?baz$", direction);
        let b = program(r"^(foo|qux|baz)+(bar)?baz$", direction);
        assert_eq!(a.dump(), b.dump());
    }
}

#[test]
fn capture_zero_bounds_the_match() {
    let subject = "xxabcyy";
    let spans = search_captures("abc", subject).unwrap();
    let (start, end) = spans[0].unwrap();
    assert!(start <= end);
    assert_eq!("abc", &subject[start..end]);
}
