use crate::{
    ast::{AstNode, AstNodeId, AstOp, ParsedRegex, QuantKind, Quantifier, MAX_NODES},
    error::Error,
    matcher::{self, CharMatcher, CharRange, Ctype},
    unicode,
};

// Fixed error messages. Parameterized ones are formatted at the use site;
// either way the final message carries the pattern with a `<<<HERE>>>`
// marker at the failing position.
const ERR_UNCLOSED_PAREN: &str = "unclosed parenthesis";
const ERR_UNMATCHED_PAREN: &str = "unmatched ')'";
const ERR_UNCLOSED_CLASS: &str = "unclosed character class";
const ERR_INVALID_RANGE: &str = "invalid range specified";
const ERR_UNCLOSED_BRACE: &str = "expected closing bracket";
const ERR_TRAILING_ESCAPE: &str = "incomplete escape at end of pattern";
const ERR_UNKNOWN_ESCAPE: &str = "unknown atom escape";
const ERR_UNTERMINATED_HEX: &str = "unterminated hex sequence";
const ERR_INVALID_CODEPOINT: &str = "escape is not a valid codepoint";
const ERR_UNTERMINATED_CONTROL: &str = "unterminated control escape";
const ERR_LOOKAROUND_CONTENTS: &str =
    "lookaround can only contain literals, any chars or character classes";
const ERR_LOOKAROUND_QUANTIFIER: &str = "quantifiers cannot be used in lookarounds";
const ERR_TOO_MANY_NODES: &str = "pattern parsed to too many nodes";

/// The maximum count an explicit `{m,n}` quantifier may name.
const MAX_REPEAT: u32 = 1000;

/// Characters that must be escaped to appear literally outside a
/// character class, and that may only be escaped among letters.
const SYNTAX_CHARACTERS: &str = r"^$\.*+?()[]{}|";

pub(crate) fn is_syntax_character(ch: char) -> bool {
    SYNTAX_CHARACTERS.contains(ch)
}

/// Escapes all syntax characters in `text` so that the result can be
/// embedded in a pattern and match `text` literally.
pub fn escape(text: &str) -> String {
    let mut buf = String::with_capacity(text.len());
    for ch in text.chars() {
        if is_syntax_character(ch) {
            buf.push('\\');
        }
        buf.push(ch);
    }
    buf
}

/// A character class escape (`\d`, `\w`, `\s`, `\h` and their negated
/// uppercase forms): a category test plus extra member characters.
struct ClassEscape {
    name: char,
    ctype: Option<Ctype>,
    additional: &'static [char],
}

const CLASS_ESCAPES: &[ClassEscape] = &[
    ClassEscape { name: 'd', ctype: Some(Ctype::Digit), additional: &[] },
    ClassEscape { name: 'w', ctype: Some(Ctype::Alnum), additional: &['_'] },
    ClassEscape { name: 's', ctype: Some(Ctype::Space), additional: &[] },
    ClassEscape { name: 'h', ctype: None, additional: &[' ', '\t'] },
];

fn class_escape(ch: char) -> Option<&'static ClassEscape> {
    let name = ch.to_ascii_lowercase();
    CLASS_ESCAPES.iter().find(|escape| escape.name == name)
}

const CONTROL_ESCAPES: &[(char, char)] =
    &[('f', '\x0C'), ('n', '\n'), ('r', '\r'), ('t', '\t'), ('v', '\x0B')];

fn control_escape(ch: char) -> Option<char> {
    CONTROL_ESCAPES.iter().find(|&&(name, _)| name == ch).map(|&(_, value)| value)
}

/// A recursive-descent pattern parser producing a flat syntax tree.
#[derive(Debug)]
pub(crate) struct Parser<'p> {
    pattern: &'p str,
    /// Byte offset of the cursor into `pattern`.
    pos: usize,
    /// Sticky case-insensitivity mode, toggled by `(?i)` / `(?I)`
    /// anywhere in the term stream. Each node captures the mode in force
    /// at the moment it is created.
    ignore_case: bool,
    parsed: ParsedRegex,
}

impl<'p> Parser<'p> {
    pub(crate) fn new(pattern: &'p str) -> Parser<'p> {
        Parser {
            pattern,
            pos: 0,
            ignore_case: false,
            parsed: ParsedRegex { nodes: vec![], matchers: vec![], capture_count: 1 },
        }
    }

    pub(crate) fn parse(mut self) -> Result<ParsedRegex, Error> {
        let root = self.disjunction(Some(0))?;
        debug_assert_eq!(0, root);
        if !self.is_done() {
            // A disjunction only stops early on a ')' it did not open.
            return Err(self.error(ERR_UNMATCHED_PAREN));
        }
        Ok(self.parsed)
    }

    // -- cursor ----------------------------------------------------------

    fn is_done(&self) -> bool {
        self.pos >= self.pattern.len()
    }

    fn rest(&self) -> &str {
        &self.pattern[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// If the pattern continues with `prefix`, consume it and return
    /// true. The cursor does not move otherwise.
    fn bump_if(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn error(&self, msg: &str) -> Error {
        Error::parse(format!(
            "regex parse error: {} at '{}<<<HERE>>>{}'",
            msg,
            &self.pattern[..self.pos],
            &self.pattern[self.pos..],
        ))
    }

    // -- tree building ---------------------------------------------------

    fn push_node(&mut self, op: AstOp) -> Result<AstNodeId, Error> {
        if self.parsed.nodes.len() >= MAX_NODES {
            return Err(Error::too_big(format!(
                "{}: limit is {}",
                ERR_TOO_MANY_NODES, MAX_NODES
            )));
        }
        let id = self.parsed.nodes.len() as AstNodeId;
        self.parsed.nodes.push(AstNode {
            op,
            ignore_case: self.ignore_case,
            children_end: id + 1,
            quantifier: Quantifier::ONE,
        });
        Ok(id)
    }

    /// Closes the subtree rooted at `id` over every node pushed since.
    fn seal(&mut self, id: AstNodeId) {
        let end = self.parsed.nodes.len() as AstNodeId;
        self.parsed.nodes[usize::from(id)].children_end = end;
    }

    fn add_matcher(&mut self, matcher: CharMatcher) -> Result<u16, Error> {
        let id = u16::try_from(self.parsed.matchers.len())
            .map_err(|_| Error::too_big("too many character classes".to_string()))?;
        self.parsed.matchers.push(matcher);
        Ok(id)
    }

    // -- grammar ---------------------------------------------------------

    fn disjunction(&mut self, capture: Option<u16>) -> Result<AstNodeId, Error> {
        let index = self.push_node(AstOp::Alternation { capture })?;
        loop {
            self.alternative(AstOp::Sequence)?;
            if !self.bump_if("|") {
                break;
            }
        }
        self.seal(index);
        Ok(index)
    }

    fn alternative(&mut self, op: AstOp) -> Result<AstNodeId, Error> {
        let index = self.push_node(op)?;
        while self.term()?.is_some() {}
        self.seal(index);
        Ok(index)
    }

    fn term(&mut self) -> Result<Option<AstNodeId>, Error> {
        while self.modifiers() {}
        if let Some(node) = self.assertion()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.atom()? {
            let quantifier = self.quantifier()?;
            self.parsed.nodes[usize::from(node)].quantifier = quantifier;
            return Ok(Some(node));
        }
        Ok(None)
    }

    fn modifiers(&mut self) -> bool {
        if self.bump_if("(?i)") {
            self.ignore_case = true;
            return true;
        }
        if self.bump_if("(?I)") {
            self.ignore_case = false;
            return true;
        }
        false
    }

    fn assertion(&mut self) -> Result<Option<AstNodeId>, Error> {
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(None),
        };
        match ch {
            '^' => {
                self.bump();
                self.push_node(AstOp::LineStart).map(Some)
            }
            '$' => {
                self.bump();
                self.push_node(AstOp::LineEnd).map(Some)
            }
            '\\' => {
                // Escapes are ASCII, so peeking one byte past the
                // backslash is enough.
                let op = match self.rest().as_bytes().get(1) {
                    Some(b'b') => AstOp::WordBoundary,
                    Some(b'B') => AstOp::NotWordBoundary,
                    Some(b'A') => AstOp::SubjectBegin,
                    Some(b'z') => AstOp::SubjectEnd,
                    Some(b'K') => AstOp::ResetStart,
                    _ => return Ok(None),
                };
                self.pos += 2;
                self.push_node(op).map(Some)
            }
            '(' => {
                let op = if self.bump_if("(?=") {
                    AstOp::LookAhead
                } else if self.bump_if("(?!") {
                    AstOp::NegativeLookAhead
                } else if self.bump_if("(?<=") {
                    AstOp::LookBehind
                } else if self.bump_if("(?<!") {
                    AstOp::NegativeLookBehind
                } else {
                    return Ok(None);
                };
                let node = self.alternative(op)?;
                if !self.bump_if(")") {
                    return Err(self.error(ERR_UNCLOSED_PAREN));
                }
                self.validate_lookaround(node)?;
                Ok(Some(node))
            }
            _ => Ok(None),
        }
    }

    fn atom(&mut self) -> Result<Option<AstNodeId>, Error> {
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(None),
        };
        match ch {
            '.' => {
                self.bump();
                self.push_node(AstOp::AnyChar).map(Some)
            }
            '(' => {
                self.bump();
                let capture = if self.bump_if("?:") {
                    None
                } else {
                    let index = self.parsed.capture_count;
                    self.parsed.capture_count += 1;
                    Some(index)
                };
                let content = self.disjunction(capture)?;
                if !self.bump_if(")") {
                    return Err(self.error(ERR_UNCLOSED_PAREN));
                }
                Ok(Some(content))
            }
            '\\' => {
                self.bump();
                self.atom_escape().map(Some)
            }
            '[' => {
                self.bump();
                self.character_class().map(Some)
            }
            '|' | ')' => Ok(None),
            _ => {
                if "^$.*+?[]{}".contains(ch) {
                    return Err(self.error(&format!("unexpected '{}'", ch)));
                }
                self.bump();
                self.push_node(AstOp::Literal(ch)).map(Some)
            }
        }
    }

    /// Parses an escape at atom position, with the cursor just past the
    /// backslash.
    fn atom_escape(&mut self) -> Result<AstNodeId, Error> {
        let ch = match self.bump() {
            Some(ch) => ch,
            None => return Err(self.error(ERR_TRAILING_ESCAPE)),
        };

        if ch == 'Q' {
            // Quote everything up to \E (or the end of the pattern) as a
            // literal run.
            let sequence = self.push_node(AstOp::Sequence)?;
            while !self.is_done() && !self.bump_if(r"\E") {
                let literal = self.bump().expect("cursor not at end");
                self.push_node(AstOp::Literal(literal))?;
            }
            self.seal(sequence);
            return Ok(sequence);
        }

        if let Some(escape) = class_escape(ch) {
            let negate = ch.is_ascii_uppercase();
            let matcher = CharMatcher {
                ranges: escape.additional.iter().map(|&c| CharRange::single(c)).collect(),
                ctypes: escape.ctype.map(|ctype| (ctype, true)).into_iter().collect(),
                excluded: vec![],
                negate,
                ignore_case: false,
            };
            let id = self.add_matcher(matcher)?;
            return self.push_node(AstOp::Matcher(id));
        }

        if let Some(value) = control_escape(ch) {
            return self.push_node(AstOp::Literal(value));
        }

        match ch {
            '0' => self.push_node(AstOp::Literal('\0')),
            'c' => {
                let ctrl = match self.bump() {
                    Some(ctrl) => ctrl,
                    None => return Err(self.error(ERR_UNTERMINATED_CONTROL)),
                };
                if ctrl.is_ascii_alphabetic() {
                    self.push_node(AstOp::Literal(char::from(ctrl as u8 % 32)))
                } else {
                    Err(self.error(&format!("invalid control escape character '{}'", ctrl)))
                }
            }
            'x' => {
                let value = self.read_hex(2)?;
                self.push_literal_codepoint(value)
            }
            'u' => {
                let value = self.read_hex(4)?;
                self.push_literal_codepoint(value)
            }
            _ if is_syntax_character(ch) => self.push_node(AstOp::Literal(ch)),
            _ => Err(self.error(ERR_UNKNOWN_ESCAPE)),
        }
    }

    fn push_literal_codepoint(&mut self, value: u32) -> Result<AstNodeId, Error> {
        match char::from_u32(value) {
            Some(ch) => self.push_node(AstOp::Literal(ch)),
            None => Err(self.error(ERR_INVALID_CODEPOINT)),
        }
    }

    fn read_hex(&mut self, digits: usize) -> Result<u32, Error> {
        let mut value = 0;
        for _ in 0..digits {
            let digit = match self.bump() {
                Some(digit) => digit,
                None => return Err(self.error(ERR_UNTERMINATED_HEX)),
            };
            match digit.to_digit(16) {
                Some(d) => value = value * 16 + d,
                None => {
                    return Err(self.error(&format!("invalid hex digit '{}'", digit)));
                }
            }
        }
        Ok(value)
    }

    /// Parses a `[...]` class with the cursor just past the opening
    /// bracket.
    fn character_class(&mut self) -> Result<AstNodeId, Error> {
        let negate = self.bump_if("^");
        let mut ranges: Vec<CharRange> = vec![];
        let mut ctypes: Vec<(Ctype, bool)> = vec![];
        let mut excluded: Vec<char> = vec![];

        while let Some(ch) = self.peek() {
            if ch == ']' {
                break;
            }
            self.bump();
            let mut item = ch;
            if item == '-' {
                ranges.push(CharRange::single('-'));
                continue;
            }
            if item == '\\' {
                let next = match self.peek() {
                    Some(next) => next,
                    None => break,
                };
                if let Some(escape) = class_escape(next) {
                    let neg = next.is_ascii_uppercase();
                    if let Some(ctype) = escape.ctype {
                        ctypes.push((ctype, !neg));
                    }
                    for &c in escape.additional {
                        if neg {
                            excluded.push(c);
                        } else {
                            ranges.push(CharRange::single(c));
                        }
                    }
                    self.bump();
                    continue;
                }
                // Just an escaped character.
                item = self.bump().expect("peeked character");
                if let Some(value) = control_escape(item) {
                    item = value;
                }
            }
            let mut range = CharRange::single(item);
            if self.peek() == Some('-') {
                self.bump();
                match self.peek() {
                    None => break,
                    Some(']') => {
                        // A '-' before the closing bracket is a literal.
                        ranges.push(range);
                        range = CharRange::single('-');
                    }
                    Some(max) => {
                        self.bump();
                        range.max = max;
                        if range.min > range.max {
                            return Err(self.error(ERR_INVALID_RANGE));
                        }
                    }
                }
            }
            ranges.push(range);
        }
        if !self.bump_if("]") {
            return Err(self.error(ERR_UNCLOSED_CLASS));
        }

        if self.ignore_case {
            for range in &mut ranges {
                range.min = unicode::to_lower(range.min);
                range.max = unicode::to_lower(range.max);
            }
            for ch in &mut excluded {
                *ch = unicode::to_lower(*ch);
            }
        }
        matcher::normalize_ranges(&mut ranges);

        // A class holding exactly one character, like [*], is a literal.
        if ctypes.is_empty()
            && excluded.is_empty()
            && !negate
            && ranges.len() == 1
            && ranges[0].min == ranges[0].max
        {
            return self.push_node(AstOp::Literal(ranges[0].min));
        }

        let id = self.add_matcher(CharMatcher {
            ranges,
            ctypes,
            excluded,
            negate,
            ignore_case: self.ignore_case,
        })?;
        self.push_node(AstOp::Matcher(id))
    }

    fn quantifier(&mut self) -> Result<Quantifier, Error> {
        let kind = match self.peek() {
            Some('*') => QuantKind::ZeroOrMore,
            Some('+') => QuantKind::OneOrMore,
            Some('?') => QuantKind::Optional,
            Some('{') => {
                self.bump();
                let min = self.read_bound()?;
                let max = if self.bump_if(",") { self.read_bound()? } else { min };
                if !self.bump_if("}") {
                    return Err(self.error(ERR_UNCLOSED_BRACE));
                }
                let greedy = !self.bump_if("?");
                return Ok(Quantifier {
                    kind: QuantKind::MinMax,
                    greedy,
                    min: min.unwrap_or(0),
                    max,
                });
            }
            _ => return Ok(Quantifier::ONE),
        };
        self.bump();
        let greedy = !self.bump_if("?");
        let (min, max) = match kind {
            QuantKind::ZeroOrMore => (0, None),
            QuantKind::OneOrMore => (1, None),
            QuantKind::Optional => (0, Some(1)),
            QuantKind::One | QuantKind::MinMax => unreachable!(),
        };
        Ok(Quantifier { kind, greedy, min, max })
    }

    /// Reads an optional decimal bound of a counted repetition. Returns
    /// `None` when no digits are present, which the caller treats as
    /// "unspecified".
    fn read_bound(&mut self) -> Result<Option<u32>, Error> {
        let mut value = 0;
        let mut any = false;
        while let Some(digit) = self.peek().and_then(|ch| ch.to_digit(10)) {
            self.bump();
            any = true;
            value = value * 10 + digit;
            if value > MAX_REPEAT {
                return Err(self.error(&format!(
                    "explicit quantifier is too big, maximum is {}",
                    MAX_REPEAT
                )));
            }
        }
        Ok(if any { Some(value) } else { None })
    }

    fn validate_lookaround(&self, index: AstNodeId) -> Result<(), Error> {
        for child in self.parsed.children(index) {
            let node = self.parsed.node(child);
            match node.op {
                AstOp::Literal(_) | AstOp::AnyChar | AstOp::Matcher(_) => {}
                _ => return Err(self.error(ERR_LOOKAROUND_CONTENTS)),
            }
            if node.quantifier.kind != QuantKind::One {
                return Err(self.error(ERR_LOOKAROUND_QUANTIFIER));
            }
        }
        Ok(())
    }
}
