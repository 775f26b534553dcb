use core::cmp;

use log::trace;

use crate::{
    ast::{AstNodeId, AstOp, ParsedRegex},
    error::Error,
    prog::{
        Direction, Inst, InstPtr, Op, Program, StartChars, FIND_NEXT_START_PC, LOOK_ANY_CHAR,
        LOOK_END, LOOK_MATCHER_BASE, MAX_INSTRUCTIONS, SEARCH_PREFIX_SIZE,
    },
    unicode,
};

/// Options controlling how a pattern is compiled.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompileFlags {
    /// Suppress capture recording for every group except the implicit
    /// whole-match group 0.
    pub no_subs: bool,
}

/// Lowers a parsed pattern into a linear instruction program.
pub(crate) fn compile_parsed(
    pattern: &str,
    parsed: ParsedRegex,
    flags: CompileFlags,
    direction: Direction,
) -> Result<Program, Error> {
    let compiler = Compiler {
        parsed: &parsed,
        no_subs: flags.no_subs,
        forward: direction == Direction::Forward,
        insts: vec![],
        lookarounds: vec![],
    };
    let (insts, lookarounds, start_chars) = compiler.compile()?;
    trace!(
        "compiled {:?} to {} instructions, {} matchers, start class: {}",
        pattern,
        insts.len(),
        parsed.matchers.len(),
        start_chars.is_some(),
    );
    Ok(Program {
        pattern: pattern.to_string(),
        insts,
        matchers: parsed.matchers,
        lookarounds,
        save_count: usize::from(parsed.capture_count) * 2,
        direction,
        start_chars: start_chars.map(Box::new),
    })
}

struct Compiler<'a> {
    parsed: &'a ParsedRegex,
    no_subs: bool,
    forward: bool,
    insts: Vec<Inst>,
    lookarounds: Vec<u32>,
}

impl<'a> Compiler<'a> {
    fn compile(mut self) -> Result<(Vec<Inst>, Vec<u32>, Option<StartChars>), Error> {
        self.write_search_prefix()?;
        self.compile_node(0)?;
        self.push_inst(Op::Match, 0)?;
        let start_chars = self.compute_start_chars();
        Ok((self.insts, self.lookarounds, start_chars))
    }

    fn pc(&self) -> InstPtr {
        self.insts.len() as InstPtr
    }

    fn push_inst(&mut self, op: Op, param: u32) -> Result<InstPtr, Error> {
        if self.insts.len() >= MAX_INSTRUCTIONS {
            return Err(Error::too_big(format!(
                "pattern compiled to too many instructions: limit is {}",
                MAX_INSTRUCTIONS
            )));
        }
        let pc = self.pc();
        self.insts.push(Inst { op, param });
        Ok(pc)
    }

    /// The outer loop that either enters the pattern or advances the
    /// match start by one code point; see `SEARCH_PREFIX_SIZE`.
    fn write_search_prefix(&mut self) -> Result<(), Error> {
        debug_assert!(self.insts.is_empty());
        self.push_inst(Op::SplitPrioritizeChild, SEARCH_PREFIX_SIZE)?;
        self.push_inst(Op::FindNextStart, 0)?;
        self.push_inst(Op::SplitPrioritizeParent, FIND_NEXT_START_PC)?;
        Ok(())
    }

    /// Lowers a node together with its quantifier. Returns the program
    /// position the node starts at.
    fn compile_node(&mut self, index: AstNodeId) -> Result<InstPtr, Error> {
        let quantifier = self.parsed.node(index).quantifier;
        let start_pos = self.pc();
        let mut goto_ends = vec![];

        if quantifier.allows_none() {
            let split = self.push_inst(
                if quantifier.greedy {
                    Op::SplitPrioritizeParent
                } else {
                    Op::SplitPrioritizeChild
                },
                0,
            )?;
            goto_ends.push(split);
        }

        let mut inner_pos = self.compile_node_inner(index)?;
        // Repeat the body for a min count quantifier.
        for _ in 1..quantifier.min {
            inner_pos = self.compile_node_inner(index)?;
        }

        if quantifier.allows_infinite_repeat() {
            self.push_inst(
                if quantifier.greedy {
                    Op::SplitPrioritizeChild
                } else {
                    Op::SplitPrioritizeParent
                },
                inner_pos,
            )?;
        } else if let Some(max) = quantifier.max {
            // Optional body copies for the min -> max counts.
            for _ in cmp::max(1, quantifier.min)..max {
                let split = self.push_inst(
                    if quantifier.greedy {
                        Op::SplitPrioritizeParent
                    } else {
                        Op::SplitPrioritizeChild
                    },
                    0,
                )?;
                goto_ends.push(split);
                self.compile_node_inner(index)?;
            }
        }

        let end = self.pc();
        for offset in goto_ends {
            self.insts[offset as usize].param = end;
        }
        Ok(start_pos)
    }

    /// Lowers one copy of a node's body, with opening and closing capture
    /// saves when the node reports into a group.
    fn compile_node_inner(&mut self, index: AstNodeId) -> Result<InstPtr, Error> {
        let node = *self.parsed.node(index);
        let start_pos = self.pc();
        let ignore_case = node.ignore_case;

        let capture = match node.op {
            AstOp::Alternation { capture } => capture,
            _ => None,
        };
        let save = match capture {
            Some(group) => group == 0 || !self.no_subs,
            None => false,
        };
        if save {
            let group = u32::from(capture.expect("save implies a capture group"));
            let slot = group * 2 + if self.forward { 0 } else { 1 };
            self.push_inst(Op::Save, slot)?;
        }

        let mut goto_inner_end_offsets = vec![];
        match node.op {
            AstOp::Literal(ch) => {
                if ignore_case {
                    self.push_inst(Op::LiteralIgnoreCase, u32::from(unicode::to_lower(ch)))?;
                } else {
                    self.push_inst(Op::Literal, u32::from(ch))?;
                }
            }
            AstOp::AnyChar => {
                self.push_inst(Op::AnyChar, 0)?;
            }
            AstOp::Matcher(id) => {
                self.push_inst(Op::Matcher, u32::from(id))?;
            }
            AstOp::Sequence => {
                let children = if self.forward {
                    self.parsed.children(index).collect()
                } else {
                    self.parsed.children_rev(index)
                };
                for child in children {
                    self.compile_node(child)?;
                }
            }
            AstOp::Alternation { .. } => {
                let children: Vec<AstNodeId> = self.parsed.children(index).collect();
                let mut split_pos = self.pc();
                for _ in 1..children.len() {
                    self.push_inst(Op::SplitPrioritizeParent, 0)?;
                }
                for (i, &child) in children.iter().enumerate() {
                    let branch = self.compile_node(child)?;
                    if i > 0 {
                        self.insts[split_pos as usize].param = branch;
                        split_pos += 1;
                    }
                    if i + 1 != children.len() {
                        let jump = self.push_inst(Op::Jump, 0)?;
                        goto_inner_end_offsets.push(jump);
                    }
                }
            }
            AstOp::LookAhead => {
                let param = self.push_lookaround(index, false, ignore_case);
                let op = match (self.forward, ignore_case) {
                    (true, false) => Op::LookAhead,
                    (true, true) => Op::LookAheadIgnoreCase,
                    (false, false) => Op::LookBehind,
                    (false, true) => Op::LookBehindIgnoreCase,
                };
                self.push_inst(op, param)?;
            }
            AstOp::NegativeLookAhead => {
                let param = self.push_lookaround(index, false, ignore_case);
                let op = match (self.forward, ignore_case) {
                    (true, false) => Op::NegativeLookAhead,
                    (true, true) => Op::NegativeLookAheadIgnoreCase,
                    (false, false) => Op::NegativeLookBehind,
                    (false, true) => Op::NegativeLookBehindIgnoreCase,
                };
                self.push_inst(op, param)?;
            }
            AstOp::LookBehind => {
                let param = self.push_lookaround(index, true, ignore_case);
                let op = match (self.forward, ignore_case) {
                    (true, false) => Op::LookBehind,
                    (true, true) => Op::LookBehindIgnoreCase,
                    (false, false) => Op::LookAhead,
                    (false, true) => Op::LookAheadIgnoreCase,
                };
                self.push_inst(op, param)?;
            }
            AstOp::NegativeLookBehind => {
                let param = self.push_lookaround(index, true, ignore_case);
                let op = match (self.forward, ignore_case) {
                    (true, false) => Op::NegativeLookBehind,
                    (true, true) => Op::NegativeLookBehindIgnoreCase,
                    (false, false) => Op::NegativeLookAhead,
                    (false, true) => Op::NegativeLookAheadIgnoreCase,
                };
                self.push_inst(op, param)?;
            }
            AstOp::LineStart => {
                self.push_inst(if self.forward { Op::LineStart } else { Op::LineEnd }, 0)?;
            }
            AstOp::LineEnd => {
                self.push_inst(if self.forward { Op::LineEnd } else { Op::LineStart }, 0)?;
            }
            AstOp::WordBoundary => {
                self.push_inst(Op::WordBoundary, 0)?;
            }
            AstOp::NotWordBoundary => {
                self.push_inst(Op::NotWordBoundary, 0)?;
            }
            AstOp::SubjectBegin => {
                self.push_inst(
                    if self.forward { Op::SubjectBegin } else { Op::SubjectEnd },
                    0,
                )?;
            }
            AstOp::SubjectEnd => {
                self.push_inst(
                    if self.forward { Op::SubjectEnd } else { Op::SubjectBegin },
                    0,
                )?;
            }
            AstOp::ResetStart => {
                self.push_inst(Op::Save, 0)?;
            }
        }

        let end = self.pc();
        for offset in goto_inner_end_offsets {
            self.insts[offset as usize].param = end;
        }

        if save {
            let group = u32::from(capture.expect("save implies a capture group"));
            let slot = group * 2 + if self.forward { 1 } else { 0 };
            self.push_inst(Op::Save, slot)?;
        }
        Ok(start_pos)
    }

    /// Encodes a lookaround body into the lookaround table, returning its
    /// offset. The body is written in reverse for behind assertions so
    /// the machine can walk it while stepping backward.
    fn push_lookaround(&mut self, index: AstNodeId, reversed: bool, ignore_case: bool) -> u32 {
        let offset = self.lookarounds.len() as u32;
        let children = if reversed {
            self.parsed.children_rev(index)
        } else {
            self.parsed.children(index).collect()
        };
        for child in children {
            match self.parsed.node(child).op {
                AstOp::Literal(ch) => {
                    let ch = if ignore_case { unicode::to_lower(ch) } else { ch };
                    self.lookarounds.push(u32::from(ch));
                }
                AstOp::AnyChar => self.lookarounds.push(LOOK_ANY_CHAR),
                AstOp::Matcher(id) => {
                    self.lookarounds.push(LOOK_MATCHER_BASE + u32::from(id))
                }
                _ => unreachable!("lookaround contents are validated by the parser"),
            }
        }
        self.lookarounds.push(LOOK_END);
        offset
    }

    // -- start-character precomputation ----------------------------------

    fn compute_start_chars(&self) -> Option<StartChars> {
        let mut map = [false; 256];
        if self.node_start_chars(0, &mut map) {
            // The whole pattern may consume nothing; any position can
            // start a match.
            trace!("start class dropped: pattern can match without consuming");
            return None;
        }
        if map.iter().all(|&permitted| permitted) {
            trace!("start class dropped: every entry permitted");
            return None;
        }
        Some(StartChars::new(map))
    }

    fn set_start_char(map: &mut [bool; 256], ch: char) {
        let cp = u32::from(ch);
        if cp < StartChars::COUNT {
            map[cp as usize] = true;
        } else {
            map[StartChars::OTHER] = true;
        }
    }

    /// Marks the code points the given node can start with. Returns true
    /// if the node might not consume a character, in which case a
    /// following node in sequence still contributes to the parent's
    /// start class.
    fn node_start_chars(&self, index: AstNodeId, map: &mut [bool; 256]) -> bool {
        let node = self.parsed.node(index);
        match node.op {
            AstOp::Literal(ch) => {
                if node.ignore_case {
                    Self::set_start_char(map, unicode::to_lower(ch));
                    Self::set_start_char(map, unicode::to_upper(ch));
                } else {
                    Self::set_start_char(map, ch);
                }
                node.quantifier.allows_none()
            }
            AstOp::AnyChar => {
                map.fill(true);
                node.quantifier.allows_none()
            }
            AstOp::Matcher(id) => {
                let matcher = &self.parsed.matchers[usize::from(id)];
                for cp in 0..StartChars::COUNT {
                    let ch = char::from_u32(cp).expect("code points below 255 are chars");
                    if matcher.is_match(ch) {
                        map[cp as usize] = true;
                    }
                }
                // The probe only covers the direct entries.
                map[StartChars::OTHER] = true;
                node.quantifier.allows_none()
            }
            AstOp::Sequence => {
                let children = if self.forward {
                    self.parsed.children(index).collect()
                } else {
                    self.parsed.children_rev(index)
                };
                let mut all_optional = true;
                for child in children {
                    if !self.node_start_chars(child, map) {
                        all_optional = false;
                        break;
                    }
                }
                all_optional || node.quantifier.allows_none()
            }
            AstOp::Alternation { .. } => {
                let mut all_consumed = !node.quantifier.allows_none();
                for child in self.parsed.children(index) {
                    if self.node_start_chars(child, map) {
                        all_consumed = false;
                    }
                }
                !all_consumed
            }
            AstOp::LineStart
            | AstOp::LineEnd
            | AstOp::WordBoundary
            | AstOp::NotWordBoundary
            | AstOp::SubjectBegin
            | AstOp::SubjectEnd
            | AstOp::ResetStart
            | AstOp::LookAhead
            | AstOp::NegativeLookAhead
            | AstOp::LookBehind
            | AstOp::NegativeLookBehind => true,
        }
    }
}
