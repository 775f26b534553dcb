use std::rc::Rc;

use crate::{
    prog::{Direction, InstPtr, Op, Program, LOOK_ANY_CHAR, LOOK_END, LOOK_MATCHER_BASE, SEARCH_PREFIX_SIZE},
    unicode, utf8,
};

/// Options controlling a single execution.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecFlags {
    /// Return as soon as any match is found, without trying to improve
    /// it.
    pub any_match: bool,
    /// Let the match begin anywhere in the subject instead of pinning it
    /// to the scan origin.
    pub search: bool,
    /// The scan origin is not the beginning of its line, even though it
    /// is the beginning of the subject range.
    pub not_beginning_of_line: bool,
    /// The end of the subject range is not the end of its line.
    pub not_end_of_line: bool,
    /// Reject an empty match sitting exactly at the scan origin.
    pub not_initial_null: bool,
    /// The bytes before `start` are valid subject context: lookbehind,
    /// word boundaries and line starts may read them.
    pub prev_available: bool,
}

/// A capture slot vector shared between threads. Forking a thread bumps
/// the reference count; writing through `Rc::make_mut` copies only when
/// the vector is actually shared.
type Saves = Rc<Vec<Option<usize>>>;

/// The subject range of one execution plus the flags that qualify its
/// boundaries.
#[derive(Clone, Copy, Debug)]
struct Input<'h> {
    haystack: &'h [u8],
    start: usize,
    end: usize,
    flags: ExecFlags,
}

impl<'h> Input<'h> {
    /// Decodes the code point beginning at `at`. A length of zero means
    /// the subject end was reached.
    fn decode(&self, at: usize) -> (char, usize) {
        if at >= self.end {
            ('\u{FFFD}', 0)
        } else {
            utf8::decode_lossy(&self.haystack[at..self.end])
        }
    }

    /// Decodes the code point ending at `at`, bounded by the subject
    /// range. This is what a backward scan consumes; it never reads the
    /// `prev_available` context.
    fn decode_back(&self, at: usize) -> (char, usize) {
        if at <= self.start {
            ('\u{FFFD}', 0)
        } else {
            utf8::decode_last_lossy(&self.haystack[self.start..at])
        }
    }

    /// Decodes the code point ending at `at`, reading into the context
    /// before `start` only when `prev_available` permits. A length of
    /// zero means there is nothing to read.
    fn decode_before(&self, at: usize) -> (char, usize) {
        let floor = if self.flags.prev_available { 0 } else { self.start };
        if at <= floor {
            ('\u{FFFD}', 0)
        } else {
            utf8::decode_last_lossy(&self.haystack[floor..at])
        }
    }

    fn char_at(&self, at: usize) -> Option<char> {
        match self.decode(at) {
            (_, 0) => None,
            (ch, _) => Some(ch),
        }
    }

    fn char_before(&self, at: usize) -> Option<char> {
        match self.decode_before(at) {
            (_, 0) => None,
            (ch, _) => Some(ch),
        }
    }

    fn is_line_start(&self, at: usize) -> bool {
        match self.char_before(at) {
            None => !self.flags.not_beginning_of_line,
            Some(ch) => ch == '\n',
        }
    }

    fn is_line_end(&self, at: usize) -> bool {
        match self.char_at(at) {
            None => !self.flags.not_end_of_line,
            Some(ch) => ch == '\n',
        }
    }

    /// The subject edges always count as word boundaries.
    fn is_word_boundary(&self, at: usize) -> bool {
        match (self.char_before(at), self.char_at(at)) {
            (None, _) | (_, None) => true,
            (Some(before), Some(after)) => unicode::is_word(before) != unicode::is_word(after),
        }
    }

    fn at_subject_begin(&self, at: usize) -> bool {
        at == self.start && !self.flags.prev_available
    }

    fn at_subject_end(&self, at: usize) -> bool {
        at == self.end
    }
}

/// A sparse set over instruction indices: constant-time insert and
/// membership, iteration in insertion order. Insertion order is what
/// realizes thread priority, and the membership test is what guarantees
/// each instruction runs at most once per subject position.
#[derive(Clone, Debug)]
struct SparseSet {
    len: usize,
    dense: Vec<InstPtr>,
    sparse: Vec<InstPtr>,
}

impl SparseSet {
    fn new(capacity: usize) -> SparseSet {
        SparseSet { len: 0, dense: vec![0; capacity], sparse: vec![0; capacity] }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> InstPtr {
        self.dense[index]
    }

    fn insert(&mut self, pc: InstPtr) -> bool {
        if self.contains(pc) {
            return false;
        }
        self.dense[self.len] = pc;
        self.sparse[pc as usize] = self.len as InstPtr;
        self.len += 1;
        true
    }

    fn contains(&self, pc: InstPtr) -> bool {
        let index = self.sparse[pc as usize] as usize;
        index < self.len && self.dense[index] == pc
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// One generation of logical threads: the set of scheduled instruction
/// indices plus, for instructions that wait on the current code point
/// (or on `Match` being reaped), the capture slots they carry.
#[derive(Clone, Debug)]
struct ThreadList {
    set: SparseSet,
    saves: Vec<Option<Saves>>,
    /// Number of entries currently carrying capture slots.
    live: usize,
}

impl ThreadList {
    fn new(capacity: usize) -> ThreadList {
        ThreadList { set: SparseSet::new(capacity), saves: vec![None; capacity], live: 0 }
    }

    fn insert(&mut self, pc: InstPtr) -> bool {
        self.set.insert(pc)
    }

    fn park(&mut self, pc: InstPtr, saves: Saves) {
        debug_assert!(self.saves[pc as usize].is_none());
        self.saves[pc as usize] = Some(saves);
        self.live += 1;
    }

    fn take(&mut self, pc: InstPtr) -> Option<Saves> {
        let saves = self.saves[pc as usize].take();
        if saves.is_some() {
            self.live -= 1;
        }
        saves
    }

    fn clear(&mut self) {
        for index in 0..self.set.len() {
            self.saves[self.set.get(index) as usize] = None;
        }
        self.set.clear();
        self.live = 0;
    }
}

/// A pending branch of the epsilon closure walk, carrying the capture
/// slots as they were at the fork.
#[derive(Clone, Debug)]
struct Frame {
    pc: InstPtr,
    saves: Saves,
}

/// Executes a compiled program against subjects by simulating all of its
/// logical threads in lockstep, one subject position at a time.
///
/// An instance borrows its program and owns the per-execution scratch
/// (thread lists, closure stack, capture output), which is reused across
/// calls. It is not reentrant; concurrent executions of one program each
/// need their own instance.
#[derive(Debug)]
pub struct ThreadedVm<'p> {
    program: &'p Program,
    stack: Vec<Frame>,
    curr: ThreadList,
    next: ThreadList,
    captures: Vec<Option<usize>>,
}

impl<'p> ThreadedVm<'p> {
    pub fn new(program: &'p Program) -> ThreadedVm<'p> {
        let len = program.len();
        ThreadedVm {
            program,
            stack: vec![],
            curr: ThreadList::new(len),
            next: ThreadList::new(len),
            captures: vec![None; program.save_count],
        }
    }

    /// The capture slots recorded by the last successful [`exec`]:
    /// `{start0, end0, start1, end1, ...}` as byte offsets into the
    /// subject, with unset groups absent. Contents are unspecified after
    /// a failed execution.
    ///
    /// [`exec`]: ThreadedVm::exec
    pub fn captures(&self) -> &[Option<usize>] {
        &self.captures
    }

    /// Runs the program against `haystack[start..end]` and reports
    /// whether it matched. Capture offsets are left in
    /// [`captures`](ThreadedVm::captures).
    ///
    /// Without [`ExecFlags::search`], the match is pinned to the scan
    /// origin and must span to the end of the range (in scan direction).
    pub fn exec(&mut self, haystack: &[u8], start: usize, end: usize, flags: ExecFlags) -> bool {
        assert!(start <= end && end <= haystack.len());
        let input = Input { haystack, start, end, flags };
        let forward = self.program.direction == Direction::Forward;

        self.stack.clear();
        self.curr.clear();
        self.next.clear();
        for slot in self.captures.iter_mut() {
            *slot = None;
        }

        let start_pc = if flags.search { 0 } else { SEARCH_PREFIX_SIZE };
        let mut pos = if forward { start } else { end };
        let mut matched = false;

        let initial = Rc::new(vec![None; self.program.save_count]);
        self.closure(&input, pos, matched, false, start_pc, initial);

        loop {
            let (ch, len) = if forward { input.decode(pos) } else { input.decode_back(pos) };
            let ch = if len == 0 { None } else { Some(ch) };
            let next_pos = if forward { pos + len } else { pos - len };
            let mut skip_to = None;

            let mut index = 0;
            while index < self.curr.set.len() {
                let pc = self.curr.set.get(index);
                index += 1;
                let saves = match self.curr.take(pc) {
                    Some(saves) => saves,
                    None => continue,
                };
                let inst = self.program.insts[pc as usize];
                match inst.op {
                    Op::Literal => {
                        if ch.map(u32::from) == Some(inst.param) {
                            self.closure(&input, next_pos, matched, true, pc + 1, saves);
                        }
                    }
                    Op::LiteralIgnoreCase => {
                        let folded = ch.map(|ch| u32::from(unicode::to_lower(ch)));
                        if folded == Some(inst.param) {
                            self.closure(&input, next_pos, matched, true, pc + 1, saves);
                        }
                    }
                    Op::AnyChar => {
                        if ch.is_some() {
                            self.closure(&input, next_pos, matched, true, pc + 1, saves);
                        }
                    }
                    Op::Matcher => {
                        let accepted = ch.map_or(false, |ch| {
                            self.program.matchers[inst.param as usize].is_match(ch)
                        });
                        if accepted {
                            self.closure(&input, next_pos, matched, true, pc + 1, saves);
                        }
                    }
                    Op::FindNextStart => {
                        // Stop seeding new match starts once a match is
                        // recorded or the scan is exhausted.
                        if matched || ch.is_none() {
                            continue;
                        }
                        let mut target = next_pos;
                        if self.next.live == 0 {
                            // Nothing else is alive: hop straight to the
                            // next viable start position.
                            if let Some(start_chars) = self.program.start_chars.as_deref() {
                                target = if forward {
                                    start_chars.find_fwd(haystack, next_pos, end)
                                } else {
                                    start_chars.find_rev(haystack, start, next_pos)
                                };
                            }
                        }
                        if target != next_pos {
                            skip_to = Some(target);
                        }
                        self.closure(&input, target, matched, true, pc + 1, saves);
                    }
                    Op::Match => {
                        let at_input_end = if forward { pos == end } else { pos == start };
                        let at_origin = if forward { pos == start } else { pos == end };
                        if (!flags.search && !at_input_end)
                            || (flags.not_initial_null && at_origin)
                        {
                            continue;
                        }
                        self.captures.copy_from_slice(&saves);
                        matched = true;
                        if flags.any_match {
                            return true;
                        }
                        // Everything still queued at this position is
                        // lower priority than the match we just took.
                        break;
                    }
                    op => unreachable!("instruction {:?} cannot carry a thread", op),
                }
            }

            if self.next.live == 0 || len == 0 {
                break;
            }
            pos = skip_to.unwrap_or(next_pos);
            core::mem::swap(&mut self.curr, &mut self.next);
            self.next.clear();
        }
        matched
    }

    /// Follows every non-consuming instruction reachable from `pc` at the
    /// given position, in priority order, parking the reachable consuming
    /// (and `Match`) instructions into the chosen thread list. The sparse
    /// set guarantees each instruction is visited at most once per
    /// position.
    fn closure(
        &mut self,
        input: &Input<'_>,
        pos: usize,
        matched: bool,
        into_next: bool,
        pc: InstPtr,
        saves: Saves,
    ) {
        debug_assert!(self.stack.is_empty());
        self.stack.push(Frame { pc, saves });
        while let Some(Frame { pc, saves }) = self.stack.pop() {
            self.closure_step(input, pos, matched, into_next, pc, saves);
        }
    }

    fn closure_step(
        &mut self,
        input: &Input<'_>,
        pos: usize,
        matched: bool,
        into_next: bool,
        mut pc: InstPtr,
        mut saves: Saves,
    ) {
        let program = self.program;
        let forward = program.direction == Direction::Forward;
        loop {
            let inserted =
                if into_next { self.next.insert(pc) } else { self.curr.insert(pc) };
            if !inserted {
                return;
            }
            let inst = program.insts[pc as usize];
            match inst.op {
                Op::Literal
                | Op::LiteralIgnoreCase
                | Op::AnyChar
                | Op::Matcher
                | Op::Match => {
                    if into_next {
                        self.next.park(pc, saves);
                    } else {
                        self.curr.park(pc, saves);
                    }
                    return;
                }
                Op::FindNextStart => {
                    if matched {
                        return;
                    }
                    if into_next {
                        self.next.park(pc, saves);
                    } else {
                        self.curr.park(pc, saves);
                    }
                    return;
                }
                Op::Jump => pc = inst.param,
                Op::SplitPrioritizeParent => {
                    self.stack.push(Frame { pc: inst.param, saves: Rc::clone(&saves) });
                    pc += 1;
                }
                Op::SplitPrioritizeChild => {
                    self.stack.push(Frame { pc: pc + 1, saves: Rc::clone(&saves) });
                    pc = inst.param;
                }
                Op::Save => {
                    let slot = inst.param as usize;
                    if slot < program.save_count {
                        Rc::make_mut(&mut saves)[slot] = Some(pos);
                    }
                    pc += 1;
                }
                Op::LineStart => {
                    let ok = if forward { input.is_line_start(pos) } else { input.is_line_end(pos) };
                    if !ok {
                        return;
                    }
                    pc += 1;
                }
                Op::LineEnd => {
                    let ok = if forward { input.is_line_end(pos) } else { input.is_line_start(pos) };
                    if !ok {
                        return;
                    }
                    pc += 1;
                }
                Op::WordBoundary => {
                    if !input.is_word_boundary(pos) {
                        return;
                    }
                    pc += 1;
                }
                Op::NotWordBoundary => {
                    if input.is_word_boundary(pos) {
                        return;
                    }
                    pc += 1;
                }
                Op::SubjectBegin => {
                    let ok = if forward {
                        input.at_subject_begin(pos)
                    } else {
                        input.at_subject_end(pos)
                    };
                    if !ok {
                        return;
                    }
                    pc += 1;
                }
                Op::SubjectEnd => {
                    let ok = if forward {
                        input.at_subject_end(pos)
                    } else {
                        input.at_subject_begin(pos)
                    };
                    if !ok {
                        return;
                    }
                    pc += 1;
                }
                Op::LookAhead
                | Op::LookAheadIgnoreCase
                | Op::NegativeLookAhead
                | Op::NegativeLookAheadIgnoreCase
                | Op::LookBehind
                | Op::LookBehindIgnoreCase
                | Op::NegativeLookBehind
                | Op::NegativeLookBehindIgnoreCase => {
                    let (ahead, negative, ignore_case) = match inst.op {
                        Op::LookAhead => (true, false, false),
                        Op::LookAheadIgnoreCase => (true, false, true),
                        Op::NegativeLookAhead => (true, true, false),
                        Op::NegativeLookAheadIgnoreCase => (true, true, true),
                        Op::LookBehind => (false, false, false),
                        Op::LookBehindIgnoreCase => (false, false, true),
                        Op::NegativeLookBehind => (false, true, false),
                        Op::NegativeLookBehindIgnoreCase => (false, true, true),
                        _ => unreachable!(),
                    };
                    // The stored direction is relative to the program;
                    // under a backward program the read flips.
                    let read_forward = ahead == forward;
                    let found =
                        self.lookaround(input, pos, inst.param, read_forward, ignore_case);
                    if found == negative {
                        return;
                    }
                    pc += 1;
                }
            }
        }
    }

    /// Matches the encoded lookaround sequence at `param` against the
    /// subject around `pos`. A pure sequence match: no captures, no
    /// splits.
    fn lookaround(
        &self,
        input: &Input<'_>,
        mut pos: usize,
        param: u32,
        read_forward: bool,
        ignore_case: bool,
    ) -> bool {
        let program = self.program;
        for &reference in &program.lookarounds[param as usize..] {
            if reference == LOOK_END {
                return true;
            }
            let (ch, len) =
                if read_forward { input.decode(pos) } else { input.decode_before(pos) };
            if len == 0 {
                return false;
            }
            let ch = if ignore_case { unicode::to_lower(ch) } else { ch };
            if reference == LOOK_ANY_CHAR {
                // Any code point will do.
            } else if reference >= LOOK_MATCHER_BASE {
                let matcher = &program.matchers[(reference - LOOK_MATCHER_BASE) as usize];
                if !matcher.is_match(ch) {
                    return false;
                }
            } else if reference != u32::from(ch) {
                return false;
            }
            pos = if read_forward { pos + len } else { pos - len };
        }
        unreachable!("lookaround table entries are terminated")
    }
}
