/*!
A bytecode regular expression engine with submatch tracking, lookaround
and bidirectional matching.

A pattern is compiled in two stages: a recursive-descent parser produces
a flat syntax tree, and a compiler lowers that tree into a linear
instruction program. The program is executed by a backtracking-free
threaded virtual machine that simulates every viable alternative in
lockstep, so execution cost is bounded by `O(program size × subject
length)` regardless of the pattern.

A compiled [`Program`] is immutable and can be shared freely, including
across threads. Each execution goes through a [`ThreadedVm`], which owns
the mutable scratch for one search at a time and exposes the capture
offsets of the last match.

```
use regex_vm::{compile, CompileFlags, Direction, ExecFlags, ThreadedVm};

let program = compile(r"(\w+)@(\w+)", CompileFlags::default(), Direction::Forward)?;
let mut vm = ThreadedVm::new(&program);

let subject = b"mail: user@example";
assert!(vm.exec(subject, 0, subject.len(), ExecFlags { search: true, ..ExecFlags::default() }));
assert_eq!(vm.captures()[0], Some(6));
assert_eq!(vm.captures()[2], Some(6));
assert_eq!(vm.captures()[3], Some(10));
# Ok::<(), regex_vm::Error>(())
```

Matching can also run backward over the subject, which makes a search
report the rightmost match; see [`Direction::Backward`].

The accepted syntax is a fixed dialect: alternation, greedy and lazy
quantifiers (`*`, `+`, `?`, `{m,n}`), capturing and `(?:...)` groups,
character classes and the `\d \w \s \h` escapes, the anchors `^ $ \A
\z`, word boundaries `\b \B`, match-start reset `\K`, quoting with
`\Q...\E`, inline case-insensitivity toggles `(?i)` / `(?I)`, and
lookaround assertions (`(?=..)`, `(?!..)`, `(?<=..)`, `(?<!..)`) whose
bodies are limited to unquantified literals, `.` and classes.
Backreferences are deliberately unsupported.
*/

pub use crate::{
    compile::CompileFlags,
    error::{Error, ErrorKind},
    parse::escape,
    prog::{Direction, Program},
    vm::{ExecFlags, ThreadedVm},
};

mod ast;
mod compile;
mod error;
mod matcher;
mod parse;
mod prog;
mod unicode;
mod utf8;
mod vm;

/// Compiles a pattern into an immutable instruction program for the
/// given match direction.
pub fn compile(
    pattern: &str,
    flags: CompileFlags,
    direction: Direction,
) -> Result<Program, Error> {
    let parsed = parse::Parser::new(pattern).parse()?;
    compile::compile_parsed(pattern, parsed, flags, direction)
}
