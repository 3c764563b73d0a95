//! Pooled toolpath command stream
//!
//! The whole toolpath is validated when the stream is created, so a malformed
//! move fails the parse up front instead of surfacing halfway through a build.
//! Commands are then materialized one at a time into pooled objects as the
//! consumer pops them.

use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;

use layercheck_core::{Pool, PoolKey, Result};
use regex::Regex;
use tracing::{debug, trace, warn};

use super::{Command, MoveCommand};

/// Default first allocation batch of the command pool
pub const DEFAULT_POOL_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
enum LineKind {
    Home,
    Absolute,
    Relative,
    Move,
}

#[derive(Debug, Clone)]
struct CommandLine {
    line_number: usize,
    kind: LineKind,
    span: Range<usize>,
}

/// What a single toolpath line turned out to be
#[derive(Debug, PartialEq)]
enum Classified {
    Blank,
    Ignored,
    Unhandled,
    Command(LineKind),
}

/// Lazy, pooled sequence of toolpath commands
#[derive(Debug)]
pub struct CommandStream {
    text: String,
    lines: Vec<CommandLine>,
    cursor: usize,
    next: Option<PoolKey>,
    pool: Pool<Command>,
    unhandled_lines: usize,
}

impl CommandStream {
    /// Parse toolpath text with the default pool batch
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        Self::with_pool_batch(text, DEFAULT_POOL_BATCH)
    }

    /// Parse toolpath text, sizing the first pool allocation to `pool_batch`
    pub fn with_pool_batch(text: impl Into<String>, pool_batch: usize) -> Result<Self> {
        let text = text.into();
        debug!("Parsing toolpath, input size: {} bytes", text.len());

        let mut lines = Vec::new();
        let mut unhandled_lines = 0;
        let mut offset = 0;
        for (index, raw) in text.split('\n').enumerate() {
            let line_number = index + 1;
            let start = offset;
            offset += raw.len() + 1;

            let code = strip_comment(raw);
            match classify(code) {
                Classified::Blank | Classified::Ignored => {}
                Classified::Unhandled => {
                    warn!("Unhandled toolpath line {}: {}", line_number, code);
                    unhandled_lines += 1;
                }
                Classified::Command(kind) => {
                    if kind == LineKind::Move {
                        MoveCommand::parse(code, line_number)?;
                    }
                    lines.push(CommandLine {
                        line_number,
                        kind,
                        span: start..start + raw.len(),
                    });
                }
            }
        }

        debug!(
            "Parse complete: {} commands, {} unhandled lines",
            lines.len(),
            unhandled_lines
        );

        let mut stream = Self {
            text,
            lines,
            cursor: 0,
            next: None,
            pool: Pool::new(pool_batch),
            unhandled_lines,
        };
        stream.next = stream.materialize_next();
        Ok(stream)
    }

    /// Read and parse a toolpath file
    pub fn from_file(path: &Path, pool_batch: usize) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::with_pool_batch(text, pool_batch)
    }

    /// Look at the next command without consuming it
    pub fn peek(&self) -> Option<&Command> {
        self.next.and_then(|key| self.pool.get(key))
    }

    /// Mutable access to the next command, used to rewrite it before execution
    pub fn peek_mut(&mut self) -> Option<&mut Command> {
        let key = self.next?;
        self.pool.get_mut(key)
    }

    /// Take the next command
    ///
    /// The caller owns the returned key until it hands it back with
    /// [`release`](Self::release). `None` means the toolpath is exhausted.
    pub fn pop(&mut self) -> Option<PoolKey> {
        let key = self.next?;
        self.next = self.materialize_next();
        Some(key)
    }

    /// Read a popped command
    pub fn get(&self, key: PoolKey) -> Option<&Command> {
        self.pool.get(key)
    }

    /// Give a popped command back to the pool
    pub fn release(&mut self, key: PoolKey) -> bool {
        self.pool.release(key)
    }

    /// Rewind to the first command of the toolpath
    pub fn rewind(&mut self) {
        if let Some(key) = self.next.take() {
            self.pool.release(key);
        }
        self.cursor = 0;
        self.next = self.materialize_next();
    }

    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }

    /// Number of recognized commands in the toolpath
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of nonblank lines that were skipped as unhandled
    pub fn unhandled_lines(&self) -> usize {
        self.unhandled_lines
    }

    /// Line number of the command [`peek`](Self::peek) would return
    pub fn next_line_number(&self) -> Option<usize> {
        self.next
            .and(self.cursor.checked_sub(1))
            .and_then(|index| self.lines.get(index))
            .map(|line| line.line_number)
    }

    pub fn pool(&self) -> &Pool<Command> {
        &self.pool
    }

    fn materialize_next(&mut self) -> Option<PoolKey> {
        let line = self.lines.get(self.cursor)?;
        self.cursor += 1;

        let command = match line.kind {
            LineKind::Home => Command::Home,
            LineKind::Absolute => Command::SetAbsolutePositioning,
            LineKind::Relative => Command::SetRelativePositioning,
            LineKind::Move => {
                let code = strip_comment(&self.text[line.span.clone()]);
                // Every move line was validated in with_pool_batch()
                Command::Move(MoveCommand::parse(code, line.line_number).unwrap_or_default())
            }
        };
        trace!("Line {}: {}", line.line_number, command);

        let key = self.pool.acquire();
        if let Some(slot) = self.pool.get_mut(key) {
            *slot = command;
        }
        Some(key)
    }
}

/// Remove a trailing `;` comment and surrounding whitespace
fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

fn classify(code: &str) -> Classified {
    static WORD_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = WORD_REGEX
        .get_or_init(|| Regex::new(r"^([GgMm])(\d+)$").expect("invalid regex pattern"));

    let Some(word) = code.split_whitespace().next() else {
        return Classified::Blank;
    };
    let Some(captures) = regex.captures(word) else {
        return Classified::Unhandled;
    };
    let letter = captures[1].to_ascii_uppercase();
    let Ok(number) = captures[2].parse::<u32>() else {
        return Classified::Unhandled;
    };

    match (letter.as_str(), number) {
        ("G", 28) => Classified::Command(LineKind::Home),
        ("G", 90) => Classified::Command(LineKind::Absolute),
        ("G", 91) => Classified::Command(LineKind::Relative),
        ("G", 0) | ("G", 1) => Classified::Command(LineKind::Move),
        // Bed temperature directives carry no geometry
        ("M", 140) | ("M", 190) => Classified::Ignored,
        _ => Classified::Unhandled,
    }
}
