//! The mutation program: a flat opcode stream the display side replays to
//! materialize or update its tree.
//!
//! Wire format, bit-exact: one opcode byte per instruction, each string
//! operand encoded as a big-endian u16 length followed by that many raw
//! bytes, no terminator, no escaping. A program always ends with [`Op::Term`]
//! and carries nothing after it.

use std::fmt;

use smallvec::SmallVec;

/// Instruction opcodes, one byte each on the wire.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    /// End of program.
    Term = 0,
    /// `create-element(tag)`: open a new element under the current anchor.
    CreateElement = 1,
    /// `set-class(class)` on the open element.
    SetClass = 2,
    /// `set-id(entity)` on the open element.
    SetId = 3,
    /// `set-attribute(name, value)` on the open element.
    SetAttr = 4,
    /// `add-text(text)` inside the open element.
    AddText = 5,
    /// `reuse(old-entity)`: splice the previously rendered subtree here.
    Reuse = 6,
    /// `reassign-id(from, to)`: rename a live identity in place.
    ReassignId = 7,
    /// Advance to the next sibling of whatever anchor is currently open;
    /// this substitutes for explicit close markers.
    Next = 8,
}

impl Op {
    pub fn from_code(code: u8) -> Option<Op> {
        use Op::*;
        Some(match code {
            0 => Term,
            1 => CreateElement,
            2 => SetClass,
            3 => SetId,
            4 => SetAttr,
            5 => AddText,
            6 => Reuse,
            7 => ReassignId,
            8 => Next,
            _ => return None,
        })
    }

    /// Number of length-prefixed string operands following the opcode byte.
    pub fn operand_count(self) -> usize {
        match self {
            Op::Term | Op::Next => 0,
            Op::CreateElement | Op::SetClass | Op::SetId | Op::AddText | Op::Reuse => 1,
            Op::SetAttr | Op::ReassignId => 2,
        }
    }
}

/// An encoded mutation program. The buffer is reused across cycles:
/// [`Program::clear`] keeps its capacity.
#[derive(Default, Debug)]
pub struct Program {
    bytes: Vec<u8>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Wraps bytes received from the wire for decoding on the consumer side.
    pub fn from_bytes(bytes: Vec<u8>) -> Program {
        Program { bytes }
    }

    /// Appends one instruction. Operand count must match the opcode.
    pub fn push(&mut self, op: Op, operands: &[&str]) {
        debug_assert_eq!(operands.len(), op.operand_count(), "bad operand count for {op:?}");
        self.bytes.push(op as u8);
        for operand in operands {
            let len = u16::try_from(operand.len()).expect("operand longer than 65535 bytes");
            self.bytes.extend_from_slice(&len.to_be_bytes());
            self.bytes.extend_from_slice(operand.as_bytes());
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Iterates the encoded instructions, validating the stream as it goes.
    pub fn decode(&self) -> Decoder<'_> {
        Decoder {
            bytes: &self.bytes,
            pos: 0,
            terminated: false,
            failed: false,
        }
    }
}

/// One decoded instruction; operands borrow from the program buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Instr<'a> {
    pub op: Op,
    pub operands: SmallVec<[&'a str; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode { at: usize, code: u8 },
    Truncated { at: usize },
    TrailingBytes { at: usize },
    MissingTerminator,
    InvalidUtf8 { at: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownOpcode { at, code } => {
                write!(f, "unknown opcode {code:#04x} at byte {at}")
            }
            DecodeError::Truncated { at } => write!(f, "program truncated at byte {at}"),
            DecodeError::TrailingBytes { at } => {
                write!(f, "bytes after the terminate opcode at byte {at}")
            }
            DecodeError::MissingTerminator => write!(f, "program ends without a terminate opcode"),
            DecodeError::InvalidUtf8 { at } => {
                write!(f, "operand at byte {at} is not valid UTF-8")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Validating instruction iterator over an encoded program.
///
/// Yields each instruction in order; a malformed stream yields exactly one
/// `Err` and then stops. A stream that runs out before [`Op::Term`], or that
/// carries bytes after it, is malformed.
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    terminated: bool,
    failed: bool,
}

impl<'a> Decoder<'a> {
    fn fail(&mut self, err: DecodeError) -> Option<Result<Instr<'a>, DecodeError>> {
        self.failed = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for Decoder<'a> {
    type Item = Result<Instr<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.terminated {
            if self.pos < self.bytes.len() {
                return self.fail(DecodeError::TrailingBytes { at: self.pos });
            }
            return None;
        }
        if self.pos == self.bytes.len() {
            return self.fail(DecodeError::MissingTerminator);
        }

        let at = self.pos;
        let code = self.bytes[self.pos];
        self.pos += 1;
        let Some(op) = Op::from_code(code) else {
            return self.fail(DecodeError::UnknownOpcode { at, code });
        };

        let mut operands = SmallVec::new();
        for _ in 0..op.operand_count() {
            if self.pos + 2 > self.bytes.len() {
                return self.fail(DecodeError::Truncated { at: self.pos });
            }
            let len = u16::from_be_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]) as usize;
            self.pos += 2;
            if self.pos + len > self.bytes.len() {
                return self.fail(DecodeError::Truncated { at: self.pos });
            }
            let raw = &self.bytes[self.pos..self.pos + len];
            let Ok(operand) = std::str::from_utf8(raw) else {
                return self.fail(DecodeError::InvalidUtf8 { at: self.pos });
            };
            self.pos += len;
            operands.push(operand);
        }

        if op == Op::Term {
            self.terminated = true;
        }
        Some(Ok(Instr { op, operands }))
    }
}
