//! Stack-machine instruction set and its textual format.
//!
//! One instruction per line, `<mnemonic> <level> <argument>`; when the
//! mnemonic is `opr` the argument is the sub-operation mnemonic. Listings
//! prefix each line with a `NNNN:` index, which the deserializer strips.

use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use anyhow::{Context, Result};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lit,
    Opr,
    Lod,
    Sto,
    Cal,
    Int,
    Jmp,
    Jpc,
    Lda,
    Idx,
    Ldi,
    Sti,
    Chk,
    Dup,
    Nop,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Lit => "lit",
            Op::Opr => "opr",
            Op::Lod => "lod",
            Op::Sto => "sto",
            Op::Cal => "cal",
            Op::Int => "int",
            Op::Jmp => "jmp",
            Op::Jpc => "jpc",
            Op::Lda => "lda",
            Op::Idx => "idx",
            Op::Ldi => "ldi",
            Op::Sti => "sti",
            Op::Chk => "chk",
            Op::Dup => "dup",
            Op::Nop => "nop",
        }
    }

    fn from_mnemonic(text: &str) -> Option<Self> {
        let op = match text {
            "lit" => Op::Lit,
            "opr" => Op::Opr,
            "lod" => Op::Lod,
            "sto" => Op::Sto,
            "cal" => Op::Cal,
            "int" => Op::Int,
            "jmp" => Op::Jmp,
            "jpc" => Op::Jpc,
            "lda" => Op::Lda,
            "idx" => Op::Idx,
            "ldi" => Op::Ldi,
            "sti" => Op::Sti,
            "chk" => Op::Chk,
            "dup" => Op::Dup,
            "nop" => Op::Nop,
            _ => return None,
        };
        Some(op)
    }
}

/// Sub-operation selector carried in the argument of an `opr` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opr {
    Ret = 0,
    Neg = 1,
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    Odd = 6,
    Mod = 7,
    Eq = 8,
    Ne = 9,
    Lt = 10,
    Ge = 11,
    Gt = 12,
    Le = 13,
    Write = 14,
    Writeln = 15,
    Read = 16,
    And = 17,
    Or = 18,
    Not = 19,
}

impl Opr {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opr::Ret => "ret",
            Opr::Neg => "neg",
            Opr::Add => "add",
            Opr::Sub => "sub",
            Opr::Mul => "mul",
            Opr::Div => "div",
            Opr::Odd => "odd",
            Opr::Mod => "mod",
            Opr::Eq => "eq",
            Opr::Ne => "ne",
            Opr::Lt => "lt",
            Opr::Ge => "ge",
            Opr::Gt => "gt",
            Opr::Le => "le",
            Opr::Write => "write",
            Opr::Writeln => "writeln",
            Opr::Read => "read",
            Opr::And => "and",
            Opr::Or => "or",
            Opr::Not => "not",
        }
    }

    fn from_mnemonic(text: &str) -> Option<Self> {
        let opr = match text {
            "ret" => Opr::Ret,
            "neg" => Opr::Neg,
            "add" => Opr::Add,
            "sub" => Opr::Sub,
            "mul" => Opr::Mul,
            "div" => Opr::Div,
            "odd" => Opr::Odd,
            "mod" => Opr::Mod,
            "eq" => Opr::Eq,
            "ne" => Opr::Ne,
            "lt" => Opr::Lt,
            "ge" => Opr::Ge,
            "gt" => Opr::Gt,
            "le" => Opr::Le,
            "write" => Opr::Write,
            "writeln" => Opr::Writeln,
            "read" => Opr::Read,
            "and" => Opr::And,
            "or" => Opr::Or,
            "not" => Opr::Not,
            _ => return None,
        };
        Some(opr)
    }

    pub fn from_argument(argument: i64) -> Option<Self> {
        let opr = match argument {
            0 => Opr::Ret,
            1 => Opr::Neg,
            2 => Opr::Add,
            3 => Opr::Sub,
            4 => Opr::Mul,
            5 => Opr::Div,
            6 => Opr::Odd,
            7 => Opr::Mod,
            8 => Opr::Eq,
            9 => Opr::Ne,
            10 => Opr::Lt,
            11 => Opr::Ge,
            12 => Opr::Gt,
            13 => Opr::Le,
            14 => Opr::Write,
            15 => Opr::Writeln,
            16 => Opr::Read,
            17 => Opr::And,
            18 => Opr::Or,
            19 => Opr::Not,
            _ => return None,
        };
        Some(opr)
    }
}

/// One stack-machine instruction. `level` is the static-nesting hop count
/// for memory-access opcodes; `argument` is operand-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub level: i32,
    pub argument: i64,
}

impl Instruction {
    pub fn new(op: Op, level: i32, argument: i64) -> Self {
        Self { op, level, argument }
    }

    pub fn opr(operation: Opr) -> Self {
        Self::new(Op::Opr, 0, operation as i64)
    }
}

pub type InstructionSequence = Vec<Instruction>;

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.op.mnemonic(), self.level)?;
        if self.op == Op::Opr {
            if let Some(opr) = Opr::from_argument(self.argument) {
                return f.write_str(opr.mnemonic());
            }
        }
        write!(f, "{}", self.argument)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseInstructionError {
    #[error("empty instruction")]
    Empty,
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),
    #[error("missing level")]
    MissingLevel,
    #[error("invalid level '{0}'")]
    InvalidLevel(String),
    #[error("missing argument")]
    MissingArgument,
    #[error("unknown opr mnemonic '{0}'")]
    UnknownOpr(String),
    #[error("invalid argument '{0}'")]
    InvalidArgument(String),
    #[error("trailing input '{0}'")]
    TrailingInput(String),
}

impl FromStr for Instruction {
    type Err = ParseInstructionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.split_whitespace();
        let op_text = parts.next().ok_or(ParseInstructionError::Empty)?;
        let op = Op::from_mnemonic(&op_text.to_ascii_lowercase())
            .ok_or_else(|| ParseInstructionError::UnknownOpcode(op_text.to_string()))?;

        let level_text = parts.next().ok_or(ParseInstructionError::MissingLevel)?;
        let level = level_text
            .parse::<i32>()
            .map_err(|_| ParseInstructionError::InvalidLevel(level_text.to_string()))?;

        let argument_text = parts.next().ok_or(ParseInstructionError::MissingArgument)?;
        let argument = if op == Op::Opr {
            let opr = Opr::from_mnemonic(&argument_text.to_ascii_lowercase())
                .ok_or_else(|| ParseInstructionError::UnknownOpr(argument_text.to_string()))?;
            opr as i64
        } else {
            argument_text
                .parse::<i64>()
                .map_err(|_| ParseInstructionError::InvalidArgument(argument_text.to_string()))?
        };

        if let Some(extra) = parts.next() {
            return Err(ParseInstructionError::TrailingInput(extra.to_string()));
        }

        Ok(Instruction { op, level, argument })
    }
}

/// Writes the listing form: each line `NNNN: <instruction>`.
pub fn serialize_instructions(
    instructions: &[Instruction],
    out: &mut dyn Write,
) -> std::io::Result<()> {
    for (index, instruction) in instructions.iter().enumerate() {
        writeln!(out, "{index:4}: {instruction}")?;
    }
    Ok(())
}

/// Reads a listing back; blank lines are skipped and a leading `NNNN:`
/// index prefix on each line is ignored.
pub fn deserialize_instructions(input: &mut dyn BufRead) -> Result<InstructionSequence> {
    let mut instructions = InstructionSequence::new();
    for (line_number, line) in input.lines().enumerate() {
        let line = line.context("reading pcode input")?;
        let text = match line.find(':') {
            Some(colon) => &line[colon + 1..],
            None => &line[..],
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let instruction = text
            .parse::<Instruction>()
            .with_context(|| format!("parsing pcode line {}", line_number + 1))?;
        instructions.push(instruction);
    }
    Ok(instructions)
}
