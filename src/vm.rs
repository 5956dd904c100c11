//! Stack-based virtual machine for the pcode instruction set.
//!
//! The VM executes over an integer stack with base-pointer and program-
//! counter registers. Read and write operations go through injected
//! input/output handles; the optional trace stream receives one line per
//! executed instruction.

use std::io::{BufRead, Write};

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, SourceRange};
use crate::pcode::{Instruction, Op, Opr};

const INITIAL_STACK_SIZE: usize = 1024;
const STACK_GROWTH_CHUNK: usize = 1024;

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub trace_vm: bool,
    /// Hard ceiling on stack growth, in cells. Exceeding it halts with a
    /// stack-overflow diagnostic.
    pub max_stack: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            trace_vm: false,
            max_stack: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionResult {
    pub success: bool,
    /// Most recent arithmetic or write value, used for status display.
    pub last_value: i64,
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            success: true,
            last_value: 0,
        }
    }
}

/// Runtime failure carried up to the execute loop, where it becomes a
/// diagnostic and stops the machine.
struct Trap {
    code: DiagnosticCode,
    message: String,
}

impl Trap {
    fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

enum Flow {
    Continue,
    Halt,
}

pub struct VirtualMachine<'a> {
    diagnostics: &'a mut DiagnosticSink,
    options: RunnerOptions,
    input: &'a mut dyn BufRead,
    output: &'a mut dyn Write,
    trace: Option<&'a mut dyn Write>,
    stack: Vec<i64>,
    /// Next free slot.
    stack_top: usize,
    /// Start of the current activation record.
    base_pointer: usize,
    program_counter: usize,
}

impl<'a> VirtualMachine<'a> {
    pub fn new(
        diagnostics: &'a mut DiagnosticSink,
        options: RunnerOptions,
        input: &'a mut dyn BufRead,
        output: &'a mut dyn Write,
        trace: Option<&'a mut dyn Write>,
    ) -> Self {
        Self {
            diagnostics,
            options,
            input,
            output,
            trace,
            stack: Vec::new(),
            stack_top: 0,
            base_pointer: 0,
            program_counter: 0,
        }
    }

    /// Runs `code` from instruction 0 until the outermost return, the
    /// program counter leaving the instruction range, or a runtime trap.
    pub fn execute(&mut self, code: &[Instruction]) -> ExecutionResult {
        let mut result = ExecutionResult::default();
        self.stack.clear();
        self.stack.resize(INITIAL_STACK_SIZE.min(self.options.max_stack), 0);
        self.stack_top = 0;
        self.base_pointer = 0;
        self.program_counter = 0;

        while self.program_counter < code.len() {
            let instruction = code[self.program_counter];
            if self.trace.is_some() {
                if let Err(trap) = self.trace_instruction(&instruction) {
                    return self.fail(result, trap);
                }
            }
            self.program_counter += 1;
            match self.step(instruction, &mut result) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => return result,
                Err(trap) => return self.fail(result, trap),
            }
        }
        result
    }

    fn fail(&mut self, mut result: ExecutionResult, trap: Trap) -> ExecutionResult {
        self.diagnostics.report(Diagnostic::error(
            trap.code,
            trap.message,
            SourceRange::default(),
        ));
        result.success = false;
        result
    }

    fn trace_instruction(&mut self, instruction: &Instruction) -> Result<(), Trap> {
        let trace = self.trace.as_mut().expect("trace stream checked by caller");
        writeln!(trace, "{}: {}", self.program_counter, instruction)
            .map_err(|err| Trap::new(DiagnosticCode::IoError, format!("trace write failed: {err}")))
    }

    fn step(&mut self, instruction: Instruction, result: &mut ExecutionResult) -> Result<Flow, Trap> {
        match instruction.op {
            Op::Lit => self.push(instruction.argument)?,
            Op::Opr => return self.operate(instruction.argument, result),
            Op::Lod => {
                let address = self.base(instruction.level)? + instruction.argument as usize;
                let value = self.load(address)?;
                self.push(value)?;
            }
            Op::Sto => {
                let value = self.pop()?;
                let address = self.base(instruction.level)? + instruction.argument as usize;
                self.store(address, value)?;
            }
            Op::Cal => {
                let static_link = self.base(instruction.level)?;
                self.store(self.stack_top, static_link as i64)?;
                self.store(self.stack_top + 1, self.base_pointer as i64)?;
                self.store(self.stack_top + 2, self.program_counter as i64)?;
                self.base_pointer = self.stack_top;
                self.program_counter = instruction.argument as usize;
            }
            Op::Int => {
                let cells = instruction.argument.max(0) as usize;
                self.ensure_capacity(self.stack_top + cells)?;
                // The first three reserved cells are the activation-record
                // header written by cal; zero only the locals.
                for offset in 3..cells {
                    self.stack[self.stack_top + offset] = 0;
                }
                self.stack_top += cells;
            }
            Op::Jmp => {
                self.program_counter = instruction.argument as usize;
            }
            Op::Jpc => {
                if self.pop()? == 0 {
                    self.program_counter = instruction.argument as usize;
                }
            }
            Op::Lda => {
                let address = self.base(instruction.level)? + instruction.argument as usize;
                self.push(address as i64)?;
            }
            Op::Idx => {
                let index = self.pop()?;
                let address = self.pop()?;
                self.push(address.wrapping_add(index))?;
            }
            Op::Ldi => {
                let raw = self.pop()?;
                let address = self.address_of(raw)?;
                let value = self.load(address)?;
                self.push(value)?;
            }
            Op::Sti => {
                let value = self.pop()?;
                let raw = self.pop()?;
                let address = self.address_of(raw)?;
                self.store(address, value)?;
            }
            Op::Chk => {
                let index = self.pop()?;
                if index < 0 || index >= instruction.argument {
                    return Err(Trap::new(
                        DiagnosticCode::InvalidArraySubscript,
                        format!(
                            "array index {index} out of bounds for size {}",
                            instruction.argument
                        ),
                    ));
                }
                self.push(index)?;
            }
            Op::Dup => {
                if self.stack_top == 0 {
                    return Err(Trap::new(DiagnosticCode::StackUnderflow, "stack underflow"));
                }
                let value = self.stack[self.stack_top - 1];
                self.push(value)?;
            }
            Op::Nop => {}
        }
        Ok(Flow::Continue)
    }

    fn operate(&mut self, argument: i64, result: &mut ExecutionResult) -> Result<Flow, Trap> {
        let Some(operation) = Opr::from_argument(argument) else {
            return Err(Trap::new(
                DiagnosticCode::InternalError,
                format!("unknown opr sub-opcode {argument}"),
            ));
        };
        match operation {
            Opr::Ret => {
                let old_base = self.base_pointer;
                let raw_return = self.load(old_base + 2)?;
                let raw_caller = self.load(old_base + 1)?;
                self.program_counter = self.address_of(raw_return)?;
                self.base_pointer = self.address_of(raw_caller)?;
                self.stack_top = old_base;
                if self.base_pointer == 0 && self.program_counter == 0 {
                    return Ok(Flow::Halt);
                }
            }
            Opr::Neg => {
                let value = self.pop()?;
                self.push(value.wrapping_neg())?;
            }
            Opr::Add | Opr::Sub | Opr::Mul => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let value = match operation {
                    Opr::Add => lhs.wrapping_add(rhs),
                    Opr::Sub => lhs.wrapping_sub(rhs),
                    _ => lhs.wrapping_mul(rhs),
                };
                self.push(value)?;
                result.last_value = value;
            }
            Opr::Div => {
                let rhs = self.pop()?;
                if rhs == 0 {
                    return Err(Trap::new(DiagnosticCode::DivisionByZero, "division by zero"));
                }
                let lhs = self.pop()?;
                let value = lhs.wrapping_div(rhs);
                self.push(value)?;
                result.last_value = value;
            }
            Opr::Mod => {
                let rhs = self.pop()?;
                if rhs == 0 {
                    return Err(Trap::new(DiagnosticCode::DivisionByZero, "modulo by zero"));
                }
                let lhs = self.pop()?;
                let value = lhs.wrapping_rem(rhs);
                self.push(value)?;
                result.last_value = value;
            }
            Opr::Odd => {
                let value = self.pop()?;
                self.push(i64::from(value % 2 != 0))?;
            }
            Opr::Eq | Opr::Ne | Opr::Lt | Opr::Ge | Opr::Gt | Opr::Le => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let truth = match operation {
                    Opr::Eq => lhs == rhs,
                    Opr::Ne => lhs != rhs,
                    Opr::Lt => lhs < rhs,
                    Opr::Ge => lhs >= rhs,
                    Opr::Gt => lhs > rhs,
                    _ => lhs <= rhs,
                };
                self.push(i64::from(truth))?;
            }
            Opr::And => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                self.push(i64::from(lhs != 0 && rhs != 0))?;
            }
            Opr::Or => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                self.push(i64::from(lhs != 0 || rhs != 0))?;
            }
            Opr::Not => {
                let value = self.pop()?;
                self.push(i64::from(value == 0))?;
            }
            Opr::Write => {
                let value = self.pop()?;
                write!(self.output, "{value}").map_err(|err| {
                    Trap::new(DiagnosticCode::IoError, format!("write failed: {err}"))
                })?;
                result.last_value = value;
            }
            Opr::Writeln => {
                writeln!(self.output).map_err(|err| {
                    Trap::new(DiagnosticCode::IoError, format!("write failed: {err}"))
                })?;
            }
            Opr::Read => {
                let value = self.read_integer()?;
                self.push(value)?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Reads the next whitespace-separated decimal integer from the input
    /// stream.
    fn read_integer(&mut self) -> Result<i64, Trap> {
        let io_trap =
            |err: std::io::Error| Trap::new(DiagnosticCode::IoError, format!("read failed: {err}"));
        let mut byte = [0u8; 1];

        let first = loop {
            let count = self.input.read(&mut byte).map_err(io_trap)?;
            if count == 0 {
                return Err(Trap::new(
                    DiagnosticCode::IoError,
                    "unexpected end of input",
                ));
            }
            if !byte[0].is_ascii_whitespace() {
                break byte[0];
            }
        };

        let mut text = String::new();
        text.push(first as char);
        loop {
            let count = self.input.read(&mut byte).map_err(io_trap)?;
            if count == 0 || byte[0].is_ascii_whitespace() {
                break;
            }
            text.push(byte[0] as char);
        }

        text.parse::<i64>().map_err(|_| {
            Trap::new(
                DiagnosticCode::IoError,
                format!("invalid integer input '{text}'"),
            )
        })
    }

    fn ensure_capacity(&mut self, required: usize) -> Result<(), Trap> {
        if required <= self.stack.len() {
            return Ok(());
        }
        if required > self.options.max_stack {
            return Err(Trap::new(
                DiagnosticCode::StackOverflow,
                format!("stack limit of {} cells exceeded", self.options.max_stack),
            ));
        }
        let grown = (required + STACK_GROWTH_CHUNK).min(self.options.max_stack);
        self.stack.resize(grown, 0);
        Ok(())
    }

    fn address_of(&self, value: i64) -> Result<usize, Trap> {
        if value < 0 {
            return Err(Trap::new(
                DiagnosticCode::RuntimeError,
                format!("negative stack address {value}"),
            ));
        }
        Ok(value as usize)
    }

    fn load(&mut self, address: usize) -> Result<i64, Trap> {
        self.ensure_capacity(address + 1)?;
        Ok(self.stack[address])
    }

    fn store(&mut self, address: usize, value: i64) -> Result<(), Trap> {
        self.ensure_capacity(address + 1)?;
        self.stack[address] = value;
        Ok(())
    }

    fn push(&mut self, value: i64) -> Result<(), Trap> {
        self.ensure_capacity(self.stack_top + 1)?;
        self.stack[self.stack_top] = value;
        self.stack_top += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<i64, Trap> {
        if self.stack_top == 0 {
            return Err(Trap::new(DiagnosticCode::StackUnderflow, "stack underflow"));
        }
        self.stack_top -= 1;
        Ok(self.stack[self.stack_top])
    }

    /// Climbs the static-link chain `level` hops from the current base.
    fn base(&mut self, level: i32) -> Result<usize, Trap> {
        let mut base = self.base_pointer;
        for _ in 0..level {
            let link = self.load(base)?;
            base = self.address_of(link)?;
        }
        Ok(base)
    }
}
