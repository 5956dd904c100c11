//! Compile-and-run pipeline shared by the CLI and the tests.
//!
//! The driver wires the frontend, code generator, and VM together, renders
//! the dump formats behind the `--dump-*` flags, and owns pcode file I/O.

use std::fs;
use std::io::{self, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::ast::{Block, ExprKind, Expression, Program, Statement, StmtKind};
use crate::codegen::{CodeGenerator, CompilerOptions};
use crate::diagnostics::DiagnosticSink;
use crate::lexer::{self, Lexer};
use crate::parser::Parser;
use crate::pcode::{self, InstructionSequence};
use crate::symtab::{Symbol, SymbolKind, SymbolTable, VarType};
use crate::token::Token;
use crate::vm::{ExecutionResult, RunnerOptions, VirtualMachine};

#[derive(Debug, Clone, Copy, Default)]
pub struct DumpOptions {
    pub tokens: bool,
    pub ast: bool,
    pub symbols: bool,
    pub pcode: bool,
}

#[derive(Debug, Default)]
pub struct CompileResult {
    pub source_name: String,
    pub tokens: Vec<Token>,
    pub program: Option<Program>,
    pub symbols: Vec<Symbol>,
    pub code: InstructionSequence,
}

/// Compiles source text. On any error-level diagnostic the result carries
/// tokens only and no instruction stream.
pub fn compile_source_text(
    source_name: &str,
    source: &str,
    options: CompilerOptions,
    diagnostics: &mut DiagnosticSink,
) -> CompileResult {
    let mut result = CompileResult {
        source_name: source_name.to_string(),
        ..CompileResult::default()
    };

    let program = {
        let lexer = Lexer::new(source, diagnostics);
        Parser::new(lexer).parse_program()
    };
    result.tokens = collect_tokens(source);

    if diagnostics.has_errors() {
        return result;
    }

    let mut symbols = SymbolTable::new();
    let mut instructions = InstructionSequence::new();
    let mut generator = CodeGenerator::new(&mut symbols, &mut instructions, diagnostics, options);
    generator.emit_program(&program);
    let exported = generator.into_symbols();

    if diagnostics.has_errors() {
        return result;
    }

    result.code = instructions;
    result.symbols = exported;
    result.program = Some(program);
    result
}

/// Reads and compiles a source file, writing any requested dumps.
pub fn compile_file(
    input: &Path,
    options: CompilerOptions,
    dumps: DumpOptions,
    diagnostics: &mut DiagnosticSink,
    dump_stream: &mut dyn Write,
) -> Result<CompileResult> {
    let source = fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let result = compile_source_text(&input.display().to_string(), &source, options, diagnostics);

    if dumps.tokens && !result.tokens.is_empty() {
        dump_tokens(&result.tokens, dump_stream)?;
    }
    if dumps.ast {
        if let Some(program) = &result.program {
            dump_block(&program.block, dump_stream, 0)?;
        }
    }
    if dumps.symbols && !result.symbols.is_empty() {
        dump_symbols(&result.symbols, dump_stream)?;
    }
    if dumps.pcode && !result.code.is_empty() {
        pcode::serialize_instructions(&result.code, dump_stream)?;
    }

    Ok(result)
}

/// Re-scans the source with a throwaway sink to snapshot the token stream
/// for dumps; diagnostics were already reported by the compile proper.
fn collect_tokens(source: &str) -> Vec<Token> {
    let mut sink = DiagnosticSink::new();
    lexer::tokenize(source, &mut sink)
}

pub fn load_pcode_file(input: &Path) -> Result<InstructionSequence> {
    let file = fs::File::open(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let mut reader = BufReader::new(file);
    pcode::deserialize_instructions(&mut reader)
        .with_context(|| format!("loading pcode from {}", input.display()))
}

pub fn save_pcode_file(output: &Path, instructions: &[pcode::Instruction]) -> Result<()> {
    let mut file = fs::File::create(output)
        .with_context(|| format!("creating {}", output.display()))?;
    pcode::serialize_instructions(instructions, &mut file)
        .with_context(|| format!("writing pcode to {}", output.display()))
}

/// Convenience wrapper running the VM over the process standard streams.
/// The injectable-stream `VirtualMachine` is the core API; trace output
/// shares stdout with program output here.
pub fn run_instructions(
    code: &[pcode::Instruction],
    diagnostics: &mut DiagnosticSink,
    options: &RunnerOptions,
) -> ExecutionResult {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();
    if options.trace_vm {
        let mut trace = io::stdout().lock();
        let mut vm = VirtualMachine::new(
            diagnostics,
            options.clone(),
            &mut input,
            &mut output,
            Some(&mut trace),
        );
        vm.execute(code)
    } else {
        let mut vm =
            VirtualMachine::new(diagnostics, options.clone(), &mut input, &mut output, None);
        vm.execute(code)
    }
}

pub fn print_diagnostics(diagnostics: &DiagnosticSink, out: &mut dyn Write) -> Result<()> {
    for diagnostic in diagnostics.diagnostics() {
        writeln!(out, "{diagnostic}").context("writing diagnostics")?;
    }
    Ok(())
}

pub fn dump_tokens(tokens: &[Token], out: &mut dyn Write) -> Result<()> {
    for token in tokens {
        write!(
            out,
            "{}:{} {}",
            token.range.begin.line, token.range.begin.column, token.kind
        )?;
        if !token.lexeme.is_empty() {
            write!(out, " \"{}\"", token.lexeme)?;
        }
        if let Some(number) = token.number {
            write!(out, " = {number}")?;
        }
        if let Some(boolean) = token.boolean {
            write!(out, " = {boolean}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn dump_symbols(symbols: &[Symbol], out: &mut dyn Write) -> Result<()> {
    for symbol in symbols {
        write!(out, "level {} ", symbol.level)?;
        match symbol.kind {
            SymbolKind::Constant => {
                write!(out, "const {} = {}", symbol.name, symbol.constant_value)?;
                if symbol.var_type == VarType::Boolean {
                    write!(out, " (boolean)")?;
                }
            }
            SymbolKind::Variable => {
                write!(out, "var {} @{}", symbol.name, symbol.address)?;
            }
            SymbolKind::Array => {
                write!(out, "array {}[{}] @{}", symbol.name, symbol.size, symbol.address)?;
            }
            SymbolKind::Procedure => {
                write!(out, "proc {} -> {}", symbol.name, symbol.address)?;
            }
            SymbolKind::Parameter => {
                write!(out, "param {} @{}", symbol.name, symbol.address)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn indent(out: &mut dyn Write, level: usize) -> io::Result<()> {
    for _ in 0..level {
        write!(out, "  ")?;
    }
    Ok(())
}

fn dump_expression(expression: &Expression, out: &mut dyn Write, level: usize) -> io::Result<()> {
    indent(out, level)?;
    match &expression.kind {
        ExprKind::Number(value) => writeln!(out, "Number {value}"),
        ExprKind::Boolean(value) => writeln!(out, "Boolean {value}"),
        ExprKind::Identifier(name) => writeln!(out, "Identifier {name}"),
        ExprKind::ArrayAccess { name, index } => {
            writeln!(out, "ArrayAccess {name}")?;
            dump_expression(index, out, level + 1)
        }
        ExprKind::Binary { op, lhs, rhs } => {
            writeln!(out, "Binary {op:?}")?;
            dump_expression(lhs, out, level + 1)?;
            dump_expression(rhs, out, level + 1)
        }
        ExprKind::Unary { op, operand } => {
            writeln!(out, "Unary {op:?}")?;
            dump_expression(operand, out, level + 1)
        }
        ExprKind::Call { callee, arguments } => {
            writeln!(out, "CallExpr {callee}")?;
            for argument in arguments {
                dump_expression(argument, out, level + 1)?;
            }
            Ok(())
        }
    }
}

fn dump_statement(statement: &Statement, out: &mut dyn Write, level: usize) -> io::Result<()> {
    match &statement.kind {
        StmtKind::Assignment {
            target,
            index,
            op,
            value,
        } => {
            indent(out, level)?;
            writeln!(out, "Assignment {target} {op:?}")?;
            if let Some(index) = index {
                indent(out, level + 1)?;
                writeln!(out, "Index")?;
                dump_expression(index, out, level + 2)?;
            }
            dump_expression(value, out, level + 1)
        }
        StmtKind::Call { callee, arguments } => {
            indent(out, level)?;
            writeln!(out, "Call {callee}")?;
            for argument in arguments {
                dump_expression(argument, out, level + 1)?;
            }
            Ok(())
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            indent(out, level)?;
            writeln!(out, "If")?;
            dump_expression(condition, out, level + 1)?;
            indent(out, level)?;
            writeln!(out, "Then")?;
            for child in then_branch {
                dump_statement(child, out, level + 1)?;
            }
            if !else_branch.is_empty() {
                indent(out, level)?;
                writeln!(out, "Else")?;
                for child in else_branch {
                    dump_statement(child, out, level + 1)?;
                }
            }
            Ok(())
        }
        StmtKind::While { condition, body } => {
            indent(out, level)?;
            writeln!(out, "While")?;
            dump_expression(condition, out, level + 1)?;
            for child in body {
                dump_statement(child, out, level + 1)?;
            }
            Ok(())
        }
        StmtKind::Repeat { body, condition } => {
            indent(out, level)?;
            writeln!(out, "Repeat")?;
            for child in body {
                dump_statement(child, out, level + 1)?;
            }
            indent(out, level)?;
            writeln!(out, "Until")?;
            dump_expression(condition, out, level + 1)
        }
        StmtKind::Read { targets } => {
            indent(out, level)?;
            write!(out, "Read")?;
            for target in targets {
                write!(out, " {target}")?;
            }
            writeln!(out)
        }
        StmtKind::Write { values, newline } => {
            indent(out, level)?;
            writeln!(out, "{}", if *newline { "Writeln" } else { "Write" })?;
            for value in values {
                dump_expression(value, out, level + 1)?;
            }
            Ok(())
        }
        StmtKind::Compound(statements) => {
            indent(out, level)?;
            writeln!(out, "Begin")?;
            for child in statements {
                dump_statement(child, out, level + 1)?;
            }
            Ok(())
        }
    }
}

pub fn dump_block(block: &Block, out: &mut dyn Write, level: usize) -> Result<()> {
    dump_block_impl(block, out, level).context("writing ast dump")
}

fn dump_block_impl(block: &Block, out: &mut dyn Write, level: usize) -> io::Result<()> {
    indent(out, level)?;
    writeln!(out, "Block")?;
    if !block.consts.is_empty() {
        indent(out, level + 1)?;
        writeln!(out, "Consts")?;
        for decl in &block.consts {
            indent(out, level + 2)?;
            writeln!(out, "{} = {}", decl.name, decl.value)?;
        }
    }
    if !block.vars.is_empty() {
        indent(out, level + 1)?;
        writeln!(out, "Vars")?;
        for decl in &block.vars {
            indent(out, level + 2)?;
            match decl.array_size {
                Some(size) => writeln!(out, "{}[{}]", decl.name, size)?,
                None => writeln!(out, "{}", decl.name)?,
            }
        }
    }
    for procedure in &block.procedures {
        indent(out, level + 1)?;
        writeln!(out, "Procedure {}", procedure.name)?;
        dump_block_impl(&procedure.body, out, level + 2)?;
    }
    for statement in &block.statements {
        dump_statement(statement, out, level + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;

    #[test]
    fn compile_with_errors_produces_no_instruction_stream() {
        let mut sink = DiagnosticSink::new();
        let result =
            compile_source_text("test", "begin x := 1; end.", CompilerOptions::default(), &mut sink);
        assert!(sink.has_errors());
        assert!(result.code.is_empty());
        assert!(result.program.is_none());
        assert!(!result.tokens.is_empty());
    }

    #[test]
    fn clean_compile_exposes_code_symbols_and_program() {
        let mut sink = DiagnosticSink::new();
        let result = compile_source_text(
            "test",
            "var x; begin x := 1; end.",
            CompilerOptions::default(),
            &mut sink,
        );
        assert!(!sink.has_errors());
        assert!(!result.code.is_empty());
        assert!(result.program.is_some());
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "x");
    }

    #[test]
    fn dump_tokens_includes_positions_and_payloads() {
        let mut sink = DiagnosticSink::new();
        let tokens = crate::lexer::tokenize("x := 42", &mut sink);
        let mut buffer = Vec::new();
        dump_tokens(&tokens, &mut buffer).expect("dump");
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("1:1 identifier \"x\""));
        assert!(text.contains("1:3 :="));
        assert!(text.contains("1:6 number \"42\" = 42"));
    }

    #[test]
    fn dump_ast_renders_indented_tree() {
        let mut sink = DiagnosticSink::new();
        let result = compile_source_text(
            "test",
            "var x; begin x := 1 + 2; end.",
            CompilerOptions::default(),
            &mut sink,
        );
        let program = result.program.expect("program");
        let mut buffer = Vec::new();
        dump_block(&program.block, &mut buffer, 0).expect("dump");
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("Block\n"));
        assert!(text.contains("Assignment x Assign"));
        assert!(text.contains("Binary Add"));
    }

    #[test]
    fn dump_symbols_shows_kinds_and_addresses() {
        let mut sink = DiagnosticSink::new();
        let result = compile_source_text(
            "test",
            "const n = 2; var x, a[4]; procedure p; begin end; begin x := n; call p; end.",
            CompilerOptions::default(),
            &mut sink,
        );
        assert!(!sink.has_errors());
        let mut buffer = Vec::new();
        dump_symbols(&result.symbols, &mut buffer).expect("dump");
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("level 0 const n = 2"));
        assert!(text.contains("level 0 var x @3"));
        assert!(text.contains("level 0 array a[4] @4"));
        assert!(text.contains("proc p ->"));
    }

    #[test]
    fn pcode_files_round_trip() {
        let mut sink = DiagnosticSink::new();
        let result = compile_source_text(
            "test",
            "var x; begin x := 6 * 7; write(x); end.",
            CompilerOptions::default(),
            &mut sink,
        );
        assert!(!sink.has_errors());

        let mut path = std::env::temp_dir();
        path.push(format!("pl0-pcode-roundtrip-{}.pcode", std::process::id()));
        save_pcode_file(&path, &result.code).expect("save");
        let restored = load_pcode_file(&path).expect("load");
        fs::remove_file(&path).ok();
        assert_eq!(restored, result.code);
    }

    #[test]
    fn load_pcode_reports_missing_file() {
        let err = load_pcode_file(Path::new("/nonexistent/path.pcode"))
            .expect_err("should fail");
        assert!(err.to_string().contains("opening"));
    }

    #[test]
    fn diagnostics_render_through_print_helper() {
        let mut sink = DiagnosticSink::new();
        compile_source_text("test", "begin y := 1; end.", CompilerOptions::default(), &mut sink);
        let mut buffer = Vec::new();
        print_diagnostics(&sink, &mut buffer).expect("print");
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("undeclared-identifier"));
        assert!(text.contains(DiagnosticCode::UndeclaredIdentifier.as_str()));
    }
}
