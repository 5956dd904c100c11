//! AST-to-pcode lowering.
//!
//! The generator walks the program tree, drives the symbol table, and emits
//! a linear instruction sequence with backpatched jump targets. Semantic
//! errors go through the diagnostic sink and emission continues best-effort
//! so several errors can surface in one run.

use crate::ast::{
    AssignOp, BinaryOp, Block, ConstDecl, ExprKind, Expression, ProcedureDecl, Program, Statement,
    StmtKind, UnaryOp, VarDecl,
};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, SourceRange};
use crate::pcode::{Instruction, InstructionSequence, Op, Opr};
use crate::symtab::{ScopeInfo, Symbol, SymbolKind, SymbolTable, VarType};

#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerOptions {
    pub enable_bounds_check: bool,
}

pub struct CodeGenerator<'a> {
    symbols: &'a mut SymbolTable,
    output: &'a mut InstructionSequence,
    diagnostics: &'a mut DiagnosticSink,
    options: CompilerOptions,
    /// Snapshot of symbols in installation order, kept for reporting after
    /// scopes are torn down.
    exported: Vec<Symbol>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        symbols: &'a mut SymbolTable,
        output: &'a mut InstructionSequence,
        diagnostics: &'a mut DiagnosticSink,
        options: CompilerOptions,
    ) -> Self {
        Self {
            symbols,
            output,
            diagnostics,
            options,
            exported: Vec::new(),
        }
    }

    pub fn emit_program(&mut self, program: &Program) {
        self.emit_block(&program.block);
    }

    /// Symbols in installation order, for dumps and UI display.
    pub fn into_symbols(self) -> Vec<Symbol> {
        self.exported
    }

    fn emit_instruction(&mut self, instruction: Instruction) -> usize {
        self.output.push(instruction);
        self.output.len() - 1
    }

    fn patch(&mut self, index: usize, target: usize) {
        if let Some(instruction) = self.output.get_mut(index) {
            instruction.argument = target as i64;
        }
    }

    fn report(&mut self, code: DiagnosticCode, message: impl Into<String>, range: SourceRange) {
        self.diagnostics
            .report(Diagnostic::error(code, message, range));
    }

    fn current_scope(&self) -> &ScopeInfo {
        self.symbols.current_scope()
    }

    fn level_diff(&self, symbol: &Symbol) -> i32 {
        self.current_scope().level - symbol.level
    }

    fn resolve(&mut self, name: &str, range: SourceRange) -> Option<Symbol> {
        if let Some(symbol) = self.symbols.lookup(name) {
            return Some(symbol.clone());
        }
        self.report(
            DiagnosticCode::UndeclaredIdentifier,
            format!("undeclared identifier '{name}'"),
            range,
        );
        None
    }

    /// Emits one block in the current scope frame. The program block runs in
    /// the table's global frame; procedure bodies get their own frame via
    /// `emit_procedure`.
    fn emit_block(&mut self, block: &Block) {
        self.symbols.current_scope_mut().data_offset = 3;

        let jump_index = self.emit_instruction(Instruction::new(Op::Jmp, 0, 0));

        for decl in &block.consts {
            self.emit_const(decl);
        }
        for decl in &block.vars {
            self.emit_var(decl);
        }

        let mut procedures = Vec::with_capacity(block.procedures.len());
        for decl in &block.procedures {
            if self.symbols.lookup_in_current(&decl.name).is_some() {
                self.report(
                    DiagnosticCode::Redeclaration,
                    format!("redeclaration of procedure '{}'", decl.name),
                    decl.range,
                );
                continue;
            }
            let index = self.symbols.add_symbol(Symbol {
                name: decl.name.clone(),
                kind: SymbolKind::Procedure,
                size: 0,
                ..Symbol::default()
            });
            procedures.push((decl, index));
        }

        for (decl, symbol_index) in procedures {
            self.emit_procedure(decl, symbol_index);
        }

        let entry = self.output.len();
        self.patch(jump_index, entry);

        let data_offset = self.current_scope().data_offset;
        self.emit_instruction(Instruction::new(Op::Int, 0, data_offset));
        self.emit_statements(&block.statements);
        self.emit_instruction(Instruction::opr(Opr::Ret));
    }

    fn emit_const(&mut self, decl: &ConstDecl) {
        if self.symbols.lookup_in_current(&decl.name).is_some() {
            self.report(
                DiagnosticCode::Redeclaration,
                format!("redeclaration of '{}'", decl.name),
                decl.range,
            );
            return;
        }
        let index = self.symbols.add_symbol(Symbol {
            name: decl.name.clone(),
            kind: SymbolKind::Constant,
            var_type: if decl.is_boolean {
                VarType::Boolean
            } else {
                VarType::Integer
            },
            size: 1,
            constant_value: decl.value,
            ..Symbol::default()
        });
        self.exported.push(self.symbols.symbol(index).clone());
    }

    fn emit_var(&mut self, decl: &VarDecl) {
        if self.symbols.lookup_in_current(&decl.name).is_some() {
            self.report(
                DiagnosticCode::Redeclaration,
                format!("redeclaration of '{}'", decl.name),
                decl.range,
            );
            return;
        }
        let mut size = decl.array_size.unwrap_or(1);
        if size <= 0 {
            self.report(
                DiagnosticCode::InvalidArraySubscript,
                "array size must be positive",
                decl.range,
            );
            size = 1;
        }
        let address = self.current_scope().data_offset;
        let index = self.symbols.add_symbol(Symbol {
            name: decl.name.clone(),
            kind: if decl.array_size.is_some() {
                SymbolKind::Array
            } else {
                SymbolKind::Variable
            },
            address,
            size,
            ..Symbol::default()
        });
        self.exported.push(self.symbols.symbol(index).clone());
        self.symbols.current_scope_mut().data_offset += size;
    }

    fn emit_procedure(&mut self, decl: &ProcedureDecl, symbol_index: usize) {
        // The body block's leading jmp is the canonical entry point.
        let address = self.output.len() as i64;
        self.symbols.symbol_mut(symbol_index).address = address;
        self.exported.push(self.symbols.symbol(symbol_index).clone());
        self.symbols.enter_scope();
        self.emit_block(&decl.body);
        self.symbols.leave_scope();
    }

    fn emit_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.emit_statement(statement);
        }
    }

    fn emit_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StmtKind::Assignment {
                target,
                index,
                op,
                value,
            } => self.emit_assignment(target, index.as_deref(), *op, value, statement.range),
            StmtKind::Call { callee, arguments } => {
                self.emit_call(callee, arguments, statement.range)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.emit_if(condition, then_branch, else_branch),
            StmtKind::While { condition, body } => self.emit_while(condition, body),
            StmtKind::Repeat { body, condition } => self.emit_repeat(body, condition),
            StmtKind::Read { targets } => self.emit_read(targets, statement.range),
            StmtKind::Write { values, newline } => self.emit_write(values, *newline),
            StmtKind::Compound(statements) => self.emit_statements(statements),
        }
    }

    fn emit_assignment(
        &mut self,
        target: &str,
        index: Option<&Expression>,
        op: AssignOp,
        value: &Expression,
        range: SourceRange,
    ) {
        let Some(symbol) = self.resolve(target, range) else {
            return;
        };
        match symbol.kind {
            SymbolKind::Constant => {
                self.report(
                    DiagnosticCode::InvalidAssignmentTarget,
                    format!("cannot assign to constant '{target}'"),
                    range,
                );
                return;
            }
            SymbolKind::Procedure => {
                self.report(
                    DiagnosticCode::InvalidAssignmentTarget,
                    format!("cannot assign to procedure '{target}'"),
                    range,
                );
                return;
            }
            SymbolKind::Variable | SymbolKind::Array | SymbolKind::Parameter => {}
        }

        let level = self.level_diff(&symbol);
        match index {
            Some(index_expr) => {
                if symbol.kind != SymbolKind::Array {
                    self.report(
                        DiagnosticCode::InvalidArraySubscript,
                        format!("identifier '{target}' is not an array"),
                        range,
                    );
                    return;
                }
                self.emit_instruction(Instruction::new(Op::Lda, level, symbol.address));
                self.emit_expression(index_expr);
                if self.options.enable_bounds_check && symbol.size > 0 {
                    self.emit_instruction(Instruction::new(Op::Chk, 0, symbol.size));
                }
                self.emit_instruction(Instruction::new(Op::Idx, 0, 0));
                match arithmetic_opr(op) {
                    None => {
                        self.emit_expression(value);
                        self.emit_instruction(Instruction::new(Op::Sti, 0, 0));
                    }
                    Some(operation) => {
                        // Duplicate the element address so the index
                        // expression is evaluated exactly once.
                        self.emit_instruction(Instruction::new(Op::Dup, 0, 0));
                        self.emit_instruction(Instruction::new(Op::Ldi, 0, 0));
                        self.emit_expression(value);
                        self.emit_instruction(Instruction::opr(operation));
                        self.emit_instruction(Instruction::new(Op::Sti, 0, 0));
                    }
                }
            }
            None => {
                if symbol.kind == SymbolKind::Array {
                    self.report(
                        DiagnosticCode::InvalidArraySubscript,
                        format!("array '{target}' requires an index"),
                        range,
                    );
                    return;
                }
                match arithmetic_opr(op) {
                    None => {
                        self.emit_expression(value);
                        self.emit_instruction(Instruction::new(Op::Sto, level, symbol.address));
                    }
                    Some(operation) => {
                        self.emit_instruction(Instruction::new(Op::Lod, level, symbol.address));
                        self.emit_expression(value);
                        self.emit_instruction(Instruction::opr(operation));
                        self.emit_instruction(Instruction::new(Op::Sto, level, symbol.address));
                    }
                }
            }
        }
    }

    fn emit_call(&mut self, callee: &str, arguments: &[Expression], range: SourceRange) {
        let Some(symbol) = self.resolve(callee, range) else {
            return;
        };
        if symbol.kind != SymbolKind::Procedure {
            self.report(
                DiagnosticCode::InvalidAssignmentTarget,
                format!("identifier '{callee}' is not a procedure"),
                range,
            );
            return;
        }
        if !arguments.is_empty() {
            self.report(
                DiagnosticCode::UnexpectedToken,
                "procedure parameters are not supported yet",
                range,
            );
        }
        let level = self.level_diff(&symbol);
        self.emit_instruction(Instruction::new(Op::Cal, level, symbol.address));
    }

    fn emit_if(
        &mut self,
        condition: &Expression,
        then_branch: &[Statement],
        else_branch: &[Statement],
    ) {
        self.emit_expression(condition);
        let else_jump = self.emit_instruction(Instruction::new(Op::Jpc, 0, 0));
        self.emit_statements(then_branch);
        if else_branch.is_empty() {
            let end = self.output.len();
            self.patch(else_jump, end);
        } else {
            let end_jump = self.emit_instruction(Instruction::new(Op::Jmp, 0, 0));
            let else_start = self.output.len();
            self.patch(else_jump, else_start);
            self.emit_statements(else_branch);
            let end = self.output.len();
            self.patch(end_jump, end);
        }
    }

    fn emit_while(&mut self, condition: &Expression, body: &[Statement]) {
        let loop_start = self.output.len();
        self.emit_expression(condition);
        let exit_jump = self.emit_instruction(Instruction::new(Op::Jpc, 0, 0));
        self.emit_statements(body);
        self.emit_instruction(Instruction::new(Op::Jmp, 0, loop_start as i64));
        let end = self.output.len();
        self.patch(exit_jump, end);
    }

    fn emit_repeat(&mut self, body: &[Statement], condition: &Expression) {
        let loop_start = self.output.len();
        self.emit_statements(body);
        self.emit_expression(condition);
        // Loop back while the condition is false; that is until-semantics.
        self.emit_instruction(Instruction::new(Op::Jpc, 0, loop_start as i64));
    }

    fn emit_read(&mut self, targets: &[String], range: SourceRange) {
        for name in targets {
            let Some(symbol) = self.resolve(name, range) else {
                continue;
            };
            match symbol.kind {
                SymbolKind::Variable | SymbolKind::Parameter => {}
                SymbolKind::Constant => {
                    self.report(
                        DiagnosticCode::InvalidAssignmentTarget,
                        format!("cannot read into constant '{name}'"),
                        range,
                    );
                    continue;
                }
                SymbolKind::Array => {
                    self.report(
                        DiagnosticCode::InvalidAssignmentTarget,
                        format!("cannot read into array '{name}'"),
                        range,
                    );
                    continue;
                }
                SymbolKind::Procedure => {
                    self.report(
                        DiagnosticCode::InvalidAssignmentTarget,
                        format!("cannot read into procedure '{name}'"),
                        range,
                    );
                    continue;
                }
            }
            let level = self.level_diff(&symbol);
            self.emit_instruction(Instruction::opr(Opr::Read));
            self.emit_instruction(Instruction::new(Op::Sto, level, symbol.address));
        }
    }

    fn emit_write(&mut self, values: &[Expression], newline: bool) {
        for value in values {
            self.emit_expression(value);
            self.emit_instruction(Instruction::opr(Opr::Write));
        }
        if newline {
            self.emit_instruction(Instruction::opr(Opr::Writeln));
        }
    }

    fn emit_expression(&mut self, expression: &Expression) {
        match &expression.kind {
            ExprKind::Number(value) => {
                self.emit_instruction(Instruction::new(Op::Lit, 0, *value));
            }
            ExprKind::Boolean(value) => {
                self.emit_instruction(Instruction::new(Op::Lit, 0, i64::from(*value)));
            }
            ExprKind::Identifier(name) => self.emit_identifier(name, expression.range),
            ExprKind::ArrayAccess { name, index } => {
                self.emit_array_access(name, index, expression.range);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_expression(lhs);
                self.emit_expression(rhs);
                self.emit_instruction(Instruction::opr(binary_opr(*op)));
            }
            ExprKind::Unary { op, operand } => {
                self.emit_expression(operand);
                match op {
                    UnaryOp::Positive => {}
                    UnaryOp::Negative => {
                        self.emit_instruction(Instruction::opr(Opr::Neg));
                    }
                    UnaryOp::Not => {
                        self.emit_instruction(Instruction::opr(Opr::Not));
                    }
                    UnaryOp::Odd => {
                        self.emit_instruction(Instruction::opr(Opr::Odd));
                    }
                }
            }
            ExprKind::Call { .. } => {
                self.report(
                    DiagnosticCode::UnexpectedToken,
                    "procedure call cannot be used as expression",
                    expression.range,
                );
            }
        }
    }

    fn emit_identifier(&mut self, name: &str, range: SourceRange) {
        let Some(symbol) = self.resolve(name, range) else {
            return;
        };
        let level = self.level_diff(&symbol);
        match symbol.kind {
            SymbolKind::Constant => {
                self.emit_instruction(Instruction::new(Op::Lit, 0, symbol.constant_value));
            }
            SymbolKind::Variable | SymbolKind::Parameter => {
                self.emit_instruction(Instruction::new(Op::Lod, level, symbol.address));
            }
            SymbolKind::Array => {
                self.report(
                    DiagnosticCode::InvalidArraySubscript,
                    format!("array '{name}' requires an index"),
                    range,
                );
            }
            SymbolKind::Procedure => {
                self.report(
                    DiagnosticCode::InvalidAssignmentTarget,
                    format!("procedure '{name}' cannot be used as value"),
                    range,
                );
            }
        }
    }

    fn emit_array_access(&mut self, name: &str, index: &Expression, range: SourceRange) {
        let Some(symbol) = self.resolve(name, range) else {
            return;
        };
        if symbol.kind != SymbolKind::Array {
            self.report(
                DiagnosticCode::InvalidArraySubscript,
                format!("identifier '{name}' is not an array"),
                range,
            );
            return;
        }
        let level = self.level_diff(&symbol);
        self.emit_instruction(Instruction::new(Op::Lda, level, symbol.address));
        self.emit_expression(index);
        if self.options.enable_bounds_check && symbol.size > 0 {
            self.emit_instruction(Instruction::new(Op::Chk, 0, symbol.size));
        }
        self.emit_instruction(Instruction::new(Op::Idx, 0, 0));
        self.emit_instruction(Instruction::new(Op::Ldi, 0, 0));
    }
}

fn binary_opr(op: BinaryOp) -> Opr {
    match op {
        BinaryOp::Add => Opr::Add,
        BinaryOp::Subtract => Opr::Sub,
        BinaryOp::Multiply => Opr::Mul,
        BinaryOp::Divide => Opr::Div,
        BinaryOp::Modulo => Opr::Mod,
        BinaryOp::Equal => Opr::Eq,
        BinaryOp::NotEqual => Opr::Ne,
        BinaryOp::Less => Opr::Lt,
        BinaryOp::LessEqual => Opr::Le,
        BinaryOp::Greater => Opr::Gt,
        BinaryOp::GreaterEqual => Opr::Ge,
        BinaryOp::And => Opr::And,
        BinaryOp::Or => Opr::Or,
    }
}

/// The arithmetic sub-operation behind a compound assignment; `None` for
/// plain `:=`.
fn arithmetic_opr(op: AssignOp) -> Option<Opr> {
    let operation = match op {
        AssignOp::Assign => return None,
        AssignOp::AddAssign => Opr::Add,
        AssignOp::SubAssign => Opr::Sub,
        AssignOp::MulAssign => Opr::Mul,
        AssignOp::DivAssign => Opr::Div,
        AssignOp::ModAssign => Opr::Mod,
    };
    Some(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn compile(source: &str, options: CompilerOptions) -> (InstructionSequence, Vec<Symbol>, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let program = parse_source(source, &mut sink);
        assert!(!sink.has_errors(), "parse failed: {:?}", sink.diagnostics());
        let mut symbols = SymbolTable::new();
        let mut instructions = InstructionSequence::new();
        let mut generator =
            CodeGenerator::new(&mut symbols, &mut instructions, &mut sink, options);
        generator.emit_program(&program);
        let exported = generator.into_symbols();
        (instructions, exported, sink)
    }

    fn compile_ok(source: &str) -> InstructionSequence {
        let (instructions, _, sink) = compile(source, CompilerOptions::default());
        assert!(!sink.has_errors(), "codegen failed: {:?}", sink.diagnostics());
        instructions
    }

    fn codes_of(source: &str) -> Vec<DiagnosticCode> {
        let (_, _, sink) = compile(source, CompilerOptions::default());
        sink.diagnostics()
            .iter()
            .map(|diagnostic| diagnostic.code)
            .collect()
    }

    #[test]
    fn emits_block_frame_and_write() {
        let instructions = compile_ok("var x; begin x := 1; write(x); end.");
        assert_eq!(instructions[0], Instruction::new(Op::Jmp, 0, 1));
        assert_eq!(instructions[1], Instruction::new(Op::Int, 0, 4));
        assert!(instructions.contains(&Instruction::opr(Opr::Write)));
        assert_eq!(*instructions.last().unwrap(), Instruction::opr(Opr::Ret));
    }

    #[test]
    fn constants_are_inlined() {
        let instructions = compile_ok("const n = 7; var x; begin x := n; end.");
        assert!(instructions.contains(&Instruction::new(Op::Lit, 0, 7)));
        assert!(!instructions.iter().any(|instruction| instruction.op == Op::Lod));
    }

    #[test]
    fn bounds_check_is_emitted_when_enabled() {
        let source = "var a[2]; begin a[1] := 3; end.";
        let (without, _, _) = compile(source, CompilerOptions::default());
        assert!(!without.iter().any(|instruction| instruction.op == Op::Chk));

        let (with, _, sink) = compile(
            source,
            CompilerOptions {
                enable_bounds_check: true,
            },
        );
        assert!(!sink.has_errors());
        let chk = with
            .iter()
            .find(|instruction| instruction.op == Op::Chk)
            .expect("chk emitted");
        assert_eq!(chk.argument, 2);
    }

    #[test]
    fn array_element_compound_assignment_duplicates_address() {
        let instructions = compile_ok("var a[4]; begin a[2] += 5; end.");
        let sequence: Vec<Op> = instructions.iter().map(|instruction| instruction.op).collect();
        let lda = sequence.iter().position(|op| *op == Op::Lda).expect("lda");
        assert_eq!(
            &sequence[lda..lda + 4],
            &[Op::Lda, Op::Lit, Op::Idx, Op::Dup]
        );
        assert_eq!(sequence[lda + 4], Op::Ldi);
        assert!(instructions.contains(&Instruction::opr(Opr::Add)));
        assert!(sequence.contains(&Op::Sti));
    }

    #[test]
    fn scalar_compound_assignment_loads_then_stores() {
        let instructions = compile_ok("var x; begin x *= 3; end.");
        let ops: Vec<Op> = instructions.iter().map(|instruction| instruction.op).collect();
        let lod = ops.iter().position(|op| *op == Op::Lod).expect("lod");
        assert_eq!(instructions[lod + 1], Instruction::new(Op::Lit, 0, 3));
        assert_eq!(instructions[lod + 2], Instruction::opr(Opr::Mul));
        assert_eq!(instructions[lod + 3].op, Op::Sto);
    }

    #[test]
    fn while_loop_jumps_back_to_condition() {
        let instructions = compile_ok("var x; begin while x > 0 do x := x - 1; end.");
        let jpc = instructions
            .iter()
            .position(|instruction| instruction.op == Op::Jpc)
            .expect("jpc");
        let jmp_back = instructions
            .iter()
            .rposition(|instruction| instruction.op == Op::Jmp)
            .expect("jmp");
        // The backward jump targets the condition, the exit jump lands
        // right after the backward jump.
        assert!(instructions[jmp_back].argument < jpc as i64);
        assert_eq!(instructions[jpc].argument, (jmp_back + 1) as i64);
    }

    #[test]
    fn repeat_jumps_back_while_condition_is_false() {
        let instructions = compile_ok("var x; begin repeat x := x + 1 until x > 3; end.");
        let jpc = instructions
            .iter()
            .rposition(|instruction| instruction.op == Op::Jpc)
            .expect("jpc");
        assert_eq!(instructions[jpc].argument, 2);
    }

    #[test]
    fn jump_targets_stay_in_range() {
        let source = r"
            var x, a[3];
            procedure tick;
            begin
                if x > 0 then x := x - 1 else x := 0;
            end;
            begin
                x := 9;
                while x > 0 do begin call tick; end;
                repeat x := x + 1 until x >= 3;
            end.
        ";
        let instructions = compile_ok(source);
        let count = instructions.len() as i64;
        for instruction in &instructions {
            if matches!(instruction.op, Op::Jmp | Op::Jpc | Op::Cal) {
                assert!(
                    (0..count).contains(&instruction.argument),
                    "target {} of {} out of range",
                    instruction.argument,
                    instruction
                );
            }
        }
    }

    #[test]
    fn nested_procedure_uses_static_level_hop() {
        let source = r"
            var x;
            procedure outer;
                var y;
                procedure inner;
                begin y := x + 1; end;
            begin y := 0; call inner; end;
            begin x := 41; call outer; end.
        ";
        let instructions = compile_ok(source);
        // inner reads x two levels up and stores y one level up
        assert!(instructions.contains(&Instruction::new(Op::Lod, 2, 3)));
        assert!(instructions.contains(&Instruction::new(Op::Sto, 1, 3)));
    }

    #[test]
    fn exported_symbols_record_levels_and_sizes() {
        let source = r"
            const limit = 10;
            var x, a[5];
            procedure p;
                var y;
            begin y := 1; end;
            begin x := limit; end.
        ";
        let (_, symbols, sink) = compile(source, CompilerOptions::default());
        assert!(!sink.has_errors());

        let limit = symbols.iter().find(|symbol| symbol.name == "limit").unwrap();
        assert_eq!(limit.kind, SymbolKind::Constant);
        assert_eq!(limit.constant_value, 10);

        let x = symbols.iter().find(|symbol| symbol.name == "x").unwrap();
        assert_eq!((x.kind, x.level, x.address, x.size), (SymbolKind::Variable, 0, 3, 1));

        let a = symbols.iter().find(|symbol| symbol.name == "a").unwrap();
        assert_eq!((a.kind, a.address, a.size), (SymbolKind::Array, 4, 5));

        let y = symbols.iter().find(|symbol| symbol.name == "y").unwrap();
        assert_eq!((y.kind, y.level, y.address), (SymbolKind::Variable, 1, 3));

        let p = symbols.iter().find(|symbol| symbol.name == "p").unwrap();
        assert_eq!(p.kind, SymbolKind::Procedure);
        assert_eq!(p.size, 0);
    }

    #[test]
    fn boolean_constant_gets_boolean_type() {
        let (_, symbols, _) = compile(
            "const flag = true; begin write(flag); end.",
            CompilerOptions::default(),
        );
        let flag = symbols.iter().find(|symbol| symbol.name == "flag").unwrap();
        assert_eq!(flag.var_type, VarType::Boolean);
        assert_eq!(flag.constant_value, 1);
    }

    #[test]
    fn reports_redeclaration_and_keeps_first_binding() {
        let (instructions, _, sink) = compile(
            "const x = 1; var x; begin write(x); end.",
            CompilerOptions::default(),
        );
        assert!(sink
            .diagnostics()
            .iter()
            .any(|diagnostic| diagnostic.code == DiagnosticCode::Redeclaration));
        // The constant binding survives, so the use is inlined.
        assert!(instructions.contains(&Instruction::new(Op::Lit, 0, 1)));
    }

    #[test]
    fn reports_semantic_errors() {
        assert!(codes_of("begin x := 1; end.")
            .contains(&DiagnosticCode::UndeclaredIdentifier));
        assert!(codes_of("const c = 1; begin c := 2; end.")
            .contains(&DiagnosticCode::InvalidAssignmentTarget));
        assert!(codes_of("var x; begin x[0] := 1; end.")
            .contains(&DiagnosticCode::InvalidArraySubscript));
        assert!(codes_of("var a[2]; begin a := 1; end.")
            .contains(&DiagnosticCode::InvalidArraySubscript));
        assert!(codes_of("procedure p; begin end; begin p := 1; end.")
            .contains(&DiagnosticCode::InvalidAssignmentTarget));
        assert!(codes_of("var a[2]; begin read a; end.")
            .contains(&DiagnosticCode::InvalidAssignmentTarget));
        assert!(codes_of("var x; procedure p; begin end; begin x := p(); end.")
            .contains(&DiagnosticCode::UnexpectedToken));
        assert!(codes_of("procedure p; begin end; begin call p(1); end.")
            .contains(&DiagnosticCode::UnexpectedToken));
    }

    #[test]
    fn multiple_semantic_errors_surface_in_one_run() {
        let codes = codes_of("begin x := 1; y := 2; end.");
        assert_eq!(
            codes
                .iter()
                .filter(|code| **code == DiagnosticCode::UndeclaredIdentifier)
                .count(),
            2
        );
    }
}
