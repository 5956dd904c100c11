//! Recursive-descent parser with panic-mode recovery.
//!
//! Syntax errors are reported to the diagnostic sink and parsing continues:
//! a failed `expect` puts the parser into panic mode, `synchronize` skips to
//! a caller-supplied set of boundary tokens, and missing sub-expressions are
//! replaced by typed placeholder literals so later passes always see a
//! well-formed tree.

use crate::ast::{
    AssignOp, BinaryOp, Block, ConstDecl, ExprKind, Expression, ProcedureDecl, Program, Statement,
    StmtKind, UnaryOp, VarDecl,
};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, SourceLoc, SourceRange};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Standard statement and declaration boundaries, extended with the tokens
/// that can begin a statement so recovery inside a statement list resumes at
/// the next statement rather than skipping it.
const STATEMENT_SYNC: &[TokenKind] = &[
    TokenKind::Semicolon,
    TokenKind::End,
    TokenKind::Period,
    TokenKind::Begin,
    TokenKind::If,
    TokenKind::While,
    TokenKind::Repeat,
    TokenKind::Until,
    TokenKind::Procedure,
    TokenKind::Var,
    TokenKind::Const,
    TokenKind::Identifier,
    TokenKind::Call,
    TokenKind::Read,
    TokenKind::Write,
    TokenKind::Writeln,
];

/// Boundary tokens for declaration sections at the head of a block.
const DECLARATION_SYNC: &[TokenKind] = &[
    TokenKind::Semicolon,
    TokenKind::Const,
    TokenKind::Var,
    TokenKind::Procedure,
    TokenKind::Begin,
    TokenKind::If,
    TokenKind::While,
    TokenKind::Repeat,
    TokenKind::Read,
    TokenKind::Write,
    TokenKind::Writeln,
    TokenKind::Call,
    TokenKind::Identifier,
    TokenKind::Period,
];

fn starts_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number
            | TokenKind::Boolean
            | TokenKind::Identifier
            | TokenKind::LParen
            | TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Not
            | TokenKind::Odd
    )
}

fn assignment_operator(kind: TokenKind) -> Option<AssignOp> {
    let op = match kind {
        TokenKind::Assign => AssignOp::Assign,
        TokenKind::PlusAssign => AssignOp::AddAssign,
        TokenKind::MinusAssign => AssignOp::SubAssign,
        TokenKind::StarAssign => AssignOp::MulAssign,
        TokenKind::SlashAssign => AssignOp::DivAssign,
        TokenKind::PercentAssign => AssignOp::ModAssign,
        _ => return None,
    };
    Some(op)
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    panic_mode: bool,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            panic_mode: false,
        }
    }

    pub fn parse_program(mut self) -> Program {
        let block = self.parse_block();
        self.expect(
            TokenKind::Period,
            DiagnosticCode::ExpectedSymbol,
            "expected '.' at end of program",
        );
        Program { block }
    }

    fn peek(&mut self, lookahead: usize) -> &Token {
        self.lexer.peek(lookahead)
    }

    fn check(&mut self, kind: TokenKind) -> bool {
        self.peek(0).kind == kind
    }

    fn advance(&mut self) -> Token {
        self.lexer.next()
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            self.panic_mode = false;
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, code: DiagnosticCode, message: &str) -> Token {
        if self.check(kind) {
            self.panic_mode = false;
            return self.advance();
        }
        let range = self.peek(0).range;
        self.report(code, message, range);
        self.panic_mode = true;
        self.advance()
    }

    fn report(&mut self, code: DiagnosticCode, message: impl Into<String>, range: SourceRange) {
        self.lexer
            .diagnostics()
            .report(Diagnostic::error(code, message, range));
    }

    /// Skips tokens until one of `sync_tokens` (or end-of-file) is next.
    /// Only active while in panic mode.
    fn synchronize(&mut self, sync_tokens: &[TokenKind]) {
        if !self.panic_mode {
            return;
        }
        while !self.check(TokenKind::EndOfFile) && !sync_tokens.contains(&self.peek(0).kind) {
            self.advance();
        }
        self.panic_mode = false;
    }

    fn parse_block(&mut self) -> Block {
        let mut block = Block::default();
        self.parse_const_declarations(&mut block);
        self.synchronize(DECLARATION_SYNC);
        self.parse_var_declarations(&mut block);
        self.synchronize(DECLARATION_SYNC);
        self.parse_procedure_declarations(&mut block);

        if let Some(statement) = self.parse_statement() {
            block.statements.push(statement);
        }
        block
    }

    fn parse_const_declarations(&mut self, block: &mut Block) {
        if !self.eat(TokenKind::Const) {
            return;
        }
        loop {
            let name_token = self.expect(
                TokenKind::Identifier,
                DiagnosticCode::ExpectedIdentifier,
                "expected identifier in const declaration",
            );
            self.expect(
                TokenKind::Equal,
                DiagnosticCode::ExpectedSymbol,
                "expected '=' in const declaration",
            );
            let value_token = self.peek(0).clone();
            let mut decl = ConstDecl {
                range: SourceRange::new(name_token.range.begin, name_token.range.end),
                name: name_token.lexeme,
                value: 0,
                is_boolean: false,
            };
            if self.eat(TokenKind::Number) {
                decl.value = value_token.number.unwrap_or(0);
                decl.range.end = value_token.range.end;
            } else if self.eat(TokenKind::Boolean) {
                decl.value = i64::from(value_token.boolean.unwrap_or(false));
                decl.is_boolean = true;
                decl.range.end = value_token.range.end;
            } else {
                self.report(
                    DiagnosticCode::ExpectedSymbol,
                    "expected number or boolean literal in const declaration",
                    value_token.range,
                );
                self.panic_mode = true;
            }
            block.consts.push(decl);

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(
            TokenKind::Semicolon,
            DiagnosticCode::ExpectedSymbol,
            "expected ';' after const declarations",
        );
    }

    fn parse_var_declarations(&mut self, block: &mut Block) {
        if !self.eat(TokenKind::Var) {
            return;
        }
        loop {
            let name_token = self.expect(
                TokenKind::Identifier,
                DiagnosticCode::ExpectedIdentifier,
                "expected identifier in var declaration",
            );
            let mut decl = VarDecl {
                range: name_token.range,
                name: name_token.lexeme,
                array_size: None,
            };
            if self.eat(TokenKind::LBracket) {
                let size_token = self.expect(
                    TokenKind::Number,
                    DiagnosticCode::ExpectedSymbol,
                    "expected array size",
                );
                if size_token.number.is_some_and(|size| size <= 0) {
                    self.report(
                        DiagnosticCode::InvalidArraySubscript,
                        "array size must be positive",
                        size_token.range,
                    );
                }
                decl.array_size = Some(size_token.number.unwrap_or(0));
                decl.range.end = size_token.range.end;
                self.expect(
                    TokenKind::RBracket,
                    DiagnosticCode::ExpectedSymbol,
                    "expected ']' after array size",
                );
            }
            block.vars.push(decl);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(
            TokenKind::Semicolon,
            DiagnosticCode::ExpectedSymbol,
            "expected ';' after var declarations",
        );
    }

    fn parse_procedure_declarations(&mut self, block: &mut Block) {
        while self.eat(TokenKind::Procedure) {
            let name_token = self.expect(
                TokenKind::Identifier,
                DiagnosticCode::ExpectedIdentifier,
                "expected procedure name",
            );
            self.expect(
                TokenKind::Semicolon,
                DiagnosticCode::ExpectedSymbol,
                "expected ';' before procedure body",
            );
            let body = self.parse_block();
            let end = self.peek(0).range.begin;
            self.expect(
                TokenKind::Semicolon,
                DiagnosticCode::ExpectedSymbol,
                "expected ';' after procedure body",
            );
            block.procedures.push(ProcedureDecl {
                range: SourceRange::new(name_token.range.begin, end),
                name: name_token.lexeme,
                body,
            });
        }
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        match self.peek(0).kind {
            TokenKind::Identifier => Some(self.parse_assignment()),
            TokenKind::Call => Some(self.parse_call()),
            TokenKind::Begin => Some(self.parse_begin_end()),
            TokenKind::If => Some(self.parse_if()),
            TokenKind::While => Some(self.parse_while()),
            TokenKind::Repeat => Some(self.parse_repeat()),
            TokenKind::Read => Some(self.parse_read()),
            TokenKind::Write => Some(self.parse_write(false)),
            TokenKind::Writeln => Some(self.parse_write(true)),
            _ => None,
        }
    }

    fn parse_assignment(&mut self) -> Statement {
        let identifier = self.expect(
            TokenKind::Identifier,
            DiagnosticCode::ExpectedIdentifier,
            "expected assignment target",
        );
        let begin = identifier.range.begin;

        let mut index = None;
        if self.eat(TokenKind::LBracket) {
            let index_expr = self
                .parse_expression()
                .unwrap_or_else(|| Expression::number(identifier.range, 0));
            index = Some(Box::new(index_expr));
            self.expect(
                TokenKind::RBracket,
                DiagnosticCode::ExpectedSymbol,
                "expected ']' after subscript",
            );
        }

        let op_token = self.peek(0).clone();
        let (op, value) = if let Some(op) = assignment_operator(op_token.kind) {
            self.advance();
            self.panic_mode = false;
            let value = self
                .parse_expression()
                .unwrap_or_else(|| Expression::number(op_token.range, 0));
            (op, value)
        } else if op_token.kind == TokenKind::PlusPlus {
            self.advance();
            self.panic_mode = false;
            (AssignOp::AddAssign, Expression::number(op_token.range, 1))
        } else if op_token.kind == TokenKind::MinusMinus {
            self.advance();
            self.panic_mode = false;
            (AssignOp::SubAssign, Expression::number(op_token.range, 1))
        } else {
            self.report(
                DiagnosticCode::ExpectedSymbol,
                "expected ':=' in assignment",
                op_token.range,
            );
            self.panic_mode = true;
            (AssignOp::Assign, Expression::number(identifier.range, 0))
        };

        let range = SourceRange::new(begin, value.range.end);
        Statement::new(
            range,
            StmtKind::Assignment {
                target: identifier.lexeme,
                index,
                op,
                value: Box::new(value),
            },
        )
    }

    fn parse_call(&mut self) -> Statement {
        let call_token = self.expect(
            TokenKind::Call,
            DiagnosticCode::ExpectedSymbol,
            "expected 'call'",
        );
        let name_token = self.expect(
            TokenKind::Identifier,
            DiagnosticCode::ExpectedIdentifier,
            "expected procedure name after call",
        );
        let mut end = name_token.range.end;
        let mut arguments = Vec::new();
        if self.check(TokenKind::LParen) {
            end = self.parse_argument_list(&mut arguments);
        }
        Statement::new(
            SourceRange::new(call_token.range.begin, end),
            StmtKind::Call {
                callee: name_token.lexeme,
                arguments,
            },
        )
    }

    /// Parses `'(' [ expr { ',' expr } ] ')'`, returning the end location.
    /// The caller has already checked that '(' is next.
    fn parse_argument_list(&mut self, arguments: &mut Vec<Expression>) -> SourceLoc {
        let lparen = self.advance();
        let mut end = lparen.range.end;
        if self.check(TokenKind::RParen) {
            let rparen = self.advance();
            return rparen.range.end;
        }
        loop {
            if let Some(argument) = self.parse_expression() {
                end = argument.range.end;
                arguments.push(argument);
            }
            if self.eat(TokenKind::Comma) {
                continue;
            }
            let rparen = self.expect(
                TokenKind::RParen,
                DiagnosticCode::ExpectedSymbol,
                "expected ')' after arguments",
            );
            end = rparen.range.end;
            break;
        }
        end
    }

    fn parse_begin_end(&mut self) -> Statement {
        let begin_token = self.expect(
            TokenKind::Begin,
            DiagnosticCode::ExpectedSymbol,
            "expected 'begin'",
        );
        let mut statements = Vec::new();
        while !self.check(TokenKind::End) && !self.check(TokenKind::EndOfFile) {
            if let Some(statement) = self.parse_statement() {
                statements.push(statement);
            }
            if self.panic_mode {
                self.synchronize(STATEMENT_SYNC);
                self.eat(TokenKind::Semicolon);
                continue;
            }
            if !self.eat(TokenKind::Semicolon) {
                break;
            }
        }
        let end_token = self.expect(
            TokenKind::End,
            DiagnosticCode::ExpectedSymbol,
            "expected 'end'",
        );
        Statement::new(
            SourceRange::new(begin_token.range.begin, end_token.range.end),
            StmtKind::Compound(statements),
        )
    }

    fn parse_if(&mut self) -> Statement {
        let if_token = self.expect(TokenKind::If, DiagnosticCode::ExpectedSymbol, "expected 'if'");
        let condition = self
            .parse_expression()
            .unwrap_or_else(|| Expression::boolean(if_token.range, false));
        self.expect(
            TokenKind::Then,
            DiagnosticCode::ExpectedSymbol,
            "expected 'then'",
        );
        let then_statement = self
            .parse_statement()
            .unwrap_or_else(|| Statement::new(if_token.range, StmtKind::Compound(Vec::new())));

        let mut else_branch = Vec::new();
        if self.eat(TokenKind::Else) {
            if let Some(else_statement) = self.parse_statement() {
                else_branch.push(else_statement);
            }
        }

        let mut range = SourceRange::new(if_token.range.begin, then_statement.range.end);
        if let Some(last) = else_branch.last() {
            range.end = last.range.end;
        }
        Statement::new(
            range,
            StmtKind::If {
                condition: Box::new(condition),
                then_branch: vec![then_statement],
                else_branch,
            },
        )
    }

    fn parse_while(&mut self) -> Statement {
        let while_token = self.expect(
            TokenKind::While,
            DiagnosticCode::ExpectedSymbol,
            "expected 'while'",
        );
        let condition = self
            .parse_expression()
            .unwrap_or_else(|| Expression::boolean(while_token.range, false));
        self.expect(TokenKind::Do, DiagnosticCode::ExpectedSymbol, "expected 'do'");
        let body = self
            .parse_statement()
            .unwrap_or_else(|| Statement::new(while_token.range, StmtKind::Compound(Vec::new())));
        let range = SourceRange::new(while_token.range.begin, body.range.end);
        Statement::new(
            range,
            StmtKind::While {
                condition: Box::new(condition),
                body: vec![body],
            },
        )
    }

    fn parse_repeat(&mut self) -> Statement {
        let repeat_token = self.expect(
            TokenKind::Repeat,
            DiagnosticCode::ExpectedSymbol,
            "expected 'repeat'",
        );
        let mut body = Vec::new();
        loop {
            if let Some(statement) = self.parse_statement() {
                body.push(statement);
            }
            if self.panic_mode {
                self.synchronize(STATEMENT_SYNC);
                self.eat(TokenKind::Semicolon);
                if !self.check(TokenKind::Until) && !self.check(TokenKind::EndOfFile) {
                    continue;
                }
                break;
            }
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            break;
        }
        self.expect(
            TokenKind::Until,
            DiagnosticCode::ExpectedSymbol,
            "expected 'until'",
        );
        let condition = self
            .parse_expression()
            .unwrap_or_else(|| Expression::boolean(repeat_token.range, false));
        let range = SourceRange::new(repeat_token.range.begin, condition.range.end);
        Statement::new(
            range,
            StmtKind::Repeat {
                body,
                condition: Box::new(condition),
            },
        )
    }

    fn parse_read(&mut self) -> Statement {
        let read_token = self.expect(
            TokenKind::Read,
            DiagnosticCode::ExpectedSymbol,
            "expected 'read'",
        );
        let mut targets = Vec::new();
        let mut end = read_token.range.end;
        if self.eat(TokenKind::LParen) {
            loop {
                let target = self.expect(
                    TokenKind::Identifier,
                    DiagnosticCode::ExpectedIdentifier,
                    "expected identifier in read",
                );
                end = target.range.end;
                targets.push(target.lexeme);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            let rparen = self.expect(
                TokenKind::RParen,
                DiagnosticCode::ExpectedSymbol,
                "expected ')' after read arguments",
            );
            end = rparen.range.end;
        } else {
            let target = self.expect(
                TokenKind::Identifier,
                DiagnosticCode::ExpectedIdentifier,
                "expected identifier in read",
            );
            end = target.range.end;
            targets.push(target.lexeme);
        }
        Statement::new(
            SourceRange::new(read_token.range.begin, end),
            StmtKind::Read { targets },
        )
    }

    fn parse_write(&mut self, newline: bool) -> Statement {
        let write_token = self.expect(
            if newline {
                TokenKind::Writeln
            } else {
                TokenKind::Write
            },
            DiagnosticCode::ExpectedSymbol,
            if newline {
                "expected 'writeln'"
            } else {
                "expected 'write'"
            },
        );
        let mut values = Vec::new();
        let mut end = write_token.range.end;
        if self.check(TokenKind::LParen) {
            end = self.parse_argument_list(&mut values);
        } else if starts_expression(self.peek(0).kind) {
            // Parenthesis-free form takes a single operand; `writeln;` alone
            // just emits the newline.
            if let Some(value) = self.parse_expression() {
                end = value.range.end;
                values.push(value);
            }
        }
        Statement::new(
            SourceRange::new(write_token.range.begin, end),
            StmtKind::Write { values, newline },
        )
    }

    fn parse_expression(&mut self) -> Option<Expression> {
        let mut expr = self.parse_logic_term()?;
        while self.eat(TokenKind::Or) {
            let rhs = self
                .parse_logic_term()
                .unwrap_or_else(|| Expression::boolean(expr.range, false));
            let range = SourceRange::new(expr.range.begin, rhs.range.end);
            expr = Expression::new(
                range,
                ExprKind::Binary {
                    op: BinaryOp::Or,
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                },
            );
        }
        Some(expr)
    }

    fn parse_logic_term(&mut self) -> Option<Expression> {
        let mut expr = self.parse_relation()?;
        while self.eat(TokenKind::And) {
            let rhs = self
                .parse_relation()
                .unwrap_or_else(|| Expression::boolean(expr.range, false));
            let range = SourceRange::new(expr.range.begin, rhs.range.end);
            expr = Expression::new(
                range,
                ExprKind::Binary {
                    op: BinaryOp::And,
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                },
            );
        }
        Some(expr)
    }

    fn parse_relation(&mut self) -> Option<Expression> {
        let lhs = self.parse_term()?;
        let op = match self.peek(0).kind {
            TokenKind::Equal => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            _ => return Some(lhs),
        };
        let op_token = self.advance();
        self.panic_mode = false;
        let rhs = self
            .parse_term()
            .unwrap_or_else(|| Expression::number(op_token.range, 0));
        let range = SourceRange::new(lhs.range.begin, rhs.range.end);
        Some(Expression::new(
            range,
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        ))
    }

    fn parse_term(&mut self) -> Option<Expression> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek(0).kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            let op_token = self.advance();
            self.panic_mode = false;
            let rhs = self
                .parse_factor()
                .unwrap_or_else(|| Expression::number(op_token.range, 0));
            let range = SourceRange::new(expr.range.begin, rhs.range.end);
            expr = Expression::new(
                range,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                },
            );
        }
        Some(expr)
    }

    /// Multiplicative level. Unary operators bind tighter, so `-x * y`
    /// parses as `(-x) * y`.
    fn parse_factor(&mut self) -> Option<Expression> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek(0).kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => break,
            };
            let op_token = self.advance();
            self.panic_mode = false;
            let rhs = self
                .parse_unary()
                .unwrap_or_else(|| Expression::number(op_token.range, 1));
            let range = SourceRange::new(expr.range.begin, rhs.range.end);
            expr = Expression::new(
                range,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                },
            );
        }
        Some(expr)
    }

    fn parse_unary(&mut self) -> Option<Expression> {
        let token = self.peek(0).clone();
        let op = match token.kind {
            TokenKind::Plus => UnaryOp::Positive,
            TokenKind::Minus => UnaryOp::Negative,
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Odd => UnaryOp::Odd,
            _ => return self.parse_primary(),
        };
        self.advance();
        self.panic_mode = false;
        let operand = self.parse_unary().unwrap_or_else(|| match op {
            UnaryOp::Not => Expression::boolean(token.range, false),
            _ => Expression::number(token.range, 0),
        });
        if op == UnaryOp::Positive {
            // Unary plus is the identity; no node, no instruction.
            return Some(operand);
        }
        let range = SourceRange::new(token.range.begin, operand.range.end);
        Some(Expression::new(
            range,
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        ))
    }

    fn parse_primary(&mut self) -> Option<Expression> {
        let token = self.peek(0).clone();
        match token.kind {
            TokenKind::Number => {
                let token = self.advance();
                self.panic_mode = false;
                Some(Expression::number(token.range, token.number.unwrap_or(0)))
            }
            TokenKind::Boolean => {
                let token = self.advance();
                self.panic_mode = false;
                Some(Expression::boolean(
                    token.range,
                    token.boolean.unwrap_or(false),
                ))
            }
            TokenKind::Identifier => {
                let ident_token = self.advance();
                self.panic_mode = false;
                if self.check(TokenKind::LParen) {
                    let mut arguments = Vec::new();
                    let end = self.parse_argument_list(&mut arguments);
                    return Some(Expression::new(
                        SourceRange::new(ident_token.range.begin, end),
                        ExprKind::Call {
                            callee: ident_token.lexeme,
                            arguments,
                        },
                    ));
                }
                if self.eat(TokenKind::LBracket) {
                    let index = self
                        .parse_expression()
                        .unwrap_or_else(|| Expression::number(ident_token.range, 0));
                    let rbracket = self.expect(
                        TokenKind::RBracket,
                        DiagnosticCode::ExpectedSymbol,
                        "expected ']' after subscript",
                    );
                    return Some(Expression::new(
                        SourceRange::new(ident_token.range.begin, rbracket.range.end),
                        ExprKind::ArrayAccess {
                            name: ident_token.lexeme,
                            index: Box::new(index),
                        },
                    ));
                }
                Some(Expression::new(
                    ident_token.range,
                    ExprKind::Identifier(ident_token.lexeme),
                ))
            }
            TokenKind::LParen => {
                let lparen = self.advance();
                self.panic_mode = false;
                let expr = self.parse_expression();
                self.expect(
                    TokenKind::RParen,
                    DiagnosticCode::ExpectedSymbol,
                    "expected ')' after expression",
                );
                Some(expr.unwrap_or_else(|| Expression::number(lparen.range, 0)))
            }
            _ => {
                self.report(
                    DiagnosticCode::UnexpectedToken,
                    "unexpected token in expression",
                    token.range,
                );
                self.panic_mode = true;
                self.advance();
                None
            }
        }
    }
}

/// Parses source text into a program, reporting diagnostics into the sink.
pub fn parse_source(source: &str, diagnostics: &mut DiagnosticSink) -> Program {
    let lexer = Lexer::new(source, diagnostics);
    Parser::new(lexer).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse_ok(source: &str) -> Program {
        let mut sink = DiagnosticSink::new();
        let program = parse_source(source, &mut sink);
        assert!(
            !sink.has_errors(),
            "unexpected diagnostics: {:?}",
            sink.diagnostics()
        );
        program
    }

    fn first_statement(program: &Program) -> &Statement {
        match &program.block.statements[0].kind {
            StmtKind::Compound(statements) => &statements[0],
            _ => &program.block.statements[0],
        }
    }

    #[test]
    fn parses_assignment_with_precedence() {
        let program = parse_ok("var x; begin x := 1 + 2 * 3; end.");
        let statement = first_statement(&program);
        let StmtKind::Assignment { target, op, value, .. } = &statement.kind else {
            panic!("expected assignment, got {statement:?}");
        };
        assert_eq!(target, "x");
        assert_eq!(*op, AssignOp::Assign);
        // 1 + (2 * 3)
        let ExprKind::Binary { op: BinaryOp::Add, lhs, rhs } = &value.kind else {
            panic!("expected addition at the root, got {value:?}");
        };
        assert_eq!(lhs.kind, ExprKind::Number(1));
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn unary_minus_binds_tighter_than_multiplication() {
        let program = parse_ok("var x, y; begin x := -x * y; end.");
        let statement = first_statement(&program);
        let StmtKind::Assignment { value, .. } = &statement.kind else {
            panic!("expected assignment");
        };
        // (-x) * y
        let ExprKind::Binary { op: BinaryOp::Multiply, lhs, .. } = &value.kind else {
            panic!("expected multiplication at the root, got {value:?}");
        };
        assert!(matches!(
            lhs.kind,
            ExprKind::Unary {
                op: UnaryOp::Negative,
                ..
            }
        ));
    }

    #[test]
    fn relational_binds_looser_than_additive() {
        let program = parse_ok("var x; begin if x + 1 <= 10 then x := 0; end.");
        let statement = first_statement(&program);
        let StmtKind::If { condition, .. } = &statement.kind else {
            panic!("expected if statement");
        };
        assert!(matches!(
            condition.kind,
            ExprKind::Binary {
                op: BinaryOp::LessEqual,
                ..
            }
        ));
    }

    #[test]
    fn logical_operators_chain() {
        let program = parse_ok("var x; begin if x > 0 and x < 10 or odd x then x := 0; end.");
        let statement = first_statement(&program);
        let StmtKind::If { condition, .. } = &statement.kind else {
            panic!("expected if statement");
        };
        // or is the weakest binder
        assert!(matches!(
            condition.kind,
            ExprKind::Binary { op: BinaryOp::Or, .. }
        ));
    }

    #[test]
    fn increment_desugars_to_add_assign() {
        let program = parse_ok("var x; begin x++; end.");
        let statement = first_statement(&program);
        let StmtKind::Assignment { op, value, .. } = &statement.kind else {
            panic!("expected assignment");
        };
        assert_eq!(*op, AssignOp::AddAssign);
        assert_eq!(value.kind, ExprKind::Number(1));
    }

    #[test]
    fn decrement_on_array_element_desugars() {
        let program = parse_ok("var a[4]; begin a[2]--; end.");
        let statement = first_statement(&program);
        let StmtKind::Assignment { index, op, value, .. } = &statement.kind else {
            panic!("expected assignment");
        };
        assert!(index.is_some());
        assert_eq!(*op, AssignOp::SubAssign);
        assert_eq!(value.kind, ExprKind::Number(1));
    }

    #[test]
    fn compound_assignment_operators_parse() {
        for (source, expected) in [
            ("var x; begin x += 2; end.", AssignOp::AddAssign),
            ("var x; begin x -= 2; end.", AssignOp::SubAssign),
            ("var x; begin x *= 2; end.", AssignOp::MulAssign),
            ("var x; begin x /= 2; end.", AssignOp::DivAssign),
            ("var x; begin x %= 2; end.", AssignOp::ModAssign),
        ] {
            let program = parse_ok(source);
            let statement = first_statement(&program);
            let StmtKind::Assignment { op, .. } = &statement.kind else {
                panic!("expected assignment for {source}");
            };
            assert_eq!(*op, expected, "for {source}");
        }
    }

    #[test]
    fn parses_nested_procedures() {
        let source = indoc! {"
            var x;
            procedure outer;
                var y;
                procedure inner;
                begin y := x + 1; end;
            begin y := 0; call inner; end;
            begin x := 41; call outer; end.
        "};
        let program = parse_ok(source);
        assert_eq!(program.block.procedures.len(), 1);
        let outer = &program.block.procedures[0];
        assert_eq!(outer.name, "outer");
        assert_eq!(outer.body.procedures.len(), 1);
        assert_eq!(outer.body.procedures[0].name, "inner");
    }

    #[test]
    fn parses_repeat_until() {
        let program = parse_ok("var x; begin repeat x := x + 1 until x > 3; end.");
        let statement = first_statement(&program);
        assert!(matches!(statement.kind, StmtKind::Repeat { .. }));
    }

    #[test]
    fn writeln_without_operand_is_allowed() {
        let program = parse_ok("begin writeln; end.");
        let statement = first_statement(&program);
        let StmtKind::Write { values, newline } = &statement.kind else {
            panic!("expected write statement");
        };
        assert!(values.is_empty());
        assert!(newline);
    }

    #[test]
    fn read_accepts_bare_and_parenthesized_forms() {
        let program = parse_ok("var x, y; begin read x; read(x, y); end.");
        let StmtKind::Compound(statements) = &program.block.statements[0].kind else {
            panic!("expected compound");
        };
        let StmtKind::Read { targets } = &statements[0].kind else {
            panic!("expected read");
        };
        assert_eq!(targets, &["x".to_string()]);
        let StmtKind::Read { targets } = &statements[1].kind else {
            panic!("expected read");
        };
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn missing_condition_yields_placeholder_and_diagnostic() {
        let mut sink = DiagnosticSink::new();
        let program = parse_source("var x; begin if then x := 1; end.", &mut sink);
        assert!(sink.has_errors());
        let statement = first_statement(&program);
        let StmtKind::If { condition, .. } = &statement.kind else {
            panic!("expected if statement");
        };
        assert_eq!(condition.kind, ExprKind::Boolean(false));
    }

    #[test]
    fn recovers_and_reports_multiple_errors() {
        let source = indoc! {"
            var x;
            begin
                x := ;
                x := * 2;
                x := 2;
            end.
        "};
        let mut sink = DiagnosticSink::new();
        let program = parse_source(source, &mut sink);
        assert!(sink.diagnostics().len() >= 2);
        // The statement after the errors still parses.
        let StmtKind::Compound(statements) = &program.block.statements[0].kind else {
            panic!("expected compound");
        };
        assert!(statements
            .iter()
            .any(|statement| matches!(
                &statement.kind,
                StmtKind::Assignment { value, .. } if value.kind == ExprKind::Number(2)
            )));
    }

    fn check_ranges(statement: &Statement) {
        fn contains(outer: SourceRange, inner: SourceRange) -> bool {
            let begin_ok = (outer.begin.line, outer.begin.column) <= (inner.begin.line, inner.begin.column);
            let end_ok = (outer.end.line, outer.end.column) >= (inner.end.line, inner.end.column);
            begin_ok && end_ok
        }
        fn walk_expr(expr: &Expression) {
            match &expr.kind {
                ExprKind::ArrayAccess { index, .. } => {
                    assert!(contains(expr.range, index.range));
                    walk_expr(index);
                }
                ExprKind::Binary { lhs, rhs, .. } => {
                    assert!(contains(expr.range, lhs.range));
                    assert!(contains(expr.range, rhs.range));
                    walk_expr(lhs);
                    walk_expr(rhs);
                }
                ExprKind::Unary { operand, .. } => {
                    assert!(contains(expr.range, operand.range));
                    walk_expr(operand);
                }
                ExprKind::Call { arguments, .. } => {
                    for argument in arguments {
                        assert!(contains(expr.range, argument.range));
                        walk_expr(argument);
                    }
                }
                _ => {}
            }
        }
        match &statement.kind {
            StmtKind::Assignment { index, value, .. } => {
                if let Some(index) = index {
                    assert!(contains(statement.range, index.range));
                }
                assert!(contains(statement.range, value.range));
                walk_expr(value);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                assert!(contains(statement.range, condition.range));
                for child in then_branch.iter().chain(else_branch) {
                    assert!(contains(statement.range, child.range));
                    check_ranges(child);
                }
            }
            StmtKind::While { condition, body } => {
                assert!(contains(statement.range, condition.range));
                for child in body {
                    check_ranges(child);
                }
            }
            StmtKind::Compound(statements) => {
                for child in statements {
                    assert!(contains(statement.range, child.range));
                    check_ranges(child);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn node_ranges_contain_child_ranges() {
        let source = indoc! {"
            var a[3], x;
            begin
                x := -(1 + 2) * 3;
                a[x] += x;
                if x < 5 then begin write(x); end else write(0);
                while x > 0 do x--;
            end.
        "};
        let program = parse_ok(source);
        for statement in &program.block.statements {
            check_ranges(statement);
        }
    }
}
