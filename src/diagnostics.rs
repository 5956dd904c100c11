use std::fmt;

/// 1-based line/column position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: u32,
    pub column: u32,
}

impl Default for SourceLoc {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

/// Half-open `[begin, end)` range attached to every token and AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceRange {
    pub begin: SourceLoc,
    pub end: SourceLoc,
}

impl SourceRange {
    pub fn new(begin: SourceLoc, end: SourceLoc) -> Self {
        Self { begin, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
}

impl DiagnosticLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Note => "note",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    UnexpectedToken,
    UnterminatedComment,
    InvalidNumber,
    Redeclaration,
    UndeclaredIdentifier,
    ExpectedIdentifier,
    ExpectedSymbol,
    InvalidAssignmentTarget,
    InvalidArraySubscript,
    StackOverflow,
    StackUnderflow,
    DivisionByZero,
    RuntimeError,
    IoError,
    InternalError,
}

impl DiagnosticCode {
    /// Stable code string used in rendered diagnostics and by tests.
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::UnexpectedToken => "unexpected-token",
            DiagnosticCode::UnterminatedComment => "unterminated-comment",
            DiagnosticCode::InvalidNumber => "invalid-number",
            DiagnosticCode::Redeclaration => "redeclaration",
            DiagnosticCode::UndeclaredIdentifier => "undeclared-identifier",
            DiagnosticCode::ExpectedIdentifier => "expected-identifier",
            DiagnosticCode::ExpectedSymbol => "expected-symbol",
            DiagnosticCode::InvalidAssignmentTarget => "invalid-assignment-target",
            DiagnosticCode::InvalidArraySubscript => "invalid-array-subscript",
            DiagnosticCode::StackOverflow => "stack-overflow",
            DiagnosticCode::StackUnderflow => "stack-underflow",
            DiagnosticCode::DivisionByZero => "division-by-zero",
            DiagnosticCode::RuntimeError => "runtime-error",
            DiagnosticCode::IoError => "io-error",
            DiagnosticCode::InternalError => "internal-error",
        }
    }
}

/// One categorized, source-ranged message.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: DiagnosticCode,
    pub message: String,
    pub range: SourceRange,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>, range: SourceRange) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            code,
            message: message.into(),
            range,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} ({}:{}-{}:{})",
            self.level.as_str(),
            self.code.as_str(),
            self.message,
            self.range.begin.line,
            self.range.begin.column,
            self.range.end.line,
            self.range.end.column,
        )
    }
}

/// Accumulates diagnostics from every compiler stage. Reporting never
/// fails and never halts the reporting stage.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.level == DiagnosticLevel::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }
}
