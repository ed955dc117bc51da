//! Orchestrates the pipeline: lexer → parser → analyzer → codegen, short
//! circuiting after any stage that reports errors (spec §4.6).

use crate::analyzer::analyze;
use crate::ast::Ast;
use crate::codegen::generate;
use crate::diagnostic::{Diagnostic, Reporter};
use crate::image::Image;
use crate::lexer::Lexer;
use crate::parser::Parser;

#[derive(Default)]
pub struct Driver {
    reporter: Reporter,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Lexes, parses, and semantically analyzes `source`. Returns the
    /// validated AST, or `None` once any stage has reported an error —
    /// later stages never run on invalid input.
    pub fn check(&mut self, source: &str, file_id: u16) -> Option<Ast> {
        let (tokens, lex_errors) = Lexer::new(source, file_id).tokenize();
        self.reporter.extend(lex_errors);
        if self.reporter.has_errors() {
            return None;
        }

        let (mut ast, parse_errors) = Parser::new(tokens, source.to_string()).parse();
        self.reporter.extend(parse_errors);
        if self.reporter.has_errors() {
            return None;
        }

        let sema_errors = analyze(&mut ast);
        self.reporter.extend(sema_errors);
        if self.reporter.has_errors() {
            return None;
        }

        Some(ast)
    }

    /// `check`, then code generation — the full compile pipeline.
    pub fn compile(&mut self, source: &str, file_id: u16) -> Option<Image> {
        let ast = self.check(source, file_id)?;
        Some(generate(&ast))
    }
}

/// Compiles `source` in one call, for callers that don't need to inspect
/// intermediate stages (mirrors the `compile`/driver-function shape this
/// crate's ambient CLI and tests both use).
pub fn compile_source(source: &str) -> Result<Image, Vec<Diagnostic>> {
    let mut driver = Driver::new();
    match driver.compile(source, 0) {
        Some(image) => Ok(image),
        None => Err(driver.reporter.into_errors()),
    }
}

/// Runs only the lex/parse/analyze stages, for the `check` CLI subcommand.
pub fn check_source(source: &str) -> Result<(), Vec<Diagnostic>> {
    let mut driver = Driver::new();
    match driver.check(source, 0) {
        Some(_) => Ok(()),
        None => Err(driver.reporter.into_errors()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::ErrorKind;

    #[test]
    fn compiles_a_well_formed_program() {
        let image = compile_source("print 2 + 3 * 4;").expect("should compile");
        assert!(!image.instrs().is_empty());
    }

    #[test]
    fn stops_before_codegen_on_semantic_error() {
        let errors = compile_source("print undefined;").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::UndeclaredIdentifier);
    }

    #[test]
    fn lexer_errors_short_circuit_parsing() {
        let errors = compile_source("a = 1 $ 2;").unwrap_err();
        assert!(errors.iter().any(|d| d.kind == ErrorKind::UnknownToken));
    }

    #[test]
    fn check_source_does_not_generate_code() {
        assert!(check_source("i = 0; while (i < 3) { i = i + 1; }").is_ok());
        assert!(check_source("break;").is_err());
    }
}
