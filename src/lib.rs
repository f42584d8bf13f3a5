pub mod builtins;
pub mod lexer;
pub mod parser;
pub mod runtime_io;
pub mod semantic;
pub mod types;
pub mod vm;

use ariadne::{Color, Label, Report, ReportKind, Source};
use chumsky::Parser;
use chumsky::input::{Input, Stream};
use chumsky::span::{SimpleSpan, Span};

pub use vm::{Compiler, Module, Vm};

/// Lexes and parses a source file. Parse errors are rendered to stderr as
/// ariadne reports.
pub fn parse_source(path: &str, src: &str) -> Result<Vec<parser::ast::StmtS>, ()> {
    let mut lexer = lexer::Lexer::new(src);
    let mut reached_eof = false;
    let token_iter = std::iter::from_fn(move || {
        if reached_eof {
            return None;
        }
        let (t, span) = lexer.next_token_with_span();
        if t == lexer::token::Token::Eof {
            reached_eof = true;
            return None;
        }
        Some((t, SimpleSpan::new((), span.start..span.end)))
    });
    let eoi_span = SimpleSpan::new((), src.len()..src.len());
    let token_stream = Stream::from_iter(token_iter).map(eoi_span, |(t, s)| (t, s));
    match parser::program_parser().parse(token_stream).into_result() {
        Ok(program) => Ok(program),
        Err(errors) => {
            let mut errors = errors;
            errors.sort_by(|x1, x2| {
                let x1 = (x1.span().start, x1.span().end);
                let x2 = (x2.span().start, x2.span().end);
                x1.cmp(&x2)
            });
            for e in errors {
                Report::build(ReportKind::Error, (path, e.span().into_range()))
                    .with_config(ariadne::Config::new().with_index_type(ariadne::IndexType::Byte))
                    .with_code(3)
                    .with_message("Parsing failed")
                    .with_label(
                        Label::new((path, e.span().into_range()))
                            .with_message(e.reason().to_string())
                            .with_color(Color::Red),
                    )
                    .finish()
                    .eprint((path, Source::from(src)))
                    .ok();
            }
            Err(())
        }
    }
}

/// Runs semantic analysis, rendering any error to stderr.
pub fn analyze(program: &[parser::ast::StmtS], path: &str, src: &str) -> bool {
    match semantic::analyze(program) {
        Ok(_) => true,
        Err(e) => {
            Report::build(ReportKind::Error, (path, e.span.clone()))
                .with_config(ariadne::Config::new().with_index_type(ariadne::IndexType::Byte))
                .with_code(4)
                .with_message("Semantic Analyzing Failed")
                .with_label(
                    Label::new((path, e.span.clone()))
                        .with_message(e.message)
                        .with_color(Color::Red),
                )
                .finish()
                .eprint((path, Source::from(src)))
                .ok();
            false
        }
    }
}

pub fn compile_to_module(program: &[parser::ast::StmtS], src: &str) -> Module {
    let compiler = Compiler::new(src);
    compiler.compile(program)
}

pub fn exec_module(module: &Module) {
    let mut machine = Vm::new();
    if let Err(err) = machine.run(module) {
        eprintln!("{}", err);
    }
}

pub fn save_module(module: &Module, path: &str) -> std::io::Result<()> {
    vm::save_module(path, module)
}

pub fn load_module(path: &str) -> Result<Module, vm::LoadError> {
    vm::load_module(path)
}
