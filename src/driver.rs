//! C7: the compiler driver.
//!
//! Owns the arenas for the duration of one call and threads source text
//! through lex → parse → analyze → lower → emit, following naga's
//! top-level `Module` + `write_vec(module, options)` shape collapsed into
//! the single [`compile`] entry point spec.md's driver section calls for.

use log::{debug, trace};

use crate::analysis::Analyzer;
use crate::back::spv::{self, Options};
use crate::diagnostics::{Diagnostic, Span};
use crate::front::Parser;
use crate::ir::build::lower;
use crate::ty::Interner;

/// Lexes, parses, analyzes, lowers and emits `text` (the contents of the
/// file at `path`, used only for diagnostic messages), returning the
/// SPIR-V word stream for `entry` or every diagnostic collected along
/// the way.
///
/// `entry` selects which `@stage(...)`-attributed function(s) become
/// `OpEntryPoint`s; every matching entry point in the module is emitted,
/// so a value of `None` emits all declared entry points.
pub fn compile(path: &str, text: &str, entry: Option<&str>) -> Result<Vec<u32>, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();

    let mut parser = match Parser::new(text) {
        Ok(p) => p,
        Err(err) => return Err(vec![parse_diagnostic(path, err)]),
    };
    let file = match parser.parse_file() {
        Ok(f) => f,
        Err(err) => return Err(vec![parse_diagnostic(path, err)]),
    };
    debug!("parsed {} top-level decls in {}", file.decls.len(), path);

    let mut interner = Interner::new();
    let decls = {
        let mut analyzer = Analyzer::new(&mut interner);
        let decls = analyzer.analyze_file(&file);
        for err in analyzer.diagnostics {
            diagnostics.push(Diagnostic {
                path: path.to_string(),
                span: analysis_error_span(&err),
                message: err.to_string(),
            });
        }
        decls
    };
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }
    trace!("analysis produced {} declarations", decls.len());

    let (module, lower_errors) = lower(&mut interner, &decls);
    for err in &lower_errors {
        diagnostics.push(Diagnostic {
            path: path.to_string(),
            span: Span::UNKNOWN,
            message: err.to_string(),
        });
    }
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let entry_points: Vec<_> = module
        .entry_points
        .iter()
        .filter(|ep| entry.map_or(true, |name| ep.name == name))
        .collect();
    if entry_points.is_empty() {
        diagnostics.push(Diagnostic {
            path: path.to_string(),
            span: Span::UNKNOWN,
            message: match entry {
                Some(name) => format!("no entry point named `{name}`"),
                None => "module declares no entry points".to_string(),
            },
        });
        return Err(diagnostics);
    }

    let mut writer = spv::Writer::new(&interner, &module);
    match writer.write(&Options::default()) {
        Ok(words) => {
            debug!("emitted {} SPIR-V words for {}", words.len(), path);
            Ok(words)
        }
        Err(err) => {
            diagnostics.push(Diagnostic {
                path: path.to_string(),
                span: Span::UNKNOWN,
                message: err.to_string(),
            });
            Err(diagnostics)
        }
    }
}

fn parse_diagnostic(path: &str, err: crate::front::ParseError) -> Diagnostic {
    use crate::front::LexError;
    let span = match &err {
        crate::front::ParseError::Lex(
            LexError::UnexpectedChar(_, s)
            | LexError::UnterminatedString(s)
            | LexError::UnterminatedBlockComment(s)
            | LexError::BadNumber(_, s),
        ) => *s,
        crate::front::ParseError::Unexpected { span, .. } => *span,
        crate::front::ParseError::BadArraySize(span) => *span,
    };
    Diagnostic {
        path: path.to_string(),
        span,
        message: err.to_string(),
    }
}

fn analysis_error_span(err: &crate::analysis::AnalysisError) -> Span {
    use crate::analysis::AnalysisError::*;
    match err {
        NameNotFound(_, s) => *s,
        Duplicate(_, _, s) => *s,
        TypeMismatch { span, .. } => *span,
        NotAssignable(s) => *s,
        BadArraySize(s) => *s,
        UnknownAttribute(_, s) => *s,
        BadAttributeArity(_, s) => *s,
        UnknownBuiltin(_, s) => *s,
        ArityMismatch(_, s, _, _) => *s,
        NotCallable(s) => *s,
        UnknownField(_, s) => *s,
        VarNeedsTypeOrInit(s) => *s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_parse_errors_as_diagnostics() {
        let err = compile("bad.dusk", "fn f( int {", None).unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn reports_missing_entry_point() {
        let src = "fn helper() int { return 1; }";
        let err = compile("no_entry.dusk", src, None).unwrap_err();
        assert!(err[0].message.contains("no entry points"));
    }

    #[test]
    fn compiles_a_trivial_vertex_shader() {
        let src = r#"
            [[stage(vertex)]]
            fn main([[location(0)]] pos: float4) [[builtin(position)]] float4 {
                return pos;
            }
        "#;
        let words = compile("trivial.dusk", src, None).unwrap();
        assert_eq!(words[0], 0x0723_0203);
    }
}
