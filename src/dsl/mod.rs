//! Textual kernel definitions
//!
//! ```text
//! kernel sin_usecase(a0, out) { out = sin(a0); }
//! kernel scaled(x, y, out) { out = hypot(x, y) * 2.0 - 1; }
//! ```
//!
//! The last parameter is the output and the single statement must assign to
//! it. Bodies may use numbers, input parameters, `pi`, unary minus,
//! `+ - * /`, parentheses and calls to the supported math functions.

mod parser;

pub use parser::parse_kernel;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, MathFn, SourceFunction, call, param};
    use crate::error::CompilationError;
    use rstest::rstest;

    fn malformed(text: &str) -> String {
        match parse_kernel(text) {
            Err(CompilationError::MalformedSource(msg)) => msg,
            other => panic!("expected MalformedSource, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_matches_ufunc() {
        let parsed = parse_kernel("kernel sin_usecase(a0, out) { out = sin(a0); }").unwrap();
        let built = SourceFunction::ufunc(MathFn::Sin);
        assert_eq!(parsed, built);
        assert_eq!(parsed.id(), built.id());
    }

    #[test]
    fn test_display_parses_back() {
        for func in MathFn::ALL.iter() {
            let f = SourceFunction::ufunc(*func);
            assert_eq!(parse_kernel(&f.to_string()).unwrap(), f);
        }
    }

    #[test]
    fn test_precedence_and_unary_minus() {
        let f = parse_kernel("kernel k(x, y, out) { out = -x + y * 2 - (1.5 / x) }").unwrap();
        let expected = (-param(0) + param(1) * 2.0) - Expr::Const(1.5) / param(0);
        assert_eq!(f.body(), &expected);
        assert_eq!(f.inputs(), &["x".to_string(), "y".to_string()]);
        assert_eq!(f.output(), "out");
    }

    #[test]
    fn test_pi_comments_and_c_spellings() {
        let f = parse_kernel(
            "// degrees of a scaled angle\n\
             kernel k(x, out) {\n    out = degrees(x * pi) + atan2(x, 1e2);\n}",
        )
        .unwrap();
        let expected = call(MathFn::Degrees, vec![param(0) * std::f64::consts::PI])
            + call(MathFn::Arctan2, vec![param(0), Expr::Const(100.0)]);
        assert_eq!(f.body(), &expected);
    }

    #[test]
    fn test_parameter_shadows_pi() {
        let f = parse_kernel("kernel k(pi, out) { out = pi; }").unwrap();
        assert_eq!(f.body(), &param(0));
    }

    #[rstest]
    #[case("kernel k(x, out) { out = sine(x); }", "unknown function 'sine'")]
    #[case("kernel k(x, out) { out = sin(y); }", "unknown identifier 'y'")]
    #[case("kernel k(x, out) { x = sin(x); }", "is not the output parameter")]
    #[case("kernel k(x, out) { out = out + x; }", "cannot be read")]
    #[case("kernel k(x, x, out) { out = x; }", "duplicate parameter 'x'")]
    #[case("kernel k(x, out) { out = hypot(x); }", "hypot takes 2 argument(s), got 1")]
    fn test_semantic_errors(#[case] text: &str, #[case] needle: &str) {
        let msg = malformed(text);
        assert!(msg.contains(needle), "{}", msg);
        assert!(msg.starts_with("line 1, column "), "{}", msg);
    }

    #[test]
    fn test_syntax_error_has_position() {
        let msg = malformed("kernel k(x, out) {\n  out = sin(x) +;\n}");
        assert!(msg.starts_with("line 2, column "), "{}", msg);
    }

    #[test]
    fn test_source_function_parse() {
        let f = SourceFunction::parse("kernel tan_usecase(a0, out) { out = tan(a0); }").unwrap();
        assert_eq!(f, SourceFunction::ufunc(MathFn::Tan));
        assert!(SourceFunction::parse("kernel broken(").is_err());
    }
}
