//! Kernel source parser using pest

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::{Expr, MathFn, SourceFunction};
use crate::error::CompilationError;

#[derive(Parser)]
#[grammar = "dsl/grammar.pest"]
struct KernelParser;

type ParseResult<T> = Result<T, CompilationError>;

/// Parse one `kernel name(params..., out) { out = expr; }` definition
pub fn parse_kernel(source: &str) -> ParseResult<SourceFunction> {
    let mut pairs = KernelParser::parse(Rule::program, source).map_err(from_pest_error)?;
    let program = next_pair(&mut pairs, "kernel definition")?;
    let kernel = next_pair(&mut program.into_inner(), "kernel definition")?;
    parse_kernel_def(kernel)
}

fn parse_kernel_def(pair: Pair<Rule>) -> ParseResult<SourceFunction> {
    let mut inner = pair.into_inner();
    next_pair(&mut inner, "'kernel'")?;
    let name = next_pair(&mut inner, "kernel name")?.as_str().to_string();

    let param_pair = next_pair(&mut inner, "parameter list")?;
    let mut params: Vec<String> = Vec::new();
    for ident in param_pair.into_inner() {
        let param = ident.as_str().to_string();
        if params.contains(&param) {
            return Err(error_at(&ident, format!("duplicate parameter '{}'", param)));
        }
        params.push(param);
    }
    let Some(output) = params.pop() else {
        return Err(CompilationError::MalformedSource(format!(
            "kernel {} has no output parameter",
            name
        )));
    };

    let assignment = next_pair(&mut inner, "assignment")?;
    let mut parts = assignment.into_inner();
    let target = next_pair(&mut parts, "assignment target")?;
    if target.as_str() != output {
        return Err(error_at(
            &target,
            format!(
                "assignment target '{}' is not the output parameter '{}'",
                target.as_str(),
                output
            ),
        ));
    }

    let scope = Scope {
        inputs: &params,
        output: &output,
    };
    let body = scope.parse_expr(next_pair(&mut parts, "expression")?)?;
    log::trace!("parsed kernel {} with {} inputs", name, params.len());
    Ok(SourceFunction::new(name, params, output, body))
}

/// Names visible inside a kernel body
struct Scope<'a> {
    inputs: &'a [String],
    output: &'a str,
}

impl Scope<'_> {
    fn parse_expr(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let mut inner = pair.into_inner();
        let mut lhs = self.parse_term(next_pair(&mut inner, "term")?)?;

        while let Some(op_pair) = inner.next() {
            let rhs = self.parse_term(next_pair(&mut inner, "term")?)?;
            lhs = match op_pair.as_str() {
                "+" => lhs + rhs,
                "-" => lhs - rhs,
                other => return Err(error_at(&op_pair, format!("unknown operator '{}'", other))),
            };
        }

        Ok(lhs)
    }

    fn parse_term(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let mut inner = pair.into_inner();
        let mut lhs = self.parse_unary(next_pair(&mut inner, "operand")?)?;

        while let Some(op_pair) = inner.next() {
            let rhs = self.parse_unary(next_pair(&mut inner, "operand")?)?;
            lhs = match op_pair.as_str() {
                "*" => lhs * rhs,
                "/" => lhs / rhs,
                other => return Err(error_at(&op_pair, format!("unknown operator '{}'", other))),
            };
        }

        Ok(lhs)
    }

    fn parse_unary(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let mut inner = pair.into_inner().peekable();

        if inner.peek().map(|p| p.as_rule()) == Some(Rule::neg_op) {
            inner.next();
            let operand = self.parse_unary(next_pair(&mut inner, "operand")?)?;
            return Ok(-operand);
        }

        self.parse_primary(next_pair(&mut inner, "operand")?)
    }

    fn parse_primary(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let inner = next_pair(&mut pair.into_inner(), "operand")?;
        match inner.as_rule() {
            Rule::number => inner
                .as_str()
                .parse::<f64>()
                .map(Expr::Const)
                .map_err(|e| error_at(&inner, format!("invalid number: {}", e))),
            Rule::func_call => self.parse_func_call(inner),
            Rule::ident => self.resolve(&inner),
            Rule::expr => self.parse_expr(inner),
            rule => Err(error_at(&inner, format!("unexpected {:?}", rule))),
        }
    }

    fn parse_func_call(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let mut inner = pair.into_inner();
        let name_pair = next_pair(&mut inner, "function name")?;
        let Some(func) = MathFn::from_name(name_pair.as_str()) else {
            return Err(error_at(
                &name_pair,
                format!("unknown function '{}'", name_pair.as_str()),
            ));
        };

        let mut args = Vec::new();
        if let Some(arg_list) = inner.next() {
            for arg in arg_list.into_inner() {
                args.push(self.parse_expr(arg)?);
            }
        }
        if args.len() != func.arity() {
            return Err(error_at(
                &name_pair,
                format!(
                    "{} takes {} argument(s), got {}",
                    func.name(),
                    func.arity(),
                    args.len()
                ),
            ));
        }
        Ok(Expr::Call(func, args))
    }

    fn resolve(&self, pair: &Pair<Rule>) -> ParseResult<Expr> {
        let name = pair.as_str();
        if let Some(index) = self.inputs.iter().position(|p| p == name) {
            return Ok(Expr::Param(index));
        }
        if name == self.output {
            return Err(error_at(
                pair,
                format!("output parameter '{}' cannot be read", name),
            ));
        }
        if name == "pi" {
            return Ok(Expr::Const(std::f64::consts::PI));
        }
        Err(error_at(pair, format!("unknown identifier '{}'", name)))
    }
}

fn next_pair<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| CompilationError::MalformedSource(format!("expected {}", what)))
}

fn error_at(pair: &Pair<Rule>, message: String) -> CompilationError {
    let (line, column) = pair.line_col();
    CompilationError::MalformedSource(format!("line {}, column {}: {}", line, column, message))
}

fn from_pest_error(err: pest::error::Error<Rule>) -> CompilationError {
    let (line, column) = match err.line_col {
        pest::error::LineColLocation::Pos((l, c)) => (l, c),
        pest::error::LineColLocation::Span((l, c), _) => (l, c),
    };
    CompilationError::MalformedSource(format!(
        "line {}, column {}: {}",
        line,
        column,
        err.variant.message()
    ))
}
