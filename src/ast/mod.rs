//! Source-level representation of numeric kernels
//!
//! A kernel is written as a [`SourceFunction`]: named input parameters, one
//! output parameter and a single expression assigned to the output. The
//! expression tree ([`Expr`]) is what the compiler type-checks and lowers.

mod function;
mod math;
mod ops;
mod types;

pub use function::{FunctionId, SourceFunction};
pub use math::{FnClass, MathFn};
pub use ops::{call, constant, param};
pub use types::ElementKind;

use std::hash::{Hash, Hasher};

/// Expression node of a kernel body
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to the input parameter at this position
    Param(usize),
    Const(f64),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Call(MathFn, Vec<Expr>),
}

impl Expr {
    /// Direct children of this node
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Param(_) | Expr::Const(_) => vec![],
            Expr::Neg(x) => vec![x.as_ref()],
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                vec![a.as_ref(), b.as_ref()]
            }
            Expr::Call(_, args) => args.iter().collect(),
        }
    }

    /// Visit every node in post-order
    pub fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        for child in self.children() {
            child.visit(f);
        }
        f(self);
    }

    /// Whether any call in this tree targets `func`
    pub fn calls(&self, func: MathFn) -> bool {
        let mut found = false;
        self.visit(&mut |node| {
            if let Expr::Call(f, _) = node
                && *f == func
            {
                found = true;
            }
        });
        found
    }

    /// Sorted, deduplicated parameter indices referenced by this tree
    pub fn referenced_params(&self) -> Vec<usize> {
        let mut params = Vec::new();
        self.visit(&mut |node| {
            if let Expr::Param(i) = node {
                params.push(*i);
            }
        });
        params.sort_unstable();
        params.dedup();
        params
    }

    /// Render as kernel-language text using the given parameter names.
    ///
    /// Unknown parameter indices render as `$N`.
    pub fn render(&self, names: &[String]) -> String {
        match self {
            Expr::Param(i) => names.get(*i).cloned().unwrap_or_else(|| format!("${}", i)),
            Expr::Const(v) => render_float(*v),
            Expr::Neg(x) => format!("-({})", x.render(names)),
            Expr::Add(a, b) => format!("({} + {})", a.render(names), b.render(names)),
            Expr::Sub(a, b) => format!("({} - {})", a.render(names), b.render(names)),
            Expr::Mul(a, b) => format!("({} * {})", a.render(names), b.render(names)),
            Expr::Div(a, b) => format!("({} / {})", a.render(names), b.render(names)),
            Expr::Call(f, args) => {
                let args: Vec<String> = args.iter().map(|a| a.render(names)).collect();
                format!("{}({})", f.name(), args.join(", "))
            }
        }
    }

    pub(crate) fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Expr::Param(i) => i.hash(state),
            Expr::Const(v) => v.to_bits().hash(state),
            Expr::Call(f, args) => {
                f.hash(state);
                args.len().hash(state);
                for arg in args {
                    arg.hash_into(state);
                }
            }
            _ => {
                for child in self.children() {
                    child.hash_into(state);
                }
            }
        }
    }
}

/// Format a float so that it reads back as a number literal
pub(crate) fn render_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{:?}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_params() {
        let e = call(MathFn::Hypot, vec![param(1), param(0)]) * param(1);
        assert_eq!(e.referenced_params(), vec![0, 1]);
    }

    #[test]
    fn test_calls() {
        let e = call(MathFn::Sin, vec![call(MathFn::Arctanh, vec![param(0)])]);
        assert!(e.calls(MathFn::Arctanh));
        assert!(!e.calls(MathFn::Cos));
    }

    #[test]
    fn test_render() {
        let names = vec!["x".to_string(), "y".to_string()];
        let e = call(MathFn::Arctan2, vec![param(0), param(1)]) * 2.0;
        assert_eq!(e.render(&names), "(arctan2(x, y) * 2.0)");
        assert_eq!(Expr::Param(7).render(&names), "$7");
    }
}
