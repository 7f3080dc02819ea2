use super::{Expr, MathFn};
use std::ops::{Add, Div, Mul, Neg, Sub};

// Operator overloading for Expr with Into<Expr> abstraction

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;

    fn add(self, rhs: T) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs.into()))
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Expr;

    fn sub(self, rhs: T) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs.into()))
    }
}

impl<T: Into<Expr>> Mul<T> for Expr {
    type Output = Expr;

    fn mul(self, rhs: T) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs.into()))
    }
}

impl<T: Into<Expr>> Div<T> for Expr {
    type Output = Expr;

    fn div(self, rhs: T) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs.into()))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl From<f32> for Expr {
    fn from(value: f32) -> Self {
        Expr::Const(value as f64)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Const(value as f64)
    }
}

// Reverse operations: numeric + Expr
macro_rules! impl_reverse_ops {
    ($ty:ty) => {
        impl Add<Expr> for $ty {
            type Output = Expr;
            fn add(self, rhs: Expr) -> Expr {
                Expr::from(self) + rhs
            }
        }

        impl Sub<Expr> for $ty {
            type Output = Expr;
            fn sub(self, rhs: Expr) -> Expr {
                Expr::from(self) - rhs
            }
        }

        impl Mul<Expr> for $ty {
            type Output = Expr;
            fn mul(self, rhs: Expr) -> Expr {
                Expr::from(self) * rhs
            }
        }

        impl Div<Expr> for $ty {
            type Output = Expr;
            fn div(self, rhs: Expr) -> Expr {
                Expr::from(self) / rhs
            }
        }
    };
}

impl_reverse_ops!(f64);
impl_reverse_ops!(f32);
impl_reverse_ops!(i32);

/// Reference to input parameter `index`
pub fn param(index: usize) -> Expr {
    Expr::Param(index)
}

pub fn constant(value: f64) -> Expr {
    Expr::Const(value)
}

/// Call `func` with `args`. Arity is checked by the compiler, not here.
pub fn call(func: MathFn, args: Vec<Expr>) -> Expr {
    Expr::Call(func, args)
}
