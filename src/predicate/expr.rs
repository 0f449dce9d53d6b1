//! Predicate expression trees and the builder DSL that produces them.
//!
//! ```ignore
//! use entity_search::predicate::expr::{field, value};
//!
//! let p = field("code").eq("B001").or(field("pages").ge(100));
//! let q = value(vec!["B001", "B002"]).contains(field("code"));
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::model::Value;

/// A value computed when the predicate is compiled (a captured variable, a
/// nested call on non-field data, ...).
#[derive(Clone)]
pub struct Captured(Arc<dyn Fn() -> Value + Send + Sync>);

impl Captured {
    pub fn evaluate(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Captured(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// The operator seen from the other side (`a < b` is `b > a`).
    pub fn mirrored(self) -> Self {
        match self {
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    StartsWith,
    EndsWith,
    /// `text.contains(substring)` or `collection.contains(field)`.
    Contains,
    ContainedIn,
    Other(String),
}

impl Method {
    pub fn name(&self) -> &str {
        match self {
            Method::StartsWith => "starts_with",
            Method::EndsWith => "ends_with",
            Method::Contains => "contains",
            Method::ContainedIn => "contained_in",
            Method::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Field(String),
    Const(Value),
    Captured(Captured),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Call {
        method: Method,
        target: Box<Expr>,
        args: Vec<Expr>,
    },
}

pub fn field(name: impl Into<String>) -> Expr {
    Expr::Field(name.into())
}

pub fn value(v: impl Into<Value>) -> Expr {
    Expr::Const(v.into())
}

/// Defer a value until compile time.
pub fn captured<F>(f: F) -> Expr
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    Expr::Captured(Captured(Arc::new(f)))
}

impl Expr {
    /// Short description of the node shape, used in compiler errors.
    pub fn kind(&self) -> String {
        match self {
            Expr::Field(name) => format!("field access `{name}`"),
            Expr::Const(v) => format!("constant {}", v.kind()),
            Expr::Captured(_) => "captured value".to_string(),
            Expr::Binary { op, .. } => format!("binary `{}`", op.symbol()),
            Expr::Not(_) => "negation".to_string(),
            Expr::Call { method, .. } => format!("method call `{}`", method.name()),
        }
    }

    /// Constants and captured values; everything that is not tied to a field.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Const(_) | Expr::Captured(_))
    }

    pub fn compare(self, op: BinaryOp, other: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOp::Ne, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOp::Ge, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOp::Le, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.compare(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.compare(BinaryOp::Or, other)
    }

    pub fn negate(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn call(self, method: Method, args: Vec<Expr>) -> Expr {
        Expr::Call {
            method,
            target: Box::new(self),
            args,
        }
    }

    pub fn starts_with(self, prefix: impl Into<Expr>) -> Expr {
        self.call(Method::StartsWith, vec![prefix.into()])
    }

    pub fn ends_with(self, suffix: impl Into<Expr>) -> Expr {
        self.call(Method::EndsWith, vec![suffix.into()])
    }

    pub fn contains(self, item: impl Into<Expr>) -> Expr {
        self.call(Method::Contains, vec![item.into()])
    }

    pub fn contained_in(self, collection: impl Into<Expr>) -> Expr {
        self.call(Method::ContainedIn, vec![collection.into()])
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Const(v)
    }
}

macro_rules! const_expr_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Const(Value::from(v))
                }
            }
        )*
    };
}

const_expr_from!(&str, String, &String, bool, i32, i64, u32, f64, DateTime<Utc>);

impl<T: Into<Value>> From<Vec<T>> for Expr {
    fn from(v: Vec<T>) -> Self {
        Expr::Const(Value::from(v))
    }
}
