//! Lowering of predicate expressions to [`QueryNode`]s.
//!
//! Dispatch is on node shape only. Every operand is normalized through the
//! owning [`FieldDescriptor`] so compiled terms line up with indexed ones.

use super::expr::{BinaryOp, Expr, Method};
use super::node::{QueryNode, TermValue, escape_wildcard};
use crate::error::{Result, SearchError};
use crate::model::{EntitySearchDescriptor, FieldDescriptor, Value};

/// Compile `expr` against the fields of `descriptor`.
pub fn compile(descriptor: &EntitySearchDescriptor, expr: &Expr) -> Result<QueryNode> {
    Compiler { descriptor }.lower(expr)
}

struct Compiler<'a> {
    descriptor: &'a EntitySearchDescriptor,
}

impl Compiler<'_> {
    fn lower(&self, expr: &Expr) -> Result<QueryNode> {
        match expr {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => Ok(QueryNode::must(vec![self.lower(left)?, self.lower(right)?])),
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => Ok(QueryNode::should(vec![
                self.lower(left)?,
                self.lower(right)?,
            ])),
            Expr::Binary { op, left, right } => self.comparison(*op, left, right),
            Expr::Call {
                method,
                target,
                args,
            } => self.call(method, target, args),
            other => Err(SearchError::Unsupported(format!(
                "{} in predicate position",
                other.kind()
            ))),
        }
    }

    fn resolve(&self, name: &str) -> Result<&FieldDescriptor> {
        let fd = self.descriptor.require_field(name)?;
        if !fd.is_indexed() {
            return Err(SearchError::FieldNotIndexed {
                entity: self.descriptor.entity_type().to_string(),
                field: name.to_string(),
            });
        }
        Ok(fd)
    }

    fn comparison(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<QueryNode> {
        let (name, op, operand) = match (left, right) {
            (Expr::Field(name), c) if c.is_constant() => (name, op, constant(c)),
            (c, Expr::Field(name)) if c.is_constant() => (name, op.mirrored(), constant(c)),
            _ => {
                return Err(SearchError::Unsupported(format!(
                    "`{}` between {} and {}",
                    op.symbol(),
                    left.kind(),
                    right.kind()
                )));
            }
        };
        if op == BinaryOp::Ne {
            return Err(SearchError::Unsupported(format!(
                "`!=` on field `{name}`"
            )));
        }

        let fd = self.resolve(name)?;
        let value = if fd.is_numeric() {
            TermValue::Int(fd.coerce_numeric(&operand)?)
        } else {
            TermValue::Text(text_operand(fd, &operand)?)
        };

        if op == BinaryOp::Eq {
            return Ok(if fd.is_numeric() {
                point_range(&fd.name, value)
            } else {
                QueryNode::Term {
                    field: fd.name.clone(),
                    value,
                }
            });
        }

        let field = fd.name.clone();
        Ok(match op {
            BinaryOp::Gt | BinaryOp::Ge => QueryNode::Range {
                field,
                lower: Some(value),
                upper: None,
                include_lower: op == BinaryOp::Ge,
                include_upper: false,
            },
            _ => QueryNode::Range {
                field,
                lower: None,
                upper: Some(value),
                include_lower: false,
                include_upper: op == BinaryOp::Le,
            },
        })
    }

    fn call(&self, method: &Method, target: &Expr, args: &[Expr]) -> Result<QueryNode> {
        let unsupported = || {
            SearchError::Unsupported(format!(
                "`{}` on {} with {} argument(s)",
                method.name(),
                target.kind(),
                args.len()
            ))
        };
        let [arg] = args else {
            return Err(unsupported());
        };

        match (method, target, arg) {
            (Method::Contains, collection, Expr::Field(name)) if collection.is_constant() => {
                self.membership(name, constant(collection))
            }
            (Method::ContainedIn, Expr::Field(name), collection) if collection.is_constant() => {
                self.membership(name, constant(collection))
            }
            (
                Method::StartsWith | Method::EndsWith | Method::Contains,
                Expr::Field(name),
                operand,
            ) if operand.is_constant() => self.pattern(method, name, constant(operand)),
            _ => Err(unsupported()),
        }
    }

    fn pattern(&self, method: &Method, name: &str, operand: Value) -> Result<QueryNode> {
        let fd = self.resolve(name)?;
        if fd.is_numeric() {
            return Err(SearchError::Unsupported(format!(
                "`{}` on numeric field `{name}`",
                method.name()
            )));
        }
        let text = text_operand(fd, &operand)?;
        if text.is_empty() {
            return Err(SearchError::InvalidOperand {
                field: name.to_string(),
                reason: format!("`{}` needs a non-empty operand", method.name()),
            });
        }

        let field = fd.name.clone();
        Ok(match method {
            Method::StartsWith => QueryNode::Prefix { field, value: text },
            Method::EndsWith => QueryNode::Wildcard {
                field,
                pattern: format!("*{}", escape_wildcard(&text)),
            },
            _ => QueryNode::Wildcard {
                field,
                pattern: format!("*{}*", escape_wildcard(&text)),
            },
        })
    }

    fn membership(&self, name: &str, collection: Value) -> Result<QueryNode> {
        let fd = self.resolve(name)?;
        let kind = collection.kind();
        let Value::List(items) = collection else {
            return Err(SearchError::Unsupported(format!(
                "membership test on field `{name}` against a {kind} value"
            )));
        };

        let present = items.into_iter().filter(|v| match v {
            Value::Null => false,
            Value::Text(s) => !s.trim().is_empty(),
            _ => true,
        });

        if fd.is_numeric() {
            let points = present
                .map(|v| -> Result<QueryNode> {
                    Ok(point_range(&fd.name, TermValue::Int(fd.coerce_numeric(&v)?)))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(QueryNode::should(points));
        }

        let values = present
            .map(|v| text_operand(fd, &v).map(TermValue::Text))
            .collect::<Result<Vec<_>>>()?;
        if values.is_empty() {
            return Ok(QueryNode::nothing());
        }
        Ok(QueryNode::MultiTerm {
            field: fd.name.clone(),
            values,
            match_any: true,
        })
    }
}

fn constant(expr: &Expr) -> Value {
    match expr {
        Expr::Const(v) => v.clone(),
        Expr::Captured(c) => c.evaluate(),
        _ => Value::Null,
    }
}

fn text_operand(fd: &FieldDescriptor, value: &Value) -> Result<String> {
    value
        .to_index_string()
        .map(|s| fd.normalize(&s))
        .ok_or_else(|| SearchError::InvalidOperand {
            field: fd.name.clone(),
            reason: format!("cannot compare against a {} value", value.kind()),
        })
}

fn point_range(field: &str, value: TermValue) -> QueryNode {
    QueryNode::Range {
        field: field.to_string(),
        lower: Some(value.clone()),
        upper: Some(value),
        include_lower: true,
        include_upper: true,
    }
}
