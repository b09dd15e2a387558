//! Compiled Program Shape
//!
//! The render transaction executes an opaque, already-compiled template
//! program. The compiler that produces it lives elsewhere; this module
//! pins down the shape the two sides agree on.
//!
//! A program is a tree of ops. Element ops are flat and bracketed
//! (`OpenElement` .. `CloseElement`); list ops carry their body as a
//! nested op sequence evaluated once per item.

use std::sync::Arc;

use crate::value::Value;

/// Where a path expression starts resolving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathHead {
    /// The component root value.
    This,
    /// The current list item. Only valid inside a list body.
    Item,
    /// The current item's positional companion (index or map key).
    ItemMemo,
}

/// An expression evaluated against the current scope.
#[derive(Clone, Debug)]
pub enum Expr {
    /// A fixed value.
    Literal(Value),
    /// A property path: head value, then one property hop per part.
    Path {
        head: PathHead,
        parts: Vec<String>,
    },
    /// A registered helper applied to argument expressions.
    Helper {
        name: String,
        positional: Vec<Expr>,
        named: Vec<(String, Expr)>,
    },
}

impl Expr {
    /// A literal value expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// A path rooted at the component (`this.a.b`).
    pub fn this<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::Path {
            head: PathHead::This,
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// A path rooted at the current list item.
    pub fn item<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::Path {
            head: PathHead::Item,
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// The current item's index or map key.
    pub fn item_memo() -> Self {
        Expr::Path {
            head: PathHead::ItemMemo,
            parts: Vec::new(),
        }
    }

    /// A helper invocation.
    pub fn helper(
        name: impl Into<String>,
        positional: Vec<Expr>,
        named: Vec<(String, Expr)>,
    ) -> Self {
        Expr::Helper {
            name: name.into(),
            positional,
            named,
        }
    }
}

/// One instruction of a compiled template.
#[derive(Clone, Debug)]
pub enum Op {
    /// Create an element and make it current.
    OpenElement { tag: String },
    /// Close the current element.
    CloseElement,
    /// Append fixed text.
    StaticText { text: String },
    /// Append a text node bound to an expression.
    DynamicText { expr: Expr },
    /// Set a fixed attribute on the current element.
    StaticAttr { name: String, value: String },
    /// Bind an attribute of the current element to an expression.
    DynamicAttr { name: String, expr: Expr },
    /// Render `body` once per item of the collection `expr` resolves
    /// to, matched across passes by `key`.
    List {
        expr: Expr,
        key: String,
        body: Arc<Vec<Op>>,
    },
}

/// A compiled template, ready to drain.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub ops: Arc<Vec<Op>>,
}

impl Program {
    /// Wrap a compiled op sequence.
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops: Arc::new(ops) }
    }

    /// Total op count, counting list bodies once.
    pub fn len(&self) -> usize {
        fn count(ops: &[Op]) -> usize {
            ops.iter()
                .map(|op| match op {
                    Op::List { body, .. } => 1 + count(body),
                    _ => 1,
                })
                .sum()
        }
        count(&self.ops)
    }

    /// Whether the program has no ops.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_counts_list_bodies() {
        let program = Program::new(vec![
            Op::OpenElement {
                tag: "ul".to_string(),
            },
            Op::List {
                expr: Expr::this(["items"]),
                key: "@index".to_string(),
                body: Arc::new(vec![Op::DynamicText {
                    expr: Expr::item(Vec::<String>::new()),
                }]),
            },
            Op::CloseElement,
        ]);

        assert_eq!(program.len(), 4);
        assert!(!program.is_empty());
    }
}
