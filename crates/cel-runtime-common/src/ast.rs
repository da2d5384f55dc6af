//! Checked expression trees.
//!
//! The runtime does not parse or type-check CEL source; an external checker
//! produces the tree defined here and hands it to the planner. Every node
//! carries an integer id assigned by the producer; ids key the optional type
//! and reference maps and surface in step traces and error messages.
//!
//! The [`builder`] module assigns ids automatically and is the intended way
//! to construct trees in tests and descriptor-free embedders.

use std::collections::HashMap;

use crate::CelType;

/// An expression node with its producer-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    /// Unique identifier for this node. Synthetic nodes use -1.
    pub id: i64,
    pub expr: Expr,
}

impl AstNode {
    pub fn new(id: i64, expr: Expr) -> Self {
        Self { id, expr }
    }
}

/// A checked CEL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal constant.
    Const(Constant),
    /// Identifier reference, possibly qualified (`a.b.c` after resolution).
    Ident(String),
    /// Field selection or presence test on an operand.
    Select {
        operand: Box<AstNode>,
        field: String,
        /// True for `has(operand.field)`.
        test_only: bool,
    },
    /// Function or method call.
    Call {
        function: String,
        /// Receiver for method-style calls (`target.function(args)`).
        target: Option<Box<AstNode>>,
        args: Vec<AstNode>,
    },
    /// List construction.
    CreateList { elements: Vec<AstNode> },
    /// Map construction from key/value pairs.
    CreateMap { entries: Vec<MapEntryNode> },
    /// Record construction by fully qualified type name.
    CreateRecord {
        type_name: String,
        fields: Vec<FieldNode>,
    },
    /// Bounded iteration, produced by macro expansion in the checker.
    ///
    /// Semantics:
    /// ```text
    /// accu_var = accu_init
    /// for (iter_var in iter_range) {
    ///     if (!loop_condition) break
    ///     accu_var = loop_step
    /// }
    /// return result
    /// ```
    Comprehension {
        iter_var: String,
        iter_range: Box<AstNode>,
        accu_var: String,
        accu_init: Box<AstNode>,
        loop_condition: Box<AstNode>,
        loop_step: Box<AstNode>,
        result: Box<AstNode>,
    },
}

/// One entry of a map construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntryNode {
    pub key: AstNode,
    pub value: AstNode,
}

/// One field of a record construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub value: AstNode,
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// Resolution information the checker attaches to a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reference {
    /// Resolved fully qualified name for identifiers.
    pub name: Option<String>,
    /// Candidate overload ids for calls. Empty means the planner must defer
    /// overload selection to run time.
    pub overload_ids: Vec<String>,
}

/// A checked AST: the expression tree plus the checker's annotations.
///
/// Both maps are optional per node; missing type information forces the
/// planner to defer overload resolution to run time.
#[derive(Debug, Clone, Default)]
pub struct CheckedAst {
    pub root: Option<AstNode>,
    /// Static type per node id.
    pub type_map: HashMap<i64, CelType>,
    /// Reference resolution per node id.
    pub reference_map: HashMap<i64, Reference>,
}

impl CheckedAst {
    /// Wrap a bare expression tree with no annotations.
    pub fn from_root(root: AstNode) -> Self {
        Self {
            root: Some(root),
            type_map: HashMap::new(),
            reference_map: HashMap::new(),
        }
    }

    /// The static type of a node, if the checker recorded one.
    pub fn node_type(&self, id: i64) -> Option<&CelType> {
        self.type_map.get(&id)
    }

    /// The reference resolution of a node, if the checker recorded one.
    pub fn reference(&self, id: i64) -> Option<&Reference> {
        self.reference_map.get(&id)
    }
}

/// Expression construction with automatic id assignment.
pub mod builder {
    use super::*;
    use std::cell::Cell;

    /// Builds [`AstNode`] trees, handing out sequential ids.
    ///
    /// The checker reserves id 0; the builder starts at 1, matching the
    /// convention external producers follow.
    #[derive(Debug, Default)]
    pub struct AstBuilder {
        next_id: Cell<i64>,
    }

    impl AstBuilder {
        pub fn new() -> Self {
            Self {
                next_id: Cell::new(0),
            }
        }

        fn next(&self) -> i64 {
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            id
        }

        fn node(&self, expr: Expr) -> AstNode {
            AstNode::new(self.next(), expr)
        }

        pub fn null(&self) -> AstNode {
            self.node(Expr::Const(Constant::Null))
        }

        pub fn bool(&self, v: bool) -> AstNode {
            self.node(Expr::Const(Constant::Bool(v)))
        }

        pub fn int(&self, v: i64) -> AstNode {
            self.node(Expr::Const(Constant::Int(v)))
        }

        pub fn uint(&self, v: u64) -> AstNode {
            self.node(Expr::Const(Constant::Uint(v)))
        }

        pub fn double(&self, v: f64) -> AstNode {
            self.node(Expr::Const(Constant::Double(v)))
        }

        pub fn string(&self, v: &str) -> AstNode {
            self.node(Expr::Const(Constant::String(v.to_string())))
        }

        pub fn bytes(&self, v: &[u8]) -> AstNode {
            self.node(Expr::Const(Constant::Bytes(v.to_vec())))
        }

        pub fn ident(&self, name: &str) -> AstNode {
            self.node(Expr::Ident(name.to_string()))
        }

        pub fn select(&self, operand: AstNode, field: &str) -> AstNode {
            self.node(Expr::Select {
                operand: Box::new(operand),
                field: field.to_string(),
                test_only: false,
            })
        }

        pub fn has(&self, operand: AstNode, field: &str) -> AstNode {
            self.node(Expr::Select {
                operand: Box::new(operand),
                field: field.to_string(),
                test_only: true,
            })
        }

        /// Global (free-function) call.
        pub fn call(&self, function: &str, args: Vec<AstNode>) -> AstNode {
            self.node(Expr::Call {
                function: function.to_string(),
                target: None,
                args,
            })
        }

        /// Receiver-style method call.
        pub fn method(&self, target: AstNode, function: &str, args: Vec<AstNode>) -> AstNode {
            self.node(Expr::Call {
                function: function.to_string(),
                target: Some(Box::new(target)),
                args,
            })
        }

        pub fn list(&self, elements: Vec<AstNode>) -> AstNode {
            self.node(Expr::CreateList { elements })
        }

        pub fn map(&self, entries: Vec<(AstNode, AstNode)>) -> AstNode {
            self.node(Expr::CreateMap {
                entries: entries
                    .into_iter()
                    .map(|(key, value)| MapEntryNode { key, value })
                    .collect(),
            })
        }

        pub fn record(&self, type_name: &str, fields: Vec<(&str, AstNode)>) -> AstNode {
            self.node(Expr::CreateRecord {
                type_name: type_name.to_string(),
                fields: fields
                    .into_iter()
                    .map(|(name, value)| FieldNode {
                        name: name.to_string(),
                        value,
                    })
                    .collect(),
            })
        }

        #[allow(clippy::too_many_arguments)]
        pub fn comprehension(
            &self,
            iter_var: &str,
            iter_range: AstNode,
            accu_var: &str,
            accu_init: AstNode,
            loop_condition: AstNode,
            loop_step: AstNode,
            result: AstNode,
        ) -> AstNode {
            self.node(Expr::Comprehension {
                iter_var: iter_var.to_string(),
                iter_range: Box::new(iter_range),
                accu_var: accu_var.to_string(),
                accu_init: Box::new(accu_init),
                loop_condition: Box::new(loop_condition),
                loop_step: Box::new(loop_step),
                result: Box::new(result),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::builder::AstBuilder;
    use super::*;
    use crate::operators;

    #[test]
    fn builder_assigns_unique_ids() {
        let b = AstBuilder::new();
        let expr = b.call(operators::ADD, vec![b.int(1), b.int(2)]);

        let mut ids = Vec::new();
        collect_ids(&expr, &mut ids);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| *id > 0));
    }

    #[test]
    fn checked_ast_annotations() {
        let b = AstBuilder::new();
        let root = b.ident("x");
        let id = root.id;

        let mut ast = CheckedAst::from_root(root);
        ast.type_map.insert(id, CelType::Int);
        ast.reference_map.insert(
            id,
            Reference {
                name: Some("x".to_string()),
                overload_ids: vec![],
            },
        );

        assert_eq!(ast.node_type(id), Some(&CelType::Int));
        assert_eq!(ast.reference(id).unwrap().name.as_deref(), Some("x"));
        assert_eq!(ast.node_type(999), None);
    }

    fn collect_ids(node: &AstNode, out: &mut Vec<i64>) {
        out.push(node.id);
        match &node.expr {
            Expr::Const(_) | Expr::Ident(_) => {}
            Expr::Select { operand, .. } => collect_ids(operand, out),
            Expr::Call { target, args, .. } => {
                if let Some(t) = target {
                    collect_ids(t, out);
                }
                for arg in args {
                    collect_ids(arg, out);
                }
            }
            Expr::CreateList { elements } => {
                for e in elements {
                    collect_ids(e, out);
                }
            }
            Expr::CreateMap { entries } => {
                for e in entries {
                    collect_ids(&e.key, out);
                    collect_ids(&e.value, out);
                }
            }
            Expr::CreateRecord { fields, .. } => {
                for f in fields {
                    collect_ids(&f.value, out);
                }
            }
            Expr::Comprehension {
                iter_range,
                accu_init,
                loop_condition,
                loop_step,
                result,
                ..
            } => {
                collect_ids(iter_range, out);
                collect_ids(accu_init, out);
                collect_ids(loop_condition, out);
                collect_ids(loop_step, out);
                collect_ids(result, out);
            }
        }
    }
}
