// Abstract syntax tree for JSONata expressions
// Immutable once parsed; lambdas and transforms are Arc-shared so closures
// can hold on to their definitions

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::signature::Signature;

/// Stages attached to a path step, applied to the step's own results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    /// Predicate `[expr]`
    Filter(AstNode),
    /// Positional binding `#$var` placed after a predicate
    Index(String),
}

/// A step in a path expression with optional stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// The main step node (field name, wildcard, block, constructor, ...)
    pub node: AstNode,
    /// Predicates and index bindings applied during this step
    pub stages: Vec<Stage>,
    /// `#$var` directly on the step
    pub index: Option<String>,
    /// The step binds positional variables, switching the path to tuple evaluation
    pub tuple: bool,
}

/// `a.b[c].d{k: v}`: steps evaluated left to right, each over the results
/// of the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathExpr {
    pub steps: Vec<PathStep>,
    /// Set by a `[]` suffix on any step
    pub keep_singleton: bool,
    /// Trailing `{key: value}` grouping over the path result
    pub group: Option<Vec<(AstNode, AstNode)>>,
}

/// One term of `^(<a, >b)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortTerm {
    pub expr: AstNode,
    pub descending: bool,
}

/// `function($a, $b)<nn:n> { body }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaDef {
    pub params: Vec<String>,
    pub signature: Option<Signature>,
    pub body: AstNode,
}

/// `| pattern | update, delete |`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDef {
    pub pattern: AstNode,
    pub update: AstNode,
    pub delete: Option<AstNode>,
}

/// AST Node types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstNode {
    /// String literal (e.g., "hello", 'world')
    String(String),

    /// Number literal
    Number(f64),

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    /// Regex literal `/pattern/flags`, validated at parse time
    Regex { pattern: String, flags: String },

    /// Field name; only ever evaluated as a path step
    Name(String),

    /// `$name`; the empty name is the context value, `$` the root input
    Variable(String),

    /// `*`
    Wildcard,

    /// `**`
    Descendant,

    /// Path expression (e.g., foo.bar)
    Path(PathExpr),

    /// Predicates on a non-path expression (`$[0]`, `(a.b)[1]`, `$[]`)
    Filter {
        input: Box<AstNode>,
        predicates: Vec<AstNode>,
        keep_array: bool,
    },

    /// Grouping on a non-path expression: `expr{key: value}`
    Group {
        input: Box<AstNode>,
        pairs: Vec<(AstNode, AstNode)>,
    },

    /// `^(...)` as a path step
    Sort(Vec<SortTerm>),

    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<AstNode>,
        rhs: Box<AstNode>,
    },

    /// Unary minus on a non-literal
    Negate(Box<AstNode>),

    /// Array constructor; `cons` keeps its structure when used as a path step
    Array { items: Vec<AstNode>, cons: bool },

    /// Object constructor `{key: value, ...}` over the context
    Object(Vec<(AstNode, AstNode)>),

    /// Block expression `(a; b; c)`
    Block(Vec<AstNode>),

    /// Conditional expression (? :)
    Conditional {
        condition: Box<AstNode>,
        then_branch: Box<AstNode>,
        else_branch: Option<Box<AstNode>>,
    },

    /// `$name := value`
    Bind { name: String, value: Box<AstNode> },

    /// `lhs ~> rhs`
    Apply { lhs: Box<AstNode>, rhs: Box<AstNode> },

    /// Function call; the procedure is usually a variable
    Function {
        procedure: Box<AstNode>,
        args: Vec<AstNode>,
    },

    /// Call with `?` placeholders, producing a new function
    Partial {
        procedure: Box<AstNode>,
        args: Vec<AstNode>,
    },

    /// `?` inside a partial application's argument list
    Placeholder,

    /// Lambda function definition
    Lambda(Arc<LambdaDef>),

    /// Transform operator, evaluating to a single-argument function
    Transform(Arc<TransformDef>),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,

    // Logical
    And,
    Or,

    // String
    Concatenate,

    // Range
    Range,

    // Defaults
    Coalesce, // ??
    Default,  // ?:
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::In => "in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Concatenate => "&",
            BinaryOp::Range => "..",
            BinaryOp::Coalesce => "??",
            BinaryOp::Default => "?:",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl PathStep {
    /// Create a path step from a node without stages
    pub fn new(node: AstNode) -> Self {
        PathStep {
            node,
            stages: Vec::new(),
            index: None,
            tuple: false,
        }
    }

    pub fn filters(&self) -> impl Iterator<Item = &AstNode> {
        self.stages.iter().filter_map(|stage| match stage {
            Stage::Filter(node) => Some(node),
            Stage::Index(_) => None,
        })
    }
}

impl PathExpr {
    pub fn single(step: PathStep) -> Self {
        PathExpr {
            steps: vec![step],
            keep_singleton: false,
            group: None,
        }
    }
}

impl AstNode {
    /// Create a string literal node
    pub fn string(s: impl Into<String>) -> Self {
        AstNode::String(s.into())
    }

    /// Create a variable reference node
    pub fn variable(name: impl Into<String>) -> Self {
        AstNode::Variable(name.into())
    }

    /// A field name as a one-step path, the shape the parser gives bare names.
    pub fn name_path(name: impl Into<String>) -> Self {
        AstNode::Path(PathExpr::single(PathStep::new(AstNode::Name(name.into()))))
    }

    /// The name of a bare single-step path such as `function` or `and`.
    pub fn as_bare_name(&self) -> Option<&str> {
        match self {
            AstNode::Path(path)
                if path.steps.len() == 1
                    && path.group.is_none()
                    && !path.keep_singleton
                    && path.steps[0].stages.is_empty()
                    && path.steps[0].index.is_none() =>
            {
                match &path.steps[0].node {
                    AstNode::Name(name) => Some(name),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Literals that cannot be used as path steps.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            AstNode::String(_) | AstNode::Number(_) | AstNode::Boolean(_) | AstNode::Null
        )
    }
}
