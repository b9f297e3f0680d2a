//! AST for Go templates
//!
//! The parser produces a flat list of actions which is then folded into a
//! tree of nodes. Control structures own their bodies, so the evaluator
//! never has to match `end` markers itself.

/// A parsed template file: its top-level nodes plus the templates it defines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
    pub defines: Vec<(String, Vec<Node>)>,
}

/// A node of the template tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Text outside of actions, already trimmed
    Text(String),
    /// `{{ pipeline }}`
    Output(Pipeline),
    /// `{{ if }}` with its `else if` chain
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    /// `{{ with }}` with its `else with` chain
    With {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Range {
        vars: Option<RangeVars>,
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    /// `{{ template "name" pipeline }}` (also produced by `block`)
    Template {
        name: String,
        pipeline: Option<Pipeline>,
    },
    Break,
    Continue,
}

/// Variables declared by `range $k, $v := ...`
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVars {
    pub key: Option<String>,
    pub value: String,
}

/// Variable declaration (`$x :=`) or assignment (`$x =`)
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub name: String,
    pub assign: bool,
}

/// Commands separated by `|`
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub decl: Option<Decl>,
    pub commands: Vec<Command>,
}

/// A command: a function name or value followed by its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.`
    Dot,
    /// `.Values.image.tag`
    Field(Vec<String>),
    /// `$`, `$name` or `$name.field`; the root variable has an empty name
    Variable { name: String, path: Vec<String> },
    /// Function name
    Identifier(String),
    Literal(Literal),
    /// `(pipeline).field`
    Sub {
        pipeline: Box<Pipeline>,
        path: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}
