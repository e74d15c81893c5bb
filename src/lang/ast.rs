use crate::frontend::token::Pos;

/// Kind tag of a syntax-tree node. Interior nodes mirror the grammar; leaf
/// kinds carry the lexeme that produced them in the node's `text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    // Interior nodes
    Program,
    Function,
    FunctionParameters,
    FunctionParameter,
    FunctionStatements,
    Statements,
    Statement,
    IfStatement,
    WhileStatement,
    ReadStatement,
    WriteStatement,
    AssignStatement,
    DeclareStatement,
    ReturnStatement,
    DeclareKeyword,
    Condition,
    Expression,
    Term,
    ComparisonOp,
    AddOp,
    MulOp,
    Factor,
    Array,
    Identity,
    IdentityArray,
    FunctionCall,
    FunctionCallParameters,

    // Leaves
    Int,
    Real,
    Void,
    Identifier,
    IntegerLiteral,
    RealLiteral,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Equal,
    NotEqual,
}

/// Index of a node inside its [`SyntaxTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

#[derive(Debug)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub text: String,
    pub pos: Pos,
    pub parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// The parser's output: an arena of nodes with index-based parent and child
/// links. Node 0 is always the program root.
#[derive(Debug)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        SyntaxTree {
            nodes: vec![SyntaxNode {
                kind: NodeKind::Program,
                text: String::new(),
                pos: Pos::new(1, 1),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add_node(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        text: impl Into<String>,
        pos: Pos,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SyntaxNode {
            kind,
            text: text.into(),
            pos,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id.0].text
    }

    pub fn pos(&self, id: NodeId) -> Pos {
        self.nodes[id.0].pos
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child(&self, id: NodeId, index: usize) -> NodeId {
        self.nodes[id.0].children[index]
    }

    /// Indented dump of the whole tree, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(self.root(), 0, &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        for _ in 0..depth {
            out.push_str("    ");
        }
        out.push_str(&format!(
            "{:?} \"{}\" ({} children)\n",
            node.kind,
            node.text,
            node.children.len()
        ));
        for &child in &node.children {
            self.render_node(child, depth + 1, out);
        }
    }
}

impl Default for SyntaxTree {
    fn default() -> Self {
        SyntaxTree::new()
    }
}
