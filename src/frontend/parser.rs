use thiserror::Error;

use crate::frontend::token::{Pos, Token, TokenKind};
use crate::lang::ast::{NodeId, NodeKind, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("{pos}: unexpected token \"{text}\", expected {expected}")]
    Unexpected {
        text: String,
        expected: &'static str,
        pos: Pos,
    },

    #[error("{pos}: \"{text}\" cannot start a statement")]
    BadStatement { text: String, pos: Pos },
}

/// Recursive-descent parser producing the syntax-tree arena the analyzer
/// consumes. Requires a token stream ending in `Eof` (the lexer guarantees
/// this).
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse(mut self) -> Result<SyntaxTree, ParseError> {
        let mut tree = SyntaxTree::new();
        let root = tree.root();

        while self.peek().kind != TokenKind::Eof {
            if self.peek().kind == TokenKind::Func {
                self.parse_function(&mut tree, root)?;
            } else {
                self.parse_statement(&mut tree, root)?;
            }
        }
        Ok(tree)
    }

    // =========================================================================
    // Token plumbing
    // =========================================================================

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Look `offset` tokens ahead; saturates at the trailing `Eof`.
    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        if self.peek().kind == kind {
            Ok(self.bump())
        } else {
            Err(Parser::unexpected(self.peek(), expected))
        }
    }

    fn unexpected(token: &Token, expected: &'static str) -> ParseError {
        ParseError::Unexpected {
            text: token.text.clone(),
            expected,
            pos: token.pos,
        }
    }

    /// Add a leaf node carrying the token's text.
    fn leaf(&self, tree: &mut SyntaxTree, parent: NodeId, kind: NodeKind, token: &Token) -> NodeId {
        tree.add_node(parent, kind, token.text.clone(), token.pos)
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// function: FUNC declare_keyword ID '(' params? ')' '{' statement* '}'
    fn parse_function(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let func = tree.add_node(parent, NodeKind::Function, "", self.peek().pos);
        self.expect(TokenKind::Func, "'func'")?;

        self.parse_declare_keyword(tree, func)?;
        let name = self.expect(TokenKind::Identifier, "function name")?;
        self.leaf(tree, func, NodeKind::Identifier, &name);

        self.expect(TokenKind::LeftParen, "'('")?;
        let params = tree.add_node(func, NodeKind::FunctionParameters, "", self.peek().pos);
        if self.peek().kind != TokenKind::RightParen {
            loop {
                let param = tree.add_node(params, NodeKind::FunctionParameter, "", self.peek().pos);
                let kw = self.parse_declare_keyword(tree, param)?;
                let pname = self.expect(TokenKind::Identifier, "parameter name")?;
                self.leaf(tree, param, NodeKind::Identifier, &pname);
                if self.peek().kind == TokenKind::LeftBracket {
                    self.parse_array(tree, kw)?;
                }
                if self.peek().kind != TokenKind::Comma {
                    break;
                }
                self.bump();
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;

        self.expect(TokenKind::LeftBrace, "'{'")?;
        let body = tree.add_node(func, NodeKind::FunctionStatements, "", self.peek().pos);
        while self.peek().kind != TokenKind::RightBrace {
            self.parse_statement(tree, body)?;
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(())
    }

    /// declare_keyword: INT | REAL | VOID
    ///
    /// The array suffix of a declaration (`int a[3]`) sits after the declared
    /// name in the source but is recorded under this node, so the analyzer
    /// reads one (type, size) pair per declaration.
    fn parse_declare_keyword(
        &mut self,
        tree: &mut SyntaxTree,
        parent: NodeId,
    ) -> Result<NodeId, ParseError> {
        let kw = tree.add_node(parent, NodeKind::DeclareKeyword, "", self.peek().pos);
        match self.peek().kind {
            TokenKind::Int => {
                let token = self.bump();
                self.leaf(tree, kw, NodeKind::Int, &token);
            }
            TokenKind::Real => {
                let token = self.bump();
                self.leaf(tree, kw, NodeKind::Real, &token);
            }
            TokenKind::Void => {
                let token = self.bump();
                self.leaf(tree, kw, NodeKind::Void, &token);
            }
            _ => return Err(Parser::unexpected(self.peek(), "'int', 'real' or 'void'")),
        }
        Ok(kw)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let stmt = tree.add_node(parent, NodeKind::Statement, "", self.peek().pos);
        match self.peek().kind {
            TokenKind::If => self.parse_if(tree, stmt),
            TokenKind::While => self.parse_while(tree, stmt),
            TokenKind::Read => self.parse_read(tree, stmt),
            TokenKind::Write => self.parse_write(tree, stmt),
            TokenKind::Return => self.parse_return(tree, stmt),
            TokenKind::Int | TokenKind::Real | TokenKind::Void => self.parse_declare(tree, stmt),
            TokenKind::Identifier => {
                if self.peek_at(1).kind == TokenKind::LeftParen {
                    self.parse_function_call(tree, stmt)?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                    Ok(())
                } else {
                    self.parse_assign(tree, stmt)
                }
            }
            TokenKind::Semicolon => {
                // Empty statement.
                self.bump();
                Ok(())
            }
            _ => Err(ParseError::BadStatement {
                text: self.peek().text.clone(),
                pos: self.peek().pos,
            }),
        }
    }

    /// if: IF '(' condition ')' '{' statement* '}' (ELSE '{' statement* '}')?
    fn parse_if(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::IfStatement, "", self.peek().pos);
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        self.parse_condition(tree, node)?;
        self.expect(TokenKind::RightParen, "')'")?;

        self.parse_block(tree, node)?;

        if self.peek().kind == TokenKind::Else {
            self.bump();
            self.parse_block(tree, node)?;
        }
        Ok(())
    }

    /// while: WHILE '(' condition ')' '{' statement* '}'
    fn parse_while(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::WhileStatement, "", self.peek().pos);
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        self.parse_condition(tree, node)?;
        self.expect(TokenKind::RightParen, "')'")?;
        self.parse_block(tree, node)
    }

    /// A braced statement list, wrapped in a `Statements` node.
    fn parse_block(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let block = tree.add_node(parent, NodeKind::Statements, "", self.peek().pos);
        while self.peek().kind != TokenKind::RightBrace {
            self.parse_statement(tree, block)?;
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(())
    }

    /// read: READ '(' (ID | ID array) ')' ';'
    fn parse_read(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::ReadStatement, "", self.peek().pos);
        self.expect(TokenKind::Read, "'read'")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        self.parse_target(tree, node)?;
        self.expect(TokenKind::RightParen, "')'")?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(())
    }

    /// write: WRITE '(' expression ')' ';'
    fn parse_write(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::WriteStatement, "", self.peek().pos);
        self.expect(TokenKind::Write, "'write'")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        self.parse_expression(tree, node)?;
        self.expect(TokenKind::RightParen, "')'")?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(())
    }

    /// assign: (ID | ID array) '=' expression ';'
    fn parse_assign(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::AssignStatement, "", self.peek().pos);
        self.parse_target(tree, node)?;
        self.expect(TokenKind::Assign, "'='")?;
        self.parse_expression(tree, node)?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(())
    }

    /// An assignment or read target: a scalar identifier or an array element.
    fn parse_target(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let name = self.expect(TokenKind::Identifier, "identifier")?;
        if self.peek().kind == TokenKind::LeftBracket {
            let node = tree.add_node(parent, NodeKind::IdentityArray, "", name.pos);
            self.leaf(tree, node, NodeKind::Identifier, &name);
            self.parse_array(tree, node)?;
        } else {
            let node = tree.add_node(parent, NodeKind::Identity, "", name.pos);
            self.leaf(tree, node, NodeKind::Identifier, &name);
        }
        Ok(())
    }

    /// declare: declare_keyword ID array? (',' ID)* ';'
    ///
    /// `int a[3], b;` declares both names with the bracketed type.
    fn parse_declare(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::DeclareStatement, "", self.peek().pos);
        let kw = self.parse_declare_keyword(tree, node)?;

        let name = self.expect(TokenKind::Identifier, "identifier")?;
        self.leaf(tree, node, NodeKind::Identifier, &name);
        if self.peek().kind == TokenKind::LeftBracket {
            self.parse_array(tree, kw)?;
        }
        while self.peek().kind == TokenKind::Comma {
            self.bump();
            let name = self.expect(TokenKind::Identifier, "identifier")?;
            self.leaf(tree, node, NodeKind::Identifier, &name);
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(())
    }

    /// return: RETURN expression ';'
    fn parse_return(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::ReturnStatement, "", self.peek().pos);
        self.expect(TokenKind::Return, "'return'")?;
        self.parse_expression(tree, node)?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// condition: expression comparison_op expression
    fn parse_condition(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::Condition, "", self.peek().pos);
        self.parse_expression(tree, node)?;
        self.parse_comparison_op(tree, node)?;
        self.parse_expression(tree, node)
    }

    fn parse_comparison_op(
        &mut self,
        tree: &mut SyntaxTree,
        parent: NodeId,
    ) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::ComparisonOp, "", self.peek().pos);
        let kind = match self.peek().kind {
            TokenKind::Lt => NodeKind::Lt,
            TokenKind::LtEq => NodeKind::LtEq,
            TokenKind::Gt => NodeKind::Gt,
            TokenKind::GtEq => NodeKind::GtEq,
            TokenKind::Equal => NodeKind::Equal,
            TokenKind::NotEqual => NodeKind::NotEqual,
            _ => {
                return Err(Parser::unexpected(
                    self.peek(),
                    "comparison operator (< <= > >= == <>)",
                ));
            }
        };
        let token = self.bump();
        self.leaf(tree, node, kind, &token);
        Ok(())
    }

    /// expression: term (add_op term)*
    fn parse_expression(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::Expression, "", self.peek().pos);
        self.parse_term(tree, node)?;
        while matches!(self.peek().kind, TokenKind::Plus | TokenKind::Minus) {
            let op = tree.add_node(node, NodeKind::AddOp, "", self.peek().pos);
            let kind = if self.peek().kind == TokenKind::Plus {
                NodeKind::Plus
            } else {
                NodeKind::Minus
            };
            let token = self.bump();
            self.leaf(tree, op, kind, &token);
            self.parse_term(tree, node)?;
        }
        Ok(())
    }

    /// term: factor (mul_op factor)*
    fn parse_term(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::Term, "", self.peek().pos);
        self.parse_factor(tree, node)?;
        while matches!(self.peek().kind, TokenKind::Star | TokenKind::Slash) {
            let op = tree.add_node(node, NodeKind::MulOp, "", self.peek().pos);
            let kind = if self.peek().kind == TokenKind::Star {
                NodeKind::Star
            } else {
                NodeKind::Slash
            };
            let token = self.bump();
            self.leaf(tree, op, kind, &token);
            self.parse_factor(tree, node)?;
        }
        Ok(())
    }

    /// factor: INT_LIT | REAL_LIT | ID | ID array | function_call
    ///       | '(' expression ')'
    fn parse_factor(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::Factor, "", self.peek().pos);
        match self.peek().kind {
            TokenKind::IntegerLiteral => {
                let token = self.bump();
                self.leaf(tree, node, NodeKind::IntegerLiteral, &token);
                Ok(())
            }
            TokenKind::RealLiteral => {
                let token = self.bump();
                self.leaf(tree, node, NodeKind::RealLiteral, &token);
                Ok(())
            }
            TokenKind::Identifier => {
                if self.peek_at(1).kind == TokenKind::LeftParen {
                    self.parse_function_call(tree, node)
                } else if self.peek_at(1).kind == TokenKind::LeftBracket {
                    let name = self.bump();
                    let element = tree.add_node(node, NodeKind::IdentityArray, "", name.pos);
                    self.leaf(tree, element, NodeKind::Identifier, &name);
                    self.parse_array(tree, element)
                } else {
                    let token = self.bump();
                    self.leaf(tree, node, NodeKind::Identifier, &token);
                    Ok(())
                }
            }
            TokenKind::LeftParen => {
                self.bump();
                self.parse_expression(tree, node)?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(())
            }
            _ => Err(Parser::unexpected(self.peek(), "a value")),
        }
    }

    /// array: '[' (INT_LIT | ID) ']'
    fn parse_array(&mut self, tree: &mut SyntaxTree, parent: NodeId) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::Array, "", self.peek().pos);
        self.expect(TokenKind::LeftBracket, "'['")?;
        match self.peek().kind {
            TokenKind::IntegerLiteral => {
                let token = self.bump();
                self.leaf(tree, node, NodeKind::IntegerLiteral, &token);
            }
            TokenKind::Identifier => {
                let token = self.bump();
                self.leaf(tree, node, NodeKind::Identifier, &token);
            }
            _ => {
                return Err(Parser::unexpected(
                    self.peek(),
                    "an integer literal or identifier",
                ));
            }
        }
        self.expect(TokenKind::RightBracket, "']'")?;
        Ok(())
    }

    /// function_call: ID '(' (expression (',' expression)*)? ')'
    fn parse_function_call(
        &mut self,
        tree: &mut SyntaxTree,
        parent: NodeId,
    ) -> Result<(), ParseError> {
        let node = tree.add_node(parent, NodeKind::FunctionCall, "", self.peek().pos);
        let name = self.expect(TokenKind::Identifier, "function name")?;
        self.leaf(tree, node, NodeKind::Identifier, &name);

        self.expect(TokenKind::LeftParen, "'('")?;
        let args = tree.add_node(node, NodeKind::FunctionCallParameters, "", self.peek().pos);
        if self.peek().kind != TokenKind::RightParen {
            loop {
                self.parse_expression(tree, args)?;
                if self.peek().kind != TokenKind::Comma {
                    break;
                }
                self.bump();
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(())
    }
}
