use crate::ast::{BlockDecl, FunctionDecl, SourceModule, Terminator};
use crate::cfg::DeferId;
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind, lex};

pub fn parse(input: &str) -> Result<SourceModule, CoreError> {
    let tokens = lex(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        position: 0,
    };
    parser.parse_module()
}

struct Parser<'t> {
    tokens: &'t [Token],
    position: usize,
}

impl<'t> Parser<'t> {
    fn parse_module(&mut self) -> Result<SourceModule, CoreError> {
        let mut functions = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            functions.push(self.parse_function()?);
        }
        Ok(SourceModule { functions })
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, CoreError> {
        let start = self.expect(TokenKind::Fn)?.position;
        let name = match &self.peek().kind {
            TokenKind::Ident(name) => name.clone(),
            _ => return Err(self.unexpected("a function name")),
        };
        self.bump();
        self.expect(TokenKind::LBrace)?;

        let mut blocks = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            blocks.push(self.parse_block()?);
        }
        self.bump();

        Ok(FunctionDecl {
            name,
            position: start,
            blocks,
        })
    }

    fn parse_block(&mut self) -> Result<BlockDecl, CoreError> {
        let position = self.peek().position;
        let label = self.parse_label("a block label or `}`")?;
        self.expect(TokenKind::Colon)?;

        let mut defers = Vec::new();
        while self.peek().kind == TokenKind::Defer {
            self.bump();
            defers.push(self.parse_defer_id()?);
        }

        let terminator = match self.peek().kind {
            TokenKind::Return => {
                self.bump();
                Terminator::Return
            }
            TokenKind::Jump => {
                self.bump();
                let mut targets = vec![self.parse_label("a jump target")?];
                while self.peek().kind == TokenKind::Comma {
                    self.bump();
                    targets.push(self.parse_label("a jump target")?);
                }
                Terminator::Jump(targets)
            }
            _ => return Err(self.unexpected("`defer`, `jump` or `return`")),
        };

        Ok(BlockDecl {
            label,
            position,
            defers,
            terminator,
        })
    }

    fn parse_label(&mut self, expected: &str) -> Result<usize, CoreError> {
        match self.peek().kind {
            TokenKind::Label(index) => {
                self.bump();
                Ok(index)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn parse_defer_id(&mut self) -> Result<DeferId, CoreError> {
        let token = self.peek();
        match token.kind {
            TokenKind::Int(value) => {
                let id = DeferId::try_from(value).map_err(|_| CoreError::ParseError {
                    position: token.position,
                    message: format!("defer id {value} does not fit in 32 bits"),
                })?;
                self.bump();
                Ok(id)
            }
            _ => Err(self.unexpected("a defer id")),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&'t Token, CoreError> {
        let token = self.peek();
        if token.kind == kind {
            self.bump();
            Ok(token)
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    fn peek(&self) -> &'t Token {
        // The lexer always terminates the stream with Eof.
        let tokens = self.tokens;
        &tokens[self.position.min(tokens.len() - 1)]
    }

    fn bump(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn unexpected(&self, expected: &str) -> CoreError {
        let token = self.peek();
        CoreError::ParseError {
            position: token.position,
            message: format!("expected {expected}, found {}", token.kind.describe()),
        }
    }
}
