//! Recursive-descent parser for Simple C
//!
//! A predictive LL(1) parser with one-token lookahead. The first syntax
//! error is fatal; there is no recovery. As each operand or operator is
//! finished the parser asks the [`Checker`] for the resulting type and
//! builds the AST node with it, so everything downstream sees fully typed
//! trees.
//!
//! The parser also materializes the implicit conversions the code generator
//! relies on: arrays decay to explicit address-of nodes, `char` operands
//! widen to `int` through casts, pointer arithmetic is scaled by the element
//! size, and `e1[e2]` lowers to `*(e1 + e2)`.

use crate::ast::{Binary, Block, Expression, Function, Program, Statement, Unary};
use crate::checker::Checker;
use crate::lexer::{Lexer, Token, TokenKind, decode_character, decode_string};
use crate::scope::SymbolId;
use crate::types::{Parameters, Specifier, Type};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Token,
    checker: Checker,
    functions: Vec<Function>,
    /// Return type of the function whose body is being parsed.
    return_type: Type,
}

fn is_specifier(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Char | TokenKind::Int | TokenKind::Long | TokenKind::Void
    )
}

/// An array used as a value decays to a pointer via an explicit address-of
/// node, which the generator emits as `leaq`.
fn decay(expr: Expression) -> Expression {
    if expr.ty().is_array() {
        let ty = expr.ty().promote();
        Expression::Address(Unary::new(expr, ty))
    } else {
        expr
    }
}

/// Widen a numeric operand to a wider numeric type with an explicit cast.
fn widen(expr: Expression, target: &Type) -> Expression {
    if expr.ty().is_numeric() && target.is_numeric() && expr.ty().size() < target.size() {
        let ty = target.clone();
        Expression::Cast(Unary::new(expr, ty))
    } else {
        expr
    }
}

/// Scale the numeric side of pointer arithmetic by the element size.
fn scale(expr: Expression, element_size: u64) -> Expression {
    let expr = widen(decay(expr), &Type::long());
    if element_size == 1 {
        return expr;
    }
    let size = Expression::Number {
        value: element_size as i64,
        ty: Type::long(),
    };
    Expression::Multiply(Binary::new(expr, size, Type::long()))
}

fn element_of(pointer: &Type) -> Type {
    Type::scalar(pointer.specifier, pointer.indirection - 1)
}

/// Operand conversions for `*`, `/`, `%`, unary `-`, and the numeric cases
/// of `+` and `-`.
fn shape_numeric(expr: Expression, target: &Type) -> Expression {
    widen(decay(expr), target)
}

/// Operand conversions for relational and equality operators: numerics go
/// to a common width, pointers just decay.
fn shape_comparison(left: Expression, right: Expression) -> (Expression, Expression) {
    let l = left.ty().promote();
    let r = right.ty().promote();
    if l.is_numeric() && r.is_numeric() {
        let target = if l.specifier == Specifier::Long || r.specifier == Specifier::Long {
            Type::long()
        } else {
            Type::int()
        };
        (widen(decay(left), &target), widen(decay(right), &target))
    } else {
        (decay(left), decay(right))
    }
}

fn build_add(left: Expression, right: Expression, ty: Type) -> Expression {
    if ty.is_error() {
        return Expression::Add(Binary::new(left, right, ty));
    }
    let l = left.ty().promote();
    let r = right.ty().promote();
    let (left, right) = if l.is_pointer() {
        (decay(left), scale(right, element_of(&l).size()))
    } else if r.is_pointer() {
        (scale(left, element_of(&r).size()), decay(right))
    } else {
        (shape_numeric(left, &ty), shape_numeric(right, &ty))
    };
    Expression::Add(Binary::new(left, right, ty))
}

fn build_subtract(left: Expression, right: Expression, ty: Type) -> Expression {
    if ty.is_error() {
        return Expression::Subtract(Binary::new(left, right, ty));
    }
    let l = left.ty().promote();
    let r = right.ty().promote();
    if l.is_pointer() && r.is_pointer() {
        // Pointer difference: byte difference divided down to elements.
        let element_size = element_of(&l).size();
        let difference =
            Expression::Subtract(Binary::new(decay(left), decay(right), Type::long()));
        if element_size == 1 {
            return difference;
        }
        let size = Expression::Number {
            value: element_size as i64,
            ty: Type::long(),
        };
        return Expression::Divide(Binary::new(difference, size, Type::long()));
    }
    if l.is_pointer() {
        let element_size = element_of(&l).size();
        return Expression::Subtract(Binary::new(decay(left), scale(right, element_size), ty));
    }
    let left = shape_numeric(left, &ty);
    let right = shape_numeric(right, &ty);
    Expression::Subtract(Binary::new(left, right, ty))
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let lookahead = lexer.next_token();
        Parser {
            lexer,
            lookahead,
            checker: Checker::new(),
            functions: Vec::new(),
            return_type: Type::int(),
        }
    }

    /// Parse a whole translation unit. The first syntax error aborts with
    /// the canonical message; semantic diagnostics accumulate in the result.
    pub fn parse(mut self) -> Result<Program, String> {
        self.checker.open_scope();
        while self.lookahead.kind != TokenKind::Done {
            self.global_or_function()?;
        }
        let globals = self.checker.file_scope_symbols();
        self.checker.close_scope();
        Ok(Program {
            functions: self.functions,
            globals,
            symbols: self.checker.symbols,
            diagnostics: self.checker.diagnostics,
        })
    }

    fn syntax_error<T>(&self) -> Result<T, String> {
        if self.lookahead.kind == TokenKind::Done {
            Err("syntax error at end of file".to_string())
        } else {
            Err(format!("syntax error at '{}'", self.lookahead.text))
        }
    }

    fn advance(&mut self) -> Token {
        std::mem::replace(&mut self.lookahead, self.lexer.next_token())
    }

    fn match_token(&mut self, kind: TokenKind) -> Result<(), String> {
        if self.lookahead.kind != kind {
            return self.syntax_error();
        }
        self.advance();
        Ok(())
    }

    fn identifier(&mut self) -> Result<String, String> {
        if self.lookahead.kind != TokenKind::Id {
            return self.syntax_error();
        }
        Ok(self.advance().text)
    }

    /// Match a NUM token and return its value, saturating like `strtoul`.
    fn array_length(&mut self) -> Result<u64, String> {
        if self.lookahead.kind != TokenKind::Num {
            return self.syntax_error();
        }
        Ok(self.advance().text.parse().unwrap_or(u64::MAX))
    }

    fn specifier(&mut self) -> Result<Specifier, String> {
        let specifier = match self.lookahead.kind {
            TokenKind::Char => Specifier::Char,
            TokenKind::Int => Specifier::Int,
            TokenKind::Long => Specifier::Long,
            TokenKind::Void => Specifier::Void,
            _ => return self.syntax_error(),
        };
        self.advance();
        Ok(specifier)
    }

    /// pointers: ( '*' )*
    fn pointers(&mut self) -> Result<u32, String> {
        let mut count = 0;
        while self.lookahead.kind == TokenKind::Star {
            self.match_token(TokenKind::Star)?;
            count += 1;
        }
        Ok(count)
    }

    /// global-or-function: the only place the grammar needs to look past an
    /// identifier to tell a global, a function declaration, and a function
    /// definition apart.
    fn global_or_function(&mut self) -> Result<(), String> {
        let specifier = self.specifier()?;
        let indirection = self.pointers()?;
        let name = self.identifier()?;

        match self.lookahead.kind {
            TokenKind::LeftBracket => {
                self.match_token(TokenKind::LeftBracket)?;
                let length = self.array_length()?;
                self.match_token(TokenKind::RightBracket)?;
                self.checker
                    .declare_variable(&name, Type::array(specifier, indirection, length));
                self.remaining_declarators(specifier)
            }
            TokenKind::LeftParen => {
                self.match_token(TokenKind::LeftParen)?;
                if self.lookahead.kind == TokenKind::RightParen {
                    self.match_token(TokenKind::RightParen)?;
                    if self.lookahead.kind == TokenKind::LeftBrace {
                        // Definition with an empty, unprototyped list.
                        self.checker.open_scope();
                        self.function_definition(
                            name,
                            specifier,
                            indirection,
                            Vec::new(),
                            Parameters::Unprototyped,
                        )
                    } else {
                        self.checker.declare_function(
                            &name,
                            Type::function(specifier, indirection, Parameters::Unprototyped),
                        );
                        self.remaining_declarators(specifier)
                    }
                } else {
                    self.checker.open_scope();
                    let (parameters, parameter_types) = self.parameters()?;
                    self.match_token(TokenKind::RightParen)?;
                    self.function_definition(
                        name,
                        specifier,
                        indirection,
                        parameters,
                        Parameters::Prototype(parameter_types),
                    )
                }
            }
            _ => {
                self.checker
                    .declare_variable(&name, Type::scalar(specifier, indirection));
                self.remaining_declarators(specifier)
            }
        }
    }

    /// remaining-declarators: ';' | ',' global-declarator remaining-declarators
    fn remaining_declarators(&mut self, specifier: Specifier) -> Result<(), String> {
        while self.lookahead.kind == TokenKind::Comma {
            self.match_token(TokenKind::Comma)?;
            self.global_declarator(specifier)?;
        }
        self.match_token(TokenKind::Semicolon)
    }

    /// global-declarator: pointers ID ( '(' ')' | '[' NUM ']' | e )
    fn global_declarator(&mut self, specifier: Specifier) -> Result<(), String> {
        let indirection = self.pointers()?;
        let name = self.identifier()?;

        match self.lookahead.kind {
            TokenKind::LeftParen => {
                self.match_token(TokenKind::LeftParen)?;
                self.match_token(TokenKind::RightParen)?;
                self.checker.declare_function(
                    &name,
                    Type::function(specifier, indirection, Parameters::Unprototyped),
                );
            }
            TokenKind::LeftBracket => {
                self.match_token(TokenKind::LeftBracket)?;
                let length = self.array_length()?;
                self.match_token(TokenKind::RightBracket)?;
                self.checker
                    .declare_variable(&name, Type::array(specifier, indirection, length));
            }
            _ => {
                self.checker
                    .declare_variable(&name, Type::scalar(specifier, indirection));
            }
        }
        Ok(())
    }

    /// The body of a function definition. The parameter scope is already
    /// open; the body opens its own scope for locals. Both close at `}`.
    fn function_definition(
        &mut self,
        name: String,
        specifier: Specifier,
        indirection: u32,
        parameters: Vec<SymbolId>,
        parameter_list: Parameters,
    ) -> Result<(), String> {
        let ty = Type::function(specifier, indirection, parameter_list);
        let symbol = self.checker.define_function(&name, ty);
        self.return_type = Type::scalar(specifier, indirection);

        self.match_token(TokenKind::LeftBrace)?;
        self.checker.open_scope();
        let declarations = self.declarations()?;
        let mut statements = Vec::new();
        while self.lookahead.kind != TokenKind::RightBrace {
            statements.push(self.statement()?);
        }
        self.match_token(TokenKind::RightBrace)?;
        self.checker.close_scope();
        self.checker.close_scope();

        self.functions.push(Function {
            symbol,
            parameters,
            body: Block {
                declarations,
                statements,
            },
        });
        Ok(())
    }

    /// parameters: 'void' | parameter ( ',' parameter )*
    ///
    /// A lone `void` is an explicit zero-argument prototype, unlike the
    /// empty parentheses of an unprototyped declaration.
    fn parameters(&mut self) -> Result<(Vec<SymbolId>, Vec<Type>), String> {
        let mut symbols = Vec::new();
        let mut types = Vec::new();

        let specifier = if self.lookahead.kind == TokenKind::Void {
            self.match_token(TokenKind::Void)?;
            if self.lookahead.kind == TokenKind::RightParen {
                return Ok((symbols, types));
            }
            Specifier::Void
        } else {
            self.specifier()?
        };

        let (symbol, ty) = self.parameter_declarator(specifier)?;
        symbols.push(symbol);
        types.push(ty);

        while self.lookahead.kind == TokenKind::Comma {
            self.match_token(TokenKind::Comma)?;
            let specifier = self.specifier()?;
            let (symbol, ty) = self.parameter_declarator(specifier)?;
            symbols.push(symbol);
            types.push(ty);
        }
        Ok((symbols, types))
    }

    /// parameter: specifier pointers ID (always a scalar)
    fn parameter_declarator(&mut self, specifier: Specifier) -> Result<(SymbolId, Type), String> {
        let indirection = self.pointers()?;
        let name = self.identifier()?;
        let ty = Type::scalar(specifier, indirection);
        let symbol = self.checker.declare_variable(&name, ty.clone());
        Ok((symbol, ty))
    }

    /// declarations: ( declaration )*
    fn declarations(&mut self) -> Result<Vec<SymbolId>, String> {
        let mut declared = Vec::new();
        while is_specifier(self.lookahead.kind) {
            let specifier = self.specifier()?;
            declared.push(self.declarator(specifier)?);
            while self.lookahead.kind == TokenKind::Comma {
                self.match_token(TokenKind::Comma)?;
                declared.push(self.declarator(specifier)?);
            }
            self.match_token(TokenKind::Semicolon)?;
        }
        Ok(declared)
    }

    /// declarator: pointers ID ( '[' NUM ']' | e )
    fn declarator(&mut self, specifier: Specifier) -> Result<SymbolId, String> {
        let indirection = self.pointers()?;
        let name = self.identifier()?;

        if self.lookahead.kind == TokenKind::LeftBracket {
            self.match_token(TokenKind::LeftBracket)?;
            let length = self.array_length()?;
            self.match_token(TokenKind::RightBracket)?;
            Ok(self
                .checker
                .declare_variable(&name, Type::array(specifier, indirection, length)))
        } else {
            Ok(self
                .checker
                .declare_variable(&name, Type::scalar(specifier, indirection)))
        }
    }

    /// statement: block, return, while, for, if, or an assignment.
    fn statement(&mut self) -> Result<Statement, String> {
        match self.lookahead.kind {
            TokenKind::LeftBrace => {
                self.checker.open_scope();
                self.match_token(TokenKind::LeftBrace)?;
                let declarations = self.declarations()?;
                let mut statements = Vec::new();
                while self.lookahead.kind != TokenKind::RightBrace {
                    statements.push(self.statement()?);
                }
                self.match_token(TokenKind::RightBrace)?;
                self.checker.close_scope();
                Ok(Statement::Block(Block {
                    declarations,
                    statements,
                }))
            }
            TokenKind::Return => {
                self.match_token(TokenKind::Return)?;
                let expr = self.expression()?;
                let return_type = self.return_type.clone();
                self.checker.check_return(&return_type, expr.ty());
                let expr = widen(decay(expr), &return_type);
                self.match_token(TokenKind::Semicolon)?;
                Ok(Statement::Return(expr))
            }
            TokenKind::While => {
                self.match_token(TokenKind::While)?;
                self.match_token(TokenKind::LeftParen)?;
                let condition = self.condition()?;
                self.match_token(TokenKind::RightParen)?;
                let body = Box::new(self.statement()?);
                Ok(Statement::While { condition, body })
            }
            TokenKind::For => {
                self.match_token(TokenKind::For)?;
                self.match_token(TokenKind::LeftParen)?;
                let init = Box::new(self.assignment()?);
                self.match_token(TokenKind::Semicolon)?;
                let condition = self.condition()?;
                self.match_token(TokenKind::Semicolon)?;
                let step = Box::new(self.assignment()?);
                self.match_token(TokenKind::RightParen)?;
                let body = Box::new(self.statement()?);
                Ok(Statement::For {
                    init,
                    condition,
                    step,
                    body,
                })
            }
            TokenKind::If => {
                self.match_token(TokenKind::If)?;
                self.match_token(TokenKind::LeftParen)?;
                let condition = self.condition()?;
                self.match_token(TokenKind::RightParen)?;
                let then_branch = Box::new(self.statement()?);
                // The dangling else binds to the nearest if.
                let else_branch = if self.lookahead.kind == TokenKind::Else {
                    self.match_token(TokenKind::Else)?;
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Statement::If {
                    condition,
                    then_branch,
                    else_branch,
                })
            }
            _ => {
                let statement = self.assignment()?;
                self.match_token(TokenKind::Semicolon)?;
                Ok(statement)
            }
        }
    }

    /// A test expression for if/while/for.
    fn condition(&mut self) -> Result<Expression, String> {
        let expr = self.expression()?;
        self.checker.check_test(expr.ty());
        Ok(decay(expr))
    }

    /// assignment: expression ( '=' expression )?
    fn assignment(&mut self) -> Result<Statement, String> {
        let left = self.expression()?;
        if self.lookahead.kind != TokenKind::Assign {
            return Ok(Statement::Simple(left));
        }
        self.match_token(TokenKind::Assign)?;
        let right = self.expression()?;
        let lvalue = left.is_lvalue(&self.checker.symbols);
        self.checker
            .check_assignment(left.ty(), right.ty(), lvalue);
        let right = widen(decay(right), left.ty());
        Ok(Statement::Assignment { left, right })
    }

    /// expression: logical-and ( '||' logical-and )*
    fn expression(&mut self) -> Result<Expression, String> {
        let mut left = self.logical_and_expression()?;
        while self.lookahead.kind == TokenKind::Or {
            self.match_token(TokenKind::Or)?;
            let right = self.logical_and_expression()?;
            let ty = self.checker.check_logical_or(left.ty(), right.ty());
            left = Expression::LogicalOr(Binary::new(decay(left), decay(right), ty));
        }
        Ok(left)
    }

    fn logical_and_expression(&mut self) -> Result<Expression, String> {
        let mut left = self.equality_expression()?;
        while self.lookahead.kind == TokenKind::And {
            self.match_token(TokenKind::And)?;
            let right = self.equality_expression()?;
            let ty = self.checker.check_logical_and(left.ty(), right.ty());
            left = Expression::LogicalAnd(Binary::new(decay(left), decay(right), ty));
        }
        Ok(left)
    }

    fn equality_expression(&mut self) -> Result<Expression, String> {
        let mut left = self.relational_expression()?;
        loop {
            let (build, spelling): (fn(Binary) -> Expression, &str) = match self.lookahead.kind {
                TokenKind::Equal => (Expression::Equal, "=="),
                TokenKind::NotEqual => (Expression::NotEqual, "!="),
                _ => break,
            };
            self.advance();
            let right = self.relational_expression()?;
            let ty = self.checker.check_equality(left.ty(), right.ty(), spelling);
            let (l, r) = if ty.is_error() {
                (left, right)
            } else {
                shape_comparison(left, right)
            };
            left = build(Binary::new(l, r, ty));
        }
        Ok(left)
    }

    fn relational_expression(&mut self) -> Result<Expression, String> {
        let mut left = self.additive_expression()?;
        loop {
            let (build, spelling): (fn(Binary) -> Expression, &str) = match self.lookahead.kind {
                TokenKind::Less => (Expression::LessThan, "<"),
                TokenKind::Greater => (Expression::GreaterThan, ">"),
                TokenKind::LessEqual => (Expression::LessOrEqual, "<="),
                TokenKind::GreaterEqual => (Expression::GreaterOrEqual, ">="),
                _ => break,
            };
            self.advance();
            let right = self.additive_expression()?;
            let ty = self
                .checker
                .check_relational(left.ty(), right.ty(), spelling);
            let (l, r) = if ty.is_error() {
                (left, right)
            } else {
                shape_comparison(left, right)
            };
            left = build(Binary::new(l, r, ty));
        }
        Ok(left)
    }

    fn additive_expression(&mut self) -> Result<Expression, String> {
        let mut left = self.multiplicative_expression()?;
        loop {
            match self.lookahead.kind {
                TokenKind::Plus => {
                    self.advance();
                    let right = self.multiplicative_expression()?;
                    let ty = self.checker.check_add(left.ty(), right.ty());
                    left = build_add(left, right, ty);
                }
                TokenKind::Minus => {
                    self.advance();
                    let right = self.multiplicative_expression()?;
                    let ty = self.checker.check_subtract(left.ty(), right.ty());
                    left = build_subtract(left, right, ty);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn multiplicative_expression(&mut self) -> Result<Expression, String> {
        let mut left = self.prefix_expression()?;
        loop {
            let (build, spelling): (fn(Binary) -> Expression, &str) = match self.lookahead.kind {
                TokenKind::Star => (Expression::Multiply, "*"),
                TokenKind::Slash => (Expression::Divide, "/"),
                TokenKind::Percent => (Expression::Remainder, "%"),
                _ => break,
            };
            self.advance();
            let right = self.prefix_expression()?;
            let ty = self
                .checker
                .check_mul_div_rem(left.ty(), right.ty(), spelling);
            let (l, r) = if ty.is_error() {
                (left, right)
            } else {
                (shape_numeric(left, &ty), shape_numeric(right, &ty))
            };
            left = build(Binary::new(l, r, ty));
        }
        Ok(left)
    }

    /// prefix: '!' | '-' | '*' | '&' | 'sizeof' prefix, a cast, or postfix.
    ///
    /// A parenthesis here is a cast exactly when a specifier follows it;
    /// otherwise it is a parenthesized expression, which still accepts
    /// postfix indexes.
    fn prefix_expression(&mut self) -> Result<Expression, String> {
        match self.lookahead.kind {
            TokenKind::Not => {
                self.match_token(TokenKind::Not)?;
                let expr = self.prefix_expression()?;
                let ty = self.checker.check_not(expr.ty());
                Ok(Expression::Not(Unary::new(decay(expr), ty)))
            }
            TokenKind::Minus => {
                self.match_token(TokenKind::Minus)?;
                let expr = self.prefix_expression()?;
                let ty = self.checker.check_negate(expr.ty());
                let expr = if ty.is_error() {
                    expr
                } else {
                    shape_numeric(expr, &ty)
                };
                Ok(Expression::Negate(Unary::new(expr, ty)))
            }
            TokenKind::Star => {
                self.match_token(TokenKind::Star)?;
                let expr = decay(self.prefix_expression()?);
                let ty = self.checker.check_dereference(expr.ty());
                Ok(Expression::Dereference(Unary::new(expr, ty)))
            }
            TokenKind::Ampersand => {
                self.match_token(TokenKind::Ampersand)?;
                let expr = self.prefix_expression()?;
                let lvalue = expr.is_lvalue(&self.checker.symbols);
                let ty = self.checker.check_address(expr.ty(), lvalue);
                Ok(Expression::Address(Unary::new(expr, ty)))
            }
            TokenKind::Sizeof => {
                self.match_token(TokenKind::Sizeof)?;
                let expr = self.prefix_expression()?;
                let ty = self.checker.check_sizeof(expr.ty());
                // Folded at parse time; the operand is never evaluated.
                Ok(Expression::Number {
                    value: expr.ty().size() as i64,
                    ty,
                })
            }
            TokenKind::LeftParen => {
                self.match_token(TokenKind::LeftParen)?;
                if is_specifier(self.lookahead.kind) {
                    let specifier = self.specifier()?;
                    let indirection = self.pointers()?;
                    self.match_token(TokenKind::RightParen)?;
                    let expr = self.prefix_expression()?;
                    let ty = if expr.ty().is_error() {
                        Type::error()
                    } else {
                        Type::scalar(specifier, indirection)
                    };
                    Ok(Expression::Cast(Unary::new(decay(expr), ty)))
                } else {
                    let expr = self.expression()?;
                    self.match_token(TokenKind::RightParen)?;
                    self.postfix_tail(expr)
                }
            }
            _ => self.postfix_expression(),
        }
    }

    /// postfix: primary ( '[' expression ']' )*
    fn postfix_expression(&mut self) -> Result<Expression, String> {
        let expr = self.primary_expression()?;
        self.postfix_tail(expr)
    }

    /// The index suffixes of a postfix expression; `e1[e2]` lowers to
    /// `*(e1 + e2)` with the index scaled by the element size.
    fn postfix_tail(&mut self, mut expr: Expression) -> Result<Expression, String> {
        while self.lookahead.kind == TokenKind::LeftBracket {
            self.match_token(TokenKind::LeftBracket)?;
            let index = self.expression()?;
            self.match_token(TokenKind::RightBracket)?;
            let ty = self.checker.check_index(expr.ty(), index.ty());

            expr = if ty.is_error() {
                let pointer = Expression::Add(Binary::new(expr, index, Type::error()));
                Expression::Dereference(Unary::new(pointer, ty))
            } else {
                let base = decay(expr);
                let pointer_ty = base.ty().promote();
                let index = scale(index, element_of(&pointer_ty).size());
                let pointer = Expression::Add(Binary::new(base, index, pointer_ty));
                Expression::Dereference(Unary::new(pointer, ty))
            };
        }
        Ok(expr)
    }

    /// primary: ID, ID '(' arglist? ')', NUM, STRING, or CHARACTER.
    /// Parenthesized expressions are handled at the prefix level, where they
    /// are disambiguated from casts.
    fn primary_expression(&mut self) -> Result<Expression, String> {
        match self.lookahead.kind {
            TokenKind::Id => {
                let name = self.advance().text;
                if self.lookahead.kind != TokenKind::LeftParen {
                    let symbol = self.checker.check_identifier(&name);
                    let ty = self.checker.symbols[symbol].ty.clone();
                    return Ok(Expression::Identifier { symbol, ty });
                }

                self.match_token(TokenKind::LeftParen)?;
                let mut arguments = Vec::new();
                if self.lookahead.kind != TokenKind::RightParen {
                    arguments.push(self.expression()?);
                    while self.lookahead.kind == TokenKind::Comma {
                        self.match_token(TokenKind::Comma)?;
                        arguments.push(self.expression()?);
                    }
                }
                self.match_token(TokenKind::RightParen)?;

                let callee = self.checker.check_identifier(&name);
                let callee_ty = self.checker.symbols[callee].ty.clone();
                let argument_types: Vec<Type> =
                    arguments.iter().map(|a| a.ty().clone()).collect();
                let ty = self.checker.check_call(&callee_ty, &argument_types);
                // Default argument conversions: arrays decay, char widens.
                let arguments = arguments
                    .into_iter()
                    .map(|a| widen(decay(a), &Type::int()))
                    .collect();
                Ok(Expression::Call {
                    callee,
                    arguments,
                    ty,
                })
            }
            TokenKind::Num => {
                let text = self.advance().text;
                let value: i64 = text.parse().unwrap_or(i64::MAX);
                let ty = if i32::try_from(value).is_ok() {
                    Type::int()
                } else {
                    Type::long()
                };
                Ok(Expression::Number { value, ty })
            }
            TokenKind::StringLit => {
                let text = self.advance().text;
                Ok(Expression::StringLiteral {
                    value: decode_string(&text),
                    ty: Type::scalar(Specifier::Char, 1),
                })
            }
            TokenKind::Character => {
                let text = self.advance().text;
                Ok(Expression::Number {
                    value: decode_character(&text),
                    ty: Type::int(),
                })
            }
            _ => self.syntax_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Program, String> {
        Parser::new(source).parse()
    }

    fn parse_ok(source: &str) -> Program {
        parse(source).expect("program should parse")
    }

    #[test]
    fn test_empty_translation_unit() {
        let program = parse_ok("");
        assert!(program.functions.is_empty());
        assert!(program.globals.is_empty());
    }

    #[test]
    fn test_global_declarations() {
        let program = parse_ok("int x; char *s, buffer[40]; long counts[10];");
        assert!(program.diagnostics.is_empty());
        assert_eq!(program.globals.len(), 4);
        let buffer = &program.symbols[program.globals[2]];
        assert_eq!(buffer.name, "buffer");
        assert_eq!(buffer.ty, Type::array(Specifier::Char, 0, 40));
    }

    #[test]
    fn test_syntax_error_message() {
        assert_eq!(
            parse("int x").unwrap_err(),
            "syntax error at end of file".to_string()
        );
        assert_eq!(
            parse("int 4;").unwrap_err(),
            "syntax error at '4'".to_string()
        );
    }

    #[test]
    fn test_keywords_are_not_identifiers() {
        assert_eq!(parse("int break;").unwrap_err(), "syntax error at 'break'");
    }

    #[test]
    fn test_function_definition_shapes() {
        let program = parse_ok("int main(void) { return 0; }");
        assert_eq!(program.functions.len(), 1);
        let main = &program.functions[0];
        assert!(main.parameters.is_empty());
        assert_eq!(
            program.symbols[main.symbol].ty,
            Type::function(Specifier::Int, 0, Parameters::Prototype(Vec::new()))
        );
        assert!(matches!(main.body.statements[0], Statement::Return(_)));
    }

    #[test]
    fn test_empty_parens_definition_is_unprototyped() {
        let program = parse_ok("int main() { return 0; }");
        let main = &program.functions[0];
        assert_eq!(
            program.symbols[main.symbol].ty,
            Type::function(Specifier::Int, 0, Parameters::Unprototyped)
        );
    }

    #[test]
    fn test_parameters_are_recorded() {
        let program = parse_ok("long add(long a, long b) { return a + b; }");
        let add = &program.functions[0];
        assert_eq!(add.parameters.len(), 2);
        assert_eq!(program.symbols[add.parameters[0]].name, "a");
        assert_eq!(
            program.symbols[add.symbol].ty.parameters(),
            Some(&vec![Type::long(), Type::long()])
        );
    }

    #[test]
    fn test_dangling_else_binds_inner_if() {
        let program = parse_ok(
            "int f(int a, int b) { if (a) if (b) return 1; else return 2; return 3; }",
        );
        let body = &program.functions[0].body.statements;
        let Statement::If { then_branch, else_branch, .. } = &body[0] else {
            panic!("expected if");
        };
        assert!(else_branch.is_none());
        let Statement::If { else_branch, .. } = &**then_branch else {
            panic!("expected nested if");
        };
        assert!(else_branch.is_some());
    }

    #[test]
    fn test_index_lowers_to_dereference() {
        let program = parse_ok("int a[10]; int main(void) { return a[3]; }");
        let Statement::Return(expr) = &program.functions[0].body.statements[0] else {
            panic!("expected return");
        };
        let Expression::Dereference(inner) = expr else {
            panic!("expected dereference, got {:?}", expr);
        };
        let Expression::Add(sum) = &*inner.expr else {
            panic!("expected add under dereference");
        };
        // The array base decays to an explicit address-of.
        assert!(matches!(&*sum.left, Expression::Address(_)));
        // The index is scaled by the element size.
        let Expression::Multiply(product) = &*sum.right else {
            panic!("expected scaled index, got {:?}", sum.right);
        };
        assert!(matches!(
            &*product.right,
            Expression::Number { value: 4, .. }
        ));
        assert_eq!(inner.ty, Type::int());
    }

    #[test]
    fn test_char_index_is_not_scaled() {
        let program = parse_ok("char s[10]; int main(void) { return s[2]; }");
        let Statement::Return(expr) = &program.functions[0].body.statements[0] else {
            panic!("expected return");
        };
        // return widens the char element to int via a cast.
        let Expression::Cast(cast) = expr else {
            panic!("expected widening cast, got {:?}", expr);
        };
        let Expression::Dereference(inner) = &*cast.expr else {
            panic!("expected dereference");
        };
        let Expression::Add(sum) = &*inner.expr else {
            panic!("expected add");
        };
        assert!(!matches!(&*sum.right, Expression::Multiply(_)));
    }

    #[test]
    fn test_sizeof_folds_to_number() {
        let program = parse_ok("long a[6]; int main(void) { return sizeof a; }");
        let Statement::Return(expr) = &program.functions[0].body.statements[0] else {
            panic!("expected return");
        };
        // sizeof of the unpromoted array, wrapped in no cast since it is
        // already long.
        let Expression::Number { value, ty } = expr else {
            panic!("expected folded number, got {:?}", expr);
        };
        assert_eq!(*value, 48);
        assert_eq!(*ty, Type::long());
    }

    #[test]
    fn test_cast_versus_parenthesized_expression() {
        let program = parse_ok("int main(void) { int x; long y; x = 0; y = (long)x; x = (x); }");
        let Statement::Assignment { right, .. } = &program.functions[0].body.statements[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(right, Expression::Cast(_)));
        let Statement::Assignment { right, .. } = &program.functions[0].body.statements[2] else {
            panic!("expected assignment");
        };
        assert!(matches!(right, Expression::Identifier { .. }));
    }

    #[test]
    fn test_pointer_difference_divides_by_element_size() {
        let program =
            parse_ok("long f(int *p, int *q) { return p - q; }");
        let Statement::Return(expr) = &program.functions[0].body.statements[0] else {
            panic!("expected return");
        };
        let Expression::Divide(division) = expr else {
            panic!("expected divide, got {:?}", expr);
        };
        assert!(matches!(&*division.left, Expression::Subtract(_)));
        assert!(matches!(
            &*division.right,
            Expression::Number { value: 4, .. }
        ));
    }

    #[test]
    fn test_undeclared_identifier_diagnostic() {
        let program = parse_ok("int x; int main(void) { y = 1; return 0; }");
        assert_eq!(program.diagnostics, vec!["'y' undeclared"]);
    }

    #[test]
    fn test_conflicting_function_declarations() {
        let program = parse_ok("int f(); long f(); int main(void) { return 0; }");
        assert_eq!(program.diagnostics, vec!["conflicting types for 'f'"]);
    }

    #[test]
    fn test_call_through_prototype() {
        let program = parse_ok(
            "int twice(int n) { return n + n; } int main(void) { return twice(21); }",
        );
        assert!(program.diagnostics.is_empty());
        let Statement::Return(Expression::Call { arguments, ty, .. }) =
            &program.functions[1].body.statements[0]
        else {
            panic!("expected call");
        };
        assert_eq!(arguments.len(), 1);
        assert_eq!(*ty, Type::int());
    }

    #[test]
    fn test_bad_call_arity() {
        let program = parse_ok("int twice(int n) { return n; } int main(void) { return twice(); }");
        assert_eq!(
            program.diagnostics,
            vec!["invalid arguments to called function"]
        );
    }

    #[test]
    fn test_lvalue_required() {
        let program = parse_ok("int main(void) { int a; 3 = a; return 0; }");
        assert_eq!(program.diagnostics, vec!["lvalue required in expression"]);

        let program = parse_ok("int a[4]; int main(void) { a = 0; return 0; }");
        assert_eq!(program.diagnostics, vec!["lvalue required in expression"]);
    }

    #[test]
    fn test_error_poisons_silently() {
        // One diagnostic for y, nothing for the arithmetic on top of it.
        let program = parse_ok("int main(void) { int a; a = y + 1 * 2; return a; }");
        assert_eq!(program.diagnostics, vec!["'y' undeclared"]);
    }

    #[test]
    fn test_comparison_operands_widen() {
        let program = parse_ok("int main(void) { int a; long b; a = 0; b = 1; if (a < b) return 1; return 0; }");
        assert!(program.diagnostics.is_empty());
        let Statement::If { condition, .. } = &program.functions[0].body.statements[2] else {
            panic!("expected if");
        };
        let Expression::LessThan(comparison) = condition else {
            panic!("expected comparison");
        };
        // The int side was widened to match the long side.
        assert!(matches!(&*comparison.left, Expression::Cast(_)));
        assert_eq!(comparison.left.ty(), &Type::long());
    }
}
