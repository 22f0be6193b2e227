use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use crate::{
    ast::{Block, Expression, Identifier, InfixOperator, PrefixOperator, Program, Statement},
    tokenizer::{Token, TokenType, Tokenizer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Equals,      // == !=
    LessGreater, // < >
    Sum,         // + -
    Product,     // * /
    Prefix,      // -x !x
    Call,        // f(x)
}

fn infix_precedence(token_type: &TokenType) -> Precedence {
    match token_type {
        TokenType::EqualEqual | TokenType::BangEqual => Precedence::Equals,
        TokenType::Less | TokenType::Greater => Precedence::LessGreater,
        TokenType::Plus | TokenType::Minus => Precedence::Sum,
        TokenType::Star | TokenType::Slash => Precedence::Product,
        TokenType::LeftParen => Precedence::Call,
        _ => Precedence::Lowest,
    }
}

#[derive(Debug)]
pub struct ParseErrors(pub Vec<ParseErrorWithContext>);

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Found {} errors during parsing", self.0.len())?;
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    pub token: Token,
    context: Vec<&'static str>,
}

impl ParseErrorWithContext {
    /// Names of the grammar rules that were being parsed, outermost first.
    pub fn context(&self) -> &[&'static str] {
        &self.context
    }
}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.token.span, self.error)?;
        if !self.context.is_empty() {
            write!(f, " (in {})", self.context.join(" > "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected next token to be {expected}, got {found}")]
    Expected {
        expected: TokenType,
        found: TokenType,
    },
    #[error("no prefix parse rule for {0} found")]
    NoPrefixRule(TokenType),
    #[error("could not parse \"{0}\" as integer")]
    InvalidInteger(String),
}

/// Stack of the grammar rules currently being parsed.
///
/// Entries are pushed through [`ParseContext::push`] and popped when the
/// returned guard is dropped. With the `trace` feature every push and pop is
/// printed to stderr, indented by nesting depth.
#[derive(Debug, Default)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
}

impl ParseContext {
    fn push(self: &Rc<Self>, name: &'static str) -> ParseContextGuard {
        self.stack.borrow_mut().push(name);
        #[cfg(feature = "trace")]
        self.trace("BEGIN", name);
        ParseContextGuard::new(Rc::clone(self))
    }

    fn pop(&self) {
        #[cfg(feature = "trace")]
        if let Some(&name) = self.stack.borrow().last() {
            self.trace("END", name);
        }
        self.stack.borrow_mut().pop();
    }

    fn snapshot(&self) -> Vec<&'static str> {
        self.stack.borrow().clone()
    }

    #[cfg(feature = "trace")]
    fn trace(&self, event: &str, name: &str) {
        let depth = self.stack.borrow().len();
        eprintln!("{}{} {}", "\t".repeat(depth.saturating_sub(1)), event, name);
    }
}

struct ParseContextGuard {
    context: Rc<ParseContext>,
}

impl ParseContextGuard {
    fn new(context: Rc<ParseContext>) -> Self {
        Self { context }
    }
}

impl Drop for ParseContextGuard {
    fn drop(&mut self) {
        self.context.pop();
    }
}

#[derive(Debug, Clone, Copy)]
enum PrefixRule {
    Identifier,
    Integer,
    Boolean,
    Prefix,
    Grouped,
    If,
    Function,
}

#[derive(Debug, Clone, Copy)]
enum InfixRule {
    Binary,
    Call,
}

/// Parses a whole source text, failing if any diagnostic was recorded.
pub fn parse(source: &str) -> Result<Program, ParseErrors> {
    let mut parser = Parser::new(source);
    let program = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(ParseErrors(parser.errors))
    }
}

pub struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    current: Token,
    peek: Token,
    errors: Vec<ParseErrorWithContext>,
    prefix_rules: FxHashMap<TokenType, PrefixRule>,
    infix_rules: FxHashMap<TokenType, InfixRule>,
    context: Rc<ParseContext>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::from_tokenizer(Tokenizer::new(source))
    }

    pub fn from_tokenizer(mut tokenizer: Tokenizer<'a>) -> Self {
        let current = tokenizer.next_token();
        let peek = tokenizer.next_token();

        let mut parser = Self {
            tokenizer,
            current,
            peek,
            errors: Vec::new(),
            prefix_rules: FxHashMap::default(),
            infix_rules: FxHashMap::default(),
            context: Rc::new(ParseContext::default()),
        };

        parser.register_prefix(TokenType::Identifier, PrefixRule::Identifier);
        parser.register_prefix(TokenType::Int, PrefixRule::Integer);
        parser.register_prefix(TokenType::True, PrefixRule::Boolean);
        parser.register_prefix(TokenType::False, PrefixRule::Boolean);
        parser.register_prefix(TokenType::Bang, PrefixRule::Prefix);
        parser.register_prefix(TokenType::Minus, PrefixRule::Prefix);
        parser.register_prefix(TokenType::LeftParen, PrefixRule::Grouped);
        parser.register_prefix(TokenType::If, PrefixRule::If);
        parser.register_prefix(TokenType::Function, PrefixRule::Function);

        for token_type in [
            TokenType::Plus,
            TokenType::Minus,
            TokenType::Star,
            TokenType::Slash,
            TokenType::EqualEqual,
            TokenType::BangEqual,
            TokenType::Less,
            TokenType::Greater,
        ] {
            parser.register_infix(token_type, InfixRule::Binary);
        }
        parser.register_infix(TokenType::LeftParen, InfixRule::Call);

        parser
    }

    fn register_prefix(&mut self, token_type: TokenType, rule: PrefixRule) {
        self.prefix_rules.insert(token_type, rule);
    }

    fn register_infix(&mut self, token_type: TokenType, rule: InfixRule) {
        self.infix_rules.insert(token_type, rule);
    }

    pub fn errors(&self) -> &[ParseErrorWithContext] {
        &self.errors
    }

    pub fn parse_program(&mut self) -> Program {
        let _guard = self.context.push("program");
        let mut statements = Vec::new();

        while self.current.token_type != TokenType::Eof {
            if let Some(statement) = self.statement() {
                statements.push(statement);
            }
            self.advance();
        }

        Program(statements)
    }

    fn advance(&mut self) {
        self.current = std::mem::replace(&mut self.peek, self.tokenizer.next_token());
    }

    fn current_is(&self, token_type: TokenType) -> bool {
        self.current.token_type == token_type
    }

    fn peek_is(&self, token_type: TokenType) -> bool {
        self.peek.token_type == token_type
    }

    fn expect_peek(&mut self, token_type: TokenType) -> Option<()> {
        if self.peek_is(token_type) {
            self.advance();
            Some(())
        } else {
            self.error(
                ParseError::Expected {
                    expected: token_type,
                    found: self.peek.token_type,
                },
                self.peek.clone(),
            );
            None
        }
    }

    fn skip_semicolon(&mut self) {
        if self.peek_is(TokenType::Semicolon) {
            self.advance();
        }
    }

    fn error(&mut self, error: ParseError, token: Token) {
        self.errors.push(ParseErrorWithContext {
            error,
            token,
            context: self.context.snapshot(),
        });
    }

    fn statement(&mut self) -> Option<Statement> {
        let _guard = self.context.push("statement");
        match self.current.token_type {
            TokenType::Let => self.let_statement(),
            TokenType::Return => self.return_statement(),
            _ => self.expression_statement(),
        }
    }

    fn let_statement(&mut self) -> Option<Statement> {
        let _guard = self.context.push("let_statement");
        let token = self.current.clone();

        self.expect_peek(TokenType::Identifier)?;
        let name = self.identifier();

        self.expect_peek(TokenType::Assign)?;
        self.advance();

        let value = self.expression(Precedence::Lowest)?;
        self.skip_semicolon();

        Some(Statement::Let { token, name, value })
    }

    fn return_statement(&mut self) -> Option<Statement> {
        let _guard = self.context.push("return_statement");
        let token = self.current.clone();

        if self.peek_is(TokenType::Semicolon) {
            self.advance();
            return Some(Statement::Return { token, value: None });
        }
        if self.peek_is(TokenType::RightBrace) || self.peek_is(TokenType::Eof) {
            return Some(Statement::Return { token, value: None });
        }

        self.advance();
        let value = self.expression(Precedence::Lowest)?;
        self.skip_semicolon();

        Some(Statement::Return {
            token,
            value: Some(value),
        })
    }

    fn expression_statement(&mut self) -> Option<Statement> {
        let _guard = self.context.push("expression_statement");
        let token = self.current.clone();

        let expression = self.expression(Precedence::Lowest)?;
        self.skip_semicolon();

        Some(Statement::Expression { token, expression })
    }

    fn block(&mut self) -> Block {
        let _guard = self.context.push("block");
        let token = self.current.clone();
        let mut statements = Vec::new();

        self.advance();
        while !self.current_is(TokenType::RightBrace) && !self.current_is(TokenType::Eof) {
            if let Some(statement) = self.statement() {
                statements.push(statement);
            }
            self.advance();
        }

        Block { token, statements }
    }

    fn expression(&mut self, precedence: Precedence) -> Option<Expression> {
        let _guard = self.context.push("expression");

        let Some(rule) = self.prefix_rules.get(&self.current.token_type).copied() else {
            self.error(
                ParseError::NoPrefixRule(self.current.token_type),
                self.current.clone(),
            );
            return None;
        };
        let mut left = self.prefix(rule)?;

        while !self.peek_is(TokenType::Semicolon)
            && precedence < infix_precedence(&self.peek.token_type)
        {
            let Some(rule) = self.infix_rules.get(&self.peek.token_type).copied() else {
                break;
            };
            self.advance();
            left = self.infix(rule, left)?;
        }

        Some(left)
    }

    fn prefix(&mut self, rule: PrefixRule) -> Option<Expression> {
        match rule {
            PrefixRule::Identifier => Some(Expression::Identifier(self.identifier())),
            PrefixRule::Integer => self.integer(),
            PrefixRule::Boolean => Some(Expression::Boolean {
                token: self.current.clone(),
                value: self.current_is(TokenType::True),
            }),
            PrefixRule::Prefix => self.prefix_expression(),
            PrefixRule::Grouped => self.grouped_expression(),
            PrefixRule::If => self.if_expression(),
            PrefixRule::Function => self.function_literal(),
        }
    }

    fn infix(&mut self, rule: InfixRule, left: Expression) -> Option<Expression> {
        match rule {
            InfixRule::Binary => self.infix_expression(left),
            InfixRule::Call => self.call_expression(left),
        }
    }

    fn identifier(&self) -> Identifier {
        Identifier {
            token: self.current.clone(),
            name: self.current.lexeme.clone(),
        }
    }

    fn integer(&mut self) -> Option<Expression> {
        let token = self.current.clone();
        match token.lexeme.parse::<i64>() {
            Ok(value) => Some(Expression::Integer { token, value }),
            Err(_) => {
                self.error(ParseError::InvalidInteger(token.lexeme.clone()), token);
                None
            }
        }
    }

    fn prefix_expression(&mut self) -> Option<Expression> {
        let _guard = self.context.push("prefix_expression");
        let token = self.current.clone();
        let operator = PrefixOperator::from_token_type(&token.token_type)?;

        self.advance();
        let right = self.expression(Precedence::Prefix)?;

        Some(Expression::Prefix {
            token,
            operator,
            right: Box::new(right),
        })
    }

    fn infix_expression(&mut self, left: Expression) -> Option<Expression> {
        let _guard = self.context.push("infix_expression");
        let token = self.current.clone();
        let operator = InfixOperator::from_token_type(&token.token_type)?;
        let precedence = infix_precedence(&token.token_type);

        self.advance();
        let right = self.expression(precedence)?;

        Some(Expression::Infix {
            token,
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    fn grouped_expression(&mut self) -> Option<Expression> {
        let _guard = self.context.push("grouped_expression");
        self.advance();
        let expression = self.expression(Precedence::Lowest)?;
        self.expect_peek(TokenType::RightParen)?;
        Some(expression)
    }

    fn if_expression(&mut self) -> Option<Expression> {
        let _guard = self.context.push("if_expression");
        let token = self.current.clone();

        self.expect_peek(TokenType::LeftParen)?;
        self.advance();
        let condition = self.expression(Precedence::Lowest)?;
        self.expect_peek(TokenType::RightParen)?;

        self.expect_peek(TokenType::LeftBrace)?;
        let consequence = self.block();

        let alternative = if self.peek_is(TokenType::Else) {
            self.advance();
            self.expect_peek(TokenType::LeftBrace)?;
            Some(self.block())
        } else {
            None
        };

        Some(Expression::If {
            token,
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn function_literal(&mut self) -> Option<Expression> {
        let _guard = self.context.push("function_literal");
        let token = self.current.clone();

        self.expect_peek(TokenType::LeftParen)?;
        let parameters = self.function_parameters()?;

        self.expect_peek(TokenType::LeftBrace)?;
        let body = self.block();

        Some(Expression::Function {
            token,
            parameters,
            body,
        })
    }

    fn function_parameters(&mut self) -> Option<Vec<Identifier>> {
        let mut parameters = Vec::new();

        if self.peek_is(TokenType::RightParen) {
            self.advance();
            return Some(parameters);
        }

        self.expect_peek(TokenType::Identifier)?;
        parameters.push(self.identifier());

        while self.peek_is(TokenType::Comma) {
            self.advance();
            self.expect_peek(TokenType::Identifier)?;
            parameters.push(self.identifier());
        }

        self.expect_peek(TokenType::RightParen)?;
        Some(parameters)
    }

    fn call_expression(&mut self, function: Expression) -> Option<Expression> {
        let _guard = self.context.push("call_expression");
        let token = self.current.clone();
        let arguments = self.call_arguments()?;

        Some(Expression::Call {
            token,
            function: Box::new(function),
            arguments,
        })
    }

    fn call_arguments(&mut self) -> Option<Vec<Expression>> {
        let mut arguments = Vec::new();

        if self.peek_is(TokenType::RightParen) {
            self.advance();
            return Some(arguments);
        }

        self.advance();
        arguments.push(self.expression(Precedence::Lowest)?);

        while self.peek_is(TokenType::Comma) {
            self.advance();
            self.advance();
            arguments.push(self.expression(Precedence::Lowest)?);
        }

        self.expect_peek(TokenType::RightParen)?;
        Some(arguments)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_valid(source: &str) -> Program {
        match parse(source) {
            Ok(program) => program,
            Err(errors) => panic!("{source:?} should parse without errors:\n{errors}"),
        }
    }

    fn single_expression(source: &str) -> Expression {
        let program = parse_valid(source);
        assert_eq!(program.0.len(), 1, "{source:?} should be one statement");
        match program.0.into_iter().next() {
            Some(Statement::Expression { expression, .. }) => expression,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_let_statements() {
        let program = parse_valid("let x = 5;\nlet y = true;\nlet foobar = y;");
        let expected = [("x", "5"), ("y", "true"), ("foobar", "y")];

        assert_eq!(program.0.len(), expected.len());
        for (statement, (expected_name, expected_value)) in program.0.iter().zip(expected) {
            assert_eq!(statement.token().lexeme, "let");
            let Statement::Let { name, value, .. } = statement else {
                panic!("expected let statement, got {statement:?}");
            };
            assert_eq!(name.name, expected_name);
            assert_eq!(name.token.lexeme, expected_name);
            assert_eq!(value.to_string(), expected_value);
        }
    }

    #[test]
    fn test_return_statements() {
        let program = parse_valid("return 5;\nreturn x + y;\nreturn;");
        let rendered: Vec<_> = program.0.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["return 5;", "return (x + y);", "return;"]);
        assert!(program
            .0
            .iter()
            .all(|statement| statement.token().token_type == TokenType::Return));
    }

    #[test]
    fn test_identifier_expression() {
        let expression = single_expression("foobar;");
        let Expression::Identifier(identifier) = expression else {
            panic!("expected identifier, got {expression:?}");
        };
        assert_eq!(identifier.name, "foobar");
        assert_eq!(identifier.token.token_type, TokenType::Identifier);
    }

    #[test]
    fn test_integer_literal() {
        let expression = single_expression("5;");
        assert!(matches!(expression, Expression::Integer { value: 5, .. }));
        assert_eq!(expression.token().lexeme, "5");
    }

    #[test]
    fn test_boolean_literals() {
        assert!(matches!(
            single_expression("true"),
            Expression::Boolean { value: true, .. }
        ));
        assert!(matches!(
            single_expression("false;"),
            Expression::Boolean { value: false, .. }
        ));
    }

    #[test]
    fn test_prefix_expressions() {
        let cases = [
            ("!5;", PrefixOperator::Not, "5"),
            ("-15;", PrefixOperator::Negate, "15"),
            ("!true;", PrefixOperator::Not, "true"),
            ("-a", PrefixOperator::Negate, "a"),
        ];

        for (source, expected_operator, expected_right) in cases {
            let Expression::Prefix {
                operator, right, ..
            } = single_expression(source)
            else {
                panic!("{source:?} should be a prefix expression");
            };
            assert_eq!(operator, expected_operator);
            assert_eq!(right.to_string(), expected_right);
        }
    }

    #[test]
    fn test_infix_expressions() {
        let cases = [
            ("5 + 5;", InfixOperator::Plus),
            ("5 - 5;", InfixOperator::Minus),
            ("5 * 5;", InfixOperator::Multiply),
            ("5 / 5;", InfixOperator::Divide),
            ("5 > 5;", InfixOperator::GreaterThan),
            ("5 < 5;", InfixOperator::LessThan),
            ("5 == 5;", InfixOperator::Equal),
            ("5 != 5;", InfixOperator::NotEqual),
        ];

        for (source, expected_operator) in cases {
            let Expression::Infix {
                left,
                operator,
                right,
                ..
            } = single_expression(source)
            else {
                panic!("{source:?} should be an infix expression");
            };
            assert_eq!(operator, expected_operator);
            assert!(matches!(*left, Expression::Integer { value: 5, .. }));
            assert!(matches!(*right, Expression::Integer { value: 5, .. }));
        }
    }

    #[test]
    fn test_operator_precedence() {
        let cases = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b - c", "((a + b) - c)"),
            ("a - b - c", "((a - b) - c)"),
            ("a * b * c", "((a * b) * c)"),
            ("a * b / c", "((a * b) / c)"),
            ("a + b / c", "(a + (b / c))"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("3 + 4; -5 * 5", "(3 + 4);((-5) * 5)"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("5 < 4 != 3 > 4", "((5 < 4) != (3 > 4))"),
            (
                "3 + 4 * 5 == 3 * 1 + 4 * 5",
                "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))",
            ),
            ("true", "true"),
            ("3 > 5 == false", "((3 > 5) == false)"),
            ("3 < 5 == true", "((3 < 5) == true)"),
            ("1 + (2 + 3) + 4", "((1 + (2 + 3)) + 4)"),
            ("(5 + 5) * 2", "((5 + 5) * 2)"),
            ("2 / (5 + 5)", "(2 / (5 + 5))"),
            ("-(5 + 5)", "(-(5 + 5))"),
            ("!(true == true)", "(!(true == true))"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            (
                "add(a, b, 1, 2 * 3, 4 + 5, add(6, 7 * 8))",
                "add(a, b, 1, (2 * 3), (4 + 5), add(6, (7 * 8)))",
            ),
            (
                "add(a + b + c * d / f + g)",
                "add((((a + b) + ((c * d) / f)) + g))",
            ),
        ];

        for (source, expected) in cases {
            assert_eq!(parse_valid(source).to_string(), expected, "source: {source:?}");
        }
    }

    #[test]
    fn test_if_expression() {
        let Expression::If {
            condition,
            consequence,
            alternative,
            ..
        } = single_expression("if (x < y) { x }")
        else {
            panic!("expected if expression");
        };
        assert_eq!(condition.to_string(), "(x < y)");
        assert_eq!(consequence.statements.len(), 1);
        assert_eq!(consequence.to_string(), "{ x; }");
        assert!(alternative.is_none());
    }

    #[test]
    fn test_if_else_expression() {
        let expression = single_expression("if (x < y) { x } else { y; z }");
        let Expression::If { alternative, .. } = &expression else {
            panic!("expected if expression");
        };
        let alternative = alternative.as_ref().map(|block| block.statements.len());
        assert_eq!(alternative, Some(2));
        assert_eq!(expression.to_string(), "if ((x < y)) { x; } else { y; z; }");
    }

    #[test]
    fn test_function_literal() {
        let Expression::Function {
            parameters, body, ..
        } = single_expression("fn(x, y) { x + y; }")
        else {
            panic!("expected function literal");
        };
        let names: Vec<_> = parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(body.to_string(), "{ (x + y); }");
    }

    #[test]
    fn test_function_parameters() {
        let cases: [(&str, &[&str]); 3] = [
            ("fn() {};", &[]),
            ("fn(x) {};", &["x"]),
            ("fn(x, y, z) {};", &["x", "y", "z"]),
        ];

        for (source, expected) in cases {
            let Expression::Function { parameters, .. } = single_expression(source) else {
                panic!("{source:?} should be a function literal");
            };
            let names: Vec<_> = parameters.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn test_call_expression() {
        let Expression::Call {
            function,
            arguments,
            ..
        } = single_expression("add(1, 2 * 3, 4 + 5);")
        else {
            panic!("expected call expression");
        };
        assert_eq!(function.to_string(), "add");
        let arguments: Vec<_> = arguments.iter().map(ToString::to_string).collect();
        assert_eq!(arguments, vec!["1", "(2 * 3)", "(4 + 5)"]);
    }

    #[test]
    fn test_call_on_function_literal() {
        assert_eq!(
            parse_valid("fn(x) { x }(5)").to_string(),
            "fn(x) { x; }(5)"
        );
    }

    #[test]
    fn test_semicolons_are_optional() {
        let program = parse_valid("1 2\nlet a = 3 a");
        assert_eq!(program.0.len(), 4);
    }

    #[test]
    fn test_render_round_trip() {
        let sources = [
            "-a * b",
            "a + b * c + d / e - f",
            "(5 + 5) * 2",
            "add(a + b + c * d / f + g)",
            "!(true == false)",
            "let x = 1 + 2 * 3;",
            "return fn(a) { a };",
            "if (x < y) { x } else { y }",
            "if (x) { let y = x; return y; }",
            "fn(x, y) { return x + y; }(1, 2)",
            "let f = fn() { };",
            "return;",
            "fn(f) { f(fn(x) { -x }) }",
            "a; b",
            "3 + 4; -5 * 5",
            "let a = 1; a; return a",
            "f(1); g(2) - 3",
        ];

        for source in sources {
            let program = parse_valid(source);
            let first = program.to_string();
            let reparsed = parse_valid(&first);
            assert_eq!(reparsed.0.len(), program.0.len(), "source: {source:?}");
            assert_eq!(first, reparsed.to_string(), "source: {source:?}");
        }
    }

    #[test]
    fn test_let_missing_assign() {
        let mut parser = Parser::new("let x 5;");
        let program = parser.parse_program();

        assert!(!parser.errors().is_empty());
        assert_eq!(
            parser.errors()[0].error,
            ParseError::Expected {
                expected: TokenType::Assign,
                found: TokenType::Int,
            }
        );
        assert!(!program
            .0
            .iter()
            .any(|statement| matches!(statement, Statement::Let { .. })));
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let mut parser = Parser::new("let = 10;\nlet 838383;\nlet x = 1;");
        let program = parser.parse_program();

        let errors: Vec<_> = parser.errors().iter().map(|e| e.error.clone()).collect();
        assert!(errors.contains(&ParseError::Expected {
            expected: TokenType::Identifier,
            found: TokenType::Assign,
        }));
        assert!(errors.contains(&ParseError::Expected {
            expected: TokenType::Identifier,
            found: TokenType::Int,
        }));
        assert!(program
            .0
            .iter()
            .any(|statement| statement.to_string() == "let x = 1;"));
    }

    #[test]
    fn test_no_prefix_rule() {
        let mut parser = Parser::new("@");
        let program = parser.parse_program();

        assert!(program.0.is_empty());
        assert_eq!(parser.errors().len(), 1);
        assert_eq!(
            parser.errors()[0].error,
            ParseError::NoPrefixRule(TokenType::Illegal)
        );
        assert_eq!(parser.errors()[0].token.lexeme, "@");
    }

    #[test]
    fn test_integer_out_of_range() {
        let Err(errors) = parse("9223372036854775808") else {
            panic!("integer overflow should be a parse error");
        };
        assert_eq!(
            errors.0[0].error,
            ParseError::InvalidInteger("9223372036854775808".to_string())
        );
    }

    #[test]
    fn test_unclosed_group() {
        let Err(errors) = parse("(1 + 2") else {
            panic!("unclosed group should be a parse error");
        };
        assert_eq!(
            errors.0[0].error,
            ParseError::Expected {
                expected: TokenType::RightParen,
                found: TokenType::Eof,
            }
        );
    }

    #[test]
    fn test_unterminated_block_is_accepted() {
        let program = parse_valid("if (x) { y");
        assert_eq!(program.to_string(), "if (x) { y; }");
    }

    #[test]
    fn test_error_context() {
        let Err(errors) = parse("let x 5;") else {
            panic!("missing assign should be a parse error");
        };
        assert_eq!(
            errors.0[0].context(),
            &["program", "statement", "let_statement"]
        );
        assert_eq!(
            errors.0[0].to_string(),
            "1:7: expected next token to be =, got INT (in program > statement > let_statement)"
        );
    }

    #[test]
    fn test_parse_context_nesting() {
        let context = Rc::new(ParseContext::default());
        {
            let _program = context.push("program");
            {
                let _statement = context.push("statement");
                let _expression = context.push("expression");
                assert_eq!(context.snapshot(), ["program", "statement", "expression"]);
            }
            assert_eq!(context.snapshot(), ["program"]);
        }
        assert!(context.snapshot().is_empty());
    }

    #[test]
    fn test_parse_context_unwinds_after_errors() {
        let mut parser = Parser::new("let f = fn(a) { if (a { a + 1 } }; let = 2;");
        parser.parse_program();

        assert!(!parser.errors().is_empty());
        assert!(parser.context.snapshot().is_empty());
    }
}
