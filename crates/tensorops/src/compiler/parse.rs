//! Text front-end: index-notation source to syntax tree.
//!
//! Statements are separated by newlines or `;` at bracket depth zero.
//! Inside brackets three index syntaxes are recognized: a comma list
//! `A[i,j]`, a space-separated row `A[i j]`, and a two-row form
//! `A[i j; k l]` whose `;` splits the left (codomain) and right (domain)
//! index lists. Primes mark indices (`j'`) or, on a subscripted form,
//! the adjoint (`A[i,j]'`).

use crate::compiler::ast::{AssignKind, Expr};
use crate::error::TensorOpsError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Num(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Prime,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    ColonEq,
    PlusEq,
    MinusEq,
    Newline,
}

fn lex(src: &str) -> Result<Vec<Token>, TensorOpsError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    let mut depth = 0usize;
    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\n' => {
                chars.next();
                if depth == 0 {
                    tokens.push(Token::Newline);
                }
            }
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        if depth == 0 {
                            tokens.push(Token::Newline);
                        }
                        break;
                    }
                }
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                depth += 1;
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                depth = depth.saturating_sub(1);
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ';' => {
                chars.next();
                if depth == 0 {
                    tokens.push(Token::Newline);
                } else {
                    tokens.push(Token::Semi);
                }
            }
            '\'' | '′' => {
                chars.next();
                tokens.push(Token::Prime);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '+' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::PlusEq);
                } else {
                    tokens.push(Token::Plus);
                }
            }
            '-' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::MinusEq);
                } else {
                    tokens.push(Token::Minus);
                }
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            ':' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::ColonEq);
                } else {
                    return Err(TensorOpsError::invalid_expression("stray `:`"));
                }
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let mut is_float = false;
                if chars.peek() == Some(&'.') {
                    is_float = true;
                    text.push('.');
                    chars.next();
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() {
                            text.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                if matches!(chars.peek(), Some(&'e') | Some(&'E')) {
                    is_float = true;
                    text.push('e');
                    chars.next();
                    if matches!(chars.peek(), Some(&'+') | Some(&'-')) {
                        text.push(chars.next().unwrap());
                    }
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() {
                            text.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                if is_float {
                    let value: f64 = text.parse().map_err(|_| {
                        TensorOpsError::invalid_expression(format!("bad number `{}`", text))
                    })?;
                    tokens.push(Token::Num(value));
                } else {
                    let value: i64 = text.parse().map_err(|_| {
                        TensorOpsError::invalid_expression(format!("bad number `{}`", text))
                    })?;
                    tokens.push(Token::Int(value));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            other => {
                return Err(TensorOpsError::invalid_expression(format!(
                    "unexpected character `{}`",
                    other
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Token) -> bool {
        if self.peek() == Some(t) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: &Token) -> Result<(), TensorOpsError> {
        if self.eat(t) {
            Ok(())
        } else {
            Err(TensorOpsError::invalid_expression(format!(
                "expected {:?}, found {:?}",
                t,
                self.peek()
            )))
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    /// statement := expr [assign_op expr]
    fn statement(&mut self) -> Result<Expr, TensorOpsError> {
        let lhs = self.expr()?;
        let kind = match self.peek() {
            Some(Token::Eq) => Some(AssignKind::Assign),
            Some(Token::ColonEq) => Some(AssignKind::Define),
            Some(Token::PlusEq) => Some(AssignKind::AddAssign),
            Some(Token::MinusEq) => Some(AssignKind::SubAssign),
            _ => None,
        };
        match kind {
            Some(kind) => {
                self.next();
                let rhs = self.expr()?;
                Ok(Expr::Assign {
                    kind,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            None => Ok(lhs),
        }
    }

    /// expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Expr, TensorOpsError> {
        let mut acc = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.term()?;
                acc = Expr::call("+", vec![acc, rhs]);
            } else if self.eat(&Token::Minus) {
                let rhs = self.term()?;
                acc = Expr::call("-", vec![acc, rhs]);
            } else {
                break;
            }
        }
        Ok(acc)
    }

    /// term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Expr, TensorOpsError> {
        let mut acc = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                let rhs = self.unary()?;
                // Products are flattened n-ary calls.
                acc = match acc {
                    Expr::Call { head, mut args } if head == "*" => {
                        args.push(rhs);
                        Expr::Call { head, args }
                    }
                    other => Expr::call("*", vec![other, rhs]),
                };
            } else if self.eat(&Token::Slash) {
                let rhs = self.unary()?;
                acc = Expr::call("/", vec![acc, rhs]);
            } else {
                break;
            }
        }
        Ok(acc)
    }

    /// unary := ('-' | '+') unary | postfix
    fn unary(&mut self) -> Result<Expr, TensorOpsError> {
        if self.eat(&Token::Minus) {
            let inner = self.unary()?;
            return Ok(Expr::call("-", vec![inner]));
        }
        if self.eat(&Token::Plus) {
            let inner = self.unary()?;
            return Ok(Expr::call("+", vec![inner]));
        }
        self.postfix()
    }

    /// postfix := atom ('[' indices ']' | prime)*
    fn postfix(&mut self) -> Result<Expr, TensorOpsError> {
        let mut acc = self.atom()?;
        loop {
            if self.eat(&Token::LBracket) {
                let (left, right) = self.index_lists()?;
                self.expect(&Token::RBracket)?;
                acc = Expr::Ref {
                    object: Box::new(acc),
                    left,
                    right,
                };
            } else if self.eat(&Token::Prime) {
                acc = Expr::Prime(Box::new(acc));
            } else {
                break;
            }
        }
        Ok(acc)
    }

    /// atom := ident | ident '(' args ')' | number | '(' expr ')'
    fn atom(&mut self) -> Result<Expr, TensorOpsError> {
        match self.next() {
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.eat(&Token::Comma) {
                                continue;
                            }
                            self.expect(&Token::RParen)?;
                            break;
                        }
                    }
                    Ok(Expr::Call { head: name, args })
                } else {
                    Ok(Expr::Sym(name))
                }
            }
            Some(Token::Int(n)) => Ok(Expr::Int(n)),
            Some(Token::Num(x)) => Ok(Expr::Num(x)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            other => Err(TensorOpsError::invalid_expression(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }

    /// Bracket contents: comma list, space row, or two `;`-separated rows.
    fn index_lists(&mut self) -> Result<(Vec<Expr>, Vec<Expr>), TensorOpsError> {
        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut in_right = false;
        loop {
            match self.peek() {
                Some(Token::RBracket) | None => break,
                Some(Token::Semi) => {
                    if in_right {
                        return Err(TensorOpsError::invalid_expression(
                            "more than two index rows",
                        ));
                    }
                    self.next();
                    in_right = true;
                }
                Some(Token::Comma) => {
                    self.next();
                }
                _ => {
                    let item = self.index_item()?;
                    if in_right {
                        right.push(item);
                    } else {
                        left.push(item);
                    }
                }
            }
        }
        Ok((left, right))
    }

    /// index_item := ['-'] (ident | int) prime*
    fn index_item(&mut self) -> Result<Expr, TensorOpsError> {
        let negated = self.eat(&Token::Minus);
        let mut item = match self.next() {
            Some(Token::Ident(name)) => Expr::Sym(name),
            Some(Token::Int(n)) => Expr::Int(if negated { -n } else { n }),
            other => {
                return Err(TensorOpsError::invalid_expression(format!(
                    "expected an index, found {:?}",
                    other
                )));
            }
        };
        if negated && !matches!(item, Expr::Int(_)) {
            return Err(TensorOpsError::invalid_expression(
                "only integer indices may be negated",
            ));
        }
        while self.eat(&Token::Prime) {
            item = Expr::Prime(Box::new(item));
        }
        Ok(item)
    }
}

/// Parse source text into a block of statements.
///
/// Each statement is preceded by a source-position annotation; the
/// postprocessor strips them from compiled programs.
///
/// # Errors
///
/// `InvalidExpression` on any lexical or syntactic failure.
pub fn parse(src: &str) -> Result<Expr, TensorOpsError> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut stmts = Vec::new();
    let mut line = 1usize;
    parser.skip_newlines();
    while parser.peek().is_some() {
        stmts.push(Expr::Line(format!("statement {}", line)));
        stmts.push(parser.statement()?);
        line += 1;
        if parser.peek().is_some() {
            parser.expect(&Token::Newline)?;
            parser.skip_newlines();
        }
    }
    Ok(Expr::Block(stmts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(src: &str) -> Expr {
        match parse(src).unwrap() {
            Expr::Block(stmts) => stmts
                .into_iter()
                .find(|s| !matches!(s, Expr::Line(_)))
                .unwrap(),
            other => other,
        }
    }

    #[test]
    fn test_parse_ref_comma() {
        let e = single("A[i,j]");
        match e {
            Expr::Ref {
                object,
                left,
                right,
            } => {
                assert_eq!(*object, Expr::sym("A"));
                assert_eq!(left, vec![Expr::sym("i"), Expr::sym("j")]);
                assert!(right.is_empty());
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ref_space_row() {
        let e = single("A[i j]");
        match e {
            Expr::Ref { left, right, .. } => {
                assert_eq!(left.len(), 2);
                assert!(right.is_empty());
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ref_two_rows() {
        let e = single("A[i j; k l]");
        match e {
            Expr::Ref { left, right, .. } => {
                assert_eq!(left, vec![Expr::sym("i"), Expr::sym("j")]);
                assert_eq!(right, vec![Expr::sym("k"), Expr::sym("l")]);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_primed_index_and_adjoint() {
        let e = single("A[i', j]'");
        match e {
            Expr::Prime(inner) => match *inner {
                Expr::Ref { left, .. } => {
                    assert_eq!(left[0], Expr::Prime(Box::new(Expr::sym("i"))));
                }
                other => panic!("unexpected parse: {:?}", other),
            },
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_integer_index() {
        let e = single("A[1,-2]");
        match e {
            Expr::Ref { left, .. } => {
                assert_eq!(left, vec![Expr::Int(1), Expr::Int(-2)]);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_product_flattened() {
        let e = single("A[i,j] * B[j,k] * C[k,l]");
        match e {
            Expr::Call { head, args } => {
                assert_eq!(head, "*");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_define_statement() {
        let e = single("D[a,d] := 2 * A[a,b] * B[b,d]");
        match e {
            Expr::Assign { kind, lhs, .. } => {
                assert_eq!(kind, AssignKind::Define);
                assert!(matches!(*lhs, Expr::Ref { .. }));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_conj_call_and_scalar_factor() {
        let e = single("C[i,j] = conj(A[j,i]) / 2");
        match e {
            Expr::Assign { rhs, .. } => match *rhs {
                Expr::Call { ref head, ref args } => {
                    assert_eq!(head, "/");
                    assert!(matches!(args[0], Expr::Call { .. }));
                    assert_eq!(args[1], Expr::Int(2));
                }
                ref other => panic!("unexpected parse: {:?}", other),
            },
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_multiple_statements() {
        let block = parse("E[a] := A[a,b,b]\nF[a,c] = E[a] * G[a,c]").unwrap();
        let stmts: Vec<&Expr> = block
            .statements()
            .iter()
            .filter(|s| !matches!(s, Expr::Line(_)))
            .collect();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_parse_line_nodes_present() {
        let block = parse("x = scalar(A[i] * B[i])").unwrap();
        assert!(block
            .statements()
            .iter()
            .any(|s| matches!(s, Expr::Line(_))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("A[i,").is_err());
        assert!(parse("A[i] &").is_err());
        assert!(parse(": = 1").is_err());
    }
}
