//! A hand-written recursive-descent parser for the selector grammar:
//!
//! ```text
//! selector-list := selector ( ',' selector )*
//! selector      := compound ( combinator compound )*
//! combinator    := '>' | <whitespace>
//! compound      := ( '.' ident | '#' ident | attr )+
//! attr          := '[' ident ( op value )? ']'
//! op            := '=' | '!=' | '>=' | '<=' | '>' | '<' | '^=' | '$=' | '*='
//! value         := quoted-string | bare-token
//! ```

use std::fmt;

use super::ast::{AttrOp, AttrTest, Combinator, Compound, Selector, SelectorList};

#[derive(Debug, Clone)]
pub struct SelectorSyntaxError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for SelectorSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "selector syntax error at {}: {}", self.position, self.message)
    }
}

impl std::error::Error for SelectorSyntaxError {}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, chars: input.chars().collect(), pos: 0 }
    }

    fn err(&self, message: impl Into<String>) -> SelectorSyntaxError {
        SelectorSyntaxError { message: message.into(), position: self.pos }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_inline_space(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c == ' ' || c == '\t') {
            self.pos += 1;
        }
        self.pos != start
    }

    fn parse_ident(&mut self) -> Result<String, SelectorSyntaxError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_ident_start(c) => {
                self.bump();
            }
            _ => return Err(self.err("expected an identifier")),
        }
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.bump();
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, SelectorSyntaxError> {
        self.bump();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let s: String = self.chars[start..self.pos].iter().collect();
                self.bump();
                return Ok(s);
            }
            self.bump();
        }
        Err(self.err("unterminated quoted value"))
    }

    fn parse_bare_value(&mut self) -> Result<String, SelectorSyntaxError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != ']') {
            self.bump();
        }
        if self.pos == start {
            return Err(self.err("expected an attribute value"));
        }
        Ok(self.chars[start..self.pos].iter().collect::<String>().trim().to_string())
    }

    fn parse_value(&mut self) -> Result<String, SelectorSyntaxError> {
        match self.peek() {
            Some('"') => self.parse_quoted('"'),
            Some('\'') => self.parse_quoted('\''),
            _ => self.parse_bare_value(),
        }
    }

    fn parse_op(&mut self) -> Result<&'static str, SelectorSyntaxError> {
        let two: Option<(char, char)> = self.peek().zip(self.peek_at(1));
        match two {
            Some(('!', '=')) => {
                self.pos += 2;
                Ok("!=")
            }
            Some(('>', '=')) => {
                self.pos += 2;
                Ok(">=")
            }
            Some(('<', '=')) => {
                self.pos += 2;
                Ok("<=")
            }
            Some(('^', '=')) => {
                self.pos += 2;
                Ok("^=")
            }
            Some(('$', '=')) => {
                self.pos += 2;
                Ok("$=")
            }
            Some(('*', '=')) => {
                self.pos += 2;
                Ok("*=")
            }
            _ => match self.peek() {
                Some('=') => {
                    self.pos += 1;
                    Ok("=")
                }
                Some('>') => {
                    self.pos += 1;
                    Ok(">")
                }
                Some('<') => {
                    self.pos += 1;
                    Ok("<")
                }
                _ => Err(self.err("expected a comparison operator")),
            },
        }
    }

    fn parse_numeric(&self, raw: &str) -> Result<f64, SelectorSyntaxError> {
        raw.parse::<f64>().map_err(|_| SelectorSyntaxError {
            message: format!("expected a number, found '{raw}'"),
            position: self.pos,
        })
    }

    fn parse_attr(&mut self) -> Result<AttrTest, SelectorSyntaxError> {
        self.bump(); // '['
        let key = self.parse_ident()?;
        if self.peek() == Some(']') {
            self.bump();
            return Ok(AttrTest { key, op: AttrOp::Exists });
        }
        let op = self.parse_op()?;
        let raw_value = self.parse_value()?;
        if self.peek() != Some(']') {
            return Err(self.err("expected closing ']'"));
        }
        self.bump();
        let attr_op = match op {
            "=" => AttrOp::Eq(raw_value),
            "!=" => AttrOp::NotEq(raw_value),
            "^=" => AttrOp::Prefix(raw_value),
            "$=" => AttrOp::Suffix(raw_value),
            "*=" => AttrOp::Contains(raw_value),
            ">" => AttrOp::Gt(self.parse_numeric(&raw_value)?),
            ">=" => AttrOp::Gte(self.parse_numeric(&raw_value)?),
            "<" => AttrOp::Lt(self.parse_numeric(&raw_value)?),
            "<=" => AttrOp::Lte(self.parse_numeric(&raw_value)?),
            _ => unreachable!(),
        };
        Ok(AttrTest { key, op: attr_op })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorSyntaxError> {
        let mut compound = Compound::default();
        loop {
            match self.peek() {
                Some('.') => {
                    self.bump();
                    let name = self.parse_ident()?;
                    if compound.type_name.is_some() {
                        return Err(self.err("a compound selector may only name one type"));
                    }
                    compound.type_name = Some(name);
                }
                Some('#') => {
                    self.bump();
                    let id = self.parse_ident()?;
                    if compound.id.is_some() {
                        return Err(self.err("a compound selector may only name one id"));
                    }
                    compound.id = Some(id);
                }
                Some('[') => {
                    compound.attrs.push(self.parse_attr()?);
                }
                _ => break,
            }
        }
        if compound.is_empty() {
            return Err(self.err("expected a selector (.type, #id, or [attr])"));
        }
        Ok(compound)
    }

    fn parse_selector(&mut self) -> Result<Selector, SelectorSyntaxError> {
        let mut steps = Vec::new();
        let first = self.parse_compound()?;
        steps.push((None, first));
        loop {
            let had_space = self.skip_inline_space();
            match self.peek() {
                Some('>') => {
                    self.bump();
                    self.skip_inline_space();
                    let compound = self.parse_compound()?;
                    steps.push((Some(Combinator::Child), compound));
                }
                Some('.') | Some('#') | Some('[') if had_space => {
                    let compound = self.parse_compound()?;
                    steps.push((Some(Combinator::Descendant), compound));
                }
                _ => break,
            }
        }
        Ok(Selector { steps })
    }

    fn parse_list(&mut self) -> Result<SelectorList, SelectorSyntaxError> {
        let mut selectors = vec![self.parse_selector()?];
        loop {
            self.skip_inline_space();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_inline_space();
                    selectors.push(self.parse_selector()?);
                }
                None => break,
                Some(c) => {
                    return Err(self.err(format!("unexpected character '{c}'")));
                }
            }
        }
        Ok(SelectorList { selectors })
    }
}

pub fn parse(input: &str) -> Result<SelectorList, SelectorSyntaxError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SelectorSyntaxError { message: "empty selector".to_string(), position: 0 });
    }
    let mut parser = Parser::new(trimmed);
    parser.skip_inline_space();
    let list = parser.parse_list()?;
    if parser.pos < parser.chars.len() {
        return Err(parser.err(format!("trailing input: '{}'", &parser.input[parser.pos..])));
    }
    Ok(list)
}
