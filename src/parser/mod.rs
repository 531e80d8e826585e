//! # Rule Text Parser
//!
//! Parses the textual rule format into a [`Program`]: a term store, a
//! symbol store and a sealed rule set. One clause per line, `%` starts a
//! comment. Identifiers beginning with an uppercase letter are variables,
//! scoped to their rule and numbered in first-occurrence order.
//!
//! ```text
//! sort node.            % unbounded sort
//! sort bit 2.           % finite sort with two inhabitants
//! decl edge(node, node).
//! output reach.
//! reach(X, Y) :- edge(X, Y).
//! reach(X, Z) :- reach(X, Y), edge(Y, Z).
//! q(X) :- reach(X, Y), !blocked(Y), X < 10, X = Y + 1.
//! ```
//!
//! Undeclared predicates are registered on first use with a default
//! unbounded sort in every position. Comparisons and arithmetic go to the
//! interpreted tail; `!p(...)` is a negative literal; `!(X < 10)` is an
//! interpreted literal with its negation flag set.

use crate::rules::{PredId, Rule, RuleSet, SymbolStore};
use crate::term::{Op, SortId, TermId, TermStore};
use std::collections::HashMap;
use thiserror::Error;

/// A parsed program: stores plus the sealed rule set.
#[derive(Debug)]
pub struct Program {
    pub store: TermStore,
    pub syms: SymbolStore,
    pub rules: RuleSet,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("parse error at line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Parse a full program. The returned rule set is closed.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new();
    for (nr, raw_line) in source.lines().enumerate() {
        let line = match raw_line.find('%') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        parser.parse_line(line).map_err(|message| ParseError {
            line: nr + 1,
            message,
        })?;
    }
    let Parser {
        store,
        syms,
        mut rules,
        ..
    } = parser;
    rules.close();
    Ok(Program { store, syms, rules })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    Punct(&'static str),
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse().map_err(|_| format!("bad integer `{}`", text))?;
            tokens.push(Token::Int(value));
        } else if c == '"' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            if i == chars.len() {
                return Err("unterminated string literal".to_string());
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
        } else {
            let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let punct = match two.as_str() {
                ":-" => {
                    i += 2;
                    ":-"
                }
                "!=" => {
                    i += 2;
                    "!="
                }
                "<=" => {
                    i += 2;
                    "<="
                }
                ">=" => {
                    i += 2;
                    ">="
                }
                _ => {
                    i += 1;
                    match c {
                        '(' => "(",
                        ')' => ")",
                        ',' => ",",
                        '.' => ".",
                        '!' => "!",
                        '=' => "=",
                        '<' => "<",
                        '>' => ">",
                        '+' => "+",
                        '-' => "-",
                        '*' => "*",
                        '/' => "/",
                        '%' => "%",
                        other => return Err(format!("unexpected character `{}`", other)),
                    }
                }
            };
            tokens.push(Token::Punct(punct));
        }
    }
    Ok(tokens)
}

struct Parser {
    store: TermStore,
    syms: SymbolStore,
    rules: RuleSet,
    default_sort: Option<SortId>,
}

/// Pre-lowered term: variables still carry their source name.
#[derive(Debug, Clone)]
enum RawTerm {
    Var(String),
    Int(i64),
    Str(String),
    Bool(bool),
    App(Op, Vec<RawTerm>),
}

#[derive(Debug)]
enum RawLiteral {
    Atom {
        name: String,
        args: Vec<RawTerm>,
        negated: bool,
    },
    Interpreted {
        term: RawTerm,
        negated: bool,
    },
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
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

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), String> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(format!("expected `{}`", punct))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(format!("expected identifier, found {:?}", other)),
        }
    }
}

impl Parser {
    fn new() -> Self {
        Parser {
            store: TermStore::new(),
            syms: SymbolStore::new(),
            rules: RuleSet::new(),
            default_sort: None,
        }
    }

    fn default_sort(&mut self) -> SortId {
        match self.default_sort {
            Some(s) => s,
            None => {
                let s = self.store.add_sort("value", None);
                self.default_sort = Some(s);
                s
            }
        }
    }

    fn parse_line(&mut self, line: &str) -> Result<(), String> {
        let tokens = tokenize(line)?;
        let mut cur = Cursor { tokens, pos: 0 };
        match cur.peek() {
            Some(Token::Ident(kw)) if kw == "sort" => {
                cur.next();
                let name = cur.ident()?;
                let card = match cur.peek() {
                    Some(Token::Int(n)) => {
                        let n = *n;
                        cur.next();
                        if n <= 0 {
                            return Err("sort cardinality must be positive".to_string());
                        }
                        Some(n as u64)
                    }
                    _ => None,
                };
                cur.expect(".")?;
                self.store.add_sort(&name, card);
                Ok(())
            }
            Some(Token::Ident(kw)) if kw == "decl" => {
                cur.next();
                let name = cur.ident()?;
                let mut domain = Vec::new();
                if cur.eat("(") {
                    loop {
                        let sort_name = cur.ident()?;
                        let sort = self
                            .store
                            .sort_named(&sort_name)
                            .ok_or_else(|| format!("unknown sort `{}`", sort_name))?;
                        domain.push(sort);
                        if !cur.eat(",") {
                            break;
                        }
                    }
                    cur.expect(")")?;
                }
                cur.expect(".")?;
                self.syms.add(&name, domain);
                Ok(())
            }
            Some(Token::Ident(kw)) if kw == "output" => {
                cur.next();
                let name = cur.ident()?;
                cur.expect(".")?;
                let pred = self
                    .syms
                    .lookup(&name)
                    .ok_or_else(|| format!("unknown predicate `{}`", name))?;
                self.rules.set_output(pred);
                Ok(())
            }
            _ => self.parse_rule(&mut cur),
        }
    }

    fn parse_rule(&mut self, cur: &mut Cursor) -> Result<(), String> {
        let head = self.parse_raw_literal(cur)?;
        let RawLiteral::Atom {
            name: head_name,
            args: head_args,
            negated: false,
        } = head
        else {
            return Err("rule head must be a positive atom".to_string());
        };
        let mut body = Vec::new();
        if cur.eat(":-") {
            loop {
                body.push(self.parse_raw_literal(cur)?);
                if !cur.eat(",") {
                    break;
                }
            }
        }
        cur.expect(".")?;
        if cur.peek().is_some() {
            return Err("trailing tokens after `.`".to_string());
        }
        self.lower_rule(head_name, head_args, body)
    }

    fn parse_raw_literal(&mut self, cur: &mut Cursor) -> Result<RawLiteral, String> {
        let negated = cur.eat("!");
        if negated && matches!(cur.peek(), Some(Token::Punct("("))) {
            cur.expect("(")?;
            let term = self.parse_comparison(cur)?;
            cur.expect(")")?;
            return Ok(RawLiteral::Interpreted {
                term,
                negated: true,
            });
        }
        // A lowercase identifier opens an atom unless a comparison
        // operator follows its argument list (predicate applications
        // never nest inside terms).
        let checkpoint = cur.pos;
        if let Some(Token::Ident(name)) = cur.peek().cloned() {
            if !starts_variable(&name) && name != "true" && name != "false" {
                cur.next();
                let mut args = Vec::new();
                if cur.eat("(") {
                    loop {
                        args.push(self.parse_expr(cur)?);
                        if !cur.eat(",") {
                            break;
                        }
                    }
                    cur.expect(")")?;
                }
                if !matches!(
                    cur.peek(),
                    Some(Token::Punct(p)) if comparison_op(p).is_some()
                ) {
                    return Ok(RawLiteral::Atom {
                        name,
                        args,
                        negated,
                    });
                }
                cur.pos = checkpoint;
            }
        }
        let term = self.parse_comparison(cur)?;
        Ok(RawLiteral::Interpreted { term, negated })
    }

    fn parse_comparison(&mut self, cur: &mut Cursor) -> Result<RawTerm, String> {
        let lhs = self.parse_expr(cur)?;
        let op = match cur.peek() {
            Some(Token::Punct(p)) => comparison_op(p),
            _ => None,
        };
        let Some(op) = op else {
            return Err("expected comparison operator".to_string());
        };
        cur.next();
        let rhs = self.parse_expr(cur)?;
        Ok(RawTerm::App(op, vec![lhs, rhs]))
    }

    fn parse_expr(&mut self, cur: &mut Cursor) -> Result<RawTerm, String> {
        let mut lhs = self.parse_term(cur)?;
        while let Some(Token::Punct(p)) = cur.peek() {
            let op = match *p {
                "+" => Op::Add,
                "-" => Op::Sub,
                "*" => Op::Mul,
                "/" => Op::Div,
                "%" => Op::Mod,
                _ => break,
            };
            cur.next();
            let rhs = self.parse_term(cur)?;
            lhs = RawTerm::App(op, vec![lhs, rhs]);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self, cur: &mut Cursor) -> Result<RawTerm, String> {
        match cur.next() {
            Some(Token::Int(n)) => Ok(RawTerm::Int(n)),
            Some(Token::Str(s)) => Ok(RawTerm::Str(s)),
            Some(Token::Punct("-")) => match cur.next() {
                Some(Token::Int(n)) => Ok(RawTerm::Int(-n)),
                other => Err(format!("expected integer after `-`, found {:?}", other)),
            },
            Some(Token::Ident(name)) => {
                if name == "true" {
                    Ok(RawTerm::Bool(true))
                } else if name == "false" {
                    Ok(RawTerm::Bool(false))
                } else if starts_variable(&name) {
                    Ok(RawTerm::Var(name))
                } else {
                    // Lowercase identifiers double as symbolic constants.
                    Ok(RawTerm::Str(name))
                }
            }
            other => Err(format!("expected term, found {:?}", other)),
        }
    }

    /// Lower a raw clause: resolve predicates, assign variable indices in
    /// first-occurrence order (head first), and partition the body.
    fn lower_rule(
        &mut self,
        head_name: String,
        head_args: Vec<RawTerm>,
        body: Vec<RawLiteral>,
    ) -> Result<(), String> {
        let mut vars: HashMap<String, (u32, SortId)> = HashMap::new();

        // First pass: variable sorts come from atom argument positions.
        self.scan_atom_vars(&head_name, &head_args, &mut vars)?;
        for lit in &body {
            if let RawLiteral::Atom { name, args, .. } = lit {
                self.scan_atom_vars(name, args, &mut vars)?;
            }
        }

        let head_pred = self.resolve_pred(&head_name, head_args.len())?;
        let head_lowered = self.lower_args(&head_args, &mut vars)?;
        let head = self.syms.atom(head_pred, head_lowered);

        let mut positive = Vec::new();
        let mut negative = Vec::new();
        let mut interpreted = Vec::new();
        for lit in body {
            match lit {
                RawLiteral::Atom {
                    name,
                    args,
                    negated,
                } => {
                    let pred = self.resolve_pred(&name, args.len())?;
                    let lowered = self.lower_args(&args, &mut vars)?;
                    let atom = self.syms.atom(pred, lowered);
                    if negated {
                        negative.push(atom);
                    } else {
                        positive.push(atom);
                    }
                }
                RawLiteral::Interpreted { term, negated } => {
                    let lowered = self.lower_term(&term, &mut vars)?;
                    interpreted.push((lowered, negated));
                }
            }
        }
        self.rules
            .add_rule(Rule::new(head, positive, negative, interpreted));
        Ok(())
    }

    fn scan_atom_vars(
        &mut self,
        name: &str,
        args: &[RawTerm],
        vars: &mut HashMap<String, (u32, SortId)>,
    ) -> Result<(), String> {
        let pred = self.resolve_pred(name, args.len())?;
        let domain = self.syms.symbol(pred).domain.clone();
        for (i, arg) in args.iter().enumerate() {
            if let RawTerm::Var(v) = arg {
                let next = vars.len() as u32;
                vars.entry(v.clone()).or_insert((next, domain[i]));
            }
        }
        Ok(())
    }

    fn resolve_pred(&mut self, name: &str, arity: usize) -> Result<PredId, String> {
        match self.syms.lookup(name) {
            Some(pred) => {
                if self.syms.arity(pred) != arity {
                    return Err(format!(
                        "predicate `{}` used with arity {}, declared with {}",
                        name,
                        arity,
                        self.syms.arity(pred)
                    ));
                }
                Ok(pred)
            }
            None => {
                let sort = self.default_sort();
                Ok(self.syms.add(name, vec![sort; arity]))
            }
        }
    }

    fn lower_args(
        &mut self,
        args: &[RawTerm],
        vars: &mut HashMap<String, (u32, SortId)>,
    ) -> Result<Vec<TermId>, String> {
        args.iter().map(|a| self.lower_term(a, vars)).collect()
    }

    fn lower_term(
        &mut self,
        term: &RawTerm,
        vars: &mut HashMap<String, (u32, SortId)>,
    ) -> Result<TermId, String> {
        match term {
            RawTerm::Var(name) => {
                let (idx, sort) = match vars.get(name) {
                    Some(&entry) => entry,
                    None => {
                        // First occurrence outside any atom: default sort.
                        let sort = self.default_sort();
                        let idx = vars.len() as u32;
                        vars.insert(name.clone(), (idx, sort));
                        (idx, sort)
                    }
                };
                Ok(self.store.var(idx, sort))
            }
            RawTerm::Int(n) => Ok(self.store.int(*n)),
            RawTerm::Str(s) => Ok(self.store.str_lit(s)),
            RawTerm::Bool(b) => Ok(self.store.bool_lit(*b)),
            RawTerm::App(op, args) => {
                let lowered: Result<Vec<TermId>, String> =
                    args.iter().map(|a| self.lower_term(a, vars)).collect();
                Ok(self.store.app(*op, lowered?))
            }
        }
    }
}

fn starts_variable(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn comparison_op(p: &str) -> Option<Op> {
    match p {
        "=" => Some(Op::Eq),
        "!=" => Some(Op::Ne),
        "<" => Some(Op::Lt),
        "<=" => Some(Op::Le),
        ">" => Some(Op::Gt),
        ">=" => Some(Op::Ge),
        _ => None,
    }
}
