/* src/cli/compiler/src/scope.rs */

//! Names bound inside one statement. Enough scope tracking to tell which
//! identifiers in a statement refer to module-level bindings: parameters,
//! block declarations, catch clauses and named function expressions shadow
//! outer names within their own brackets.

use std::collections::HashSet;
use std::ops::Range;

use crate::scan::{
  Token, TokenKind, binding_names, ends_statement, is_reserved, pattern_names, starts_statement, text,
};

const PARAM_MODIFIERS: [&str; 5] = ["public", "private", "protected", "readonly", "override"];

struct Binding {
  name: String,
  /// Token indices the binding is visible in.
  scope: Range<usize>,
}

struct Scopes<'a> {
  toks: &'a [Token],
  src: &'a str,
  /// Innermost opener enclosing each token.
  parents: Vec<Option<usize>>,
  bindings: Vec<Binding>,
  /// Parameter lists already bound through a `function` keyword.
  handled: HashSet<usize>,
}

/// Identifiers in `toks` that are neither member names, object keys nor
/// bound somewhere inside `toks`, in source order.
pub(crate) fn free_references<'a>(toks: &[Token], src: &'a str) -> Vec<&'a str> {
  let scopes = Scopes::new(toks, src);
  (0..toks.len()).filter(|&i| scopes.is_free(i)).map(|i| text(src, &toks[i])).collect()
}

impl<'a> Scopes<'a> {
  fn new(toks: &'a [Token], src: &'a str) -> Self {
    let mut parents = Vec::with_capacity(toks.len());
    let mut stack: Vec<usize> = Vec::new();
    for (i, t) in toks.iter().enumerate() {
      while stack.last().is_some_and(|&open| t.depth <= toks[open].depth) {
        stack.pop();
      }
      parents.push(stack.last().copied());
      if toks.get(i + 1).is_some_and(|next| next.depth > t.depth) {
        stack.push(i);
      }
    }
    let mut scopes = Self { toks, src, parents, bindings: Vec::new(), handled: HashSet::new() };
    for i in 0..toks.len() {
      scopes.declare(i);
    }
    scopes
  }

  fn at(&self, i: usize) -> &'a str {
    self.toks.get(i).map_or("", |t| text(self.src, t))
  }

  fn kind(&self, i: usize) -> Option<TokenKind> {
    self.toks.get(i).map(|t| t.kind)
  }

  /// First index past the group opened at `open`. For brackets this is the
  /// closing token itself.
  fn group_end(&self, open: usize) -> usize {
    let depth = self.toks[open].depth;
    (open + 1..self.toks.len()).find(|&j| self.toks[j].depth <= depth).unwrap_or(self.toks.len())
  }

  fn opener_of(&self, close: usize) -> Option<usize> {
    let depth = self.toks[close].depth;
    (0..close).rev().find(|&k| self.toks[k].depth <= depth)
  }

  fn block_of(&self, i: usize) -> Option<Range<usize>> {
    self.parents[i].map(|parent| parent..self.group_end(parent))
  }

  /// End of an expression or declarator list starting at `from`.
  fn expression_end(&self, from: usize, depth: usize, commas: bool) -> usize {
    let mut j = from;
    while let Some(t) = self.toks.get(j) {
      if t.depth < depth {
        break;
      }
      if t.depth == depth {
        let s = self.at(j);
        if s == ";" || (commas && s == ",") {
          break;
        }
        if j > from
          && t.newline_before
          && ends_statement(&self.toks[j - 1], self.src)
          && starts_statement(t, &self.toks[j - 1], self.src)
        {
          break;
        }
      }
      j += 1;
    }
    j
  }

  /// The `{` of a body following the `)` at `close`, skipping a return type.
  fn body_after(&self, close: usize) -> Option<usize> {
    let depth = self.toks.get(close)?.depth;
    match self.at(close + 1) {
      "{" => Some(close + 1),
      ":" => (close + 2..self.toks.len())
        .take_while(|&k| {
          let t = &self.toks[k];
          t.depth > depth || (t.depth == depth && !matches!(self.at(k), ";" | "=>" | ","))
        })
        .find(|&k| self.toks[k].depth == depth && self.at(k) == "{"),
      _ => None,
    }
  }

  /// A `function` or `class` keyword that starts a statement rather than an
  /// expression.
  fn is_declaration(&self, i: usize) -> bool {
    let mut k = i;
    while k > 0 && matches!(self.at(k - 1), "async" | "export" | "default" | "abstract") {
      k -= 1;
    }
    k == 0 || matches!(self.at(k - 1), ";" | "{" | "}")
  }

  fn bind(&mut self, names: Vec<String>, scope: Range<usize>) {
    self.bindings.extend(names.into_iter().map(|name| Binding { name, scope: scope.clone() }));
  }

  fn declare(&mut self, i: usize) {
    match (self.toks[i].kind, self.at(i)) {
      (TokenKind::Ident, "const" | "let" | "var") => self.declare_variables(i),
      (TokenKind::Ident, "function") => self.declare_function(i),
      (TokenKind::Ident, "class") => self.declare_class(i),
      (TokenKind::Punct, "=>") => self.declare_arrow(i),
      (TokenKind::Punct, ")") => self.declare_block_params(i),
      _ => {}
    }
  }

  fn declare_variables(&mut self, i: usize) {
    // module-level declarations are the caller's business
    let Some(parent) = self.parents[i] else { return };
    let first = i + 1;
    if self.kind(first) != Some(TokenKind::Ident) && !matches!(self.at(first), "{" | "[") {
      return;
    }
    let end = self.expression_end(first, self.toks[i].depth, false);
    let names = binding_names(&self.toks[first..end], self.src);
    let scope = if self.at(parent) == "(" { self.loop_scope(parent) } else { parent..self.group_end(parent) };
    self.bind(names, scope);
  }

  /// A `for (...)` head and the body after it.
  fn loop_scope(&self, open: usize) -> Range<usize> {
    let body = self.group_end(open) + 1;
    if body >= self.toks.len() {
      return open..self.toks.len();
    }
    if self.at(body) == "{" {
      open..self.group_end(body)
    } else {
      open..self.expression_end(body, self.toks[open].depth, false)
    }
  }

  fn declare_function(&mut self, i: usize) {
    let depth = self.toks[i].depth;
    let mut j = i + 1;
    if self.at(j) == "*" {
      j += 1;
    }
    let name = (self.kind(j) == Some(TokenKind::Ident)).then(|| self.at(j).to_string());
    let open = (j..self.toks.len())
      .take_while(|&k| self.toks[k].depth >= depth && !matches!(self.at(k), "{" | ";"))
      .find(|&k| self.toks[k].depth == depth && self.at(k) == "(");
    let Some(open) = open else { return };
    let close = self.group_end(open);
    let end = self.body_after(close).map_or(close, |body| self.group_end(body));
    self.handled.insert(open);
    let params = self.param_names(open);
    self.bind(params, open..end);

    if let Some(name) = name {
      if !self.is_declaration(i) {
        self.bind(vec![name], i..end);
      } else if let Some(block) = self.block_of(i) {
        self.bind(vec![name], block);
      }
    }
  }

  fn declare_class(&mut self, i: usize) {
    let name = i + 1;
    if self.kind(name) != Some(TokenKind::Ident) || matches!(self.at(name), "extends" | "implements") {
      return;
    }
    let names = vec![self.at(name).to_string()];
    if self.is_declaration(i) {
      if let Some(block) = self.block_of(i) {
        self.bind(names, block);
      }
      return;
    }
    let depth = self.toks[i].depth;
    let end = (name..self.toks.len())
      .find(|&k| self.toks[k].depth == depth && self.at(k) == "{")
      .map_or(self.toks.len(), |body| self.group_end(body));
    self.bind(names, i..end);
  }

  fn declare_arrow(&mut self, arrow: usize) {
    if arrow == 0 {
      return;
    }
    let end = match self.at(arrow + 1) {
      "{" => self.group_end(arrow + 1),
      _ => self.expression_end(arrow + 1, self.toks[arrow].depth, true),
    };
    let prev = arrow - 1;
    let close = match self.kind(prev) {
      Some(TokenKind::Ident) if prev > 0 && self.at(prev - 1) == ":" => self.return_type_close(arrow),
      Some(TokenKind::Ident) => None,
      _ if self.at(prev) == ")" => Some(prev),
      _ => self.return_type_close(arrow),
    };
    let open = close.and_then(|c| self.opener_of(c)).filter(|&open| self.at(open) == "(");
    match open {
      Some(open) => {
        let params = self.param_names(open);
        self.bind(params, open..end);
      }
      None if self.kind(prev) == Some(TokenKind::Ident) => {
        let name = self.at(prev).to_string();
        self.bind(vec![name], prev..end);
      }
      None => {}
    }
  }

  /// The `)` of `(params): Type =>`.
  fn return_type_close(&self, arrow: usize) -> Option<usize> {
    let depth = self.toks[arrow].depth;
    for k in (0..arrow).rev() {
      let t = &self.toks[k];
      if t.depth < depth {
        return None;
      }
      if t.depth == depth {
        match self.at(k) {
          ")" if self.at(k + 1) == ":" => return Some(k),
          "," | ";" | "=" | "=>" => return None,
          _ => {}
        }
      }
    }
    None
  }

  /// Methods and `catch` clauses: a parameter list directly followed by a body.
  fn declare_block_params(&mut self, close: usize) {
    let Some(body) = self.body_after(close) else { return };
    let Some(open) = self.opener_of(close).filter(|&open| open > 0 && self.at(open) == "(") else {
      return;
    };
    if self.handled.contains(&open) {
      return;
    }
    let before = open - 1;
    let binds = match (self.kind(before), self.at(before)) {
      (Some(TokenKind::Ident), keyword) => !matches!(keyword, "if" | "for" | "while" | "switch" | "with"),
      (Some(TokenKind::Str | TokenKind::Number), _) => true,
      (_, "]" | ">") => true,
      _ => false,
    };
    if binds {
      let params = self.param_names(open);
      let end = self.group_end(body);
      self.bind(params, open..end);
    }
  }

  fn param_names(&self, open: usize) -> Vec<String> {
    let depth = self.toks[open].depth + 1;
    let end = self.group_end(open);
    let mut names = Vec::new();
    let mut item_start = true;
    let mut i = open + 1;
    while i < end {
      if self.toks[i].depth == depth {
        match (self.toks[i].kind, self.at(i)) {
          (TokenKind::Punct, ",") => item_start = true,
          (TokenKind::Punct, "...") => {}
          (TokenKind::Ident, modifier)
            if item_start && PARAM_MODIFIERS.contains(&modifier) && self.kind(i + 1) == Some(TokenKind::Ident) => {}
          (TokenKind::Ident, name) if item_start && !is_reserved(name) => {
            names.push(name.to_string());
            item_start = false;
          }
          (TokenKind::Punct, "{" | "[") if item_start => {
            i = pattern_names(self.toks, i, self.src, &mut names);
            item_start = false;
            continue;
          }
          _ => item_start = false,
        }
      }
      i += 1;
    }
    names
  }

  fn is_free(&self, i: usize) -> bool {
    let name = self.at(i);
    if self.toks[i].kind != TokenKind::Ident || is_reserved(name) {
      return false;
    }
    if i > 0 && matches!(self.at(i - 1), "." | "?.") {
      return false;
    }
    // `for (x of xs)`, `value as Type`
    if matches!(name, "of" | "as" | "satisfies")
      && i > 0
      && (matches!(self.kind(i - 1), Some(TokenKind::Ident | TokenKind::Str | TokenKind::Number))
        || matches!(self.at(i - 1), ")" | "]" | "}"))
    {
      return false;
    }
    if let Some(parent) = self.parents[i]
      && self.at(parent) == "{"
    {
      let key = matches!(self.at(i - 1), "{" | ",") && self.at(i + 1) == ":";
      let method = self.at(i + 1) == "(" && self.body_after(self.group_end(i + 1)).is_some();
      if key || method {
        return false;
      }
    }
    !self.bindings.iter().any(|b| b.name == name && b.scope.contains(&i))
  }
}
