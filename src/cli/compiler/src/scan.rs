/* src/cli/compiler/src/scan.rs */

//! Token-level scanner for JavaScript, JSX and TypeScript sources. It does not
//! build an AST: it finds top-level statements, their import/export shape and
//! the identifiers they reference, which is all the bundler and the browser
//! route view need.

use std::ops::Range;

use crate::scope::free_references;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Punct,
  Str,
  Number,
  Regex,
  /// Template piece ending in `${`.
  TemplateHead,
  /// Template piece ending in a backtick.
  Template,
  /// A whole JSX element. Tag names and embedded expressions follow it as
  /// nested tokens.
  Jsx,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
  pub kind: TokenKind,
  pub start: usize,
  pub end: usize,
  /// Open brackets enclosing the token. Closers carry the depth after closing.
  pub depth: usize,
  pub newline_before: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
  pub message: String,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
  pub jsx: bool,
  pub typescript: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportedName {
  Default,
  Namespace,
  Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
  pub imported: ImportedName,
  pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
  Import { source: String, bindings: Vec<ImportBinding> },
  /// `export { a as b } from "x"` and `export * as ns from "x"`; items are
  /// (imported, exported).
  ExportFrom { source: String, items: Vec<(ImportedName, String)> },
  ExportStar { source: String },
  /// `export { a as b }`; items are (local, exported).
  ExportList { items: Vec<(String, String)> },
  /// `export const|let|var|function|class ...`. `decl_start` is where the
  /// declaration begins after the `export` keyword.
  ExportDecl { names: Vec<String>, decl_start: usize },
  /// `export default function|class`. An anonymous declaration gets a name
  /// inserted at `name_at`.
  ExportDefaultDecl { name: Option<String>, decl_start: usize, name_at: usize },
  ExportDefaultExpr { expr_start: usize },
  Decl { names: Vec<String> },
  /// TypeScript-only syntax with no runtime output.
  TypeOnly,
  Other,
}

#[derive(Debug, Clone)]
pub struct Statement {
  pub kind: StatementKind,
  pub start: usize,
  pub end: usize,
  pub tokens: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
  Require,
  DynamicImport,
}

/// `require("x")` or `import("x")` with a literal specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
  pub kind: CallKind,
  pub specifier: String,
  pub span: Range<usize>,
}

/// A specifier this module depends on and where it first appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  pub specifier: String,
  pub offset: usize,
  /// `None` for import/export statements.
  pub call: Option<CallKind>,
}

#[derive(Debug, Clone)]
pub struct ModuleScan {
  pub tokens: Vec<Token>,
  pub statements: Vec<Statement>,
  pub calls: Vec<CallSite>,
}

pub fn scan_module(src: &str, options: ScanOptions) -> Result<ModuleScan, SyntaxError> {
  let tokens = tokenize(src, options)?;
  let statements = split_statements(&tokens, src)
    .into_iter()
    .map(|range| {
      let toks = &tokens[range.clone()];
      let start = toks.first().map_or(0, |t| t.start);
      let end = toks.iter().map(|t| t.end).max().unwrap_or(start);
      let kind = classify_statement(toks, src, options.typescript);
      Statement { kind, start, end, tokens: range }
    })
    .collect();
  let calls = find_calls(&tokens, src);
  Ok(ModuleScan { tokens, statements, calls })
}

impl ModuleScan {
  pub fn is_esm(&self) -> bool {
    self.statements.iter().any(|s| {
      !matches!(s.kind, StatementKind::Decl { .. } | StatementKind::Other | StatementKind::TypeOnly)
    })
  }

  /// Statically known export names, in declaration order.
  pub fn export_names(&self) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut add = |n: &str| {
      if !out.iter().any(|x| x == n) {
        out.push(n.to_string());
      }
    };
    for stmt in &self.statements {
      match &stmt.kind {
        StatementKind::ExportDecl { names, .. } => names.iter().for_each(|n| add(n)),
        StatementKind::ExportDefaultDecl { .. } | StatementKind::ExportDefaultExpr { .. } => add("default"),
        StatementKind::ExportList { items } => items.iter().for_each(|(_, e)| add(e)),
        StatementKind::ExportFrom { items, .. } => items.iter().for_each(|(_, e)| add(e)),
        _ => {}
      }
    }
    out
  }

  pub fn has_star_exports(&self) -> bool {
    self.statements.iter().any(|s| matches!(s.kind, StatementKind::ExportStar { .. }))
  }

  /// Every module specifier this source depends on, first occurrence only, in
  /// order of appearance.
  pub fn dependencies(&self) -> Vec<Dependency> {
    let mut all: Vec<Dependency> = Vec::new();
    for stmt in &self.statements {
      match &stmt.kind {
        StatementKind::Import { source, .. }
        | StatementKind::ExportFrom { source, .. }
        | StatementKind::ExportStar { source } => {
          all.push(Dependency { specifier: source.clone(), offset: stmt.start, call: None })
        }
        _ => {}
      }
    }
    for call in &self.calls {
      all.push(Dependency { specifier: call.specifier.clone(), offset: call.span.start, call: Some(call.kind) });
    }
    all.sort_by_key(|d| d.offset);
    let mut out: Vec<Dependency> = Vec::new();
    for dep in all {
      if !out.iter().any(|d| d.specifier == dep.specifier) {
        out.push(dep);
      }
    }
    out
  }

  pub fn specifiers(&self) -> Vec<String> {
    self.dependencies().into_iter().map(|d| d.specifier).collect()
  }

  /// Identifiers a statement reads from the enclosing module. Member names,
  /// object keys and names bound inside the statement itself are skipped.
  pub fn references<'a>(&self, stmt: &Statement, src: &'a str) -> Vec<&'a str> {
    free_references(&self.tokens[stmt.tokens.clone()], src)
  }
}

/// 1-based line and 0-based column of a byte offset.
pub fn line_column(src: &str, offset: usize) -> (usize, usize) {
  let offset = offset.min(src.len());
  let before = &src.as_bytes()[..offset];
  let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
  let line_start = before.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
  (line, offset - line_start)
}

// ---- lexer ----

pub fn tokenize(src: &str, options: ScanOptions) -> Result<Vec<Token>, SyntaxError> {
  let mut lx = Lexer {
    src,
    bytes: src.as_bytes(),
    pos: if src.starts_with('\u{feff}') { 3 } else { 0 },
    tokens: Vec::new(),
    stack: Vec::new(),
    templates: Vec::new(),
    prev: None,
    jsx: options.jsx,
    typescript: options.typescript,
    newline: false,
  };
  if src[lx.pos..].starts_with("#!") {
    lx.skip_line_comment();
  }
  while lx.pos < lx.bytes.len() {
    lx.step()?;
  }
  if let Some(&(open, _)) = lx.stack.last() {
    return Err(lx.error_at(
      format!("Expected \"{}\" but found end of file", closer(open) as char),
      src.len(),
    ));
  }
  Ok(lx.tokens)
}

struct Lexer<'a> {
  src: &'a str,
  bytes: &'a [u8],
  pos: usize,
  tokens: Vec<Token>,
  stack: Vec<(u8, usize)>,
  templates: Vec<usize>,
  prev: Option<usize>,
  jsx: bool,
  typescript: bool,
  newline: bool,
}

fn closer(open: u8) -> u8 {
  match open {
    b'(' => b')',
    b'[' => b']',
    b'<' => b'>',
    _ => b'}',
  }
}

fn is_ident_start(b: u8) -> bool {
  b.is_ascii_alphabetic() || matches!(b, b'_' | b'$' | b'#' | b'\\') || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
  is_ident_start(b) || b.is_ascii_digit()
}

const MULTI_PUNCT: [&str; 17] = [
  "...", "===", "!==", "**=", "??=", "&&=", "||=", "=>", "==", "!=", "++", "--", "&&", "||", "??",
  "?.", "**",
];

impl Lexer<'_> {
  fn peek(&self, n: usize) -> Option<u8> {
    self.bytes.get(self.pos + n).copied()
  }

  fn cur(&self) -> Option<u8> {
    self.peek(0)
  }

  fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
    self.tokens.push(Token {
      kind,
      start,
      end,
      depth: self.stack.len(),
      newline_before: std::mem::take(&mut self.newline),
    });
    self.prev = Some(self.tokens.len() - 1);
  }

  fn error_at(&self, message: impl Into<String>, offset: usize) -> SyntaxError {
    let (line, column) = line_column(self.src, offset);
    SyntaxError { message: message.into(), line, column }
  }

  fn error(&self, message: impl Into<String>) -> SyntaxError {
    self.error_at(message, self.pos)
  }

  fn step(&mut self) -> Result<(), SyntaxError> {
    let b = self.bytes[self.pos];
    match b {
      b'\n' => {
        self.newline = true;
        self.pos += 1;
      }
      b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
      b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
      b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment()?,
      b'\'' | b'"' => self.string(b)?,
      b'`' => {
        let start = self.pos;
        self.pos += 1;
        self.template(start)?;
      }
      b'/' if self.regex_allowed() => self.regex()?,
      b'<' if self.jsx && self.regex_allowed() && self.jsx_starts() && !self.type_parameters_start() => {
        self.jsx_element()?
      }
      b'0'..=b'9' => self.number(),
      b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
      b'(' | b'[' | b'{' => {
        self.push(TokenKind::Punct, self.pos, self.pos + 1);
        self.stack.push((b, self.pos));
        self.pos += 1;
      }
      b')' | b']' | b'}' => self.close(b)?,
      _ if is_ident_start(b) => self.ident(),
      _ => self.punct(),
    }
    Ok(())
  }

  fn skip_line_comment(&mut self) {
    while let Some(c) = self.cur() {
      if c == b'\n' {
        break;
      }
      self.pos += 1;
    }
  }

  fn skip_block_comment(&mut self) -> Result<(), SyntaxError> {
    let start = self.pos;
    match self.src[self.pos + 2..].find("*/") {
      Some(end) => {
        if self.src[self.pos..self.pos + 2 + end].contains('\n') {
          self.newline = true;
        }
        self.pos += end + 4;
        Ok(())
      }
      None => Err(self.error_at("Expected \"*/\" to terminate multi-line comment", start)),
    }
  }

  fn string(&mut self, quote: u8) -> Result<(), SyntaxError> {
    let start = self.pos;
    self.pos += 1;
    loop {
      match self.cur() {
        None | Some(b'\n') => return Err(self.error_at("Unterminated string literal", start)),
        Some(b'\\') => {
          self.pos += if self.peek(1) == Some(b'\r') && self.peek(2) == Some(b'\n') { 3 } else { 2 };
        }
        Some(c) if c == quote => {
          self.pos += 1;
          break;
        }
        Some(_) => self.pos += 1,
      }
    }
    self.push(TokenKind::Str, start, self.pos);
    Ok(())
  }

  fn template(&mut self, start: usize) -> Result<(), SyntaxError> {
    loop {
      match self.cur() {
        None => return Err(self.error_at("Unterminated template literal", start)),
        Some(b'\\') => self.pos = (self.pos + 2).min(self.bytes.len()),
        Some(b'`') => {
          self.pos += 1;
          self.push(TokenKind::Template, start, self.pos);
          return Ok(());
        }
        Some(b'$') if self.peek(1) == Some(b'{') => {
          self.pos += 2;
          self.push(TokenKind::TemplateHead, start, self.pos);
          self.templates.push(self.stack.len());
          self.stack.push((b'{', self.pos - 1));
          return Ok(());
        }
        Some(_) => self.pos += 1,
      }
    }
  }

  fn regex_allowed(&self) -> bool {
    let Some(prev) = self.prev.map(|i| self.tokens[i]) else {
      return true;
    };
    let text = &self.src[prev.start..prev.end];
    match prev.kind {
      TokenKind::Punct => !matches!(text, ")" | "]" | "}" | "++" | "--"),
      TokenKind::Ident => matches!(
        text,
        "return"
          | "typeof"
          | "instanceof"
          | "in"
          | "of"
          | "new"
          | "delete"
          | "void"
          | "throw"
          | "case"
          | "do"
          | "else"
          | "yield"
          | "await"
          | "extends"
      ),
      TokenKind::TemplateHead => true,
      _ => false,
    }
  }

  fn regex(&mut self) -> Result<(), SyntaxError> {
    let start = self.pos;
    self.pos += 1;
    let mut in_class = false;
    loop {
      match self.cur() {
        None | Some(b'\n') => return Err(self.error_at("Unterminated regular expression", start)),
        Some(b'\\') => self.pos += 2,
        Some(b'[') => {
          in_class = true;
          self.pos += 1;
        }
        Some(b']') => {
          in_class = false;
          self.pos += 1;
        }
        Some(b'/') if !in_class => {
          self.pos += 1;
          break;
        }
        Some(_) => self.pos += 1,
      }
    }
    while self.cur().is_some_and(|c| c.is_ascii_alphabetic()) {
      self.pos += 1;
    }
    self.push(TokenKind::Regex, start, self.pos);
    Ok(())
  }

  fn number(&mut self) {
    let start = self.pos;
    while let Some(c) = self.cur() {
      let exponent_sign = matches!(c, b'+' | b'-')
        && matches!(self.bytes[self.pos - 1], b'e' | b'E')
        && !self.src[start..self.pos].starts_with("0x");
      if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || exponent_sign {
        self.pos += 1;
      } else {
        break;
      }
    }
    self.push(TokenKind::Number, start, self.pos);
  }

  fn ident(&mut self) {
    let start = self.pos;
    while self.cur().is_some_and(is_ident_char) {
      self.pos += 1;
    }
    self.push(TokenKind::Ident, start, self.pos);
  }

  fn punct(&mut self) {
    let start = self.pos;
    let rest = &self.src[self.pos..];
    let len = MULTI_PUNCT
      .iter()
      .find(|p| rest.starts_with(*p))
      .filter(|p| !(**p == "?." && rest.as_bytes().get(2).is_some_and(u8::is_ascii_digit)))
      .map_or(1, |p| p.len());
    self.pos += len;
    self.push(TokenKind::Punct, start, self.pos);
  }

  fn close(&mut self, b: u8) -> Result<(), SyntaxError> {
    let Some((open, _)) = self.stack.pop() else {
      return Err(self.error(format!("Unexpected \"{}\"", b as char)));
    };
    if closer(open) != b {
      return Err(self.error(format!(
        "Expected \"{}\" but found \"{}\"",
        closer(open) as char,
        b as char
      )));
    }
    if b == b'}' && self.templates.last() == Some(&self.stack.len()) {
      self.templates.pop();
      let start = self.pos;
      self.pos += 1;
      return self.template(start);
    }
    self.push(TokenKind::Punct, self.pos, self.pos + 1);
    self.pos += 1;
    Ok(())
  }

  // ---- JSX ----

  fn jsx_starts(&self) -> bool {
    self.peek(1).is_some_and(|c| c == b'>' || (is_ident_start(c) && c != b'\\' && c != b'#'))
  }

  /// `<T,>` or `<T extends U>` opening a generic arrow function in TSX.
  fn type_parameters_start(&self) -> bool {
    if !self.typescript {
      return false;
    }
    let name = self.bytes[self.pos + 1..].iter().take_while(|&&c| is_ident_char(c)).count();
    if name == 0 {
      return false;
    }
    let after = self.src[self.pos + 1 + name..].trim_start();
    after.starts_with(',') || after.strip_prefix("extends").is_some_and(|r| r.starts_with(char::is_whitespace))
  }

  fn jsx_element(&mut self) -> Result<(), SyntaxError> {
    let start = self.pos;
    self.push(TokenKind::Jsx, start, start);
    let marker = self.tokens.len() - 1;
    self.stack.push((b'<', start));
    self.jsx_tag()?;
    self.stack.pop();
    self.tokens[marker].end = self.pos;
    self.prev = Some(marker);
    Ok(())
  }

  fn skip_jsx_space(&mut self) -> Result<(), SyntaxError> {
    loop {
      match self.cur() {
        Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
        Some(b'/') if self.peek(1) == Some(b'/') => self.skip_line_comment(),
        Some(b'/') if self.peek(1) == Some(b'*') => self.skip_block_comment()?,
        _ => return Ok(()),
      }
    }
  }

  fn jsx_name(&mut self) -> Range<usize> {
    let start = self.pos;
    while self.cur().is_some_and(|c| is_ident_char(c) || matches!(c, b'.' | b'-' | b':')) {
      self.pos += 1;
    }
    start..self.pos
  }

  /// At `<`: one element including its children and closing tag.
  fn jsx_tag(&mut self) -> Result<(), SyntaxError> {
    let open_at = self.pos;
    self.pos += 1;
    self.skip_jsx_space()?;
    if self.cur() == Some(b'>') {
      self.pos += 1;
      return self.jsx_children(open_at);
    }
    let name = self.jsx_name();
    if name.is_empty() {
      return Err(self.error("Expected identifier in JSX tag"));
    }
    let tag = &self.src[name.clone()];
    let head = tag.split(['.', ':']).next().unwrap_or(tag);
    if tag.contains('.') || head.starts_with(|c: char| c.is_ascii_uppercase()) {
      self.push(TokenKind::Ident, name.start, name.start + head.len());
    }
    loop {
      self.skip_jsx_space()?;
      match self.cur() {
        None => return Err(self.error("Expected \">\" but found end of file")),
        Some(b'/') => {
          self.pos += 1;
          self.skip_jsx_space()?;
          if self.cur() != Some(b'>') {
            return Err(self.error("Expected \">\" after \"/\" in JSX tag"));
          }
          self.pos += 1;
          return Ok(());
        }
        Some(b'>') => {
          self.pos += 1;
          return self.jsx_children(open_at);
        }
        Some(b'{') => self.jsx_expression()?,
        Some(c) if is_ident_start(c) => {
          self.jsx_name();
          self.skip_jsx_space()?;
          if self.cur() == Some(b'=') {
            self.pos += 1;
            self.skip_jsx_space()?;
            match self.cur() {
              Some(q @ (b'"' | b'\'')) => self.jsx_attr_string(q)?,
              Some(b'{') => self.jsx_expression()?,
              Some(b'<') => self.jsx_tag()?,
              _ => return Err(self.error("Expected attribute value in JSX tag")),
            }
          }
        }
        Some(c) => return Err(self.error(format!("Unexpected \"{}\" in JSX tag", c as char))),
      }
    }
  }

  fn jsx_attr_string(&mut self, quote: u8) -> Result<(), SyntaxError> {
    let start = self.pos;
    self.pos += 1;
    while let Some(c) = self.cur() {
      self.pos += 1;
      if c == quote {
        return Ok(());
      }
    }
    Err(self.error_at("Unterminated string literal", start))
  }

  fn jsx_children(&mut self, open_at: usize) -> Result<(), SyntaxError> {
    loop {
      match self.cur() {
        None => return Err(self.error_at("Unterminated JSX contents", open_at)),
        Some(b'<') if self.peek(1) == Some(b'/') => {
          while let Some(c) = self.cur() {
            self.pos += 1;
            if c == b'>' {
              return Ok(());
            }
          }
          return Err(self.error("Expected \">\" but found end of file"));
        }
        Some(b'<') => self.jsx_tag()?,
        Some(b'{') => self.jsx_expression()?,
        Some(_) => self.pos += 1,
      }
    }
  }

  /// At `{` inside JSX: lex a regular expression up to the matching `}`.
  fn jsx_expression(&mut self) -> Result<(), SyntaxError> {
    let base = self.stack.len();
    self.push(TokenKind::Punct, self.pos, self.pos + 1);
    self.stack.push((b'{', self.pos));
    self.pos += 1;
    while self.stack.len() > base {
      if self.pos >= self.bytes.len() {
        return Err(self.error("Expected \"}\" but found end of file"));
      }
      self.step()?;
    }
    Ok(())
  }
}

// ---- statements ----

pub(crate) fn text<'a>(src: &'a str, t: &Token) -> &'a str {
  &src[t.start..t.end]
}

pub(crate) fn ends_statement(t: &Token, src: &str) -> bool {
  match t.kind {
    TokenKind::Punct => matches!(text(src, t), ")" | "]" | "}" | "++" | "--"),
    TokenKind::Ident => !matches!(
      text(src, t),
      "in"
        | "instanceof"
        | "typeof"
        | "new"
        | "void"
        | "delete"
        | "of"
        | "as"
        | "satisfies"
        | "extends"
        | "implements"
        | "await"
        | "yield"
        | "export"
        | "default"
        | "import"
        | "async"
        | "function"
        | "class"
        | "const"
        | "let"
        | "var"
    ),
    TokenKind::TemplateHead => false,
    _ => true,
  }
}

pub(crate) fn starts_statement(t: &Token, prev: &Token, src: &str) -> bool {
  match t.kind {
    TokenKind::Punct => match text(src, t) {
      "{" => text(src, prev) != ")",
      "++" | "--" | "!" | "~" | "@" | "..." => true,
      _ => false,
    },
    TokenKind::Ident => !matches!(
      text(src, t),
      "else" | "catch" | "finally" | "instanceof" | "in" | "of" | "as" | "satisfies" | "extends" | "implements"
    ),
    TokenKind::TemplateHead | TokenKind::Template => false,
    _ => true,
  }
}

/// Top-level statement token ranges. A statement ends at a top-level `;` or
/// at a line break where automatic semicolon insertion applies.
fn split_statements(tokens: &[Token], src: &str) -> Vec<Range<usize>> {
  let mut out = Vec::new();
  let mut start: Option<usize> = None;
  let mut prev: Option<usize> = None;
  for (i, t) in tokens.iter().enumerate() {
    if t.depth != 0 {
      continue;
    }
    if let (Some(s), Some(p)) = (start, prev)
      && t.newline_before
      && ends_statement(&tokens[p], src)
      && starts_statement(t, &tokens[p], src)
    {
      out.push(s..i);
      start = None;
    }
    let s = *start.get_or_insert(i);
    if t.kind == TokenKind::Punct && text(src, t) == ";" {
      out.push(s..i + 1);
      start = None;
      prev = None;
      continue;
    }
    prev = Some(i);
  }
  if let Some(s) = start {
    out.push(s..tokens.len());
  }
  out
}

/// Cursor over the top-level tokens of one statement.
struct Cursor<'a> {
  toks: Vec<&'a Token>,
  src: &'a str,
  i: usize,
}

impl<'a> Cursor<'a> {
  fn new(all: &'a [Token], src: &'a str) -> Self {
    Self { toks: all.iter().filter(|t| t.depth == all[0].depth).collect(), src, i: 0 }
  }

  fn at(&self, n: usize) -> &'a str {
    self.toks.get(self.i + n).map_or("", |t| text(self.src, t))
  }

  fn kind(&self, n: usize) -> Option<TokenKind> {
    self.toks.get(self.i + n).map(|t| t.kind)
  }

  fn token(&self, n: usize) -> Option<&'a Token> {
    self.toks.get(self.i + n).copied()
  }

  fn is_ident(&self, n: usize) -> bool {
    self.kind(n) == Some(TokenKind::Ident)
  }
}

fn classify_statement(toks: &[Token], src: &str, typescript: bool) -> StatementKind {
  if toks.is_empty() {
    return StatementKind::Other;
  }
  let c = Cursor::new(toks, src);
  match c.at(0) {
    "import" if !matches!(c.at(1), "(" | ".") => parse_import(toks, src, typescript),
    "export" => parse_export(toks, src, typescript),
    _ => match declaration(&c, toks, src, typescript) {
      Some(Decl::Names(names)) => StatementKind::Decl { names },
      Some(Decl::TypeOnly) => StatementKind::TypeOnly,
      None => StatementKind::Other,
    },
  }
}

enum Decl {
  Names(Vec<String>),
  TypeOnly,
}

/// A declaration starting at the cursor position.
fn declaration(c: &Cursor<'_>, toks: &[Token], src: &str, typescript: bool) -> Option<Decl> {
  let named = |n: usize| c.is_ident(n).then(|| vec![c.at(n).to_string()]);
  match c.at(0) {
    "function" => named(if c.at(1) == "*" { 2 } else { 1 }).map(Decl::Names),
    "async" if c.at(1) == "function" => named(if c.at(2) == "*" { 3 } else { 2 }).map(Decl::Names),
    "class" => named(1).map(Decl::Names),
    "abstract" if c.at(1) == "class" => named(2).map(Decl::Names),
    "enum" if typescript => named(1).map(Decl::Names),
    "const" if typescript && c.at(1) == "enum" => named(2).map(Decl::Names),
    "const" | "let" | "var" if c.is_ident(1) || matches!(c.at(1), "{" | "[") => {
      let first = c.token(1)?;
      let from = toks.iter().position(|t| t.start == first.start)?;
      Some(Decl::Names(binding_names(&toks[from..], src)))
    }
    "interface" | "declare" if typescript && c.is_ident(1) => Some(Decl::TypeOnly),
    "type" if typescript && c.is_ident(1) && matches!(c.at(2), "=" | "<") => Some(Decl::TypeOnly),
    _ => None,
  }
}

/// Names bound by a `const`/`let`/`var` declarator list, patterns included.
pub(crate) fn binding_names(toks: &[Token], src: &str) -> Vec<String> {
  let base = toks.first().map_or(0, |t| t.depth);
  let mut names = Vec::new();
  let mut i = 0;
  while i < toks.len() {
    let t = &toks[i];
    match (t.kind, text(src, t)) {
      (TokenKind::Ident, name) => {
        names.push(name.to_string());
        i += 1;
      }
      (TokenKind::Punct, "{" | "[") => {
        i = pattern_names(toks, i, src, &mut names);
      }
      _ => {}
    }
    // skip the type annotation and initializer up to the next declarator
    while i < toks.len() && !(toks[i].depth == base && text(src, &toks[i]) == ",") {
      i += 1;
    }
    i += 1;
  }
  names
}

/// Collect names from the pattern opening at `open`; returns the index after
/// its closing bracket.
pub(crate) fn pattern_names(toks: &[Token], open: usize, src: &str, names: &mut Vec<String>) -> usize {
  let depth = toks[open].depth;
  let mut i = open + 1;
  let mut in_default = false;
  while i < toks.len() {
    let t = &toks[i];
    let s = text(src, t);
    if t.depth == depth && matches!(s, "}" | "]") {
      return i + 1;
    }
    if t.depth == depth + 1 {
      match (t.kind, s) {
        (TokenKind::Punct, ",") => in_default = false,
        (TokenKind::Punct, "=") => in_default = true,
        (TokenKind::Punct, "{" | "[") if !in_default => {
          i = pattern_names(toks, i, src, names);
          continue;
        }
        (TokenKind::Ident, name) if !in_default => {
          let next = toks.get(i + 1).map(|n| text(src, n));
          if next != Some(":") {
            names.push(name.to_string());
          }
        }
        _ => {}
      }
    }
    i += 1;
  }
  i
}

/// Unquote a string literal token.
pub fn string_value(raw: &str) -> String {
  let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();
  let mut out = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('t') => out.push('\t'),
      Some('r') => out.push('\r'),
      Some('0') => out.push('\0'),
      Some(other) => out.push(other),
      None => {}
    }
  }
  out
}

fn module_name(c: &Cursor<'_>, n: usize) -> String {
  if c.kind(n) == Some(TokenKind::Str) { string_value(c.at(n)) } else { c.at(n).to_string() }
}

/// Parse `{ a, b as c, type T }`. Returns (name, alias) pairs and the cursor
/// offset just past the closing brace.
fn brace_list(toks: &[Token], open: usize, src: &str, typescript: bool) -> (Vec<(String, String)>, usize) {
  let depth = toks[open].depth;
  let mut items = Vec::new();
  let mut current: Vec<&Token> = Vec::new();
  let mut i = open + 1;
  let mut flush = |current: &mut Vec<&Token>| {
    let parts: Vec<String> = current
      .iter()
      .map(|t| if t.kind == TokenKind::Str { string_value(text(src, t)) } else { text(src, t).to_string() })
      .collect();
    current.clear();
    let parts: &[String] = match parts.as_slice() {
      [first, rest @ ..] if typescript && first == "type" && !rest.is_empty() && rest[0] != "as" => {
        // type-only specifier
        return;
      }
      all => all,
    };
    match parts {
      [name] => items.push((name.clone(), name.clone())),
      [name, as_kw, alias] if as_kw == "as" => items.push((name.clone(), alias.clone())),
      _ => {}
    }
  };
  while i < toks.len() {
    let t = &toks[i];
    if t.depth == depth && text(src, t) == "}" {
      flush(&mut current);
      return (items, i + 1);
    }
    if t.depth == depth + 1 {
      if text(src, t) == "," {
        flush(&mut current);
      } else {
        current.push(t);
      }
    }
    i += 1;
  }
  flush(&mut current);
  (items, i)
}

fn parse_import(toks: &[Token], src: &str, typescript: bool) -> StatementKind {
  let c = Cursor::new(toks, src);
  if c.kind(1) == Some(TokenKind::Str) {
    return StatementKind::Import { source: module_name(&c, 1), bindings: Vec::new() };
  }
  if typescript && c.at(1) == "type" && (matches!(c.at(2), "{" | "*") || (c.is_ident(2) && c.at(2) != "from")) {
    return StatementKind::TypeOnly;
  }
  if typescript && c.is_ident(1) && c.at(2) == "=" {
    return StatementKind::Other;
  }

  let mut bindings = Vec::new();
  let mut source = String::new();
  let mut i = 1;
  while i < toks.len() {
    let t = &toks[i];
    if t.depth != toks[0].depth {
      i += 1;
      continue;
    }
    let s = text(src, t);
    match (t.kind, s) {
      (TokenKind::Ident, "from") if toks.get(i + 1).is_some_and(|n| n.kind == TokenKind::Str) => {
        source = string_value(text(src, &toks[i + 1]));
        break;
      }
      (TokenKind::Punct, "*") => {
        if let Some(local) = toks.get(i + 2) {
          bindings.push(ImportBinding { imported: ImportedName::Namespace, local: text(src, local).to_string() });
        }
        i += 3;
        continue;
      }
      (TokenKind::Punct, "{") => {
        let (items, next) = brace_list(toks, i, src, typescript);
        for (name, local) in items {
          let imported = if name == "default" { ImportedName::Default } else { ImportedName::Named(name) };
          bindings.push(ImportBinding { imported, local });
        }
        i = next;
        continue;
      }
      (TokenKind::Ident, local) => {
        bindings.push(ImportBinding { imported: ImportedName::Default, local: local.to_string() });
      }
      _ => {}
    }
    i += 1;
  }
  StatementKind::Import { source, bindings }
}

fn parse_export(toks: &[Token], src: &str, typescript: bool) -> StatementKind {
  let c = Cursor::new(toks, src);
  let start_of = |n: usize| c.token(n).map_or(0, |t| t.start);
  let end_of = |n: usize| c.token(n).map_or(0, |t| t.end);
  match c.at(1) {
    "default" => {
      let mut j = 2;
      if c.at(j) == "async" && c.at(j + 1) == "function" {
        j += 1;
      }
      match c.at(j) {
        "function" => {
          let k = if c.at(j + 1) == "*" { j + 2 } else { j + 1 };
          let name = c.is_ident(k).then(|| c.at(k).to_string());
          StatementKind::ExportDefaultDecl { name, decl_start: start_of(2), name_at: end_of(k - 1) }
        }
        "class" => {
          let name = (c.is_ident(j + 1) && !matches!(c.at(j + 1), "extends" | "implements"))
            .then(|| c.at(j + 1).to_string());
          StatementKind::ExportDefaultDecl { name, decl_start: start_of(2), name_at: end_of(j) }
        }
        "interface" if typescript => StatementKind::TypeOnly,
        _ => StatementKind::ExportDefaultExpr { expr_start: start_of(2) },
      }
    }
    "{" => {
      let open = toks.iter().position(|t| t.start == start_of(1)).unwrap_or(1);
      let (items, next) = brace_list(toks, open, src, typescript);
      let from = toks.get(next).filter(|t| text(src, t) == "from");
      match (from, toks.get(next + 1)) {
        (Some(_), Some(spec)) if spec.kind == TokenKind::Str => StatementKind::ExportFrom {
          source: string_value(text(src, spec)),
          items: items
            .into_iter()
            .map(|(name, exported)| {
              let imported = if name == "default" { ImportedName::Default } else { ImportedName::Named(name) };
              (imported, exported)
            })
            .collect(),
        },
        _ => StatementKind::ExportList { items },
      }
    }
    "*" => {
      if c.at(2) == "as" {
        StatementKind::ExportFrom {
          source: module_name(&c, 5),
          items: vec![(ImportedName::Namespace, module_name(&c, 3))],
        }
      } else {
        StatementKind::ExportStar { source: module_name(&c, 3) }
      }
    }
    "type" if typescript && matches!(c.at(2), "{" | "*") => StatementKind::TypeOnly,
    "=" | "as" | "import" => StatementKind::Other,
    _ => {
      let rest = Cursor { toks: c.toks[1..].to_vec(), src, i: 0 };
      let from = toks.iter().position(|t| t.start == start_of(1)).unwrap_or(1);
      match declaration(&rest, &toks[from..], src, typescript) {
        Some(Decl::Names(names)) => StatementKind::ExportDecl { names, decl_start: start_of(1) },
        Some(Decl::TypeOnly) => StatementKind::TypeOnly,
        None => StatementKind::Other,
      }
    }
  }
}

fn find_calls(tokens: &[Token], src: &str) -> Vec<CallSite> {
  let mut calls = Vec::new();
  for (i, t) in tokens.iter().enumerate() {
    if t.kind != TokenKind::Ident {
      continue;
    }
    let kind = match text(src, t) {
      "require" => CallKind::Require,
      "import" => CallKind::DynamicImport,
      _ => continue,
    };
    if i > 0 && matches!(text(src, &tokens[i - 1]), "." | "?.") {
      continue;
    }
    let (Some(open), Some(spec), Some(close)) = (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3)) else {
      continue;
    };
    if text(src, open) == "(" && spec.kind == TokenKind::Str && text(src, close) == ")" {
      calls.push(CallSite { kind, specifier: string_value(text(src, spec)), span: t.start..close.end });
    }
  }
  calls
}

pub(crate) fn is_reserved(word: &str) -> bool {
  matches!(
    word,
    "break"
      | "case"
      | "catch"
      | "class"
      | "const"
      | "continue"
      | "debugger"
      | "default"
      | "delete"
      | "do"
      | "else"
      | "export"
      | "extends"
      | "false"
      | "finally"
      | "for"
      | "function"
      | "if"
      | "import"
      | "in"
      | "instanceof"
      | "let"
      | "new"
      | "null"
      | "return"
      | "super"
      | "switch"
      | "this"
      | "throw"
      | "true"
      | "try"
      | "typeof"
      | "var"
      | "void"
      | "while"
      | "with"
      | "yield"
      | "await"
      | "async"
  )
}
