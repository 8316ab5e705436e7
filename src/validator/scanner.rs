//! SQL Scanner
//!
//! Literal-aware tokenizer used by the validator. It is not a parser: it only
//! knows enough lexical structure to tell code from string literals, quoted
//! identifiers and comments. Comments are removed from the token stream and
//! their bodies kept aside so the rules can inspect them.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword
    Word,
    /// `"identifier"`
    QuotedIdent,
    /// `'...'`, `E'...'`, `$tag$...$tag$`
    StringLit,
    Number,
    /// `$1` style positional parameter
    Param,
    Semicolon,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text, quotes included
    pub text: String,
    /// Whitespace or a comment separated this token from the previous one
    pub space_before: bool,
}

impl Token {
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }

    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }

    /// Identifier key: unquoted words fold to lower case, quoted identifiers keep their case
    pub fn ident_key(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text.to_lowercase()),
            TokenKind::QuotedIdent => {
                let inner = &self.text[1..self.text.len() - 1];
                Some(inner.replace("\"\"", "\""))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub tokens: Vec<Token>,
    pub comments: Vec<String>,
}

impl Scan {
    /// Rebuild the statement from its tokens: comments gone, whitespace collapsed,
    /// trailing statement separators dropped.
    pub fn normalized(&self) -> String {
        let end = self.statement_end();
        let mut out = String::new();
        for (idx, token) in self.tokens[..end].iter().enumerate() {
            if idx > 0 && token.space_before {
                out.push(' ');
            }
            out.push_str(&token.text);
        }
        out
    }

    /// Index one past the last token that is not a trailing `;`
    pub fn statement_end(&self) -> usize {
        let mut end = self.tokens.len();
        while end > 0 && self.tokens[end - 1].kind == TokenKind::Semicolon {
            end -= 1;
        }
        end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub what: &'static str,
    pub fragment: String,
}

const FRAGMENT_CHARS: usize = 24;

fn fragment_at(chars: &[char], start: usize) -> String {
    chars[start..].iter().take(FRAGMENT_CHARS).collect()
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn scan(input: &str) -> Result<Scan, ScanError> {
    let chars: Vec<char> = input.chars().collect();
    let mut scan = Scan::default();
    let mut pending_space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }

        // -- line comment
        if c == '-' && chars.get(i + 1) == Some(&'-') {
            let start = i + 2;
            let mut end = start;
            while end < chars.len() && chars[end] != '\n' {
                end += 1;
            }
            scan.comments.push(chars[start..end].iter().collect());
            pending_space = true;
            i = end;
            continue;
        }

        // /* block comment */, nesting like PostgreSQL
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            let mut depth = 1;
            let mut j = i + 2;
            while j < chars.len() && depth > 0 {
                if chars[j] == '/' && chars.get(j + 1) == Some(&'*') {
                    depth += 1;
                    j += 2;
                } else if chars[j] == '*' && chars.get(j + 1) == Some(&'/') {
                    depth -= 1;
                    j += 2;
                } else {
                    j += 1;
                }
            }
            if depth > 0 {
                return Err(ScanError {
                    what: "block comment",
                    fragment: fragment_at(&chars, start),
                });
            }
            scan.comments.push(chars[start + 2..j - 2].iter().collect());
            pending_space = true;
            i = j;
            continue;
        }

        let start = i;
        let kind;

        if c == '\'' {
            i = scan_quoted(&chars, i, '\'', false).ok_or_else(|| ScanError {
                what: "string literal",
                fragment: fragment_at(&chars, start),
            })?;
            kind = TokenKind::StringLit;
        } else if c == '"' {
            i = scan_quoted(&chars, i, '"', false).ok_or_else(|| ScanError {
                what: "quoted identifier",
                fragment: fragment_at(&chars, start),
            })?;
            kind = TokenKind::QuotedIdent;
        } else if c == '$' {
            if let Some(tag_end) = dollar_tag_end(&chars, i) {
                let tag: Vec<char> = chars[i..=tag_end].to_vec();
                i = find_sequence(&chars, tag_end + 1, &tag)
                    .map(|close| close + tag.len())
                    .ok_or_else(|| ScanError {
                        what: "dollar-quoted literal",
                        fragment: fragment_at(&chars, start),
                    })?;
                kind = TokenKind::StringLit;
            } else if chars.get(i + 1).map_or(false, |d| d.is_ascii_digit()) {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                kind = TokenKind::Param;
            } else {
                i += 1;
                kind = TokenKind::Punct;
            }
        } else if c.is_ascii_digit() {
            i = scan_number(&chars, i);
            kind = TokenKind::Number;
        } else if is_ident_start(c) {
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let word_len = i - start;
            // U&"..." and U&'...' spell names through escapes the rules cannot see
            if word_len == 1
                && matches!(c, 'u' | 'U')
                && chars.get(i) == Some(&'&')
                && matches!(chars.get(i + 1), Some('"') | Some('\''))
            {
                return Err(ScanError {
                    what: "unicode escape",
                    fragment: fragment_at(&chars, start),
                });
            }
            // E'..', B'..', X'..', N'..' prefixed literals
            if word_len == 1 && chars.get(i) == Some(&'\'') {
                let backslash = matches!(c, 'e' | 'E');
                if matches!(c, 'e' | 'E' | 'b' | 'B' | 'x' | 'X' | 'n' | 'N') {
                    i = scan_quoted(&chars, i, '\'', backslash).ok_or_else(|| ScanError {
                        what: "string literal",
                        fragment: fragment_at(&chars, start),
                    })?;
                    kind = TokenKind::StringLit;
                } else {
                    kind = TokenKind::Word;
                }
            } else {
                kind = TokenKind::Word;
            }
        } else if c == ';' {
            i += 1;
            kind = TokenKind::Semicolon;
        } else {
            i += 1;
            kind = TokenKind::Punct;
        }

        scan.tokens.push(Token {
            kind,
            text: chars[start..i].iter().collect(),
            space_before: pending_space,
        });
        pending_space = false;
    }

    Ok(scan)
}

/// Returns the index one past the closing quote, or None if unterminated.
/// A doubled quote is an escaped quote.
fn scan_quoted(chars: &[char], open: usize, quote: char, backslash_escapes: bool) -> Option<usize> {
    let mut j = open + 1;
    while j < chars.len() {
        let c = chars[j];
        if backslash_escapes && c == '\\' {
            j += 2;
            continue;
        }
        if c == quote {
            if chars.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return Some(j + 1);
        }
        j += 1;
    }
    None
}

/// `$tag$` or `$$` starting at `start`; returns the index of the closing `$` of the tag
fn dollar_tag_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'$') {
        return Some(j);
    }
    match chars.get(j) {
        Some(&c) if is_ident_start(c) => {}
        _ => return None,
    }
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if chars.get(j) == Some(&'$') {
        Some(j)
    } else {
        None
    }
}

fn find_sequence(chars: &[char], from: usize, needle: &[char]) -> Option<usize> {
    if needle.is_empty() || chars.len() < needle.len() {
        return None;
    }
    (from..=chars.len() - needle.len()).find(|&k| chars[k..k + needle.len()] == *needle)
}

fn scan_number(chars: &[char], start: usize) -> usize {
    let mut j = start;
    while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.' || chars[j] == '_') {
        j += 1;
    }
    if j < chars.len() && matches!(chars[j], 'e' | 'E') {
        let mut k = j + 1;
        if k < chars.len() && matches!(chars[k], '+' | '-') {
            k += 1;
        }
        if k < chars.len() && chars[k].is_ascii_digit() {
            j = k;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
        }
    }
    j
}
