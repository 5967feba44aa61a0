//! Structural fallback solver.
//!
//! Parses the player script without an AST: the outer IIFE body is carved
//! out by brace matching that is aware of strings and regex literals, split
//! into top-level statements, filtered of control flow, and loaded into the
//! sandbox on top of browser stubs. The signature and n-transform functions
//! are then located by pattern.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::stubs::BROWSER_STUBS;
use crate::js::JsSandbox;

/// A `/` starts a regex literal only after one of these (or at the start).
const REGEX_PRECEDERS: &[u8] = b"(=,[!:&|?{};";

pub struct RegexSolver {
    sandbox: Arc<JsSandbox>,
    sig_fn: Option<String>,
    n_fn: Option<String>,
    ready: bool,
}

impl RegexSolver {
    pub fn new(sandbox: Arc<JsSandbox>) -> Self {
        Self {
            sandbox,
            sig_fn: None,
            n_fn: None,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Load a player script. Returns `false` (leaving identity behavior) if
    /// neither the signature nor the n function could be located.
    pub async fn load_player(&mut self, player_code: &str) -> bool {
        self.ready = false;
        self.sig_fn = None;
        self.n_fn = None;

        if player_code.is_empty() {
            warn!("player code is empty");
            return false;
        }
        debug!("scanning player script ({} bytes)", player_code.len());

        let Some(body) = extract_iife_body(player_code) else {
            warn!("failed to extract player IIFE body");
            return false;
        };
        debug!("IIFE body extracted ({} bytes)", body.len());

        let statements = split_top_level_statements(&body);
        debug!("split into {} top-level statements", statements.len());
        let filtered = filter_statements(&statements);

        if self.sandbox.eval(BROWSER_STUBS).await.is_err() {
            warn!("failed to install browser stubs");
            return false;
        }

        let mut loaded = 0usize;
        let mut failed = 0usize;
        for statement in &statements {
            if !keep_statement(statement) {
                continue;
            }
            match self.sandbox.eval(statement.clone()).await {
                Ok(()) => loaded += 1,
                Err(_) => failed += 1,
            }
        }
        info!("executed player statements: {loaded} loaded, {failed} failed");

        self.sig_fn = find_sig_function(&filtered);
        self.n_fn = find_n_function(&filtered, self.sig_fn.as_deref());

        match (&self.sig_fn, &self.n_fn) {
            (None, None) => {
                warn!("could not locate signature or n functions");
                return false;
            }
            (sig, n) => {
                info!(
                    "solver functions: sig={:?} n={:?}",
                    sig.as_deref().unwrap_or("-"),
                    n.as_deref().unwrap_or("-")
                );
            }
        }

        // Some player revisions return the transformed n as an array of
        // characters; route every call through a joining adaptor.
        if let Some(n_fn) = self.n_fn.clone() {
            let wrapper = format!(
                "function {n_fn}__join(a) {{ var r = {n_fn}(a); \
                 return Array.isArray(r) ? r.join('') : r; }}"
            );
            if self.sandbox.eval(wrapper).await.is_ok() {
                self.n_fn = Some(format!("{n_fn}__join"));
            }
        }

        self.ready = true;
        true
    }

    /// Identity when not ready or when the sandbox call fails.
    pub async fn solve_sig(&self, signature: &str) -> String {
        let Some(name) = self.sig_fn.as_ref().filter(|_| self.ready) else {
            return signature.to_string();
        };
        match self.sandbox.call(name, vec![signature.to_string()]).await {
            Ok(result) => result,
            Err(e) => {
                debug!("signature solve failed: {e}");
                signature.to_string()
            }
        }
    }

    pub async fn solve_n(&self, n: &str) -> String {
        let Some(name) = self.n_fn.as_ref().filter(|_| self.ready) else {
            return n.to_string();
        };
        match self.sandbox.call(name, vec![n.to_string()]).await {
            Ok(result) if !result.is_empty() => result,
            Ok(_) => n.to_string(),
            Err(e) => {
                debug!("n solve failed: {e}");
                n.to_string()
            }
        }
    }
}

/// Character scanner state shared by the IIFE extractor and the statement
/// splitter: tracks string literals, escapes, and regex literals.
struct Scanner<'a> {
    bytes: &'a [u8],
    quote: Option<u8>,
    in_regex: bool,
}

impl<'a> Scanner<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            quote: None,
            in_regex: false,
        }
    }

    fn is_escaped(&self, i: usize) -> bool {
        let mut backslashes = 0usize;
        let mut j = i;
        while j > 0 && self.bytes[j - 1] == b'\\' {
            backslashes += 1;
            j -= 1;
        }
        backslashes % 2 == 1
    }

    fn previous_significant(&self, i: usize) -> Option<u8> {
        self.bytes[..i]
            .iter()
            .rev()
            .copied()
            .find(|c| !c.is_ascii_whitespace())
    }

    /// Advance over byte `i`; returns true when the byte is plain code
    /// (outside strings and regex literals).
    fn step(&mut self, i: usize) -> bool {
        let c = self.bytes[i];
        let escaped = self.is_escaped(i);

        match c {
            b'"' | b'\'' | b'`' if !escaped && !self.in_regex => match self.quote {
                None => self.quote = Some(c),
                Some(q) if q == c => self.quote = None,
                Some(_) => {}
            },
            b'/' if self.quote.is_none() && !escaped => {
                if self.in_regex {
                    self.in_regex = false;
                } else {
                    let prev = self.previous_significant(i);
                    if prev.is_none() || prev.map_or(false, |p| REGEX_PRECEDERS.contains(&p)) {
                        self.in_regex = true;
                    }
                }
            }
            _ => {}
        }

        self.quote.is_none() && !self.in_regex
    }
}

/// Extract the body of the outer `(function(...){ ... })` IIFE.
pub fn extract_iife_body(player_code: &str) -> Option<String> {
    static IIFE_START: OnceLock<Regex> = OnceLock::new();
    let start = IIFE_START
        .get_or_init(|| Regex::new(r"\((function\s*\([^)]*\)\s*\{)").unwrap())
        .find(player_code)?
        .start();

    let bytes = player_code.as_bytes();
    let mut scanner = Scanner::new(bytes);
    let mut depth = 0i32;
    let mut body_start = None;

    for i in start..bytes.len() {
        let plain = scanner.step(i);
        if !plain {
            continue;
        }
        match bytes[i] {
            b'{' => {
                if body_start.is_none() {
                    body_start = Some(i + 1);
                }
                depth += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(body_start) = body_start {
                        return Some(player_code[body_start..i].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Split at `;` occurring at brace and paren depth zero, outside strings and
/// regex literals.
pub fn split_top_level_statements(code: &str) -> Vec<String> {
    let bytes = code.as_bytes();
    let mut scanner = Scanner::new(bytes);
    let mut statements = Vec::new();
    let mut brace_depth = 0i32;
    let mut paren_depth = 0i32;
    let mut start = 0usize;

    for i in 0..bytes.len() {
        let plain = scanner.step(i);
        if plain {
            match bytes[i] {
                b'{' => brace_depth += 1,
                b'}' => brace_depth -= 1,
                b'(' => paren_depth += 1,
                b')' => paren_depth -= 1,
                b';' if brace_depth == 0 && paren_depth == 0 => {
                    statements.push(code[start..=i].to_string());
                    start = i + 1;
                }
                _ => {}
            }
        }
    }
    if start < bytes.len() {
        let tail = code[start..].trim();
        if !tail.is_empty() {
            statements.push(tail.to_string());
        }
    }
    statements
}

/// Control flow at the top level executes the player; definitions do not.
/// `for` loops are kept because minified players hide definitions in them.
fn keep_statement(statement: &str) -> bool {
    let trimmed = statement.trim_start();
    if trimmed.starts_with("for") {
        return true;
    }
    const DROP: &[&str] = &[
        "try", "if", "return", "throw", "while", "do", "switch", "break", "continue",
    ];
    !DROP.iter().any(|kw| {
        trimmed.starts_with(kw)
            && trimmed[kw.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '$' && c != '_')
    })
}

pub fn filter_statements(statements: &[String]) -> String {
    let mut result = String::new();
    for statement in statements {
        if keep_statement(statement) {
            result.push_str(statement);
            result.push('\n');
        }
    }
    result
}

/// Locate the signature scrambler: the function whose body starts with
/// `a=a.split("` (or the single-quote variant), found by walking back from
/// the marker to the preceding `name=function` definition.
fn find_sig_function(code: &str) -> Option<String> {
    let marker = code
        .find("a=a.split(\"")
        .or_else(|| code.find("a=a.split('"))?;

    let func_def = code[..marker].rfind("function")?;
    let eq = code[..func_def].rfind('=')?;

    let name_end = eq;
    let mut name_start = name_end;
    let bytes = code.as_bytes();
    while name_start > 0 {
        let c = bytes[name_start - 1];
        if c.is_ascii_alphanumeric() || c == b'$' || c == b'_' {
            name_start -= 1;
        } else {
            break;
        }
    }
    if name_start == name_end {
        return None;
    }
    Some(code[name_start..name_end].to_string())
}

/// Locate the n transform: a `name=function(x){...}` whose body calls
/// `x.split(...)`. Three variants are tried in a fixed order; the first
/// match across all candidates wins. The signature scrambler also opens
/// with a split call, so it is excluded from candidacy.
fn find_n_function(code: &str, exclude: Option<&str>) -> Option<String> {
    static CANDIDATE: OnceLock<Regex> = OnceLock::new();
    let candidate = CANDIDATE.get_or_init(|| {
        Regex::new(r"([a-zA-Z0-9$_]+)\s*=\s*function\s*\(\s*([a-zA-Z0-9$_]+)\s*\)\s*\{").unwrap()
    });

    let mut candidates = Vec::new();
    for caps in candidate.captures_iter(code) {
        let name = caps.get(1).unwrap().as_str();
        if Some(name) == exclude {
            continue;
        }
        let param = caps.get(2).unwrap().as_str();
        let body_open = caps.get(0).unwrap().end() - 1;
        if let Some(body) = braced_block(code, body_open) {
            candidates.push((name.to_string(), param.to_string(), body));
        }
    }

    let patterns: [fn(&str, &str) -> bool; 3] = [
        // 1. direct split of the parameter with a string argument
        |body, param| {
            Regex::new(&format!(
                r#"{}\s*\.split\s*\(\s*["']"#,
                regex::escape(param)
            ))
            .map(|re| re.is_match(body))
            .unwrap_or(false)
        },
        // 2. split result assigned to an intermediate variable
        |body, param| {
            Regex::new(&format!(
                r"var\s+[a-zA-Z0-9$_]+\s*=\s*{}\s*\.split\s*\(",
                regex::escape(param)
            ))
            .map(|re| re.is_match(body))
            .unwrap_or(false)
        },
        // 3. relaxed: any split call on the parameter
        |body, param| body.contains(&format!("{param}.split(")),
    ];

    for pattern in patterns {
        for (name, param, body) in &candidates {
            if pattern(body, param) {
                return Some(name.clone());
            }
        }
    }
    None
}

/// Naive brace matching starting at the `{` at `open`; player function
/// bodies are small enough that string-brace collisions are not a concern
/// for discovery purposes.
fn braced_block(code: &str, open: usize) -> Option<String> {
    let bytes = code.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0i32;
    for i in open..bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(code[open..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
