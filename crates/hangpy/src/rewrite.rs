//! Narrow source-to-source pass that makes line-input call sites awaitable.
//!
//! This is a text rewrite, not a parser: a recognized name inside a string
//! literal or a comment is rewritten like any other call site.

use regex::Regex;

use crate::{Error, Result};

pub const SUSPEND_MARKER: &str = "await";

/// Private-use code points tried as the protection sentinel, in order.
const SENTINEL_CANDIDATES: std::ops::RangeInclusive<u32> = 0xE000..=0xF8FF;

#[derive(Debug, Clone)]
struct CallName {
    marked: Regex,
    call: Regex,
}

/// Rewrites `name(` into `await name(` for each recognized name, leaving
/// call sites that already carry the marker byte-identical.
#[derive(Debug, Clone)]
pub struct SourceRewriter {
    names: Vec<CallName>,
}

impl SourceRewriter {
    /// # Errors
    /// Returns [`Error::Config`] if a name is empty or is not a single identifier.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                if name.is_empty() || !name.chars().all(is_identifier_char) {
                    return Err(Error::Config(format!("invalid call name: {name:?}")));
                }
                let escaped = regex::escape(name);
                let marked = Regex::new(&format!(r"{SUSPEND_MARKER}\s+{escaped}\s*\("))
                    .map_err(|e| Error::Config(e.to_string()))?;
                let call = Regex::new(&format!(r"{escaped}\s*\("))
                    .map_err(|e| Error::Config(e.to_string()))?;
                Ok(CallName {
                    marked,
                    call,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { names })
    }

    /// Rewrite `source`. Applying this to its own output changes nothing.
    #[must_use]
    pub fn rewrite(&self, source: &str) -> String {
        let sentinel = pick_sentinel(source);
        let mut protected = Vec::new();

        // 1. protect call sites that are already marked
        let mut code = source.to_string();
        for name in &self.names {
            code = name
                .marked
                .replace_all(&code, |caps: &regex::Captures<'_>| {
                    protected.push(caps[0].to_string());
                    format!("{sentinel}{}{sentinel}", protected.len() - 1)
                })
                .into_owned();
        }

        // 2. mark what is left
        for name in &self.names {
            code = mark_calls(&code, &name.call);
        }

        // 3. restore; the sentinel is absent from `source`, so every
        // occurrence in `code` delimits a protected index
        if protected.is_empty() {
            return code;
        }
        let mut out = String::with_capacity(code.len());
        for (i, part) in code.split(sentinel).enumerate() {
            let original = (i % 2 == 1)
                .then(|| part.parse::<usize>().ok())
                .flatten()
                .and_then(|index| protected.get(index));
            out.push_str(original.map_or(part, String::as_str));
        }
        out
    }
}

impl Default for SourceRewriter {
    fn default() -> Self {
        Self::new(["입력", "input"]).expect("default call names are identifiers")
    }
}

fn mark_calls(code: &str, call: &Regex) -> String {
    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    for m in call.find_iter(code) {
        let at_boundary = code[..m.start()]
            .chars()
            .next_back()
            .is_none_or(|c| !is_identifier_char(c));
        out.push_str(&code[last..m.start()]);
        if at_boundary {
            out.push_str(SUSPEND_MARKER);
            out.push(' ');
        }
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&code[last..]);
    out
}

fn pick_sentinel(source: &str) -> char {
    SENTINEL_CANDIDATES
        .filter_map(char::from_u32)
        .find(|c| !source.contains(*c))
        .unwrap_or('\u{FFFF}')
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}
