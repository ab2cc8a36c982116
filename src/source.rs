use std::io::{self, BufRead};

/// A retained source line: comment stripped, trimmed, never blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number in the input.
    pub number: usize,
    pub text: String,
}

/// Drops the `#` comment and surrounding whitespace; `None` for blank lines.
pub fn clean_line(raw: &str) -> Option<&str> {
    let code = raw.split_once('#').map_or(raw, |(code, _)| code).trim();
    (!code.is_empty()).then_some(code)
}

/// Pulls raw lines from a reader; end of input is `Ok(None)`.
pub struct LineReader<R> {
    inner: R,
    number: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, number: 0 }
    }

    pub fn next_line(&mut self) -> io::Result<Option<(usize, String)>> {
        let mut buf = String::new();
        if self.inner.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        self.number += 1;
        let len = buf.trim_end_matches(|c| c == '\r' || c == '\n').len();
        buf.truncate(len);
        Ok(Some((self.number, buf)))
    }

    /// Reads every remaining line and keeps only those carrying code.
    pub fn read_program(mut self) -> io::Result<Vec<SourceLine>> {
        let mut lines = Vec::new();
        while let Some((number, raw)) = self.next_line()? {
            if let Some(text) = clean_line(&raw) {
                lines.push(SourceLine { number, text: text.to_string() });
            }
        }
        Ok(lines)
    }
}

pub fn lines_from_str(source: &str) -> Vec<SourceLine> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| clean_line(raw).map(|text| SourceLine { number: i + 1, text: text.to_string() }))
        .collect()
}
