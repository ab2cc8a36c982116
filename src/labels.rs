use std::collections::HashMap;

use tracing::debug;

use crate::error::AsmError;
use crate::source::SourceLine;

/// Label name to instruction index (not byte address).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: HashMap<String, usize>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name` at `index`; a second definition is an error.
    pub fn define(&mut self, name: &str, index: usize, inst: &str) -> Result<(), AsmError> {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(AsmError::InvalidLabel {
                label: name.to_string(),
                inst: inst.to_string(),
            });
        }
        if self.labels.contains_key(name) {
            return Err(AsmError::DuplicateLabel {
                label: name.to_string(),
                inst: inst.to_string(),
            });
        }
        self.labels.insert(name.to_string(), index);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels sorted by index, then name.
    pub fn sorted(&self) -> Vec<(&str, usize)> {
        let mut v: Vec<(&str, usize)> = self.labels.iter().map(|(k, &i)| (k.as_str(), i)).collect();
        v.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));
        v
    }
}

/// Splits `label: instruction` at the first colon.
///
/// Returns the label (if any) and the instruction text with the single space
/// after the colon removed.
pub fn split_label(line: &str) -> (Option<&str>, &str) {
    match line.split_once(':') {
        Some((label, rest)) => (Some(label.trim()), rest.strip_prefix(' ').unwrap_or(rest).trim()),
        None => (None, line),
    }
}

/// Builds the label table and returns the label-free instruction lines.
///
/// The running index counts instruction lines only; a label standing alone on
/// its line binds to the next instruction (or to the end of the program).
pub fn build(lines: &[SourceLine]) -> Result<(LabelTable, Vec<SourceLine>), AsmError> {
    let mut table = LabelTable::new();
    let mut stripped = Vec::with_capacity(lines.len());
    for line in lines {
        let (label, text) = split_label(&line.text);
        if let Some(label) = label {
            let index = stripped.len();
            table
                .define(label, index, &line.text)
                .map_err(|e| e.at_line(line.number))?;
            debug!(label, index, line = line.number, "label");
        }
        if !text.is_empty() {
            stripped.push(SourceLine {
                number: line.number,
                text: text.to_string(),
            });
        }
    }
    Ok((table, stripped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_label_trims_the_space_after_the_colon() {
        assert_eq!(split_label("loop: add r1 r1 r2"), (Some("loop"), "add r1 r1 r2"));
        assert_eq!(split_label("loop:add r1 r1 r2"), (Some("loop"), "add r1 r1 r2"));
        assert_eq!(split_label("end:"), (Some("end"), ""));
        assert_eq!(split_label("add r1 r1 r2"), (None, "add r1 r1 r2"));
    }

    #[test]
    fn define_rejects_bad_names() {
        let mut t = LabelTable::new();
        assert!(matches!(t.define("", 0, ": add"), Err(AsmError::InvalidLabel { .. })));
        assert!(matches!(t.define("a b", 0, "a b: add"), Err(AsmError::InvalidLabel { .. })));
        t.define("Loop", 0, "").unwrap();
        t.define("loop", 1, "").unwrap();
        assert_eq!(t.get("Loop"), Some(0));
        assert_eq!(t.get("loop"), Some(1));
    }
}
