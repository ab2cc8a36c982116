//! Two-pass driver.
//!
//! Pass 1 records every label and parses each line into an [`Instruction`].
//! Pass 2 resolves branch and jump offsets against the finished label table
//! and emits one 32-character word per instruction, in source order.

use tracing::debug;

use crate::error::AsmError;
use crate::labels::{self, LabelTable};
use crate::source::{lines_from_str, SourceLine};
use crate::variant::Instruction;

#[derive(Debug, Clone)]
pub struct Assembler {
    labels: LabelTable,
    program: Vec<(usize, Instruction)>,
}

impl Assembler {
    /// Pass 1. `lines` are retained lines in source order.
    pub fn pass1(lines: &[SourceLine]) -> Result<Self, AsmError> {
        let (labels, stripped) = labels::build(lines)?;
        let mut program = Vec::with_capacity(stripped.len());
        for line in &stripped {
            let inst = Instruction::parse(&line.text).map_err(|e| e.at_line(line.number))?;
            debug!(index = program.len(), line = line.number, format = ?inst.format(), text = inst.text(), "pass 1");
            program.push((line.number, inst));
        }
        Ok(Self { labels, program })
    }

    /// Pass 2. Safe to call more than once; resolved targets stay resolved.
    pub fn pass2(&mut self) -> Result<Vec<String>, AsmError> {
        let mut words = Vec::with_capacity(self.program.len());
        for (index, (line, inst)) in self.program.iter_mut().enumerate() {
            inst.resolve_offset(index, &self.labels).map_err(|e| e.at_line(*line))?;
            let word = inst.encode().map_err(|e| e.at_line(*line))?;
            debug!(index, line = *line, word = %word, "pass 2");
            words.push(word);
        }
        Ok(words)
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn program(&self) -> impl Iterator<Item = &Instruction> {
        self.program.iter().map(|(_, inst)| inst)
    }

    pub fn len(&self) -> usize {
        self.program.len()
    }

    pub fn is_empty(&self) -> bool {
        self.program.is_empty()
    }
}

pub fn assemble_lines(lines: &[SourceLine]) -> Result<Vec<String>, AsmError> {
    Assembler::pass1(lines)?.pass2()
}

/// Assembles a whole source text into binary words.
pub fn assemble(source: &str) -> Result<Vec<String>, AsmError> {
    assemble_lines(&lines_from_str(source))
}
