/// Everything that can go wrong while turning source text into machine words.
///
/// Each variant carries the instruction text it was raised for so the caller
/// can report it without keeping the source around.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("unknown opcode `{mnemonic}` in `{inst}`")]
    UnknownOpcode { mnemonic: String, inst: String },
    #[error("invalid register `{token}` in `{inst}`")]
    InvalidRegister { token: String, inst: String },
    #[error("undefined label `{label}` in `{inst}`")]
    UndefinedLabel { label: String, inst: String },
    #[error("label `{label}` defined twice (second time in `{inst}`)")]
    DuplicateLabel { label: String, inst: String },
    #[error("invalid label `{label}` in `{inst}`")]
    InvalidLabel { label: String, inst: String },
    #[error("missing operand #{position} in `{inst}`")]
    MissingOperand { position: usize, inst: String },
    #[error("unexpected operand `{token}` in `{inst}`")]
    ExtraOperand { token: String, inst: String },
    #[error("invalid immediate `{token}` in `{inst}`")]
    InvalidImmediate { token: String, inst: String },
    #[error("immediate {value} does not fit in {bits} bits in `{inst}`")]
    ImmediateOutOfRange { value: i64, bits: usize, inst: String },
    #[error("malformed memory operand `{token}` in `{inst}`")]
    MalformedMemoryOperand { token: String, inst: String },
    #[error("branch target `{label}` has not been resolved in `{inst}`")]
    UnresolvedTarget { label: String, inst: String },
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<AsmError>,
    },
}

impl AsmError {
    /// Rebinds the instruction text carried by the error.
    ///
    /// The codec raises errors knowing only the token; the variant layer calls
    /// this to attach the full instruction.
    pub fn in_instruction(mut self, text: &str) -> Self {
        match &mut self {
            AsmError::UnknownOpcode { inst, .. }
            | AsmError::InvalidRegister { inst, .. }
            | AsmError::UndefinedLabel { inst, .. }
            | AsmError::DuplicateLabel { inst, .. }
            | AsmError::InvalidLabel { inst, .. }
            | AsmError::MissingOperand { inst, .. }
            | AsmError::ExtraOperand { inst, .. }
            | AsmError::InvalidImmediate { inst, .. }
            | AsmError::ImmediateOutOfRange { inst, .. }
            | AsmError::MalformedMemoryOperand { inst, .. }
            | AsmError::UnresolvedTarget { inst, .. } => *inst = text.to_string(),
            AsmError::AtLine { source, .. } => {
                let inner = (**source).clone();
                **source = inner.in_instruction(text);
            }
        }
        self
    }

    /// Wraps the error with a 1-based source line number.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            AsmError::AtLine { .. } => self,
            other => AsmError::AtLine { line, source: Box::new(other) },
        }
    }

    /// The error without any line wrapper.
    pub fn root(&self) -> &AsmError {
        match self {
            AsmError::AtLine { source, .. } => source.root(),
            other => other,
        }
    }
}
