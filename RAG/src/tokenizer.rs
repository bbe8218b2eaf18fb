//! Length estimators used to decide chunk boundaries and history budgets.
//!
//! A measure must be monotonic in string length for a fixed model. Character
//! counts and token counts are not interchangeable: the same `max_size` means
//! very different amounts of text under each.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Chars,
    Tokens,
}

impl FromStr for SizeUnit {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chars" | "characters" => Ok(SizeUnit::Chars),
            "tokens" => Ok(SizeUnit::Tokens),
            other => Err(RagError::Config(format!(
                "unknown size unit '{other}', expected 'chars' or 'tokens'"
            ))),
        }
    }
}

#[derive(Clone)]
pub enum TextMeasure {
    /// Unicode scalar values.
    Chars,
    /// `cl100k_base` tokens, the encoding used by the OpenAI chat and embedding models.
    Tokens(Arc<CoreBPE>),
}

impl TextMeasure {
    pub fn for_unit(unit: SizeUnit) -> Result<Self> {
        match unit {
            SizeUnit::Chars => Ok(TextMeasure::Chars),
            SizeUnit::Tokens => {
                let bpe = tiktoken_rs::cl100k_base()
                    .map_err(|e| RagError::Config(format!("failed to load tokenizer: {e}")))?;
                Ok(TextMeasure::Tokens(Arc::new(bpe)))
            }
        }
    }

    pub fn measure(&self, text: &str) -> usize {
        match self {
            TextMeasure::Chars => text.chars().count(),
            TextMeasure::Tokens(bpe) => bpe.encode_with_special_tokens(text).len(),
        }
    }

    pub fn unit(&self) -> SizeUnit {
        match self {
            TextMeasure::Chars => SizeUnit::Chars,
            TextMeasure::Tokens(_) => SizeUnit::Tokens,
        }
    }
}

impl fmt::Debug for TextMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMeasure::Chars => f.write_str("TextMeasure::Chars"),
            TextMeasure::Tokens(_) => f.write_str("TextMeasure::Tokens(cl100k_base)"),
        }
    }
}
