//! Chronological data splits.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One of the three contiguous, chronologically ordered partitions of the
/// raw table.
///
/// Train rows strictly precede validation rows, which strictly precede test
/// rows. Only the training split is ever shuffled.
///
/// # Example
///
/// ```rust
/// use metrocast_core::Split;
///
/// let split: Split = "val".parse().unwrap();
/// assert!(split.is_eval());
/// assert_eq!(split.to_string(), "val");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Chronological prefix used for fitting statistics and parameters.
    #[default]
    Train,
    /// Middle range used for model selection and early stopping.
    Val,
    /// Final range, touched once after training.
    Test,
}

impl Split {
    /// All splits in chronological order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// Check if this is the training split.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    /// Check if this is an evaluation split (val or test).
    ///
    /// Evaluation splits keep strict chronological order.
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        matches!(self, Split::Val | Split::Test)
    }

    /// Name used in logs and artifact paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "val" | "valid" | "validation" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(CoreError::InvalidConfig(format!(
                "invalid split '{other}', must be 'train', 'val', or 'test'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_checks() {
        assert!(Split::Train.is_train());
        assert!(!Split::Train.is_eval());
        assert!(Split::Val.is_eval());
        assert!(Split::Test.is_eval());
    }

    #[test]
    fn test_split_parse() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("VALID".parse::<Split>().unwrap(), Split::Val);
        assert_eq!("test".parse::<Split>().unwrap(), Split::Test);
        assert!("holdout".parse::<Split>().is_err());
    }

    #[test]
    fn test_split_display() {
        let names: Vec<String> = Split::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["train", "val", "test"]);
    }
}
