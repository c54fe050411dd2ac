//! Stage classification
//!
//! Maps the free-text status labels stored remotely onto the nine
//! canonical pipeline stages, and back to the exact display titles the
//! remote store expects when a move is persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of pipeline stages on every board
pub const STAGE_COUNT: usize = 9;

/// Canonical pipeline stage
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum StageKey {
    /// `new-lead`
    #[default]
    NewLead,
    /// `contacted`
    Contacted,
    /// `qualified`
    Qualified,
    /// `proposal`
    Proposal,
    /// `negotiation`
    Negotiation,
    /// `contract-sent`
    ContractSent,
    /// `won-sold`
    WonSold,
    /// `lost`
    Lost,
    /// `inactive`
    Inactive,
}

impl StageKey {
    /// All stages in board (column) order
    pub const ALL: [StageKey; STAGE_COUNT] = [
        StageKey::NewLead,
        StageKey::Contacted,
        StageKey::Qualified,
        StageKey::Proposal,
        StageKey::Negotiation,
        StageKey::ContractSent,
        StageKey::WonSold,
        StageKey::Lost,
        StageKey::Inactive,
    ];

    /// Machine key, e.g. `contract-sent`
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StageKey::NewLead => "new-lead",
            StageKey::Contacted => "contacted",
            StageKey::Qualified => "qualified",
            StageKey::Proposal => "proposal",
            StageKey::Negotiation => "negotiation",
            StageKey::ContractSent => "contract-sent",
            StageKey::WonSold => "won-sold",
            StageKey::Lost => "lost",
            StageKey::Inactive => "inactive",
        }
    }

    /// Display title, sent verbatim to the persistence service
    #[inline]
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            StageKey::NewLead => "New Lead",
            StageKey::Contacted => "Contacted",
            StageKey::Qualified => "Qualified",
            StageKey::Proposal => "Proposal",
            StageKey::Negotiation => "Negotiation",
            StageKey::ContractSent => "Contract Sent",
            StageKey::WonSold => "Won/Sold",
            StageKey::Lost => "Lost",
            StageKey::Inactive => "Inactive",
        }
    }

    /// Column position on the board
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a machine stage key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage key: {0}")]
pub struct UnknownStageKey(pub String);

impl FromStr for StageKey {
    type Err = UnknownStageKey;

    /// Strict parse of a machine key. Use [`canonicalize`] for free-text labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownStageKey(s.to_string()))
    }
}

/// Result of classifying a status label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Stage the label was assigned to
    pub key: StageKey,
    /// True when the label was not recognized and fell back to `new-lead`
    pub fallback: bool,
}

/// Normalize a label the way the board derives its column ids.
///
/// Lower-cases, collapses every whitespace run into `-`, then replaces the
/// first `/` with `-`.
#[must_use]
pub fn normalize(label: &str) -> String {
    let lowered = label.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_whitespace = false;

    for ch in lowered.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('-');
            }
            in_whitespace = true;
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }

    out.replacen('/', "-", 1)
}

/// Classify a status label, reporting whether the fallback was used
#[must_use]
pub fn classify(label: &str) -> Classification {
    match normalize(label).parse::<StageKey>() {
        Ok(key) => Classification {
            key,
            fallback: false,
        },
        Err(_) => Classification {
            key: StageKey::NewLead,
            fallback: true,
        },
    }
}

/// Map a free-text status label to its stage.
///
/// Unrecognized labels land in `new-lead` so every prospect stays visible.
#[inline]
#[must_use]
pub fn canonicalize(label: &str) -> StageKey {
    classify(label).key
}

/// Display title for a stage
#[inline]
#[must_use]
pub fn title_of(key: StageKey) -> &'static str {
    key.title()
}
