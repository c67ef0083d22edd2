//! Campaigns: the lifecycle of pattern detections in one symbol's range.
//!
//! - [`CampaignIndex`]: id, state and recently-active views kept consistent
//!   by every mutation.
//! - [`CampaignTracker`]: thread-safe owner of an index that turns
//!   [`RangeAnalysis`](crate::RangeAnalysis) results into campaign updates
//!   and notifies observers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::risk::SpringSignal;

pub mod index;
pub mod tracker;

pub use index::{CampaignIndex, IndexConfig, RecentWindow};
pub use tracker::{CampaignObserver, CampaignTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CampaignId(pub u64);

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "campaign-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Forming,
    Active,
    Completed,
    Failed,
    Invalidated,
}

impl CampaignState {
    pub const ALL: [CampaignState; 5] = [
        Self::Forming,
        Self::Active,
        Self::Completed,
        Self::Failed,
        Self::Invalidated,
    ];

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Invalidated)
    }

    /// Forming and Active move freely between each other; either may end in a
    /// terminal state. Terminal states accept nothing.
    pub fn can_transition_to(self, to: CampaignState) -> bool {
        use CampaignState::*;
        match (self, to) {
            (Forming, Active) | (Active, Forming) => true,
            (Forming | Active, Completed | Failed | Invalidated) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Spring,
    Test,
    SignOfStrength,
    LastPointOfSupport,
    Breakdown,
}

/// One detection attached to a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPattern {
    pub kind: PatternKind,
    pub bar_index: usize,
    pub timestamp: i64,
    pub confidence: Option<f64>,
}

impl CampaignPattern {
    pub fn new(kind: PatternKind, bar_index: usize, timestamp: i64) -> Self {
        Self {
            kind,
            bar_index,
            timestamp,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Lifecycle record for the detections of one symbol's trading range.
///
/// Timestamps are bar timestamps; the crate keeps no wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub symbol: String,
    pub range_id: String,
    pub state: CampaignState,
    pub patterns: Vec<CampaignPattern>,
    pub entries: Vec<SpringSignal>,
    pub created_at: i64,
    pub last_activity: i64,
}

impl Campaign {
    pub fn new(
        id: CampaignId,
        symbol: impl Into<String>,
        range_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            range_id: range_id.into(),
            state: CampaignState::Forming,
            patterns: Vec::new(),
            entries: Vec::new(),
            created_at: timestamp,
            last_activity: timestamp,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    #[inline]
    pub fn matches(&self, symbol: &str, range_id: &str) -> bool {
        self.symbol == symbol && self.range_id == range_id
    }

    pub fn has_pattern(&self, kind: PatternKind, timestamp: i64) -> bool {
        self.patterns
            .iter()
            .any(|p| p.kind == kind && p.timestamp == timestamp)
    }

    pub fn has_entry(&self, signal: &SpringSignal) -> bool {
        self.entries
            .iter()
            .any(|e| e.spring_bar_index == signal.spring_bar_index && e.timestamp == signal.timestamp)
    }

    pub fn patterns_of(&self, kind: PatternKind) -> impl Iterator<Item = &CampaignPattern> + '_ {
        self.patterns.iter().filter(move |p| p.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CampaignEventKind {
    Added,
    StateChanged {
        from: CampaignState,
        to: CampaignState,
    },
    PatternRecorded { pattern: PatternKind },
    EntryAdded { spring_bar_index: usize },
    Removed,
}

/// State-change notification. The envelope used to broadcast it belongs to
/// the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignEvent {
    pub campaign_id: CampaignId,
    pub symbol: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub kind: CampaignEventKind,
}

impl CampaignEvent {
    pub fn new(campaign: &Campaign, timestamp: i64, kind: CampaignEventKind) -> Self {
        Self {
            campaign_id: campaign.id,
            symbol: campaign.symbol.clone(),
            timestamp,
            kind,
        }
    }

    /// Target state when this event is a transition
    pub fn new_state(&self) -> Option<CampaignState> {
        match self.kind {
            CampaignEventKind::StateChanged { to, .. } => Some(to),
            _ => None,
        }
    }
}
