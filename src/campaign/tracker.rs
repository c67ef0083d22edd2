//! Thread-safe campaign tracking
//!
//! [`CampaignTracker`] owns a [`CampaignIndex`] behind a single writer lock,
//! maps each [`RangeAnalysis`] onto the matching campaign and forwards every
//! resulting [`CampaignEvent`] to observers once the lock is released.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    Campaign, CampaignEvent, CampaignId, CampaignIndex, CampaignPattern, CampaignState,
    IndexConfig, PatternKind,
};
use crate::{RangeAnalysis, Result};

/// Receiver of campaign notifications. Called outside the index lock.
pub trait CampaignObserver: Send + Sync {
    fn on_event(&self, event: &CampaignEvent);
}

impl<F> CampaignObserver for F
where
    F: Fn(&CampaignEvent) + Send + Sync,
{
    fn on_event(&self, event: &CampaignEvent) {
        self(event)
    }
}

#[derive(Default)]
pub struct CampaignTracker {
    index: RwLock<CampaignIndex>,
    observers: RwLock<Vec<Arc<dyn CampaignObserver>>>,
}

impl CampaignTracker {
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index: RwLock::new(CampaignIndex::new(config)),
            observers: RwLock::new(Vec::new()),
        })
    }

    pub fn subscribe(&self, observer: Arc<dyn CampaignObserver>) {
        self.observers.write().push(observer);
    }

    /// Read-only access to the index.
    pub fn with_index<R>(&self, f: impl FnOnce(&CampaignIndex) -> R) -> R {
        f(&self.index.read())
    }

    pub fn get(&self, id: CampaignId) -> Option<Campaign> {
        self.index.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Fold one range analysis into its campaign.
    ///
    /// The campaign is the most recent one for the same symbol and range, or
    /// a new Forming campaign when none exists. Patterns and entries
    /// already recorded are skipped. A signal activates a Forming campaign; a
    /// breakdown invalidates it. Closed campaigns are left untouched.
    ///
    /// Returns `None` when the analysis found nothing to record.
    pub fn record_analysis(&self, analysis: &RangeAnalysis) -> Result<Option<CampaignId>> {
        let patterns = patterns_of(analysis);
        let Some(first_ts) = patterns.iter().map(|p| p.timestamp).min() else {
            return Ok(None);
        };

        let (id, events) = {
            let mut index = self.index.write();
            let mut events = Vec::new();

            let id = match index.find_campaign(&analysis.symbol, &analysis.range.id) {
                Some(id) => id,
                None => {
                    let id = index.allocate_id();
                    let campaign = Campaign::new(id, &analysis.symbol, &analysis.range.id, first_ts);
                    events.extend(index.add_to_indexes(campaign)?);
                    id
                }
            };

            let closed = index.get(id).map_or(true, Campaign::is_terminal);
            if !closed {
                Self::apply(&mut index, id, analysis, patterns, &mut events)?;
            }
            (id, events)
        };

        self.notify(&events);
        Ok(Some(id))
    }

    fn apply(
        index: &mut CampaignIndex,
        id: CampaignId,
        analysis: &RangeAnalysis,
        patterns: Vec<CampaignPattern>,
        events: &mut Vec<CampaignEvent>,
    ) -> Result<()> {
        for pattern in patterns {
            let known = index
                .get(id)
                .is_some_and(|c| c.has_pattern(pattern.kind, pattern.timestamp));
            if !known {
                events.extend(index.record_pattern(id, pattern)?);
            }
        }

        for signal in analysis.signals() {
            let known = index.get(id).is_some_and(|c| c.has_entry(signal));
            if !known {
                events.extend(index.add_entry(id, signal.clone())?);
            }
        }

        let state = index.get(id).map(|c| c.state);
        if let Some(breakdown) = &analysis.breakdown {
            events.extend(index.update_indexes(id, CampaignState::Invalidated, breakdown.timestamp)?);
        } else if state == Some(CampaignState::Forming) {
            if let Some(signal) = analysis.signals().last() {
                events.extend(index.update_indexes(id, CampaignState::Active, signal.timestamp)?);
            }
        }
        Ok(())
    }

    /// Move a campaign to `to` and notify observers.
    pub fn transition(&self, id: CampaignId, to: CampaignState, timestamp: i64) -> Result<()> {
        let events = self.index.write().update_indexes(id, to, timestamp)?;
        self.notify(&events);
        Ok(())
    }

    /// Close a campaign whose target was reached.
    pub fn complete(&self, id: CampaignId, timestamp: i64) -> Result<()> {
        self.transition(id, CampaignState::Completed, timestamp)
    }

    /// Close a campaign whose stop was hit.
    pub fn fail(&self, id: CampaignId, timestamp: i64) -> Result<()> {
        self.transition(id, CampaignState::Failed, timestamp)
    }

    pub fn remove(&self, id: CampaignId) -> Result<Campaign> {
        let (campaign, events) = self.index.write().remove_from_indexes(id)?;
        self.notify(&events);
        Ok(campaign)
    }

    /// Expire idle campaigns as of `now`; returns how many were removed.
    pub fn expire_idle(&self, now: i64) -> usize {
        let events = self.index.write().expire_idle(now);
        self.notify(&events);
        events
            .iter()
            .filter(|e| e.kind == super::CampaignEventKind::Removed)
            .count()
    }

    fn notify(&self, events: &[CampaignEvent]) {
        if events.is_empty() {
            return;
        }
        let observers = self.observers.read().clone();
        for event in events {
            for observer in &observers {
                observer.on_event(event);
            }
        }
    }
}

/// Every detection in `analysis`, as campaign patterns.
fn patterns_of(analysis: &RangeAnalysis) -> Vec<CampaignPattern> {
    let mut patterns = Vec::new();
    for record in analysis.history.springs() {
        let spring = &record.spring;
        let mut pattern = CampaignPattern::new(PatternKind::Spring, spring.bar_index, spring.timestamp);
        if let Some(score) = record.total_score() {
            pattern = pattern.with_confidence(score);
        }
        patterns.push(pattern);
        if let Some(test) = &record.test {
            patterns.push(CampaignPattern::new(PatternKind::Test, test.bar_index, test.timestamp));
        }
    }
    for scored in &analysis.breakouts {
        let b = &scored.breakout;
        patterns.push(
            CampaignPattern::new(PatternKind::SignOfStrength, b.bar_index, b.timestamp)
                .with_confidence(scored.confidence.total_score),
        );
        if let Some(lps) = &scored.lps {
            patterns.push(CampaignPattern::new(
                PatternKind::LastPointOfSupport,
                lps.bar_index,
                lps.timestamp,
            ));
        }
    }
    if let Some(breakdown) = &analysis.breakdown {
        patterns.push(CampaignPattern::new(
            PatternKind::Breakdown,
            breakdown.bar_index,
            breakdown.timestamp,
        ));
    }
    patterns.sort_by_key(|p| p.timestamp);
    patterns
}
