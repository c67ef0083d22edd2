//! Campaign index
//!
//! Four views over the same campaign set:
//!
//! - `by_id`: canonical map, O(1) lookup.
//! - `by_state`: one id set per lifecycle state, O(1) membership.
//! - `by_key`: ids per `(symbol, range_id)`, the authoritative match lookup.
//! - [`RecentWindow`]: bounded, insertion-ordered set of recently touched
//!   ids used as a fast path when matching new detections.
//!
//! Every mutation updates all views before returning and then checks
//! the touched id. A mismatch panics in debug builds; release builds log it
//! and rebuild the derived views from `by_id`.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::{Campaign, CampaignEvent, CampaignEventKind, CampaignId, CampaignPattern, CampaignState};
use crate::risk::SpringSignal;
use crate::{Result, WyckoffError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Most ids kept in the recently-active window
    pub recent_capacity: usize,
    /// Idle time, in bar timestamp units, after which a campaign expires
    pub max_idle: i64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 256,
            max_idle: 30 * 24 * 60 * 60,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.recent_capacity == 0 {
            return Err(WyckoffError::InvalidConfig(
                "recent_capacity must be > 0".into(),
            ));
        }
        if self.max_idle <= 0 {
            return Err(WyckoffError::InvalidConfig("max_idle must be > 0".into()));
        }
        Ok(())
    }
}

// ============================================================
// RECENT WINDOW
// ============================================================

/// Bounded set of ids ordered by last touch.
///
/// Touching an id appends a new sequence number; older queue entries for the
/// same id become stale and are skipped on iteration and eviction.
#[derive(Debug, Clone)]
pub struct RecentWindow {
    capacity: usize,
    order: VecDeque<(CampaignId, u64)>,
    live: HashMap<CampaignId, u64>,
    next_seq: u64,
}

impl RecentWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            live: HashMap::new(),
            next_seq: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: CampaignId) -> bool {
        self.live.contains_key(&id)
    }

    /// Mark `id` as most recent. Returns the id evicted to stay in capacity.
    pub fn touch(&mut self, id: CampaignId) -> Option<CampaignId> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(id, seq);
        self.order.push_back((id, seq));

        let mut evicted = None;
        while self.live.len() > self.capacity {
            let Some((old, old_seq)) = self.order.pop_front() else {
                break;
            };
            if self.live.get(&old) == Some(&old_seq) {
                self.live.remove(&old);
                evicted = Some(old);
            }
        }
        self.compact();
        evicted
    }

    pub fn remove(&mut self, id: CampaignId) -> bool {
        let removed = self.live.remove(&id).is_some();
        self.compact();
        removed
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.live.clear();
    }

    /// Live ids, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = CampaignId> + '_ {
        self.order
            .iter()
            .rev()
            .filter(|(id, seq)| self.live.get(id) == Some(seq))
            .map(|(id, _)| *id)
    }

    /// Drop stale queue entries once they outnumber live ones.
    fn compact(&mut self) {
        if self.order.len() > 2 * self.live.len().max(self.capacity) {
            let live = &self.live;
            self.order.retain(|(id, seq)| live.get(id) == Some(seq));
        }
    }
}

// ============================================================
// CAMPAIGN INDEX
// ============================================================

#[derive(Debug, Clone)]
pub struct CampaignIndex {
    config: IndexConfig,
    by_id: HashMap<CampaignId, Campaign>,
    by_state: HashMap<CampaignState, HashSet<CampaignId>>,
    by_key: HashMap<(String, String), HashSet<CampaignId>>,
    recent: RecentWindow,
    next_id: u64,
}

fn key_of(campaign: &Campaign) -> (String, String) {
    (campaign.symbol.clone(), campaign.range_id.clone())
}

impl Default for CampaignIndex {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl CampaignIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            by_id: HashMap::new(),
            by_state: CampaignState::ALL
                .iter()
                .map(|s| (*s, HashSet::new()))
                .collect(),
            by_key: HashMap::new(),
            recent: RecentWindow::new(config.recent_capacity),
            next_id: 1,
        }
    }

    #[inline]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Allocate a fresh id. Ids are never reused by one index.
    pub fn allocate_id(&mut self) -> CampaignId {
        let id = CampaignId(self.next_id);
        self.next_id += 1;
        id
    }

    #[inline]
    pub fn get(&self, id: CampaignId) -> Option<&Campaign> {
        self.by_id.get(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Campaign> + '_ {
        self.by_id.values()
    }

    pub fn count_in_state(&self, state: CampaignState) -> usize {
        self.by_state.get(&state).map_or(0, HashSet::len)
    }

    pub fn in_state(&self, state: CampaignState) -> impl Iterator<Item = &Campaign> + '_ {
        self.by_state
            .get(&state)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
    }

    #[inline]
    pub fn is_recent(&self, id: CampaignId) -> bool {
        self.recent.contains(id)
    }

    /// Recently touched campaigns, most recent first.
    pub fn recent(&self) -> impl Iterator<Item = &Campaign> + '_ {
        self.recent.iter().filter_map(|id| self.by_id.get(&id))
    }

    /// Most recently touched campaign for `symbol`/`range_id`, searching only
    /// the recent window.
    pub fn find_recent(&self, symbol: &str, range_id: &str) -> Option<CampaignId> {
        self.recent()
            .find(|c| c.matches(symbol, range_id))
            .map(|c| c.id)
    }

    /// Campaign for `symbol`/`range_id`, whether or not it is still in the
    /// recent window. Among several, the most recently active wins.
    pub fn find_campaign(&self, symbol: &str, range_id: &str) -> Option<CampaignId> {
        if let Some(id) = self.find_recent(symbol, range_id) {
            return Some(id);
        }
        self.by_key
            .get(&(symbol.to_string(), range_id.to_string()))?
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .max_by_key(|c| (c.last_activity, c.id))
            .map(|c| c.id)
    }

    // --------------------------------------------------------
    // Mutations
    // --------------------------------------------------------

    /// Insert a campaign into every view.
    pub fn add_to_indexes(&mut self, campaign: Campaign) -> Result<Vec<CampaignEvent>> {
        let id = campaign.id;
        if self.by_id.contains_key(&id) {
            return Err(WyckoffError::DuplicateCampaign(id));
        }
        self.next_id = self.next_id.max(id.0 + 1);

        let event = CampaignEvent::new(&campaign, campaign.created_at, CampaignEventKind::Added);
        self.by_state.entry(campaign.state).or_default().insert(id);
        self.by_key.entry(key_of(&campaign)).or_default().insert(id);
        self.by_id.insert(id, campaign);
        self.touch(id);

        self.verify(id);
        Ok(vec![event])
    }

    /// Move a campaign to `to`, keeping the state buckets in step.
    pub fn update_indexes(
        &mut self,
        id: CampaignId,
        to: CampaignState,
        timestamp: i64,
    ) -> Result<Vec<CampaignEvent>> {
        let campaign = self
            .by_id
            .get_mut(&id)
            .ok_or(WyckoffError::UnknownCampaign(id))?;
        let from = campaign.state;
        if !from.can_transition_to(to) {
            return Err(WyckoffError::InvalidTransition { id, from, to });
        }

        campaign.state = to;
        campaign.last_activity = campaign.last_activity.max(timestamp);
        let event = CampaignEvent::new(campaign, timestamp, CampaignEventKind::StateChanged { from, to });

        if let Some(bucket) = self.by_state.get_mut(&from) {
            bucket.remove(&id);
        }
        self.by_state.entry(to).or_default().insert(id);
        self.touch(id);

        tracing::info!("{} ({}) {:?} -> {:?}", id, event.symbol, from, to);
        self.verify(id);
        Ok(vec![event])
    }

    /// Attach a detection to a live campaign.
    pub fn record_pattern(
        &mut self,
        id: CampaignId,
        pattern: CampaignPattern,
    ) -> Result<Vec<CampaignEvent>> {
        let campaign = self.live_mut(id)?;
        campaign.last_activity = campaign.last_activity.max(pattern.timestamp);
        let event = CampaignEvent::new(
            campaign,
            pattern.timestamp,
            CampaignEventKind::PatternRecorded {
                pattern: pattern.kind,
            },
        );
        campaign.patterns.push(pattern);
        self.touch(id);

        self.verify(id);
        Ok(vec![event])
    }

    /// Attach a sized signal to a live campaign.
    pub fn add_entry(&mut self, id: CampaignId, signal: SpringSignal) -> Result<Vec<CampaignEvent>> {
        let campaign = self.live_mut(id)?;
        campaign.last_activity = campaign.last_activity.max(signal.timestamp);
        let event = CampaignEvent::new(
            campaign,
            signal.timestamp,
            CampaignEventKind::EntryAdded {
                spring_bar_index: signal.spring_bar_index,
            },
        );
        campaign.entries.push(signal);
        self.touch(id);

        self.verify(id);
        Ok(vec![event])
    }

    /// Drop a campaign from every view.
    pub fn remove_from_indexes(&mut self, id: CampaignId) -> Result<(Campaign, Vec<CampaignEvent>)> {
        let campaign = self
            .by_id
            .remove(&id)
            .ok_or(WyckoffError::UnknownCampaign(id))?;
        if let Some(bucket) = self.by_state.get_mut(&campaign.state) {
            bucket.remove(&id);
        }
        let key = key_of(&campaign);
        if let Some(ids) = self.by_key.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_key.remove(&key);
            }
        }
        self.recent.remove(id);

        let event = CampaignEvent::new(&campaign, campaign.last_activity, CampaignEventKind::Removed);
        self.verify(id);
        Ok((campaign, vec![event]))
    }

    /// Remove campaigns idle for longer than `max_idle` as of `now`. Live
    /// ones are marked Failed first.
    pub fn expire_idle(&mut self, now: i64) -> Vec<CampaignEvent> {
        let max_idle = self.config.max_idle;
        let mut expired: Vec<CampaignId> = self
            .by_id
            .values()
            .filter(|c| now.saturating_sub(c.last_activity) > max_idle)
            .map(|c| c.id)
            .collect();
        expired.sort_unstable();

        let mut events = Vec::new();
        for id in expired {
            let live = self.by_id.get(&id).is_some_and(|c| !c.is_terminal());
            if live {
                if let Ok(mut ev) = self.update_indexes(id, CampaignState::Failed, now) {
                    events.append(&mut ev);
                }
            }
            if let Ok((campaign, mut ev)) = self.remove_from_indexes(id) {
                tracing::debug!("{} ({}) expired", id, campaign.symbol);
                events.append(&mut ev);
            }
        }
        events
    }

    /// Rebuild the state buckets, key map and recent window from `by_id`.
    pub fn rebuild_indexes(&mut self) {
        for bucket in self.by_state.values_mut() {
            bucket.clear();
        }
        self.by_key.clear();
        for campaign in self.by_id.values() {
            self.by_state.entry(campaign.state).or_default().insert(campaign.id);
            self.by_key.entry(key_of(campaign)).or_default().insert(campaign.id);
        }

        let mut by_activity: Vec<(i64, CampaignId)> =
            self.by_id.values().map(|c| (c.last_activity, c.id)).collect();
        by_activity.sort_unstable();
        self.recent.clear();
        for (_, id) in by_activity {
            self.recent.touch(id);
        }
    }

    /// Global check: the state buckets and the key map each partition
    /// `by_id`, and every recent id is indexed.
    pub fn check_consistency(&self) -> bool {
        let bucketed: usize = self.by_state.values().map(HashSet::len).sum();
        let keyed: usize = self.by_key.values().map(HashSet::len).sum();
        bucketed == self.by_id.len()
            && keyed == self.by_id.len()
            && self.by_state.iter().all(|(state, ids)| {
                ids.iter()
                    .all(|id| self.by_id.get(id).is_some_and(|c| c.state == *state))
            })
            && self.by_key.iter().all(|((symbol, range_id), ids)| {
                ids.iter()
                    .all(|id| self.by_id.get(id).is_some_and(|c| c.matches(symbol, range_id)))
            })
            && self.recent.iter().all(|id| self.by_id.contains_key(&id))
    }

    // --------------------------------------------------------
    // Internals
    // --------------------------------------------------------

    fn live_mut(&mut self, id: CampaignId) -> Result<&mut Campaign> {
        let campaign = self
            .by_id
            .get_mut(&id)
            .ok_or(WyckoffError::UnknownCampaign(id))?;
        if campaign.is_terminal() {
            return Err(WyckoffError::CampaignClosed {
                id,
                state: campaign.state,
            });
        }
        Ok(campaign)
    }

    fn touch(&mut self, id: CampaignId) {
        if let Some(evicted) = self.recent.touch(id) {
            tracing::trace!("{} left the recent window", evicted);
        }
    }

    /// Views agree on `id`.
    fn is_consistent_for(&self, id: CampaignId) -> bool {
        let buckets = CampaignState::ALL
            .iter()
            .filter(|s| self.by_state.get(s).is_some_and(|b| b.contains(&id)))
            .count();
        match self.by_id.get(&id) {
            Some(campaign) => {
                buckets == 1
                    && self
                        .by_state
                        .get(&campaign.state)
                        .is_some_and(|b| b.contains(&id))
                    && self.by_key.get(&key_of(campaign)).is_some_and(|ids| ids.contains(&id))
            }
            None => {
                buckets == 0
                    && !self.recent.contains(id)
                    && self.by_key.values().all(|ids| !ids.contains(&id))
            }
        }
    }

    fn verify(&mut self, id: CampaignId) {
        if self.is_consistent_for(id) {
            return;
        }
        debug_assert!(false, "campaign index views disagree on {id}");
        tracing::error!("campaign index views disagree on {}, rebuilding", id);
        self.rebuild_indexes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::PatternKind;

    fn index_with(n: u64) -> CampaignIndex {
        let mut index = CampaignIndex::default();
        for i in 0..n {
            let id = index.allocate_id();
            index
                .add_to_indexes(Campaign::new(id, format!("SYM{i}"), "R", i as i64))
                .unwrap();
        }
        index
    }

    #[test]
    fn test_recent_window_order_and_eviction() {
        let mut window = RecentWindow::new(3);
        for i in 1..=3 {
            assert_eq!(window.touch(CampaignId(i)), None);
        }
        window.touch(CampaignId(1));
        let order: Vec<u64> = window.iter().map(|id| id.0).collect();
        assert_eq!(order, vec![1, 3, 2]);

        assert_eq!(window.touch(CampaignId(4)), Some(CampaignId(2)));
        assert!(!window.contains(CampaignId(2)));
        assert_eq!(window.len(), 3);

        assert!(window.remove(CampaignId(3)));
        assert!(!window.remove(CampaignId(3)));
        let order: Vec<u64> = window.iter().map(|id| id.0).collect();
        assert_eq!(order, vec![4, 1]);
    }

    #[test]
    fn test_recent_window_compacts_stale_entries() {
        let mut window = RecentWindow::new(2);
        for _ in 0..100 {
            window.touch(CampaignId(1));
        }
        assert!(window.order.len() <= 4);
        assert_eq!(window.iter().count(), 1);
    }

    #[test]
    fn test_add_and_lookup() {
        let index = index_with(3);
        assert_eq!(index.len(), 3);
        assert_eq!(index.count_in_state(CampaignState::Forming), 3);
        assert!(index.get(CampaignId(2)).is_some());
        assert!(index.is_recent(CampaignId(3)));
        assert_eq!(index.find_recent("SYM1", "R"), Some(CampaignId(2)));
        assert!(index.check_consistency());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut index = index_with(1);
        let dup = Campaign::new(CampaignId(1), "X", "R", 0);
        assert!(matches!(
            index.add_to_indexes(dup),
            Err(WyckoffError::DuplicateCampaign(CampaignId(1)))
        ));
    }

    #[test]
    fn test_transition_moves_bucket() {
        let mut index = index_with(2);
        let events = index
            .update_indexes(CampaignId(1), CampaignState::Active, 10)
            .unwrap();
        assert_eq!(events[0].new_state(), Some(CampaignState::Active));
        assert_eq!(index.count_in_state(CampaignState::Forming), 1);
        assert_eq!(index.count_in_state(CampaignState::Active), 1);

        index
            .update_indexes(CampaignId(1), CampaignState::Completed, 20)
            .unwrap();
        assert!(matches!(
            index.update_indexes(CampaignId(1), CampaignState::Active, 30),
            Err(WyckoffError::InvalidTransition { .. })
        ));
        assert!(matches!(
            index.update_indexes(CampaignId(9), CampaignState::Active, 30),
            Err(WyckoffError::UnknownCampaign(_))
        ));
        assert!(index.check_consistency());
    }

    #[test]
    fn test_record_pattern_on_closed_campaign_fails() {
        let mut index = index_with(1);
        let id = CampaignId(1);
        index
            .record_pattern(id, CampaignPattern::new(PatternKind::Spring, 25, 25))
            .unwrap();
        assert_eq!(index.get(id).unwrap().patterns.len(), 1);
        assert_eq!(index.get(id).unwrap().last_activity, 25);

        index.update_indexes(id, CampaignState::Invalidated, 30).unwrap();
        assert!(matches!(
            index.record_pattern(id, CampaignPattern::new(PatternKind::Test, 29, 29)),
            Err(WyckoffError::CampaignClosed { .. })
        ));
    }

    #[test]
    fn test_remove_clears_every_view() {
        let mut index = index_with(3);
        let (campaign, events) = index.remove_from_indexes(CampaignId(2)).unwrap();
        assert_eq!(campaign.symbol, "SYM1");
        assert_eq!(events[0].kind, CampaignEventKind::Removed);
        assert!(index.get(CampaignId(2)).is_none());
        assert!(!index.is_recent(CampaignId(2)));
        assert_eq!(index.count_in_state(CampaignState::Forming), 2);
        assert!(index.remove_from_indexes(CampaignId(2)).is_err());
        assert!(index.check_consistency());
    }

    #[test]
    fn test_expire_idle() {
        let mut index = CampaignIndex::new(IndexConfig {
            recent_capacity: 8,
            max_idle: 100,
        });
        for (i, ts) in [0_i64, 100, 500].iter().enumerate() {
            let id = index.allocate_id();
            index
                .add_to_indexes(Campaign::new(id, format!("S{i}"), "R", *ts))
                .unwrap();
        }
        let events = index.expire_idle(160);
        // Campaign 1 (idle 160) fails then is removed; 2 and 3 survive
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].new_state(), Some(CampaignState::Failed));
        assert_eq!(events[1].kind, CampaignEventKind::Removed);
        assert_eq!(index.len(), 2);
        assert!(index.check_consistency());
    }

    #[test]
    fn test_rebuild_restores_consistency() {
        let mut index = index_with(4);
        index
            .update_indexes(CampaignId(3), CampaignState::Active, 10)
            .unwrap();

        // Corrupt the derived views directly
        index.by_state.values_mut().for_each(HashSet::clear);
        index.recent.touch(CampaignId(99));
        assert!(!index.check_consistency());

        index.rebuild_indexes();
        assert!(index.check_consistency());
        assert_eq!(index.count_in_state(CampaignState::Active), 1);
        assert_eq!(index.count_in_state(CampaignState::Forming), 3);
        assert_eq!(index.recent().next().map(|c| c.id), Some(CampaignId(3)));
    }

    #[test]
    fn test_recent_window_stays_bounded() {
        let mut index = CampaignIndex::new(IndexConfig {
            recent_capacity: 2,
            ..IndexConfig::default()
        });
        for i in 0..5 {
            let id = index.allocate_id();
            index
                .add_to_indexes(Campaign::new(id, format!("S{i}"), "R", i))
                .unwrap();
        }
        assert_eq!(index.len(), 5);
        assert_eq!(index.recent().count(), 2);
        assert!(index.find_recent("S0", "R").is_none());
        assert_eq!(index.find_campaign("S0", "R"), Some(CampaignId(1)));
        assert!(index.get(CampaignId(1)).is_some());
        assert!(index.check_consistency());
    }

    #[test]
    fn test_find_campaign_outside_recent_window() {
        let mut index = CampaignIndex::new(IndexConfig {
            recent_capacity: 1,
            ..IndexConfig::default()
        });
        let first = index.allocate_id();
        index.add_to_indexes(Campaign::new(first, "AAPL", "R", 0)).unwrap();
        let later = index.allocate_id();
        index.add_to_indexes(Campaign::new(later, "AAPL", "R", 5)).unwrap();
        let other = index.allocate_id();
        index.add_to_indexes(Campaign::new(other, "MSFT", "R", 9)).unwrap();

        assert!(!index.is_recent(later));
        assert_eq!(index.find_campaign("AAPL", "R"), Some(later));
        assert_eq!(index.find_campaign("AAPL", "R2"), None);

        index.remove_from_indexes(later).unwrap();
        assert_eq!(index.find_campaign("AAPL", "R"), Some(first));
        index.remove_from_indexes(first).unwrap();
        assert_eq!(index.find_campaign("AAPL", "R"), None);
        assert!(index.check_consistency());
    }

    #[test]
    fn test_rebuild_restores_key_map() {
        let mut index = index_with(3);
        index.by_key.clear();
        assert!(!index.check_consistency());

        index.rebuild_indexes();
        assert!(index.check_consistency());
        assert_eq!(index.find_campaign("SYM0", "R"), Some(CampaignId(1)));
    }
}
