//! Builder attribution taint logic for lifecycles.

use super::{PositionSnapshot, Reconstruction};
use crate::domain::Trade;
use std::collections::HashMap;

/// The builder/integrator identity whose fills count as clean.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedAttribution(String);

impl TrackedAttribution {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// True iff the trade carries a non-empty tag equal (ignoring ASCII case) to `tracked`.
pub fn is_attributed(trade: &Trade, tracked: &TrackedAttribution) -> bool {
    match trade.attribution_tag.as_deref().map(str::trim) {
        Some(tag) if !tag.is_empty() => tag.eq_ignore_ascii_case(tracked.as_str()),
        _ => false,
    }
}

/// Taint information for a lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaintInfo {
    pub is_tainted: bool,
    pub reason: Option<String>,
}

impl TaintInfo {
    fn clean() -> Self {
        Self {
            is_tainted: false,
            reason: None,
        }
    }
}

/// Computes per-lifecycle taint from a replayed trade sequence.
pub struct TaintComputer<'a> {
    reconstruction: &'a Reconstruction,
    tracked: &'a TrackedAttribution,
}

impl<'a> TaintComputer<'a> {
    pub fn new(reconstruction: &'a Reconstruction, tracked: &'a TrackedAttribution) -> Self {
        Self {
            reconstruction,
            tracked,
        }
    }

    /// Compute taint for a specific lifecycle; the reason names the first dirty trade.
    pub fn compute_taint(&self, lifecycle_id: i64) -> TaintInfo {
        let first_dirty = self
            .reconstruction
            .pairs()
            .filter(|(_, snapshot)| snapshot.lifecycle_id == lifecycle_id)
            .map(|(trade, _)| trade)
            .find(|trade| !is_attributed(trade, self.tracked));

        match first_dirty {
            Some(trade) => self.tainted_by(trade),
            None => TaintInfo::clean(),
        }
    }

    /// Compute taint for all lifecycles in one pass over the trades.
    pub fn compute_all_taints(&self) -> HashMap<i64, TaintInfo> {
        let mut taints: HashMap<i64, TaintInfo> = HashMap::new();

        for (trade, snapshot) in self.reconstruction.pairs() {
            let dirty = !is_attributed(trade, self.tracked);
            let entry = taints
                .entry(snapshot.lifecycle_id)
                .or_insert_with(TaintInfo::clean);
            if dirty && !entry.is_tainted {
                *entry = self.tainted_by(trade);
            }
        }

        taints
    }

    fn tainted_by(&self, trade: &Trade) -> TaintInfo {
        let reason = match trade.attribution_tag.as_deref().map(str::trim) {
            Some(tag) if !tag.is_empty() => format!(
                "Trade {} attributed to {} instead of {}",
                trade.trade_key(),
                tag,
                self.tracked.as_str()
            ),
            _ => format!("Trade {} has no attribution tag", trade.trade_key()),
        };

        TaintInfo {
            is_tainted: true,
            reason: Some(reason),
        }
    }
}

/// Filters data for builder-only queries.
pub struct BuilderOnlyFilter<'a> {
    taint_infos: &'a HashMap<i64, TaintInfo>,
}

impl<'a> BuilderOnlyFilter<'a> {
    pub fn new(taint_infos: &'a HashMap<i64, TaintInfo>) -> Self {
        Self { taint_infos }
    }

    /// Check if a lifecycle should be included in builder-only output.
    pub fn include_lifecycle(&self, lifecycle_id: i64) -> bool {
        self.taint_infos
            .get(&lifecycle_id)
            .map(|t| !t.is_tainted)
            .unwrap_or(false) // Exclude if no taint info.
    }

    /// Filter snapshots for builder-only output.
    pub fn filter_snapshots(&self, snapshots: &[PositionSnapshot]) -> Vec<PositionSnapshot> {
        snapshots
            .iter()
            .filter(|s| self.include_lifecycle(s.lifecycle_id))
            .cloned()
            .collect()
    }

    /// Keep only trades whose lifecycle is clean.
    pub fn filter_trades(&self, reconstruction: &Reconstruction) -> Vec<Trade> {
        reconstruction
            .pairs()
            .filter(|(_, s)| self.include_lifecycle(s.lifecycle_id))
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Check if any data was excluded (for tainted flag in response).
    pub fn had_exclusions(&self, lifecycle_ids: &[i64]) -> bool {
        lifecycle_ids
            .iter()
            .any(|id| !self.include_lifecycle(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coin, Decimal, Side, TimeMs};
    use crate::engine::replay;

    const BUILDER: &str = "0xBuilder";

    fn trade(side: Side, time_ms: i64, tag: Option<&str>) -> Trade {
        let trade = Trade::new(
            TimeMs::new(time_ms),
            Coin::from("ETH"),
            side,
            Decimal::one(),
            Decimal::from(2000),
        );
        match tag {
            Some(tag) => trade.with_attribution(tag),
            None => trade,
        }
    }

    #[test]
    fn test_attribution_is_case_insensitive() {
        let tracked = TrackedAttribution::new(BUILDER);
        assert!(is_attributed(&trade(Side::Long, 1, Some("0xbuilder")), &tracked));
        assert!(is_attributed(&trade(Side::Long, 1, Some(" 0XBUILDER ")), &tracked));
        assert!(!is_attributed(&trade(Side::Long, 1, Some("0xother")), &tracked));
    }

    #[test]
    fn test_missing_or_empty_tag_is_dirty() {
        let tracked = TrackedAttribution::new(BUILDER);
        assert!(!is_attributed(&trade(Side::Long, 1, None), &tracked));
        assert!(!is_attributed(&trade(Side::Long, 1, Some("  ")), &tracked));

        let empty = TrackedAttribution::new("");
        assert!(!is_attributed(&trade(Side::Long, 1, Some("")), &empty));
    }

    #[test]
    fn test_lifecycle_with_one_foreign_fill_is_tainted() {
        let tracked = TrackedAttribution::new(BUILDER);
        let reconstruction = replay(
            &[
                trade(Side::Long, 1000, Some(BUILDER)),
                trade(Side::Long, 2000, Some("0xother")),
                trade(Side::Short, 3000, Some(BUILDER)),
                trade(Side::Short, 4000, Some(BUILDER)),
            ],
            &tracked,
        )
        .unwrap();

        let taint = TaintComputer::new(&reconstruction, &tracked).compute_taint(1);
        assert!(taint.is_tainted);
        assert!(taint.reason.unwrap().contains("0xother"));
    }

    #[test]
    fn test_missing_tag_reason_mentions_it() {
        let tracked = TrackedAttribution::new(BUILDER);
        let reconstruction = replay(&[trade(Side::Long, 1000, None)], &tracked).unwrap();
        let taint = TaintComputer::new(&reconstruction, &tracked).compute_taint(1);
        assert!(taint.reason.unwrap().contains("no attribution"));
    }

    #[test]
    fn test_taint_resets_on_new_lifecycle() {
        let tracked = TrackedAttribution::new(BUILDER);
        let reconstruction = replay(
            &[
                trade(Side::Long, 1000, None),
                trade(Side::Short, 2000, Some(BUILDER)),
                trade(Side::Short, 3000, Some(BUILDER)),
            ],
            &tracked,
        )
        .unwrap();

        let taints = TaintComputer::new(&reconstruction, &tracked).compute_all_taints();
        assert_eq!(taints.len(), 2);
        assert!(taints[&1].is_tainted);
        assert!(!taints[&2].is_tainted);
    }

    #[test]
    fn test_all_taints_agree_with_single_lifecycle_taint() {
        let tracked = TrackedAttribution::new(BUILDER);
        let reconstruction = replay(
            &[
                trade(Side::Long, 1000, Some(BUILDER)),
                trade(Side::Short, 2000, Some(BUILDER)),
                trade(Side::Long, 3000, Some(BUILDER)),
                trade(Side::Long, 4000, Some("0xother")),
                trade(Side::Long, 5000, None),
                trade(Side::Short, 6000, Some(BUILDER)),
                trade(Side::Short, 7000, Some(BUILDER)),
                trade(Side::Short, 8000, Some(BUILDER)),
                trade(Side::Short, 9000, None),
            ],
            &tracked,
        )
        .unwrap();
        let computer = TaintComputer::new(&reconstruction, &tracked);

        let taints = computer.compute_all_taints();
        assert_eq!(taints.len(), reconstruction.lifecycles().len());
        for lifecycle in reconstruction.lifecycles() {
            assert_eq!(taints[&lifecycle.id], computer.compute_taint(lifecycle.id));
        }
        assert!(taints[&2].reason.as_deref().unwrap().contains("0xother"));
    }

    #[test]
    fn test_filter_excludes_tainted_lifecycles() {
        let tracked = TrackedAttribution::new(BUILDER);
        let reconstruction = replay(
            &[
                trade(Side::Long, 1000, Some(BUILDER)),
                trade(Side::Short, 2000, Some(BUILDER)),
                trade(Side::Long, 3000, Some("0xother")),
            ],
            &tracked,
        )
        .unwrap();
        let taints = TaintComputer::new(&reconstruction, &tracked).compute_all_taints();
        let filter = BuilderOnlyFilter::new(&taints);

        let snapshots = filter.filter_snapshots(&reconstruction.snapshots);
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.lifecycle_id == 1));

        let trades = filter.filter_trades(&reconstruction);
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].time_ms, TimeMs::new(2000));
    }

    #[test]
    fn test_had_exclusions_returns_true_when_data_excluded() {
        let taints = HashMap::from([
            (
                1,
                TaintInfo {
                    is_tainted: false,
                    reason: None,
                },
            ),
            (
                2,
                TaintInfo {
                    is_tainted: true,
                    reason: Some("x".into()),
                },
            ),
        ]);

        let filter = BuilderOnlyFilter::new(&taints);

        assert!(filter.had_exclusions(&[1, 2]));
        assert!(!filter.had_exclusions(&[1]));
        assert!(filter.had_exclusions(&[3]));
    }
}
