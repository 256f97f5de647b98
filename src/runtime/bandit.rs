//! UCB1 bandit with ε-exploration over the retile action catalog.
//!
//! The catalog is fixed per view: three AoSoA tilings and one matrix-block
//! packing. Reward statistics are keyed by `(view, action key)` and updated
//! with Welford's algorithm from the same realized-gain signal that drives
//! the coefficient learner, so exploration and learning stay consistent.

use std::collections::HashMap;

use crate::metrics::MetricsHub;
use crate::runtime::layout::{plan_aosoa, plan_matrix, RetilePlan};
use crate::runtime::random::{tl_rand_index, tl_rand_unit};
use crate::runtime::scheduler::LearnState;
use crate::runtime::store::Store;
use crate::runtime::types::ViewId;

/// Probability of taking a uniformly random catalog action.
pub const EXPLORE_EPSILON: f64 = 0.05;

/// Running reward statistic for one `(view, action)` pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct BanditStat {
    /// Number of observed rewards.
    pub n: u64,
    /// Running mean reward.
    pub mean: f64,
    m2: f64,
}

impl BanditStat {
    /// Folds one reward observation in (Welford).
    pub fn update(&mut self, reward: f64) {
        self.n += 1;
        let delta = reward - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (reward - self.mean);
    }

    /// Unbiased sample variance of the observed rewards.
    pub fn variance(&self) -> f64 {
        if self.n > 1 {
            self.m2 / (self.n - 1) as f64
        } else {
            0.0
        }
    }
}

/// UCB1 decision state over per-view action catalogs.
#[derive(Default)]
pub struct Bandit {
    stats: HashMap<(ViewId, i64), BanditStat>,
    t: u64,
}

impl Bandit {
    /// Creates an empty bandit with no observations.
    pub fn new() -> Self {
        Self::default()
    }

    /// The candidate actions considered for a view each decision epoch.
    pub fn catalog(
        store: &Store,
        metrics: &MetricsHub,
        learn: &LearnState,
        v: ViewId,
    ) -> Vec<RetilePlan> {
        vec![
            plan_aosoa(store, metrics, learn, v, 64),
            plan_aosoa(store, metrics, learn, v, 128),
            plan_aosoa(store, metrics, learn, v, 256),
            plan_matrix(store, metrics, learn, v, 64),
        ]
    }

    /// Picks one catalog action for a view.
    ///
    /// Advances the global time step, takes a uniformly random action with
    /// probability ε, and otherwise maximizes `mean + sqrt(2 ln max(2, t) /
    /// n)`, treating an untried action's bonus as 1.0.
    pub fn pick<'a>(&mut self, v: ViewId, catalog: &'a [RetilePlan]) -> Option<&'a RetilePlan> {
        if catalog.is_empty() {
            return None;
        }
        self.t += 1;
        if tl_rand_unit() < EXPLORE_EPSILON {
            return Some(&catalog[tl_rand_index(catalog.len())]);
        }

        let mut best: Option<(&RetilePlan, f64)> = None;
        for plan in catalog {
            let key = (v, plan.action.bandit_key());
            let (mean, n) = self
                .stats
                .get(&key)
                .map_or((0.0, 0), |s| (s.mean, s.n));
            let bonus = if n > 0 {
                (2.0 * (self.t.max(2) as f64).ln() / n as f64).sqrt()
            } else {
                1.0
            };
            let ucb = mean + bonus;
            if best.map_or(true, |(_, b)| ucb > b) {
                best = Some((plan, ucb));
            }
        }
        best.map(|(plan, _)| plan)
    }

    /// Credits a realized net improvement (`realized_us − est_cost_us`) to
    /// an action's statistic.
    pub fn update(&mut self, v: ViewId, action_key: i64, reward: f64) {
        self.stats.entry((v, action_key)).or_default().update(reward);
    }

    /// The statistic recorded for `(view, action key)`, if any.
    pub fn stat(&self, v: ViewId, action_key: i64) -> Option<&BanditStat> {
        self.stats.get(&(v, action_key))
    }
}
