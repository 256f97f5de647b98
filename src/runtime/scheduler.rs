//! Frame-boundary adaptive scheduler.
//!
//! Runs once per frame end: evaluates the policy's triggers against each
//! view's recent aggregate, ranks candidate retile plans by
//! `priority * gain / max(1, cost)`, greedily applies them within the
//! per-frame budget, and (two or more frames after an action) folds the
//! realized latency change back into the gain model's coefficients and the
//! bandit's reward statistics.
//!
//! ## Ordering guarantees
//! - A retile applied while ending frame F is visible to kernels from frame
//!   F+1 onward.
//! - No coefficient update derived from an action applied in frame F occurs
//!   before the end of frame F+2.
//! - An applied action puts its view on cooldown for `cooloff_frames`; no
//!   further action lands on that view in frames `(F, F+C]`.
//!
//! ## Environment
//! - `DYNSOA_LEARN_PATH` — override the coefficient persistence path.
//! - `DYNSOA_VERBOSE` — nonzero enables trace lines on standard error.
//! - `DYNSOA_LEARN_LOG` — path of a CSV appended per apply/learn event.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::metrics::MetricsHub;
use crate::runtime::bandit::Bandit;
use crate::runtime::layout::{self, plan_aosoa, plan_matrix, RetilePlan};
use crate::runtime::policy::{eval_predicate, Policy, TriggerAction};
use crate::runtime::store::Store;
use crate::runtime::types::ViewId;

/// Aggregate window (in samples) the decision and learning passes read.
const AGG_WINDOW: usize = 3;

/// Minimum candidate score; anything at or below is dropped.
const SCORE_FLOOR: f64 = 0.05;

/// Frames between an applied action and its learning update.
const LEARN_DELAY_FRAMES: u64 = 2;

/// Learning rate of the coefficient update.
const LEARN_RATE: f64 = 0.10;

/// Inclusive upper clamp for every learned coefficient.
const COEFF_MAX: f64 = 0.25;

const LEARN_LOG_HEADER: &str = "frame,view,phase,action,to,tile,cost_us,gain_est_us,score,\
                                base_us,post_us,realized_us,a_div,a_mem,a_tail,a_div_new,a_mem_new,a_tail_new";

/// The gain model's learned coefficients, persisted between runs.
///
/// Weights for the divergence, memory-coalescing, and tail-pressure terms.
/// Each stays within `[0, 0.25]` across arbitrary update sequences.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LearnState {
    /// Weight of the branch-divergence term.
    pub a_div: f64,
    /// Weight of the memory-coalescing term.
    pub a_mem: f64,
    /// Weight of the tail-ratio term.
    pub a_tail: f64,
}

impl Default for LearnState {
    fn default() -> Self {
        Self { a_div: 0.06, a_mem: 0.04, a_tail: 0.02 }
    }
}

struct PendingAction {
    frame: u64,
    baseline: Option<f64>,
    plan: RetilePlan,
}

struct Candidate {
    view: ViewId,
    plan: RetilePlan,
    score: f64,
}

/// Frame-boundary decision and learning state.
///
/// Owned by the runtime and touched only from the frame thread; nothing in
/// here is locked.
pub struct SchedulerState {
    policy: Policy,
    cooldown: HashMap<ViewId, u32>,
    pending: HashMap<ViewId, PendingAction>,
    last_action_frame: HashMap<ViewId, u64>,
    frame_index: u64,
    learn: LearnState,
    persist_path: PathBuf,
    budget_us: f64,
    bandit: Bandit,
    verbose: bool,
    learn_log: Option<BufWriter<File>>,
}

impl SchedulerState {
    /// Creates a scheduler with the given per-frame retile budget (µs) and
    /// default coefficients. Reads `DYNSOA_VERBOSE` and `DYNSOA_LEARN_LOG`.
    pub fn new(budget_us: f64) -> Self {
        let verbose = std::env::var("DYNSOA_VERBOSE")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .is_some_and(|v| v != 0);

        let learn_log = std::env::var("DYNSOA_LEARN_LOG")
            .ok()
            .filter(|p| !p.is_empty())
            .and_then(|p| File::create(p).ok())
            .map(BufWriter::new)
            .and_then(|mut w| writeln!(w, "{LEARN_LOG_HEADER}").is_ok().then_some(w));

        Self {
            policy: Policy::default(),
            cooldown: HashMap::new(),
            pending: HashMap::new(),
            last_action_frame: HashMap::new(),
            frame_index: 0,
            learn: LearnState::default(),
            persist_path: PathBuf::from("dynsoa_learn.json"),
            budget_us,
            bandit: Bandit::new(),
            verbose,
            learn_log,
        }
    }

    /// Installs a policy; `None` clears to the empty default.
    pub fn set_policy(&mut self, policy: Option<Policy>) {
        self.policy = policy.unwrap_or_default();
    }

    /// Overrides the coefficient persistence path.
    pub fn set_persist_path(&mut self, path: impl AsRef<Path>) {
        self.persist_path = path.as_ref().to_path_buf();
    }

    /// Current learned coefficients.
    #[inline]
    pub fn learn(&self) -> LearnState {
        self.learn
    }

    /// Replaces the learned coefficients (testing and tooling).
    pub fn set_learn(&mut self, learn: LearnState) {
        self.learn = learn;
    }

    /// Current frame index.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The bandit's reward statistics.
    #[inline]
    pub fn bandit(&self) -> &Bandit {
        &self.bandit
    }

    /// Advances the frame counter. Called on `begin_frame`.
    pub fn on_begin_frame(&mut self) {
        self.frame_index += 1;
    }

    /// Runs the decision pass, budgeted application, and delayed learning.
    /// Called on `end_frame`.
    pub fn on_end_frame(&mut self, store: &mut Store, metrics: &MetricsHub) {
        let candidates = self.collect_candidates(store, metrics);
        self.apply_within_budget(candidates, store, metrics);
        self.run_delayed_learning(metrics);
    }

    fn collect_candidates(&mut self, store: &Store, metrics: &MetricsHub) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        let views: Vec<ViewId> = store.view_ids().collect();
        for v in views {
            let agg = metrics.aggregate(v, AGG_WINDOW);
            if agg.mean_us == 0.0 && agg.p95_us == 0.0 {
                continue;
            }
            if let Some(cd) = self.cooldown.get_mut(&v) {
                if *cd > 0 {
                    *cd -= 1;
                    continue;
                }
            }

            let mut matched = false;
            for trigger in &self.policy.triggers {
                if !eval_predicate(&trigger.when, &agg) {
                    continue;
                }
                matched = true;
                let plan = match trigger.action {
                    TriggerAction::RetileAosoa => {
                        plan_aosoa(store, metrics, &self.learn, v, trigger.arg)
                    }
                    TriggerAction::RetileSoa => RetilePlan::to_soa(),
                    TriggerAction::PackMatrix => {
                        plan_matrix(store, metrics, &self.learn, v, trigger.arg)
                    }
                };
                let score = trigger.priority * (plan.est_gain_us / plan.est_cost_us.max(1.0));
                if score > SCORE_FLOOR {
                    candidates.push(Candidate { view: v, plan, score });
                }
            }

            // Views no trigger claimed are fair game for catalog exploration.
            if !matched && self.policy.explore {
                let catalog = Bandit::catalog(store, metrics, &self.learn, v);
                if let Some(plan) = self.bandit.pick(v, &catalog).copied() {
                    let score = plan.est_gain_us / plan.est_cost_us.max(1.0);
                    if score > SCORE_FLOOR {
                        candidates.push(Candidate { view: v, plan, score });
                    }
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.view.cmp(&b.view))
        });
        candidates
    }

    fn apply_within_budget(
        &mut self,
        candidates: Vec<Candidate>,
        store: &mut Store,
        metrics: &MetricsHub,
    ) {
        let mut used = 0.0;
        for cand in candidates {
            if used + cand.plan.est_cost_us > self.budget_us {
                continue;
            }
            let min_gap = self.policy.min_frames_between_retiles as u64;
            if min_gap > 0 {
                if let Some(&last) = self.last_action_frame.get(&cand.view) {
                    if self.frame_index - last < min_gap {
                        continue;
                    }
                }
            }

            let before = metrics.aggregate(cand.view, AGG_WINDOW);
            let baseline = if before.p95_us > 0.0 {
                before.p95_us
            } else if before.mean_us > 0.0 {
                before.mean_us
            } else {
                0.0
            };

            if !layout::retile(store, cand.view, &cand.plan) {
                continue;
            }

            used += cand.plan.est_cost_us;
            self.cooldown.insert(cand.view, self.policy.cooloff_frames);
            self.last_action_frame.insert(cand.view, self.frame_index);
            self.pending.insert(
                cand.view,
                PendingAction {
                    frame: self.frame_index,
                    baseline: (baseline > 0.0).then_some(baseline),
                    plan: cand.plan,
                },
            );

            tracing::debug!(
                target: "dynsoa::scheduler",
                frame = self.frame_index,
                view = cand.view,
                action = cand.plan.action.name(),
                cost_us = cand.plan.est_cost_us,
                gain_us = cand.plan.est_gain_us,
                score = cand.score,
                "retile applied"
            );
            let row = format!(
                "{},{},apply,{},{},{},{:.3},{:.3},{:.3},{:.3},NA,NA,{:.5},{:.5},{:.5},NA,NA,NA",
                self.frame_index,
                cand.view,
                cand.plan.action.name(),
                cand.plan.action.target_tag(),
                cand.plan.action.arg(),
                cand.plan.est_cost_us,
                cand.plan.est_gain_us,
                cand.score,
                baseline,
                self.learn.a_div,
                self.learn.a_mem,
                self.learn.a_tail,
            );
            self.log_event(&row, "applied action");
        }
    }

    fn run_delayed_learning(&mut self, metrics: &MetricsHub) {
        let due: Vec<ViewId> = self
            .pending
            .iter()
            .filter(|(_, p)| self.frame_index.saturating_sub(p.frame) >= LEARN_DELAY_FRAMES)
            .map(|(v, _)| *v)
            .collect();

        for v in due {
            let Some(pending) = self.pending.remove(&v) else {
                continue;
            };
            let Some(base) = pending.baseline else {
                continue;
            };

            let after = metrics.aggregate(v, AGG_WINDOW);
            let obs = if after.p95_us > 0.0 {
                after.p95_us
            } else if after.mean_us > 0.0 {
                after.mean_us
            } else {
                base
            };
            if obs <= 0.0 || base <= 0.0 {
                continue;
            }

            let realized = (base - obs).max(0.0);

            let div_term = (after.branch_div - 0.15).max(0.0);
            let mem_term = (0.75 - after.mem_coalesce).max(0.0);
            let tail_term = (after.tail_ratio - 1.10).max(0.0);
            let denom = 1e-6 + div_term * div_term + mem_term * mem_term + tail_term * tail_term;

            let prior = self.learn;
            let pred = base
                * (prior.a_div * div_term + prior.a_mem * mem_term + prior.a_tail * tail_term);
            let err = realized - pred;

            let step =
                |c: f64, z: f64| (c + LEARN_RATE * (err / base) * (z / denom)).clamp(0.0, COEFF_MAX);
            self.learn.a_div = step(prior.a_div, div_term);
            self.learn.a_mem = step(prior.a_mem, mem_term);
            self.learn.a_tail = step(prior.a_tail, tail_term);

            self.bandit.update(
                v,
                pending.plan.action.bandit_key(),
                realized - pending.plan.est_cost_us,
            );

            tracing::debug!(
                target: "dynsoa::scheduler",
                frame = self.frame_index,
                view = v,
                base_us = base,
                post_us = obs,
                realized_us = realized,
                a_div = self.learn.a_div,
                a_mem = self.learn.a_mem,
                a_tail = self.learn.a_tail,
                "coefficients updated"
            );
            let row = format!(
                "{},{},learn,NA,NA,NA,NA,NA,NA,{:.3},{:.3},{:.3},{:.5},{:.5},{:.5},{:.5},{:.5},{:.5}",
                self.frame_index,
                v,
                base,
                obs,
                realized,
                prior.a_div,
                prior.a_mem,
                prior.a_tail,
                self.learn.a_div,
                self.learn.a_mem,
                self.learn.a_tail,
            );
            self.log_event(&row, "learned");
        }
    }

    fn log_event(&mut self, row: &str, what: &str) {
        if let Some(writer) = self.learn_log.as_mut() {
            let _ = writeln!(writer, "{row}");
            let _ = writer.flush();
        }
        if self.verbose {
            eprintln!("scheduler: {what}: {row}");
        }
    }

    /// Loads persisted coefficients. `DYNSOA_LEARN_PATH` overrides the
    /// configured path. A missing file, a missing key, or a malformed number
    /// silently keeps the default for that key.
    pub fn load_state(&mut self) {
        if let Ok(path) = std::env::var("DYNSOA_LEARN_PATH") {
            if !path.is_empty() {
                self.persist_path = PathBuf::from(path);
            }
        }
        let Ok(text) = std::fs::read_to_string(&self.persist_path) else {
            return;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            return;
        };
        if let Some(x) = value.get("a_div").and_then(serde_json::Value::as_f64) {
            self.learn.a_div = x;
        }
        if let Some(x) = value.get("a_mem").and_then(serde_json::Value::as_f64) {
            self.learn.a_mem = x;
        }
        if let Some(x) = value.get("a_tail").and_then(serde_json::Value::as_f64) {
            self.learn.a_tail = x;
        }
    }

    /// Persists the coefficients as a three-key JSON object. I/O failure is
    /// silent; the in-memory state is unaffected either way.
    pub fn save_state(&self) {
        if let Ok(text) = serde_json::to_string_pretty(&self.learn) {
            let _ = std::fs::write(&self.persist_path, text);
        }
    }
}
