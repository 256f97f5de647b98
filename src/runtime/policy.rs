//! User policies and the trigger predicate evaluator.
//!
//! A policy maps predicates over windowed aggregates to candidate retile
//! actions. Predicates are a single atom `<field> <op> <number>` or two atoms
//! joined by `&&` / `||`. Parsing is whitespace-tolerant and failure-inert: a
//! predicate that does not parse evaluates to `false`, leaving its trigger
//! dormant for the frame.

use crate::metrics::FrameAgg;

/// Action tag a trigger may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerAction {
    /// Re-tile the view as AoSoA; the trigger's `arg` is the tile width.
    RetileAosoa,
    /// Return the view to SoA; `arg` is ignored.
    RetileSoa,
    /// Plan a matrix-block packing; `arg` is the block row count.
    PackMatrix,
}

/// One policy rule: a predicate, an action, and a ranking priority.
#[derive(Clone, Debug)]
pub struct PolicyTrigger {
    /// Predicate over the view's aggregate, e.g.
    /// `"branch_div > 0.2 && warp_eff < 0.8"`.
    pub when: String,
    /// Action to plan when the predicate holds.
    pub action: TriggerAction,
    /// Tile width or block row count, depending on the action.
    pub arg: u32,
    /// Multiplier on the candidate's gain/cost score.
    pub priority: f64,
}

/// User-declared retile rules plus pacing knobs.
#[derive(Clone, Debug)]
pub struct Policy {
    /// Rules evaluated per view on every frame boundary.
    pub triggers: Vec<PolicyTrigger>,
    /// Minimum frames between two applied actions on one view; 0 disables
    /// the guard.
    pub min_frames_between_retiles: u32,
    /// Frames a view stays ineligible after an applied action.
    pub cooloff_frames: u32,
    /// Let the bandit propose a catalog action for views no trigger matched.
    pub explore: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            triggers: Vec::new(),
            min_frames_between_retiles: 0,
            cooloff_frames: 10,
            explore: false,
        }
    }
}

fn field_value(name: &str, agg: &FrameAgg) -> f64 {
    match name {
        "mean_us" => agg.mean_us,
        "p95_us" => agg.p95_us,
        "p99_us" => agg.p99_us,
        "warp_eff" => agg.warp_eff,
        "branch_div" => agg.branch_div,
        "mem_coalesce" => agg.mem_coalesce,
        "l2_miss" => agg.l2_miss,
        "tail_ratio" => agg.tail_ratio,
        _ => 0.0,
    }
}

// Operators are tried in this order so the two-character forms win over
// their one-character prefixes.
const OPS: [&str; 5] = [">=", "<=", "==", ">", "<"];

fn eval_atom(expr: &str, agg: &FrameAgg) -> bool {
    let expr = expr.trim();
    let Some((op, pos)) = OPS.iter().find_map(|op| expr.find(op).map(|pos| (*op, pos))) else {
        return false;
    };

    let lhs = expr[..pos].trim();
    let rhs = expr[pos + op.len()..].trim();
    let Ok(rhs) = rhs.parse::<f64>() else {
        return false;
    };
    let lhs = field_value(lhs, agg);

    match op {
        ">" => lhs > rhs,
        "<" => lhs < rhs,
        ">=" => lhs >= rhs,
        "<=" => lhs <= rhs,
        "==" => (lhs - rhs).abs() < 1e-9,
        _ => false,
    }
}

/// Evaluates a trigger predicate against an aggregate.
///
/// A `&&` split is tried before `||`; a predicate mixing both is evaluated
/// as whichever operator is found first. Unknown fields read as 0 and parse
/// failures yield `false`.
pub fn eval_predicate(when: &str, agg: &FrameAgg) -> bool {
    if let Some(pos) = when.find("&&") {
        return eval_atom(&when[..pos], agg) && eval_atom(&when[pos + 2..], agg);
    }
    if let Some(pos) = when.find("||") {
        return eval_atom(&when[..pos], agg) || eval_atom(&when[pos + 2..], agg);
    }
    eval_atom(when, agg)
}
