//! The search policy a worker runs per sub-task.
//!
//! Depth 1 is a static evaluation of the position after the candidate move.
//! Deeper searches shallow-score every opponent reply, keep only the
//! strongest few, and recurse on that subset: a beam cut that bounds the
//! branching factor regardless of position.

use super::board;
use super::evaluator::Evaluate;
use super::MATE_SCORE;

use anyhow::Result;
use shakmaty::{Chess, Position};

/// How many opponent replies survive the shallow pass at each level.
pub const BRANCH_LIMIT: usize = 5;

/// Scores one candidate move from the perspective of the side playing it.
pub async fn score_move(
    evaluator: &mut dyn Evaluate,
    pos: &Chess,
    candidate: &str,
    depth: u32,
) -> Result<i32> {
    let pov = pos.turn();
    let after = board::apply_uci(pos, candidate)?;

    if depth <= 1 {
        return evaluator.score(&after, pov).await;
    }

    let replies = board::legal_moves_uci(&after);
    if replies.is_empty() {
        // Opponent has no reply at all: mate in our favor, or a dead draw
        // if their king is not even in check.
        return Ok(if after.is_checkmate() { MATE_SCORE } else { 0 });
    }

    // Shallow pass: rank every reply from the opponent's perspective.
    let mut ranked = Vec::with_capacity(replies.len());
    for reply in &replies {
        let shallow = Box::pin(score_move(evaluator, &after, reply, 1)).await?;
        ranked.push((reply.clone(), shallow));
    }
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(BRANCH_LIMIT);

    // Deep pass: only the surviving subset is searched at full depth. The
    // opponent plays their best, so our score is its negation.
    let mut best_reply = i32::MIN;
    for (reply, _) in &ranked {
        let deep = Box::pin(score_move(evaluator, &after, reply, depth - 1)).await?;
        if deep > best_reply {
            best_reply = deep;
        }
    }

    Ok(-best_reply)
}

/// Evaluates a list of candidate moves and returns the best with its score.
///
/// A candidate the evaluator cannot score still yields a result, with a
/// sentinel so extreme it can never win the broker's reduction.
pub async fn best_move(
    evaluator: &mut dyn Evaluate,
    pos: &Chess,
    candidates: &[String],
    depth: u32,
) -> (Option<String>, i32) {
    let mut best: (Option<String>, i32) = (None, i32::MIN);

    for candidate in candidates {
        let score = match score_move(evaluator, pos, candidate, depth).await {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Failed to score {}: {}", candidate, e);
                -MATE_SCORE
            }
        };

        if score > best.1 {
            best = (Some(candidate.clone()), score);
        }
    }

    best
}
