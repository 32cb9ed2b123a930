//! Terminal-position scoring.
//!
//! The external engine is modeled as an owned resource behind the
//! [`Evaluate`] trait: each worker process constructs exactly one evaluator
//! and uses it only inside its single-threaded loop, so no sharing is
//! needed anywhere.

use anyhow::Result;
use async_trait::async_trait;
use shakmaty::{ByRole, Chess, Color, Position};

/// Scores a position in centipawns from the given side's perspective.
///
/// Higher is better for `pov`. Implementations report errors instead of
/// guessing; the caller substitutes a sentinel so a sub-task always yields
/// a result.
#[async_trait]
pub trait Evaluate: Send {
    async fn score(&mut self, pos: &Chess, pov: Color) -> Result<i32>;
}

const PAWN: i32 = 100;
const KNIGHT: i32 = 300;
const BISHOP: i32 = 300;
const ROOK: i32 = 500;
const QUEEN: i32 = 900;

fn side_material(counts: &ByRole<u8>) -> i32 {
    counts.pawn as i32 * PAWN
        + counts.knight as i32 * KNIGHT
        + counts.bishop as i32 * BISHOP
        + counts.rook as i32 * ROOK
        + counts.queen as i32 * QUEEN
}

/// Plain material counter.
///
/// Weak on purpose: it exists so the cluster runs (and the tests score
/// deterministically) without an external engine installed.
#[derive(Debug, Default)]
pub struct MaterialEvaluator;

#[async_trait]
impl Evaluate for MaterialEvaluator {
    async fn score(&mut self, pos: &Chess, pov: Color) -> Result<i32> {
        let material = pos.board().material();
        let white = side_material(&material.white);
        let black = side_material(&material.black);

        Ok(match pov {
            Color::White => white - black,
            Color::Black => black - white,
        })
    }
}
