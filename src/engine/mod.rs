//! Evaluation Engine Module
//!
//! Everything a worker needs to turn one sub-task (board + candidate move +
//! depth) into a score. Board representation and legal-move generation come
//! from `shakmaty`; terminal-position scoring is behind the [`Evaluate`]
//! trait so the external UCI engine can be swapped for the built-in material
//! counter in tests or engine-less deployments.
//!
//! ## Submodules
//! - **`board`**: Thin FEN/UCI helpers over `shakmaty` positions.
//! - **`evaluator`**: The `Evaluate` trait and the material-count fallback.
//! - **`uci`**: Evaluator backed by an external UCI engine subprocess.
//! - **`search`**: The depth-limited beam search a worker runs per task.

pub mod board;
pub mod evaluator;
pub mod uci;
pub mod search;


/// Sentinel magnitude for mate and for evaluator failure.
///
/// Mate for the moving side scores `+MATE_SCORE`; an unscorable position
/// reports `-MATE_SCORE` so it can never win the broker's reduction.
pub const MATE_SCORE: i32 = 100_000;
