//! FEN and UCI-notation helpers over `shakmaty`.
//!
//! Positions are immutable values everywhere in this crate: applying a move
//! produces a new position instead of mutating shared board state, so every
//! recursion path in the search leaves its caller's board untouched.

use anyhow::{anyhow, Result};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position};

/// Parses a FEN string into a position.
pub fn parse_fen(fen: &str) -> Result<Chess> {
    let setup: Fen = fen
        .parse()
        .map_err(|e| anyhow!("Bad FEN {:?}: {}", fen, e))?;

    setup
        .into_position(CastlingMode::Standard)
        .map_err(|e| anyhow!("Illegal position {:?}: {}", fen, e))
}

/// Serializes a position back to FEN.
pub fn to_fen(pos: &Chess) -> String {
    Fen(pos.clone().into_setup(EnPassantMode::Legal)).to_string()
}

/// All legal moves of a position in UCI notation.
pub fn legal_moves_uci(pos: &Chess) -> Vec<String> {
    pos.legal_moves()
        .iter()
        .map(|m| m.to_uci(CastlingMode::Standard).to_string())
        .collect()
}

/// Resolves a UCI move string against a position.
pub fn parse_uci(pos: &Chess, uci: &str) -> Result<Move> {
    let parsed: UciMove = uci
        .parse()
        .map_err(|e| anyhow!("Bad move {:?}: {}", uci, e))?;

    parsed
        .to_move(pos)
        .map_err(|e| anyhow!("Move {:?} is illegal here: {}", uci, e))
}

/// Applies a move, yielding the successor position.
pub fn apply(pos: &Chess, m: &Move) -> Result<Chess> {
    pos.clone()
        .play(m)
        .map_err(|e| anyhow!("Refused to play move: {}", e))
}

/// Parses and applies a UCI move in one step.
pub fn apply_uci(pos: &Chess, uci: &str) -> Result<Chess> {
    let m = parse_uci(pos, uci)?;
    apply(pos, &m)
}
