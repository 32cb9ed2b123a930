//! Evaluator backed by an external UCI engine subprocess.

use super::board;
use super::evaluator::Evaluate;
use super::MATE_SCORE;

use anyhow::Result;
use async_trait::async_trait;
use shakmaty::{Chess, Color, Position};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SCORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns one engine subprocess and drives it over the UCI text protocol.
pub struct UciEvaluator {
    // Held so the process is reaped when the evaluator drops.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl UciEvaluator {
    /// Spawns the engine binary and completes the UCI handshake.
    pub async fn spawn(engine_path: &str) -> Result<Self> {
        let mut child = Command::new(engine_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to start engine {:?}: {}", engine_path, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Engine has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Engine has no stdout"))?;

        let mut evaluator = Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        tokio::time::timeout(STARTUP_TIMEOUT, evaluator.handshake())
            .await
            .map_err(|_| anyhow::anyhow!("Engine handshake timed out"))??;

        tracing::info!("UCI engine {} ready", engine_path);
        Ok(evaluator)
    }

    async fn handshake(&mut self) -> Result<()> {
        self.send("uci").await?;
        self.read_until("uciok").await?;
        self.send("isready").await?;
        self.read_until("readyok").await?;
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Reads lines until one starts with the given token.
    async fn read_until(&mut self, token: &str) -> Result<String> {
        loop {
            match self.stdout.next_line().await? {
                Some(line) => {
                    if line.starts_with(token) {
                        return Ok(line);
                    }
                }
                None => return Err(anyhow::anyhow!("Engine closed its stdout")),
            }
        }
    }

    /// Runs a depth-1 search and reports the score of the resulting line.
    ///
    /// UCI scores are from the side to move; the caller's perspective
    /// conversion happens in `score`.
    async fn analyse(&mut self, fen: &str) -> Result<i32> {
        self.send(&format!("position fen {}", fen)).await?;
        self.send("go depth 1").await?;

        let mut last_score: Option<i32> = None;

        loop {
            match self.stdout.next_line().await? {
                Some(line) => {
                    if line.starts_with("bestmove") {
                        return last_score
                            .ok_or_else(|| anyhow::anyhow!("Engine reported no score"));
                    }
                    if line.starts_with("info") {
                        if let Some(score) = parse_info_score(&line) {
                            last_score = Some(score);
                        }
                    }
                }
                None => return Err(anyhow::anyhow!("Engine closed its stdout")),
            }
        }
    }
}

/// Extracts `score cp N` / `score mate N` from a UCI info line.
pub(crate) fn parse_info_score(line: &str) -> Option<i32> {
    let mut tokens = line.split_whitespace();

    while let Some(token) = tokens.next() {
        if token != "score" {
            continue;
        }
        return match (tokens.next(), tokens.next()) {
            (Some("cp"), Some(value)) => value.parse::<i32>().ok(),
            (Some("mate"), Some(value)) => {
                let moves: i32 = value.parse().ok()?;
                Some(if moves >= 0 { MATE_SCORE } else { -MATE_SCORE })
            }
            _ => None,
        };
    }

    None
}

#[async_trait]
impl Evaluate for UciEvaluator {
    async fn score(&mut self, pos: &Chess, pov: Color) -> Result<i32> {
        let fen = board::to_fen(pos);

        let side_to_move_score = tokio::time::timeout(SCORE_TIMEOUT, self.analyse(&fen))
            .await
            .map_err(|_| anyhow::anyhow!("Engine timed out scoring {:?}", fen))??;

        Ok(if pos.turn() == pov {
            side_to_move_score
        } else {
            -side_to_move_score
        })
    }
}
