//! Broker Module Tests
//!
//! Drives the broker state machine directly (no sockets): fan-out and
//! reduction counts, exactly-once replies, worker death and resurrection,
//! client expiry, request supersession, and the dispatch scenarios from the
//! protocol's contract.

#[cfg(test)]
mod tests {
    use crate::broker::broker::{Broker, Outbound};
    use crate::broker::protocol::{
        ClientMessage, Heartbeat, MoveReply, MoveRequest, ReadyStatus, TaskAssignment,
        WorkerMessage,
    };
    use crate::engine::MATE_SCORE;
    use crate::transport::types::PeerId;

    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(15);

    // White king on a1 vs black king on d3: exactly a1a2, a1b1, a1b2.
    const THREE_MOVE_FEN: &str = "8/8/8/8/8/3k4/8/K7 w - - 0 1";
    // White king on a1, black queen a2, black king a8: only Kxa2.
    const ONE_MOVE_FEN: &str = "k7/8/8/8/8/8/q7/K7 w - - 0 1";
    // Black to move, stalemated.
    const STALEMATE_FEN: &str = "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1";

    fn ready() -> WorkerMessage {
        WorkerMessage::WorkerRequest {
            status: ReadyStatus::Ready,
        }
    }

    fn request(board: &str, depth: u32) -> ClientMessage {
        ClientMessage::Request(MoveRequest {
            board: board.to_string(),
            depth,
        })
    }

    fn result_for(assignment: &TaskAssignment, score: i32) -> WorkerMessage {
        WorkerMessage::WorkerResult {
            best_move: Some(assignment.list_of_moves[0].clone()),
            score,
            board: assignment.board.clone(),
            depth: assignment.depth,
        }
    }

    /// Splits a drained outbox into (assignments, replies).
    fn split(
        outbox: Vec<Outbound>,
    ) -> (
        Vec<(PeerId, TaskAssignment)>,
        Vec<(PeerId, Option<String>, i32)>,
    ) {
        let mut assignments = Vec::new();
        let mut replies = Vec::new();
        for item in outbox {
            match item {
                Outbound::ToWorker(id, a) => assignments.push((id, a)),
                Outbound::ToClient(id, r) => replies.push((id, r.best_move, r.score)),
            }
        }
        (assignments, replies)
    }

    #[test]
    fn test_request_fans_out_one_task_per_legal_move() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let now = Instant::now();

        broker.handle_client_message(&client, request(THREE_MOVE_FEN, 1), now);

        assert_eq!(broker.queued_tasks(), 3);
        let (assignments, replies) = split(broker.drain_outbox());
        assert!(assignments.is_empty());
        assert!(replies.is_empty());
    }

    #[test]
    fn test_single_worker_completes_request_with_one_reply() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let worker = PeerId::new();
        let now = Instant::now();

        broker.handle_worker_message(&worker, ready(), now);
        broker.handle_client_message(&client, request(THREE_MOVE_FEN, 1), now);

        let scores = [("a1a2", 10), ("a1b1", 30), ("a1b2", 20)];
        let mut replies_seen = Vec::new();

        // One worker serves all three tasks sequentially.
        for _ in 0..4 {
            broker.dispatch();
            let (assignments, replies) = split(broker.drain_outbox());
            replies_seen.extend(replies);

            for (id, assignment) in assignments {
                assert_eq!(id, worker);
                let score = scores
                    .iter()
                    .find(|(m, _)| *m == assignment.list_of_moves[0])
                    .map(|(_, s)| *s)
                    .expect("unexpected candidate");
                broker.handle_worker_message(&id, result_for(&assignment, score), now);
            }
        }

        assert_eq!(replies_seen.len(), 1, "exactly one aggregated reply");
        let (reply_client, best_move, best_score) = &replies_seen[0];
        assert_eq!(reply_client, &client);
        assert_eq!(best_move.as_deref(), Some("a1b1"));
        assert_eq!(*best_score, 30);
        assert_eq!(broker.queued_tasks(), 0);
    }

    #[test]
    fn test_three_moves_two_workers_scenario() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let worker_a = PeerId::new();
        let worker_b = PeerId::new();
        let now = Instant::now();

        broker.handle_worker_message(&worker_a, ready(), now);
        broker.handle_worker_message(&worker_b, ready(), now);
        broker.handle_client_message(&client, request(THREE_MOVE_FEN, 1), now);

        // Two tasks dispatch immediately, one stays queued.
        broker.dispatch();
        let (first_wave, _) = split(broker.drain_outbox());
        assert_eq!(first_wave.len(), 2);
        assert_eq!(broker.queued_tasks(), 1);

        // First result frees a worker; the queued task dispatches.
        let (id, assignment) = &first_wave[0];
        broker.handle_worker_message(id, result_for(assignment, 5), now);
        broker.dispatch();
        let (second_wave, replies) = split(broker.drain_outbox());
        assert_eq!(second_wave.len(), 1);
        assert!(replies.is_empty());
        assert_eq!(broker.queued_tasks(), 0);

        // Remaining results complete the request.
        let (id, assignment) = &first_wave[1];
        broker.handle_worker_message(id, result_for(assignment, 7), now);
        let (id, assignment) = &second_wave[0];
        broker.handle_worker_message(id, result_for(assignment, 6), now);

        broker.dispatch();
        let (_, replies) = split(broker.drain_outbox());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].2, 7);
    }

    #[test]
    fn test_reduction_ties_go_to_last_seen() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let worker = PeerId::new();
        let now = Instant::now();

        broker.handle_worker_message(&worker, ready(), now);
        broker.handle_client_message(&client, request(THREE_MOVE_FEN, 1), now);

        // The first two results tie at the top score, the third is worse.
        let mut replies_seen = Vec::new();
        let mut arrival = Vec::new();
        for _ in 0..4 {
            broker.dispatch();
            let (assignments, replies) = split(broker.drain_outbox());
            replies_seen.extend(replies);
            for (id, assignment) in assignments {
                let score = if arrival.len() < 2 { 50 } else { 1 };
                arrival.push(assignment.list_of_moves[0].clone());
                broker.handle_worker_message(&id, result_for(&assignment, score), now);
            }
        }

        assert_eq!(replies_seen.len(), 1);
        let (_, best_move, best_score) = &replies_seen[0];
        assert_eq!(*best_score, 50);
        // The second of the two tied results is the one reported.
        assert_eq!(best_move.as_deref(), Some(arrival[1].as_str()));
    }

    #[test]
    fn test_worker_death_requeues_task_and_late_result_is_discarded() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let worker_a = PeerId::new();
        let worker_b = PeerId::new();
        let t0 = Instant::now();

        broker.handle_worker_message(&worker_a, ready(), t0);
        broker.handle_client_message(&client, request(ONE_MOVE_FEN, 1), t0);
        broker.dispatch();
        let (assignments, _) = split(broker.drain_outbox());
        assert_eq!(assignments.len(), 1);
        let (_, assignment) = &assignments[0];

        // Client keeps heartbeating; worker_a goes silent past its expiry.
        broker.handle_client_message(&client, ClientMessage::Heartbeat(Heartbeat::new()), t0 + TIMEOUT);
        broker.sweep(t0 + TIMEOUT + Duration::from_secs(1));

        assert_eq!(broker.queued_tasks(), 1, "task reappears in the queue");
        assert!(!broker.workers().is_alive(&worker_a));

        // A fresh worker picks the task up.
        broker.handle_worker_message(&worker_b, ready(), t0 + TIMEOUT + Duration::from_secs(2));
        broker.dispatch();
        let (reassigned, _) = split(broker.drain_outbox());
        assert_eq!(reassigned.len(), 1);
        assert_eq!(reassigned[0].0, worker_b);

        // The dead worker's straggling result must not count...
        broker.handle_worker_message(
            &worker_a,
            result_for(assignment, 999),
            t0 + TIMEOUT + Duration::from_secs(3),
        );
        let (_, replies) = split(broker.drain_outbox());
        assert!(replies.is_empty(), "late result discarded");

        // ...but the worker is back in the pool.
        assert!(broker.workers().is_alive(&worker_a));
        assert!(broker.workers().get(&worker_a).unwrap().available);

        // The replacement's result is the one that completes the request.
        let (id, assignment) = &reassigned[0];
        broker.handle_worker_message(id, result_for(assignment, 12), t0 + TIMEOUT + Duration::from_secs(4));
        let (_, replies) = split(broker.drain_outbox());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].2, 12);
    }

    #[test]
    fn test_expired_client_gets_no_reply_and_tasks_are_dropped() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let worker = PeerId::new();
        let t0 = Instant::now();

        broker.handle_worker_message(&worker, ready(), t0);
        broker.handle_client_message(&client, request(THREE_MOVE_FEN, 1), t0);
        broker.dispatch();
        let (assignments, _) = split(broker.drain_outbox());
        assert_eq!(assignments.len(), 1);
        assert_eq!(broker.queued_tasks(), 2);

        // Keep the worker alive across the client's expiry.
        broker.handle_worker_message(&worker, WorkerMessage::Heartbeat, t0 + Duration::from_secs(10));
        broker.sweep(t0 + TIMEOUT + Duration::from_secs(1));
        assert!(!broker.clients().is_alive(&client));
        assert!(broker.workers().is_alive(&worker));

        // Drop at result time: the in-flight result is discarded.
        let (id, assignment) = &assignments[0];
        broker.handle_worker_message(
            id,
            result_for(assignment, 40),
            t0 + TIMEOUT + Duration::from_secs(2),
        );
        let (_, replies) = split(broker.drain_outbox());
        assert!(replies.is_empty());

        // Drop at dispatch time: queued tasks evaporate without burning the
        // worker, which stays available.
        broker.dispatch();
        let (assignments, replies) = split(broker.drain_outbox());
        assert!(assignments.is_empty());
        assert!(replies.is_empty());
        assert_eq!(broker.queued_tasks(), 0);
        assert!(broker.workers().get(&worker).unwrap().available);
    }

    #[test]
    fn test_resend_supersedes_previous_request() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let worker = PeerId::new();
        let now = Instant::now();

        broker.handle_worker_message(&worker, ready(), now);
        broker.handle_client_message(&client, request(THREE_MOVE_FEN, 1), now);
        broker.dispatch();
        let (old_assignments, _) = split(broker.drain_outbox());
        assert_eq!(old_assignments.len(), 1);
        assert_eq!(broker.queued_tasks(), 2);

        // New request on a different board before the old one completed.
        broker.handle_client_message(&client, request(ONE_MOVE_FEN, 1), now);
        assert_eq!(broker.clients().get(&client).unwrap().expected_results, 1);

        // The old in-flight result no longer matches the session and is
        // discarded, though it frees the worker.
        let (id, assignment) = &old_assignments[0];
        broker.handle_worker_message(id, result_for(assignment, 77), now);
        let (_, replies) = split(broker.drain_outbox());
        assert!(replies.is_empty(), "no reply for the old generation");

        // Old queued tasks are dropped at dispatch; the new task goes out.
        broker.dispatch();
        let (assignments, _) = split(broker.drain_outbox());
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].1.board, ONE_MOVE_FEN);
        assert_eq!(broker.queued_tasks(), 0);

        let (id, assignment) = &assignments[0];
        broker.handle_worker_message(id, result_for(assignment, 3), now);
        let (_, replies) = split(broker.drain_outbox());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1.as_deref(), Some("a1a2"));
        assert_eq!(replies[0].2, 3);
    }

    #[test]
    fn test_zero_legal_moves_short_circuits() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let now = Instant::now();

        broker.handle_client_message(&client, request(STALEMATE_FEN, 2), now);

        assert_eq!(broker.queued_tasks(), 0);
        assert_eq!(
            broker.drain_outbox(),
            vec![Outbound::ToClient(
                client,
                MoveReply {
                    best_move: None,
                    score: -MATE_SCORE,
                },
            )]
        );
    }

    #[test]
    fn test_unparsable_board_still_answers() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let now = Instant::now();

        broker.handle_client_message(&client, request("definitely not fen", 1), now);

        let (_, replies) = split(broker.drain_outbox());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1, None);
        assert_eq!(replies[0].2, -MATE_SCORE);
    }

    #[test]
    fn test_tasks_wait_for_first_ready_worker() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let worker = PeerId::new();
        let now = Instant::now();

        broker.handle_client_message(&client, request(THREE_MOVE_FEN, 1), now);
        broker.dispatch();
        let (assignments, _) = split(broker.drain_outbox());
        assert!(assignments.is_empty());
        assert_eq!(broker.queued_tasks(), 3);

        broker.handle_worker_message(&worker, ready(), now);
        broker.dispatch();
        let (assignments, _) = split(broker.drain_outbox());
        assert_eq!(assignments.len(), 1);
        assert_eq!(broker.queued_tasks(), 2);
    }

    #[test]
    fn test_heartbeat_refreshes_worker_expiry() {
        let mut broker = Broker::new(TIMEOUT);
        let worker = PeerId::new();
        let t0 = Instant::now();

        broker.handle_worker_message(&worker, ready(), t0);
        broker.handle_worker_message(&worker, WorkerMessage::Heartbeat, t0 + Duration::from_secs(10));

        // Past the original expiry but within the refreshed one.
        broker.sweep(t0 + TIMEOUT + Duration::from_secs(1));
        assert!(broker.workers().is_alive(&worker));

        // Past the refreshed expiry.
        broker.sweep(t0 + Duration::from_secs(10) + TIMEOUT + Duration::from_secs(1));
        assert!(!broker.workers().is_alive(&worker));
    }

    #[test]
    fn test_ready_after_reconnect_requeues_unreturned_task() {
        let mut broker = Broker::new(TIMEOUT);
        let client = PeerId::new();
        let worker = PeerId::new();
        let now = Instant::now();

        broker.handle_worker_message(&worker, ready(), now);
        broker.handle_client_message(&client, request(ONE_MOVE_FEN, 1), now);
        broker.dispatch();
        let (assignments, _) = split(broker.drain_outbox());
        assert_eq!(assignments.len(), 1);
        assert_eq!(broker.queued_tasks(), 0);

        // The worker reconnects and announces Ready without ever having
        // answered: its task must not be lost.
        broker.handle_worker_message(&worker, ready(), now + Duration::from_secs(1));
        assert_eq!(broker.queued_tasks(), 1);
        assert!(broker.workers().get(&worker).unwrap().available);

        broker.dispatch();
        let (assignments, _) = split(broker.drain_outbox());
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].1.list_of_moves, vec!["a1a2".to_string()]);
    }

    #[test]
    fn test_wire_formats_match_protocol() {
        // Worker-side frames.
        let ready_json = serde_json::to_value(&ready()).unwrap();
        assert_eq!(ready_json["type"], "WorkerRequest");
        assert_eq!(ready_json["status"], "Ready");

        let hb: WorkerMessage = serde_json::from_str(r#"{"type":"<3"}"#).unwrap();
        assert!(matches!(hb, WorkerMessage::Heartbeat));

        let result: WorkerMessage = serde_json::from_str(
            r#"{"type":"WorkerResult","move":"e2e4","score":42,"board":"fen here","depth":2}"#,
        )
        .unwrap();
        match result {
            WorkerMessage::WorkerResult {
                best_move, score, ..
            } => {
                assert_eq!(best_move.as_deref(), Some("e2e4"));
                assert_eq!(score, 42);
            }
            other => panic!("wrong variant: {:?}", other),
        }

        let assignment = TaskAssignment {
            list_of_moves: vec!["e2e4".to_string()],
            board: "fen".to_string(),
            depth: 3,
        };
        let json = serde_json::to_value(&assignment).unwrap();
        assert!(json.get("listOfMoves").is_some());

        // Client-side frames: the request has no type tag, the heartbeat
        // does, and the two must not be confused.
        let msg: ClientMessage = serde_json::from_str(r#"{"board":"fen","depth":1}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Request(_)));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"<3"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Heartbeat(_)));

        let reply = crate::broker::protocol::MoveReply {
            best_move: Some("e7e5".to_string()),
            score: -10,
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["move"], "e7e5");
        assert_eq!(json["score"], -10);
    }
}
