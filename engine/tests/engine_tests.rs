mod common;

use brainbolt_engine::models::LeaderboardKind;
use brainbolt_engine::{EngineError, LiveEvent};
use common::{build_engine, build_engine_with_tuning, question};

/// Plays `n` correct answers against the same question, chaining the state
/// version the way a well-behaved client does.
async fn play_correct(
    harness: &common::TestEngine,
    user_id: &str,
    question_id: &str,
    answer: &str,
    n: usize,
) -> u64 {
    let mut version = harness.engine.user_state(user_id).await.unwrap().state_version;
    for i in 0..n {
        let outcome = harness
            .engine
            .submit_answer(
                user_id,
                question_id,
                answer,
                version,
                &format!("{}-token-{}", user_id, i),
            )
            .await
            .unwrap();
        assert!(outcome.correct);
        version = outcome.state_version;
    }
    version
}

#[tokio::test]
async fn question_flow_round_trip() {
    let harness = build_engine(vec![question("q1", 1, "42")]);

    let next = harness.engine.next_question("user-1").await.unwrap();
    assert_eq!(next.question_id, "q1");
    assert_eq!(next.state_version, 0);
    assert_eq!(next.current_difficulty, 1);

    let outcome = harness
        .engine
        .submit_answer("user-1", &next.question_id, "42", next.state_version, "t-1")
        .await
        .unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.score_delta, 10);
    assert_eq!(outcome.state_version, 1);
    assert!(!outcome.replayed);
}

#[tokio::test]
async fn state_version_counts_accepted_mutations_only() {
    let harness = build_engine(vec![question("q1", 1, "42")]);
    let version = play_correct(&harness, "user-1", "q1", "42", 5).await;
    assert_eq!(version, 5);

    // A conflicted attempt does not advance the version.
    let err = harness
        .engine
        .submit_answer("user-1", "q1", "42", 0, "stale-token")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));

    // Neither does an idempotent replay.
    let replay = harness
        .engine
        .submit_answer("user-1", "q1", "42", version, "user-1-token-4")
        .await
        .unwrap();
    assert!(replay.replayed);

    let state = harness.engine.user_state("user-1").await.unwrap();
    assert_eq!(state.state_version, 5);
    assert_eq!(state.total_answered, 5);
}

#[tokio::test]
async fn duplicate_token_with_different_payload_returns_first_outcome() {
    let harness = build_engine(vec![question("q1", 1, "42")]);
    harness.engine.user_state("user-1").await.unwrap();

    let first = harness
        .engine
        .submit_answer("user-1", "q1", "42", 0, "token-x")
        .await
        .unwrap();
    assert!(first.correct);

    // Same token, deliberately different (and wrong) payload.
    let second = harness
        .engine
        .submit_answer("user-1", "q1", "not even close", 1, "token-x")
        .await
        .unwrap();
    assert!(second.replayed);
    assert!(second.correct, "replay must reflect the first application");
    assert_eq!(second.score_delta, first.score_delta);
    assert_eq!(second.total_score, first.total_score);

    let state = harness.engine.user_state("user-1").await.unwrap();
    assert_eq!(state.total_score, first.total_score);
    assert_eq!(state.total_answered, 1);
}

#[tokio::test]
async fn three_correct_answers_walk_difficulty_and_score() {
    let harness = build_engine(vec![question("q1", 1, "42")]);
    harness.engine.user_state("user-1").await.unwrap();

    // Step 1: difficulty 1, streak 0 -> delta 10; momentum 1.0, no level-up.
    let s1 = harness
        .engine
        .submit_answer("user-1", "q1", "42", 0, "t-1")
        .await
        .unwrap();
    assert_eq!(s1.score_delta, 10);
    assert_eq!(s1.new_difficulty, 1);

    // Step 2: streak gate met at momentum 1.7 -> level 2; delta 10 * 1.1 = 11.
    let s2 = harness
        .engine
        .submit_answer("user-1", "q1", "42", 1, "t-2")
        .await
        .unwrap();
    assert_eq!(s2.score_delta, 11);
    assert_eq!(s2.new_difficulty, 2);

    // Step 3: weight 1.25, multiplier 1.2 -> delta 15; momentum clamps at 2.0.
    let s3 = harness
        .engine
        .submit_answer("user-1", "q1", "42", 2, "t-3")
        .await
        .unwrap();
    assert_eq!(s3.score_delta, 15);
    assert_eq!(s3.new_difficulty, 3);
    assert!((s3.momentum - 2.0).abs() < 1e-9);

    assert_eq!(s3.total_score, 36);
    assert_eq!(s3.max_streak, 3);
}

#[tokio::test]
async fn live_observers_see_committed_leaderboard_updates() {
    let harness = build_engine(vec![question("q1", 1, "42")]);
    harness.directory.register("user-1", "alice");
    harness.engine.user_state("user-1").await.unwrap();

    let mut rx = harness.engine.subscribe_live("observer-1");
    match rx.recv().await.unwrap() {
        LiveEvent::Connected { observer_id } => assert_eq!(observer_id, "observer-1"),
        other => panic!("expected connected event, got {:?}", other),
    }

    harness
        .engine
        .submit_answer("user-1", "q1", "42", 0, "t-1")
        .await
        .unwrap();

    // One broadcast per ranking kind, in update order.
    match rx.recv().await.unwrap() {
        LiveEvent::Leaderboard { kind, entries } => {
            assert_eq!(kind, LeaderboardKind::Score);
            assert_eq!(entries[0].username, "alice");
            assert_eq!(entries[0].value, 10);
        }
        other => panic!("unexpected event {:?}", other),
    }
    match rx.recv().await.unwrap() {
        LiveEvent::Leaderboard { kind, entries } => {
            assert_eq!(kind, LeaderboardKind::Streak);
            assert_eq!(entries[0].value, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn viewer_outside_top_n_gets_count_based_rank() {
    let tuning = brainbolt_engine::Tuning {
        leaderboard_size: 2,
        ..brainbolt_engine::Tuning::default()
    };
    let harness = build_engine_with_tuning(vec![question("q1", 1, "42")], tuning);
    for user in ["alice", "bob", "carol"] {
        harness.directory.register(user, user);
    }

    play_correct(&harness, "alice", "q1", "42", 3).await; // 36 points
    play_correct(&harness, "bob", "q1", "42", 2).await; // 21 points
    play_correct(&harness, "carol", "q1", "42", 1).await; // 10 points

    let view = harness
        .engine
        .leaderboard(LeaderboardKind::Score, Some("carol"))
        .await
        .unwrap();

    assert_eq!(view.leaderboard.len(), 2);
    assert_eq!(view.leaderboard[0].user_id, "alice");
    assert_eq!(view.leaderboard[0].value, 36);
    assert_eq!(view.leaderboard[1].user_id, "bob");

    let viewer = view.viewer.unwrap();
    assert_eq!(viewer.rank, 3);
    assert_eq!(viewer.value, 10);
}

#[tokio::test]
async fn freshly_seeded_questions_are_served_immediately() {
    let harness = build_engine(vec![]);

    let err = harness.engine.next_question("user-1").await.unwrap_err();
    assert!(matches!(err, EngineError::NoQuestionsAvailable { .. }));

    // Empty pools are never cached, so a seed shows up on the next ask.
    harness.bank.add(question("q1", 1, "42"));
    let next = harness.engine.next_question("user-1").await.unwrap();
    assert_eq!(next.question_id, "q1");
}

#[tokio::test]
async fn metrics_reflect_lifetime_and_recent_performance() {
    let harness = build_engine(vec![question("q1", 1, "42")]);
    harness.engine.user_state("user-1").await.unwrap();

    for (i, answer) in ["42", "nope", "42"].into_iter().enumerate() {
        harness
            .engine
            .submit_answer("user-1", "q1", answer, i as u64, &format!("t-{}", i))
            .await
            .unwrap();
    }

    let metrics = harness.engine.metrics("user-1").await.unwrap();
    assert_eq!(metrics.total_answered, 3);
    assert_eq!(metrics.total_correct, 2);
    assert_eq!(metrics.total_score, 20);
    assert_eq!(metrics.streak, 1);
    assert_eq!(metrics.max_streak, 1);
    assert!((metrics.accuracy - 0.6667).abs() < 1e-12);
    assert!((metrics.recent_performance - 0.6667).abs() < 1e-12);
    assert_eq!(metrics.difficulty_histogram.get(&1), Some(&3));
}

#[tokio::test]
async fn shutdown_drains_live_observers() {
    let harness = build_engine(vec![question("q1", 1, "42")]);
    let mut rx = harness.engine.subscribe_live("observer-1");

    harness.engine.shutdown();

    // The queued connected event survives, then the channel closes.
    assert!(matches!(
        rx.recv().await,
        Some(LiveEvent::Connected { .. })
    ));
    assert!(rx.recv().await.is_none());

    // Idempotent unsubscribe after drain.
    harness.engine.unsubscribe_live("observer-1");
}
