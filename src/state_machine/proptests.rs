//! Property-based tests for the state machine
//!
//! These tests drive sessions with arbitrary event sequences and check that
//! the turn invariants hold after every step.

use super::state::*;
use super::transition::*;
use super::*;
use crate::llm::BackendMemory;
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

const BACKENDS: &[&str] = &["A", "B", "C"];

fn backend_ids() -> Vec<String> {
    BACKENDS.iter().map(ToString::to_string).collect()
}

/// Worker-level actions; candidate texts come from a tiny alphabet so
/// duplicates across backends are common
#[derive(Debug, Clone)]
enum Action {
    Submit {
        input: String,
        texts: Vec<String>,
    },
    SelectCandidate(usize),
    SelectText(String),
    Bind(String),
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![Just("ok".to_string()), Just("sure".to_string()), "[a-z]{1,6}"]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => ("[a-z ]{1,12}", proptest::collection::vec(arb_text(), BACKENDS.len()))
            .prop_map(|(input, texts)| Action::Submit { input, texts }),
        3 => (0..BACKENDS.len()).prop_map(Action::SelectCandidate),
        1 => arb_text().prop_map(Action::SelectText),
        1 => prop_oneof![Just("asg-1".to_string()), Just("asg-2".to_string()), Just(String::new())]
            .prop_map(Action::Bind),
    ]
}

fn candidates_for(texts: &[String]) -> Vec<Candidate> {
    BACKENDS
        .iter()
        .zip(texts)
        .map(|(id, text)| Candidate::new(*id, text.clone()))
        .collect()
}

/// Apply one action as the runtime would: a submit is the `UserInput` and
/// `CandidatesGenerated` pair, committed only if both succeed
fn apply_action(
    session: &Session,
    action: &Action,
) -> Result<(Session, Vec<Effect>), TransitionError> {
    match action {
        Action::Submit { input, texts } => {
            let first = transition(session, Event::UserInput { text: input.clone() })?;
            let second = transition(
                &first.new_state,
                Event::CandidatesGenerated {
                    candidates: candidates_for(texts),
                },
            )?;
            let mut effects = first.effects;
            effects.extend(second.effects);
            Ok((second.new_state, effects))
        }
        Action::SelectCandidate(index) => {
            let text = session
                .pending_turn()
                .map_or_else(String::new, |t| t.candidates[*index].text.clone());
            let r = transition(
                session,
                Event::ResponseSelected {
                    text,
                    selected_at: Utc::now(),
                },
            )?;
            Ok((r.new_state, r.effects))
        }
        Action::SelectText(text) => {
            let r = transition(
                session,
                Event::ResponseSelected {
                    text: text.clone(),
                    selected_at: Utc::now(),
                },
            )?;
            Ok((r.new_state, r.effects))
        }
        Action::Bind(id) => {
            let r = transition(
                session,
                Event::AssignmentBound {
                    assignment_id: id.clone(),
                },
            )?;
            Ok((r.new_state, r.effects))
        }
    }
}

// ============================================================================
// State Validity Checkers
// ============================================================================

fn is_valid_session(session: &Session) -> bool {
    let pending = usize::from(session.pending_turn().is_some());

    session.turn_count <= session.turn_budget
        && session.turns.len() == session.turn_count as usize
        && session.transcript.len() + pending == session.turn_count as usize
        && session
            .turns
            .iter()
            .enumerate()
            .all(|(i, t)| t.turn_index as usize == i + 1)
        // Only the last turn may be pending
        && session
            .turns
            .iter()
            .rev()
            .skip(1)
            .all(|t| !t.is_pending())
        && match session.phase {
            SessionPhase::AwaitingSelection => pending == 1,
            SessionPhase::AwaitingInput | SessionPhase::Finalized => pending == 0,
            SessionPhase::Generating { .. } => false,
        }
}

fn selections_are_consistent(session: &Session) -> bool {
    session.turns.iter().filter_map(|t| t.selection.as_ref().map(|s| (t, s))).all(|(t, s)| {
        // The attributed backend is the first one that produced the text
        t.candidates
            .iter()
            .find(|c| c.text == s.selected_response)
            .is_some_and(|c| c.backend_id == s.selected_backend_id)
    })
}

fn memories_are_shared(session: &Session) -> bool {
    let memories = session.memories();
    memories.windows(2).all(|w| w[0] == w[1])
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_invariants_hold_across_any_sequence(
        budget in 1u32..5,
        actions in proptest::collection::vec(arb_action(), 0..40),
    ) {
        let mut session = Session::new("prop", budget, &backend_ids());
        let mut persist_count = 0;
        let mut last_turn_count = 0;

        for action in &actions {
            let before = session.clone();
            match apply_action(&session, action) {
                Ok((next, effects)) => {
                    let persists = effects
                        .iter()
                        .filter(|e| matches!(e, Effect::PersistRecord { .. }))
                        .count();
                    persist_count += persists;

                    // Finalization happens exactly when the budget is reached
                    prop_assert_eq!(persists == 1, !before.is_finalized() && next.is_finalized());
                    if next.is_finalized() {
                        prop_assert_eq!(next.turn_count, next.turn_budget);
                        prop_assert!(next.memories().iter().all(BackendMemory::is_empty));
                    }

                    // Turn count only ever grows by one
                    prop_assert!(next.turn_count == last_turn_count || next.turn_count == last_turn_count + 1);
                    last_turn_count = next.turn_count;
                    session = next;
                }
                Err(_) => {
                    // Rejected actions never leak partial state
                    prop_assert_eq!(&session, &before);
                }
            }

            prop_assert!(is_valid_session(&session), "invalid session: {:?}", session);
            prop_assert!(selections_are_consistent(&session));
            prop_assert!(memories_are_shared(&session));
        }

        prop_assert!(persist_count <= 1);
        prop_assert_eq!(persist_count == 1, session.is_finalized());
    }

    #[test]
    fn prop_invalid_selection_leaves_session_unchanged(
        input in "[a-z]{1,8}",
        texts in proptest::collection::vec("[a-z]{1,6}", BACKENDS.len()),
        choice in "[A-Z]{1,6}",
    ) {
        let session = Session::new("prop", 3, &backend_ids());
        let (pending, _) = apply_action(&session, &Action::Submit { input, texts }).unwrap();

        // Uppercase text never matches lowercase candidates
        let err = transition(
            &pending,
            Event::ResponseSelected { text: choice, selected_at: Utc::now() },
        )
        .unwrap_err();
        prop_assert_eq!(err, TransitionError::InvalidSelection);
    }

    #[test]
    fn prop_memory_follows_chosen_path(
        turns in proptest::collection::vec(
            (
                "[a-z]{1,8}",
                proptest::collection::vec("[a-z]{1,6}", BACKENDS.len()),
                0..BACKENDS.len(),
            ),
            1..5,
        ),
    ) {
        let budget = u32::try_from(turns.len()).unwrap() + 1;
        let mut session = Session::new("prop", budget, &backend_ids());
        let mut expected = BackendMemory::new();

        for (input, texts, choice) in turns {
            let (pending, effects) = apply_action(
                &session,
                &Action::Submit { input: input.clone(), texts: texts.clone() },
            )
            .unwrap();

            // The dispatch sees the shared history built so far
            match effects.as_slice() {
                [Effect::DispatchGeneration { memories, .. }] => {
                    prop_assert!(memories.iter().all(|m| *m == expected));
                }
                other => prop_assert!(false, "unexpected effects: {:?}", other),
            }

            let (next, _) = apply_action(&pending, &Action::SelectCandidate(choice)).unwrap();
            expected = expected.with_exchange(input, texts[choice].clone());
            session = next;
        }
    }
}
