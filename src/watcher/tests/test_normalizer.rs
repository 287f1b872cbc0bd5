// Tests for translating raw payloads into game events

use super::super::{ConcreteStrategy, EventNormalizer, RawEvent, ScreenObservation};
use crate::events::{ChampSelectActionKind, GameEvent};
use crate::lcu::{LcuEventEnvelope, LcuEventType};
use serde_json::{json, Value};

const PHASE: &str = "/lol-gameflow/v1/gameflow-phase";
const READY_CHECK: &str = "/lol-matchmaking/v1/ready-check";
const SESSION: &str = "/lol-champ-select/v1/session";

fn envelope(uri: &str, event_type: LcuEventType, data: Value) -> RawEvent {
  RawEvent::Envelope(LcuEventEnvelope {
    uri: uri.to_string(),
    event_type,
    data,
  })
}

fn ready_check(state: &str, response: &str, timer: f64) -> RawEvent {
  envelope(
    READY_CHECK,
    LcuEventType::Update,
    json!({ "state": state, "playerResponse": response, "timer": timer }),
  )
}

fn session(actions: Value) -> RawEvent {
  envelope(
    SESSION,
    LcuEventType::Update,
    json!({
      "gameId": 0,
      "localPlayerCellId": 2,
      "chatDetails": { "multiUserChatId": "sess-7" },
      "actions": actions,
      "timer": { "phase": "BAN_PICK", "adjustedTimeLeftInPhase": 30000 }
    }),
  )
}

fn events(normalizer: &mut EventNormalizer, raw: RawEvent) -> Vec<GameEvent> {
  normalizer.normalize(raw).into_iter().map(|n| n.event).collect()
}

#[cfg(test)]
mod normalizer_tests {
  use super::*;

  /// Test: Ready check identity
  ///
  /// Scenario: The same ready check is observed several times, accepted, and later a new one starts.
  /// Expected: Re-observations reuse the id; the next check after the resource vanished gets a new id.
  #[test]
  fn test_ready_check_ids_are_stable_per_instance() {
    let mut normalizer = EventNormalizer::new();

    let first = events(&mut normalizer, ready_check("InProgress", "None", 1.0));
    assert_eq!(
      first,
      vec![GameEvent::ReadyCheckReceived {
        ready_check_id: "rc-1".into()
      }]
    );

    let again = events(&mut normalizer, ready_check("InProgress", "None", 3.0));
    assert_eq!(again, first);

    let accepted = events(&mut normalizer, ready_check("InProgress", "Accepted", 4.0));
    assert_eq!(
      accepted,
      vec![GameEvent::ReadyCheckAccepted {
        ready_check_id: "rc-1".into()
      }]
    );
    assert!(events(&mut normalizer, ready_check("InProgress", "Accepted", 5.0)).is_empty());
    assert!(events(&mut normalizer, ready_check("EveryoneReady", "Accepted", 6.0)).is_empty());

    assert!(events(&mut normalizer, envelope(READY_CHECK, LcuEventType::Delete, Value::Null)).is_empty());
    let next = events(&mut normalizer, ready_check("InProgress", "None", 0.5));
    assert_eq!(
      next,
      vec![GameEvent::ReadyCheckReceived {
        ready_check_id: "rc-2".into()
      }]
    );
  }

  /// Test: Ready check that vanishes unanswered
  ///
  /// Scenario: The resource is deleted while the check is still pending.
  /// Expected: A single ReadyCheckExpired.
  #[test]
  fn test_ready_check_expires_on_delete() {
    let mut normalizer = EventNormalizer::new();
    events(&mut normalizer, ready_check("InProgress", "None", 1.0));

    let expired = events(&mut normalizer, envelope(READY_CHECK, LcuEventType::Delete, Value::Null));
    assert_eq!(
      expired,
      vec![GameEvent::ReadyCheckExpired {
        ready_check_id: "rc-1".into()
      }]
    );
    assert!(events(&mut normalizer, envelope(READY_CHECK, LcuEventType::Delete, Value::Null)).is_empty());
  }

  /// Test: Decline by the local player
  ///
  /// Scenario: The player response switches to Declined.
  /// Expected: ReadyCheckDeclined for the same id.
  #[test]
  fn test_ready_check_declined() {
    let mut normalizer = EventNormalizer::new();
    events(&mut normalizer, ready_check("InProgress", "None", 1.0));
    let declined = events(&mut normalizer, ready_check("InProgress", "Declined", 2.0));
    assert_eq!(
      declined,
      vec![GameEvent::ReadyCheckDeclined {
        ready_check_id: "rc-1".into()
      }]
    );
  }

  /// Test: Champ select session and actions
  ///
  /// Scenario: A session appears with a pick in progress for the local player and a ban for someone else.
  /// Expected: Session entry, then the local pick only; locking emits ChampionLocked once.
  #[test]
  fn test_session_actions_and_lock() {
    let mut normalizer = EventNormalizer::new();
    let opened = events(
      &mut normalizer,
      session(json!([[
        { "id": 5, "actorCellId": 2, "championId": 0, "completed": false, "isInProgress": true, "type": "pick" },
        { "id": 6, "actorCellId": 7, "championId": 0, "completed": false, "isInProgress": true, "type": "ban" }
      ]])),
    );
    assert_eq!(
      opened[..2],
      [
        GameEvent::ChampSelectPhaseEntered {
          session_id: "sess-7".into()
        },
        GameEvent::ChampSelectActionAvailable {
          session_id: "sess-7".into(),
          action_id: 5,
          kind: ChampSelectActionKind::Pick,
          champion_id: None,
        },
      ]
    );
    assert!(matches!(opened[2], GameEvent::TimerTick { remaining_ms: 30000, .. }));
    assert_eq!(opened.len(), 3);

    let locked_session = session(json!([[
      { "id": 5, "actorCellId": 2, "championId": 103, "completed": true, "isInProgress": false, "type": "pick" }
    ]]));
    let locked = events(&mut normalizer, locked_session.clone());
    assert_eq!(
      locked,
      vec![GameEvent::ChampionLocked {
        session_id: "sess-7".into(),
        champion_id: 103
      }]
    );
    assert!(events(&mut normalizer, locked_session).is_empty());
  }

  /// Test: Leaving champ select
  ///
  /// Scenario: The gameflow phase moves from ChampSelect to GameStart.
  /// Expected: SessionEnded carrying the session id, exactly once.
  #[test]
  fn test_phase_exit_ends_session() {
    let mut normalizer = EventNormalizer::new();
    events(&mut normalizer, envelope(PHASE, LcuEventType::Update, json!("ChampSelect")));
    events(&mut normalizer, session(json!([])));

    let ended = events(&mut normalizer, envelope(PHASE, LcuEventType::Update, json!("GameStart")));
    assert_eq!(
      ended,
      vec![GameEvent::SessionEnded {
        session_id: Some("sess-7".into())
      }]
    );
    assert!(events(&mut normalizer, envelope(SESSION, LcuEventType::Delete, Value::Null)).is_empty());
  }

  /// Test: Push frames
  ///
  /// Scenario: A WAMP welcome frame, a malformed frame and a real event frame arrive.
  /// Expected: Only the event frame produces an event, tagged with the push source.
  #[test]
  fn test_push_frames() {
    let mut normalizer = EventNormalizer::new();
    assert!(normalizer
      .normalize(RawEvent::Frame("[0,\"abc\",1,\"server\"]".into()))
      .is_empty());
    assert!(normalizer.normalize(RawEvent::Frame("{not json".into())).is_empty());

    let frame = json!([
      8,
      "OnJsonApiEvent_lol-matchmaking_v1_ready-check",
      { "uri": READY_CHECK, "eventType": "Create", "data": { "state": "InProgress", "playerResponse": "None", "timer": 0.0 } }
    ])
    .to_string();
    let normalized = normalizer.normalize(RawEvent::Frame(frame));
    assert_eq!(normalized.len(), 1);
    assert_eq!(normalized[0].source, ConcreteStrategy::PushEvents);
    assert!(matches!(
      normalized[0].event,
      GameEvent::ReadyCheckReceived { .. }
    ));
  }

  /// Test: Malformed payload inside a valid envelope
  ///
  /// Scenario: A session update whose actions field has the wrong shape.
  /// Expected: Dropped without events; later valid payloads still work.
  #[test]
  fn test_malformed_payload_is_dropped() {
    let mut normalizer = EventNormalizer::new();
    let bad = envelope(SESSION, LcuEventType::Update, json!({ "actions": "nope" }));
    assert!(events(&mut normalizer, bad).is_empty());
    let good = events(&mut normalizer, session(json!([])));
    assert_eq!(
      good[0],
      GameEvent::ChampSelectPhaseEntered {
        session_id: "sess-7".into()
      }
    );
  }

  /// Test: Screen observations
  ///
  /// Scenario: The match-found dialog is visible, then champ select replaces it.
  /// Expected: Ready check received, then accepted and a session entered.
  #[test]
  fn test_screen_observations() {
    let mut normalizer = EventNormalizer::new();
    let dialog = ScreenObservation {
      window_found: true,
      texts: vec!["Match Found".into()],
      buttons: vec!["Accept".into(), "Decline".into()],
    };
    let received = normalizer.normalize(RawEvent::Screen(dialog));
    assert_eq!(received[0].source, ConcreteStrategy::UiAutomation);
    assert_eq!(
      received[0].event,
      GameEvent::ReadyCheckReceived {
        ready_check_id: "ui-rc-1".into()
      }
    );

    let champ_select = ScreenObservation {
      window_found: true,
      texts: vec!["Choose your champion!".into()],
      buttons: vec!["Lock In".into()],
    };
    let next = events(&mut normalizer, RawEvent::Screen(champ_select));
    assert_eq!(
      next,
      vec![
        GameEvent::ReadyCheckAccepted {
          ready_check_id: "ui-rc-1".into()
        },
        GameEvent::ChampSelectPhaseEntered {
          session_id: "ui-cs-1".into()
        },
      ]
    );
  }

  /// Test: Client disappears mid-session
  ///
  /// Scenario: The endpoint is lost while champ select is open.
  /// Expected: The open session is ended.
  #[test]
  fn test_client_lost_closes_session() {
    let mut normalizer = EventNormalizer::new();
    events(&mut normalizer, session(json!([])));
    assert_eq!(
      normalizer.client_lost(),
      vec![GameEvent::SessionEnded {
        session_id: Some("sess-7".into())
      }]
    );
    assert!(normalizer.client_lost().is_empty());
  }
}
