// Tests for writing rune pages into the client's page list

use super::test_helpers::{ahri_page, catalog, default_page, editable_page, perks_client, PerksState};
use crate::lcu::LcuApi;
use crate::runes::{page_path, ApplyMode, ApplyOutcome, RunePageApplier, PAGES_PATH};
use crate::test_helpers::MockLcu;
use reqwest::Method;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn setup(pages: Vec<serde_json::Value>, max_pages: usize) -> (Arc<Mutex<PerksState>>, Arc<MockLcu>, RunePageApplier) {
  let state = Arc::new(Mutex::new(PerksState {
    next_id: 100,
    clock: 10,
    max_pages,
    pages,
    ..Default::default()
  }));
  let mock = Arc::new(perks_client(state.clone()));
  let api: Arc<dyn LcuApi> = mock.clone();
  let applier = RunePageApplier::new(api, 2).with_catalog(catalog());
  (state, mock, applier)
}

#[cfg(test)]
mod applier_tests {
  use super::*;

  /// Test: Create then re-apply
  ///
  /// Scenario: Only the non-editable default page exists; the page is applied twice.
  /// Expected: One POST; the second apply finds the identical current page and writes nothing.
  #[tokio::test]
  async fn test_create_then_unchanged() {
    let (state, mock, applier) = setup(vec![default_page(1, true)], 2);

    let first = applier.apply(&ahri_page()).await.unwrap();
    assert_eq!(
      first,
      ApplyOutcome::Applied {
        page_id: Some(101),
        mode: ApplyMode::Created
      }
    );
    let second = applier.apply(&ahri_page()).await.unwrap();
    assert_eq!(
      second,
      ApplyOutcome::Applied {
        page_id: Some(101),
        mode: ApplyMode::Unchanged
      }
    );

    assert_eq!(mock.count(Method::POST, PAGES_PATH), 1);
    assert_eq!(mock.writes().len(), 1);
    let pages = state.lock().unwrap().pages.clone();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1]["name"], "Ahri");
    assert_eq!(pages[1]["current"], true);
  }

  /// Test: Page limit reached
  ///
  /// Scenario: Two editable pages exist, none current, inventory allows two.
  /// Expected: The page with the oldest lastModified is overwritten; no page is created.
  #[tokio::test]
  async fn test_overwrites_oldest_when_full() {
    let pages = vec![
      default_page(1, true),
      editable_page(10, "Newer", false, 50),
      editable_page(11, "Older", false, 20),
    ];
    let (state, mock, applier) = setup(pages, 2);

    let outcome = applier.apply(&ahri_page()).await.unwrap();
    assert_eq!(
      outcome,
      ApplyOutcome::Applied {
        page_id: Some(11),
        mode: ApplyMode::OverwroteOldest
      }
    );
    assert_eq!(mock.count(Method::POST, PAGES_PATH), 0);
    assert_eq!(mock.count(Method::PUT, &page_path(11)), 1);

    let pages = state.lock().unwrap().pages.clone();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[1]["name"], "Newer");
    assert_eq!(pages[2]["name"], "Ahri");
  }

  /// Test: Current editable page
  ///
  /// Scenario: The current page is editable and carries fields the client added.
  /// Expected: It is overwritten in place and the unknown fields survive.
  #[tokio::test]
  async fn test_overwrites_current_and_keeps_unknown_fields() {
    let mut current = editable_page(10, "Old", true, 30);
    current["order"] = json!(0);
    current["autoModifiedSelections"] = json!([]);
    let (state, mock, applier) = setup(vec![current, editable_page(11, "Other", false, 10)], 5);

    let outcome = applier.apply(&ahri_page()).await.unwrap();
    assert_eq!(
      outcome,
      ApplyOutcome::Applied {
        page_id: Some(10),
        mode: ApplyMode::OverwroteCurrent
      }
    );
    let put = mock
      .writes()
      .into_iter()
      .find(|c| c.method == Method::PUT)
      .unwrap();
    let body = put.body.unwrap();
    assert_eq!(body["order"], 0);
    assert_eq!(body["subStyleId"], 8000);
    assert_eq!(
      body["selectedPerkIds"],
      json!([8112, 8126, 8136, 8135, 9111, 8014, 5008, 5008, 5001])
    );
    assert_eq!(state.lock().unwrap().pages[0]["name"], "Ahri");
  }

  /// Test: Identical page exists but is not current
  ///
  /// Scenario: An editable page already holds the selection.
  /// Expected: That page is reused rather than duplicated.
  #[tokio::test]
  async fn test_reuses_identical_page() {
    let mut existing = editable_page(12, "Ahri", false, 5);
    existing["primaryStyleId"] = json!(8100);
    existing["subStyleId"] = json!(8000);
    existing["selectedPerkIds"] = json!([8112, 8126, 8136, 8135, 9111, 8014, 5008, 5008, 5001]);
    let (_, mock, applier) = setup(vec![default_page(1, true), existing], 5);

    let outcome = applier.apply(&ahri_page()).await.unwrap();
    assert_eq!(
      outcome,
      ApplyOutcome::Applied {
        page_id: Some(12),
        mode: ApplyMode::ReusedExisting
      }
    );
    assert_eq!(mock.count(Method::POST, PAGES_PATH), 0);
  }

  /// Test: Invalid page
  ///
  /// Scenario: Secondary path equals primary.
  /// Expected: Rejected before any request is made.
  #[tokio::test]
  async fn test_invalid_page_makes_no_calls() {
    let (_, mock, applier) = setup(vec![], 2);
    let mut page = ahri_page();
    page.secondary_style_id = page.primary_style_id;

    let outcome = applier.apply(&page).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Rejected(_)));
    assert!(mock.calls().is_empty());
  }

  /// Test: Concurrent edit on every attempt
  ///
  /// Scenario: The target page changes between listing and writing, twice.
  /// Expected: Rejected as a concurrent edit without any PUT.
  #[tokio::test]
  async fn test_persistent_conflict_is_rejected() {
    let (state, mock, applier) = setup(vec![editable_page(10, "Old", true, 30)], 5);
    state.lock().unwrap().foreign_edits = 2;

    let outcome = applier.apply(&ahri_page()).await.unwrap();
    match outcome {
      ApplyOutcome::Rejected(reason) => assert!(reason.starts_with("concurrent edit")),
      other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(mock.count(Method::PUT, &page_path(10)), 0);
    assert_eq!(state.lock().unwrap().pages[0]["name"], "Old");
  }

  /// Test: Single concurrent edit
  ///
  /// Scenario: The page changes once between listing and writing.
  /// Expected: The apply retries and then succeeds.
  #[tokio::test]
  async fn test_single_conflict_is_retried() {
    let (state, mock, applier) = setup(vec![editable_page(10, "Old", true, 30)], 5);
    state.lock().unwrap().foreign_edits = 1;

    let outcome = applier.apply(&ahri_page()).await.unwrap();
    assert_eq!(
      outcome,
      ApplyOutcome::Applied {
        page_id: Some(10),
        mode: ApplyMode::OverwroteCurrent
      }
    );
    assert_eq!(mock.count(Method::GET, PAGES_PATH), 2);
    assert_eq!(mock.count(Method::PUT, &page_path(10)), 1);
  }

  /// Test: Two applies at once for the same account
  ///
  /// Scenario: Both start while no editable page exists.
  /// Expected: Exactly one page is created; the other apply sees it.
  #[tokio::test]
  async fn test_concurrent_applies_create_one_page() {
    let (state, mock, applier) = setup(vec![default_page(1, true)], 2);
    let applier = Arc::new(applier);

    let a = {
      let applier = applier.clone();
      tokio::spawn(async move { applier.apply(&ahri_page()).await })
    };
    let b = {
      let applier = applier.clone();
      tokio::spawn(async move { applier.apply(&ahri_page()).await })
    };
    let mut modes = vec![];
    for handle in [a, b] {
      match handle.await.unwrap().unwrap() {
        ApplyOutcome::Applied { mode, .. } => modes.push(mode),
        other => panic!("unexpected {:?}", other),
      }
    }
    modes.sort_by_key(|m| *m == ApplyMode::Unchanged);

    assert_eq!(modes, vec![ApplyMode::Created, ApplyMode::Unchanged]);
    assert_eq!(mock.count(Method::POST, PAGES_PATH), 1);
    assert_eq!(state.lock().unwrap().pages.len(), 2);
  }
}
