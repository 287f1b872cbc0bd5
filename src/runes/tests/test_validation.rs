// Tests for rune page validation against the catalog

use super::test_helpers::{ahri_page, catalog, DOMINATION, PRECISION};
use crate::lcu::types::LcuPerkStyle;
use crate::runes::RuneCatalog;
use serde_json::json;

#[cfg(test)]
mod validation_tests {
  use super::*;

  /// Test: A legal page
  ///
  /// Scenario: Keystone, minors, secondary minors and shards all come from their rows.
  /// Expected: Valid.
  #[test]
  fn test_valid_page() {
    assert_eq!(catalog().validate(&ahri_page()), Ok(()));
    assert_eq!(ahri_page().perk_ids().len(), 9);
  }

  /// Test: Secondary path equals primary
  ///
  /// Scenario: Both paths are Domination.
  /// Expected: Rejected by the shape check, which needs no catalog.
  #[test]
  fn test_secondary_equal_to_primary() {
    let mut page = ahri_page();
    page.secondary_style_id = DOMINATION;
    let reason = page.check_shape().unwrap_err();
    assert!(reason.contains("same as the primary"));
    assert!(RuneCatalog::default().validate(&page).is_err());
  }

  /// Test: Rune choices outside their slots
  ///
  /// Scenario: A minor rune as keystone, a primary minor in the wrong row, two secondaries from one row.
  /// Expected: Each is rejected with a reason.
  #[test]
  fn test_runes_outside_their_slots() {
    let catalog = catalog();

    let mut wrong_keystone = ahri_page();
    wrong_keystone.keystone_id = 8126;
    wrong_keystone.primary_minor_ids = [8139, 8136, 8135];
    assert!(catalog.validate(&wrong_keystone).unwrap_err().contains("keystone"));

    let mut wrong_row = ahri_page();
    wrong_row.primary_minor_ids = [8136, 8126, 8135];
    assert!(catalog.validate(&wrong_row).is_err());

    let mut same_row = ahri_page();
    same_row.secondary_minor_ids = [9101, 9111];
    assert!(catalog
      .validate(&same_row)
      .unwrap_err()
      .contains("two different rows"));

    let mut foreign_secondary = ahri_page();
    foreign_secondary.secondary_minor_ids = [8139, 8014];
    assert!(catalog.validate(&foreign_secondary).is_err());

    let mut bad_shard = ahri_page();
    bad_shard.stat_mod_ids = [5001, 5008, 5001];
    assert!(catalog.validate(&bad_shard).unwrap_err().contains("stat shard"));
  }

  /// Test: Unknown paths and duplicates
  ///
  /// Scenario: A path id the catalog does not know, and a rune picked twice.
  /// Expected: Both rejected.
  #[test]
  fn test_unknown_path_and_duplicate_rune() {
    let mut unknown = ahri_page();
    unknown.secondary_style_id = 8400;
    assert!(catalog().validate(&unknown).unwrap_err().contains("unknown"));

    let mut duplicate = ahri_page();
    duplicate.secondary_minor_ids = [8126, 8014];
    assert!(duplicate.check_shape().unwrap_err().contains("twice"));
  }

  /// Test: Catalog built from client styles
  ///
  /// Scenario: Styles as returned by the perks endpoint, including an unknown slot type.
  /// Expected: Known slot types are mapped and the page validates.
  #[test]
  fn test_catalog_from_styles() {
    let styles: Vec<LcuPerkStyle> = serde_json::from_value(json!([
      {
        "id": DOMINATION, "name": "Domination",
        "slots": [
          { "type": "kKeyStone", "perks": [8112, 8124, 8128] },
          { "type": "kMixedRegularSplashable", "perks": [8126, 8139, 8143] },
          { "type": "kMixedRegularSplashable", "perks": [8136, 8120, 8138] },
          { "type": "kMixedRegularSplashable", "perks": [8135, 8105, 8106] },
          { "type": "kStatMod", "perks": [5008, 5005, 5007] },
          { "type": "kStatMod", "perks": [5008, 5002, 5003] },
          { "type": "kStatMod", "perks": [5001, 5002, 5003] },
          { "type": "kSomethingNew", "perks": [1] }
        ]
      },
      {
        "id": PRECISION, "name": "Precision",
        "slots": [
          { "type": "kKeyStone", "perks": [8005, 8021, 8010] },
          { "type": "kMixedRegularSplashable", "perks": [9101, 9111, 8009] },
          { "type": "kMixedRegularSplashable", "perks": [9104, 9105, 9103] },
          { "type": "kMixedRegularSplashable", "perks": [8014, 8017, 8299] }
        ]
      }
    ]))
    .unwrap();
    let catalog = RuneCatalog::from_styles(styles);
    assert_eq!(catalog.path(DOMINATION).unwrap().slots.len(), 7);
    assert_eq!(catalog.validate(&ahri_page()), Ok(()));
  }
}
