// Runes module - desired pages, catalog validation and the page applier

mod applier;
mod page;

#[cfg(test)]
mod tests;

pub use applier::{
  page_path, ApplyMode, ApplyOutcome, RunePageApplier, CURRENT_SUMMONER_PATH, INVENTORY_PATH,
  PAGES_PATH,
};
pub use page::{RuneCatalog, RunePage, RunePath, RuneSlot, SlotKind, STYLES_PATH};
