// Key binding injection per champion

mod ini;
mod injector;
mod profile;

#[cfg(test)]
mod tests;

pub use ini::{patch_ini, write_atomically};
pub use injector::{input_ini_path, BindingInjector, InjectOutcome, InjectVia, INPUT_SETTINGS_PATH};
pub use profile::{by_section, BindingItem, BindingProfiles, ChampionBindingSettings, DEFAULT_SECTION};
