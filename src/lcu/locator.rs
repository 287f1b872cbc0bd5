// League client discovery: install directory search and lockfile parsing

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::process::{registry_install_dir, running_process_dir, CLIENT_UX_PROCESS};
use super::types::{parse_lockfile, ClientEndpoint};

pub const LOCKFILE_NAMES: [&str; 3] = ["lockfile", "LeagueClientUx.lockfile", "LeagueClient.lockfile"];

// Common League of Legends installation paths on Windows
const DEFAULT_INSTALL_DIRS: [&str; 3] = [
  r"C:\Riot Games\League of Legends",
  r"C:\Program Files\Riot Games\League of Legends",
  r"C:\Program Files (x86)\Riot Games\League of Legends",
];

/// Finds a running client and its credentials. Holds only immutable search
/// configuration, so concurrent `locate` calls are safe.
#[derive(Debug, Clone, Default)]
pub struct ClientLocator {
  manual_path: Option<PathBuf>,
  probe_system: bool,
}

impl ClientLocator {
  pub fn new(manual_path: Option<PathBuf>) -> Self {
    Self {
      manual_path,
      probe_system: true,
    }
  }

  /// Only look at the manual path. Used when the caller knows exactly where
  /// the client lives (and in tests).
  pub fn manual_only(path: impl Into<PathBuf>) -> Self {
    Self {
      manual_path: Some(path.into()),
      probe_system: false,
    }
  }

  pub fn manual_path(&self) -> Option<&Path> {
    self.manual_path.as_deref()
  }

  /// Candidate install directories in search order, deduplicated.
  pub fn search_dirs(&self) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Some(manual) = &self.manual_path {
      dirs.push(manual.clone());
      // The user may have picked a parent folder such as "Riot Games"
      for entry in WalkDir::new(manual)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
      {
        if entry.path().join("LeagueClient.exe").exists()
          || LOCKFILE_NAMES.iter().any(|n| entry.path().join(n).exists())
        {
          dirs.push(entry.path().to_path_buf());
        }
      }
    }

    if self.probe_system {
      if let Some(dir) = running_process_dir(CLIENT_UX_PROCESS) {
        dirs.push(dir);
      }
      if let Some(dir) = registry_install_dir() {
        dirs.push(dir);
      }
      dirs.extend(DEFAULT_INSTALL_DIRS.iter().map(PathBuf::from));
    }

    let mut unique = Vec::with_capacity(dirs.len());
    for dir in dirs {
      if !unique.contains(&dir) {
        unique.push(dir);
      }
    }
    unique
  }

  /// Returns the first well-formed lockfile's endpoint. A missing or
  /// incomplete lockfile is the normal "client not running" state.
  pub fn locate(&self) -> Option<ClientEndpoint> {
    for dir in self.search_dirs() {
      if let Some(endpoint) = read_lockfile_in(&dir) {
        return Some(endpoint);
      }
    }
    None
  }

  /// Whether any lockfile exists, parseable or not.
  pub fn lockfiles_present(&self) -> bool {
    self
      .search_dirs()
      .iter()
      .any(|dir| LOCKFILE_NAMES.iter().any(|name| dir.join(name).exists()))
  }

  /// Directories worth watching for lockfile creation and removal.
  pub fn lockfile_watch_dirs(&self) -> Vec<PathBuf> {
    self
      .search_dirs()
      .into_iter()
      .filter(|dir| dir.is_dir())
      .collect()
  }
}

fn read_lockfile_in(dir: &Path) -> Option<ClientEndpoint> {
  for name in LOCKFILE_NAMES {
    let path = dir.join(name);
    // The client holds the file open; a failed read is treated like absence
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(_) => continue,
    };
    match parse_lockfile(&content) {
      Some(data) => return Some(ClientEndpoint::from_lockfile(data, path)),
      None => {
        tracing::debug!(
          "[Locator] Ignoring incomplete lockfile at {}",
          path.display()
        );
      }
    }
  }
  None
}

/// Riot Client (launcher) lockfile location. Status reporting only.
pub fn launcher_lockfile() -> Option<PathBuf> {
  let local = std::env::var("LOCALAPPDATA").ok()?;
  Some(
    PathBuf::from(local)
      .join("Riot Games")
      .join("Riot Client")
      .join("Config")
      .join("lockfile"),
  )
}

/// Validate that a directory looks like a League installation.
pub fn is_league_install(dir: &Path) -> bool {
  dir.join("LeagueClient.exe").exists() || dir.join("Game").join("League of Legends.exe").exists()
}
