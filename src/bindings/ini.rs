// input.ini patching

use std::collections::{BTreeMap, HashSet};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{PilotError, Result};

fn section_name(line: &str) -> Option<&str> {
  let trimmed = line.trim();
  trimmed
    .strip_prefix('[')
    .and_then(|rest| rest.strip_suffix(']'))
    .map(str::trim)
}

fn key_of(line: &str) -> Option<&str> {
  let trimmed = line.trim_start();
  if trimmed.starts_with(';') || trimmed.starts_with('#') {
    return None;
  }
  trimmed.split_once('=').map(|(key, _)| key.trim())
}

/// Apply `updates` (section -> action -> key) to INI text.
///
/// Existing keys are replaced in place, missing keys are appended at the end of
/// their section and missing sections are appended to the file. Lines the
/// update does not touch, comments included, are kept as they are.
pub fn patch_ini(content: &str, updates: &BTreeMap<String, BTreeMap<String, String>>) -> String {
  let mut out: Vec<String> = Vec::new();
  let mut written: HashSet<(String, String)> = HashSet::new();
  let mut seen_sections: HashSet<String> = HashSet::new();
  let mut current: Option<String> = None;

  let flush_missing = |section: &Option<String>, out: &mut Vec<String>, written: &mut HashSet<(String, String)>| {
    let Some(section) = section else { return };
    let Some(keys) = updates.get(section) else { return };
    // Keep appended keys above the blank lines that separate sections
    let mut insert_at = out.len();
    while insert_at > 0 && out[insert_at - 1].trim().is_empty() {
      insert_at -= 1;
    }
    for (action, key) in keys {
      if written.insert((section.clone(), action.clone())) {
        out.insert(insert_at, format!("{}={}", action, key));
        insert_at += 1;
      }
    }
  };

  for line in content.lines() {
    if let Some(name) = section_name(line) {
      flush_missing(&current, &mut out, &mut written);
      current = Some(name.to_string());
      seen_sections.insert(name.to_string());
      out.push(line.to_string());
      continue;
    }
    if let (Some(section), Some(key)) = (&current, key_of(line)) {
      if let Some(value) = updates.get(section).and_then(|keys| keys.get(key)) {
        if written.insert((section.clone(), key.to_string())) {
          out.push(format!("{}={}", key, value));
        }
        continue;
      }
    }
    out.push(line.to_string());
  }
  flush_missing(&current, &mut out, &mut written);

  for (section, keys) in updates {
    if seen_sections.contains(section) || keys.is_empty() {
      continue;
    }
    if out.last().is_some_and(|l| !l.trim().is_empty()) {
      out.push(String::new());
    }
    out.push(format!("[{}]", section));
    for (action, key) in keys {
      out.push(format!("{}={}", action, key));
    }
  }

  let mut text = out.join("\n");
  text.push('\n');
  text
}

/// Replace `path` with `content` through a temp file in the same directory so
/// readers never see a partial write. The temp file is removed on every
/// failure path when it is dropped.
pub fn write_atomically(path: &Path, content: &str) -> Result<()> {
  let dir = match path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  };
  let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
  {
    let mut writer = BufWriter::new(tmp.as_file_mut());
    writer.write_all(content.as_bytes())?;
    writer.flush()?;
  }
  tmp.as_file().sync_all()?;
  tmp.persist(path).map_err(|e| PilotError::Io(e.error))?;
  Ok(())
}
