// Process probing for the launcher and the League client

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

pub const CLIENT_UX_PROCESS: &str = "LeagueClientUx";
pub const LAUNCHER_PROCESS: &str = "RiotClientServices";

pub(crate) fn hidden_command(program: &str) -> Command {
  #[allow(unused_mut)]
  let mut command = Command::new(program);
  #[cfg(target_os = "windows")]
  command.creation_flags(CREATE_NO_WINDOW);
  command
}

/// Names of every running process, lower-cased and without `.exe`.
fn running_process_names() -> Vec<String> {
  #[cfg(target_os = "windows")]
  let output = hidden_command("tasklist").args(["/FO", "CSV", "/NH"]).output();
  #[cfg(not(target_os = "windows"))]
  let output = hidden_command("ps").args(["-A", "-o", "comm="]).output();

  let output = match output {
    Ok(out) if out.status.success() => out,
    Ok(_) | Err(_) => return Vec::new(),
  };

  String::from_utf8_lossy(&output.stdout)
    .lines()
    .filter_map(|line| {
      // tasklist CSV: "Name.exe","PID",...
      let first = line.split(',').next()?.trim().trim_matches('"');
      let name = first.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(first);
      let name = name.trim_end_matches(".exe").trim_end_matches(".EXE");
      if name.is_empty() {
        None
      } else {
        Some(name.to_lowercase())
      }
    })
    .collect()
}

pub fn is_process_running(name: &str) -> bool {
  let wanted = name.to_lowercase();
  running_process_names().iter().any(|n| *n == wanted)
}

/// Directory of a running process' executable, when the platform exposes it.
pub fn running_process_dir(name: &str) -> Option<PathBuf> {
  #[cfg(target_os = "windows")]
  {
    let filter = format!("name='{}.exe'", name);
    let output = hidden_command("wmic")
      .args(["process", "where", filter.as_str(), "get", "ExecutablePath"])
      .output()
      .ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
      let line = line.trim();
      if line.is_empty() || line.to_lowercase().contains("executablepath") {
        continue;
      }
      if let Some(parent) = PathBuf::from(line).parent() {
        return Some(parent.to_path_buf());
      }
    }
    None
  }

  #[cfg(not(target_os = "windows"))]
  {
    let _ = name;
    None
  }
}

/// Install location recorded by the Riot installer in the registry.
pub fn registry_install_dir() -> Option<PathBuf> {
  #[cfg(target_os = "windows")]
  {
    let output = hidden_command("powershell")
      .args([
        "-NoProfile",
        "-Command",
        r#"Get-ItemProperty -Path 'HKLM:\SOFTWARE\WOW6432Node\Riot Games, Inc\League of Legends' -Name 'Location' -ErrorAction SilentlyContinue | Select-Object -ExpandProperty Location"#,
      ])
      .output()
      .ok()?;
    if !output.status.success() {
      return None;
    }
    let path = String::from_utf8(output.stdout).ok()?;
    let path = path.trim();
    if path.is_empty() {
      None
    } else {
      Some(PathBuf::from(path))
    }
  }

  #[cfg(not(target_os = "windows"))]
  {
    None
  }
}
