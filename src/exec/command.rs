// src/exec/command.rs

//! Building the child process command for a script.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::registry::Params;

/// How to launch scripts, resolved from configuration.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Interpreter used for `.py` scripts.
    pub python: String,
    /// Working directory override; defaults to the script's directory.
    pub working_dir: Option<PathBuf>,
}

impl Default for LaunchSpec {
    fn default() -> Self {
        Self {
            python: default_python().to_string(),
            working_dir: None,
        }
    }
}

pub fn default_python() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

/// Program and leading arguments for a script, chosen by extension.
pub fn interpreter_for(script: &Path, spec: &LaunchSpec) -> (String, Vec<String>) {
    let ext = script
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let path = script.to_string_lossy().into_owned();

    match ext.as_str() {
        "py" => (spec.python.clone(), vec!["-u".to_string(), path]),
        "sh" => ("sh".to_string(), vec![path]),
        "bat" | "cmd" => ("cmd".to_string(), vec!["/C".to_string(), path]),
        "ps1" => (
            "powershell".to_string(),
            vec!["-ExecutionPolicy".into(), "Bypass".into(), "-File".into(), path],
        ),
        _ => (path, Vec::new()),
    }
}

/// `--key value` pairs in key order.
pub fn param_args(params: &Params) -> Vec<String> {
    params
        .iter()
        .flat_map(|(k, v)| [format!("--{k}"), v.clone()])
        .collect()
}

/// Build the command: unbuffered UTF-8 output, piped stdout/stderr, own
/// process group on Unix, no console window on Windows.
pub fn build_command(script: &Path, params: &Params, spec: &LaunchSpec) -> Command {
    // The child may run in another directory, so never hand it a relative path.
    let script = std::path::absolute(script).unwrap_or_else(|_| script.to_path_buf());
    let script = script.as_path();
    let (program, mut args) = interpreter_for(script, spec);
    args.extend(param_args(params));

    let mut cmd = Command::new(program);
    cmd.args(&args)
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONIOENCODING", "utf-8")
        .env("PYTHONUTF8", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let dir = spec
        .working_dir
        .clone()
        .or_else(|| script.parent().filter(|p| !p.as_os_str().is_empty()).map(Path::to_path_buf));
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd
}
