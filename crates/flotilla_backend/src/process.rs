use anyhow::{Context as _, anyhow};
use std::{ffi::OsStr, path::Path, process::Command};

/// Runs `program` to completion and returns its trimmed stdout.
pub(crate) fn run_command<I, S>(program: &OsStr, cwd: Option<&Path>, args: I) -> anyhow::Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    let name = program.to_string_lossy();
    let output = command
        .output()
        .with_context(|| format!("failed to spawn {name}"))?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "{name} failed ({}):\nstdout:\n{}\nstderr:\n{}",
            output.status,
            stdout.trim(),
            stderr.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

/// Like [`run_command`], but keeps stderr. For tools that write their
/// payload to both streams.
pub(crate) fn run_command_combined<I, S>(program: &OsStr, args: I) -> anyhow::Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.to_string_lossy();
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to spawn {name}"))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        return Err(anyhow!(
            "{name} failed ({}): {}",
            output.status,
            combined.trim()
        ));
    }
    Ok(combined)
}

/// Exit status only; spawn failures count as `false`.
pub(crate) fn command_succeeds<I, S>(program: &OsStr, cwd: &Path, args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
