use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, Output};
use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

pub(crate) fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner())
}

pub(crate) struct EnvVarGuard {
    key: &'static str,
    prev: Option<OsString>,
}

impl EnvVarGuard {
    pub(crate) fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let prev = std::env::var_os(key);
        unsafe {
            std::env::set_var(key, value);
        }
        Self { key, prev }
    }

    pub(crate) fn remove(key: &'static str) -> Self {
        let prev = std::env::var_os(key);
        unsafe {
            std::env::remove_var(key);
        }
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            unsafe {
                std::env::set_var(self.key, prev);
            }
        } else {
            unsafe {
                std::env::remove_var(self.key);
            }
        }
    }
}

pub(crate) fn run_git(repo_path: &Path, args: &[&str]) -> Output {
    Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .expect("git should spawn")
}

pub(crate) fn assert_git_success(repo_path: &Path, args: &[&str]) {
    let output = run_git(repo_path, args);
    if !output.status.success() {
        panic!(
            "git failed ({:?}):\nstdout:\n{}\nstderr:\n{}",
            args,
            String::from_utf8_lossy(&output.stdout).trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
}

/// A repository on `main` with one commit and a local identity.
pub(crate) fn init_repo(repo_path: &Path) {
    std::fs::create_dir_all(repo_path).expect("repo dir should be created");
    assert_git_success(repo_path, &["init", "--initial-branch=main"]);
    assert_git_success(repo_path, &["config", "user.email", "dev@example.test"]);
    assert_git_success(repo_path, &["config", "user.name", "Flotilla Tests"]);
    assert_git_success(repo_path, &["config", "commit.gpgsign", "false"]);
    commit_file(repo_path, "README.md", "hello\n", "initial commit");
}

pub(crate) fn commit_file(repo_path: &Path, name: &str, contents: &str, message: &str) {
    std::fs::write(repo_path.join(name), contents).expect("file should be written");
    assert_git_success(repo_path, &["add", name]);
    assert_git_success(repo_path, &["commit", "-m", message]);
}
