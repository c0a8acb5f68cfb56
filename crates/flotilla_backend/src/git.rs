use crate::process::{command_succeeds, run_command};
use anyhow::{Context as _, anyhow};
use flotilla_domain::GitClient;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const GIT: &str = "git";
const MAIN_BRANCH_CANDIDATES: [&str; 2] = ["main", "master"];
const BRANCH_INFO_LOG_LIMIT: &str = "10";
const PAIRING_STASH_MESSAGE: &str = "flotilla pairing";

/// [`GitClient`] backed by the `git` executable.
#[derive(Clone, Debug)]
pub struct GitCli {
    worktree_root: PathBuf,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct WorktreeEntry {
    path: PathBuf,
    branch: Option<String>,
}

fn parse_worktree_list(porcelain: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    for line in porcelain.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.push(WorktreeEntry {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(reference) = line.strip_prefix("branch ") {
            if let Some(entry) = entries.last_mut() {
                let name = reference.strip_prefix("refs/heads/").unwrap_or(reference);
                entry.branch = Some(name.to_owned());
            }
        }
    }
    entries
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("invalid path: {}", path.display()))
}

fn canonical_or_self(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl GitCli {
    pub fn new(worktree_root: PathBuf) -> Self {
        Self { worktree_root }
    }

    pub fn worktree_root(&self) -> &Path {
        &self.worktree_root
    }

    fn run_git<I, S>(&self, repo_path: &Path, args: I) -> anyhow::Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_command(OsStr::new(GIT), Some(repo_path), args)
    }

    fn select_remote(&self, repo_path: &Path) -> anyhow::Result<String> {
        let out = self.run_git(repo_path, ["remote"])?;
        let remotes = out
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        if remotes.contains(&"origin") {
            return Ok("origin".to_owned());
        }

        if remotes.len() == 1 {
            return Ok(remotes[0].to_owned());
        }

        Err(anyhow!("cannot select remote: found {:?}", remotes))
    }

    fn main_branch(&self, repo_path: &Path) -> anyhow::Result<&'static str> {
        MAIN_BRANCH_CANDIDATES
            .into_iter()
            .find(|candidate| self.has_local_branch(repo_path, candidate))
            .ok_or_else(|| anyhow!("repository has no main or master branch"))
    }

    fn has_local_branch(&self, repo_path: &Path, branch: &str) -> bool {
        let branch_ref = format!("refs/heads/{branch}");
        command_succeeds(
            OsStr::new(GIT),
            repo_path,
            ["show-ref", "--verify", "--quiet", &branch_ref],
        )
    }

    fn worktrees(&self, repo_path: &Path) -> anyhow::Result<Vec<WorktreeEntry>> {
        let out = self
            .run_git(repo_path, ["worktree", "list", "--porcelain"])
            .context("failed to list worktrees")?;
        Ok(parse_worktree_list(&out))
    }

    fn commits_ahead(&self, repo_path: &Path, base: &str, branch: &str) -> anyhow::Result<u64> {
        let out = self
            .run_git(repo_path, ["rev-list", "--count", &format!("{base}..{branch}")])
            .with_context(|| format!("failed to count commits on {branch}"))?;
        out.trim()
            .parse::<u64>()
            .with_context(|| format!("unexpected rev-list output: {out}"))
    }

    fn create_worktree_internal(
        &self,
        repo_path: &Path,
        path: &Path,
        branch: Option<&str>,
        existing: &str,
    ) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let path_arg = path_str(path)?;
        let result = match branch {
            Some(new_branch) => {
                self.run_git(repo_path, ["worktree", "add", "-b", new_branch, path_arg])
            }
            None => self.run_git(repo_path, ["worktree", "add", path_arg, existing]),
        };
        result.with_context(|| format!("failed to create worktree at {}", path.display()))?;
        Ok(())
    }

    fn remove_worktree_internal(&self, repo_path: &Path, path: &Path) -> anyhow::Result<()> {
        if !path.exists() {
            self.run_git(repo_path, ["worktree", "prune"])
                .context("failed to prune worktrees")?;
            return Ok(());
        }
        self.run_git(repo_path, ["worktree", "remove", "--force", path_str(path)?])
            .with_context(|| format!("failed to remove worktree at {}", path.display()))?;
        Ok(())
    }

    fn branch_info_internal(&self, repo_path: &Path, branch: &str) -> anyhow::Result<String> {
        let log = self
            .run_git(
                repo_path,
                ["log", "--oneline", "-n", BRANCH_INFO_LOG_LIMIT, branch],
            )
            .with_context(|| format!("failed to read log of {branch}"))?;

        let mut out = format!("Branch {branch}\n\nRecent commits:\n{log}\n");
        if let Ok(base) = self.main_branch(repo_path) {
            if base != branch {
                let ahead = self.commits_ahead(repo_path, base, branch)?;
                let stat = self
                    .run_git(repo_path, ["diff", "--stat", &format!("{base}...{branch}")])
                    .unwrap_or_default();
                out.push_str(&format!("\n{ahead} commit(s) ahead of {base}\n"));
                if !stat.is_empty() {
                    out.push_str(&stat);
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }

    fn merge_into_main_internal(&self, repo_path: &Path, branch: &str) -> anyhow::Result<()> {
        let base = self.main_branch(repo_path)?;
        let current = self.current_branch_internal(repo_path)?;
        if current != base {
            return Err(anyhow!(
                "{} is on {current}; check out {base} to merge",
                repo_path.display()
            ));
        }
        self.run_git(repo_path, ["merge", "--no-ff", "--no-edit", branch])
            .with_context(|| format!("failed to merge {branch} into {base}"))?;
        Ok(())
    }

    fn current_branch_internal(&self, repo_path: &Path) -> anyhow::Result<String> {
        let branch = self
            .run_git(repo_path, ["rev-parse", "--abbrev-ref", "HEAD"])
            .context("failed to resolve current branch")?;
        if branch.is_empty() || branch == "HEAD" {
            return Err(anyhow!("repository is not on a branch"));
        }
        Ok(branch)
    }

    fn list_managed_branches_internal(&self, repo_path: &Path) -> anyhow::Result<Vec<String>> {
        let root = canonical_or_self(&self.worktree_root);
        Ok(self
            .worktrees(repo_path)?
            .into_iter()
            .filter(|entry| {
                entry.path.starts_with(&self.worktree_root)
                    || canonical_or_self(&entry.path).starts_with(&root)
            })
            .filter_map(|entry| entry.branch)
            .collect())
    }
}

impl GitClient for GitCli {
    fn create_and_checkout(&self, repo: &Path, branch: &str) -> Result<(), String> {
        self.run_git(repo, ["checkout", "-b", branch])
            .map(|_| ())
            .with_context(|| format!("failed to create branch {branch}"))
            .map_err(|e| format!("{e:#}"))
    }

    fn create_worktree(&self, repo: &Path, path: &Path, branch: &str) -> Result<(), String> {
        self.create_worktree_internal(repo, path, Some(branch), "")
            .map_err(|e| format!("{e:#}"))
    }

    fn create_worktree_from_existing(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
    ) -> Result<(), String> {
        self.create_worktree_internal(repo, path, None, branch)
            .map_err(|e| format!("{e:#}"))
    }

    fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<(), String> {
        self.remove_worktree_internal(repo, path)
            .map_err(|e| format!("{e:#}"))
    }

    fn worktree_for_branch(&self, repo: &Path, branch: &str) -> Result<Option<PathBuf>, String> {
        self.worktrees(repo)
            .map(|entries| {
                entries
                    .into_iter()
                    .find(|entry| entry.branch.as_deref() == Some(branch))
                    .map(|entry| entry.path)
            })
            .map_err(|e| format!("{e:#}"))
    }

    fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, String> {
        if !repo.exists() {
            return Err(format!("repository not found: {}", repo.display()));
        }
        Ok(self.has_local_branch(repo, branch))
    }

    fn branch_has_commits(&self, repo: &Path, branch: &str) -> Result<bool, String> {
        let result: anyhow::Result<bool> = (|| {
            let base = self.main_branch(repo)?;
            if base == branch {
                return Ok(true);
            }
            Ok(self.commits_ahead(repo, base, branch)? > 0)
        })();
        result.map_err(|e| format!("{e:#}"))
    }

    fn branch_info(&self, repo: &Path, branch: &str) -> Result<String, String> {
        self.branch_info_internal(repo, branch)
            .map_err(|e| format!("{e:#}"))
    }

    fn delete_branch(&self, repo: &Path, branch: &str) -> Result<(), String> {
        self.run_git(repo, ["branch", "-D", branch])
            .map(|_| ())
            .with_context(|| format!("failed to delete branch {branch}"))
            .map_err(|e| format!("{e:#}"))
    }

    fn push(&self, repo: &Path, branch: &str) -> Result<(), String> {
        let result: anyhow::Result<()> = (|| {
            let remote = self.select_remote(repo)?;
            self.run_git(repo, ["push", "-u", remote.as_str(), branch])
                .with_context(|| format!("failed to push {branch} to {remote}"))?;
            Ok(())
        })();
        result.map_err(|e| format!("{e:#}"))
    }

    fn checkout(&self, repo: &Path, branch: &str) -> Result<(), String> {
        self.run_git(repo, ["checkout", "--ignore-other-worktrees", branch])
            .map(|_| ())
            .with_context(|| format!("failed to check out {branch}"))
            .map_err(|e| format!("{e:#}"))
    }

    fn current_branch(&self, repo: &Path) -> Result<String, String> {
        self.current_branch_internal(repo)
            .map_err(|e| format!("{e:#}"))
    }

    fn stash(&self, repo: &Path) -> Result<(), String> {
        self.run_git(
            repo,
            ["stash", "push", "--include-untracked", "-m", PAIRING_STASH_MESSAGE],
        )
        .map(|_| ())
        .context("failed to stash local changes")
        .map_err(|e| format!("{e:#}"))
    }

    fn stash_pop(&self, repo: &Path) -> Result<(), String> {
        self.run_git(repo, ["stash", "pop"])
            .map(|_| ())
            .context("failed to pop stash")
            .map_err(|e| format!("{e:#}"))
    }

    fn has_uncommitted_changes(&self, repo: &Path) -> Result<bool, String> {
        self.run_git(repo, ["status", "--porcelain"])
            .map(|out| !out.is_empty())
            .context("failed to read status")
            .map_err(|e| format!("{e:#}"))
    }

    fn commit_all(&self, repo: &Path, message: &str) -> Result<(), String> {
        let result: anyhow::Result<()> = (|| {
            self.run_git(repo, ["add", "-A"])
                .context("failed to stage changes")?;
            self.run_git(repo, ["commit", "-m", message])
                .context("failed to commit changes")?;
            Ok(())
        })();
        result.map_err(|e| format!("{e:#}"))
    }

    fn merge_into_main(&self, repo: &Path, branch: &str) -> Result<(), String> {
        self.merge_into_main_internal(repo, branch)
            .map_err(|e| format!("{e:#}"))
    }

    fn list_managed_branches(&self, repo: &Path) -> Result<Vec<String>, String> {
        self.list_managed_branches_internal(repo)
            .map_err(|e| format!("{e:#}"))
    }
}
