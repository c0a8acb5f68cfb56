use super::{CONTAINER_WORKSPACE, WorkstreamSnapshot, discard_worktree, step};
use crate::collaborators::Collaborators;
use crate::compensation::Compensations;
use crate::config::EngineConfig;
use anyhow::{Context as _, anyhow};
use flotilla_domain::{
    BRANCH_LABEL, BranchMode, ContainerConfig, CrashRecoveryRecord, GitClient, MANAGED_LABEL,
    Message, Mount, WORKSTREAM_LABEL, paths, uniquify_branch_name,
};
use std::path::{Path, PathBuf};

/// Agent config directory inside the container, backed by a per-container
/// host directory.
const CONTAINER_CONFIG_DIR: &str = "/home/agent/.claude";
const KEEPALIVE_COMMAND: [&str; 2] = ["sleep", "infinity"];

enum Outcome {
    Conflict {
        branch_name: String,
        info: String,
    },
    Started {
        branch_name: String,
        worktree_path: PathBuf,
        container_id: String,
    },
}

/// Resolves the branch, creates the worktree and starts the container.
///
/// Any failure after the worktree exists undoes the finished steps in reverse.
pub fn provision(
    deps: &Collaborators,
    config: &EngineConfig,
    workstream: &WorkstreamSnapshot,
    mode: BranchMode,
) -> Message {
    let workstream_id = workstream.id.clone();
    match provision_inner(deps, config, workstream, mode) {
        Ok(Outcome::Conflict { branch_name, info }) => {
            tracing::info!(workstream_id = %workstream_id, branch = %branch_name, "branch already exists");
            Message::BranchConflict {
                workstream_id,
                branch_name,
                info,
            }
        }
        Ok(Outcome::Started {
            branch_name,
            worktree_path,
            container_id,
        }) => {
            tracing::info!(
                workstream_id = %workstream_id,
                container_id = %container_id,
                branch = %branch_name,
                "workstream started"
            );
            Message::WorkstreamStarted {
                workstream_id,
                container_id,
                branch_name,
                worktree_path,
            }
        }
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(workstream_id = %workstream_id, error = %message, "provisioning failed");
            Message::ProvisionFailed {
                workstream_id,
                message,
            }
        }
    }
}

fn provision_inner(
    deps: &Collaborators,
    config: &EngineConfig,
    workstream: &WorkstreamSnapshot,
    mode: BranchMode,
) -> anyhow::Result<Outcome> {
    let git = deps.git.as_ref();
    let repo = config.repo.as_path();
    let requested = workstream.branch_name.trim().to_owned();
    if requested.is_empty() {
        return Err(anyhow!("branch name is empty"));
    }

    let from_existing = mode == BranchMode::UseExisting;
    let branch_name = match mode {
        BranchMode::New => {
            let exists = step(
                git.branch_exists(repo, &requested),
                format!("failed to check branch {requested}"),
            )?;
            if exists {
                let info = git.branch_info(repo, &requested).unwrap_or_else(|err| {
                    tracing::warn!(branch = %requested, error = %err, "failed to read branch info");
                    String::new()
                });
                return Ok(Outcome::Conflict {
                    branch_name: requested,
                    info,
                });
            }
            requested
        }
        BranchMode::UseExisting => requested,
        BranchMode::Uniquify {
            mut existing_branches,
        } => {
            match git.list_managed_branches(repo) {
                Ok(managed) => existing_branches.extend(managed),
                Err(err) => tracing::warn!(error = %err, "failed to list managed branches"),
            }
            step(
                uniquify_branch_name(&requested, &existing_branches, |candidate| {
                    git.branch_exists(repo, candidate)
                }),
                format!("failed to pick a free branch name for {requested}"),
            )?
        }
        BranchMode::Recreate => {
            recreate_branch(git, repo, &requested)?;
            requested
        }
    };

    std::fs::create_dir_all(&config.worktree_root).with_context(|| {
        format!(
            "failed to create worktree root {}",
            config.worktree_root.display()
        )
    })?;
    let worktree_path = paths::worktree_path(&config.worktree_root, &branch_name);
    if let Err(err) = discard_worktree(git, repo, &worktree_path) {
        tracing::debug!(path = %worktree_path.display(), error = %err, "stale worktree cleanup");
    }

    if from_existing {
        step(
            git.create_worktree_from_existing(repo, &worktree_path, &branch_name),
            format!("failed to create worktree for existing branch {branch_name}"),
        )?;
    } else {
        step(
            git.create_worktree(repo, &worktree_path, &branch_name),
            format!("failed to create worktree for {branch_name}"),
        )?;
    }

    let mut compensations = Compensations::new();
    {
        let worktree_path = worktree_path.clone();
        compensations.push("remove worktree", move || {
            discard_worktree(git, repo, &worktree_path)
        });
    }

    match launch_container(
        deps,
        config,
        workstream,
        &branch_name,
        &worktree_path,
        &mut compensations,
    ) {
        Ok(container_id) => {
            compensations.commit();
            Ok(Outcome::Started {
                branch_name,
                worktree_path,
                container_id,
            })
        }
        Err(err) => {
            compensations.rollback();
            Err(err)
        }
    }
}

/// Removes any worktree checked out on `branch`, then deletes the branch.
fn recreate_branch(git: &dyn GitClient, repo: &Path, branch: &str) -> anyhow::Result<()> {
    let existing = step(
        git.worktree_for_branch(repo, branch),
        format!("failed to look up worktree for {branch}"),
    )?;
    if let Some(path) = existing {
        step(
            discard_worktree(git, repo, &path),
            format!("failed to remove worktree {}", path.display()),
        )?;
    }
    if step(
        git.branch_exists(repo, branch),
        format!("failed to check branch {branch}"),
    )? {
        step(
            git.delete_branch(repo, branch),
            format!("failed to delete branch {branch}"),
        )?;
    }
    Ok(())
}

fn launch_container<'a>(
    deps: &'a Collaborators,
    config: &'a EngineConfig,
    workstream: &WorkstreamSnapshot,
    branch_name: &str,
    worktree_path: &Path,
    compensations: &mut Compensations<'a>,
) -> anyhow::Result<String> {
    let runtime = deps.runtime.as_ref();

    let config_dir = paths::container_config_dir(&config.containers_root, workstream.id.as_str());
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("failed to create config dir {}", config_dir.display()))?;
    if let Some(per_container) = config_dir.parent().map(Path::to_path_buf) {
        compensations.push("remove config dir", move || {
            std::fs::remove_dir_all(&per_container)
                .map_err(|err| format!("failed to delete {}: {err}", per_container.display()))
        });
    }

    let container_config = container_config(config, workstream, branch_name, worktree_path, config_dir);
    let container_id = step(
        runtime.create_container(&container_config),
        format!("failed to create container for {branch_name}"),
    )?;
    {
        let container_id = container_id.clone();
        compensations.push("remove container", move || {
            runtime.remove_container(&container_id)
        });
    }

    step(
        runtime.start_container(&container_id),
        format!("failed to start container {container_id}"),
    )?;

    // Bookkeeping only; the workstream label still ties the container to its workstream.
    if let Err(err) = deps.tracker.track(&CrashRecoveryRecord {
        container_id: container_id.clone(),
        workstream_id: workstream.id.as_str().to_owned(),
        branch_name: branch_name.to_owned(),
        path: worktree_path.to_path_buf(),
    }) {
        tracing::warn!(workstream_id = %workstream.id, container_id = %container_id, error = %err, "failed to track container");
    }

    Ok(container_id)
}

fn container_config(
    config: &EngineConfig,
    workstream: &WorkstreamSnapshot,
    branch_name: &str,
    worktree_path: &Path,
    config_dir: PathBuf,
) -> ContainerConfig {
    let git_dir = config.repo.join(".git");
    ContainerConfig {
        name: format!("flotilla-{}", workstream.id),
        image: config.image.clone(),
        workspace: Mount {
            source: worktree_path.to_path_buf(),
            target: CONTAINER_WORKSPACE.to_owned(),
            read_only: false,
        },
        git_dir: Mount {
            target: git_dir.to_string_lossy().into_owned(),
            source: git_dir,
            read_only: false,
        },
        config_dir: Mount {
            source: config_dir,
            target: CONTAINER_CONFIG_DIR.to_owned(),
            read_only: false,
        },
        working_dir: CONTAINER_WORKSPACE.to_owned(),
        env: vec![("CLAUDE_CONFIG_DIR".to_owned(), CONTAINER_CONFIG_DIR.to_owned())],
        labels: vec![
            (MANAGED_LABEL.to_owned(), "true".to_owned()),
            (WORKSTREAM_LABEL.to_owned(), workstream.id.as_str().to_owned()),
            (BRANCH_LABEL.to_owned(), branch_name.to_owned()),
        ],
        command: KEEPALIVE_COMMAND.iter().map(|s| (*s).to_owned()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_domain::WorkstreamId;

    #[test]
    fn container_config_mounts_worktree_git_dir_and_private_config() {
        let config = EngineConfig::new(PathBuf::from("/src/app"), PathBuf::from("/srv/flotilla"));
        let workstream = WorkstreamSnapshot {
            id: WorkstreamId::from_string("ws-1"),
            prompt: "fix it".to_owned(),
            branch_name: "fix-it".to_owned(),
            container_id: None,
            worktree_path: None,
            pairing: None,
            in_flight: false,
        };
        let worktree = PathBuf::from("/srv/flotilla/worktrees/fix-it");
        let config_dir = paths::container_config_dir(&config.containers_root, "ws-1");

        let cc = container_config(&config, &workstream, "fix-it", &worktree, config_dir.clone());
        assert_eq!(cc.name, "flotilla-ws-1");
        assert_eq!(cc.workspace.source, worktree);
        assert_eq!(cc.workspace.target, "/workspace");
        assert_eq!(cc.git_dir.source, PathBuf::from("/src/app/.git"));
        assert_eq!(cc.git_dir.target, "/src/app/.git");
        assert_eq!(cc.config_dir.source, config_dir);
        assert!(cc.labels.contains(&(MANAGED_LABEL.to_owned(), "true".to_owned())));
        assert!(cc.labels.contains(&(WORKSTREAM_LABEL.to_owned(), "ws-1".to_owned())));
        assert!(cc.labels.contains(&(BRANCH_LABEL.to_owned(), "fix-it".to_owned())));
        assert_eq!(cc.command, vec!["sleep", "infinity"]);
    }
}
