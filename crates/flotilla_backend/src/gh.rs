use crate::process::run_command;
use anyhow::{Context as _, anyhow};
use flotilla_domain::{CreatedPullRequest, PullRequestDraft, PullRequestHost};
use std::path::{Path, PathBuf};

/// [`PullRequestHost`] backed by the GitHub CLI.
#[derive(Clone, Debug)]
pub struct GhCli {
    binary: PathBuf,
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new(PathBuf::from("gh"))
    }
}

/// `gh pr create` prints the new pull request URL as its last line.
fn parse_created_pull_request(out: &str) -> anyhow::Result<CreatedPullRequest> {
    let url = out
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with("http"))
        .ok_or_else(|| anyhow!("gh did not print a pull request url: {out}"))?;

    let number = url
        .trim_end_matches('/')
        .rsplit_once("/pull/")
        .map(|(_, tail)| tail)
        .and_then(|tail| tail.split(['/', '#', '?']).next())
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| anyhow!("cannot read pull request number from {url}"))?;

    Ok(CreatedPullRequest {
        url: url.to_owned(),
        number,
    })
}

impl GhCli {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

impl PullRequestHost for GhCli {
    fn create_pull_request(
        &self,
        repo: &Path,
        draft: &PullRequestDraft,
    ) -> Result<CreatedPullRequest, String> {
        let result: anyhow::Result<CreatedPullRequest> = (|| {
            let out = run_command(
                self.binary.as_os_str(),
                Some(repo),
                [
                    "pr",
                    "create",
                    "--title",
                    draft.title.as_str(),
                    "--body",
                    draft.body.as_str(),
                ],
            )
            .context("failed to create pull request")?;
            parse_created_pull_request(&out)
        })();
        result.map_err(|e| format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_and_number() {
        let out = "Creating pull request for feature-x into main\n\nhttps://github.com/acme/app/pull/42\n";
        let created = parse_created_pull_request(out).unwrap();
        assert_eq!(created.url, "https://github.com/acme/app/pull/42");
        assert_eq!(created.number, 42);
    }

    #[test]
    fn rejects_output_without_a_pull_url() {
        let err = parse_created_pull_request("https://github.com/acme/app/issues/3")
            .expect_err("issue url is not a pull request");
        assert!(format!("{err:#}").contains("cannot read pull request number"));
        assert!(parse_created_pull_request("nothing here").is_err());
    }
}
