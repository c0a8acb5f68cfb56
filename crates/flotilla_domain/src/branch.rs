const FIRST_SUFFIX: u32 = 2;
const MAX_SUFFIX: u32 = 10_000;

/// Finds the first `<base>-N` (N starting at 2) that is neither in
/// `existing_branches` nor reported by `exists_in_repo`.
pub fn uniquify_branch_name(
    base: &str,
    existing_branches: &[String],
    mut exists_in_repo: impl FnMut(&str) -> Result<bool, String>,
) -> Result<String, String> {
    for suffix in FIRST_SUFFIX..=MAX_SUFFIX {
        let candidate = format!("{base}-{suffix}");
        if existing_branches.iter().any(|b| b == &candidate) {
            continue;
        }
        if exists_in_repo(&candidate)? {
            continue;
        }
        return Ok(candidate);
    }

    Err(format!(
        "no free branch name for {base:?} after {MAX_SUFFIX} attempts"
    ))
}

/// First line of the prompt, trimmed and cut to `max_chars`.
pub fn summarize_prompt(prompt: &str, max_chars: usize) -> String {
    let first_line = prompt.lines().map(str::trim).find(|l| !l.is_empty());
    let Some(line) = first_line else {
        return String::new();
    };
    if line.chars().count() <= max_chars {
        return line.to_owned();
    }
    let mut out = line
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn uniquify_skips_names_from_the_supplied_list() {
        let existing = names(&["f", "f-2"]);
        let name = uniquify_branch_name("f", &existing, |_| Ok(false)).unwrap();
        assert_eq!(name, "f-3");
    }

    #[test]
    fn uniquify_skips_names_present_in_the_repository() {
        let name = uniquify_branch_name("feat", &[], |candidate| {
            Ok(candidate == "feat-2" || candidate == "feat-3")
        })
        .unwrap();
        assert_eq!(name, "feat-4");
    }

    #[test]
    fn uniquify_result_is_absent_from_both_sources() {
        let existing = names(&["x-2", "x-4"]);
        let in_repo = ["x-3", "x-5"];
        let name =
            uniquify_branch_name("x", &existing, |candidate| Ok(in_repo.contains(&candidate)))
                .unwrap();
        assert_eq!(name, "x-6");
        assert!(!existing.contains(&name));
        assert!(!in_repo.contains(&name.as_str()));
    }

    #[test]
    fn uniquify_propagates_repository_errors() {
        let err = uniquify_branch_name("f", &[], |_| Err("git exploded".to_owned()))
            .expect_err("repository error should surface");
        assert_eq!(err, "git exploded");
    }

    #[test]
    fn summarize_prompt_takes_first_non_empty_line() {
        assert_eq!(summarize_prompt("\n  fix the login page \nmore", 72), "fix the login page");
        assert_eq!(summarize_prompt("", 72), "");
        assert_eq!(summarize_prompt("abcdefghij", 6), "abc...");
    }
}
