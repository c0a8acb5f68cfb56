const MAX_SLUG_WORDS: usize = 6;
const FALLBACK_BRANCH: &str = "workstream";

/// Branch-safe slug from the first words of a prompt.
pub(super) fn branch_slug(prompt: &str) -> String {
    let mut out = String::with_capacity(prompt.len().min(64));
    let mut prev_dash = false;
    let mut words = 0usize;

    for ch in prompt.chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            _ => None,
        };

        match mapped {
            Some(ch) => {
                out.push(ch);
                prev_dash = false;
            }
            None => {
                if !prev_dash && !out.is_empty() {
                    words += 1;
                    if words >= MAX_SLUG_WORDS {
                        break;
                    }
                    out.push('-');
                    prev_dash = true;
                }
            }
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.is_empty() {
        FALLBACK_BRANCH.to_owned()
    } else {
        out
    }
}
