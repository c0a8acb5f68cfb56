/// Escapes `input` for use inside a double-quoted POSIX shell word.
///
/// Backslashes, double quotes, backticks and `$` are backslash-escaped, line
/// breaks collapse to a single space and NUL bytes are dropped.
pub fn escape_double_quoted(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\0' => {}
            '\\' | '"' | '`' | '$' => {
                out.push('\\');
                out.push(ch);
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    let _ = chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}
