//! Token quoting for rendered command lines.
//!
//! All functions here are pure and testable without any I/O.

/// Characters that a shell would interpret if left bare.
const SPECIAL: &[char] = &['<', '>', '^', '|', '&', '(', ')', ';', '`'];

/// Returns true if `token` needs quoting to survive a shell unchanged.
pub fn needs_quoting(token: &str) -> bool {
    token
        .chars()
        .any(|c| c.is_whitespace() || SPECIAL.contains(&c))
}

/// Quote a token for a command line.
///
/// Tokens containing whitespace or any of `< > ^ | & ( ) ; `` ` are wrapped
/// in double quotes with embedded double quotes backslash-escaped. Every
/// other token is returned unchanged.
///
/// Must be applied exactly once per token: quoting an already-quoted token
/// escapes its quotes a second time.
///
/// # Examples
/// ```
/// # use magick_wrap::magick::format_token;
/// assert_eq!(format_token("64x64"), "64x64");
/// assert_eq!(format_token("white space"), "\"white space\"");
/// assert_eq!(format_token("6x6^"), "\"6x6^\"");
/// ```
pub fn format_token(token: &str) -> String {
    if needs_quoting(token) {
        format!("\"{}\"", token.replace('"', "\\\""))
    } else {
        token.to_string()
    }
}

/// Split a raw command-line fragment into arguments.
///
/// The inverse of [`format_token`]: words are separated by unquoted
/// whitespace, a `"..."` group is one argument (or part of one) with its
/// quotes removed, and `\"` inside a group is a literal quote. Nothing else
/// is special, so `#ff0000`, `it's` and `C:\dir` pass through unchanged.
/// An unterminated group runs to the end of the fragment.
///
/// # Examples
/// ```
/// # use magick_wrap::magick::split_fragment;
/// assert_eq!(
///     split_fragment(r#"-set comment "my favorite file""#),
///     ["-set", "comment", "my favorite file"]
/// );
/// ```
pub fn split_fragment(fragment: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = fragment.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            '\\' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
