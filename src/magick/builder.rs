//! Command-line argument builder.
//!
//! [`ArgBuilder`] collects the tokens of a single engine invocation in
//! call order. Tokens remember whether they are trusted literals, values
//! that need quoting, or file paths, so quoting is applied exactly once:
//! when the line is rendered for display. Execution uses [`ArgBuilder::to_args`],
//! which hands the values to the process unquoted, one argument each.
//!
//! ```
//! # use magick_wrap::magick::ArgBuilder;
//! let mut b = ArgBuilder::new();
//! b.add_file("source.jpg")
//!     .minus("crop", ["250x250+0+0"])
//!     .plus("repage", [] as [&str; 0])
//!     .minus("set", ["comment", "my favorite file"])
//!     .add_file("dest.jpg");
//! assert_eq!(
//!     b.render(),
//!     r#"source.jpg -crop 250x250+0+0 +repage -set comment "my favorite file" dest.jpg"#
//! );
//! ```

use super::blob::TempBlob;
use super::quote::{format_token, split_fragment};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Prefix of an engine option.
///
/// Most ImageMagick options have a `-name` form and a `+name` form, where
/// the plus form usually resets or negates the setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Minus,
    Plus,
}

impl Sign {
    fn prefix(self) -> char {
        match self {
            Sign::Minus => '-',
            Sign::Plus => '+',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Trusted literal, inserted verbatim.
    Raw(String),
    /// Data-derived value, quoted on render.
    Formatted(String),
    /// Filename, quoted on render and passed through as an OS path.
    File(PathBuf),
}

/// Ordered token list for one engine invocation.
///
/// Flag names are not validated; any string is accepted.
#[derive(Debug, Default)]
pub struct ArgBuilder {
    tokens: Vec<Token>,
    blobs: Vec<TempBlob>,
}

impl ArgBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trusted fragment with no quoting.
    ///
    /// The fragment may hold several whitespace-separated words; they are
    /// split into separate arguments at execution time, keeping each
    /// `"..."` group together as it reads in [`render`](Self::render).
    pub fn append_raw(&mut self, fragment: impl Into<String>) -> &mut Self {
        self.tokens.push(Token::Raw(fragment.into()));
        self
    }

    /// Append each fragment as its own raw token.
    pub fn append_raw_all<I, S>(&mut self, fragments: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens
            .extend(fragments.into_iter().map(|f| Token::Raw(f.into())));
        self
    }

    /// Append a filename.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.tokens.push(Token::File(path.as_ref().to_path_buf()));
        self
    }

    /// Append several filenames in order.
    pub fn add_files<I, P>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.add_file(path);
        }
        self
    }

    /// Write `data` to a temp file and append its path.
    ///
    /// The temp file is owned by the builder and removed when the builder
    /// is dropped.
    pub fn add_blob(&mut self, data: &[u8]) -> io::Result<&mut Self> {
        let blob = TempBlob::materialize(data)?;
        self.tokens.push(Token::File(blob.path().to_path_buf()));
        self.blobs.push(blob);
        Ok(self)
    }

    /// Append `-name` or `+name` followed by its quoted arguments.
    pub fn flag<I, S>(&mut self, sign: Sign, name: &str, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tokens
            .push(Token::Raw(format!("{}{}", sign.prefix(), name)));
        self.tokens.extend(
            args.into_iter()
                .map(|a| Token::Formatted(a.as_ref().to_string())),
        );
        self
    }

    /// Shorthand for `flag(Sign::Minus, ..)`.
    pub fn minus<I, S>(&mut self, name: &str, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.flag(Sign::Minus, name, args)
    }

    /// Shorthand for `flag(Sign::Plus, ..)`.
    pub fn plus<I, S>(&mut self, name: &str, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.flag(Sign::Plus, name, args)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Render the command line, quoting formatted and file tokens.
    pub fn render(&self) -> String {
        self.tokens
            .iter()
            .map(|t| match t {
                Token::Raw(s) => s.clone(),
                Token::Formatted(s) => format_token(s),
                Token::File(p) => format_token(&p.to_string_lossy()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lower the tokens to an argument vector for direct execution.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            match token {
                Token::Raw(s) => args.extend(split_fragment(s).into_iter().map(OsString::from)),
                Token::Formatted(s) => args.push(OsString::from(s)),
                Token::File(p) => args.push(p.clone().into_os_string()),
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_ARGS: [&str; 0] = [];

    #[test]
    fn bare_flags_render_in_order() {
        let mut b = ArgBuilder::new();
        b.minus("strip", NO_ARGS).minus("repage", NO_ARGS);
        assert_eq!(b.render(), "-strip -repage");
    }

    #[test]
    fn plus_sign_is_explicit() {
        let mut b = ArgBuilder::new();
        b.minus("repage", NO_ARGS).plus("repage", NO_ARGS);
        assert_eq!(b.render(), "-repage +repage");
    }

    #[test]
    fn raw_data_is_inserted_as_is() {
        let mut b = ArgBuilder::new();
        b.minus("opt1", NO_ARGS)
            .append_raw("a ! b !")
            .minus("opt2", NO_ARGS);
        assert_eq!(b.render(), "-opt1 a ! b ! -opt2");
    }

    #[test]
    fn raw_sequence_is_separate_tokens() {
        let mut b = ArgBuilder::new();
        b.append_raw_all(["leave this data", "alone"]);
        assert_eq!(b.render(), "leave this data alone");
        assert_eq!(b.to_args(), ["leave", "this", "data", "alone"]);
    }

    #[test]
    fn raw_quoted_group_is_one_argument() {
        let mut b = ArgBuilder::new();
        b.append_raw(r#"source.jpg -set comment "my favorite file" dest.jpg"#);
        assert_eq!(
            b.render(),
            r#"source.jpg -set comment "my favorite file" dest.jpg"#
        );
        assert_eq!(
            b.to_args(),
            ["source.jpg", "-set", "comment", "my favorite file", "dest.jpg"]
        );
    }

    #[test]
    fn raw_and_builder_forms_execute_alike() {
        let mut raw = ArgBuilder::new();
        raw.append_raw(r#"source.jpg -set comment "the \"best\" comment" dest.jpg"#);
        let mut built = ArgBuilder::new();
        built
            .add_file("source.jpg")
            .minus("set", ["comment", r#"the "best" comment"#])
            .add_file("dest.jpg");
        assert_eq!(raw.render(), built.render());
        assert_eq!(raw.to_args(), built.to_args());
    }

    #[test]
    fn flag_arguments_follow_flag() {
        let mut b = ArgBuilder::new();
        b.minus("extent", ["256x256+0+0"]).minus("crop", ["64x64"]);
        assert_eq!(b.render(), "-extent 256x256+0+0 -crop 64x64");
    }

    #[test]
    fn flag_arguments_are_quoted_when_needed() {
        let mut b = ArgBuilder::new();
        b.minus("comment", ["white space"])
            .minus("comment", ["w&b"])
            .minus("crop", ["6x6^"]);
        assert_eq!(
            b.render(),
            r#"-comment "white space" -comment "w&b" -crop "6x6^""#
        );
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        let mut b = ArgBuilder::new();
        b.minus("comment", [r#"Fred "Woot" Rook"#]);
        assert_eq!(b.render(), r#"-comment "Fred \"Woot\" Rook""#);
    }

    #[test]
    fn multiple_arguments_are_quoted_separately() {
        let mut b = ArgBuilder::new();
        b.minus("set", ["comment", r#"the "best" comment"#]);
        assert_eq!(b.render(), r#"-set comment "the \"best\" comment""#);
    }

    #[test]
    fn files_mix_with_flags() {
        let mut b = ArgBuilder::new();
        b.add_files(["source.jpg", "source2.jpg"])
            .minus("append", NO_ARGS)
            .minus("crop", ["64x64"])
            .add_file("dest%d.jpg");
        assert_eq!(
            b.render(),
            "source.jpg source2.jpg -append -crop 64x64 dest%d.jpg"
        );
    }

    #[test]
    fn files_are_quoted_when_needed() {
        let mut b = ArgBuilder::new();
        b.add_file("probably on windows.jpg");
        assert_eq!(b.render(), r#""probably on windows.jpg""#);
    }

    #[test]
    fn args_are_never_shell_quoted() {
        let mut b = ArgBuilder::new();
        b.add_file("my file; rm -rf ~.jpg")
            .minus("comment", [r#"say "hi""#]);
        assert_eq!(
            b.to_args(),
            ["my file; rm -rf ~.jpg", "-comment", r#"say "hi""#]
        );
    }

    #[test]
    fn render_is_repeatable() {
        let mut b = ArgBuilder::new();
        b.minus("strip", NO_ARGS);
        assert_eq!(b.render(), b.render());
    }

    #[test]
    fn blob_renders_as_its_temp_path() {
        let mut b = ArgBuilder::new();
        b.add_blob(b"binary data").unwrap();
        let rendered = b.render();
        assert_eq!(std::fs::read(&rendered).unwrap(), b"binary data");
    }

    #[test]
    fn blob_is_removed_with_builder() {
        let mut b = ArgBuilder::new();
        b.add_blob(b"scratch").unwrap();
        let path = PathBuf::from(b.render());
        assert!(path.exists());
        drop(b);
        assert!(!path.exists());
    }

    #[test]
    fn empty_builder_renders_empty() {
        let b = ArgBuilder::new();
        assert!(b.is_empty());
        assert_eq!(b.render(), "");
        assert!(b.to_args().is_empty());
    }
}
