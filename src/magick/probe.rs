//! Dimension probing via `identify`.

use super::builder::ArgBuilder;
use super::runner::{Dimensions, MagickError};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// `identify` format string whose output [`parse_dimensions`] understands.
pub const SIZE_FORMAT: &str = "w:%w h:%h";

static WIDTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"w:([0-9]+) ").unwrap());
static HEIGHT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"h:([0-9]+)").unwrap());

/// Build the `identify` arguments for a size probe.
pub fn plan_probe(source: &Path) -> ArgBuilder {
    let mut args = ArgBuilder::new();
    args.minus("format", [SIZE_FORMAT]).add_file(source);
    args
}

fn capture(re: &Regex, output: &str) -> Option<u32> {
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

/// Parse `identify` output for `source`.
///
/// - Empty output: `Ok(None)`, the size is unknown.
/// - Both `w:<n> ` and `h:<n>` present: `Ok(Some(..))`.
/// - Anything else: [`MagickError::IndeterminateSize`].
///
/// A partial result is never returned.
pub fn parse_dimensions(source: &Path, output: &str) -> Result<Option<Dimensions>, MagickError> {
    if output.is_empty() {
        return Ok(None);
    }
    match (capture(&WIDTH, output), capture(&HEIGHT, output)) {
        (Some(width), Some(height)) => Ok(Some(Dimensions { width, height })),
        _ => Err(MagickError::IndeterminateSize {
            path: source.to_path_buf(),
        }),
    }
}
