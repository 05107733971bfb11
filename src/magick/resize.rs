//! Resize policy: [`ScaleOptions`] to engine arguments.
//!
//! All functions here are pure and testable without any I/O or images.
//! [`Magick::resize`](super::Magick::resize) runs the plan built here.

use super::builder::ArgBuilder;
use super::params::{Quality, ScaleOptions};
use super::runner::{Dimensions, MagickError};
use std::path::Path;

/// The two geometry forms the engine understands for `-resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fit { width: u32, height: u32 },
    Percent(u32),
}

fn mode(options: &ScaleOptions) -> Result<Mode, MagickError> {
    if options.shrink_only && options.expand_only {
        return Err(MagickError::ConflictingResizeOptions(format!("{options:?}")));
    }
    match (options.width, options.height, options.percent) {
        (Some(width), Some(height), _) => Ok(Mode::Fit { width, height }),
        (_, _, Some(percent)) => Ok(Mode::Percent(percent)),
        _ => Err(MagickError::UnknownResizeOptions(format!("{options:?}"))),
    }
}

/// Scaling-mode suffix for a geometry string.
///
/// `>` for shrink-only, `<` for expand-only, `!` for absolute aspect,
/// concatenated in that order. Empty when no flag is set.
pub fn geometry_suffix(options: &ScaleOptions) -> String {
    let mut suffix = String::new();
    if options.shrink_only {
        suffix.push('>');
    }
    if options.expand_only {
        suffix.push('<');
    }
    if options.absolute_aspect {
        suffix.push('!');
    }
    suffix
}

/// Geometry argument for `-resize`, e.g. `100X100>` or `50%`.
pub fn geometry(options: &ScaleOptions) -> Result<String, MagickError> {
    let suffix = geometry_suffix(options);
    Ok(match mode(options)? {
        Mode::Fit { width, height } => format!("{width}X{height}{suffix}"),
        Mode::Percent(percent) => format!("{percent}%{suffix}"),
    })
}

/// Build the `convert` arguments for a resize without running anything.
///
/// Percentage resizes always carry a quality, falling back to
/// `default_quality`. Bounding-box resizes only carry one when the options
/// ask for it.
pub fn plan_resize(
    source: &Path,
    dest: &Path,
    options: &ScaleOptions,
    default_quality: Quality,
) -> Result<ArgBuilder, MagickError> {
    let geometry = geometry(options)?;
    let quality = match mode(options)? {
        Mode::Fit { .. } => options.quality,
        Mode::Percent(_) => Some(options.quality.unwrap_or(default_quality)),
    };

    let mut args = ArgBuilder::new();
    args.add_file(source);
    if let Some(q) = quality {
        args.minus("quality", [q.value().to_string()]);
    }
    args.minus("resize", [geometry]).add_file(dest);
    Ok(args)
}

/// Options for a shrink: any expand-only flag is dropped, shrink-only forced.
pub fn shrink_options(options: &ScaleOptions) -> ScaleOptions {
    ScaleOptions {
        expand_only: false,
        shrink_only: true,
        ..options.clone()
    }
}

/// Options for an expand: any shrink-only flag is dropped, expand-only forced.
pub fn expand_options(options: &ScaleOptions) -> ScaleOptions {
    ScaleOptions {
        shrink_only: false,
        expand_only: true,
        ..options.clone()
    }
}

fn scale(value: u32, factor: f64) -> u32 {
    ((value as f64 * factor).round() as u32).max(1)
}

/// Predict the dimensions the engine produces for `options`.
///
/// Mirrors ImageMagick's geometry rules: a bounding box scales by the
/// smaller of the two ratios (unless `!` is set), a percentage scales both
/// sides, and `>` / `<` then keep each side from growing / shrinking
/// relative to the source.
///
/// # Examples
/// ```
/// # use magick_wrap::magick::{expected_dimensions, Dimensions, ScaleOptions};
/// let src = Dimensions { width: 333, height: 500 };
/// let out = expected_dimensions(src, &ScaleOptions::fit(100, 100)).unwrap();
/// assert_eq!(out, Dimensions { width: 67, height: 100 });
/// ```
pub fn expected_dimensions(
    source: Dimensions,
    options: &ScaleOptions,
) -> Result<Dimensions, MagickError> {
    let (mut width, mut height) = match mode(options)? {
        Mode::Fit { width, height } if options.absolute_aspect => (width, height),
        Mode::Fit { width, height } => {
            if source.width == 0 || source.height == 0 {
                return Ok(source);
            }
            let factor = (width as f64 / source.width as f64)
                .min(height as f64 / source.height as f64);
            (scale(source.width, factor), scale(source.height, factor))
        }
        Mode::Percent(percent) => {
            let factor = percent as f64 / 100.0;
            (scale(source.width, factor), scale(source.height, factor))
        }
    };

    if options.shrink_only {
        width = width.min(source.width);
        height = height.min(source.height);
    }
    if options.expand_only {
        width = width.max(source.width);
        height = height.max(source.height);
    }
    Ok(Dimensions { width, height })
}
