//! High-level engine operations.
//!
//! [`Magick`] bundles a [`CommandRunner`], the configured program names, the
//! resource-limit override layer and the lazily captured baseline. Every
//! operation composes an [`ArgBuilder`], wraps it in an [`Invocation`] that
//! carries the current limits, and runs it.
//!
//! Limit mutation takes `&mut self`, so it cannot interleave with an
//! invocation running on another thread. Share a context across threads
//! by reference for read-only work, or behind a lock when limits change.

use super::builder::ArgBuilder;
use super::limits::{
    LimitTable, LimitValue, Resource, ResourceLimits, UNLIMITED, parse_resource_listing,
};
use super::params::{Quality, ScaleOptions};
use super::probe::{parse_dimensions, plan_probe};
use super::process_runner::ProcessRunner;
use super::resize::{expand_options, plan_resize, shrink_options};
use super::runner::{CommandRunner, Dimensions, Invocation, MagickError, run_invocation};
use crate::config::MagickConfig;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, MagickError>;

/// Names of the engine programs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Programs {
    pub convert: String,
    pub mogrify: String,
    pub identify: String,
}

impl Default for Programs {
    fn default() -> Self {
        Self {
            convert: "convert".to_string(),
            mogrify: "mogrify".to_string(),
            identify: "identify".to_string(),
        }
    }
}

/// Engine context. See the [module docs](self).
pub struct Magick<R: CommandRunner = ProcessRunner> {
    runner: R,
    programs: Programs,
    default_quality: Quality,
    timeout: Option<Duration>,
    limits: ResourceLimits,
    baseline: OnceLock<LimitTable>,
}

impl Magick<ProcessRunner> {
    pub fn new() -> Self {
        Self::with_runner(ProcessRunner::new())
    }

    /// Build a context from loaded configuration, applying its initial
    /// limit overrides.
    pub fn from_config(config: &MagickConfig) -> Result<Self> {
        Self::from_config_with_runner(config, ProcessRunner::new())
    }
}

impl Default for Magick<ProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> Magick<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            programs: Programs::default(),
            default_quality: Quality::default(),
            timeout: None,
            limits: ResourceLimits::new(),
            baseline: OnceLock::new(),
        }
    }

    pub fn from_config_with_runner(config: &MagickConfig, runner: R) -> Result<Self> {
        let mut magick = Self::with_runner(runner).with_programs(Programs {
            convert: config.programs.convert.clone(),
            mogrify: config.programs.mogrify.clone(),
            identify: config.programs.identify.clone(),
        });
        magick.default_quality = Quality::new(config.resize.default_quality);
        magick.timeout = config.invocation.timeout();
        magick.set_limits(config.limits.overrides())?;
        Ok(magick)
    }

    pub fn with_programs(mut self, programs: Programs) -> Self {
        self.programs = programs;
        self
    }

    /// Kill any engine process that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn programs(&self) -> &Programs {
        &self.programs
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Run `program` with the current limit overrides and `args`.
    pub fn raw_command(
        &self,
        program: &str,
        args: &ArgBuilder,
        error_message: Option<&str>,
    ) -> Result<String> {
        let invocation = Invocation::new(program, &self.limits, args)
            .with_error_message(error_message)
            .with_timeout(self.timeout);
        run_invocation(&self.runner, &invocation)
    }

    /// Run `convert`: `source`, then whatever `build` adds, then `dest`.
    ///
    /// ```no_run
    /// # use magick_wrap::magick::Magick;
    /// # use std::path::Path;
    /// # fn main() -> Result<(), magick_wrap::magick::MagickError> {
    /// let magick = Magick::new();
    /// magick.convert(Some(Path::new("in.jpg")), Some(Path::new("out.jpg")), |c| {
    ///     c.minus("crop", ["250x250+0+0"]).plus("repage", [] as [&str; 0]);
    ///     Ok(())
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn convert<F>(&self, source: Option<&Path>, dest: Option<&Path>, build: F) -> Result<String>
    where
        F: FnOnce(&mut ArgBuilder) -> Result<()>,
    {
        let mut args = ArgBuilder::new();
        if let Some(source) = source {
            args.add_file(source);
        }
        build(&mut args)?;
        if let Some(dest) = dest {
            args.add_file(dest);
        }
        self.raw_command(&self.programs.convert, &args, None)
    }

    /// Run `mogrify`: whatever `build` adds, then `dest`.
    pub fn mogrify<F>(&self, dest: Option<&Path>, build: F) -> Result<String>
    where
        F: FnOnce(&mut ArgBuilder) -> Result<()>,
    {
        let mut args = ArgBuilder::new();
        build(&mut args)?;
        if let Some(dest) = dest {
            args.add_file(dest);
        }
        self.raw_command(&self.programs.mogrify, &args, None)
    }

    // =========================================================================
    // Resize policy
    // =========================================================================

    /// Resize `source` into `dest` and return `dest`.
    ///
    /// `source` and `dest` may be the same file.
    pub fn resize(&self, source: &Path, dest: &Path, options: &ScaleOptions) -> Result<PathBuf> {
        let args = plan_resize(source, dest, options, self.default_quality)?;
        self.raw_command(&self.programs.convert, &args, None)?;
        Ok(dest.to_path_buf())
    }

    /// Resize, but never enlarge.
    pub fn shrink(&self, source: &Path, dest: &Path, options: &ScaleOptions) -> Result<PathBuf> {
        self.resize(source, dest, &shrink_options(options))
    }

    /// Resize, but never reduce.
    pub fn expand(&self, source: &Path, dest: &Path, options: &ScaleOptions) -> Result<PathBuf> {
        self.resize(source, dest, &expand_options(options))
    }

    // =========================================================================
    // Probe
    // =========================================================================

    /// Width and height of `source`, or `None` if `identify` printed nothing.
    pub fn image_size(&self, source: &Path) -> Result<Option<Dimensions>> {
        let output = self.raw_command(&self.programs.identify, &plan_probe(source), None)?;
        parse_dimensions(source, &output)
    }

    // =========================================================================
    // Resource limits
    // =========================================================================

    /// The engine's own limits, captured on first call and cached.
    ///
    /// Queries `identify -list resource`. Resources it does not report fall
    /// back to the `MAGICK_*_LIMIT` environment variables, then to
    /// `unlimited`. Always contains all five resources.
    pub fn default_limits(&self) -> &LimitTable {
        self.baseline.get_or_init(|| self.query_baseline())
    }

    fn query_baseline(&self) -> LimitTable {
        let mut args = ArgBuilder::new();
        args.minus("list", ["resource"]);
        // Baseline must reflect the engine, not our overrides.
        let invocation = Invocation::new(&self.programs.identify, &ResourceLimits::new(), &args)
            .with_timeout(self.timeout);
        let reported = match run_invocation(&self.runner, &invocation) {
            Ok(output) => parse_resource_listing(&output),
            Err(e) => {
                log::warn!("could not query engine resource limits: {e}");
                Default::default()
            }
        };

        Resource::ALL
            .into_iter()
            .map(|r| {
                let value = reported
                    .get(&r)
                    .cloned()
                    .or_else(|| std::env::var(r.env_var()).ok())
                    .unwrap_or_else(|| UNLIMITED.to_string());
                (r, LimitValue::Symbolic(value))
            })
            .collect()
    }

    /// Merge `pairs` into the override layer.
    pub fn set_limits<I, S>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (Resource, S)>,
        S: Into<String>,
    {
        self.limits.set(pairs)
    }

    /// Effective limits. With `show_actual`, sizes become absolute counts.
    pub fn current_limits(&self, show_actual: bool) -> LimitTable {
        self.limits.effective(self.default_limits(), show_actual)
    }

    pub fn remove_limits(&mut self, resources: &[Resource]) {
        self.limits.remove(resources);
    }

    pub fn unset_limits(&mut self) {
        self.limits.unset_all();
    }

    /// The override layer rendered as `-limit <key> <value>` fragments.
    pub fn limits_as_params(&self) -> String {
        self.limits.as_invocation_params()
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}
