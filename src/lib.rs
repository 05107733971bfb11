//! # magick-wrap
//!
//! A small, safe command-building layer over the ImageMagick command-line
//! tools. Callers describe what they want (a resize, a size probe, a chain
//! of `convert` options) and the crate builds the command, runs it, and
//! parses the answer.
//!
//! ```text
//! caller → Magick::resize / image_size / convert
//!        → ArgBuilder (+ TempBlob)          tokens in call order
//!        → Invocation (+ ResourceLimits)    -limit overrides prepended
//!        → CommandRunner                    child process, stdout captured
//!        → parsed result or MagickError
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`magick`] | Builder, quoting, runner, resize policy, size probe, resource limits |
//! | [`config`] | `magick.toml` loading, validation and merging over stock defaults |
//!
//! # Design Decisions
//!
//! ## No Shell
//!
//! Engine processes are spawned with an argument vector. Filenames and
//! option values reach the engine exactly as given, so a name like
//! `a; rm -rf ~.jpg` is just a filename. The quoted, space-joined rendering
//! of a command still exists, but only for logs and error messages.
//!
//! ## Limits Live in a Context
//!
//! Resource limits are part of a [`magick::Magick`] value rather than
//! global state. Changing them needs `&mut`, so two callers cannot leak
//! overrides into each other's invocations.
//!
//! ## Scoped Temp Files
//!
//! In-memory payloads added with [`magick::ArgBuilder::add_blob`] are owned
//! by the builder and deleted when it is dropped, whether the engine call
//! succeeded or not.

pub mod config;
pub mod magick;
