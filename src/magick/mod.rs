//! ImageMagick command-line driver.
//!
//! | Operation | Engine call |
//! |---|---|
//! | **Resize / shrink / expand** | `convert <src> [-quality q] -resize <geometry> <dest>` |
//! | **Image size** | `identify -format "w:%w h:%h" <src>` |
//! | **Baseline limits** | `identify -list resource` |
//! | **Builder helpers** | `convert` / `mogrify` with caller-supplied options |
//!
//! The module is split into:
//! - **Quoting** and **Builder**: tokens and their rendering ([`format_token`], [`ArgBuilder`])
//! - **Blob**: scoped temp files for in-memory payloads ([`TempBlob`])
//! - **Limits**: the `-limit` override layer and size parsing ([`ResourceLimits`])
//! - **Runner**: [`CommandRunner`] trait + [`ProcessRunner`], failure classification
//! - **Resize** and **Probe**: pure planning and parsing functions
//! - **Context**: [`Magick`], combining all of the above

mod blob;
mod builder;
mod context;
mod limits;
mod params;
mod probe;
mod process_runner;
mod quote;
mod resize;
mod runner;

pub use blob::TempBlob;
pub use builder::{ArgBuilder, Sign};
pub use context::{Magick, Programs};
pub use limits::{
    LimitState, LimitTable, LimitValue, Resource, ResourceLimits, parse_resource_listing,
    parse_size,
};
pub use params::{Quality, ScaleOptions};
pub use probe::{SIZE_FORMAT, parse_dimensions, plan_probe};
pub use process_runner::ProcessRunner;
pub use quote::{format_token, needs_quoting, split_fragment};
pub use resize::{
    expand_options, expected_dimensions, geometry, geometry_suffix, plan_resize, shrink_options,
};
pub use runner::{CommandRunner, Dimensions, Invocation, MagickError, RunOutput, run_invocation};
