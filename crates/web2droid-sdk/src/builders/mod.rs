//! Build stages that turn generated inputs into final artifacts.
//!
//! ## Overview
//!
//! Every build runs the compile stage once and then one or both assembly
//! branches, all inside the same [`Workspace`](common::Workspace):
//!
//! 1. **Compile** - resource compile, accessor generation, code compile and
//!    bytecode conversion ([`compile_common`])
//! 2. **Package** - link with assets, append bytecode, sign ([`assemble_package`])
//! 3. **Bundle** - proto link, module layout, bundle build, sign ([`assemble_bundle`])
//!
//! ## Outputs
//!
//! | Stage | Output |
//! |-------|--------|
//! | [`compile_common`] | [`CompiledResources`]: resource archive and `classes.dex` |
//! | [`assemble_package`] | signed `<stem>.apk` |
//! | [`assemble_bundle`] | signed `<stem>.aab` |
//!
//! ## Common Utilities
//!
//! The [`common`] module provides the workspace, bounded command execution
//! and zip container helpers shared by all stages.
//!
//! ## Example
//!
//! ```ignore
//! use web2droid_sdk::builders::{assemble_package, compile_common};
//!
//! let compiled = compile_common(&toolchain, &workspace, &generated)?;
//! let apk = assemble_package(&toolchain, &workspace, &compiled, &signing, &output)?;
//! # Ok::<(), web2droid_sdk::PackError>(())
//! ```

pub mod bundle;
pub mod common;
pub mod compile;
pub mod package;

pub use bundle::assemble_bundle;
pub use common::Workspace;
pub use compile::{CompiledResources, compile_common};
pub use package::assemble_package;
