#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Built-in access-control mechanisms and the pipeline running them.
//!
//! Prototypes are built once from a [`MechanismsConfig`] catalogue through
//! [`Prototypes::build`]. Each rule derives its own variants with
//! [`Prototypes::pipeline`], which never mutates the shared prototypes.
//!
//! ```ignore
//! let deps = MechanismDeps::new(Arc::new(MemoryCache::new()));
//! let prototypes = Prototypes::build(&MechanismsConfig::load("mechanisms.yaml")?, &deps)?;
//! let pipeline = prototypes.pipeline(&[MechanismRef::new("jwt")], &[MechanismRef::new("pdp")])?;
//! let upstream = pipeline.run(RequestContext::new(request)).await?;
//! ```

pub mod authenticators;
pub mod authorizers;
pub mod config;
pub mod contenttype;
pub mod endpoint;
pub mod expressions;
pub mod extractors;
pub mod pipeline;
pub mod registry;
pub mod template;
pub mod values;

pub use config::{MechanismConfig, MechanismRef, MechanismsConfig};
pub use pipeline::Pipeline;
pub use registry::{MechanismDeps, Prototypes};
