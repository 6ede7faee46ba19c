//! Result and exception filter chains.
//!
//! Filters are registered as [`FilterDescriptor`]s in a shared
//! [`FilterRegistry`]. Each filter kind has a [`FilterChainFactory`] that
//! composes the filters serving it into one delegate, ordered by
//! [`FilterDescriptor::order`], and rebuilds that delegate whenever the
//! registry reports a change touching the kind. The [`FilterProvider`] maps a
//! requested kind to the factory serving it.
//!
//! # Example
//!
//! ```rust,ignore
//! use sigil_framework::filter::*;
//!
//! let provider = FilterProvider::with_defaults(Arc::new(FilterRegistry::new()));
//! provider.add(
//!     FilterDescriptor::of_type::<LogResultFilter>()
//!         .serves::<ResultFilters>()
//!         .serves::<ExceptionFilters>()
//!         .build()?,
//! );
//!
//! let chain = provider.dispatch::<ResultFilters>()?;
//! chain(ctx).await?;
//! ```

mod builtin;
mod descriptor;
mod factory;
mod kind;
mod provider;
mod registry;

pub use builtin::{DisposeContextFilter, LogResultFilter};
pub use descriptor::{FilterDescriptor, FilterDescriptorBuilder, FilterLifetime};
pub use factory::FilterChainFactory;
pub use kind::{
    ExceptionFilters, Filter, FilterContext, FilterDelegate, FilterFuture, FilterKind, Next,
    ResultFilters,
};
pub use provider::FilterProvider;
pub use registry::{FilterChange, FilterRegistry, FilterSubscriber};
