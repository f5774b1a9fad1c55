//! Update modifier support
//!
//! [`ModifierRelaxer`] derives the relaxed schema that MongoDB-style update
//! modifiers are checked against; [`ModifierTransformer`] validates a
//! modifier against it and applies field transforms to the payload.

mod relax;
mod transform;

pub use relax::{ModifierRelaxer, RelaxedSchema};
pub use transform::ModifierTransformer;

pub(crate) use relax::root_segment;
pub(crate) use transform::normalize_modifier;
