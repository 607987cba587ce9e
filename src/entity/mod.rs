//! Entities: metadata, values, SQL compilation and execution.
//!
//! ```text
//! EntityDef ──MetaRegistry──▶ EntityMeta ──EntityCompiler──▶ BoundSql ──EntityStore──▶ Executor
//! ```

pub mod compiler;
pub mod meta;
pub mod registry;
pub mod sequence;
pub mod store;
pub mod value;

pub use compiler::{Clock, EntityCompiler, EntityOptions, UpsertAction};
pub use meta::{EmbeddableMeta, EntityMeta, LeafProp, PropKind, PropMeta};
pub use registry::{EmbeddableDef, EntityDef, MetaRegistry, PropDef, PropDefKind};
pub use sequence::{SequenceGenerator, SequenceSource};
pub use store::{EntityStore, Executor};
pub use value::Entity;
