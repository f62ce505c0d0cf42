//! # Property Graph Model
//!
//! Plain data types shared by the schema, the entity store, the aggregation
//! engine and persistence. This module is pure data: no I/O, no state.

pub mod entity;
pub mod value;
pub mod value_type;

pub use entity::{Entity, EntityId, EntityMap};
pub use value::PropertyValue;
pub use value_type::{LeafKind, ValueType};
