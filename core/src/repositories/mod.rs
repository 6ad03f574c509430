pub mod r#trait {
    pub use super::trait_::*;
}
#[path = "trait.rs"]
mod trait_;
pub mod entity;
pub mod filter;
pub mod value;

#[cfg(test)]
mod tests;

pub use entity::Entity;
pub use filter::Filter;
pub use ks_shared::types::SortOrder;
pub use r#trait::Repository;
pub use value::{Attributes, Value};
