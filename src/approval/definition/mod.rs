// SPDX-License-Identifier: MIT

//! Workflow definitions: authoring types, YAML loading and versioned storage

mod loader;
mod store;
mod types;

pub use loader::{Catalog, DefinitionLoader};
pub use store::DefinitionStore;
pub use types::{FieldDefinition, Step, TallyVisibility, WorkflowDefinition};
