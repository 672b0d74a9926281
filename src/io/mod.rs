//! Model state persistence.
//!
//! A saved state is the flat parameter vector plus enough layout metadata
//! to rebuild named tensors. JSON is the checkpoint format; YAML is
//! available for inspection.

mod format;
mod load;
mod model;
mod save;

pub use format::{ModelFormat, SaveConfig};
pub use load::load_model;
pub use model::{Model, ModelMetadata, ModelState, ParameterInfo};
pub use save::save_model;
