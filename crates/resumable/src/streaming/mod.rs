pub mod boundary_manager;
pub mod document;
pub mod markup;
pub mod renderer;
pub mod stream;
pub mod types;
pub mod validation;

pub use boundary_manager::SuspenseBoundaryManager;
pub use document::{serialize, serialize_with};
pub use renderer::StreamingSerializer;
pub use stream::{RenderSignals, RenderStream};
pub use types::*;
pub use validation::validate_document;
