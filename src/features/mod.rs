//! Analysis features built on top of the workspace.
//!
//! - [`MapperService`] symbol/reference registry, maps added resources
//! - [`ViewFeature`] generates and caches alternate views of files

mod mapper;
mod view;

pub use mapper::{MapperService, MappingError, MappingFactory, ReferenceType, SymbolType};
pub use view::{GeneratorError, ViewError, ViewFeature, ViewGenerator};
