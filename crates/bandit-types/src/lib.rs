pub mod errors;
pub mod metadata;
pub mod problem;
pub mod search;
pub mod trial;

pub use errors::*;
pub use metadata::*;
pub use problem::*;
pub use search::*;
pub use trial::*;
