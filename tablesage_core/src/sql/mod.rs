pub mod error;
pub mod parser;
pub mod types;

pub use error::EngineError;
pub use types::{DataType, Value};
