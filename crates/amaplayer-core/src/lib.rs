pub mod classifier;
pub mod config;
pub mod error;
pub mod io;
pub mod paths;
pub mod search;
pub mod types;

pub use classifier::{ClassifiedError, Classifier, RawError};
pub use error::{AmaError, Result};
pub use types::ErrorKind;
