// festive-spark-types: Layer 1 -- field specs, errors, and the backend contract
#![allow(clippy::result_large_err)]

pub mod backend;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod schema;
pub mod validation;

pub use backend::*;
pub use config::*;
pub use error::*;
pub use request::*;
pub use response::*;
pub use schema::*;
pub use validation::*;
