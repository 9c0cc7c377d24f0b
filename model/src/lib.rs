mod error;

pub mod entities;
pub mod methods;

pub use error::{DbErr, Error, Result};
