pub mod backend;
pub mod error;
pub mod key;

pub use backend::{
    CompletedPart, ObjectReader, ObjectStore, PartReader, DEFAULT_MAX_PARTS, MAX_PRESIGN_EXPIRY,
};
pub use error::{ErrorKind, Result, StoreError};
