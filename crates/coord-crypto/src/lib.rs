//! Hashing primitives shared by the ledger core.
//!
//! Kept deliberately small: one hash type, one hash function, hex in and
//! out. Anything heavier (merkle proofs, signature schemes, address
//! encoding) belongs to a real cryptographic identity layer, which this
//! prototype does not have.

mod error;
mod hash;

pub use error::CryptoError;
pub use hash::{sha256, Hash256};

pub type Result<T> = std::result::Result<T, CryptoError>;
