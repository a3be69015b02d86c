pub mod canonical;
pub mod signer;

pub use canonical::{canonical_bytes, CanonicalDigest};
pub use signer::{CanonicalSigner, PrivateKeySession};
