/**
 * Who may talk to the service.
 *  - IP / CIDR allowlist
 *  - Shared secret in the Authorization header
 */
pub mod access;
/**
 * Streaming SHA-256 over file content, used
 *  to tell clients whether a rejected upload
 *  matches what is already stored.
 */
pub mod hash;
/**
 * Turns client-supplied paths into filesystem
 *  paths that are guaranteed to stay under
 *  the served root.
 */
pub mod path;
/**
 * Download and no-clobber upload operations
 *  on top of the path resolver and hasher.
 */
pub mod transfer;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::access::{AccessPolicy, AuthConfig, Authorize, PolicyError};
    pub use crate::hash::{ContentHasher, FileDigest};
    pub use crate::path::{PathError, PathResolver};
    pub use crate::transfer::{
        Download, TransferAction, TransferError, TransferRecord, TransferService, Uploaded,
    };
    pub use crate::version::build_info;
}
