//! Single-file transfer primitives.
//!
//! Everything here is written against [`TransportSession`], so the same
//! function copies remote-to-local, local-to-remote or between two remotes.
//!
//! [`TransportSession`]: sftpdir_session::TransportSession

mod checksum;
mod copy;
mod single;

pub use checksum::{checksum_bytes, checksum_file};
pub use copy::{CopyRequest, check_destination, copy_file, fast_copy};
pub use single::{append, exists, get, get_into, put};

/// Default buffer size for stream copies and accelerated chunks: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
