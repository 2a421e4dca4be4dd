//! `stream-unzip`: a streaming ZIP archive decoder.
//!
//! The archive is never materialised in memory or on disk. Decoding
//! proceeds strictly left-to-right over a producer-supplied sequence of
//! byte chunks, member by member, without ever consulting the central
//! directory at the archive's tail. This makes it suitable for decoding
//! archives arriving over a network connection, or any other source that
//! cannot be seeked.
//!
//! Two compression methods are supported: stored (method 0) and deflate
//! (method 8). ZIP64 extra fields and the data-descriptor ("sizes unknown
//! up front") framing are both handled. Encryption, multi-disk archives,
//! other compression methods, and reading the central directory are all
//! out of scope — see [`DecodeError`] for the full set of ways a malformed
//! or unsupported archive is rejected.
//!
//! ```no_run
//! use bytes::Bytes;
//! use stream_unzip::{IterChunkSource, ZipDecoder};
//!
//! # fn chunks_from_somewhere() -> impl Iterator<Item = std::io::Result<Bytes>> {
//! #     std::iter::empty()
//! # }
//! let mut decoder = ZipDecoder::new(IterChunkSource::new(chunks_from_somewhere()));
//! while let Some(mut member) = decoder.next_member()? {
//!     println!("{:?}: {:?} bytes", member.name(), member.size_hint());
//!     while let Some(chunk) = member.next_chunk()? {
//!         // do something with `chunk`
//!         let _ = chunk;
//!     }
//! }
//! # Ok::<(), stream_unzip::DecodeError>(())
//! ```

mod chunk;
mod error;
mod header;
mod payload;
mod session;

pub use chunk::{ChunkSource, IterChunkSource};
pub use error::{DecodeError, Result};
pub use session::{Member, ZipDecoder};
