//! Static string-keyed lookup tables stored as an on-disk trie.
//!
//! A [`Trie`] is built in memory, written once with [`TrieFile::write_trie`],
//! and then queried either by decoding it whole ([`TrieFile::read`]) or by
//! seeking through the file one record per key character ([`TrieFile::find`]).

pub mod codec;
pub mod encoding;
pub mod error;
pub mod file;
pub mod fs;
pub mod layout;
pub mod node;
pub mod options;
pub mod trie;

pub use error::{Error, Result};
pub use file::TrieFile;
pub use node::Node;
pub use options::Options;
pub use trie::{hash_key, HashMode, Trie};
