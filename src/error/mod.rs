use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The mode string had no `b`, so the host could translate bytes.
    #[error("trie file must be opened in binary mode (got {0:?})")]
    NotOpenedInBinaryMode(String),

    #[error("invalid open mode {0:?}")]
    InvalidMode(String),

    #[error("file is not currently open")]
    StreamClosed,

    /// A length, count, or offset does not fit in its fixed-width field. The
    /// format cannot represent it; the data has to be split.
    #[error("{field} {value} does not fit in {width} bytes")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        width: usize,
    },

    #[error("character {character:?} is larger than {width} bytes")]
    CharacterFieldOverflow { character: char, width: usize },

    #[error("malformed record at offset {offset}: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed<S: Into<String>>(offset: u64, reason: S) -> Self {
        Error::MalformedRecord {
            offset,
            reason: reason.into(),
        }
    }
}
