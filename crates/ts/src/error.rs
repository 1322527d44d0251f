#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Not a transport stream: length {0} is not a multiple of 188")]
    NotTransportStream(usize),

    #[error("Invalid sync byte {byte:#04x} in packet {index} at offset {offset}")]
    InvalidSyncByte {
        index: usize,
        offset: usize,
        byte: u8,
    },

    #[error("Malformed packet {index} at offset {offset}: {reason}")]
    MalformedPacket {
        index: usize,
        offset: usize,
        reason: &'static str,
    },

    #[error("Invalid AES key length: {0}")]
    InvalidKeyLength(usize),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is caused by the input not being a well-formed transport stream.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::NotTransportStream(_)
                | Error::InvalidSyncByte { .. }
                | Error::MalformedPacket { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
