//! MPEG-TS parsing and in-place payload decryption for VOD streams.
//!
//! Only the video (`0x100`) and audio (`0x101`) elementary streams are
//! decrypted. Every other packet is kept byte-for-byte.

mod decrypt;
mod error;
mod packet;
mod stream;

pub use decrypt::{EcbDecryptor, BLOCK_SIZE};
pub use error::*;
pub use packet::*;
pub use stream::*;

use std::io::{Read, Write};

/// Reads a whole transport stream from `input`, decrypts it with `key` and writes it to `output`.
pub fn decrypt<R, W>(mut input: R, mut output: W, key: &[u8]) -> Result<()>
where
    R: Read,
    W: Write,
{
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;

    let mut stream = TransportStream::parse(data)?;
    stream.decrypt(key)?;

    output.write_all(stream.as_bytes())?;
    output.flush()?;
    Ok(())
}
