use aes::cipher::{consts::U16, generic_array::GenericArray, BlockDecrypt, BlockSizeUser, KeyInit};

use crate::{Error, Result};

pub const BLOCK_SIZE: usize = 16;

/// AES in ECB mode, selected by key length.
pub enum EcbDecryptor {
    Aes128(aes::Aes128),
    Aes192(aes::Aes192),
    Aes256(aes::Aes256),
}

impl EcbDecryptor {
    pub fn new(key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::InvalidKeyLength(key.len());
        Ok(match key.len() {
            16 => Self::Aes128(aes::Aes128::new_from_slice(key).map_err(invalid)?),
            24 => Self::Aes192(aes::Aes192::new_from_slice(key).map_err(invalid)?),
            32 => Self::Aes256(aes::Aes256::new_from_slice(key).map_err(invalid)?),
            len => return Err(Error::InvalidKeyLength(len)),
        })
    }

    /// Decrypts the longest prefix of `data` that is a multiple of the block size.
    ///
    /// Returns the number of bytes decrypted. The trailing `< 16` bytes stay as they are.
    pub fn decrypt_prefix(&self, data: &mut [u8]) -> usize {
        match self {
            Self::Aes128(cipher) => decrypt_blocks(cipher, data),
            Self::Aes192(cipher) => decrypt_blocks(cipher, data),
            Self::Aes256(cipher) => decrypt_blocks(cipher, data),
        }
    }
}

fn decrypt_blocks<C>(cipher: &C, data: &mut [u8]) -> usize
where
    C: BlockDecrypt + BlockSizeUser<BlockSize = U16>,
{
    let decrypted = data.len() / BLOCK_SIZE * BLOCK_SIZE;
    for block in data[..decrypted].chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    decrypted
}
