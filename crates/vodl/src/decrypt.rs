use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use md5::{Digest, Md5};

use crate::error::{VodError, VodResult};

/// Content key of one private-encrypted video.
///
/// Derived once per download from the client random sent with GetPlayInfo and
/// the `Rand` / `Plaintext` pair of the selected variant. Never cached.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey(Vec<u8>);

impl ContentKey {
    pub fn derive(client_rand: &str, server_rand: &str, plaintext: &str) -> VodResult<Self> {
        let iv = md5_seed(client_rand.as_bytes());

        let decoded_rand = decrypt_cbc(&STANDARD.decode(server_rand)?, &iv, &iv)?;

        let mut seed = client_rand.as_bytes().to_vec();
        seed.extend_from_slice(&decoded_rand);
        let key = md5_seed(&seed);

        let decoded_plaintext = decrypt_cbc(&STANDARD.decode(plaintext)?, &key, &iv)?;
        let key = STANDARD.decode(&decoded_plaintext)?;
        if key.is_empty() {
            return Err(VodError::InvalidKey("empty content key".to_string()));
        }

        Ok(Self(key))
    }

    pub fn from_hex(key: &str) -> VodResult<Self> {
        Ok(Self(hex::decode(key.trim())?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContentKey").field(&"..").finish()
    }
}

/// Characters `8..24` of the hex md5 digest, used as raw 16 key bytes.
fn md5_seed(input: &[u8]) -> [u8; 16] {
    let digest = format!("{:x}", Md5::digest(input));
    let mut seed = [0; 16];
    seed.copy_from_slice(&digest.as_bytes()[8..24]);
    seed
}

fn decrypt_cbc(data: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> VodResult<Vec<u8>> {
    let decryptor = cbc::Decryptor::<aes::Aes128>::new(key.into(), iv.into());
    Ok(decryptor.decrypt_padded_vec_mut::<Pkcs7>(data)?)
}
