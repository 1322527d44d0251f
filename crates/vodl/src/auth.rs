//! Play-auth decoding and GetPlayInfo request signing.
//!
//! A play auth is a base64 JSON document holding short-lived STS credentials.
//! It is exchanged for a playlist-selection manifest by a `GetPlayInfo` call
//! signed with HMAC-SHA1 over the canonicalized query string.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Datelike;
use hmac::{Hmac, Mac};
use reqwest::Url;
use rsa::{pkcs8::DecodePublicKey, Pkcs1v15Encrypt, RsaPublicKey};
use serde::Deserialize;
use sha1::Sha1;

use crate::error::{VodError, VodResult};

pub const DEFAULT_ENDPOINT: &str = "https://vod.cn-shanghai.aliyuncs.com/";

/// Public key the web player encrypts its client random with.
const RAND_PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----
MFwwDQYJKoZIhvcNAQEBBQADSwAwSAJBAIcLeIt2wmIyXckgNhCGpMTAZyBGO+nk
0/IdOrhIdfRRgBLHdydsftMVPNHrRuPKQNZRslWE1vvgx80w9lCllIUCAwEAAQ==
-----END PUBLIC KEY-----";

const MARKER_A: [u32; 6] = [52, 58, 53, 121, 116, 102];
const MARKER_B: [u32; 2] = [90, 91];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayAuth {
    pub security_token: String,
    pub auth_info: String,
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl PlayAuth {
    pub fn decode(token: &str) -> VodResult<Self> {
        Self::decode_with_year(token, chrono::Local::now().year())
    }

    /// Decodes a play auth, unwrapping the year-dependent obfuscation layer if present.
    pub fn decode_with_year(token: &str, year: i32) -> VodResult<Self> {
        let token = token.trim();
        let payload = match deobfuscate(token, year) {
            Some(payload) => payload,
            None => token.to_string(),
        };

        let json = STANDARD
            .decode(payload)
            .map_err(|e| VodError::MalformedPlayAuth(format!("invalid base64: {e}")))?;
        serde_json::from_slice(&json).map_err(|e| VodError::MalformedPlayAuth(e.to_string()))
    }
}

fn marker(table: &[u32]) -> Vec<char> {
    table
        .iter()
        .enumerate()
        .filter_map(|(i, code)| char::from_u32(code - i as u32))
        .collect()
}

/// Removes the obfuscation layer of a wrapped play auth.
///
/// The first marker sits at character offset `year / 100`, the second one ends
/// the token. Returns `None` if either marker is missing.
pub fn deobfuscate(token: &str, year: i32) -> Option<String> {
    let factor = u32::try_from(year / 100).ok().filter(|f| *f > 0)?;
    let marker_a = marker(&MARKER_A);
    let marker_b = marker(&MARKER_B);

    let chars: Vec<char> = token.chars().collect();
    let position = factor as usize;
    if chars.len() < position + marker_a.len() + marker_b.len() {
        return None;
    }
    let tail = chars.len() - marker_b.len();
    if chars[position..position + marker_a.len()] != marker_a[..] || chars[tail..] != marker_b[..]
    {
        return None;
    }

    let keep = factor / 10;
    let payload = chars[..position]
        .iter()
        .chain(&chars[position + marker_a.len()..tail])
        .map(|c| {
            let code = *c as u32;
            if code / factor == keep {
                *c
            } else {
                code.checked_sub(1).and_then(char::from_u32).unwrap_or(*c)
            }
        })
        .collect();
    Some(payload)
}

/// RFC 3986 encoding: only `A-Z a-z 0-9 - _ . ~` stay as they are.
pub fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// Encodes every pair, sorts the `key=value` strings and joins them with `&`.
pub fn canonicalize<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs: Vec<String> = params
        .into_iter()
        .map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
        .collect();
    pairs.sort();
    pairs.join("&")
}

/// `base64(HMAC-SHA1(secret + "&", "GET&%2F&" + encode(cqs)))`
pub fn sign(access_key_secret: &str, canonical_query: &str) -> Option<String> {
    if access_key_secret.is_empty() {
        return None;
    }

    let string_to_sign = format!(
        "GET&{}&{}",
        percent_encode("/"),
        percent_encode(canonical_query)
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{access_key_secret}&").as_bytes()).ok()?;
    mac.update(string_to_sign.as_bytes());
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Random values of one signed request.
#[derive(Debug, Clone)]
pub struct SigningNonce {
    /// Also the seed of the content key derivation.
    pub client_rand: String,
    pub signature_nonce: String,
}

impl SigningNonce {
    pub fn random() -> Self {
        Self {
            client_rand: uuid::Uuid::new_v4().to_string(),
            signature_nonce: uuid::Uuid::new_v4().to_string(),
        }
    }
}

pub struct SignedRequest {
    video_id: String,
    params: BTreeMap<String, String>,
    access_key_secret: String,
}

impl SignedRequest {
    pub fn new(auth: &PlayAuth, video_id: &str, nonce: &SigningNonce) -> VodResult<Self> {
        let encrypted_rand = encrypt_rand(&nonce.client_rand).map_err(|e| VodError::auth(video_id, e))?;
        Ok(Self::with_encrypted_rand(
            auth,
            video_id,
            &nonce.signature_nonce,
            encrypted_rand,
        ))
    }

    /// Builds the request from an already encrypted client random.
    pub fn with_encrypted_rand(
        auth: &PlayAuth,
        video_id: &str,
        signature_nonce: &str,
        encrypted_rand: String,
    ) -> Self {
        let mut params = BTreeMap::new();
        let mut set = |key: &str, value: &str| {
            params.insert(key.to_string(), value.to_string());
        };

        // public
        set("AccessKeyId", &auth.access_key_id);
        set("SignatureMethod", "HMAC-SHA1");
        set("SignatureVersion", "1.0");
        set("SignatureNonce", signature_nonce);
        set("Format", "JSON");
        set("Version", "2017-03-21");
        set("Channel", "HTML5");
        set("StreamType", "video");
        set("Formats", "");
        set("Rand", &encrypted_rand);

        // private
        set("Action", "GetPlayInfo");
        set("AuthInfo", &auth.auth_info);
        set("AuthTimeout", "7200");
        set("PlayConfig", "{}");
        set("PlayerVersion", "2.8.2");
        set("ReAuthInfo", "{}");
        set("SecurityToken", &auth.security_token);
        set("VideoId", video_id);

        Self {
            video_id: video_id.to_string(),
            params,
            access_key_secret: auth.access_key_secret.clone(),
        }
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn canonical_query(&self) -> String {
        canonicalize(&self.params)
    }

    pub fn signature(&self) -> VodResult<String> {
        sign(&self.access_key_secret, &self.canonical_query())
            .ok_or_else(|| VodError::auth(&self.video_id, "empty access key secret"))
    }

    pub fn to_url(&self, endpoint: &Url) -> VodResult<Url> {
        let signature = self.signature()?;
        let url = format!(
            "{endpoint}?{}&Signature={}",
            self.canonical_query(),
            percent_encode(&signature)
        );
        Ok(Url::parse(&url)?)
    }
}

fn encrypt_rand(client_rand: &str) -> Result<String, String> {
    let key = RsaPublicKey::from_public_key_pem(RAND_PUBLIC_KEY).map_err(|e| e.to_string())?;
    let encrypted = key
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, client_rand.as_bytes())
        .map_err(|e| e.to_string())?;
    Ok(STANDARD.encode(encrypted))
}

/// Decodes `token` and builds the signed GetPlayInfo URL for `video_id`.
pub fn play_info_url(
    endpoint: &Url,
    token: &str,
    video_id: &str,
    nonce: &SigningNonce,
) -> VodResult<Url> {
    let auth = PlayAuth::decode(token).map_err(|e| VodError::auth(video_id, e))?;
    SignedRequest::new(&auth, video_id, nonce)?.to_url(endpoint)
}
