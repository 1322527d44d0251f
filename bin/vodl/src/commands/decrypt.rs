use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::{ArgGroup, Args};
use vodl::decrypt::ContentKey;

/// Decrypt a downloaded transport stream offline
#[derive(Args, Clone, Debug)]
#[clap(group(ArgGroup::new("key_source").required(true).args(["key", "derive"])))]
pub struct DecryptCommand {
    /// Content key in hex
    #[clap(short, long)]
    pub key: Option<String>,

    /// Derive the content key from `<client rand>:<Rand>:<Plaintext>`
    #[clap(long)]
    pub derive: Option<String>,

    /// The input file to decrypt
    pub input: Option<PathBuf>,

    /// The output file. If not specified, the decrypted data is written to stdout
    pub output: Option<PathBuf>,
}

impl DecryptCommand {
    fn key(&self) -> anyhow::Result<ContentKey> {
        if let Some(key) = &self.key {
            return Ok(ContentKey::from_hex(key)?);
        }

        let derive = self.derive.as_deref().unwrap_or_default();
        let mut parts = derive.splitn(3, ':');
        let (Some(client_rand), Some(server_rand), Some(plaintext)) =
            (parts.next(), parts.next(), parts.next())
        else {
            anyhow::bail!("--derive expects <client rand>:<Rand>:<Plaintext>");
        };
        let key = ContentKey::derive(client_rand, server_rand, plaintext)?;
        tracing::info!("Derived content key {}", key.to_hex());
        Ok(key)
    }

    pub fn run(self) -> anyhow::Result<()> {
        let key = self.key()?;

        let input: Box<dyn Read> = match &self.input {
            Some(input) => Box::new(BufReader::new(
                File::open(input).with_context(|| format!("open {}", input.display()))?,
            )),
            None => Box::new(BufReader::new(std::io::stdin())),
        };
        let output: Box<dyn Write> = match &self.output {
            Some(output) => Box::new(BufWriter::new(
                File::create(output).with_context(|| format!("create {}", output.display()))?,
            )),
            None => Box::new(BufWriter::new(std::io::stdout())),
        };

        vodl_ts::decrypt(input, output, key.as_bytes())?;
        Ok(())
    }
}
