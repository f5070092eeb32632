//! Wallet keys and proxies read from line-oriented files.

use std::{fmt, path::Path};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use url::Url;

use crate::error::{BridgeError, ConfigError};

/// A wallet's signing key and address. Never prints the key.
#[derive(Clone)]
pub struct WalletCredential {
    signer: PrivateKeySigner,
}

impl WalletCredential {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Address shortened for logs, e.g. `0xf39F...2266`.
    pub fn masked(&self) -> String {
        mask_address(&self.address())
    }
}

impl fmt::Debug for WalletCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCredential")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for WalletCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

pub fn mask_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Non-empty lines that are not `#` comments, with their 1-based line numbers.
fn entries(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_private_keys(raw: &str) -> Result<Vec<WalletCredential>, ConfigError> {
    entries(raw)
        .map(|(line, key)| {
            key.parse::<PrivateKeySigner>()
                .map(WalletCredential::new)
                .map_err(|_| ConfigError::PrivateKey { line })
        })
        .collect()
}

/// Reads one private key per line. An empty list is an error.
pub fn load_private_keys(path: impl AsRef<Path>) -> Result<Vec<WalletCredential>, ConfigError> {
    let path = path.as_ref();
    let wallets = parse_private_keys(&read(path)?)?;
    if wallets.is_empty() {
        return Err(ConfigError::NoWallets(path.to_path_buf()));
    }
    Ok(wallets)
}

/// Adds `http://` to scheme-less proxies and checks the result parses.
pub fn normalize_proxy(raw: &str) -> Result<Url, ConfigError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    Url::parse(&candidate).map_err(|e| ConfigError::Proxy {
        proxy: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Proxies assigned to wallets round-robin by wallet index.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<Url>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<Url>) -> Self {
        Self { proxies }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let proxies = entries(raw)
            .map(|(_, proxy)| normalize_proxy(proxy))
            .collect::<Result<_, _>>()?;
        Ok(Self { proxies })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::parse(&read(path.as_ref())?)
    }

    pub fn for_wallet(&self, index: usize) -> Option<&Url> {
        if self.proxies.is_empty() {
            return None;
        }
        self.proxies.get(index % self.proxies.len())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// HTTP client builder routing all traffic through `proxy` when given.
pub(crate) fn client_builder(proxy: Option<&Url>) -> Result<reqwest::ClientBuilder, BridgeError> {
    let builder = reqwest::Client::builder();
    match proxy {
        Some(proxy) => {
            let host = proxy.host_str().unwrap_or_default().to_string();
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| BridgeError::Client(format!("proxy {host}: {e}")))?;
            Ok(builder.proxy(proxy))
        }
        None => Ok(builder),
    }
}
