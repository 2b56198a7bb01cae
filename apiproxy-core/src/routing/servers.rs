//! # Servers Configuration
//!
//! The immutable routing plane built from one configuration file: the
//! validated [`ServersTree`], the per-server minimum owned ids, the total
//! server ordering used to chain cross-shard enumerations, and an opaque
//! version token derived from the raw file bytes.
//!
//! A `ServersConfig` is constructed once per reload and never mutated;
//! request handlers capture a reference at entry and keep using it even if
//! a newer configuration is published meanwhile.

use std::collections::{BTreeSet, HashMap};

use md5::{Digest, Md5};
use thiserror::Error;

use super::route::ServerRoute;
use super::trie::{ServersTree, TrieError};
use crate::sharding::shard_key;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the configuration file is not valid UTF-8")]
    Encoding,
    #[error(transparent)]
    Trie(#[from] TrieError),
}

#[derive(Debug)]
pub struct ServersConfig {
    tree: ServersTree,
    min_ids: HashMap<String, i64>,
    first_server_url: String,
    successor: HashMap<String, Option<String>>,
    version: String,
}

impl ServersConfig {
    /// Parses the raw bytes of a configuration file.
    ///
    /// Blank lines are ignored. Every other line carries a route specifier
    /// and a server URL separated by whitespace (extra tokens are ignored);
    /// lines failing either parser are logged and skipped without failing
    /// the reload. The surviving routes must form a complete trie.
    pub fn parse(raw: &[u8]) -> Result<Self, ConfigError> {
        let text = std::str::from_utf8(raw).map_err(|_| ConfigError::Encoding)?;
        let mut routes = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some(route), Some(url)) => match ServerRoute::parse(route, url) {
                    Ok(route) => routes.push(route),
                    Err(err) => log::warn!("skipping config line {}: {}", lineno + 1, err),
                },
                _ => log::warn!("skipping config line {}: missing server URL", lineno + 1),
            }
        }
        Self::from_routes(&routes, raw)
    }

    fn from_routes(routes: &[ServerRoute], raw: &[u8]) -> Result<Self, ConfigError> {
        let tree = ServersTree::build(routes)?;
        let urls: BTreeSet<&str> = routes.iter().map(|r| r.url.as_str()).collect();

        // Scan ids upward from the minimum until every server has been hit
        // once. The first id each server owns becomes the entry point used
        // when an enumeration chain crosses onto that server.
        let mut min_ids: HashMap<String, i64> = HashMap::with_capacity(urls.len());
        let mut first_server_url = String::new();
        let mut i = i64::MIN;
        while min_ids.len() < urls.len() {
            let url = tree.match_sharding_key(shard_key(i, None));
            if first_server_url.is_empty() {
                first_server_url = url.to_string();
            }
            if !min_ids.contains_key(url) {
                min_ids.insert(url.to_string(), i);
            }
            i += 1;
        }

        // Total order: the first server, then the rest ascending by string
        // order, terminated by `None` on the last one.
        let mut successor: HashMap<String, Option<String>> = HashMap::with_capacity(urls.len());
        let mut prev = first_server_url.clone();
        for url in urls.iter().filter(|u| **u != first_server_url) {
            successor.insert(prev, Some(url.to_string()));
            prev = url.to_string();
        }
        successor.insert(prev, None);

        Ok(ServersConfig {
            tree,
            min_ids,
            first_server_url,
            successor,
            version: hex::encode(Md5::digest(raw)),
        })
    }

    /// Resolves a sharding key to the owning server URL.
    pub fn match_sharding_key(&self, key: u32) -> &str {
        self.tree.match_sharding_key(key)
    }

    /// The smallest id owned by the given server, if the URL is known.
    pub fn min_id(&self, url: &str) -> Option<i64> {
        self.min_ids.get(url).copied()
    }

    /// The server owning the smallest id of all.
    pub fn first_server_url(&self) -> &str {
        &self.first_server_url
    }

    /// The next server in the total order, or `None` on the last one.
    pub fn successor_of(&self, url: &str) -> Option<&str> {
        self.successor.get(url).and_then(|next| next.as_deref())
    }

    /// Opaque version token: the hex MD5 of the raw configuration bytes.
    pub fn version(&self) -> &str {
        &self.version
    }

    #[cfg(test)]
    pub(crate) fn with_parts(
        tree: ServersTree,
        min_ids: HashMap<String, i64>,
        first_server_url: String,
        successor: HashMap<String, Option<String>>,
        version: String,
    ) -> Self {
        ServersConfig {
            tree,
            min_ids,
            first_server_url,
            successor,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharding::i2u;

    const TWO_SERVERS: &[u8] = b"0.* http://a:8001/\n1.* http://b:8001/\n";

    #[test]
    fn test_single_server_config() {
        let config = ServersConfig::parse(b"* http://only:8001/\n").unwrap();
        assert_eq!(config.first_server_url(), "http://only:8001/");
        assert_eq!(config.min_id("http://only:8001/"), Some(i64::MIN));
        assert_eq!(config.successor_of("http://only:8001/"), None);
    }

    #[test]
    fn test_two_server_min_ids() {
        let config = ServersConfig::parse(TWO_SERVERS).unwrap();
        // shard_key(i64::MIN) has its top bit clear, so the scan starts on a.
        assert_eq!(config.first_server_url(), "http://a:8001/");
        assert_eq!(config.min_id("http://a:8001/"), Some(i64::MIN));
        assert_eq!(config.min_id("http://b:8001/"), Some(i64::MIN + 2));
        assert_eq!(config.min_id("http://c:8001/"), None);
    }

    #[test]
    fn test_min_ids_are_minimal() {
        let config = ServersConfig::parse(TWO_SERVERS).unwrap();
        for url in ["http://a:8001/", "http://b:8001/"] {
            let min_id = config.min_id(url).unwrap();
            assert_eq!(config.match_sharding_key(shard_key(min_id, None)), url);
            let mut i = i64::MIN;
            while i < min_id {
                assert_ne!(config.match_sharding_key(shard_key(i, None)), url);
                i += 1;
            }
        }
    }

    #[test]
    fn test_successor_chain_is_a_simple_path() {
        let config = ServersConfig::parse(
            b"0.0.* http://d:8001/\n0.1.* http://c:8001/\n1.0.* http://b:8001/\n1.1.* http://a:8001/\n",
        )
        .unwrap();
        let mut visited = Vec::new();
        let mut current = Some(config.first_server_url().to_string());
        while let Some(url) = current {
            assert!(!visited.contains(&url));
            visited.push(url.clone());
            current = config.successor_of(&url).map(str::to_string);
        }
        assert_eq!(visited.len(), 4);
        // Past the first server, the chain is ascending by string order.
        let rest = visited[1..].to_vec();
        let mut sorted = rest.clone();
        sorted.sort();
        assert_eq!(rest, sorted);
    }

    #[test]
    fn test_version_is_md5_of_raw_bytes() {
        let config = ServersConfig::parse(TWO_SERVERS).unwrap();
        assert_eq!(config.version(), "ce1eff5180eff1cd9df194e1da50c508");
        // Any byte change yields a different token, even when the parsed
        // routes are identical.
        let reordered = ServersConfig::parse(b"1.* http://b:8001/\n0.* http://a:8001/\n").unwrap();
        assert_ne!(config.version(), reordered.version());
    }

    #[test]
    fn test_blank_and_bad_lines_are_skipped() {
        let raw = b"\n  \n0.* http://a:8001/\nbogus line here\n2.* http://x:8001/\n1.* http://b:8001/ trailing junk\n";
        let config = ServersConfig::parse(raw).unwrap();
        assert_eq!(config.match_sharding_key(0), "http://a:8001/");
        assert_eq!(config.match_sharding_key(u32::MAX), "http://b:8001/");
    }

    #[test]
    fn test_incomplete_config_is_rejected() {
        assert!(ServersConfig::parse(b"0.* http://a:8001/\n").is_err());
        assert!(ServersConfig::parse(b"\n\n").is_err());
    }

    #[test]
    fn test_min_id_renders_as_unsigned_segment() {
        let config = ServersConfig::parse(TWO_SERVERS).unwrap();
        let min_id = config.min_id("http://b:8001/").unwrap();
        assert_eq!(i2u(min_id).to_string(), "9223372036854775810");
    }
}
