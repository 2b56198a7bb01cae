//! # Servers Trie
//!
//! A binary trie that partitions the 32-bit sharding-key space across the
//! configured upstream servers. Each route places its server URL at the node
//! reached by following the route's bit prefix from the root; a valid trie
//! has a URL on every leaf and exactly two children on every internal node,
//! so that every possible key resolves to exactly one server.

use thiserror::Error;

use super::route::{dotted, ServerRoute};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrieError {
    #[error("duplicated route: {0}")]
    DuplicatedRoute(String),
    #[error("missing route: {0}")]
    MissingRoute(String),
}

#[derive(Debug, Default)]
struct Node {
    url: Option<String>,
    children: [Option<Box<Node>>; 2],
}

#[derive(Debug)]
pub struct ServersTree {
    root: Node,
}

impl ServersTree {
    /// Builds and validates the trie from parsed routes.
    ///
    /// A route is rejected as duplicated when its target node already owns a
    /// URL, already has children, or lies below an existing leaf. After all
    /// inserts, every internal node must have both children, otherwise a part
    /// of the key space would be unroutable and the whole configuration is
    /// rejected (an empty route list fails the same way).
    pub fn build(routes: &[ServerRoute]) -> Result<Self, TrieError> {
        let mut root = Node::default();
        for route in routes {
            let mut node = &mut root;
            for &bit in &route.prefix {
                if node.url.is_some() {
                    return Err(TrieError::DuplicatedRoute(dotted(&route.prefix)));
                }
                node = node.children[bit as usize]
                    .get_or_insert_with(Default::default)
                    .as_mut();
            }
            if node.url.is_some() || node.children.iter().any(|c| c.is_some()) {
                return Err(TrieError::DuplicatedRoute(dotted(&route.prefix)));
            }
            node.url = Some(route.url.clone());
        }
        validate(&root, &mut Vec::new())?;
        Ok(ServersTree { root })
    }

    /// Resolves a sharding key to the URL of the owning server.
    ///
    /// Descends from bit 31 down to bit 0, stopping at the first leaf. A
    /// validated trie covers the whole key space, so the descent always ends
    /// on a leaf.
    pub fn match_sharding_key(&self, key: u32) -> &str {
        let mut node = &self.root;
        for i in (0..32).rev() {
            if let Some(url) = node.url.as_deref() {
                return url;
            }
            let bit = ((key >> i) & 1) as usize;
            node = node.children[bit]
                .as_deref()
                .expect("a validated trie covers the whole key space");
        }
        node.url
            .as_deref()
            .expect("a validated trie covers the whole key space")
    }
}

fn validate(node: &Node, prefix: &mut Vec<u8>) -> Result<(), TrieError> {
    if node.url.is_some() {
        // A leaf; insertion already guarantees it has no children.
        return Ok(());
    }
    for bit in 0..2u8 {
        prefix.push(bit);
        let result = match &node.children[bit as usize] {
            Some(child) => validate(child, prefix),
            None => Err(TrieError::MissingRoute(dotted(prefix))),
        };
        prefix.pop();
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(specs: &[(&str, &str)]) -> Vec<ServerRoute> {
        specs
            .iter()
            .map(|(route, url)| ServerRoute::parse(route, url).unwrap())
            .collect()
    }

    #[test]
    fn test_single_server() {
        let tree = ServersTree::build(&routes(&[("*", "http://only:8001/")])).unwrap();
        assert_eq!(tree.match_sharding_key(0), "http://only:8001/");
        assert_eq!(tree.match_sharding_key(u32::MAX), "http://only:8001/");
    }

    #[test]
    fn test_two_servers_split_on_top_bit() {
        let tree = ServersTree::build(&routes(&[
            ("0.*", "http://a:8001/"),
            ("1.*", "http://b:8001/"),
        ]))
        .unwrap();
        assert_eq!(tree.match_sharding_key(0x0000_0000), "http://a:8001/");
        assert_eq!(tree.match_sharding_key(0x7FFF_FFFF), "http://a:8001/");
        assert_eq!(tree.match_sharding_key(0x8000_0000), "http://b:8001/");
        assert_eq!(tree.match_sharding_key(0xFFFF_FFFF), "http://b:8001/");
    }

    #[test]
    fn test_uneven_partition() {
        let tree = ServersTree::build(&routes(&[
            ("0.*", "http://a:8001/"),
            ("1.0.*", "http://b:8001/"),
            ("1.1.*", "http://c:8001/"),
        ]))
        .unwrap();
        assert_eq!(tree.match_sharding_key(0x1234_5678), "http://a:8001/");
        assert_eq!(tree.match_sharding_key(0x8000_0001), "http://b:8001/");
        assert_eq!(tree.match_sharding_key(0xC000_0001), "http://c:8001/");
    }

    #[test]
    fn test_missing_sibling_is_rejected() {
        let err = ServersTree::build(&routes(&[("0.*", "http://a:8001/")])).unwrap_err();
        assert_eq!(err, TrieError::MissingRoute("1.*".to_string()));
    }

    #[test]
    fn test_empty_config_is_rejected() {
        assert!(matches!(
            ServersTree::build(&[]),
            Err(TrieError::MissingRoute(_))
        ));
    }

    #[test]
    fn test_route_below_leaf_is_rejected() {
        let err = ServersTree::build(&routes(&[
            ("0.*", "http://a:8001/"),
            ("0.0.*", "http://b:8001/"),
            ("0.1.*", "http://c:8001/"),
        ]))
        .unwrap_err();
        assert_eq!(err, TrieError::DuplicatedRoute("0.0.*".to_string()));
    }

    #[test]
    fn test_route_above_subtree_is_rejected() {
        let err = ServersTree::build(&routes(&[
            ("0.0.*", "http://a:8001/"),
            ("0.1.*", "http://b:8001/"),
            ("0.*", "http://c:8001/"),
        ]))
        .unwrap_err();
        assert_eq!(err, TrieError::DuplicatedRoute("0.*".to_string()));
    }

    #[test]
    fn test_repeated_route_is_rejected() {
        let err = ServersTree::build(&routes(&[
            ("*", "http://a:8001/"),
            ("*", "http://a:8001/"),
        ]))
        .unwrap_err();
        assert_eq!(err, TrieError::DuplicatedRoute("*".to_string()));
    }

    #[test]
    fn test_full_key_space_coverage() {
        let tree = ServersTree::build(&routes(&[
            ("0.0.*", "http://a:8001/"),
            ("0.1.*", "http://b:8001/"),
            ("1.*", "http://c:8001/"),
        ]))
        .unwrap();
        // Walk the key space in coarse steps; every key must resolve.
        let mut key: u32 = 0;
        loop {
            assert!(!tree.match_sharding_key(key).is_empty());
            match key.checked_add(0x0100_0000) {
                Some(next) => key = next,
                None => break,
            }
        }
    }
}
