use siphasher::sip::SipHasher24;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Ring points per node. Enough to keep a handful of nodes within a few
/// percent of an even split.
pub const VIRTUAL_NODES: usize = 160;

/// Where a key lives for a given live set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub primary: String,
    pub secondary: Option<String>,
}

impl Placement {
    /// Placement targets in order, primary first.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.secondary.as_deref())
    }

    pub fn includes(&self, node: &str) -> bool {
        self.targets().any(|target| target == node)
    }
}

/// Consistent hash ring over a set of node addresses.
///
/// Each node is spread over [`VIRTUAL_NODES`] points; a key belongs to the
/// first point clockwise of its hash. The ring is a pure function of the node
/// set, insertion order does not matter.
pub struct HashRing {
    ring: BTreeMap<u64, String>,
}

impl HashRing {
    pub fn new<'a>(nodes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut ring = BTreeMap::new();
        for node in nodes {
            for i in 0..VIRTUAL_NODES {
                let point = hash_key(&format!("{}:{}", node, i));
                // On a point collision keep the smaller address so the result
                // does not depend on iteration order
                ring.entry(point)
                    .and_modify(|owner: &mut String| {
                        if node < owner.as_str() {
                            *owner = node.to_string();
                        }
                    })
                    .or_insert_with(|| node.to_string());
            }
        }
        Self { ring }
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn get_node(&self, key: &str) -> Option<&str> {
        let hash = hash_key(key);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.as_str())
    }
}

/// Primary is the ring owner over the full live set, secondary the ring owner
/// over the live set without the primary.
pub fn place_key(key: &str, live_nodes: &[String]) -> Result<Placement> {
    let primary = HashRing::new(live_nodes.iter().map(String::as_str))
        .get_node(key)
        .ok_or(Error::EmptyNodeSet)?
        .to_string();

    let secondary = HashRing::new(
        live_nodes
            .iter()
            .map(String::as_str)
            .filter(|node| *node != primary),
    )
    .get_node(key)
    .map(str::to_string);

    Ok(Placement { primary, secondary })
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = SipHasher24::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_node_has_no_secondary() {
        let placement = place_key("a", &["n1".to_string()]).unwrap();

        assert_eq!(placement.primary, "n1");
        assert_eq!(placement.secondary, None);
        assert_eq!(placement.targets().collect::<Vec<_>>(), vec!["n1"]);
    }

    #[test]
    fn test_empty_node_set_is_an_error() {
        assert!(matches!(place_key("a", &[]), Err(Error::EmptyNodeSet)));
    }

    #[test]
    fn test_ring_ignores_insertion_order() {
        let forward = HashRing::new(["n1", "n2", "n3"]);
        let backward = HashRing::new(["n3", "n2", "n1"]);

        for i in 0..500 {
            let key = format!("key-{}", i);
            assert_eq!(forward.get_node(&key), backward.get_node(&key));
        }
    }
}
