//! Depth-limited read projection

use crate::error::{RestconfError, Result};
use crate::normalized::NormalizedNode;

/// Literal depth value meaning "no limit"
pub const UNBOUNDED: &str = "unbounded";

/// Parse the `depth` query parameter.
///
/// Absent, empty and `unbounded` yield `None`; anything else must be an
/// integer of at least 1.
pub fn parse_depth(raw: Option<&str>) -> Result<Option<u32>> {
    let raw = match raw.map(str::trim) {
        None | Some("") | Some(UNBOUNDED) => return Ok(None),
        Some(raw) => raw,
    };
    match raw.parse::<u32>() {
        Ok(depth) if depth >= 1 => Ok(Some(depth)),
        _ => Err(RestconfError::InvalidDepth(raw.to_string())),
    }
}

/// Drop every node lying more than `depth` levels below `tree`.
///
/// Names, node kinds and list keys are kept at every remaining level.
pub fn project(tree: NormalizedNode, depth: Option<u32>) -> NormalizedNode {
    match depth {
        None => tree,
        Some(depth) => prune(tree, depth),
    }
}

fn prune(mut node: NormalizedNode, remaining: u32) -> NormalizedNode {
    if !node.is_composite() {
        return node;
    }
    if remaining == 0 {
        return node.with_children(Vec::new());
    }
    let children = node
        .take_children()
        .into_iter()
        .map(|child| prune(child, remaining - 1))
        .collect();
    node.with_children(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::QName;
    use crate::types::Value;
    use proptest::prelude::*;

    fn q(local: &str) -> QName {
        QName::new("urn:test", None, local)
    }

    fn three_levels() -> NormalizedNode {
        NormalizedNode::container(
            q("root"),
            vec![
                NormalizedNode::container(
                    q("a"),
                    vec![NormalizedNode::container(
                        q("b"),
                        vec![NormalizedNode::leaf(q("c"), Value::Uint(1))],
                    )],
                ),
                NormalizedNode::leaf(q("flag"), Value::Boolean(true)),
            ],
        )
    }

    #[test]
    fn test_parse_depth() {
        assert_eq!(parse_depth(None).unwrap(), None);
        assert_eq!(parse_depth(Some("")).unwrap(), None);
        assert_eq!(parse_depth(Some("unbounded")).unwrap(), None);
        assert_eq!(parse_depth(Some("3")).unwrap(), Some(3));
        assert!(matches!(parse_depth(Some("0")), Err(RestconfError::InvalidDepth(_))));
        assert!(matches!(parse_depth(Some("-2")), Err(RestconfError::InvalidDepth(_))));
        assert!(matches!(parse_depth(Some("deep")), Err(RestconfError::InvalidDepth(_))));
    }

    #[test]
    fn test_depth_one_drops_grandchildren() {
        let projected = project(three_levels(), Some(1));
        assert_eq!(projected.children().len(), 2);
        let a = projected.child("a").unwrap();
        assert!(a.is_composite());
        assert!(a.children().is_empty());
        assert_eq!(projected.leaf_value("flag"), Some(&Value::Boolean(true)));
        assert_eq!(projected.depth(), 1);
    }

    #[test]
    fn test_depth_keeps_list_keys() {
        let entry = NormalizedNode::list_entry(
            q("interface"),
            vec![(q("name"), Value::String("eth0".into()))],
            vec![NormalizedNode::leaf(q("name"), Value::String("eth0".into()))],
        );
        let root = NormalizedNode::container(q("interfaces"), vec![entry]);
        let projected = project(root, Some(1));
        assert_eq!(projected.children()[0].keys().len(), 1);
        assert!(projected.children()[0].children().is_empty());
    }

    #[test]
    fn test_unbounded_is_identity() {
        assert_eq!(project(three_levels(), None), three_levels());
        assert_eq!(project(three_levels(), Some(10)), three_levels());
    }

    fn arb_tree() -> impl Strategy<Value = NormalizedNode> {
        let leaf = (0u64..100).prop_map(|v| NormalizedNode::leaf(q("leaf"), Value::Uint(v)));
        leaf.prop_recursive(5, 64, 5, |inner| {
            prop::collection::vec(inner, 0..5)
                .prop_map(|children| NormalizedNode::container(q("c"), children))
        })
    }

    proptest! {
        #[test]
        fn prop_projection_is_idempotent(tree in arb_tree(), depth in 1u32..6) {
            let once = project(tree, Some(depth));
            let twice = project(once.clone(), Some(depth));
            prop_assert_eq!(twice, once);
        }

        #[test]
        fn prop_projection_bounds_depth(tree in arb_tree(), depth in 1u32..6) {
            let original_depth = tree.depth();
            let projected = project(tree, Some(depth));
            prop_assert!(projected.depth() <= depth as usize);
            prop_assert!(projected.depth() <= original_depth);
        }
    }
}
