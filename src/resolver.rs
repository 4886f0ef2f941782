//! Tree-navigation primitives: locating the nodes a field path refers to.
//!
//! Two matching rules make short queries possible over deeply nested
//! documents:
//!
//! - A **single-component** path (`name`) is a find-anywhere search: any
//!   element with that tag matches, at any depth.
//! - A **multi-component** path (`employee.name`) uses *suffix* matching:
//!   a node matches when the chain of ancestor tag names from the document
//!   root down to it *ends with* the path's components, regardless of what
//!   wraps it. `department.employee.name` finds the same nodes whether the
//!   document nests them under one wrapper element or five.
//!
//! The price of suffix matching is ambiguity: two structurally different
//! locations can share a tag suffix. [`count_matching_paths`] counts the
//! distinct full ancestor chains a partial path matches, which backs the
//! advisory diagnostic in [`crate::executor::Executor::check_ambiguous_fields`].

use regex::Regex;

use crate::ast::{ComparisonOp, Condition, FieldPath, LogicalOp, WhereExpr};
use crate::document::XmlNode;

/// Does the ancestor chain end with the given path components?
fn chain_ends_with(chain: &[&str], components: &[String]) -> bool {
    chain.len() >= components.len()
        && chain[chain.len() - components.len()..]
            .iter()
            .zip(components)
            .all(|(tag, component)| *tag == component.as_str())
}

/// Depth-first preorder walk carrying the ancestor tag chain.
fn walk_chain<'a>(
    node: &'a XmlNode,
    chain: &mut Vec<&'a str>,
    visit: &mut impl FnMut(&'a XmlNode, &[&str]),
) {
    chain.push(&node.tag);
    visit(node, chain);
    for child in &node.children {
        walk_chain(child, chain, visit);
    }
    chain.pop();
}

/// All nodes under (and including) `root` whose ancestor chain suffix-matches
/// `components`, in document order.
pub fn collect_matches<'a>(root: &'a XmlNode, components: &[String]) -> Vec<&'a XmlNode> {
    if components.is_empty() {
        return Vec::new();
    }
    let mut matches = Vec::new();
    walk_chain(root, &mut Vec::new(), &mut |node, chain| {
        if chain_ends_with(chain, components) {
            matches.push(node);
        }
    });
    matches
}

/// The value a field yields at a specific node: the named attribute for
/// attribute fields, the element text otherwise.
pub fn value_at(node: &XmlNode, field: &FieldPath) -> String {
    if field.is_attribute {
        let name = field.attribute_name.as_deref().unwrap_or_default();
        node.attribute(name).unwrap_or_default().to_string()
    } else {
        node.text.clone()
    }
}

/// Every value the field resolves to under `root`, in document order.
/// A bare attribute path (`@id`) collects the attribute from every node
/// that carries it.
pub fn collect_values(root: &XmlNode, field: &FieldPath) -> Vec<String> {
    if field.components.is_empty() {
        if !field.is_attribute {
            return Vec::new();
        }
        let name = field.attribute_name.as_deref().unwrap_or_default();
        let mut values = Vec::new();
        walk_chain(root, &mut Vec::new(), &mut |node, _| {
            if let Some(value) = node.attribute(name) {
                values.push(value.to_string());
            }
        });
        return values;
    }
    collect_matches(root, &field.components)
        .into_iter()
        .map(|node| value_at(node, field))
        .collect()
}

/// First matching value under `root`, or empty when nothing matches.
/// "First" is depth-first document order, which makes resolution of an
/// ambiguous path predictable even when it is not unique.
pub fn resolve_first(root: &XmlNode, field: &FieldPath) -> String {
    if field.components.is_empty() {
        return value_at(root, field);
    }
    collect_matches(root, &field.components)
        .first()
        .map(|node| value_at(node, field))
        .unwrap_or_default()
}

/// Counts the *distinct full ancestor chains* that suffix-match the partial
/// path — not match occurrences. A result above 1 means the partial path is
/// structurally ambiguous in this document.
pub fn count_matching_paths(root: &XmlNode, components: &[String]) -> usize {
    if components.is_empty() {
        return 0;
    }
    let mut distinct: std::collections::HashSet<String> = std::collections::HashSet::new();
    walk_chain(root, &mut Vec::new(), &mut |_, chain| {
        if chain_ends_with(chain, components) {
            distinct.insert(chain.join("/"));
        }
    });
    distinct.len()
}

/// Resolves a field relative to an anchor node.
///
/// The anchor is a node already located for `anchor_path` (a WHERE
/// condition's parent path). A field whose head overlaps the tail of the
/// anchor path is resolved *inside* the anchor's subtree with the overlap
/// skipped, so sibling fields of the matched node are returned rather than
/// same-suffix nodes elsewhere in the document.
pub fn resolve_relative(anchor: &XmlNode, anchor_path: &[String], field: &FieldPath) -> String {
    let overlap = head_overlap(&field.components, anchor_path);
    resolve_first(anchor, &field.tail(overlap))
}

/// Longest `n` such that the first `n` field components equal the last `n`
/// anchor components.
fn head_overlap(field_components: &[String], anchor_path: &[String]) -> usize {
    let most = field_components.len().min(anchor_path.len());
    (0..=most)
        .rev()
        .find(|&n| field_components[..n] == anchor_path[anchor_path.len() - n..])
        .unwrap_or(0)
}

/// Evaluates a single condition against an already-resolved value.
///
/// Null checks test for emptiness; LIKE is an unanchored regex search (a
/// malformed pattern makes the condition false rather than failing the
/// query); numeric comparisons parse both sides as f64 and are false when
/// either side does not parse; everything else compares lexicographically.
pub fn compare(cond: &Condition, value: &str) -> bool {
    match cond.op {
        ComparisonOp::IsNull => value.is_empty(),
        ComparisonOp::IsNotNull => !value.is_empty(),
        ComparisonOp::Like => regex_search(&cond.value, value),
        ComparisonOp::NotLike => !regex_search(&cond.value, value),
        op => {
            if cond.is_numeric {
                let (Ok(left), Ok(right)) = (value.parse::<f64>(), cond.value.parse::<f64>())
                else {
                    return false;
                };
                match op {
                    ComparisonOp::Equal => left == right,
                    ComparisonOp::NotEqual => left != right,
                    ComparisonOp::Less => left < right,
                    ComparisonOp::Greater => left > right,
                    ComparisonOp::LessEqual => left <= right,
                    ComparisonOp::GreaterEqual => left >= right,
                    _ => unreachable!(),
                }
            } else {
                match op {
                    ComparisonOp::Equal => value == cond.value,
                    ComparisonOp::NotEqual => value != cond.value,
                    ComparisonOp::Less => value < cond.value.as_str(),
                    ComparisonOp::Greater => value > cond.value.as_str(),
                    ComparisonOp::LessEqual => value <= cond.value.as_str(),
                    ComparisonOp::GreaterEqual => value >= cond.value.as_str(),
                    _ => unreachable!(),
                }
            }
        }
    }
}

fn regex_search(pattern: &str, value: &str) -> bool {
    Regex::new(pattern)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// Evaluates a WHERE tree, delegating each leaf condition to `eval`.
///
/// Both operands of AND/OR are always evaluated; conditions are
/// side-effect free, so only the truth value matters.
pub fn evaluate_where<F>(expr: &WhereExpr, eval: &F) -> bool
where
    F: Fn(&Condition) -> bool,
{
    match expr {
        WhereExpr::Condition(cond) => eval(cond),
        WhereExpr::Logical { op, left, right } => {
            let left = evaluate_where(left, eval);
            let right = evaluate_where(right, eval);
            match op {
                LogicalOp::And => left && right,
                LogicalOp::Or => left || right,
            }
        }
    }
}

/// Visits every node in the tree, depth-first preorder.
pub fn for_each_node<'a>(root: &'a XmlNode, visit: &mut impl FnMut(&'a XmlNode)) {
    visit(root);
    for child in &root.children {
        for_each_node(child, visit);
    }
}

/// Is this node the direct parent of something the field's last component
/// addresses? Used to pick candidate nodes for top-level WHERE conditions.
pub fn owns_field(node: &XmlNode, field: &FieldPath) -> bool {
    match field.components.last() {
        Some(last) => node.children.iter().any(|child| &child.tag == last),
        None => field
            .attribute_name
            .as_deref()
            .is_some_and(|name| node.attribute(name).is_some()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(xml: &str) -> XmlNode {
        XmlNode::parse(xml).unwrap()
    }

    #[test]
    fn suffix_match_distinguishes_partial_paths() {
        let root = doc(
            "<root><x><y><name>inner</name></y></x><p><q><name>other</name></q></p></root>",
        );
        let qualified = collect_values(&root, &FieldPath::new(vec!["y".into(), "name".into()]));
        assert_eq!(qualified, vec!["inner"]);

        let shorthand = collect_values(&root, &FieldPath::new(vec!["name".into()]));
        assert_eq!(shorthand, vec!["inner", "other"]);
    }

    #[test]
    fn ambiguity_counts_distinct_chains_not_occurrences() {
        let root = doc(
            "<catalog>\
               <shelf><item><name>a</name></item><item><name>b</name></item></shelf>\
               <bin><item><name>c</name></item></bin>\
             </catalog>",
        );
        let components = vec!["item".to_string(), "name".to_string()];
        // Three occurrences but only two distinct ancestor chains
        assert_eq!(count_matching_paths(&root, &components), 2);

        let full = vec!["shelf".to_string(), "item".to_string(), "name".to_string()];
        assert_eq!(count_matching_paths(&root, &full), 1);
    }

    #[test]
    fn relative_resolution_skips_anchor_overlap() {
        let root = doc(
            "<staff><employee><name>Ana</name><salary>100</salary></employee>\
             <employee><name>Bo</name><salary>50</salary></employee></staff>",
        );
        let anchor_path = vec!["staff".to_string(), "employee".to_string()];
        let second = &root.children[1];
        let field = FieldPath::new(vec!["employee".into(), "name".into()]);
        // The overlap with the anchor tail is skipped, so the sibling name
        // under the matched employee is returned
        assert_eq!(resolve_relative(second, &anchor_path, &field), "Bo");
    }

    #[test]
    fn like_is_substring_search_and_bad_patterns_are_false() {
        let cond = Condition {
            field: FieldPath::new(vec!["name".into()]),
            op: ComparisonOp::Like,
            value: "an".into(),
            is_numeric: false,
        };
        assert!(compare(&cond, "banana"));

        let broken = Condition {
            value: "[".into(),
            ..cond
        };
        assert!(!compare(&broken, "anything"));
    }

    #[test]
    fn numeric_comparison_fails_closed_on_unparseable_values() {
        let cond = Condition {
            field: FieldPath::new(vec!["price".into()]),
            op: ComparisonOp::Greater,
            value: "10".into(),
            is_numeric: true,
        };
        assert!(compare(&cond, "10.5"));
        assert!(!compare(&cond, "n/a"));
    }

    #[test]
    fn attribute_values_resolve_from_matched_nodes() {
        let root = doc(r#"<inv><book isbn="111"><t>x</t></book><book isbn="222"/></inv>"#);
        let mut field = FieldPath::new(vec!["book".into()]);
        field.is_attribute = true;
        field.attribute_name = Some("isbn".into());
        assert_eq!(collect_values(&root, &field), vec!["111", "222"]);
    }
}
