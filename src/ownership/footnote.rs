use itertools::Itertools;
use roxmltree::Node;

use super::model::Footnote;
use super::xml::{child, children, descendants_named, path};
use crate::edgar::parsing::text::non_empty;

const FOOTNOTE_TAG: &str = "footnoteId";

/// One way of finding footnote markers under a transaction element.
pub type FootnoteStrategy = fn(Node) -> Vec<String>;

/// Marker layouts differ between filers, so every strategy runs and the
/// results are merged in this order.
pub const STRATEGIES: &[(&str, FootnoteStrategy)] = &[
    ("standalone_elements", standalone_elements),
    ("inline_attributes", inline_attributes),
    ("parent_elements", parent_elements),
    ("hotspot_fields", hotspot_fields),
];

// Fields that most often carry a footnote marker.
const HOTSPOTS: &[&[&str]] = &[
    &["exerciseDate"],
    &["transactionAmounts", "transactionPricePerShare"],
    &["securityTitle"],
    &["conversionOrExercisePrice"],
];

fn id_of(node: Node) -> Option<String> {
    node.attribute("id").and_then(non_empty)
}

/// `<footnoteId id="F1"/>` anywhere below the element.
pub fn standalone_elements(node: Node) -> Vec<String> {
    descendants_named(node, FOOTNOTE_TAG)
        .filter_map(id_of)
        .collect()
}

/// `<transactionDate footnoteId="F2">` style attributes.
pub fn inline_attributes(node: Node) -> Vec<String> {
    node.descendants()
        .filter(|n| n.is_element())
        .filter_map(|n| n.attribute(FOOTNOTE_TAG))
        .flat_map(|raw| raw.split(|c: char| c == ',' || c.is_whitespace()))
        .filter_map(non_empty)
        .collect()
}

/// Walks elements and reads the ids of their direct `footnoteId` children.
pub fn parent_elements(node: Node) -> Vec<String> {
    node.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() != FOOTNOTE_TAG)
        .flat_map(|n| children(n, FOOTNOTE_TAG).filter_map(id_of).collect::<Vec<_>>())
        .collect()
}

/// Checks the known hotspot fields, and their `<value>` wrappers, directly.
pub fn hotspot_fields(node: Node) -> Vec<String> {
    HOTSPOTS
        .iter()
        .filter_map(|names| path(node, names))
        .flat_map(|field| {
            let mut ids: Vec<String> = children(field, FOOTNOTE_TAG).filter_map(id_of).collect();
            if let Some(value) = child(field, "value") {
                ids.extend(children(value, FOOTNOTE_TAG).filter_map(id_of));
            }
            ids
        })
        .collect()
}

/// Union of all strategies, first-seen order, no repeats.
pub fn footnote_ids(node: Node) -> Vec<String> {
    STRATEGIES
        .iter()
        .flat_map(|(_, strategy)| strategy(node))
        .unique()
        .collect()
}

/// Footnote bodies from the document's `<footnotes>` section.
pub fn collect_footnotes(root: Node) -> Vec<Footnote> {
    let Some(section) = child(root, "footnotes") else {
        return Vec::new();
    };
    children(section, "footnote")
        .filter_map(|node| {
            let id = id_of(node)?;
            let text: String = node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect::<Vec<_>>()
                .join(" ");
            Some(Footnote {
                id,
                text: non_empty(&text).unwrap_or_default(),
            })
        })
        .unique_by(|f| f.id.clone())
        .collect()
}
