use chrono::NaiveDate;
use roxmltree::Node;
use rust_decimal::Decimal;

use crate::edgar::parsing::text::non_empty;
use crate::edgar::parsing::values::{parse_date, parse_decimal, parse_flag};

pub const ROOT_TAG: &str = "ownershipDocument";

/// Finds the embedded ownership document inside a submission (or returns the
/// whole input when it already is one). The XML declaration is dropped.
pub fn locate_ownership_xml(raw_text: &str) -> Option<&str> {
    let start = raw_text.find(&format!("<{}", ROOT_TAG))?;
    let closing = format!("</{}>", ROOT_TAG);
    let end = raw_text[start..].find(&closing)? + start + closing.len();
    Some(&raw_text[start..end])
}

pub fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

pub fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

pub fn descendants_named<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

pub fn path<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    names.iter().try_fold(node, |current, name| child(current, name))
}

/// Text of the element at `names`. Ownership documents wrap most values in a
/// `<value>` child, but older filings put the text directly on the element.
pub fn value_at(node: Node, names: &[&str]) -> Option<String> {
    let target = path(node, names)?;
    let text = match child(target, "value") {
        Some(value) => value.text(),
        None => target.text(),
    }?;
    non_empty(text)
}

pub fn flag_at(node: Node, names: &[&str]) -> Option<bool> {
    value_at(node, names).and_then(|v| parse_flag(&v))
}

pub fn date_at(node: Node, names: &[&str]) -> Option<NaiveDate> {
    value_at(node, names).and_then(|v| parse_date(&v))
}

pub fn decimal_at(node: Node, names: &[&str]) -> Option<Decimal> {
    value_at(node, names).and_then(|v| parse_decimal(&v))
}
