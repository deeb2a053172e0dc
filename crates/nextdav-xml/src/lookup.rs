//! Namespace-tolerant lookups.
//!
//! Servers pick their own prefixes (`d:`, `D:`, `ns0:`, a default namespace
//! with no prefix at all), and the parsed tree keeps whatever they chose.
//! Lookups therefore try a fixed list of known spellings first and only
//! then scan the element's own keys: first for a matching local name, then
//! for any key containing the name, both ignoring ASCII case.

use crate::tree::{XmlObject, XmlTree, XmlValue};

/// Returns the local part of a qualified name (`d:href` -> `href`).
pub fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Finds a child of `object` by trying `aliases` in order, then falling back
/// to a scan for `local`.
pub fn find_child<'a>(object: &'a XmlObject, aliases: &[&str], local: &str) -> Option<&'a XmlValue> {
    aliases
        .iter()
        .find_map(|alias| object.get(alias))
        .or_else(|| find_by_local_name(object, local))
}

fn find_by_local_name<'a>(object: &'a XmlObject, local: &str) -> Option<&'a XmlValue> {
    let needle = local.to_ascii_lowercase();
    object
        .children()
        .iter()
        .find(|(key, _)| local_name(key).eq_ignore_ascii_case(local))
        .or_else(|| {
            object
                .children()
                .iter()
                .find(|(key, _)| key.to_ascii_lowercase().contains(&needle))
        })
        .map(|(_, value)| value)
}

/// All occurrences of a child found via [`find_child`], a lone value
/// wrapped as a one-element slice.
pub fn find_children<'a>(object: &'a XmlObject, aliases: &[&str], local: &str) -> &'a [XmlValue] {
    find_child(object, aliases, local)
        .map(XmlValue::as_slice)
        .unwrap_or_default()
}

/// Text of the first occurrence of a child found via [`find_child`].
pub fn find_text<'a>(object: &'a XmlObject, aliases: &[&str], local: &str) -> Option<&'a str> {
    find_child(object, aliases, local)
        .and_then(XmlValue::first)
        .and_then(XmlValue::as_text)
}

/// Locates the multistatus element of a parsed response.
///
/// Returns `None` when there is none, or when it carries neither attributes
/// nor children.
pub fn get_multistatus(tree: &XmlTree) -> Option<&XmlObject> {
    find_child(tree.document(), &["d:multistatus", "multistatus"], "multistatus")
        .and_then(XmlValue::first)
        .and_then(XmlValue::as_object)
}

/// The response elements of a multistatus, whether the server sent one or
/// many. Responses without children are skipped.
pub fn get_responses(multistatus: &XmlObject) -> Vec<&XmlObject> {
    find_children(multistatus, &["d:response", "response"], "response")
        .iter()
        .filter_map(XmlValue::as_object)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse_xml};

    fn parse(xml: &str) -> XmlTree {
        parse_xml(xml, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn local_names() {
        assert_eq!(local_name("d:href"), "href");
        assert_eq!(local_name("href"), "href");
    }

    #[test]
    fn finds_prefixed_multistatus() {
        let tree = parse(
            r#"<d:multistatus xmlns:d="DAV:"><d:response><d:href>/a</d:href></d:response></d:multistatus>"#,
        );
        let ms = get_multistatus(&tree).unwrap();
        let responses = get_responses(ms);
        assert_eq!(responses.len(), 1);
        assert_eq!(find_text(responses[0], &["d:href", "href"], "href"), Some("/a"));
    }

    #[test]
    fn finds_default_namespace_multistatus() {
        let tree = parse(
            r#"<multistatus xmlns="DAV:"><response><href>/a</href></response><response><href>/b</href></response></multistatus>"#,
        );
        let responses = get_responses(get_multistatus(&tree).unwrap());
        let hrefs: Vec<_> = responses
            .iter()
            .filter_map(|r| find_text(r, &["d:href", "href"], "href"))
            .collect();
        assert_eq!(hrefs, ["/a", "/b"]);
    }

    #[test]
    fn falls_back_to_unknown_prefixes() {
        let tree = parse(
            r#"<D:multistatus xmlns:D="DAV:"><D:response><D:href>/x</D:href></D:response></D:multistatus>"#,
        );
        let ms = get_multistatus(&tree).unwrap();
        let responses = get_responses(ms);
        assert_eq!(responses.len(), 1);
        assert_eq!(find_text(responses[0], &["d:href", "href"], "href"), Some("/x"));
    }

    #[test]
    fn local_name_match_beats_substring() {
        let tree = parse(
            r#"<ns0:multistatus xmlns:ns0="DAV:"><ns0:responsedescription>note</ns0:responsedescription><ns0:response><ns0:href>/y</ns0:href></ns0:response></ns0:multistatus>"#,
        );
        let responses = get_responses(get_multistatus(&tree).unwrap());
        assert_eq!(responses.len(), 1);
        assert_eq!(find_text(responses[0], &[], "href"), Some("/y"));
    }

    #[test]
    fn missing_multistatus_is_none() {
        let tree = parse("<error><message>nope</message></error>");
        assert!(get_multistatus(&tree).is_none());

        let tree = parse(r#"<d:multistatus xmlns:d="DAV:"/>"#);
        let ms = get_multistatus(&tree).unwrap();
        assert!(get_responses(ms).is_empty());
    }
}
