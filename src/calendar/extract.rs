//! Accessors for the pieces of a `DAV:multistatus` document the agenda needs.

fn prop(element: &xmltree::Element) -> Option<&xmltree::Element> {
    element
        .get_child("propstat")
        .and_then(|e| e.get_child("prop"))
}

/// All `response` children of a multistatus root.
pub fn responses(root: &xmltree::Element) -> impl Iterator<Item = &xmltree::Element> {
    root.children
        .iter()
        .filter_map(|c| c.as_element())
        .filter(|e| e.name == "response")
}

pub fn href(element: &xmltree::Element) -> Option<String> {
    element
        .get_child("href")
        .and_then(xmltree::Element::get_text)
        .map(|e| e.trim().to_owned())
}

/// The `getetag` property, with the surrounding quotes removed.
pub fn etag(element: &xmltree::Element) -> Option<String> {
    prop(element)
        .and_then(|e| e.get_child("getetag"))
        .and_then(xmltree::Element::get_text)
        .map(|e| unquote(&e).to_owned())
}

pub fn event_data(element: &xmltree::Element) -> Option<String> {
    prop(element)
        .and_then(|e| e.get_child("calendar-data"))
        .and_then(xmltree::Element::get_text)
        .map(|e| e.to_string())
}

/// The collection's `getctag`. A present but empty element yields an empty
/// string, a missing one yields `None`.
pub fn ctag(element: &xmltree::Element) -> Option<String> {
    prop(element)
        .and_then(|e| e.get_child("getctag"))
        .map(|e| e.get_text().map_or_else(String::new, |s| s.trim().to_owned()))
}

pub fn unquote(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}
