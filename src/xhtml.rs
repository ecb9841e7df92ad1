use scraper::{ElementRef, Node};

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Serialize the children of `element` as well-formed XHTML.
///
/// Void elements are self-closed, text and attribute values are escaped and
/// character references come out as the characters they stand for. Comments,
/// doctypes and attributes whose names are not valid XML names are dropped.
pub fn inner_xhtml(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_children(element, &mut out);
    out
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let value = element.value();
    let name = value.name();

    out.push('<');
    out.push_str(name);
    for (attr, attr_value) in value.attrs() {
        if !is_xml_name(attr) {
            continue;
        }
        out.push_str(&format!(" {}=\"{}\"", attr, escape_attr(attr_value)));
    }

    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }

    out.push('>');
    write_children(element, out);
    out.push_str(&format!("</{}>", name));
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
