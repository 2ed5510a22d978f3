//! Envelope text: declaration, root tag, authentication block, closing tag.
//!
//! Line order is fixed: header, authentication, body, footer.

use crate::common::config::Credentials;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
pub const NAMESPACE: &str = "http://www.vantivcnp.com/schema";
pub const ROOT_ELEMENT: &str = "cnpRequest";

pub fn header(version: &str, num_batch_requests: usize) -> String {
    format!(
        "{XML_DECLARATION}\n<{ROOT_ELEMENT} version=\"{}\" xmlns=\"{NAMESPACE}\" \
         numBatchRequests=\"{num_batch_requests}\">\n",
        escape(version)
    )
}

pub fn authentication_block(credentials: &Credentials) -> String {
    format!(
        "<authentication><user>{}</user><password>{}</password></authentication>\n",
        escape(&credentials.user),
        escape(&credentials.password)
    )
}

pub fn footer() -> String {
    format!("</{ROOT_ELEMENT}>\n")
}

/// Escapes text for element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Byte range of the first element start tag, skipping declarations and comments.
fn root_start_tag(fragment: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    while let Some(rel) = fragment[offset..].find('<') {
        let start = offset + rel;
        let rest = &fragment[start..];
        if rest.starts_with("<?") || rest.starts_with("<!") {
            let close = if rest.starts_with("<!--") { "-->" } else { ">" };
            offset = start + rest.find(close)? + close.len();
            continue;
        }
        let end = start + rest.find('>')?;
        return Some((start, end));
    }
    None
}

/// Whether the root element already carries attribute `name`.
pub fn has_root_attribute(fragment: &str, name: &str) -> bool {
    let Some((start, end)) = root_start_tag(fragment) else {
        return false;
    };
    let tag = &fragment[start..end];
    tag.split(|c: char| c.is_whitespace())
        .skip(1)
        .any(|part| part.starts_with(&format!("{name}=")))
}

/// Name of the root element.
pub fn root_name(document: &str) -> Option<&str> {
    let (start, end) = root_start_tag(document)?;
    let tag = &document[start + 1..end];
    let len = tag
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(tag.len());
    Some(&tag[..len])
}

/// Value of attribute `name` on the root element, quotes stripped.
pub fn root_attribute(document: &str, name: &str) -> Option<String> {
    let (start, end) = root_start_tag(document)?;
    let tag = &document[start..end];
    let needle = format!("{name}=");
    let mut search = 0;
    while let Some(rel) = tag[search..].find(&needle) {
        let at = search + rel;
        let preceded_by_space = tag[..at].ends_with(|c: char| c.is_whitespace());
        let value_start = at + needle.len();
        search = value_start;
        if !preceded_by_space {
            continue;
        }
        let quote = tag[value_start..].chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let rest = &tag[value_start + 1..];
        let close = rest.find(quote)?;
        return Some(rest[..close].to_string());
    }
    None
}

/// Adds `name="value"` to the root element unless already present.
///
/// Fragments without an element are returned unchanged.
pub fn inject_root_attribute(fragment: &str, name: &str, value: &str) -> String {
    if has_root_attribute(fragment, name) {
        return fragment.to_string();
    }
    let Some((start, end)) = root_start_tag(fragment) else {
        return fragment.to_string();
    };
    let tag = &fragment[start + 1..end];
    let name_len = tag
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(tag.len());
    let insert_at = start + 1 + name_len;

    let mut out = String::with_capacity(fragment.len() + name.len() + value.len() + 4);
    out.push_str(&fragment[..insert_at]);
    out.push_str(&format!(" {name}=\"{}\"", escape(value)));
    out.push_str(&fragment[insert_at..]);
    out
}
