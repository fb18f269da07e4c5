//! Mail body parsing: sender allow-list check, HTML anchor extraction, and
//! the regex fallback (`SPEC_FULL.md` §6, grounded in
//! `original_source/tarxiv/alerts.py`'s `parse_message`).

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::AdapterError;

/// `\b(20\d{2}[a-z]{2,3})\b`: a TNS-style name, a four-digit year
/// immediately followed by two-to-three lowercase letters.
fn name_regex() -> &'static Regex {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    NAME_REGEX.get_or_init(|| Regex::new(r"\b(20\d{2}[a-z]{2,3})\b").expect("static regex is valid"))
}

/// Parse a raw RFC 5322 message, returning the primary names it
/// advertises, or `Ok(vec![])` if the sender is not allow-listed or the
/// body carries none.
pub fn extract_names(raw: &[u8], allowed_senders: &[String]) -> Result<Vec<String>, AdapterError> {
    let parsed = mailparse::parse_mail(raw)
        .map_err(|e| AdapterError::SchemaParse { survey: "imap".into(), obj_name: "unknown".into(), source: e.into() })?;

    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    if !allowed_senders.iter().any(|sender| from.contains(sender.as_str())) {
        return Ok(Vec::new());
    }

    let body = body_text(&parsed);
    Ok(names_from_body(&body))
}

fn body_text(parsed: &mailparse::ParsedMail) -> String {
    if parsed.subparts.is_empty() {
        return parsed.get_body().unwrap_or_default();
    }
    for part in &parsed.subparts {
        if part.ctype.mimetype == "text/html" {
            if let Ok(body) = part.get_body() {
                return body;
            }
        }
    }
    for part in &parsed.subparts {
        if part.ctype.mimetype == "text/plain" {
            if let Ok(body) = part.get_body() {
                return body;
            }
        }
    }
    String::new()
}

/// Anchor-tag text first; if no `<a>` tags yield a name, fall back to the
/// plain-text regex over the whole body.
fn names_from_body(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("a[href]").expect("static selector is valid");
    let anchors: Vec<String> =
        document.select(&selector).map(|el| el.text().collect::<String>().trim().to_string()).filter(|s| !s.is_empty()).collect();

    if !anchors.is_empty() {
        return anchors;
    }

    name_regex().captures_iter(body).map(|c| c[1].to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_text_takes_priority_over_regex() {
        let body = r#"<html><body><a href="https://tns/obj/2025abc">2025abc</a></body></html>"#;
        assert_eq!(names_from_body(body), vec!["2025abc".to_string()]);
    }

    #[test]
    fn falls_back_to_regex_when_no_anchors() {
        let body = "New transient 2025xyz reported, see details.";
        assert_eq!(names_from_body(body), vec!["2025xyz".to_string()]);
    }

    #[test]
    fn no_match_yields_empty() {
        assert!(names_from_body("nothing interesting here").is_empty());
    }
}
