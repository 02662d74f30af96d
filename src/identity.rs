// src/identity.rs
use regex::Regex;
use std::sync::OnceLock;

/// `FUNC("<url>","<caption>")`, optionally prefixed with `=` as spreadsheets export it.
fn structured_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*=?\s*[A-Za-z_][A-Za-z0-9_.]*\(\s*"([^"]*)"\s*,\s*"([^"]*)"\s*\)\s*$"#)
            .expect("invalid structured label regex")
    })
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"address/([^"]+)"#).expect("invalid address regex"))
}

/// Splits a structured label into (url, caption).
fn decode(label: &str) -> Option<(&str, &str)> {
    let caps = structured_re().captures(label)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Address embedded in the label's URL, or the label itself.
pub fn extract_address(label: &str) -> String {
    decode(label)
        .and_then(|(url, _)| address_re().captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| label.to_string())
}

/// Caption of a structured label, or the label itself.
pub fn extract_display_name(label: &str) -> String {
    decode(label)
        .map(|(_, caption)| caption.to_string())
        .unwrap_or_else(|| label.to_string())
}
