use fantoccini::Locator;
use regex::Regex;
use std::sync::OnceLock;

/// A parsed element selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    XPath(String),
}

fn has_text_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*([A-Za-z][\w-]*)?\s*:has-text\(\s*(?:'([^']*)'|"([^"]*)")\s*\)\s*$"#).ok()
    })
    .as_ref()
}

impl Selector {
    /// Parse a selector string as written in sequence definitions.
    ///
    /// `xpath=...` and strings starting with `//` are XPath,
    /// `tag:has-text('X')` is rewritten to XPath, anything else is CSS.
    ///
    /// ```
    /// use orvi_drivers::Selector;
    ///
    /// assert_eq!(
    ///     Selector::parse("button:has-text('Entendido')"),
    ///     Selector::XPath("//button[contains(normalize-space(.), 'Entendido')]".into())
    /// );
    /// assert_eq!(Selector::parse("#user"), Selector::Css("#user".into()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(xpath) = trimmed.strip_prefix("xpath=") {
            return Selector::XPath(xpath.to_string());
        }
        if trimmed.starts_with("//") {
            return Selector::XPath(trimmed.to_string());
        }
        if let Some(caps) = has_text_re().and_then(|re| re.captures(trimmed)) {
            let tag = caps.get(1).map_or("*", |m| m.as_str());
            let text = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            return Selector::XPath(format!(
                "//{tag}[contains(normalize-space(.), {})]",
                xpath_literal(text)
            ));
        }
        Selector::Css(trimmed.to_string())
    }

    pub fn locator(&self) -> Locator<'_> {
        match self {
            Selector::Css(css) => Locator::Css(css),
            Selector::XPath(xpath) => Locator::XPath(xpath),
        }
    }
}

/// Quote `text` as an XPath string literal.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}
