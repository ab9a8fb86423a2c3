//! Block-notice payload
//!
//! A blocked navigation is redirected to the block-notice page with `type`,
//! `match`, and `url` query parameters. The page logs the event and offers
//! credential-gated allow actions; this module owns the payload encoding and
//! the display helpers it shares with the log.

use url::form_urlencoded;

use crate::types::BlockKind;

/// Payload handed to the block-notice page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNotice {
    pub kind: BlockKind,
    pub matched: String,
    pub url: String,
}

impl BlockNotice {
    /// Encode as the notice page's query string.
    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("type", self.kind.as_str())
            .append_pair("match", &self.matched)
            .append_pair("url", &self.url)
            .finish()
    }

    /// Decode a notice query string. Missing `match`/`url` parameters come
    /// back empty; an unknown `type` is a parse failure.
    pub fn parse_query(query: &str) -> Option<Self> {
        let mut kind = None;
        let mut matched = None;
        let mut url = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "type" => kind = BlockKind::from_param(&value),
                "match" => matched = Some(value.into_owned()),
                "url" => url = Some(value.into_owned()),
                _ => {}
            }
        }
        Some(Self {
            kind: kind?,
            matched: matched.unwrap_or_default(),
            url: url.unwrap_or_default(),
        })
    }

    /// Human-readable reason line, as shown on the notice page and stored in
    /// the block log.
    pub fn reason(&self) -> String {
        match self.kind {
            BlockKind::Domain => format!("Blocked domain: {}", self.matched),
            BlockKind::Subdomain => format!("Blocked subdomain: *.{}", self.matched),
            BlockKind::Keyword => format!("Blocked keyword: \"{}\"", self.matched),
        }
    }
}

/// Obfuscate a URL for display: keep the host, mangle every path segment so
/// the log never reproduces the full address.
pub fn obfuscate_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) if parsed.host_str().is_some() => {
            let host = parsed.host_str().unwrap_or_default();
            let obfuscated = parsed
                .path()
                .split('/')
                .filter(|part| !part.is_empty())
                .map(obfuscate_segment)
                .collect::<Vec<_>>()
                .join("/");
            if obfuscated.is_empty() {
                host.to_string()
            } else {
                format!("{host}/{obfuscated}")
            }
        }
        _ => {
            let chars: Vec<char> = raw.chars().collect();
            if chars.len() <= 10 {
                "***".to_string()
            } else {
                let head: String = chars[..3].iter().collect();
                let tail: String = chars[chars.len() - 3..].iter().collect();
                format!("{head}***{tail}")
            }
        }
    }
}

fn obfuscate_segment(part: &str) -> String {
    let chars: Vec<char> = part.chars().collect();
    if chars.len() <= 6 {
        "***".to_string()
    } else {
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{head}***{tail}")
    }
}
