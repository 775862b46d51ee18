//! Page parsing
//!
//! The crawl driver only depends on the [`PageParser`] trait. The
//! [`HtmlListingParser`] implementation extracts listings and fields with
//! CSS selectors taken from the configuration.

use crate::config::ParserConfig;
use crate::state::{ListingFields, ListingRef};
use crate::url::derive_listing_id;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Which layout a page is expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Index,
    Detail,
}

/// Structured content of a parsed page
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPage {
    /// A listing overview page
    Index {
        /// Listings linked from this page, in page order
        refs: Vec<ListingRef>,
        /// The next index page; `None` ends pagination
        next_page: Option<Url>,
    },

    /// A single listing's page
    Detail { fields: ListingFields },
}

/// A page that could not be parsed; never retried
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Body of {url} is not valid UTF-8")]
    Encoding { url: String },

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Detail page {url} matched none of the configured fields")]
    NoFields { url: String },
}

/// Turns raw page bytes into listing references or listing fields
pub trait PageParser: Send + Sync {
    fn parse(&self, body: &[u8], kind: PageKind, url: &Url) -> Result<ParsedPage, ParseError>;
}

/// CSS-selector driven parser for listing sites
#[derive(Debug, Clone)]
pub struct HtmlListingParser {
    config: ParserConfig,
}

impl HtmlListingParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    fn parse_index(&self, document: &Html, url: &Url) -> Result<ParsedPage, ParseError> {
        let listing_selector = selector(&self.config.listing_selector)?;
        let link_selector = selector(&self.config.link_selector)?;
        let next_selector = selector(&self.config.next_page_selector)?;

        let mut refs = Vec::new();
        for item in document.select(&listing_selector) {
            if let Some(marker) = &self.config.skip_marker {
                if element_text(&item).contains(marker.as_str()) {
                    tracing::debug!("Skipping listing marked '{}' on {}", marker, url);
                    continue;
                }
            }

            let Some(href) = item
                .select(&link_selector)
                .find_map(|link| link.value().attr("href"))
            else {
                tracing::debug!("Listing without link on {}", url);
                continue;
            };

            let Some(listing_url) = resolve_link(href, url) else {
                continue;
            };

            let id = self
                .config
                .id_attribute
                .as_deref()
                .and_then(|attr| item.value().attr(attr))
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| derive_listing_id(&listing_url));

            refs.push(ListingRef::new(id, listing_url));
        }

        let next_page = document
            .select(&next_selector)
            .filter_map(|link| link.value().attr("href"))
            .find_map(|href| resolve_link(href, url));

        Ok(ParsedPage::Index { refs, next_page })
    }

    fn parse_detail(&self, document: &Html, url: &Url) -> Result<ParsedPage, ParseError> {
        let mut fields = ListingFields::new();
        let mut matched = 0;

        for (name, rule) in &self.config.fields {
            let (css, attr) = match rule.split_once('@') {
                Some((css, attr)) => (css, Some(attr)),
                None => (rule.as_str(), None),
            };
            let field_selector = selector(css)?;

            let value = document.select(&field_selector).next().and_then(|element| {
                match attr {
                    Some(attr) => element.value().attr(attr).map(|v| v.trim().to_string()),
                    None => Some(element_text(&element)),
                }
            });

            match value {
                Some(text) if !text.is_empty() => {
                    matched += 1;
                    fields.insert(name.clone(), Value::String(text));
                }
                _ => {
                    fields.insert(name.clone(), Value::Null);
                }
            }
        }

        if matched == 0 && !self.config.fields.is_empty() {
            return Err(ParseError::NoFields {
                url: url.to_string(),
            });
        }

        Ok(ParsedPage::Detail { fields })
    }
}

impl PageParser for HtmlListingParser {
    fn parse(&self, body: &[u8], kind: PageKind, url: &Url) -> Result<ParsedPage, ParseError> {
        let html = std::str::from_utf8(body).map_err(|_| ParseError::Encoding {
            url: url.to_string(),
        })?;
        let document = Html::parse_document(html);

        match kind {
            PageKind::Index => self.parse_index(&document, url),
            PageKind::Detail => self.parse_detail(&document, url),
        }
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector {
        selector: css.to_string(),
        message: format!("{:?}", e),
    })
}

/// Whitespace-collapsed text content of an element
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves a link href to an absolute HTTP(S) URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: and data: links
/// - fragment-only links
/// - links that do not resolve to HTTP(S)
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn parser_config() -> ParserConfig {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), "h1#viewad-title".to_string());
        fields.insert("price".to_string(), "#viewad-price".to_string());
        fields.insert("image".to_string(), "#viewad-image@src".to_string());

        ParserConfig {
            listing_selector: "article.aditem".to_string(),
            link_selector: "a.ellipsis".to_string(),
            id_attribute: Some("data-adid".to_string()),
            next_page_selector: "a.pagination-next".to_string(),
            skip_marker: Some("TOP Anzeige".to_string()),
            fields,
        }
    }

    fn base_url() -> Url {
        Url::parse("https://listings.example.com/s-xbox/k0").unwrap()
    }

    fn parse_index(html: &str) -> (Vec<ListingRef>, Option<Url>) {
        let parser = HtmlListingParser::new(parser_config());
        match parser
            .parse(html.as_bytes(), PageKind::Index, &base_url())
            .unwrap()
        {
            ParsedPage::Index { refs, next_page } => (refs, next_page),
            other => panic!("expected index page, got {:?}", other),
        }
    }

    #[test]
    fn test_index_page_listings_and_next_link() {
        let html = r#"
            <html><body>
              <article class="aditem" data-adid="111">
                <a class="ellipsis" href="/s-anzeige/xbox-one/111-279-3331">Xbox One</a>
              </article>
              <article class="aditem" data-adid="222">
                <a class="ellipsis" href="/s-anzeige/xbox-360/222-279-3331">Xbox 360</a>
              </article>
              <a class="pagination-next" href="/s-xbox/seite:2/k0">Next</a>
            </body></html>
        "#;

        let (refs, next) = parse_index(html);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id, "111");
        assert_eq!(
            refs[0].url.as_str(),
            "https://listings.example.com/s-anzeige/xbox-one/111-279-3331"
        );
        assert_eq!(refs[1].id, "222");
        assert_eq!(
            next.unwrap().as_str(),
            "https://listings.example.com/s-xbox/seite:2/k0"
        );
    }

    #[test]
    fn test_last_index_page_has_no_next() {
        let html = r#"
            <article class="aditem" data-adid="333">
              <a class="ellipsis" href="/s-anzeige/xbox/333-1-2">Xbox</a>
            </article>
        "#;
        let (refs, next) = parse_index(html);
        assert_eq!(refs.len(), 1);
        assert!(next.is_none());
    }

    #[test]
    fn test_empty_index_page_with_next_link_keeps_paginating() {
        let html = r#"<a class="pagination-next" href="?page=3">Next</a>"#;
        let (refs, next) = parse_index(html);
        assert!(refs.is_empty());
        assert_eq!(
            next.unwrap().as_str(),
            "https://listings.example.com/s-xbox/k0?page=3"
        );
    }

    #[test]
    fn test_id_derived_from_url_without_attribute() {
        let html = r#"
            <article class="aditem">
              <a class="ellipsis" href="/s-anzeige/xbox/444-1-2">Xbox</a>
            </article>
        "#;
        let (refs, _) = parse_index(html);
        assert_eq!(refs[0].id, "444");
    }

    #[test]
    fn test_sponsored_listings_are_skipped() {
        let html = r#"
            <article class="aditem" data-adid="555">
              <a class="ellipsis" href="/s-anzeige/xbox/555-1-2">Xbox</a>
              <div class="aditem-addon">TOP Anzeige</div>
            </article>
            <article class="aditem" data-adid="666">
              <a class="ellipsis" href="/s-anzeige/xbox/666-1-2">Xbox</a>
              <div class="aditem-addon">Heute, 10:15</div>
            </article>
        "#;
        let (refs, _) = parse_index(html);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "666");
    }

    #[test]
    fn test_listing_links_to_other_schemes_are_ignored() {
        let html = r#"
            <article class="aditem" data-adid="777">
              <a class="ellipsis" href="javascript:void(0)">Xbox</a>
            </article>
        "#;
        let (refs, _) = parse_index(html);
        assert!(refs.is_empty());
    }

    #[test]
    fn test_detail_page_fields() {
        let html = r#"
            <html><body>
              <h1 id="viewad-title">  Xbox One   S </h1>
              <h2 id="viewad-price">90 € VB</h2>
            </body></html>
        "#;
        let parser = HtmlListingParser::new(parser_config());
        let parsed = parser
            .parse(html.as_bytes(), PageKind::Detail, &base_url())
            .unwrap();

        let ParsedPage::Detail { fields } = parsed else {
            panic!("expected detail page");
        };
        assert_eq!(fields["title"], json!("Xbox One S"));
        assert_eq!(fields["price"], json!("90 € VB"));
        assert_eq!(fields["image"], Value::Null);
    }

    #[test]
    fn test_detail_attribute_field() {
        let html = r#"<h1 id="viewad-title">Kommode</h1><img id="viewad-image" src="https://img.example.com/1.jpg">"#;
        let parser = HtmlListingParser::new(parser_config());
        let ParsedPage::Detail { fields } = parser
            .parse(html.as_bytes(), PageKind::Detail, &base_url())
            .unwrap()
        else {
            panic!("expected detail page");
        };
        assert_eq!(fields["image"], json!("https://img.example.com/1.jpg"));
    }

    #[test]
    fn test_detail_page_without_fields_is_parse_error() {
        let parser = HtmlListingParser::new(parser_config());
        let result = parser.parse(
            b"<html><body>Diese Anzeige ist nicht mehr verfuegbar</body></html>",
            PageKind::Detail,
            &base_url(),
        );
        assert!(matches!(result, Err(ParseError::NoFields { .. })));
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let parser = HtmlListingParser::new(parser_config());
        let result = parser.parse(&[0xff, 0xfe, 0x00], PageKind::Index, &base_url());
        assert!(matches!(result, Err(ParseError::Encoding { .. })));
    }
}
