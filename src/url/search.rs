use crate::config::SearchConfig;

/// Formats search keywords the way the site expects them in a path segment
///
/// Keywords are lowercased and whitespace-separated words joined with `-`.
pub fn format_keywords(keywords: &str) -> String {
    keywords
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Renders the index page URL for a search query
///
/// Unset price bounds and location render as empty strings.
pub fn render_search_url(search: &SearchConfig, page: u32) -> String {
    let price = |p: Option<u32>| p.map(|v| v.to_string()).unwrap_or_default();

    search
        .url_template
        .replace("{keywords}", &format_keywords(&search.keywords))
        .replace("{location}", search.location.as_deref().unwrap_or(""))
        .replace("{min_price}", &price(search.min_price))
        .replace("{max_price}", &price(search.max_price))
        .replace("{page}", &page.to_string())
}
