use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, ParserConfig, SearchConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_seed_source(config)?;
    validate_parser_config(&config.parser)?;
    Ok(())
}

/// Validates crawler pacing and retry settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_interval_ms < 0 {
        return Err(ConfigError::Validation(format!(
            "request_interval_ms must be >= 0, got {}ms",
            config.request_interval_ms
        )));
    }

    if config.workers < 1 || config.workers > 16 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 16, got {}",
            config.workers
        )));
    }

    if config.max_fetch_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_fetch_attempts must be >= 1, got {}",
            config.max_fetch_attempts
        )));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms ({}) must not exceed backoff_max_ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_index_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_index_pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates client identification
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    if let Some(browser) = &config.browser_string {
        if browser.trim().is_empty() {
            return Err(ConfigError::Validation(
                "browser_string cannot be blank".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.results_path.is_empty() {
        return Err(ConfigError::Validation(
            "results_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates that exactly one seed source is configured and resolves to an HTTP(S) URL
fn validate_seed_source(config: &Config) -> Result<(), ConfigError> {
    if let Some(search) = &config.search {
        validate_search_config(search)?;
    }

    let seed = config.seed_url()?;
    if seed.scheme() != "http" && seed.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Seed URL '{}' must use HTTP or HTTPS",
            seed
        )));
    }

    Ok(())
}

fn validate_search_config(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.keywords.trim().is_empty() {
        return Err(ConfigError::Validation(
            "search keywords cannot be empty".to_string(),
        ));
    }

    if !search.url_template.contains("{keywords}") {
        return Err(ConfigError::Validation(
            "url_template must contain a {keywords} placeholder".to_string(),
        ));
    }

    if let (Some(min), Some(max)) = (search.min_price, search.max_price) {
        if min > max {
            return Err(ConfigError::Validation(format!(
                "min_price ({}) must not exceed max_price ({})",
                min, max
            )));
        }
    }

    Ok(())
}

/// Validates that every configured selector parses
fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    validate_selector("listing_selector", &config.listing_selector)?;
    validate_selector("link_selector", &config.link_selector)?;
    validate_selector("next_page_selector", &config.next_page_selector)?;

    for (name, rule) in &config.fields {
        let selector = rule.split_once('@').map_or(rule.as_str(), |(sel, _)| sel);
        validate_selector(name, selector)?;
    }

    Ok(())
}

fn validate_selector(name: &str, selector: &str) -> Result<(), ConfigError> {
    if selector.trim().is_empty() {
        return Err(ConfigError::InvalidSelector(format!("{} is empty", name)));
    }

    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", name, selector, e)))
}
