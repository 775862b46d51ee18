use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Fields extracted from a detail page, keyed by field name
pub type ListingFields = BTreeMap<String, serde_json::Value>;

/// A listing discovered on an index page
///
/// Converted into exactly one detail fetch and then retired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRef {
    /// Site-assigned or derived listing id
    pub id: String,

    /// Absolute URL of the detail page
    pub url: Url,

    /// When the listing was seen on an index page
    pub discovered_at: DateTime<Utc>,
}

impl ListingRef {
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            discovered_at: Utc::now(),
        }
    }
}

/// A fully extracted listing, as persisted in the result document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    pub url: Url,
    pub fields: ListingFields,
    pub fetched_at: DateTime<Utc>,
}

impl ListingRecord {
    /// Builds the record for a listing whose detail page was just parsed
    pub fn from_ref(listing: &ListingRef, fields: ListingFields) -> Self {
        Self {
            id: listing.id.clone(),
            url: listing.url.clone(),
            fields,
            fetched_at: Utc::now(),
        }
    }
}
