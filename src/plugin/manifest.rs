use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use url::Url;

/// Registration title of a plugin. Doubles as the tab name that focuses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PluginId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a user declares to add a plugin: a title and the URL its UI is served from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginDescriptor {
    pub title: String,
    pub url: String,
}

impl PluginDescriptor {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    pub fn id(&self) -> PluginId {
        PluginId::new(self.title.clone())
    }

    pub fn trusted_origin(&self) -> String {
        origin_of(&self.url)
    }
}

/// Reduce a URL to the origin a browser would report for it: `scheme://host[:port]`, with
/// default ports and credentials dropped.
///
/// Anything that does not parse as an absolute URL with a tuple origin is returned trimmed
/// but otherwise untouched, so opaque origins such as `null` still compare exactly.
pub fn origin_of(url: &str) -> String {
    let url = url.trim();
    match Url::parse(url).map(|parsed| parsed.origin()) {
        Ok(origin) if origin.is_tuple() => origin.ascii_serialization(),
        _ => url.to_string(),
    }
}
