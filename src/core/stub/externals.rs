use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Host-prefix to service-name map deciding which outbound URLs are stubbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalServices(IndexMap<String, String>);

impl Default for ExternalServices {
    fn default() -> Self {
        let defaults = [
            ("graph.microsoft.com", "graphmicrosoft"),
            ("graph.facebook.com", "facebook"),
            ("api.github.com", "github"),
            ("api.twitter.com", "twitter"),
            ("api.linkedin.com", "linkedin"),
            ("ipinfo.io", "ipinfo"),
            ("api.nationalize.io", "nationalize"),
        ];
        Self(
            defaults
                .into_iter()
                .map(|(prefix, service)| (prefix.to_string(), service.to_string()))
                .collect(),
        )
    }
}

impl ExternalServices {
    pub fn empty() -> Self {
        Self(IndexMap::new())
    }

    pub fn insert(&mut self, prefix: impl Into<String>, service: impl Into<String>) {
        self.0.insert(prefix.into(), service.into());
    }

    pub fn extend(&mut self, other: &ExternalServices) {
        for (prefix, service) in &other.0 {
            self.0.insert(prefix.clone(), service.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Map a URL to `(service, path)` using the first prefix matching `host + path`.
    ///
    /// For absolute URLs the returned path is what follows the prefix; for relative URLs
    /// the whole path is returned.
    pub fn lookup(&self, url: &str) -> Option<(String, String)> {
        let (netloc, path) = split_url(url);
        let full = format!("{}{}", netloc, path);
        self.0
            .iter()
            .find(|(prefix, _)| !prefix.is_empty() && full.starts_with(prefix.as_str()))
            .map(|(prefix, service)| {
                let remainder = if netloc.is_empty() {
                    path.clone()
                } else {
                    full[prefix.len()..].to_string()
                };
                (service.clone(), remainder)
            })
    }
}

fn split_url(url: &str) -> (String, String) {
    match Url::parse(url) {
        Ok(parsed) => {
            let mut netloc = parsed.host_str().unwrap_or_default().to_string();
            if let Some(port) = parsed.port() {
                netloc.push_str(&format!(":{}", port));
            }
            (netloc, parsed.path().to_string())
        }
        Err(_) => {
            let path = url.split(|ch| ch == '?' || ch == '#').next().unwrap_or_default();
            (String::new(), path.to_string())
        }
    }
}
