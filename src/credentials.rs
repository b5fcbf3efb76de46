use std::collections::HashMap;

use tracing::error;

use crate::config::PageConfig;

/// Page access tokens, keyed by page id. Built once from the configuration
/// and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    tokens: HashMap<String, String>,
    /// Page ids in configuration order.
    order: Vec<String>,
}

impl Credentials {
    pub fn from_pages(pages: &[PageConfig]) -> Self {
        let mut tokens = HashMap::with_capacity(pages.len());
        let mut order = Vec::with_capacity(pages.len());
        for page in pages {
            if tokens
                .insert(page.id.clone(), page.access_token.clone())
                .is_none()
            {
                order.push(page.id.clone());
            }
        }
        Self { tokens, order }
    }

    /// Look up the access token for a page. Absence is logged and reported as
    /// `None`; callers decide how to fail.
    pub fn resolve(&self, page_id: &str) -> Option<&str> {
        match self.tokens.get(page_id) {
            Some(token) => Some(token.as_str()),
            None => {
                error!("No access token configured for page {}", page_id);
                None
            }
        }
    }

    pub fn page_ids(&self) -> &[String] {
        &self.order
    }

    /// `(page_id, token)` pairs in configuration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|id| self.tokens.get(id).map(|t| (id.as_str(), t.as_str())))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, token: &str) -> PageConfig {
        PageConfig {
            id: id.to_string(),
            access_token: token.to_string(),
        }
    }

    #[test]
    fn test_resolve_configured_page() {
        let creds = Credentials::from_pages(&[page("A1", "T1"), page("B2", "T2")]);
        assert_eq!(creds.resolve("A1"), Some("T1"));
        assert_eq!(creds.resolve("B2"), Some("T2"));
    }

    #[test]
    fn test_resolve_unknown_page_is_none() {
        let creds = Credentials::from_pages(&[page("A1", "T1")]);
        assert_eq!(creds.resolve("nope"), None);
    }

    #[test]
    fn test_entries_keep_configuration_order() {
        let creds = Credentials::from_pages(&[page("Z9", "a"), page("A1", "b")]);
        let entries: Vec<_> = creds.entries().collect();
        assert_eq!(entries, vec![("Z9", "a"), ("A1", "b")]);
        assert_eq!(creds.page_ids(), &["Z9".to_string(), "A1".to_string()]);
        assert_eq!(creds.len(), 2);
    }

    #[test]
    fn test_empty_credentials() {
        let creds = Credentials::default();
        assert!(creds.is_empty());
        assert_eq!(creds.entries().count(), 0);
    }
}
