use std::fmt;

use reqwest::Method;

use crate::Params;

/// Cache and deduplication key: method, URL and serialized query params.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Builds a key with params sorted by key (and value).
    pub fn new(method: &Method, url: &str, params: &Params) -> Self {
        Self::build(method, url, params.canonical())
    }

    /// Builds a key with params in insertion order. Two logically equal
    /// parameter sets in different orders produce different keys.
    pub fn insertion_ordered(method: &Method, url: &str, params: &Params) -> Self {
        let pairs = params
            .pairs()
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        Self::build(method, url, pairs)
    }

    pub(crate) fn for_policy(method: &Method, url: &str, params: &Params, canonical: bool) -> Self {
        if canonical {
            Self::new(method, url, params)
        } else {
            Self::insertion_ordered(method, url, params)
        }
    }

    fn build(method: &Method, url: &str, pairs: Vec<(&str, &str)>) -> Self {
        let mut key = format!("{method} {url}");
        for (index, (name, value)) in pairs.into_iter().enumerate() {
            key.push(if index == 0 { '?' } else { '&' });
            // Debug quoting escapes separators inside names and values.
            key.push_str(&format!("{name:?}={value:?}"));
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::Fingerprint;
    use crate::Params;

    #[test]
    fn method_and_url_are_part_of_the_key() {
        let params = Params::new();
        let get = Fingerprint::new(&Method::GET, "/members", &params);
        let post = Fingerprint::new(&Method::POST, "/members", &params);
        let other = Fingerprint::new(&Method::GET, "/tenders", &params);
        assert_ne!(get, post);
        assert_ne!(get, other);
        assert_eq!(get, Fingerprint::new(&Method::GET, "/members", &Params::new()));
    }

    #[test]
    fn canonical_key_ignores_param_order() {
        let a: Params = [("page", "1"), ("q", "water")].into();
        let b: Params = [("q", "water"), ("page", "1")].into();
        assert_eq!(
            Fingerprint::new(&Method::GET, "/news", &a),
            Fingerprint::new(&Method::GET, "/news", &b)
        );
    }

    #[test]
    fn insertion_ordered_key_keeps_param_order() {
        let a: Params = [("page", "1"), ("q", "water")].into();
        let b: Params = [("q", "water"), ("page", "1")].into();
        assert_ne!(
            Fingerprint::insertion_ordered(&Method::GET, "/news", &a),
            Fingerprint::insertion_ordered(&Method::GET, "/news", &b)
        );
    }

    #[test]
    fn separators_inside_values_do_not_collide() {
        let joined: Params = [("a", "1&b=2")].into();
        let split: Params = [("a", "1"), ("b", "2")].into();
        assert_ne!(
            Fingerprint::new(&Method::GET, "/x", &joined),
            Fingerprint::new(&Method::GET, "/x", &split)
        );
    }
}
