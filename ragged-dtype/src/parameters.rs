use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// String-keyed metadata attached to a layout node.
///
/// Parameters travel with the node they annotate; structural operations that rebuild a
/// node decide per-operation whether the result keeps the parameters or starts clean.
/// Two parameter maps are equal only when every key and value matches, and merge
/// compatibility between nodes requires equal maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    /// An empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Set `key` to `value`, returning the previous value if any.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Whether `key` is set to exactly `value`.
    pub fn equals(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    /// Iterate over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Display for Parameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{k}={v:?}")?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn equality_is_whole_map() {
        let a: Parameters = [("__array__", "string")].into_iter().collect();
        let b: Parameters = [("__array__", "string")].into_iter().collect();
        let c: Parameters = [("__array__", "bytestring")].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Parameters::new());
    }

    #[test]
    fn get_set() {
        let mut p = Parameters::new();
        assert!(p.is_empty());
        p.set("k", "v");
        assert!(p.equals("k", "v"));
        assert_eq!(p.get("missing"), None);
    }
}
