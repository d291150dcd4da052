use ahash::AHashMap;
use percent_encoding::percent_decode;
use std::borrow::Cow;
use std::str::FromStr;

/// Create and return an instance of `Pairs` over the provided byte slice.
pub fn parse(input: &[u8]) -> Pairs<'_> {
    Pairs { input }
}

/// Decodes an `application/x-www-form-urlencoded` value into a `QueryMap`.
///
/// When a key repeats, the first occurrence wins.
///
/// ```
/// let params = hv_utils::query::from_bytes(b"query=pizza&location=S%C3%A3o+Paulo&limit=5");
///
/// assert_eq!(params.get("query"), Some("pizza"));
/// assert_eq!(params.get("location"), Some("São Paulo"));
/// assert_eq!(params.parse_or("limit", 10u32), 5);
/// ```
pub fn from_bytes(input: &[u8]) -> QueryMap {
    let mut map = AHashMap::new();
    for (name, value) in parse(input) {
        map.entry(name.into_owned()).or_insert_with(|| value.into_owned());
    }

    QueryMap(map)
}

/// An iterator over the percent-decoded `name=value` pairs of a query string.
#[derive(Clone, Copy)]
pub struct Pairs<'a> {
    input: &'a [u8],
}

impl<'a> Iterator for Pairs<'a> {
    type Item = (Cow<'a, str>, Cow<'a, str>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.input.is_empty() {
                return None;
            }

            let mut split = self.input.splitn(2, |&b| b == b'&');
            let sequence = split.next().unwrap_or_default();
            self.input = split.next().unwrap_or_default();

            if sequence.is_empty() {
                continue;
            }

            let mut split = sequence.splitn(2, |&b| b == b'=');
            let name = split.next().unwrap_or_default();
            let value = split.next().unwrap_or_default();

            return Some((decode(name), decode(value)));
        }
    }
}

fn decode(input: &[u8]) -> Cow<'_, str> {
    let replaced: Cow<'_, [u8]> = match input.contains(&b'+') {
        true => Cow::Owned(
            input
                .iter()
                .map(|&b| if b == b'+' { b' ' } else { b })
                .collect(),
        ),
        false => Cow::Borrowed(input),
    };

    let decoded: Cow<'_, [u8]> = match replaced {
        Cow::Borrowed(bytes) => percent_decode(bytes).into(),
        Cow::Owned(bytes) => Cow::Owned(percent_decode(&bytes).collect()),
    };

    match decoded {
        Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Decoded query parameters, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct QueryMap(AHashMap<String, String>);

impl QueryMap {
    /// Returns the raw decoded value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the trimmed value of `key`, treating a blank value as absent.
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Parses the value of `key`, falling back to `default` when absent or unparsable.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get_trimmed(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Parses `key` if present. A present but unparsable value yields `None`.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get_trimmed(key).and_then(|v| v.parse().ok())
    }

    /// Reads a boolean flag. `true` (any case) and `1` enable it, any other present value
    /// disables it and an absent key yields `default`.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.get_trimmed(key) {
            Some(value) => value.eq_ignore_ascii_case("true") || value == "1",
            None => default,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
