//! Header map and helpers for matching header tokens
use std::fmt;
use std::slice;


fn is_space(ch: u8) -> bool {
    matches!(ch, b'\r' | b'\n' | b' ' | b'\t')
}

fn trim(mut x: &[u8]) -> &[u8] {
    while x.len() > 0 && is_space(x[0]) {
        x = &x[1..];
    }
    while x.len() > 0 && is_space(x[x.len()-1]) {
        x = &x[..x.len()-1];
    }
    return x;
}

// header value is byte sequence
// we need case insensitive comparison and strip out of the whitespace
fn token_eq(val: &[u8], token: &[u8]) -> bool {
    trim(val).eq_ignore_ascii_case(token)
}

/// Returns true if any comma-separated token of the value equals `token`
pub fn has_token(val: &[u8], token: &[u8]) -> bool {
    val.split(|&x| x == b',').any(|t| token_eq(t, token))
}

pub fn is_close(val: &[u8]) -> bool {
    token_eq(val, b"close")
}

pub fn is_upgrade(val: &[u8]) -> bool {
    token_eq(val, b"upgrade")
}

pub fn is_chunked(val: &[u8]) -> bool {
    token_eq(val, b"chunked")
}

pub fn is_continue(val: &[u8]) -> bool {
    token_eq(val, b"100-continue")
}

/// Header name and value must not contain CR or LF
pub fn invalid_header(value: &[u8]) -> bool {
    return value.iter().any(|&x| x == b'\r' || x == b'\n')
}


#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    values: Vec<String>,
}

/// Case-insensitive header multimap
///
/// Entries are kept in order of the first occurrence of the name, and
/// values of every entry in order of arrival. The name is stored in the
/// spelling of its first occurrence.
///
/// An entry with an empty list of values is *suppressed*: it is never
/// serialized, and it prevents the server from adding automatic headers
/// like `Date` or `Server`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Entry>,
}

/// Iterator over `(name, value)` pairs, one item per value
pub struct Iter<'a> {
    entries: slice::Iter<'a, Entry>,
    current: Option<(&'a str, slice::Iter<'a, String>)>,
}

impl Headers {
    pub fn new() -> Headers {
        Headers { entries: Vec::new() }
    }
    fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }
    /// Append a value, keeping values already there
    pub fn add<N, V>(&mut self, name: N, value: V)
        where N: Into<String> + AsRef<str>, V: Into<String>,
    {
        match self.find(name.as_ref()) {
            Some(idx) => self.entries[idx].values.push(value.into()),
            None => self.entries.push(Entry {
                name: name.into(),
                values: vec![value.into()],
            }),
        }
    }
    /// Replace all values of the header by a single one
    pub fn set<N, V>(&mut self, name: N, value: V)
        where N: Into<String> + AsRef<str>, V: Into<String>,
    {
        self.set_all(name, vec![value.into()]);
    }
    /// Replace all values of the header
    ///
    /// Setting an empty list suppresses the header.
    pub fn set_all<N>(&mut self, name: N, values: Vec<String>)
        where N: Into<String> + AsRef<str>,
    {
        match self.find(name.as_ref()) {
            Some(idx) => self.entries[idx].values = values,
            None => self.entries.push(Entry {
                name: name.into(),
                values: values,
            }),
        }
    }
    /// Suppress the header (same as `set_all(name, vec![])`)
    pub fn suppress<N>(&mut self, name: N)
        where N: Into<String> + AsRef<str>,
    {
        self.set_all(name, Vec::new());
    }
    /// Remove the header entirely, returning its values
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.find(name).map(|idx| self.entries.remove(idx).values)
    }
    /// First value of the header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name)
            .and_then(|idx| self.entries[idx].values.first())
            .map(|x| &x[..])
    }
    /// All values of the header (empty if absent or suppressed)
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.find(name) {
            Some(idx) => &self.entries[idx].values,
            None => &[],
        }
    }
    /// All values joined by comma, empty string if there are none
    pub fn line(&self, name: &str) -> String {
        self.get_all(name).join(", ")
    }
    /// Returns true if header has at least one value
    pub fn contains(&self, name: &str) -> bool {
        self.get_all(name).len() > 0
    }
    /// Returns true if the header was explicitly set to an empty list
    pub fn is_suppressed(&self, name: &str) -> bool {
        self.find(name)
            .map(|idx| self.entries[idx].values.is_empty())
            .unwrap_or(false)
    }
    /// Returns true if the header was either set or suppressed
    pub fn is_present(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
    /// Returns true if any value of the header contains the token
    /// (comma-separated, case-insensitive)
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).iter()
            .any(|v| has_token(v.as_bytes(), token.as_bytes()))
    }
    /// Number of distinct header names (including suppressed ones)
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn iter(&self) -> Iter {
        Iter {
            entries: self.entries.iter(),
            current: None,
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);
    fn next(&mut self) -> Option<(&'a str, &'a str)> {
        loop {
            if let Some((name, ref mut values)) = self.current {
                if let Some(value) = values.next() {
                    return Some((name, value));
                }
            }
            match self.entries.next() {
                Some(entry) => {
                    self.current = Some((&entry.name, entry.values.iter()));
                }
                None => return None,
            }
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;
    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> fmt::Debug for Iter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("headers::Iter")
    }
}
