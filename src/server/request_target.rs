/// Middle part of the request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// Usual form of `/hello?name=world`
    Origin(String),
    /// Full url: `http://example.com:8080/hello`
    ///
    /// Note in this case (unlike in Origin) path may not start with a slash
    Absolute { scheme: String, authority: String, path: String },
    /// Only hostname `example.com:8080`, only useful for `CONNECT` method
    Authority(String),
    /// Asterisk `*`, only useful for `OPTIONS` method
    Asterisk,
}


// Authority can't contain `/` or `?` or `#`, user and password
// is not supported in HTTP either (so no `@` but otherwise we accept
// anything as rules are quite complex)
fn authority_end_char(&x: &u8) -> bool {
    x == b'/' || x == b'?' || x == b'#' || x == b'@'
}

fn absolute(scheme: &str, rest: &str) -> Option<RequestTarget> {
    let auth_end = rest.as_bytes().iter()
        .position(authority_end_char)
        .unwrap_or(rest.len());
    if auth_end == 0 || rest[auth_end..].starts_with("@") {
        return None;
    }
    Some(RequestTarget::Absolute {
        scheme: scheme.to_string(),
        authority: rest[..auth_end].to_string(),
        path: rest[auth_end..].to_string(),
    })
}

impl RequestTarget {
    pub fn parse(s: &str) -> Option<RequestTarget> {
        use self::RequestTarget::*;

        if s.len() == 0 {
            return None;
        }
        if s.starts_with("/") {
            return Some(Origin(s.to_string()));
        }
        let bytes = s.as_bytes();
        if bytes.len() > 7 && bytes[..7].eq_ignore_ascii_case(b"http://") {
            return absolute("http", &s[7..]);
        }
        if bytes.len() > 8 && bytes[..8].eq_ignore_ascii_case(b"https://") {
            return absolute("https", &s[8..]);
        }
        if s == "*" {
            return Some(Asterisk);
        }
        if bytes.iter().position(authority_end_char).is_none() {
            return Some(Authority(s.to_string()));
        }

        return None;
    }
    pub fn is_authority(&self) -> bool {
        matches!(*self, RequestTarget::Authority(..))
    }
    pub fn is_asterisk(&self) -> bool {
        matches!(*self, RequestTarget::Asterisk)
    }
}

#[cfg(test)]
mod test {
    use super::RequestTarget;
    use super::RequestTarget::*;

    #[test]
    fn test_empty() {
        assert_matches!(RequestTarget::parse(""), None);
    }

    #[test]
    fn test_path() {
        assert_matches!(RequestTarget::parse("/hello"),
                        Some(Origin(ref x)) if x == "/hello");
    }

    #[test]
    fn test_path_query() {
        assert_matches!(RequestTarget::parse("/hello?xxx"),
                        Some(Origin(ref x)) if x == "/hello?xxx");
    }

    #[test]
    fn test_star() {
        assert_matches!(RequestTarget::parse("*"), Some(Asterisk));
    }

    #[test]
    fn test_strange_path() {
        assert_matches!(RequestTarget::parse("/http://x"),
                        Some(Origin(ref x)) if x == "/http://x");
    }

    #[test]
    fn test_plain_authority_uri() {
        assert_eq!(RequestTarget::parse("http://x"),
                   Some(Absolute { scheme: "http".into(),
                                   authority: "x".into(),
                                   path: "".into() }));
    }

    #[test]
    fn test_uri() {
        assert_eq!(RequestTarget::parse("http://x/"),
                   Some(Absolute { scheme: "http".into(),
                                   authority: "x".into(),
                                   path: "/".into() }));
    }

    #[test]
    fn test_bigger_uri() {
        assert_eq!(RequestTarget::parse("https://x:932/hello?world"),
                   Some(Absolute { scheme: "https".into(),
                                   authority: "x:932".into(),
                                   path: "/hello?world".into() }));
    }

    #[test]
    fn test_authority() {
        assert_matches!(RequestTarget::parse("example.com:443"),
                        Some(Authority(ref x)) if x == "example.com:443");
        assert_matches!(RequestTarget::parse("user@example.com"), None);
        assert_matches!(RequestTarget::parse("http://"), None);
    }
}
