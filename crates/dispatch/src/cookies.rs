use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use tracing::warn;

/// Cookies of one request: what the client sent plus what the response will set.
#[derive(Debug, Default)]
pub struct Cookies {
    incoming: HashMap<String, String>,
    outgoing: Vec<(String, Option<String>)>,
}

impl Cookies {
    pub(crate) fn new(incoming: HashMap<String, String>) -> Self {
        Self { incoming, outgoing: vec![] }
    }

    /// current value, taking changes made during this request into account
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.outgoing.iter().rev().find(|(changed, _)| changed == name) {
            Some((_, value)) => value.as_deref(),
            None => self.incoming.get(name).map(String::as_str),
        }
    }

    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.outgoing.push((name.into(), Some(value.into())));
    }

    pub fn remove<N: Into<String>>(&mut self, name: N) {
        self.outgoing.push((name.into(), None));
    }

    pub(crate) fn write_to(self, headers: &mut HeaderMap) {
        for (name, value) in self.outgoing {
            let cookie = match value {
                Some(value) => format!("{name}={}; path=/", urlencoding::encode(&value)),
                None => format!("{name}=; path=/; max-age=0; expires=Thu, 01 Jan 1970 00:00:00 GMT"),
            };
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => warn!(cause = %e, %name, "skip cookie that is not a valid header value"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cookies;
    use http::header::SET_COOKIE;
    use http::HeaderMap;
    use std::collections::HashMap;

    #[test]
    fn test_cookie_changes() {
        let mut cookies = Cookies::new(HashMap::from([("theme".to_owned(), "dark".to_owned())]));
        assert_eq!(cookies.get("theme"), Some("dark"));

        cookies.set("theme", "light mode");
        cookies.remove("lang");
        assert_eq!(cookies.get("theme"), Some("light mode"));
        assert_eq!(cookies.get("lang"), None);

        let mut headers = HeaderMap::new();
        cookies.write_to(&mut headers);
        let set = headers.get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap().to_owned()).collect::<Vec<_>>();
        assert_eq!(set[0], "theme=light%20mode; path=/");
        assert!(set[1].starts_with("lang=; path=/; max-age=0"));
    }
}
