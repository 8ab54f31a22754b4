use regex::Regex;

use crate::error::{ProxyError, ProxyResult};

/// A single `urlsToWatch` glob pattern, compiled to an anchored,
/// case-insensitive regex. A leading `!` marks the pattern as an
/// exclusion; exclusions win over inclusions on an overlapping match.
#[derive(Debug, Clone)]
pub struct UrlToWatch {
    pub raw: String,
    pub exclude: bool,
    regex: Regex,
}

impl UrlToWatch {
    pub fn parse(pattern: &str) -> ProxyResult<Self> {
        let (exclude, glob) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let regex = compile_glob(glob)?;
        Ok(Self {
            raw: pattern.to_string(),
            exclude,
            regex,
        })
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    /// The host-only sub-pattern derived from this URL pattern, used to
    /// decide whether a CONNECT tunnel should be decrypted before the
    /// full request line is even known. Compiled eagerly so admission
    /// checks at connection time never need to fail (`spec.md` §4.1:
    /// "admission-time checks never fail" — compilation failure is
    /// fatal only at config-load time, in `UrlMatcher::compile`).
    pub fn host_pattern(&self) -> ProxyResult<HostToWatch> {
        let glob = self.raw.strip_prefix('!').unwrap_or(&self.raw);
        let without_scheme = match glob.find("://") {
            Some(idx) => &glob[idx + 3..],
            None => glob,
        };
        let host_and_maybe_more = without_scheme
            .split('/')
            .next()
            .unwrap_or(without_scheme);
        let host = match host_and_maybe_more.rfind(':') {
            Some(idx) if host_and_maybe_more[idx + 1..].chars().all(|c| c.is_ascii_digit() || c == '*') => {
                &host_and_maybe_more[..idx]
            }
            _ => host_and_maybe_more,
        };
        let regex = compile_glob(host)?;
        Ok(HostToWatch {
            raw: host.to_string(),
            exclude: self.exclude,
            regex,
        })
    }
}

/// The host-only projection of a `UrlToWatch`, used for the CONNECT-time
/// decrypt decision before any path/query is visible. The regex is
/// precompiled once at startup (see `UrlToWatch::host_pattern`), the
/// same way `UrlToWatch` itself precompiles its own regex, so
/// `is_match` is a cheap, infallible lookup on every CONNECT.
#[derive(Debug, Clone)]
pub struct HostToWatch {
    pub raw: String,
    pub exclude: bool,
    regex: Regex,
}

impl HostToWatch {
    pub fn is_match(&self, host: &str) -> bool {
        self.regex.is_match(host)
    }
}

fn compile_glob(glob: &str) -> ProxyResult<Regex> {
    let mut pattern = String::with_capacity(glob.len() * 2 + 8);
    pattern.push_str("(?i)^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            c if regex_syntax::is_meta_character(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| ProxyError::Matcher(format!("invalid url pattern '{glob}': {e}")))
}

/// Compiles the full `urlsToWatch` list once at startup and answers the
/// two admission questions the engine needs: "should this CONNECT be
/// decrypted" and "should this full request be intercepted".
pub struct UrlMatcher {
    urls: Vec<UrlToWatch>,
    hosts: Vec<HostToWatch>,
}

impl UrlMatcher {
    pub fn compile(patterns: &[String]) -> ProxyResult<Self> {
        let urls = patterns
            .iter()
            .map(|p| UrlToWatch::parse(p))
            .collect::<ProxyResult<Vec<_>>>()?;
        let hosts = urls
            .iter()
            .map(UrlToWatch::host_pattern)
            .collect::<ProxyResult<Vec<_>>>()?;
        Ok(Self { urls, hosts })
    }

    /// Exclude-wins semantics: the last matching pattern wins only if it
    /// has a different polarity than an earlier match; concretely, a URL
    /// is admitted iff at least one inclusion matches and no exclusion
    /// matches.
    pub fn should_intercept(&self, url: &str) -> bool {
        let mut included = false;
        for u in &self.urls {
            if u.is_match(url) {
                if u.exclude {
                    return false;
                }
                included = true;
            }
        }
        included
    }

    pub fn should_decrypt_host(&self, host: &str) -> bool {
        let mut included = false;
        for h in &self.hosts {
            if h.is_match(host) {
                if h.exclude {
                    return false;
                }
                included = true;
            }
        }
        included
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

mod regex_syntax {
    pub fn is_meta_character(c: char) -> bool {
        matches!(
            c,
            '.' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\'
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_wildcard_case_insensitively() {
        let m = UrlMatcher::compile(&["https://API.EXAMPLE.com/*".to_string()]).unwrap();
        assert!(m.should_intercept("https://api.example.com/v1/users"));
        assert!(!m.should_intercept("https://other.example.com/v1/users"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let m = UrlMatcher::compile(&[
            "https://example.com/*".to_string(),
            "!https://example.com/health".to_string(),
        ])
        .unwrap();
        assert!(m.should_intercept("https://example.com/users"));
        assert!(!m.should_intercept("https://example.com/health"));
    }

    #[test]
    fn host_pattern_strips_scheme_path_and_port() {
        let url = UrlToWatch::parse("https://example.com:8443/api/*").unwrap();
        let host = url.host_pattern().unwrap();
        assert_eq!(host.raw, "example.com");
    }

    #[test]
    fn should_decrypt_host_respects_exclusion() {
        let m = UrlMatcher::compile(&[
            "https://*.example.com/*".to_string(),
            "!https://metrics.example.com/*".to_string(),
        ])
        .unwrap();
        assert!(m.should_decrypt_host("api.example.com"));
        assert!(!m.should_decrypt_host("metrics.example.com"));
    }

    #[test]
    fn empty_matcher_intercepts_nothing() {
        let m = UrlMatcher::compile(&[]).unwrap();
        assert!(m.is_empty());
        assert!(!m.should_intercept("https://example.com/"));
    }
}
