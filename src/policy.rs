use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::adapter::RequestError;

/// A set of headers to fill in for every URL containing one of
/// `url_patterns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub url_patterns: Vec<String>,
    pub user_agents: Vec<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl PolicyRule {
    pub fn matches(&self, url: &str) -> bool {
        self.url_patterns.iter().any(|p| url.contains(p.as_str()))
    }
}

/// Anti-detection header table applied to every request leaving the
/// adapter. Rules are checked in order and the first match wins.
///
/// Shaping only ever fills gaps: a header the caller already set is never
/// replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderPolicy {
    pub rules: Vec<PolicyRule>,
    pub default_user_agents: Vec<String>,
    pub consent_hosts: Vec<String>,
    pub consent_cookie: String,
    pub challenge_markers: Vec<String>,
}

const ANDROID_APP_VERSION: &str = "19.09.37";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        let innertube = PolicyRule {
            name: "innertube-api".into(),
            url_patterns: strings(&["youtubei.googleapis.com"]),
            user_agents: vec![
                format!(
                    "com.google.android.youtube/{} (Linux; U; Android 14; en_US; Pixel 8 Pro Build/UQ1A.240205.004) gzip",
                    ANDROID_APP_VERSION
                ),
                format!(
                    "com.google.android.youtube/{} (Linux; U; Android 13; en_US; SM-S918B Build/TP1A.220624.014) gzip",
                    ANDROID_APP_VERSION
                ),
            ],
            headers: pairs(&[
                ("X-YouTube-Client-Name", "3"),
                ("X-YouTube-Client-Version", ANDROID_APP_VERSION),
                ("Content-Type", "application/json"),
            ]),
        };

        let web = PolicyRule {
            name: "web".into(),
            url_patterns: strings(&["youtube.com", "youtu.be", "googlevideo.com", "ytimg.com"]),
            user_agents: strings(&[
                "Mozilla/5.0 (Linux; Android 14; Pixel 8 Pro) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36",
                "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36",
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_3 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Mobile/15E148 Safari/604.1",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
            ]),
            headers: pairs(&[
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
                ),
                ("Accept-Language", "en-US,en;q=0.5"),
                ("Sec-Fetch-Dest", "document"),
                ("Sec-Fetch-Mode", "navigate"),
                ("Sec-Fetch-Site", "none"),
                ("Sec-Fetch-User", "?1"),
                ("Upgrade-Insecure-Requests", "1"),
            ]),
        };

        Self {
            rules: vec![innertube, web],
            default_user_agents: strings(&[
                "Mozilla/5.0 (Linux; Android 14; Pixel 8 Pro) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36",
                "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36",
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_3 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Mobile/15E148 Safari/604.1",
            ]),
            consent_hosts: strings(&["youtube.com", "googlevideo.com"]),
            consent_cookie: "SOCS=CAESEwgDEgk2MjcxMjE1NjQaAmVuIAEaBgiA_t6vBg; PREF=tz=UTC&f6=40000000"
                .into(),
            challenge_markers: strings(&[
                "confirm you're not a bot",
                "Our systems have detected unusual traffic",
                "verify that you're not a robot",
            ]),
        }
    }
}

/// Session marker cookie value. Only needs to look fresh per session.
fn session_marker(now: DateTime<Utc>) -> String {
    format!("YSC={:x}", now.timestamp_millis())
}

fn insert_missing(headers: &mut HeaderMap, name: &str, value: &str) {
    let name = match HeaderName::from_bytes(name.as_bytes()) {
        Ok(name) => name,
        Err(_) => {
            warn!("Skipping invalid policy header name {:?}", name);
            return;
        }
    };
    if headers.contains_key(&name) {
        return;
    }
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!("Skipping invalid value for policy header {}", name),
    }
}

impl HeaderPolicy {
    pub fn rule_for(&self, url: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.matches(url))
    }

    pub fn wants_consent_cookie(&self, url: &str) -> bool {
        self.consent_hosts.iter().any(|h| url.contains(h.as_str()))
    }

    /// Fill in the headers the request is missing for `url`.
    pub fn shape<R: Rng + ?Sized>(
        &self,
        url: &str,
        headers: &mut HeaderMap,
        rng: &mut R,
        now: DateTime<Utc>,
    ) {
        let rule = self.rule_for(url);

        if !headers.contains_key(USER_AGENT) {
            let pool = match rule {
                Some(r) if !r.user_agents.is_empty() => &r.user_agents,
                _ => &self.default_user_agents,
            };
            if let Some(ua) = pool.choose(rng) {
                insert_missing(headers, USER_AGENT.as_str(), ua);
            }
        }

        if let Some(rule) = rule {
            debug!("Applying header rule {} to {}", rule.name, url);
            for (name, value) in &rule.headers {
                insert_missing(headers, name, value);
            }
        }

        if self.wants_consent_cookie(url) && !headers.contains_key(COOKIE) {
            let cookie = format!("{}; {}", self.consent_cookie, session_marker(now));
            insert_missing(headers, COOKIE.as_str(), &cookie);
        }
    }

    /// Fails with [`RequestError::Challenge`] when `body` is a bot
    /// verification page.
    pub fn check_challenge(&self, url: &str, body: &str) -> Result<(), RequestError> {
        match self
            .challenge_markers
            .iter()
            .find(|m| body.contains(m.as_str()))
        {
            Some(marker) => {
                warn!("Verification challenge ({:?}) returned for {}", marker, url);
                Err(RequestError::Challenge {
                    url: url.to_string(),
                })
            }
            None => Ok(()),
        }
    }
}
