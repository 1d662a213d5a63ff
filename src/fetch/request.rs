//! Request construction
//!
//! Building a request is pure: the same spec and user agent always yield
//! the same request. The retry loop in the fetcher is the only place that
//! varies anything between attempts.

use crate::fetch::error::Component;
use reqwest::{Client, Method, Request};
use url::Url;

/// Header set to present to the upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProfile {
    /// Top-level page navigation, as a browser tab would send it
    Document,
    /// Same-origin XHR against the JSON API
    Api,
}

/// A fully-described request, ready to be executed any number of times
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub component: Component,
    pub method: Method,
    pub url: Url,
    pub profile: HeaderProfile,
    /// Extra headers appended after the profile headers
    pub headers: Vec<(String, String)>,
    pub proxy: Option<Url>,
}

const SEC_CH_UA: &str = r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#;

impl RequestSpec {
    /// A browser-like page navigation
    pub fn document(component: Component, url: Url) -> Self {
        Self {
            component,
            method: Method::GET,
            url,
            profile: HeaderProfile::Document,
            headers: Vec::new(),
            proxy: None,
        }
    }

    /// A JSON API call
    pub fn api(component: Component, url: Url) -> Self {
        Self {
            profile: HeaderProfile::Api,
            ..Self::document(component, url)
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_proxy(mut self, proxy: Option<Url>) -> Self {
        self.proxy = proxy;
        self
    }

    /// URL without the query string, for logs and error context
    pub fn display_url(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }

    /// Builds the concrete request for one attempt
    pub fn build(&self, client: &Client, user_agent: &str) -> Result<Request, reqwest::Error> {
        let mut builder = client
            .request(self.method.clone(), self.url.clone())
            .header("User-Agent", user_agent)
            .header("Accept-Language", "en")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Sec-Ch-Ua", SEC_CH_UA)
            .header("Sec-Ch-Ua-Mobile", "?0")
            .header("Sec-Ch-Ua-Platform", r#""Windows""#)
            // One connection per request; pooled sockets do not survive proxy rotation well.
            .header("Connection", "close");

        builder = match self.profile {
            HeaderProfile::Document => builder
                .header(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
                )
                .header("Sec-Fetch-Dest", "document")
                .header("Sec-Fetch-Mode", "navigate")
                .header("Sec-Fetch-Site", "none")
                .header("Sec-Fetch-User", "?1")
                .header("Upgrade-Insecure-Requests", "1"),
            HeaderProfile::Api => builder
                .header("Accept", "application/json")
                .header("Content-Type", "application/json")
                .header("Sec-Fetch-Dest", "empty")
                .header("Sec-Fetch-Mode", "cors")
                .header("Sec-Fetch-Site", "same-origin"),
        };

        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::builder().build().unwrap()
    }

    #[test]
    fn test_document_headers() {
        let url = Url::parse("https://www.airbnb.com/rooms/42").unwrap();
        let spec = RequestSpec::document(Component::Bootstrap, url);
        let request = spec.build(&client(), "test-agent").unwrap();

        let headers = request.headers();
        assert_eq!(headers["user-agent"], "test-agent");
        assert_eq!(headers["sec-fetch-mode"], "navigate");
        assert_eq!(headers["connection"], "close");
        assert!(headers["accept"].to_str().unwrap().starts_with("text/html"));
    }

    #[test]
    fn test_api_headers_and_extras() {
        let url = Url::parse("https://www.airbnb.com/api/v3/Thing?locale=en").unwrap();
        let spec = RequestSpec::api(Component::Calendar, url)
            .with_header("X-Airbnb-Api-Key", "abc123")
            .with_header("Cookie", "bev=1");
        let request = spec.build(&client(), "test-agent").unwrap();

        let headers = request.headers();
        assert_eq!(headers["accept"], "application/json");
        assert_eq!(headers["x-airbnb-api-key"], "abc123");
        assert_eq!(headers["cookie"], "bev=1");
        assert_eq!(request.url().query(), Some("locale=en"));
    }

    #[test]
    fn test_build_is_repeatable() {
        let url = Url::parse("https://www.airbnb.com/rooms/42").unwrap();
        let spec = RequestSpec::document(Component::Details, url);
        let c = client();

        let a = spec.build(&c, "ua").unwrap();
        let b = spec.build(&c, "ua").unwrap();
        assert_eq!(a.url(), b.url());
        assert_eq!(a.headers(), b.headers());
    }

    #[test]
    fn test_invalid_header_is_build_error() {
        let url = Url::parse("https://www.airbnb.com/").unwrap();
        let spec = RequestSpec::api(Component::Search, url).with_header("bad header", "x");
        assert!(spec.build(&client(), "ua").is_err());
    }

    #[test]
    fn test_display_url_strips_query() {
        let url = Url::parse("https://www.airbnb.com/api/v3/Thing?variables=%7B%7D").unwrap();
        let spec = RequestSpec::api(Component::Reviews, url);
        assert_eq!(spec.display_url(), "https://www.airbnb.com/api/v3/Thing");
    }
}
