use regex::Regex;
use url::Url;

use crate::http::ProbeResponse;

/// Raw link candidates from a crawled response: regex capture group 1 over a 200 body, or the
/// `Location` header of a redirect.
pub fn extract_links(response: &ProbeResponse, regexes: &[Regex]) -> Vec<String> {
    if response.status == 200 {
        let body = String::from_utf8_lossy(&response.body);
        regexes
            .iter()
            .flat_map(|re| re.captures_iter(&body))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    } else if response.is_redirect() {
        response.header("location").map(str::to_string).into_iter().collect()
    } else {
        Vec::new()
    }
}

/// Resolve `link` found on `page` to an absolute URL without query or fragment.
///
/// Protocol-relative links become `https://`, root-relative links hang off the page's origin.
/// Other relative forms are ignored, and so is anything that is not http(s).
pub fn normalize_link(page: &str, link: &str) -> Option<String> {
    let link = link.trim();
    let resolved = if let Some(rest) = link.strip_prefix("//") {
        Url::parse(&format!("https://{rest}")).ok()?
    } else if link.starts_with('/') {
        Url::parse(page).ok()?.join(link).ok()?
    } else {
        Url::parse(link).ok()?
    };
    canonical(resolved)
}

/// Seed URL for crawling `hostname` over `scheme`.
pub fn seed_url(scheme: &str, hostname: &str) -> Option<String> {
    canonical(Url::parse(&format!("{scheme}://{hostname}")).ok()?)
}

fn canonical(mut url: Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}
