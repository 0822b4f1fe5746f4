use std::path::Path;

use tracing::{debug, info, warn};

use crate::errors::CachesnakeError;

/// Ordered header-name lists driving each catalogue attack.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCatalogues {
    pub host_override: Vec<String>,
    pub path_override: Vec<String>,
    pub protocol_override: Vec<String>,
    pub port_override: Vec<String>,
    pub method_override: Vec<String>,
    /// Everything worth trying in the bruteforce pass.
    pub bruteforce: Vec<String>,
}

const HOST_OVERRIDE: &[&str] = &[
    "X-Forwarded-Host",
    "X-Host",
    "X-Forwarded-Server",
    "X-HTTP-Host-Override",
    "X-Original-Host",
    "X-Backend-Host",
    "X-Proxy-Host",
    "X-Real-Host",
    "X-Forwarded-For-Host",
    "X-Orig-Host",
    "Forwarded-Host",
    "X-Rewrite-Host",
    "X-Server-Name",
    "X-Origin-Host",
    "X-ProxyUser-Host",
    "X-Target-Host",
];

const PATH_OVERRIDE: &[&str] = &[
    "X-Original-URL",
    "X-Rewrite-URL",
    "X-Override-URL",
    "X-Original-URI",
    "X-Forwarded-Path",
    "X-Forwarded-Prefix",
    "X-Request-URI",
    "X-Envoy-Original-Path",
    "X-Original-Path",
    "X-Rewrite-Path",
    "X-Forwarded-URI",
    "X-Http-Destinationurl",
];

const PROTOCOL_OVERRIDE: &[&str] = &[
    "X-Forwarded-Proto",
    "X-Forwarded-Scheme",
    "X-Forwarded-Protocol",
    "X-Url-Scheme",
    "X-Scheme",
    "X-Forwarded-Ssl",
    "Front-End-Https",
    "X-Forwarded-Proto-Version",
    "X-Client-Scheme",
    "X-Original-Proto",
    "Cloudfront-Forwarded-Proto",
];

const PORT_OVERRIDE: &[&str] = &[
    "X-Forwarded-Port",
    "X-Port",
    "X-Original-Port",
    "X-Forwarded-Host-Port",
    "X-Real-Port",
    "X-Server-Port",
];

const METHOD_OVERRIDE: &[&str] = &[
    "X-HTTP-Method-Override",
    "X-HTTP-Method",
    "X-Method-Override",
    "X-Original-Method",
    "X-Forwarded-Method",
    "_method",
];

const BRUTEFORCE_EXTRA: &[&str] = &[
    "X-Forwarded-For",
    "X-Real-IP",
    "X-Client-IP",
    "X-Remote-IP",
    "X-Remote-Addr",
    "X-Originating-IP",
    "True-Client-IP",
    "CF-Connecting-IP",
    "Fastly-Client-IP",
    "X-Cluster-Client-IP",
    "X-Wap-Profile",
    "X-ATT-DeviceId",
    "X-UIDH",
    "X-Device",
    "X-Mobile",
    "X-Country",
    "X-Country-Code",
    "X-Language",
    "X-Locale",
    "X-Timezone",
    "X-Api-Version",
    "X-Version",
    "X-Debug",
    "X-Debug-Mode",
    "X-Env",
    "X-Environment",
    "X-Requested-With",
    "X-Request-ID",
    "X-Correlation-ID",
    "X-Trace-ID",
    "X-Amz-Website-Redirect-Location",
    "X-Amz-Server-Side-Encryption",
    "X-Azure-Ref",
    "X-Backend",
    "X-Backend-Server",
    "X-Upstream",
    "X-Origin",
    "X-Custom-IP-Authorization",
    "X-Wordpress-Cache",
    "X-Cache-Key",
    "X-Cache-Hash",
    "X-Middleware-Prefetch",
    "X-Nextjs-Data",
    "X-Invoke-Path",
    "X-Invoke-Query",
    "X-Vercel-Id",
    "X-Frame-Options",
    "X-Content-Type-Options",
    "X-Referer",
    "Referer",
    "Origin",
    "X-Base-URL",
    "X-Site",
    "X-Domain",
    "X-Tenant",
    "X-Tenant-ID",
    "X-Forwarded-Server-Name",
    "X-Akamai-Edgescape",
    "Akamai-Origin-Hop",
    "Via",
    "Max-Forwards",
    "Pragma",
    "Cache-Control",
    "Upgrade",
    "X-Do-Not-Track",
    "DNT",
    "Save-Data",
    "Accept-Language",
    "Content-Type",
    "X-Http-Method-Override",
    "X-Bug-Bounty",
];

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for HeaderCatalogues {
    fn default() -> Self {
        let mut bruteforce = Vec::new();
        for list in [
            HOST_OVERRIDE,
            PATH_OVERRIDE,
            PROTOCOL_OVERRIDE,
            PORT_OVERRIDE,
            METHOD_OVERRIDE,
            BRUTEFORCE_EXTRA,
        ] {
            bruteforce.extend(owned(list));
        }
        Self {
            host_override: owned(HOST_OVERRIDE),
            path_override: owned(PATH_OVERRIDE),
            protocol_override: owned(PROTOCOL_OVERRIDE),
            port_override: owned(PORT_OVERRIDE),
            method_override: owned(METHOD_OVERRIDE),
            bruteforce: dedup_case_insensitive(bruteforce),
        }
    }
}

impl HeaderCatalogues {
    /// Load `*.txt` catalogues from `dir`. Known file stems replace the matching built-in list;
    /// lists without a file keep their defaults.
    pub fn load_dir(dir: &Path) -> Result<Self, CachesnakeError> {
        if !dir.is_dir() {
            return Err(CachesnakeError::Catalogue(format!(
                "Catalogue directory not found: {}",
                dir.display()
            )));
        }

        let pattern = dir.join("*.txt");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| CachesnakeError::Catalogue(format!("Invalid catalogue pattern: {e}")))?;

        let mut catalogues = Self::default();
        for entry in entries {
            let path = entry.map_err(|e| CachesnakeError::Catalogue(e.to_string()))?;
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(slot) = catalogues.slot_mut(stem) else {
                warn!(file = %path.display(), "Ignoring unknown header catalogue");
                continue;
            };

            let content = std::fs::read_to_string(&path)?;
            let headers = parse_list(&content);
            if headers.is_empty() {
                return Err(CachesnakeError::Catalogue(format!(
                    "Header catalogue is empty: {}",
                    path.display()
                )));
            }
            debug!(catalogue = stem, count = headers.len(), "Loaded header catalogue");
            *slot = headers;
        }

        info!(
            bruteforce = catalogues.bruteforce.len(),
            host_override = catalogues.host_override.len(),
            "Header catalogues ready"
        );
        Ok(catalogues)
    }

    fn slot_mut(&mut self, stem: &str) -> Option<&mut Vec<String>> {
        match stem {
            "host-override-headers" => Some(&mut self.host_override),
            "path-override-headers" => Some(&mut self.path_override),
            "protocol-override-headers" => Some(&mut self.protocol_override),
            "port-override-headers" => Some(&mut self.port_override),
            "method-override-headers" => Some(&mut self.method_override),
            "all-headers" => Some(&mut self.bruteforce),
            _ => None,
        }
    }
}

/// One header per line. Blank lines and `#` comments are skipped, repeats dropped.
pub fn parse_list(content: &str) -> Vec<String> {
    let headers = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    dedup_case_insensitive(headers)
}

fn dedup_case_insensitive(headers: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    headers
        .into_iter()
        .filter(|h| seen.insert(h.to_ascii_lowercase()))
        .collect()
}
