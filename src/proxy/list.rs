use crate::proxy::ProxyError;
use std::path::Path;
use url::Url;

/// Parses a newline-delimited list of proxy URIs
///
/// Blank lines and lines starting with `#` are skipped. Any other line
/// that is not an absolute URI with a host fails the whole list, so a typo
/// never silently shrinks the pool.
pub fn parse_proxy_list(content: &str) -> Result<Vec<Url>, ProxyError> {
    let mut proxies = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let url = Url::parse(line).map_err(|e| ProxyError::InvalidUri {
            line: index + 1,
            value: line.to_string(),
            reason: e.to_string(),
        })?;

        if url.host_str().is_none() {
            return Err(ProxyError::InvalidUri {
                line: index + 1,
                value: line.to_string(),
                reason: "missing host".to_string(),
            });
        }

        proxies.push(url);
    }

    Ok(proxies)
}

/// Reads and parses a proxy list file
pub fn load_proxy_file(path: &Path) -> Result<Vec<Url>, ProxyError> {
    let content = std::fs::read_to_string(path).map_err(|source| ProxyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_proxy_list(&content)
}
