//! Canonical-URL reconciliation.
//!
//! After a successful mount the filesystem reports its true source (device)
//! string. User-entered subfolder paths or DNS results may legitimately
//! resolve to a more specific or IP-based canonical path than what was typed,
//! so the stored URL is corrected from what the OS actually mounted.

use url::Url;

/// URL scheme for a network filesystem type; `None` for local filesystems
pub fn scheme_for_fstype(fstype: &str) -> Option<&'static str> {
    match fstype {
        "smbfs" | "cifs" | "smb3" => Some("smb"),
        "afpfs" => Some("afp"),
        "nfs" | "nfs4" => Some("nfs"),
        "webdav" | "davfs" => Some("http"),
        "ftp" | "ftpfs" => Some("ftp"),
        _ => None,
    }
}

/// Synthesize a canonical URL from a filesystem-reported source string.
///
/// Sources missing a scheme get one derived from the filesystem type:
/// `//user@host/share` (smbfs) becomes `smb://user@host/share`, the NFS form
/// `host:/export` becomes `nfs://host/export`. Path segments are re-encoded
/// so the result is a valid URL even when the mount table reports raw spaces.
pub fn canonical_url(source: &str, fstype: &str) -> Option<String> {
    let with_scheme = if source.contains("://") {
        source.to_string()
    } else {
        let scheme = scheme_for_fstype(fstype)?;
        if let Some(rest) = source.strip_prefix("//") {
            format!("{scheme}://{rest}")
        } else if let Some((host, export)) = source.split_once(":/") {
            format!("{scheme}://{host}/{export}")
        } else {
            format!("{scheme}://{source}")
        }
    };
    Some(reencode_path(&with_scheme))
}

/// Percent-encode the path portion segment by segment. Each segment is
/// decoded first so already-encoded sources stay stable.
fn reencode_path(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let Some(path_offset) = url[authority_start..].find('/') else {
        return url.to_string();
    };
    let (head, path) = url.split_at(authority_start + path_offset);

    let encoded = path
        .split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            urlencoding::encode(&decoded).into_owned()
        })
        .collect::<Vec<_>>()
        .join("/");

    format!("{head}{encoded}")
}

/// Normal form used for equality: percent-decoded, trailing slashes removed
pub fn normalize(url: &str) -> String {
    let decoded = urlencoding::decode(url)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| url.to_string());
    decoded.trim_end_matches('/').to_string()
}

/// Carry the original URL's explicit port over to the actual URL when the
/// actual one lacks it (the mount table does not report ports).
pub fn with_preserved_port(actual: &str, original: &str) -> String {
    let (Ok(mut actual_url), Ok(original_url)) = (Url::parse(actual), Url::parse(original)) else {
        return actual.to_string();
    };

    if actual_url.port().is_none()
        && let Some(port) = original_url.port()
        && actual_url.set_port(Some(port)).is_ok()
    {
        return actual_url.to_string();
    }
    actual.to_string()
}

/// The URL the profile store should carry after a mount of `stored` resolved
/// to `actual_source`/`fstype`, or `None` when the stored one already matches.
pub fn reconciled_url(stored: &str, actual_source: &str, fstype: &str) -> Option<String> {
    let canonical = canonical_url(actual_source, fstype)?;
    let candidate = with_preserved_port(&canonical, stored);

    if normalize(&candidate) == normalize(stored) {
        None
    } else {
        Some(candidate)
    }
}

/// Display name for a profile created from a discovered or imported mount:
/// the decoded last path segment, or the host when the URL has no path
pub fn display_name_for_url(url: &str) -> String {
    let normalized = normalize(url);
    if let Some(segment) = normalized
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains("://"))
    {
        return segment.to_string();
    }
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or(normalized)
}
