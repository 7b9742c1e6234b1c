//! Normalizes git remote URLs into a `host/path` token.
//!
//! Used only to derive a filesystem-safe fork-repo directory name from a
//! user repo's `origin` remote; the token is never round-tripped back into
//! a URL.

use crate::error::EngineError;

/// Parse a URL-scheme or SCP-like git remote string into `host/path`
/// (`.git` suffix stripped). Fails for anything that isn't one of those two
/// shapes.
///
/// ```
/// use container_use_engine::git::url::normalize_git_url;
///
/// assert_eq!(
///     normalize_git_url("git@github.com:foo/bar.git").unwrap(),
///     "github.com/foo/bar"
/// );
/// assert_eq!(
///     normalize_git_url("https://github.com/foo/bar.git").unwrap(),
///     "github.com/foo/bar"
/// );
/// ```
pub fn normalize_git_url(url: &str) -> Result<String, EngineError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(invalid(url));
    }

    if let Some(scheme_end) = url.find("://") {
        let rest = &url[scheme_end + 3..];
        let without_user = rest.rsplit_once('@').map(|(_, h)| h).unwrap_or(rest);
        let (host_port, path) = without_user.split_once('/').ok_or_else(|| invalid(url))?;
        let host = host_port.split(':').next().filter(|h| !h.is_empty());
        let host = host.ok_or_else(|| invalid(url))?;
        let path = strip_dot_git(path);
        if path.is_empty() {
            return Err(invalid(url));
        }
        return Ok(format!("{host}/{path}"));
    }

    // SCP-like: (user@)?host:(port[/:])?path
    let (left, after_colon) = url.split_once(':').ok_or_else(|| invalid(url))?;
    let host = left.rsplit_once('@').map(|(_, h)| h).unwrap_or(left);
    if host.is_empty() || host.contains('/') {
        return Err(invalid(url));
    }

    let digit_end = after_colon
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(after_colon.len());
    let path = if digit_end > 0
        && matches!(after_colon.as_bytes().get(digit_end), Some(b'/') | Some(b':'))
    {
        &after_colon[digit_end + 1..]
    } else {
        after_colon
    };

    let path = strip_dot_git(path);
    if path.is_empty() {
        return Err(invalid(url));
    }
    Ok(format!("{host}/{path}"))
}

fn strip_dot_git(path: &str) -> &str {
    path.strip_suffix(".git").unwrap_or(path)
}

fn invalid(url: &str) -> EngineError {
    EngineError::InvalidName(format!("not a recognizable git remote URL: '{url}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::https_with_git_suffix("https://github.com/foo/bar.git", "github.com/foo/bar")]
    #[case::https_without_git_suffix("https://github.com/foo/bar", "github.com/foo/bar")]
    #[case::http("http://gitlab.internal/owner/repo.git", "gitlab.internal/owner/repo")]
    #[case::ssh_with_user("ssh://git@github.com/foo/bar.git", "github.com/foo/bar")]
    #[case::ssh_without_user("ssh://github.com/foo/bar.git", "github.com/foo/bar")]
    #[case::ssh_with_port("ssh://git@github.com:2222/foo/bar.git", "github.com/foo/bar")]
    #[case::scp_like_with_user("git@github.com:foo/bar.git", "github.com/foo/bar")]
    #[case::scp_like_without_user("github.com:foo/bar.git", "github.com/foo/bar")]
    #[case::scp_like_with_explicit_port_slash("git@github.com:2222/foo/bar.git", "github.com/foo/bar")]
    #[case::scp_like_with_explicit_port_colon("git@github.com:2222:foo/bar.git", "github.com/foo/bar")]
    #[case::nested_path_segments(
        "https://gitlab.example.com/group/sub/repo.git",
        "gitlab.example.com/group/sub/repo"
    )]
    // §4.2 matches on the generic `^[^:]+://` shape, not a fixed scheme allowlist.
    #[case::any_scheme_accepted("ftp://github.com/owner/repo.git", "github.com/owner/repo")]
    fn normalizes_recognized_remote_shapes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_git_url(input).unwrap(), expected);
    }

    #[rstest]
    #[case::not_a_url("not a url")]
    #[case::empty("")]
    #[case::https_with_no_path("https://github.com/")]
    #[case::scp_like_with_no_path("git@github.com:")]
    fn malformed_urls_error(#[case] input: &str) {
        assert!(normalize_git_url(input).is_err());
    }
}
