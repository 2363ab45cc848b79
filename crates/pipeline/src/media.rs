//! Turning artifact locators into local files for the ffmpeg backends.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a locator. Used to name derived files so the same input
/// always maps to the same path.
pub fn locator_digest(locator: &str) -> String {
    let digest = Sha256::digest(locator.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Render a local path as a `file://` locator.
pub fn file_locator(path: &Path) -> String {
    format!("file://{}", path.to_string_lossy())
}

/// Resolve `locator` to a readable local file.
///
/// - `file://` locators and bare paths are used in place.
/// - `http(s)://` locators are downloaded once into `download_dir`, named by
///   their digest.
///
/// Returns a human-readable reason on failure.
pub async fn materialize(
    http: &reqwest::Client,
    locator: &str,
    download_dir: &Path,
) -> Result<PathBuf, String> {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        return download(http, locator, download_dir).await;
    }

    let path = match locator.strip_prefix("file://") {
        Some(rest) => PathBuf::from(rest),
        None if locator.contains("://") => {
            return Err(format!("unsupported locator scheme: {locator}"));
        }
        None => PathBuf::from(locator),
    };

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(path),
        Ok(_) => Err(format!("{} is empty or not a file", path.display())),
        Err(e) => Err(format!("{}: {e}", path.display())),
    }
}

async fn download(
    http: &reqwest::Client,
    url: &str,
    download_dir: &Path,
) -> Result<PathBuf, String> {
    let target = download_dir.join(format!("{}.bin", locator_digest(url)));
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return Ok(target);
    }

    tokio::fs::create_dir_all(download_dir)
        .await
        .map_err(|e| format!("create {}: {e}", download_dir.display()))?;

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| format!("download {url}: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("download {url}: HTTP {}", response.status()));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("download {url}: {e}"))?;
    if bytes.is_empty() {
        return Err(format!("download {url}: empty body"));
    }

    // Write then rename so a half-written file is never reused.
    let partial = target.with_extension("part");
    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|e| format!("write {}: {e}", partial.display()))?;
    tokio::fs::rename(&partial, &target)
        .await
        .map_err(|e| format!("rename {}: {e}", partial.display()))?;

    tracing::debug!(url = %url, path = %target.display(), bytes = bytes.len(), "Downloaded media");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_hex() {
        let a = locator_digest("https://cdn/v1.mp4");
        assert_eq!(a, locator_digest("https://cdn/v1.mp4"));
        assert_ne!(a, locator_digest("https://cdn/v2.mp4"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn file_locator_resolves_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        tokio::fs::write(&path, b"not really a video").await.unwrap();

        let http = reqwest::Client::new();
        let resolved = materialize(&http, &file_locator(&path), dir.path())
            .await
            .unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn missing_and_empty_files_are_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.mp4");
        tokio::fs::write(&empty, b"").await.unwrap();
        let http = reqwest::Client::new();

        assert!(materialize(&http, "/no/such/clip.mp4", dir.path()).await.is_err());
        assert!(materialize(&http, &file_locator(&empty), dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn unknown_scheme_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let http = reqwest::Client::new();
        let err = materialize(&http, "offline://generate-video/ab.mp4", dir.path())
            .await
            .unwrap_err();
        assert!(err.contains("unsupported"), "{err}");
    }
}
