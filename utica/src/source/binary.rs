//! The binary-artifact backend (§4.4): fetches a dependency's version→asset-URL manifest,
//! downloads and caches assets content-addressed by URL, and expands archives into the
//! output tree.

use crate::dependency::DependencyId;
use crate::error::{BinaryArchiveError, Error, Warning};
use crate::version::PinnedVersion;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `PinnedVersion -> asset URLs`, as published at a binary dependency's manifest URL.
pub type AssetManifest = BTreeMap<PinnedVersion, Vec<String>>;

/// `true` for the status codes an authenticated GitHub client fails with when the credential
/// itself is the problem, as opposed to the resource simply not existing (§7 retry policy).
fn is_auth_failure(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
}

pub struct BinaryBackend {
    cache_root: PathBuf,
    client: reqwest::blocking::Client,
    use_netrc: bool,
    memo: Mutex<HashMap<String, AssetManifest>>,
    warnings: Mutex<Vec<Warning>>,
}

impl BinaryBackend {
    pub fn new(cache_root: PathBuf, use_netrc: bool) -> Self {
        BinaryBackend {
            cache_root,
            client: reqwest::blocking::Client::new(),
            use_netrc,
            memo: Mutex::new(HashMap::new()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Drains every warning collected so far (e.g. anonymous-request fallbacks), for the CLI
    /// to print after a run.
    pub fn drain_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings.lock().unwrap())
    }

    /// Sends an authenticated `GET url`, retrying once anonymously if the authenticated call
    /// fails with an auth-related status (§7 retry policy).
    fn get_with_fallback(&self, url: &str) -> Result<reqwest::blocking::Response, Error> {
        let send = |with_auth: bool| -> Result<reqwest::blocking::Response, Error> {
            let mut request = self.client.get(url);
            if with_auth {
                if let Some(auth) = crate::config::netrc_authorization_header(url) {
                    request = request.header(reqwest::header::AUTHORIZATION, auth);
                }
            }
            request.send().map_err(|e| Error::Network {
                url: url.to_string(),
                cause: e.to_string(),
            })
        };

        let response = send(self.use_netrc)?;
        if self.use_netrc && is_auth_failure(response.status()) {
            self.warnings
                .lock()
                .unwrap()
                .push(Warning::FellBackToAnonymousRequest(url.to_string()));
            return send(false);
        }
        Ok(response)
    }

    /// Fetches and memoizes a binary dependency's version manifest for the lifetime of the
    /// backend (i.e. once per run, per URL).
    pub fn fetch_manifest(&self, url: &str) -> Result<AssetManifest, Error> {
        if let Some(cached) = self.memo.lock().unwrap().get(url) {
            return Ok(cached.clone());
        }

        let body = self
            .get_with_fallback(url)?
            .error_for_status()
            .and_then(|resp| resp.text())
            .map_err(|e| Error::Network {
                url: url.to_string(),
                cause: e.to_string(),
            })?;

        let manifest = parse_asset_manifest(&body, url)?;
        self.memo
            .lock()
            .unwrap()
            .insert(url.to_string(), manifest.clone());
        Ok(manifest)
    }

    fn asset_cache_path(&self, dep_name: &str, version: &PinnedVersion, asset_url: &str) -> PathBuf {
        let file_name = asset_url.rsplit('/').next().unwrap_or("asset");
        let digest = hex::encode(Sha256::digest(asset_url.as_bytes()));
        let (base, ext) = split_extension(file_name);
        self.cache_root
            .join("binaries")
            .join(dep_name)
            .join(version.raw())
            .join(format!("{base}-{digest}{ext}"))
    }

    /// Downloads `asset_url` into the content-addressed cache, reusing an existing file.
    pub fn download_asset(
        &self,
        dep_name: &str,
        version: &PinnedVersion,
        asset_url: &str,
    ) -> Result<PathBuf, Error> {
        let dest = self.asset_cache_path(dep_name, version, asset_url);
        if dest.exists() {
            return Ok(dest);
        }
        let parent = dest.parent().unwrap_or(&dest);
        std::fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
            verb: "create",
            path: parent.to_path_buf(),
            cause: e.to_string(),
        })?;

        let mut response = self
            .get_with_fallback(asset_url)?
            .error_for_status()
            .map_err(|e| Error::Network {
                url: asset_url.to_string(),
                cause: e.to_string(),
            })?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::Filesystem {
            verb: "create a temp file in",
            path: parent.to_path_buf(),
            cause: e.to_string(),
        })?;
        std::io::copy(&mut response, &mut tmp).map_err(|e| Error::Network {
            url: asset_url.to_string(),
            cause: e.to_string(),
        })?;

        persist_into_place(tmp, &dest)
    }

    /// Expands a downloaded zip archive, copying every recognizable `.framework`/
    /// `.xcframework` bundle into `dest_root`. Rejects archives whose entries collide on
    /// destination path, or that contain no recognizable framework (§4.4).
    pub fn expand_zip_archive(
        &self,
        archive_path: &Path,
        dest_root: &Path,
        dep: &DependencyId,
    ) -> Result<Vec<PathBuf>, Error> {
        let file = std::fs::File::open(archive_path).map_err(|e| Error::Filesystem {
            verb: "open",
            path: archive_path.to_path_buf(),
            cause: e.to_string(),
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::Filesystem {
            verb: "read zip archive",
            path: archive_path.to_path_buf(),
            cause: e.to_string(),
        })?;

        let mut claimed: HashMap<PathBuf, usize> = HashMap::new();
        let mut installed = Vec::new();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| Error::Filesystem {
                verb: "read zip entry from",
                path: archive_path.to_path_buf(),
                cause: e.to_string(),
            })?;
            let Some(rel) = framework_relative_path(entry.name()) else {
                continue;
            };

            let bundle_root = rel
                .components()
                .next()
                .map(|c| PathBuf::from(c.as_os_str()))
                .unwrap_or_else(|| rel.clone());
            let dest_bundle = dest_root.join(&bundle_root);
            match claimed.get(&dest_bundle) {
                Some(_) => {
                    return Err(Error::BinaryArchive(BinaryArchiveError::DuplicateDestination {
                        dep: dep.clone(),
                        path: dest_bundle,
                    }))
                }
                None => {
                    claimed.insert(dest_bundle.clone(), i);
                }
            }

            let dest_path = dest_root.join(&rel);
            if entry.is_dir() {
                std::fs::create_dir_all(&dest_path).map_err(|e| Error::Filesystem {
                    verb: "create",
                    path: dest_path.clone(),
                    cause: e.to_string(),
                })?;
                continue;
            }
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
                    verb: "create",
                    path: parent.to_path_buf(),
                    cause: e.to_string(),
                })?;
            }
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).map_err(|e| Error::Filesystem {
                verb: "read",
                path: dest_path.clone(),
                cause: e.to_string(),
            })?;
            std::fs::write(&dest_path, contents).map_err(|e| Error::Filesystem {
                verb: "write",
                path: dest_path.clone(),
                cause: e.to_string(),
            })?;
            installed.push(dest_path);
        }

        if installed.is_empty() {
            return Err(Error::BinaryArchive(BinaryArchiveError::NoFrameworkFound(
                dep.clone(),
            )));
        }
        Ok(installed)
    }
}

fn persist_into_place(tmp: tempfile::NamedTempFile, dest: &Path) -> Result<PathBuf, Error> {
    match tmp.persist(dest) {
        Ok(_) => Ok(dest.to_path_buf()),
        Err(persist_err) => {
            // Cross-device rename: fall back to copy + unlink of the source temp file.
            std::fs::copy(persist_err.file.path(), dest).map_err(|e| Error::Filesystem {
                verb: "copy",
                path: dest.to_path_buf(),
                cause: e.to_string(),
            })?;
            Ok(dest.to_path_buf())
        }
    }
}

fn split_extension(file_name: &str) -> (String, String) {
    match file_name.rfind('.') {
        Some(0) | None => (file_name.to_string(), String::new()),
        Some(idx) => (file_name[..idx].to_string(), file_name[idx..].to_string()),
    }
}

fn parse_asset_manifest(body: &str, url: &str) -> Result<AssetManifest, Error> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| Error::Network {
        url: url.to_string(),
        cause: format!("invalid binary manifest JSON: {e}"),
    })?;
    let object = value.as_object().ok_or_else(|| Error::Network {
        url: url.to_string(),
        cause: "binary manifest JSON is not an object".to_string(),
    })?;

    let mut manifest = AssetManifest::new();
    for (version_str, urls) in object {
        let pinned = PinnedVersion::parse(version_str);
        let urls = match urls {
            serde_json::Value::String(s) => vec![s.clone()],
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => {
                return Err(Error::Network {
                    url: url.to_string(),
                    cause: format!("unexpected value for version \"{version_str}\""),
                })
            }
        };
        manifest.insert(pinned, urls);
    }
    Ok(manifest)
}

/// Path of a zip entry relative to the `.framework`/`.xcframework` bundle it belongs to, or
/// `None` if the entry is outside any recognizable bundle.
fn framework_relative_path(entry_name: &str) -> Option<PathBuf> {
    let mut components = entry_name.split('/');
    let mut skipped = Vec::new();
    for component in components.by_ref() {
        skipped.push(component);
        if component.ends_with(".framework") || component.ends_with(".xcframework") {
            let rest: Vec<&str> = components.collect();
            let mut rel = PathBuf::from(component);
            for part in rest {
                if !part.is_empty() {
                    rel.push(part);
                }
            }
            return Some(rel);
        }
    }
    None
}

/// Strips the `.framework`/`.xcframework` token and any extension, used to dedupe asset
/// names that refer to the "same" logical artifact (§4.4).
fn dedup_key(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    lower
        .replace(".xcframework", "")
        .replace(".framework", "")
        .replace(".zip", "")
}

/// Among a set of asset URLs for one version, prioritizes xcframework-style assets when
/// `prefer_xcframeworks` is set, then deduplicates assets sharing a key, keeping the
/// earliest by file name (§4.4).
pub fn select_assets(urls: &[String], prefer_xcframeworks: bool) -> Vec<String> {
    let file_name = |u: &str| u.rsplit('/').next().unwrap_or(u).to_string();
    let is_xcframework = |u: &str| file_name(u).to_lowercase().contains("xcframework");

    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for url in urls {
        groups
            .entry(dedup_key(&file_name(url)))
            .or_default()
            .push(url.clone());
    }

    let mut selected = Vec::new();
    for (_, mut candidates) in groups {
        candidates.sort_by_key(|u| file_name(u));
        let xc: Vec<&String> = candidates.iter().filter(|u| is_xcframework(u)).collect();
        let plain: Vec<&String> = candidates.iter().filter(|u| !is_xcframework(u)).collect();
        let chosen = if prefer_xcframeworks && !xc.is_empty() {
            xc[0]
        } else if !plain.is_empty() {
            plain[0]
        } else {
            candidates.first().expect("group is non-empty")
        };
        selected.push(chosen.clone());
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_is_recognized_by_status() {
        assert!(is_auth_failure(reqwest::StatusCode::UNAUTHORIZED));
        assert!(is_auth_failure(reqwest::StatusCode::FORBIDDEN));
        assert!(!is_auth_failure(reqwest::StatusCode::NOT_FOUND));
        assert!(!is_auth_failure(reqwest::StatusCode::OK));
    }

    #[test]
    fn parses_single_asset_per_version() {
        let body = r#"{"1.0.0": "https://example.com/a.zip"}"#;
        let manifest = parse_asset_manifest(body, "https://example.com/m.json").unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn parses_multiple_assets_per_version() {
        let body = r#"{"1.0.0": ["https://example.com/a.zip", "https://example.com/b.zip"]}"#;
        let manifest = parse_asset_manifest(body, "https://example.com/m.json").unwrap();
        let (_, urls) = manifest.iter().next().unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn prefers_xcframeworks_when_opted_in() {
        let urls = vec![
            "https://example.com/MyLib.framework.zip".to_string(),
            "https://example.com/MyLib.xcframework.zip".to_string(),
        ];
        let selected = select_assets(&urls, true);
        assert_eq!(selected, vec!["https://example.com/MyLib.xcframework.zip"]);
    }

    #[test]
    fn falls_back_to_plain_framework_when_not_opted_in() {
        let urls = vec![
            "https://example.com/MyLib.framework.zip".to_string(),
            "https://example.com/MyLib.xcframework.zip".to_string(),
        ];
        let selected = select_assets(&urls, false);
        assert_eq!(selected, vec!["https://example.com/MyLib.framework.zip"]);
    }

    #[test]
    fn dedups_distinct_keys_independently() {
        let urls = vec![
            "https://example.com/A.framework.zip".to_string(),
            "https://example.com/B.framework.zip".to_string(),
        ];
        let mut selected = select_assets(&urls, false);
        selected.sort();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn framework_relative_path_strips_archive_prefix() {
        let rel = framework_relative_path("Carthage/Build/iOS/MyLib.framework/Info.plist").unwrap();
        assert_eq!(rel, PathBuf::from("MyLib.framework/Info.plist"));
    }

    #[test]
    fn non_framework_entries_are_ignored() {
        assert!(framework_relative_path("README.md").is_none());
    }
}
