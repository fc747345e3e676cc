//! Loading schema documents and the `externalRef`/`include` documents they
//! pull in. `FsFiles` is the default `Files`
//! implementation, reading plain files relative to the current directory.
//! `ResourceLoader` is the async counterpart used by `relaxng-tool`'s
//! `convert`/`validate` commands when a schema's `include`/`externalRef`
//! targets are `http(s)://` URLs rather than local paths, plus the
//! manifest-recording behaviour for reproducible builds (every resource
//! actually read gets hashed and listed).

use crate::{Files, RelaxError};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads schema documents straight off the local filesystem, relative to
/// whatever directory `path` was given in (absolute paths are used as-is).
#[derive(Default)]
pub struct FsFiles;

impl Files for FsFiles {
    fn load(&self, name: &Path) -> Result<String, RelaxError> {
        fs::read_to_string(name).map_err(|e| RelaxError::Io(name.to_path_buf(), e))
    }
}

/// One entry of a compilation manifest: every resource actually read while
/// compiling a schema, with its resolved location and content hash, so a
/// later run can detect whether any of them changed (the `--manifest`
/// output).
#[derive(Clone, Debug)]
pub struct ManifestEntry {
    pub location: String,
    pub sha1: String,
}

/// Every resource read during one `Compiler::compile` call, in the order
/// first encountered. The root schema document is always the first entry.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    entries: BTreeMap<PathBuf, ManifestEntry>,
    order: Vec<PathBuf>,
}

impl Manifest {
    pub fn new() -> Manifest {
        Manifest::default()
    }

    pub fn record(&mut self, path: &Path, location: impl Into<String>, content: &str) {
        if self.entries.contains_key(path) {
            return;
        }
        let mut hasher = Sha1::new();
        hasher.update(content.as_bytes());
        let digest = hasher.finalize();
        let sha1 = digest.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        self.entries.insert(
            path.to_path_buf(),
            ManifestEntry { location: location.into(), sha1 },
        );
        self.order.push(path.to_path_buf());
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Path, &ManifestEntry)> {
        self.order.iter().map(move |p| (p.as_path(), &self.entries[p]))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let resources: Vec<serde_json::Value> = self
            .entries()
            .map(|(path, entry)| {
                serde_json::json!({
                    "path": path.to_string_lossy(),
                    "location": entry.location,
                    "sha1": entry.sha1,
                })
            })
            .collect();
        serde_json::json!({ "resources": resources })
    }
}

/// A `Files` wrapper that additionally records every successful load into
/// a `Manifest`, for `--manifest` output. Wraps any other `Files` so the
/// same recording behaviour works whether resources come from disk or
/// (via `ResourceLoader::into_files`) the network.
pub struct RecordingFiles<'a, F> {
    inner: F,
    manifest: &'a std::cell::RefCell<Manifest>,
}

impl<'a, F: Files> RecordingFiles<'a, F> {
    pub fn new(inner: F, manifest: &'a std::cell::RefCell<Manifest>) -> Self {
        RecordingFiles { inner, manifest }
    }
}

impl<'a, F: Files> Files for RecordingFiles<'a, F> {
    fn load(&self, name: &Path) -> Result<String, RelaxError> {
        let content = self.inner.load(name)?;
        self.manifest
            .borrow_mut()
            .record(name, name.to_string_lossy(), &content);
        Ok(content)
    }

    fn base_uri(&self, name: &Path) -> Result<url::Url, RelaxError> {
        self.inner.base_uri(name)
    }
}

/// How a `ResourceLoader` should verify content it fetches against a
/// previously recorded manifest: re-running `convert` with `--manifest`
/// should fail loudly if an `include`d resource has drifted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
}

/// Async counterpart to `Files`, used when a schema's base URI or an
/// `externalRef`/`include` href is `http(s)://` rather than a local path.
/// `relaxng-tool` is the only caller; `relaxng-model`'s own `Compiler` is
/// synchronous and only ever talks to `Files`.
#[async_trait::async_trait]
pub trait ResourceLoader {
    async fn fetch(&self, url: &url::Url) -> Result<String, RelaxError>;
}

/// Fetches `file://` and relative-path resources for `ResourceLoader`
/// callers that mix local and remote includes in one schema.
pub struct FsLoader;

#[async_trait::async_trait]
impl ResourceLoader for FsLoader {
    async fn fetch(&self, url: &url::Url) -> Result<String, RelaxError> {
        let path = url
            .to_file_path()
            .map_err(|_| RelaxError::InvalidBaseUri(format!("not a file URL: {}", url)))?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RelaxError::Io(path, e))
    }
}

/// Fetches `http(s)://` resources, used by `relaxng-tool` when a schema's
/// `include`/`externalRef` references a published schema fragment rather
/// than a local file.
pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new() -> HttpLoader {
        HttpLoader { client: reqwest::Client::new() }
    }
}

impl Default for HttpLoader {
    fn default() -> Self {
        HttpLoader::new()
    }
}

#[async_trait::async_trait]
impl ResourceLoader for HttpLoader {
    async fn fetch(&self, url: &url::Url) -> Result<String, RelaxError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RelaxError::InvalidBaseUri(format!("fetching {}: {}", url, e)))?;
        resp.text()
            .await
            .map_err(|e| RelaxError::InvalidBaseUri(format!("reading body of {}: {}", url, e)))
    }
}

/// Dispatches to `FsLoader` or `HttpLoader` by URL scheme, so callers
/// don't need to branch themselves.
pub struct DispatchingLoader {
    fs: FsLoader,
    http: HttpLoader,
}

impl DispatchingLoader {
    pub fn new() -> DispatchingLoader {
        DispatchingLoader { fs: FsLoader, http: HttpLoader::new() }
    }
}

impl Default for DispatchingLoader {
    fn default() -> Self {
        DispatchingLoader::new()
    }
}

#[async_trait::async_trait]
impl ResourceLoader for DispatchingLoader {
    async fn fetch(&self, url: &url::Url) -> Result<String, RelaxError> {
        match url.scheme() {
            "file" => self.fs.fetch(url).await,
            "http" | "https" => self.http.fetch(url).await,
            other => Err(RelaxError::InvalidBaseUri(format!("unsupported URL scheme: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_records_each_resource_once() {
        let mut m = Manifest::new();
        m.record(Path::new("a.rng"), "a.rng", "hello");
        m.record(Path::new("a.rng"), "a.rng", "hello-different");
        assert_eq!(m.entries().count(), 1);
    }

    #[test]
    fn manifest_hashes_content() {
        let mut m = Manifest::new();
        m.record(Path::new("a.rng"), "a.rng", "hello");
        let (_, entry) = m.entries().next().unwrap();
        // sha1("hello")
        assert_eq!(entry.sha1, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }
}
