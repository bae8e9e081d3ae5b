//! Blocking retrieval of catalog documents and package files.
//!
//! Addresses are `http(s)://` URLs, `file:` URLs or plain local paths.
//! Downloads are verified against SHA-256 checksums when the catalog
//! provides one in hex form.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::error::{InstallError, Result};

/// User Agent string for catalog and package requests
pub const USER_AGENT: &str = concat!("sis-install/", env!("CARGO_PKG_VERSION"));

/// Resolved form of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// `http` or `https` URL.
    Remote(Url),
    /// Plain path or `file` URL.
    Local(PathBuf),
}

/// Classify an address.
///
/// # Errors
///
/// [`InstallError::Config`] for an unsupported scheme or a `file` URL
/// that is not a path.
pub fn locate(address: &str) -> Result<Location> {
    match Url::parse(address) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(Location::Local)
            .map_err(|()| InstallError::Config(format!("bad file URL: {address}"))),
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Location::Remote(url)),
        // Windows drive letters parse as one-letter schemes
        Ok(url) if url.scheme().len() == 1 => Ok(Location::Local(PathBuf::from(address))),
        Ok(url) => Err(InstallError::Config(format!(
            "unsupported URL scheme '{}' in {address}",
            url.scheme()
        ))),
        Err(_) => Ok(Location::Local(PathBuf::from(address))),
    }
}

/// Resolve `file` relative to the directory holding the document at `base`.
///
/// Absolute URLs are returned unchanged.
pub fn resolve(base: &str, file: &str) -> String {
    if Url::parse(file).is_ok_and(|u| u.scheme().len() > 1) {
        return file.to_string();
    }
    match Url::parse(base) {
        Ok(base) if base.scheme().len() > 1 => base
            .join(file)
            .map(String::from)
            .unwrap_or_else(|_| file.to_string()),
        _ => Path::new(base)
            .parent()
            .map_or_else(|| file.to_string(), |p| p.join(file).display().to_string()),
    }
}

/// Last path component of an address, without query or fragment.
pub fn file_name(address: &str) -> String {
    let path = address.split(['?', '#']).next().unwrap_or(address);
    path.rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or(path)
        .to_string()
}

fn client() -> Result<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Read a whole document.
///
/// # Errors
///
/// Fails on an unreadable file or a failed request.
pub fn read_text(address: &str) -> Result<String> {
    match locate(address)? {
        Location::Local(path) => Ok(std::fs::read_to_string(path)?),
        Location::Remote(url) => {
            debug!(%url, "fetching document");
            let response = client()?.get(url).send()?.error_for_status()?;
            Ok(response.text()?)
        }
    }
}

/// Download `address` into `dest_dir`, keeping its file name.
///
/// # Errors
///
/// Fails on an unreadable source, a failed request or a write error.
pub fn download(address: &str, dest_dir: &Path) -> Result<PathBuf> {
    let dest = dest_dir.join(file_name(address));
    match locate(address)? {
        Location::Local(path) => {
            std::fs::copy(&path, &dest)?;
        }
        Location::Remote(url) => {
            debug!(%url, dest = %dest.display(), "downloading");
            let mut response = client()?.get(url).send()?.error_for_status()?;
            let mut file = File::create(&dest)?;
            response.copy_to(&mut file)?;
        }
    }
    Ok(dest)
}

/// Hex SHA-256 of a file.
///
/// # Errors
///
/// Fails when the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether a catalog checksum is a SHA-256 hex digest.
pub fn is_sha256(checksum: &str) -> bool {
    checksum.len() == 64 && checksum.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check `path` against `expected`.
///
/// Returns `Ok(false)` when the checksum cannot be verified because it is
/// not a SHA-256 hex digest.
///
/// # Errors
///
/// [`InstallError::ChecksumMismatch`] when the digests differ, or a read
/// error.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<bool> {
    let expected = expected.trim();
    if !is_sha256(expected) {
        return Ok(false);
    }
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(true)
    } else {
        Err(InstallError::ChecksumMismatch {
            file: file_name(&path.display().to_string()),
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_relative_to_document() {
        assert_eq!(
            resolve("http://host/sis/linux-x86_64/index.xml", "gel-1.0.tar.gz"),
            "http://host/sis/linux-x86_64/gel-1.0.tar.gz"
        );
        assert_eq!(
            resolve("http://host/sis/index.xml", "https://mirror/gel.zip"),
            "https://mirror/gel.zip"
        );
        assert_eq!(
            resolve("file:///srv/sis/index.xml", "pkg/a.zip"),
            "file:///srv/sis/pkg/a.zip"
        );
        assert_eq!(resolve("/srv/sis/index.xml", "a.zip"), "/srv/sis/a.zip");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("http://h/a/gel-1.0.tar.gz?x=1"), "gel-1.0.tar.gz");
        assert_eq!(file_name("/tmp/b.zip"), "b.zip");
        assert_eq!(file_name("c.rar"), "c.rar");
    }

    #[test]
    fn test_locate() {
        assert!(matches!(
            locate("https://h/index.xml").unwrap(),
            Location::Remote(_)
        ));
        assert_eq!(
            locate("relative/index.xml").unwrap(),
            Location::Local(PathBuf::from("relative/index.xml"))
        );
        assert!(locate("ftp://h/index.xml").is_err());
    }

    #[test]
    fn test_download_http_and_verify() {
        let mut server = mockito::Server::new();
        let body = b"archive bytes";
        let mock = server
            .mock("GET", "/pkg/gel.zip")
            .with_status(200)
            .with_body(body)
            .create();

        let tmp = tempdir().unwrap();
        let path = download(&format!("{}/pkg/gel.zip", server.url()), tmp.path()).unwrap();
        mock.assert();
        assert_eq!(path, tmp.path().join("gel.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), body);

        let digest = hex::encode(Sha256::digest(body));
        assert!(verify_checksum(&path, &digest).unwrap());
        assert!(!verify_checksum(&path, "md5:1234").unwrap());
        let wrong = "0".repeat(64);
        assert!(matches!(
            verify_checksum(&path, &wrong),
            Err(InstallError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_http_error_status() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/index.xml").with_status(404).create();
        let res = read_text(&format!("{}/index.xml", server.url()));
        assert!(matches!(res, Err(InstallError::Http(_))));
    }

    #[test]
    fn test_local_file_url() {
        let tmp = tempdir().unwrap();
        let doc = tmp.path().join("index.xml");
        std::fs::write(&doc, "<sis-extend/>").unwrap();
        let url = Url::from_file_path(&doc).unwrap();
        assert_eq!(read_text(url.as_str()).unwrap(), "<sis-extend/>");
    }
}
