//! # Signing Key Store
//!
//! Owns the PEM files of the store's signing key pair.
//!
//! ## Files
//! ```text
//! <keys.dir>/
//!   ecc_private.pem    PKCS#8, mode 0600 on unix
//!   ecc_public.pem     SPKI
//!   invoice_csr.pem    placeholder until onboarding issues a real CSR
//! ```
//!
//! Keys are provisioned once, at service startup. After that the files are
//! only ever read: [`FileKeyProvider`] loads them on every signature so a
//! removed or damaged key shows up as an error instead of a stale signer.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mizan_core::signing::{verify_signature, EcdsaKeyPair, KeyProvider};
use mizan_core::SigningError;
use thiserror::Error;
use tracing::{debug, info, warn};

const CSR_PLACEHOLDER: &str = "\
# Certificate signing request placeholder.
# Replace with the CSR generated during ZATCA onboarding.
";

/// All-zero-but-one digest used to check that the two PEM files belong together.
const PAIR_CHECK_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000001";

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A key file is missing or unreadable after provisioning.
    #[error("Signing key unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Only one half of the pair exists on disk.
    #[error("Incomplete key pair: {0} is missing")]
    Incomplete(PathBuf),

    #[error("Public key does not match private key")]
    Mismatch,
}

impl KeyStoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        KeyStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Locations of the three key files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    pub csr: PathBuf,
}

/// Provisions the key pair and hands out providers backed by its files.
#[derive(Debug)]
pub struct KeyStore {
    paths: KeyPaths,
    lock: Mutex<()>,
}

impl KeyStore {
    pub fn new(paths: KeyPaths) -> Self {
        KeyStore {
            paths,
            lock: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &KeyPaths {
        &self.paths
    }

    /// Makes sure a usable key pair exists on disk.
    ///
    /// - both PEM files missing: generates a pair and writes it
    /// - one file missing: [`KeyStoreError::Incomplete`], nothing is written
    /// - both present: loads them and checks they belong together
    ///
    /// Existing key files are never overwritten. The CSR placeholder is
    /// written when absent.
    pub fn ensure_key_pair(&self) -> Result<KeyPaths, KeyStoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| KeyStoreError::Unavailable("key store lock poisoned".into()))?;

        let paths = &self.paths;
        for dir in [&paths.private_key, &paths.public_key, &paths.csr]
            .into_iter()
            .filter_map(|p| p.parent())
            .filter(|d| !d.as_os_str().is_empty())
        {
            fs::create_dir_all(dir).map_err(|e| KeyStoreError::io(dir, e))?;
        }

        match (paths.private_key.exists(), paths.public_key.exists()) {
            (false, false) => {
                info!(dir = ?paths.private_key.parent(), "Generating signing key pair");
                let keys = EcdsaKeyPair::generate();
                let private = keys.private_key_pem().map_err(invalid)?;
                let public = keys.spki_pem().map_err(invalid)?;

                write_new(&paths.private_key, &private, true)?;
                if let Err(err) = write_new(&paths.public_key, &public, false) {
                    // A lone private key would be reported as Incomplete on every restart
                    discard(&paths.private_key);
                    return Err(err);
                }
            }
            (true, false) => return Err(KeyStoreError::Incomplete(paths.public_key.clone())),
            (false, true) => return Err(KeyStoreError::Incomplete(paths.private_key.clone())),
            (true, true) => {
                debug!("Signing key pair already present");
            }
        }

        self.check_pair()?;

        if !paths.csr.exists() {
            write_new(&paths.csr, CSR_PLACEHOLDER, false)?;
            debug!(path = %paths.csr.display(), "CSR placeholder written");
        }

        Ok(paths.clone())
    }

    /// A provider that reads the key files on every call.
    pub fn provider(&self) -> FileKeyProvider {
        FileKeyProvider {
            paths: self.paths.clone(),
        }
    }

    fn check_pair(&self) -> Result<(), KeyStoreError> {
        let provider = self.provider();
        let signature = provider.sign(PAIR_CHECK_HASH).map_err(from_signing)?;
        let public = provider.public_key_pem().map_err(from_signing)?;

        verify_signature(&public, PAIR_CHECK_HASH, &signature).map_err(|e| match e {
            SigningError::VerificationFailed => KeyStoreError::Mismatch,
            other => from_signing(other),
        })
    }
}

/// [`KeyProvider`] over the PEM files, with no caching.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    paths: KeyPaths,
}

impl FileKeyProvider {
    fn read(path: &Path) -> Result<String, SigningError> {
        fs::read_to_string(path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Key file unreadable");
            SigningError::KeyUnavailable(format!("{}: {e}", path.display()))
        })
    }

    fn load(&self) -> Result<EcdsaKeyPair, SigningError> {
        let pem = Self::read(&self.paths.private_key)?;
        EcdsaKeyPair::from_pkcs8_pem(&pem).map_err(|e| {
            SigningError::KeyUnavailable(format!("{}: {e}", self.paths.private_key.display()))
        })
    }
}

impl KeyProvider for FileKeyProvider {
    fn sign(&self, invoice_hash_hex: &str) -> Result<String, SigningError> {
        self.load()?.sign(invoice_hash_hex)
    }

    fn public_key_pem(&self) -> Result<String, SigningError> {
        Self::read(&self.paths.public_key)
    }
}

fn write_new(path: &Path, contents: &str, private: bool) -> Result<(), KeyStoreError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    if private {
        owner_only(&mut options);
    }

    let mut file = options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => KeyStoreError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::AlreadyExists, "refusing to overwrite key file"),
        },
        _ => KeyStoreError::io(path, e),
    })?;

    file.write_all(contents.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            discard(path);
            KeyStoreError::io(path, e)
        })
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not remove partially written key file");
    }
}

#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only(_options: &mut OpenOptions) {}

fn invalid(err: SigningError) -> KeyStoreError {
    KeyStoreError::InvalidKey(err.to_string())
}

fn from_signing(err: SigningError) -> KeyStoreError {
    match err {
        SigningError::KeyUnavailable(reason) => KeyStoreError::Unavailable(reason),
        other => invalid(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> KeyStore {
        KeyStore::new(KeyPaths {
            private_key: dir.join("ecc_private.pem"),
            public_key: dir.join("ecc_public.pem"),
            csr: dir.join("invoice_csr.pem"),
        })
    }

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_generates_pair_and_csr() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir.path().join("keys"));

        let paths = store.ensure_key_pair().unwrap();
        assert!(paths.private_key.exists());
        assert!(paths.public_key.exists());
        assert!(paths.csr.exists());

        let provider = store.provider();
        let signature = provider.sign(HASH).unwrap();
        let public = provider.public_key_pem().unwrap();
        assert!(verify_signature(&public, HASH, &signature).is_ok());
    }

    #[test]
    fn test_existing_keys_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.ensure_key_pair().unwrap();
        let before = fs::read_to_string(&store.paths().private_key).unwrap();

        store.ensure_key_pair().unwrap();
        let after = fs::read_to_string(&store.paths().private_key).unwrap();
        assert_eq!(before, after);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.ensure_key_pair().unwrap();

        let mode = fs::metadata(&store.paths().private_key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_generation_leaves_no_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let public_key = store.paths().public_key.clone();

        // A dangling link does not "exist" but blocks creating the file
        std::os::unix::fs::symlink(dir.path().join("nowhere"), &public_key).unwrap();

        assert!(matches!(store.ensure_key_pair(), Err(KeyStoreError::Io { .. })));
        assert!(!store.paths().private_key.exists());

        fs::remove_file(&public_key).unwrap();
        store.ensure_key_pair().unwrap();
        assert!(store.paths().private_key.exists());
        assert!(store.paths().public_key.exists());
    }

    #[test]
    fn test_half_pair_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.ensure_key_pair().unwrap();
        fs::remove_file(&store.paths().public_key).unwrap();

        assert!(matches!(store.ensure_key_pair(), Err(KeyStoreError::Incomplete(_))));
        assert!(!store.paths().public_key.exists());
    }

    #[test]
    fn test_mismatched_pair_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.ensure_key_pair().unwrap();

        let other = EcdsaKeyPair::generate().spki_pem().unwrap();
        fs::write(&store.paths().public_key, other).unwrap();

        assert!(matches!(store.ensure_key_pair(), Err(KeyStoreError::Mismatch)));
    }

    #[test]
    fn test_missing_key_after_startup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.ensure_key_pair().unwrap();

        let provider = store.provider();
        fs::remove_file(&store.paths().private_key).unwrap();

        assert!(matches!(provider.sign(HASH), Err(SigningError::KeyUnavailable(_))));
    }

    #[test]
    fn test_corrupt_key_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.ensure_key_pair().unwrap();
        fs::write(&store.paths().private_key, "not a key").unwrap();

        assert!(matches!(
            store.provider().sign(HASH),
            Err(SigningError::KeyUnavailable(_))
        ));
    }
}
