//! Source archive download and extraction.
//!
//! Function sources are zip archives or gzip-compressed tarballs, told apart
//! by their leading bytes. Downloads are streamed to disk with a size cap;
//! extraction rejects any entry that would land outside the destination
//! directory (absolute paths, `..` segments) as well as link and device
//! entries, and stops at the next read once its token is cancelled.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dofunc_core::{ProviderConfig, ProviderError, Result};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use crate::context::OpContext;
use crate::retry::RetryPolicy;

/// File name the archive is downloaded to inside the working directory.
pub const ARCHIVE_FILE_NAME: &str = "source.archive";

const UNPACK_OPERATION: &str = "unpack archive";
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// What an unpack wrote to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    pub files: usize,
    pub directories: usize,
}

/// Container formats accepted as function sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Identify the format from the first bytes of the file.
    pub fn sniff(magic: &[u8]) -> Option<Self> {
        match magic {
            [b'P', b'K', 3, 4, ..] | [b'P', b'K', 5, 6, ..] | [b'P', b'K', 7, 8, ..] => Some(Self::Zip),
            [0x1f, 0x8b, ..] => Some(Self::TarGz),
            _ => None,
        }
    }
}

/// Fetches and unpacks function sources.
#[async_trait]
pub trait SourceArchive: Send + Sync {
    /// Download `url` into `work_dir`, returning the local archive path.
    async fn fetch(&self, ctx: &OpContext, url: &str, work_dir: &Path) -> Result<PathBuf>;

    /// Extract `archive` into `dest_dir`.
    ///
    /// Dropping the returned future stops the extraction.
    async fn unpack(&self, ctx: &OpContext, archive: &Path, dest_dir: &Path) -> Result<UnpackSummary>;
}

pub type DynSourceArchive = Arc<dyn SourceArchive>;

/// [`SourceArchive`] that downloads over HTTP(S).
pub struct HttpSourceArchive {
    http: reqwest::Client,
    retry: RetryPolicy,
    timeout: Duration,
    max_bytes: u64,
}

impl HttpSourceArchive {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            retry: RetryPolicy::from_config(&config.retry),
            timeout: config.function.fetch_timeout(),
            max_bytes: config.function.max_archive_bytes,
        })
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<u64> {
        let operation = "fetch archive";
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::transport(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::protocol(operation, status.as_u16(), body));
        }
        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(self.too_large(url));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ProviderError::io(format!("creating {}", dest.display()), e))?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProviderError::transport(operation, e))?
        {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(self.too_large(url));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| ProviderError::io(format!("writing {}", dest.display()), e))?;
        }
        file.flush()
            .await
            .map_err(|e| ProviderError::io(format!("writing {}", dest.display()), e))?;
        Ok(written)
    }

    fn too_large(&self, url: &str) -> ProviderError {
        ProviderError::invalid_resource(format!(
            "source archive at {url} exceeds the {} byte limit",
            self.max_bytes
        ))
    }
}

#[async_trait]
impl SourceArchive for HttpSourceArchive {
    async fn fetch(&self, ctx: &OpContext, url: &str, work_dir: &Path) -> Result<PathBuf> {
        let dest = work_dir.join(ARCHIVE_FILE_NAME);
        let target = dest.as_path();
        // A plain GET is idempotent, so transient failures are retried.
        let bytes = self
            .retry
            .run(ctx, "fetch archive", move || {
                ctx.bound("fetch archive", self.timeout, self.download_once(url, target))
            })
            .await?;
        tracing::info!(url, bytes, path = %dest.display(), "downloaded source archive");
        Ok(dest)
    }

    async fn unpack(&self, ctx: &OpContext, archive: &Path, dest_dir: &Path) -> Result<UnpackSummary> {
        let stop = ctx.cancellation_token().child_token();
        // Cancels the blocking extraction when this future is dropped by a
        // timeout or a cancelled context.
        let _guard = stop.clone().drop_guard();
        let archive = archive.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_archive(&archive, &dest_dir, &stop))
            .await
            .map_err(|e| ProviderError::extraction("<archive>", format!("unpack task failed: {e}")))?
    }
}

/// Extract a zip or `.tar.gz` into `dest_dir`, creating it if needed.
///
/// Any failing entry aborts the whole extraction with an error naming it.
/// `stop` is checked between entries and on every read.
pub fn unpack_archive(archive: &Path, dest_dir: &Path, stop: &CancellationToken) -> Result<UnpackSummary> {
    let archive_name = archive.display().to_string();
    let mut file = File::open(archive).map_err(|e| ProviderError::extraction(&archive_name, e))?;
    let mut magic = [0u8; 4];
    let read = read_prefix(&mut file, &mut magic).map_err(|e| ProviderError::extraction(&archive_name, e))?;
    let format = ArchiveFormat::sniff(&magic[..read]).ok_or_else(|| {
        ProviderError::extraction(&archive_name, "unrecognised archive format, expected zip or tar.gz")
    })?;
    let file = File::open(archive).map_err(|e| ProviderError::extraction(&archive_name, e))?;
    fs::create_dir_all(dest_dir)
        .map_err(|e| ProviderError::io(format!("creating {}", dest_dir.display()), e))?;

    let summary = match format {
        ArchiveFormat::Zip => unpack_zip(file, &archive_name, dest_dir, stop)?,
        ArchiveFormat::TarGz => unpack_tar_gz(file, &archive_name, dest_dir, stop)?,
    };

    tracing::debug!(
        format = ?format,
        files = summary.files,
        directories = summary.directories,
        dest = %dest_dir.display(),
        "unpacked source archive"
    );
    Ok(summary)
}

fn read_prefix(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn unpack_zip(file: File, archive_name: &str, dest_dir: &Path, stop: &CancellationToken) -> Result<UnpackSummary> {
    let mut zip = ZipArchive::new(file).map_err(|e| ProviderError::extraction(archive_name, e))?;
    let mut summary = UnpackSummary::default();
    for index in 0..zip.len() {
        ensure_running(stop)?;
        let mut entry = zip
            .by_index(index)
            .map_err(|e| ProviderError::extraction(archive_name, e))?;
        let name = entry.name().to_string();

        let Some(relative) = sanitize_entry_path(&name)? else {
            continue;
        };
        if entry.enclosed_name().is_none() {
            return Err(ProviderError::extraction(&name, "path escapes the destination directory"));
        }
        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            return Err(ProviderError::extraction(&name, "unsupported entry type Symlink"));
        }
        let target = dest_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ProviderError::extraction(&name, e))?;
            summary.directories += 1;
        } else {
            write_entry(&target, &name, &mut entry, mode, stop)?;
            summary.files += 1;
        }
    }
    Ok(summary)
}

fn unpack_tar_gz(file: File, archive_name: &str, dest_dir: &Path, stop: &CancellationToken) -> Result<UnpackSummary> {
    let mut tarball = Archive::new(GzDecoder::new(file));
    let entries = tarball
        .entries()
        .map_err(|e| ProviderError::extraction(archive_name, e))?;

    let mut summary = UnpackSummary::default();
    for entry in entries {
        ensure_running(stop)?;
        let mut entry = entry.map_err(|e| ProviderError::extraction(archive_name, e))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }

        let Some(relative) = sanitize_entry_path(&name)? else {
            // "./" and friends: the destination itself.
            continue;
        };
        let target = dest_dir.join(&relative);

        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|e| ProviderError::extraction(&name, e))?;
                summary.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                let mode = entry.header().mode().ok();
                write_entry(&target, &name, &mut entry, mode, stop)?;
                summary.files += 1;
            }
            other => {
                return Err(ProviderError::extraction(
                    &name,
                    format!("unsupported entry type {other:?}"),
                ));
            }
        }
    }
    Ok(summary)
}

fn write_entry(
    target: &Path,
    name: &str,
    entry: &mut impl Read,
    mode: Option<u32>,
    stop: &CancellationToken,
) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ProviderError::extraction(name, e))?;
    }
    let mut out = File::create(target).map_err(|e| ProviderError::extraction(name, e))?;
    let mut reader = StopReader { inner: entry, stop };
    io::copy(&mut reader, &mut out).map_err(|e| {
        if stop.is_cancelled() {
            cancelled()
        } else {
            ProviderError::extraction(name, e)
        }
    })?;
    set_mode(target, mode).map_err(|e| ProviderError::extraction(name, e))
}

fn ensure_running(stop: &CancellationToken) -> Result<()> {
    if stop.is_cancelled() { Err(cancelled()) } else { Ok(()) }
}

fn cancelled() -> ProviderError {
    ProviderError::Cancelled {
        operation: UNPACK_OPERATION.to_string(),
    }
}

/// Fails the next read once `stop` is cancelled.
struct StopReader<'a, R> {
    inner: R,
    stop: &'a CancellationToken,
}

impl<R: Read> Read for StopReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.stop.is_cancelled() {
            return Err(io::Error::other("unpack cancelled"));
        }
        self.inner.read(buf)
    }
}

/// Resolve a stored entry path to a path relative to the destination.
///
/// Returns `Ok(None)` for entries naming the destination root.
fn sanitize_entry_path(name: &str) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ProviderError::extraction(
                    name,
                    "path escapes the destination directory",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ProviderError::extraction(name, "absolute paths are not allowed"));
            }
        }
    }
    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}
