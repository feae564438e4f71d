//! Single-file JSON backend.

use anyhow::{Context, Result};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Backend, CardRow, Profile, Tables};
use crate::card::{CardId, CardType};
use crate::credential::CredentialRecord;

/// Keeps every table in one JSON document on disk.
///
/// Reads are served from the copy loaded at open. Each mutation builds the
/// next table state, writes it out crash-safely and only then replaces the
/// in-memory copy, so a failed write leaves both unchanged.
pub struct FileBackend {
    path: PathBuf,
    tables: Tables,
}

impl FileBackend {
    /// Opens the vault file at `path`, starting empty if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: PathBuf) -> Result<Self> {
        let tables = if path.exists() {
            let data = fs::read(&path)
                .with_context(|| format!("failed to read vault file {}", path.display()))?;
            serde_json::from_slice(&data).context("vault file is not valid")?
        } else {
            Tables::default()
        };

        tracing::debug!(path = %path.display(), "opened vault file");
        Ok(Self { path, tables })
    }

    /// Returns `true` if the vault file exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&mut self, next: Tables) -> Result<()> {
        let data = serde_json::to_vec_pretty(&next)?;
        self.write_atomic(&data)?;
        self.tables = next;
        Ok(())
    }

    /// Write `data` to the vault file without ever leaving a partial file.
    ///
    /// The bytes go to a fresh temp file in the same directory, which is
    /// synced and then swapped in over the old file. The directory is synced
    /// afterwards so the rename itself survives a crash.
    fn write_atomic(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// `<file name>.tmp.<16 hex chars>` next to the vault file.
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;

        let suffix = buf.iter().map(|b| format!("{b:02x}")).collect::<String>();
        let file_name = self
            .path
            .file_name()
            .context("vault path has no file name")?
            .to_string_lossy();

        Ok(self.path.with_file_name(format!("{file_name}.tmp.{suffix}")))
    }

    /// Uses `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH`; a plain rename
    /// cannot overwrite an existing file on Windows.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call;
        // the optional pointers are null.
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context("atomic replace failed");
        }

        Ok(())
    }

    /// `rename()` is atomic within one filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

impl Backend for FileBackend {
    fn credential(&self) -> Result<Option<CredentialRecord>> {
        Ok(self.tables.credential.clone())
    }

    fn put_credential(&mut self, record: &CredentialRecord) -> Result<()> {
        let mut next = self.tables.clone();
        next.credential = Some(record.clone());
        self.commit(next)
    }

    fn card(&self, id: CardId) -> Result<Option<CardRow>> {
        Ok(self.tables.card(id))
    }

    fn cards(&self) -> Result<Vec<(CardId, CardRow)>> {
        Ok(self.tables.cards_where(|_| true))
    }

    fn cards_by_type(&self, kind: CardType) -> Result<Vec<(CardId, CardRow)>> {
        Ok(self.tables.cards_of_type(kind))
    }

    fn put_card(&mut self, id: Option<CardId>, row: CardRow) -> Result<CardId> {
        let mut next = self.tables.clone();
        let id = next.put_card(id, row);
        self.commit(next)?;
        Ok(id)
    }

    fn delete_card(&mut self, id: CardId) -> Result<()> {
        if self.tables.card(id).is_none() {
            return Ok(());
        }
        let mut next = self.tables.clone();
        next.delete_card(id);
        self.commit(next)
    }

    fn profile(&self) -> Result<Option<Profile>> {
        Ok(self.tables.profile.clone())
    }

    fn put_profile(&mut self, profile: &Profile) -> Result<()> {
        let mut next = self.tables.clone();
        next.profile = Some(profile.clone());
        self.commit(next)
    }

    fn clear(&mut self) -> Result<()> {
        self.commit(Tables::default())
    }
}
