use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{Session, SessionId, SessionStore, SessionStoreError, SessionSummary};
use crate::core::config::io::write_atomically;

const NEXT_ID_FILE: &str = "next_id";

/// One `<id>.json` file per session plus a `next_id` counter file, all in
/// one directory. Writes go through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn io_error(path: &Path, source: std::io::Error) -> SessionStoreError {
        SessionStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn read_session(path: &Path) -> Result<Option<Session>, SessionStoreError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Self::io_error(path, err)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| SessionStoreError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Ids of every `<id>.json` file in the directory, ascending.
    fn stored_ids(&self) -> Result<Vec<SessionId>, SessionStoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Self::io_error(&self.dir, err)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| Self::io_error(&self.dir, err))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<SessionId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn read_counter(&self) -> Result<SessionId, SessionStoreError> {
        let path = self.dir.join(NEXT_ID_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => match contents.trim().parse() {
                Ok(id) => Ok(id),
                Err(_) => {
                    warn!(path = %path.display(), "Ignoring unreadable session counter");
                    Ok(0)
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
            Err(err) => Err(Self::io_error(&path, err)),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError> {
        Self::read_session(&self.session_path(id))
    }

    fn put(&mut self, id: SessionId, session: &Session) -> Result<(), SessionStoreError> {
        let path = self.session_path(id);
        let contents =
            serde_json::to_vec_pretty(session).map_err(SessionStoreError::Serialize)?;
        write_atomically(&path, &contents).map_err(|err| Self::io_error(&path, err))?;
        debug!(id, path = %path.display(), "Saved session");
        Ok(())
    }

    fn delete(&mut self, id: SessionId) -> Result<bool, SessionStoreError> {
        let path = self.session_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Self::io_error(&path, err)),
        }
    }

    /// Files that fail to parse are skipped with a warning so one bad file
    /// does not hide the rest.
    fn list(&self) -> Result<Vec<SessionSummary>, SessionStoreError> {
        let mut summaries = Vec::new();
        for id in self.stored_ids()? {
            match Self::read_session(&self.session_path(id)) {
                Ok(Some(session)) => summaries.push(SessionSummary::of(id, &session)),
                Ok(None) => {}
                Err(err) => warn!(id, error = %err, "Skipping unreadable session"),
            }
        }
        Ok(summaries)
    }

    /// The counter never falls behind the ids on disk, so a lost or stale
    /// counter file cannot hand out an id that is already in use.
    fn next_id(&mut self) -> Result<SessionId, SessionStoreError> {
        let counter = self.read_counter()?;
        let past_stored = self
            .stored_ids()?
            .last()
            .map_or(0, |highest| highest + 1);
        let id = counter.max(past_stored);

        let path = self.dir.join(NEXT_ID_FILE);
        write_atomically(&path, (id + 1).to_string().as_bytes())
            .map_err(|err| Self::io_error(&path, err))?;
        Ok(id)
    }
}
