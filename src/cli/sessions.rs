//! Session management commands.

use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::cli::BackendOverrides;
use crate::core::config::{path_display, Config};
use crate::core::context::PromptContext;
use crate::core::session::{
    FileSessionStore, Session, SessionId, SessionStore, DEFAULT_SESSION_NAME,
};

const MACHINE_COLOUR: &str = "\x1b[36m";
const RESET_COLOUR: &str = "\x1b[0m";

pub(crate) fn open_store(config: &Config) -> Result<FileSessionStore, Box<dyn Error>> {
    Ok(FileSessionStore::new(config.sessions_dir()?))
}

pub(crate) fn load_session(
    store: &impl SessionStore,
    id: SessionId,
) -> Result<Session, Box<dyn Error>> {
    store
        .get(id)?
        .ok_or_else(|| format!("Session {id} not found. Run 'promptpad sessions' to list them.").into())
}

pub fn list_sessions() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let sessions = store.list()?;

    if sessions.is_empty() {
        println!(
            "No sessions in {}. Create one with 'promptpad new'.",
            path_display(store.dir())
        );
        return Ok(());
    }

    println!("Sessions in {}:", path_display(store.dir()));
    for summary in sessions {
        println!(
            "  {:>4}  {}  {}",
            summary.id,
            summary.updated_at.format("%Y-%m-%d %H:%M"),
            summary.name
        );
    }
    Ok(())
}

pub fn new_session(name: String, overrides: &BackendOverrides) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let mut store = open_store(&config)?;

    let name = if name.trim().is_empty() {
        DEFAULT_SESSION_NAME.to_string()
    } else {
        name
    };
    let mut session = Session::new(name, &config);
    session.backend = overrides.apply(session.backend);

    let id = store.create(&session)?;
    println!("✅ Created session {id}: {}", session.name);
    Ok(())
}

pub fn delete_session(id: SessionId) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let mut store = open_store(&config)?;
    if store.delete(id)? {
        println!("✅ Deleted session {id}");
        Ok(())
    } else {
        Err(format!("Session {id} not found").into())
    }
}

pub fn show_session(id: SessionId, mark_chunks: bool) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let session = load_session(&store, id)?;

    let mut stdout = io::stdout().lock();
    for chunk in session.document.chunks() {
        if mark_chunks && chunk.is_machine() {
            write!(stdout, "{MACHINE_COLOUR}{}{RESET_COLOUR}", chunk.content)?;
        } else {
            write!(stdout, "{}", chunk.content)?;
        }
    }
    writeln!(stdout)?;
    Ok(())
}

/// Reconciles new text into the session so unchanged machine chunks keep
/// their authorship.
pub fn write_session(id: SessionId, file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let mut store = open_store(&config)?;
    let mut session = load_session(&store, id)?;

    let text = match file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let mut controller = session.controller();
    let summary = controller.edit_text(&text);
    if !summary.changed {
        println!("Session {id} unchanged");
        return Ok(());
    }

    session.update_from(&controller);
    store.put(id, &session)?;
    println!(
        "✅ Updated session {id} ({} chunks)",
        session.document.len()
    );
    Ok(())
}

/// Prints the assembled context, optionally importing memory, author's note
/// and world info from `import` first. Context settings from the file replace
/// the session's only when the file carries them.
pub fn print_context(id: SessionId, import: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let mut store = open_store(&config)?;
    let mut session = load_session(&store, id)?;

    if let Some(path) = import {
        let contents = fs::read_to_string(path)?;
        session.context = import_context(&contents, &session.context)?;
        session.touch();
        store.put(id, &session)?;
        eprintln!("✅ Imported context from {}", path_display(path));
    }

    let mut controller = session.controller();
    println!("{}", controller.assembled_context());
    Ok(())
}

pub(crate) fn import_context(
    json: &str,
    current: &PromptContext,
) -> Result<PromptContext, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let has_settings = value.get("settings").is_some();
    let mut imported: PromptContext = serde_json::from_value(value)?;
    if !has_settings {
        imported.settings = current.settings;
    }
    Ok(imported)
}
