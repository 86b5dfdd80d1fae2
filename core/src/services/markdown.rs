//! Markdown export and import of single notes

use super::notes::{Note, NotesService};
use super::session::Session;
use crate::error::Result;
use crate::storage::write_atomic;
use std::path::Path;
use zeroize::Zeroizing;

impl NotesService {
    /// Write a note to `path` as `# <title>`, a blank line, then the content.
    /// An existing file is replaced atomically.
    pub async fn export_markdown(&self, session: &Session, id: &str, path: &Path) -> Result<()> {
        let note = self.get(session, id).await?;

        let rendered = Zeroizing::new(format!("# {}\n\n{}", note.title, note.content));
        write_atomic(path, rendered.as_bytes()).await?;

        tracing::info!("Exported note {} to {:?}", id, path);
        Ok(())
    }

    /// Create a note from a markdown file. The file is stored as the note
    /// content unchanged; the title comes from its first `# ` heading, or
    /// the file name without extension.
    pub async fn import_markdown(&self, session: &Session, path: &Path) -> Result<Note> {
        session.touch().await?;

        let content = Zeroizing::new(tokio::fs::read_to_string(path).await?);
        let title = markdown_title(path, &content);

        let note = self.create(session, &title, &content).await?;
        tracing::info!("Imported {:?} as note {}", path, note.id);
        Ok(note)
    }
}

fn markdown_title(path: &Path, content: &str) -> String {
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("# "))
        .map(str::to_string)
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
}
