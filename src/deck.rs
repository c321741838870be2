/*!
 * Deck output.
 *
 * A `DeckPackager` turns the ordered result rows into one importable
 * artifact. The bundled `TsvDeckWriter` writes a tab-separated file with a
 * header row naming the six note fields; audio stays in the media directory
 * and is referenced through `[sound:FILE]` tags.
 */

use anyhow::{Context, Result};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::cards::ResultRow;
use crate::file_utils::FileManager;

static SOUND_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[sound:([^\]]+)\]").expect("valid sound tag pattern"));

/// Produces a deck artifact from result rows and their media
pub trait DeckPackager {
    /// Write the deck and return the path of the artifact
    fn package(&self, rows: &[ResultRow], media_dir: &Path) -> Result<PathBuf>;
}

/// Tab-separated deck file
#[derive(Debug, Clone)]
pub struct TsvDeckWriter {
    path: PathBuf,
    source_label: String,
    target_label: String,
}

impl TsvDeckWriter {
    pub fn new<P: AsRef<Path>>(path: P, source_label: &str, target_label: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source_label: source_label.to_string(),
            target_label: target_label.to_string(),
        }
    }

    /// Names of the six note fields
    pub fn header(&self) -> [String; 6] {
        [
            format!("Front ({} + Audio)", self.source_label),
            format!("Back ({})", self.target_label),
            format!("Example ({})", self.source_label),
            format!("Example ({})", self.target_label),
            "Note".to_string(),
            "New words".to_string(),
        ]
    }

    /// Full file body: header line plus one line per row
    pub fn render(&self, rows: &[ResultRow]) -> String {
        let mut out = String::new();
        push_line(&mut out, self.header().iter().map(String::as_str));
        for row in rows {
            push_line(&mut out, row.fields().into_iter());
        }
        out
    }
}

impl DeckPackager for TsvDeckWriter {
    fn package(&self, rows: &[ResultRow], media_dir: &Path) -> Result<PathBuf> {
        let missing: Vec<String> = collect_media(rows)
            .into_iter()
            .filter(|file| !media_dir.join(file).exists())
            .collect();
        for file in &missing {
            warn!("Referenced audio file missing from {}: {}", media_dir.display(), file);
        }

        FileManager::write_atomic(&self.path, self.render(rows).as_bytes())
            .with_context(|| format!("Failed to write deck file: {}", self.path.display()))?;

        info!("Wrote {} note(s) to {}", rows.len(), self.path.display());
        Ok(self.path.clone())
    }
}

/// Media files referenced by `[sound:..]` tags, in first-seen order
pub fn collect_media(rows: &[ResultRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for row in rows {
        for field in row.fields() {
            for capture in SOUND_REGEX.captures_iter(field) {
                let file = capture[1].to_string();
                if seen.insert(file.clone()) {
                    ordered.push(file);
                }
            }
        }
    }
    ordered
}

/// Quote a field when it contains a tab, a line break or a quote
pub fn escape_field(field: &str) -> String {
    if field.contains(['\t', '\n', '\r', '"']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = fields.map(escape_field).collect();
    out.push_str(&line.join("\t"));
    out.push('\n');
}
