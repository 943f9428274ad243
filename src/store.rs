use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::record::{Announcement, COLUMNS, URL_COLUMN};

const DELIMITER: &str = ";";

// ── Append-only log ──

/// One row read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    fields: Vec<String>,
}

impl StoredRow {
    fn parse(line: &str) -> Self {
        let mut fields: Vec<String> = line.split(DELIMITER).map(str::to_string).collect();
        // rows written with a trailing delimiter carry one empty extra field
        if fields.len() == COLUMNS.len() + 1 && fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        Self { fields }
    }

    /// Value of a flattened column (`"url"`, `"person1.name"`, ...).
    pub fn get(&self, column: &str) -> &str {
        COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.fields.get(i))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.fields
            .get(URL_COLUMN)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// The persisted `;`-separated store: header once, then one row per record.
///
/// Only ever appended to. The in-memory view is rebuilt by [`open`](Self::open).
#[derive(Debug)]
pub struct AnnouncementLog {
    path: PathBuf,
    empty: bool,
    rows: Vec<StoredRow>,
}

impl AnnouncementLog {
    /// Read the store at `path`; a missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read store {}", path.display()))
            }
        };

        let header = COLUMNS.join(DELIMITER);
        let rows = content
            .lines()
            .filter(|line| !line.trim().is_empty() && line.trim_end_matches(DELIMITER) != header)
            .map(StoredRow::parse)
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            empty: content.trim().is_empty(),
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn rows(&self) -> &[StoredRow] {
        &self.rows
    }

    /// Previously written identifiers, in store order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(StoredRow::url).filter(|u| !u.is_empty())
    }

    /// Write the header row if nothing has been written to the store yet.
    /// Returns whether a header was written.
    pub fn ensure_header(&mut self, record: &Announcement) -> Result<bool> {
        if !self.empty {
            return Ok(false);
        }
        let keys: Vec<&str> = record.flatten().into_iter().map(|(k, _)| k).collect();
        self.append_line(&keys.join(DELIMITER))?;
        Ok(true)
    }

    /// Append one flattened record.
    pub fn append_row(&mut self, record: &Announcement) -> Result<()> {
        let values: Vec<String> = record
            .flatten()
            .into_iter()
            .enumerate()
            .map(|(i, (_, v))| {
                if i == URL_COLUMN {
                    encode_url(v)
                } else {
                    sanitize(v)
                }
            })
            .collect();
        let line = values.join(DELIMITER);
        self.append_line(&line)?;
        self.rows.push(StoredRow { fields: values });
        Ok(())
    }

    fn append_line(&mut self, line: &str) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open store {}", self.path.display()))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        self.empty = false;
        Ok(())
    }
}

/// Keep a value inside its column: no delimiters, no line breaks.
fn sanitize(value: &str) -> String {
    value
        .trim()
        .replace(DELIMITER, ",")
        .replace(['\r', '\n'], " ")
}

/// The url column is read back as a dedup key, so it must not change
/// meaning: the delimiter is percent-encoded, not replaced.
fn encode_url(url: &str) -> String {
    url.trim().replace(DELIMITER, "%3B")
}

// ── Known identifiers ──

/// Identifiers that must not be fetched again: already stored or excluded.
#[derive(Debug, Default)]
pub struct KnownSet {
    known: HashSet<String>,
    excluded: HashSet<String>,
}

impl KnownSet {
    pub fn new(
        stored: impl IntoIterator<Item = String>,
        excluded: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            known: stored.into_iter().collect(),
            excluded: excluded.into_iter().collect(),
        }
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.excluded.contains(id) || self.known.contains(id)
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.excluded.contains(id)
    }

    pub fn mark_known(&mut self, id: &str) {
        self.known.insert(id.to_string());
    }

    /// Number of stored identifiers (exclusions not counted).
    pub fn stored(&self) -> usize {
        self.known.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Person;

    fn record(url: &str) -> Announcement {
        Announcement {
            location: "Genk".into(),
            date: "1 juli 2024".into(),
            person1: Person {
                name: "Jan".into(),
                age: "34".into(),
                location: "Genk".into(),
                job: "ingenieur".into(),
            },
            person2: Person {
                name: "Els".into(),
                age: "31".into(),
                location: "As".into(),
                job: "verpleegkundige".into(),
            },
            children: String::new(),
            where_met: "Op de kermis; daarna\nop café".into(),
            image_url: "https://images.hbvl.be/1.jpg".into(),
            url: url.into(),
        }
    }

    #[test]
    fn missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = AnnouncementLog::open(&dir.path().join("data/m.csv")).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.urls().count(), 0);
    }

    #[test]
    fn zero_byte_store_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        fs::write(&path, "").unwrap();

        let mut log = AnnouncementLog::open(&path).unwrap();
        assert!(log.is_empty());
        assert!(log.ensure_header(&record("https://x/1")).unwrap());
        log.append_row(&record("https://x/1")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&COLUMNS.join(";")));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn blank_store_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        fs::write(&path, "\n  \n").unwrap();

        let mut log = AnnouncementLog::open(&path).unwrap();
        assert!(log.is_empty());
        assert!(log.ensure_header(&record("https://x/1")).unwrap());
        log.append_row(&record("https://x/1")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], COLUMNS.join(";"));
        assert_eq!(content.matches("person1.name").count(), 1);

        let reread = AnnouncementLog::open(&path).unwrap();
        assert!(!reread.is_empty());
        assert_eq!(reread.urls().collect::<Vec<_>>(), vec!["https://x/1"]);
    }

    #[test]
    fn url_column_keeps_its_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let mut log = AnnouncementLog::open(&path).unwrap();
        log.ensure_header(&record("https://x/a?x=1;y=2")).unwrap();
        log.append_row(&record("https://x/a?x=1;y=2")).unwrap();

        let reread = AnnouncementLog::open(&path).unwrap();
        assert_eq!(reread.rows()[0].url(), "https://x/a?x=1%3By=2");
        assert_eq!(reread.rows()[0].get("whereMet"), "Op de kermis, daarna op café");
    }

    #[test]
    fn header_written_once_before_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/m.csv");

        let mut log = AnnouncementLog::open(&path).unwrap();
        assert!(log.ensure_header(&record("https://x/1")).unwrap());
        log.append_row(&record("https://x/1")).unwrap();
        assert!(!log.ensure_header(&record("https://x/2")).unwrap());
        log.append_row(&record("https://x/2")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], COLUMNS.join(";"));
        assert_eq!(content.matches("person1.name").count(), 1);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn reopened_store_never_gets_a_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");

        let mut log = AnnouncementLog::open(&path).unwrap();
        log.ensure_header(&record("https://x/1")).unwrap();
        log.append_row(&record("https://x/1")).unwrap();

        let mut log = AnnouncementLog::open(&path).unwrap();
        assert!(!log.is_empty());
        assert!(!log.ensure_header(&record("https://x/2")).unwrap());
        log.append_row(&record("https://x/2")).unwrap();

        let reread = AnnouncementLog::open(&path).unwrap();
        let urls: Vec<&str> = reread.urls().collect();
        assert_eq!(urls, vec!["https://x/1", "https://x/2"]);
    }

    #[test]
    fn values_stay_in_their_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let mut log = AnnouncementLog::open(&path).unwrap();
        log.ensure_header(&record("https://x/1")).unwrap();
        log.append_row(&record("https://x/1")).unwrap();

        let reread = AnnouncementLog::open(&path).unwrap();
        let row = &reread.rows()[0];
        assert_eq!(row.get("whereMet"), "Op de kermis, daarna op café");
        assert_eq!(row.get("person2.job"), "verpleegkundige");
        assert_eq!(row.url(), "https://x/1");
    }

    #[test]
    fn legacy_rows_with_trailing_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let mut content = COLUMNS.join(";");
        content.push('\n');
        for _ in 0..2 {
            content.push_str(
                "Genk;1 juli;Jan;34;Genk;ingenieur;Els;31;As;zorg;;kermis;img;https://www.hbvl.be//cnt/dmf1;\n",
            );
        }
        fs::write(&path, content).unwrap();

        let log = AnnouncementLog::open(&path).unwrap();
        assert_eq!(log.rows().len(), 2);
        assert_eq!(log.rows()[0].url(), "https://www.hbvl.be//cnt/dmf1");
        assert_eq!(log.rows()[0].get("person1.job"), "ingenieur");
    }

    #[test]
    fn exclusions_are_always_known() {
        let mut known = KnownSet::new(
            vec!["https://x/1".to_string()],
            vec!["https://x/bad".to_string()],
        );
        assert!(known.is_known("https://x/1"));
        assert!(known.is_known("https://x/bad"));
        assert!(known.is_excluded("https://x/bad"));
        assert!(!known.is_excluded("https://x/1"));
        assert!(!known.is_known("https://x/2"));

        known.mark_known("https://x/2");
        assert!(known.is_known("https://x/2"));
        assert_eq!(known.stored(), 2);
    }
}
