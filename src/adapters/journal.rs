//! Append-only JSONL journals shared by the file-backed collaborators.
//!
//! State is derived by replaying the journal. Every read-modify-append
//! cycle runs under an exclusive lock on the journal file so concurrent
//! invocations on the same host never interleave or double-claim.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A JSONL file of `T` records
pub(crate) struct Journal {
    path: PathBuf,
}

impl Journal {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Replay every record without taking the lock
    pub(crate) fn replay<T: DeserializeOwned>(&self) -> std::io::Result<Vec<T>> {
        match File::open(&self.path) {
            Ok(file) => read_records(&file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Lock the journal, replay it, and append whatever `decide` returns.
    ///
    /// The file must already exist; a missing journal surfaces as `NotFound`.
    pub(crate) fn update<T, R, E, F>(&self, decide: F) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<std::io::Error> + From<serde_json::Error>,
        F: FnOnce(Vec<T>) -> Result<(Vec<T>, R), E>,
    {
        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;

        let result = replay_and_append(&mut file, decide);

        // Closing the handle releases the lock as well
        let _ = file.unlock();
        result
    }

    /// Create the journal with its first records; fails if it already exists
    pub(crate) fn create_new<T: Serialize>(&self, records: &[T]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let written = write_records(&mut file, records);
        let _ = file.unlock();
        written
    }
}

/// Whether `name` can be used as a single file or directory name under a root
pub(crate) fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| c == '/' || c == '\\') && !name.contains("..")
}

fn replay_and_append<T, R, E, F>(file: &mut File, decide: F) -> Result<R, E>
where
    T: Serialize + DeserializeOwned,
    E: From<std::io::Error> + From<serde_json::Error>,
    F: FnOnce(Vec<T>) -> Result<(Vec<T>, R), E>,
{
    file.seek(SeekFrom::Start(0))?;
    let records = read_records(file)?;
    let (appended, value) = decide(records)?;
    write_records(file, &appended)?;
    Ok(value)
}

fn read_records<T: DeserializeOwned>(file: &File) -> std::io::Result<Vec<T>> {
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

fn write_records<T: Serialize>(file: &mut File, records: &[T]) -> std::io::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }
    file.write_all(&buf)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        n: u32,
    }

    #[test]
    fn test_create_then_update() {
        let temp = TempDir::new().unwrap();
        let journal = Journal::new(temp.path().join("j.jsonl"));

        journal.create_new(&[Entry { n: 1 }]).unwrap();
        assert!(journal.create_new(&[Entry { n: 9 }]).is_err());

        let seen: usize = journal
            .update::<Entry, _, std::io::Error, _>(|records| {
                let count = records.len();
                Ok((vec![Entry { n: 2 }], count))
            })
            .unwrap();
        assert_eq!(seen, 1);

        let records: Vec<Entry> = journal.replay().unwrap();
        assert_eq!(records, vec![Entry { n: 1 }, Entry { n: 2 }]);
    }

    #[test]
    fn test_safe_names() {
        assert!(is_safe_name("call_flow_T1"));
        assert!(is_safe_name("call_flow_4f2b-91ac"));

        for name in ["", "..", "call_flow_../x", "a/b", "a\\b", "/abs"] {
            assert!(!is_safe_name(name), "{:?} should be rejected", name);
        }
    }

    #[test]
    fn test_missing_journal() {
        let temp = TempDir::new().unwrap();
        let journal = Journal::new(temp.path().join("missing.jsonl"));

        let records: Vec<Entry> = journal.replay().unwrap();
        assert!(records.is_empty());

        let update = journal.update::<Entry, (), std::io::Error, _>(|_| Ok((vec![], ())));
        assert_eq!(update.unwrap_err().kind(), std::io::ErrorKind::NotFound);
    }
}
