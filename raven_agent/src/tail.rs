//! Tail operation over directories of append-style files: read only the most recent N
//! records without aggregating anything. Shared by the snapshot sampler (fixed cap) and
//! the read-through API endpoints (caller-supplied cap).

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Regular files directly under `dir`, in the order the filesystem returns them.
/// A missing directory yields `Ok(None)`.
pub async fn list_files(dir: &Path) -> io::Result<Option<Vec<String>>> {
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        // follow symlinks so rotated "current" links still count
        let is_file = match fs::metadata(entry.path()).await {
            Ok(md) => md.is_file(),
            Err(_) => false,
        };
        if is_file {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(Some(names))
}

/// Non-empty lines of `path`. Invalid UTF-8 is replaced rather than rejected.
pub async fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let bytes = fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_owned)
        .collect())
}

/// Walk the newest `max_files` files of `dir` (newest = greatest name) and collect up to
/// `limit` records, newest lines first. The result is ordered oldest to newest.
/// Unreadable files are skipped; a missing directory yields no records.
pub async fn tail_dir<T, F>(dir: &Path, max_files: usize, limit: usize, map: F) -> io::Result<Vec<T>>
where
    F: Fn(&str) -> Option<T>,
{
    let Some(mut names) = list_files(dir).await? else {
        return Ok(Vec::new());
    };
    names.sort_unstable_by(|a, b| b.cmp(a));

    // chunks collected newest file first; reversed when joining
    let mut chunks: Vec<Vec<T>> = Vec::new();
    let mut collected = 0;
    for name in names.into_iter().take(max_files) {
        if collected >= limit {
            break;
        }
        let path: PathBuf = dir.join(&name);
        match read_lines(&path).await {
            Ok(lines) => {
                let chunk = last_records(&lines, limit - collected, &map);
                collected += chunk.len();
                chunks.push(chunk);
            }
            Err(e) => debug!("skipping unreadable file {}: {e}", path.display()),
        }
    }
    Ok(chunks.into_iter().rev().flatten().collect())
}

/// The last `limit` lines for which `map` yields a record, oldest to newest.
pub fn last_records<T, F>(lines: &[String], limit: usize, map: &F) -> Vec<T>
where
    F: Fn(&str) -> Option<T>,
{
    let mut out: Vec<T> = lines
        .iter()
        .rev()
        .filter_map(|l| map(l.as_str()))
        .take(limit)
        .collect();
    out.reverse();
    out
}
