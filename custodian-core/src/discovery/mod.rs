//! The Discovery Walker (§4.3): concurrently enumerates candidate media
//! files under the configured scan roots, filtering by extension/path
//! exclusions and skipping paths already catalogued.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jwalk::WalkDir;

use crate::model::{Exclusion, ExclusionType};
use crate::prober::{SUPPORTED_IMAGE_EXTENSIONS, SUPPORTED_VIDEO_EXTENSIONS};

/// One file discovery turned up, ready for the Adding phase to insert.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub file_size: i64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Compiled exclusion rules, split by kind for cheap matching per entry.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl ExclusionSet {
    pub fn from_rows(rows: &[Exclusion]) -> Self {
        let mut paths = Vec::new();
        let mut extensions = Vec::new();
        for row in rows {
            match row.exclusion_type {
                ExclusionType::Path => paths.push(PathBuf::from(&row.value)),
                ExclusionType::Extension => extensions.push(row.value.trim_start_matches('.').to_lowercase()),
            }
        }
        Self { paths, extensions }
    }

    fn excludes_dir(&self, dir: &Path) -> bool {
        self.paths.iter().any(|p| dir.starts_with(p))
    }

    fn excludes_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }
}

/// Cooperative cancellation flag shared with the Operation Engine; checked
/// at directory boundaries so a cancel takes effect within one directory's
/// worth of work rather than mid-walk.
pub type CancelFlag = Arc<AtomicBool>;

/// Walks `roots` concurrently via jwalk, yielding files with a supported
/// media extension that are not excluded and not already present in
/// `known_paths`, in ascending creation-time order within each root.
///
/// For multiple roots, the walk is spread across `min(roots.len(),
/// max_workers)` worker threads, one bucket of roots per thread. A shared
/// counter enforces `max_files` as a global discovery limit across every
/// worker; `max_files <= 0` means unlimited.
///
/// `on_progress` is invoked with the final discovered count once every
/// worker has finished its roots.
pub fn discover(
    roots: &[PathBuf],
    exclusions: &ExclusionSet,
    known_paths: &HashSet<PathBuf>,
    cancel: &CancelFlag,
    max_workers: usize,
    max_files: i64,
    mut on_progress: impl FnMut(usize),
) -> Vec<DiscoveredFile> {
    if roots.is_empty() {
        return Vec::new();
    }

    let worker_count = roots.len().min(max_workers.max(1));
    let limit = if max_files > 0 { Some(max_files as usize) } else { None };
    let discovered_count = Arc::new(AtomicUsize::new(0));

    let mut buckets: Vec<Vec<PathBuf>> = vec![Vec::new(); worker_count];
    for (i, root) in roots.iter().enumerate() {
        buckets[i % worker_count].push(root.clone());
    }

    let found: Vec<DiscoveredFile> = std::thread::scope(|scope| {
        let handles: Vec<_> = buckets
            .into_iter()
            .map(|bucket| {
                let discovered_count = Arc::clone(&discovered_count);
                scope.spawn(move || walk_roots(&bucket, exclusions, known_paths, cancel, limit, &discovered_count))
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().expect("discovery worker panicked")).collect()
    });

    on_progress(found.len());
    found
}

fn walk_roots(
    roots: &[PathBuf],
    exclusions: &ExclusionSet,
    known_paths: &HashSet<PathBuf>,
    cancel: &CancelFlag,
    limit: Option<usize>,
    discovered_count: &AtomicUsize,
) -> Vec<DiscoveredFile> {
    let mut found = Vec::new();

    for root in roots {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if limit.is_some_and(|l| discovered_count.load(Ordering::Relaxed) >= l) {
            break;
        }

        let mut batch: Vec<DiscoveredFile> = WalkDir::new(root)
            .skip_hidden(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                if limit.is_some_and(|l| discovered_count.load(Ordering::Relaxed) >= l) {
                    return None;
                }
                let path = entry.path();
                if exclusions.excludes_dir(path.parent().unwrap_or(&path)) {
                    return None;
                }
                let ext = path.extension()?.to_str()?.to_lowercase();
                if !SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str())
                    && !SUPPORTED_VIDEO_EXTENSIONS.contains(&ext.as_str())
                {
                    return None;
                }
                if exclusions.excludes_extension(&ext) {
                    return None;
                }
                if known_paths.contains(&path) {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                discovered_count.fetch_add(1, Ordering::Relaxed);
                Some(DiscoveredFile {
                    path,
                    file_size: metadata.len() as i64,
                    created: metadata.created().ok().map(DateTime::<Utc>::from),
                    modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                })
            })
            .collect();

        batch.sort_by_key(|f| f.created);
        found.extend(batch);

        if cancel.load(Ordering::Relaxed) {
            break;
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn finds_supported_extensions_only() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a.jpg");
        touch(tmp.path(), "b.txt");
        touch(tmp.path(), "c.mp4");

        let exclusions = ExclusionSet::default();
        let known = HashSet::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let found = discover(&[tmp.path().to_path_buf()], &exclusions, &known, &cancel, 4, 0, |_| {});

        let names: HashSet<_> = found.iter().map(|f| f.path.file_name().unwrap().to_owned()).collect();
        assert!(names.contains(std::ffi::OsStr::new("a.jpg")));
        assert!(names.contains(std::ffi::OsStr::new("c.mp4")));
        assert!(!names.contains(std::ffi::OsStr::new("b.txt")));
    }

    #[test]
    fn skips_known_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let known_path = touch(tmp.path(), "known.jpg");
        touch(tmp.path(), "new.jpg");

        let exclusions = ExclusionSet::default();
        let mut known = HashSet::new();
        known.insert(known_path);
        let cancel = Arc::new(AtomicBool::new(false));
        let found = discover(&[tmp.path().to_path_buf()], &exclusions, &known, &cancel, 4, 0, |_| {});

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path.file_name().unwrap(), "new.jpg");
    }

    #[test]
    fn extension_exclusion_is_honored() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a.jpg");
        touch(tmp.path(), "b.mp4");

        let exclusions = ExclusionSet::from_rows(&[Exclusion {
            id: 1,
            exclusion_type: ExclusionType::Extension,
            value: "mp4".to_string(),
            created_date: Utc::now(),
        }]);
        let known = HashSet::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let found = discover(&[tmp.path().to_path_buf()], &exclusions, &known, &cancel, 4, 0, |_| {});

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path.file_name().unwrap(), "a.jpg");
    }

    #[test]
    fn cancel_flag_stops_before_remaining_roots() {
        let tmp_a = tempfile::tempdir().unwrap();
        let tmp_b = tempfile::tempdir().unwrap();
        touch(tmp_a.path(), "a.jpg");
        touch(tmp_b.path(), "b.jpg");

        let exclusions = ExclusionSet::default();
        let known = HashSet::new();
        let cancel = Arc::new(AtomicBool::new(true));
        let found = discover(
            &[tmp_a.path().to_path_buf(), tmp_b.path().to_path_buf()],
            &exclusions,
            &known,
            &cancel,
            2,
            0,
            |_| {},
        );
        assert!(found.is_empty());
    }

    #[test]
    fn multiple_roots_are_each_discovered() {
        let tmp_a = tempfile::tempdir().unwrap();
        let tmp_b = tempfile::tempdir().unwrap();
        touch(tmp_a.path(), "a.jpg");
        touch(tmp_b.path(), "b.jpg");

        let exclusions = ExclusionSet::default();
        let known = HashSet::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let found = discover(
            &[tmp_a.path().to_path_buf(), tmp_b.path().to_path_buf()],
            &exclusions,
            &known,
            &cancel,
            2,
            0,
            |_| {},
        );

        let names: HashSet<_> = found.iter().map(|f| f.path.file_name().unwrap().to_owned()).collect();
        assert!(names.contains(std::ffi::OsStr::new("a.jpg")));
        assert!(names.contains(std::ffi::OsStr::new("b.jpg")));
    }

    #[test]
    fn max_files_caps_total_discovered() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            touch(tmp.path(), &format!("f{i}.jpg"));
        }

        let exclusions = ExclusionSet::default();
        let known = HashSet::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let found = discover(&[tmp.path().to_path_buf()], &exclusions, &known, &cancel, 4, 2, |_| {});

        assert!(found.len() <= 2);
        assert!(!found.is_empty());
    }
}
