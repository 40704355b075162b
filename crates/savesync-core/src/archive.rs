//! Zip codec for a save-data directory tree.

use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, SaveSyncError};
use crate::types::ArchiveMode;

/// Build an in-memory zip of `root`, positioned at its start.
///
/// Entry names are paths relative to `root`, `/`-separated. Only regular files
/// produce entries, so empty directories are not represented.
pub fn pack(root: &Path, mode: ArchiveMode) -> Result<Cursor<Vec<u8>>> {
    if !root.is_dir() {
        return Err(SaveSyncError::SaveDataNotFound(root.display().to_string()));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0usize;
    match mode {
        ArchiveMode::WholeFolder => {
            count += add_tree(&mut writer, root, root, options)?;
        }
        ArchiveMode::Subfolders => {
            for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
                let entry = entry?;
                if entry.file_type().is_dir() {
                    count += add_tree(&mut writer, root, entry.path(), options)?;
                }
            }
        }
    }

    let mut cursor = writer.finish()?;
    cursor.set_position(0);
    tracing::debug!(root = %root.display(), %mode, files = count, bytes = cursor.get_ref().len(), "Packed save data");
    Ok(cursor)
}

fn add_tree<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    root: &Path,
    dir: &Path,
    options: SimpleFileOptions,
) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry_name(root, entry.path())?;
        writer.start_file(name, options)?;
        let mut source = File::open(entry.path())?;
        std::io::copy(&mut source, writer)?;
        count += 1;
    }
    Ok(count)
}

/// Relative, `/`-separated entry name of `path` under `root`.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| SaveSyncError::OutsideRoot(path.display().to_string()))?;

    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => Ok(part.to_string_lossy().into_owned()),
            _ => Err(SaveSyncError::OutsideRoot(path.display().to_string())),
        })
        .collect::<Result<_>>()?;

    Ok(parts.join("/"))
}

/// Extract every non-empty entry under `root`, creating missing parent
/// directories and overwriting existing files. Returns the number of files
/// written.
///
/// Entries whose names would escape `root` are rejected.
pub fn unpack<R: Read + Seek>(reader: R, root: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(reader)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || entry.size() == 0 {
            continue;
        }

        let target: PathBuf = match entry.enclosed_name() {
            Some(relative) => root.join(relative),
            None => return Err(SaveSyncError::OutsideRoot(entry.name().to_string())),
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    tracing::debug!(root = %root.display(), files = written, "Unpacked save data");
    Ok(written)
}

/// Entry names of an archive, in archive order.
pub fn entry_names<R: Read + Seek>(reader: R) -> Result<Vec<String>> {
    let archive = ZipArchive::new(reader)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, data: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    entry_name(root, e.path()).unwrap(),
                    std::fs::read(e.path()).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn whole_folder_roundtrip() {
        let src = TempDir::new().unwrap();
        write(src.path(), "top.sav", b"top level");
        write(src.path(), "a/one.bin", b"1111");
        write(src.path(), "a/b/c/deep.bin", &[7u8; 4096]);
        std::fs::create_dir_all(src.path().join("empty")).unwrap();

        let archive = pack(src.path(), ArchiveMode::WholeFolder).unwrap();

        let dst = TempDir::new().unwrap();
        let n = unpack(archive, dst.path()).unwrap();
        assert_eq!(n, 3);
        assert_eq!(snapshot(src.path()), snapshot(dst.path()));
        assert!(!dst.path().join("empty").exists());
    }

    #[test]
    fn subfolders_scenario_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("ds3");
        write(&root, "Profile1/save.bin", b"0123456789");
        write(&root, "Profile1/sub/data.bin", b"abcd");

        let archive = pack(&root, ArchiveMode::Subfolders).unwrap();
        let mut names = entry_names(archive).unwrap();
        names.sort();
        assert_eq!(names, vec!["Profile1/save.bin", "Profile1/sub/data.bin"]);
    }

    #[test]
    fn subfolders_ignores_top_level_files_and_roundtrips_per_subfolder() {
        let src = TempDir::new().unwrap();
        write(src.path(), "loose.txt", b"ignored");
        write(src.path(), "P1/a.sav", b"p1");
        write(src.path(), "P2/x/b.sav", b"p2");

        let archive = pack(src.path(), ArchiveMode::Subfolders).unwrap();
        let dst = TempDir::new().unwrap();
        unpack(archive, dst.path()).unwrap();

        let mut expected = snapshot(src.path());
        expected.remove("loose.txt");
        assert_eq!(expected, snapshot(dst.path()));
    }

    #[test]
    fn unpack_overwrites_existing_files() {
        let src = TempDir::new().unwrap();
        write(src.path(), "slot/save.bin", b"new");
        let archive = pack(src.path(), ArchiveMode::WholeFolder).unwrap();

        let dst = TempDir::new().unwrap();
        write(dst.path(), "slot/save.bin", b"much older and longer content");
        write(dst.path(), "slot/untouched.bin", b"keep");
        unpack(archive, dst.path()).unwrap();

        assert_eq!(std::fs::read(dst.path().join("slot/save.bin")).unwrap(), b"new");
        assert_eq!(
            std::fs::read(dst.path().join("slot/untouched.bin")).unwrap(),
            b"keep"
        );
    }

    #[test]
    fn zero_length_entries_are_skipped() {
        let src = TempDir::new().unwrap();
        write(src.path(), "empty.bin", b"");
        write(src.path(), "full.bin", b"x");
        let archive = pack(src.path(), ArchiveMode::WholeFolder).unwrap();

        let dst = TempDir::new().unwrap();
        assert_eq!(unpack(archive, dst.path()).unwrap(), 1);
        assert!(!dst.path().join("empty.bin").exists());
        assert!(dst.path().join("full.bin").exists());
    }

    #[test]
    fn pack_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let result = pack(&tmp.path().join("nope"), ArchiveMode::WholeFolder);
        assert!(matches!(result, Err(SaveSyncError::SaveDataNotFound(_))));
    }

    #[test]
    fn unpack_garbage_fails() {
        let tmp = TempDir::new().unwrap();
        let result = unpack(Cursor::new(b"definitely not a zip".to_vec()), tmp.path());
        assert!(matches!(result, Err(SaveSyncError::Archive(_))));
    }
}
