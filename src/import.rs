//! Импорт картинок-прогнозов из `<root>/<category>/` в хранилище.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::category::CategorySet;
use crate::db::Db;
use crate::forecast::Payload;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

fn has_image_extension(p: &Path) -> bool {
    match p.extension().and_then(|s| s.to_str()).map(|s| s.to_lowercase()) {
        Some(ext) => matches!(
            ext.as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" | "tiff"
        ),
        None => false,
    }
}

async fn list_files(dir: &Path) -> Result<Option<Vec<PathBuf>>> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("cannot read {}", dir.display())),
    };
    let mut paths = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        paths.push(entry.path());
    }
    // порядок имён файлов = порядок выдачи
    paths.sort();
    Ok(Some(paths))
}

/// Импортирует новые картинки всех настроенных категорий.
/// Файл, уже импортированный в категорию (тот же SHA-256), пропускается,
/// даже если его прогноз с тех пор был удалён очисткой.
pub async fn import_dir(db: &Db, root: &Path, categories: &CategorySet) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for category in categories.iter() {
        let dir = root.join(category.key());
        let Some(paths) = list_files(&dir).await? else {
            debug!(dir = %dir.display(), "import: no directory, skip");
            continue;
        };

        for path in paths {
            if !has_image_extension(&path) {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(err) => {
                    warn!(file = ?path, error = %err, "import: read failed");
                    report.rejected += 1;
                    continue;
                }
            };
            if image::guess_format(&bytes).is_err() {
                warn!(file = ?path, "import: not an image, skip");
                report.rejected += 1;
                continue;
            }

            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            let hash = format!("{:x}", hasher.finalize());

            let payload = Payload::File {
                path: path.to_string_lossy().into_owned(),
            };
            match db.upload_hashed(category, payload, &hash).await? {
                Some(id) => {
                    debug!(file = ?path, id, category = %category, "import: added");
                    report.imported += 1;
                }
                None => report.duplicates += 1,
            }
        }
    }
    info!(
        imported = report.imported,
        duplicates = report.duplicates,
        rejected = report.rejected,
        "import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

    fn write(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn imports_images_in_name_order_and_skips_the_rest() {
        let root = tempfile::tempdir().unwrap();
        let set = CategorySet::new(&["football", "tennis"]).unwrap();
        let football = set.get("football").unwrap();

        write(&root.path().join("football/b.png"), PNG_MAGIC);
        write(&root.path().join("football/a.JPG"), JPEG_MAGIC);
        write(&root.path().join("football/notes.txt"), b"hello");
        write(&root.path().join("football/broken.png"), b"not really a png");

        let db = Db::open_in_memory().await.unwrap();
        let report = import_dir(&db, root.path(), &set).await.unwrap();
        assert_eq!(
            report,
            ImportReport { imported: 2, duplicates: 0, rejected: 1 }
        );

        let items = db.available(1, football).await.unwrap();
        let names: Vec<String> = items
            .iter()
            .map(|i| match &i.payload {
                Payload::File { path } => Path::new(path)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned(),
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
    }

    #[tokio::test]
    async fn second_run_only_reports_duplicates() {
        let root = tempfile::tempdir().unwrap();
        let set = CategorySet::new(&["dota"]).unwrap();
        write(&root.path().join("dota/1.png"), PNG_MAGIC);

        let db = Db::open_in_memory().await.unwrap();
        import_dir(&db, root.path(), &set).await.unwrap();
        let again = import_dir(&db, root.path(), &set).await.unwrap();
        assert_eq!(
            again,
            ImportReport { imported: 0, duplicates: 1, rejected: 0 }
        );
    }

    #[tokio::test]
    async fn cleared_files_are_not_imported_again() {
        let root = tempfile::tempdir().unwrap();
        let set = CategorySet::new(&["dota"]).unwrap();
        let dota = set.get("dota").unwrap();
        write(&root.path().join("dota/1.png"), PNG_MAGIC);

        let db = Db::open_in_memory().await.unwrap();
        import_dir(&db, root.path(), &set).await.unwrap();
        let first = db.available(42, dota).await.unwrap()[0].id;
        db.mark_delivered(42, first).await.unwrap();
        db.clear_category(dota).await.unwrap();

        let again = import_dir(&db, root.path(), &set).await.unwrap();
        assert_eq!(
            again,
            ImportReport { imported: 0, duplicates: 1, rejected: 0 }
        );
        assert!(db.available(42, dota).await.unwrap().is_empty());
        assert!(db.available(7, dota).await.unwrap().is_empty());

        write(&root.path().join("dota/2.png"), JPEG_MAGIC);
        let fresh = import_dir(&db, root.path(), &set).await.unwrap();
        assert_eq!(fresh.imported, 1);
        assert_eq!(db.available(42, dota).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_image_goes_into_each_category() {
        let root = tempfile::tempdir().unwrap();
        let set = CategorySet::new(&["football", "tennis"]).unwrap();
        write(&root.path().join("football/pick.png"), PNG_MAGIC);
        write(&root.path().join("tennis/pick.png"), PNG_MAGIC);

        let db = Db::open_in_memory().await.unwrap();
        let report = import_dir(&db, root.path(), &set).await.unwrap();
        assert_eq!(
            report,
            ImportReport { imported: 2, duplicates: 0, rejected: 0 }
        );
        for c in set.iter() {
            assert_eq!(db.available(1, c).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn missing_category_directory_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let set = CategorySet::new(&["hockey"]).unwrap();
        let db = Db::open_in_memory().await.unwrap();
        let report = import_dir(&db, root.path(), &set).await.unwrap();
        assert_eq!(report, ImportReport::default());
    }
}
