//! Folder statistics shown next to the selected effect.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::events::EffectDetails;
use crate::scan::Effect;

/// Relative paths longer than this many characters are shortened.
pub const DISPLAY_PATH_MAX: usize = 50;

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Total size in bytes of every file below `dir`. Unreadable entries count
/// as zero.
pub fn folder_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("size walk skipped entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// `0 B`, `512.0 B`, `1.5 KB`, ... up to GB with one decimal.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", SIZE_UNITS[unit])
}

/// Keep the tail of `path` so it fits in `max` characters, prefixed by `...`.
pub fn shorten_path(path: &Path, max: usize) -> String {
    let text = path.to_string_lossy();
    let len = text.chars().count();
    if len <= max {
        return text.into_owned();
    }
    let keep = max.saturating_sub(3);
    let tail: String = text.chars().skip(len - keep).collect();
    format!("...{tail}")
}

pub fn effect_details(effect: &Effect, position: Option<usize>, playlist_len: usize) -> EffectDetails {
    EffectDetails {
        name: effect.name.clone(),
        path: effect.path.clone(),
        display_path: shorten_path(&effect.relative_path, DISPLAY_PATH_MAX),
        image_count: effect.image_count,
        size_bytes: folder_size(&effect.path),
        position,
        playlist_len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Category;
    use std::path::PathBuf;

    #[test]
    fn sizes_use_one_decimal() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2048.0 GB");
    }

    #[test]
    fn long_paths_keep_their_tail() {
        let short = Path::new("magic/fire");
        assert_eq!(shorten_path(short, DISPLAY_PATH_MAX), "magic/fire");

        let long = "a".repeat(40) + "/" + &"b".repeat(20);
        let shown = shorten_path(Path::new(&long), DISPLAY_PATH_MAX);
        assert_eq!(shown.chars().count(), DISPLAY_PATH_MAX);
        assert!(shown.starts_with("..."));
        assert!(shown.ends_with(&"b".repeat(20)));
    }

    #[test]
    fn multibyte_names_are_cut_on_char_boundaries() {
        let long = "特效".repeat(30);
        let shown = shorten_path(Path::new(&long), DISPLAY_PATH_MAX);
        assert_eq!(shown.chars().count(), DISPLAY_PATH_MAX);
    }

    #[test]
    fn details_sum_folder_contents() {
        let dir = tempfile::tempdir().unwrap();
        let fx = dir.path().join("fire");
        std::fs::create_dir(&fx).unwrap();
        std::fs::write(fx.join("1.png"), [0u8; 100]).unwrap();
        std::fs::write(fx.join("2.png"), [0u8; 28]).unwrap();
        std::fs::write(fx.join("notes.txt"), [0u8; 2]).unwrap();

        let effect = Effect {
            name: "fire".into(),
            path: fx.clone(),
            relative_path: PathBuf::from("fire"),
            category: Category::Root,
            image_count: 2,
        };
        let details = effect_details(&effect, Some(1), 3);
        assert_eq!(details.size_bytes, 130);
        assert_eq!(details.display_path, "fire");
        assert_eq!(details.position, Some(1));
        assert_eq!(details.playlist_len, 3);
    }
}
