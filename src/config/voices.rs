//! Voice model discovery.
//!
//! Voices are `<name>.onnx` files looked up in the user voice directory first, then in the
//! system-wide directory installed with the package.

use std::path::{Path, PathBuf};

use anyhow::Result;

/// System-wide voice directory.
pub const SYSTEM_VOICE_DIR: &str = "/usr/share/piper-speak/voices";

/// Default user voice directory (~/.local/share/piper/voices).
pub fn default_user_voice_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".local").join("share").join("piper").join("voices")
    } else {
        PathBuf::from("voices")
    }
}

/// Find the model file for a voice.
///
/// # Arguments
/// * `name` - Voice name without extension (e.g. `en_US-lessac-medium`)
/// * `user_dir` - User voice directory, searched before the system directory
///
/// # Errors
/// Returns an error if no directory holds the model.
pub fn find_voice(name: &str, user_dir: &Path) -> Result<PathBuf> {
    find_voice_in(name, &[user_dir, Path::new(SYSTEM_VOICE_DIR)])
}

fn find_voice_in(name: &str, search_dirs: &[&Path]) -> Result<PathBuf> {
    let file_name = format!("{}.onnx", name);

    for dir in search_dirs {
        let path = dir.join(&file_name);
        if path.exists() {
            return Ok(path);
        }
    }

    anyhow::bail!("voice model not found: {}", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_dir_wins_over_system_dir() {
        let user = tempfile::tempdir().unwrap();
        let system = tempfile::tempdir().unwrap();
        std::fs::write(user.path().join("en_US-amy-low.onnx"), b"").unwrap();
        std::fs::write(system.path().join("en_US-amy-low.onnx"), b"").unwrap();

        let found = find_voice_in("en_US-amy-low", &[user.path(), system.path()]).unwrap();
        assert_eq!(found, user.path().join("en_US-amy-low.onnx"));
    }

    #[test]
    fn test_falls_back_to_system_dir() {
        let user = tempfile::tempdir().unwrap();
        let system = tempfile::tempdir().unwrap();
        std::fs::write(system.path().join("de_DE-thorsten-high.onnx"), b"").unwrap();

        let found = find_voice_in("de_DE-thorsten-high", &[user.path(), system.path()]).unwrap();
        assert_eq!(found, system.path().join("de_DE-thorsten-high.onnx"));
    }

    #[test]
    fn test_missing_voice_names_the_voice() {
        let user = tempfile::tempdir().unwrap();
        let err = find_voice_in("xx_XX-nobody", &[user.path()]).unwrap_err();
        assert_eq!(err.to_string(), "voice model not found: xx_XX-nobody");
    }

    #[test]
    fn test_default_user_dir_layout() {
        assert!(default_user_voice_dir().ends_with("piper/voices"));
    }
}
