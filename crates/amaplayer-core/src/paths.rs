use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "amaplayer.yaml";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}
