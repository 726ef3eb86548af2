use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;
use unionlayer::{InodeHandle, LayerStore, Mode, RemovePolicy};

/// Get the path to the unionlayer binary for testing.
#[allow(dead_code)]
pub fn get_unionlayer_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("unionlayer").to_path_buf()
}

/// Isolated config directory for CLI runs.
/// #[allow(dead_code)] because not every test file uses every helper.
#[allow(dead_code)]
pub struct TestConfigContext {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl Default for TestConfigContext {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl TestConfigContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("config");
        Self {
            temp_dir,
            config_dir,
        }
    }

    /// Write `config.toml` into the isolated config directory.
    pub fn write_config(&self, content: &str) {
        fs::create_dir_all(&self.config_dir).expect("Failed to create config dir");
        fs::write(self.config_dir.join("config.toml"), content).expect("Failed to write config");
    }

    /// Write a replay script into the temp dir and return its path.
    pub fn write_script(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content).expect("Failed to write script");
        path
    }

    /// A command for the unionlayer binary bound to this config directory.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(get_unionlayer_path());
        cmd.env("UNIONLAYER_CONFIG_DIR", &self.config_dir)
            .env("UNIONLAYER_LOG", "warn");
        cmd
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// A store with a `base` layer and a `top` layer stacked on it.
#[allow(dead_code)]
pub fn stacked_store(policy: RemovePolicy) -> LayerStore {
    let store = LayerStore::new(policy);
    store.create_layer("base", None).expect("create base");
    store.create_layer("top", Some("base")).expect("create top");
    store
}

#[allow(dead_code)]
pub fn create_file(store: &LayerStore, path: &str) -> InodeHandle {
    store
        .resolve(path, true, Mode::regular(0o644))
        .unwrap_or_else(|e| panic!("Failed to create {}: {}", path, e))
}

#[allow(dead_code)]
pub fn create_dir(store: &LayerStore, path: &str) -> InodeHandle {
    store
        .resolve(path, true, Mode::directory(0o755))
        .unwrap_or_else(|e| panic!("Failed to create {}: {}", path, e))
}

#[allow(dead_code)]
pub fn lookup(store: &LayerStore, path: &str) -> InodeHandle {
    store
        .resolve(path, false, Mode::regular(0))
        .unwrap_or_else(|e| panic!("Failed to resolve {}: {}", path, e))
}
