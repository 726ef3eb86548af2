use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use unionlayer::config::load_config;
use unionlayer::{InodeHandle, LayerError, LayerStore, Mode, Result};

const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

/// A replay script: a TOML array of `[[op]]` tables run in order.
#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default, rename = "op")]
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    Dir,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Op {
    CreateLayer {
        id: String,
        #[serde(default)]
        parent: Option<String>,
    },
    RemoveLayer {
        id: String,
    },
    SetUpper {
        id: String,
    },
    UnsetUpper {
        id: String,
    },
    Resolve {
        path: String,
        #[serde(default)]
        create: bool,
        #[serde(default)]
        kind: EntryKind,
        #[serde(default = "default_permissions")]
        perm: u32,
        /// Name to keep the handle under. Unnamed handles are released at once.
        #[serde(default)]
        handle: Option<String>,
    },
    Release {
        handle: String,
    },
    MarkDeleted {
        handle: String,
    },
    Write {
        handle: String,
        data: String,
        #[serde(default)]
        offset: u64,
    },
    Read {
        handle: String,
        #[serde(default)]
        offset: u64,
        len: usize,
    },
    Sweep,
    Changes {
        id: String,
        #[serde(default)]
        parent: Option<String>,
    },
    DiffSize {
        id: String,
        #[serde(default)]
        parent: Option<String>,
    },
}

fn default_permissions() -> u32 {
    DEFAULT_FILE_PERMISSIONS
}

impl Op {
    fn action(&self) -> &'static str {
        match self {
            Op::CreateLayer { .. } => "create_layer",
            Op::RemoveLayer { .. } => "remove_layer",
            Op::SetUpper { .. } => "set_upper",
            Op::UnsetUpper { .. } => "unset_upper",
            Op::Resolve { .. } => "resolve",
            Op::Release { .. } => "release",
            Op::MarkDeleted { .. } => "mark_deleted",
            Op::Write { .. } => "write",
            Op::Read { .. } => "read",
            Op::Sweep => "sweep",
            Op::Changes { .. } => "changes",
            Op::DiffSize { .. } => "diff_size",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub step: usize,
    pub action: &'static str,
    pub ok: bool,
    pub detail: serde_json::Value,
}

pub fn parse_script(content: &str) -> Result<Script> {
    toml::from_str(content).map_err(|e| LayerError::Script(format!("Failed to parse script: {}", e)))
}

/// Executes script operations against one store, keeping named handles open
/// between steps.
pub struct Replayer {
    store: LayerStore,
    handles: HashMap<String, InodeHandle>,
}

impl Replayer {
    pub fn new(store: LayerStore) -> Self {
        Replayer {
            store,
            handles: HashMap::new(),
        }
    }

    pub fn run(&mut self, script: &Script) -> Vec<Outcome> {
        script
            .ops
            .iter()
            .enumerate()
            .map(|(idx, op)| {
                let (ok, detail) = match self.apply(op) {
                    Ok(detail) => (true, detail),
                    Err(e) => {
                        tracing::debug!("step {} ({}) failed: {}", idx + 1, op.action(), e);
                        (false, serde_json::json!({ "error": e.to_string() }))
                    }
                };
                Outcome {
                    step: idx + 1,
                    action: op.action(),
                    ok,
                    detail,
                }
            })
            .collect()
    }

    fn handle(&self, name: &str) -> Result<&InodeHandle> {
        self.handles
            .get(name)
            .ok_or_else(|| LayerError::Script(format!("unknown handle '{}'", name)))
    }

    fn apply(&mut self, op: &Op) -> Result<serde_json::Value> {
        let detail = match op {
            Op::CreateLayer { id, parent } => {
                self.store.create_layer(id, parent.as_deref())?;
                serde_json::json!({ "id": id, "parent": parent })
            }
            Op::RemoveLayer { id } => {
                self.store.remove_layer(id)?;
                serde_json::json!({ "id": id })
            }
            Op::SetUpper { id } => {
                self.store.set_upper(id)?;
                serde_json::json!({ "id": id, "upper": true })
            }
            Op::UnsetUpper { id } => {
                self.store.unset_upper(id)?;
                serde_json::json!({ "id": id, "upper": false })
            }
            Op::Resolve {
                path,
                create,
                kind,
                perm,
                handle,
            } => {
                let mode = match kind {
                    EntryKind::File => Mode::regular(*perm),
                    EntryKind::Dir => Mode::directory(*perm),
                };
                let resolved = self.store.resolve(path, *create, mode)?;
                let detail = describe(&resolved);
                if let Some(name) = handle {
                    if let Some(previous) = self.handles.insert(name.clone(), resolved) {
                        self.store.release(previous);
                    }
                }
                detail
            }
            Op::Release { handle } => {
                let released = self
                    .handles
                    .remove(handle)
                    .ok_or_else(|| LayerError::Script(format!("unknown handle '{}'", handle)))?;
                let path = released.path().to_string();
                let layer = released.layer_id().to_string();
                self.store.release(released);
                serde_json::json!({ "handle": handle, "layer": layer, "path": path })
            }
            Op::MarkDeleted { handle } => {
                let target = self.handle(handle)?;
                self.store.mark_deleted(target);
                describe(target)
            }
            Op::Write {
                handle,
                data,
                offset,
            } => {
                let written = self.handle(handle)?.write_at(*offset, data.as_bytes())?;
                serde_json::json!({ "handle": handle, "written": written })
            }
            Op::Read {
                handle,
                offset,
                len,
            } => {
                let bytes = self.handle(handle)?.read_at(*offset, *len)?;
                serde_json::json!({
                    "handle": handle,
                    "data": String::from_utf8_lossy(&bytes),
                })
            }
            Op::Sweep => serde_json::to_value(self.store.sweep())?,
            Op::Changes { id, parent } => {
                serde_json::to_value(self.store.changes(id, parent.as_deref())?)?
            }
            Op::DiffSize { id, parent } => {
                let bytes = self.store.diff_size(id, parent.as_deref())?;
                serde_json::json!({ "id": id, "parent": parent, "bytes": bytes })
            }
        };
        Ok(detail)
    }

    /// Number of handles still held open.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

fn describe(handle: &InodeHandle) -> serde_json::Value {
    serde_json::json!({
        "layer": handle.layer_id(),
        "path": handle.path(),
        "mode": handle.mode().to_string(),
        "refs": handle.ref_count(),
        "deleted": handle.is_deleted(),
    })
}

pub async fn run_replay(script_path: &Path, json: bool, strict: bool) -> Result<i32> {
    let content = std::fs::read_to_string(script_path).map_err(|e| {
        LayerError::Script(format!(
            "Failed to read script {}: {}",
            script_path.display(),
            e
        ))
    })?;
    let script = parse_script(&content)?;

    let config = load_config()?;
    let store = LayerStore::from_config(&config.engine);
    let reaper = store.spawn_reaper(Duration::from_millis(
        config.engine.get_reclaim_interval_ms(),
    ));

    let mut replayer = Replayer::new(store);
    let outcomes = replayer.run(&script);
    if replayer.open_handles() > 0 {
        tracing::debug!(
            "Releasing {} handles left open by the script",
            replayer.open_handles()
        );
    }
    drop(replayer);

    if let Some(reaper) = reaper {
        reaper.shutdown().await;
    }

    if json {
        println!("{}", serde_json::to_string(&outcomes)?);
    } else {
        for outcome in &outcomes {
            println!(
                "{:>4} {:<4} {:<13} {}",
                outcome.step,
                if outcome.ok { "ok" } else { "err" },
                outcome.action,
                outcome.detail
            );
        }
    }

    let failures = outcomes.iter().filter(|o| !o.ok).count();
    Ok(if strict && failures > 0 { 1 } else { 0 })
}
