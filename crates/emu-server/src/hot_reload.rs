//! Watches the config file for changes and creates any new queue/topic
//! definitions it finds (spec.md §6 `--hot-reload`).
//!
//! Grounded in `notify`-crate usage across the pack
//! (`other_examples/manifests/Aurora-energy-R-EMS`, `KumoCorp-kumomta`,
//! `dufeut-mik`). Existing queues/topics are left untouched on conflict —
//! see DESIGN.md for the Open Question this resolves.

use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};

use crate::state::AppState;

pub fn spawn(config_path: PathBuf, env: String, state: AppState) {
    std::thread::spawn(move || {
        let (tx, rx) = channel();
        let mut watcher = match notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        }) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "failed to create config watcher, hot reload disabled");
                return;
            }
        };

        if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
            tracing::error!(error = %e, path = %config_path.display(), "failed to watch config file");
            return;
        }

        tracing::info!(path = %config_path.display(), "watching config file for hot reload");

        for res in rx {
            match res {
                Ok(event) if event.kind.is_modify() => {
                    std::thread::sleep(Duration::from_millis(50));
                    match crate::config::load(&config_path, &env) {
                        Ok(new_config) => {
                            tracing::info!("config changed, merging new queue/topic definitions");
                            state.merge_from_config(&new_config);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "hot reload: failed to parse changed config, ignoring");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "config watcher error"),
            }
        }
    });
}
