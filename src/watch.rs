use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_rust::Notification;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::workspace::Workspace;

/// Mirrors a local file into a stored file until Ctrl-C.
pub async fn run_watch_mode(
    ws: &Workspace,
    file_id: &str,
    path: &Path,
    desktop_notifications: bool,
) -> Result<()> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(err=%e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    watch_file(ws, file_id, path, desktop_notifications, ctrl_c).await
}

/// Feeds every modification of `path` to the stored file's autosaver until
/// `shutdown` resolves, then flushes the last edit. A missing local file is
/// seeded from the stored content.
pub async fn watch_file(
    ws: &Workspace,
    file_id: &str,
    path: &Path,
    desktop_notifications: bool,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let file = ws.load_file(file_id).await?;

    if !path.exists() {
        fs::write(path, &file.content)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        info!(path=%path.display(), "seeded local copy from stored file");
    }
    let path = fs::canonicalize(path)
        .await
        .with_context(|| format!("resolve {}", path.display()))?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let saver = ws.autosaver(&file);
    let mut saved = saver.subscribe();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        },
        notify::Config::default().with_poll_interval(Duration::from_millis(500)),
    )?;
    // Editors often replace the file on save, so watch the directory.
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    info!(path=%path.display(), file=%file.name, "watching for changes");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = rx.recv() => {
                let Some(res) = res else { break };
                match res {
                    Ok(event) => {
                        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                            continue;
                        }
                        if !event.paths.iter().any(|p| p == &path) {
                            continue;
                        }
                        match fs::read_to_string(&path).await {
                            Ok(content) => saver.edit(content),
                            Err(e) => warn!("Failed to read file {}: {}", path.display(), e),
                        }
                    }
                    Err(e) => error!("Watch error: {:?}", e),
                }
            }
            changed = saved.changed() => {
                if changed.is_err() {
                    break;
                }
                info!(file=%file.name, "saved");
                if desktop_notifications {
                    notify_saved(&file.name);
                }
            }
            () = &mut shutdown => {
                info!("stopping watch mode");
                break;
            }
        }
    }

    drop(watcher);
    saver.close().await;
    Ok(())
}

fn notify_saved(name: &str) {
    if let Err(e) = Notification::new()
        .summary("Code Chambers")
        .body(&format!("{name} was saved."))
        .show()
    {
        warn!(err=%e, "desktop notification failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, AutosaveConfig, BackendConfig};
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;
    use tokio::sync::oneshot;
    use tokio::time::sleep;

    fn file_row(content: &str) -> serde_json::Value {
        json!({
            "id": "f1",
            "project_id": "p1",
            "name": "script.js",
            "content": content,
            "language": "javascript",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn local_edits_reach_the_stored_file() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/code_files"),
                request::query(url_decoded(contains(("id", "eq.f1")))),
            ])
            .respond_with(json_encoded(json!([file_row("let a = 1;")]))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PATCH", "/rest/v1/code_files"),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["content"] == "let a = 2;"
                })),
            ])
            .respond_with(json_encoded(json!([file_row("let a = 2;")]))),
        );
        let config = AppConfig {
            backend: BackendConfig {
                url: server.url_str(""),
                anon_key: "anon-key".into(),
                email_domain: "chambers.local".into(),
            },
            session_file: dir.path().join("session.json"),
            autosave: AutosaveConfig { debounce_ms: 50 },
            ..AppConfig::default()
        };
        let ws = Workspace::open(config).unwrap();
        let path = dir.path().join("script.js");

        let (stop, stopped) = oneshot::channel::<()>();
        let shutdown = async {
            let _ = stopped.await;
        };
        let edit = async {
            sleep(Duration::from_millis(300)).await;
            assert_eq!(fs::read_to_string(&path).await.unwrap(), "let a = 1;");
            fs::write(&path, "let a = 2;").await.unwrap();
            sleep(Duration::from_millis(700)).await;
            let _ = stop.send(());
        };

        let (watched, ()) = tokio::join!(watch_file(&ws, "f1", &path, false, shutdown), edit);
        watched.unwrap();
    }

    #[tokio::test]
    async fn missing_stored_file_stops_before_touching_disk() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/rest/v1/code_files"))
                .respond_with(json_encoded(json!([]))),
        );
        let config = AppConfig {
            backend: BackendConfig {
                url: server.url_str(""),
                anon_key: "anon-key".into(),
                email_domain: "chambers.local".into(),
            },
            session_file: dir.path().join("session.json"),
            ..AppConfig::default()
        };
        let ws = Workspace::open(config).unwrap();
        let path = dir.path().join("gone.js");

        let result = watch_file(&ws, "gone", &path, false, std::future::ready(())).await;
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
