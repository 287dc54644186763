use super::*;
use crate::db::{BackendOp, MemoryBackend};
use crate::model::{CanvasDocument, Widget, Workspace};
use crate::notify::ToastLevel;
use serde_json::json;

const DEBOUNCE: Duration = Duration::from_millis(1000);

fn setup() -> (SceneStore, MemoryBackend, Uuid) {
    let backend = MemoryBackend::new();
    let workspace_id = Uuid::new_v4();
    backend.seed_workspace(Workspace {
        id: workspace_id,
        owner_id: Uuid::new_v4(),
        name: "Home".into(),
        created_at: 1,
        updated_at: 1,
    });
    let store = SceneStore::new(Arc::new(backend.clone()), Notifier::new(), DEBOUNCE);
    (store, backend, workspace_id)
}

fn canvas(marker: u32) -> CanvasDocument {
    CanvasDocument(json!({ "elements": [{ "id": format!("e{marker}") }], "appState": {} }))
}

fn canvas_writes(backend: &MemoryBackend) -> Vec<CanvasDocument> {
    backend
        .scene_writes()
        .into_iter()
        .filter_map(|w| w.patch.canvas_data)
        .collect()
}

fn widget_writes(backend: &MemoryBackend) -> usize {
    backend
        .scene_writes()
        .iter()
        .filter(|w| w.patch.widgets.is_some())
        .count()
}

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// fetch
// =============================================================================

#[tokio::test]
async fn fetch_scenes_orders_most_recent_first() {
    let (store, backend, ws) = setup();
    let a = store.create_scene(ws, Some("A"), None).await.unwrap();
    let b = store.create_scene(ws, Some("B"), None).await.unwrap();
    backend.update_scene(a.id, &ScenePatch::canvas(canvas(1))).await.unwrap();

    store.reset();
    assert!(store.fetch_scenes(ws).await);
    let ids: Vec<_> = store.scenes().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn fetch_scenes_failure_sets_error_and_toasts() {
    let (store, backend, ws) = setup();
    let mut toasts = store.notifier().subscribe();
    backend.fail(BackendOp::ListScenes);

    assert!(!store.fetch_scenes(ws).await);
    assert!(store.error().is_some());
    assert!(!store.is_loading());
    let toast = toasts.try_recv().unwrap();
    assert_eq!(toast.level, ToastLevel::Error);
    assert_eq!(toast.message, notify::SCENE_FETCH_FAILED);

    store.clear_error();
    assert!(store.error().is_none());
}

#[tokio::test]
async fn fetch_scene_upserts_and_selects() {
    let (store, backend, ws) = setup();
    let created = store.create_scene(ws, None, None).await.unwrap();
    backend
        .update_scene(created.id, &ScenePatch { name: Some("Renamed".into()), ..ScenePatch::default() })
        .await
        .unwrap();
    store.set_current_scene(None);

    let FetchOutcome::Found(scene) = store.fetch_scene(created.id).await else {
        panic!("expected scene");
    };
    assert_eq!(scene.name, "Renamed");
    assert_eq!(store.scenes().len(), 1);
    assert_eq!(store.current_scene().map(|s| s.name), Some("Renamed".into()));
}

#[tokio::test]
async fn fetch_scene_appends_unknown_scene() {
    let (store, backend, ws) = setup();
    let other = SceneStore::new(Arc::new(backend.clone()), Notifier::new(), DEBOUNCE);
    let scene = other.create_scene(ws, None, None).await.unwrap();

    assert!(matches!(store.fetch_scene(scene.id).await, FetchOutcome::Found(_)));
    assert_eq!(store.scenes().len(), 1);
}

#[tokio::test]
async fn fetch_missing_scene_is_distinct_not_found() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();
    backend.delete_scene(scene.id).await.unwrap();

    assert_eq!(store.fetch_scene(scene.id).await, FetchOutcome::NotFound);
    assert!(store.current_scene().is_none());
    assert!(store.scene(scene.id).is_none());
}

#[tokio::test]
async fn fetch_scene_network_failure_is_failed() {
    let (store, backend, _) = setup();
    backend.set_offline(true);
    assert_eq!(store.fetch_scene(Uuid::new_v4()).await, FetchOutcome::Failed);
    assert!(store.error().is_some());
}

// =============================================================================
// create / update / delete
// =============================================================================

#[tokio::test]
async fn create_scene_prepends_and_selects() {
    let (store, _, ws) = setup();
    let first = store.create_scene(ws, None, None).await.unwrap();
    let second = store.create_scene(ws, Some("Second"), None).await.unwrap();

    assert_eq!(first.name, "Untitled Scene");
    assert_eq!(store.scenes()[0].id, second.id);
    assert_eq!(store.current_scene().map(|s| s.id), Some(second.id));
    assert_eq!(second.share_permission, SharePermission::None);
}

#[tokio::test]
async fn create_scene_with_seed_carries_content() {
    let (store, backend, ws) = setup();
    let seed = MigrationSnapshot { canvas_data: Some(canvas(7)), widgets: vec![Widget::new("w1".into(), 100.0, 100.0)] };
    let scene = store.create_scene(ws, Some("Imported"), Some(seed)).await.unwrap();
    let stored = backend.scene(scene.id).unwrap();
    assert_eq!(stored.widgets.len(), 1);
    assert_eq!(stored.canvas_data, Some(canvas(7)));
}

#[tokio::test]
async fn create_scene_failure_returns_none() {
    let (store, backend, ws) = setup();
    backend.fail(BackendOp::InsertScene);
    assert!(store.create_scene(ws, None, None).await.is_none());
    assert!(store.scenes().is_empty());
    assert!(store.error().is_some());
}

#[tokio::test]
async fn update_scene_writes_immediately() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();
    assert!(store.update_scene(scene.id, SceneUpdate::rename("Plans")).await);
    assert_eq!(backend.scene(scene.id).unwrap().name, "Plans");
    assert_eq!(store.scene(scene.id).unwrap().name, "Plans");
}

#[tokio::test]
async fn update_scene_failure_keeps_local_name() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, Some("Old"), None).await.unwrap();
    backend.fail(BackendOp::UpdateScene);
    assert!(!store.update_scene(scene.id, SceneUpdate::rename("New")).await);
    assert_eq!(store.scene(scene.id).unwrap().name, "Old");
}

#[tokio::test]
async fn delete_current_scene_leaves_nothing_current() {
    let (store, backend, ws) = setup();
    let a = store.create_scene(ws, None, None).await.unwrap();
    let b = store.create_scene(ws, None, None).await.unwrap();
    assert!(store.delete_scene(b.id).await);
    assert!(store.current_scene().is_none());
    assert_eq!(store.scenes().len(), 1);
    assert!(backend.scene(b.id).is_none());
    assert!(backend.scene(a.id).is_some());
}

#[tokio::test]
async fn delete_failure_keeps_scene() {
    let (store, backend, ws) = setup();
    let a = store.create_scene(ws, None, None).await.unwrap();
    backend.fail(BackendOp::DeleteScene);
    assert!(!store.delete_scene(a.id).await);
    assert!(store.scene(a.id).is_some());
}

#[tokio::test]
async fn set_current_scene_ignores_unfetched_ids() {
    let (store, _, ws) = setup();
    let a = store.create_scene(ws, None, None).await.unwrap();
    store.set_current_scene(Some(Uuid::new_v4()));
    assert_eq!(store.current_scene().map(|s| s.id), Some(a.id));
    store.set_current_scene(None);
    assert!(store.current_scene().is_none());
    store.set_current_scene(Some(a.id));
    assert_eq!(store.current_scene().map(|s| s.id), Some(a.id));
}

// =============================================================================
// save_scene_data
// =============================================================================

#[tokio::test(start_paused = true)]
async fn canvas_burst_collapses_to_one_write_of_last_payload() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();

    for i in 0..10 {
        store.save_scene_data(scene.id, SceneData { canvas_data: Some(canvas(i)), widgets: None });
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(canvas_writes(&backend).is_empty());
    assert_eq!(store.scene(scene.id).unwrap().canvas_data, Some(canvas(9)));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    settle().await;
    assert_eq!(canvas_writes(&backend), vec![canvas(9)]);
}

#[tokio::test(start_paused = true)]
async fn widget_write_is_not_debounced() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();

    let widgets = vec![Widget::new("w1".into(), 10.0, 20.0)];
    store.save_scene_data(scene.id, SceneData { canvas_data: None, widgets: Some(widgets.clone()) });
    tokio::task::yield_now().await;

    assert_eq!(widget_writes(&backend), 1);
    assert_eq!(backend.scene(scene.id).unwrap().widgets, widgets);
    assert!(!store.is_saving());
}

#[tokio::test(start_paused = true)]
async fn optimistic_state_survives_failed_save() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();
    let mut toasts = store.notifier().subscribe();
    backend.fail(BackendOp::UpdateScene);

    let widgets = vec![Widget::new("w1".into(), 0.0, 0.0)];
    store.save_scene_data(scene.id, SceneData { canvas_data: None, widgets: Some(widgets.clone()) });
    assert_eq!(store.scene(scene.id).unwrap().widgets, widgets);

    settle().await;
    assert_eq!(store.scene(scene.id).unwrap().widgets, widgets);
    assert!(store.is_unsynced(scene.id));
    assert!(store.error().is_some());
    assert_eq!(toasts.try_recv().unwrap().message, notify::SCENE_SAVE_FAILED);

    backend.recover(BackendOp::UpdateScene);
    store.save_scene_data(scene.id, SceneData { canvas_data: None, widgets: Some(widgets) });
    settle().await;
    assert!(!store.is_unsynced(scene.id));
}

#[tokio::test(start_paused = true)]
async fn is_saving_tracks_canvas_write_until_settled() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();
    backend.set_latency(Duration::from_millis(200));

    store.save_scene_data(scene.id, SceneData { canvas_data: Some(canvas(1)), widgets: None });
    assert!(store.is_saving());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(store.is_saving(), "write still in flight");

    tokio::time::sleep(Duration::from_millis(300)).await;
    settle().await;
    assert!(!store.is_saving());
    assert_eq!(canvas_writes(&backend).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn is_saving_clears_on_failed_canvas_write() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();
    backend.fail(BackendOp::UpdateScene);

    store.save_scene_data(scene.id, SceneData { canvas_data: Some(canvas(1)), widgets: None });
    tokio::time::sleep(Duration::from_millis(1100)).await;
    settle().await;
    assert!(!store.is_saving());
    assert!(store.is_unsynced(scene.id));
}

#[tokio::test(start_paused = true)]
async fn debounce_slot_is_shared_across_scenes() {
    let (store, backend, ws) = setup();
    let a = store.create_scene(ws, None, None).await.unwrap();
    let b = store.create_scene(ws, None, None).await.unwrap();

    store.save_scene_data(a.id, SceneData { canvas_data: Some(canvas(1)), widgets: None });
    store.save_scene_data(b.id, SceneData { canvas_data: Some(canvas(2)), widgets: None });
    tokio::time::sleep(Duration::from_millis(1100)).await;
    settle().await;

    let writes = backend.scene_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].scene_id, b.id);
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_pending_canvas_write() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();
    store.save_scene_data(scene.id, SceneData { canvas_data: Some(canvas(1)), widgets: None });
    store.reset();

    tokio::time::sleep(Duration::from_millis(2000)).await;
    settle().await;
    assert!(backend.scene_writes().is_empty());
    assert!(store.scenes().is_empty());
    assert!(!store.is_saving());
}

#[tokio::test(start_paused = true)]
async fn reset_does_not_abort_write_in_flight() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();
    backend.set_latency(Duration::from_millis(500));

    store.save_scene_data(scene.id, SceneData { canvas_data: Some(canvas(3)), widgets: None });
    tokio::time::sleep(Duration::from_millis(1100)).await;
    store.reset();
    tokio::time::sleep(Duration::from_millis(600)).await;
    settle().await;

    assert_eq!(backend.scene(scene.id).unwrap().canvas_data, Some(canvas(3)));
}

#[tokio::test(start_paused = true)]
async fn widget_burst_writes_only_newest_list() {
    let (store, backend, ws) = setup();
    let scene = store.create_scene(ws, None, None).await.unwrap();
    backend.set_latency(Duration::from_millis(50));

    let mut widgets = Vec::new();
    for i in 0..3 {
        widgets.push(Widget::new(format!("w{i}"), f64::from(i), 0.0));
        store.save_scene_data(scene.id, SceneData { canvas_data: None, widgets: Some(widgets.clone()) });
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(widget_writes(&backend), 1);
    assert_eq!(backend.scene(scene.id).unwrap().widgets, widgets);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn widget_writes_land_in_order_across_threads() {
    for _ in 0..100 {
        let (store, backend, ws) = setup();
        let scene = store.create_scene(ws, None, None).await.unwrap();

        let mut widgets = Vec::new();
        for i in 0..5 {
            widgets.push(Widget::new(format!("w{i}"), f64::from(i), 0.0));
            store.save_scene_data(scene.id, SceneData { canvas_data: None, widgets: Some(widgets.clone()) });
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while backend.scene(scene.id).unwrap().widgets.len() < widgets.len() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        // Anything still queued is older and must not overwrite the final list.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.scene(scene.id).unwrap().widgets, widgets);
        assert!(!store.is_unsynced(scene.id));
    }
}
