use std::time::Duration;

use super::*;
use crate::db::MemoryBackend;
use crate::model::Workspace;
use crate::state::test_helpers::{TestApp, test_app};
use serde_json::json;

async fn owner_board(app: &TestApp, tier: Tier) -> (Whiteboard, Uuid) {
    let workspace_id = Uuid::new_v4();
    app.backend.seed_workspace(Workspace {
        id: workspace_id,
        owner_id: Uuid::new_v4(),
        name: "W".into(),
        created_at: 1,
        updated_at: 1,
    });
    let scene = app.state.scenes.create_scene(workspace_id, None, None).await.unwrap();
    (Whiteboard::open(&app.state, SessionMode::Owner { scene_id: scene.id }, tier), scene.id)
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
// source selection
// =============================================================================

#[tokio::test]
async fn anonymous_board_creates_local_scene_once() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    assert_eq!(board.source(), SceneSource::Local);
    let first = app.state.local.scene().unwrap().id;

    let again = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    assert_eq!(app.state.local.scene().unwrap().id, first);
    assert!(matches!(again.scene(), Some(OwnedScene::Local(s)) if s.id == first));
}

#[tokio::test]
async fn owner_board_reads_remote_scene_only() {
    let app = test_app();
    app.state.local.create_scene(Some("Local"));
    let (board, scene_id) = owner_board(&app, Tier::Free).await;
    assert_eq!(board.source(), SceneSource::Remote);
    assert!(matches!(board.scene(), Some(OwnedScene::Remote(s)) if s.id == scene_id));
    assert!(!board.is_read_only());
}

#[tokio::test]
async fn shared_board_is_read_only_for_every_mutation() {
    let app = test_app();
    let (_, scene_id) = owner_board(&app, Tier::Free).await;
    let scene = app.state.scenes.scene(scene_id).unwrap();

    for permission in [SharePermission::View, SharePermission::Edit] {
        let board = Whiteboard::open(
            &app.state,
            SessionMode::SharedViewer { scene: scene.clone(), permission },
            Tier::Premium,
        );
        assert_eq!(board.source(), SceneSource::Shared);
        assert!(board.is_read_only());
        assert!(!board.can_add_widget());
        assert!(matches!(board.add_widget(0.0, 0.0), Err(AppError::ReadOnly)));
        assert!(matches!(board.update_widget("w", &WidgetPatch::position(1.0, 1.0)), Err(AppError::ReadOnly)));
        assert!(matches!(board.remove_widget("w"), Err(AppError::ReadOnly)));
        assert!(matches!(board.on_canvas_change(json!([]), &json!({})), Err(AppError::ReadOnly)));
        assert!(matches!(board.rename("x").await, Err(AppError::ReadOnly)));
    }
    assert!(app.backend.scene_writes().is_empty());
    assert!(!app.state.local.has_scene());
}

// =============================================================================
// drawing changes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn canvas_changes_reach_local_store_after_quiet_period() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);

    for i in 0..5 {
        board
            .on_canvas_change(json!([{ "id": i }]), &json!({ "zoom": { "value": 1 }, "selectedElementIds": {} }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(app.state.local.scene().unwrap().canvas_data.is_none());

    tokio::time::sleep(Duration::from_millis(500)).await;
    settle().await;
    let canvas = app.state.local.scene().unwrap().canvas_data.unwrap();
    assert_eq!(canvas.elements().unwrap(), &vec![json!({ "id": 4 })]);
    let view = canvas.view_state().unwrap();
    assert!(view.contains_key("zoom"));
    assert!(!view.contains_key("selectedElementIds"));
}

#[tokio::test(start_paused = true)]
async fn canvas_changes_pass_through_both_debounce_stages() {
    let app = test_app();
    let (board, scene_id) = owner_board(&app, Tier::Free).await;

    board.on_canvas_change(json!([{ "id": "a" }]), &json!({})).unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    settle().await;
    assert!(app.state.scenes.scene(scene_id).unwrap().canvas_data.is_some());
    assert!(app.state.scenes.is_saving());
    assert!(app.backend.scene_writes().is_empty());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    settle().await;
    assert_eq!(app.backend.scene_writes().len(), 1);
    assert!(!app.state.scenes.is_saving());
}

#[tokio::test(start_paused = true)]
async fn dispose_drops_pending_change() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    board.on_canvas_change(json!([]), &json!({})).unwrap();
    board.dispose();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    settle().await;
    assert!(app.state.local.scene().unwrap().canvas_data.is_none());
}

// =============================================================================
// widgets
// =============================================================================

#[tokio::test]
async fn free_tier_fourth_widget_is_refused() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    for _ in 0..3 {
        assert!(board.add_widget(0.0, 0.0).unwrap().is_some());
    }
    assert!(!board.can_add_widget());
    assert_eq!(board.add_widget(0.0, 0.0).unwrap(), None);
    assert_eq!(board.widgets().len(), 3);
}

#[tokio::test]
async fn premium_tier_may_exceed_free_quota() {
    let app = test_app();
    let (board, scene_id) = owner_board(&app, Tier::Free).await;
    for _ in 0..3 {
        board.add_widget(0.0, 0.0).unwrap().unwrap();
    }
    assert_eq!(board.add_widget(0.0, 0.0).unwrap(), None);

    board.set_tier(Tier::Premium);
    assert!(board.add_widget(0.0, 0.0).unwrap().is_some());
    assert_eq!(app.state.scenes.scene(scene_id).unwrap().widgets.len(), 4);
}

#[tokio::test]
async fn remote_widget_add_is_written_immediately() {
    let app = test_app();
    let (board, scene_id) = owner_board(&app, Tier::Free).await;
    let id = board.add_widget(100.0, 100.0).unwrap().unwrap();
    settle().await;

    assert_eq!(widget_writes(&app.backend), 1);
    let stored = app.backend.scene(scene_id).unwrap();
    assert_eq!(stored.widgets[0].id, id);
}

#[tokio::test]
async fn add_widget_at_center_uses_viewport() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    board.set_viewport(Viewport { width: 1000.0, height: 600.0 });
    board.add_widget_at_center().unwrap().unwrap();
    let widget = board.widgets()[0].clone();
    assert!((widget.x - 300.0).abs() < f64::EPSILON);
    assert!((widget.y - 150.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn resize_is_clamped_for_any_input() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    board.set_viewport(Viewport { width: 900.0, height: 700.0 });
    let id = board.add_widget(0.0, 0.0).unwrap().unwrap();

    let inputs = [
        (-500.0, -1.0),
        (0.0, 0.0),
        (10.0, 20.0),
        (f64::NAN, f64::NAN),
        (f64::NEG_INFINITY, f64::INFINITY),
        (1e12, 1e12),
        (600.0, 400.0),
    ];
    for (w, h) in inputs {
        board.update_widget(&id, &WidgetPatch::size(w, h)).unwrap();
        let widget = board.widgets()[0].clone();
        assert!(widget.width >= 250.0 && widget.width <= 900.0, "width {} from {w}", widget.width);
        assert!(widget.height >= 150.0 && widget.height <= 700.0, "height {} from {h}", widget.height);
    }
    let widget = board.widgets()[0].clone();
    assert!((widget.width - 600.0).abs() < f64::EPSILON);
    assert!((widget.height - 400.0).abs() < f64::EPSILON);
}

#[test]
fn tiny_viewport_still_allows_minimum() {
    assert!((clamp_dimension(100.0, 250.0, 200.0) - 250.0).abs() < f64::EPSILON);
    assert!((clamp_dimension(f64::NAN, 150.0, 700.0) - 150.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn remote_resize_is_clamped_before_write() {
    let app = test_app();
    let (board, scene_id) = owner_board(&app, Tier::Free).await;
    let id = board.add_widget(0.0, 0.0).unwrap().unwrap();
    board.update_widget(&id, &WidgetPatch::size(1.0, 1.0)).unwrap();
    settle().await;

    let stored = app.backend.scene(scene_id).unwrap();
    assert!((stored.widgets[0].width - 250.0).abs() < f64::EPSILON);
    assert!((stored.widgets[0].height - 150.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn bindings_are_stable_per_widget() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    let a = board.add_widget(0.0, 0.0).unwrap().unwrap();
    let b = board.add_widget(10.0, 10.0).unwrap().unwrap();

    let first = board.binding(&a);
    board.binding(&a).update(&WidgetPatch::position(5.0, 5.0)).unwrap();
    assert!(Arc::ptr_eq(&first, &board.binding(&a)));
    assert!(!Arc::ptr_eq(&first, &board.binding(&b)));
    assert_eq!(first.widget_id(), a);

    first.update(&WidgetPatch::position(42.0, 43.0)).unwrap();
    assert!((board.widgets()[0].x - 42.0).abs() < f64::EPSILON);

    first.remove().unwrap();
    assert_eq!(board.widgets().len(), 1);
    assert!(!Arc::ptr_eq(&first, &board.binding(&a)));
}

#[tokio::test]
async fn binding_outliving_board_is_inert() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    let id = board.add_widget(0.0, 0.0).unwrap().unwrap();
    let binding = board.binding(&id);
    drop(board);
    binding.remove().unwrap();
    assert_eq!(app.state.local.scene().unwrap().widgets.len(), 1);
}

#[tokio::test]
async fn owner_board_without_fetched_scene_reports_not_found() {
    let app = test_app();
    let board = Whiteboard::open(&app.state, SessionMode::Owner { scene_id: Uuid::new_v4() }, Tier::Free);
    assert!(board.scene().is_none());
    assert!(board.add_widget(0.0, 0.0).unwrap_err().is_not_found());
}

// =============================================================================
// rename
// =============================================================================

#[tokio::test]
async fn rename_routes_to_active_store() {
    let app = test_app();
    let local = Whiteboard::open(&app.state, SessionMode::Anonymous, Tier::Free);
    assert!(local.rename("  Sketch ").await.unwrap());
    assert_eq!(app.state.local.scene().unwrap().name, "Sketch");

    let (remote, scene_id) = owner_board(&app, Tier::Free).await;
    assert!(remote.rename("Plan").await.unwrap());
    assert_eq!(app.backend.scene(scene_id).unwrap().name, "Plan");
    assert!(matches!(remote.rename("   ").await, Err(AppError::Validation { .. })));
}
