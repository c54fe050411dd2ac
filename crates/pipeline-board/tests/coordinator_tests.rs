use pipeline_board::{
    Board, BoardError, DragResult, DropLocation, InMemoryProspectService, MoveCoordinator,
    MoveKind, MoveOperation, MoveState, Prospect, ProspectFilter, ProspectId, Rollback,
    ServiceError, StageKey,
};
use pipeline_test_utils::{
    assert_partition, bucket_ids, prospect, store_with, GatedProspectService, MockProspectService,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn two_leads() -> Vec<Prospect> {
    vec![prospect("A-id", "New Lead"), prospect("B-id", "New Lead")]
}

#[tokio::test]
async fn cross_column_success_calls_service_once_with_title() {
    let store = store_with(two_leads());
    let mut service = MockProspectService::new();
    service
        .expect_update_prospect_stage()
        .withf(|id, title| id.as_str() == "A-id" && title == "Qualified")
        .times(1)
        .returning(|id, title| Ok(Prospect::new(id.clone(), title)));
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let outcome = coordinator
        .execute(MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::Qualified, 0)))
        .await
        .unwrap();

    assert_eq!(outcome.state, MoveState::Confirmed);
    assert_eq!(outcome.kind, MoveKind::CrossColumn);
    let board = store.board();
    assert_eq!(bucket_ids(&board, StageKey::NewLead), vec!["B-id"]);
    assert_eq!(bucket_ids(&board, StageKey::Qualified), vec!["A-id"]);
}

#[tokio::test]
async fn cross_column_failure_restores_prior_board() {
    let store = store_with(two_leads());
    let prior = store.board();
    let mut service = MockProspectService::new();
    service
        .expect_update_prospect_stage()
        .times(1)
        .returning(|_, _| Err(ServiceError::transport("connection reset")));
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let err = coordinator
        .execute(MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::Qualified, 0)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BoardError::PersistenceFailure {
            stage: StageKey::Qualified,
            rollback: Rollback::Restored { .. },
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(!err.requires_reload());
    assert_eq!(store.board(), prior);
}

#[tokio::test]
async fn reorder_never_calls_service() {
    let store = store_with(vec![
        prospect("A", "Proposal"),
        prospect("B", "Proposal"),
        prospect("C", "Proposal"),
    ]);
    let mut service = MockProspectService::new();
    service.expect_update_prospect_stage().times(0);
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let outcome = coordinator
        .execute(MoveOperation::new("C", (StageKey::Proposal, 2), (StageKey::Proposal, 0)))
        .await
        .unwrap();

    assert_eq!(outcome.kind, MoveKind::Reorder);
    assert_eq!(bucket_ids(&store.board(), StageKey::Proposal), vec!["C", "A", "B"]);
}

#[tokio::test]
async fn noop_changes_nothing() {
    let store = store_with(two_leads());
    let before = store.snapshot();
    let mut service = MockProspectService::new();
    service.expect_update_prospect_stage().times(0);
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let outcome = coordinator
        .execute(MoveOperation::new("B-id", (StageKey::NewLead, 1), (StageKey::NewLead, 1)))
        .await
        .unwrap();

    assert_eq!(outcome.kind, MoveKind::NoOp);
    assert_eq!(outcome.state, MoveState::Idle);
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn drop_outside_columns_is_ignored() {
    let store = store_with(two_leads());
    let before = store.snapshot();
    let mut service = MockProspectService::new();
    service.expect_update_prospect_stage().times(0);
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let outcome = coordinator
        .on_drag_end(DragResult {
            prospect_id: ProspectId::new("A-id"),
            source: DropLocation {
                stage: StageKey::NewLead,
                index: 0,
            },
            destination: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.kind, MoveKind::NoOp);
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn optimistic_board_is_visible_while_persist_is_pending() {
    let store = store_with(two_leads());
    let (service, mut queue) = GatedProspectService::new(two_leads());
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));
    let mut rx = store.subscribe();

    let pending = coordinator
        .begin(MoveOperation::new("B-id", (StageKey::NewLead, 1), (StageKey::Lost, 0)))
        .unwrap();
    let task = tokio::spawn(pending.settle());
    let update = queue.next().await;

    assert!(rx.has_changed().unwrap());
    assert_eq!(bucket_ids(&rx.borrow_and_update().board, StageKey::Lost), vec!["B-id"]);
    assert_eq!(update.id.as_str(), "B-id");
    assert_eq!(update.title, "Lost");

    update.succeed();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.state, MoveState::Confirmed);
    assert_eq!(bucket_ids(&store.board(), StageKey::Lost), vec!["B-id"]);
}

#[tokio::test]
async fn late_failure_does_not_undo_a_later_move() {
    let store = store_with(two_leads());
    let (service, mut queue) = GatedProspectService::new(two_leads());
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let move_a = coordinator
        .begin(MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::Qualified, 0)))
        .unwrap();
    let task_a = tokio::spawn(move_a.settle());
    let update_a = queue.next().await;

    // B is now at index 0 of new-lead.
    let move_b = coordinator
        .begin(MoveOperation::new("B-id", (StageKey::NewLead, 0), (StageKey::Proposal, 0)))
        .unwrap();
    let task_b = tokio::spawn(move_b.settle());
    queue.next().await.succeed();
    assert_eq!(task_b.await.unwrap().unwrap().state, MoveState::Confirmed);

    update_a.fail("gateway timeout");
    let err = task_a.await.unwrap().unwrap_err();

    assert!(matches!(err.rollback(), Some(Rollback::Superseded { .. })));
    assert!(err.requires_reload());
    let board = store.board();
    assert_eq!(bucket_ids(&board, StageKey::Proposal), vec!["B-id"]);
    assert_eq!(bucket_ids(&board, StageKey::Qualified), vec!["A-id"]);
    assert_partition(&board, &two_leads());
}

#[tokio::test]
async fn late_success_after_close_is_abandoned() {
    let store = store_with(two_leads());
    let (service, mut queue) = GatedProspectService::new(two_leads());
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let pending = coordinator
        .begin(MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::Contacted, 0)))
        .unwrap();
    let task = tokio::spawn(pending.settle());
    let update = queue.next().await;
    let at_close = store.snapshot();
    store.close();

    update.succeed();
    let outcome = task.await.unwrap().unwrap();

    assert_eq!(outcome.state, MoveState::Abandoned);
    assert_eq!(store.snapshot(), at_close);
}

#[tokio::test]
async fn late_failure_after_close_leaves_board_alone() {
    let store = store_with(two_leads());
    let (service, mut queue) = GatedProspectService::new(two_leads());
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let pending = coordinator
        .begin(MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::Contacted, 0)))
        .unwrap();
    let task = tokio::spawn(pending.settle());
    let update = queue.next().await;
    let at_close = store.snapshot();
    store.close();

    update.fail("connection reset");
    let err = task.await.unwrap().unwrap_err();

    assert_eq!(err.rollback(), Some(Rollback::Abandoned));
    assert_eq!(store.snapshot(), at_close);
}

#[tokio::test]
async fn reload_discards_local_order() {
    let prospects = vec![
        prospect("A", "Negotiation"),
        prospect("B", "Negotiation"),
    ];
    let service = Arc::new(InMemoryProspectService::new(prospects.clone()));
    let store = store_with(prospects);
    let coordinator = MoveCoordinator::new(store.clone(), service.clone());

    coordinator
        .execute(MoveOperation::new("B", (StageKey::Negotiation, 1), (StageKey::Negotiation, 0)))
        .await
        .unwrap();
    assert_eq!(bucket_ids(&store.board(), StageKey::Negotiation), vec!["B", "A"]);

    coordinator.load(&ProspectFilter::all()).await.unwrap();

    assert_eq!(bucket_ids(&store.board(), StageKey::Negotiation), vec!["A", "B"]);
    assert!(service.update_calls().is_empty());
}

#[tokio::test]
async fn confirmed_move_survives_reload() {
    let service = Arc::new(InMemoryProspectService::new(two_leads()));
    let store = store_with(two_leads());
    let coordinator = MoveCoordinator::new(store.clone(), service.clone());

    coordinator
        .execute(MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::WonSold, 0)))
        .await
        .unwrap();
    coordinator.load(&ProspectFilter::all()).await.unwrap();

    assert_eq!(bucket_ids(&store.board(), StageKey::WonSold), vec!["A-id"]);
    assert_eq!(
        service.update_calls(),
        vec![(ProspectId::new("A-id"), "Won/Sold".to_string())]
    );
}

#[tokio::test]
async fn failed_move_then_retry_succeeds() {
    let service = Arc::new(InMemoryProspectService::new(two_leads()));
    let store = store_with(two_leads());
    let prior = store.board();
    let coordinator = MoveCoordinator::new(store.clone(), service.clone());
    let op = MoveOperation::new("B-id", (StageKey::NewLead, 1), (StageKey::Inactive, 0));

    service.fail_next_updates(1);
    let err = coordinator.execute(op.clone()).await.unwrap_err();
    assert!(matches!(err.rollback(), Some(Rollback::Restored { .. })));
    assert_eq!(store.board(), prior);

    let outcome = coordinator.execute(op).await.unwrap();
    assert_eq!(outcome.state, MoveState::Confirmed);
    assert_eq!(service.update_calls().len(), 2);
}

#[test]
fn moves_against_an_empty_board_are_stale() {
    let store = store_with(Vec::new());
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(MockProspectService::new()));

    let err = coordinator
        .begin(MoveOperation::new("ghost", (StageKey::Lost, 0), (StageKey::Inactive, 0)))
        .unwrap_err();

    assert!(err.is_internal());
    assert_eq!(store.board(), Board::empty());
}

#[tokio::test]
async fn reload_during_persist_keeps_reloaded_board() {
    let store = store_with(two_leads());
    let (service, mut queue) = GatedProspectService::new(two_leads());
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let pending = coordinator
        .begin(MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::Negotiation, 0)))
        .unwrap();
    let applied = pending.applied_version().unwrap();
    let task = tokio::spawn(pending.settle());
    let update = queue.next().await;

    coordinator.load(&ProspectFilter::all()).await.unwrap();
    let reloaded = store.snapshot();
    assert!(reloaded.version > applied);
    assert_eq!(bucket_ids(&reloaded.board, StageKey::NewLead), vec!["A-id", "B-id"]);

    update.fail("service unavailable");
    let err = task.await.unwrap().unwrap_err();

    assert_eq!(
        err.rollback(),
        Some(Rollback::Superseded {
            applied,
            current: reloaded.version,
        })
    );
    assert!(err.requires_reload());
    assert_eq!(store.snapshot(), reloaded);
}

#[tokio::test]
async fn reorder_sends_nothing_to_the_store() {
    let store = store_with(two_leads());
    let (service, mut queue) = GatedProspectService::new(two_leads());
    let coordinator = MoveCoordinator::new(store.clone(), Arc::new(service));

    let outcome = coordinator
        .execute(MoveOperation::new("B-id", (StageKey::NewLead, 1), (StageKey::NewLead, 0)))
        .await
        .unwrap();

    assert_eq!(outcome.state, MoveState::Confirmed);
    assert!(queue.try_next().is_none());
    assert_eq!(bucket_ids(&store.board(), StageKey::NewLead), vec!["B-id", "A-id"]);
}

#[tokio::test]
async fn reload_picks_up_prospects_added_elsewhere() {
    let service = Arc::new(InMemoryProspectService::new(two_leads()));
    let store = store_with(two_leads());
    let coordinator = MoveCoordinator::new(store.clone(), service.clone());

    service.insert(prospect("C-id", "Contract Sent"));
    assert!(store.board().position_of(&ProspectId::new("C-id")).is_none());

    coordinator.load(&ProspectFilter::all()).await.unwrap();

    assert_eq!(bucket_ids(&store.board(), StageKey::ContractSent), vec!["C-id"]);
    assert_partition(&store.board(), &service.prospects());
}
