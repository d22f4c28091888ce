mod common;

use anyhow::Result;
use chrono::NaiveDate;
use common::{ALICE, BOB, memory_service, register, test_service};
use moneta::application::{AppError, LedgerService, NewGoal};
use moneta::domain::{GoalStatus, ProgressType, reconcile_progress};
use uuid::Uuid;

async fn contributions_complete_goal(service: &LedgerService) -> Result<()> {
    register(service, ALICE).await?;
    let goal = service
        .create_goal(ALICE, NewGoal::new("Vacation", 100000))
        .await?;
    assert_eq!(goal.status, GoalStatus::Active);
    assert_eq!(goal.current_cents, 0);
    assert_eq!(goal.currency, "RUB");

    let receipt = service.contribute_to_goal(ALICE, goal.id, 60000, None).await?;
    assert_eq!(receipt.goal.current_cents, 60000);
    assert_eq!(receipt.goal.status, GoalStatus::Active);
    assert!((receipt.progress_percentage - 60.0).abs() < 1e-9);

    let receipt = service
        .contribute_to_goal(ALICE, goal.id, 40000, Some("bonus".into()))
        .await?;
    assert_eq!(receipt.goal.current_cents, 100000);
    assert_eq!(receipt.goal.status, GoalStatus::Completed);
    assert!(receipt.goal.completed_at.is_some());
    assert_eq!(receipt.progress.description.as_deref(), Some("bonus"));

    let stored = service.goal(ALICE, goal.id).await?;
    assert_eq!(stored.status, GoalStatus::Completed);
    assert_eq!(stored.current_cents, 100000);
    Ok(())
}

#[tokio::test]
async fn test_contributions_complete_goal_sqlite() -> Result<()> {
    let (service, _temp) = test_service().await?;
    contributions_complete_goal(&service).await
}

#[tokio::test]
async fn test_contributions_complete_goal_memory() -> Result<()> {
    contributions_complete_goal(&memory_service()).await
}

#[tokio::test]
async fn test_progress_is_clamped() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, ALICE).await?;
    let goal = service.create_goal(ALICE, NewGoal::new("Bike", 50000)).await?;

    service.contribute_to_goal(ALICE, goal.id, 10000, None).await?;

    let receipt = service.withdraw_from_goal(ALICE, goal.id, 25000, None).await?;
    assert_eq!(receipt.goal.current_cents, 0);
    assert_eq!(receipt.progress.amount_cents, 25000);
    assert_eq!(receipt.progress.applied_cents, -10000);

    let receipt = service.contribute_to_goal(ALICE, goal.id, 80000, None).await?;
    assert_eq!(receipt.goal.current_cents, 50000);
    assert_eq!(receipt.progress.applied_cents, 50000);
    assert_eq!(receipt.goal.status, GoalStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_completed_goal_stays_completed() -> Result<()> {
    let service = memory_service();
    register(&service, ALICE).await?;
    let goal = service.create_goal(ALICE, NewGoal::new("Phone", 10000)).await?;

    service.contribute_to_goal(ALICE, goal.id, 9000, None).await?;
    let receipt = service.contribute_to_goal(ALICE, goal.id, 1000, None).await?;
    assert_eq!(receipt.goal.status, GoalStatus::Completed);
    let completed_at = receipt.goal.completed_at;
    assert!(completed_at.is_some());

    let receipt = service.withdraw_from_goal(ALICE, goal.id, 500, None).await?;
    assert_eq!(receipt.goal.current_cents, 9500);
    assert_eq!(receipt.goal.status, GoalStatus::Completed);
    assert_eq!(receipt.goal.completed_at, completed_at);

    // Topping it up again does not restamp completion
    let receipt = service.contribute_to_goal(ALICE, goal.id, 500, None).await?;
    assert_eq!(receipt.goal.completed_at, completed_at);

    let result = service.set_goal_status(ALICE, goal.id, GoalStatus::Active).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    Ok(())
}

async fn history_reconciles(service: &LedgerService) -> Result<()> {
    register(service, ALICE).await?;
    let goal = service.create_goal(ALICE, NewGoal::new("Car", 300000)).await?;

    service.contribute_to_goal(ALICE, goal.id, 120000, None).await?;
    service.withdraw_from_goal(ALICE, goal.id, 20000, None).await?;
    service
        .add_goal_progress(ALICE, goal.id, ProgressType::Adjustment, 500, Some("note".into()))
        .await?;
    service.withdraw_from_goal(ALICE, goal.id, 999999, None).await?;
    service.contribute_to_goal(ALICE, goal.id, 50000, None).await?;

    let history = service.goal_history(ALICE, goal.id).await?;
    let kinds: Vec<ProgressType> = history.iter().map(|p| p.progress_type).collect();
    assert_eq!(
        kinds,
        vec![
            ProgressType::Contribution,
            ProgressType::Withdrawal,
            ProgressType::Adjustment,
            ProgressType::Withdrawal,
            ProgressType::Contribution,
        ]
    );
    assert_eq!(history[2].applied_cents, 0);

    let goal = service.goal(ALICE, goal.id).await?;
    assert_eq!(goal.current_cents, 50000);
    assert_eq!(reconcile_progress(&history), goal.current_cents);
    Ok(())
}

#[tokio::test]
async fn test_history_reconciles_sqlite() -> Result<()> {
    let (service, _temp) = test_service().await?;
    history_reconciles(&service).await
}

#[tokio::test]
async fn test_history_reconciles_memory() -> Result<()> {
    history_reconciles(&memory_service()).await
}

#[tokio::test]
async fn test_status_transitions() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, ALICE).await?;
    let goal = service.create_goal(ALICE, NewGoal::new("House", 9000000)).await?;

    let paused = service.set_goal_status(ALICE, goal.id, GoalStatus::Paused).await?;
    assert_eq!(paused.status, GoalStatus::Paused);

    // Paused goals still accept money
    let receipt = service.contribute_to_goal(ALICE, goal.id, 1000, None).await?;
    assert_eq!(receipt.goal.status, GoalStatus::Paused);

    let same = service.set_goal_status(ALICE, goal.id, GoalStatus::Paused).await?;
    assert_eq!(same.version, receipt.goal.version);

    let result = service.set_goal_status(ALICE, goal.id, GoalStatus::Completed).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    service.set_goal_status(ALICE, goal.id, GoalStatus::Active).await?;
    let cancelled = service.set_goal_status(ALICE, goal.id, GoalStatus::Cancelled).await?;
    assert_eq!(cancelled.status, GoalStatus::Cancelled);

    let result = service.contribute_to_goal(ALICE, goal.id, 1000, None).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    let result = service.set_goal_status(ALICE, goal.id, GoalStatus::Active).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let goal = service.goal(ALICE, goal.id).await?;
    assert_eq!(goal.current_cents, 1000);
    assert_eq!(service.goal_history(ALICE, goal.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_goal_listing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, ALICE).await?;

    let open_ended = service.create_goal(ALICE, NewGoal::new("Someday", 1000)).await?;
    let later = service
        .create_goal(
            ALICE,
            NewGoal::new("Later", 1000).with_target_date(NaiveDate::from_ymd_opt(2031, 6, 1).unwrap()),
        )
        .await?;
    let sooner = service
        .create_goal(
            ALICE,
            NewGoal::new("Sooner", 1000).with_target_date(NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()),
        )
        .await?;
    let done = service.create_goal(ALICE, NewGoal::new("Done", 100)).await?;
    service.contribute_to_goal(ALICE, done.id, 100, None).await?;

    let active = service.active_goals(ALICE).await?;
    let ids: Vec<Uuid> = active.iter().map(|g| g.id).collect();
    assert_eq!(ids, vec![sooner.id, later.id, open_ended.id]);

    let completed = service.goals(ALICE, &[GoalStatus::Completed]).await?;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, done.id);

    assert_eq!(service.goals(ALICE, &[]).await?.len(), 4);
    let some = service
        .goals(ALICE, &[GoalStatus::Completed, GoalStatus::Active])
        .await?;
    assert_eq!(some.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_goal_validation() -> Result<()> {
    let service = memory_service();
    register(&service, ALICE).await?;

    let result = service.create_goal(ALICE, NewGoal::new("   ", 1000)).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    let result = service.create_goal(ALICE, NewGoal::new("Trip", 0)).await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));

    let goal = service
        .create_goal(ALICE, NewGoal::new("  Trip  ", 1000).with_description("  "))
        .await?;
    assert_eq!(goal.title, "Trip");
    assert_eq!(goal.description, None);

    let result = service.contribute_to_goal(ALICE, goal.id, 0, None).await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));
    Ok(())
}

#[tokio::test]
async fn test_goals_are_private() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, ALICE).await?;
    register(&service, BOB).await?;
    let goal = service.create_goal(ALICE, NewGoal::new("Secret", 1000)).await?;

    let result = service.contribute_to_goal(BOB, goal.id, 100, None).await;
    assert!(matches!(result, Err(AppError::GoalNotFound(_))));
    let result = service.goal_history(BOB, goal.id).await;
    assert!(matches!(result, Err(AppError::GoalNotFound(_))));
    assert!(service.goals(BOB, &[]).await?.is_empty());

    let result = service.goal(ALICE, Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::GoalNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_goal_progress_leaves_balance_alone() -> Result<()> {
    let service = memory_service();
    register(&service, ALICE).await?;
    service.record_income(ALICE, 5000, "salary", None).await?;
    let goal = service.create_goal(ALICE, NewGoal::new("Gift", 3000)).await?;

    service.contribute_to_goal(ALICE, goal.id, 2000, None).await?;

    let balance = service.balance(ALICE).await?;
    assert_eq!(balance.balance, 5000);
    assert_eq!(balance.transaction_count, 1);
    Ok(())
}
