mod common;

use anyhow::Result;
use common::{ALICE, BOB, memory_service, parse_datetime, register, test_service};
use moneta::application::{LedgerService, NewTransaction};
use moneta::domain::Frequency;

async fn catch_up(service: &LedgerService) -> Result<()> {
    register(service, ALICE).await?;
    let template = service
        .create_transaction(
            ALICE,
            NewTransaction::income(100000, "Salary")
                .with_description("monthly pay")
                .with_occurred_at(parse_datetime("2024-01-15 09:00:00"))
                .with_frequency(Frequency::Monthly),
        )
        .await?;
    let recurrence = template.transaction.recurrence.expect("recurring");
    assert_eq!(recurrence.next_occurrence, parse_datetime("2024-02-15 09:00:00"));

    // Nothing due yet
    let run = service
        .materialize_due_recurring(parse_datetime("2024-02-15 08:59:59"))
        .await?;
    assert!(run.materialized.is_empty());

    let run = service
        .materialize_due_recurring(parse_datetime("2024-04-20 00:00:00"))
        .await?;
    assert!(run.failures.is_empty());
    let dates: Vec<_> = run.materialized.iter().map(|t| t.occurred_at).collect();
    assert_eq!(
        dates,
        vec![
            parse_datetime("2024-02-15 09:00:00"),
            parse_datetime("2024-03-15 09:00:00"),
            parse_datetime("2024-04-15 09:00:00"),
        ]
    );
    for occurrence in &run.materialized {
        assert_eq!(occurrence.parent_id, Some(template.transaction_id));
        assert_eq!(occurrence.amount_cents, 100000);
        assert_eq!(occurrence.description.as_deref(), Some("monthly pay"));
        assert!(!occurrence.is_recurring());
    }

    let stored = service.transaction(ALICE, template.transaction_id).await?;
    assert_eq!(
        stored.recurrence.map(|r| r.next_occurrence),
        Some(parse_datetime("2024-05-15 09:00:00"))
    );

    let account = service.account(ALICE).await?;
    assert_eq!(account.balance, 400000);
    assert_eq!(account.transaction_count, 4);

    // Running again for the same instant records nothing new
    let again = service
        .materialize_due_recurring(parse_datetime("2024-04-20 00:00:00"))
        .await?;
    assert!(again.materialized.is_empty());
    assert_eq!(service.account(ALICE).await?.transaction_count, 4);
    Ok(())
}

#[tokio::test]
async fn test_catch_up_sqlite() -> Result<()> {
    let (service, _temp) = test_service().await?;
    catch_up(&service).await
}

#[tokio::test]
async fn test_catch_up_memory() -> Result<()> {
    catch_up(&memory_service()).await
}

async fn failed_occurrence_stays_due(service: &LedgerService) -> Result<()> {
    register(service, ALICE).await?;
    service.record_income(ALICE, 1000, "Gift", None).await?;
    let template = service
        .create_transaction(
            ALICE,
            NewTransaction::expense(600, "Phone")
                .with_occurred_at(parse_datetime("2024-03-01 00:00:00"))
                .with_frequency(Frequency::Weekly),
        )
        .await?;
    assert_eq!(template.new_balance, 400);

    let run = service
        .materialize_due_recurring(parse_datetime("2024-03-20 00:00:00"))
        .await?;
    assert!(run.materialized.is_empty());
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].template_id, template.transaction_id);
    assert_eq!(run.failures[0].due_at, parse_datetime("2024-03-08 00:00:00"));

    let stored = service.transaction(ALICE, template.transaction_id).await?;
    assert_eq!(
        stored.recurrence.map(|r| r.next_occurrence),
        Some(parse_datetime("2024-03-08 00:00:00"))
    );
    assert_eq!(service.balance(ALICE).await?.balance, 400);

    service.record_income(ALICE, 2000, "Salary", None).await?;
    let run = service
        .materialize_due_recurring(parse_datetime("2024-03-20 00:00:00"))
        .await?;
    assert!(run.failures.is_empty());
    assert_eq!(run.materialized.len(), 2);
    assert_eq!(service.balance(ALICE).await?.balance, 1200);
    Ok(())
}

#[tokio::test]
async fn test_failed_occurrence_stays_due_sqlite() -> Result<()> {
    let (service, _temp) = test_service().await?;
    failed_occurrence_stays_due(&service).await
}

#[tokio::test]
async fn test_failed_occurrence_stays_due_memory() -> Result<()> {
    failed_occurrence_stays_due(&memory_service()).await
}

#[tokio::test]
async fn test_one_failure_does_not_block_other_templates() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, ALICE).await?;
    register(&service, BOB).await?;

    service
        .create_transaction(
            ALICE,
            NewTransaction::income(500, "Interest")
                .with_occurred_at(parse_datetime("2024-06-01 00:00:00"))
                .with_frequency(Frequency::Daily),
        )
        .await?;
    service.record_income(BOB, 100, "Gift", None).await?;
    service
        .create_transaction(
            BOB,
            NewTransaction::expense(100, "Phone")
                .with_occurred_at(parse_datetime("2024-06-01 00:00:00"))
                .with_frequency(Frequency::Daily),
        )
        .await?;

    let run = service
        .materialize_due_recurring(parse_datetime("2024-06-04 00:00:00"))
        .await?;

    assert_eq!(run.materialized.len(), 3);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(service.balance(ALICE).await?.balance, 2000);
    assert_eq!(service.balance(BOB).await?.balance, 0);
    Ok(())
}

#[tokio::test]
async fn test_deleted_template_stops_repeating() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, ALICE).await?;

    let template = service
        .create_transaction(
            ALICE,
            NewTransaction::income(100, "Interest")
                .with_occurred_at(parse_datetime("2024-01-01 00:00:00"))
                .with_frequency(Frequency::Yearly),
        )
        .await?;
    service.delete_transaction(ALICE, template.transaction_id).await?;

    let run = service
        .materialize_due_recurring(parse_datetime("2026-06-01 00:00:00"))
        .await?;
    assert!(run.materialized.is_empty());
    assert!(run.failures.is_empty());

    service.restore_transaction(ALICE, template.transaction_id).await?;
    let run = service
        .materialize_due_recurring(parse_datetime("2026-06-01 00:00:00"))
        .await?;
    assert_eq!(run.materialized.len(), 2);
    Ok(())
}
