mod common;

use anyhow::Result;
use common::{ALICE, memory_service, parse_date, parse_datetime, register, test_service, test_service_with};
use moneta::application::{AppError, LedgerService, NewTransaction};
use moneta::config::LedgerOptions;
use moneta::domain::{DeletionPolicy, TransactionKind};
use moneta::storage::TransactionQuery;
use uuid::Uuid;

async fn seed(service: &LedgerService) -> Result<()> {
    register(service, ALICE).await?;
    let entries = [
        (TransactionKind::Income, 300000, "salary", "2024-01-01 09:00:00"),
        (TransactionKind::Expense, 4500, "food", "2024-01-03 12:00:00"),
        (TransactionKind::Expense, 12000, "transport", "2024-01-10 08:30:00"),
        (TransactionKind::Expense, 5500, "food", "2024-01-15 19:00:00"),
        (TransactionKind::Income, 20000, "freelance", "2024-01-20 10:00:00"),
        (TransactionKind::Expense, 80000, "rent", "2024-02-01 00:00:00"),
    ];
    for (kind, amount, category, at) in entries {
        service
            .create_transaction(
                ALICE,
                NewTransaction::new(kind, amount, category).with_occurred_at(parse_datetime(at)),
            )
            .await?;
    }
    Ok(())
}

async fn history_is_newest_first(service: &LedgerService) -> Result<()> {
    seed(service).await?;

    let recent = service.recent_transactions(ALICE, 3, false).await?;
    let categories: Vec<&str> = recent.iter().map(|t| t.category.as_str()).collect();
    assert_eq!(categories, vec!["rent", "freelance", "food"]);

    let all = service.recent_transactions(ALICE, 100, false).await?;
    assert_eq!(all.len(), 6);
    assert!(all.windows(2).all(|w| w[0].occurred_at >= w[1].occurred_at));
    Ok(())
}

#[tokio::test]
async fn test_history_is_newest_first_sqlite() -> Result<()> {
    let (service, _temp) = test_service().await?;
    history_is_newest_first(&service).await
}

#[tokio::test]
async fn test_history_is_newest_first_memory() -> Result<()> {
    history_is_newest_first(&memory_service()).await
}

#[tokio::test]
async fn test_same_instant_orders_by_creation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, ALICE).await?;
    let at = parse_datetime("2024-03-01 12:00:00");

    for category in ["first", "second", "third"] {
        service
            .create_transaction(ALICE, NewTransaction::income(100, category).with_occurred_at(at))
            .await?;
    }

    let recent = service.recent_transactions(ALICE, 10, false).await?;
    let categories: Vec<&str> = recent.iter().map(|t| t.category.as_str()).collect();
    assert_eq!(categories, vec!["third", "second", "first"]);
    assert!(recent[0].sequence > recent[1].sequence);
    Ok(())
}

async fn range_bounds_are_inclusive(service: &LedgerService) -> Result<()> {
    seed(service).await?;

    let query = TransactionQuery::between(
        parse_datetime("2024-01-03 12:00:00"),
        parse_datetime("2024-01-15 19:00:00"),
    );
    let in_range = service.transactions_in_range(ALICE, &query).await?;
    let amounts: Vec<i64> = in_range.iter().map(|t| t.amount_cents).collect();
    assert_eq!(amounts, vec![5500, 12000, 4500]);

    let food = service
        .transactions_in_range(
            ALICE,
            &TransactionQuery::between(parse_date("2024-01-01"), parse_date("2024-12-31"))
                .with_category("food"),
        )
        .await?;
    assert_eq!(food.len(), 2);

    let income = service
        .transactions_in_range(
            ALICE,
            &TransactionQuery::between(parse_date("2024-01-01"), parse_date("2024-12-31"))
                .with_kind(TransactionKind::Income),
        )
        .await?;
    assert_eq!(income.len(), 2);
    assert!(income.iter().all(|t| t.kind == TransactionKind::Income));
    Ok(())
}

#[tokio::test]
async fn test_range_bounds_are_inclusive_sqlite() -> Result<()> {
    let (service, _temp) = test_service().await?;
    range_bounds_are_inclusive(&service).await
}

#[tokio::test]
async fn test_range_bounds_are_inclusive_memory() -> Result<()> {
    range_bounds_are_inclusive(&memory_service()).await
}

#[tokio::test]
async fn test_inverted_range_is_rejected() -> Result<()> {
    let service = memory_service();
    register(&service, ALICE).await?;

    let query = TransactionQuery::between(parse_date("2024-02-01"), parse_date("2024-01-01"));
    let result = service.transactions_in_range(ALICE, &query).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let result = service
        .period_statistics(ALICE, parse_date("2024-02-01"), parse_date("2024-01-01"), 5)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    // An empty but valid window is fine
    let at = parse_date("2024-01-01");
    assert!(service.transactions_in_range(ALICE, &TransactionQuery::between(at, at)).await?.is_empty());
    Ok(())
}

async fn category_breakdown(service: &LedgerService) -> Result<()> {
    seed(service).await?;

    let totals = service
        .category_breakdown(ALICE, parse_date("2024-01-01"), parse_date("2024-01-31"))
        .await?;

    let summary: Vec<(&str, TransactionKind, i64, i64)> = totals
        .iter()
        .map(|t| (t.category.as_str(), t.kind, t.total, t.count))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("salary", TransactionKind::Income, 300000, 1),
            ("freelance", TransactionKind::Income, 20000, 1),
            ("transport", TransactionKind::Expense, 12000, 1),
            ("food", TransactionKind::Expense, 10000, 2),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_category_breakdown_sqlite() -> Result<()> {
    let (service, _temp) = test_service().await?;
    category_breakdown(&service).await
}

#[tokio::test]
async fn test_category_breakdown_memory() -> Result<()> {
    category_breakdown(&memory_service()).await
}

#[tokio::test]
async fn test_period_statistics() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed(&service).await?;

    let stats = service
        .period_statistics(ALICE, parse_date("2024-01-01"), parse_date("2024-02-28"), 2)
        .await?;

    assert_eq!(stats.total_income, 320000);
    assert_eq!(stats.total_expense, 102000);
    assert_eq!(stats.net, 218000);
    assert_eq!(stats.income_count, 2);
    assert_eq!(stats.expense_count, 4);
    assert_eq!(stats.currency, "RUB");

    assert_eq!(stats.top_expenses.len(), 2);
    assert_eq!(stats.top_expenses[0].category, "rent");
    assert_eq!(stats.top_expenses[0].total, 80000);
    assert_eq!(stats.top_expenses[1].category, "transport");
    let share = stats.top_expenses[0].percentage;
    assert!((share - 80000.0 / 102000.0 * 100.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_deleted_transactions_are_hidden_but_kept() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed(&service).await?;
    let before = service.balance(ALICE).await?;

    let rent = service.recent_transactions(ALICE, 1, false).await?.remove(0);
    let deleted = service.delete_transaction(ALICE, rent.id).await?;
    assert!(deleted.is_deleted());

    let visible = service.recent_transactions(ALICE, 100, false).await?;
    assert_eq!(visible.len(), 5);
    assert!(visible.iter().all(|t| t.id != rent.id));

    let everything = service.recent_transactions(ALICE, 100, true).await?;
    assert_eq!(everything.len(), 6);
    assert!(service.transaction(ALICE, rent.id).await?.is_deleted());

    let stats = service
        .period_statistics(ALICE, parse_date("2024-01-01"), parse_date("2024-02-28"), 5)
        .await?;
    assert_eq!(stats.total_expense, 22000);

    // Retain keeps the balance as it was
    let after = service.balance(ALICE).await?;
    assert_eq!(after.balance, before.balance);
    assert_eq!(after.transaction_count, before.transaction_count);

    // Deleting twice is harmless
    service.delete_transaction(ALICE, rent.id).await?;

    let restored = service.restore_transaction(ALICE, rent.id).await?;
    assert!(!restored.is_deleted());
    assert_eq!(service.recent_transactions(ALICE, 100, false).await?.len(), 6);
    assert_eq!(service.balance(ALICE).await?.balance, before.balance);
    Ok(())
}

async fn reverse_policy(service: &LedgerService) -> Result<()> {
    register(service, ALICE).await?;
    let salary = service.record_income(ALICE, 10000, "salary", None).await?;
    let coffee = service.record_expense(ALICE, 3000, "coffee", None).await?;
    assert_eq!(coffee.new_balance, 7000);

    service.delete_transaction(ALICE, coffee.transaction_id).await?;
    let account = service.account(ALICE).await?;
    assert_eq!(account.balance, 10000);
    assert_eq!(account.total_expenses, 0);
    assert_eq!(account.transaction_count, 1);
    assert!(account.is_consistent());

    // The balance covers the salary exactly
    service.delete_transaction(ALICE, salary.transaction_id).await?;
    let account = service.account(ALICE).await?;
    assert_eq!(account.balance, 0);
    assert_eq!(account.transaction_count, 0);

    // Restoring the expense first would overdraw the account
    let result = service.restore_transaction(ALICE, coffee.transaction_id).await;
    assert!(matches!(result, Err(AppError::InsufficientFunds { .. })));
    assert!(service.transaction(ALICE, coffee.transaction_id).await?.is_deleted());

    service.restore_transaction(ALICE, salary.transaction_id).await?;
    service.restore_transaction(ALICE, coffee.transaction_id).await?;
    let account = service.account(ALICE).await?;
    assert_eq!(account.balance, 7000);
    assert_eq!(account.total_income, 10000);
    assert_eq!(account.total_expenses, 3000);
    assert_eq!(account.transaction_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_reverse_policy_sqlite() -> Result<()> {
    let options = LedgerOptions::default().with_deletion_policy(DeletionPolicy::Reverse);
    let (service, _temp) = test_service_with(options).await?;
    reverse_policy(&service).await
}

#[tokio::test]
async fn test_reverse_policy_memory() -> Result<()> {
    let options = LedgerOptions::default().with_deletion_policy(DeletionPolicy::Reverse);
    reverse_policy(&LedgerService::in_memory(options)).await
}

#[tokio::test]
async fn test_reverse_policy_refuses_to_overdraw() -> Result<()> {
    let options = LedgerOptions::default().with_deletion_policy(DeletionPolicy::Reverse);
    let service = LedgerService::in_memory(options);
    register(&service, ALICE).await?;

    let salary = service.record_income(ALICE, 10000, "salary", None).await?;
    service.record_expense(ALICE, 8000, "rent", None).await?;

    let result = service.delete_transaction(ALICE, salary.transaction_id).await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientFunds { balance: 2000, required: 10000 })
    ));
    assert!(!service.transaction(ALICE, salary.transaction_id).await?.is_deleted());
    assert_eq!(service.balance(ALICE).await?.balance, 2000);
    Ok(())
}

#[tokio::test]
async fn test_unknown_transaction() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, ALICE).await?;

    let missing = Uuid::new_v4();
    let result = service.delete_transaction(ALICE, missing).await;
    assert!(matches!(result, Err(AppError::TransactionNotFound(_))));
    let result = service.transaction(ALICE, missing).await;
    assert!(matches!(result, Err(AppError::TransactionNotFound(_))));
    Ok(())
}

async fn repeated_reads_agree(service: &LedgerService) -> Result<()> {
    register(service, ALICE).await?;
    let entries = [
        (TransactionKind::Income, 20000, "salary", "2024-03-01 08:00:00"),
        (TransactionKind::Income, 3000, "gift", "2024-03-01 12:00:00"),
        (TransactionKind::Income, 3000, "books", "2024-03-01 12:00:00"),
        (TransactionKind::Expense, 3000, "cinema", "2024-03-01 12:00:00"),
        (TransactionKind::Expense, 3000, "books", "2024-03-01 12:00:00"),
        (TransactionKind::Expense, 1000, "apps", "2024-03-01 12:00:00"),
        (TransactionKind::Expense, 2000, "apps", "2024-03-01 12:00:00"),
    ];
    for (kind, amount, category, at) in entries {
        service
            .create_transaction(
                ALICE,
                NewTransaction::new(kind, amount, category).with_occurred_at(parse_datetime(at)),
            )
            .await?;
    }
    let taxi = service
        .create_transaction(
            ALICE,
            NewTransaction::expense(500, "taxi")
                .with_occurred_at(parse_datetime("2024-03-01 12:00:00")),
        )
        .await?;
    service.delete_transaction(ALICE, taxi.transaction_id).await?;

    let (start, end) = (parse_date("2024-03-01"), parse_date("2024-03-02"));
    let breakdown = service.category_breakdown(ALICE, start, end).await?;
    assert_eq!(breakdown, service.category_breakdown(ALICE, start, end).await?);

    // Equal totals fall back to category, then kind
    let order: Vec<(&str, TransactionKind, i64)> = breakdown
        .iter()
        .map(|t| (t.category.as_str(), t.kind, t.total))
        .collect();
    assert_eq!(
        order,
        vec![
            ("salary", TransactionKind::Income, 20000),
            ("apps", TransactionKind::Expense, 3000),
            ("books", TransactionKind::Income, 3000),
            ("books", TransactionKind::Expense, 3000),
            ("cinema", TransactionKind::Expense, 3000),
            ("gift", TransactionKind::Income, 3000),
        ]
    );

    for include_deleted in [false, true] {
        let first = service.recent_transactions(ALICE, 10, include_deleted).await?;
        let second = service.recent_transactions(ALICE, 10, include_deleted).await?;
        assert_eq!(first, second);
        assert_eq!(first.len(), if include_deleted { 8 } else { 7 });
    }

    let live = service.recent_transactions(ALICE, 10, false).await?;
    assert_eq!(live.last().map(|t| t.category.as_str()), Some("salary"));
    // Same instant: later writes come first
    let sequences: Vec<i64> = live.iter().map(|t| t.sequence).collect();
    assert!(sequences.windows(2).all(|pair| pair[0] > pair[1]));
    Ok(())
}

#[tokio::test]
async fn test_repeated_reads_agree_sqlite() -> Result<()> {
    let (service, _temp) = test_service().await?;
    repeated_reads_agree(&service).await
}

#[tokio::test]
async fn test_repeated_reads_agree_memory() -> Result<()> {
    repeated_reads_agree(&memory_service()).await
}
