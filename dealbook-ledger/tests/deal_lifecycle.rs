//! End-to-end lifecycle tests for the position ledger.
//!
//! Runs whole journaling scenarios through `DealService` backed by the
//! in-memory store: scaling in, partial closes, profit reinvestment, fill
//! reconciliation, and loading legacy single-leg documents.

use chrono::Utc;
use dealbook_domain::{Deal, DealStatus, Direction, TradeFill};
use dealbook_ledger::{DealService, ExitSpec, LedgerError, NewDealInput, TradePhase};
use dealbook_store::{DealRepository, MemoryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

fn new_input(qty: Decimal, price: Decimal) -> NewDealInput {
    NewDealInput {
        symbol: "ETHUSDT".to_string(),
        direction: Direction::Long,
        opened_at: None,
        qty,
        price,
        note: None,
    }
}

fn exit_at(price: Decimal) -> ExitSpec {
    ExitSpec {
        price,
        fee: None,
        closed_at: None,
    }
}

fn fill(id: i64, order_id: i64, qty: Decimal, price: Decimal) -> TradeFill {
    TradeFill {
        id,
        order_id,
        price,
        qty,
        quote_qty: qty * price,
        commission: dec!(0.02),
        commission_asset: "USDT".to_string(),
        time: Utc::now(),
        is_buyer: false,
        is_maker: false,
    }
}

#[tokio::test]
async fn test_scale_in_partial_out_reinvest_then_close() {
    let svc = DealService::new(Arc::new(MemoryStore::new()));
    let owner = Uuid::now_v7();

    // Open 2 @ 1000, scale in 2 @ 1100: avg 1050
    let deal = svc.create_deal(owner, new_input(dec!(2), dec!(1000))).await.unwrap();
    let deal_id = deal.id;
    let deal = svc.add_entry(owner, deal_id, dec!(2), dec!(1100), None).await.unwrap();
    assert_eq!(deal.entry_avg_price, dec!(1050));
    assert_eq!(deal.entry_qty_total, dec!(4));

    // Take 1 off at 1250: pnl 200
    let deal = svc
        .partial_close(owner, deal_id, dec!(1), exit_at(dec!(1250)), Some("TP1".into()))
        .await
        .unwrap();
    assert_eq!(deal.realized_pnl, dec!(200));
    assert_eq!(deal.remaining_qty, dec!(3));
    assert_eq!(deal.status, DealStatus::Open);

    // Reinvest half the profit at 1000: +0.1 qty, cost basis restated,
    // recognized profit untouched
    let deal = svc
        .reinvest_profit(owner, deal_id, dec!(100), dec!(1000), None)
        .await
        .unwrap();
    assert_eq!(deal.realized_pnl, dec!(200));
    assert_eq!(deal.realized_pnl_available, dec!(100));
    assert_eq!(deal.remaining_qty, dec!(3.1));
    // avg = (2000 + 2200 + 100) / 4.1
    assert_eq!(deal.entry_avg_price, dec!(4300) / dec!(4.1));

    // Close the rest
    let deal = svc.close_full(owner, deal_id, exit_at(dec!(1300))).await.unwrap();
    assert_eq!(deal.status, DealStatus::Closed);
    assert_eq!(deal.remaining_qty, Decimal::ZERO);
    assert!(deal.closed_at.is_some());

    // No further closes
    let err = svc.close_full(owner, deal_id, exit_at(dec!(1300))).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyClosed));
}

#[tokio::test]
async fn test_exit_fill_import_settles_incrementally() {
    let svc = DealService::new(Arc::new(MemoryStore::new()));
    let owner = Uuid::now_v7();
    let deal = svc.create_deal(owner, new_input(dec!(2), dec!(1000))).await.unwrap();

    // First batch: half the order has filled
    let (deal_v1, imported) = svc
        .apply_order_fills(owner, deal.id, TradePhase::Exit, vec![fill(1, 77, dec!(1), dec!(1100))])
        .await
        .unwrap();
    assert_eq!(imported, 1);
    assert_eq!(deal_v1.closed_qty, dec!(1));
    assert_eq!(deal_v1.status, DealStatus::Open);

    // Second poll: old fill plus the newly settled one
    let (deal_v2, imported) = svc
        .apply_order_fills(
            owner,
            deal.id,
            TradePhase::Exit,
            vec![fill(1, 77, dec!(1), dec!(1100)), fill(2, 77, dec!(1), dec!(1120))],
        )
        .await
        .unwrap();
    assert_eq!(imported, 1);
    assert_eq!(deal_v2.closed_qty, dec!(2));
    assert_eq!(deal_v2.status, DealStatus::Closed);

    // The exchange leg is one aggregate, not one leg per poll
    assert_eq!(deal_v2.exit_legs.len(), 1);
    assert_eq!(deal_v2.exit_legs[0].order_id, Some(77));
    assert_eq!(deal_v2.exit_fills.len(), 2);

    // pnl = 2220 − 2000 − 0.04 fees
    assert_eq!(deal_v2.realized_pnl, dec!(219.96));
}

#[tokio::test]
async fn test_legacy_document_is_normalized_on_load() {
    let store = Arc::new(MemoryStore::new());
    let svc = DealService::new(store.clone());
    let owner = Uuid::now_v7();

    // Seed a pre-multi-leg document straight into the store
    let json = format!(
        r#"{{
            "id": "{}",
            "owner_id": "{}",
            "symbol": {{"base": "BTC", "quote": "USDT"}},
            "direction": "LONG",
            "status": "OPEN",
            "opened_at": "2023-04-01T00:00:00Z",
            "entry": {{
                "qty": "2", "price": "100", "quote": "200",
                "opened_at": "2023-04-01T00:00:00Z", "source": "MANUAL"
            }}
        }}"#,
        Uuid::now_v7(),
        owner
    );
    let legacy: Deal = serde_json::from_str(&json).unwrap();
    let legacy_id = legacy.id;
    store.insert(&legacy).await.unwrap();

    // Loading expands the scalar into the leg array
    let loaded = svc.get_deal(owner, legacy_id).await.unwrap();
    assert_eq!(loaded.entry_legs.len(), 1);
    assert!(loaded.entry.is_none());

    // Mutations work against the normalized shape
    let deal = svc
        .partial_close(owner, legacy_id, dec!(1), exit_at(dec!(120)), None)
        .await
        .unwrap();
    assert_eq!(deal.entry_qty_total, dec!(2));
    assert_eq!(deal.realized_pnl, dec!(20));
    assert_eq!(deal.remaining_qty, dec!(1));
}

#[tokio::test]
async fn test_list_is_owner_scoped_and_newest_first() {
    let svc = DealService::new(Arc::new(MemoryStore::new()));
    let alice = Uuid::now_v7();
    let bob = Uuid::now_v7();

    let first = svc.create_deal(alice, new_input(dec!(1), dec!(100))).await.unwrap();
    let second = svc.create_deal(alice, new_input(dec!(2), dec!(200))).await.unwrap();
    svc.create_deal(bob, new_input(dec!(3), dec!(300))).await.unwrap();

    let deals = svc.list_deals(alice).await.unwrap();
    assert_eq!(deals.len(), 2);
    let ids: Vec<_> = deals.iter().map(|d| d.id).collect();
    assert!(ids.contains(&first.id) && ids.contains(&second.id));
    // Newest first by time-ordered id
    assert!(deals[0].id > deals[1].id);
}
