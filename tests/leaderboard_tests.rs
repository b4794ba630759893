//! Leaderboard projection: ranking, reserved assets, and caching.

mod support;

use std::collections::HashMap;

use coinarena::core::domain::Side;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use support::{limit, market, Harness};

#[tokio::test]
async fn ranking_stays_on_cash_balance_while_profit_tracks_total_assets() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (alice, _) = h.join(&competition, "alice");
    h.join(&competition, "bob");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    h.place(&alice, market("KRW-BTC", Side::Buy, dec!(0.005)), dec!(100_000_000))
        .await
        .unwrap();

    // BTC rallied since the buy.
    let prices: HashMap<String, Decimal> =
        HashMap::from([("KRW-BTC".to_string(), dec!(120_000_000))]);
    let board = h.competitions.leaderboard(competition.id, &prices).await.unwrap();

    assert_eq!(board.len(), 2);
    // Bob holds more cash and ranks first, although Alice's total asset
    // value is higher. The sort key is the balance, deliberately.
    assert_eq!(board[0].username, "bob");
    assert_eq!(board[0].rank, 1);
    assert_eq!(board[0].balance, dec!(1_000_000));
    assert_eq!(board[0].profit_rate, Decimal::ZERO);
    assert_eq!(board[0].trade_count, 0);

    assert_eq!(board[1].username, "alice");
    assert_eq!(board[1].rank, 2);
    assert_eq!(board[1].balance, dec!(499_750));
    assert_eq!(board[1].coin_value, dec!(600_000));
    assert_eq!(board[1].total_asset, dec!(1_099_750));
    assert!(board[1].total_asset > board[0].total_asset);
    assert_eq!(board[1].trade_count, 1);
    // (1,099,750 - 1,000,000) / 1,000,000 * 100
    assert_eq!(board[1].profit_rate, dec!(9.975));
}

#[tokio::test]
async fn pending_buy_reservations_count_toward_total_assets() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (alice, _) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    h.place(
        &alice,
        limit("KRW-BTC", Side::Buy, dec!(0.001), dec!(95_000_000)),
        dec!(100_000_000),
    )
    .await
    .unwrap();

    let board = h
        .competitions
        .leaderboard(competition.id, &HashMap::new())
        .await
        .unwrap();

    // 95,000 notional + 47.5 fee is reserved; counting it back in, the
    // total asset value is whole again.
    assert_eq!(board[0].balance, dec!(904_952.5));
    assert_eq!(board[0].total_asset, dec!(1_000_000));
    assert_eq!(board[0].profit_rate, Decimal::ZERO);
}

#[tokio::test]
async fn priceless_leaderboard_is_served_from_cache() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (alice, _) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let no_prices = HashMap::new();
    let first = h
        .competitions
        .leaderboard(competition.id, &no_prices)
        .await
        .unwrap();

    // Trade after the cache fill: the cached projection is returned
    // unchanged within its TTL.
    h.place(&alice, market("KRW-BTC", Side::Buy, dec!(0.001)), dec!(100_000_000))
        .await
        .unwrap();
    let second = h
        .competitions
        .leaderboard(competition.id, &no_prices)
        .await
        .unwrap();
    assert_eq!(second[0].balance, first[0].balance);

    // Passing prices bypasses the cache and sees the trade.
    let prices = HashMap::from([("KRW-BTC".to_string(), dec!(100_000_000))]);
    let fresh = h
        .competitions
        .leaderboard(competition.id, &prices)
        .await
        .unwrap();
    assert!(fresh[0].balance < first[0].balance);
}
