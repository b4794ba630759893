//! Matching-engine behavior on the live tick stream.

mod support;

use chrono::Utc;
use coinarena::core::domain::{Order, OrderStatus, Side};
use coinarena::core::ledger::Ledger;
use rust_decimal_macros::dec;
use support::{limit, market, Harness};

#[tokio::test]
async fn tick_fills_resting_buy_and_refunds_the_price_difference() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, participant) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let order = h
        .place(
            &user,
            limit("KRW-BTC", Side::Buy, dec!(0.01), dec!(95_000_000)),
            dec!(100_000_000),
        )
        .await
        .unwrap();
    assert_eq!(h.balance_of(&participant), dec!(49_525));

    // Price does not reach the limit: nothing happens.
    assert_eq!(h.matching.process_tick(&h.tick("KRW-BTC", dec!(96_000_000))).await, 0);
    assert_eq!(h.balance_of(&participant), dec!(49_525));

    // Price crosses: fills at the tick price, refunding the savings over
    // the reserved limit notional.
    assert_eq!(h.matching.process_tick(&h.tick("KRW-BTC", dec!(94_000_000))).await, 1);

    let filled = h.ledger.get_order(order.id).unwrap().unwrap();
    assert_eq!(filled.status, OrderStatus::Filled);
    assert_eq!(filled.filled_price, Some(dec!(94_000_000)));
    assert_eq!(filled.fee, dec!(470));

    // (95M - 94M) * 0.01 = 10,000 back.
    assert_eq!(h.balance_of(&participant), dec!(59_525));

    let position = h
        .ledger
        .get_position(participant.id, &"KRW-BTC".into())
        .unwrap()
        .unwrap();
    assert_eq!(position.quantity, dec!(0.01));
    assert_eq!(position.avg_buy_price, dec!(94_000_000));

    let trade = h.ledger.find_trade_by_order(order.id).unwrap().unwrap();
    assert_eq!(trade.price, dec!(94_000_000));
    assert_eq!(trade.total_amount, dec!(940_000));
}

#[tokio::test]
async fn tick_fills_resting_sell_at_the_tick_price() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, participant) = h.join(&competition, "alice");
    h.set_price("KRW-ETH", dec!(5_000_000)).await;

    h.place(&user, market("KRW-ETH", Side::Buy, dec!(0.1)), dec!(5_000_000))
        .await
        .unwrap();
    let sell = h
        .place(
            &user,
            limit("KRW-ETH", Side::Sell, dec!(0.1), dec!(5_400_000)),
            dec!(5_000_000),
        )
        .await
        .unwrap();
    assert_eq!(sell.status, OrderStatus::Pending);
    // The coin is reserved out of the position.
    assert!(h
        .ledger
        .get_position(participant.id, &"KRW-ETH".into())
        .unwrap()
        .is_none());

    // Tick above the ask: sells at the tick price.
    assert_eq!(h.matching.process_tick(&h.tick("KRW-ETH", dec!(5_500_000))).await, 1);

    let filled = h.ledger.get_order(sell.id).unwrap().unwrap();
    assert_eq!(filled.filled_price, Some(dec!(5_500_000)));
    // 499,750 after the buy, plus 550,000 - 275 fee.
    assert_eq!(h.balance_of(&participant), dec!(1_049_475));
}

#[tokio::test]
async fn fills_follow_creation_order_within_a_tick() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (alice, _) = h.join(&competition, "alice");
    let (bob, _) = h.join(&competition, "bob");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let first = h
        .place(
            &alice,
            limit("KRW-BTC", Side::Buy, dec!(0.001), dec!(95_000_000)),
            dec!(100_000_000),
        )
        .await
        .unwrap();
    let second = h
        .place(
            &bob,
            limit("KRW-BTC", Side::Buy, dec!(0.002), dec!(95_000_000)),
            dec!(100_000_000),
        )
        .await
        .unwrap();

    assert_eq!(h.matching.process_tick(&h.tick("KRW-BTC", dec!(94_000_000))).await, 2);

    let first = h.ledger.get_order(first.id).unwrap().unwrap();
    let second = h.ledger.get_order(second.id).unwrap().unwrap();
    assert!(first.filled_at.unwrap() <= second.filled_at.unwrap());
    assert!(first.created_at <= second.created_at);
}

#[tokio::test]
async fn one_bad_order_never_stops_the_batch() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    // A pending order pointing at a participant that does not exist: its
    // execution fails every tick.
    let orphan = Order::pending_limit(
        coinarena::core::domain::ParticipantId::new(),
        "KRW-BTC".into(),
        Side::Buy,
        dec!(0.001),
        dec!(96_000_000),
        Utc::now(),
    );
    h.ledger
        .with_tx(|tx| tx.insert_order(&orphan))
        .unwrap();

    let good = h
        .place(
            &user,
            limit("KRW-BTC", Side::Buy, dec!(0.001), dec!(95_000_000)),
            dec!(100_000_000),
        )
        .await
        .unwrap();

    // The orphan is older and fails; the good order still fills.
    assert_eq!(h.matching.process_tick(&h.tick("KRW-BTC", dec!(94_000_000))).await, 1);
    assert_eq!(
        h.ledger.get_order(good.id).unwrap().unwrap().status,
        OrderStatus::Filled
    );
    assert_eq!(
        h.ledger.get_order(orphan.id).unwrap().unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn ticks_only_match_their_own_code() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let order = h
        .place(
            &user,
            limit("KRW-BTC", Side::Buy, dec!(0.001), dec!(95_000_000)),
            dec!(100_000_000),
        )
        .await
        .unwrap();

    assert_eq!(h.matching.process_tick(&h.tick("KRW-ETH", dec!(4_000_000))).await, 0);
    assert_eq!(
        h.ledger.get_order(order.id).unwrap().unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn cancel_after_dust_cleanup_reinstates_the_position_row() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, participant) = h.join(&competition, "alice");
    h.set_price("KRW-ETH", dec!(5_000_000)).await;

    // Hold 0.01, rest a sell for half of it, then market-sell the rest:
    // the position row drains to zero and is dust-cleaned away.
    h.place(&user, market("KRW-ETH", Side::Buy, dec!(0.01)), dec!(5_000_000))
        .await
        .unwrap();
    let resting = h
        .place(
            &user,
            limit("KRW-ETH", Side::Sell, dec!(0.005), dec!(5_300_000)),
            dec!(5_000_000),
        )
        .await
        .unwrap();
    h.place(&user, market("KRW-ETH", Side::Sell, dec!(0.005)), dec!(5_000_000))
        .await
        .unwrap();
    assert!(h
        .ledger
        .get_position(participant.id, &"KRW-ETH".into())
        .unwrap()
        .is_none());

    // Cancelling the resting sell must recreate the row, not crash on it.
    h.orders.cancel_order(user.id, resting.id).await.unwrap();
    let position = h
        .ledger
        .get_position(participant.id, &"KRW-ETH".into())
        .unwrap()
        .unwrap();
    assert_eq!(position.quantity, dec!(0.005));
}
