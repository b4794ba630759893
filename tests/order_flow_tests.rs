//! End-to-end order placement flows over the in-memory stack.

mod support;

use coinarena::core::domain::{OrderStatus, OrderType, Side};
use coinarena::core::ledger::Ledger;
use coinarena::error::Error;
use rust_decimal_macros::dec;
use support::{limit, market, with_key, Harness};

#[tokio::test]
async fn market_buy_rejects_when_fee_tips_over_balance() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, participant) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    // 0.01 BTC costs 1,000,000 + 500 fee: 500 short.
    let err = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(0.01)), dec!(100_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds));
    assert_eq!(h.balance_of(&participant), dec!(1_000_000));

    // 0.005 BTC fits: 500,000 + 250 fee.
    let order = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(0.005)), dec!(100_000_000))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_price, Some(dec!(100_000_000)));
    assert_eq!(order.fee, dec!(250));
    assert_eq!(h.balance_of(&participant), dec!(499_750));

    let position = h
        .ledger
        .get_position(participant.id, &"KRW-BTC".into())
        .unwrap()
        .unwrap();
    assert_eq!(position.quantity, dec!(0.005));
    assert_eq!(position.avg_buy_price, dec!(100_000_000));

    let trade = h.ledger.find_trade_by_order(order.id).unwrap().unwrap();
    assert_eq!(trade.total_amount, dec!(500_000));
    assert_eq!(trade.fee, dec!(250));
}

#[tokio::test]
async fn market_sell_credits_proceeds_minus_fee() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, participant) = h.join(&competition, "alice");
    h.set_price("KRW-ETH", dec!(5_000_000)).await;

    h.place(&user, market("KRW-ETH", Side::Buy, dec!(0.1)), dec!(5_000_000))
        .await
        .unwrap();
    // 500,000 + 250 fee spent.
    assert_eq!(h.balance_of(&participant), dec!(499_750));

    let sell = h
        .place(&user, market("KRW-ETH", Side::Sell, dec!(0.1)), dec!(5_000_000))
        .await
        .unwrap();
    assert_eq!(sell.status, OrderStatus::Filled);
    // Proceeds 500,000 - 250 fee; the position row is drained and removed.
    assert_eq!(h.balance_of(&participant), dec!(999_500));
    assert!(h
        .ledger
        .get_position(participant.id, &"KRW-ETH".into())
        .unwrap()
        .is_none());

    // Distinct idempotency key so duplicate suppression stays out of the way.
    let err = h
        .place(
            &user,
            with_key(market("KRW-ETH", Side::Sell, dec!(0.1)), "sell-again"),
            dec!(5_000_000),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientPosition));
}

#[tokio::test]
async fn crossing_limit_buy_escalates_to_market_price() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-ETH", dec!(5_000_000)).await;

    // Willing to pay more than the market: fills right now, at the market.
    let order = h
        .place(
            &user,
            limit("KRW-ETH", Side::Buy, dec!(0.1), dec!(5_200_000)),
            dec!(5_000_000),
        )
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.order_type, OrderType::Market);
    assert_eq!(order.filled_price, Some(dec!(5_000_000)));
}

#[tokio::test]
async fn limit_price_a_full_band_from_market_is_rejected() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-ETH", dec!(5_000_000)).await;

    // Exactly -10% from the market.
    let err = h
        .place(
            &user,
            limit("KRW-ETH", Side::Buy, dec!(0.1), dec!(4_500_000)),
            dec!(5_000_000),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PriceOutOfBand { .. }));
}

#[tokio::test]
async fn resting_limit_buy_reserves_cash_up_front() {
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
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.price, Some(dec!(95_000_000)));

    // 950,000 notional + 475 fee reserved out of the balance.
    assert_eq!(h.balance_of(&participant), dec!(49_525));
}

#[tokio::test]
async fn client_price_far_from_server_price_is_a_mismatch() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-ETH", dec!(5_000_000)).await;

    let err = h
        .place(&user, market("KRW-ETH", Side::Buy, dec!(0.1)), dec!(6_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PriceMismatch { .. }));
}

#[tokio::test]
async fn server_price_is_authoritative_over_client_price() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-ETH", dec!(5_000_000)).await;

    // Client is 4% off; accepted, but the fill happens at the server price.
    let order = h
        .place(&user, market("KRW-ETH", Side::Buy, dec!(0.1)), dec!(5_200_000))
        .await
        .unwrap();
    assert_eq!(order.filled_price, Some(dec!(5_000_000)));
}

#[tokio::test]
async fn falls_back_to_client_price_when_archive_is_cold() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");

    let order = h
        .place(&user, market("KRW-ETH", Side::Buy, dec!(0.1)), dec!(5_000_000))
        .await
        .unwrap();
    assert_eq!(order.filled_price, Some(dec!(5_000_000)));
}

#[tokio::test]
async fn sanity_band_rejects_absurd_prices_even_with_matching_client() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(1_000_000)).await;

    let err = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(0.1)), dec!(1_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PriceOutOfBand { .. }));
}

#[tokio::test]
async fn duplicate_idempotency_key_yields_exactly_one_order() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, participant) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let request = with_key(market("KRW-BTC", Side::Buy, dec!(0.001)), "abc");
    let first = h.place(&user, request.clone(), dec!(100_000_000)).await;
    let second = h.place(&user, request, dec!(100_000_000)).await;

    assert!(first.is_ok());
    assert!(matches!(second.unwrap_err(), Error::DuplicateOrder));
    assert_eq!(h.ledger.list_orders(participant.id).unwrap().len(), 1);
}

#[tokio::test]
async fn identical_payload_without_key_is_suppressed_by_content_hash() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let first = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(0.001)), dec!(100_000_000))
        .await;
    let second = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(0.001)), dec!(100_000_000))
        .await;
    // A different quantity is a different order.
    let third = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(0.002)), dec!(100_000_000))
        .await;

    assert!(first.is_ok());
    assert!(matches!(second.unwrap_err(), Error::DuplicateOrder));
    assert!(third.is_ok());
}

#[tokio::test]
async fn cancel_refunds_exactly_what_was_reserved() {
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

    let cancelled = h.orders.cancel_order(user.id, order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(h.balance_of(&participant), dec!(1_000_000));

    // Terminal orders cannot be cancelled again.
    let err = h.orders.cancel_order(user.id, order.id).await.unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));
}

#[tokio::test]
async fn cancel_is_scoped_to_the_owner() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (alice, _) = h.join(&competition, "alice");
    let (mallory, _) = h.join(&competition, "mallory");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let order = h
        .place(
            &alice,
            limit("KRW-BTC", Side::Buy, dec!(0.001), dec!(95_000_000)),
            dec!(100_000_000),
        )
        .await
        .unwrap();

    let err = h
        .orders
        .cancel_order(mallory.id, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn orders_outside_the_competition_window_are_rejected() {
    let h = Harness::new();
    // Window already over; force the status to active to isolate the
    // wall-clock check.
    let competition = h
        .competitions
        .create(
            "stale",
            None,
            dec!(1_000_000),
            dec!(0.0005),
            chrono::Utc::now() - chrono::Duration::hours(2),
            chrono::Utc::now() - chrono::Duration::hours(1),
        )
        .unwrap();
    h.ledger
        .set_competition_status(
            competition.id,
            coinarena::core::domain::CompetitionStatus::Active,
            chrono::Utc::now(),
        )
        .unwrap();
    let competition = h.competitions.get(competition.id).unwrap();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let err = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(0.001)), dec!(100_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CompetitionClosed(_)));
}

#[tokio::test]
async fn users_without_a_participation_cannot_trade() {
    let h = Harness::new();
    h.standard_competition();
    let user = h
        .ledger
        .upsert_user("stranger", "stranger@example.com", None)
        .unwrap();
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let err = h
        .orders
        .place_order(
            user.id,
            &market("KRW-BTC", Side::Buy, dec!(0.001)),
            dec!(100_000_000),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn non_positive_quantities_and_prices_are_rejected_up_front() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, _) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    let err = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(-0.01)), dec!(100_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));

    let err = h
        .place(&user, market("KRW-BTC", Side::Buy, dec!(0.01)), dec!(0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));
}

#[tokio::test]
async fn concurrent_buys_of_the_full_balance_admit_exactly_one() {
    let h = Harness::new();
    let competition = h.standard_competition();
    let (user, participant) = h.join(&competition, "alice");
    h.set_price("KRW-BTC", dec!(100_000_000)).await;

    // Each order is worth ~999,500 + fee against a 1,000,000 balance: only
    // one can ever fit.
    let mut handles = Vec::new();
    for i in 0..4 {
        let h = h.clone();
        let user_id = user.id;
        handles.push(tokio::spawn(async move {
            h.orders
                .place_order(
                    user_id,
                    &with_key(
                        market("KRW-BTC", Side::Buy, dec!(0.009995)),
                        &format!("key-{i}"),
                    ),
                    dec!(100_000_000),
                )
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(
                Error::InsufficientFunds | Error::ContentionTimeout | Error::ConcurrentRequest,
            ) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert!(h.balance_of(&participant) >= rust_decimal::Decimal::ZERO);
}
