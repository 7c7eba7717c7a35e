use marginbot::api::{BinanceFuturesClient, TradingVenue};
use marginbot::models::{Interval, OrderRequest, OrderType, Side};
use marginbot::notify::{Notifier, TelegramNotifier};
use marginbot::BotError;
use mockito::Matcher;
use std::time::Duration;

fn client(server: &mockito::ServerGuard) -> BinanceFuturesClient {
    BinanceFuturesClient::new(&server.url(), Duration::from_secs(5))
        .unwrap()
        .with_credentials("test-key", "test-secret")
}

#[tokio::test]
async fn test_klines_are_parsed_in_order() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("interval".into(), "1h".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                [1700000000000,"100.0","110.0","95.0","105.0","12.5",1700003599999,"0",10,"0","0","0"],
                [1700003600000,"105.0","112.0","101.0","108.5","8.0",1700007199999,"0",7,"0","0","0"]
            ]"#,
        )
        .create_async()
        .await;

    let candles = client(&server)
        .get_candles("BTCUSDT", Interval::OneHour, 2)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].high, 110.0);
    assert_eq!(candles[1].close, 108.5);
    assert!(candles[0].timestamp < candles[1].timestamp);
}

#[tokio::test]
async fn test_mark_price() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/premiumIndex")
        .match_query(Matcher::UrlEncoded("symbol".into(), "ETHUSDT".into()))
        .with_status(200)
        .with_body(r#"{"symbol":"ETHUSDT","markPrice":"3012.45000000","indexPrice":"3011.9"}"#)
        .create_async()
        .await;

    let mark = client(&server).get_mark_price("ETHUSDT").await.unwrap();
    assert_eq!(mark, 3012.45);
}

#[tokio::test]
async fn test_client_error_is_rejection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/order")
        .match_header("X-MBX-APIKEY", "test-key")
        .with_status(400)
        .with_body(r#"{"code":-2019,"msg":"Margin is insufficient."}"#)
        .create_async()
        .await;

    let err = client(&server)
        .submit_order(&OrderRequest::market_entry("BTCUSDT", Side::Long, 0.01))
        .await
        .unwrap_err();

    match err {
        BotError::ExchangeRejection(msg) => {
            assert!(msg.contains("-2019"));
            assert!(msg.contains("Margin is insufficient"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_and_rate_limit_are_transient() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/premiumIndex")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(r#"{"code":-1003,"msg":"Too many requests."}"#)
        .create_async()
        .await;

    let client = client(&server);
    assert!(matches!(
        client.get_mark_price("BTCUSDT").await,
        Err(BotError::TransientNetwork(_))
    ));
    assert!(matches!(
        client.get_candles("BTCUSDT", Interval::ThreeMinutes, 10).await,
        Err(BotError::TransientNetwork(_))
    ));
}

#[tokio::test]
async fn test_stop_order_is_signed_close_position() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/fapi/v1/order")
        .match_header("X-MBX-APIKEY", "test-key")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("symbol=BTCUSDT".into()),
            Matcher::Regex("side=SELL".into()),
            Matcher::Regex("type=STOP_MARKET".into()),
            Matcher::Regex("stopPrice=49450.5".into()),
            Matcher::Regex("closePosition=true".into()),
            Matcher::Regex("workingType=MARK_PRICE".into()),
            Matcher::Regex("signature=[0-9a-f]{64}".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":283194212,"symbol":"BTCUSDT","status":"NEW"}"#)
        .create_async()
        .await;

    let id = client(&server)
        .submit_order(&OrderRequest::protective_stop("BTCUSDT", Side::Long, 49_450.5))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(id, 283194212);
}

#[tokio::test]
async fn test_order_without_id_is_rejection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/order")
        .with_status(200)
        .with_body(r#"{"symbol":"BTCUSDT","status":"NEW"}"#)
        .create_async()
        .await;

    let err = client(&server)
        .submit_order(&OrderRequest::take_profit("BTCUSDT", Side::Short, 48_750.0))
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::ExchangeRejection(_)));
}

#[tokio::test]
async fn test_filters_are_cached() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/exchangeInfo")
        .match_query(Matcher::UrlEncoded("symbol".into(), "SOLUSDT".into()))
        .with_status(200)
        .with_body(
            r#"{"symbols":[{"symbol":"SOLUSDT","filters":[
                {"filterType":"PRICE_FILTER","tickSize":"0.0100","minPrice":"0.4200"},
                {"filterType":"LOT_SIZE","minQty":"1","stepSize":"1"}
            ]}]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let client = client(&server);
    let first = client.get_symbol_filters("SOLUSDT").await.unwrap();
    let second = client.get_symbol_filters("SOLUSDT").await.unwrap();

    mock.assert_async().await;
    assert_eq!(first, second);
    assert_eq!(first.min_lot_size, 1.0);
    assert_eq!(first.price_tick_size, 0.01);
}

#[tokio::test]
async fn test_position_risk_picks_non_zero_entry() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
                {"symbol":"BTCUSDT","positionAmt":"0.000","entryPrice":"0.0","positionSide":"LONG"},
                {"symbol":"BTCUSDT","positionAmt":"-0.020","entryPrice":"50100.5","positionSide":"SHORT"}
            ]"#,
        )
        .create_async()
        .await;

    let position = client(&server).get_position("BTCUSDT").await.unwrap();
    assert_eq!(position.amount, -0.02);
    assert_eq!(position.entry_price, 50_100.5);
    assert!(!position.is_flat());
}

#[tokio::test]
async fn test_open_orders_skip_unknown_types() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/openOrders")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
                {"orderId":1,"symbol":"BTCUSDT","side":"SELL","type":"STOP_MARKET","stopPrice":"49000"},
                {"orderId":2,"symbol":"BTCUSDT","side":"SELL","type":"LIMIT","stopPrice":"0"},
                {"orderId":3,"symbol":"BTCUSDT","side":"SELL","type":"TAKE_PROFIT_MARKET","stopPrice":"51250"}
            ]"#,
        )
        .create_async()
        .await;

    let orders = client(&server).list_open_orders("BTCUSDT").await.unwrap();
    let kinds: Vec<(i64, OrderType)> = orders.iter().map(|o| (o.order_id, o.order_type)).collect();
    assert_eq!(kinds, vec![(1, OrderType::Stop), (3, OrderType::TakeProfit)]);
    assert_eq!(orders[0].stop_price, Some(49_000.0));
}

#[tokio::test]
async fn test_account_balances() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/account")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"assets":[
                {"asset":"BNB","walletBalance":"1.0","availableBalance":"1.0"},
                {"asset":"USDT","walletBalance":"1250.50","availableBalance":"980.25"}
            ]}"#,
        )
        .expect(2)
        .create_async()
        .await;

    let client = client(&server);
    assert_eq!(client.get_total_balance().await.unwrap(), 1_250.5);
    assert_eq!(client.get_available_margin().await.unwrap(), 980.25);
}

#[tokio::test]
async fn test_signed_call_without_credentials_is_configuration_error() {
    let server = mockito::Server::new_async().await;
    let client = BinanceFuturesClient::new(&server.url(), Duration::from_secs(5)).unwrap();
    let err = client.set_leverage("BTCUSDT", 10).await.unwrap_err();
    assert!(matches!(err, BotError::Configuration(_)));
}

#[tokio::test]
async fn test_telegram_notifier_posts_message() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/bottoken123/sendMessage")
        .match_body(Matcher::PartialJsonString(
            r#"{"chat_id":"42","text":"🚨 BTCUSDT: stop missing"}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .create_async()
        .await;

    let notifier = TelegramNotifier::with_base_url(
        reqwest::Client::new(),
        &server.url(),
        "token123".to_string(),
        "42".to_string(),
    );
    notifier.send("🚨 BTCUSDT: stop missing").await;
    mock.assert_async().await;
}
