use chrono::{DateTime, TimeZone, Utc};
use gridwatch_core::{
    CarbonSourceId, Config, Dashboard, DashboardError, FetchPhase, ServiceId, Services,
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 10, 0).unwrap()
}

fn config_for(server: &ServerGuard, source: CarbonSourceId) -> Config {
    let mut cfg = Config::default();
    for id in ServiceId::all() {
        cfg.set_base_url(*id, server.url());
    }
    cfg.upsert_api_key(ServiceId::OpenWeather, "OW_KEY".into());
    cfg.upsert_api_key(ServiceId::ElectricityMaps, "EM_KEY".into());
    cfg.upsert_api_key(ServiceId::Gemini, "GEM_KEY".into());
    cfg.set_carbon_source(source);
    cfg
}

fn dashboard(cfg: &Config) -> Dashboard {
    Dashboard::new(Services::from_config(cfg).unwrap())
}

async fn mock_postcode(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/postcodes/SW1A0AA")
        .with_status(200)
        .with_body(json!({"status": 200, "result": {"latitude": 51.5, "longitude": -0.14}}).to_string())
        .create_async()
        .await
}

async fn mock_region(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/regional/postcode/SW1A0AA")
        .with_status(200)
        .with_body(
            json!({"data": [{"shortname": "London", "data": [{"regionid": 13}]}]}).to_string(),
        )
        .create_async()
        .await
}

async fn mock_weather(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/data/2.5/weather")
        .match_query(Matcher::UrlEncoded("appid".into(), "OW_KEY".into()))
        .with_status(200)
        .with_body(
            json!({
                "name": "Westminster",
                "weather": [{"description": "light rain", "icon": "10d"}],
                "main": {"temp": 9.6, "feels_like": 7.2, "humidity": 88}
            })
            .to_string(),
        )
        .create_async()
        .await
}

async fn mock_windows(server: &mut ServerGuard, regional: &[(&str, f64)], national: &[(&str, f64)]) -> (Mock, Mock) {
    let entries = |points: &[(&str, f64)]| {
        points
            .iter()
            .map(|(from, v)| json!({"from": from, "intensity": {"forecast": v}}))
            .collect::<Vec<_>>()
    };

    let regional_mock = server
        .mock(
            "GET",
            "/regional/intensity/2024-03-09T12:10Z/2024-03-11T12:10Z/regionid/13",
        )
        .with_status(200)
        .with_body(json!({"data": {"regionid": 13, "shortname": "London", "data": entries(regional)}}).to_string())
        .create_async()
        .await;
    let national_mock = server
        .mock("GET", "/intensity/2024-03-09T12:10Z/2024-03-11T12:10Z")
        .with_status(200)
        .with_body(json!({"data": entries(national)}).to_string())
        .create_async()
        .await;

    (regional_mock, national_mock)
}

#[tokio::test]
async fn region_forecast_cycle_populates_dashboard() {
    let mut server = Server::new_async().await;
    let postcode = mock_postcode(&mut server).await;
    let region = mock_region(&mut server).await;
    let weather = mock_weather(&mut server).await;
    let (regional, national) = mock_windows(
        &mut server,
        &[
            ("2024-03-10T12:30Z", 130.0),
            ("2024-03-10T12:00Z", 120.0),
            ("2024-03-10T11:30Z", 110.0),
            ("2024-03-10T13:00Z", 140.0),
        ],
        &[
            ("2024-03-10T11:30Z", 170.0),
            ("2024-03-10T12:00Z", 180.0),
            ("2024-03-10T12:30Z", 190.0),
        ],
    )
    .await;

    let mut dash = dashboard(&config_for(&server, CarbonSourceId::RegionForecast));
    dash.submit_postcode("sw1a 0aa", now()).await.unwrap();

    let snapshot = dash.snapshot();
    assert_eq!(snapshot.fetch_state.phase, FetchPhase::Ready);
    assert!(snapshot.fetch_state.error.is_none());
    assert_eq!(snapshot.region_label, "London");
    assert_eq!(snapshot.weather.unwrap().place, "Westminster");

    let series = snapshot.series.unwrap();
    let stamps: Vec<&str> = series.iter().map(|s| s.timestamp_iso.as_str()).collect();
    assert_eq!(stamps, vec!["2024-03-10T11:30Z", "2024-03-10T12:00Z", "2024-03-10T12:30Z"]);
    assert!(series.iter().all(|s| s.national_intensity.is_some()));

    postcode.assert_async().await;
    region.assert_async().await;
    weather.assert_async().await;
    regional.assert_async().await;
    national.assert_async().await;
}

#[tokio::test]
async fn tips_embed_the_sample_nearest_to_now() {
    let mut server = Server::new_async().await;
    let _postcode = mock_postcode(&mut server).await;
    let _region = mock_region(&mut server).await;
    let _weather = mock_weather(&mut server).await;
    let _windows = mock_windows(
        &mut server,
        &[("2024-03-10T10:00Z", 90.0), ("2024-03-10T12:00Z", 120.0), ("2024-03-10T15:00Z", 60.0)],
        &[("2024-03-10T10:00Z", 150.0), ("2024-03-10T12:00Z", 180.0), ("2024-03-10T15:00Z", 100.0)],
    )
    .await;
    let gemini = server
        .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
        .match_query(Matcher::UrlEncoded("key".into(), "GEM_KEY".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("in London is 120 gCO2/kWh".into()),
            Matcher::Regex("national average of 180 gCO2/kWh".into()),
        ]))
        .with_status(200)
        .with_body(
            json!({"candidates": [{"content": {"parts": [{"text": "* Delay laundry\n* Batch cook"}]}}]})
                .to_string(),
        )
        .create_async()
        .await;

    let mut dash = dashboard(&config_for(&server, CarbonSourceId::RegionForecast));
    dash.submit_postcode("SW1A 0AA", now()).await.unwrap();
    let tips = dash.request_tips(now()).await.unwrap();

    assert_eq!(tips, "* Delay laundry\n* Batch cook");
    let snapshot = dash.snapshot();
    assert_eq!(snapshot.tips.as_deref(), Some("* Delay laundry\n* Batch cook"));
    assert!(!snapshot.tips_loading);
    gemini.assert_async().await;
}

#[tokio::test]
async fn weather_failure_fails_whole_cycle() {
    let mut server = Server::new_async().await;
    let _postcode = mock_postcode(&mut server).await;
    let _region = mock_region(&mut server).await;
    let _weather = server
        .mock("GET", "/data/2.5/weather")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(json!({"cod": "404", "message": "city not found"}).to_string())
        .create_async()
        .await;
    let _windows = mock_windows(&mut server, &[("2024-03-10T12:00Z", 120.0)], &[("2024-03-10T12:00Z", 180.0)]).await;

    let mut dash = dashboard(&config_for(&server, CarbonSourceId::RegionForecast));
    let err = dash.submit_postcode("SW1A 0AA", now()).await.unwrap_err();

    assert!(matches!(err, DashboardError::Upstream { .. }));
    let snapshot = dash.snapshot();
    assert_eq!(snapshot.fetch_state.phase, FetchPhase::Failed);
    assert_eq!(
        snapshot.fetch_state.error.as_deref(),
        Some("Weather API error: city not found")
    );
    assert!(snapshot.weather.is_none());
    assert!(snapshot.series.is_none());

    dash.dismiss_error();
    assert_eq!(dash.fetch_state().phase, FetchPhase::Idle);
}

#[tokio::test]
async fn invalid_postcode_stops_before_other_requests() {
    let mut server = Server::new_async().await;
    let _postcode = server
        .mock("GET", "/postcodes/NOTAPOSTCODE")
        .with_status(404)
        .create_async()
        .await;
    let weather = server
        .mock("GET", "/data/2.5/weather")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut dash = dashboard(&config_for(&server, CarbonSourceId::RegionForecast));
    let err = dash.submit_postcode("not a postcode", now()).await.unwrap_err();

    assert!(matches!(err, DashboardError::InvalidLocation(_)));
    assert_eq!(dash.fetch_state().phase, FetchPhase::Failed);
    weather.assert_async().await;
}

#[tokio::test]
async fn unsupported_region_has_distinct_message() {
    let mut server = Server::new_async().await;
    let _postcode = server
        .mock("GET", "/postcodes/BT11AA")
        .with_status(200)
        .with_body(json!({"result": {"latitude": 54.6, "longitude": -5.93}}).to_string())
        .create_async()
        .await;
    let _region = server
        .mock("GET", "/regional/postcode/BT11AA")
        .with_status(400)
        .with_body(json!({"error": {"code": "400 Bad Request", "message": "Please enter a valid postcode"}}).to_string())
        .create_async()
        .await;

    let mut dash = dashboard(&config_for(&server, CarbonSourceId::RegionForecast));
    let err = dash.submit_postcode("BT1 1AA", now()).await.unwrap_err();

    assert!(matches!(err, DashboardError::RegionNotFound(_)));
    assert!(
        dash.fetch_state()
            .error
            .as_deref()
            .unwrap()
            .contains("may not be a mainland UK postcode")
    );
}

#[tokio::test]
async fn missing_weather_key_is_reported_not_fatal() {
    let mut server = Server::new_async().await;
    let _postcode = mock_postcode(&mut server).await;
    let _region = mock_region(&mut server).await;
    let _windows = mock_windows(&mut server, &[], &[]).await;

    let mut cfg = config_for(&server, CarbonSourceId::RegionForecast);
    cfg.upsert_api_key(ServiceId::OpenWeather, "".into());

    let mut dash = dashboard(&cfg);
    let err = dash.submit_postcode("SW1A 0AA", now()).await.unwrap_err();

    assert!(matches!(err, DashboardError::Configuration(_)));
    assert_eq!(dash.fetch_state().phase, FetchPhase::Failed);
}

#[tokio::test]
async fn disjoint_series_is_ready_but_empty() {
    let mut server = Server::new_async().await;
    let _postcode = mock_postcode(&mut server).await;
    let _region = mock_region(&mut server).await;
    let _weather = mock_weather(&mut server).await;
    let _windows = mock_windows(&mut server, &[("2024-03-10T12:00Z", 120.0)], &[("2024-03-10T12:30Z", 180.0)]).await;

    let mut dash = dashboard(&config_for(&server, CarbonSourceId::RegionForecast));
    dash.submit_postcode("SW1A 0AA", now()).await.unwrap();

    let snapshot = dash.snapshot();
    assert_eq!(snapshot.fetch_state.phase, FetchPhase::Ready);
    assert!(snapshot.series.unwrap().is_empty());

    let err = dash.request_tips(now()).await.unwrap_err();
    assert!(matches!(err, DashboardError::EmptySeries));
}

#[tokio::test]
async fn coordinate_history_cycle_has_no_national_series() {
    let mut server = Server::new_async().await;
    let _postcode = mock_postcode(&mut server).await;
    let region_lookup = server
        .mock("GET", "/regional/postcode/SW1A0AA")
        .expect(0)
        .create_async()
        .await;
    let _weather = mock_weather(&mut server).await;
    let history = server
        .mock("GET", "/v3/carbon-intensity/history")
        .match_header("auth-token", "EM_KEY")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"zone": "GB", "history": [
                {"datetime": "2024-03-10T11:00:00.000Z", "carbonIntensity": 150},
                {"datetime": "2024-03-10T10:00:00.000Z", "carbonIntensity": 140},
                {"datetime": "2024-03-10T12:00:00.000Z", "carbonIntensity": null}
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let mut dash = dashboard(&config_for(&server, CarbonSourceId::CoordinateHistory));
    dash.submit_postcode("SW1A 0AA", now()).await.unwrap();

    let snapshot = dash.snapshot();
    assert_eq!(snapshot.region_label, "GB");
    let series = snapshot.series.unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series.samples()[0].local_intensity, 140.0);
    assert!(series.iter().all(|s| s.national_intensity.is_none()));

    history.assert_async().await;
    region_lookup.assert_async().await;
}
