#![allow(dead_code)]

use airwatch::configuration::{get_configuration, DatabaseSettings, Settings, StoreBackend};
use airwatch::db::Store;
use airwatch::startup::{build_store, run};
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestApp {
    pub address: String,
    pub store: Arc<dyn Store>,
    /// Stands in for the station network
    pub upstream: MockServer,
    /// Stands in for the completion service
    pub completion: MockServer,
    pub api_client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn mount_stations(&self, stations: &[i64]) {
        let data: Vec<Value> = stations
            .iter()
            .map(|uid| json!({"uid": uid, "lat": 21.1, "lon": 79.0, "aqi": "50"}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/map/bounds/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "data": data})))
            .mount(&self.upstream)
            .await;
    }

    pub async fn mount_feed(&self, uid: i64, name: &str, aqi: i32) {
        Mock::given(method("GET"))
            .and(path(format!("/feed/@{}/", uid)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "data": {
                    "aqi": aqi,
                    "idx": uid,
                    "city": {"name": name, "geo": [21.15, 79.08]},
                    "iaqi": {"pm25": {"v": 42.0}, "no2": {"v": 0}},
                    "time": {"s": "2024-03-01 14:00:00", "tz": "+05:30"}
                }
            })))
            .mount(&self.upstream)
            .await;
    }

    /// Completion service answering with `fragments` as OpenAI style SSE.
    pub async fn mount_completion(&self, fragments: &[&str]) {
        let mut body = String::new();
        for fragment in fragments {
            body.push_str(&format!(
                "data: {}\n\n",
                json!({"choices": [{"index": 0, "delta": {"content": fragment}}]})
            ));
        }
        body.push_str("data: [DONE]\n\n");
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&self.completion)
            .await;
    }

    pub async fn create_conversation(&self, title: &str) -> i32 {
        let response = self
            .api_client
            .post(self.url("/conversations"))
            .json(&json!({ "title": title }))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["id"].as_i64().unwrap() as i32
    }
}

/// Server on a random port with the in-memory store seeded with the
/// reference readings, talking to mock upstream services.
pub async fn spawn_app() -> TestApp {
    let mut configuration = get_configuration().expect("Failed to get configuration");
    let upstream = MockServer::start().await;
    let completion = MockServer::start().await;

    configuration.store.backend = StoreBackend::Memory;
    configuration.store.seed_on_startup = true;
    configuration.upstream.base_url = upstream.uri();
    configuration.upstream.max_attempts = 1;
    configuration.upstream.timeout_secs = 2;
    configuration.completion.base_url = completion.uri();
    configuration.completion.api_key = Some("sk-test".to_string());
    configuration.completion.system_prompt = None;

    spawn_app_with_configuration(configuration, upstream, completion).await
}

pub async fn spawn_app_with_configuration(
    configuration: Settings,
    upstream: MockServer,
    completion: MockServer,
) -> TestApp {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let store = build_store(&configuration).await.expect("Failed to open store.");
    let server = run(listener, store.clone(), configuration)
        .await
        .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        upstream,
        completion,
        api_client: reqwest::Client::new(),
    }
}

/// Fresh database for one test, `None` when postgres is not reachable.
pub async fn configure_database(config: &mut DatabaseSettings) -> Option<()> {
    config.database_name = uuid::Uuid::new_v4().to_string();

    let mut connection = match PgConnection::connect(&config.connection_string_without_db()).await {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("Skipping test: failed to connect to postgres: {}", err);
            return None;
        }
    };
    connection
        .execute(format!(r#"CREATE DATABASE "{}""#, config.database_name).as_str())
        .await
        .expect("Failed to create database.");
    Some(())
}
