#![allow(dead_code)]

use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use api::routes::webhook::SyncWebhookRequest;
use api::startup::run;
use config::Environment;
use etl::aggregator::MemoryProgressStore;
use etl::queue::{JobQueue, MemoryJobQueue};

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    server_handle: tokio::task::JoinHandle<io::Result<()>>,
}

impl TestApp {
    pub async fn send_webhook(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/webhook", &self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn send_event(
        &self,
        connection_id: &str,
        object: &str,
        result: &str,
    ) -> reqwest::Response {
        let request = SyncWebhookRequest {
            connection_id: Some(connection_id.into()),
            object: Some(object.into()),
            result: Some(result.into()),
        };

        self.api_client
            .post(format!("{}/webhook", &self.address))
            .json(&request)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}{path}", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// Spawns the API on a random port with an in-memory progress store and `queue`.
pub async fn spawn_test_app_with_queue(queue: Arc<dyn JobQueue>) -> TestApp {
    Environment::Dev.set();

    let base_address = "127.0.0.1";
    let listener =
        TcpListener::bind(format!("{base_address}:0")).expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let server = run(listener, Arc::new(MemoryProgressStore::new()), queue)
        .await
        .expect("failed to bind address");
    let server_handle = tokio::spawn(server);

    TestApp {
        address: format!("http://{base_address}:{port}"),
        api_client: reqwest::Client::new(),
        server_handle,
    }
}

/// Spawns the API with in-memory backends and returns the queue to inspect it.
pub async fn spawn_test_app() -> (TestApp, Arc<MemoryJobQueue>) {
    let queue = Arc::new(MemoryJobQueue::default());
    let app = spawn_test_app_with_queue(queue.clone()).await;

    (app, queue)
}
