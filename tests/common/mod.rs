//! Shared integration-test harness: an in-process mock server on an
//! ephemeral port, and helpers for running the `mockgate` binary.

#![allow(dead_code)]

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use mockgate::config::{MockConfig, UnhandledPolicy};
use mockgate::dispatch::ScenarioDispatcher;
use mockgate::fixtures::FixtureStore;
use mockgate::scenarios;
use mockgate::server::MockServer;

/// Startup timeout for a spawned binary.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// A bound in-process server with the full scenario catalogue attached.
pub struct TestServer {
    pub server: Arc<MockServer>,
    pub dispatcher: Arc<ScenarioDispatcher>,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Binds on `127.0.0.1:0` with the given policies.
    pub async fn start(unhandled: UnhandledPolicy, strict: bool) -> Self {
        let config = MockConfig {
            unhandled,
            strict_scenarios: strict,
            ..MockConfig::for_tests()
        };
        let server = Arc::new(MockServer::create(&config).await.expect("bind"));
        let dispatcher = ScenarioDispatcher::new(
            Arc::clone(&server),
            Arc::new(scenarios::registry().expect("registry")),
            Arc::new(FixtureStore::embedded().expect("fixtures")),
            strict,
        );
        let base_url = server.base_url().expect("bound server has a base url");
        Self {
            server,
            dispatcher,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Default policies: unhandled is an error, unknown ids fall back.
    pub async fn start_default() -> Self {
        Self::start(UnhandledPolicy::Error, false).await
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn get_json(&self, path: &str) -> Value {
        let resp = self.get(path).await;
        assert!(resp.status().is_success(), "GET {path} -> {}", resp.status());
        resp.json().await.expect("JSON body")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST failed")
    }

    /// Selects a scenario through the control route.
    pub async fn navigate(&self, url: &str) -> reqwest::Response {
        self.post_json("/__mockgate/dispatch", &json!({ "url": url }))
            .await
    }

    pub async fn shutdown(self) {
        self.server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.server.closed())
            .await
            .expect("server did not stop");
    }
}

/// Runs the binary to completion with `args`.
pub fn run_command(args: &[&str]) -> std::process::Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_mockgate"))
        .args(args)
        .env_remove("MOCKGATE_FIXTURES")
        .env_remove("MOCKGATE_LOG_LEVEL")
        .output()
        .expect("failed to run mockgate")
}

/// A `mockgate serve` child process.
///
/// The child is killed on drop.
pub struct ServeProcess {
    child: Child,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl ServeProcess {
    /// Spawns `mockgate serve --bind 127.0.0.1:0 <extra>` and waits for the
    /// listening line on stderr.
    pub async fn spawn(extra: &[&str]) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_mockgate"))
            .args(["serve", "--bind", "127.0.0.1:0", "-v", "--color", "never"])
            .args(extra)
            .env_remove("MOCKGATE_LOG_LEVEL")
            .env_remove("MOCKGATE_LOG_FORMAT")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn mockgate");

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        let mut port: Option<u16> = None;

        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            line.clear();
            let n = tokio::time::timeout(STARTUP_TIMEOUT, reader.read_line(&mut line))
                .await
                .expect("timed out waiting for startup")
                .expect("failed to read stderr");
            assert!(n > 0, "mockgate exited before it was ready");

            if line.contains("mock server ready")
                && let Some(start) = line.find("127.0.0.1:")
            {
                let digits: String = line[start + "127.0.0.1:".len()..]
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                port = digits.parse().ok();
                break;
            }
        }

        // Keep draining stderr so the child never blocks on a full pipe.
        tokio::spawn(async move {
            let mut sink = String::new();
            while reader.read_line(&mut sink).await.is_ok_and(|n| n > 0) {
                sink.clear();
            }
        });

        let port = port.expect("failed to discover the bound port");
        Self {
            child,
            base_url: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    #[cfg(unix)]
    pub fn terminate(&self) {
        if let Some(pid) = self.child.id() {
            let _ = std::process::Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status();
        }
    }

    pub async fn wait(&mut self) -> std::process::ExitStatus {
        tokio::time::timeout(Duration::from_secs(10), self.child.wait())
            .await
            .expect("mockgate did not exit")
            .expect("wait failed")
    }
}
