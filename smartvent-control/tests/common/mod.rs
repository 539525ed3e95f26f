#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_body_util::BodyExt;
use smartvent_control::{Advisory, ControlClient, StateStore};
use smartvent_proto::{CONTROL_PATH, DeviceState, STATUS_PATH, ServerAddress, ThresholdSet};
use tokio::sync::mpsc;

pub type HttpResponse =
    hyper::Response<http_body_util::combinators::BoxBody<hyper::body::Bytes, std::io::Error>>;

/// How the fake device answers
#[derive(Debug, Clone)]
pub struct Script {
    /// Delay before answering a status read; the state is captured on arrival
    pub status_delay: Duration,
    /// Delay before a control request is applied and answered
    pub control_delay: Duration,
    /// Answer control requests with this HTTP status instead
    pub control_status: Option<u16>,
    pub include_state: bool,
    pub success: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            status_delay: Duration::ZERO,
            control_delay: Duration::ZERO,
            control_status: None,
            include_state: true,
            success: true,
        }
    }
}

struct Shared {
    state: Mutex<DeviceState>,
    script: Mutex<Script>,
    control_bodies: Mutex<Vec<serde_json::Value>>,
    status_hits: AtomicUsize,
}

/// In-process stand-in for the vent's HTTP control plane
pub struct FakeDevice {
    pub addr: SocketAddr,
    shared: Arc<Shared>,
}

pub fn closed_state() -> DeviceState {
    DeviceState {
        is_open: false,
        temperature: 22.5,
        aqi: 35,
        target_angle: 0,
        auto_mode: true,
        safety_lockout: false,
        current_load: 120.0,
        thresholds: ThresholdSet {
            temp_max: Some(26.0),
            temp_min: Some(18.0),
            aqi_max: Some(100),
            aqi_min: Some(20),
        },
    }
}

impl FakeDevice {
    pub async fn spawn(state: DeviceState) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            script: Mutex::new(Script::default()),
            control_bodies: Mutex::new(Vec::new()),
            status_hits: AtomicUsize::new(0),
        });
        tokio::spawn(run_server(listener, shared.clone()));
        Self { addr, shared }
    }

    pub fn script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.shared.script.lock().unwrap());
    }

    pub fn client(&self) -> (ControlClient, mpsc::UnboundedReceiver<Advisory>) {
        let address: ServerAddress = self.addr.ip().to_string().parse().unwrap();
        let (client, advisories) = ControlClient::new(address, StateStore::new());
        (client.with_port(self.addr.port()), advisories)
    }

    pub fn control_bodies(&self) -> Vec<serde_json::Value> {
        self.shared.control_bodies.lock().unwrap().clone()
    }

    pub fn status_hits(&self) -> usize {
        self.shared.status_hits.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> DeviceState {
        self.shared.state.lock().unwrap().clone()
    }
}

async fn run_server(listener: tokio::net::TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::task::spawn(handle_connection(stream, shared.clone()));
            }
            Err(e) => {
                eprintln!("failed to accept: {e:?}");
                continue;
            }
        }
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, shared: Arc<Shared>) {
    let io = hyper_util::rt::TokioIo::new(stream);
    let builder =
        hyper_util::server::conn::auto::Builder::new(hyper_util::rt::tokio::TokioExecutor::new());
    if let Err(e) = builder
        .serve_connection(
            io,
            hyper::service::service_fn(|r| handle_request(r, shared.clone())),
        )
        .await
    {
        eprintln!("connection error: {e:?}");
    }
}

async fn handle_request(
    r: hyper::Request<hyper::body::Incoming>,
    shared: Arc<Shared>,
) -> Result<HttpResponse, std::io::Error> {
    let script = shared.script.lock().unwrap().clone();
    let path = r.uri().path().to_string();
    match (r.method().clone(), path.as_str()) {
        (hyper::Method::GET, STATUS_PATH) => {
            shared.status_hits.fetch_add(1, Ordering::SeqCst);
            let snapshot = shared.state.lock().unwrap().clone();
            tokio::time::sleep(script.status_delay).await;
            json(&snapshot)
        }
        (hyper::Method::POST, CONTROL_PATH) => {
            let bytes = r.into_body().collect().await.unwrap().to_bytes();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            shared.control_bodies.lock().unwrap().push(body.clone());

            tokio::time::sleep(script.control_delay).await;
            if let Some(status) = script.control_status {
                return bytes_to_resp(
                    b"internal error".to_vec(),
                    hyper::StatusCode::from_u16(status).unwrap(),
                );
            }

            let state = {
                let mut state = shared.state.lock().unwrap();
                apply(&mut state, &body);
                state.clone()
            };
            let mut reply = serde_json::json!({ "success": script.success });
            if script.include_state {
                reply["state"] = serde_json::to_value(&state).unwrap();
            }
            json(&reply)
        }
        (_, path) => bytes_to_resp(
            format!("not found: {path}").into_bytes(),
            hyper::StatusCode::NOT_FOUND,
        ),
    }
}

/// Roughly what the firmware does with a control body
fn apply(state: &mut DeviceState, body: &serde_json::Value) {
    if let Some(action) = body["action"].as_str() {
        state.target_angle = if action == "open" { 90 } else { 0 };
    }
    if let Some(angle) = body["angle"].as_i64() {
        state.target_angle = angle.clamp(0, 90) as i32;
    }
    if let Some(auto) = body["autoMode"].as_bool() {
        state.auto_mode = auto;
    }
    if body["resetSafety"].as_bool() == Some(true) {
        state.safety_lockout = false;
    }
    if let Some(v) = body["tMax"].as_f64() {
        state.thresholds.temp_max = Some(v);
    }
    if let Some(v) = body["tMin"].as_f64() {
        state.thresholds.temp_min = Some(v);
    }
    if let Some(v) = body["aqiMax"].as_i64() {
        state.thresholds.aqi_max = Some(v as i32);
    }
    if let Some(v) = body["aqiMin"].as_i64() {
        state.thresholds.aqi_min = Some(v as i32);
    }
    state.is_open = state.target_angle > 0;
}

fn json<T: serde::Serialize>(o: &T) -> Result<HttpResponse, std::io::Error> {
    bytes_to_resp(serde_json::to_vec(o).unwrap(), hyper::StatusCode::OK)
}

fn bytes_to_resp(
    bytes: Vec<u8>,
    status: hyper::StatusCode,
) -> Result<HttpResponse, std::io::Error> {
    let mut r = hyper::Response::new(
        http_body_util::Full::new(hyper::body::Bytes::from(bytes))
            .map_err(|e| match e {})
            .boxed(),
    );
    *r.status_mut() = status;
    Ok(r)
}
