//! shared fixtures for the http-level tests.

#![allow(dead_code)] // not every test file uses every helper

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use bytes::{Buf, BytesMut};
use http_body_util::BodyExt;
use tidescale::broker::Broker;
use tidescale::handlers::MachineKeyContext;
use tidescale::{AppState, create_app};
use tidescale_db::{Repository, TidescaleDb};
use tidescale_proto::{
    CapabilityVersion, MapRequest, MapResponse, RegisterAuth, RegisterRequest, RegisterResponse,
};
use tidescale_types::{
    AuthKey, AuthKeyId, AuthKeyToken, Config, HostInfo, MachineKey, Node, NodeKey, Tailnet,
    TailnetId, User, UserId,
};
use tokio::time::timeout;
use tower::ServiceExt;

/// one server over an in-memory database, with a tailnet and one user.
pub struct TestServer {
    pub db: TidescaleDb,
    pub state: AppState,
    pub app: Router,
    pub tailnet: Tailnet,
    pub user: User,
}

/// a registered client.
pub struct Client {
    pub machine_key: MachineKey,
    pub node_key: NodeKey,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_policy("").await
    }

    /// a server whose tailnet runs `acl_policy`.
    pub async fn with_policy(acl_policy: &str) -> Self {
        let db = TidescaleDb::new_in_memory()
            .await
            .expect("failed to create in-memory database");

        let mut config = Config::default();
        config.default_tailnet = "example".to_string();
        config.server_url = "https://ts.example.com".to_string();
        config.tuning.sync_interval = Duration::from_millis(50);
        config.tuning.session_grace_period = Duration::ZERO;

        let mut tailnet = Tailnet::new(TailnetId(0), "example");
        tailnet.acl_policy = acl_policy.to_string();
        let tailnet = db.create_tailnet(&tailnet).await.unwrap();
        let user = db
            .create_user(&User::new(UserId(0), tailnet.id, "alice@example.com"))
            .await
            .unwrap();

        let broker = Broker::new(config.tuning.session_grace_period);
        let state = AppState::new(db.clone(), config, broker);
        let app = create_app(state.clone());
        Self {
            db,
            state,
            app,
            tailnet,
            user,
        }
    }

    /// store an auth key for the fixture user, after `f` has adjusted it.
    pub async fn auth_key(&self, f: impl FnOnce(&mut AuthKey)) -> AuthKeyToken {
        let token = AuthKeyToken::generate();
        let mut key = AuthKey {
            id: AuthKeyId(0),
            key: token.key().to_string(),
            secret_hash: token.secret_hash().to_vec(),
            tailnet_id: self.tailnet.id,
            user_id: self.user.id,
            ephemeral: false,
            pre_authorized: false,
            tags: vec![],
            expires_at: None,
            created_at: chrono::Utc::now(),
        };
        f(&mut key);
        self.db.create_auth_key(&key).await.unwrap();
        token
    }

    /// post `body` as json from the connection of `machine_key`.
    pub async fn post(
        &self,
        path: &str,
        machine_key: Option<MachineKey>,
        body: &impl serde::Serialize,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(key) = machine_key {
            builder = builder.extension(MachineKeyContext(key));
        }
        let request = builder
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .expect("failed to build request");
        self.app.clone().oneshot(request).await.expect("request failed")
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("failed to build request");
        self.app.clone().oneshot(request).await.expect("request failed")
    }

    /// register a new machine with `token` and return it.
    pub async fn join(&self, hostname: &str, token: &AuthKeyToken) -> Client {
        let client = Client {
            machine_key: MachineKey::random(),
            node_key: NodeKey::random(),
        };
        let req = register_request(client.node_key, hostname, Some(token));
        let response = self.post("/machine/register", Some(client.machine_key), &req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let resp: RegisterResponse = json_body(response).await;
        assert!(resp.machine_authorized);
        client
    }

    /// the stored node of `client`.
    pub async fn node(&self, client: &Client) -> Node {
        self.db
            .get_node_by_machine_key(&client.machine_key)
            .await
            .unwrap()
            .expect("client has no node")
    }

    /// one map poll for `client`. streaming polls return an open body.
    pub async fn map(&self, client: &Client, stream: bool) -> FrameReader {
        let req = MapRequest {
            node_key: client.node_key,
            stream,
            ..Default::default()
        };
        let response = self.post("/machine/map", Some(client.machine_key), &req).await;
        assert_eq!(response.status(), StatusCode::OK);
        FrameReader::new(response.into_body())
    }
}

pub fn register_request(
    node_key: NodeKey,
    hostname: &str,
    token: Option<&AuthKeyToken>,
) -> RegisterRequest {
    RegisterRequest {
        version: CapabilityVersion::CURRENT,
        node_key,
        auth: token.map(|t| RegisterAuth {
            auth_key: t.to_string(),
        }),
        hostinfo: Some(HostInfo {
            hostname: Some(hostname.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn json_body<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("body is not the expected json")
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// reads length-prefixed map frames off a response body.
pub struct FrameReader {
    body: Body,
    buf: BytesMut,
}

impl FrameReader {
    pub fn new(body: Body) -> Self {
        Self {
            body,
            buf: BytesMut::new(),
        }
    }

    /// the next frame, or `None` once the body has ended.
    pub async fn next(&mut self) -> Option<MapResponse> {
        loop {
            if let Some(frame) = self.take_frame() {
                return Some(frame);
            }
            let frame = timeout(Duration::from_secs(3), self.body.frame())
                .await
                .expect("timed out waiting for a map frame")?
                .expect("body error");
            if let Ok(data) = frame.into_data() {
                self.buf.extend_from_slice(&data);
            }
        }
    }

    /// skip frames until one satisfies `pred`.
    pub async fn next_matching(&mut self, pred: impl Fn(&MapResponse) -> bool) -> MapResponse {
        loop {
            let frame = self.next().await.expect("stream ended");
            if pred(&frame) {
                return frame;
            }
        }
    }

    fn take_frame(&mut self) -> Option<MapResponse> {
        if self.buf.len() < 4 {
            return None;
        }
        let len = (&self.buf[..4]).get_u32_le() as usize;
        if self.buf.len() < 4 + len {
            return None;
        }
        self.buf.advance(4);
        let payload = self.buf.split_to(len);
        Some(serde_json::from_slice(&payload).expect("frame is not a map response"))
    }
}

/// poll `done` until it holds, failing after a few seconds.
pub async fn wait_until<F, Fut>(mut done: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(Duration::from_secs(3), async {
        while !done().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}
