use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use aviary_gateway::{build_gateway_router, AppState, GatewayConfig, KEY_HEADER, LOGIN_HEADER};
use aviary_roster::{AccountLinker, LinkReply, LinkStatus, LinkerError, PlayerIdentity};
use aviary_supervisor::SupervisorConfig;

const ADMIN: (&str, &str) = ("warden", "warden-key");

/// Collaborator double whose verdicts are keyed by the target uid prefix:
/// `reject-*` refuses establishment, `ghost-*` reports the relationship
/// absent on dissolution, `keep-*` refuses dissolution, everything else is
/// confirmed.
struct ScriptedLinker {
    calls: AtomicUsize,
}

impl ScriptedLinker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountLinker for ScriptedLinker {
    async fn authenticate(
        &self,
        _account_uid: &str,
        _credential: &str,
    ) -> Result<String, LinkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("session-token".to_string())
    }

    async fn establish_relationship(
        &self,
        _session_token: &str,
        target_uid: &str,
    ) -> Result<LinkReply, LinkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if target_uid.starts_with("reject-") {
            Ok(LinkReply {
                status: LinkStatus::Rejected,
                message: "friend list is full".to_string(),
            })
        } else {
            Ok(LinkReply {
                status: LinkStatus::Confirmed,
                message: "friend request accepted".to_string(),
            })
        }
    }

    async fn dissolve_relationship(
        &self,
        _session_token: &str,
        target_uid: &str,
    ) -> Result<LinkReply, LinkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if target_uid.starts_with("ghost-") {
            Ok(LinkReply {
                status: LinkStatus::NotFound,
                message: "relationship not found".to_string(),
            })
        } else if target_uid.starts_with("keep-") {
            Ok(LinkReply {
                status: LinkStatus::Rejected,
                message: "provider busy, retry later".to_string(),
            })
        } else {
            Ok(LinkReply {
                status: LinkStatus::Confirmed,
                message: "friend removed".to_string(),
            })
        }
    }

    async fn resolve_identity(&self, _target_uid: &str) -> Result<PlayerIdentity, LinkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PlayerIdentity {
            name: "Falcon".to_string(),
            region: "ME".to_string(),
            level: "61".to_string(),
        })
    }
}

/// Boots the full gateway on an ephemeral port and returns its base URL
/// plus the shared state for direct store assertions.
async fn spawn_gateway(
    tempdir: &tempfile::TempDir,
    linker: Arc<ScriptedLinker>,
) -> (String, Arc<AppState>) {
    let template_dir = tempdir.path().join("template");
    std::fs::create_dir_all(&template_dir).expect("template dir");
    std::fs::write(template_dir.join("run.sh"), "sleep 30\n").expect("entry point");

    let config = GatewayConfig {
        bind: "127.0.0.1:0".parse().expect("bind addr"),
        state_dir: tempdir.path().join("state"),
        template_dir,
        admin_login: ADMIN.0.to_string(),
        admin_key: ADMIN.1.to_string(),
    };
    let supervisor_config = SupervisorConfig {
        entry_point: "run.sh".to_string(),
        launcher: Some("sh".to_string()),
        start_grace: Duration::from_millis(150),
        stop_timeout: Duration::from_secs(1),
    };
    let state = Arc::new(AppState::new(config, supervisor_config, linker));
    state.bootstrap_admin().expect("bootstrap admin");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let router = build_gateway_router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve gateway");
    });
    (format!("http://{addr}"), state)
}

async fn api_post(base: &str, path: &str, auth: (&str, &str), body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .header(LOGIN_HEADER, auth.0)
        .header(KEY_HEADER, auth.1)
        .json(&body)
        .send()
        .await
        .expect("post request");
    let status = response.status().as_u16();
    (status, response.json().await.expect("json body"))
}

async fn api_get(base: &str, path: &str, auth: (&str, &str)) -> (u16, Value) {
    let response = reqwest::Client::new()
        .get(format!("{base}{path}"))
        .header(LOGIN_HEADER, auth.0)
        .header(KEY_HEADER, auth.1)
        .send()
        .await
        .expect("get request");
    let status = response.status().as_u16();
    (status, response.json().await.expect("json body"))
}

async fn api_delete(base: &str, path: &str, auth: (&str, &str)) -> (u16, Value) {
    let response = reqwest::Client::new()
        .delete(format!("{base}{path}"))
        .header(LOGIN_HEADER, auth.0)
        .header(KEY_HEADER, auth.1)
        .send()
        .await
        .expect("delete request");
    let status = response.status().as_u16();
    (status, response.json().await.expect("json body"))
}

async fn create_tenant(base: &str, login: &str, key: &str, max_bots: u64) {
    let (status, body) = api_post(
        base,
        "/api/tenants",
        ADMIN,
        json!({ "login": login, "key": key, "max_bots": max_bots, "lease_days": 30 }),
    )
    .await;
    assert_eq!(status, 200, "tenant create failed: {body}");
}

async fn create_bot(base: &str, auth: (&str, &str), account_uid: &str) -> (u16, Value) {
    api_post(
        base,
        "/api/bots",
        auth,
        json!({
            "account_uid": account_uid,
            "account_credential": "secret",
            "name": "scout",
            "display_name": "Scout",
        }),
    )
    .await
}

#[cfg(unix)]
#[tokio::test]
async fn integration_bot_lifecycle_round_trip_over_http() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let (base, _state) = spawn_gateway(&tempdir, ScriptedLinker::new()).await;
    create_tenant(&base, "alice", "alice-key", 2).await;
    let alice = ("alice", "alice-key");

    let (status, body) = create_bot(&base, alice, "acct-a").await;
    assert_eq!(status, 200, "bot create failed: {body}");
    let bot_id = body["bot"]["id"].as_u64().expect("bot id");
    assert_eq!(body["bot"]["status"], "stopped");

    let (status, body) = api_post(&base, &format!("/api/bots/{bot_id}/start"), alice, json!({})).await;
    assert_eq!(status, 200, "start failed: {body}");
    assert_eq!(body["status"], "running");
    let first_pid = body["pid"].as_u64().expect("pid after start");

    let (status, body) = api_get(&base, &format!("/api/bots/{bot_id}"), alice).await;
    assert_eq!(status, 200);
    assert_eq!(body["bot"]["status"], "running");
    assert_eq!(body["players"], json!([]));

    let (status, body) = api_post(&base, &format!("/api/bots/{bot_id}/restart"), alice, json!({})).await;
    assert_eq!(status, 200, "restart failed: {body}");
    let second_pid = body["pid"].as_u64().expect("pid after restart");
    assert_ne!(first_pid, second_pid);

    let (status, body) = api_post(&base, &format!("/api/bots/{bot_id}/stop"), alice, json!({})).await;
    assert_eq!(status, 200, "stop failed: {body}");
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["pid"], Value::Null);

    let (status, body) = api_delete(&base, &format!("/api/bots/{bot_id}"), alice).await;
    assert_eq!(status, 200, "delete failed: {body}");
    let (status, _body) = api_get(&base, &format!("/api/bots/{bot_id}"), alice).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn integration_quota_rejects_then_admits_after_delete() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let (base, _state) = spawn_gateway(&tempdir, ScriptedLinker::new()).await;
    create_tenant(&base, "bob", "bob-key", 1).await;
    let bob = ("bob", "bob-key");

    let (status, body) = create_bot(&base, bob, "acct-a").await;
    assert_eq!(status, 200, "first create failed: {body}");
    let bot_id = body["bot"]["id"].as_u64().expect("bot id");

    let (status, body) = create_bot(&base, bob, "acct-b").await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "quota_exceeded");

    let (status, _body) = api_delete(&base, &format!("/api/bots/{bot_id}"), bob).await;
    assert_eq!(status, 200);

    let (status, body) = create_bot(&base, bob, "acct-b").await;
    assert_eq!(status, 200, "create after delete failed: {body}");
}

#[tokio::test]
async fn integration_roster_reconciliation_over_http() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let linker = ScriptedLinker::new();
    let (base, state) = spawn_gateway(&tempdir, Arc::clone(&linker)).await;
    create_tenant(&base, "carol", "carol-key", 1).await;
    let carol = ("carol", "carol-key");

    let (status, body) = create_bot(&base, carol, "acct-c").await;
    assert_eq!(status, 200, "bot create failed: {body}");
    let bot_id = body["bot"]["id"].as_u64().expect("bot id");

    let (status, body) = api_post(
        &base,
        &format!("/api/bots/{bot_id}/players"),
        carol,
        json!({ "player_uid": "target-1", "duration": "7d" }),
    )
    .await;
    assert_eq!(status, 200, "add failed: {body}");
    assert_eq!(body["player"]["name"], "Falcon");
    let players = state.store.load_players();
    assert_eq!(players.len(), 1);
    assert_eq!(
        players[0].expires_at - players[0].added_at,
        chrono::Duration::days(7)
    );

    // A malformed duration must be refused before any collaborator call.
    let calls_before = linker.call_count();
    let (status, body) = api_post(
        &base,
        &format!("/api/bots/{bot_id}/players"),
        carol,
        json!({ "player_uid": "target-2", "duration": "x" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_input");
    assert_eq!(linker.call_count(), calls_before);

    let (status, body) = api_post(
        &base,
        &format!("/api/bots/{bot_id}/players/bulk-add"),
        carol,
        json!({ "players": ["ghost-2", "reject-3", "keep-4"], "duration": "1d" }),
    )
    .await;
    assert_eq!(status, 200, "bulk add failed: {body}");
    assert_eq!(body["added"].as_array().expect("added").len(), 2);
    assert_eq!(body["failed"].as_array().expect("failed").len(), 1);
    assert_eq!(body["failed"][0]["uid"], "reject-3");
    assert_eq!(body["failed"][0]["message"], "friend list is full");

    let (status, body) = api_get(
        &base,
        &format!("/api/bots/{bot_id}/players/ghost-2"),
        carol,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["is_added"], true);

    // Dissolution reported as not-found still deletes the local record.
    let ghost_id = state
        .store
        .load_players()
        .iter()
        .find(|player| player.uid == "ghost-2")
        .map(|player| player.id)
        .expect("ghost entry persisted");
    let (status, body) = api_delete(&base, &format!("/api/players/{ghost_id}"), carol).await;
    assert_eq!(status, 200, "ghost remove failed: {body}");
    assert!(state
        .store
        .load_players()
        .iter()
        .all(|player| player.uid != "ghost-2"));

    // A refused dissolution keeps the record and surfaces the message.
    let keep_id = state
        .store
        .load_players()
        .iter()
        .find(|player| player.uid == "keep-4")
        .map(|player| player.id)
        .expect("keep entry persisted");
    let (status, body) = api_delete(&base, &format!("/api/players/{keep_id}"), carol).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["message"], "provider busy, retry later");
    assert!(state
        .store
        .load_players()
        .iter()
        .any(|player| player.uid == "keep-4"));
}

#[tokio::test]
async fn integration_status_and_friend_compat_surfaces() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let (base, _state) = spawn_gateway(&tempdir, ScriptedLinker::new()).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/api/status"))
        .send()
        .await
        .expect("status request");
    let body: Value = response.json().await.expect("status body");
    assert_eq!(body["status"], "success");
    assert_eq!(body["store_health"]["corrupt_collections"], json!({}));

    let response = reqwest::Client::new()
        .get(format!("{base}/friend/token?uid=acct-1&password=secret"))
        .send()
        .await
        .expect("token request");
    let body: Value = response.json().await.expect("token body");
    assert_eq!(body["status"], "success");
    assert_eq!(body["token"], "session-token");

    let response = reqwest::Client::new()
        .get(format!(
            "{base}/friend/add?uid=acct-1&password=secret&target=target-1"
        ))
        .send()
        .await
        .expect("friend add request");
    let body: Value = response.json().await.expect("friend add body");
    assert_eq!(body["status"], "success");
    assert_eq!(body["player_info"]["name"], "Falcon");

    let response = reqwest::Client::new()
        .get(format!("{base}/friend/info?target=target-1"))
        .send()
        .await
        .expect("friend info request");
    let body: Value = response.json().await.expect("friend info body");
    assert_eq!(body["status"], "success");
    assert_eq!(body["player_info"]["region"], "ME");

    let response = reqwest::Client::new()
        .get(format!("{base}/friend/add?uid=acct-1"))
        .send()
        .await
        .expect("partial friend add request");
    let body: Value = response.json().await.expect("partial friend add body");
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn integration_requests_without_credentials_are_refused() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let (base, _state) = spawn_gateway(&tempdir, ScriptedLinker::new()).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/api/bots"))
        .send()
        .await
        .expect("unauthenticated request");
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.expect("error body");
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, body) = api_get(&base, "/api/tenants", ("alice", "wrong")).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthorized");
}
