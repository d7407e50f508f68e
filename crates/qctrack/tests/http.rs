//! End-to-end tests driving the real router over a loopback socket.

use qctrack::equipment::EquipmentStatus;
use qctrack::user::{hash_password, Role};
use qctrack::web::{self, AppState};
use qctrack::{Config, Storage};
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const ADMIN: (&str, &str) = ("boss", "boss-password");
const TECH: (&str, &str) = ("tech", "tech-password");

struct TestServer {
    base_url: String,
    client: Client,
    state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl TestServer {
    async fn start() -> Self {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .create_user(ADMIN.0, &hash_password(ADMIN.1, 4).unwrap(), Role::Admin)
            .unwrap();
        storage
            .create_user(TECH.0, &hash_password(TECH.1, 4).unwrap(), Role::User)
            .unwrap();

        let mut config = Config::default();
        config.auth.bcrypt_cost = 4;
        let state = AppState::new(storage, config).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(web::serve(listener, state.clone(), async move {
            let _ = shutdown_rx.await;
        }));

        let client = Client::builder().redirect(Policy::none()).build().unwrap();
        Self {
            base_url,
            client,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in and return the `Cookie` header value for the session.
    async fn login(&self, (username, password): (&str, &str)) -> String {
        let response = self
            .client
            .post(self.url("/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/");

        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn get(&self, path: &str, cookie: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(COOKIE, cookie)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, cookie: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(COOKIE, cookie)
            .form(form)
            .send()
            .await
            .unwrap()
    }

    async fn register(&self, cookie: &str, equipment_type: &str, model: &str, serial: &str) -> i64 {
        let response = self
            .post(
                "/equipment",
                cookie,
                &[
                    ("equipment_type", equipment_type),
                    ("model", model),
                    ("serial", serial),
                ],
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        self.state
            .with_storage(|storage| storage.get_equipment_by_serial(serial))
            .unwrap()
            .expect("registered equipment")
            .id
    }

    async fn record(&self, cookie: &str, id: i64, outcome: &str) -> reqwest::Response {
        self.post(
            &format!("/equipment/{id}/tests"),
            cookie,
            &[
                ("outcome", outcome),
                ("speed_mbps", "940"),
                ("signal_dbm", "-19,5"),
                ("observations", ""),
            ],
        )
        .await
    }
}

#[tokio::test]
async fn test_healthz_and_login_redirect() {
    let server = TestServer::start().await;

    let health = server.client.get(server.url("/healthz")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "ok");

    let index = server.client.get(server.url("/")).send().await.unwrap();
    assert_eq!(index.status(), StatusCode::SEE_OTHER);
    assert_eq!(index.headers()[LOCATION], "/login");

    let login_page = server.client.get(server.url("/login")).send().await.unwrap();
    assert_eq!(login_page.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_failed_login_is_rejected_and_logged() {
    let server = TestServer::start().await;

    let response = server
        .client
        .post(server.url("/login"))
        .form(&[("username", TECH.0), ("password", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SET_COOKIE).is_none());
    assert!(response.text().await.unwrap().contains("Invalid username or password"));

    let activity = server
        .state
        .with_storage(|storage| storage.recent_activity(10))
        .unwrap();
    assert_eq!(activity[0].action.as_str(), "login_failed");
}

#[tokio::test]
async fn test_submitting_a_test_creates_exactly_one_record() {
    let server = TestServer::start().await;
    let cookie = server.login(TECH).await;

    let id = server.register(&cookie, "ONU", "HG8245H", "aa-bb-cc-dd-ee-ff").await;
    let response = server.record(&cookie, id, "pass").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let (equipment, tests) = server
        .state
        .with_storage(|storage| Ok((storage.get_equipment(id)?, storage.tests_for(id)?)))
        .unwrap();
    let equipment = equipment.unwrap();
    assert_eq!(equipment.serial, "AA:BB:CC:DD:EE:FF");
    assert_eq!(equipment.status, EquipmentStatus::Passed);
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].speed_mbps, Some(940.0));
    assert_eq!(tests[0].signal_dbm, Some(-19.5));
    assert_eq!(tests[0].tested_by.as_deref(), Some(TECH.0));

    // The flash from the redirect shows once
    let page = server.get("/?tab=tested", &cookie).await.text().await.unwrap();
    assert!(page.contains("AA:BB:CC:DD:EE:FF"));
    assert!(page.contains("class=\"flash flash-success\""));
    let again = server.get("/?tab=tested", &cookie).await.text().await.unwrap();
    assert!(!again.contains("class=\"flash flash-success\""));
}

#[tokio::test]
async fn test_invalid_test_input_records_nothing() {
    let server = TestServer::start().await;
    let cookie = server.login(TECH).await;
    let id = server.register(&cookie, "Router", "Archer C6", "TPL0001").await;

    let response = server
        .post(
            &format!("/equipment/{id}/tests"),
            &cookie,
            &[("outcome", "pass"), ("speed_mbps", "fast"), ("signal_dbm", "")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let tests = server
        .state
        .with_storage(|storage| storage.tests_for(id))
        .unwrap();
    assert!(tests.is_empty());

    let page = server.get("/", &cookie).await.text().await.unwrap();
    assert!(page.contains("class=\"flash flash-danger\""));
}

#[tokio::test]
async fn test_reregistering_flags_without_duplicating() {
    let server = TestServer::start().await;
    let cookie = server.login(TECH).await;

    let first = server.register(&cookie, "ONU", "F601", "ZTEG0001").await;
    server.record(&cookie, first, "fail").await;
    let second = server.register(&cookie, "ONU", "F601", " zteg0001 ").await;
    assert_eq!(first, second);

    let all = server
        .state
        .with_storage(|storage| storage.list_equipment())
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, EquipmentStatus::AwaitingTest);
    assert_eq!(all[0].test_count, 1);
}

#[tokio::test]
async fn test_admin_pages_require_admin_role() {
    let server = TestServer::start().await;

    let tech = server.login(TECH).await;
    assert_eq!(
        server.get("/admin/users", &tech).await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        server.get("/admin/activity", &tech).await.status(),
        StatusCode::FORBIDDEN
    );
    let denied = server
        .post(
            "/admin/users",
            &tech,
            &[("username", "intruder"), ("password", "x"), ("role", "admin")],
        )
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let admin = server.login(ADMIN).await;
    let users = server.get("/admin/users", &admin).await;
    assert_eq!(users.status(), StatusCode::OK);
    let body = users.text().await.unwrap();
    assert!(body.contains(TECH.0));
    assert!(!body.contains("intruder"));
}

#[tokio::test]
async fn test_admin_user_management() {
    let server = TestServer::start().await;
    let admin = server.login(ADMIN).await;

    let created = server
        .post(
            "/admin/users",
            &admin,
            &[("username", "maria"), ("password", "pw-maria"), ("role", "user")],
        )
        .await;
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    server.login(("maria", "pw-maria")).await;

    let (maria, boss) = server
        .state
        .with_storage(|storage| {
            Ok((
                storage.get_user_by_username("maria")?.unwrap(),
                storage.get_user_by_username(ADMIN.0)?.unwrap(),
            ))
        })
        .unwrap();

    // Administrators cannot be deleted
    server
        .post(&format!("/admin/users/{}/delete", boss.id), &admin, &[])
        .await;
    server
        .post(&format!("/admin/users/{}/delete", maria.id), &admin, &[])
        .await;

    let remaining = server
        .state
        .with_storage(|storage| storage.list_users())
        .unwrap();
    let names: Vec<&str> = remaining.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec![ADMIN.0, TECH.0]);
}

#[tokio::test]
async fn test_search_pdf_export_matches_record_count() {
    let server = TestServer::start().await;
    let cookie = server.login(TECH).await;

    let a = server.register(&cookie, "ONU", "HG8245H", "HWTC0001").await;
    let b = server.register(&cookie, "ONU", "HG8245H", "HWTC0002").await;
    server.register(&cookie, "Router", "Archer C6", "TPL0003").await;
    server.record(&cookie, a, "fail").await;
    server.record(&cookie, b, "pass").await;

    let response = server.get("/export/search.pdf?q=hg8245", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/pdf");
    assert_eq!(response.headers()["x-record-count"], "2");
    let body = response.bytes().await.unwrap();
    assert!(body.starts_with(b"%PDF"));

    let failed = server.get("/export/search.pdf?status=failed", &cookie).await;
    assert_eq!(failed.headers()["x-record-count"], "1");

    let printable = server.get("/export/search.html?q=TPL", &cookie).await;
    assert_eq!(printable.status(), StatusCode::OK);
    assert!(printable.text().await.unwrap().contains("TPL0003"));
}

#[tokio::test]
async fn test_history_and_delete() {
    let server = TestServer::start().await;
    let cookie = server.login(TECH).await;
    let id = server.register(&cookie, "ONU", "F670L", "ZTEG0042").await;
    server.record(&cookie, id, "fail").await;
    server.record(&cookie, id, "pass").await;

    let history = server.get(&format!("/equipment/{id}/history"), &cookie).await;
    assert_eq!(history.status(), StatusCode::OK);
    assert!(history.text().await.unwrap().contains("ZTEG0042"));

    let pdf = server
        .get(&format!("/equipment/{id}/history.pdf"), &cookie)
        .await;
    assert_eq!(pdf.headers()["x-record-count"], "2");

    let deleted = server
        .post(&format!("/equipment/{id}/delete"), &cookie, &[])
        .await;
    assert_eq!(deleted.status(), StatusCode::SEE_OTHER);
    assert_eq!(deleted.headers()[LOCATION], "/search");

    let missing = server.get(&format!("/equipment/{id}/history"), &cookie).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(missing.text().await.unwrap().contains("404"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let server = TestServer::start().await;
    let cookie = server.login(TECH).await;
    assert_eq!(server.get("/", &cookie).await.status(), StatusCode::OK);

    let logout = server.get("/logout", &cookie).await;
    assert_eq!(logout.status(), StatusCode::SEE_OTHER);
    assert_eq!(logout.headers()[LOCATION], "/login?logged_out=1");

    let after = server.get("/", &cookie).await;
    assert_eq!(after.status(), StatusCode::SEE_OTHER);
    assert_eq!(after.headers()[LOCATION], "/login");
}

#[tokio::test]
async fn test_search_page_lists_matches() {
    let server = TestServer::start().await;
    let cookie = server.login(TECH).await;
    server.register(&cookie, "ONU", "HG8245H", "HWTC0001").await;
    server.register(&cookie, "Router", "Archer C6", "TPL0003").await;
    // Consume the registration flash
    server.get("/", &cookie).await;

    let response = server.get("/search?q=hwtc&status=awaiting_test", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("HWTC0001"));
    assert!(!body.contains("TPL0003"));

    let everything = server.get("/search", &cookie).await.text().await.unwrap();
    assert!(everything.contains("HWTC0001") && everything.contains("TPL0003"));
}

#[tokio::test]
async fn test_non_numeric_id_is_not_found() {
    let server = TestServer::start().await;
    let admin = server.login(ADMIN).await;

    let history = server.get("/equipment/abc/history", &admin).await;
    assert_eq!(history.status(), StatusCode::NOT_FOUND);
    assert!(history.text().await.unwrap().contains("404"));

    let pdf = server.get("/equipment/abc/history.pdf", &admin).await;
    assert_eq!(pdf.status(), StatusCode::NOT_FOUND);

    let delete = server.post("/admin/users/x1/delete", &admin, &[]).await;
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_activity_page_highlights_administrative_actions() {
    let server = TestServer::start().await;
    let admin = server.login(ADMIN).await;
    server
        .post(
            "/admin/users",
            &admin,
            &[("username", "maria"), ("password", "pw-maria"), ("role", "user")],
        )
        .await;

    let response = server.get("/admin/activity", &admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("user_created"));
    assert!(body.contains("maria (user)"));
    assert_eq!(body.matches("class=\"activity-admin\"").count(), 1);
}

#[tokio::test]
async fn test_password_reset_ends_sessions() {
    let server = TestServer::start().await;
    let admin = server.login(ADMIN).await;
    let tech = server.login(TECH).await;
    let (tech_id, boss_id) = server
        .state
        .with_storage(|storage| {
            Ok((
                storage.get_user_by_username(TECH.0)?.unwrap().id,
                storage.get_user_by_username(ADMIN.0)?.unwrap().id,
            ))
        })
        .unwrap();

    let reset = server
        .post(
            &format!("/admin/users/{tech_id}/password"),
            &admin,
            &[("password", "new-tech-password")],
        )
        .await;
    assert_eq!(reset.status(), StatusCode::SEE_OTHER);
    assert_eq!(reset.headers()[LOCATION], "/admin/users");

    let stale = server.get("/", &tech).await;
    assert_eq!(stale.status(), StatusCode::SEE_OTHER);
    assert_eq!(stale.headers()[LOCATION], "/login");

    let old_password = server
        .client
        .post(server.url("/login"))
        .form(&[("username", TECH.0), ("password", TECH.1)])
        .send()
        .await
        .unwrap();
    assert_eq!(old_password.status(), StatusCode::UNAUTHORIZED);
    server.login((TECH.0, "new-tech-password")).await;

    // Resetting one's own password sends the admin back to the login page
    let own = server
        .post(
            &format!("/admin/users/{boss_id}/password"),
            &admin,
            &[("password", "new-boss-password")],
        )
        .await;
    assert_eq!(own.status(), StatusCode::SEE_OTHER);
    assert_eq!(own.headers()[LOCATION], "/login");
    assert_eq!(
        server.get("/admin/users", &admin).await.headers()[LOCATION],
        "/login"
    );
}
