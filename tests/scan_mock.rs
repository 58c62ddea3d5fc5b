use assert_cmd::Command;
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mock_session(server: &MockServer) -> serde_json::Value {
    json!({
        "capabilities": {
            "urn:ietf:params:jmap:core": {},
            "urn:ietf:params:jmap:mail": {}
        },
        "accounts": {"A": {"name": "mock", "isPersonal": true, "isReadOnly": false}},
        "primaryAccounts": {"urn:ietf:params:jmap:mail": "A"},
        "username": "me@example.com",
        "apiUrl": format!("{}/jmap", server.uri()),
        "downloadUrl": format!("{}/download/{{accountId}}/{{blobId}}/{{name}}?type={{type}}", server.uri()),
        "uploadUrl": format!("{}/upload/{{accountId}}", server.uri()),
        "state": "s"
    })
}

fn bulkman(server: &MockServer, cfg_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bulkman"));
    cmd.env("BULKMAN_CONFIG_PATH", cfg_dir.path().join("config.json"))
        .env("BULKMAN_SERVER_URL", format!("{}/.well-known/jmap", server.uri()))
        .env("BULKMAN_USER", "me@example.com")
        .env("BULKMAN_PASS", "app-password")
        .env_remove("BULKMAN_PASS_FILE")
        .env_remove("BULKMAN_FOLDER")
        .env_remove("BULKMAN_DAYS");
    cmd
}

fn ago(hours: i64) -> String {
    (Utc::now() - Duration::hours(hours)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn email(id: &str, from: &str, name: Option<&str>, subject: &str, received_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "subject": subject,
        "receivedAt": received_at,
        "from": [{"name": name, "email": from}],
        "mailboxIds": {"mb-bulk": true}
    })
}

async fn mount_bulk_folder(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/jmap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_session(server)))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("Mailbox/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["Mailbox/get", {
                    "accountId": "A",
                    "list": [
                        {"id": "mb-inbox", "name": "Inbox", "role": "inbox"},
                        {"id": "mb-bulk", "name": "Bulk", "role": null}
                    ]
                }, "0"]
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_scan(server: &MockServer) {
    let list = vec![
        email("m1", "news@shop.com", Some("Shop"), "Sale today", &ago(1)),
        email("m2", "digest@blog.io", None, "Weekly digest", &ago(2)),
        email("m3", "news@shop.com", Some("Shop"), "Last chance", &ago(3)),
        email("m4", "News@Shop.com", Some("Shop"), "New arrivals", &ago(4)),
        // Older than the cutoff; the server should not have returned it.
        email("m5", "digest@blog.io", None, "Ancient", &ago(24 * 30)),
    ];

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("Email/query"))
        .and(body_string_contains("inMailbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["Email/query", {"accountId": "A", "ids": ["m1", "m2", "m3", "m4", "m5"], "position": 0}, "0"],
                ["Email/get", {"accountId": "A", "state": "s", "list": list, "notFound": []}, "1"]
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn scan_groups_recent_bulk_messages_by_sender() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_bulk_folder(&server).await;
    mount_scan(&server).await;

    let output = bulkman(&server, &tmp)
        .args(["scan", "--days", "7"])
        .output()
        .expect("run");

    assert!(
        output.status.success(),
        "bulkman failed. status={:?}\nstdout:\n{}\nstderr:\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(v.pointer("/command").and_then(|v| v.as_str()), Some("scan"));
    assert_eq!(
        v.pointer("/data/bulkMailbox/id").and_then(|v| v.as_str()),
        Some("mb-bulk")
    );
    assert_eq!(v.pointer("/data/days").and_then(|v| v.as_u64()), Some(7));
    assert_eq!(
        v.pointer("/data/totalMessages").and_then(|v| v.as_u64()),
        Some(4)
    );

    let senders = v
        .pointer("/data/senders")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let summary: Vec<(String, u64)> = senders
        .iter()
        .map(|g| {
            (
                g["email"].as_str().unwrap_or("").to_string(),
                g["count"].as_u64().unwrap_or(0),
            )
        })
        .collect();
    // Exact addresses: the capitalised variant is its own sender.
    assert_eq!(
        summary,
        vec![
            ("news@shop.com".to_string(), 2),
            ("digest@blog.io".to_string(), 1),
            ("News@Shop.com".to_string(), 1),
        ]
    );
    assert_eq!(senders[0]["name"], "Shop");
    assert_eq!(senders[1]["name"], "digest@blog.io");
    assert_eq!(senders[0]["messages"][0]["id"], "m1");
    assert_eq!(senders[0]["messages"][1]["id"], "m3");

    // One batched request: query + get via back-reference, newest first.
    let requests = server.received_requests().await.expect("requests");
    let scan = requests
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).expect("body"))
        .find(|b| b.to_string().contains("Email/query"))
        .expect("scan request");
    let calls = scan["methodCalls"].as_array().cloned().unwrap_or_default();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0][1]["filter"]["inMailbox"], "mb-bulk");
    assert!(calls[0][1]["filter"]["after"].as_str().is_some_and(|s| s.ends_with('Z')));
    assert_eq!(calls[0][1]["sort"][0]["property"], "receivedAt");
    assert_eq!(calls[0][1]["sort"][0]["isAscending"], false);
    assert_eq!(calls[1][0], "Email/get");
    assert_eq!(calls[1][1]["#ids"]["resultOf"], calls[0][2]);
    assert_eq!(calls[1][1]["#ids"]["path"], "/ids");
}

#[tokio::test]
async fn fold_case_merges_address_variants() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_bulk_folder(&server).await;
    mount_scan(&server).await;

    let output = bulkman(&server, &tmp)
        .args(["scan", "--fold-case"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        v.pointer("/data/senders/0/email").and_then(|v| v.as_str()),
        Some("news@shop.com")
    );
    assert_eq!(
        v.pointer("/data/senders/0/count").and_then(|v| v.as_u64()),
        Some(3)
    );
}

#[tokio::test]
async fn messages_shows_one_senders_group() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_bulk_folder(&server).await;
    mount_scan(&server).await;

    let output = bulkman(&server, &tmp)
        .args(["messages", "news@shop.com"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(v.pointer("/command").and_then(|v| v.as_str()), Some("messages"));
    assert_eq!(v.pointer("/data/count").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        v.pointer("/data/messages/1/subject").and_then(|v| v.as_str()),
        Some("Last chance")
    );

    let output = bulkman(&server, &tmp)
        .args(["messages", "nobody@nowhere.com"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(v.pointer("/data/count").and_then(|v| v.as_u64()), Some(0));
}

#[tokio::test]
async fn method_error_in_scan_is_a_transport_error() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_bulk_folder(&server).await;

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("Email/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["error", {"type": "invalidArguments", "description": "bad filter"}, "0"],
                ["error", {"type": "invalidResultReference"}, "1"]
            ]
        })))
        .mount(&server)
        .await;

    let output = bulkman(&server, &tmp).arg("scan").output().expect("run");
    assert_eq!(output.status.code(), Some(1));

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        v.pointer("/error/kind").and_then(|v| v.as_str()),
        Some("transportError")
    );
    assert_eq!(
        v.pointer("/error/message").and_then(|v| v.as_str()),
        Some("Email/query failed: invalidArguments: bad filter")
    );
    assert_eq!(
        v.pointer("/error/jmap/type").and_then(|v| v.as_str()),
        Some("invalidArguments")
    );
}
