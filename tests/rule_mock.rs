use assert_cmd::Command;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SIEVE: &str = "urn:ietf:params:jmap:sieve";

fn mock_session(server: &MockServer, with_sieve: bool) -> serde_json::Value {
    let mut capabilities = json!({
        "urn:ietf:params:jmap:core": {},
        "urn:ietf:params:jmap:mail": {}
    });
    if with_sieve {
        capabilities[SIEVE] = json!({"implementation": "mock"});
    }
    json!({
        "capabilities": capabilities,
        "accounts": {"A": {"name": "mock", "isPersonal": true, "isReadOnly": false}},
        "primaryAccounts": {"urn:ietf:params:jmap:mail": "A", SIEVE: "A"},
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

async fn mount_account(server: &MockServer, with_sieve: bool) {
    Mock::given(method("GET"))
        .and(path("/.well-known/jmap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_session(server, with_sieve)))
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
                        {"id": "mb-bulk", "name": "Bulk"}
                    ]
                }, "0"]
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_upload(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/A"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "accountId": "A",
            "blobId": "B-new",
            "type": "application/sieve",
            "size": 120
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn uploaded_script(requests: &[wiremock::Request]) -> String {
    requests
        .iter()
        .find(|r| r.url.path() == "/upload/A")
        .map(|r| String::from_utf8_lossy(&r.body).to_string())
        .expect("upload request")
}

fn sieve_set_args(requests: &[wiremock::Request]) -> serde_json::Value {
    requests
        .iter()
        .filter(|r| r.url.path() == "/jmap")
        .map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).expect("body"))
        .find(|b| b["methodCalls"][0][0] == "SieveScript/set")
        .map(|b| {
            assert_eq!(
                b["using"],
                json!(["urn:ietf:params:jmap:core", "urn:ietf:params:jmap:mail", SIEVE])
            );
            b["methodCalls"][0][1].clone()
        })
        .expect("SieveScript/set request")
}

#[tokio::test]
async fn first_rule_creates_and_activates_a_script() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_account(&server, true).await;
    mount_upload(&server).await;

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("SieveScript/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["SieveScript/get", {"accountId": "A", "state": "1", "list": [], "notFound": []}, "0"]
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("SieveScript/set"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["SieveScript/set", {
                    "accountId": "A",
                    "created": {"new-rule": {"id": "S-new", "blobId": "B-new", "isActive": true}}
                }, "0"]
            ]
        })))
        .mount(&server)
        .await;

    let output = bulkman(&server, &tmp)
        .args(["rule", "news@shop.com", "--force"])
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
    assert_eq!(v.pointer("/data/action").and_then(|v| v.as_str()), Some("rule"));
    assert_eq!(
        v.pointer("/data/status/message").and_then(|v| v.as_str()),
        Some("Created rule to move messages from news@shop.com to bulk folder")
    );
    assert_eq!(
        v.pointer("/data/results/0/rule/scriptId").and_then(|v| v.as_str()),
        Some("S-new")
    );
    assert_eq!(
        v.pointer("/data/results/0/rule/created").and_then(|v| v.as_bool()),
        Some(true)
    );

    let requests = server.received_requests().await.expect("requests");
    let script = uploaded_script(&requests);
    assert!(script.starts_with("require [\"fileinto\"];"));
    assert!(script.contains("if address :is \"from\" \"news@shop.com\" {"));
    assert!(script.contains("fileinto \"Bulk\";"));

    let args = sieve_set_args(&requests);
    assert_eq!(args["create"]["new-rule"]["blobId"], "B-new");
    assert_eq!(args["create"]["new-rule"]["name"], "bulk-manager-rules");
    assert_eq!(args["onSuccessActivateScript"], "#new-rule");
}

#[tokio::test]
async fn rule_is_appended_to_the_active_script() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_account(&server, true).await;
    mount_upload(&server).await;

    let existing = "require [\"fileinto\"];\nif header :contains \"subject\" \"sale\" { fileinto \"Promos\"; }\n";

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("SieveScript/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["SieveScript/get", {
                    "accountId": "A",
                    "list": [
                        {"id": "S0", "name": "old", "blobId": "B-0", "isActive": false},
                        {"id": "S1", "name": "my-rules", "blobId": "B-old", "isActive": true}
                    ]
                }, "0"]
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/download/A/B-old/my-rules"))
        .respond_with(ResponseTemplate::new(200).set_body_string(existing))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("SieveScript/set"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["SieveScript/set", {"accountId": "A", "updated": {"S1": null}}, "0"]
            ]
        })))
        .mount(&server)
        .await;

    let output = bulkman(&server, &tmp)
        .args(["rule", "digest@blog.io", "--force"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        v.pointer("/data/results/0/rule/scriptId").and_then(|v| v.as_str()),
        Some("S1")
    );
    assert_eq!(
        v.pointer("/data/results/0/rule/created").and_then(|v| v.as_bool()),
        Some(false)
    );

    let requests = server.received_requests().await.expect("requests");
    let script = uploaded_script(&requests);
    assert!(script.starts_with(existing));
    assert_eq!(script.matches("require").count(), 1);
    assert!(script.contains("if address :is \"from\" \"digest@blog.io\""));

    let args = sieve_set_args(&requests);
    assert_eq!(args["update"]["S1"]["blobId"], "B-new");
    assert!(args.get("create").is_none());
}

#[tokio::test]
async fn session_without_sieve_reports_rules_unavailable() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_account(&server, false).await;

    let output = bulkman(&server, &tmp)
        .args(["rule", "news@shop.com", "--force"])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        v.pointer("/error/kind").and_then(|v| v.as_str()),
        Some("ruleUnavailable")
    );
    assert_eq!(
        v.pointer("/error/message").and_then(|v| v.as_str()),
        Some("Sieve script management not available. You can manually create a rule in Fastmail Settings → Rules.")
    );

    let requests = server.received_requests().await.expect("requests");
    assert!(
        requests
            .iter()
            .all(|r| !String::from_utf8_lossy(&r.body).contains("SieveScript"))
    );
}

#[tokio::test]
async fn unknown_method_from_server_reports_rules_unavailable_per_sender() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_account(&server, true).await;

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("SieveScript/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [["error", {"type": "unknownMethod"}, "0"]]
        })))
        .mount(&server)
        .await;

    let output = bulkman(&server, &tmp)
        .args(["rule", "a@shop.com", "b@shop.com", "--force"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        v.pointer("/data/action").and_then(|v| v.as_str()),
        Some("bulk_rule")
    );
    assert_eq!(
        v.pointer("/data/status/message").and_then(|v| v.as_str()),
        Some("Bulk rule creation completed: 0/2 rules created (2 errors)")
    );
    assert_eq!(
        v.pointer("/data/status/severity").and_then(|v| v.as_str()),
        Some("error")
    );
    assert_eq!(
        v.pointer("/data/results/1/error/kind").and_then(|v| v.as_str()),
        Some("ruleUnavailable")
    );
}

#[tokio::test]
async fn rule_files_into_the_fixed_bulk_folder_name() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tmp");
    mount_upload(&server).await;

    Mock::given(method("GET"))
        .and(path("/.well-known/jmap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_session(&server, true)))
        .mount(&server)
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
                        {"id": "mb-archive", "name": "Archive", "role": "archive"},
                        {"id": "mb-spam", "name": "Spam", "parentId": "mb-archive", "role": "junk"}
                    ]
                }, "0"]
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("SieveScript/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["SieveScript/get", {"accountId": "A", "list": []}, "0"]
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jmap"))
        .and(body_string_contains("SieveScript/set"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionState": "s",
            "methodResponses": [
                ["SieveScript/set", {
                    "accountId": "A",
                    "created": {"new-rule": {"id": "S-new"}}
                }, "0"]
            ]
        })))
        .mount(&server)
        .await;

    let output = bulkman(&server, &tmp)
        .args(["rule", "news@shop.com", "--force"])
        .output()
        .expect("run");
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let requests = server.received_requests().await.expect("requests");
    let script = uploaded_script(&requests);
    assert!(script.contains("fileinto \"Bulk\";"));
    assert!(!script.contains("\"Spam\""));
}
