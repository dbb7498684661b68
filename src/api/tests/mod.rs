use super::*;
use crate::config::ApiConfig;
use crate::error::Error;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Client whose three hosts all point at the mock server
fn client_for(server: &MockServer) -> QuarkClient {
    let config = ApiConfig {
        pan_base_url: server.uri(),
        drive_pc_base_url: server.uri(),
        drive_base_url: server.uri(),
        cookie: "__puus=test".to_string(),
        ..ApiConfig::default()
    };
    QuarkClient::new(config).unwrap()
}

fn share() -> ShareSession {
    ShareSession {
        pwd_id: "abc123".to_string(),
        stoken: "st-1".to_string(),
    }
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": 200,
        "code": 0,
        "message": "ok",
        "data": data,
    }))
}

// ---------------------------------------------------------------------------
// share token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn share_token_posts_id_and_passcode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/share/sharepage/token"))
        .and(query_param("pr", "ucpro"))
        .and(query_param("fr", "pc"))
        .and(header("cookie", "__puus=test"))
        .and(body_partial_json(json!({"pwd_id": "abc123", "passcode": "x7Yz"})))
        .respond_with(ok(json!({"stoken": "st-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let stoken = client_for(&server)
        .share_token("abc123", "x7Yz")
        .await
        .unwrap();
    assert_eq!(stoken, "st-42");
}

#[tokio::test]
async fn share_token_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/share/sharepage/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": 400,
            "code": 41008,
            "message": "好友已取消了分享",
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).share_token("abc123", "").await.unwrap_err();
    assert!(err.is_remote(), "expected remote error, got {err:?}");
    assert_eq!(err.to_string(), "好友已取消了分享");
}

#[tokio::test]
async fn non_json_response_becomes_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/share/sharepage/token"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).share_token("abc123", "").await.unwrap_err();
    assert_eq!(err.to_string(), "failed to open share (HTTP 502)");
}

// ---------------------------------------------------------------------------
// listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_shared_folder_sends_paging_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/clouddrive/share/sharepage/detail"))
        .and(query_param("pwd_id", "abc123"))
        .and(query_param("stoken", "st-1"))
        .and(query_param("pdir_fid", "dir-9"))
        .and(query_param("_page", "2"))
        .and(query_param("_size", "50"))
        .and(query_param("_fetch_total", "1"))
        .and(query_param("_sort", "file_type:asc,file_name:asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "code": 0,
            "message": "ok",
            "data": {"list": [
                {"fid": "d1", "file_name": "season 1", "dir": true, "share_fid_token": "t1"},
                {"fid": "f1", "file_name": "a.mkv", "size": 1024, "file_type": 1, "share_fid_token": "t2"}
            ]},
            "metadata": {"_total": 52}
        })))
        .mount(&server)
        .await;

    let page = client_for(&server)
        .list_shared_folder(&share(), "dir-9", 2, 50)
        .await
        .unwrap();

    assert_eq!(page.total, Some(52));
    assert_eq!(page.entries.len(), 2);
    assert!(page.entries[0].is_directory());
    assert_eq!(page.entries[1].size, Some(1024));
}

#[tokio::test]
async fn list_without_data_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/clouddrive/share/sharepage/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "code": 0,
            "message": ""
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_shared_folder(&share(), "0", 1, 50)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "failed to list shared folder");
}

// ---------------------------------------------------------------------------
// transfer steps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_sends_single_file_and_returns_task_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/share/sharepage/save"))
        .and(body_partial_json(json!({
            "fid_list": ["f1"],
            "fid_token_list": ["tok-1"],
            "to_pdir_fid": "0",
            "pwd_id": "abc123",
            "stoken": "st-1",
            "scene": "link"
        })))
        .respond_with(ok(json!({"task_id": "task-7"})))
        .expect(1)
        .mount(&server)
        .await;

    let task_id = client_for(&server)
        .save_to_own_storage(&share(), "f1", "tok-1")
        .await
        .unwrap();
    assert_eq!(task_id, "task-7");
}

#[tokio::test]
async fn poll_reports_finished_task_with_saved_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/clouddrive/task"))
        .and(query_param("task_id", "task-7"))
        .and(query_param("retry_index", "3"))
        .respond_with(ok(json!({
            "status": 2,
            "save_as": {"save_as_top_fids": ["saved-1"]}
        })))
        .mount(&server)
        .await;

    let status = client_for(&server)
        .poll_save_task("task-7", 3)
        .await
        .unwrap();
    assert_eq!(
        status,
        SaveTaskStatus {
            ready: true,
            saved_file_id: Some("saved-1".to_string()),
        }
    );
}

#[tokio::test]
async fn poll_without_data_is_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/clouddrive/task"))
        .respond_with(ok(serde_json::Value::Null))
        .mount(&server)
        .await;

    let status = client_for(&server)
        .poll_save_task("task-7", 0)
        .await
        .unwrap();
    assert!(!status.ready);
    assert_eq!(status.saved_file_id, None);
}

#[tokio::test]
async fn resolve_returns_first_download_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/file/download"))
        .and(body_partial_json(json!({"fids": ["saved-1"]})))
        .respond_with(ok(json!([{"download_url": "https://cdn.example/f?sign=1"}])))
        .mount(&server)
        .await;

    let url = client_for(&server)
        .resolve_download_url("saved-1")
        .await
        .unwrap();
    assert_eq!(url, "https://cdn.example/f?sign=1");
}

#[tokio::test]
async fn resolve_with_empty_list_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/file/download"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .resolve_download_url("saved-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));
}

#[tokio::test]
async fn delete_sends_action_type_and_file_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/file/delete"))
        .and(body_partial_json(json!({
            "action_type": 2,
            "filelist": ["saved-1"],
            "exclude_fids": []
        })))
        .respond_with(ok(json!({"task_id": "del-1", "finish": true})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .delete_remote_file("saved-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/file/delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 401,
            "code": 31001,
            "message": "require login [guest]"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .delete_remote_file("saved-1")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "require login [guest]");
}

// ---------------------------------------------------------------------------
// member
// ---------------------------------------------------------------------------

#[tokio::test]
async fn member_info_reports_used_and_total_capacity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/clouddrive/member"))
        .and(query_param("pr", "ucpro"))
        .and(query_param("fetch_subscribe", "true"))
        .and(query_param("_ch", "home"))
        .and(query_param("fetch_identity", "true"))
        .and(header("cookie", "__puus=test"))
        .respond_with(ok(json!({
            "use_capacity": 3_221_225_472u64,
            "total_capacity": 10_737_418_240u64,
            "member_type": "NORMAL"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let capacity = client_for(&server).member_info().await.unwrap();
    assert_eq!(capacity.use_capacity, 3_221_225_472);
    assert_eq!(capacity.total_capacity, 10_737_418_240);
    assert_eq!(capacity.remaining(), 7_516_192_768);
}

#[tokio::test]
async fn member_info_surfaces_login_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/clouddrive/member"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 401,
            "code": 31001,
            "message": "require login [guest]"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).member_info().await.unwrap_err();
    assert!(err.is_remote());
    assert_eq!(err.to_string(), "require login [guest]");
}

#[test]
fn invalid_cookie_is_a_config_error() {
    let config = ApiConfig {
        cookie: "bad\ncookie".to_string(),
        ..ApiConfig::default()
    };
    match QuarkClient::new(config) {
        Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("cookie")),
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("cookie with a newline must be rejected"),
    }
}
