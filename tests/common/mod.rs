//! Common test utilities: a wiremock stand-in for the share, drive and CDN hosts

use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quark_share_dl::Config;

/// Successful API envelope around `data`
pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": 200,
        "code": 0,
        "message": "ok",
        "data": data,
    }))
}

/// Listing page with a reported total
pub fn listing(entries: Value) -> ResponseTemplate {
    let total = entries.as_array().map(Vec::len).unwrap_or(0);
    ResponseTemplate::new(200).set_body_json(json!({
        "status": 200,
        "code": 0,
        "message": "ok",
        "data": { "list": entries },
        "metadata": { "_total": total },
    }))
}

/// Failed API envelope with a server message
pub fn failure(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": 400,
        "code": 41004,
        "message": message,
        "data": null,
    }))
}

/// Config whose hosts all point at `server`, with short poll and pacing delays
pub fn config_for(server: &MockServer, download_dir: &Path) -> Config {
    let mut config = Config::default();
    config.api.pan_base_url = server.uri();
    config.api.drive_pc_base_url = server.uri();
    config.api.drive_base_url = server.uri();
    config.api.cookie = "__puus=integration".to_string();
    config.transfer.concurrency = 2;
    config.transfer.poll_interval = Duration::from_millis(10);
    config.transfer.pacing_delay = Duration::ZERO;
    config.transfer.settle_delay = Duration::from_millis(50);
    config.download.download_dir = download_dir.to_path_buf();
    config
}

/// Mount the token endpoint
pub async fn mount_token(server: &MockServer, stoken: &str) {
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/share/sharepage/token"))
        .respond_with(ok(json!({ "stoken": stoken })))
        .mount(server)
        .await;
}

/// Mount one folder listing
pub async fn mount_folder(server: &MockServer, folder_id: &str, entries: Value) {
    Mock::given(method("GET"))
        .and(path("/1/clouddrive/share/sharepage/detail"))
        .and(query_param("pdir_fid", folder_id))
        .respond_with(listing(entries))
        .mount(server)
        .await;
}

/// Mount save, ready task, download link and CDN body for one shared file
pub async fn mount_transfer(server: &MockServer, fid: &str, body: &str) {
    let task_id = format!("task-{fid}");
    let saved_id = format!("saved-{fid}");

    Mock::given(method("POST"))
        .and(path("/1/clouddrive/share/sharepage/save"))
        .and(body_partial_json(json!({ "fid_list": [fid] })))
        .respond_with(ok(json!({ "task_id": task_id })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/1/clouddrive/task"))
        .and(query_param("task_id", task_id.as_str()))
        .respond_with(ok(json!({
            "status": 2,
            "save_as": { "save_as_top_fids": [saved_id] },
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/1/clouddrive/file/download"))
        .and(body_partial_json(json!({ "fids": [saved_id] })))
        .respond_with(ok(json!([
            { "download_url": format!("{}/cdn/{}", server.uri(), fid) }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/cdn/{fid}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mount the delete endpoint, expecting `times` calls
pub async fn mount_delete(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/1/clouddrive/file/delete"))
        .and(body_partial_json(json!({ "action_type": 2 })))
        .respond_with(ok(json!({ "task_id": "delete-task" })))
        .expect(times)
        .mount(server)
        .await;
}

/// Shared folder entry
pub fn folder(fid: &str, name: &str) -> Value {
    json!({
        "fid": fid,
        "file_name": name,
        "dir": true,
        "file_type": 0,
        "share_fid_token": format!("tok-{fid}"),
        "updated_at": 1_700_000_000_000i64,
    })
}

/// Shared file entry
pub fn file(fid: &str, name: &str, size: u64) -> Value {
    json!({
        "fid": fid,
        "file_name": name,
        "size": size,
        "file_type": 1,
        "obj_category": "video",
        "share_fid_token": format!("tok-{fid}"),
        "updated_at": 1_700_000_000_000i64,
    })
}
