//! reqwest implementation of the cloud drive API

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::models::{
    CapacityData, DownloadUrlData, QuarkResponse, SaveData, ShareDetailData, ShareTokenData, TaskData,
};
use super::{
    PageFetcher, SaveTaskStatus, SharePage, ShareOpener, ShareSession, TransferService,
};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Query parameters the service expects on every request
const COMMON_QUERY: [(&str, &str); 3] = [("pr", "ucpro"), ("fr", "pc"), ("uc_param_str", "")];

/// Origin the web client presents
const WEB_ORIGIN: &str = "https://pan.quark.cn";

/// Listing sort order: folders first, then by name
const LISTING_SORT: &str = "file_type:asc,file_name:asc";

/// HTTP client for the share and drive endpoints
#[derive(Clone)]
pub struct QuarkClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl QuarkClient {
    /// Create a client for the given endpoints and session cookie
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created or the cookie is not
    /// a valid header value
    pub fn new(config: ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9"),
        );
        headers.insert(header::ORIGIN, HeaderValue::from_static(WEB_ORIGIN));
        headers.insert(header::REFERER, HeaderValue::from_static("https://pan.quark.cn/"));
        if !config.cookie.is_empty() {
            let cookie = HeaderValue::from_str(&config.cookie)
                .map_err(|e| Error::config("cookie", format!("invalid cookie header: {}", e)))?;
            headers.insert(header::COOKIE, cookie);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self { http, config })
    }

    /// Exchange a share id and passcode for a session token
    pub async fn share_token(&self, pwd_id: &str, passcode: &str) -> Result<String> {
        let url = format!(
            "{}/1/clouddrive/share/sharepage/token",
            self.config.pan_base_url
        );
        let request = self
            .http
            .post(url)
            .query(&COMMON_QUERY)
            .json(&json!({ "pwd_id": pwd_id, "passcode": passcode }));
        let (data, _) = self
            .send::<ShareTokenData>(request, "failed to open share")
            .await?;
        Ok(data.stoken)
    }

    /// Storage quota of the account behind the session cookie
    ///
    /// Every file transferred passes through this quota as a temporary copy.
    pub async fn member_info(&self) -> Result<CapacityData> {
        let url = format!("{}/1/clouddrive/member", self.config.drive_base_url);
        let request = self.http.get(url).query(&COMMON_QUERY).query(&[
            ("fetch_subscribe", "true"),
            ("_ch", "home"),
            ("fetch_identity", "true"),
        ]);
        let (data, _) = self
            .send::<CapacityData>(request, "failed to read account capacity")
            .await?;
        Ok(data)
    }

    /// Send a request and unwrap the response envelope into a typed payload
    ///
    /// The envelope is decoded loosely first so that a failure response with an
    /// unexpected payload shape still surfaces the server's message.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<(T, Option<usize>)> {
        let envelope = self.send_raw(request, fallback).await?;
        let total = envelope.total();
        let data = envelope.into_data(fallback)?;
        Ok((serde_json::from_value(data)?, total))
    }

    async fn send_raw(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<QuarkResponse<Value>> {
        let response = request.send().await?;
        let http_status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<QuarkResponse<Value>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(e) => {
                debug!(status = %http_status, error = %e, "response is not a JSON envelope");
                Err(Error::remote(
                    None,
                    &format!("{} (HTTP {})", fallback, http_status.as_u16()),
                ))
            }
        }
    }
}

#[async_trait::async_trait]
impl ShareOpener for QuarkClient {
    async fn open_share(&self, pwd_id: &str, passcode: &str) -> Result<ShareSession> {
        let stoken = self.share_token(pwd_id, passcode).await?;
        Ok(ShareSession {
            pwd_id: pwd_id.to_string(),
            stoken,
        })
    }
}

#[async_trait::async_trait]
impl PageFetcher for QuarkClient {
    async fn list_shared_folder(
        &self,
        share: &ShareSession,
        folder_id: &str,
        page: u32,
        page_size: usize,
    ) -> Result<SharePage> {
        let url = format!(
            "{}/1/clouddrive/share/sharepage/detail",
            self.config.pan_base_url
        );
        let page = page.to_string();
        let size = page_size.to_string();
        let request = self.http.get(url).query(&COMMON_QUERY).query(&[
            ("pwd_id", share.pwd_id.as_str()),
            ("stoken", share.stoken.as_str()),
            ("pdir_fid", folder_id),
            ("force", "0"),
            ("_page", page.as_str()),
            ("_size", size.as_str()),
            ("_fetch_total", "1"),
            ("_fetch_sub_dirs", "0"),
            ("_sort", LISTING_SORT),
        ]);

        let (data, total) = self
            .send::<ShareDetailData>(request, "failed to list shared folder")
            .await?;
        Ok(SharePage {
            entries: data.list,
            total,
        })
    }
}

#[async_trait::async_trait]
impl TransferService for QuarkClient {
    async fn save_to_own_storage(
        &self,
        share: &ShareSession,
        fid: &str,
        fid_token: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/1/clouddrive/share/sharepage/save",
            self.config.drive_pc_base_url
        );
        let request = self.http.post(url).query(&COMMON_QUERY).json(&json!({
            "fid_list": [fid],
            "fid_token_list": [fid_token],
            "to_pdir_fid": "0",
            "pwd_id": share.pwd_id,
            "stoken": share.stoken,
            "pdir_fid": "0",
            "scene": "link",
        }));
        let (data, _) = self.send::<SaveData>(request, "save failed").await?;
        Ok(data.task_id)
    }

    async fn poll_save_task(&self, task_id: &str, attempt: u32) -> Result<SaveTaskStatus> {
        let url = format!("{}/1/clouddrive/task", self.config.drive_pc_base_url);
        let retry_index = attempt.to_string();
        let request = self
            .http
            .get(url)
            .query(&COMMON_QUERY)
            .query(&[("task_id", task_id), ("retry_index", retry_index.as_str())]);

        // An unfinished task may come back without data; that is "not ready", not an error
        let envelope = self.send_raw(request, "task query failed").await?;
        envelope.check("task query failed")?;
        let task = match envelope.data {
            Some(data) if !data.is_null() => serde_json::from_value::<TaskData>(data)?,
            _ => return Ok(SaveTaskStatus::default()),
        };
        Ok(SaveTaskStatus {
            ready: task.is_finished(),
            saved_file_id: task.saved_file_id(),
        })
    }

    async fn resolve_download_url(&self, saved_file_id: &str) -> Result<String> {
        let url = format!("{}/1/clouddrive/file/download", self.config.drive_base_url);
        let request = self
            .http
            .post(url)
            .query(&COMMON_QUERY)
            .json(&json!({ "fids": [saved_file_id] }));
        let (data, _) = self
            .send::<Vec<DownloadUrlData>>(request, "failed to get download link")
            .await?;
        data.into_iter()
            .next()
            .and_then(|d| d.download_url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::remote(None, "failed to get download link"))
    }

    async fn delete_remote_file(&self, saved_file_id: &str) -> Result<()> {
        let url = format!("{}/1/clouddrive/file/delete", self.config.drive_base_url);
        let request = self.http.post(url).query(&COMMON_QUERY).json(&json!({
            "action_type": 2,
            "filelist": [saved_file_id],
            "exclude_fids": [],
        }));
        self.send_raw(request, "delete failed")
            .await?
            .check("delete failed")
    }
}
