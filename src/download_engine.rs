//! Local download of resolved CDN URLs
//!
//! [`HttpDownloadEngine`] follows the CDN redirects by hand (so the session
//! cookie is sent on every hop), then picks one of two strategies:
//! - segmented: parallel `Range` requests into a hidden temp directory next to
//!   the destination, merged in order once all segments are complete
//! - single stream: one response body written straight to the destination
//!
//! Progress is published through the [`ProgressHub`] and always ends with a
//! [`DownloadPhase::Done`] update on success. Failed or cancelled downloads
//! leave no partial output behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{ApiConfig, DownloadConfig};
use crate::error::{Error, Result};
use crate::transfer::ProgressHub;
use crate::types::{DownloadId, DownloadPhase, DownloadProgressUpdate, LocalFile};
use crate::utils::unique_local_path;

/// Length of the error body excerpt kept from a failed CDN response
const ERROR_BODY_EXCERPT: usize = 200;

/// Attempts at reserving a destination name before giving up
const MAX_RESERVE_ATTEMPTS: u32 = 16;

/// Downloads a URL to a local file
#[async_trait::async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Download `url` into the download directory as `file_name`
    ///
    /// `parallelism` is the number of concurrent range requests allowed.
    /// The actual name may get a numbered suffix to avoid overwriting an
    /// existing file; the returned [`LocalFile`] has the final path.
    async fn download_to_local(
        &self,
        url: &str,
        file_name: &str,
        parallelism: usize,
    ) -> Result<LocalFile>;

    /// Abort every download in flight
    ///
    /// Downloads started afterwards are not affected.
    async fn cancel_all(&self) {}
}

/// reqwest-backed [`DownloadEngine`]
pub struct HttpDownloadEngine {
    http: reqwest::Client,
    config: DownloadConfig,
    hub: Arc<ProgressHub>,
    /// Replaced by a fresh token on every [`cancel_all`](DownloadEngine::cancel_all)
    cancel: Mutex<CancellationToken>,
}

/// One download in flight
struct Job<'a> {
    id: DownloadId,
    filename: &'a str,
    dest: &'a Path,
    token: CancellationToken,
}

impl HttpDownloadEngine {
    /// Create an engine sending the session cookie and user agent of `api`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created or the cookie is not
    /// a valid header value
    pub fn new(api: &ApiConfig, config: DownloadConfig, hub: Arc<ProgressHub>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(header::REFERER, HeaderValue::from_static("https://pan.quark.cn/"));
        if !api.cookie.is_empty() {
            let cookie = HeaderValue::from_str(&api.cookie)
                .map_err(|e| Error::config("cookie", format!("invalid cookie header: {}", e)))?;
            headers.insert(header::COOKIE, cookie);
        }

        // Redirects are followed by hand so every hop carries the cookie
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(api.request_timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(api.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            config,
            hub,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// GET `url`, following redirects up to the configured limit
    async fn open(&self, url: &str, token: &CancellationToken) -> Result<(String, reqwest::Response)> {
        let mut current = url.to_string();
        let mut redirects = 0u32;
        loop {
            let response = tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                response = self.http.get(&current).send() => response?,
            };

            if response.status().is_redirection() {
                if let Some(location) = response.headers().get(header::LOCATION) {
                    if redirects >= self.config.max_redirects {
                        return Err(Error::LocalIo(format!(
                            "too many redirects (more than {})",
                            self.config.max_redirects
                        )));
                    }
                    let next = location
                        .to_str()
                        .map_err(|e| Error::LocalIo(format!("invalid redirect location: {}", e)))?;
                    current = url::Url::parse(&current)
                        .and_then(|base| base.join(next))
                        .map(|u| u.to_string())
                        .unwrap_or_else(|_| next.to_string());
                    redirects += 1;
                    tracing::debug!(redirects, "following download redirect");
                    continue;
                }
            }

            if response.status().as_u16() >= 400 {
                return Err(http_error(response).await);
            }
            return Ok((current, response));
        }
    }

    async fn publish(&self, job: &Job<'_>, downloaded: u64, total: u64, speed: f64, phase: DownloadPhase) {
        self.hub
            .record_download(DownloadProgressUpdate {
                id: job.id,
                filename: job.filename.to_string(),
                bytes_downloaded: downloaded,
                bytes_total: total,
                speed,
                phase,
            })
            .await;
    }

    // -----------------------------------------------------------------------
    // Single stream
    // -----------------------------------------------------------------------

    async fn download_single(
        &self,
        job: &Job<'_>,
        file: tokio::fs::File,
        mut response: reqwest::Response,
        total: u64,
    ) -> Result<u64> {
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        let mut downloaded: u64 = 0;
        let mut last_emit = Instant::now();
        let mut last_downloaded: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = job.token.cancelled() => return Err(Error::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };
            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            let elapsed = last_emit.elapsed();
            if elapsed >= self.config.progress_interval {
                let speed = downloaded.saturating_sub(last_downloaded) as f64
                    / elapsed.as_secs_f64().max(f64::EPSILON);
                self.publish(job, downloaded, total, speed, DownloadPhase::Downloading)
                    .await;
                last_emit = Instant::now();
                last_downloaded = downloaded;
            }
        }
        writer.flush().await?;
        Ok(downloaded)
    }

    // -----------------------------------------------------------------------
    // Segmented
    // -----------------------------------------------------------------------

    async fn download_segmented(
        &self,
        job: &Job<'_>,
        url: &str,
        total: u64,
        parallelism: usize,
    ) -> Result<u64> {
        let parent = job.dest.parent().unwrap_or_else(|| Path::new("."));
        let temp_dir = parent.join(format!(".quark_temp_{}", job.id));
        tokio::fs::create_dir_all(&temp_dir).await?;

        let result = self
            .fetch_and_merge(job, url, total, parallelism, &temp_dir)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
            tracing::warn!(path = %temp_dir.display(), error = %e, "failed to remove segment directory");
        }
        result
    }

    async fn fetch_and_merge(
        &self,
        job: &Job<'_>,
        url: &str,
        total: u64,
        parallelism: usize,
        temp_dir: &Path,
    ) -> Result<u64> {
        let ranges = split_ranges(total, parallelism);
        let counters: Vec<Arc<AtomicU64>> =
            ranges.iter().map(|_| Arc::new(AtomicU64::new(0))).collect();
        tracing::debug!(download_id = job.id.0, segments = ranges.len(), total, "segmented download");

        // Progress monitor, stopped through its own child token
        let monitor_stop = job.token.child_token();
        let monitor = {
            let hub = Arc::clone(&self.hub);
            let counters = counters.clone();
            let stop = monitor_stop.clone();
            let interval = self.config.progress_interval;
            let id = job.id;
            let filename = job.filename.to_string();
            tokio::spawn(async move {
                let mut last_time = Instant::now();
                let mut last_downloaded = 0u64;
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                    let downloaded: u64 = counters.iter().map(|c| c.load(Ordering::Relaxed)).sum();
                    let elapsed = last_time.elapsed().as_secs_f64();
                    let speed = if elapsed > 0.0 {
                        downloaded.saturating_sub(last_downloaded) as f64 / elapsed
                    } else {
                        0.0
                    };
                    last_time = Instant::now();
                    last_downloaded = downloaded;
                    hub.record_download(DownloadProgressUpdate {
                        id,
                        filename: filename.clone(),
                        bytes_downloaded: downloaded,
                        bytes_total: total,
                        speed,
                        phase: DownloadPhase::Downloading,
                    })
                    .await;
                }
            })
        };

        let segments = ranges.iter().enumerate().map(|(i, &(start, end))| {
            let chunk_path = temp_dir.join(format!("chunk_{}", i));
            let counter = Arc::clone(&counters[i]);
            async move {
                self.fetch_segment(url, &chunk_path, start, end, &counter, &job.token)
                    .await
                    .map_err(|e| match e {
                        Error::Cancelled => Error::Cancelled,
                        other => Error::LocalIo(format!("segment {}: {}", i, other)),
                    })
            }
        });
        let fetched = try_join_all(segments).await;

        monitor_stop.cancel();
        if let Err(e) = monitor.await {
            tracing::debug!(error = %e, "progress monitor ended abnormally");
        }
        fetched?;

        if job.token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.publish(job, total, total, 0.0, DownloadPhase::Merging).await;
        let file = tokio::fs::File::create(job.dest).await?;
        let mut writer = BufWriter::with_capacity(8 * 1024 * 1024, file);
        let mut written = 0u64;
        for i in 0..ranges.len() {
            let mut chunk = tokio::fs::File::open(temp_dir.join(format!("chunk_{}", i))).await?;
            written += tokio::io::copy(&mut chunk, &mut writer).await?;
        }
        writer.flush().await?;

        if written != total {
            return Err(Error::LocalIo(format!(
                "merged size {} does not match expected {}",
                written, total
            )));
        }
        Ok(written)
    }

    async fn fetch_segment(
        &self,
        url: &str,
        chunk_path: &Path,
        start: u64,
        end: u64,
        counter: &AtomicU64,
        token: &CancellationToken,
    ) -> Result<()> {
        let request = self
            .http
            .get(url)
            .header(header::RANGE, format!("bytes={}-{}", start, end));
        let mut response = tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled),
            response = request.send() => response?,
        };

        match response.status().as_u16() {
            206 => {}
            200 => {
                return Err(Error::LocalIo(
                    "server ignored the range request (200 instead of 206)".to_string(),
                ));
            }
            _ => return Err(http_error(response).await),
        }

        let file = tokio::fs::File::create(chunk_path).await?;
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        let mut received = 0u64;
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };
            writer.write_all(&chunk).await?;
            received += chunk.len() as u64;
            counter.store(received, Ordering::Relaxed);
        }
        writer.flush().await?;

        let expected = end - start + 1;
        if received != expected {
            return Err(Error::LocalIo(format!(
                "transfer interrupted ({}/{} bytes)",
                received, expected
            )));
        }
        Ok(())
    }

    async fn run(&self, job: &Job<'_>, file: tokio::fs::File, url: &str, parallelism: usize) -> Result<u64> {
        let (final_url, response) = self.open(url, &job.token).await?;

        let total = response.content_length().unwrap_or(0);
        let accepts_ranges = response
            .headers()
            .get(header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("bytes"));

        if accepts_ranges && total >= self.config.min_segmented_size && parallelism > 1 {
            drop(response);
            drop(file);
            tracing::info!(download_id = job.id.0, total, parallelism, "downloading in segments");
            self.download_segmented(job, &final_url, total, parallelism).await
        } else {
            tracing::info!(download_id = job.id.0, total, accepts_ranges, "downloading as single stream");
            self.download_single(job, file, response, total).await
        }
    }
}

#[async_trait::async_trait]
impl DownloadEngine for HttpDownloadEngine {
    async fn download_to_local(
        &self,
        url: &str,
        file_name: &str,
        parallelism: usize,
    ) -> Result<LocalFile> {
        let token = self.cancel.lock().await.clone();
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        let (dest, file) = reserve_destination(&self.config.download_dir, file_name).await?;
        let filename = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());

        let job = Job {
            id: self.hub.next_download_id(),
            filename: &filename,
            dest: &dest,
            token,
        };
        tracing::info!(download_id = job.id.0, dest = %dest.display(), "local download started");
        self.publish(&job, 0, 0, 0.0, DownloadPhase::Downloading).await;

        match self.run(&job, file, url, parallelism.max(1)).await {
            Ok(bytes) => {
                self.publish(&job, bytes, bytes, 0.0, DownloadPhase::Done).await;
                tracing::info!(download_id = job.id.0, bytes, "local download finished");
                Ok(LocalFile { path: dest, bytes })
            }
            Err(e) => {
                self.hub.drop_download(job.id).await;
                if let Err(remove_err) = tokio::fs::remove_file(&dest).await {
                    tracing::debug!(error = %remove_err, "no partial file to remove");
                }
                tracing::warn!(download_id = job.id.0, error = %e, "local download failed");
                Err(e)
            }
        }
    }

    async fn cancel_all(&self) {
        let mut token = self.cancel.lock().await;
        token.cancel();
        *token = CancellationToken::new();
        tracing::info!("local downloads cancelled");
    }
}

/// Pick a free name in `dir` and create the file, so concurrent downloads of
/// equally named files cannot pick the same path
async fn reserve_destination(dir: &Path, file_name: &str) -> Result<(PathBuf, tokio::fs::File)> {
    for _ in 0..MAX_RESERVE_ATTEMPTS {
        let path = unique_local_path(dir, file_name)?;
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::LocalIo(format!(
        "could not reserve a file name for {}",
        file_name
    )))
}

/// Split `total` bytes into at most `parts` contiguous inclusive ranges
fn split_ranges(total: u64, parts: usize) -> Vec<(u64, u64)> {
    let parts = (parts.max(1) as u64).min(total.max(1));
    let segment = total / parts;
    (0..parts)
        .map(|i| {
            let start = i * segment;
            let end = if i == parts - 1 {
                total - 1
            } else {
                (i + 1) * segment - 1
            };
            (start, end)
        })
        .collect()
}

async fn http_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    Error::LocalIo(format!("server returned {}: {}", status, excerpt))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Event;
    use tokio::sync::broadcast;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn engine(dir: &Path, min_segmented_size: u64) -> (HttpDownloadEngine, broadcast::Receiver<Event>) {
        let (tx, rx) = broadcast::channel(1024);
        let hub = Arc::new(ProgressHub::new(tx, Duration::from_secs(2)));
        let config = DownloadConfig {
            download_dir: dir.to_path_buf(),
            min_segmented_size,
            ..DownloadConfig::default()
        };
        let api = ApiConfig {
            cookie: "__puus=test".to_string(),
            ..ApiConfig::default()
        };
        (HttpDownloadEngine::new(&api, config, hub).unwrap(), rx)
    }

    fn body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Serves byte ranges of a fixed body
    struct RangeResponder(Vec<u8>);

    impl Respond for RangeResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let Some(range) = request.headers.get("range") else {
                return ResponseTemplate::new(200)
                    .insert_header("accept-ranges", "bytes")
                    .set_body_bytes(self.0.clone());
            };
            let spec = range.to_str().unwrap().trim_start_matches("bytes=");
            let (start, end) = spec.split_once('-').unwrap();
            let (start, end): (usize, usize) = (start.parse().unwrap(), end.parse().unwrap());
            ResponseTemplate::new(206).set_body_bytes(self.0[start..=end].to_vec())
        }
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<DownloadProgressUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::DownloadProgress { update } = event {
                updates.push(update);
            }
        }
        updates
    }

    #[test]
    fn split_ranges_covers_every_byte() {
        assert_eq!(split_ranges(10, 3), vec![(0, 2), (3, 5), (6, 9)]);
        assert_eq!(split_ranges(2, 8), vec![(0, 0), (1, 1)]);
        assert_eq!(split_ranges(5, 1), vec![(0, 4)]);
    }

    #[tokio::test]
    async fn single_stream_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .and(header_eq("cookie", "__puus=test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, mut rx) = engine(dir.path(), 10 * 1024 * 1024);
        let local = engine
            .download_to_local(&format!("{}/file", server.uri()), "hello.txt", 8)
            .await
            .unwrap();

        assert_eq!(local.path, dir.path().join("hello.txt"));
        assert_eq!(local.bytes, 11);
        assert_eq!(std::fs::read(&local.path).unwrap(), b"hello world");

        let updates = drain(&mut rx);
        let last = updates.last().unwrap();
        assert_eq!(last.phase, DownloadPhase::Done);
        assert_eq!(last.bytes_downloaded, 11);
    }

    #[tokio::test]
    async fn follows_relative_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/cdn/file"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cdn/file"))
            .and(header_eq("cookie", "__puus=test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine(dir.path(), 10 * 1024 * 1024);
        let local = engine
            .download_to_local(&format!("{}/start", server.uri()), "a.bin", 1)
            .await
            .unwrap();
        assert_eq!(std::fs::read(local.path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn redirect_loop_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine(dir.path(), 10 * 1024 * 1024);
        let err = engine
            .download_to_local(&format!("{}/loop", server.uri()), "a.bin", 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too many redirects"), "got {err}");
        assert!(!dir.path().join("a.bin").exists(), "reserved file must be removed");
    }

    #[tokio::test]
    async fn http_error_keeps_status_and_body_excerpt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("x".repeat(500)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine(dir.path(), 10 * 1024 * 1024);
        let err = engine
            .download_to_local(&format!("{}/f", server.uri()), "a.bin", 1)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("403"), "got {message}");
        assert_eq!(message.matches('x').count(), ERROR_BODY_EXCERPT);
    }

    #[tokio::test]
    async fn existing_file_gets_numbered_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("movie.mkv"), b"old").unwrap();
        let (engine, _rx) = engine(dir.path(), 10 * 1024 * 1024);
        let local = engine
            .download_to_local(&format!("{}/f", server.uri()), "movie.mkv", 1)
            .await
            .unwrap();

        assert_eq!(local.path, dir.path().join("movie (1).mkv"));
        assert_eq!(std::fs::read(dir.path().join("movie.mkv")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn segmented_download_merges_in_order() {
        let data = body(10_000);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(RangeResponder(data.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, mut rx) = engine(dir.path(), 1024);
        let local = engine
            .download_to_local(&format!("{}/big", server.uri()), "big.bin", 4)
            .await
            .unwrap();

        assert_eq!(local.bytes, 10_000);
        assert_eq!(std::fs::read(&local.path).unwrap(), data);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(".quark_temp_"))
            .collect();
        assert!(leftovers.is_empty(), "temp dir not removed: {leftovers:?}");

        let phases: Vec<_> = drain(&mut rx).into_iter().map(|u| u.phase).collect();
        assert!(phases.contains(&DownloadPhase::Merging));
        assert_eq!(phases.last(), Some(&DownloadPhase::Done));
    }

    #[tokio::test]
    async fn segment_answered_with_200_fails_and_cleans_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("accept-ranges", "bytes")
                    .set_body_bytes(body(4096)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine(dir.path(), 1024);
        let err = engine
            .download_to_local(&format!("{}/f", server.uri()), "a.bin", 2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("206"), "got {err}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn small_files_use_single_stream_even_with_ranges() {
        let server = MockServer::start().await;
        // A range request would get 200 here and fail, so success proves no segmenting
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("accept-ranges", "bytes")
                    .set_body_bytes(body(100)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine(dir.path(), 1024);
        let local = engine
            .download_to_local(&format!("{}/f", server.uri()), "a.bin", 8)
            .await
            .unwrap();
        assert_eq!(local.bytes, 100);
    }

    #[tokio::test]
    async fn cancel_all_aborts_in_flight_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine(dir.path(), 10 * 1024 * 1024);
        let engine = Arc::new(engine);

        let handle = {
            let engine = Arc::clone(&engine);
            let url = format!("{}/f", server.uri());
            tokio::spawn(async move { engine.download_to_local(&url, "slow.bin", 1).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.cancel_all().await;

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled), "got {err:?}");
        assert!(!dir.path().join("slow.bin").exists());

        // A fresh download after cancelling works normally
        let server2 = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server2)
            .await;
        let local = engine
            .download_to_local(&format!("{}/f", server2.uri()), "after.bin", 1)
            .await
            .unwrap();
        assert_eq!(local.bytes, 2);
    }
}
