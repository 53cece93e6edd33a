//! 基于 reqwest 的 HTTP 传输实现

use super::{ByteRange, ProbeResult, Transport};
use crate::download::info::{InitInfo, RangeInfo};
use crate::error::DownloadError;
use crate::request::Request;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP 传输通道
///
/// 元数据探测优先使用 HEAD，服务端不接受时回退到 GET（立即丢弃
/// 响应体）。探测请求总是带 `Range: bytes=0-`，服务端是否按区间
/// 响应（206 或 Content-Range）是最可靠的支持依据。
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DownloadError::transfer(format!("创建HTTP客户端失败: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn request_headers(request: &Request) -> Result<HeaderMap, DownloadError> {
        let mut headers = HeaderMap::new();
        for (key, value) in request.headers() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| DownloadError::transfer(format!("非法请求头名 {}: {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| DownloadError::transfer(format!("非法请求头值 {}: {}", key, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn probe_from_response(request: &Request, response: &reqwest::Response) -> ProbeResult {
        let headers = response.headers();

        // Content-Range 的总长度比 Content-Length 更权威（206 响应）
        let content_length = headers
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .or_else(|| {
                headers
                    .get(reqwest::header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .unwrap_or(-1);

        let last_modified = headers
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let mime_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let file_name = headers
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_disposition_file_name)
            .or_else(|| file_name_from_url(request.url()))
            .unwrap_or_else(|| "download".to_string());

        let chunked = headers
            .get(reqwest::header::TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);

        let range_supportable =
            evaluate_range_support(response.status(), headers, chunked, content_length);

        ProbeResult {
            init_info: InitInfo {
                file_name,
                last_modified,
                content_length,
                mime_type,
            },
            range_info: RangeInfo {
                range_supportable,
                chunked,
            },
        }
    }
}

/// 断点续传支持判定
///
/// 服务端必须对 `Range: bytes=0-` 探测做出区间应答（206 或回带
/// Content-Range，Accept-Ranges: bytes 亦算承诺）；chunked 传输或
/// 总长度未知时无法按字节区间切分，一律视为不支持。
fn evaluate_range_support(
    status: StatusCode,
    headers: &HeaderMap,
    chunked: bool,
    content_length: i64,
) -> bool {
    let acknowledged = status == StatusCode::PARTIAL_CONTENT
        || headers.contains_key(reqwest::header::CONTENT_RANGE)
        || headers
            .get(reqwest::header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);
    acknowledged && !chunked && content_length != -1
}

/// 从 Content-Range 提取总长度：`bytes 0-99/1000` -> 1000，`/*` 未知
fn content_range_total(value: &str) -> Option<i64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

/// 从 Content-Disposition 提取文件名
fn parse_disposition_file_name(value: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"filename\*?=(?:UTF-8''|")?([^";]+)"?"#).expect("文件名正则")
    });
    re.captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 从 URL 路径末段提取文件名
fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    if name.is_empty() || name.contains(':') {
        None
    } else {
        Some(name.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, request: &Request) -> Result<ProbeResult, DownloadError> {
        let mut headers = Self::request_headers(request)?;
        // 探测即带区间请求，逼出服务端的 206 / Content-Range 应答
        headers.insert(reqwest::header::RANGE, HeaderValue::from_static("bytes=0-"));

        let head = self
            .client
            .head(request.url())
            .headers(headers.clone())
            .send()
            .await;

        let response = match head {
            Ok(resp) if resp.status().is_success() => resp,
            other => {
                // 部分服务端不实现 HEAD，回退到 GET 并丢弃响应体
                if let Ok(resp) = &other {
                    debug!("HEAD探测被拒绝({}), 回退到GET: {}", resp.status(), request.url());
                } else {
                    debug!("HEAD探测失败, 回退到GET: {}", request.url());
                }
                let resp = self
                    .client
                    .get(request.url())
                    .headers(headers)
                    .send()
                    .await
                    .map_err(|e| DownloadError::probe(format!("探测请求失败: {}", e)))?;
                if !resp.status().is_success() {
                    return Err(DownloadError::probe(format!(
                        "探测请求返回错误状态: {}",
                        resp.status()
                    )));
                }
                resp
            }
        };

        Ok(Self::probe_from_response(request, &response))
    }

    async fn open_stream(
        &self,
        request: &Request,
        range: ByteRange,
    ) -> Result<BoxStream<'static, Result<Bytes, DownloadError>>, DownloadError> {
        let mut headers = Self::request_headers(request)?;
        if let Some(start) = range.start {
            let value = match range.end {
                Some(end) => format!("bytes={}-{}", start, end),
                None => format!("bytes={}-", start),
            };
            headers.insert(
                reqwest::header::RANGE,
                HeaderValue::from_str(&value)
                    .map_err(|e| DownloadError::transfer(format!("非法Range头: {}", e)))?,
            );
        }

        let response = self
            .client
            .get(request.url())
            .headers(headers)
            .send()
            .await
            .map_err(|e| DownloadError::transfer(format!("发起下载请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::transfer(format!(
                "下载请求返回错误状态: {}",
                status
            )));
        }
        if range.start.is_some() && status != StatusCode::PARTIAL_CONTENT {
            warn!("服务端忽略了Range头, 返回 {}: {}", status, request.url());
            return Err(DownloadError::transfer(format!(
                "服务端未按Range响应: {}",
                status
            )));
        }

        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(|e| DownloadError::transfer(format!("读取数据流失败: {}", e))))
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_disposition_file_name() {
        assert_eq!(
            parse_disposition_file_name(r#"attachment; filename="report.pdf""#),
            Some("report.pdf".to_string())
        );
        assert_eq!(
            parse_disposition_file_name("attachment; filename=report.pdf"),
            Some("report.pdf".to_string())
        );
        assert_eq!(
            parse_disposition_file_name("attachment; filename*=UTF-8''%E6%96%87%E4%BB%B6.bin"),
            Some("%E6%96%87%E4%BB%B6.bin".to_string())
        );
        assert_eq!(parse_disposition_file_name("inline"), None);
    }

    fn headers_of(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_range_support_requires_range_acknowledgement() {
        // 206 应答即支持
        assert!(evaluate_range_support(
            StatusCode::PARTIAL_CONTENT,
            &headers_of(&[]),
            false,
            100,
        ));
        // 200 但回带 Content-Range 同样算应答
        assert!(evaluate_range_support(
            StatusCode::OK,
            &headers_of(&[("content-range", "bytes 0-99/100")]),
            false,
            100,
        ));
        // Accept-Ranges: bytes 的承诺也接受
        assert!(evaluate_range_support(
            StatusCode::OK,
            &headers_of(&[("accept-ranges", "bytes")]),
            false,
            100,
        ));
        // 对区间探测只回普通 200，不支持
        assert!(!evaluate_range_support(
            StatusCode::OK,
            &headers_of(&[]),
            false,
            100,
        ));
    }

    #[test]
    fn test_range_support_excludes_chunked_and_unknown_length() {
        // chunked 传输无法按字节区间切分
        assert!(!evaluate_range_support(
            StatusCode::PARTIAL_CONTENT,
            &headers_of(&[("accept-ranges", "bytes")]),
            true,
            100,
        ));
        // 总长度未知同样退化为整体下载
        assert!(!evaluate_range_support(
            StatusCode::PARTIAL_CONTENT,
            &headers_of(&[("accept-ranges", "bytes")]),
            false,
            -1,
        ));
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("bytes 0-99/1000"), Some(1000));
        assert_eq!(content_range_total("bytes 0-99/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/a/b/video.mp4?sig=1"),
            Some("video.mp4".to_string())
        );
        assert_eq!(file_name_from_url("https://example.com/"), None);
    }
}
