use crate::error::DownloadError;
use futures_util::TryStreamExt;
use reqwest::header::LOCATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use url::{Host, Url};

pub const MAX_REDIRECTS: usize = 10;

/// Credentials attached to every request of a download, redirects included.
#[derive(Clone)]
pub enum Auth {
    None,
    Basic { user: String, secret: String },
    Bearer(String),
}

impl Auth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => request,
            Auth::Basic { user, secret } => request.basic_auth(user, Some(secret)),
            Auth::Bearer(token) => request.bearer_auth(token),
        }
    }
}

/// Whether credentials meant for `origin` may be sent to `next`: the same host, or a sibling
/// under the origin's parent domain such as `download.` next to `catalogue.`.
fn shares_credentials(origin: &Url, next: &Url) -> bool {
    match (origin.host(), next.host()) {
        (Some(Host::Domain(origin)), Some(Host::Domain(next))) => {
            origin.eq_ignore_ascii_case(next)
                || origin.split_once('.').is_some_and(|(_, parent)| {
                    parent.contains('.')
                        && next
                            .to_ascii_lowercase()
                            .ends_with(&format!(".{}", parent.to_ascii_lowercase()))
                })
        }
        (Some(origin), Some(next)) => origin == next,
        _ => false,
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

async fn send(client: &Client, url: &str, auth: &Auth) -> Result<Response, DownloadError> {
    auth.apply(client.get(url))
        .send()
        .await
        .map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })
}

/// Requests `url`, following redirects. `auth` is re-attached at each hop that stays within
/// the origin's domain and dropped for any other host.
pub async fn resolve(client: &Client, url: &str, auth: &Auth) -> Result<Response, DownloadError> {
    let mut response = send(client, url, auth).await?;
    let origin: Url = response.url().clone();
    let anonymous = Auth::None;
    let mut hops = 0;
    while is_redirect(response.status()) {
        hops += 1;
        if hops > MAX_REDIRECTS {
            return Err(DownloadError::TooManyRedirects(MAX_REDIRECTS));
        }
        let current: Url = response.url().clone();
        let next: Url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| current.join(location).ok())
            .ok_or_else(|| DownloadError::Location(current.to_string()))?;
        let hop_auth = if shares_credentials(&origin, &next) {
            auth
        } else {
            tracing::debug!("Not forwarding credentials to {}", next.host_str().unwrap_or_default());
            &anonymous
        };
        tracing::debug!("Following redirect to {next}");
        response = send(client, next.as_str(), hop_auth).await?;
    }

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: response.url().to_string(),
            status,
        });
    }
    Ok(response)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut partial = OsString::from(output.as_os_str());
    partial.push(".partial");
    PathBuf::from(partial)
}

/// Downloads `url` to `output`. Bytes go to `<output>.partial`, which is renamed once complete
/// and removed if anything fails.
pub async fn fetch_to_file(
    client: &Client,
    url: &str,
    auth: &Auth,
    output: &Path,
) -> Result<PathBuf, DownloadError> {
    let partial = partial_path(output);
    let result = stream_to(client, url, auth, &partial).await;
    match result {
        Ok(byte_count) => {
            fs::rename(&partial, output).map_err(|source| DownloadError::Io {
                path: output.to_path_buf(),
                source,
            })?;
            tracing::debug!("Wrote {byte_count} bytes to {}", output.display());
            Ok(output.to_path_buf())
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

async fn stream_to(
    client: &Client,
    url: &str,
    auth: &Auth,
    partial: &Path,
) -> Result<u64, DownloadError> {
    let io_error = |source: std::io::Error| DownloadError::Io {
        path: partial.to_path_buf(),
        source,
    };

    let response = resolve(client, url, auth).await?;
    let final_url = response.url().to_string();
    let mut file = File::create(partial).map_err(io_error)?;

    let mut byte_count = 0_u64;
    let mut body = response.bytes_stream();
    while let Some(bytes) = body
        .try_next()
        .await
        .map_err(|source| DownloadError::Request {
            url: final_url.clone(),
            source,
        })?
    {
        file.write_all(&bytes).map_err(io_error)?;
        byte_count += bytes.len() as u64;
    }
    file.flush().map_err(io_error)?;
    Ok(byte_count)
}
