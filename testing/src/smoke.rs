//! HTTP smoke checks against the application under test.
//!
//! Fetches a page and compares its `<title>`. No browser involved: scripts
//! do not run, so the title must be in the served HTML.

use errors::{FixtureError, FixtureResult};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// `SMOKE_BASE_URL`, or [`DEFAULT_BASE_URL`].
pub fn base_url() -> String {
    std::env::var("SMOKE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

pub async fn page_title(url: &str) -> FixtureResult<String> {
    let smoke_error = |reason: String| FixtureError::Smoke {
        url: url.to_string(),
        reason
    };

    let response = reqwest::get(url)
        .await
        .map_err(|e| smoke_error(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(smoke_error(format!("status {status}")));
    }
    let body = response
        .text()
        .await
        .map_err(|e| smoke_error(e.to_string()))?;

    extract_title(&body).ok_or_else(|| smoke_error("page has no <title>".to_string()))
}

pub async fn expect_title(url: &str, expected: &str) -> FixtureResult<()> {
    let title = page_title(url).await?;
    if title == expected {
        Ok(())
    } else {
        Err(FixtureError::Smoke {
            url: url.to_string(),
            reason: format!("expected title {expected:?}, got {title:?}")
        })
    }
}

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_len = lower[content_start..].find("</title")?;
    Some(html[content_start..content_start + content_len].trim().to_string())
}
