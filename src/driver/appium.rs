//! Appium HTTP Client
//!
//! Drives a device through an Appium server using the W3C WebDriver wire
//! protocol. One client owns one session.

use super::common::{poll_until, PollConfig};
use super::traits::{AutomationDriver, ElementHandle, Locator, Platform};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Default Appium server URL
pub const DEFAULT_APPIUM_URL: &str = "http://127.0.0.1:4723";

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f6a7fea9a64";

/// Legacy JSONWP element reference key
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// Error reported by the server in a W3C error body
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}: {message}")]
pub struct WireError {
    pub error: String,
    pub message: String,
}

impl WireError {
    fn is(&self, code: &str) -> bool {
        self.error == code
    }
}

/// Generic W3C response
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Appium client for one automation session
pub struct AppiumClient {
    /// Server URL (e.g., "http://127.0.0.1:4723")
    base_url: String,
    client: reqwest::Client,
    session_id: String,
    platform: Platform,
}

impl AppiumClient {
    fn http_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")
    }

    /// Create a new session with the given capabilities
    pub async fn connect(server_url: &str, platform: Platform, capabilities: Value) -> Result<Self> {
        let base_url = server_url.trim_end_matches('/').to_string();
        let client = Self::http_client()?;

        let body = json!({
            "capabilities": {
                "alwaysMatch": capabilities,
                "firstMatch": [{}],
            }
        });

        let resp = client
            .post(format!("{}/session", base_url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Appium server at {}", base_url))?;

        let value = Self::decode(resp).await.context("Failed to create session")?;
        let session: NewSession =
            serde_json::from_value(value).context("No session ID in response")?;

        info!("Created {} session {}", platform, session.session_id);
        Ok(Self {
            base_url,
            client,
            session_id: session.session_id,
            platform,
        })
    }

    /// Attach to a session created elsewhere
    pub fn attach(server_url: &str, platform: Platform, session_id: &str) -> Result<Self> {
        Ok(Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            client: Self::http_client()?,
            session_id: session_id.to_string(),
            platform,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// End the session
    pub async fn close(&self) -> Result<()> {
        self.call(Method::DELETE, "", None)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.session_url(path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        Self::decode(resp).await
    }

    /// Extract `value`, turning W3C error bodies into `WireError`
    async fn decode(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let text = resp.text().await.context("Failed to read response body")?;
        let parsed: WireResponse = serde_json::from_str(&text)
            .with_context(|| format!("Unexpected response ({}): {}", status.as_u16(), text))?;

        if let Some(error) = wire_error(&parsed.value) {
            return Err(error.into());
        }
        if !status.is_success() {
            anyhow::bail!("Appium returned {}: {}", status.as_u16(), text);
        }
        Ok(parsed.value)
    }
}

fn wire_error(value: &Value) -> Option<WireError> {
    let error: ErrorValue = serde_json::from_value(value.clone()).ok()?;
    Some(WireError {
        error: error.error,
        message: error.message,
    })
}

fn has_wire_error(err: &anyhow::Error, code: &str) -> bool {
    err.downcast_ref::<WireError>().is_some_and(|e| e.is(code))
}

/// Read an element reference out of a find-element response
fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(String::from)
}

/// Minimal capabilities for launching `app_id` on `platform`
pub fn default_capabilities(platform: Platform, app_id: &str) -> Value {
    match platform {
        Platform::Android => json!({
            "platformName": "Android",
            "appium:automationName": "UiAutomator2",
            "appium:appPackage": app_id,
            "appium:autoGrantPermissions": true,
        }),
        Platform::Ios => json!({
            "platformName": "iOS",
            "appium:automationName": "XCUITest",
            "appium:bundleId": app_id,
        }),
    }
}

/// Overlay `overrides` onto `base`, key by key
pub fn merge_capabilities(mut base: Value, overrides: Value) -> Value {
    if let (Some(base_map), Value::Object(extra)) = (base.as_object_mut(), overrides) {
        base_map.extend(extra);
    }
    base
}

#[async_trait]
impl AutomationDriver for AppiumClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let body = json!({ "using": locator.using(), "value": locator.value() });
        match self.call(Method::POST, "/element", Some(body)).await {
            Ok(value) => {
                let id = element_id(&value)
                    .ok_or_else(|| anyhow::anyhow!("No element reference in {}", value))?;
                Ok(Some(ElementHandle {
                    element_id: id,
                    locator: locator.clone(),
                }))
            }
            Err(e) if has_wire_error(&e, "no such element") => Ok(None),
            Err(e) => Err(e.context(format!("Failed to find {}", locator))),
        }
    }

    async fn wait_for_exist(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        poll_until(
            || self.find_element(locator),
            PollConfig::with_timeout(timeout),
        )
        .await
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        let path = format!("/element/{}/displayed", element.element_id);
        match self.call(Method::GET, &path, None).await {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(e) if has_wire_error(&e, "stale element reference") => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let path = format!("/element/{}/click", element.element_id);
        self.call(Method::POST, &path, Some(json!({})))
            .await
            .with_context(|| format!("Failed to click {}", element.locator))?;
        Ok(())
    }

    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<()> {
        let clear = format!("/element/{}/clear", element.element_id);
        self.call(Method::POST, &clear, Some(json!({})))
            .await
            .with_context(|| format!("Failed to clear {}", element.locator))?;

        let path = format!("/element/{}/value", element.element_id);
        let chars: Vec<String> = value.chars().map(|c| c.to_string()).collect();
        self.call(Method::POST, &path, Some(json!({ "text": value, "value": chars })))
            .await
            .with_context(|| format!("Failed to type into {}", element.locator))?;
        Ok(())
    }

    async fn contexts(&self) -> Result<Vec<String>> {
        let value = self
            .call(Method::GET, "/contexts", None)
            .await
            .context("Failed to list contexts")?;
        serde_json::from_value(value).context("Failed to parse contexts")
    }

    async fn current_context(&self) -> Result<String> {
        let value = self
            .call(Method::GET, "/context", None)
            .await
            .context("Failed to get current context")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn switch_context(&self, name: &str) -> Result<()> {
        self.call(Method::POST, "/context", Some(json!({ "name": name })))
            .await
            .with_context(|| format!("Failed to switch to context {}", name))?;
        Ok(())
    }

    async fn page_source(&self) -> Result<String> {
        let value = self
            .call(Method::GET, "/source", None)
            .await
            .context("Failed to get source")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_trims_url() {
        let client = AppiumClient::attach("http://localhost:4723/", Platform::Android, "abc").unwrap();
        assert_eq!(client.session_url("/source"), "http://localhost:4723/session/abc/source");
        assert_eq!(client.session_id(), "abc");
    }

    #[test]
    fn test_element_id_keys() {
        assert_eq!(
            element_id(&json!({ ELEMENT_KEY: "42" })).as_deref(),
            Some("42")
        );
        assert_eq!(element_id(&json!({ "ELEMENT": "7" })).as_deref(), Some("7"));
        assert_eq!(element_id(&json!({})), None);
    }

    #[test]
    fn test_wire_error_detection() {
        let value = json!({ "error": "no such element", "message": "not found", "stacktrace": "" });
        let err: anyhow::Error = wire_error(&value).unwrap().into();
        assert!(has_wire_error(&err, "no such element"));
        assert!(!has_wire_error(&err, "stale element reference"));

        assert!(wire_error(&json!("NATIVE_APP")).is_none());
        assert!(wire_error(&json!(null)).is_none());
    }

    #[test]
    fn test_capabilities() {
        let caps = merge_capabilities(
            default_capabilities(Platform::Ios, "com.example.app"),
            json!({ "appium:udid": "0000-1111", "appium:automationName": "XCUITest2" }),
        );
        assert_eq!(caps["appium:bundleId"], "com.example.app");
        assert_eq!(caps["appium:udid"], "0000-1111");
        assert_eq!(caps["appium:automationName"], "XCUITest2");
    }
}
