//! GUS BIR 1.1 client.
//!
//! The service speaks SOAP 1.2 with WS-Addressing. A session id obtained
//! from `Zaloguj` is sent in the `sid` HTTP header on every later call.
//! Query results arrive as an XML-escaped document inside the
//! `<...Result>` element; each `<dane>` child becomes one [`Record`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{Record, RegistryClient, SearchKey, StatusReport};
use crate::core::error::ErrorRecord;

pub const TEST_ENDPOINT: &str =
    "https://wyszukiwarkaregontest.stat.gov.pl/wsBIR/UslugaBIRzewnPubl.svc";
pub const PRODUCTION_ENDPOINT: &str =
    "https://wyszukiwarkaregon.stat.gov.pl/wsBIR/UslugaBIRzewnPubl.svc";

const PUBL_NS: &str = "http://CIS/BIR/PUBL/2014/07";
const BIR_NS: &str = "http://CIS/BIR/2014/07";
const DATA_NS: &str = "http://CIS/BIR/PUBL/2014/07/DataContract";

const PUBL_ACTION: &str = "http://CIS/BIR/PUBL/2014/07/IUslugaBIRzewnPubl";
const BIR_ACTION: &str = "http://CIS/BIR/2014/07/IUslugaBIR";

/// `KomunikatKod` values with a meaning for the client.
mod message_code {
    pub const NO_DATA: i64 = 4;
    pub const NO_SESSION: i64 = 7;
}

/// Client for the BIR 1.1 public service.
pub struct BirClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    sid: RwLock<Option<String>>,
}

impl std::fmt::Debug for BirClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BirClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl BirClient {
    /// Create a client for an explicit endpoint.
    ///
    /// `timeout` bounds each HTTP exchange.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ErrorRecord> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ErrorRecord::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            sid: RwLock::new(None),
        })
    }

    /// Create a client for the production or test environment.
    pub fn for_mode(
        production: bool,
        endpoint_override: Option<&str>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ErrorRecord> {
        let endpoint = endpoint_override.unwrap_or(if production {
            PRODUCTION_ENDPOINT
        } else {
            TEST_ENDPOINT
        });
        Self::new(endpoint, api_key, timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(
        &self,
        action: &str,
        body: String,
        sid: Option<&str>,
    ) -> Result<String, ErrorRecord> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("application/soap+xml; charset=utf-8; action=\"{}\"", action),
            )
            .body(body);
        if let Some(sid) = sid {
            request = request.header("sid", sid);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(classify_transport)?;

        if let Some(err) = classify_status(status.as_u16(), &text) {
            return Err(err);
        }
        Ok(text)
    }

    async fn session_id(&self) -> Result<String, ErrorRecord> {
        if let Some(sid) = self.sid.read().await.clone() {
            return Ok(sid);
        }

        let mut guard = self.sid.write().await;
        // Another task may have logged in while we waited for the lock
        if let Some(sid) = guard.clone() {
            return Ok(sid);
        }

        let action = format!("{}/Zaloguj", PUBL_ACTION);
        let body = envelope(
            &action,
            &self.endpoint,
            &format!(
                "<ns:Zaloguj><ns:pKluczUzytkownika>{}</ns:pKluczUzytkownika></ns:Zaloguj>",
                escape(&self.api_key)
            ),
        );
        let response = self.post(&action, body, None).await?;
        let sid = element_text(&response, "ZalogujResult")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if sid.is_empty() {
            return Err(ErrorRecord::authentication(
                "Registry rejected the API key (empty session id)",
            ));
        }

        info!("Logged in to registry at {}", self.endpoint);
        *guard = Some(sid.clone());
        Ok(sid)
    }

    async fn forget_session(&self) {
        self.sid.write().await.take();
    }

    /// `GetValue` with the current session.
    async fn get_value(&self, parameter: &str) -> Result<String, ErrorRecord> {
        let sid = self.session_id().await?;
        let action = format!("{}/GetValue", BIR_ACTION);
        let body = envelope(
            &action,
            &self.endpoint,
            &format!(
                "<bir:GetValue><bir:pNazwaParametru>{}</bir:pNazwaParametru></bir:GetValue>",
                parameter
            ),
        );
        let response = self.post(&action, body, Some(&sid)).await?;
        Ok(element_text(&response, "GetValueResult")
            .map(|s| unescape(s).trim().to_string())
            .unwrap_or_default())
    }

    async fn get_code(&self, parameter: &str) -> Result<i64, ErrorRecord> {
        let raw = self.get_value(parameter).await?;
        raw.parse().map_err(|_| {
            ErrorRecord::upstream(format!("Registry returned non-numeric {}: '{}'", parameter, raw))
        })
    }

    /// Run a data query and turn its result into records.
    ///
    /// An empty result is resolved through `KomunikatKod`: "no data" is an
    /// empty vector, an expired session is dropped and reported as a
    /// transient failure so the retry logs in again.
    async fn query(&self, operation: &str, inner: String) -> Result<Vec<Record>, ErrorRecord> {
        let sid = self.session_id().await?;
        let action = format!("{}/{}", PUBL_ACTION, operation);
        let body = envelope(&action, &self.endpoint, &inner);
        let response = self.post(&action, body, Some(&sid)).await?;

        let result = element_text(&response, &format!("{}Result", operation))
            .map(unescape)
            .unwrap_or_default();
        if !result.trim().is_empty() {
            return Ok(parse_records(&result));
        }

        let code = self.get_code("KomunikatKod").await?;
        match code {
            message_code::NO_DATA | 0 => Ok(Vec::new()),
            message_code::NO_SESSION => {
                warn!("Registry session expired, logging in again on next attempt");
                self.forget_session().await;
                Err(ErrorRecord::upstream_transient("Registry session expired"))
            }
            other => {
                let message = self.get_value("KomunikatTresc").await.unwrap_or_default();
                Err(ErrorRecord::upstream(format!(
                    "Registry error {}: {}",
                    other,
                    if message.is_empty() { "no message" } else { &message }
                )))
            }
        }
    }
}

#[async_trait]
impl RegistryClient for BirClient {
    async fn search(&self, key: &SearchKey) -> Result<Vec<Record>, ErrorRecord> {
        debug!("Searching registry by {}", key.parameter());
        let inner = format!(
            "<ns:DaneSzukajPodmioty><ns:pParametryWyszukiwania><dat:{p}>{v}</dat:{p}></ns:pParametryWyszukiwania></ns:DaneSzukajPodmioty>",
            p = key.parameter(),
            v = escape(&key.value())
        );
        self.query("DaneSzukajPodmioty", inner).await
    }

    async fn full_report(&self, regon: &str, report: &str) -> Result<Vec<Record>, ErrorRecord> {
        debug!("Downloading report {} for REGON {}", report, regon);
        let inner = format!(
            "<ns:DanePobierzPelnyRaport><ns:pRegon>{}</ns:pRegon><ns:pNazwaRaportu>{}</ns:pNazwaRaportu></ns:DanePobierzPelnyRaport>",
            escape(regon),
            escape(report)
        );
        self.query("DanePobierzPelnyRaport", inner).await
    }

    async fn service_status(&self) -> Result<StatusReport, ErrorRecord> {
        let code = self.get_code("StatusUslugi").await?;
        let message = match code {
            1 => "Service available",
            2 => "Service unavailable",
            0 => "Technical break",
            _ => "Unknown status",
        };
        Ok(StatusReport {
            code,
            message: message.to_string(),
        })
    }

    async fn data_status(&self) -> Result<Option<String>, ErrorRecord> {
        let value = self.get_value("StanDanych").await?;
        Ok(Some(value).filter(|v| !v.is_empty()))
    }

    async fn last_code(&self) -> Result<StatusReport, ErrorRecord> {
        let code = self.get_code("KomunikatKod").await?;
        let message = self.get_value("KomunikatTresc").await?;
        Ok(StatusReport { code, message })
    }

    async fn session_status(&self) -> Result<StatusReport, ErrorRecord> {
        let code = self.get_code("StatusSesji").await?;
        let message = if code == 1 {
            "Session active"
        } else {
            "Session inactive"
        };
        Ok(StatusReport {
            code,
            message: message.to_string(),
        })
    }

    async fn login(&self) -> Result<(), ErrorRecord> {
        self.session_id().await.map(|_| ())
    }
}

fn classify_transport(err: reqwest::Error) -> ErrorRecord {
    if err.is_timeout() {
        ErrorRecord::network(format!("Registry request timed out: {}", err))
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ErrorRecord::network(format!("Registry unreachable: {}", err))
    } else {
        ErrorRecord::upstream(format!("Registry request failed: {}", err))
    }
}

fn classify_status(status: u16, body: &str) -> Option<ErrorRecord> {
    match status {
        200..=299 => None,
        401 | 403 => Some(ErrorRecord::authentication(format!(
            "Registry refused access (HTTP {})",
            status
        ))),
        408 | 429 => Some(ErrorRecord::upstream_transient(format!(
            "Registry throttled the request (HTTP {})",
            status
        ))),
        500..=599 => {
            let fault = element_text(body, "Text").map(|t| unescape(t).trim().to_string());
            Some(ErrorRecord::upstream_transient(format!(
                "Registry server error (HTTP {}){}",
                status,
                fault.map(|f| format!(": {}", f)).unwrap_or_default()
            )))
        }
        _ => Some(ErrorRecord::upstream(format!(
            "Registry returned HTTP {}",
            status
        ))),
    }
}

fn envelope(action: &str, endpoint: &str, body: &str) -> String {
    format!(
        concat!(
            r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope" "#,
            r#"xmlns:ns="{publ}" xmlns:bir="{bir}" xmlns:dat="{data}">"#,
            r#"<soap:Header xmlns:wsa="http://www.w3.org/2005/08/addressing">"#,
            r#"<wsa:Action>{action}</wsa:Action><wsa:To>{to}</wsa:To>"#,
            r#"</soap:Header><soap:Body>{body}</soap:Body></soap:Envelope>"#
        ),
        publ = PUBL_NS,
        bir = BIR_NS,
        data = DATA_NS,
        action = action,
        to = endpoint,
        body = body
    )
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Decode the predefined XML entities and numeric character references.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let Some(end) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16).ok())
                .unwrap_or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Text content of the first element whose local name is `tag`.
///
/// Namespace prefixes are ignored; a self-closing element yields `""`.
fn element_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let mut offset = 0;
    while let Some(rel) = xml[offset..].find('<') {
        let start = offset + rel;
        let after = &xml[start + 1..];
        let name_len = after
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(after.len());
        let qualified = &after[..name_len];
        let local = qualified.rsplit(':').next().unwrap_or(qualified);

        if local == tag && !qualified.is_empty() {
            let close_rel = after.find('>')?;
            let content_start = start + 1 + close_rel + 1;
            if after[..close_rel].ends_with('/') {
                return Some("");
            }
            let closing = format!("</{}>", qualified);
            let content_end = xml[content_start..].find(&closing)? + content_start;
            return Some(&xml[content_start..content_end]);
        }
        offset = start + 1;
    }
    None
}

/// Split a decoded result document into one record per `<dane>` element.
fn parse_records(xml: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find("<dane>") {
        let body_start = start + "<dane>".len();
        let Some(len) = rest[body_start..].find("</dane>") else {
            break;
        };
        records.push(parse_fields(&rest[body_start..body_start + len]));
        rest = &rest[body_start + len + "</dane>".len()..];
    }

    records
}

fn parse_fields(body: &str) -> Record {
    let mut record = Record::new();
    let mut rest = body;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            break;
        };
        let tag = &after[..close];
        if tag.starts_with('/') || tag.starts_with('?') || tag.starts_with('!') {
            rest = &after[close + 1..];
            continue;
        }

        if let Some(name) = tag.strip_suffix('/') {
            record.insert(name.trim().to_string(), Value::String(String::new()));
            rest = &after[close + 1..];
            continue;
        }

        let name = tag.split_whitespace().next().unwrap_or(tag);
        let content = &after[close + 1..];
        let closing = format!("</{}>", name);
        match content.find(&closing) {
            Some(end) => {
                let text = unescape(content[..end].trim());
                record.insert(name.to_string(), Value::String(text));
                rest = &content[end + closing.len()..];
            }
            None => {
                rest = content;
            }
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    const SEARCH_RESPONSE: &str = concat!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body>"#,
        r#"<DaneSzukajPodmiotyResponse xmlns="http://CIS/BIR/PUBL/2014/07">"#,
        r#"<DaneSzukajPodmiotyResult>&lt;root&gt;&#xD;"#,
        r#"&lt;dane&gt;&lt;Regon&gt;000331501&lt;/Regon&gt;"#,
        r#"&lt;Nip&gt;5261040828&lt;/Nip&gt;"#,
        r#"&lt;Nazwa&gt;GŁÓWNY URZĄD STATYSTYCZNY&lt;/Nazwa&gt;"#,
        r#"&lt;KodPocztowy /&gt;&lt;/dane&gt;&lt;/root&gt;"#,
        r#"</DaneSzukajPodmiotyResult></DaneSzukajPodmiotyResponse></s:Body></s:Envelope>"#
    );

    #[test]
    fn test_element_text_ignores_prefix() {
        let xml = "<a:Envelope><a:Body><ZalogujResult>abc123</ZalogujResult></a:Body></a:Envelope>";
        assert_eq!(element_text(xml, "ZalogujResult"), Some("abc123"));
        assert_eq!(element_text("<x:Result/>", "Result"), Some(""));
        assert_eq!(element_text("<Other>1</Other>", "Result"), None);
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape("&lt;a&gt; &amp; &quot;b&quot;"), "<a> & \"b\"");
        assert_eq!(unescape("x&#xD;y&#65;"), "x\ryA");
        assert_eq!(unescape("AT&T"), "AT&T");
    }

    #[test]
    fn test_parse_search_response() {
        let result = element_text(SEARCH_RESPONSE, "DaneSzukajPodmiotyResult")
            .map(unescape)
            .unwrap();
        let records = parse_records(&result);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Regon"], "000331501");
        assert_eq!(records[0]["Nip"], "5261040828");
        assert_eq!(records[0]["Nazwa"], "GŁÓWNY URZĄD STATYSTYCZNY");
        assert_eq!(records[0]["KodPocztowy"], "");
    }

    #[test]
    fn test_parse_multiple_records() {
        let xml = "<root><dane><Regon>1</Regon></dane><dane><Regon>2</Regon></dane></root>";
        let records = parse_records(xml);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["Regon"], "2");
    }

    #[test]
    fn test_envelope_contains_action_and_body() {
        let env = envelope("urn:act", TEST_ENDPOINT, "<ns:Ping/>");
        assert!(env.contains("<wsa:Action>urn:act</wsa:Action>"));
        assert!(env.contains(TEST_ENDPOINT));
        assert!(env.contains("<soap:Body><ns:Ping/></soap:Body>"));
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(200, "").is_none());
        assert_eq!(
            classify_status(401, "").unwrap().kind(),
            ErrorKind::Authentication
        );
        let server = classify_status(503, "<s:Text>Busy</s:Text>").unwrap();
        assert_eq!(server.kind(), ErrorKind::Upstream);
        assert!(server.is_retryable());
        assert!(server.message().contains("Busy"));
        assert!(!classify_status(404, "").unwrap().is_retryable());
    }

    #[test]
    fn test_for_mode_picks_endpoint() {
        let timeout = Duration::from_secs(5);
        let prod = BirClient::for_mode(true, None, "key", timeout).unwrap();
        assert_eq!(prod.endpoint(), PRODUCTION_ENDPOINT);
        let test = BirClient::for_mode(false, None, "key", timeout).unwrap();
        assert_eq!(test.endpoint(), TEST_ENDPOINT);
        let custom =
            BirClient::for_mode(false, Some("http://localhost:9"), "s3cret-key", timeout).unwrap();
        assert_eq!(custom.endpoint(), "http://localhost:9");
        assert!(!format!("{:?}", custom).contains("s3cret-key"));
    }

    /// Local stand-in for the registry: logs in, returns no search data,
    /// and answers `GetValue` with `get_value` or HTTP 503 when `None`.
    #[cfg(feature = "http")]
    async fn stub_registry(get_value: Option<&'static str>) -> BirClient {
        use axum::{Router, http::StatusCode, routing::post};

        let app = Router::new().route(
            "/",
            post(move |body: String| async move {
                if body.contains("Zaloguj") {
                    (
                        StatusCode::OK,
                        "<s:Envelope><s:Body><ZalogujResult>stub-sid</ZalogujResult></s:Body></s:Envelope>".to_string(),
                    )
                } else if body.contains("DaneSzukajPodmioty") {
                    (
                        StatusCode::OK,
                        "<s:Envelope><s:Body><DaneSzukajPodmiotyResult></DaneSzukajPodmiotyResult></s:Body></s:Envelope>".to_string(),
                    )
                } else {
                    match get_value {
                        Some(value) => (
                            StatusCode::OK,
                            format!(
                                "<s:Envelope><s:Body><GetValueResult>{}</GetValueResult></s:Body></s:Envelope>",
                                value
                            ),
                        ),
                        None => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        BirClient::new(format!("http://{}/", addr), "key", Duration::from_secs(5)).unwrap()
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_empty_search_with_no_data_code() {
        let client = stub_registry(Some("4")).await;
        let records = client
            .search(&SearchKey::Nip("5261040828".to_string()))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_failed_code_lookup_is_not_an_empty_result() {
        let client = stub_registry(None).await;
        let err = client
            .search(&SearchKey::Nip("5261040828".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.is_retryable());

        let err = client.last_code().await.unwrap_err();
        assert!(err.message().contains("HTTP 503"));
    }

    #[tokio::test]
    #[ignore] // Requires network access to the GUS test environment
    async fn test_live_search_by_nip() {
        let client = BirClient::for_mode(
            false,
            None,
            crate::core::config::DEFAULT_TEST_API_KEY,
            Duration::from_secs(30),
        )
        .unwrap();
        let records = client
            .search(&SearchKey::Nip("5261040828".to_string()))
            .await
            .unwrap();
        assert!(!records.is_empty());
    }
}
