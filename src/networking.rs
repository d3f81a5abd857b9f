use std::fmt;
use std::io::{self, Read};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use reqwest::blocking::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE, USER_AGENT};
use tracing::{debug, warn};

use crate::error::PsstError;
use crate::settings::{Settings, SettingsStore};

const STATUS_UNAUTHORIZED: u16 = 401;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub form: Vec<(String, String)>,
    pub cookie: Option<String>,
}

pub struct HttpResponse {
    status: u16,
    content_length: Option<u64>,
    set_cookies: Vec<String>,
    body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            content_length: None,
            set_cookies: Vec::new(),
            body: Box::new(body),
        }
    }

    pub fn with_content_length(mut self, content_length: Option<u64>) -> Self {
        self.content_length = content_length;
        self
    }

    pub fn with_set_cookie(mut self, value: impl Into<String>) -> Self {
        self.set_cookies.push(value.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn set_cookies(&self) -> &[String] {
        &self.set_cookies
    }

    pub fn text(mut self) -> io::Result<String> {
        let mut text = String::new();
        self.body.read_to_string(&mut text)?;
        Ok(text)
    }
}

impl Read for HttpResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, PsstError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, PsstError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("psst-data/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PsstError::HttpClient(err.to_string()))?,
        );
        // Only connecting is bounded; archive bodies stream without a deadline.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| PsstError::HttpClient(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, PsstError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);
        if let Some(cookie) = &request.cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder.send().map_err(|err| PsstError::Connectivity {
            url: request.url.clone(),
            message: err.to_string(),
        })?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();

        Ok(HttpResponse {
            status,
            content_length,
            set_cookies,
            body: Box::new(response),
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait CredentialPrompt: Send + Sync {
    fn prompt(&self) -> Result<Credentials, PsstError>;
}

pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&self) -> Result<Credentials, PsstError> {
        let username = inquire::Text::new("Please enter the PSST username:")
            .prompt()
            .map_err(|err| PsstError::Prompt(err.to_string()))?;
        let password = inquire::Password::new("Please enter the PSST password:")
            .without_confirmation()
            .prompt()
            .map_err(|err| PsstError::Prompt(err.to_string()))?;
        Ok(Credentials { username, password })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCookie {
    pub header: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthCookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

pub fn parse_set_cookies(values: &[String], now: DateTime<Utc>) -> Option<AuthCookie> {
    let mut pairs = Vec::new();
    let mut expires_at: Option<DateTime<Utc>> = None;

    for value in values {
        let mut parts = value.split(';').map(str::trim);
        let Some(pair) = parts.next().filter(|pair| pair.contains('=')) else {
            continue;
        };
        pairs.push(pair.to_string());

        let mut max_age = None;
        let mut expires = None;
        for attribute in parts {
            let Some((name, attr_value)) = attribute.split_once('=') else {
                continue;
            };
            match name.trim().to_ascii_lowercase().as_str() {
                "max-age" => {
                    max_age = attr_value
                        .trim()
                        .parse::<i64>()
                        .ok()
                        .and_then(TimeDelta::try_seconds)
                        .and_then(|delta| now.checked_add_signed(delta));
                }
                "expires" => expires = parse_cookie_date(attr_value.trim()),
                _ => {}
            }
        }

        if let Some(at) = max_age.or(expires) {
            expires_at = Some(expires_at.map_or(at, |current| current.min(at)));
        }
    }

    if pairs.is_empty() {
        return None;
    }
    Some(AuthCookie {
        header: pairs.join("; "),
        expires_at,
    })
}

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

enum Attempt {
    Response(HttpResponse),
    Unauthorized,
}

pub struct Session<T: Transport, P: CredentialPrompt> {
    transport: T,
    prompt: P,
    settings: SettingsStore,
    cookie: Mutex<Option<AuthCookie>>,
}

impl<T: Transport, P: CredentialPrompt> Session<T, P> {
    pub fn new(transport: T, prompt: P, settings: SettingsStore) -> Self {
        Self {
            transport,
            prompt,
            settings,
            cookie: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Sends `method url` with the session cookie. A 401 invalidates the
    /// cached login, asks for credentials again and retries exactly once.
    pub fn request(&self, method: Method, url: &str) -> Result<HttpResponse, PsstError> {
        for reprompt in [false, true] {
            match self.attempt(method, url, reprompt)? {
                Attempt::Response(response) => return Ok(response),
                Attempt::Unauthorized => {
                    self.invalidate();
                    if !reprompt {
                        warn!("credentials were rejected for {url}");
                    }
                }
            }
        }
        Err(PsstError::Unauthorized {
            url: url.to_string(),
        })
    }

    pub fn invalidate(&self) {
        *self.lock_cookie() = None;
    }

    fn attempt(&self, method: Method, url: &str, reprompt: bool) -> Result<Attempt, PsstError> {
        let Some(cookie) = self.cookie(reprompt)? else {
            return Ok(Attempt::Unauthorized);
        };
        let response = self.transport.execute(HttpRequest {
            method,
            url: url.to_string(),
            form: Vec::new(),
            cookie: (!cookie.is_empty()).then_some(cookie),
        })?;
        if response.status() == STATUS_UNAUTHORIZED {
            return Ok(Attempt::Unauthorized);
        }
        check_status(response, url).map(Attempt::Response)
    }

    /// The current cookie header, logging in first when there is none or it
    /// has expired. `None` means the login itself was refused.
    fn cookie(&self, reprompt: bool) -> Result<Option<String>, PsstError> {
        if !reprompt {
            if let Some(cookie) = self.lock_cookie().as_ref() {
                if !cookie.is_expired(Utc::now()) {
                    return Ok(Some(cookie.header.clone()));
                }
            }
        }

        let settings = self.settings.load()?;
        let credentials = self.credentials(&settings, reprompt)?;
        let login_url = format!("{}/authorizeUser", settings.auth_server.trim_end_matches('/'));
        debug!("logging in to {login_url} as {}", credentials.username);
        let response = self.transport.execute(HttpRequest {
            method: Method::Post,
            url: login_url.clone(),
            form: vec![
                ("userID".to_string(), credentials.username),
                ("pswd".to_string(), credentials.password),
            ],
            cookie: None,
        })?;
        if response.status() == STATUS_UNAUTHORIZED {
            return Ok(None);
        }
        let response = check_status(response, &login_url)?;

        let cookie = parse_set_cookies(response.set_cookies(), Utc::now()).unwrap_or(AuthCookie {
            header: String::new(),
            expires_at: None,
        });
        let header = cookie.header.clone();
        *self.lock_cookie() = Some(cookie);
        Ok(Some(header))
    }

    fn credentials(&self, settings: &Settings, reprompt: bool) -> Result<Credentials, PsstError> {
        if !reprompt && settings.has_credentials() {
            return Ok(Credentials {
                username: settings.download_username.clone(),
                password: settings.download_password.clone(),
            });
        }
        let credentials = self.prompt.prompt()?;
        self.settings.save(&Settings {
            download_username: credentials.username.clone(),
            download_password: credentials.password.clone(),
            ..settings.clone()
        })?;
        Ok(credentials)
    }

    fn lock_cookie(&self) -> std::sync::MutexGuard<'_, Option<AuthCookie>> {
        self.cookie
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn check_status(response: HttpResponse, url: &str) -> Result<HttpResponse, PsstError> {
    if response.is_success() {
        return Ok(response);
    }
    let status = response.status();
    let message = response
        .text()
        .ok()
        .map(|text| text.trim().chars().take(200).collect::<String>())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "request failed".to_string());
    Err(PsstError::HttpStatus {
        url: url.to_string(),
        status,
        message,
    })
}
