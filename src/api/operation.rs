use crate::activity::ActivityHandle;
use crate::error::ReaderError;
use reqwest::Method;
use url::Url;

/// One remote call, described as data.
///
/// Services build operations; the dispatcher turns them into authenticated
/// requests. `mutating` operations additionally carry the action token.
#[derive(Debug, Clone)]
pub struct ApiOperation {
    /// Short name used in logs and activity lines
    pub name: &'static str,
    pub method: Method,
    /// Path relative to the API base, already percent-encoded
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub mutating: bool,
    pub activity: Option<ActivityHandle>,
}

impl ApiOperation {
    /// A read-only `GET`.
    pub fn get(name: &'static str, path: impl Into<String>) -> Self {
        Self::new(name, Method::GET, path, false)
    }

    /// A state-changing `POST`.
    pub fn post(name: &'static str, path: impl Into<String>) -> Self {
        Self::new(name, Method::POST, path, true)
    }

    fn new(name: &'static str, method: Method, path: impl Into<String>, mutating: bool) -> Self {
        Self {
            name,
            method,
            path: path.into(),
            query: Vec::new(),
            form: Vec::new(),
            mutating,
            activity: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    /// Reports the outcome to `handle` once the call completes.
    pub fn with_activity(mut self, handle: ActivityHandle) -> Self {
        self.activity = Some(handle);
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        lookup(&self.query, key)
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        lookup(&self.form, key)
    }

    /// Full request URL: base + path + query + `client`.
    pub(crate) fn url(&self, api_base: &Url, client_name: &str) -> Result<Url, ReaderError> {
        let mut url = api_base
            .join(&self.path)
            .map_err(|e| ReaderError::InvalidRequest(format!("{}: {}", self.path, e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("client", client_name);
        }
        Ok(url)
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
