use super::ApiOperation;
use crate::activity::ActivityLog;
use crate::auth::{AuthError, Authenticator};
use crate::error::ReaderError;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use url::Url;

/// Header the service sets when it rejects a token without a 401.
const BAD_TOKEN_HEADER: &str = "X-Reader-Google-Bad-Token";

/// Ensure-then-read attempts before giving up on a token that keeps vanishing.
const CREDENTIAL_ROUNDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

/// Lifecycle of one dispatched operation. At most one `RetryAuth`.
enum DispatchState {
    Unsent(Attempt),
    Sent {
        attempt: Attempt,
        /// Credential epoch the request was authorized under
        epoch: u64,
        response: HttpResponse,
    },
    RetryAuth {
        epoch: u64,
    },
    Done(HttpResponse),
    Failed(ReaderError),
}

/// Turns [`ApiOperation`]s into authenticated requests and runs them to a
/// terminal outcome.
///
/// An auth rejection triggers one re-authentication and one resubmission;
/// a second rejection clears credentials and fails with `AuthFailure`.
/// Transport errors never touch the tokens.
pub struct RequestDispatcher {
    api_base: Url,
    client_name: String,
    auth: Authenticator,
    transport: Arc<dyn Transport>,
    activity_log: Arc<dyn ActivityLog>,
}

impl RequestDispatcher {
    pub fn new(
        api_base: Url,
        client_name: impl Into<String>,
        auth: Authenticator,
        transport: Arc<dyn Transport>,
        activity_log: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            api_base,
            client_name: client_name.into(),
            auth,
            transport,
            activity_log,
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Sends `operation` and returns the successful response.
    pub async fn send(&self, operation: &ApiOperation) -> Result<HttpResponse, ReaderError> {
        let result = self.run(operation).await;
        self.report(operation, &result);
        result
    }

    async fn run(&self, operation: &ApiOperation) -> Result<HttpResponse, ReaderError> {
        let url = operation.url(&self.api_base, &self.client_name)?;
        let mut state = DispatchState::Unsent(Attempt::First);

        loop {
            state = match state {
                DispatchState::Unsent(attempt) => match self.submit(operation, &url).await {
                    Ok((epoch, response)) => DispatchState::Sent {
                        attempt,
                        epoch,
                        response,
                    },
                    Err(err) => DispatchState::Failed(err),
                },
                DispatchState::Sent {
                    attempt,
                    epoch,
                    response,
                } => {
                    if !is_auth_rejection(&response) {
                        if response.is_success() {
                            DispatchState::Done(response)
                        } else {
                            tracing::debug!(
                                operation = operation.name,
                                status = response.status.as_u16(),
                                "Request failed"
                            );
                            DispatchState::Failed(ReaderError::HttpStatus(response.status.as_u16()))
                        }
                    } else if attempt == Attempt::First {
                        tracing::info!(operation = operation.name, "Token rejected, retrying once");
                        DispatchState::RetryAuth { epoch }
                    } else {
                        tracing::warn!(
                            operation = operation.name,
                            "Token rejected after re-authentication"
                        );
                        self.auth.clear_authentication();
                        DispatchState::Failed(ReaderError::AuthFailure(
                            "credentials rejected after re-authentication".into(),
                        ))
                    }
                }
                DispatchState::RetryAuth { epoch } => {
                    match self
                        .auth
                        .renew_after_rejection(epoch, operation.mutating)
                        .await
                    {
                        Ok(()) => DispatchState::Unsent(Attempt::Retry),
                        Err(err) => DispatchState::Failed(err.into()),
                    }
                }
                DispatchState::Done(response) => return Ok(response),
                DispatchState::Failed(err) => return Err(err),
            };
        }
    }

    /// Ensures tokens, builds the request and hands it to the transport.
    async fn submit(
        &self,
        operation: &ApiOperation,
        url: &Url,
    ) -> Result<(u64, HttpResponse), ReaderError> {
        let (epoch, authorization, action_token) = self.credentials(operation.mutating).await?;

        let mut request = HttpRequest::new(operation.method.clone(), url.clone())
            .with_form(operation.form.iter().cloned());
        if let Some(token) = action_token {
            request.form.push(("T".to_string(), token));
        }
        request.headers.insert(AUTHORIZATION, authorization);

        tracing::debug!(operation = operation.name, path = %url.path(), "Dispatching request");
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| ReaderError::NetworkFailure(e.to_string()))?;

        Ok((epoch, response))
    }

    /// Ensures and reads the tokens a request needs.
    ///
    /// A token can be cleared between being ensured and being read (another
    /// caller reset authentication, or it expired on the boundary); the
    /// ensure step is then repeated rather than failing the operation.
    async fn credentials(
        &self,
        needs_action_token: bool,
    ) -> Result<(u64, HeaderValue, Option<String>), ReaderError> {
        for _ in 0..CREDENTIAL_ROUNDS {
            self.auth.ensure_authenticated().await?;
            if needs_action_token {
                self.auth.ensure_action_token().await?;
            }

            let epoch = self.auth.epoch();
            let authorization = self.auth.authorization();
            let action_token = needs_action_token.then(|| self.auth.action_token()).flatten();
            match authorization {
                Some(authorization) if action_token.is_some() || !needs_action_token => {
                    return Ok((epoch, authorization, action_token));
                }
                _ => tracing::debug!("Token gone before use, ensuring again"),
            }
        }
        Err(AuthError::Superseded.into())
    }

    fn report(&self, operation: &ApiOperation, result: &Result<HttpResponse, ReaderError>) {
        let Some(handle) = &operation.activity else {
            return;
        };
        let line = match result {
            Ok(response) => format!(
                "{}: HTTP {} ({} bytes)",
                operation.name,
                response.status.as_u16(),
                response.body.len()
            ),
            Err(err) => format!("{} failed: {}", operation.name, err),
        };
        self.activity_log.append(handle, &line);
    }
}

fn is_auth_rejection(response: &HttpResponse) -> bool {
    response.status.as_u16() == 401
        || response
            .header(BAD_TOKEN_HEADER)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}
