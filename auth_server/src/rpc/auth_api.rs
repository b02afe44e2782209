use tonic::{Request, Response, Status};

use civica_core::models::User;
use civica_protos::civica::v1::{
  AuthService, CallbackRequest, CallbackResponse, CheckRequest, CheckResponse, GetMeRequest,
  GetMeResponse, LogoutRequest, LogoutResponse, RedirectRequest, RedirectResponse,
  RegisterRequest, RegisterResponse, RequestAccountSecurityRequest,
  RequestAccountSecurityResponse, VerifyAccountSecurityRequest, VerifyAccountSecurityResponse,
};

use crate::error::status_from_core;
use crate::rpc::metadata::{bearer_token, client_ip, user_agent};
use crate::state::AppState;

/// The transport facade: authenticates bearer tokens, rejects bad requests
/// before the domain services run, and maps domain error kinds onto status
/// codes.
pub struct AuthApi {
  state: AppState,
}

impl AuthApi {
  pub fn new(state: AppState) -> Self {
    Self { state }
  }

  async fn authenticate<T>(&self, request: &Request<T>) -> Result<User, Status> {
    let token =
      bearer_token(request).ok_or_else(|| Status::unauthenticated("missing bearer token"))?;

    self
      .state
      .token_store
      .validate(&token)
      .await
      .map_err(status_from_core)
  }
}

#[tonic::async_trait]
impl AuthService for AuthApi {
  async fn check(&self, _request: Request<CheckRequest>) -> Result<Response<CheckResponse>, Status> {
    Ok(Response::new(CheckResponse {
      status: "SERVING".to_string(),
    }))
  }

  async fn register(
    &self,
    request: Request<RegisterRequest>,
  ) -> Result<Response<RegisterResponse>, Status> {
    let req = request.into_inner();

    let url = self
      .state
      .orchestrator
      .register_url(&req.back_url, &req.referral)
      .map_err(status_from_core)?;

    Ok(Response::new(RegisterResponse { url }))
  }

  async fn redirect(
    &self,
    request: Request<RedirectRequest>,
  ) -> Result<Response<RedirectResponse>, Status> {
    let req = request.into_inner();

    let (url, _state) = self
      .state
      .orchestrator
      .redirect(&req.redirect_to, &req.back_url)
      .await
      .map_err(status_from_core)?;

    Ok(Response::new(RedirectResponse { url }))
  }

  async fn callback(
    &self,
    request: Request<CallbackRequest>,
  ) -> Result<Response<CallbackResponse>, Status> {
    let ip = client_ip(&request);
    let agent = user_agent(&request);
    let req = request.into_inner();

    if req.state.is_empty() || req.code.is_empty() {
      return Err(Status::invalid_argument("state and code are required"));
    }

    let outcome = self
      .state
      .orchestrator
      .callback(&req.state, &req.code, &ip, &agent)
      .await
      .map_err(status_from_core)?;

    Ok(Response::new(CallbackResponse {
      token: outcome.token,
      expires_in_minutes: outcome.expires_in_minutes,
      redirect_url: outcome.redirect_url,
    }))
  }

  async fn logout(
    &self,
    request: Request<LogoutRequest>,
  ) -> Result<Response<LogoutResponse>, Status> {
    let user = self.authenticate(&request).await?;
    let ip = client_ip(&request);
    let agent = user_agent(&request);

    self
      .state
      .observer
      .on_user_logout(&user, &ip, &agent)
      .await
      .map_err(status_from_core)?;

    self
      .state
      .token_store
      .delete_user_tokens(user.id)
      .await
      .map_err(status_from_core)?;

    Ok(Response::new(LogoutResponse {}))
  }

  async fn get_me(
    &self,
    request: Request<GetMeRequest>,
  ) -> Result<Response<GetMeResponse>, Status> {
    let user = self.authenticate(&request).await?;

    let settings = self
      .state
      .settings
      .find_by_user(user.id)
      .await
      .map_err(status_from_core)?;
    let automatic_logout = settings
      .map(|s| s.effective_automatic_logout())
      .unwrap_or(civica_core::models::DEFAULT_AUTOMATIC_LOGOUT as i64);

    // Peer reads degrade to their neutral answers; a flapping secondary
    // never turns this read into an error.
    let (level, percentage) = self.state.peers.get_user_level(user.id).await;
    let unanswered = self.state.peers.unanswered_questions_count(user.id).await;
    let version_title = self.state.peers.latest_version_title().await;

    Ok(Response::new(GetMeResponse {
      id: user.id,
      name: user.name,
      email: user.email,
      phone: user.phone.unwrap_or_default(),
      code: user.code,
      score: user.score,
      last_seen: user.last_seen.timestamp(),
      phone_verified: user.phone_verified_at.is_some(),
      email_verified: user.email_verified_at.is_some(),
      automatic_logout,
      level,
      socre_percentage_to_next_level: percentage,
      unasnwered_questions_count: unanswered,
      latest_version_title: version_title,
    }))
  }

  async fn request_account_security(
    &self,
    request: Request<RequestAccountSecurityRequest>,
  ) -> Result<Response<RequestAccountSecurityResponse>, Status> {
    let user = self.authenticate(&request).await?;
    let req = request.into_inner();

    self
      .state
      .security
      .request_account_security(&user, req.minutes, &req.phone)
      .await
      .map_err(status_from_core)?;

    Ok(Response::new(RequestAccountSecurityResponse {}))
  }

  async fn verify_account_security(
    &self,
    request: Request<VerifyAccountSecurityRequest>,
  ) -> Result<Response<VerifyAccountSecurityResponse>, Status> {
    let user = self.authenticate(&request).await?;
    let ip = client_ip(&request);
    let agent = user_agent(&request);
    let req = request.into_inner();

    let until = self
      .state
      .security
      .verify_account_security(&user, &req.code, &ip, &agent)
      .await
      .map_err(status_from_core)?;

    Ok(Response::new(VerifyAccountSecurityResponse {
      until: until.timestamp(),
    }))
  }
}
